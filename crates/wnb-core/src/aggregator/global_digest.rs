use std::collections::BTreeSet;

use chrono::{Timelike, Utc};
use chrono_tz::Tz;
use tracing::{error, info, warn};

use crate::{
    config::AppConfig,
    domain::{Digest, GlobalSummary, RawArticle, Region, TimePeriod},
    formatting::escape_html,
    llm::LlmService,
    utils::truncate_chars,
};

use super::dedup::Deduplicator;

pub const GLOBAL_NAME_RU: &str = "Мировой дайджест";

const MAX_PER_REGION: usize = 15;
const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 300;
const MAX_SOURCES: usize = 10;
const MAX_ARTICLE_IDS: usize = 50;

/// World digest built from every region's articles in one LLM call.
#[derive(Clone)]
pub struct GlobalDigestGenerator {
    llm: LlmService,
    dedup: Deduplicator,
    user_tz: Tz,
}

impl GlobalDigestGenerator {
    pub fn new(llm: LlmService, user_tz: Tz) -> Self {
        Self {
            llm,
            dedup: Deduplicator::default(),
            user_tz,
        }
    }

    /// `None` when there is nothing to summarize or the LLM call fails.
    pub async fn generate(
        &self,
        app: &AppConfig,
        all_articles: &[(Region, Vec<RawArticle>)],
    ) -> Option<Digest> {
        let total: usize = all_articles.iter().map(|(_, a)| a.len()).sum();
        if total == 0 {
            warn!("no articles for global digest");
            return None;
        }
        info!(total, regions = all_articles.len(), "generating global digest");

        let flat: Vec<RawArticle> = all_articles
            .iter()
            .flat_map(|(_, articles)| articles.iter().cloned())
            .collect();
        let unique = self.dedup.deduplicate(flat);
        info!(unique = unique.len(), "after global deduplication");

        let text = format_articles(app, &group_by_region(&unique));
        let region_tokens: Vec<String> = all_articles.iter().map(|(r, _)| r.to_string()).collect();

        let summary = match self.llm.global_digest(&text, &region_tokens).await {
            Ok(s) => s,
            Err(e) => {
                error!("llm error generating global digest: {e}");
                return None;
            }
        };

        let hour = Utc::now().with_timezone(&self.user_tz).hour();
        let mut digest = Digest::new(
            Region::global(),
            events_html(app, &summary),
            TimePeriod::from_hour(hour),
        );
        digest.region_name_ru = GLOBAL_NAME_RU.to_string();
        digest.key_topics = summary.key_topics;
        digest.article_count = total;
        digest.sources_used = all_articles
            .iter()
            .flat_map(|(_, articles)| articles.iter().map(|a| a.source_name.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .take(MAX_SOURCES)
            .collect();
        digest.article_ids = unique.iter().take(MAX_ARTICLE_IDS).map(|a| a.id.clone()).collect();
        digest.covered_regions = all_articles
            .iter()
            .filter(|(_, articles)| !articles.is_empty())
            .map(|(r, _)| r.clone())
            .collect();

        Some(digest)
    }
}

/// Groups keep the order in which regions first appear.
fn group_by_region(articles: &[RawArticle]) -> Vec<(Region, Vec<&RawArticle>)> {
    let mut groups: Vec<(Region, Vec<&RawArticle>)> = Vec::new();
    for article in articles {
        match groups.iter_mut().find(|(r, _)| *r == article.region) {
            Some((_, group)) => group.push(article),
            None => groups.push((article.region.clone(), vec![article])),
        }
    }
    groups
}

fn format_articles(app: &AppConfig, groups: &[(Region, Vec<&RawArticle>)]) -> String {
    let mut parts = Vec::new();
    for (region, articles) in groups {
        parts.push(format!("\n=== {} ===", app.region_info(region).name_en));
        for a in articles.iter().take(MAX_PER_REGION) {
            let source = if a.source_name.is_empty() {
                "Unknown"
            } else {
                a.source_name.as_str()
            };
            parts.push(format!("[{source}] {}", truncate_chars(&a.title, MAX_TITLE_CHARS)));
            if !a.description.is_empty() {
                parts.push(format!(
                    "   {}",
                    truncate_chars(&a.description, MAX_DESCRIPTION_CHARS)
                ));
            }
        }
    }
    parts.join("\n")
}

fn events_html(app: &AppConfig, summary: &GlobalSummary) -> String {
    let mut parts = Vec::new();
    for (i, event) in summary.events.iter().enumerate() {
        parts.push(format!("<b>{}. {}</b>", i + 1, escape_html(&event.headline)));
        parts.push(escape_html(&event.summary));

        let regions: Vec<String> = event
            .regions
            .iter()
            .map(|r| region_name_ru(app, r))
            .collect();
        if !regions.is_empty() {
            parts.push(format!("<i>Регионы: {}</i>", escape_html(&regions.join(", "))));
        }
        parts.push(String::new());
    }
    parts.join("\n")
}

fn region_name_ru(app: &AppConfig, token: &str) -> String {
    let region = Region::new(token);
    if region.is_global() {
        return "Глобально".to_string();
    }
    app.region_info(&region).name_ru
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::{LlmConfig, RegionInfo},
        errors::Error,
        llm::fake::FakeModel,
    };

    fn app() -> AppConfig {
        let mut app = AppConfig::default();
        for (token, en, ru) in [("usa", "USA", "США"), ("china", "China", "Китай")] {
            app.regions.push(Region::new(token));
            app.region_info.insert(
                token.to_string(),
                RegionInfo {
                    name_en: en.to_string(),
                    name_ru: ru.to_string(),
                    primary_language: "en".to_string(),
                    timezone: "UTC".to_string(),
                },
            );
        }
        app
    }

    fn article(region: &str, source: &str, title: &str) -> RawArticle {
        let mut a = RawArticle::new(
            Region::new(region),
            source,
            title,
            format!("https://{source}/{}", title.len()),
        );
        a.description = "details".to_string();
        a
    }

    fn generator(model: Arc<FakeModel>) -> GlobalDigestGenerator {
        GlobalDigestGenerator::new(LlmService::new(model, LlmConfig::default()), Tz::Europe__Moscow)
    }

    const REPLY: &str = r#"{"key_topics": ["Геополитика"], "events": [
        {"headline": "Саммит", "summary": "Лидеры встретились.", "regions": ["usa", "china", "global"], "importance": "high"}
    ]}"#;

    #[tokio::test]
    async fn no_articles_means_no_digest() {
        let model = Arc::new(FakeModel::default());
        let out = generator(model.clone())
            .generate(&app(), &[(Region::new("usa"), Vec::new())])
            .await;
        assert!(out.is_none());
        assert!(model.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn builds_world_digest_with_russian_region_names() {
        let model = Arc::new(FakeModel::with_replies(vec![Ok(REPLY.to_string())]));
        let input = vec![
            (
                Region::new("usa"),
                vec![article("usa", "AP", "Summit opens"), article("usa", "NPR", "Storm")],
            ),
            (Region::new("china"), vec![article("china", "Xinhua", "Trade talks")]),
            (Region::new("japan"), Vec::new()),
        ];

        let digest = generator(model.clone()).generate(&app(), &input).await.unwrap();

        assert!(digest.region.is_global());
        assert_eq!(digest.region_name_ru, GLOBAL_NAME_RU);
        assert_eq!(digest.article_count, 3);
        assert_eq!(digest.sources_used, vec!["AP", "NPR", "Xinhua"]);
        assert_eq!(
            digest.covered_regions,
            vec![Region::new("usa"), Region::new("china")]
        );
        assert_eq!(
            digest.summary_html,
            "<b>1. Саммит</b>\nЛидеры встретились.\n<i>Регионы: США, Китай, Глобально</i>\n"
        );

        let reqs = model.requests.lock().unwrap();
        let prompt = &reqs[0].messages[1].content;
        assert!(prompt.contains("REGIONS COVERED: usa, china, japan"));
        assert!(prompt.contains("=== USA ==="));
        assert!(prompt.contains("[Xinhua] Trade talks"));
    }

    #[tokio::test]
    async fn llm_failure_yields_none() {
        let model = Arc::new(FakeModel::with_replies(vec![
            Err(Error::Llm("down".to_string())),
            Err(Error::Llm("down".to_string())),
        ]));
        let input = vec![(Region::new("usa"), vec![article("usa", "AP", "Summit")])];
        assert!(generator(model).generate(&app(), &input).await.is_none());
    }
}
