use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use chrono::{Timelike, Utc};
use chrono_tz::Tz;
use tracing::{error, info, warn};

use crate::{
    config::{load_region_sources, AppConfig},
    domain::{Digest, RawArticle, Region, TimePeriod},
    feeds,
    llm::LlmService,
    ports::{FeedFetcher, NewsStore},
    Result,
};

use super::{
    dedup::Deduplicator, global_digest::GlobalDigestGenerator, stories_html,
    summarizer::Summarizer, translator::Translator,
};

/// Regional digests keyed by region; `None` where a region produced nothing.
pub type RegionalDigests = BTreeMap<Region, Option<Digest>>;

/// Fetch, store, deduplicate, summarize and translate, per region and for the
/// whole world.
#[derive(Clone)]
pub struct NewsPipeline {
    store: Arc<dyn NewsStore>,
    fetcher: Arc<dyn FeedFetcher>,
    app: Arc<AppConfig>,
    config_dir: PathBuf,
    dedup: Deduplicator,
    summarizer: Summarizer,
    translator: Translator,
    global: GlobalDigestGenerator,
}

impl NewsPipeline {
    pub fn new(
        store: Arc<dyn NewsStore>,
        fetcher: Arc<dyn FeedFetcher>,
        llm: LlmService,
        app: Arc<AppConfig>,
        config_dir: PathBuf,
        user_tz: Tz,
    ) -> Self {
        Self {
            store,
            fetcher,
            app,
            config_dir,
            dedup: Deduplicator::default(),
            summarizer: Summarizer::new(llm.clone()),
            translator: Translator::new(llm.clone()),
            global: GlobalDigestGenerator::new(llm, user_tz),
        }
    }

    /// Fetch fresh articles without touching the store.
    pub async fn fetch_only(&self, region: &Region) -> Result<Vec<RawArticle>> {
        let sources = load_region_sources(&self.config_dir, region)?;
        if sources.is_empty() {
            warn!(region = %region, "no sources configured");
        }
        Ok(feeds::fetch_region(self.fetcher.as_ref(), region, &sources).await)
    }

    /// Fetch and save fresh articles, then return the stored unprocessed ones
    /// from the last `hours_back` hours.
    pub async fn collect_and_store(&self, region: &Region) -> Result<Vec<RawArticle>> {
        let fresh = self.fetch_only(region).await?;
        self.store_and_load(region, fresh).await
    }

    async fn store_and_load(
        &self,
        region: &Region,
        fresh: Vec<RawArticle>,
    ) -> Result<Vec<RawArticle>> {
        if !fresh.is_empty() {
            let saved = self.store.save_articles(&fresh).await?;
            info!(region = %region, saved, "saved new articles");
        }
        self.store
            .articles_for_region(region, self.app.storage.hours_back, true)
            .await
    }

    pub async fn process_region(&self, region: &Region) -> Result<Option<Digest>> {
        info!(region = %region, "starting pipeline");
        let articles = self.collect_and_store(region).await?;
        if articles.is_empty() {
            warn!(region = %region, "no articles found");
            return Ok(None);
        }
        info!(region = %region, count = articles.len(), "collected articles");
        self.build_regional(region, articles).await
    }

    /// Collect every region, build the world digest first, then the regional
    /// digests. One region failing never affects the others.
    pub async fn process_all_with_global(
        &self,
        regions: &[Region],
    ) -> (Option<Digest>, RegionalDigests) {
        info!(regions = regions.len(), "starting full pipeline with global digest");

        let plan: Vec<_> = regions
            .iter()
            .map(|r| (r.clone(), load_region_sources(&self.config_dir, r)))
            .collect();
        let mut fetched = feeds::fetch_all_regions(self.fetcher.as_ref(), &plan).await;

        let mut collected: Vec<(Region, Vec<RawArticle>)> = Vec::with_capacity(regions.len());
        for region in regions {
            let fresh = fetched.remove(region).unwrap_or_default();
            let articles = match self.store_and_load(region, fresh).await {
                Ok(a) => a,
                Err(e) => {
                    error!(region = %region, "error collecting: {e}");
                    Vec::new()
                }
            };
            info!(region = %region, count = articles.len(), "collected articles");
            collected.push((region.clone(), articles));
        }
        let total: usize = collected.iter().map(|(_, a)| a.len()).sum();
        info!(total, "total articles collected");

        let global = match self.global.generate(&self.app, &collected).await {
            Some(digest) => match self.store.save_digest(&digest).await {
                Ok(()) => {
                    info!("global digest generated");
                    Some(digest)
                }
                Err(e) => {
                    error!("error saving global digest: {e}");
                    None
                }
            },
            None => None,
        };

        let mut regional = RegionalDigests::new();
        for (region, articles) in collected {
            let digest = if articles.is_empty() {
                None
            } else {
                match self.build_regional(&region, articles).await {
                    Ok(d) => d,
                    Err(e) => {
                        error!(region = %region, "error processing: {e}");
                        None
                    }
                }
            };
            regional.insert(region, digest);
        }

        (global, regional)
    }

    async fn build_regional(
        &self,
        region: &Region,
        articles: Vec<RawArticle>,
    ) -> Result<Option<Digest>> {
        let unique = self.dedup.deduplicate(articles);
        if unique.is_empty() {
            return Ok(None);
        }

        let info = self.app.region_info(region);
        let summary = self.summarizer.summarize(&unique, &info).await?;
        let summary = self
            .translator
            .translate_summary(summary, &info.primary_language)
            .await?;

        let hour = Utc::now().with_timezone(&info.tz()).hour();
        let mut digest = Digest::new(
            region.clone(),
            stories_html(&summary),
            TimePeriod::from_hour(hour),
        );
        digest.region_name_ru = info.name_ru;
        digest.key_topics = summary.key_topics;
        digest.article_count = unique.len();
        let mut sources: Vec<String> = unique.iter().map(|a| a.source_name.clone()).collect();
        sources.sort();
        sources.dedup();
        digest.sources_used = sources;
        digest.article_ids = unique.iter().map(|a| a.id.clone()).collect();

        self.store.save_digest(&digest).await?;
        self.store.mark_articles_processed(&digest.article_ids).await?;

        info!(region = %region, "pipeline completed");
        Ok(Some(digest))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{
        config::{LlmConfig, RegionInfo},
        llm::fake::FakeModel,
        testing::{MemoryStore, StaticFetcher},
    };

    const SUMMARY: &str = r#"{"key_topics": ["Политика"], "stories": [{"headline": "Выборы", "summary": "Итоги."}]}"#;
    const GLOBAL: &str = r#"{"key_topics": ["Мир"], "events": [{"headline": "Событие", "summary": "Текст.", "regions": ["russia"], "importance": "high"}]}"#;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<MemoryStore>,
        model: Arc<FakeModel>,
        pipeline: NewsPipeline,
    }

    fn fixture(replies: Vec<Result<String>>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let sources = dir.path().join("sources");
        fs::create_dir_all(&sources).unwrap();
        fs::write(
            sources.join("russia.toml"),
            r#"
[[rss_sources]]
name = "TASS"
url = "https://tass.example/rss"
language = "ru"

[[rss_sources]]
name = "broken"
url = "https://broken.example/rss"
"#,
        )
        .unwrap();
        fs::write(
            sources.join("usa.toml"),
            "[[rss_sources]]\nname = \"AP\"\nurl = \"https://ap.example/rss\"\n",
        )
        .unwrap();

        let mut app = AppConfig::default();
        app.regions = vec![Region::new("russia"), Region::new("usa"), Region::new("japan")];
        app.region_info.insert(
            "russia".to_string(),
            RegionInfo {
                name_en: "Russia".to_string(),
                name_ru: "Россия".to_string(),
                primary_language: "ru".to_string(),
                timezone: "Europe/Moscow".to_string(),
            },
        );

        let store = Arc::new(MemoryStore::default());
        let model = Arc::new(FakeModel::with_replies(replies));
        let pipeline = NewsPipeline::new(
            store.clone(),
            Arc::new(StaticFetcher::default()),
            LlmService::new(model.clone(), LlmConfig::default()),
            Arc::new(app),
            dir.path().to_path_buf(),
            Tz::Europe__Moscow,
        );
        Fixture {
            _dir: dir,
            store,
            model,
            pipeline,
        }
    }

    #[tokio::test]
    async fn process_region_builds_saves_and_marks() {
        let fx = fixture(vec![Ok(SUMMARY.to_string())]);
        let digest = fx
            .pipeline
            .process_region(&Region::new("russia"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(digest.region_name_ru, "Россия");
        assert_eq!(digest.article_count, 1);
        assert_eq!(digest.sources_used, vec!["TASS"]);
        assert_eq!(digest.key_topics, vec!["Политика"]);
        assert_eq!(digest.summary_html, "<b>1. Выборы</b>\nИтоги.");
        // Russian source: no translation calls.
        assert_eq!(fx.model.requests.lock().unwrap().len(), 1);

        assert_eq!(fx.store.digests.lock().unwrap().len(), 1);
        assert!(fx.store.articles.lock().unwrap().iter().all(|a| a.processed));
    }

    #[tokio::test]
    async fn processed_articles_are_not_summarized_again() {
        let fx = fixture(vec![Ok(SUMMARY.to_string())]);
        let region = Region::new("russia");
        fx.pipeline.process_region(&region).await.unwrap();

        // Same URLs again: nothing new is stored, nothing unprocessed remains.
        assert!(fx.pipeline.process_region(&region).await.unwrap().is_none());
        assert_eq!(fx.model.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn region_without_sources_yields_nothing() {
        let fx = fixture(Vec::new());
        let out = fx.pipeline.process_region(&Region::new("japan")).await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn global_first_then_regions_with_isolated_failures() {
        // global, russia summary, usa summary fails on both models.
        let fx = fixture(vec![
            Ok(GLOBAL.to_string()),
            Ok(SUMMARY.to_string()),
            Err(crate::errors::Error::Llm("down".to_string())),
            Err(crate::errors::Error::Llm("down".to_string())),
        ]);
        let regions = vec![Region::new("russia"), Region::new("usa"), Region::new("japan")];
        let (global, regional) = fx.pipeline.process_all_with_global(&regions).await;

        let global = global.unwrap();
        assert_eq!(global.article_count, 2);
        assert_eq!(
            global.covered_regions,
            vec![Region::new("russia"), Region::new("usa")]
        );
        assert!(regional[&Region::new("russia")].is_some());
        assert!(regional[&Region::new("usa")].is_none());
        assert!(regional[&Region::new("japan")].is_none());
        assert_eq!(fx.store.digests.lock().unwrap().len(), 2);
    }
}
