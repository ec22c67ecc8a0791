use tracing::info;

use crate::{
    config::RegionInfo,
    domain::{RawArticle, Summary},
    llm::LlmService,
    utils::truncate_chars,
    Result,
};

const MAX_ARTICLES: usize = 30;
const MAX_DESCRIPTION_CHARS: usize = 500;
const MAX_WORDS: u32 = 500;

/// Regional summary in the region's primary language.
#[derive(Clone)]
pub struct Summarizer {
    llm: LlmService,
}

impl Summarizer {
    pub fn new(llm: LlmService) -> Self {
        Self { llm }
    }

    pub async fn summarize(&self, articles: &[RawArticle], info: &RegionInfo) -> Result<Summary> {
        if articles.is_empty() {
            return Ok(Summary::default());
        }

        info!(region = %info.name_en, count = articles.len(), "summarizing");
        self.llm
            .summarize(
                &format_articles(articles),
                &info.name_en,
                &info.primary_language,
                MAX_WORDS,
            )
            .await
    }
}

fn format_articles(articles: &[RawArticle]) -> String {
    articles
        .iter()
        .take(MAX_ARTICLES)
        .enumerate()
        .map(|(i, a)| {
            let date = a
                .published_at
                .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            format!(
                "\n---\nArticle {}\nSource: {}\nDate: {}\nTitle: {}\nSummary: {}\n---",
                i + 1,
                a.source_name,
                date,
                a.title,
                truncate_chars(&a.description, MAX_DESCRIPTION_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
