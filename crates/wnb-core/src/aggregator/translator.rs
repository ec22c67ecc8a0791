use tracing::info;

use crate::{
    domain::{Story, Summary},
    llm::LlmService,
    Result,
};

pub const TARGET_LANGUAGE: &str = "ru";

/// Translates summaries into Russian, one LLM call per text.
#[derive(Clone)]
pub struct Translator {
    llm: LlmService,
}

impl Translator {
    pub fn new(llm: LlmService) -> Self {
        Self { llm }
    }

    pub async fn translate_summary(&self, summary: Summary, source_language: &str) -> Result<Summary> {
        if source_language == TARGET_LANGUAGE {
            return Ok(summary);
        }

        info!(from = source_language, stories = summary.stories.len(), "translating summary");

        let mut stories = Vec::with_capacity(summary.stories.len());
        for story in &summary.stories {
            let headline = self.translate(&story.headline, source_language).await?;
            let text = self.translate(&story.summary, source_language).await?;
            stories.push(Story {
                headline,
                summary: text,
            });
        }

        let mut key_topics = Vec::with_capacity(summary.key_topics.len());
        for topic in &summary.key_topics {
            key_topics.push(self.translate(topic, source_language).await?);
        }

        Ok(Summary { key_topics, stories })
    }

    async fn translate(&self, text: &str, source_language: &str) -> Result<String> {
        let out = self
            .llm
            .translate(text, source_language, TARGET_LANGUAGE)
            .await?;
        Ok(out.trim().to_string())
    }
}
