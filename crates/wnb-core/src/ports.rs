//! Hexagonal ports. Adapters live in `wnb-openai`, `wnb-storage` and
//! `wnb-telegram`; the feed fetcher has its HTTP implementation in [`crate::feeds`].

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    domain::{Digest, FeedSource, RawArticle, Region},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object response.
    pub json_mode: bool,
}

/// A chat-completions backend (OpenRouter or any OpenAI-compatible endpoint).
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<String>;
}

/// Persistence for fetched articles and produced digests.
#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Insert articles whose URL is not stored yet; returns how many were new.
    async fn save_articles(&self, articles: &[RawArticle]) -> Result<usize>;

    /// Articles fetched within the last `hours_back` hours, newest published first.
    async fn articles_for_region(
        &self,
        region: &Region,
        hours_back: i64,
        unprocessed_only: bool,
    ) -> Result<Vec<RawArticle>>;

    async fn mark_articles_processed(&self, ids: &[String]) -> Result<()>;

    async fn save_digest(&self, digest: &Digest) -> Result<()>;

    async fn latest_digest(&self, region: &Region) -> Result<Option<Digest>>;

    async fn mark_digest_sent(&self, id: &str) -> Result<()>;

    /// Delete articles fetched more than `days` days ago.
    async fn cleanup_old_articles(&self, days: i64) -> Result<u64>;
}

/// Fetch + parse one feed source.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch_source(&self, source: &FeedSource, region: &Region) -> Result<Vec<RawArticle>>;
}
