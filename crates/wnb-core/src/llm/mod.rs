//! LLM access on top of the [`ChatModel`] port.

pub mod prompts;

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    config::LlmConfig,
    domain::{GlobalEvent, GlobalSummary, Story, Summary},
    ports::{ChatMessage, ChatModel, ChatRequest},
    utils::truncate_chars,
    Result,
};

const FALLBACK_EXCERPT_CHARS: usize = 500;

/// Summaries, translations and the world digest, with a fallback model.
#[derive(Clone)]
pub struct LlmService {
    model: Arc<dyn ChatModel>,
    cfg: LlmConfig,
}

impl LlmService {
    pub fn new(model: Arc<dyn ChatModel>, cfg: LlmConfig) -> Self {
        Self { model, cfg }
    }

    /// One completion. A failure with the default model is retried once with
    /// the fallback model.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        json_mode: bool,
    ) -> Result<String> {
        let req = ChatRequest {
            model: self.cfg.default_model.clone(),
            messages,
            temperature: self.cfg.temperature,
            max_tokens,
            json_mode,
        };

        match self.model.chat(req.clone()).await {
            Ok(text) => Ok(text),
            Err(e) if self.cfg.fallback_model != req.model => {
                error!(model = %req.model, "llm error: {e}");
                info!(model = %self.cfg.fallback_model, "trying fallback model");
                self.model
                    .chat(ChatRequest {
                        model: self.cfg.fallback_model.clone(),
                        ..req
                    })
                    .await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn summarize(
        &self,
        articles_text: &str,
        region_name: &str,
        language: &str,
        max_words: u32,
    ) -> Result<Summary> {
        let prompt = prompts::summarization(articles_text, region_name, language, max_words);
        let response = self
            .complete(
                vec![
                    ChatMessage::system(prompts::SUMMARY_SYSTEM),
                    ChatMessage::user(prompt),
                ],
                self.cfg.max_tokens_summary,
                true,
            )
            .await?;

        Ok(parse_summary(&response))
    }

    pub async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String> {
        let prompt = prompts::translation(text, source_language, target_language);
        self.complete(
            vec![
                ChatMessage::system(prompts::TRANSLATION_SYSTEM),
                ChatMessage::user(prompt),
            ],
            self.cfg.max_tokens_translation,
            false,
        )
        .await
    }

    pub async fn global_digest(&self, articles_text: &str, regions: &[String]) -> Result<GlobalSummary> {
        let prompt = prompts::global_digest(articles_text, regions);
        let response = self
            .complete(
                vec![
                    ChatMessage::system(prompts::GLOBAL_SYSTEM),
                    ChatMessage::user(prompt),
                ],
                self.cfg.max_tokens_global,
                true,
            )
            .await?;

        Ok(parse_global_summary(&response))
    }
}

/// Remove a surrounding Markdown code fence (```` ```json ```` or ```` ``` ````).
pub fn strip_code_fences(response: &str) -> &str {
    let mut s = response.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

fn parse_summary(response: &str) -> Summary {
    match serde_json::from_str::<Summary>(strip_code_fences(response)) {
        Ok(summary) => summary,
        Err(e) => {
            error!("failed to parse summary json: {e}");
            Summary {
                key_topics: Vec::new(),
                stories: vec![Story {
                    headline: "Error".to_string(),
                    summary: truncate_chars(response, FALLBACK_EXCERPT_CHARS),
                }],
            }
        }
    }
}

fn parse_global_summary(response: &str) -> GlobalSummary {
    match serde_json::from_str::<GlobalSummary>(strip_code_fences(response)) {
        Ok(summary) => summary,
        Err(e) => {
            warn!("failed to parse global digest json, using raw text: {e}");
            GlobalSummary {
                key_topics: vec!["World Events".to_string()],
                events: vec![GlobalEvent {
                    headline: "Global News Summary".to_string(),
                    summary: truncate_chars(response, FALLBACK_EXCERPT_CHARS),
                    regions: vec!["global".to_string()],
                    importance: "high".to_string(),
                }],
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::{collections::VecDeque, sync::Mutex};

    use async_trait::async_trait;

    use crate::{
        errors::Error,
        ports::{ChatModel, ChatRequest},
        Result,
    };

    /// Replays scripted replies and records every request.
    #[derive(Default)]
    pub struct FakeModel {
        pub replies: Mutex<VecDeque<Result<String>>>,
        pub requests: Mutex<Vec<ChatRequest>>,
    }

    impl FakeModel {
        pub fn with_replies(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn models_used(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.model.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        async fn chat(&self, req: ChatRequest) -> Result<String> {
            self.requests.lock().unwrap().push(req);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Llm("no scripted reply".to_string())))
        }
    }
}
