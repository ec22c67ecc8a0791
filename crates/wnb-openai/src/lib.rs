//! OpenRouter adapter (OpenAI-compatible chat completions).
//!
//! `POST {base_url}/chat/completions` with bearer auth; JSON mode maps to
//! `response_format: {"type": "json_object"}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wnb_core::{
    config::LlmConfig,
    errors::Error,
    ports::{ChatMessage, ChatModel, ChatRequest},
    Result,
};

#[derive(Clone, Debug)]
pub struct OpenRouterClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>, cfg: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| Error::External(format!("reqwest client build: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl<'a> CompletionBody<'a> {
    fn from_request(req: &'a ChatRequest) -> Self {
        Self {
            model: &req.model,
            messages: &req.messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            response_format: req.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn extract_content(resp: CompletionResponse) -> Result<String> {
    let content = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    if content.trim().is_empty() {
        return Err(Error::Llm("completion returned empty content".to_string()));
    }
    Ok(content)
}

#[async_trait]
impl ChatModel for OpenRouterClient {
    async fn chat(&self, req: ChatRequest) -> Result<String> {
        debug!(model = %req.model, json = req.json_mode, "chat completion request");

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&CompletionBody::from_request(&req))
            .send()
            .await
            .map_err(|e| Error::Llm(format!("{} request error: {e}", req.model)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Llm(format!(
                "{} completion failed: {status} {}",
                req.model,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| Error::Llm(format!("{} json error: {e}", req.model)))?;

        extract_content(parsed)
    }
}
