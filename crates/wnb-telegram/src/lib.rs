//! Telegram adapter (teloxide).
//!
//! Implements the `wnb-core` MessagingPort over the Telegram Bot API. The bot
//! only sends: digests go out as HTML with link previews disabled.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ParseMode, Recipient},
};

use tokio::time::sleep;
use tracing::warn;

use wnb_core::{
    domain::{ChatId, ChatTarget, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{BotIdentity, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    max_message_len: usize,
}

impl TelegramMessenger {
    pub fn new(token: impl Into<String>, max_message_len: usize) -> Self {
        Self {
            bot: Bot::new(token),
            max_message_len,
        }
    }

    fn recipient(chat: &ChatTarget) -> Recipient {
        match chat {
            ChatTarget::Id(id) => Recipient::Id(teloxide::types::ChatId(id.0)),
            ChatTarget::Username(name) => Recipient::ChannelUsername(name.clone()),
        }
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        warn!(retry_after = ?d, "telegram flood control, retrying");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_html: true,
            max_message_len: self.max_message_len,
        }
    }

    async fn send_html(&self, chat: &ChatTarget, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::recipient(chat), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true)
            })
            .await?;

        Ok(MessageRef {
            chat_id: ChatId(msg.chat.id.0),
            message_id: MessageId(msg.id.0),
        })
    }

    async fn whoami(&self) -> Result<BotIdentity> {
        let me = self.with_retry(|| self.bot.get_me()).await?;
        Ok(BotIdentity {
            id: me.id.0,
            username: me.username().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn chat_targets_map_to_recipients() {
        assert_eq!(
            TelegramMessenger::recipient(&ChatTarget::Id(ChatId(-1001234))),
            Recipient::Id(teloxide::types::ChatId(-1001234))
        );
        assert_eq!(
            TelegramMessenger::recipient(&ChatTarget::Username("@worldnews".to_string())),
            Recipient::ChannelUsername("@worldnews".to_string())
        );
    }

    #[tokio::test]
    async fn flood_control_is_retried_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let m = TelegramMessenger::new("123:abc", 4096);
        let calls = AtomicUsize::new(0);
        let out = m
            .with_retry(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(teloxide::RequestError::RetryAfter(Duration::from_millis(5)))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 1);

        let calls = AtomicUsize::new(0);
        let err = m
            .with_retry(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(teloxide::RequestError::RetryAfter(Duration::from_millis(5)))
                }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(err.to_string().contains("telegram error"));
    }

    #[test]
    fn capabilities_follow_configured_limit() {
        let m = TelegramMessenger::new("123:abc", 4096);
        let caps = m.capabilities();
        assert!(caps.supports_html);
        assert_eq!(caps.max_message_len, 4096);
    }
}
