//! Digest delivery to the configured chats.

use std::{sync::Arc, time::Duration};

use tracing::{error, info, warn};

use crate::{
    config::TelegramConfig,
    domain::{ChatTarget, Digest},
    formatting::DigestFormatter,
    messaging::{port::MessagingPort, types::BotIdentity},
    ports::NewsStore,
    Result,
};

/// Sends formatted digests to every chat, with per-send retries.
#[derive(Clone)]
pub struct DigestSender {
    messenger: Arc<dyn MessagingPort>,
    store: Arc<dyn NewsStore>,
    chats: Vec<ChatTarget>,
    formatter: DigestFormatter,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl DigestSender {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        store: Arc<dyn NewsStore>,
        chats: Vec<ChatTarget>,
        formatter: DigestFormatter,
        cfg: &TelegramConfig,
    ) -> Self {
        Self {
            messenger,
            store,
            chats,
            formatter,
            retry_attempts: cfg.retry_attempts.max(1),
            retry_delay: Duration::from_secs(cfg.retry_delay_seconds),
        }
    }

    /// `true` when every chat received the digest; the digest is then marked
    /// sent in the store.
    pub async fn send_digest(&self, digest: &Digest) -> bool {
        let html = self.formatter.format(digest);
        if !self.broadcast(&html).await {
            return false;
        }

        if let Err(e) = self.store.mark_digest_sent(&digest.id).await {
            error!(region = %digest.region, "failed to mark digest sent: {e}");
        }
        info!(region = %digest.region, "sent digest");
        true
    }

    /// Plain status/info message to every chat.
    pub async fn send_status(&self, html: &str) -> bool {
        self.broadcast(html).await
    }

    /// Check the bot credentials (`getMe`).
    pub async fn test_connection(&self) -> Result<BotIdentity> {
        let me = self.messenger.whoami().await?;
        info!("connected to telegram as @{}", me.username);
        Ok(me)
    }

    async fn broadcast(&self, html: &str) -> bool {
        if self.chats.is_empty() {
            warn!("no chats configured");
            return false;
        }
        let mut all_ok = true;
        for chat in &self.chats {
            if !self.send_with_retry(chat, html).await {
                all_ok = false;
            }
        }
        all_ok
    }

    async fn send_with_retry(&self, chat: &ChatTarget, html: &str) -> bool {
        for attempt in 1..=self.retry_attempts {
            match self.messenger.send_html(chat, html).await {
                Ok(_) => return true,
                Err(e) => {
                    error!(chat = %chat, attempt, "telegram error: {e}");
                    if attempt < self.retry_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        false
    }
}
