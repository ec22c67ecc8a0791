use async_trait::async_trait;

use crate::{
    domain::{ChatTarget, MessageRef},
    messaging::types::{BotIdentity, MessagingCapabilities},
    Result,
};

/// Outbound messenger port.
///
/// The bot only ever sends: digests go out as HTML, and `whoami` checks that the
/// credentials are valid without sending anything.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat: &ChatTarget, html: &str) -> Result<MessageRef>;

    async fn whoami(&self) -> Result<BotIdentity>;
}
