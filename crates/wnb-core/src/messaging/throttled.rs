use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatTarget, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{BotIdentity, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* Telegram API calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between messages to the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            // Channels tolerate ~20 posts/minute.
            per_chat_min_interval: Duration::from_millis(3100),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingPort decorator that rate-limits outbound calls.
///
/// Best-effort defense against Telegram 429s when several digests go out to
/// several chats back to back; the adapter still retries on `RetryAfter`.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<ChatTarget, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat: &ChatTarget) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(chat.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_chat(&self, chat: &ChatTarget) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let lim = self.limiter_for_chat(chat).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn throttle_global(&self) {
        let wait = { self.global.lock().await.reserve() };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(&self, chat: &ChatTarget, html: &str) -> Result<MessageRef> {
        self.throttle_chat(chat).await;
        self.inner.send_html(chat, html).await
    }

    async fn whoami(&self) -> Result<BotIdentity> {
        self.throttle_global().await;
        self.inner.whoami().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, MessageId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingMessenger {
        sends: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MessagingPort for CountingMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                supports_html: true,
                max_message_len: 4096,
            }
        }

        async fn send_html(&self, _chat: &ChatTarget, _html: &str) -> Result<MessageRef> {
            let n = self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(MessageRef {
                chat_id: ChatId(1),
                message_id: MessageId(n as i32 + 1),
            })
        }

        async fn whoami(&self) -> Result<BotIdentity> {
            Ok(BotIdentity {
                id: 1,
                username: "bot".to_string(),
            })
        }
    }

    #[test]
    fn limiter_spaces_reservations() {
        let mut lim = IntervalLimiter::new(Duration::from_secs(10));
        assert!(lim.reserve().is_zero());
        assert!(lim.reserve() > Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn second_send_to_same_chat_waits() {
        let inner = Arc::new(CountingMessenger::default());
        let throttled = ThrottledMessenger::new(
            inner.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(0),
                per_chat_min_interval: Duration::from_secs(3),
            },
        );
        let chat = ChatTarget::Id(ChatId(7));

        let start = Instant::now();
        throttled.send_html(&chat, "a").await.unwrap();
        throttled.send_html(&chat, "b").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(inner.sends.load(Ordering::SeqCst), 2);
    }
}
