//! In-memory port implementations shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::{
    domain::{ChatId, ChatTarget, Digest, FeedSource, MessageId, MessageRef, RawArticle, Region},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{BotIdentity, MessagingCapabilities},
    },
    ports::{FeedFetcher, NewsStore},
    Result,
};

#[derive(Default)]
pub struct MemoryStore {
    pub articles: Mutex<Vec<RawArticle>>,
    pub digests: Mutex<Vec<Digest>>,
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl NewsStore for MemoryStore {
    async fn save_articles(&self, articles: &[RawArticle]) -> Result<usize> {
        let mut stored = self.articles.lock().unwrap();
        let mut urls: HashSet<String> = stored.iter().map(|a| a.url.clone()).collect();
        let mut saved = 0;
        for a in articles {
            if urls.insert(a.url.clone()) {
                stored.push(a.clone());
                saved += 1;
            }
        }
        Ok(saved)
    }

    async fn articles_for_region(
        &self,
        region: &Region,
        hours_back: i64,
        unprocessed_only: bool,
    ) -> Result<Vec<RawArticle>> {
        let cutoff = Utc::now() - Duration::hours(hours_back);
        let mut out: Vec<RawArticle> = self
            .articles
            .lock()
            .unwrap()
            .iter()
            .filter(|a| &a.region == region && a.fetched_at >= cutoff)
            .filter(|a| !unprocessed_only || !a.processed)
            .cloned()
            .collect();
        out.sort_by_key(|a| std::cmp::Reverse(a.published_at));
        Ok(out)
    }

    async fn mark_articles_processed(&self, ids: &[String]) -> Result<()> {
        for a in self.articles.lock().unwrap().iter_mut() {
            if ids.contains(&a.id) {
                a.processed = true;
            }
        }
        Ok(())
    }

    async fn save_digest(&self, digest: &Digest) -> Result<()> {
        self.digests.lock().unwrap().push(digest.clone());
        Ok(())
    }

    async fn latest_digest(&self, region: &Region) -> Result<Option<Digest>> {
        Ok(self
            .digests
            .lock()
            .unwrap()
            .iter()
            .filter(|d| &d.region == region)
            .max_by_key(|d| d.created_at)
            .cloned())
    }

    async fn mark_digest_sent(&self, id: &str) -> Result<()> {
        self.sent.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn cleanup_old_articles(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut stored = self.articles.lock().unwrap();
        let before = stored.len();
        stored.retain(|a| a.fetched_at >= cutoff);
        Ok((before - stored.len()) as u64)
    }
}

/// Returns one article per source, titled after the source; sources named
/// `broken` fail.
#[derive(Default)]
pub struct StaticFetcher {
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl FeedFetcher for StaticFetcher {
    async fn fetch_source(&self, source: &FeedSource, region: &Region) -> Result<Vec<RawArticle>> {
        self.calls.lock().unwrap().push(source.name.clone());
        if source.name == "broken" {
            return Err(Error::Feed {
                url: source.url.clone(),
                reason: "http status 500".to_string(),
            });
        }
        let mut a = RawArticle::new(
            region.clone(),
            &source.name,
            format!("{} reports on {}", source.name, region),
            format!("{}/{}", source.url, region),
        );
        a.description = format!("{} description", source.name);
        a.published_at = Some(Utc::now());
        Ok(vec![a])
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    pub sends: Mutex<Vec<(ChatTarget, String)>>,
    /// Chats whose sends fail, with how many failures remain (`None`: always).
    pub failing: Mutex<HashMap<ChatTarget, Option<u32>>>,
    pub whoami_fails: bool,
}

impl FakeMessenger {
    pub fn fail_chat(&self, chat: ChatTarget, times: Option<u32>) {
        self.failing.lock().unwrap().insert(chat, times);
    }

    pub fn sent_html(&self) -> Vec<String> {
        self.sends.lock().unwrap().iter().map(|(_, h)| h.clone()).collect()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_html: true,
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, chat: &ChatTarget, html: &str) -> Result<MessageRef> {
        {
            let mut failing = self.failing.lock().unwrap();
            if let Some(remaining) = failing.get_mut(chat) {
                match remaining {
                    None => return Err(Error::External("chat not found".to_string())),
                    Some(0) => {}
                    Some(n) => {
                        *n -= 1;
                        return Err(Error::External("temporary failure".to_string()));
                    }
                }
            }
        }

        let mut sends = self.sends.lock().unwrap();
        sends.push((chat.clone(), html.to_string()));
        let chat_id = match chat {
            ChatTarget::Id(id) => *id,
            ChatTarget::Username(_) => ChatId(0),
        };
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(sends.len() as i32),
        })
    }

    async fn whoami(&self) -> Result<BotIdentity> {
        if self.whoami_fails {
            return Err(Error::External("Unauthorized".to_string()));
        }
        Ok(BotIdentity {
            id: 42,
            username: "world_news_bot".to_string(),
        })
    }
}
