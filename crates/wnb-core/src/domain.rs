use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Region token (`usa`, `europe`, `russia`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(pub String);

impl Region {
    pub const GLOBAL: &'static str = "global";

    /// Normalizes the token: trimmed, lowercase.
    pub fn new(token: impl AsRef<str>) -> Self {
        Self(token.as_ref().trim().to_lowercase())
    }

    pub fn global() -> Self {
        Self(Self::GLOBAL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_global(&self) -> bool {
        self.0 == Self::GLOBAL
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a delivered Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Delivery target: a numeric chat id or a public `@channel` username.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatTarget {
    Id(ChatId),
    Username(String),
}

impl ChatTarget {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(id) = raw.parse::<i64>() {
            return Some(Self::Id(ChatId(id)));
        }
        let name = raw.trim_start_matches('@');
        if name.is_empty() {
            return None;
        }
        Some(Self::Username(format!("@{name}")))
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatTarget::Id(id) => write!(f, "{}", id.0),
            ChatTarget::Username(name) => f.write_str(name),
        }
    }
}

/// One configured RSS/Atom source of a region.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FeedSource {
    #[serde(default = "default_source_name")]
    pub name: String,
    pub url: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_source_name() -> String {
    "Unknown".to_string()
}

pub(crate) fn default_language() -> String {
    "en".to_string()
}

/// An article as fetched from a feed, before any processing.
#[derive(Clone, Debug, PartialEq)]
pub struct RawArticle {
    pub id: String,
    pub region: Region,
    pub source_name: String,
    pub source_url: String,
    pub title: String,
    pub description: String,
    pub content: Option<String>,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub language: String,
    pub categories: Vec<String>,
    pub fetched_at: DateTime<Utc>,
    pub processed: bool,
}

impl RawArticle {
    pub fn new(
        region: Region,
        source_name: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            region,
            source_name: source_name.into(),
            source_url: String::new(),
            title: title.into(),
            description: String::new(),
            content: None,
            url: url.into(),
            published_at: None,
            language: default_language(),
            categories: Vec::new(),
            fetched_at: Utc::now(),
            processed: false,
        }
    }

    /// Timestamp used for "newest first" ordering.
    pub fn sort_time(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.fetched_at)
    }
}

/// A single story of a regional summary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub summary: String,
}

/// LLM output for one region.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub key_topics: Vec<String>,
    #[serde(default)]
    pub stories: Vec<Story>,
}

/// A globally significant event as returned by the LLM.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalEvent {
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub importance: String,
}

/// LLM output for the world digest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSummary {
    #[serde(default)]
    pub key_topics: Vec<String>,
    #[serde(default)]
    pub events: Vec<GlobalEvent>,
}

/// Part of the day a digest belongs to, in the region's local time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimePeriod {
    Morning,
    Afternoon,
    Evening,
}

impl TimePeriod {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => Self::Morning,
            12..=17 => Self::Afternoon,
            _ => Self::Evening,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
        }
    }

    /// Unknown values fall back to `Evening`.
    pub fn parse(s: &str) -> Self {
        match s {
            "morning" => Self::Morning,
            "afternoon" => Self::Afternoon,
            _ => Self::Evening,
        }
    }

    pub fn title_ru(self) -> &'static str {
        match self {
            Self::Morning => "Утренний дайджест",
            Self::Afternoon => "Дневной дайджест",
            Self::Evening => "Вечерний дайджест",
        }
    }
}

/// A processed, ready-to-format digest for one region (or `global`).
#[derive(Clone, Debug, PartialEq)]
pub struct Digest {
    pub id: String,
    pub region: Region,
    pub region_name_ru: String,
    /// Telegram HTML body (stories/events).
    pub summary_html: String,
    pub key_topics: Vec<String>,
    pub article_count: usize,
    pub sources_used: Vec<String>,
    pub article_ids: Vec<String>,
    pub covered_regions: Vec<Region>,
    pub time_period: TimePeriod,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Digest {
    pub fn new(region: Region, summary_html: impl Into<String>, time_period: TimePeriod) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            covered_regions: vec![region.clone()],
            region,
            region_name_ru: String::new(),
            summary_html: summary_html.into(),
            key_topics: Vec::new(),
            article_count: 0,
            sources_used: Vec::new(),
            article_ids: Vec::new(),
            time_period,
            created_at: Utc::now(),
            sent_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_tokens_are_normalized() {
        assert_eq!(Region::new(" Europe "), Region("europe".to_string()));
        assert!(Region::global().is_global());
    }

    #[test]
    fn chat_target_parsing() {
        assert_eq!(ChatTarget::parse("-1001"), Some(ChatTarget::Id(ChatId(-1001))));
        assert_eq!(
            ChatTarget::parse("worldnews"),
            Some(ChatTarget::Username("@worldnews".to_string()))
        );
        assert_eq!(
            ChatTarget::parse("@worldnews"),
            Some(ChatTarget::Username("@worldnews".to_string()))
        );
        assert_eq!(ChatTarget::parse("  "), None);
        assert_eq!(ChatTarget::parse("@"), None);
    }

    #[test]
    fn time_period_boundaries() {
        assert_eq!(TimePeriod::from_hour(4), TimePeriod::Evening);
        assert_eq!(TimePeriod::from_hour(5), TimePeriod::Morning);
        assert_eq!(TimePeriod::from_hour(11), TimePeriod::Morning);
        assert_eq!(TimePeriod::from_hour(12), TimePeriod::Afternoon);
        assert_eq!(TimePeriod::from_hour(17), TimePeriod::Afternoon);
        assert_eq!(TimePeriod::from_hour(18), TimePeriod::Evening);
        assert_eq!(TimePeriod::parse("bogus"), TimePeriod::Evening);
    }
}
