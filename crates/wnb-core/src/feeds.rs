//! Feed retrieval: HTTP download, RSS/Atom parsing and per-region fan-out.

use std::{collections::BTreeMap, sync::OnceLock, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use regex::Regex;
use tracing::{error, info, warn};

use crate::{
    config::FeedsConfig,
    domain::{FeedSource, RawArticle, Region},
    errors::Error,
    ports::FeedFetcher,
    utils::truncate_chars,
    Result,
};

const MAX_DESCRIPTION_CHARS: usize = 1000;
const MAX_CATEGORIES: usize = 5;

/// Downloads feeds over HTTP(S) and parses them with `feed-rs`.
#[derive(Clone, Debug)]
pub struct HttpFeedFetcher {
    http: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(cfg: &FeedsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(cfg.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self { http })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let feed_err = |reason: String| Error::Feed {
            url: url.to_string(),
            reason,
        };

        let resp = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                feed_err("timeout".to_string())
            } else {
                feed_err(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(feed_err(format!("http status {status}")));
        }

        let bytes = resp.bytes().await.map_err(|e| feed_err(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch_source(&self, source: &FeedSource, region: &Region) -> Result<Vec<RawArticle>> {
        let body = self.download(&source.url).await?;
        let articles = parse_feed(&body, source, region)?;
        if articles.is_empty() {
            warn!(source = %source.name, "no entries");
        } else {
            info!(source = %source.name, count = articles.len(), "parsed articles");
        }
        Ok(articles)
    }
}

/// Parse a feed document into articles of `region`.
///
/// Entries without a title or a link are skipped.
pub fn parse_feed(body: &[u8], source: &FeedSource, region: &Region) -> Result<Vec<RawArticle>> {
    let feed = feed_rs::parser::parse(body).map_err(|e| Error::Feed {
        url: source.url.clone(),
        reason: format!("parse error: {e}"),
    })?;

    let fetched_at = Utc::now();
    let mut out = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let title = entry
            .title
            .as_ref()
            .map(|t| clean_html(&t.content))
            .unwrap_or_default();
        let link = entry
            .links
            .first()
            .map(|l| l.href.trim().to_string())
            .unwrap_or_default();
        if title.is_empty() || link.is_empty() {
            continue;
        }

        let content = entry
            .content
            .as_ref()
            .and_then(|c| c.body.as_deref())
            .map(clean_html)
            .filter(|s| !s.is_empty());

        let summary = entry
            .summary
            .as_ref()
            .map(|s| clean_html(&s.content))
            .unwrap_or_default();
        let description = if summary.is_empty() {
            content.clone().unwrap_or_default()
        } else {
            summary
        };

        let categories = entry
            .categories
            .iter()
            .map(|c| c.term.trim().to_string())
            .filter(|t| !t.is_empty())
            .take(MAX_CATEGORIES)
            .collect();

        out.push(RawArticle {
            id: uuid::Uuid::new_v4().to_string(),
            region: region.clone(),
            source_name: source.name.clone(),
            source_url: source.url.clone(),
            title,
            description: truncate_chars(&description, MAX_DESCRIPTION_CHARS),
            content,
            url: link,
            published_at: entry.published.or(entry.updated),
            language: source.language.clone(),
            categories,
            fetched_at,
            processed: false,
        });
    }

    Ok(out)
}

/// Fetch every source of a region concurrently.
///
/// A failing source is logged and contributes nothing.
pub async fn fetch_region(
    fetcher: &dyn FeedFetcher,
    region: &Region,
    sources: &[FeedSource],
) -> Vec<RawArticle> {
    let results = join_all(
        sources
            .iter()
            .map(|source| async move { (source, fetcher.fetch_source(source, region).await) }),
    )
    .await;

    let mut all = Vec::new();
    for (source, res) in results {
        match res {
            Ok(mut articles) => all.append(&mut articles),
            Err(e) => error!(region = %region, source = %source.name, "error fetching source: {e}"),
        }
    }

    info!(region = %region, count = all.len(), "fetched region");
    all
}

/// Fetch several regions concurrently. Regions whose sources cannot be loaded
/// yield an empty list.
pub async fn fetch_all_regions(
    fetcher: &dyn FeedFetcher,
    regions: &[(Region, Result<Vec<FeedSource>>)],
) -> BTreeMap<Region, Vec<RawArticle>> {
    let results = join_all(regions.iter().map(|(region, sources)| async move {
        let articles = match sources {
            Ok(sources) => fetch_region(fetcher, region, sources).await,
            Err(e) => {
                error!(region = %region, "cannot load sources: {e}");
                Vec::new()
            }
        };
        (region.clone(), articles)
    }))
    .await;

    results.into_iter().collect()
}

/// Strip tags, decode the common entities and collapse whitespace.
pub fn clean_html(text: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    if text.is_empty() {
        return String::new();
    }

    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"));
    let stripped = tag_re.replace_all(text, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
