//! One aggregation cycle end to end: pipeline, delivery, housekeeping.

use std::{sync::Arc, time::Duration};

use tracing::{error, info, warn};

use crate::{
    aggregator::NewsPipeline,
    config::AppConfig,
    delivery::DigestSender,
    domain::{Digest, Region},
    formatting::DigestFormatter,
    ports::NewsStore,
    utils::truncate_chars,
    Result,
};

/// Regional digests go out in this order; other regions follow in
/// configuration order.
pub const REGION_ORDER: [&str; 8] = [
    "russia",
    "usa",
    "europe",
    "china",
    "japan",
    "india",
    "middle_east",
    "latam",
];

const PREVIEW_ARTICLES: usize = 5;
const PREVIEW_TITLE_CHARS: usize = 60;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sent: usize,
    pub total: usize,
    pub purged_articles: u64,
}

impl CycleReport {
    /// A cycle fails only when digests were produced and none went out.
    pub fn succeeded(&self) -> bool {
        self.total == 0 || self.sent > 0
    }
}

#[derive(Clone)]
pub struct NewsApp {
    app: Arc<AppConfig>,
    pipeline: NewsPipeline,
    sender: DigestSender,
    store: Arc<dyn NewsStore>,
    formatter: DigestFormatter,
}

impl NewsApp {
    pub fn new(
        app: Arc<AppConfig>,
        pipeline: NewsPipeline,
        sender: DigestSender,
        store: Arc<dyn NewsStore>,
        formatter: DigestFormatter,
    ) -> Self {
        Self {
            app,
            pipeline,
            sender,
            store,
            formatter,
        }
    }

    /// Process every configured region, deliver the world digest first and the
    /// regional ones after it, then purge old articles.
    pub async fn run_cycle(&self) -> CycleReport {
        info!("starting news processing cycle");
        let (global, mut regional) = self
            .pipeline
            .process_all_with_global(&self.app.regions)
            .await;

        let mut queue: Vec<Digest> = Vec::new();
        queue.extend(global);
        for region in delivery_order(&self.app.regions) {
            if let Some(Some(digest)) = regional.remove(&region) {
                queue.push(digest);
            }
        }

        let delay = Duration::from_millis(self.app.telegram.delay_between_messages_ms);
        let mut report = CycleReport {
            total: queue.len(),
            ..CycleReport::default()
        };
        for (i, digest) in queue.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.sender.send_digest(digest).await {
                report.sent += 1;
            } else {
                warn!(region = %digest.region, "digest not delivered");
            }
        }
        info!(sent = report.sent, total = report.total, "sent {}/{} digests", report.sent, report.total);

        match self
            .store
            .cleanup_old_articles(self.app.storage.retention_days)
            .await
        {
            Ok(n) => {
                report.purged_articles = n;
                if n > 0 {
                    info!(purged = n, "removed old articles");
                }
            }
            Err(e) => error!("cleanup failed: {e}"),
        }

        info!("news processing cycle completed");
        report
    }

    /// Run the pipeline for one region and deliver its digest.
    pub async fn process_single(&self, region: &Region) -> bool {
        match self.pipeline.process_region(region).await {
            Ok(Some(digest)) => self.sender.send_digest(&digest).await,
            Ok(None) => {
                warn!(region = %region, "nothing to deliver");
                false
            }
            Err(e) => {
                error!(region = %region, "processing failed: {e}");
                let name = self.app.region_info(region).name_ru;
                let notice = self.formatter.format_error(region, &name, &e.to_string());
                self.sender.send_status(&notice).await;
                false
            }
        }
    }

    /// Fetch one region's feeds and print a short preview. Nothing is stored
    /// or delivered.
    pub async fn test_rss(&self, region: &Region) -> Result<usize> {
        println!("Testing RSS parsing for {region}...");
        let articles = self.pipeline.fetch_only(region).await?;
        println!("Fetched {} articles", articles.len());
        for a in articles.iter().take(PREVIEW_ARTICLES) {
            println!(
                "\n- {}: {}...",
                a.source_name,
                truncate_chars(&a.title, PREVIEW_TITLE_CHARS)
            );
        }
        Ok(articles.len())
    }

    /// Most recent stored digest for `region`.
    pub async fn last_digest(&self, region: &Region) -> Result<Option<Digest>> {
        self.store.latest_digest(region).await
    }

    pub async fn test_telegram(&self) -> bool {
        match self.sender.test_connection().await {
            Ok(me) => {
                println!("Telegram connection successful! Bot: @{}", me.username);
                true
            }
            Err(e) => {
                error!("failed to connect to telegram: {e}");
                println!("Telegram connection failed!");
                false
            }
        }
    }
}

/// `REGION_ORDER` first, then any remaining configured regions.
pub fn delivery_order(configured: &[Region]) -> Vec<Region> {
    let mut out: Vec<Region> = REGION_ORDER
        .iter()
        .map(Region::new)
        .filter(|r| configured.contains(r))
        .collect();
    for region in configured {
        if !out.contains(region) {
            out.push(region.clone());
        }
    }
    out
}
