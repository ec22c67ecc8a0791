//! SQLite persistence for articles and digests (sqlx).

mod sqlite_pool;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::info;

pub use sqlite_pool::SqlitePoolManager;
use wnb_core::{
    domain::{Digest, RawArticle, Region, TimePeriod},
    errors::Error,
    ports::NewsStore,
    Result,
};

#[derive(Clone)]
pub struct SqliteNewsStore {
    pool_manager: SqlitePoolManager,
}

fn storage_err(e: sqlx::Error) -> Error {
    Error::Storage(e.to_string())
}

impl SqliteNewsStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool_manager = SqlitePoolManager::open(path).await.map_err(storage_err)?;
        let store = Self { pool_manager };
        store.init().await.map_err(storage_err)?;
        Ok(store)
    }

    async fn init(&self) -> std::result::Result<(), sqlx::Error> {
        let pool = self.pool_manager.pool();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS raw_articles (
                id TEXT PRIMARY KEY,
                region TEXT NOT NULL,
                source_name TEXT NOT NULL,
                source_url TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                content TEXT,
                url TEXT NOT NULL UNIQUE,
                published_at TEXT,
                language TEXT NOT NULL,
                categories TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_raw_articles_region_fetched ON raw_articles(region, fetched_at)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS digests (
                id TEXT PRIMARY KEY,
                region TEXT NOT NULL,
                region_name_ru TEXT NOT NULL,
                summary_html TEXT NOT NULL,
                key_topics TEXT NOT NULL,
                article_count INTEGER NOT NULL,
                sources_used TEXT NOT NULL,
                article_ids TEXT NOT NULL,
                covered_regions TEXT NOT NULL,
                time_period TEXT NOT NULL,
                created_at TEXT NOT NULL,
                sent_at TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_digests_region_created ON digests(region, created_at)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

fn article_from_row(row: &SqliteRow) -> Result<RawArticle> {
    let categories: String = row.try_get("categories").map_err(storage_err)?;
    Ok(RawArticle {
        id: row.try_get("id").map_err(storage_err)?,
        region: Region::new(row.try_get::<String, _>("region").map_err(storage_err)?),
        source_name: row.try_get("source_name").map_err(storage_err)?,
        source_url: row.try_get("source_url").map_err(storage_err)?,
        title: row.try_get("title").map_err(storage_err)?,
        description: row.try_get("description").map_err(storage_err)?,
        content: row.try_get("content").map_err(storage_err)?,
        url: row.try_get("url").map_err(storage_err)?,
        published_at: row.try_get("published_at").map_err(storage_err)?,
        language: row.try_get("language").map_err(storage_err)?,
        categories: serde_json::from_str(&categories)?,
        fetched_at: row.try_get("fetched_at").map_err(storage_err)?,
        processed: row.try_get("processed").map_err(storage_err)?,
    })
}

fn digest_from_row(row: &SqliteRow) -> Result<Digest> {
    let json = |col: &str| -> Result<Vec<String>> {
        let raw: String = row.try_get(col).map_err(storage_err)?;
        Ok(serde_json::from_str(&raw)?)
    };
    let article_count: i64 = row.try_get("article_count").map_err(storage_err)?;
    let time_period: String = row.try_get("time_period").map_err(storage_err)?;

    Ok(Digest {
        id: row.try_get("id").map_err(storage_err)?,
        region: Region::new(row.try_get::<String, _>("region").map_err(storage_err)?),
        region_name_ru: row.try_get("region_name_ru").map_err(storage_err)?,
        summary_html: row.try_get("summary_html").map_err(storage_err)?,
        key_topics: json("key_topics")?,
        article_count: usize::try_from(article_count).unwrap_or_default(),
        sources_used: json("sources_used")?,
        article_ids: json("article_ids")?,
        covered_regions: json("covered_regions")?.into_iter().map(Region::new).collect(),
        time_period: TimePeriod::parse(&time_period),
        created_at: row.try_get("created_at").map_err(storage_err)?,
        sent_at: row.try_get("sent_at").map_err(storage_err)?,
    })
}

#[async_trait]
impl NewsStore for SqliteNewsStore {
    async fn save_articles(&self, articles: &[RawArticle]) -> Result<usize> {
        let pool = self.pool_manager.pool();
        let mut tx = pool.begin().await.map_err(storage_err)?;
        let mut saved = 0usize;

        for a in articles {
            let res = sqlx::query(
                r#"
                INSERT OR IGNORE INTO raw_articles (id, region, source_name, source_url, title, description, content, url, published_at, language, categories, fetched_at, processed)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&a.id)
            .bind(a.region.as_str())
            .bind(&a.source_name)
            .bind(&a.source_url)
            .bind(&a.title)
            .bind(&a.description)
            .bind(&a.content)
            .bind(&a.url)
            .bind(a.published_at)
            .bind(&a.language)
            .bind(serde_json::to_string(&a.categories)?)
            .bind(a.fetched_at)
            .bind(a.processed)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
            saved += res.rows_affected() as usize;
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(saved)
    }

    async fn articles_for_region(
        &self,
        region: &Region,
        hours_back: i64,
        unprocessed_only: bool,
    ) -> Result<Vec<RawArticle>> {
        let since: DateTime<Utc> = Utc::now() - Duration::hours(hours_back);
        let mut sql = String::from("SELECT * FROM raw_articles WHERE region = ? AND fetched_at >= ?");
        if unprocessed_only {
            sql.push_str(" AND processed = 0");
        }
        sql.push_str(" ORDER BY published_at DESC");

        let rows = sqlx::query(&sql)
            .bind(region.as_str())
            .bind(since)
            .fetch_all(self.pool_manager.pool())
            .await
            .map_err(storage_err)?;

        rows.iter().map(article_from_row).collect()
    }

    async fn mark_articles_processed(&self, ids: &[String]) -> Result<()> {
        let pool = self.pool_manager.pool();
        let mut tx = pool.begin().await.map_err(storage_err)?;
        for id in ids {
            sqlx::query("UPDATE raw_articles SET processed = 1 WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn save_digest(&self, digest: &Digest) -> Result<()> {
        let covered: Vec<&str> = digest.covered_regions.iter().map(Region::as_str).collect();
        sqlx::query(
            r#"
            INSERT INTO digests (id, region, region_name_ru, summary_html, key_topics, article_count, sources_used, article_ids, covered_regions, time_period, created_at, sent_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&digest.id)
        .bind(digest.region.as_str())
        .bind(&digest.region_name_ru)
        .bind(&digest.summary_html)
        .bind(serde_json::to_string(&digest.key_topics)?)
        .bind(digest.article_count as i64)
        .bind(serde_json::to_string(&digest.sources_used)?)
        .bind(serde_json::to_string(&digest.article_ids)?)
        .bind(serde_json::to_string(&covered)?)
        .bind(digest.time_period.as_str())
        .bind(digest.created_at)
        .bind(digest.sent_at)
        .execute(self.pool_manager.pool())
        .await
        .map_err(storage_err)?;

        info!(region = %digest.region, id = %digest.id, "saved digest");
        Ok(())
    }

    async fn latest_digest(&self, region: &Region) -> Result<Option<Digest>> {
        let row = sqlx::query("SELECT * FROM digests WHERE region = ? ORDER BY created_at DESC LIMIT 1")
            .bind(region.as_str())
            .fetch_optional(self.pool_manager.pool())
            .await
            .map_err(storage_err)?;

        row.as_ref().map(digest_from_row).transpose()
    }

    async fn mark_digest_sent(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE digests SET sent_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool_manager.pool())
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn cleanup_old_articles(&self, days: i64) -> Result<u64> {
        let cutoff: DateTime<Utc> = Utc::now() - Duration::days(days);
        let result = sqlx::query("DELETE FROM raw_articles WHERE fetched_at < ?")
            .bind(cutoff)
            .execute(self.pool_manager.pool())
            .await
            .map_err(storage_err)?;

        let removed = result.rows_affected();
        info!(removed, days, "cleaned up old articles");
        Ok(removed)
    }
}
