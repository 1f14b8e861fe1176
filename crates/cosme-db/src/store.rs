//! Store seams consumed by the run engine.
//!
//! [`PgStore`] backs them with Postgres; [`crate::MemoryStore`] backs them
//! with process memory as a test double.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cosme_core::{Product, RunRecord, RunStatus, ScrapedProduct, SummaryEntry, TriggerSource};
use serde::Serialize;
use sqlx::PgPool;

use crate::{products, runs, summaries, DbError};

/// Outcome of one [`CatalogStore::upsert_products`] batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// Durable record of known products and when each was last used.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Inserts unseen ids and refreshes scrape-derived fields of known ones.
    /// `first_seen` and `last_used` are preserved. Atomic per batch.
    async fn upsert_products(&self, items: &[ScrapedProduct]) -> Result<UpsertSummary, DbError>;

    /// Moves `last_used` forward to `at`; never backwards.
    async fn mark_used(&self, product_id: &str, at: DateTime<Utc>) -> Result<(), DbError>;

    /// Products for the pair ordered by `(scraped_rank, product_id)`.
    async fn list_candidates(&self, genre: &str, channel: &str) -> Result<Vec<Product>, DbError>;

    async fn get_product(&self, product_id: &str) -> Result<Option<Product>, DbError>;
}

/// Durable cache of review summaries keyed by product.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn get_summary(&self, product_id: &str) -> Result<Option<SummaryEntry>, DbError>;

    /// Overwrites the entry for `product_id` in place.
    async fn put_summary(
        &self,
        product_id: &str,
        summaries: &[String],
        updated_at: DateTime<Utc>,
    ) -> Result<(), DbError>;
}

/// Durable record of pipeline executions.
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Opens a run in `started` with `created_at = started_at`. The caller
    /// supplies the time so the ledger and the catalog share one clock.
    async fn start(
        &self,
        genre: &str,
        channel: &str,
        trigger_source: TriggerSource,
        started_at: DateTime<Utc>,
    ) -> Result<RunRecord, DbError>;

    async fn finish_success(
        &self,
        run_id: i64,
        product_id: &str,
        output_location: &str,
    ) -> Result<(), DbError>;

    async fn finish_error(
        &self,
        run_id: i64,
        product_id: Option<&str>,
        error_detail: &str,
    ) -> Result<(), DbError>;

    async fn get_run(&self, run_id: i64) -> Result<Option<RunRecord>, DbError>;

    /// Newest first.
    async fn list_recent(
        &self,
        limit: usize,
        status: Option<RunStatus>,
    ) -> Result<Vec<RunRecord>, DbError>;

    /// Finalizes runs left `started` since before `started_before` as
    /// abandoned errors and returns their ids.
    async fn sweep_stale(&self, started_before: DateTime<Utc>) -> Result<Vec<i64>, DbError>;
}

/// Postgres-backed implementation of every store seam.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn upsert_products(&self, items: &[ScrapedProduct]) -> Result<UpsertSummary, DbError> {
        let (inserted, updated) = products::upsert_products(&self.pool, items).await?;
        Ok(UpsertSummary { inserted, updated })
    }

    async fn mark_used(&self, product_id: &str, at: DateTime<Utc>) -> Result<(), DbError> {
        products::mark_used(&self.pool, product_id, at).await
    }

    async fn list_candidates(&self, genre: &str, channel: &str) -> Result<Vec<Product>, DbError> {
        let rows = products::list_candidates(&self.pool, genre, channel).await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn get_product(&self, product_id: &str) -> Result<Option<Product>, DbError> {
        let row = products::get_product(&self.pool, product_id).await?;
        Ok(row.map(Product::from))
    }
}

#[async_trait]
impl SummaryStore for PgStore {
    async fn get_summary(&self, product_id: &str) -> Result<Option<SummaryEntry>, DbError> {
        let row = summaries::get_summary(&self.pool, product_id).await?;
        Ok(row.map(SummaryEntry::from))
    }

    async fn put_summary(
        &self,
        product_id: &str,
        texts: &[String],
        updated_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        summaries::put_summary(&self.pool, product_id, texts, updated_at).await
    }
}

#[async_trait]
impl RunLedger for PgStore {
    async fn start(
        &self,
        genre: &str,
        channel: &str,
        trigger_source: TriggerSource,
        started_at: DateTime<Utc>,
    ) -> Result<RunRecord, DbError> {
        let row = runs::start_run(&self.pool, genre, channel, trigger_source, started_at).await?;
        RunRecord::try_from(row)
    }

    async fn finish_success(
        &self,
        run_id: i64,
        product_id: &str,
        output_location: &str,
    ) -> Result<(), DbError> {
        runs::finish_run_success(&self.pool, run_id, product_id, output_location).await
    }

    async fn finish_error(
        &self,
        run_id: i64,
        product_id: Option<&str>,
        error_detail: &str,
    ) -> Result<(), DbError> {
        runs::finish_run_error(&self.pool, run_id, product_id, error_detail).await
    }

    async fn get_run(&self, run_id: i64) -> Result<Option<RunRecord>, DbError> {
        runs::get_run(&self.pool, run_id)
            .await?
            .map(RunRecord::try_from)
            .transpose()
    }

    async fn list_recent(
        &self,
        limit: usize,
        status: Option<RunStatus>,
    ) -> Result<Vec<RunRecord>, DbError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        runs::list_recent_runs(&self.pool, limit, status)
            .await?
            .into_iter()
            .map(RunRecord::try_from)
            .collect()
    }

    async fn sweep_stale(&self, started_before: DateTime<Utc>) -> Result<Vec<i64>, DbError> {
        runs::sweep_stale_runs(&self.pool, started_before).await
    }
}
