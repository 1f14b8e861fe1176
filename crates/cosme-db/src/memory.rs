//! In-process implementation of the store seams.
//!
//! A test double for [`crate::PgStore`]. It mirrors the Postgres semantics
//! (transition guards, ordering, monotonic `last_used`) so engine and
//! scheduler tests exercise the same contracts. Timestamps the caller does
//! not supply come from the injected [`Clock`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cosme_core::summaries::is_valid_summary_count;
use cosme_core::{
    Clock, Product, RunRecord, RunState, RunStatus, ScrapedProduct, SummaryEntry, TriggerSource,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::products::dedup_last_wins;
use crate::store::{CatalogStore, RunLedger, SummaryStore, UpsertSummary};
use crate::{DbError, ABANDONED_RUN_DETAIL};

#[derive(Debug, Default)]
struct State {
    products: HashMap<String, Product>,
    summaries: HashMap<String, SummaryEntry>,
    runs: BTreeMap<i64, RunRecord>,
    next_run_id: i64,
}

pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(State::default()),
        }
    }

    /// Replaces or inserts a product verbatim, including `last_used`.
    pub async fn insert_product(&self, product: Product) {
        let mut state = self.state.lock().await;
        state.products.insert(product.product_id.clone(), product);
    }

    pub async fn product_count(&self) -> usize {
        self.state.lock().await.products.len()
    }

    fn finish(
        run: &mut RunRecord,
        next: RunState,
        product_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let to = next.status();
        if !run.status().can_transition_to(to) {
            return Err(DbError::InvalidRunTransition {
                run_id: run.id,
                from: run.status(),
                to,
            });
        }
        run.state = next;
        if let Some(product_id) = product_id {
            run.product_id = Some(product_id.to_string());
        }
        run.finished_at = Some(at);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn upsert_products(&self, items: &[ScrapedProduct]) -> Result<UpsertSummary, DbError> {
        let batch = dedup_last_wins(items)?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let mut summary = UpsertSummary::default();

        for item in batch {
            match state.products.get_mut(&item.product_id) {
                Some(existing) => {
                    existing.refresh_from(item);
                    summary.updated += 1;
                }
                None => {
                    state
                        .products
                        .insert(item.product_id.clone(), Product::from_scraped(item, now));
                    summary.inserted += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn mark_used(&self, product_id: &str, at: DateTime<Utc>) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let product =
            state
                .products
                .get_mut(product_id)
                .ok_or_else(|| DbError::ProductNotFound {
                    product_id: product_id.to_string(),
                })?;

        if product.last_used.is_none_or(|current| at > current) {
            product.last_used = Some(at);
        }
        Ok(())
    }

    async fn list_candidates(&self, genre: &str, channel: &str) -> Result<Vec<Product>, DbError> {
        let state = self.state.lock().await;
        let mut candidates: Vec<Product> = state
            .products
            .values()
            .filter(|p| p.genre == genre && p.channel == channel)
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            a.scraped_rank
                .cmp(&b.scraped_rank)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        Ok(candidates)
    }

    async fn get_product(&self, product_id: &str) -> Result<Option<Product>, DbError> {
        Ok(self.state.lock().await.products.get(product_id).cloned())
    }
}

#[async_trait]
impl SummaryStore for MemoryStore {
    async fn get_summary(&self, product_id: &str) -> Result<Option<SummaryEntry>, DbError> {
        Ok(self.state.lock().await.summaries.get(product_id).cloned())
    }

    async fn put_summary(
        &self,
        product_id: &str,
        summaries: &[String],
        updated_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        if !is_valid_summary_count(summaries) {
            return Err(DbError::InvalidSummaryCount {
                product_id: product_id.to_string(),
                count: summaries.len(),
            });
        }

        let mut state = self.state.lock().await;
        if !state.products.contains_key(product_id) {
            return Err(DbError::ProductNotFound {
                product_id: product_id.to_string(),
            });
        }
        state.summaries.insert(
            product_id.to_string(),
            SummaryEntry {
                product_id: product_id.to_string(),
                summaries: summaries.to_vec(),
                updated_at,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl RunLedger for MemoryStore {
    async fn start(
        &self,
        genre: &str,
        channel: &str,
        trigger_source: TriggerSource,
        started_at: DateTime<Utc>,
    ) -> Result<RunRecord, DbError> {
        let mut state = self.state.lock().await;
        state.next_run_id += 1;
        let record = RunRecord {
            id: state.next_run_id,
            public_id: Uuid::new_v4(),
            genre: genre.to_string(),
            channel: channel.to_string(),
            trigger_source,
            product_id: None,
            state: RunState::Started,
            created_at: started_at,
            finished_at: None,
        };
        state.runs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn finish_success(
        &self,
        run_id: i64,
        product_id: &str,
        output_location: &str,
    ) -> Result<(), DbError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or(DbError::RunNotFound { run_id })?;
        Self::finish(
            run,
            RunState::Success {
                output_location: output_location.to_string(),
            },
            Some(product_id),
            now,
        )
    }

    async fn finish_error(
        &self,
        run_id: i64,
        product_id: Option<&str>,
        error_detail: &str,
    ) -> Result<(), DbError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or(DbError::RunNotFound { run_id })?;
        Self::finish(
            run,
            RunState::Error {
                error_detail: error_detail.to_string(),
            },
            product_id,
            now,
        )
    }

    async fn get_run(&self, run_id: i64) -> Result<Option<RunRecord>, DbError> {
        Ok(self.state.lock().await.runs.get(&run_id).cloned())
    }

    async fn list_recent(
        &self,
        limit: usize,
        status: Option<RunStatus>,
    ) -> Result<Vec<RunRecord>, DbError> {
        let state = self.state.lock().await;
        let mut runs: Vec<RunRecord> = state
            .runs
            .values()
            .filter(|run| status.is_none_or(|s| run.status() == s))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn sweep_stale(&self, started_before: DateTime<Utc>) -> Result<Vec<i64>, DbError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let mut swept = Vec::new();
        for run in state.runs.values_mut() {
            if run.status() == RunStatus::Started && run.created_at < started_before {
                run.state = RunState::Error {
                    error_detail: ABANDONED_RUN_DETAIL.to_string(),
                };
                run.finished_at = Some(now);
                swept.push(run.id);
            }
        }
        Ok(swept)
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
