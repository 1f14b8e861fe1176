//! End-to-end execution of one run.
//!
//! A run moves through [`RunPhase`]s
//! `Created → Selecting → Summarizing → Delegating → Finalizing → Done`,
//! dropping to `Failed` from any of them. Every failure after the ledger
//! entry exists is written back to the ledger; [`Orchestrator::run`] only
//! returns `Err` when that entry cannot be created at all.
//!
//! `mark_used` is the last catalog write and happens only after the upload
//! has produced a storage location, immediately before the ledger success
//! write. A failed run never burns a catalog slot.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use cosme_core::{Clock, Product, RunTarget, TriggerSource};
use cosme_db::{CatalogStore, DbError, RunLedger, SummaryStore};
use serde::Serialize;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::collaborators::{Notifier, Renderer, Summarizer, Uploader};
use crate::lock::{RunGuard, RunLocks};
use crate::selector::{SelectError, Selector};
use crate::summary_cache::{SummaryCache, SummaryCacheError};

const ABORTED_DETAIL: &str = "aborted: run was cancelled before it finished";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to create run ledger entry: {0}")]
    Ledger(#[from] DbError),
}

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Summaries(#[from] SummaryCacheError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Created,
    Selecting,
    Summarizing,
    Delegating,
    Finalizing,
    Done,
    Failed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunPhase::Created => "created",
            RunPhase::Selecting => "selecting",
            RunPhase::Summarizing => "summarizing",
            RunPhase::Delegating => "delegating",
            RunPhase::Finalizing => "finalizing",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Stable classification of a failed run; the prefix of its error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoEligibleProduct,
    SummarizerFailed,
    RendererFailed,
    UploaderFailed,
    CatalogCommitFailed,
    StoreFailed,
    Aborted,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::NoEligibleProduct => "no_eligible_product",
            FailureKind::SummarizerFailed => "summarizer_failed",
            FailureKind::RendererFailed => "renderer_failed",
            FailureKind::UploaderFailed => "uploader_failed",
            FailureKind::CatalogCommitFailed => "catalog_commit_failed",
            FailureKind::StoreFailed => "store_failed",
            FailureKind::Aborted => "aborted",
        }
    }

    /// Formats the ledger error detail, e.g. `renderer_failed: exit status 1`.
    #[must_use]
    pub fn detail(self, message: &str) -> String {
        format!("{}: {message}", self.as_str())
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunOutcome {
    Success {
        product_id: String,
        output_location: String,
    },
    Error {
        kind: FailureKind,
        product_id: Option<String>,
        error_detail: String,
    },
}

impl RunOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }
}

/// What a [`Notifier`] is told about a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunNotice {
    pub run_id: i64,
    pub genre: String,
    pub channel: String,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: i64,
    pub public_id: Uuid,
    pub genre: String,
    pub channel: String,
    pub trigger_source: TriggerSource,
    pub created_at: DateTime<Utc>,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewReport {
    pub product: Product,
    pub summaries: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub cooldown: Duration,
    pub summary_freshness: Duration,
}

impl OrchestratorSettings {
    #[must_use]
    pub fn from_app_config(config: &cosme_core::AppConfig) -> Self {
        Self {
            cooldown: config.cooldown(),
            summary_freshness: config.summary_freshness(),
        }
    }
}

#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogStore>,
    pub summaries: Arc<dyn SummaryStore>,
    pub ledger: Arc<dyn RunLedger>,
}

impl Stores {
    /// Uses one backend for all three seams.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: CatalogStore + SummaryStore + RunLedger + 'static,
    {
        Self {
            catalog: store.clone(),
            summaries: store.clone(),
            ledger: store,
        }
    }
}

#[derive(Clone)]
pub struct Collaborators {
    pub summarizer: Arc<dyn Summarizer>,
    pub renderer: Arc<dyn Renderer>,
    pub uploader: Arc<dyn Uploader>,
    pub notifier: Arc<dyn Notifier>,
}

/// A ledger entry in `started` that must be finalized exactly once.
///
/// Finalizing consumes the token. If it is dropped unfinalized (the run
/// future was cancelled) a best-effort `aborted` error is written in the
/// background; a crash is left for the stale-run sweep.
struct ActiveRun {
    run_id: i64,
    ledger: Arc<dyn RunLedger>,
    finalized: bool,
}

impl ActiveRun {
    fn new(run_id: i64, ledger: Arc<dyn RunLedger>) -> Self {
        Self {
            run_id,
            ledger,
            finalized: false,
        }
    }

    async fn succeed(mut self, product_id: &str, output_location: &str) -> Result<(), DbError> {
        let result = self
            .ledger
            .finish_success(self.run_id, product_id, output_location)
            .await;
        self.finalized = true;
        result
    }

    async fn fail(mut self, product_id: Option<&str>, error_detail: &str) -> Result<(), DbError> {
        let result = self
            .ledger
            .finish_error(self.run_id, product_id, error_detail)
            .await;
        self.finalized = true;
        result
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }

        let run_id = self.run_id;
        tracing::warn!(run_id, "run dropped before finalizing; recording abort");
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::error!(run_id, "no runtime to record abort; left for stale-run sweep");
            return;
        };
        let ledger = Arc::clone(&self.ledger);
        handle.spawn(async move {
            if let Err(e) = ledger.finish_error(run_id, None, ABORTED_DETAIL).await {
                tracing::warn!(run_id, error = %e, "failed to record aborted run");
            }
        });
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    stores: Stores,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    locks: RunLocks,
    settings: OrchestratorSettings,
    selector: Selector,
    cache: SummaryCache,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        stores: Stores,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        settings: OrchestratorSettings,
    ) -> Self {
        let selector = Selector::new(Arc::clone(&stores.catalog), Arc::clone(&clock));
        let cache = SummaryCache::new(Arc::clone(&stores.summaries), Arc::clone(&clock));
        Self {
            stores,
            collaborators,
            clock,
            locks: RunLocks::new(),
            settings,
            selector,
            cache,
        }
    }

    /// Shares an existing lock table, e.g. between the scheduler and the API.
    #[must_use]
    pub fn with_locks(mut self, locks: RunLocks) -> Self {
        self.locks = locks;
        self
    }

    #[must_use]
    pub fn locks(&self) -> &RunLocks {
        &self.locks
    }

    #[must_use]
    pub fn settings(&self) -> OrchestratorSettings {
        self.settings
    }

    /// Executes one run for `target`, holding the pair's run lock throughout.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Ledger`] only if the run cannot be
    /// recorded as started. Every later failure is captured in the ledger
    /// and in the returned report's outcome.
    pub async fn run(
        &self,
        target: &RunTarget,
        trigger_source: TriggerSource,
    ) -> Result<RunReport, OrchestratorError> {
        let guard = self.locks.acquire(target).await;
        self.run_with_guard(guard, trigger_source).await
    }

    /// Executes one run under a lock the caller already holds, typically from
    /// [`RunLocks::try_acquire`] on [`Orchestrator::locks`]. The guard is
    /// released when the run finishes.
    ///
    /// # Errors
    ///
    /// Same as [`Orchestrator::run`].
    pub async fn run_with_guard(
        &self,
        guard: RunGuard,
        trigger_source: TriggerSource,
    ) -> Result<RunReport, OrchestratorError> {
        let target = guard.target();

        let record = self
            .stores
            .ledger
            .start(
                &target.genre,
                &target.channel,
                trigger_source,
                self.clock.now(),
            )
            .await?;
        let run_id = record.id;
        let span = tracing::info_span!(
            "run",
            run_id,
            genre = %target.genre,
            channel = %target.channel,
            trigger = %trigger_source,
        );

        let active = ActiveRun::new(run_id, Arc::clone(&self.stores.ledger));
        let outcome = async {
            enter(RunPhase::Created);
            let outcome = self.drive(active, target).await;
            match &outcome {
                RunOutcome::Success {
                    product_id,
                    output_location,
                } => {
                    enter(RunPhase::Done);
                    tracing::info!(%product_id, %output_location, "run succeeded");
                }
                RunOutcome::Error { error_detail, .. } => {
                    enter(RunPhase::Failed);
                    tracing::warn!(%error_detail, "run failed");
                }
            }
            self.notify(RunNotice {
                run_id,
                genre: target.genre.clone(),
                channel: target.channel.clone(),
                outcome: outcome.clone(),
            })
            .await;
            outcome
        }
        .instrument(span)
        .await;

        Ok(RunReport {
            run_id,
            public_id: record.public_id,
            genre: record.genre,
            channel: record.channel,
            trigger_source,
            created_at: record.created_at,
            outcome,
        })
    }

    async fn drive(&self, active: ActiveRun, target: &RunTarget) -> RunOutcome {
        enter(RunPhase::Selecting);
        let product = match self
            .selector
            .select(&target.genre, &target.channel, self.settings.cooldown)
            .await
        {
            Ok(product) => product,
            Err(e @ SelectError::NoEligibleProduct { .. }) => {
                return fail(active, None, FailureKind::NoEligibleProduct, &e.to_string()).await;
            }
            Err(SelectError::Store(e)) => {
                return fail(active, None, FailureKind::StoreFailed, &e.to_string()).await;
            }
        };
        let product_id = product.product_id.as_str();

        enter(RunPhase::Summarizing);
        let summaries = match self
            .cache
            .get_or_refresh(
                &product,
                self.settings.summary_freshness,
                self.collaborators.summarizer.as_ref(),
            )
            .await
        {
            Ok(summaries) => summaries,
            Err(SummaryCacheError::Store(e)) => {
                return fail(active, Some(product_id), FailureKind::StoreFailed, &e.to_string())
                    .await;
            }
            Err(SummaryCacheError::Summarizer(e)) => {
                return fail(
                    active,
                    Some(product_id),
                    FailureKind::SummarizerFailed,
                    &e.to_string(),
                )
                .await;
            }
            Err(e @ SummaryCacheError::EmptySummaries { .. }) => {
                return fail(
                    active,
                    Some(product_id),
                    FailureKind::SummarizerFailed,
                    &e.to_string(),
                )
                .await;
            }
        };

        enter(RunPhase::Delegating);
        let artifact = match self.collaborators.renderer.render(&product, &summaries).await {
            Ok(artifact) => artifact,
            Err(e) => {
                return fail(
                    active,
                    Some(product_id),
                    FailureKind::RendererFailed,
                    &e.to_string(),
                )
                .await;
            }
        };
        let output_location = match self.collaborators.uploader.upload(&artifact).await {
            Ok(location) => location,
            Err(e) => {
                return fail(
                    active,
                    Some(product_id),
                    FailureKind::UploaderFailed,
                    &e.to_string(),
                )
                .await;
            }
        };

        enter(RunPhase::Finalizing);
        let used_at = self.clock.now();
        if let Err(e) = self.stores.catalog.mark_used(product_id, used_at).await {
            return fail(
                active,
                Some(product_id),
                FailureKind::CatalogCommitFailed,
                &e.to_string(),
            )
            .await;
        }

        if let Err(e) = active.succeed(product_id, &output_location).await {
            // The product is already marked used; the ledger entry stays
            // `started` until the sweep finalizes it.
            tracing::error!(%product_id, error = %e, "failed to record run success");
            return RunOutcome::Error {
                kind: FailureKind::StoreFailed,
                product_id: Some(product_id.to_string()),
                error_detail: FailureKind::StoreFailed
                    .detail(&format!("could not record success: {e}")),
            };
        }

        RunOutcome::Success {
            product_id: product_id.to_string(),
            output_location,
        }
    }

    async fn notify(&self, notice: RunNotice) {
        if let Err(e) = self.collaborators.notifier.notify(&notice).await {
            tracing::warn!(run_id = notice.run_id, error = %e, "notification failed");
        }
    }

    /// Selects the product a run would use now and fetches its summaries
    /// through the cache. Creates no ledger entry, renders nothing and
    /// marks nothing used.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewError`] when selection or summarization fails.
    pub async fn preview(&self, target: &RunTarget) -> Result<PreviewReport, PreviewError> {
        let product = self
            .selector
            .select(&target.genre, &target.channel, self.settings.cooldown)
            .await?;
        let summaries = self
            .cache
            .get_or_refresh(
                &product,
                self.settings.summary_freshness,
                self.collaborators.summarizer.as_ref(),
            )
            .await?;
        Ok(PreviewReport { product, summaries })
    }

    /// Finalizes runs stuck in `started` for longer than `stale_after`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the ledger update fails.
    pub async fn sweep_abandoned(&self, stale_after: Duration) -> Result<Vec<i64>, DbError> {
        let started_before = self.clock.now() - stale_after;
        self.stores.ledger.sweep_stale(started_before).await
    }
}

fn enter(phase: RunPhase) {
    tracing::debug!(%phase, "run phase");
}

async fn fail(
    active: ActiveRun,
    product_id: Option<&str>,
    kind: FailureKind,
    message: &str,
) -> RunOutcome {
    let error_detail = kind.detail(message);
    if let Err(e) = active.fail(product_id, &error_detail).await {
        tracing::error!(%kind, error = %e, "failed to record run error");
    }
    RunOutcome::Error {
        kind,
        product_id: product_id.map(ToString::to_string),
        error_detail,
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
