//! Background job scheduler.
//!
//! Registers two recurring jobs: the run job, which ingests and then runs
//! every configured target, and the sweep job, which finalizes runs left in
//! `started` past the stale threshold.

use std::sync::Arc;

use chrono::Duration;
use cosme_core::{RunTarget, TriggerSource};
use cosme_db::CatalogStore;
use cosme_pipeline::{ingest_ranking, Orchestrator, RunOutcome, Scraper};
use futures::stream::{self, StreamExt};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Targets processed concurrently within one scheduled pass.
const TARGET_CONCURRENCY: usize = 4;

/// Everything the scheduled jobs need, cheap to clone into job closures.
#[derive(Clone)]
pub struct JobContext {
    pub orchestrator: Orchestrator,
    pub catalog: Arc<dyn CatalogStore>,
    /// `None` when no ranking source is configured; runs then use the
    /// existing catalog.
    pub scraper: Option<Arc<dyn Scraper>>,
    pub targets: Arc<Vec<RunTarget>>,
    pub min_products: usize,
    pub stale_after: Duration,
}

/// Outcome of one target within a scheduled pass.
#[derive(Debug)]
pub struct TargetResult {
    pub target: RunTarget,
    pub ingested: bool,
    /// `None` when the ledger entry could not be created.
    pub outcome: Option<RunOutcome>,
}

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    ctx: JobContext,
    run_cron: &str,
    sweep_cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_run_job(&scheduler, ctx.clone(), run_cron).await?;
    register_sweep_job(&scheduler, ctx, sweep_cron).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_run_job(
    scheduler: &JobScheduler,
    ctx: JobContext,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let ctx = ctx.clone();
        Box::pin(async move {
            tracing::info!(targets = ctx.targets.len(), "scheduler: starting run pass");
            let results = run_all_targets(&ctx).await;
            let succeeded = results
                .iter()
                .filter(|r| r.outcome.as_ref().is_some_and(RunOutcome::is_success))
                .count();
            tracing::info!(
                succeeded,
                failed = results.len() - succeeded,
                "scheduler: run pass complete"
            );
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

async fn register_sweep_job(
    scheduler: &JobScheduler,
    ctx: JobContext,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let ctx = ctx.clone();
        Box::pin(async move {
            if let Err(e) = ctx.orchestrator.sweep_abandoned(ctx.stale_after).await {
                tracing::error!(error = %e, "scheduler: stale-run sweep failed");
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Ingests and runs every configured target. Distinct targets run
/// concurrently; the same target is serialized by the orchestrator's locks.
pub async fn run_all_targets(ctx: &JobContext) -> Vec<TargetResult> {
    stream::iter(ctx.targets.iter().cloned())
        .map(|target| run_target(ctx, target))
        .buffer_unordered(TARGET_CONCURRENCY)
        .collect()
        .await
}

async fn run_target(ctx: &JobContext, target: RunTarget) -> TargetResult {
    let mut ingested = false;
    if let Some(scraper) = &ctx.scraper {
        match ingest_ranking(scraper.as_ref(), ctx.catalog.as_ref(), &target, ctx.min_products)
            .await
        {
            Ok(report) => {
                ingested = true;
                tracing::info!(
                    genre = %target.genre,
                    channel = %target.channel,
                    fetched = report.fetched,
                    inserted = report.upserted.inserted,
                    updated = report.upserted.updated,
                    "scheduler: ranking ingested"
                );
            }
            Err(e) => {
                tracing::warn!(
                    genre = %target.genre,
                    channel = %target.channel,
                    error = %e,
                    "scheduler: ingestion failed; running against existing catalog"
                );
            }
        }
    }

    let outcome = match ctx.orchestrator.run(&target, TriggerSource::Scheduler).await {
        Ok(report) => Some(report.outcome),
        Err(e) => {
            tracing::error!(
                genre = %target.genre,
                channel = %target.channel,
                error = %e,
                "scheduler: could not start run"
            );
            None
        }
    };

    TargetResult {
        target,
        ingested,
        outcome,
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
