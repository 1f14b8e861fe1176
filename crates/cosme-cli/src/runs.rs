//! Run command handlers: execute, preview, list, show and sweep.

use std::str::FromStr;

use chrono::Duration;
use clap::Subcommand;
use cosme_core::{RunRecord, RunStatus, RunTarget, TriggerSource};
use cosme_pipeline::{Orchestrator, RunOutcome};

#[derive(Debug, Subcommand)]
pub enum RunsCommands {
    /// Show the most recent runs, newest first
    List {
        #[arg(long, default_value = "20")]
        limit: u32,
        /// Only runs in this status (started, success, error)
        #[arg(long)]
        status: Option<String>,
    },
    /// Show a single run as JSON
    Show { run_id: i64 },
    /// Finalize runs left in `started` as abandoned
    Sweep {
        /// Defaults to COSME_STALE_RUN_MINUTES
        #[arg(long)]
        older_than_minutes: Option<u32>,
    },
}

/// Executes one run and prints its report.
///
/// # Errors
///
/// Returns an error if the run cannot be recorded, or if it finished in
/// `error` so the process exits non-zero.
pub(crate) async fn run_once(orchestrator: &Orchestrator, target: &RunTarget) -> anyhow::Result<()> {
    tracing::info!(genre = %target.genre, channel = %target.channel, "starting run from cli");
    let report = orchestrator.run(target, TriggerSource::Cli).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    match report.outcome {
        RunOutcome::Success { .. } => Ok(()),
        RunOutcome::Error { error_detail, .. } => {
            anyhow::bail!("run {} failed: {error_detail}", report.run_id)
        }
    }
}

pub(crate) async fn run_preview(
    orchestrator: &Orchestrator,
    target: &RunTarget,
) -> anyhow::Result<()> {
    let preview = orchestrator.preview(target).await?;
    println!(
        "dry-run: would use {} ({} / {}) rank {}",
        preview.product.product_id,
        preview.product.brand,
        preview.product.name,
        preview.product.scraped_rank
    );
    for (i, text) in preview.summaries.iter().enumerate() {
        println!("  {}. {text}", i + 1);
    }
    Ok(())
}

pub(crate) async fn run_list(
    pool: &sqlx::PgPool,
    limit: u32,
    status: Option<&str>,
) -> anyhow::Result<()> {
    let status = status.map(RunStatus::from_str).transpose()?;
    let rows = cosme_db::runs::list_recent_runs(pool, i64::from(limit), status).await?;

    if rows.is_empty() {
        println!("no runs recorded");
        return Ok(());
    }

    println!(
        "{:<8}{:<10}{:<12}{:<22}{:<16}DETAIL",
        "ID", "STATUS", "TRIGGER", "CREATED", "TARGET"
    );
    for row in rows {
        let record = RunRecord::try_from(row)?;
        let detail = record
            .state
            .output_location()
            .or(record.state.error_detail())
            .unwrap_or("\u{2014}");
        println!(
            "{:<8}{:<10}{:<12}{:<22}{:<16}{}",
            record.id,
            record.status(),
            record.trigger_source,
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            format!("{}/{}", record.genre, record.channel),
            detail
        );
    }
    Ok(())
}

pub(crate) async fn run_show(pool: &sqlx::PgPool, run_id: i64) -> anyhow::Result<()> {
    let row = cosme_db::runs::get_run(pool, run_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("run {run_id} not found"))?;
    let record = RunRecord::try_from(row)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub(crate) async fn run_sweep(orchestrator: &Orchestrator, minutes: u32) -> anyhow::Result<()> {
    let swept = orchestrator
        .sweep_abandoned(Duration::minutes(i64::from(minutes)))
        .await?;
    if swept.is_empty() {
        println!("no abandoned runs older than {minutes} minutes");
    } else {
        println!("marked {} run(s) abandoned: {swept:?}", swept.len());
    }
    Ok(())
}
