//! Database operations for the `runs` ledger.
//!
//! Every finalize is a single guarded `UPDATE ... WHERE status = 'started'`;
//! a second finalize of the same run matches zero rows and is reported as
//! [`DbError::InvalidRunTransition`], so concurrent finalizers cannot both
//! succeed.

use chrono::{DateTime, Utc};
use cosme_core::{RunRecord, RunState, RunStatus, TriggerSource};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Detail recorded for runs finalized by [`sweep_stale_runs`].
pub const ABANDONED_RUN_DETAIL: &str =
    "abandoned: run was still started past the stale-run threshold";

const RUN_COLUMNS: &str = "id, public_id, genre, channel, trigger_source, status, product_id, \
                           output_location, error_detail, created_at, finished_at";

/// A row from the `runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub genre: String,
    pub channel: String,
    pub trigger_source: String,
    pub status: String,
    pub product_id: Option<String>,
    pub output_location: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<RunRow> for RunRecord {
    type Error = DbError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let trigger_source = row.trigger_source.parse::<TriggerSource>()?;
        let state = RunState::from_columns(
            row.id,
            &row.status,
            row.output_location,
            row.error_detail,
        )?;

        Ok(RunRecord {
            id: row.id,
            public_id: row.public_id,
            genre: row.genre,
            channel: row.channel,
            trigger_source,
            product_id: row.product_id,
            state,
            created_at: row.created_at,
            finished_at: row.finished_at,
        })
    }
}

/// Creates a new run in `started` status stamped with `started_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn start_run(
    pool: &PgPool,
    genre: &str,
    channel: &str,
    trigger_source: TriggerSource,
    started_at: DateTime<Utc>,
) -> Result<RunRow, DbError> {
    let row = sqlx::query_as::<_, RunRow>(&format!(
        "INSERT INTO runs (public_id, genre, channel, trigger_source, status, created_at) \
         VALUES ($1, $2, $3, $4, 'started', $5) \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(genre)
    .bind(channel)
    .bind(trigger_source.as_str())
    .bind(started_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Transitions a run `started → success`.
///
/// # Errors
///
/// Returns [`DbError::RunNotFound`] for an unknown id,
/// [`DbError::InvalidRunTransition`] if the run is already finalized, or
/// [`DbError::Sqlx`].
pub async fn finish_run_success(
    pool: &PgPool,
    run_id: i64,
    product_id: &str,
    output_location: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE runs \
         SET status = 'success', product_id = $2, output_location = $3, finished_at = NOW() \
         WHERE id = $1 AND status = 'started'",
    )
    .bind(run_id)
    .bind(product_id)
    .bind(output_location)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(rejected_transition(pool, run_id, RunStatus::Success).await);
    }

    Ok(())
}

/// Transitions a run `started → error`.
///
/// # Errors
///
/// Same as [`finish_run_success`].
pub async fn finish_run_error(
    pool: &PgPool,
    run_id: i64,
    product_id: Option<&str>,
    error_detail: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE runs \
         SET status = 'error', product_id = COALESCE($2, product_id), \
             error_detail = $3, finished_at = NOW() \
         WHERE id = $1 AND status = 'started'",
    )
    .bind(run_id)
    .bind(product_id)
    .bind(error_detail)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(rejected_transition(pool, run_id, RunStatus::Error).await);
    }

    Ok(())
}

/// Works out why a guarded finalize matched no row.
async fn rejected_transition(pool: &PgPool, run_id: i64, to: RunStatus) -> DbError {
    let current = sqlx::query_scalar::<_, String>("SELECT status FROM runs WHERE id = $1")
        .bind(run_id)
        .fetch_optional(pool)
        .await;

    match current {
        Ok(None) => DbError::RunNotFound { run_id },
        Ok(Some(status)) => match status.parse::<RunStatus>() {
            Ok(from) => DbError::InvalidRunTransition { run_id, from, to },
            Err(e) => DbError::Corrupt(e),
        },
        Err(e) => DbError::Sqlx(e),
    }
}

/// Fetches a single run by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_run(pool: &PgPool, run_id: i64) -> Result<Option<RunRow>, DbError> {
    let row = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM runs WHERE id = $1"
    ))
    .bind(run_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Lists the most recent runs, newest first, optionally filtered by status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recent_runs(
    pool: &PgPool,
    limit: i64,
    status: Option<RunStatus>,
) -> Result<Vec<RunRow>, DbError> {
    let rows = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM runs \
         WHERE ($1::text IS NULL OR status = $1) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(status.map(RunStatus::as_str))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Finalizes every run still `started` that was created before
/// `started_before` as `error` with [`ABANDONED_RUN_DETAIL`].
///
/// Returns the ids of the swept runs in ascending order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn sweep_stale_runs(
    pool: &PgPool,
    started_before: DateTime<Utc>,
) -> Result<Vec<i64>, DbError> {
    let mut ids = sqlx::query_scalar::<_, i64>(
        "UPDATE runs \
         SET status = 'error', error_detail = $2, finished_at = NOW() \
         WHERE status = 'started' AND created_at < $1 \
         RETURNING id",
    )
    .bind(started_before)
    .bind(ABANDONED_RUN_DETAIL)
    .fetch_all(pool)
    .await?;

    ids.sort_unstable();
    if !ids.is_empty() {
        tracing::warn!(count = ids.len(), run_ids = ?ids, "finalized abandoned runs");
    }
    Ok(ids)
}
