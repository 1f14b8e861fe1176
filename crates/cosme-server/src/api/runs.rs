use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use cosme_core::{RunRecord, RunStatus, RunTarget, TriggerSource};
use cosme_pipeline::{OrchestratorError, RunReport};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct RunsQuery {
    pub limit: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TriggerRunRequest {
    pub genre: String,
    pub channel: String,
}

#[derive(Debug, Serialize)]
pub(super) struct RunItem {
    run_id: i64,
    public_id: Uuid,
    genre: String,
    channel: String,
    trigger_source: TriggerSource,
    status: RunStatus,
    product_id: Option<String>,
    output_location: Option<String>,
    error_detail: Option<String>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl From<RunRecord> for RunItem {
    fn from(record: RunRecord) -> Self {
        Self {
            run_id: record.id,
            public_id: record.public_id,
            status: record.status(),
            output_location: record.state.output_location().map(ToOwned::to_owned),
            error_detail: record.state.error_detail().map(ToOwned::to_owned),
            genre: record.genre,
            channel: record.channel,
            trigger_source: record.trigger_source,
            product_id: record.product_id,
            created_at: record.created_at,
            finished_at: record.finished_at,
        }
    }
}

fn to_item(request_id: &str, row: cosme_db::RunRow) -> Result<RunItem, ApiError> {
    RunRecord::try_from(row)
        .map(RunItem::from)
        .map_err(|e| map_db_error(request_id.to_owned(), &e))
}

pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<ApiResponse<Vec<RunItem>>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(RunStatus::from_str)
        .transpose()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;

    let rows =
        cosme_db::runs::list_recent_runs(&state.pool, normalize_limit(query.limit), status)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| to_item(&req_id.0, row))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn get_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(run_id): Path<i64>,
) -> Result<Json<ApiResponse<RunItem>>, ApiError> {
    let row = cosme_db::runs::get_run(&state.pool, run_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(req_id.0.clone(), "not_found", format!("run {run_id} not found"))
        })?;

    Ok(Json(ApiResponse {
        data: to_item(&req_id.0, row)?,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/runs: executes one run and returns its report.
///
/// A run already in progress for the same pair is rejected with `conflict`
/// instead of queueing the request behind it. The run executes on its own
/// task under the lock taken here, so a client that disconnects does not
/// cancel it.
pub(super) async fn trigger_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<TriggerRunRequest>,
) -> Result<Json<ApiResponse<RunReport>>, ApiError> {
    let genre = body.genre.trim();
    let channel = body.channel.trim();
    if genre.is_empty() || channel.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "genre and channel must be non-empty",
        ));
    }
    let target = RunTarget::new(genre, channel);

    let Some(guard) = state.orchestrator.locks().try_acquire(&target).await else {
        return Err(ApiError::new(
            req_id.0,
            "conflict",
            format!("a run for {target} is already in progress"),
        ));
    };

    let orchestrator = state.orchestrator.clone();
    let report = tokio::spawn(async move {
        orchestrator
            .run_with_guard(guard, TriggerSource::Api)
            .await
    })
    .await
    .map_err(|e| {
        tracing::error!(%target, error = %e, "run task did not complete");
        ApiError::new(req_id.0.clone(), "internal_error", "run task did not complete")
    })?
    .map_err(|e| match e {
        OrchestratorError::Ledger(e) => map_db_error(req_id.0.clone(), &e),
    })?;

    Ok(Json(ApiResponse {
        data: report,
        meta: ResponseMeta::new(req_id.0),
    }))
}
