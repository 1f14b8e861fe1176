use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct ProductItem {
    product_id: String,
    genre: String,
    channel: String,
    name: String,
    brand: String,
    image_url: String,
    product_url: Option<String>,
    brand_url: Option<String>,
    scraped_rank: i32,
    first_seen: DateTime<Utc>,
    last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductQuery {
    pub genre: Option<String>,
    pub channel: Option<String>,
    pub limit: Option<i64>,
}

pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ApiResponse<Vec<ProductItem>>>, ApiError> {
    let rows = cosme_db::list_products(
        &state.pool,
        query.genre.as_deref(),
        query.channel.as_deref(),
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| ProductItem {
            product_id: row.product_id,
            genre: row.genre,
            channel: row.channel,
            name: row.name,
            brand: row.brand,
            image_url: row.image_url,
            product_url: row.product_url,
            brand_url: row.brand_url,
            scraped_rank: row.scraped_rank,
            first_seen: row.first_seen,
            last_used: row.last_used,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}
