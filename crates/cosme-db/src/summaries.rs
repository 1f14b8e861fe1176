//! Database operations for `review_cache`.

use chrono::{DateTime, Utc};
use cosme_core::summaries::is_valid_summary_count;
use cosme_core::SummaryEntry;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `review_cache` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SummaryRow {
    pub product_id: String,
    pub summaries: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<SummaryRow> for SummaryEntry {
    fn from(row: SummaryRow) -> Self {
        Self {
            product_id: row.product_id,
            summaries: row.summaries,
            updated_at: row.updated_at,
        }
    }
}

/// Fetches the cached summaries for a product, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_summary(pool: &PgPool, product_id: &str) -> Result<Option<SummaryRow>, DbError> {
    let row = sqlx::query_as::<_, SummaryRow>(
        "SELECT product_id, summaries, updated_at FROM review_cache WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Writes the summaries for a product, overwriting any earlier entry.
///
/// The insert only proceeds when the product exists, so an unknown id is
/// reported as [`DbError::ProductNotFound`] rather than a foreign-key error.
///
/// # Errors
///
/// Returns [`DbError::InvalidSummaryCount`] unless 1 to 3 texts are given,
/// [`DbError::ProductNotFound`] for an unknown product, or [`DbError::Sqlx`].
pub async fn put_summary(
    pool: &PgPool,
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

    let result = sqlx::query(
        "INSERT INTO review_cache (product_id, summaries, updated_at) \
         SELECT $1, $2, $3 \
         WHERE EXISTS (SELECT 1 FROM products WHERE product_id = $1) \
         ON CONFLICT (product_id) DO UPDATE SET \
             summaries  = EXCLUDED.summaries, \
             updated_at = EXCLUDED.updated_at",
    )
    .bind(product_id)
    .bind(summaries)
    .bind(updated_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::ProductNotFound {
            product_id: product_id.to_string(),
        });
    }

    Ok(())
}
