//! Database operations for the `products` catalog.

use chrono::{DateTime, Utc};
use cosme_core::{Product, ScrapedProduct};
use sqlx::PgPool;

use crate::DbError;

const PRODUCT_COLUMNS: &str = "product_id, genre, channel, name, brand, image_url, \
                               product_url, brand_url, scraped_rank, first_seen, last_used";

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub product_id: String,
    pub genre: String,
    pub channel: String,
    pub name: String,
    pub brand: String,
    pub image_url: String,
    pub product_url: Option<String>,
    pub brand_url: Option<String>,
    pub scraped_rank: i32,
    pub first_seen: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
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
        }
    }
}

/// Collapses duplicate ids within one batch, keeping the last occurrence at
/// the position of the first.
pub(crate) fn dedup_last_wins(items: &[ScrapedProduct]) -> Result<Vec<&ScrapedProduct>, DbError> {
    let mut order: Vec<&ScrapedProduct> = Vec::with_capacity(items.len());
    for item in items {
        if item.product_id.trim().is_empty() {
            return Err(DbError::InvalidProduct(format!(
                "empty product_id for '{}'",
                item.name
            )));
        }
        match order.iter().position(|seen| seen.product_id == item.product_id) {
            Some(idx) => order[idx] = item,
            None => order.push(item),
        }
    }
    Ok(order)
}

/// Upserts a batch of scraped products in one transaction.
///
/// Conflicts on `product_id` refresh the scrape-derived columns; `first_seen`
/// and `last_used` are never touched by this path.
///
/// Returns `(inserted, updated)` counts.
///
/// # Errors
///
/// Returns [`DbError::InvalidProduct`] if any item has an empty id, or
/// [`DbError::Sqlx`] if a statement fails (the whole batch is rolled back).
pub async fn upsert_products(
    pool: &PgPool,
    items: &[ScrapedProduct],
) -> Result<(usize, usize), DbError> {
    let batch = dedup_last_wins(items)?;
    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;
    let mut updated = 0usize;

    for item in batch {
        // xmax is 0 only for a row created by this statement.
        let was_insert: bool = sqlx::query_scalar::<_, bool>(
            "INSERT INTO products \
                 (product_id, genre, channel, name, brand, image_url, \
                  product_url, brand_url, scraped_rank) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (product_id) DO UPDATE SET \
                 genre        = EXCLUDED.genre, \
                 channel      = EXCLUDED.channel, \
                 name         = EXCLUDED.name, \
                 brand        = EXCLUDED.brand, \
                 image_url    = EXCLUDED.image_url, \
                 product_url  = EXCLUDED.product_url, \
                 brand_url    = EXCLUDED.brand_url, \
                 scraped_rank = EXCLUDED.scraped_rank \
             RETURNING (xmax = 0)",
        )
        .bind(&item.product_id)
        .bind(&item.genre)
        .bind(&item.channel)
        .bind(&item.name)
        .bind(&item.brand)
        .bind(&item.image_url)
        .bind(&item.product_url)
        .bind(&item.brand_url)
        .bind(item.rank)
        .fetch_one(&mut *tx)
        .await?;

        if was_insert {
            inserted += 1;
        } else {
            updated += 1;
        }
    }

    tx.commit().await?;
    Ok((inserted, updated))
}

/// Sets `last_used` to `at` unless the stored value is already later.
///
/// # Errors
///
/// Returns [`DbError::ProductNotFound`] if no row has `product_id`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn mark_used(pool: &PgPool, product_id: &str, at: DateTime<Utc>) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE products \
         SET last_used = GREATEST(COALESCE(last_used, $2), $2) \
         WHERE product_id = $1",
    )
    .bind(product_id)
    .bind(at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::ProductNotFound {
            product_id: product_id.to_string(),
        });
    }

    Ok(())
}

/// Lists products for a `(genre, channel)` pair, best rank first, ties
/// broken by `product_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_candidates(
    pool: &PgPool,
    genre: &str,
    channel: &str,
) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE genre = $1 AND channel = $2 \
         ORDER BY scraped_rank ASC, product_id ASC"
    ))
    .bind(genre)
    .bind(channel)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetches a single product by its external id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product(pool: &PgPool, product_id: &str) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1"
    ))
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Lists catalog products with optional genre/channel filters, ordered like
/// [`list_candidates`]. Used by the read API and CLI.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products(
    pool: &PgPool,
    genre: Option<&str>,
    channel: Option<&str>,
    limit: i64,
) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE ($1::text IS NULL OR genre = $1) \
           AND ($2::text IS NULL OR channel = $2) \
         ORDER BY genre, channel, scraped_rank ASC, product_id ASC \
         LIMIT $3"
    ))
    .bind(genre)
    .bind(channel)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraped(id: &str, rank: i32) -> ScrapedProduct {
        ScrapedProduct {
            product_id: id.to_string(),
            genre: "skincare".to_string(),
            channel: "drugstore".to_string(),
            name: format!("Lotion {id}"),
            brand: "Hada".to_string(),
            image_url: format!("https://img.example/{id}.jpg"),
            product_url: None,
            brand_url: None,
            rank,
        }
    }

    #[test]
    fn dedup_keeps_last_duplicate_in_first_position() {
        let items = vec![scraped("a", 1), scraped("b", 2), scraped("a", 5)];
        let batch = dedup_last_wins(&items).expect("valid batch");
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].product_id, "a");
        assert_eq!(batch[0].rank, 5);
        assert_eq!(batch[1].product_id, "b");
    }

    #[test]
    fn dedup_rejects_blank_ids() {
        let items = vec![scraped("a", 1), scraped("  ", 2)];
        assert!(matches!(
            dedup_last_wins(&items),
            Err(DbError::InvalidProduct(_))
        ));
    }
}
