use cosme_core::RunTarget;
use cosme_db::{CatalogStore, DbError, UpsertSummary};
use serde::Serialize;
use thiserror::Error;

use crate::collaborators::{CollaboratorError, Scraper};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("ranking fetch failed: {0}")]
    Scraper(#[from] CollaboratorError),

    #[error(transparent)]
    Store(#[from] DbError),
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub genre: String,
    pub channel: String,
    pub fetched: usize,
    #[serde(flatten)]
    pub upserted: UpsertSummary,
    /// Fewer records than the configured minimum were returned.
    pub below_minimum: bool,
}

/// Fetches the ranking for `target` and merges it into the catalog.
///
/// Every record is stamped with the target's genre and channel before the
/// upsert. A short ranking is stored anyway and flagged in the report.
///
/// # Errors
///
/// Returns [`IngestError::Scraper`] if the ranking cannot be fetched and
/// [`IngestError::Store`] if the batch cannot be written.
pub async fn ingest_ranking(
    scraper: &dyn Scraper,
    catalog: &dyn CatalogStore,
    target: &RunTarget,
    min_products: usize,
) -> Result<IngestReport, IngestError> {
    let mut items = scraper.fetch_ranking(target).await?;
    for item in &mut items {
        item.genre.clone_from(&target.genre);
        item.channel.clone_from(&target.channel);
    }

    let fetched = items.len();
    let below_minimum = fetched < min_products;
    if below_minimum {
        tracing::warn!(
            %target,
            fetched,
            min_products,
            "ranking returned fewer products than expected"
        );
    }

    let upserted = catalog.upsert_products(&items).await?;
    tracing::info!(
        %target,
        fetched,
        inserted = upserted.inserted,
        updated = upserted.updated,
        "ranking ingested"
    );

    Ok(IngestReport {
        genre: target.genre.clone(),
        channel: target.channel.clone(),
        fetched,
        upserted,
        below_minimum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{fixed_clock, scraped, FakeScraper};
    use cosme_db::MemoryStore;

    #[tokio::test]
    async fn stamps_target_and_upserts() {
        let store = MemoryStore::new(fixed_clock());
        let scraper = FakeScraper {
            items: vec![scraped("P1", 1), scraped("P2", 2)],
            fail: false,
        };
        let target = RunTarget::new("skincare", "drugstore");

        let report = ingest_ranking(&scraper, &store, &target, 2).await.unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.upserted.inserted, 2);
        assert!(!report.below_minimum);
        let candidates = store.list_candidates("skincare", "drugstore").await.unwrap();
        assert_eq!(candidates.len(), 2);
    }

    #[tokio::test]
    async fn short_ranking_is_flagged_but_stored() {
        let store = MemoryStore::new(fixed_clock());
        let scraper = FakeScraper {
            items: vec![scraped("P1", 1)],
            fail: false,
        };
        let target = RunTarget::new("skincare", "drugstore");

        let report = ingest_ranking(&scraper, &store, &target, 7).await.unwrap();

        assert!(report.below_minimum);
        assert_eq!(store.product_count().await, 1);
    }

    #[tokio::test]
    async fn scraper_failure_writes_nothing() {
        let store = MemoryStore::new(fixed_clock());
        let scraper = FakeScraper {
            items: Vec::new(),
            fail: true,
        };
        let target = RunTarget::new("skincare", "drugstore");

        let err = ingest_ranking(&scraper, &store, &target, 7)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Scraper(_)));
        assert_eq!(store.product_count().await, 0);
    }

    #[test]
    fn report_serializes_flat_counts() {
        let report = IngestReport {
            genre: "skincare".to_string(),
            channel: "drugstore".to_string(),
            fetched: 3,
            upserted: UpsertSummary {
                inserted: 1,
                updated: 2,
            },
            below_minimum: true,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["inserted"], 1);
        assert_eq!(json["updated"], 2);
    }
}
