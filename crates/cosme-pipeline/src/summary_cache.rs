use std::sync::Arc;

use chrono::Duration;
use cosme_core::{Clock, Product, MAX_SUMMARIES};
use cosme_db::{DbError, SummaryStore};
use thiserror::Error;

use crate::collaborators::{CollaboratorError, Summarizer};

#[derive(Debug, Error)]
pub enum SummaryCacheError {
    #[error("summarizer failed: {0}")]
    Summarizer(#[source] CollaboratorError),

    #[error("summarizer returned no usable summaries for {product_id}")]
    EmptySummaries { product_id: String },

    #[error(transparent)]
    Store(#[from] DbError),
}

/// Refresh-ahead cache over [`SummaryStore`].
///
/// An absent or stale entry is regenerated through the supplied summarizer
/// and overwritten in place. A summarizer failure leaves the entry exactly
/// as it was.
#[derive(Clone)]
pub struct SummaryCache {
    store: Arc<dyn SummaryStore>,
    clock: Arc<dyn Clock>,
}

impl SummaryCache {
    #[must_use]
    pub fn new(store: Arc<dyn SummaryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Returns one to three summaries for `product`.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryCacheError::Summarizer`] or
    /// [`SummaryCacheError::EmptySummaries`] when regeneration fails, and
    /// [`SummaryCacheError::Store`] when the cache cannot be read or written.
    pub async fn get_or_refresh(
        &self,
        product: &Product,
        freshness: Duration,
        summarizer: &dyn Summarizer,
    ) -> Result<Vec<String>, SummaryCacheError> {
        let product_id = product.product_id.as_str();
        let now = self.clock.now();

        let cached = self.store.get_summary(product_id).await?;
        if let Some(entry) = &cached {
            if entry.is_fresh(now, freshness) {
                tracing::debug!(product_id, "summary cache hit");
                return Ok(entry.summaries.clone());
            }
        }

        tracing::info!(
            product_id,
            stale = cached.is_some(),
            "summary cache miss; regenerating"
        );

        let mut summaries: Vec<String> = summarizer
            .summarize(product)
            .await
            .map_err(SummaryCacheError::Summarizer)?
            .into_iter()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();
        summaries.truncate(MAX_SUMMARIES);

        if summaries.is_empty() {
            return Err(SummaryCacheError::EmptySummaries {
                product_id: product_id.to_string(),
            });
        }

        self.store
            .put_summary(product_id, &summaries, self.clock.now())
            .await?;
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{fixed_clock, product, FakeSummarizer};
    use cosme_db::MemoryStore;
    use std::sync::atomic::Ordering;

    async fn setup() -> (Arc<cosme_core::ManualClock>, Arc<MemoryStore>, SummaryCache) {
        let clock = fixed_clock();
        let store = Arc::new(MemoryStore::new(clock.clone()));
        store.insert_product(product("P1", 1, None)).await;
        let cache = SummaryCache::new(store.clone(), clock.clone());
        (clock, store, cache)
    }

    #[tokio::test]
    async fn miss_invokes_summarizer_once_and_caches() {
        let (_clock, store, cache) = setup().await;
        let summarizer = FakeSummarizer::returning(&["しっとり", "香りが良い"]);
        let p1 = product("P1", 1, None);

        let first = cache
            .get_or_refresh(&p1, Duration::hours(24), &summarizer)
            .await
            .unwrap();
        let second = cache
            .get_or_refresh(&p1, Duration::hours(24), &summarizer)
            .await
            .unwrap();

        assert_eq!(first, vec!["しっとり", "香りが良い"]);
        assert_eq!(first, second);
        assert_eq!(summarizer.calls(), 1);
        assert!(store.get_summary("P1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_entry_is_regenerated_and_overwritten() {
        let (clock, store, cache) = setup().await;
        store
            .put_summary("P1", &["古い感想".to_string()], clock.now())
            .await
            .unwrap();
        clock.advance(Duration::hours(25));
        let summarizer = FakeSummarizer::returning(&["新しい感想"]);

        let texts = cache
            .get_or_refresh(&product("P1", 1, None), Duration::hours(24), &summarizer)
            .await
            .unwrap();

        assert_eq!(texts, vec!["新しい感想"]);
        assert_eq!(summarizer.calls(), 1);
        let entry = store.get_summary("P1").await.unwrap().unwrap();
        assert_eq!(entry.updated_at, clock.now());
    }

    #[tokio::test]
    async fn failure_leaves_stale_entry_untouched() {
        let (clock, store, cache) = setup().await;
        let written_at = clock.now();
        store
            .put_summary("P1", &["古い感想".to_string()], written_at)
            .await
            .unwrap();
        clock.advance(Duration::hours(48));
        let summarizer = FakeSummarizer::returning(&["unused"]);
        summarizer.fail.store(true, Ordering::SeqCst);

        let err = cache
            .get_or_refresh(&product("P1", 1, None), Duration::hours(24), &summarizer)
            .await
            .unwrap_err();

        assert!(matches!(err, SummaryCacheError::Summarizer(_)));
        let entry = store.get_summary("P1").await.unwrap().unwrap();
        assert_eq!(entry.summaries, vec!["古い感想"]);
        assert_eq!(entry.updated_at, written_at);
    }

    #[tokio::test]
    async fn keeps_at_most_three_non_blank_summaries() {
        let (_clock, _store, cache) = setup().await;
        let summarizer = FakeSummarizer::returning(&["a", "  ", "b", "c", "d"]);

        let texts = cache
            .get_or_refresh(&product("P1", 1, None), Duration::hours(24), &summarizer)
            .await
            .unwrap();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn empty_output_is_an_error_and_not_cached() {
        let (_clock, store, cache) = setup().await;
        let summarizer = FakeSummarizer::returning(&[" "]);

        let err = cache
            .get_or_refresh(&product("P1", 1, None), Duration::hours(24), &summarizer)
            .await
            .unwrap_err();
        assert!(matches!(err, SummaryCacheError::EmptySummaries { .. }));
        assert!(store.get_summary("P1").await.unwrap().is_none());
    }
}
