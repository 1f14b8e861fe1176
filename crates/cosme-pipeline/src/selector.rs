use std::sync::Arc;

use chrono::Duration;
use cosme_core::{Clock, Product};
use cosme_db::{CatalogStore, DbError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("no eligible product for {genre}/{channel}")]
    NoEligibleProduct { genre: String, channel: String },

    #[error(transparent)]
    Store(#[from] DbError),
}

/// Chooses the next product for a `(genre, channel)` pair.
///
/// Rank-first, first-fit over the catalog snapshot: the best-ranked product
/// that was never used, or last used strictly before `now - cooldown`. The
/// same snapshot and clock always yield the same product. Selection reads
/// only; committing `last_used` is the orchestrator's job.
#[derive(Clone)]
pub struct Selector {
    catalog: Arc<dyn CatalogStore>,
    clock: Arc<dyn Clock>,
}

impl Selector {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogStore>, clock: Arc<dyn Clock>) -> Self {
        Self { catalog, clock }
    }

    /// # Errors
    ///
    /// Returns [`SelectError::NoEligibleProduct`] when every candidate is
    /// inside the cooldown window (or there are none), or
    /// [`SelectError::Store`] if the catalog cannot be read.
    pub async fn select(
        &self,
        genre: &str,
        channel: &str,
        cooldown: Duration,
    ) -> Result<Product, SelectError> {
        let now = self.clock.now();
        let candidates = self.catalog.list_candidates(genre, channel).await?;
        let total = candidates.len();

        match candidates
            .into_iter()
            .find(|product| product.is_eligible(now, cooldown))
        {
            Some(product) => {
                tracing::debug!(
                    genre,
                    channel,
                    product_id = %product.product_id,
                    rank = product.scraped_rank,
                    "selected product"
                );
                Ok(product)
            }
            None => {
                tracing::info!(genre, channel, candidates = total, "no eligible product");
                Err(SelectError::NoEligibleProduct {
                    genre: genre.to_string(),
                    channel: channel.to_string(),
                })
            }
        }
    }
}
