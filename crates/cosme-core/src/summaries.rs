use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on the number of summary texts kept per product.
pub const MAX_SUMMARIES: usize = 3;

/// Upper bound, in characters, on a single summary text.
pub const MAX_SUMMARY_CHARS: usize = 20;

/// Cached AI-generated review summaries for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub product_id: String,
    /// Ordered, between one and [`MAX_SUMMARIES`] texts.
    pub summaries: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl SummaryEntry {
    /// Returns `true` while `updated_at` is no older than `freshness` at `now`.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, freshness: Duration) -> bool {
        now.checked_sub_signed(freshness)
            .is_none_or(|cutoff| self.updated_at >= cutoff)
    }
}

/// Returns `true` if `summaries` has an acceptable number of entries.
#[must_use]
pub fn is_valid_summary_count(summaries: &[String]) -> bool {
    (1..=MAX_SUMMARIES).contains(&summaries.len())
}
