use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A ranked product record as produced by a ranking scrape, before it is
/// merged into the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedProduct {
    /// Stable external key from the ranking source.
    pub product_id: String,
    pub genre: String,
    pub channel: String,
    pub name: String,
    pub brand: String,
    pub image_url: String,
    #[serde(default)]
    pub product_url: Option<String>,
    #[serde(default)]
    pub brand_url: Option<String>,
    /// Position in the ranking; lower is better.
    pub rank: i32,
}

/// A product as known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
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
    /// `None` until the product has been used by a successful run.
    pub last_used: Option<DateTime<Utc>>,
}

impl Product {
    /// Builds a catalog product from a scraped record seen for the first time.
    #[must_use]
    pub fn from_scraped(item: &ScrapedProduct, first_seen: DateTime<Utc>) -> Self {
        Self {
            product_id: item.product_id.clone(),
            genre: item.genre.clone(),
            channel: item.channel.clone(),
            name: item.name.clone(),
            brand: item.brand.clone(),
            image_url: item.image_url.clone(),
            product_url: item.product_url.clone(),
            brand_url: item.brand_url.clone(),
            scraped_rank: item.rank,
            first_seen,
            last_used: None,
        }
    }

    /// Refreshes the scrape-derived fields from `item`, leaving `first_seen`
    /// and `last_used` untouched.
    pub fn refresh_from(&mut self, item: &ScrapedProduct) {
        self.genre.clone_from(&item.genre);
        self.channel.clone_from(&item.channel);
        self.name.clone_from(&item.name);
        self.brand.clone_from(&item.brand);
        self.image_url.clone_from(&item.image_url);
        self.product_url.clone_from(&item.product_url);
        self.brand_url.clone_from(&item.brand_url);
        self.scraped_rank = item.rank;
    }

    /// Returns `true` if the product may be selected at `now` given the
    /// reuse `cooldown`: never used, or last used strictly before
    /// `now - cooldown`.
    ///
    /// A cutoff that falls outside the representable date range excludes
    /// every product that has ever been used.
    #[must_use]
    pub fn is_eligible(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match self.last_used {
            None => true,
            Some(last_used) => now
                .checked_sub_signed(cooldown)
                .is_some_and(|cutoff| last_used < cutoff),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraped(id: &str, rank: i32) -> ScrapedProduct {
        ScrapedProduct {
            product_id: id.to_string(),
            genre: "skincare".to_string(),
            channel: "drugstore".to_string(),
            name: "Moist Lotion".to_string(),
            brand: "Hada Labo".to_string(),
            image_url: "https://cdn.example.com/p/1.jpg".to_string(),
            product_url: None,
            brand_url: None,
            rank,
        }
    }

    #[test]
    fn from_scraped_starts_unused() {
        let now = Utc::now();
        let product = Product::from_scraped(&scraped("p1", 3), now);
        assert_eq!(product.product_id, "p1");
        assert_eq!(product.scraped_rank, 3);
        assert_eq!(product.first_seen, now);
        assert!(product.last_used.is_none());
    }

    #[test]
    fn refresh_preserves_first_seen_and_last_used() {
        let first_seen = Utc::now() - Duration::days(10);
        let used = Utc::now() - Duration::days(2);
        let mut product = Product::from_scraped(&scraped("p1", 3), first_seen);
        product.last_used = Some(used);

        let mut update = scraped("p1", 1);
        update.name = "Moist Lotion Rich".to_string();
        update.channel = "supermarket".to_string();
        product.refresh_from(&update);

        assert_eq!(product.scraped_rank, 1);
        assert_eq!(product.name, "Moist Lotion Rich");
        assert_eq!(product.channel, "supermarket");
        assert_eq!(product.first_seen, first_seen);
        assert_eq!(product.last_used, Some(used));
    }

    #[test]
    fn never_used_product_is_eligible() {
        let product = Product::from_scraped(&scraped("p1", 1), Utc::now());
        assert!(product.is_eligible(Utc::now(), Duration::hours(24)));
    }

    #[test]
    fn recently_used_product_is_not_eligible() {
        let now = Utc::now();
        let mut product = Product::from_scraped(&scraped("p1", 1), now);
        product.last_used = Some(now - Duration::hours(1));
        assert!(!product.is_eligible(now, Duration::hours(24)));
    }

    #[test]
    fn product_used_exactly_at_cutoff_is_not_eligible() {
        let now = Utc::now();
        let mut product = Product::from_scraped(&scraped("p1", 1), now);
        product.last_used = Some(now - Duration::hours(24));
        assert!(!product.is_eligible(now, Duration::hours(24)));
    }

    #[test]
    fn product_used_before_cutoff_is_eligible() {
        let now = Utc::now();
        let mut product = Product::from_scraped(&scraped("p1", 1), now);
        product.last_used = Some(now - Duration::hours(25));
        assert!(product.is_eligible(now, Duration::hours(24)));
    }

    #[test]
    fn scraped_product_optional_urls_default_when_absent() {
        let json = r#"{
            "product_id": "10234",
            "genre": "skincare",
            "channel": "drugstore",
            "name": "Moist Lotion",
            "brand": "Hada Labo",
            "image_url": "https://cdn.example.com/p/10234.jpg",
            "rank": 2
        }"#;
        let item: ScrapedProduct = serde_json::from_str(json).expect("deserialize");
        assert_eq!(item.rank, 2);
        assert!(item.product_url.is_none());
        assert!(item.brand_url.is_none());
    }
}
