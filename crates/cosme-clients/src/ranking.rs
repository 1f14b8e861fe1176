//! Ranking sources: an HTTP JSON feed and a local JSON file.
//!
//! Both yield records in ranking order. Genre and channel are stamped by the
//! ingestion step, so the payload only needs per-product fields.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use cosme_core::{RunTarget, ScrapedProduct};
use cosme_pipeline::{CollaboratorError, Scraper};
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::error::{status_error, ClientError};
use crate::retry::retry_with_backoff;

/// One entry in a ranking payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RankingItem {
    pub product_id: String,
    pub name: String,
    pub brand: String,
    pub image_url: String,
    #[serde(default)]
    pub product_url: Option<String>,
    #[serde(default)]
    pub brand_url: Option<String>,
    /// Falls back to the 1-based position in the payload when absent.
    #[serde(default)]
    pub rank: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct RankingPayload {
    products: Vec<RankingItem>,
}

fn into_scraped(items: Vec<RankingItem>, target: &RunTarget) -> Vec<ScrapedProduct> {
    items
        .into_iter()
        .zip(1_i32..)
        .map(|(item, position)| ScrapedProduct {
            product_id: item.product_id,
            genre: target.genre.clone(),
            channel: target.channel.clone(),
            name: item.name,
            brand: item.brand,
            image_url: item.image_url,
            product_url: item.product_url,
            brand_url: item.brand_url,
            rank: item.rank.unwrap_or(position),
        })
        .collect()
}

fn parse_payload(body: &str, context: &str) -> Result<Vec<RankingItem>, ClientError> {
    let payload: RankingPayload =
        serde_json::from_str(body).map_err(|e| ClientError::Deserialize {
            context: context.to_owned(),
            source: e,
        })?;
    Ok(payload.products)
}

/// Fetches rankings from `GET {feed_url}?genre=..&channel=..`.
pub struct RankingFeedClient {
    client: Client,
    feed_url: Url,
    max_retries: u32,
}

impl RankingFeedClient {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the `reqwest::Client` cannot be
    /// built, or [`ClientError::Config`] if `feed_url` is not a valid URL.
    pub fn new(feed_url: &str, timeout_secs: u64, user_agent: &str) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        let feed_url = Url::parse(feed_url)
            .map_err(|e| ClientError::Config(format!("invalid ranking feed URL '{feed_url}': {e}")))?;

        Ok(Self {
            client,
            feed_url,
            max_retries: 3,
        })
    }

    /// # Errors
    ///
    /// Returns [`ClientError`] on transport failure, non-success status, or
    /// a malformed payload.
    pub async fn fetch(&self, target: &RunTarget) -> Result<Vec<ScrapedProduct>, ClientError> {
        let mut url = self.feed_url.clone();
        url.query_pairs_mut()
            .append_pair("genre", &target.genre)
            .append_pair("channel", &target.channel);

        let body = retry_with_backoff("ranking feed", self.max_retries, 1_000, || {
            self.get_body(url.clone())
        })
        .await?;

        let items = parse_payload(&body, &format!("ranking feed for {target}"))?;
        tracing::debug!(%target, count = items.len(), "fetched ranking feed");
        Ok(into_scraped(items, target))
    }

    async fn get_body(&self, url: Url) -> Result<String, ClientError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(status_error("ranking feed", response).await);
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Scraper for RankingFeedClient {
    async fn fetch_ranking(
        &self,
        target: &RunTarget,
    ) -> Result<Vec<ScrapedProduct>, CollaboratorError> {
        self.fetch(target).await.map_err(CollaboratorError::from)
    }
}

/// Reads a ranking payload from disk; used for manual imports.
pub struct RankingFile {
    path: PathBuf,
}

impl RankingFile {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

#[async_trait]
impl Scraper for RankingFile {
    async fn fetch_ranking(
        &self,
        target: &RunTarget,
    ) -> Result<Vec<ScrapedProduct>, CollaboratorError> {
        let body = tokio::fs::read_to_string(&self.path).await?;
        let items = parse_payload(&body, &self.path.display().to_string())?;
        Ok(into_scraped(items, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_rank_falls_back_to_position() {
        let body = r#"{"products":[
            {"product_id":"a","name":"A","brand":"X","image_url":"https://i/a.jpg"},
            {"product_id":"b","name":"B","brand":"Y","image_url":"https://i/b.jpg","rank":7}
        ]}"#;
        let items = parse_payload(body, "test").unwrap();
        let scraped = into_scraped(items, &RunTarget::new("乳液", "ドラッグストア"));

        assert_eq!(scraped[0].rank, 1);
        assert_eq!(scraped[1].rank, 7);
        assert_eq!(scraped[1].genre, "乳液");
        assert_eq!(scraped[1].channel, "ドラッグストア");
    }

    #[test]
    fn malformed_payload_is_a_deserialize_error() {
        assert!(matches!(
            parse_payload(r#"{"items":[]}"#, "test"),
            Err(ClientError::Deserialize { .. })
        ));
    }

    #[test]
    fn invalid_feed_url_is_rejected() {
        assert!(matches!(
            RankingFeedClient::new("not a url", 5, "ua"),
            Err(ClientError::Config(_))
        ));
    }
}
