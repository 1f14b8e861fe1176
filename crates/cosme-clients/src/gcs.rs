//! Video upload to a Google Cloud Storage bucket via the JSON API media
//! upload endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cosme_pipeline::{CollaboratorError, MediaArtifact, Uploader};
use reqwest::{Client, Response, StatusCode};
use uuid::Uuid;

use crate::error::{status_error, ClientError};
use crate::token::TokenCache;

const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

pub struct GcsUploader {
    client: Client,
    bucket: String,
    tokens: Arc<TokenCache>,
    base_url: String,
}

impl GcsUploader {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(
        bucket: &str,
        tokens: Arc<TokenCache>,
        timeout_secs: u64,
    ) -> Result<Self, ClientError> {
        Self::with_base_url(bucket, tokens, timeout_secs, DEFAULT_BASE_URL)
    }

    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the `reqwest::Client` cannot be built.
    pub fn with_base_url(
        bucket: &str,
        tokens: Arc<TokenCache>,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            bucket: bucket.to_owned(),
            tokens,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Uploads the artifact and returns its `gs://` URI.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the file cannot be read,
    /// [`ClientError::Auth`] if no access token can be obtained, or an HTTP
    /// error if the upload is rejected. A 401 refreshes the token and
    /// retries once.
    pub async fn put(&self, artifact: &MediaArtifact) -> Result<String, ClientError> {
        let object = object_name(Utc::now(), Uuid::new_v4());

        let mut response = self.send(artifact, &object).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(bucket = %self.bucket, "storage token rejected; refreshing");
            self.tokens.invalidate().await;
            response = self.send(artifact, &object).await?;
        }

        if !response.status().is_success() {
            return Err(status_error("gcs", response).await);
        }

        let uri = format!("gs://{}/{object}", self.bucket);
        tracing::info!(%uri, "uploaded video");
        Ok(uri)
    }

    async fn send(&self, artifact: &MediaArtifact, object: &str) -> Result<Response, ClientError> {
        let bytes = tokio::fs::read(&artifact.path).await?;
        let token = self.tokens.get().await?;
        let url = format!("{}/upload/storage/v1/b/{}/o", self.base_url, self.bucket);

        let response = self
            .client
            .post(url)
            .query(&[("uploadType", "media"), ("name", object)])
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "video/mp4")
            .body(bytes)
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl Uploader for GcsUploader {
    async fn upload(&self, artifact: &MediaArtifact) -> Result<String, CollaboratorError> {
        self.put(artifact).await.map_err(CollaboratorError::from)
    }
}

/// `videos/video_<UTC timestamp>_<8 hex>.mp4`; the suffix keeps same-second
/// uploads distinct.
fn object_name(now: DateTime<Utc>, id: Uuid) -> String {
    let simple = id.simple().to_string();
    format!(
        "videos/video_{}_{}.mp4",
        now.format("%Y%m%d_%H%M%S"),
        &simple[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_name_is_timestamped_under_videos() {
        let now = DateTime::parse_from_rfc3339("2026-10-19T09:05:07Z")
            .unwrap()
            .with_timezone(&Utc);
        let id = Uuid::parse_str("0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0").unwrap();
        assert_eq!(
            object_name(now, id),
            "videos/video_20261019_090507_0f1e2d3c.mp4"
        );
    }
}
