//! Adapters that connect the run engine to external services: the ranking
//! feed, the review summarizer, the render command, object storage and the
//! notification webhook.

pub mod error;
pub mod gcs;
pub mod notify;
pub mod openai;
pub mod ranking;
pub mod render;
pub(crate) mod retry;
pub mod token;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cosme_core::{AppConfig, Product};
use cosme_pipeline::{
    CollaboratorError, Collaborators, MediaArtifact, Notifier, Renderer, Scraper, Summarizer,
    Uploader,
};

pub use error::ClientError;
pub use gcs::GcsUploader;
pub use notify::{SlackWebhookNotifier, TracingNotifier};
pub use openai::OpenAiSummarizer;
pub use ranking::{RankingFeedClient, RankingFile, RankingItem};
pub use render::CommandRenderer;
pub use token::{AccessToken, ServiceAccountTokens, TokenCache, TokenSource};

/// Stands in for a collaborator whose settings are absent. Every call fails
/// with [`CollaboratorError::NotConfigured`], so runs are recorded as errors
/// instead of the process refusing to start.
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured(pub &'static str);

#[async_trait]
impl Summarizer for Unconfigured {
    async fn summarize(&self, _product: &Product) -> Result<Vec<String>, CollaboratorError> {
        Err(CollaboratorError::NotConfigured(self.0))
    }
}

#[async_trait]
impl Renderer for Unconfigured {
    async fn render(
        &self,
        _product: &Product,
        _summaries: &[String],
    ) -> Result<MediaArtifact, CollaboratorError> {
        Err(CollaboratorError::NotConfigured(self.0))
    }
}

#[async_trait]
impl Uploader for Unconfigured {
    async fn upload(&self, _artifact: &MediaArtifact) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::NotConfigured(self.0))
    }
}

/// Builds the run collaborators from configuration.
///
/// Missing settings yield an [`Unconfigured`] placeholder and a warning.
///
/// # Errors
///
/// Returns [`ClientError`] if a configured client cannot be constructed.
pub fn build_collaborators(config: &AppConfig) -> Result<Collaborators, ClientError> {
    let timeout = config.http_timeout_secs;

    let summarizer: Arc<dyn Summarizer> = match config.openai_api_key.as_deref() {
        Some(key) => Arc::new(
            OpenAiSummarizer::with_base_url(
                key,
                &config.openai_model,
                timeout,
                &config.openai_base_url,
            )?
            .with_retries(config.summarizer_max_retries, 1_000),
        ),
        None => {
            tracing::warn!("OPENAI_API_KEY not set; summary generation will fail");
            Arc::new(Unconfigured("summarizer"))
        }
    };

    let renderer: Arc<dyn Renderer> = match config.render_command.as_deref() {
        Some(command) => Arc::new(
            CommandRenderer::from_command_line(command)?
                .with_timeout(Duration::from_secs(config.render_timeout_secs)),
        ),
        None => {
            tracing::warn!("COSME_RENDER_COMMAND not set; rendering will fail");
            Arc::new(Unconfigured("renderer"))
        }
    };

    let uploader: Arc<dyn Uploader> = match (
        config.storage_bucket.as_deref(),
        config.gcs_credentials_path.as_deref(),
    ) {
        (Some(bucket), Some(credentials)) => {
            let tokens = TokenCache::new(Arc::new(ServiceAccountTokens::from_file(credentials)?));
            Arc::new(GcsUploader::new(bucket, Arc::new(tokens), timeout)?)
        }
        _ => {
            tracing::warn!(
                "COSME_STORAGE_BUCKET or GOOGLE_APPLICATION_CREDENTIALS not set; uploads will fail"
            );
            Arc::new(Unconfigured("uploader"))
        }
    };

    let notifier: Arc<dyn Notifier> = match config.notify_webhook_url.as_deref() {
        Some(url) => Arc::new(SlackWebhookNotifier::new(url, timeout)?),
        None => Arc::new(TracingNotifier),
    };

    Ok(Collaborators {
        summarizer,
        renderer,
        uploader,
        notifier,
    })
}

/// Picks the ranking source: a local file when given, else the configured
/// feed. Returns `Ok(None)` when neither is available.
///
/// # Errors
///
/// Returns [`ClientError`] if the feed client cannot be constructed.
pub fn build_scraper(
    config: &AppConfig,
    file: Option<PathBuf>,
) -> Result<Option<Arc<dyn Scraper>>, ClientError> {
    if let Some(path) = file {
        return Ok(Some(Arc::new(RankingFile::new(&path))));
    }
    match config.ranking_feed_url.as_deref() {
        Some(url) => Ok(Some(Arc::new(RankingFeedClient::new(
            url,
            config.http_timeout_secs,
            &config.user_agent,
        )?))),
        None => Ok(None),
    }
}
