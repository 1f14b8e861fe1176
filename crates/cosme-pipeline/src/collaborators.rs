//! Capabilities the engine consumes from the outside world.
//!
//! Transport, credentials and retries belong to the implementations in
//! `cosme-clients`; the engine only sees success or a [`CollaboratorError`].

use std::path::PathBuf;

use async_trait::async_trait;
use cosme_core::{Product, RunTarget, ScrapedProduct};
use thiserror::Error;

use crate::orchestrator::RunNotice;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unusable response: {0}")]
    InvalidResponse(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A rendered video on local disk, waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaArtifact {
    pub path: PathBuf,
}

/// Fetches the current ranking for a `(genre, channel)` target.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn fetch_ranking(
        &self,
        target: &RunTarget,
    ) -> Result<Vec<ScrapedProduct>, CollaboratorError>;
}

/// Produces short review impressions for a product.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Returns the impressions in display order.
    async fn summarize(&self, product: &Product) -> Result<Vec<String>, CollaboratorError>;
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        product: &Product,
        summaries: &[String],
    ) -> Result<MediaArtifact, CollaboratorError>;
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Stores the artifact durably and returns its storage URI.
    async fn upload(&self, artifact: &MediaArtifact) -> Result<String, CollaboratorError>;
}

/// Best-effort announcement of a finished run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &RunNotice) -> Result<(), CollaboratorError>;
}
