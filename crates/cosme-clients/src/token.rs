//! Cloud Storage access tokens.
//!
//! Tokens are minted from a service account through `gcp_auth` and cached
//! until shortly before they expire. Concurrent callers that find the cache
//! stale wait on one refresh instead of each minting their own token.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use tokio::sync::RwLock;

use crate::error::ClientError;

/// Read/write scope for object uploads.
pub const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Seconds before the reported expiry at which a token is refreshed.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }

    /// Past the refresh margin but not yet expired.
    fn is_usable(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Mints a new access token on every call.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> Result<AccessToken, ClientError>;
}

/// Tokens from a service-account key file.
pub struct ServiceAccountTokens {
    provider: Arc<dyn TokenProvider>,
}

impl ServiceAccountTokens {
    /// # Errors
    ///
    /// Returns [`ClientError::Auth`] if the key file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ClientError> {
        let account = CustomServiceAccount::from_file(path).map_err(|e| {
            ClientError::Auth(format!(
                "cannot load service account {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self {
            provider: Arc::new(account),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokens {
    async fn fetch(&self) -> Result<AccessToken, ClientError> {
        let token = self
            .provider
            .token(&[STORAGE_SCOPE])
            .await
            .map_err(|e| ClientError::Auth(e.to_string()))?;
        Ok(AccessToken {
            value: token.as_str().to_owned(),
            expires_at: token.expires_at(),
        })
    }
}

pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    cached: RwLock<Option<AccessToken>>,
}

impl TokenCache {
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
        }
    }

    /// Returns a cached token, refreshing it when inside the refresh margin.
    ///
    /// A failed refresh falls back to the cached token while it has not
    /// actually expired.
    ///
    /// # Errors
    ///
    /// Returns the source's error when no usable token remains.
    pub async fn get(&self) -> Result<String, ClientError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
                return Ok(token.value.clone());
            }
        }

        let mut cached = self.cached.write().await;
        // Another caller may have refreshed while this one waited.
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        match self.source.fetch().await {
            Ok(token) => {
                tracing::debug!(expires_at = %token.expires_at, "storage token refreshed");
                let value = token.value.clone();
                *cached = Some(token);
                Ok(value)
            }
            Err(e) => match cached.as_ref().filter(|t| t.is_usable(Utc::now())) {
                Some(token) => {
                    tracing::warn!(error = %e, "storage token refresh failed; reusing current token");
                    Ok(token.value.clone())
                }
                None => Err(e),
            },
        }
    }

    /// Drops the cached token so the next [`TokenCache::get`] mints a new one.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}
