use std::time::Duration;

use async_trait::async_trait;
use cosme_pipeline::{CollaboratorError, Notifier, RunNotice, RunOutcome};
use reqwest::Client;
use serde_json::json;

use crate::error::{status_error, ClientError};

/// Posts run results to a Slack incoming webhook.
pub struct SlackWebhookNotifier {
    client: Client,
    webhook_url: String,
}

impl SlackWebhookNotifier {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(webhook_url: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.to_owned(),
        })
    }

    /// # Errors
    ///
    /// Returns [`ClientError`] if the webhook call fails.
    pub async fn post(&self, notice: &RunNotice) -> Result<(), ClientError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "text": message(notice) }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error("slack", response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackWebhookNotifier {
    async fn notify(&self, notice: &RunNotice) -> Result<(), CollaboratorError> {
        self.post(notice).await.map_err(CollaboratorError::from)
    }
}

/// Logs run results; used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notice: &RunNotice) -> Result<(), CollaboratorError> {
        match &notice.outcome {
            RunOutcome::Success { .. } => tracing::info!(run_id = notice.run_id, "{}", message(notice)),
            RunOutcome::Error { .. } => tracing::warn!(run_id = notice.run_id, "{}", message(notice)),
        }
        Ok(())
    }
}

fn message(notice: &RunNotice) -> String {
    match &notice.outcome {
        RunOutcome::Success {
            product_id,
            output_location,
        } => format!(
            ":white_check_mark: run {} ({}/{}) succeeded: product {product_id} -> {output_location}",
            notice.run_id, notice.genre, notice.channel
        ),
        RunOutcome::Error { error_detail, .. } => format!(
            ":x: run {} ({}/{}) failed: {error_detail}",
            notice.run_id, notice.genre, notice.channel
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosme_pipeline::FailureKind;

    #[test]
    fn failure_message_carries_detail() {
        let notice = RunNotice {
            run_id: 4,
            genre: "skincare".to_owned(),
            channel: "drugstore".to_owned(),
            outcome: RunOutcome::Error {
                kind: FailureKind::RendererFailed,
                product_id: Some("p1".to_owned()),
                error_detail: "renderer_failed: exit status 1".to_owned(),
            },
        };
        let text = message(&notice);
        assert!(text.contains("run 4"));
        assert!(text.contains("renderer_failed: exit status 1"));
    }
}
