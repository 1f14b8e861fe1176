//! Video assembly delegated to an external command.
//!
//! The command receives a JSON job on stdin and prints the path of the
//! finished video as the last non-empty line of stdout. An invocation that
//! outlives its timeout is killed and reported as a failure.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use cosme_core::Product;
use cosme_pipeline::{CollaboratorError, MediaArtifact, Renderer};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::ClientError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Serialize)]
struct RenderJob<'a> {
    product: &'a Product,
    summaries: &'a [String],
}

#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    /// Builds a renderer from a whitespace-separated command line.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for an empty command line.
    pub fn from_command_line(command: &str) -> Result<Self, ClientError> {
        let mut parts = command.split_whitespace().map(str::to_owned);
        let program = parts
            .next()
            .ok_or_else(|| ClientError::Config("render command is empty".to_owned()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the process cannot be spawned or fed,
    /// and [`ClientError::Process`] on a non-zero exit, a missing output
    /// path, or when the command runs past its timeout.
    pub async fn run(
        &self,
        product: &Product,
        summaries: &[String],
    ) -> Result<MediaArtifact, ClientError> {
        let job = serde_json::to_vec(&RenderJob { product, summaries }).map_err(|e| {
            ClientError::Deserialize {
                context: "render job".to_owned(),
                source: e,
            }
        })?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let finished = tokio::time::timeout(self.timeout, async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&job).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        })
        .await;

        // On timeout the child is dropped with the future; kill_on_drop reaps it.
        let output = finished.map_err(|_| {
            tracing::warn!(
                product_id = %product.product_id,
                timeout = ?self.timeout,
                "render command timed out"
            );
            ClientError::Process(format!("{} timed out after {:?}", self.program, self.timeout))
        })??;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(ClientError::Process(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .ok_or_else(|| ClientError::Process(format!("{} printed no output path", self.program)))?;

        tracing::info!(product_id = %product.product_id, path, "render finished");
        Ok(MediaArtifact {
            path: PathBuf::from(path),
        })
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(
        &self,
        product: &Product,
        summaries: &[String],
    ) -> Result<MediaArtifact, CollaboratorError> {
        self.run(product, summaries)
            .await
            .map_err(CollaboratorError::from)
    }
}
