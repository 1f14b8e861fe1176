use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub targets_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Minimum hours before a used product may be selected again.
    pub cooldown_hours: u32,
    /// Maximum age, in hours, of a cached summary before it is regenerated.
    pub summary_freshness_hours: u32,
    /// Runs left in `started` longer than this are swept to `error`.
    pub stale_run_minutes: u32,
    pub min_products: usize,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub ranking_feed_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub summarizer_max_retries: u32,
    pub render_command: Option<String>,
    /// Upper bound on one render command invocation.
    pub render_timeout_secs: u64,
    pub storage_bucket: Option<String>,
    /// Service-account key file used to mint storage access tokens.
    pub gcs_credentials_path: Option<PathBuf>,
    pub notify_webhook_url: Option<String>,
    pub run_cron: String,
    pub sweep_cron: String,
}

impl AppConfig {
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::hours(i64::from(self.cooldown_hours))
    }

    #[must_use]
    pub fn summary_freshness(&self) -> Duration {
        Duration::hours(i64::from(self.summary_freshness_hours))
    }

    #[must_use]
    pub fn stale_run_after(&self) -> Duration {
        Duration::minutes(i64::from(self.stale_run_minutes))
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("targets_path", &self.targets_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("cooldown_hours", &self.cooldown_hours)
            .field("summary_freshness_hours", &self.summary_freshness_hours)
            .field("stale_run_minutes", &self.stale_run_minutes)
            .field("min_products", &self.min_products)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("ranking_feed_url", &self.ranking_feed_url)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_model", &self.openai_model)
            .field("summarizer_max_retries", &self.summarizer_max_retries)
            .field("render_command", &self.render_command)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("storage_bucket", &self.storage_bucket)
            .field("gcs_credentials_path", &self.gcs_credentials_path)
            .field(
                "notify_webhook_url",
                &self.notify_webhook_url.as_ref().map(|_| "[redacted]"),
            )
            .field("run_cron", &self.run_cron)
            .field("sweep_cron", &self.sweep_cron)
            .finish()
    }
}
