pub mod app_config;
pub mod clock;
pub mod config;
pub mod products;
pub mod runs;
pub mod summaries;
pub mod targets;

pub use app_config::{AppConfig, Environment};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_app_config, load_app_config_from_env};
pub use products::{Product, ScrapedProduct};
pub use runs::{RunRecord, RunState, RunStatus, TriggerSource};
pub use summaries::{SummaryEntry, MAX_SUMMARIES, MAX_SUMMARY_CHARS};
pub use targets::{load_targets, RunTarget, TargetsFile};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read targets file {path}: {source}")]
    TargetsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse targets file: {0}")]
    TargetsFileParse(#[from] serde_yaml::Error),

    #[error("targets validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid run status: {0}")]
    InvalidRunStatus(String),

    #[error("invalid trigger source: {0}")]
    InvalidTriggerSource(String),

    #[error("run {run_id} is inconsistent: {reason}")]
    InconsistentRun { run_id: i64, reason: String },
}
