//! Run lifecycle types.
//!
//! A run moves `started → success` or `started → error`, exactly once.
//! [`RunState`] carries the fields that only exist in a given status so a
//! success without an output location (or an error without a detail) cannot
//! be represented.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Started,
    Success,
    Error,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Started)
    }

    /// Only `started` may move, and only to a terminal status.
    #[must_use]
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Started, RunStatus::Success | RunStatus::Error)
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(RunStatus::Started),
            "success" => Ok(RunStatus::Success),
            "error" => Ok(RunStatus::Error),
            other => Err(CoreError::InvalidRunStatus(other.to_string())),
        }
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Cli,
    Scheduler,
    Api,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerSource::Cli => "cli",
            TriggerSource::Scheduler => "scheduler",
            TriggerSource::Api => "api",
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerSource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cli" => Ok(TriggerSource::Cli),
            "scheduler" => Ok(TriggerSource::Scheduler),
            "api" => Ok(TriggerSource::Api),
            other => Err(CoreError::InvalidTriggerSource(other.to_string())),
        }
    }
}

/// Status plus the data that only exists for that status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunState {
    Started,
    Success { output_location: String },
    Error { error_detail: String },
}

impl RunState {
    #[must_use]
    pub fn status(&self) -> RunStatus {
        match self {
            RunState::Started => RunStatus::Started,
            RunState::Success { .. } => RunStatus::Success,
            RunState::Error { .. } => RunStatus::Error,
        }
    }

    /// Rebuilds a state from flat ledger columns.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRunStatus`] for an unknown status string and
    /// [`CoreError::InconsistentRun`] when the status-specific column is missing.
    pub fn from_columns(
        run_id: i64,
        status: &str,
        output_location: Option<String>,
        error_detail: Option<String>,
    ) -> Result<Self, CoreError> {
        match status.parse::<RunStatus>()? {
            RunStatus::Started => Ok(RunState::Started),
            RunStatus::Success => output_location
                .map(|output_location| RunState::Success { output_location })
                .ok_or_else(|| CoreError::InconsistentRun {
                    run_id,
                    reason: "success without output_location".to_string(),
                }),
            RunStatus::Error => error_detail
                .map(|error_detail| RunState::Error { error_detail })
                .ok_or_else(|| CoreError::InconsistentRun {
                    run_id,
                    reason: "error without error_detail".to_string(),
                }),
        }
    }

    #[must_use]
    pub fn output_location(&self) -> Option<&str> {
        match self {
            RunState::Success { output_location } => Some(output_location),
            _ => None,
        }
    }

    #[must_use]
    pub fn error_detail(&self) -> Option<&str> {
        match self {
            RunState::Error { error_detail } => Some(error_detail),
            _ => None,
        }
    }
}

/// One pipeline execution as recorded in the run ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Monotonically assigned ledger id.
    pub id: i64,
    pub public_id: Uuid,
    pub genre: String,
    pub channel: String,
    pub trigger_source: TriggerSource,
    /// Product chosen by the run, recorded when the run is finalized.
    pub product_id: Option<String>,
    #[serde(flatten)]
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.state.status()
    }
}
