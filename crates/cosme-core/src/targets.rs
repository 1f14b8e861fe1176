use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// A `(genre, channel)` pair a run is executed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunTarget {
    pub genre: String,
    pub channel: String,
}

impl RunTarget {
    #[must_use]
    pub fn new(genre: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            genre: genre.into(),
            channel: channel.into(),
        }
    }
}

impl std::fmt::Display for RunTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.genre, self.channel)
    }
}

#[derive(Debug, Deserialize)]
pub struct TargetsFile {
    pub targets: Vec<RunTarget>,
}

/// Load and validate the scheduled run targets from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_targets(path: &Path) -> Result<TargetsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::TargetsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_targets(&content)
}

fn parse_targets(content: &str) -> Result<TargetsFile, ConfigError> {
    let mut targets_file: TargetsFile = serde_yaml::from_str(content)?;
    // Stored trimmed: the pair is a lock key and a catalog filter.
    for target in &mut targets_file.targets {
        *target = RunTarget::new(target.genre.trim(), target.channel.trim());
    }
    validate_targets(&targets_file)?;
    Ok(targets_file)
}

fn validate_targets(targets_file: &TargetsFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for target in &targets_file.targets {
        if target.genre.is_empty() || target.channel.is_empty() {
            return Err(ConfigError::Validation(
                "target genre and channel must be non-empty".to_string(),
            ));
        }

        if !seen.insert(target) {
            return Err(ConfigError::Validation(format!(
                "duplicate target: '{target}'"
            )));
        }
    }

    Ok(())
}
