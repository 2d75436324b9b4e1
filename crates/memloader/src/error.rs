//! Error types for the memloader CLI.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration and input problems reported to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{what} is required. Set {env_var} or add it to {}", .path.display())]
    MissingSetting {
        what: &'static str,
        env_var: &'static str,
        path: PathBuf,
    },

    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Export file not found: {}", .0.display())]
    ExportNotFound(PathBuf),
}

impl CliError {
    pub fn invalid_value(key: &str, value: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
