//! Error types for memloader-core.

use thiserror::Error;

/// Result type alias using memloader-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for memloader operations.
///
/// Per-candidate data problems (empty text, bad confidence, unknown
/// category) are never reported through this type. They are counted in
/// [`crate::consolidation::ProcessingStatistics`] instead.
#[derive(Error, Debug)]
pub enum Error {
    // Caller contract violations
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    // Transcript errors
    #[error("Transcript error: {0}")]
    Transcript(String),

    // Collaborator errors
    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Loader error: {0}")]
    Loader(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether a collaborator call that failed with this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Io(_))
    }
}

#[cfg(feature = "client")]
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_message() {
        let err = Error::invalid_config("confidence_threshold", "must be within [0, 1], got 1.5");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for confidence_threshold: must be within [0, 1], got 1.5"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Http("timeout".into()).is_transient());
        assert!(!Error::Extraction("no JSON".into()).is_transient());
        assert!(!Error::invalid_config("x", "y").is_transient());
    }
}
