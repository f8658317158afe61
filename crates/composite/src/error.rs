//! Error types for the Vitrine composite loader.
//!
//! `LoaderError` is `Clone` because a single in-flight load hands the same
//! outcome to every caller that coalesced onto it.

use thiserror::Error;

/// Errors surfaced by the composite loader's public operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    /// Unknown part identifier (caller error, nothing was changed)
    #[error("Part not found: {0}")]
    PartNotFound(String),

    /// Fetching the part's asset failed or timed out
    ///
    /// The part stays absent from the cache and is retried on the next request.
    #[error("Failed to load {name} ({part}): {cause}")]
    LoadFailure {
        part: String,
        name: String,
        cause: String,
    },

    /// Request does not match the configured groups
    #[error("Invalid group state for {group}: {reason}")]
    InvalidGroupState {
        group: String,
        reason: String,
    },

    /// Catalog or loader configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LoaderError {
    /// Part identifier this error refers to, if any.
    pub fn part(&self) -> Option<&str> {
        match self {
            Self::PartNotFound(part) => Some(part),
            Self::LoadFailure { part, .. } => Some(part),
            Self::InvalidGroupState { .. } | Self::Config(_) => None,
        }
    }

    /// True for failures that a later request may recover from.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LoadFailure { .. })
    }
}

/// Errors reported by an [`AssetSource`](crate::source::AssetSource).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Result type for composite loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_failure_names_part() {
        let err = LoaderError::LoadFailure {
            part: "roof3".into(),
            name: "Pitched roof".into(),
            cause: FetchError::Network("connection reset".into()).to_string(),
        };

        assert_eq!(err.part(), Some("roof3"));
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Failed to load Pitched roof (roof3): Network error: connection reset"
        );
    }

    #[test]
    fn test_group_errors_are_not_retryable() {
        let err = LoaderError::InvalidGroupState {
            group: "roof".into(),
            reason: "no such exclusive group".into(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.part(), None);
    }
}
