//! Error types for deployment data processing

use thiserror::Error;

/// Main error type for the deployment data stages
#[derive(Error, Debug)]
pub enum DeployDataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Deployment error: {0}")]
    DeployError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How a failure is handled by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Requires a human to fix configuration; the stage aborts
    Fatal,

    /// External call failed after its retry budget; surfaces as a deploy failure
    Transient,

    /// Bookkeeping failure; logged and the stage output is skipped
    Degraded,
}

impl DeployDataError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployDataError::ConfigError(_)
            | DeployDataError::ValidationError(_)
            | DeployDataError::YamlError(_) => ErrorKind::Fatal,
            DeployDataError::HttpError(_) | DeployDataError::DeployError(_) => {
                ErrorKind::Transient
            }
            DeployDataError::IoError(_)
            | DeployDataError::JsonError(_)
            | DeployDataError::StateError(_)
            | DeployDataError::Internal(_) => ErrorKind::Degraded,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            DeployDataError::ConfigError("missing fixVersion".into()).kind(),
            ErrorKind::Fatal
        );
        assert_eq!(
            DeployDataError::DeployError("install failed".into()).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            DeployDataError::StateError("no quality section".into()).kind(),
            ErrorKind::Degraded
        );
        assert!(DeployDataError::ValidationError("date".into()).is_fatal());
    }
}
