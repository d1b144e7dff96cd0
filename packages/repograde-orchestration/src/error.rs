use repograde_storage::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::producer::ProducerError;
use crate::source::{SourceError, ValidationError};

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Producer error: {0}")]
    Producer(#[from] ProducerError),

    #[error("Source host error: {0}")]
    Source(#[from] SourceError),

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl OrchestratorError {
    pub fn missing_data<E: std::fmt::Display>(e: E) -> Self {
        Self::MissingData(e.to_string())
    }

    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::Config(e.to_string())
    }

    /// Whole-request failures that must not be retried
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Validation(_)
                | OrchestratorError::Producer(ProducerError::Validation(_))
        )
    }
}

/// Error category for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Transient error - retry automatically (e.g., timeout, connection)
    Transient,
    /// Permanent error - don't retry (e.g., unusable repository, missing inputs)
    Permanent,
    /// Infrastructure error - alert ops (e.g., cache backend down)
    Infrastructure,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::Infrastructure => "infrastructure",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "transient" => Ok(ErrorCategory::Transient),
            "permanent" => Ok(ErrorCategory::Permanent),
            "infrastructure" => Ok(ErrorCategory::Infrastructure),
            _ => Err(OrchestratorError::config(format!(
                "Invalid error category: {}",
                s
            ))),
        }
    }

    pub fn is_retryable(&self) -> bool {
        *self != ErrorCategory::Permanent
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure marker recorded against a single category
///
/// These are values attached to a record, not errors returned from a call:
/// one category failing never aborts its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum CategoryError {
    /// The repository has nothing to analyze
    Validation(String),
    /// No result within the collection bound
    Timeout(String),
    /// Producer failed for infrastructure reasons
    Transport(String),
    /// Reading the cached value failed
    Store(String),
    /// Inputs required by a derived category are absent
    MissingData(String),
    /// Task was cancelled before reporting
    Aborted(String),
}

impl CategoryError {
    pub fn kind(&self) -> &'static str {
        match self {
            CategoryError::Validation(_) => "validation",
            CategoryError::Timeout(_) => "timeout",
            CategoryError::Transport(_) => "transport",
            CategoryError::Store(_) => "store",
            CategoryError::MissingData(_) => "missing_data",
            CategoryError::Aborted(_) => "aborted",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CategoryError::Validation(m)
            | CategoryError::Timeout(m)
            | CategoryError::Transport(m)
            | CategoryError::Store(m)
            | CategoryError::MissingData(m)
            | CategoryError::Aborted(m) => m,
        }
    }

    pub fn error_category(&self) -> ErrorCategory {
        match self {
            CategoryError::Validation(_) | CategoryError::MissingData(_) => {
                ErrorCategory::Permanent
            }
            CategoryError::Store(_) => ErrorCategory::Infrastructure,
            CategoryError::Timeout(_) | CategoryError::Transport(_) | CategoryError::Aborted(_) => {
                ErrorCategory::Transient
            }
        }
    }

    /// `{"error": {"kind": ..., "message": ...}}`
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "kind": self.kind(),
                "message": self.message(),
            }
        })
    }
}

impl std::fmt::Display for CategoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl From<ProducerError> for CategoryError {
    fn from(err: ProducerError) -> Self {
        let message = err.to_string();
        match err {
            ProducerError::Validation(_) => CategoryError::Validation(message),
            ProducerError::Timeout(_) => CategoryError::Timeout(message),
            ProducerError::Transport(_)
            | ProducerError::Unsupported(_)
            | ProducerError::Mismatch { .. } => CategoryError::Transport(message),
        }
    }
}

impl From<&OrchestratorError> for CategoryError {
    fn from(err: &OrchestratorError) -> Self {
        let message = err.to_string();
        match err {
            OrchestratorError::Validation(_) => CategoryError::Validation(message),
            OrchestratorError::Storage(_) => CategoryError::Store(message),
            OrchestratorError::Producer(e) => e.clone().into(),
            OrchestratorError::MissingData(_) => CategoryError::MissingData(message),
            OrchestratorError::Timeout(_) => CategoryError::Timeout(message),
            OrchestratorError::Source(_)
            | OrchestratorError::InvalidStateTransition { .. }
            | OrchestratorError::Config(_) => CategoryError::Transport(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repograde_storage::Category;

    #[test]
    fn test_error_category_roundtrip() {
        for category in &[
            ErrorCategory::Transient,
            ErrorCategory::Permanent,
            ErrorCategory::Infrastructure,
        ] {
            let s = category.as_str();
            let parsed = ErrorCategory::from_str(s).unwrap();
            assert_eq!(*category, parsed);
        }
    }

    #[test]
    fn test_error_category_invalid() {
        assert!(ErrorCategory::from_str("invalid").is_err());
    }

    #[test]
    fn test_validation_is_not_retryable() {
        let err = CategoryError::Validation("no Go code".to_string());
        assert!(!err.error_category().is_retryable());

        let err = CategoryError::Timeout("after 50ms".to_string());
        assert!(err.error_category().is_retryable());
    }

    #[test]
    fn test_producer_error_mapping() {
        let err: CategoryError = ProducerError::Timeout("lambda".to_string()).into();
        assert_eq!(err.kind(), "timeout");

        let err: CategoryError = ProducerError::Unsupported(Category::Score).into();
        assert_eq!(err.kind(), "transport");

        let err: CategoryError = ProducerError::Validation("empty".to_string()).into();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_category_error_document() {
        let doc = CategoryError::Transport("connection reset".to_string()).to_document();
        assert_eq!(doc["error"]["kind"], "transport");
        assert_eq!(doc["error"]["message"], "connection reset");
    }

    #[test]
    fn test_category_error_serde() {
        let err = CategoryError::MissingData("score".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, r#"{"kind":"missing_data","message":"score"}"#);
        let back: CategoryError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_storage_error_maps_to_store_marker() {
        let err = OrchestratorError::from(repograde_storage::StorageError::database("locked"));
        let marker = CategoryError::from(&err);
        assert_eq!(marker.kind(), "store");
        assert!(!err.is_validation());
    }
}
