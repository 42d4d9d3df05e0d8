//! Centralized error types for reqflow.

use thiserror::Error;

use crate::workflow::WorkflowFlag;

/// Main error type for reqflow operations.
///
/// Only caller mistakes surface through this type. Failures of injected
/// capabilities are converted into outcomes and events instead.
#[derive(Error, Debug)]
pub enum ReqflowError {
    #[error("Requirement not found: {0}")]
    RequirementNotFound(String),

    #[error("Another {0} operation is already running")]
    Busy(WorkflowFlag),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for reqflow operations.
pub type ReqflowResult<T> = Result<T, ReqflowError>;

impl ReqflowError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(global_id: impl Into<String>) -> Self {
        Self::RequirementNotFound(global_id.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
