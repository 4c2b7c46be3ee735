//! Error types for the core domain model.

use thiserror::Error;

/// Errors raised by domain-model validation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A visibility policy is internally inconsistent.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
