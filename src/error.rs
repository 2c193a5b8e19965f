//! Error types for troupe.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.
//! Subsystems with richer failure modes (`role`, `process`, `execution`) define
//! their own typed errors; this type is what the CLI surfaces.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for troupe operations.
#[derive(Error, Debug)]
pub enum TroupeError {
    /// User provided invalid arguments or referenced something that does not exist.
    #[error("{0}")]
    UserError(String),

    /// Configuration file could not be read, parsed, or validated.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A role definition or request failed validation.
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// The agent execution finished without success.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The agent execution timed out.
    #[error("Execution timed out: {0}")]
    Timeout(String),
}

impl TroupeError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            TroupeError::UserError(_) => exit_codes::USER_ERROR,
            TroupeError::ConfigError(_) => exit_codes::USER_ERROR,
            TroupeError::ValidationError(_) => exit_codes::VALIDATION_FAILURE,
            TroupeError::ExecutionFailed(_) => exit_codes::EXECUTION_FAILURE,
            TroupeError::Timeout(_) => exit_codes::TIMEOUT,
        }
    }
}

/// Result type alias for troupe operations.
pub type Result<T> = std::result::Result<T, TroupeError>;
