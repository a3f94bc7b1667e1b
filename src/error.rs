//! Error types.
//!
//! Two layers:
//! - [`ModelError`]: typed validation failures raised by constructors and the
//!   model/diagnostics code (never a panic, never silently corrected).
//! - [`AppError`]: what the binary reports, carrying a process exit code.
//!
//! Exit codes:
//! - 2: invalid input (arguments, CSV rows, hyperparameters)
//! - 3: insufficient data
//! - 4: numerical / sampler failure
//! - 5: sampling cancelled

use thiserror::Error;

use crate::fit::sampler::SamplerError;

/// Validation failures of the data model and the likelihood inputs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Invalid simplex: weights sum to {sum} (min component {min}); expected non-negative weights summing to 1.")]
    InvalidSimplex { sum: f64, min: f64 },

    #[error("Invalid correlation Cholesky factor: {0}")]
    InvalidCholesky(String),

    #[error("Non-positive {what}: {value}")]
    NonPositiveLength { what: &'static str, value: f64 },

    #[error("Elapsed days must be > 0, got {0}")]
    NonPositiveDays(f64),

    #[error("Unknown site '{0}'")]
    UnknownSite(String),

    #[error("Duplicate site id '{0}'")]
    DuplicateSite(String),

    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Invalid hyperparameter `{name}`: {reason}")]
    InvalidHyperparameter { name: &'static str, reason: String },

    #[error("Non-finite {0}")]
    NonFinite(&'static str),
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        AppError::new(2, err.to_string())
    }
}

impl From<SamplerError> for AppError {
    fn from(err: SamplerError) -> Self {
        let code = match err {
            SamplerError::Cancelled => 5,
            _ => 4,
        };
        AppError::new(code, err.to_string())
    }
}
