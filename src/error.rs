//! Error types for the autoop harness
//!
//! Every fallible operation returns [`Result`]. Variants fall into the
//! categories reported by [`AutoOpError::category`]:
//! - configuration errors, raised before any data is touched
//! - usage errors, raised when an API is called out of order or with
//!   mismatched shapes
//! - data errors, raised while reading or converting tabular data
//! - internal errors (serialization, IO, numerical failures)

use std::fmt;

use thiserror::Error;

/// Result type alias for autoop operations
pub type Result<T> = std::result::Result<T, AutoOpError>;

/// Main error type for the autoop harness
#[derive(Error, Debug)]
pub enum AutoOpError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible task: {0}")]
    IncompatibleTask(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Feature count mismatch: model was fitted on {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("Length mismatch: {predictions} predictions for {ground_truth} ground truth values")]
    LengthMismatch {
        predictions: usize,
        ground_truth: usize,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse classification of an [`AutoOpError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Usage,
    Data,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Usage => "usage",
            ErrorCategory::Data => "data",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl AutoOpError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AutoOpError::ConfigError(_)
            | AutoOpError::InvalidParameter { .. }
            | AutoOpError::IncompatibleTask(_) => ErrorCategory::Configuration,
            AutoOpError::ModelNotFitted
            | AutoOpError::FeatureMismatch { .. }
            | AutoOpError::LengthMismatch { .. }
            | AutoOpError::ShapeError { .. }
            | AutoOpError::UnknownModel(_)
            | AutoOpError::UnknownMetric(_)
            | AutoOpError::FeatureNotFound(_) => ErrorCategory::Usage,
            AutoOpError::DataError(_) => ErrorCategory::Data,
            AutoOpError::ComputationError(_)
            | AutoOpError::SerializationError(_)
            | AutoOpError::IoError(_) => ErrorCategory::Internal,
        }
    }

    /// Shorthand for an [`AutoOpError::InvalidParameter`]
    pub fn invalid_param(name: &str, value: impl fmt::Display, reason: &str) -> Self {
        AutoOpError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<polars::error::PolarsError> for AutoOpError {
    fn from(err: polars::error::PolarsError) -> Self {
        AutoOpError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for AutoOpError {
    fn from(err: serde_json::Error) -> Self {
        AutoOpError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for AutoOpError {
    fn from(err: bincode::Error) -> Self {
        AutoOpError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for AutoOpError {
    fn from(err: ndarray::ShapeError) -> Self {
        AutoOpError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
