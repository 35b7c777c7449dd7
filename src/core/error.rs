//! Error handling for the rankforest training engine.
//!
//! A single crate-wide error enum covers the conditions that are allowed
//! to surface to callers. Everything else (degenerate splits, empty
//! dropout sets, checkpoint write failures) is recovered where it occurs
//! and never reaches this type.

use std::io;
use thiserror::Error;

/// Main error type for the rankforest library.
#[derive(Error, Debug)]
pub enum RankForestError {
    /// Invalid configuration detected before any training work.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Dataset construction or shape errors.
    #[error("Dataset error: {message}")]
    Dataset { message: String },

    /// Training-time errors that cannot be recovered locally.
    #[error("Training error: {message}")]
    Training { message: String },

    /// Ensemble structure errors (capacity exhausted, weight vector
    /// length mismatch).
    #[error("Ensemble error: {message}")]
    Ensemble { message: String },

    /// A request would consume the entire ensemble or another finite
    /// resource; the run is aborted with no mutation.
    #[error("Resource exhausted: {message}")]
    Resource { message: String },

    /// A saved model's hyperparameters do not match the current
    /// configuration; the import is rejected with no state mutated.
    #[error("Incompatible model: {message}")]
    IncompatibleModel { message: String },

    /// Snapshot encoding/decoding errors.
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// File I/O errors from the snapshot store.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// Type alias for Results using RankForestError.
pub type Result<T> = std::result::Result<T, RankForestError>;

impl RankForestError {
    /// Create a configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        RankForestError::Config {
            message: message.into(),
        }
    }

    /// Create a dataset error.
    pub fn dataset<S: Into<String>>(message: S) -> Self {
        RankForestError::Dataset {
            message: message.into(),
        }
    }

    /// Create a training error.
    pub fn training<S: Into<String>>(message: S) -> Self {
        RankForestError::Training {
            message: message.into(),
        }
    }

    /// Create an ensemble error.
    pub fn ensemble<S: Into<String>>(message: S) -> Self {
        RankForestError::Ensemble {
            message: message.into(),
        }
    }

    /// Create a resource exhaustion error.
    pub fn resource<S: Into<String>>(message: S) -> Self {
        RankForestError::Resource {
            message: message.into(),
        }
    }

    /// Create an incompatible model error.
    pub fn incompatible_model<S: Into<String>>(message: S) -> Self {
        RankForestError::IncompatibleModel {
            message: message.into(),
        }
    }

    /// Get the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            RankForestError::Config { .. } => "config",
            RankForestError::Dataset { .. } => "dataset",
            RankForestError::Training { .. } => "training",
            RankForestError::Ensemble { .. } => "ensemble",
            RankForestError::Resource { .. } => "resource",
            RankForestError::IncompatibleModel { .. } => "incompatible_model",
            RankForestError::Serialization { .. } => "serialization",
            RankForestError::Io { .. } => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RankForestError::config("unknown sampling type");
        assert_eq!(err.category(), "config");
        assert!(err.to_string().contains("unknown sampling type"));

        let err = RankForestError::resource("pruning would remove all trees");
        assert_eq!(err.category(), "resource");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: RankForestError = io_err.into();
        assert_eq!(err.category(), "io");
    }
}
