//! Error types for model training, decoding and persistence.
//!
//! Every variant carries a stable numeric code and a category:
//! - 10-19: configuration
//! - 20-29: sparse storage (see [`SparseError::code`])
//! - 30-39: training and model structure
//! - 40-49: decoding
//! - 50-59: persistence
//! - 60-69: I/O

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sshmm_sparse::SparseError;
use thiserror::Error;

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration files and values.
    Config,
    /// Model construction and training.
    Training,
    /// Decoder input errors.
    Decode,
    /// Persisted model structure errors.
    Persistence,
    /// File I/O.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Training => write!(f, "training"),
            ErrorCategory::Decode => write!(f, "decode"),
            ErrorCategory::Persistence => write!(f, "persistence"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Errors raised by the super-state model and its decoders.
#[derive(Error, Debug)]
pub enum ModelError {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    // Sparse storage errors (20-29)
    #[error(transparent)]
    Sparse(#[from] SparseError),

    // Training errors (30-39)
    #[error("invalid quantization for appliance {appliance}: {reason}")]
    InvalidQuantization { appliance: usize, reason: String },

    #[error("super-state space overflows: product of state counts {state_counts:?}")]
    StateSpaceOverflow { state_counts: Vec<usize> },

    #[error("appliance {appliance} state {state} outside 0..{count}")]
    StateOutOfRange {
        appliance: usize,
        state: usize,
        count: usize,
    },

    #[error("super-state {state} outside 0..{count}")]
    SuperStateOutOfRange { state: usize, count: usize },

    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("no observations to train on")]
    NoObservations,

    #[error("model is already trained")]
    AlreadyTrained,

    // Decode errors (40-49)
    #[error("observation {observation} outside 0..{count}")]
    ObservationOutOfRange { observation: usize, count: usize },

    #[error("model has not been trained")]
    NotTrained,

    #[error("decode worker thread panicked")]
    WorkerPanicked,

    // Persistence errors (50-59)
    #[error("invalid model record: {0}")]
    InvalidRecord(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // I/O errors (60-69)
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ModelError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ModelError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the stable error code for this error.
    pub fn code(&self) -> u32 {
        match self {
            ModelError::Config(_) => 10,
            ModelError::Sparse(err) => err.code(),
            ModelError::InvalidQuantization { .. } => 30,
            ModelError::StateSpaceOverflow { .. } => 31,
            ModelError::StateOutOfRange { .. } => 32,
            ModelError::SuperStateOutOfRange { .. } => 33,
            ModelError::LengthMismatch { .. } => 34,
            ModelError::NoObservations => 35,
            ModelError::AlreadyTrained => 36,
            ModelError::ObservationOutOfRange { .. } => 40,
            ModelError::NotTrained => 41,
            ModelError::WorkerPanicked => 42,
            ModelError::InvalidRecord(_) => 50,
            ModelError::Json(_) => 51,
            ModelError::Io { .. } => 60,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ModelError::Config(_) => ErrorCategory::Config,

            ModelError::Sparse(SparseError::CorruptRecord { .. }) => ErrorCategory::Persistence,
            ModelError::Sparse(_)
            | ModelError::InvalidQuantization { .. }
            | ModelError::StateSpaceOverflow { .. }
            | ModelError::StateOutOfRange { .. }
            | ModelError::SuperStateOutOfRange { .. }
            | ModelError::LengthMismatch { .. }
            | ModelError::NoObservations
            | ModelError::AlreadyTrained => ErrorCategory::Training,

            ModelError::ObservationOutOfRange { .. }
            | ModelError::NotTrained
            | ModelError::WorkerPanicked => ErrorCategory::Decode,

            ModelError::InvalidRecord(_) | ModelError::Json(_) => ErrorCategory::Persistence,

            ModelError::Io { .. } => ErrorCategory::Io,
        }
    }
}
