//! Error types for sparse storage operations.

use thiserror::Error;

/// Errors raised by the hash, vector and matrix containers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SparseError {
    /// The minimal perfect hash could not be built within its budget.
    #[error(
        "minimal perfect hash construction failed for {keys} keys \
         (last table size {table_size}, {attempts} attempts)"
    )]
    MphConstruction {
        keys: usize,
        table_size: usize,
        attempts: usize,
    },

    /// The key set handed to the hash builder contains a repeated key.
    #[error("duplicate key in perfect hash key set: {0}")]
    DuplicateKey(String),

    /// Index outside the logical extent of a container.
    #[error("index {index} out of range for length {length}")]
    IndexOutOfRange { index: usize, length: usize },

    /// A matrix key must address a column or a (row, col) cell.
    #[error("matrix key must have 1 or 2 components, got {arity}")]
    InvalidMatrixKey { arity: usize },

    /// A stored matrix cell has no row total to normalize against.
    #[error("matrix '{matrix}' has no row total for row {row}")]
    MissingRowTotal { matrix: String, row: usize },

    /// Row totals were dropped by normalization and are needed again.
    #[error("matrix '{matrix}' no longer tracks row totals")]
    RowTotalsDiscarded { matrix: String },

    /// A persisted record is inconsistent with the container it describes.
    #[error("corrupt record '{name}': {reason}")]
    CorruptRecord { name: String, reason: String },
}

impl SparseError {
    /// Stable code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            SparseError::MphConstruction { .. } => 20,
            SparseError::DuplicateKey(_) => 21,
            SparseError::IndexOutOfRange { .. } => 22,
            SparseError::InvalidMatrixKey { .. } => 23,
            SparseError::MissingRowTotal { .. } => 24,
            SparseError::CorruptRecord { .. } => 25,
            SparseError::RowTotalsDiscarded { .. } => 26,
        }
    }
}

/// Result type alias for sparse storage operations.
pub type Result<T> = std::result::Result<T, SparseError>;
