//! Sparse storage primitives for super-state hidden Markov models.
//!
//! - [`mph`]: displacement-based minimal perfect hashing over a fixed key set
//! - [`CompressedVector`]: a 1-D container that stores only non-zero entries
//! - [`CompressedMatrix`]: a column-keyed collection of compressed vectors
//!   with row-total bookkeeping for row-stochastic normalization
//!
//! Every container picks one of three [`Indexing`] strategies at
//! construction time and keeps it for its whole lifetime.

pub mod error;
pub mod matrix;
pub mod mph;
pub mod store;
pub mod vector;

pub use error::{Result, SparseError};
pub use matrix::{CompressedMatrix, MatrixEntry, MatrixKey, MatrixRecord};
pub use mph::{fnv1_32, HashKey, MinimalPerfectHash, MphBudget};
pub use store::Indexing;
pub use vector::{CompressedVector, VectorRecord};
