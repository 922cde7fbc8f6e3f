//! Super-state hidden Markov models for non-intrusive load monitoring.
//!
//! A [`SuperStateHmm`] is trained once on labelled history (per-appliance
//! states aligned with aggregate readings) and then decoded two readings at a
//! time to recover the joint appliance state behind the latest reading.
//!
//! ```ignore
//! use sshmm_core::{Algorithm, ApplianceQuantization, Decoder, SuperStateHmm};
//!
//! let mut model = SuperStateHmm::new(appliances, observation_labels)?;
//! model.train(&observations, &hidden_states)?;
//! let decoding = Algorithm::SparseViterbi.decode(&model, y0, y1)?;
//! if let Some(state) = decoding.state {
//!     let estimate = model.estimate(state)?;
//! }
//! ```

pub mod config;
pub mod decode;
pub mod error;
pub mod logging;
pub mod model;
pub mod quantization;

pub use config::{ConfigSource, DecodeConfig, ModelConfig};
pub use decode::{
    decode_batch, decode_stream, Algorithm, Decoder, Decoding, DenseViterbi, OpCounts, Scores,
    SparseViterbi,
};
pub use error::{ErrorCategory, ModelError, Result};
pub use model::{
    load_models, save_models, Estimate, ModelRecord, ModelStats, Parameters, StructureStats,
    SuperStateHmm,
};
pub use quantization::{observation_labels, ApplianceQuantization, MAX_OBSERVATIONS};
pub use sshmm_sparse::{CompressedMatrix, CompressedVector, Indexing, MphBudget};
