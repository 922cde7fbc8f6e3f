//! Two-step Viterbi decoding.
//!
//! Given a trained model and two consecutive observations `(y0, y1)`, a
//! decoder scores every super-state `j` at step 1 as
//!
//! ```text
//! score0[i] = P0[i] * B[i, y0]
//! score1[j] = max_i score0[i] * A[i, j] * B[j, y1]
//! ```
//!
//! and reports the best-scoring state. The max over predecessors keeps the
//! last candidate on ties; the final pick keeps the lowest index. When no
//! score is positive the observation pair was never seen in training and the
//! decoding has no state.
//!
//! [`DenseViterbi`] evaluates the full `K x K` grid. [`SparseViterbi`] only
//! visits stored entries of `B` and `A` and returns identical scores.

mod batch;
mod dense;
mod sparse;

pub use batch::{decode_batch, decode_stream};
pub use dense::DenseViterbi;
pub use sparse::SparseViterbi;

use std::collections::BTreeMap;
use std::iter::Sum;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Parameters, SuperStateHmm};

/// Work done by one or more decode calls, per step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpCounts {
    /// Multiply-accumulate operations actually performed.
    pub performed: [u64; 2],
    /// Operations a full evaluation needs: `K` and `K * K`.
    pub possible: [u64; 2],
}

impl OpCounts {
    /// Zero performed operations against the maximum for `K` super-states.
    pub fn for_states(k: usize) -> Self {
        let k = k as u64;
        Self {
            performed: [0, 0],
            possible: [k, k.saturating_mul(k)],
        }
    }

    /// Add another tally to this one.
    pub fn accumulate(&mut self, other: &OpCounts) {
        for step in 0..2 {
            self.performed[step] = self.performed[step].saturating_add(other.performed[step]);
            self.possible[step] = self.possible[step].saturating_add(other.possible[step]);
        }
    }

    /// Fraction of possible work skipped at each step.
    pub fn saved(&self) -> [f64; 2] {
        let step = |s: usize| {
            if self.possible[s] == 0 {
                0.0
            } else {
                (self.possible[s] - self.performed[s].min(self.possible[s])) as f64
                    / self.possible[s] as f64
            }
        };
        [step(0), step(1)]
    }
}

impl<'a> Sum<&'a OpCounts> for OpCounts {
    fn sum<I: Iterator<Item = &'a OpCounts>>(iter: I) -> Self {
        iter.fold(OpCounts::default(), |mut acc, ops| {
            acc.accumulate(ops);
            acc
        })
    }
}

/// Step-1 scores of a decoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scores {
    /// One score per super-state.
    Dense(Vec<f64>),
    /// Scores of the super-states reached through stored entries only.
    Sparse(BTreeMap<usize, f64>),
}

impl Scores {
    /// Score of a super-state; zero when not reached.
    pub fn get(&self, state: usize) -> f64 {
        match self {
            Scores::Dense(scores) => scores.get(state).copied().unwrap_or(0.0),
            Scores::Sparse(scores) => scores.get(&state).copied().unwrap_or(0.0),
        }
    }

    /// Stored `(state, score)` pairs in ascending state order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (usize, f64)> + '_> {
        match self {
            Scores::Dense(scores) => Box::new(scores.iter().copied().enumerate()),
            Scores::Sparse(scores) => Box::new(scores.iter().map(|(&j, &p)| (j, p))),
        }
    }

    /// Number of super-states with a positive score.
    pub fn positive(&self) -> usize {
        self.iter().filter(|(_, p)| *p > 0.0).count()
    }

    /// Expand to one score per super-state.
    pub fn to_dense(&self, k: usize) -> Vec<f64> {
        match self {
            Scores::Dense(scores) => scores.clone(),
            Scores::Sparse(scores) => {
                let mut dense = vec![0.0; k];
                for (&j, &p) in scores {
                    if let Some(slot) = dense.get_mut(j) {
                        *slot = p;
                    }
                }
                dense
            }
        }
    }

    /// Highest positive score and its state; the lowest state wins ties.
    pub fn best(&self) -> (f64, Option<usize>) {
        let mut best = (0.0, None);
        for (j, p) in self.iter() {
            if p > best.0 {
                best = (p, Some(j));
            }
        }
        best
    }
}

/// Result of decoding one observation pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decoding {
    /// Score of the chosen state; `0.0` when nothing was reached.
    pub probability: f64,
    /// Chosen super-state, `None` when no score is positive.
    pub state: Option<usize>,
    pub scores: Scores,
    pub ops: OpCounts,
}

impl Decoding {
    fn from_scores(scores: Scores, ops: OpCounts) -> Self {
        let (probability, state) = scores.best();
        Self {
            probability,
            state,
            scores,
            ops,
        }
    }

    /// Whether the observation pair matches nothing seen in training.
    pub fn is_unexpected(&self) -> bool {
        self.state.is_none()
    }
}

/// A two-step Viterbi decoder.
pub trait Decoder {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Most likely super-state after observing `y0` then `y1`.
    fn decode(&self, model: &SuperStateHmm, y0: usize, y1: usize) -> Result<Decoding>;
}

/// Trained parameters, after checking both observations are in range.
fn prepare(model: &SuperStateHmm, y0: usize, y1: usize) -> Result<&Parameters> {
    let params = model.parameters()?;
    model.check_observation(y0)?;
    model.check_observation(y1)?;
    Ok(params)
}

/// Decoder selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Full-grid evaluation.
    #[serde(alias = "dense")]
    Viterbi,
    /// Evaluation over stored entries only.
    #[default]
    #[serde(alias = "sparse")]
    SparseViterbi,
}

impl Algorithm {
    pub const ALL: [Algorithm; 2] = [Algorithm::Viterbi, Algorithm::SparseViterbi];
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "viterbi" | "dense" => Ok(Algorithm::Viterbi),
            "sparse_viterbi" | "sparseviterbi" | "sparse" => Ok(Algorithm::SparseViterbi),
            _ => Err(format!(
                "unknown algorithm '{}': must be one of viterbi, sparse_viterbi",
                s
            )),
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Decoder for Algorithm {
    fn name(&self) -> &'static str {
        match self {
            Algorithm::Viterbi => DenseViterbi.name(),
            Algorithm::SparseViterbi => SparseViterbi.name(),
        }
    }

    fn decode(&self, model: &SuperStateHmm, y0: usize, y1: usize) -> Result<Decoding> {
        match self {
            Algorithm::Viterbi => DenseViterbi.decode(model, y0, y1),
            Algorithm::SparseViterbi => SparseViterbi.decode(model, y0, y1),
        }
    }
}
