//! Full-grid two-step Viterbi.

use sshmm_sparse::CompressedMatrix;
use tracing::trace;

use super::{prepare, Decoder, Decoding, OpCounts, Scores};
use crate::error::Result;
use crate::logging::event_names;
use crate::model::SuperStateHmm;

/// Evaluates every predecessor of every super-state: `K` then `K * K` products.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseViterbi;

/// Column `col` of `matrix` expanded to `rows` entries.
fn expand_column(matrix: &CompressedMatrix, col: usize, rows: usize) -> Vec<f64> {
    let mut dense = vec![0.0; rows];
    for (row, value) in matrix.column_entries(col) {
        dense[row] = value;
    }
    dense
}

impl Decoder for DenseViterbi {
    fn name(&self) -> &'static str {
        "viterbi"
    }

    fn decode(&self, model: &SuperStateHmm, y0: usize, y1: usize) -> Result<Decoding> {
        let params = prepare(model, y0, y1)?;
        let k = model.super_state_count();
        let mut ops = OpCounts::for_states(k);

        let emit0 = expand_column(&params.b, y0, k);
        let score0: Vec<f64> = (0..k).map(|j| params.p0.get(j) * emit0[j]).collect();
        ops.performed[0] = k as u64;

        let emit1 = expand_column(&params.b, y1, k);
        let mut transition = vec![0.0; k];
        let mut score1 = vec![0.0; k];
        for (j, best) in score1.iter_mut().enumerate() {
            for (i, p_a) in params.a.column_entries(j) {
                transition[i] = p_a;
            }
            for i in 0..k {
                let p = score0[i] * transition[i] * emit1[j];
                if p >= *best {
                    *best = p;
                }
            }
            for (i, _) in params.a.column_entries(j) {
                transition[i] = 0.0;
            }
        }
        ops.performed[1] = ops.possible[1];

        let decoding = Decoding::from_scores(Scores::Dense(score1), ops);
        trace!(
            event = event_names::DECODE_STEP,
            decoder = self.name(),
            y0,
            y1,
            state = ?decoding.state,
            probability = decoding.probability,
            "decoded"
        );
        Ok(decoding)
    }
}
