//! Two-step Viterbi over stored entries only.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use super::{prepare, Decoder, Decoding, OpCounts, Scores};
use crate::error::Result;
use crate::logging::event_names;
use crate::model::SuperStateHmm;

/// Skips every product with a factor that is not stored.
///
/// Step 0 visits the states that emitted `y0` and have a prior. Step 1 visits
/// the states that emitted `y1` and, for each, the stored predecessors that
/// survived step 0. Scores match [`super::DenseViterbi`] exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct SparseViterbi;

impl Decoder for SparseViterbi {
    fn name(&self) -> &'static str {
        "sparse_viterbi"
    }

    fn decode(&self, model: &SuperStateHmm, y0: usize, y1: usize) -> Result<Decoding> {
        let params = prepare(model, y0, y1)?;
        let mut ops = OpCounts::for_states(model.super_state_count());

        let mut score0: HashMap<usize, f64> = HashMap::new();
        for (j, p_b) in params.b.column_entries(y0) {
            let prior = params.p0.get(j);
            if prior == 0.0 {
                continue;
            }
            score0.insert(j, prior * p_b);
            ops.performed[0] += 1;
        }

        let mut score1: BTreeMap<usize, f64> = BTreeMap::new();
        for (j, p_b) in params.b.column_entries(y1) {
            for (i, p_a) in params.a.column_entries(j) {
                let Some(&previous) = score0.get(&i) else {
                    continue;
                };
                let p = previous * p_a * p_b;
                ops.performed[1] += 1;
                match score1.entry(j) {
                    Entry::Vacant(entry) => {
                        entry.insert(p);
                    }
                    Entry::Occupied(mut entry) => {
                        if p >= *entry.get() {
                            entry.insert(p);
                        }
                    }
                }
            }
        }

        let decoding = Decoding::from_scores(Scores::Sparse(score1), ops);
        trace!(
            event = event_names::DECODE_STEP,
            decoder = self.name(),
            y0,
            y1,
            state = ?decoding.state,
            probability = decoding.probability,
            step0_ops = ops.performed[0],
            step1_ops = ops.performed[1],
            "decoded"
        );
        Ok(decoding)
    }
}
