//! Decoding many observation pairs against one shared model.

use std::thread;

use tracing::{debug, error, instrument};

use super::{Decoder, Decoding};
use crate::error::{ModelError, Result};
use crate::logging::event_names;
use crate::model::SuperStateHmm;

/// Decode every window on up to `workers` scoped threads.
///
/// Results come back in input order, one per window. The model is only read,
/// so all workers share the same reference.
#[instrument(skip_all, fields(windows = windows.len(), decoder = decoder.name()))]
pub fn decode_batch<D>(
    model: &SuperStateHmm,
    decoder: &D,
    windows: &[(usize, usize)],
    workers: usize,
) -> Vec<Result<Decoding>>
where
    D: Decoder + Sync + ?Sized,
{
    if windows.is_empty() {
        return Vec::new();
    }

    let workers = workers.clamp(1, windows.len());
    let chunk = windows.len().div_ceil(workers);
    debug!(
        event = event_names::DECODE_BATCH,
        windows = windows.len(),
        workers,
        chunk,
        "decoding in parallel"
    );

    thread::scope(|s| {
        let handles: Vec<_> = windows
            .chunks(chunk)
            .map(|part| {
                s.spawn(move || {
                    part.iter()
                        .map(|&(y0, y1)| decoder.decode(model, y0, y1))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .zip(windows.chunks(chunk))
            .flat_map(|(handle, part)| {
                handle.join().unwrap_or_else(|_| {
                    error!("decode worker thread panicked");
                    part.iter().map(|_| Err(ModelError::WorkerPanicked)).collect()
                })
            })
            .collect()
    })
}

/// Decode each consecutive pair of an observation sequence.
///
/// Returns `observations.len() - 1` decodings; stops at the first error.
pub fn decode_stream<D>(
    model: &SuperStateHmm,
    decoder: &D,
    observations: &[usize],
) -> Result<Vec<Decoding>>
where
    D: Decoder + ?Sized,
{
    observations
        .windows(2)
        .map(|pair| decoder.decode(model, pair[0], pair[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::test_support::toy_model;
    use crate::decode::{Algorithm, OpCounts, SparseViterbi};

    #[test]
    fn batch_preserves_order_for_any_worker_count() {
        let model = toy_model();
        let windows: Vec<(usize, usize)> =
            (0..16).flat_map(|y0| (0..16).map(move |y1| (y0, y1))).collect();
        let serial: Vec<Decoding> = windows
            .iter()
            .map(|&(y0, y1)| SparseViterbi.decode(&model, y0, y1).unwrap())
            .collect();

        for workers in [1, 3, 8, 1000] {
            let batch = decode_batch(&model, &SparseViterbi, &windows, workers);
            assert_eq!(batch.len(), windows.len());
            for (got, want) in batch.iter().zip(&serial) {
                assert_eq!(got.as_ref().unwrap(), want);
            }
        }
    }

    #[test]
    fn batch_reports_errors_per_window() {
        let model = toy_model();
        let results = decode_batch(&model, &Algorithm::Viterbi, &[(0, 5), (0, 99), (5, 15)], 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(ModelError::ObservationOutOfRange { observation: 99, .. })
        ));
        assert!(results[2].is_ok());
        assert!(decode_batch(&model, &Algorithm::Viterbi, &[], 4).is_empty());
    }

    #[test]
    fn batch_accepts_trait_objects() {
        let model = toy_model();
        let decoder: &(dyn Decoder + Sync) = &Algorithm::SparseViterbi;
        let results = decode_batch(&model, decoder, &[(0, 5)], 0);
        assert_eq!(results[0].as_ref().unwrap().state, Some(2));
    }

    #[test]
    fn stream_decodes_consecutive_pairs() {
        let model = toy_model();
        let decodings = decode_stream(&model, &Algorithm::SparseViterbi, &[0, 5, 10, 15]).unwrap();
        let states: Vec<Option<usize>> = decodings.iter().map(|d| d.state).collect();
        assert_eq!(states, vec![Some(2), Some(1), Some(3)]);

        let ops: OpCounts = decodings.iter().map(|d| &d.ops).sum();
        assert_eq!(ops.possible, [12, 48]);

        assert!(decode_stream(&model, &SparseViterbi, &[3]).unwrap().is_empty());
        assert!(decode_stream(&model, &SparseViterbi, &[0, 16]).is_err());
    }
}
