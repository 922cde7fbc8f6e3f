//! Fuzz target for compressed matrix records.
//!
//! Tests that arbitrary matrix JSON never panics, and that any accepted
//! matrix answers reads for all of its stored keys.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sshmm_sparse::CompressedMatrix;

fuzz_target!(|data: &[u8]| {
    let Ok(matrix) = serde_json::from_slice::<CompressedMatrix>(data) else {
        return;
    };
    for (col, column) in matrix.columns() {
        for (row, value) in column.iter() {
            assert_eq!(matrix.get(row, col).to_bits(), value.to_bits());
        }
    }
});
