//! Fuzz target for model file parsing.
//!
//! Tests that a model record either loads into a consistent model or is
//! rejected with an error, and that accepted models decode without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sshmm_core::{Algorithm, Decoder, SuperStateHmm};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(model) = SuperStateHmm::from_json(text) else {
        return;
    };
    if !model.is_trained() || model.observation_count() == 0 {
        return;
    }
    // A loaded model has been checked against its metadata, so every in-range
    // observation pair must decode.
    let last = model.observation_count() - 1;
    for algorithm in Algorithm::ALL {
        let decoding = algorithm.decode(&model, 0, last);
        assert!(decoding.is_ok(), "{algorithm}: {decoding:?}");
    }
});
