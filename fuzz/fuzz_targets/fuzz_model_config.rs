//! Fuzz target for model configuration parsing.
//!
//! Tests that TOML and JSON configuration parsing handles arbitrary input
//! without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sshmm_core::ModelConfig;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<ModelConfig>(data);
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = toml::from_str::<ModelConfig>(text);
    }
});
