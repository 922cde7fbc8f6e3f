//! Fuzz target for perfect-hash construction.
//!
//! Tests that a successfully built table maps every key to a distinct slot.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sshmm_sparse::{MinimalPerfectHash, MphBudget};

#[derive(Debug, Arbitrary)]
struct Input {
    keys: Vec<u32>,
    max_displacement: u16,
    max_growth: u8,
}

fuzz_target!(|input: Input| {
    let mut keys: Vec<usize> = input.keys.iter().map(|&k| k as usize).collect();
    keys.sort_unstable();
    keys.dedup();
    let budget = MphBudget {
        max_displacement: u32::from(input.max_displacement).max(1),
        max_growth: usize::from(input.max_growth),
    };
    let Ok(table) = MinimalPerfectHash::build(&keys, budget) else {
        return;
    };
    let mut seen = vec![false; table.len()];
    for key in &keys {
        let Some(slot) = table.slot(key) else {
            panic!("key {key} has no slot");
        };
        assert!(!seen[slot], "slot {slot} reused");
        seen[slot] = true;
    }
});
