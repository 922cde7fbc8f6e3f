//! Minimal perfect hashing by bucketed displacement.
//!
//! Keys are split into `n` buckets by `FNV-1(0, key) mod n`. Buckets are
//! placed largest first: a bucket holding two or more keys searches for the
//! smallest displacement `d >= 1` that sends every key to a distinct free
//! slot via `FNV-1(d, key) mod n`; single-key buckets are then dropped into
//! the remaining free slots and recorded as `-slot - 1`.
//!
//! Lookup is two hash evaluations. A key outside the build set still lands
//! on some slot, so callers must compare the stored key before trusting it.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Result, SparseError};

/// 32-bit FNV prime.
pub const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV offset basis, the seed used for displacement 0.
pub const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// 32-bit FNV-1 over `bytes`, seeded by a displacement.
///
/// A displacement of 0 starts from the offset basis; any other value is used
/// as the starting hash directly.
pub fn fnv1_32(displacement: u32, bytes: &[u8]) -> u32 {
    let mut hash = if displacement == 0 {
        FNV_OFFSET_BASIS
    } else {
        displacement
    };
    for &octet in bytes {
        hash = hash.wrapping_mul(FNV_PRIME) ^ u32::from(octet);
    }
    hash
}

/// A key that can be fed to [`fnv1_32`].
///
/// Integers hash as their decimal string form, strings as their UTF-8 bytes.
pub trait HashKey: fmt::Display {
    /// Hash this key with the given displacement.
    fn fnv(&self, displacement: u32) -> u32;
}

fn decimal_digits(mut value: u64, buf: &mut [u8; 20]) -> &[u8] {
    let mut start = buf.len();
    loop {
        start -= 1;
        buf[start] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    &buf[start..]
}

macro_rules! impl_hash_key_unsigned {
    ($($t:ty),*) => {
        $(
            impl HashKey for $t {
                fn fnv(&self, displacement: u32) -> u32 {
                    let mut buf = [0u8; 20];
                    fnv1_32(displacement, decimal_digits(*self as u64, &mut buf))
                }
            }
        )*
    };
}

impl_hash_key_unsigned!(u32, u64, usize);

impl HashKey for str {
    fn fnv(&self, displacement: u32) -> u32 {
        fnv1_32(displacement, self.as_bytes())
    }
}

impl HashKey for String {
    fn fnv(&self, displacement: u32) -> u32 {
        fnv1_32(displacement, self.as_bytes())
    }
}

/// Limits on how hard the builder tries before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MphBudget {
    /// Largest displacement tried for a single bucket.
    pub max_displacement: u32,
    /// How many times the table may be enlarged by one slot and rebuilt.
    pub max_growth: usize,
}

impl Default for MphBudget {
    fn default() -> Self {
        Self {
            max_displacement: 1000,
            max_growth: 128,
        }
    }
}

/// Displacement table of a minimal perfect hash.
///
/// The table length is the slot count `n`. An empty table holds no keys and
/// every lookup reports absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinimalPerfectHash {
    displacement: Vec<i64>,
}

impl MinimalPerfectHash {
    /// Build a table over a set of distinct keys.
    ///
    /// Fails with [`SparseError::DuplicateKey`] if a key repeats, and with
    /// [`SparseError::MphConstruction`] if no table within the budget
    /// separates the keys.
    pub fn build<K>(keys: &[K], budget: MphBudget) -> Result<Self>
    where
        K: HashKey + Eq + Hash,
    {
        if keys.is_empty() {
            return Ok(Self::default());
        }

        let mut seen = HashSet::with_capacity(keys.len());
        for key in keys {
            if !seen.insert(key) {
                return Err(SparseError::DuplicateKey(key.to_string()));
            }
        }

        let base: Vec<u32> = keys.iter().map(|k| k.fnv(0)).collect();
        for growth in 0..=budget.max_growth {
            let n = keys.len() + growth;
            if let Some(table) = Self::try_build(keys, &base, n, budget.max_displacement) {
                if growth > 0 {
                    debug!(keys = keys.len(), slots = n, growth, "perfect hash needed a larger table");
                }
                trace!(keys = keys.len(), slots = n, "perfect hash built");
                return Ok(table);
            }
        }

        Err(SparseError::MphConstruction {
            keys: keys.len(),
            table_size: keys.len() + budget.max_growth,
            attempts: budget.max_growth + 1,
        })
    }

    fn try_build<K: HashKey>(keys: &[K], base: &[u32], n: usize, max_displacement: u32) -> Option<Self> {
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, &h) in base.iter().enumerate() {
            buckets[h as usize % n].push(i);
        }

        // Stable sort keeps equal-sized buckets in bucket-index order.
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| buckets[b].len().cmp(&buckets[a].len()));

        let mut displacement = vec![0i64; n];
        let mut occupied = vec![false; n];
        let mut slots: Vec<usize> = Vec::new();

        let mut placed = 0;
        for &b in &order {
            let bucket = &buckets[b];
            if bucket.len() <= 1 {
                break;
            }

            let mut d: u32 = 1;
            'search: loop {
                slots.clear();
                for &i in bucket {
                    let slot = keys[i].fnv(d) as usize % n;
                    if occupied[slot] || slots.contains(&slot) {
                        if d >= max_displacement {
                            return None;
                        }
                        d += 1;
                        continue 'search;
                    }
                    slots.push(slot);
                }
                break;
            }
            if d > max_displacement {
                return None;
            }

            displacement[b] = i64::from(d);
            for &slot in &slots {
                occupied[slot] = true;
            }
            placed += 1;
        }

        let mut free: Vec<usize> = (0..n).filter(|&s| !occupied[s]).collect();
        for &b in &order[placed..] {
            if buckets[b].is_empty() {
                break;
            }
            let slot = free.pop()?;
            displacement[b] = -(slot as i64) - 1;
        }

        Some(Self { displacement })
    }

    /// Rebuild a table from a persisted displacement array.
    pub fn from_displacements(displacement: Vec<i64>) -> Self {
        Self { displacement }
    }

    /// The displacement array, one entry per slot.
    pub fn displacements(&self) -> &[i64] {
        &self.displacement
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.displacement.len()
    }

    /// Whether the table has no slots.
    pub fn is_empty(&self) -> bool {
        self.displacement.is_empty()
    }

    /// Slot a key maps to, or `None` for an empty table.
    ///
    /// The slot is only meaningful for keys in the build set; anything else
    /// may alias an occupied slot.
    pub fn slot<K: HashKey + ?Sized>(&self, key: &K) -> Option<usize> {
        let n = self.displacement.len();
        if n == 0 {
            return None;
        }
        let d = self.displacement[key.fnv(0) as usize % n];
        let slot = if d < 0 {
            usize::try_from(-(d + 1)).ok()?
        } else {
            key.fnv(u32::try_from(d).ok()?) as usize % n
        };
        (slot < n).then_some(slot)
    }

    /// Approximate heap footprint in bytes.
    pub fn heap_bytes(&self) -> usize {
        self.displacement.capacity() * std::mem::size_of::<i64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1_reference_values() {
        assert_eq!(fnv1_32(0, b""), 0x811c_9dc5);
        assert_eq!(fnv1_32(0, b"a"), 0x050c_5d7e);
        assert_eq!(fnv1_32(0, b"foobar"), 0x31f0_b262);
        assert_eq!(fnv1_32(7, b"12"), 0x3911_a2ee);
    }

    #[test]
    fn integer_keys_hash_as_decimal_strings() {
        assert_eq!(12usize.fnv(7), fnv1_32(7, b"12"));
        assert_eq!(0u64.fnv(0), fnv1_32(0, b"0"));
        assert_eq!(u64::MAX.fnv(3), fnv1_32(3, u64::MAX.to_string().as_bytes()));
        assert_eq!("12".fnv(5), 12u32.fnv(5));
    }

    #[test]
    fn empty_table_reports_absent() {
        let table = MinimalPerfectHash::build::<usize>(&[], MphBudget::default()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.slot(&3usize), None);
    }

    #[test]
    fn single_key_maps_to_slot_zero() {
        let table = MinimalPerfectHash::build(&[42usize], MphBudget::default()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.slot(&42usize), Some(0));
        assert_eq!(table.displacements(), &[-1]);
    }

    #[test]
    fn keys_map_to_distinct_slots() {
        let keys: Vec<usize> = (0..1000).map(|k| k * 7 + 3).collect();
        let table = MinimalPerfectHash::build(&keys, MphBudget::default()).unwrap();
        let mut seen = vec![false; table.len()];
        for key in &keys {
            let slot = table.slot(key).unwrap();
            assert!(!seen[slot], "slot {slot} reused");
            seen[slot] = true;
        }
    }

    #[test]
    fn string_keys_are_supported() {
        let keys: Vec<String> = ["fridge", "kettle", "dryer", "heat_pump", "lights"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let table = MinimalPerfectHash::build(&keys, MphBudget::default()).unwrap();
        let slots: HashSet<usize> = keys.iter().map(|k| table.slot(k).unwrap()).collect();
        assert_eq!(slots.len(), keys.len());
        assert_eq!(table.slot("kettle"), table.slot(&keys[1]));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = MinimalPerfectHash::build(&[1usize, 2, 1], MphBudget::default()).unwrap_err();
        assert_eq!(err, SparseError::DuplicateKey("1".to_string()));
    }

    #[test]
    fn exhausted_budget_is_fatal() {
        // "0" and "2" share a bucket when n = 2, and no displacement may be tried.
        let budget = MphBudget {
            max_displacement: 0,
            max_growth: 0,
        };
        let err = MinimalPerfectHash::build(&[0usize, 2], budget).unwrap_err();
        assert!(matches!(
            err,
            SparseError::MphConstruction {
                keys: 2,
                table_size: 2,
                attempts: 1
            }
        ));
    }

    #[test]
    fn lookups_are_stable() {
        let keys: Vec<usize> = (100..164).collect();
        let table = MinimalPerfectHash::build(&keys, MphBudget::default()).unwrap();
        let again = MinimalPerfectHash::from_displacements(table.displacements().to_vec());
        for key in &keys {
            assert_eq!(table.slot(key), table.slot(key));
            assert_eq!(table.slot(key), again.slot(key));
        }
    }
}
