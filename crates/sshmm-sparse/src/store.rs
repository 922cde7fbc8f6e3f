//! Keyed storage shared by compressed vectors and matrices.
//!
//! A store maps `usize` keys in `[0, length)` to values using one of three
//! strategies, fixed at construction:
//!
//! | Strategy | Layout | Lookup |
//! |----------|--------|--------|
//! | [`Indexing::None`] | parallel key/value lists | linear scan |
//! | [`Indexing::Hashing`] | key/value lists + perfect hash over keys | O(1), rebuilt on insert |
//! | [`Indexing::Full`] | array of length `length` | O(1) direct |

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SparseError};
use crate::mph::{MinimalPerfectHash, MphBudget};

/// Storage strategy of a compressed container.
///
/// Persisted as its numeric mode (0, 1, 2); also accepted by name
/// (`none`, `hashing`, `full`) when deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Indexing {
    /// Unindexed list, scanned linearly.
    #[default]
    None,
    /// Minimal-perfect-hash indexed list.
    Hashing,
    /// Directly addressed array over the full logical length.
    Full,
}

impl Indexing {
    /// All strategies, in mode order.
    pub const ALL: [Indexing; 3] = [Indexing::None, Indexing::Hashing, Indexing::Full];

    /// Numeric mode used in persisted structures.
    pub fn mode(self) -> u8 {
        match self {
            Indexing::None => 0,
            Indexing::Hashing => 1,
            Indexing::Full => 2,
        }
    }

    /// Strategy for a numeric mode.
    pub fn from_mode(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(Indexing::None),
            1 => Some(Indexing::Hashing),
            2 => Some(Indexing::Full),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Indexing::None => "none",
            Indexing::Hashing => "hashing",
            Indexing::Full => "full",
        }
    }
}

impl fmt::Display for Indexing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Indexing {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "unindexed" | "0" => Ok(Indexing::None),
            "hashing" | "hashed" | "hash" | "1" => Ok(Indexing::Hashing),
            "full" | "dense" | "2" => Ok(Indexing::Full),
            _ => Err(format!(
                "unknown indexing '{}': must be one of none, hashing, full",
                s
            )),
        }
    }
}

impl Serialize for Indexing {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.mode())
    }
}

struct IndexingVisitor;

impl<'de> Visitor<'de> for IndexingVisitor {
    type Value = Indexing;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an indexing mode 0, 1, 2 or one of none, hashing, full")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Indexing, E> {
        u8::try_from(v)
            .ok()
            .and_then(Indexing::from_mode)
            .ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(v), &self))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Indexing, E> {
        u8::try_from(v)
            .ok()
            .and_then(Indexing::from_mode)
            .ok_or_else(|| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Indexing, E> {
        v.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Indexing {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(IndexingVisitor)
    }
}

/// Keyed storage behind one strategy.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Store<V> {
    Unindexed {
        keys: Vec<usize>,
        values: Vec<V>,
    },
    Hashed {
        table: MinimalPerfectHash,
        /// Slot -> position in `keys`/`values`.
        slots: Vec<Option<usize>>,
        keys: Vec<usize>,
        values: Vec<V>,
    },
    Dense {
        values: Vec<Option<V>>,
        present: usize,
    },
}

impl<V> Store<V> {
    pub(crate) fn new(indexing: Indexing, length: usize) -> Self {
        match indexing {
            Indexing::None => Store::Unindexed {
                keys: Vec::new(),
                values: Vec::new(),
            },
            Indexing::Hashing => Store::Hashed {
                table: MinimalPerfectHash::default(),
                slots: Vec::new(),
                keys: Vec::new(),
                values: Vec::new(),
            },
            Indexing::Full => Store::Dense {
                values: std::iter::repeat_with(|| None).take(length).collect(),
                present: 0,
            },
        }
    }

    /// Reassemble a store from persisted parts.
    ///
    /// `keys` and `values` are parallel; for the hashed strategy `table` is the
    /// persisted displacement array and must place every key in its own slot.
    pub(crate) fn from_parts(
        name: &str,
        indexing: Indexing,
        length: usize,
        keys: Vec<usize>,
        table: Vec<i64>,
        values: Vec<V>,
    ) -> Result<Self> {
        let corrupt = |reason: String| SparseError::CorruptRecord {
            name: name.to_string(),
            reason,
        };
        if keys.len() != values.len() {
            return Err(corrupt(format!(
                "{} keys but {} values",
                keys.len(),
                values.len()
            )));
        }
        if let Some(&key) = keys.iter().find(|&&k| k >= length) {
            return Err(corrupt(format!("key {} outside length {}", key, length)));
        }
        if indexing != Indexing::Hashing && !table.is_empty() {
            return Err(corrupt(format!(
                "{} storage carries a hash table",
                indexing
            )));
        }

        match indexing {
            Indexing::None => {
                let mut sorted = keys.clone();
                sorted.sort_unstable();
                if sorted.windows(2).any(|w| w[0] == w[1]) {
                    return Err(corrupt("repeated key".to_string()));
                }
                Ok(Store::Unindexed { keys, values })
            }
            Indexing::Hashing => {
                let table = MinimalPerfectHash::from_displacements(table);
                if table.len() < keys.len() {
                    return Err(corrupt(format!(
                        "hash table has {} slots for {} keys",
                        table.len(),
                        keys.len()
                    )));
                }
                let mut slots = vec![None; table.len()];
                for (pos, key) in keys.iter().enumerate() {
                    match table.slot(key) {
                        Some(slot) if slots[slot].is_none() => slots[slot] = Some(pos),
                        _ => {
                            return Err(corrupt(format!(
                                "hash table does not resolve key {}",
                                key
                            )))
                        }
                    }
                }
                Ok(Store::Hashed {
                    table,
                    slots,
                    keys,
                    values,
                })
            }
            Indexing::Full => {
                let mut dense: Vec<Option<V>> = dense_slots(length).ok_or_else(|| {
                    corrupt(format!("length {} cannot be stored densely", length))
                })?;
                let present = keys.len();
                for (key, value) in keys.into_iter().zip(values) {
                    if dense[key].replace(value).is_some() {
                        return Err(corrupt(format!("repeated key {}", key)));
                    }
                }
                Ok(Store::Dense {
                    values: dense,
                    present,
                })
            }
        }
    }

    pub(crate) fn indexing(&self) -> Indexing {
        match self {
            Store::Unindexed { .. } => Indexing::None,
            Store::Hashed { .. } => Indexing::Hashing,
            Store::Dense { .. } => Indexing::Full,
        }
    }

    fn position(&self, key: usize) -> Option<usize> {
        match self {
            Store::Unindexed { keys, .. } => keys.iter().position(|&k| k == key),
            Store::Hashed {
                table, slots, keys, ..
            } => {
                let pos = (*slots.get(table.slot(&key)?)?)?;
                (keys[pos] == key).then_some(pos)
            }
            Store::Dense { .. } => None,
        }
    }

    pub(crate) fn get(&self, key: usize) -> Option<&V> {
        match self {
            Store::Dense { values, .. } => values.get(key)?.as_ref(),
            Store::Unindexed { values, .. } | Store::Hashed { values, .. } => {
                self.position(key).map(|pos| &values[pos])
            }
        }
    }

    pub(crate) fn get_mut(&mut self, key: usize) -> Option<&mut V> {
        let pos = self.position(key);
        match self {
            Store::Dense { values, .. } => values.get_mut(key)?.as_mut(),
            Store::Unindexed { values, .. } | Store::Hashed { values, .. } => match pos {
                Some(pos) => values.get_mut(pos),
                None => None,
            },
        }
    }

    /// Value at `key`, inserting `make()` first if absent.
    ///
    /// Inserting into a hashed store rebuilds its perfect hash over all keys;
    /// if that fails the store is left unchanged.
    pub(crate) fn get_or_insert_with(
        &mut self,
        key: usize,
        budget: MphBudget,
        make: impl FnOnce() -> V,
    ) -> Result<&mut V> {
        let existing = self.position(key);
        match self {
            Store::Unindexed { keys, values } => {
                let pos = match existing {
                    Some(pos) => pos,
                    None => {
                        keys.push(key);
                        values.push(make());
                        values.len() - 1
                    }
                };
                Ok(&mut values[pos])
            }
            Store::Hashed {
                table,
                slots,
                keys,
                values,
            } => {
                let pos = match existing {
                    Some(pos) => pos,
                    None => {
                        keys.push(key);
                        match rehash(keys, budget) {
                            Ok((new_table, new_slots)) => {
                                *table = new_table;
                                *slots = new_slots;
                            }
                            Err(err) => {
                                keys.pop();
                                return Err(err);
                            }
                        }
                        values.push(make());
                        values.len() - 1
                    }
                };
                Ok(&mut values[pos])
            }
            Store::Dense { values, present } => {
                let length = values.len();
                let cell = values
                    .get_mut(key)
                    .ok_or(SparseError::IndexOutOfRange { index: key, length })?;
                if cell.is_none() {
                    *present += 1;
                }
                Ok(cell.get_or_insert_with(make))
            }
        }
    }

    /// Rebuild the perfect hash over the stored keys. No-op for other strategies.
    pub(crate) fn rebuild(&mut self, budget: MphBudget) -> Result<()> {
        if let Store::Hashed {
            table, slots, keys, ..
        } = self
        {
            let (new_table, new_slots) = rehash(keys, budget)?;
            *table = new_table;
            *slots = new_slots;
        }
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Store::Unindexed { keys, .. } | Store::Hashed { keys, .. } => keys.len(),
            Store::Dense { present, .. } => *present,
        }
    }

    pub(crate) fn table(&self) -> Option<&MinimalPerfectHash> {
        match self {
            Store::Hashed { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Present entries. Insertion order for list strategies, ascending key
    /// order for the dense strategy.
    pub(crate) fn iter(&self) -> Box<dyn Iterator<Item = (usize, &V)> + '_> {
        match self {
            Store::Unindexed { keys, values } | Store::Hashed { keys, values, .. } => {
                Box::new(keys.iter().copied().zip(values.iter()))
            }
            Store::Dense { values, .. } => Box::new(
                values
                    .iter()
                    .enumerate()
                    .filter_map(|(k, v)| v.as_ref().map(|v| (k, v))),
            ),
        }
    }

    pub(crate) fn iter_mut(&mut self) -> Box<dyn Iterator<Item = (usize, &mut V)> + '_> {
        match self {
            Store::Unindexed { keys, values } | Store::Hashed { keys, values, .. } => {
                Box::new(keys.iter().copied().zip(values.iter_mut()))
            }
            Store::Dense { values, .. } => Box::new(
                values
                    .iter_mut()
                    .enumerate()
                    .filter_map(|(k, v)| v.as_mut().map(|v| (k, v))),
            ),
        }
    }

    /// Bytes held by the store's own arrays (not by heap data inside `V`).
    pub(crate) fn heap_bytes(&self) -> usize {
        use std::mem::size_of;
        match self {
            Store::Unindexed { keys, values } => {
                keys.capacity() * size_of::<usize>() + values.capacity() * size_of::<V>()
            }
            Store::Hashed {
                table,
                slots,
                keys,
                values,
            } => {
                table.heap_bytes()
                    + slots.capacity() * size_of::<Option<usize>>()
                    + keys.capacity() * size_of::<usize>()
                    + values.capacity() * size_of::<V>()
            }
            Store::Dense { values, .. } => values.capacity() * size_of::<Option<V>>(),
        }
    }
}

/// Empty slots for a dense store, or `None` if `length` cannot be allocated.
fn dense_slots<V>(length: usize) -> Option<Vec<Option<V>>> {
    let mut values = Vec::new();
    values.try_reserve_exact(length).ok()?;
    values.resize_with(length, || None);
    Some(values)
}

fn rehash(keys: &[usize], budget: MphBudget) -> Result<(MinimalPerfectHash, Vec<Option<usize>>)> {
    let table = MinimalPerfectHash::build(keys, budget)?;
    let mut slots = vec![None; table.len()];
    for (pos, key) in keys.iter().enumerate() {
        if let Some(slot) = table.slot(key) {
            slots[slot] = Some(pos);
        }
    }
    Ok((table, slots))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexing_modes_round_trip() {
        for indexing in Indexing::ALL {
            assert_eq!(Indexing::from_mode(indexing.mode()), Some(indexing));
            assert_eq!(indexing.name().parse::<Indexing>().unwrap(), indexing);
        }
        assert_eq!(Indexing::from_mode(3), None);
        assert!("sorted".parse::<Indexing>().is_err());
    }

    #[test]
    fn indexing_serializes_as_mode_and_reads_names() {
        assert_eq!(serde_json::to_string(&Indexing::Full).unwrap(), "2");
        let by_mode: Indexing = serde_json::from_str("1").unwrap();
        let by_name: Indexing = serde_json::from_str("\"hashing\"").unwrap();
        assert_eq!(by_mode, Indexing::Hashing);
        assert_eq!(by_name, Indexing::Hashing);
        assert!(serde_json::from_str::<Indexing>("7").is_err());
    }

    #[test]
    fn every_strategy_inserts_and_reads() {
        for indexing in Indexing::ALL {
            let mut store: Store<f64> = Store::new(indexing, 50);
            for key in [7, 3, 49, 0] {
                *store.get_or_insert_with(key, MphBudget::default(), || 0.0).unwrap() += key as f64;
            }
            *store.get_or_insert_with(7, MphBudget::default(), || 0.0).unwrap() += 1.0;
            assert_eq!(store.len(), 4, "{indexing}");
            assert_eq!(store.get(7), Some(&8.0));
            assert_eq!(store.get(49), Some(&49.0));
            assert_eq!(store.get(8), None);
            assert_eq!(store.indexing(), indexing);
        }
    }

    #[test]
    fn dense_iterates_in_key_order() {
        let mut store: Store<u8> = Store::new(Indexing::Full, 10);
        for key in [9, 2, 5] {
            store.get_or_insert_with(key, MphBudget::default(), || 1).unwrap();
        }
        let keys: Vec<usize> = store.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![2, 5, 9]);
    }

    #[test]
    fn dense_rejects_out_of_range_keys() {
        let mut store: Store<u8> = Store::new(Indexing::Full, 4);
        let err = store
            .get_or_insert_with(4, MphBudget::default(), || 1)
            .unwrap_err();
        assert_eq!(err, SparseError::IndexOutOfRange { index: 4, length: 4 });
    }

    #[test]
    fn failed_rehash_leaves_store_unchanged() {
        let budget = MphBudget {
            max_displacement: 0,
            max_growth: 0,
        };
        let mut store: Store<f64> = Store::new(Indexing::Hashing, 10);
        store.get_or_insert_with(0, budget, || 1.0).unwrap();
        assert!(store.get_or_insert_with(2, budget, || 2.0).is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0), Some(&1.0));
        assert_eq!(store.get(2), None);
    }

    #[test]
    fn from_parts_rejects_unallocatable_dense_length() {
        let err = Store::<f64>::from_parts(
            "P0",
            Indexing::Full,
            1 << 60,
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SparseError::CorruptRecord { .. }), "{err}");
    }

    #[test]
    fn from_parts_rejects_unresolvable_tables() {
        let err = Store::<f64>::from_parts(
            "v",
            Indexing::Hashing,
            10,
            vec![1, 2],
            vec![-1, -1],
            vec![0.5, 0.5],
        )
        .unwrap_err();
        assert!(matches!(err, SparseError::CorruptRecord { .. }));
    }
}
