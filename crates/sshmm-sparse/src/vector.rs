//! Compressed (zero-free) vector over a fixed logical length.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SparseError};
use crate::mph::{MinimalPerfectHash, MphBudget};
use crate::store::{Indexing, Store};

/// A vector of logical length `length` that stores only written entries.
///
/// Absent entries read as zero. Once normalized the vector is a probability
/// distribution over its stored entries and further `normalize` calls do
/// nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "VectorRecord", try_from = "VectorRecord")]
pub struct CompressedVector {
    name: String,
    length: usize,
    store: Store<f64>,
    normalized: bool,
    budget: MphBudget,
}

/// Plain-data form of a [`CompressedVector`].
///
/// `keys` and `values` are parallel lists of the stored entries. For the
/// hashing strategy `hash_table` holds the displacement array that resolves
/// each key; it is empty otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub name: String,
    pub length: usize,
    pub indexing: Indexing,
    pub keys: Vec<usize>,
    pub hash_table: Vec<i64>,
    pub values: Vec<f64>,
    pub normalized: bool,
}

impl CompressedVector {
    /// Create an empty vector.
    pub fn new(name: impl Into<String>, length: usize, indexing: Indexing) -> Self {
        Self {
            name: name.into(),
            length,
            store: Store::new(indexing, length),
            normalized: false,
            budget: MphBudget::default(),
        }
    }

    /// Use a different perfect-hash budget for future inserts.
    pub fn with_budget(mut self, budget: MphBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indexing(&self) -> Indexing {
        self.store.indexing()
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// The perfect hash of a hashing-strategy vector.
    pub fn hash_table(&self) -> Option<&MinimalPerfectHash> {
        self.store.table()
    }

    fn check(&self, index: usize) -> Result<()> {
        if index >= self.length {
            return Err(SparseError::IndexOutOfRange {
                index,
                length: self.length,
            });
        }
        Ok(())
    }

    /// Value at `index`; zero when absent or out of range.
    pub fn get(&self, index: usize) -> f64 {
        self.store.get(index).copied().unwrap_or(0.0)
    }

    /// Whether an entry is stored at `index`.
    pub fn contains(&self, index: usize) -> bool {
        self.store.get(index).is_some()
    }

    /// Write a value.
    ///
    /// Writing zero to an absent index stores nothing. Writing a new index
    /// into a hashing vector rebuilds its perfect hash.
    pub fn set(&mut self, index: usize, value: f64) -> Result<()> {
        self.check(index)?;
        if let Some(slot) = self.store.get_mut(index) {
            *slot = value;
            return Ok(());
        }
        if value == 0.0 {
            return Ok(());
        }
        *self.store.get_or_insert_with(index, self.budget, || 0.0)? = value;
        Ok(())
    }

    /// Add `delta` to the value at `index`.
    ///
    /// Adding zero to an absent index stores nothing, as with [`Self::set`].
    pub fn add(&mut self, index: usize, delta: f64) -> Result<()> {
        self.check(index)?;
        if let Some(slot) = self.store.get_mut(index) {
            *slot += delta;
            return Ok(());
        }
        if delta == 0.0 {
            return Ok(());
        }
        *self.store.get_or_insert_with(index, self.budget, || 0.0)? = delta;
        Ok(())
    }

    /// Add one to the count at `index`.
    pub fn increment(&mut self, index: usize) -> Result<()> {
        self.add(index, 1.0)
    }

    /// Rebuild the perfect hash over the stored indices.
    ///
    /// Inserts already do this; it is exposed so the rebuild can be driven
    /// and checked on its own. No-op for other strategies.
    pub fn rebuild(&mut self) -> Result<()> {
        self.store.rebuild(self.budget)
    }

    /// Sum of the stored values.
    pub fn sum(&self) -> f64 {
        self.store.iter().map(|(_, v)| *v).sum()
    }

    /// Divide every stored value by the sum of all stored values.
    ///
    /// Runs at most once per vector.
    pub fn normalize(&mut self) {
        if self.normalized {
            return;
        }
        let total = self.sum();
        if total != 0.0 {
            for (_, value) in self.store.iter_mut() {
                *value /= total;
            }
        }
        self.normalized = true;
    }

    /// Divide every stored value by an externally tracked total for its index.
    ///
    /// Used by matrices, whose columns are normalized by row totals.
    pub(crate) fn normalize_with<F>(&mut self, mut total_for: F) -> Result<()>
    where
        F: FnMut(usize) -> Result<f64>,
    {
        if self.normalized {
            return Ok(());
        }
        for (index, value) in self.store.iter_mut() {
            let total = total_for(index)?;
            *value /= total;
        }
        self.normalized = true;
        Ok(())
    }

    /// Stored `(index, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.store.iter().map(|(k, v)| (k, *v))
    }

    /// Logical length.
    pub fn size(&self) -> usize {
        self.length
    }

    /// Number of stored entries.
    pub fn nonzero(&self) -> usize {
        self.store.len()
    }

    /// Fraction of the logical length holding no stored value.
    pub fn sparsity(&self) -> f64 {
        if self.length == 0 {
            return 0.0;
        }
        1.0 - self.nonzero() as f64 / self.length as f64
    }

    /// Approximate memory footprint in bytes.
    pub fn heap_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.name.capacity() + self.store.heap_bytes()
    }

    /// Plain-data form.
    pub fn to_record(&self) -> VectorRecord {
        let (keys, values): (Vec<usize>, Vec<f64>) = self.iter().unzip();
        VectorRecord {
            name: self.name.clone(),
            length: self.length,
            indexing: self.indexing(),
            keys,
            hash_table: self
                .hash_table()
                .map(|t| t.displacements().to_vec())
                .unwrap_or_default(),
            values,
            normalized: self.normalized,
        }
    }
}

impl From<CompressedVector> for VectorRecord {
    fn from(vector: CompressedVector) -> Self {
        vector.to_record()
    }
}

impl TryFrom<VectorRecord> for CompressedVector {
    type Error = SparseError;

    fn try_from(record: VectorRecord) -> Result<Self> {
        let store = Store::from_parts(
            &record.name,
            record.indexing,
            record.length,
            record.keys,
            record.hash_table,
            record.values,
        )?;
        Ok(Self {
            name: record.name,
            length: record.length,
            store,
            normalized: record.normalized,
            budget: MphBudget::default(),
        })
    }
}
