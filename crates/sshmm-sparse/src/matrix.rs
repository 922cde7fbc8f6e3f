//! Column-compressed sparse matrix.
//!
//! A matrix is a sparse collection of [`CompressedVector`] columns keyed by
//! column index; only columns with at least one written cell exist. Each
//! column stores its rows with its own (by default unindexed) strategy.
//!
//! Counting goes through [`CompressedMatrix::increment`], which also keeps a
//! per-row total. [`CompressedMatrix::normalize`] divides each cell by the
//! total of its row as counted, making every counted row sum to one across
//! columns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SparseError};
use crate::mph::{MinimalPerfectHash, MphBudget};
use crate::store::{Indexing, Store};
use crate::vector::{CompressedVector, VectorRecord};

/// Address into a matrix: a whole column or a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixKey {
    Column(usize),
    Cell { row: usize, col: usize },
}

impl From<usize> for MatrixKey {
    fn from(col: usize) -> Self {
        MatrixKey::Column(col)
    }
}

impl From<(usize, usize)> for MatrixKey {
    fn from((row, col): (usize, usize)) -> Self {
        MatrixKey::Cell { row, col }
    }
}

impl TryFrom<&[usize]> for MatrixKey {
    type Error = SparseError;

    fn try_from(parts: &[usize]) -> Result<Self> {
        match *parts {
            [col] => Ok(MatrixKey::Column(col)),
            [row, col] => Ok(MatrixKey::Cell { row, col }),
            _ => Err(SparseError::InvalidMatrixKey { arity: parts.len() }),
        }
    }
}

/// Result of a [`CompressedMatrix::lookup`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatrixEntry<'a> {
    /// The column vector, if any cell in it was written.
    Column(Option<&'a CompressedVector>),
    /// A single cell value (zero when absent).
    Value(f64),
}

/// A `rows x cols` matrix that stores only written cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "MatrixRecord", try_from = "MatrixRecord")]
pub struct CompressedMatrix {
    name: String,
    rows: usize,
    cols: usize,
    columns: Store<CompressedVector>,
    column_indexing: Indexing,
    row_totals: Option<BTreeMap<usize, f64>>,
    normalized: bool,
    budget: MphBudget,
}

/// Plain-data form of a [`CompressedMatrix`].
///
/// `keys` lists the populated columns, parallel to `vectors`. `row_totals` is
/// `None` once normalization has discarded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixRecord {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    pub indexing: Indexing,
    pub keys: Vec<usize>,
    pub hash_table: Vec<i64>,
    pub vectors: Vec<VectorRecord>,
    pub row_totals: Option<BTreeMap<usize, f64>>,
    pub normalized: bool,
}

impl CompressedMatrix {
    /// Create an empty matrix whose columns are indexed with `indexing`.
    pub fn new(name: impl Into<String>, rows: usize, cols: usize, indexing: Indexing) -> Self {
        Self {
            name: name.into(),
            rows,
            cols,
            columns: Store::new(indexing, cols),
            column_indexing: Indexing::None,
            row_totals: Some(BTreeMap::new()),
            normalized: false,
            budget: MphBudget::default(),
        }
    }

    /// Strategy used for the rows inside each column (default unindexed).
    pub fn with_column_indexing(mut self, indexing: Indexing) -> Self {
        self.column_indexing = indexing;
        self
    }

    /// Perfect-hash budget for future column and row inserts.
    pub fn with_budget(mut self, budget: MphBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Strategy used to find columns.
    pub fn indexing(&self) -> Indexing {
        self.columns.indexing()
    }

    pub fn column_indexing(&self) -> Indexing {
        self.column_indexing
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// The perfect hash over column keys, for the hashing strategy.
    pub fn hash_table(&self) -> Option<&MinimalPerfectHash> {
        self.columns.table()
    }

    fn check(&self, row: usize, col: usize) -> Result<()> {
        if row >= self.rows {
            return Err(SparseError::IndexOutOfRange {
                index: row,
                length: self.rows,
            });
        }
        if col >= self.cols {
            return Err(SparseError::IndexOutOfRange {
                index: col,
                length: self.cols,
            });
        }
        Ok(())
    }

    /// Cell value; zero when absent.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.columns.get(col).map_or(0.0, |c| c.get(row))
    }

    /// Column vector, if the column has any written cell.
    pub fn column(&self, col: usize) -> Option<&CompressedVector> {
        self.columns.get(col)
    }

    /// Stored `(row, value)` pairs of a column; empty for an absent column.
    pub fn column_entries(&self, col: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.column(col).into_iter().flat_map(|c| c.iter())
    }

    /// Populated columns as `(col, vector)` pairs.
    pub fn columns(&self) -> impl Iterator<Item = (usize, &CompressedVector)> + '_ {
        self.columns.iter()
    }

    /// Number of populated columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Read by column or by cell.
    pub fn lookup(&self, key: impl Into<MatrixKey>) -> MatrixEntry<'_> {
        match key.into() {
            MatrixKey::Column(col) => MatrixEntry::Column(self.column(col)),
            MatrixKey::Cell { row, col } => MatrixEntry::Value(self.get(row, col)),
        }
    }

    fn column_mut(&mut self, col: usize) -> Result<&mut CompressedVector> {
        let name = format!("{}.c{}", self.name, col);
        let rows = self.rows;
        let indexing = self.column_indexing;
        let budget = self.budget;
        self.columns.get_or_insert_with(col, budget, || {
            CompressedVector::new(name, rows, indexing).with_budget(budget)
        })
    }

    /// Write a cell.
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        self.check(row, col)?;
        if value == 0.0 && !self.column(col).is_some_and(|c| c.contains(row)) {
            return Ok(());
        }
        self.column_mut(col)?.set(row, value)
    }

    /// Write through a generic key; only cell keys are writable.
    pub fn set_key(&mut self, key: MatrixKey, value: f64) -> Result<()> {
        match key {
            MatrixKey::Cell { row, col } => self.set(row, col, value),
            MatrixKey::Column(_) => Err(SparseError::InvalidMatrixKey { arity: 1 }),
        }
    }

    /// Count one occurrence of `(row, col)` and of `row`.
    pub fn increment(&mut self, row: usize, col: usize) -> Result<()> {
        self.check(row, col)?;
        self.column_mut(col)?.increment(row)?;
        *self
            .row_totals
            .get_or_insert_with(BTreeMap::new)
            .entry(row)
            .or_insert(0.0) += 1.0;
        Ok(())
    }

    /// Write 1.0 at `(row, col)` only if `row` has never been counted.
    ///
    /// The written row gets a total of 1, so it stays stochastic whether the
    /// matrix is normalized before or after. Once normalization has dropped
    /// the row totals, seen rows can no longer be told apart and this fails
    /// with [`SparseError::RowTotalsDiscarded`]. Returns whether the cell was
    /// written.
    pub fn increment_if_row_unseen(&mut self, row: usize, col: usize) -> Result<bool> {
        self.check(row, col)?;
        let Some(totals) = self.row_totals.as_ref() else {
            return Err(SparseError::RowTotalsDiscarded {
                matrix: self.name.clone(),
            });
        };
        if totals.contains_key(&row) {
            return Ok(false);
        }
        self.column_mut(col)?.set(row, 1.0)?;
        if let Some(totals) = self.row_totals.as_mut() {
            totals.insert(row, 1.0);
        }
        Ok(true)
    }

    /// Count recorded for `row`, while row totals are kept.
    pub fn row_total(&self, row: usize) -> Option<f64> {
        self.row_totals.as_ref()?.get(&row).copied()
    }

    pub fn row_totals(&self) -> Option<&BTreeMap<usize, f64>> {
        self.row_totals.as_ref()
    }

    /// Make the matrix row-stochastic over its stored cells.
    ///
    /// Every stored cell is divided by the total counted for its row. Row
    /// totals are dropped afterwards unless `keep_row_totals` is set. Fails
    /// without modifying anything if a stored cell's row has no positive
    /// total. Runs at most once.
    pub fn normalize(&mut self, keep_row_totals: bool) -> Result<()> {
        if self.normalized {
            return Ok(());
        }

        let empty = BTreeMap::new();
        let totals = self.row_totals.as_ref().unwrap_or(&empty);
        for (_, column) in self.columns.iter() {
            if let Some((row, _)) = column
                .iter()
                .find(|(row, _)| !totals.get(row).is_some_and(|t| *t > 0.0))
            {
                return Err(SparseError::MissingRowTotal {
                    matrix: self.name.clone(),
                    row,
                });
            }
        }

        let totals = self.row_totals.take().unwrap_or_default();
        let name = &self.name;
        for (_, column) in self.columns.iter_mut() {
            column.normalize_with(|row| {
                totals
                    .get(&row)
                    .copied()
                    .ok_or_else(|| SparseError::MissingRowTotal {
                        matrix: name.clone(),
                        row,
                    })
            })?;
        }

        self.row_totals = keep_row_totals.then_some(totals);
        self.normalized = true;
        Ok(())
    }

    /// Logical cell count, `rows * cols`.
    pub fn size(&self) -> u64 {
        (self.rows as u64).saturating_mul(self.cols as u64)
    }

    /// Number of stored cells.
    pub fn nonzero(&self) -> usize {
        self.columns.iter().map(|(_, c)| c.nonzero()).sum()
    }

    /// Fraction of cells holding no stored value.
    pub fn sparsity(&self) -> f64 {
        let size = self.size();
        if size == 0 {
            return 0.0;
        }
        1.0 - self.nonzero() as f64 / size as f64
    }

    /// Approximate memory footprint in bytes.
    pub fn heap_bytes(&self) -> usize {
        let totals = self.row_totals.as_ref().map_or(0, |t| {
            t.len() * (std::mem::size_of::<usize>() + std::mem::size_of::<f64>())
        });
        std::mem::size_of::<Self>()
            + self.name.capacity()
            + self.columns.heap_bytes()
            + self.columns.iter().map(|(_, c)| c.heap_bytes()).sum::<usize>()
            + totals
    }

    /// Plain-data form.
    pub fn to_record(&self) -> MatrixRecord {
        let (keys, vectors): (Vec<usize>, Vec<VectorRecord>) =
            self.columns.iter().map(|(k, c)| (k, c.to_record())).unzip();
        MatrixRecord {
            name: self.name.clone(),
            rows: self.rows,
            cols: self.cols,
            indexing: self.indexing(),
            keys,
            hash_table: self
                .hash_table()
                .map(|t| t.displacements().to_vec())
                .unwrap_or_default(),
            vectors,
            row_totals: self.row_totals.clone(),
            normalized: self.normalized,
        }
    }
}

impl From<CompressedMatrix> for MatrixRecord {
    fn from(matrix: CompressedMatrix) -> Self {
        matrix.to_record()
    }
}

impl TryFrom<MatrixRecord> for CompressedMatrix {
    type Error = SparseError;

    fn try_from(record: MatrixRecord) -> Result<Self> {
        let column_indexing = record
            .vectors
            .first()
            .map(|v| v.indexing)
            .unwrap_or_default();
        let mut vectors = Vec::with_capacity(record.vectors.len());
        for vector in record.vectors {
            if vector.length != record.rows {
                return Err(SparseError::CorruptRecord {
                    name: vector.name,
                    reason: format!(
                        "column length {} does not match {} rows",
                        vector.length, record.rows
                    ),
                });
            }
            vectors.push(CompressedVector::try_from(vector)?);
        }
        let columns = Store::from_parts(
            &record.name,
            record.indexing,
            record.cols,
            record.keys,
            record.hash_table,
            vectors,
        )?;
        Ok(Self {
            name: record.name,
            rows: record.rows,
            cols: record.cols,
            columns,
            column_indexing,
            row_totals: record.row_totals,
            normalized: record.normalized,
            budget: MphBudget::default(),
        })
    }
}
