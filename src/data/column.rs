//! Covariate column storage and iteration
//!
//! A covariate column is held in one of three layouts. All three expose the
//! same restartable `(row, value)` iterator so that callers never branch on
//! the storage format when walking a column.

use crate::error::{CcdError, Result};

/// Storage layout of a single covariate column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatType {
    /// Every row carries an explicit value
    Dense,
    /// Listed rows have an implicit value of 1, all others 0
    Indicator,
    /// Explicit (row, value) pairs, implicit 0 elsewhere
    Sparse,
}

impl std::fmt::Display for FormatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatType::Dense => write!(f, "dense"),
            FormatType::Indicator => write!(f, "indicator"),
            FormatType::Sparse => write!(f, "sparse"),
        }
    }
}

#[derive(Debug, Clone)]
enum ColumnData {
    Dense(Vec<f64>),
    Indicator(Vec<usize>),
    Sparse { rows: Vec<usize>, values: Vec<f64> },
}

/// One covariate column of the design matrix
#[derive(Debug, Clone)]
pub struct CompressedColumn {
    label: String,
    data: ColumnData,
}

impl CompressedColumn {
    /// Dense column: one value per row
    pub fn dense(label: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            data: ColumnData::Dense(values),
        }
    }

    /// Indicator column: the listed rows hold 1
    pub fn indicator(label: impl Into<String>, rows: Vec<usize>) -> Result<Self> {
        check_strictly_increasing(&rows)?;
        Ok(Self {
            label: label.into(),
            data: ColumnData::Indicator(rows),
        })
    }

    /// Sparse column from parallel row / value vectors
    pub fn sparse(label: impl Into<String>, rows: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        if rows.len() != values.len() {
            return Err(CcdError::DimensionMismatch {
                expected: format!("{} sparse values", rows.len()),
                got: format!("{} sparse values", values.len()),
            });
        }
        check_strictly_increasing(&rows)?;
        Ok(Self {
            label: label.into(),
            data: ColumnData::Sparse { rows, values },
        })
    }

    /// Pick the most compact layout for a column given as dense values
    pub fn from_dense_auto(label: impl Into<String>, values: Vec<f64>) -> Self {
        let label = label.into();
        let n_nonzero = values.iter().filter(|&&v| v != 0.0).count();
        if values.iter().all(|&v| v == 0.0 || v == 1.0) {
            let rows = nonzero_rows(&values);
            return Self {
                label,
                data: ColumnData::Indicator(rows),
            };
        }
        if 2 * n_nonzero <= values.len() {
            let rows = nonzero_rows(&values);
            let vals = rows.iter().map(|&k| values[k]).collect();
            return Self {
                label,
                data: ColumnData::Sparse { rows, values: vals },
            };
        }
        Self {
            label,
            data: ColumnData::Dense(values),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn format_type(&self) -> FormatType {
        match self.data {
            ColumnData::Dense(_) => FormatType::Dense,
            ColumnData::Indicator(_) => FormatType::Indicator,
            ColumnData::Sparse { .. } => FormatType::Sparse,
        }
    }

    /// Number of stored entries (rows for dense, listed rows otherwise)
    pub fn n_entries(&self) -> usize {
        match &self.data {
            ColumnData::Dense(v) => v.len(),
            ColumnData::Indicator(r) => r.len(),
            ColumnData::Sparse { rows, .. } => rows.len(),
        }
    }

    /// Largest row index referenced plus one, or the dense length
    pub(crate) fn required_rows(&self) -> usize {
        match &self.data {
            ColumnData::Dense(v) => v.len(),
            ColumnData::Indicator(r) => r.last().map_or(0, |&k| k + 1),
            ColumnData::Sparse { rows, .. } => rows.last().map_or(0, |&k| k + 1),
        }
    }

    /// Dense values if this column is stored densely
    pub fn as_dense(&self) -> Option<&[f64]> {
        match &self.data {
            ColumnData::Dense(v) => Some(v),
            _ => None,
        }
    }

    /// Iterate over `(row, value)` entries; call again to restart
    pub fn iter(&self) -> ColumnIter<'_> {
        match &self.data {
            ColumnData::Dense(v) => ColumnIter::Dense(v.iter().enumerate()),
            ColumnData::Indicator(r) => ColumnIter::Indicator(r.iter()),
            ColumnData::Sparse { rows, values } => ColumnIter::Sparse(rows.iter().zip(values.iter())),
        }
    }

    /// `y[row] += alpha * value` for every entry of the column
    pub fn axpy(&self, y: &mut [f64], alpha: f64) {
        for (k, x) in self.iter() {
            y[k] += alpha * x;
        }
    }

    /// Value of the column at `row` (0 where nothing is stored)
    pub fn value_at(&self, row: usize) -> f64 {
        match &self.data {
            ColumnData::Dense(v) => v.get(row).copied().unwrap_or(0.0),
            ColumnData::Indicator(r) => {
                if r.binary_search(&row).is_ok() {
                    1.0
                } else {
                    0.0
                }
            }
            ColumnData::Sparse { rows, values } => rows.binary_search(&row).map_or(0.0, |i| values[i]),
        }
    }
}

fn nonzero_rows(values: &[f64]) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, &v)| v != 0.0)
        .map(|(k, _)| k)
        .collect()
}

fn check_strictly_increasing(rows: &[usize]) -> Result<()> {
    if rows.windows(2).any(|w| w[0] >= w[1]) {
        return Err(CcdError::InvalidDesignMatrix {
            reason: "Column row indices must be strictly increasing".to_string(),
        });
    }
    Ok(())
}

/// Iterator over the `(row, value)` entries of one column
pub enum ColumnIter<'a> {
    Dense(std::iter::Enumerate<std::slice::Iter<'a, f64>>),
    Indicator(std::slice::Iter<'a, usize>),
    Sparse(std::iter::Zip<std::slice::Iter<'a, usize>, std::slice::Iter<'a, f64>>),
}

impl Iterator for ColumnIter<'_> {
    type Item = (usize, f64);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            ColumnIter::Dense(it) => it.next().map(|(k, &x)| (k, x)),
            ColumnIter::Indicator(it) => it.next().map(|&k| (k, 1.0)),
            ColumnIter::Sparse(it) => it.next().map(|(&k, &x)| (k, x)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            ColumnIter::Dense(it) => it.size_hint(),
            ColumnIter::Indicator(it) => it.size_hint(),
            ColumnIter::Sparse(it) => it.size_hint(),
        }
    }
}

impl ExactSizeIterator for ColumnIter<'_> {}
