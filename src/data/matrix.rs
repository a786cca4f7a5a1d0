//! Design matrix: covariate columns plus per-row outcome data

use super::column::CompressedColumn;
use crate::error::{CcdError, Result};

/// Column-compressed design matrix with outcomes, optional strata and
/// optional exposure / survival times.
///
/// Rows are observations (K), columns are covariates (J). When strata are
/// supplied, rows of one stratum must be contiguous; ids are recoded to
/// `0..n_strata` in order of appearance.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    columns: Vec<CompressedColumn>,
    outcomes: Vec<f64>,
    strata: Option<Vec<usize>>,
    n_strata: usize,
    times: Option<Vec<f64>>,
    has_offset_covariate: bool,
}

impl DesignMatrix {
    /// Create a design matrix from covariate columns and one outcome per row
    pub fn new(columns: Vec<CompressedColumn>, outcomes: Vec<f64>) -> Result<Self> {
        let n_rows = outcomes.len();
        if n_rows == 0 {
            return Err(CcdError::EmptyData {
                reason: "Design matrix has no rows".to_string(),
            });
        }
        if outcomes.iter().any(|y| !y.is_finite()) {
            return Err(CcdError::InvalidDesignMatrix {
                reason: "Outcomes must be finite".to_string(),
            });
        }

        for col in &columns {
            if let Some(values) = col.as_dense() {
                if values.len() != n_rows {
                    return Err(CcdError::DimensionMismatch {
                        expected: format!("{} rows in column '{}'", n_rows, col.label()),
                        got: format!("{} rows", values.len()),
                    });
                }
            } else if col.required_rows() > n_rows {
                return Err(CcdError::DimensionMismatch {
                    expected: format!("row indices below {} in column '{}'", n_rows, col.label()),
                    got: format!("row index {}", col.required_rows() - 1),
                });
            }
            if col.iter().any(|(_, v)| !v.is_finite()) {
                return Err(CcdError::InvalidDesignMatrix {
                    reason: format!("Column '{}' contains non-finite values", col.label()),
                });
            }
        }

        Ok(Self {
            columns,
            outcomes,
            strata: None,
            n_strata: n_rows,
            times: None,
            has_offset_covariate: false,
        })
    }

    /// Attach stratum ids (one per row, rows of a stratum contiguous)
    pub fn with_strata(mut self, ids: Vec<i64>) -> Result<Self> {
        if ids.len() != self.n_rows() {
            return Err(CcdError::DimensionMismatch {
                expected: format!("{} stratum ids", self.n_rows()),
                got: format!("{} stratum ids", ids.len()),
            });
        }
        let (recoded, n_strata) = recode_strata(&ids)?;
        self.strata = Some(recoded);
        self.n_strata = n_strata;
        Ok(self)
    }

    /// Attach exposure (or survival) times, one positive value per row
    pub fn with_times(mut self, times: Vec<f64>) -> Result<Self> {
        if times.len() != self.n_rows() {
            return Err(CcdError::DimensionMismatch {
                expected: format!("{} times", self.n_rows()),
                got: format!("{} times", times.len()),
            });
        }
        if times.iter().any(|&t| !(t.is_finite() && t > 0.0)) {
            return Err(CcdError::InvalidDesignMatrix {
                reason: "Times must be positive finite values".to_string(),
            });
        }
        self.times = Some(times);
        Ok(self)
    }

    /// Treat column 0 as an offset whose coefficient is fixed at 1
    pub fn with_offset_covariate(mut self) -> Result<Self> {
        if self.columns.is_empty() {
            return Err(CcdError::InvalidDesignMatrix {
                reason: "Offset covariate requested but design has no columns".to_string(),
            });
        }
        self.has_offset_covariate = true;
        Ok(self)
    }

    /// Number of observation rows (K)
    pub fn n_rows(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of covariate columns (J)
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of strata (N); equals the row count when no strata are attached
    pub fn n_strata(&self) -> usize {
        self.n_strata
    }

    pub fn column(&self, index: usize) -> &CompressedColumn {
        &self.columns[index]
    }

    pub fn columns(&self) -> &[CompressedColumn] {
        &self.columns
    }

    pub fn outcomes(&self) -> &[f64] {
        &self.outcomes
    }

    /// Recoded stratum id per row
    pub fn strata(&self) -> Option<&[usize]> {
        self.strata.as_deref()
    }

    pub fn times(&self) -> Option<&[f64]> {
        self.times.as_deref()
    }

    /// Time for one row, 1 when no times are attached
    #[inline]
    pub fn time(&self, row: usize) -> f64 {
        self.times.as_ref().map_or(1.0, |t| t[row])
    }

    pub fn has_offset_covariate(&self) -> bool {
        self.has_offset_covariate
    }

    pub fn labels(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.label()).collect()
    }
}

/// Recode contiguous stratum ids to `0..n`; a reappearing id is an error
fn recode_strata(ids: &[i64]) -> Result<(Vec<usize>, usize)> {
    let mut seen = std::collections::HashSet::new();
    let mut recoded = Vec::with_capacity(ids.len());
    let mut current = 0usize;
    let mut last = ids[0];
    seen.insert(last);

    for &id in ids {
        if id != last {
            if !seen.insert(id) {
                return Err(CcdError::InvalidDesignMatrix {
                    reason: format!("Rows of stratum {} are not contiguous", id),
                });
            }
            last = id;
            current += 1;
        }
        recoded.push(current);
    }

    Ok((recoded, current + 1))
}
