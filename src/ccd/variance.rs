//! Asymptotic variance from the inverse Fisher information
//!
//! The information matrix is restricted to coefficients that are currently
//! non-zero, so its size follows the sparsity of the fit rather than the
//! number of covariates.

use std::collections::HashMap;

use ndarray::{s, Array2};

use crate::error::{CcdError, Result};

/// Pivots smaller than this are treated as singular
const PIVOT_TOLERANCE: f64 = 1e-15;

/// Coefficient index to compact row/column of the restricted matrix
#[derive(Debug, Clone, Default)]
pub struct HessianIndexMap {
    compact: HashMap<usize, usize>,
    active: Vec<usize>,
}

impl HessianIndexMap {
    /// Map every index with a non-zero coefficient
    pub fn from_coefficients(beta: &[f64]) -> Self {
        Self::from_indices(
            beta.iter()
                .enumerate()
                .filter(|(_, &b)| b != 0.0)
                .map(|(j, _)| j)
                .collect(),
        )
    }

    pub fn from_indices(active: Vec<usize>) -> Self {
        let compact = active.iter().enumerate().map(|(c, &j)| (j, c)).collect();
        Self { compact, active }
    }

    pub fn get(&self, index: usize) -> Option<usize> {
        self.compact.get(&index).copied()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.compact.contains_key(&index)
    }

    /// Coefficient indices in compact order
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Fisher information over a [`HessianIndexMap`] and its inverse
#[derive(Debug, Clone, Default)]
pub struct FisherCache {
    pub map: HessianIndexMap,
    pub information: Array2<f64>,
    /// Inverse of `information`, the asymptotic covariance
    pub covariance: Array2<f64>,
}

impl FisherCache {
    /// Fill the symmetric information matrix through `entry(i, j)` and invert it
    pub fn build<F>(map: HessianIndexMap, mut entry: F) -> Result<Self>
    where
        F: FnMut(usize, usize) -> f64,
    {
        let m = map.len();
        let mut information = Array2::zeros((m, m));
        for a in 0..m {
            for b in a..m {
                let value = entry(map.active[a], map.active[b]);
                information[[a, b]] = value;
                information[[b, a]] = value;
            }
        }
        let covariance = invert_symmetric(&information).ok_or_else(|| CcdError::SingularMatrix {
            operation: "asymptotic variance estimation".to_string(),
        })?;
        Ok(Self {
            map,
            information,
            covariance,
        })
    }

    fn lookup(&self, matrix: &Array2<f64>, i: usize, j: usize) -> Option<f64> {
        match (self.map.get(i), self.map.get(j)) {
            (Some(a), Some(b)) => Some(matrix[[a, b]]),
            _ => None,
        }
    }

    pub fn variance(&self, i: usize, j: usize) -> Option<f64> {
        self.lookup(&self.covariance, i, j)
    }

    pub fn precision(&self, i: usize, j: usize) -> Option<f64> {
        self.lookup(&self.information, i, j)
    }
}

/// Invert a symmetric matrix with Gauss-Jordan elimination and partial
/// pivoting. Returns `None` if the matrix is singular.
pub fn invert_symmetric(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return None;
    }

    // Augmented matrix [A | I]
    let mut aug = Array2::<f64>::zeros((n, 2 * n));
    aug.slice_mut(s![.., ..n]).assign(matrix);
    for i in 0..n {
        aug[[i, n + i]] = 1.0;
    }

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&a, &b| aug[[a, col]].abs().total_cmp(&aug[[b, col]].abs()))?;
        let pivot = aug[[pivot_row, col]];
        if !(pivot.abs() >= PIVOT_TOLERANCE) {
            return None;
        }
        if pivot_row != col {
            for j in 0..2 * n {
                aug.swap([col, j], [pivot_row, j]);
            }
        }

        aug.row_mut(col).mapv_inplace(|v| v / pivot);
        let pivot_values = aug.row(col).to_owned();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[[row, col]];
            if factor == 0.0 {
                continue;
            }
            aug.row_mut(row).scaled_add(-factor, &pivot_values);
        }
    }

    Some(aug.slice(s![.., n..]).to_owned())
}
