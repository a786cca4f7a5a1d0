//! Model-specific likelihood kernels consumed by the coordinate descent solver
//!
//! The solver only talks to [`ModelSpecifics`]. Each regression family keeps
//! whatever per-row or per-stratum statistics it needs and refreshes them when
//! the solver reports a coefficient change.
//!
//! Gradients and Hessians are taken of the **negative** log-likelihood, so a
//! well-posed coordinate has a positive Hessian and the unpenalised Newton
//! step is `-g / h`.

mod accumulators;
mod conditional;
mod cox;
mod least_squares;
mod logistic;
mod poisson;

use std::str::FromStr;

use rayon::prelude::*;

use crate::data::{CompressedColumn, DesignMatrix};
use crate::error::{CcdError, Result};

pub use conditional::{ConditionalModel, ConditionalVariant};
pub use cox::CoxProportionalHazards;
pub use least_squares::LeastSquares;
pub use logistic::LogisticRegression;
pub use poisson::PoissonRegression;

/// Dense columns with at least this many rows are reduced in parallel
pub const PARALLEL_ROW_THRESHOLD: usize = 1 << 14;

/// Regression families with a reference kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ModelType {
    LeastSquares,
    Poisson,
    Logistic,
    ConditionalLogistic,
    ConditionalPoisson,
    SelfControlledCaseSeries,
    Cox,
}

impl FromStr for ModelType {
    type Err = CcdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ls" | "least_squares" | "normal" => Ok(ModelType::LeastSquares),
            "pr" | "poisson" => Ok(ModelType::Poisson),
            "lr" | "logistic" => Ok(ModelType::Logistic),
            "clr" | "conditional_logistic" => Ok(ModelType::ConditionalLogistic),
            "cpr" | "conditional_poisson" => Ok(ModelType::ConditionalPoisson),
            "sccs" | "self_controlled_case_series" => Ok(ModelType::SelfControlledCaseSeries),
            "cox" => Ok(ModelType::Cox),
            _ => Err(CcdError::UnknownModelType { name: s.to_string() }),
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelType::LeastSquares => "least_squares",
            ModelType::Poisson => "poisson",
            ModelType::Logistic => "logistic",
            ModelType::ConditionalLogistic => "conditional_logistic",
            ModelType::ConditionalPoisson => "conditional_poisson",
            ModelType::SelfControlledCaseSeries => "sccs",
            ModelType::Cox => "cox",
        };
        write!(f, "{}", name)
    }
}

/// First and second derivative of the negative log-likelihood along one coordinate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientHessian {
    pub gradient: f64,
    pub hessian: f64,
}

/// Capability set the solver requires from a regression family.
///
/// `x_beta` is always the solver's current linear predictor. Implementations
/// may be internally parallel but must return one consistent answer per call.
pub trait ModelSpecifics: Send + Sync {
    fn model_type(&self) -> ModelType;

    /// Store per-row weights (`None` for unweighted) and recompute the fixed
    /// terms that depend on them
    fn set_weights(&mut self, data: &DesignMatrix, weights: Option<&[f64]>) -> Result<()>;

    /// Rebuild every cached statistic from the linear predictor
    fn compute_remaining_statistics(&mut self, data: &DesignMatrix, x_beta: &[f64]);

    /// Prepare per-stratum numerators for `index`; families without
    /// numerators do nothing
    fn compute_numerator_for_gradient(&mut self, _data: &DesignMatrix, _x_beta: &[f64], _index: usize) {}

    fn compute_gradient_and_hessian(&self, data: &DesignMatrix, x_beta: &[f64], index: usize) -> GradientHessian;

    /// Coefficient `index` moved by `delta`; `x_beta` already includes the change
    fn update_linear_predictor(&mut self, data: &DesignMatrix, x_beta: &[f64], delta: f64, index: usize);

    /// Whether a full statistics rebuild is needed after every coordinate update
    fn requires_full_refresh(&self) -> bool {
        false
    }

    /// Log-likelihood under the stored weights
    fn log_likelihood(&self, data: &DesignMatrix, x_beta: &[f64]) -> f64;

    /// Log-likelihood under an alternative set of row weights
    fn predictive_log_likelihood(&self, data: &DesignMatrix, x_beta: &[f64], weights: &[f64]) -> f64;

    /// Fitted values on the response scale
    fn predictive_estimates(&self, data: &DesignMatrix, x_beta: &[f64]) -> Vec<f64>;

    /// Expected information between coefficients `i` and `j`
    fn fisher_information(&self, data: &DesignMatrix, x_beta: &[f64], i: usize, j: usize) -> f64;

    /// Drop any cached cross terms
    fn make_dirty(&mut self) {}
}

/// Create the kernel for a regression family, validating the data it needs
pub fn create_model(model_type: ModelType, data: &DesignMatrix) -> Result<Box<dyn ModelSpecifics>> {
    let model: Box<dyn ModelSpecifics> = match model_type {
        ModelType::LeastSquares => Box::new(LeastSquares::new(data)),
        ModelType::Poisson => Box::new(PoissonRegression::new(data)?),
        ModelType::Logistic => Box::new(LogisticRegression::new(data)?),
        ModelType::ConditionalLogistic => {
            Box::new(ConditionalModel::new(data, ConditionalVariant::Logistic)?)
        }
        ModelType::ConditionalPoisson => {
            Box::new(ConditionalModel::new(data, ConditionalVariant::Poisson)?)
        }
        ModelType::SelfControlledCaseSeries => {
            Box::new(ConditionalModel::new(data, ConditionalVariant::SelfControlledCaseSeries)?)
        }
        ModelType::Cox => Box::new(CoxProportionalHazards::new(data)?),
    };
    log::debug!(
        "Created {} model for {} rows, {} columns, {} strata",
        model_type,
        data.n_rows(),
        data.n_columns(),
        data.n_strata()
    );
    Ok(model)
}

/// One non-negative finite weight per row
pub fn check_weights(weights: &[f64], n_rows: usize) -> Result<()> {
    if weights.len() != n_rows {
        return Err(CcdError::DimensionMismatch {
            expected: format!("{} weights", n_rows),
            got: format!("{} weights", weights.len()),
        });
    }
    if weights.iter().any(|&x| !(x.is_finite() && x >= 0.0)) {
        return Err(CcdError::InvalidInput {
            reason: "Weights must be non-negative and finite".to_string(),
        });
    }
    Ok(())
}

/// Optional per-row weights
#[derive(Debug, Clone, Default)]
pub(crate) struct RowWeights(Option<Vec<f64>>);

impl RowWeights {
    pub(crate) fn from_option(weights: Option<&[f64]>, n_rows: usize) -> Result<Self> {
        match weights {
            None => Ok(Self(None)),
            Some(w) => {
                check_weights(w, n_rows)?;
                Ok(Self(Some(w.to_vec())))
            }
        }
    }

    pub(crate) fn borrowed(weights: &[f64]) -> RowWeightsRef<'_> {
        RowWeightsRef(Some(weights))
    }

    pub(crate) fn view(&self) -> RowWeightsRef<'_> {
        RowWeightsRef(self.0.as_deref())
    }
}

/// Borrowed view of optional per-row weights
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowWeightsRef<'a>(Option<&'a [f64]>);

impl RowWeightsRef<'_> {
    #[inline]
    pub(crate) fn get(&self, row: usize) -> f64 {
        self.0.map_or(1.0, |w| w[row])
    }
}

/// `sum_k w_k x_kj y_k` for every column
pub(crate) fn compute_xjy(data: &DesignMatrix, weights: RowWeightsRef<'_>) -> Vec<f64> {
    let y = data.outcomes();
    data.columns()
        .iter()
        .map(|col| col.iter().map(|(k, x)| weights.get(k) * x * y[k]).sum())
        .collect()
}

/// Sum `f(row, value)` over one column, in parallel for long dense columns
pub(crate) fn reduce_column<F>(column: &CompressedColumn, f: F) -> (f64, f64)
where
    F: Fn(usize, f64) -> (f64, f64) + Sync + Send,
{
    if let Some(values) = column.as_dense() {
        if values.len() >= PARALLEL_ROW_THRESHOLD {
            return values
                .par_iter()
                .enumerate()
                .map(|(k, &x)| f(k, x))
                .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));
        }
    }
    column.iter().fold((0.0, 0.0), |acc, (k, x)| {
        let (a, b) = f(k, x);
        (acc.0 + a, acc.1 + b)
    })
}

/// `sum_k x_ik x_jk v(k)` over rows where both columns are non-zero
pub(crate) fn weighted_cross_product<F>(data: &DesignMatrix, i: usize, j: usize, row_value: F) -> f64
where
    F: Fn(usize) -> f64,
{
    let (col_i, col_j) = (data.column(i), data.column(j));
    let (short, long) = if col_i.n_entries() <= col_j.n_entries() {
        (col_i, col_j)
    } else {
        (col_j, col_i)
    };
    short
        .iter()
        .map(|(k, x)| {
            let other = long.value_at(k);
            if other == 0.0 {
                0.0
            } else {
                x * other * row_value(k)
            }
        })
        .sum()
}

/// Dense copy of one column
pub(crate) fn densify(column: &CompressedColumn, n_rows: usize) -> Vec<f64> {
    let mut values = vec![0.0; n_rows];
    for (k, x) in column.iter() {
        values[k] = x;
    }
    values
}
