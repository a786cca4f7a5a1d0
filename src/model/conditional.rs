//! Stratified (conditional) likelihoods
//!
//! Conditional logistic regression, conditional Poisson regression and the
//! self-controlled case series share one partial likelihood:
//!
//! ```text
//! loglik = sum_k w_k y_k (eta_k + log t_k) - sum_s n_s log(sum_{k in s} t_k exp(eta_k))
//! ```
//!
//! where `n_s` is the weighted event count of stratum `s` and `t_k` is the
//! exposure time (SCCS only; 1 otherwise). Weights enter through the events;
//! denominators always span the full stratum.

use super::accumulators::NumerDenomBuffer;
use super::{densify, GradientHessian, ModelSpecifics, ModelType, RowWeights, RowWeightsRef};
use crate::data::{DesignMatrix, FormatType};
use crate::error::{CcdError, Result};

/// Which stratified family a [`ConditionalModel`] evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalVariant {
    Logistic,
    Poisson,
    SelfControlledCaseSeries,
}

#[derive(Debug, Clone)]
pub struct ConditionalModel {
    variant: ConditionalVariant,
    weights: RowWeights,
    /// Weighted events per stratum
    n_events: Vec<f64>,
    /// `sum_k w_k x_kj y_k`
    xjy: Vec<f64>,
    /// `t_k * exp(eta_k)` per row
    offs_exp_x_beta: Vec<f64>,
    accumulators: NumerDenomBuffer,
    /// Strata touched by each non-dense column; `None` means all strata
    column_strata: Vec<Option<Vec<usize>>>,
    /// Column whose numerators currently sit in `accumulators`
    numerator_index: Option<usize>,
}

impl ConditionalModel {
    pub fn new(data: &DesignMatrix, variant: ConditionalVariant) -> Result<Self> {
        let strata = data.strata().ok_or_else(|| CcdError::InvalidDesignMatrix {
            reason: "Conditional models require stratum ids".to_string(),
        })?;

        let y = data.outcomes();
        match variant {
            ConditionalVariant::Logistic => {
                if y.iter().any(|&v| !(0.0..=1.0).contains(&v)) {
                    return Err(CcdError::InvalidDesignMatrix {
                        reason: "Conditional logistic outcomes must lie in [0, 1]".to_string(),
                    });
                }
            }
            _ => {
                if y.iter().any(|&v| v < 0.0) {
                    return Err(CcdError::InvalidDesignMatrix {
                        reason: "Event counts must be non-negative".to_string(),
                    });
                }
            }
        }

        let column_strata = data
            .columns()
            .iter()
            .map(|col| match col.format_type() {
                FormatType::Dense => None,
                _ => {
                    let mut touched: Vec<usize> = col.iter().map(|(k, _)| strata[k]).collect();
                    touched.dedup();
                    Some(touched)
                }
            })
            .collect();

        let mut model = Self {
            variant,
            weights: RowWeights::default(),
            n_events: Vec::new(),
            xjy: Vec::new(),
            offs_exp_x_beta: vec![0.0; data.n_rows()],
            accumulators: NumerDenomBuffer::new(data.n_strata()),
            column_strata,
            numerator_index: None,
        };
        model.compute_fixed_terms(data);
        Ok(model)
    }

    pub fn variant(&self) -> ConditionalVariant {
        self.variant
    }

    fn row_time(&self, data: &DesignMatrix, row: usize) -> f64 {
        match self.variant {
            ConditionalVariant::SelfControlledCaseSeries => data.time(row),
            _ => 1.0,
        }
    }

    fn compute_fixed_terms(&mut self, data: &DesignMatrix) {
        let w = self.weights.view();
        self.n_events = stratum_events(data, w);
        self.xjy = super::compute_xjy(data, w);
    }

    fn stratum(data: &DesignMatrix, row: usize) -> usize {
        // Presence checked in `new`
        data.strata().map_or(row, |s| s[row])
    }

    fn accumulate(&self, index: usize, numer: &[f64], numer2: &[f64]) -> GradientHessian {
        let denom = self.accumulators.denom();
        let mut gradient = 0.0;
        let mut hessian = 0.0;
        let mut add = |s: usize| {
            let n = self.n_events[s];
            if n == 0.0 {
                return;
            }
            let t = numer[s] / denom[s];
            gradient += n * t;
            hessian += n * (numer2[s] / denom[s] - t * t);
        };
        match &self.column_strata[index] {
            Some(touched) => touched.iter().for_each(|&s| add(s)),
            None => (0..self.n_events.len()).for_each(&mut add),
        }
        GradientHessian {
            gradient: gradient - self.xjy[index],
            hessian,
        }
    }

    fn partial_log_likelihood(&self, data: &DesignMatrix, x_beta: &[f64], weights: RowWeightsRef<'_>) -> f64 {
        let n_events = stratum_events(data, weights);
        let mut denom = vec![0.0; data.n_strata()];
        for (k, &eta) in x_beta.iter().enumerate() {
            denom[Self::stratum(data, k)] += self.row_time(data, k) * eta.exp();
        }

        let y = data.outcomes();
        let numerator: f64 = (0..data.n_rows())
            .filter(|&k| y[k] != 0.0)
            .map(|k| weights.get(k) * y[k] * (x_beta[k] + self.row_time(data, k).ln()))
            .sum();
        let denominator: f64 = n_events
            .iter()
            .zip(&denom)
            .filter(|(&n, _)| n != 0.0)
            .map(|(&n, &d)| n * d.ln())
            .sum();
        numerator - denominator
    }
}

/// Per-stratum `sum x e` and `sum x^2 e` for one column
fn fill_numerators(
    data: &DesignMatrix,
    index: usize,
    touched: Option<&[usize]>,
    offs_exp_x_beta: &[f64],
    numer: &mut [f64],
    numer2: &mut [f64],
) {
    match touched {
        Some(strata) => {
            for &s in strata {
                numer[s] = 0.0;
                numer2[s] = 0.0;
            }
        }
        None => {
            numer.fill(0.0);
            numer2.fill(0.0);
        }
    }
    for (k, x) in data.column(index).iter() {
        let s = ConditionalModel::stratum(data, k);
        let e = offs_exp_x_beta[k];
        numer[s] += x * e;
        numer2[s] += x * x * e;
    }
}

fn stratum_events(data: &DesignMatrix, weights: RowWeightsRef<'_>) -> Vec<f64> {
    let mut n_events = vec![0.0; data.n_strata()];
    for (k, &y) in data.outcomes().iter().enumerate() {
        n_events[ConditionalModel::stratum(data, k)] += weights.get(k) * y;
    }
    n_events
}

impl ModelSpecifics for ConditionalModel {
    fn model_type(&self) -> ModelType {
        match self.variant {
            ConditionalVariant::Logistic => ModelType::ConditionalLogistic,
            ConditionalVariant::Poisson => ModelType::ConditionalPoisson,
            ConditionalVariant::SelfControlledCaseSeries => ModelType::SelfControlledCaseSeries,
        }
    }

    fn set_weights(&mut self, data: &DesignMatrix, weights: Option<&[f64]>) -> Result<()> {
        self.weights = RowWeights::from_option(weights, data.n_rows())?;
        self.compute_fixed_terms(data);
        Ok(())
    }

    fn compute_remaining_statistics(&mut self, data: &DesignMatrix, x_beta: &[f64]) {
        for k in 0..data.n_rows() {
            self.offs_exp_x_beta[k] = self.row_time(data, k) * x_beta[k].exp();
        }
        let denom = self.accumulators.denom_mut();
        denom.fill(0.0);
        for (k, &e) in self.offs_exp_x_beta.iter().enumerate() {
            denom[Self::stratum(data, k)] += e;
        }
        self.numerator_index = None;
    }

    fn compute_numerator_for_gradient(&mut self, data: &DesignMatrix, _x_beta: &[f64], index: usize) {
        let views = self.accumulators.views_mut();
        fill_numerators(
            data,
            index,
            self.column_strata[index].as_deref(),
            &self.offs_exp_x_beta,
            views.numer,
            views.numer2,
        );
        self.numerator_index = Some(index);
    }

    fn compute_gradient_and_hessian(&self, data: &DesignMatrix, _x_beta: &[f64], index: usize) -> GradientHessian {
        if self.numerator_index == Some(index) {
            return self.accumulate(index, self.accumulators.numer(), self.accumulators.numer2());
        }
        let n = self.accumulators.len();
        let mut numer = vec![0.0; n];
        let mut numer2 = vec![0.0; n];
        fill_numerators(
            data,
            index,
            self.column_strata[index].as_deref(),
            &self.offs_exp_x_beta,
            &mut numer,
            &mut numer2,
        );
        self.accumulate(index, &numer, &numer2)
    }

    fn update_linear_predictor(&mut self, data: &DesignMatrix, x_beta: &[f64], _delta: f64, index: usize) {
        for (k, _) in data.column(index).iter() {
            let s = Self::stratum(data, k);
            let updated = self.row_time(data, k) * x_beta[k].exp();
            self.accumulators.denom_mut()[s] += updated - self.offs_exp_x_beta[k];
            self.offs_exp_x_beta[k] = updated;
        }
        self.numerator_index = None;
    }

    fn requires_full_refresh(&self) -> bool {
        // Conditional logistic recomputes every denominator after each step
        self.variant == ConditionalVariant::Logistic
    }

    fn log_likelihood(&self, data: &DesignMatrix, x_beta: &[f64]) -> f64 {
        self.partial_log_likelihood(data, x_beta, self.weights.view())
    }

    fn predictive_log_likelihood(&self, data: &DesignMatrix, x_beta: &[f64], weights: &[f64]) -> f64 {
        self.partial_log_likelihood(data, x_beta, RowWeights::borrowed(weights))
    }

    /// Expected events per row given the stratum's observed total
    fn predictive_estimates(&self, data: &DesignMatrix, x_beta: &[f64]) -> Vec<f64> {
        let n_events = stratum_events(data, RowWeights::default().view());
        let mut denom = vec![0.0; data.n_strata()];
        let rel: Vec<f64> = (0..data.n_rows())
            .map(|k| self.row_time(data, k) * x_beta[k].exp())
            .collect();
        for (k, &e) in rel.iter().enumerate() {
            denom[Self::stratum(data, k)] += e;
        }
        rel.iter()
            .enumerate()
            .map(|(k, &e)| {
                let s = Self::stratum(data, k);
                n_events[s] * e / denom[s]
            })
            .collect()
    }

    fn fisher_information(&self, data: &DesignMatrix, x_beta: &[f64], i: usize, j: usize) -> f64 {
        let n_strata = data.n_strata();
        let mut denom = vec![0.0; n_strata];
        let mut numer_i = vec![0.0; n_strata];
        let mut numer_j = vec![0.0; n_strata];
        let mut cross = vec![0.0; n_strata];

        let xi = densify(data.column(i), data.n_rows());
        let xj = densify(data.column(j), data.n_rows());
        for k in 0..data.n_rows() {
            let s = Self::stratum(data, k);
            let e = self.row_time(data, k) * x_beta[k].exp();
            denom[s] += e;
            numer_i[s] += xi[k] * e;
            numer_j[s] += xj[k] * e;
            cross[s] += xi[k] * xj[k] * e;
        }

        (0..n_strata)
            .filter(|&s| self.n_events[s] != 0.0)
            .map(|s| {
                let d = denom[s];
                self.n_events[s] * (cross[s] / d - numer_i[s] * numer_j[s] / (d * d))
            })
            .sum()
    }
}
