//! Unconditional logistic regression

use super::{
    compute_xjy, reduce_column, weighted_cross_product, GradientHessian, ModelSpecifics, ModelType,
    RowWeights,
};
use crate::data::DesignMatrix;
use crate::error::{CcdError, Result};

/// Logistic kernel with success probability `p_k = 1 / (1 + exp(-eta_k))`
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    weights: RowWeights,
    xjy: Vec<f64>,
    probabilities: Vec<f64>,
}

impl LogisticRegression {
    pub fn new(data: &DesignMatrix) -> Result<Self> {
        if data.outcomes().iter().any(|&y| !(0.0..=1.0).contains(&y)) {
            return Err(CcdError::InvalidDesignMatrix {
                reason: "Logistic outcomes must lie in [0, 1]".to_string(),
            });
        }
        let weights = RowWeights::default();
        let xjy = compute_xjy(data, weights.view());
        Ok(Self {
            weights,
            xjy,
            probabilities: vec![0.5; data.n_rows()],
        })
    }
}

/// Numerically stable logistic function
#[inline]
pub(crate) fn sigmoid(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + exp(eta))` without overflow
#[inline]
pub(crate) fn log1p_exp(eta: f64) -> f64 {
    if eta > 0.0 {
        eta + (-eta).exp().ln_1p()
    } else {
        eta.exp().ln_1p()
    }
}

fn bernoulli_log_likelihood<F: Fn(usize) -> f64>(data: &DesignMatrix, x_beta: &[f64], weight: F) -> f64 {
    data.outcomes()
        .iter()
        .enumerate()
        .map(|(k, &y)| weight(k) * (y * x_beta[k] - log1p_exp(x_beta[k])))
        .sum()
}

impl ModelSpecifics for LogisticRegression {
    fn model_type(&self) -> ModelType {
        ModelType::Logistic
    }

    fn set_weights(&mut self, data: &DesignMatrix, weights: Option<&[f64]>) -> Result<()> {
        self.weights = RowWeights::from_option(weights, data.n_rows())?;
        self.xjy = compute_xjy(data, self.weights.view());
        Ok(())
    }

    fn compute_remaining_statistics(&mut self, _data: &DesignMatrix, x_beta: &[f64]) {
        for (p, &eta) in self.probabilities.iter_mut().zip(x_beta) {
            *p = sigmoid(eta);
        }
    }

    fn compute_gradient_and_hessian(&self, data: &DesignMatrix, _x_beta: &[f64], index: usize) -> GradientHessian {
        let w = self.weights.view();
        let p = &self.probabilities;
        let (g, h) = reduce_column(data.column(index), |k, x| {
            let wk = w.get(k);
            let pk = p[k];
            (wk * x * pk, wk * x * x * pk * (1.0 - pk))
        });
        GradientHessian {
            gradient: g - self.xjy[index],
            hessian: h,
        }
    }

    fn update_linear_predictor(&mut self, data: &DesignMatrix, x_beta: &[f64], _delta: f64, index: usize) {
        for (k, _) in data.column(index).iter() {
            self.probabilities[k] = sigmoid(x_beta[k]);
        }
    }

    fn log_likelihood(&self, data: &DesignMatrix, x_beta: &[f64]) -> f64 {
        let w = self.weights.view();
        bernoulli_log_likelihood(data, x_beta, |k| w.get(k))
    }

    fn predictive_log_likelihood(&self, data: &DesignMatrix, x_beta: &[f64], weights: &[f64]) -> f64 {
        let w = RowWeights::borrowed(weights);
        bernoulli_log_likelihood(data, x_beta, |k| w.get(k))
    }

    fn predictive_estimates(&self, _data: &DesignMatrix, x_beta: &[f64]) -> Vec<f64> {
        x_beta.iter().map(|&eta| sigmoid(eta)).collect()
    }

    fn fisher_information(&self, data: &DesignMatrix, x_beta: &[f64], i: usize, j: usize) -> f64 {
        let w = self.weights.view();
        weighted_cross_product(data, i, j, |k| {
            let p = sigmoid(x_beta[k]);
            w.get(k) * p * (1.0 - p)
        })
    }
}
