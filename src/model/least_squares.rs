//! Gaussian linear regression (least squares)

use super::{
    compute_xjy, reduce_column, weighted_cross_product, GradientHessian, ModelSpecifics, ModelType,
    RowWeights,
};
use crate::data::DesignMatrix;
use crate::error::Result;

/// Least-squares kernel: `-loglik = 0.5 * sum_k w_k (y_k - eta_k)^2`
///
/// No statistics beyond the linear predictor are cached.
#[derive(Debug, Clone)]
pub struct LeastSquares {
    weights: RowWeights,
    /// `sum_k w_k x_kj y_k`
    xjy: Vec<f64>,
}

impl LeastSquares {
    pub fn new(data: &DesignMatrix) -> Self {
        let weights = RowWeights::default();
        let xjy = compute_xjy(data, weights.view());
        Self { weights, xjy }
    }
}

impl ModelSpecifics for LeastSquares {
    fn model_type(&self) -> ModelType {
        ModelType::LeastSquares
    }

    fn set_weights(&mut self, data: &DesignMatrix, weights: Option<&[f64]>) -> Result<()> {
        self.weights = RowWeights::from_option(weights, data.n_rows())?;
        self.xjy = compute_xjy(data, self.weights.view());
        Ok(())
    }

    fn compute_remaining_statistics(&mut self, _data: &DesignMatrix, _x_beta: &[f64]) {}

    fn compute_gradient_and_hessian(&self, data: &DesignMatrix, x_beta: &[f64], index: usize) -> GradientHessian {
        let w = self.weights.view();
        let (g, h) = reduce_column(data.column(index), |k, x| {
            let wk = w.get(k);
            (wk * x * x_beta[k], wk * x * x)
        });
        GradientHessian {
            gradient: g - self.xjy[index],
            hessian: h,
        }
    }

    fn update_linear_predictor(&mut self, _data: &DesignMatrix, _x_beta: &[f64], _delta: f64, _index: usize) {}

    fn log_likelihood(&self, data: &DesignMatrix, x_beta: &[f64]) -> f64 {
        residual_log_likelihood(data, x_beta, |k| self.weights.view().get(k))
    }

    fn predictive_log_likelihood(&self, data: &DesignMatrix, x_beta: &[f64], weights: &[f64]) -> f64 {
        let w = RowWeights::borrowed(weights);
        residual_log_likelihood(data, x_beta, |k| w.get(k))
    }

    fn predictive_estimates(&self, _data: &DesignMatrix, x_beta: &[f64]) -> Vec<f64> {
        x_beta.to_vec()
    }

    fn fisher_information(&self, data: &DesignMatrix, _x_beta: &[f64], i: usize, j: usize) -> f64 {
        let w = self.weights.view();
        weighted_cross_product(data, i, j, |k| w.get(k))
    }
}

fn residual_log_likelihood<F: Fn(usize) -> f64>(data: &DesignMatrix, x_beta: &[f64], weight: F) -> f64 {
    data.outcomes()
        .iter()
        .zip(x_beta)
        .enumerate()
        .map(|(k, (&y, &eta))| {
            let r = y - eta;
            -0.5 * weight(k) * r * r
        })
        .sum()
}
