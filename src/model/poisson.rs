//! Poisson regression with optional exposure times

use statrs::function::gamma::ln_gamma;

use super::{
    compute_xjy, reduce_column, weighted_cross_product, GradientHessian, ModelSpecifics, ModelType,
    RowWeights,
};
use crate::data::DesignMatrix;
use crate::error::{CcdError, Result};

/// Poisson kernel with mean `mu_k = t_k * exp(eta_k)`
#[derive(Debug, Clone)]
pub struct PoissonRegression {
    weights: RowWeights,
    xjy: Vec<f64>,
    /// `t_k * exp(eta_k)`, kept in sync with the linear predictor
    offs_exp_x_beta: Vec<f64>,
}

impl PoissonRegression {
    pub fn new(data: &DesignMatrix) -> Result<Self> {
        if data.outcomes().iter().any(|&y| y < 0.0) {
            return Err(CcdError::InvalidDesignMatrix {
                reason: "Poisson outcomes must be non-negative".to_string(),
            });
        }
        let weights = RowWeights::default();
        let xjy = compute_xjy(data, weights.view());
        Ok(Self {
            weights,
            xjy,
            offs_exp_x_beta: vec![0.0; data.n_rows()],
        })
    }

    fn weighted_log_likelihood<F: Fn(usize) -> f64>(&self, data: &DesignMatrix, x_beta: &[f64], weight: F) -> f64 {
        data.outcomes()
            .iter()
            .enumerate()
            .map(|(k, &y)| {
                let w = weight(k);
                if w == 0.0 {
                    return 0.0;
                }
                let log_mu = x_beta[k] + data.time(k).ln();
                w * (y * log_mu - log_mu.exp() - ln_gamma(y + 1.0))
            })
            .sum()
    }
}

impl ModelSpecifics for PoissonRegression {
    fn model_type(&self) -> ModelType {
        ModelType::Poisson
    }

    fn set_weights(&mut self, data: &DesignMatrix, weights: Option<&[f64]>) -> Result<()> {
        self.weights = RowWeights::from_option(weights, data.n_rows())?;
        self.xjy = compute_xjy(data, self.weights.view());
        Ok(())
    }

    fn compute_remaining_statistics(&mut self, data: &DesignMatrix, x_beta: &[f64]) {
        for (k, value) in self.offs_exp_x_beta.iter_mut().enumerate() {
            *value = data.time(k) * x_beta[k].exp();
        }
    }

    fn compute_gradient_and_hessian(&self, data: &DesignMatrix, _x_beta: &[f64], index: usize) -> GradientHessian {
        let w = self.weights.view();
        let mu = &self.offs_exp_x_beta;
        let (g, h) = reduce_column(data.column(index), |k, x| {
            let wm = w.get(k) * mu[k];
            (wm * x, wm * x * x)
        });
        GradientHessian {
            gradient: g - self.xjy[index],
            hessian: h,
        }
    }

    fn update_linear_predictor(&mut self, data: &DesignMatrix, x_beta: &[f64], _delta: f64, index: usize) {
        for (k, _) in data.column(index).iter() {
            self.offs_exp_x_beta[k] = data.time(k) * x_beta[k].exp();
        }
    }

    fn log_likelihood(&self, data: &DesignMatrix, x_beta: &[f64]) -> f64 {
        let w = self.weights.view();
        self.weighted_log_likelihood(data, x_beta, |k| w.get(k))
    }

    fn predictive_log_likelihood(&self, data: &DesignMatrix, x_beta: &[f64], weights: &[f64]) -> f64 {
        let w = RowWeights::borrowed(weights);
        self.weighted_log_likelihood(data, x_beta, |k| w.get(k))
    }

    fn predictive_estimates(&self, data: &DesignMatrix, x_beta: &[f64]) -> Vec<f64> {
        x_beta
            .iter()
            .enumerate()
            .map(|(k, &eta)| data.time(k) * eta.exp())
            .collect()
    }

    fn fisher_information(&self, data: &DesignMatrix, x_beta: &[f64], i: usize, j: usize) -> f64 {
        let w = self.weights.view();
        weighted_cross_product(data, i, j, |k| w.get(k) * data.time(k) * x_beta[k].exp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CompressedColumn;

    fn design() -> DesignMatrix {
        let cols = vec![
            CompressedColumn::dense("x0", vec![1.0, 1.0]),
            CompressedColumn::indicator("x1", vec![1]).unwrap(),
        ];
        DesignMatrix::new(cols, vec![2.0, 0.0]).unwrap()
    }

    #[test]
    fn test_negative_outcome_rejected() {
        let cols = vec![CompressedColumn::dense("x0", vec![1.0, 1.0])];
        let data = DesignMatrix::new(cols, vec![1.0, -1.0]).unwrap();
        assert!(PoissonRegression::new(&data).is_err());
    }

    #[test]
    fn test_gradient_at_zero() {
        let data = design();
        let mut model = PoissonRegression::new(&data).unwrap();
        let x_beta = vec![0.0; 2];
        model.compute_remaining_statistics(&data, &x_beta);
        let gh = model.compute_gradient_and_hessian(&data, &x_beta, 0);
        // sum(mu - y) = 2 - 2
        assert_eq!(gh.gradient, 0.0);
        assert_eq!(gh.hessian, 2.0);
        let gh = model.compute_gradient_and_hessian(&data, &x_beta, 1);
        assert_eq!(gh.gradient, 1.0);
        assert_eq!(gh.hessian, 1.0);
    }

    #[test]
    fn test_incremental_update_matches_recompute() {
        let data = design();
        let mut model = PoissonRegression::new(&data).unwrap();
        model.compute_remaining_statistics(&data, &[0.0, 0.0]);
        let x_beta = vec![0.0, 0.7];
        model.update_linear_predictor(&data, &x_beta, 0.7, 1);
        let incremental = model.offs_exp_x_beta.clone();
        model.compute_remaining_statistics(&data, &x_beta);
        assert_eq!(incremental, model.offs_exp_x_beta);
    }

    #[test]
    fn test_log_likelihood_with_exposure() {
        let data = design().with_times(vec![2.0, 1.0]).unwrap();
        let model = PoissonRegression::new(&data).unwrap();
        let ll = model.log_likelihood(&data, &[0.0, 0.0]);
        // y=2, mu=2: 2 ln 2 - 2 - ln 2!   y=0, mu=1: -1
        let expected = 2.0 * 2.0f64.ln() - 2.0 - 2.0f64.ln() - 1.0;
        assert!((ll - expected).abs() < 1e-10);
    }
}
