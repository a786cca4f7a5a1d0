//! Cox proportional hazards with Breslow tie handling
//!
//! Rows are ordered by non-increasing survival time, so the risk set of any
//! row is a prefix of the data. Each row's risk set ends at the last row that
//! shares its time, which gives the Breslow treatment of ties. The outcome is
//! the event indicator.

use super::{densify, GradientHessian, ModelSpecifics, ModelType, RowWeights, RowWeightsRef};
use crate::data::DesignMatrix;
use crate::error::{CcdError, Result};

#[derive(Debug, Clone)]
pub struct CoxProportionalHazards {
    weights: RowWeights,
    xjy: Vec<f64>,
    exp_x_beta: Vec<f64>,
    /// Running `sum_{i <= k} exp(eta_i)`
    denom_prefix: Vec<f64>,
    /// Inclusive end of each row's risk set
    risk_end: Vec<usize>,
}

impl CoxProportionalHazards {
    pub fn new(data: &DesignMatrix) -> Result<Self> {
        let times = data.times().ok_or_else(|| CcdError::InvalidDesignMatrix {
            reason: "Cox regression requires survival times".to_string(),
        })?;
        if times.windows(2).any(|w| w[1] > w[0]) {
            return Err(CcdError::InvalidDesignMatrix {
                reason: "Rows must be sorted by non-increasing survival time".to_string(),
            });
        }
        if data.outcomes().iter().any(|&y| y != 0.0 && y != 1.0) {
            return Err(CcdError::InvalidDesignMatrix {
                reason: "Cox outcomes must be event indicators (0 or 1)".to_string(),
            });
        }

        let n = data.n_rows();
        let mut risk_end = vec![0; n];
        let mut start = 0;
        while start < n {
            let mut end = start;
            while end + 1 < n && times[end + 1] == times[start] {
                end += 1;
            }
            risk_end[start..=end].fill(end);
            start = end + 1;
        }

        let weights = RowWeights::default();
        let xjy = super::compute_xjy(data, weights.view());
        Ok(Self {
            weights,
            xjy,
            exp_x_beta: vec![1.0; n],
            denom_prefix: (1..=n).map(|k| k as f64).collect(),
            risk_end,
        })
    }

    fn rebuild_prefix(&mut self) {
        let mut total = 0.0;
        for (prefix, &e) in self.denom_prefix.iter_mut().zip(&self.exp_x_beta) {
            total += e;
            *prefix = total;
        }
    }

    fn partial_log_likelihood(&self, data: &DesignMatrix, x_beta: &[f64], weights: RowWeightsRef<'_>) -> f64 {
        let mut prefix = Vec::with_capacity(x_beta.len());
        let mut total = 0.0;
        for &eta in x_beta {
            total += eta.exp();
            prefix.push(total);
        }
        data.outcomes()
            .iter()
            .enumerate()
            .filter(|(_, &y)| y != 0.0)
            .map(|(k, &y)| weights.get(k) * y * (x_beta[k] - prefix[self.risk_end[k]].ln()))
            .sum()
    }
}

impl ModelSpecifics for CoxProportionalHazards {
    fn model_type(&self) -> ModelType {
        ModelType::Cox
    }

    fn set_weights(&mut self, data: &DesignMatrix, weights: Option<&[f64]>) -> Result<()> {
        self.weights = RowWeights::from_option(weights, data.n_rows())?;
        self.xjy = super::compute_xjy(data, self.weights.view());
        Ok(())
    }

    fn compute_remaining_statistics(&mut self, _data: &DesignMatrix, x_beta: &[f64]) {
        for (e, &eta) in self.exp_x_beta.iter_mut().zip(x_beta) {
            *e = eta.exp();
        }
        self.rebuild_prefix();
    }

    fn compute_gradient_and_hessian(&self, data: &DesignMatrix, _x_beta: &[f64], index: usize) -> GradientHessian {
        let x = densify(data.column(index), data.n_rows());
        let w = self.weights.view();
        let y = data.outcomes();

        let mut numer = 0.0;
        let mut numer2 = 0.0;
        let mut gradient = 0.0;
        let mut hessian = 0.0;
        let mut next = 0;
        for k in 0..data.n_rows() {
            // Advance the running sums to the end of this row's risk set
            while next <= self.risk_end[k] {
                let e = self.exp_x_beta[next];
                numer += x[next] * e;
                numer2 += x[next] * x[next] * e;
                next += 1;
            }
            if y[k] == 0.0 {
                continue;
            }
            let d = self.denom_prefix[self.risk_end[k]];
            let t = numer / d;
            let wy = w.get(k) * y[k];
            gradient += wy * t;
            hessian += wy * (numer2 / d - t * t);
        }
        GradientHessian {
            gradient: gradient - self.xjy[index],
            hessian,
        }
    }

    fn update_linear_predictor(&mut self, data: &DesignMatrix, x_beta: &[f64], _delta: f64, index: usize) {
        for (k, _) in data.column(index).iter() {
            self.exp_x_beta[k] = x_beta[k].exp();
        }
        self.rebuild_prefix();
    }

    fn log_likelihood(&self, data: &DesignMatrix, x_beta: &[f64]) -> f64 {
        self.partial_log_likelihood(data, x_beta, self.weights.view())
    }

    fn predictive_log_likelihood(&self, data: &DesignMatrix, x_beta: &[f64], weights: &[f64]) -> f64 {
        self.partial_log_likelihood(data, x_beta, RowWeights::borrowed(weights))
    }

    /// Relative hazards `exp(eta)`
    fn predictive_estimates(&self, _data: &DesignMatrix, x_beta: &[f64]) -> Vec<f64> {
        x_beta.iter().map(|eta| eta.exp()).collect()
    }

    fn fisher_information(&self, data: &DesignMatrix, x_beta: &[f64], i: usize, j: usize) -> f64 {
        let xi = densify(data.column(i), data.n_rows());
        let xj = densify(data.column(j), data.n_rows());
        let w = self.weights.view();
        let y = data.outcomes();

        let (mut denom, mut numer_i, mut numer_j, mut cross) = (0.0, 0.0, 0.0, 0.0);
        let mut info = 0.0;
        let mut next = 0;
        for k in 0..data.n_rows() {
            while next <= self.risk_end[k] {
                let e = x_beta[next].exp();
                denom += e;
                numer_i += xi[next] * e;
                numer_j += xj[next] * e;
                cross += xi[next] * xj[next] * e;
                next += 1;
            }
            if y[k] != 0.0 {
                info += w.get(k) * y[k] * (cross / denom - numer_i * numer_j / (denom * denom));
            }
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CompressedColumn;

    /// Four subjects, times 4, 3, 3, 1; events at both rows with time 3 and at time 1
    fn survival_design() -> DesignMatrix {
        let cols = vec![CompressedColumn::dense("x", vec![1.0, 0.0, 1.0, 0.0])];
        DesignMatrix::new(cols, vec![0.0, 1.0, 1.0, 1.0])
            .unwrap()
            .with_times(vec![4.0, 3.0, 3.0, 1.0])
            .unwrap()
    }

    #[test]
    fn test_requires_sorted_times() {
        let cols = vec![CompressedColumn::dense("x", vec![1.0, 0.0])];
        let data = DesignMatrix::new(cols, vec![1.0, 1.0])
            .unwrap()
            .with_times(vec![1.0, 2.0])
            .unwrap();
        assert!(CoxProportionalHazards::new(&data).is_err());
    }

    #[test]
    fn test_ties_share_risk_set() {
        let data = survival_design();
        let model = CoxProportionalHazards::new(&data).unwrap();
        assert_eq!(model.risk_end, vec![0, 2, 2, 3]);
    }

    #[test]
    fn test_log_likelihood_at_zero() {
        let data = survival_design();
        let model = CoxProportionalHazards::new(&data).unwrap();
        let ll = model.log_likelihood(&data, &[0.0; 4]);
        let expected = -(2.0 * 3.0f64.ln() + 4.0f64.ln());
        assert!((ll - expected).abs() < 1e-12);
    }

    #[test]
    fn test_gradient_at_zero() {
        let data = survival_design();
        let mut model = CoxProportionalHazards::new(&data).unwrap();
        let x_beta = vec![0.0; 4];
        model.compute_remaining_statistics(&data, &x_beta);
        let gh = model.compute_gradient_and_hessian(&data, &x_beta, 0);
        // Two events with risk set {0,1,2}: 2/3 each; one with all four: 2/4
        let expected_g = 2.0 * (2.0 / 3.0) + 0.5 - 1.0;
        let expected_h = 2.0 * (2.0 / 3.0 - 4.0 / 9.0) + (0.5 - 0.25);
        assert!((gh.gradient - expected_g).abs() < 1e-12);
        assert!((gh.hessian - expected_h).abs() < 1e-12);
        let info = model.fisher_information(&data, &x_beta, 0, 0);
        assert!((info - expected_h).abs() < 1e-12);
    }

    #[test]
    fn test_weights_apply_to_events_only() {
        let data = survival_design();
        let mut model = CoxProportionalHazards::new(&data).unwrap();
        model.set_weights(&data, Some(&[1.0, 0.0, 1.0, 1.0])).unwrap();
        let ll = model.log_likelihood(&data, &[0.0; 4]);
        // Row 1 still contributes to risk sets
        let expected = -(3.0f64.ln() + 4.0f64.ln());
        assert!((ll - expected).abs() < 1e-12);
    }

    #[test]
    fn test_incremental_prefix_matches_recompute() {
        let data = survival_design();
        let mut model = CoxProportionalHazards::new(&data).unwrap();
        let mut x_beta = vec![0.0; 4];
        model.compute_remaining_statistics(&data, &x_beta);
        data.column(0).axpy(&mut x_beta, 0.4);
        model.update_linear_predictor(&data, &x_beta, 0.4, 0);
        let incremental = model.denom_prefix.clone();
        model.compute_remaining_statistics(&data, &x_beta);
        for (a, b) in incremental.iter().zip(&model.denom_prefix) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
