//! Cyclic coordinate descent driver
//!
//! Coordinates are visited in ascending order, one Newton step each, and every
//! accepted step is pushed into the linear predictor before the next
//! coordinate is evaluated (Gauss-Seidel). Derived state is rebuilt lazily and
//! guarded by [`ValidityFlags`].

use log::{debug, info, log_enabled, trace, warn, Level};
use ndarray::Array2;

use super::bounds::TrustRegion;
use super::convergence::{
    zhang_oles_criterion, ConvergenceMonitor, ConvergenceType, FitParams, FitStatus, SweepOutcome,
};
use super::state::ValidityFlags;
use super::variance::{FisherCache, HessianIndexMap};
use crate::data::DesignMatrix;
use crate::error::{CcdError, Result};
use crate::io::{CoefficientReport, CoefficientRow};
use crate::model::{check_weights, create_model, ModelSpecifics, ModelType};
use crate::prior::PriorConfig;

/// Coordinates between trace messages within one sweep
const TRACE_INTERVAL: usize = 100;

/// Regularized GLM solver over one design matrix
pub struct CyclicCoordinateDescent<'a> {
    data: &'a DesignMatrix,
    model: Box<dyn ModelSpecifics>,
    prior: PriorConfig,

    beta: Vec<f64>,
    fixed: Vec<bool>,
    x_beta: Vec<f64>,
    /// Linear predictor at the start of the last sweep
    x_beta_save: Vec<f64>,
    weights: Option<Vec<f64>>,

    bounds: TrustRegion,
    flags: ValidityFlags,
    fisher: Option<FisherCache>,

    update_count: usize,
    likelihood_count: usize,
    iteration_count: usize,
    last_status: Option<FitStatus>,
}

impl<'a> CyclicCoordinateDescent<'a> {
    /// Create a solver around an existing model kernel
    pub fn new(data: &'a DesignMatrix, model: Box<dyn ModelSpecifics>, prior: PriorConfig) -> Result<Self> {
        let n_coefficients = data.n_columns();
        if n_coefficients == 0 {
            return Err(CcdError::EmptyData {
                reason: "Design matrix has no covariates".to_string(),
            });
        }

        let mut solver = Self {
            data,
            model,
            prior,
            beta: vec![0.0; n_coefficients],
            fixed: vec![false; n_coefficients],
            x_beta: vec![0.0; data.n_rows()],
            x_beta_save: vec![0.0; data.n_rows()],
            weights: None,
            bounds: TrustRegion::new(n_coefficients),
            flags: ValidityFlags::new(),
            fisher: None,
            update_count: 0,
            likelihood_count: 0,
            iteration_count: 0,
            last_status: None,
        };
        solver.initialize_beta();
        debug!(
            "Initialized solver: {} model, {} rows, {} covariates, prior {}",
            solver.model.model_type(),
            data.n_rows(),
            n_coefficients,
            solver.prior
        );
        Ok(solver)
    }

    /// Create a solver with the reference kernel for `model_type`
    pub fn with_model_type(data: &'a DesignMatrix, model_type: ModelType, prior: PriorConfig) -> Result<Self> {
        let model = create_model(model_type, data)?;
        Self::new(data, model, prior)
    }

    fn initialize_beta(&mut self) {
        self.beta.fill(0.0);
        if self.data.has_offset_covariate() {
            self.beta[0] = 1.0;
            self.fixed[0] = true;
        }
        self.flags.invalidate_all();
    }

    // ------------------------------------------------------------------
    // Lazy state
    // ------------------------------------------------------------------

    fn ensure_weights(&mut self) -> Result<()> {
        if !self.flags.weights_valid {
            self.model.set_weights(self.data, self.weights.as_deref())?;
            self.flags.weights_valid = true;
            self.flags.sufficient_statistics_known = false;
        }
        Ok(())
    }

    fn ensure_x_beta(&mut self) {
        if !self.flags.x_beta_known {
            self.x_beta.fill(0.0);
            for (column, &b) in self.data.columns().iter().zip(&self.beta) {
                if b != 0.0 {
                    column.axpy(&mut self.x_beta, b);
                }
            }
            self.flags.x_beta_known = true;
            self.flags.sufficient_statistics_known = false;
        }
    }

    /// Bring weights, linear predictor and sufficient statistics up to date
    fn check_all_lazy_flags(&mut self) -> Result<()> {
        self.ensure_weights()?;
        self.ensure_x_beta();
        if !self.flags.sufficient_statistics_known {
            self.model.compute_remaining_statistics(self.data, &self.x_beta);
            self.flags.sufficient_statistics_known = true;
        }
        Ok(())
    }

    fn ensure_fisher_information(&mut self) -> Result<&FisherCache> {
        self.check_all_lazy_flags()?;
        if !self.flags.fisher_information_known || self.fisher.is_none() {
            let map = HessianIndexMap::from_coefficients(&self.beta);
            debug!("Building Fisher information over {} active coefficients", map.len());
            let (model, data, x_beta) = (&self.model, self.data, &self.x_beta);
            let cache = FisherCache::build(map, |i, j| model.fisher_information(data, x_beta, i, j))?;
            self.fisher = Some(cache);
            self.flags.fisher_information_known = true;
        }
        self.fisher.as_ref().ok_or_else(|| CcdError::StateSynchronization {
            operation: "Fisher information".to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Fitting
    // ------------------------------------------------------------------

    /// Run sweeps until the convergence criterion, the iteration budget or
    /// ill-conditioning ends the fit
    pub fn fit(&mut self, params: &FitParams) -> Result<FitStatus> {
        params.validate()?;
        self.bounds.reset();
        self.check_all_lazy_flags()?;

        let mut monitor = ConvergenceMonitor::new(*params);
        let initial = match params.convergence {
            ConvergenceType::ZhangOles => None,
            mode => Some(self.objective(mode)?),
        };
        monitor.start(initial);

        let status = loop {
            if params.convergence == ConvergenceType::ZhangOles {
                self.x_beta_save.copy_from_slice(&self.x_beta);
            }

            if !self.run_sweep()? {
                break FitStatus::IllConditioned;
            }

            let value = match params.convergence {
                ConvergenceType::ZhangOles => {
                    let w = self.weights.as_deref();
                    zhang_oles_criterion(&self.x_beta, &self.x_beta_save, w)
                }
                mode => self.objective(mode)?,
            };

            let outcome = monitor.check(value);

            if log_enabled!(Level::Debug) {
                let log_likelihood = self.log_likelihood()?;
                let log_prior = self.log_prior();
                debug!(
                    "Iteration {}: log likelihood = {:.6}, log prior = {:.6}, log posterior = {:.6}, criterion = {:e}",
                    monitor.iteration(),
                    log_likelihood,
                    log_prior,
                    log_likelihood + log_prior,
                    monitor.last_criterion()
                );
            }

            if let SweepOutcome::Done(status) = outcome {
                break status;
            }
        };

        match status {
            FitStatus::Success => info!("Reached convergence criterion after {} iterations", monitor.iteration()),
            FitStatus::MaxIterations => info!("Reached maximum iterations ({})", monitor.iteration()),
            FitStatus::IllConditioned => warn!(
                "Problem is ill-conditioned for this choice of hyperparameter ({}); enforcing convergence",
                self.prior
            ),
        }

        self.iteration_count += monitor.iteration();
        self.last_status = Some(status);
        Ok(status)
    }

    /// One pass over every free coordinate in ascending order.
    ///
    /// Returns `false` as soon as a coordinate produces a non-finite step;
    /// the remaining coordinates are left untouched.
    fn run_sweep(&mut self) -> Result<bool> {
        for index in 0..self.beta.len() {
            if self.fixed[index] {
                continue;
            }
            if !self.update_coordinate(index)? {
                return Ok(false);
            }
            if (index + 1) % TRACE_INTERVAL == 0 {
                trace!("Updated {} of {} coordinates", index + 1, self.beta.len());
            }
        }
        Ok(true)
    }

    /// Newton step on one coordinate; `Ok(false)` if the step is not finite
    fn update_coordinate(&mut self, index: usize) -> Result<bool> {
        if !self.flags.sufficient_statistics_known {
            debug_assert!(false, "sufficient statistics stale before updating coordinate {}", index);
            return Err(CcdError::StateSynchronization {
                operation: format!("update of coordinate {}", index),
            });
        }

        self.model.compute_numerator_for_gradient(self.data, &self.x_beta, index);
        let gh = self.model.compute_gradient_and_hessian(self.data, &self.x_beta, index);
        let raw = self.prior.compute_delta(gh.gradient, gh.hessian, self.beta[index]);
        if !raw.is_finite() {
            debug!(
                "Non-finite step for coordinate {} (gradient = {}, hessian = {})",
                index, gh.gradient, gh.hessian
            );
            return Ok(false);
        }
        let step = self.bounds.apply(index, raw);

        if step != 0.0 {
            self.beta[index] += step;
            self.data.column(index).axpy(&mut self.x_beta, step);
            self.flags.coefficients_changed();
            self.model.update_linear_predictor(self.data, &self.x_beta, step, index);
            if self.model.requires_full_refresh() {
                self.model.compute_remaining_statistics(self.data, &self.x_beta);
            }
            self.flags.sufficient_statistics_known = true;
            self.update_count += 1;
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Objectives
    // ------------------------------------------------------------------

    pub fn log_likelihood(&mut self) -> Result<f64> {
        self.check_all_lazy_flags()?;
        self.likelihood_count += 1;
        Ok(self.model.log_likelihood(self.data, &self.x_beta))
    }

    /// Log-density of the prior at the free coefficients; the offset is excluded
    pub fn log_prior(&self) -> f64 {
        let start = usize::from(self.data.has_offset_covariate());
        self.prior.log_density(&self.beta[start..])
    }

    /// Value tracked by `mode` at the current coefficients
    pub fn objective(&mut self, mode: ConvergenceType) -> Result<f64> {
        match mode {
            ConvergenceType::Gradient => {
                self.ensure_x_beta();
                let y = self.data.outcomes();
                let value = match self.weights.as_deref() {
                    Some(w) => (0..y.len()).map(|k| self.x_beta[k] * y[k] * w[k]).sum(),
                    None => self.x_beta.iter().zip(y).map(|(eta, y)| eta * y).sum(),
                };
                Ok(value)
            }
            ConvergenceType::Mittal => self.log_likelihood(),
            ConvergenceType::Lange => Ok(self.log_likelihood()? + self.log_prior()),
            ConvergenceType::ZhangOles => {
                self.ensure_x_beta();
                Ok(zhang_oles_criterion(&self.x_beta, &self.x_beta_save, self.weights.as_deref()))
            }
        }
    }

    // ------------------------------------------------------------------
    // Coefficients
    // ------------------------------------------------------------------

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.beta.len() {
            return Err(CcdError::InvalidInput {
                reason: format!("Coefficient index {} out of range (J = {})", index, self.beta.len()),
            });
        }
        Ok(())
    }

    pub fn n_coefficients(&self) -> usize {
        self.beta.len()
    }

    pub fn coefficient(&self, index: usize) -> Result<f64> {
        self.check_index(index)?;
        Ok(self.beta[index])
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.beta
    }

    pub fn set_coefficient(&mut self, index: usize, value: f64) -> Result<()> {
        self.check_index(index)?;
        self.beta[index] = value;
        self.flags.invalidate_all();
        Ok(())
    }

    pub fn set_coefficients(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.beta.len() {
            return Err(CcdError::DimensionMismatch {
                expected: format!("{} coefficients", self.beta.len()),
                got: format!("{} coefficients", values.len()),
            });
        }
        self.beta.copy_from_slice(values);
        self.flags.invalidate_all();
        Ok(())
    }

    /// Exclude (or re-include) a coordinate from the sweep
    pub fn set_fixed(&mut self, index: usize, fixed: bool) -> Result<()> {
        self.check_index(index)?;
        self.fixed[index] = fixed;
        Ok(())
    }

    pub fn is_fixed(&self, index: usize) -> bool {
        self.fixed.get(index).copied().unwrap_or(false)
    }

    /// Zero every coefficient; an offset covariate goes back to 1
    pub fn reset_beta(&mut self) {
        self.initialize_beta();
    }

    /// Force every derived quantity to be rebuilt on next use
    pub fn make_dirty(&mut self) {
        self.flags.invalidate_all();
        self.model.make_dirty();
    }

    /// Current linear predictor, rebuilt first if stale
    pub fn linear_predictor(&mut self) -> &[f64] {
        self.ensure_x_beta();
        &self.x_beta
    }

    pub fn flags(&self) -> ValidityFlags {
        self.flags
    }

    // ------------------------------------------------------------------
    // Weights, prior and knobs
    // ------------------------------------------------------------------

    /// Row weights for subsequent fits; `None` restores unit weights
    pub fn set_weights(&mut self, weights: Option<&[f64]>) -> Result<()> {
        if let Some(w) = weights {
            check_weights(w, self.data.n_rows())?;
        }
        self.weights = weights.map(<[f64]>::to_vec);
        self.flags.invalidate_all();
        Ok(())
    }

    pub fn prior(&self) -> &PriorConfig {
        &self.prior
    }

    pub fn set_prior(&mut self, prior: PriorConfig) {
        self.prior = prior;
        self.flags.invalidate_all();
    }

    /// Set the prior variance, keeping the prior type
    pub fn set_hyperprior(&mut self, variance: f64) -> Result<()> {
        self.prior.set_variance(variance)?;
        self.flags.invalidate_all();
        Ok(())
    }

    pub fn hyperprior(&self) -> f64 {
        self.prior.hyperprior()
    }

    pub fn set_initial_bound(&mut self, bound: f64) -> Result<()> {
        self.bounds.set_initial(bound)
    }

    pub fn model_type(&self) -> ModelType {
        self.model.model_type()
    }

    // ------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------

    /// Accepted non-zero coordinate steps
    pub fn update_count(&self) -> usize {
        self.update_count
    }

    pub fn likelihood_count(&self) -> usize {
        self.likelihood_count
    }

    /// Sweeps run across every fit
    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    pub fn last_status(&self) -> Option<FitStatus> {
        self.last_status
    }

    // ------------------------------------------------------------------
    // Variance and prediction
    // ------------------------------------------------------------------

    /// Entry `(i, j)` of the inverse Fisher information.
    ///
    /// `Ok(None)` when either coefficient is exactly zero, since such
    /// coefficients are left out of the information matrix.
    pub fn asymptotic_variance(&mut self, i: usize, j: usize) -> Result<Option<f64>> {
        self.check_index(i)?;
        self.check_index(j)?;
        Ok(self.ensure_fisher_information()?.variance(i, j))
    }

    /// Entry `(i, j)` of the Fisher information over the active coefficients
    pub fn asymptotic_precision(&mut self, i: usize, j: usize) -> Result<Option<f64>> {
        self.check_index(i)?;
        self.check_index(j)?;
        Ok(self.ensure_fisher_information()?.precision(i, j))
    }

    /// Fisher information over an arbitrary index list
    pub fn fisher_information(&mut self, indices: &[usize]) -> Result<Array2<f64>> {
        for &index in indices {
            self.check_index(index)?;
        }
        self.check_all_lazy_flags()?;
        let m = indices.len();
        let mut information = Array2::zeros((m, m));
        for a in 0..m {
            for b in a..m {
                let value = self.model.fisher_information(self.data, &self.x_beta, indices[a], indices[b]);
                information[[a, b]] = value;
                information[[b, a]] = value;
            }
        }
        Ok(information)
    }

    /// Model Hessian of the negative log-likelihood along one coordinate
    pub fn hessian_diagonal(&mut self, index: usize) -> Result<f64> {
        self.check_index(index)?;
        self.check_all_lazy_flags()?;
        self.model.compute_numerator_for_gradient(self.data, &self.x_beta, index);
        Ok(self.model.compute_gradient_and_hessian(self.data, &self.x_beta, index).hessian)
    }

    pub fn predictive_log_likelihood(&mut self, weights: &[f64]) -> Result<f64> {
        check_weights(weights, self.data.n_rows())?;
        self.ensure_x_beta();
        Ok(self.model.predictive_log_likelihood(self.data, &self.x_beta, weights))
    }

    /// Fitted values on the response scale
    pub fn predictive_estimates(&mut self) -> Vec<f64> {
        self.ensure_x_beta();
        self.model.predictive_estimates(self.data, &self.x_beta)
    }

    /// Tabulate the coefficients, with asymptotic standard errors if requested
    pub fn report(&mut self, with_ase: bool) -> Result<CoefficientReport> {
        let n_coefficients = self.beta.len();
        let variances: Option<Vec<Option<f64>>> = if with_ase {
            match self.ensure_fisher_information() {
                Ok(cache) => Some((0..n_coefficients).map(|j| cache.variance(j, j)).collect()),
                Err(CcdError::SingularMatrix { operation }) => {
                    warn!("Singular Fisher information in {}; omitting standard errors", operation);
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let coefficients = self
            .data
            .labels()
            .into_iter()
            .zip(&self.beta)
            .enumerate()
            .map(|(j, (label, &estimate))| {
                let se = variances
                    .as_ref()
                    .and_then(|v| v[j])
                    .filter(|v| *v >= 0.0)
                    .map(f64::sqrt);
                CoefficientRow::new(label, estimate, se)
            })
            .collect();

        Ok(CoefficientReport {
            model: self.model.model_type().to_string(),
            prior: self.prior.to_string(),
            status: self.last_status,
            iterations: self.iteration_count,
            log_likelihood: self.log_likelihood()?,
            log_prior: self.log_prior(),
            coefficients,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CompressedColumn;

    const X1: [f64; 5] = [0.5, -0.3, 1.2, 0.0, -1.0];
    const X2: [f64; 5] = [1.0, 1.0, 0.5, -1.0, 0.5];
    const Y: [f64; 5] = [3.0, 1.0, 4.0, 2.0, 0.0];

    fn design() -> DesignMatrix {
        let cols = vec![
            CompressedColumn::dense("intercept", vec![1.0; 5]),
            CompressedColumn::dense("x1", X1.to_vec()),
            CompressedColumn::dense("x2", X2.to_vec()),
        ];
        DesignMatrix::new(cols, Y.to_vec()).unwrap()
    }

    fn rows() -> Vec<[f64; 3]> {
        (0..5).map(|k| [1.0, X1[k], X2[k]]).collect()
    }

    /// Solve a small dense system with Gaussian elimination
    fn solve(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> [f64; 3] {
        for c in 0..3 {
            let p = (c..3).max_by(|&r, &s| a[r][c].abs().total_cmp(&a[s][c].abs())).unwrap();
            a.swap(c, p);
            b.swap(c, p);
            for r in 0..3 {
                if r != c {
                    let f = a[r][c] / a[c][c];
                    for k in 0..3 {
                        a[r][k] -= f * a[c][k];
                    }
                    b[r] -= f * b[c];
                }
            }
        }
        [b[0] / a[0][0], b[1] / a[1][1], b[2] / a[2][2]]
    }

    /// Newton-Raphson (IRLS) Poisson fit
    fn poisson_newton() -> [f64; 3] {
        let x = rows();
        let mut beta = [0.0; 3];
        for _ in 0..100 {
            let mut h = [[0.0; 3]; 3];
            let mut g = [0.0; 3];
            for k in 0..5 {
                let mu = (0..3).map(|j| x[k][j] * beta[j]).sum::<f64>().exp();
                for i in 0..3 {
                    g[i] += x[k][i] * (Y[k] - mu);
                    for j in 0..3 {
                        h[i][j] += x[k][i] * x[k][j] * mu;
                    }
                }
            }
            let d = solve(h, g);
            for j in 0..3 {
                beta[j] += d[j];
            }
        }
        beta
    }

    fn ridge_closed_form(variance: f64) -> [f64; 3] {
        let x = rows();
        let mut a = [[0.0; 3]; 3];
        let mut b = [0.0; 3];
        for k in 0..5 {
            for i in 0..3 {
                b[i] += x[k][i] * Y[k];
                for j in 0..3 {
                    a[i][j] += x[k][i] * x[k][j];
                }
            }
        }
        for (i, row) in a.iter_mut().enumerate() {
            row[i] += 1.0 / variance;
        }
        solve(a, b)
    }

    #[test]
    fn test_poisson_matches_newton_raphson() {
        let data = design();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, PriorConfig::none()).unwrap();
        let status = ccd.fit(&FitParams::new(100, ConvergenceType::ZhangOles, 1e-8)).unwrap();
        assert_eq!(status, FitStatus::Success);

        let expected = poisson_newton();
        for j in 0..3 {
            assert!((ccd.coefficient(j).unwrap() - expected[j]).abs() < 1e-6);
        }
        let v01 = ccd.asymptotic_variance(0, 1).unwrap().unwrap();
        let v10 = ccd.asymptotic_variance(1, 0).unwrap().unwrap();
        assert_eq!(v01, v10);
        assert!(ccd.asymptotic_variance(2, 2).unwrap().unwrap() > 0.0);
    }

    #[test]
    fn test_laplace_pins_coefficient_at_zero() {
        let data = design();
        let prior = PriorConfig::laplace_with_lambda(2.0).unwrap();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, prior).unwrap();
        let status = ccd.fit(&FitParams::new(1000, ConvergenceType::ZhangOles, 1e-12)).unwrap();
        assert_eq!(status, FitStatus::Success);

        assert_eq!(ccd.coefficient(2).unwrap(), 0.0);
        assert!((ccd.coefficient(0).unwrap() - 0.236743).abs() < 1e-5);
        assert!((ccd.coefficient(1).unwrap() - 0.791836).abs() < 1e-5);

        assert_eq!(ccd.asymptotic_variance(2, 2).unwrap(), None);
        assert_eq!(ccd.asymptotic_variance(0, 2).unwrap(), None);
        assert!(ccd.asymptotic_variance(1, 1).unwrap().unwrap() > 0.0);
    }

    #[test]
    fn test_least_squares_ridge_matches_closed_form() {
        let data = design();
        let prior = PriorConfig::normal(0.5).unwrap();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::LeastSquares, prior).unwrap();
        let status = ccd.fit(&FitParams::new(10000, ConvergenceType::ZhangOles, 1e-12)).unwrap();
        assert_eq!(status, FitStatus::Success);
        let expected = ridge_closed_form(0.5);
        for j in 0..3 {
            assert!((ccd.coefficient(j).unwrap() - expected[j]).abs() < 1e-8);
        }
    }

    #[test]
    fn test_least_squares_unpenalized_matches_ols() {
        let data = design();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::LeastSquares, PriorConfig::none()).unwrap();
        ccd.fit(&FitParams::new(10000, ConvergenceType::ZhangOles, 1e-12)).unwrap();
        let expected = ridge_closed_form(f64::INFINITY);
        for j in 0..3 {
            assert!((ccd.coefficient(j).unwrap() - expected[j]).abs() < 1e-8);
        }
    }

    #[test]
    fn test_refit_after_success_is_idempotent() {
        let data = design();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, PriorConfig::none()).unwrap();
        let params = FitParams::new(100, ConvergenceType::ZhangOles, 1e-8);
        ccd.fit(&params).unwrap();
        let before = ccd.coefficients().to_vec();
        let ll_before = ccd.log_likelihood().unwrap();
        let iterations = ccd.iteration_count();

        assert_eq!(ccd.fit(&params).unwrap(), FitStatus::Success);
        assert_eq!(ccd.iteration_count(), iterations + 1);
        for (a, b) in before.iter().zip(ccd.coefficients()) {
            assert!((a - b).abs() < 1e-8);
        }
        assert!((ccd.log_likelihood().unwrap() - ll_before).abs() < 1e-10);
    }

    #[test]
    fn test_objective_based_criteria_converge() {
        let data = design();
        let expected = poisson_newton();
        for mode in [ConvergenceType::Gradient, ConvergenceType::Mittal, ConvergenceType::Lange] {
            let mut ccd =
                CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, PriorConfig::none()).unwrap();
            let status = ccd.fit(&FitParams::new(1000, mode, 1e-14)).unwrap();
            assert_eq!(status, FitStatus::Success);
            for j in 0..3 {
                assert!((ccd.coefficient(j).unwrap() - expected[j]).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_max_iterations_status() {
        let data = design();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, PriorConfig::none()).unwrap();
        let status = ccd.fit(&FitParams::new(2, ConvergenceType::ZhangOles, 1e-12)).unwrap();
        assert_eq!(status, FitStatus::MaxIterations);
        assert_eq!(ccd.iteration_count(), 2);
        assert_eq!(ccd.last_status(), Some(FitStatus::MaxIterations));
    }

    #[test]
    fn test_non_finite_objective_is_ill_conditioned() {
        let cols = vec![CompressedColumn::dense("x", vec![1.0, 1.0])];
        let data = DesignMatrix::new(cols, vec![1e308, 1e308]).unwrap();
        let mut ccd =
            CyclicCoordinateDescent::with_model_type(&data, ModelType::LeastSquares, PriorConfig::none()).unwrap();
        let status = ccd.fit(&FitParams::new(50, ConvergenceType::Gradient, 0.0)).unwrap();
        assert_eq!(status, FitStatus::IllConditioned);
        assert!(!status.is_normal());
    }

    #[test]
    fn test_empty_column_is_ill_conditioned() {
        let cols = vec![
            CompressedColumn::dense("x", X1.to_vec()),
            CompressedColumn::sparse("empty", vec![], vec![]).unwrap(),
        ];
        let data = DesignMatrix::new(cols, Y.to_vec()).unwrap();
        let mut ccd =
            CyclicCoordinateDescent::with_model_type(&data, ModelType::LeastSquares, PriorConfig::none()).unwrap();
        let status = ccd.fit(&FitParams::new(100, ConvergenceType::Gradient, 1e-6)).unwrap();
        assert_eq!(status, FitStatus::IllConditioned);
        assert!(ccd.coefficients().iter().all(|b| b.is_finite()));
        assert_eq!(ccd.coefficient(1).unwrap(), 0.0);

        // A penalty keeps the step finite
        let mut ridge =
            CyclicCoordinateDescent::with_model_type(&data, ModelType::LeastSquares, PriorConfig::normal(1.0).unwrap())
                .unwrap();
        let status = ridge.fit(&FitParams::new(100, ConvergenceType::Gradient, 1e-6)).unwrap();
        assert_eq!(status, FitStatus::Success);
        assert_eq!(ridge.coefficient(1).unwrap(), 0.0);
    }

    #[test]
    fn test_invalid_weights_rejected_on_entry() {
        let data = design();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, PriorConfig::none()).unwrap();
        assert!(matches!(
            ccd.set_weights(Some(&[-1.0, 1.0, 1.0, 1.0, 1.0])),
            Err(CcdError::InvalidInput { .. })
        ));
        assert!(ccd.set_weights(Some(&[1.0, f64::NAN, 1.0, 1.0, 1.0])).is_err());
        assert!(ccd.set_weights(Some(&[1.0, 1.0, f64::INFINITY, 1.0, 1.0])).is_err());

        // The rejected weights were never stored
        assert!(ccd.log_likelihood().is_ok());
        let status = ccd.fit(&FitParams::new(100, ConvergenceType::ZhangOles, 1e-8)).unwrap();
        assert_eq!(status, FitStatus::Success);
    }

    #[test]
    fn test_gradient_objective_uses_weights() {
        let data = design();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, PriorConfig::none()).unwrap();
        let beta = [0.3, -0.2, 0.5];
        let weights = [1.0, 0.0, 2.0, 0.5, 1.0];
        ccd.set_coefficients(&beta).unwrap();

        let unweighted: f64 = rows()
            .iter()
            .zip(&Y)
            .map(|(x, y)| (0..3).map(|j| x[j] * beta[j]).sum::<f64>() * y)
            .sum();
        assert!((ccd.objective(ConvergenceType::Gradient).unwrap() - unweighted).abs() < 1e-12);

        ccd.set_weights(Some(&weights)).unwrap();
        let weighted: f64 = rows()
            .iter()
            .zip(Y.iter().zip(&weights))
            .map(|(x, (y, w))| (0..3).map(|j| x[j] * beta[j]).sum::<f64>() * y * w)
            .sum();
        assert!((ccd.objective(ConvergenceType::Gradient).unwrap() - weighted).abs() < 1e-12);
        assert!((weighted - unweighted).abs() > 1e-3);
    }

    #[test]
    fn test_invalid_fit_params_rejected() {
        let data = design();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, PriorConfig::none()).unwrap();
        assert!(ccd.fit(&FitParams::new(0, ConvergenceType::Gradient, 1e-6)).is_err());
    }

    #[test]
    fn test_setters_invalidate_flags() {
        let data = design();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, PriorConfig::none()).unwrap();
        ccd.fit(&FitParams::new(100, ConvergenceType::ZhangOles, 1e-8)).unwrap();
        ccd.asymptotic_variance(0, 0).unwrap();
        assert!(ccd.flags().all_valid());

        ccd.set_coefficient(1, 0.25).unwrap();
        assert_eq!(ccd.flags(), ValidityFlags::new());
        assert_eq!(ccd.coefficient(1).unwrap(), 0.25);

        ccd.log_likelihood().unwrap();
        ccd.set_weights(Some(&[1.0; 5])).unwrap();
        assert_eq!(ccd.flags(), ValidityFlags::new());

        ccd.log_likelihood().unwrap();
        ccd.set_prior(PriorConfig::normal(1.0).unwrap());
        assert_eq!(ccd.flags(), ValidityFlags::new());

        assert!(ccd.set_coefficients(&[0.0; 2]).is_err());
        assert!(ccd.set_weights(Some(&[1.0; 4])).is_err());
        assert!(ccd.coefficient(3).is_err());
    }

    #[test]
    fn test_linear_predictor_rebuilt_after_set() {
        let data = design();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, PriorConfig::none()).unwrap();
        ccd.set_coefficients(&[1.0, 2.0, 0.0]).unwrap();
        let eta = ccd.linear_predictor().to_vec();
        for k in 0..5 {
            assert!((eta[k] - (1.0 + 2.0 * X1[k])).abs() < 1e-15);
        }
    }

    #[test]
    fn test_zero_weight_rows_are_dropped() {
        let data = design();
        let mut weighted =
            CyclicCoordinateDescent::with_model_type(&data, ModelType::LeastSquares, PriorConfig::none()).unwrap();
        weighted.set_weights(Some(&[1.0, 1.0, 1.0, 1.0, 0.0])).unwrap();
        weighted.fit(&FitParams::new(10000, ConvergenceType::ZhangOles, 1e-12)).unwrap();

        let cols = vec![
            CompressedColumn::dense("intercept", vec![1.0; 4]),
            CompressedColumn::dense("x1", X1[..4].to_vec()),
            CompressedColumn::dense("x2", X2[..4].to_vec()),
        ];
        let reduced = DesignMatrix::new(cols, Y[..4].to_vec()).unwrap();
        let mut dropped =
            CyclicCoordinateDescent::with_model_type(&reduced, ModelType::LeastSquares, PriorConfig::none()).unwrap();
        dropped.fit(&FitParams::new(10000, ConvergenceType::ZhangOles, 1e-12)).unwrap();

        for j in 0..3 {
            assert!((weighted.coefficient(j).unwrap() - dropped.coefficient(j).unwrap()).abs() < 1e-7);
        }
        let predictive = weighted.predictive_log_likelihood(&[0.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        assert!(predictive <= 0.0);
    }

    #[test]
    fn test_offset_covariate_stays_fixed() {
        let cols = vec![
            CompressedColumn::dense("log_time", vec![0.0, 0.5, 0.0, 1.0, 0.2]),
            CompressedColumn::dense("x1", X1.to_vec()),
        ];
        let data = DesignMatrix::new(cols, Y.to_vec())
            .unwrap()
            .with_offset_covariate()
            .unwrap();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, PriorConfig::none()).unwrap();
        assert!(ccd.is_fixed(0));
        assert_eq!(ccd.coefficient(0).unwrap(), 1.0);
        ccd.fit(&FitParams::new(100, ConvergenceType::ZhangOles, 1e-8)).unwrap();
        assert_eq!(ccd.coefficient(0).unwrap(), 1.0);
        assert!(ccd.coefficient(1).unwrap() != 0.0);

        ccd.reset_beta();
        assert_eq!(ccd.coefficients(), &[1.0, 0.0]);
    }

    #[test]
    fn test_fixed_coordinate_is_skipped() {
        let data = design();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, PriorConfig::none()).unwrap();
        ccd.set_coefficient(2, 0.3).unwrap();
        ccd.set_fixed(2, true).unwrap();
        ccd.fit(&FitParams::new(100, ConvergenceType::ZhangOles, 1e-8)).unwrap();
        assert_eq!(ccd.coefficient(2).unwrap(), 0.3);
    }

    #[test]
    fn test_hessian_diagonal_and_precision() {
        let data = design();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, PriorConfig::none()).unwrap();
        ccd.set_coefficients(&[0.2, 0.1, -0.1]).unwrap();
        let h = ccd.hessian_diagonal(1).unwrap();
        let precision = ccd.asymptotic_precision(1, 1).unwrap().unwrap();
        assert!((h - precision).abs() < 1e-12);

        let info = ccd.fisher_information(&[0, 1]).unwrap();
        assert_eq!(info.dim(), (2, 2));
        assert_eq!(info[[0, 1]], info[[1, 0]]);
        assert!((info[[1, 1]] - h).abs() < 1e-12);
    }

    #[test]
    fn test_log_prior_and_hyperprior() {
        let data = design();
        let prior = PriorConfig::normal(2.0).unwrap();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, prior).unwrap();
        ccd.set_coefficients(&[1.0, -1.0, 0.0]).unwrap();
        let expected = -1.5 * (2.0 * std::f64::consts::PI * 2.0).ln() - 0.5 * 2.0 / 2.0;
        assert!((ccd.log_prior() - expected).abs() < 1e-12);

        ccd.set_hyperprior(4.0).unwrap();
        assert_eq!(ccd.prior().variance(), 4.0);
        assert!(ccd.set_hyperprior(-1.0).is_err());
    }

    #[test]
    fn test_counters() {
        let data = design();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, PriorConfig::none()).unwrap();
        assert_eq!(ccd.last_status(), None);
        ccd.fit(&FitParams::new(100, ConvergenceType::Mittal, 1e-8)).unwrap();
        assert!(ccd.update_count() > 0);
        assert!(ccd.likelihood_count() > ccd.iteration_count());
    }

    #[test]
    fn test_report_rows() {
        let data = design();
        let prior = PriorConfig::laplace_with_lambda(2.0).unwrap();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, prior).unwrap();
        ccd.fit(&FitParams::new(1000, ConvergenceType::ZhangOles, 1e-12)).unwrap();
        let report = ccd.report(true).unwrap();
        assert_eq!(report.coefficients.len(), 3);
        assert_eq!(report.coefficients[0].label, "intercept");
        assert!(report.coefficients[1].standard_error.is_some());
        assert!(report.coefficients[2].standard_error.is_none());
        assert_eq!(report.status, Some(FitStatus::Success));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "sufficient statistics stale")]
    fn test_stale_statistics_abort_in_debug() {
        let data = design();
        let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Poisson, PriorConfig::none()).unwrap();
        let _ = ccd.update_coordinate(0);
    }

    #[test]
    fn test_conditional_logistic_fit() {
        let cols = vec![
            CompressedColumn::indicator("exposed", vec![0, 3, 5, 7]).unwrap(),
            CompressedColumn::dense("score", vec![0.4, -0.2, 0.1, 0.9, 0.3, -0.5, 0.2, 0.6, -0.1]),
        ];
        let data = DesignMatrix::new(cols, vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
            .unwrap()
            .with_strata(vec![1, 1, 1, 2, 2, 2, 3, 3, 3])
            .unwrap();
        let prior = PriorConfig::normal(1.0).unwrap();
        let mut ccd =
            CyclicCoordinateDescent::with_model_type(&data, ModelType::ConditionalLogistic, prior).unwrap();
        let status = ccd.fit(&FitParams::new(1000, ConvergenceType::ZhangOles, 1e-12)).unwrap();
        assert_eq!(status, FitStatus::Success);
        // Penalized gradient vanishes at the optimum
        for j in 0..2 {
            ccd.check_all_lazy_flags().unwrap();
            ccd.model.compute_numerator_for_gradient(ccd.data, &ccd.x_beta, j);
            let gh = ccd.model.compute_gradient_and_hessian(ccd.data, &ccd.x_beta, j);
            assert!((gh.gradient + ccd.beta[j]).abs() < 1e-5);
        }
    }

    /// Largest `|g_j + beta_j / variance|` over all coordinates
    fn max_penalized_gradient(ccd: &mut CyclicCoordinateDescent<'_>, variance: f64) -> f64 {
        ccd.check_all_lazy_flags().unwrap();
        let mut largest: f64 = 0.0;
        for j in 0..ccd.n_coefficients() {
            ccd.model.compute_numerator_for_gradient(ccd.data, &ccd.x_beta, j);
            let gh = ccd.model.compute_gradient_and_hessian(ccd.data, &ccd.x_beta, j);
            largest = largest.max((gh.gradient + ccd.beta[j] / variance).abs());
        }
        largest
    }

    #[test]
    fn test_cox_fit_reaches_stationarity() {
        let cols = vec![
            CompressedColumn::dense("age", vec![0.8, -0.4, 1.1, 0.2, -0.9, 0.5, -0.1, 0.3]),
            CompressedColumn::indicator("treated", vec![1, 2, 5, 7]).unwrap(),
        ];
        // Times non-increasing, with a tie at 5.0
        let data = DesignMatrix::new(cols, vec![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0])
            .unwrap()
            .with_times(vec![9.0, 7.5, 5.0, 5.0, 4.0, 3.0, 2.5, 1.0])
            .unwrap();
        let mut ccd =
            CyclicCoordinateDescent::with_model_type(&data, ModelType::Cox, PriorConfig::normal(1.0).unwrap()).unwrap();
        let status = ccd.fit(&FitParams::new(1000, ConvergenceType::ZhangOles, 1e-12)).unwrap();
        assert_eq!(status, FitStatus::Success);
        assert!(max_penalized_gradient(&mut ccd, 1.0) < 1e-6);
        assert!(ccd.coefficients().iter().any(|&b| b != 0.0));
    }

    #[test]
    fn test_sccs_fit_reaches_stationarity() {
        let cols = vec![
            CompressedColumn::indicator("drug", vec![0, 3, 4, 7]).unwrap(),
            CompressedColumn::dense("season", vec![0.2, -0.5, 0.1, 0.6, -0.3, 0.4, 0.0, -0.2]),
        ];
        let data = DesignMatrix::new(cols, vec![2.0, 0.0, 1.0, 1.0, 3.0, 0.0, 1.0, 2.0])
            .unwrap()
            .with_strata(vec![1, 1, 1, 2, 2, 3, 3, 3])
            .unwrap()
            .with_times(vec![30.0, 60.0, 10.0, 45.0, 20.0, 15.0, 50.0, 35.0])
            .unwrap();
        let mut ccd = CyclicCoordinateDescent::with_model_type(
            &data,
            ModelType::SelfControlledCaseSeries,
            PriorConfig::normal(2.0).unwrap(),
        )
        .unwrap();
        let status = ccd.fit(&FitParams::new(1000, ConvergenceType::ZhangOles, 1e-12)).unwrap();
        assert_eq!(status, FitStatus::Success);
        assert!(max_penalized_gradient(&mut ccd, 2.0) < 1e-6);
    }
}
