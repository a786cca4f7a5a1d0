//! Convergence criteria and fit parameters

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CcdError, Result};

/// Quantity tracked between sweeps to decide convergence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceType {
    /// `sum_k eta_k y_k w_k`
    Gradient,
    /// Log-likelihood
    Mittal,
    /// Log-likelihood plus log-prior
    Lange,
    /// Relative change of the linear predictor
    ZhangOles,
}

impl FromStr for ConvergenceType {
    type Err = CcdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "gradient" => Ok(ConvergenceType::Gradient),
            "mittal" => Ok(ConvergenceType::Mittal),
            "lange" => Ok(ConvergenceType::Lange),
            "zhang_oles" | "zhangoles" => Ok(ConvergenceType::ZhangOles),
            _ => Err(CcdError::UnknownConvergenceType { name: s.to_string() }),
        }
    }
}

impl std::fmt::Display for ConvergenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConvergenceType::Gradient => "gradient",
            ConvergenceType::Mittal => "mittal",
            ConvergenceType::Lange => "lange",
            ConvergenceType::ZhangOles => "zhang_oles",
        };
        write!(f, "{}", name)
    }
}

/// Terminal status of a fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    Success,
    MaxIterations,
    IllConditioned,
}

impl FitStatus {
    /// Whether the fit ended through a normal exit
    pub fn is_normal(&self) -> bool {
        !matches!(self, FitStatus::IllConditioned)
    }
}

impl std::fmt::Display for FitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FitStatus::Success => "SUCCESS",
            FitStatus::MaxIterations => "MAX_ITERATIONS",
            FitStatus::IllConditioned => "ILL_CONDITIONED",
        };
        write!(f, "{}", name)
    }
}

/// Configurable parameters for one call to `fit`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitParams {
    /// Maximum number of full sweeps
    pub max_iterations: usize,
    pub convergence: ConvergenceType,
    /// Relative-change tolerance
    pub epsilon: f64,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            convergence: ConvergenceType::Gradient,
            epsilon: 1e-6,
        }
    }
}

impl FitParams {
    pub fn new(max_iterations: usize, convergence: ConvergenceType, epsilon: f64) -> Self {
        Self {
            max_iterations,
            convergence,
            epsilon,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(CcdError::InvalidInput {
                reason: "max_iterations must be at least 1".to_string(),
            });
        }
        if !(self.epsilon.is_finite() && self.epsilon >= 0.0) {
            return Err(CcdError::InvalidInput {
                reason: format!("Convergence tolerance must be non-negative, got {}", self.epsilon),
            });
        }
        Ok(())
    }
}

/// `|new - old| / (|new| + 1)`
#[inline]
pub fn relative_change(new: f64, old: f64) -> f64 {
    (new - old).abs() / (new.abs() + 1.0)
}

/// `sum |eta - eta_saved| / (1 + sum |eta|)`, optionally weighted
pub fn zhang_oles_criterion(x_beta: &[f64], saved: &[f64], weights: Option<&[f64]>) -> f64 {
    let (change, size) = match weights {
        Some(w) => x_beta
            .iter()
            .zip(saved)
            .zip(w)
            .fold((0.0, 0.0), |(c, s), ((&eta, &old), &wk)| {
                (c + wk * (eta - old).abs(), s + wk * eta.abs())
            }),
        None => x_beta
            .iter()
            .zip(saved)
            .fold((0.0, 0.0), |(c, s), (&eta, &old)| (c + (eta - old).abs(), s + eta.abs())),
    };
    change / (1.0 + size)
}

/// Outcome of checking one sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SweepOutcome {
    Continue,
    Done(FitStatus),
}

/// Tracks the last objective and decides when a fit terminates
#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    params: FitParams,
    last_objective: Option<f64>,
    iteration: usize,
    last_criterion: f64,
}

impl ConvergenceMonitor {
    pub fn new(params: FitParams) -> Self {
        Self {
            params,
            last_objective: None,
            iteration: 0,
            last_criterion: f64::INFINITY,
        }
    }

    /// Seed the objective before the first sweep
    pub fn start(&mut self, initial_objective: Option<f64>) {
        self.last_objective = initial_objective;
        self.iteration = 0;
        self.last_criterion = f64::INFINITY;
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn last_objective(&self) -> Option<f64> {
        self.last_objective
    }

    /// Criterion computed at the most recent check
    pub fn last_criterion(&self) -> f64 {
        self.last_criterion
    }

    /// Record a finished sweep.
    ///
    /// `value` is the new objective for objective-based criteria and the
    /// Zhang-Oles ratio otherwise.
    pub fn check(&mut self, value: f64) -> SweepOutcome {
        self.iteration += 1;

        if !value.is_finite() {
            self.last_criterion = value;
            return SweepOutcome::Done(FitStatus::IllConditioned);
        }

        let criterion = match self.params.convergence {
            ConvergenceType::ZhangOles => value,
            _ => {
                let previous = self.last_objective.replace(value);
                previous.map_or(f64::INFINITY, |old| relative_change(value, old))
            }
        };
        self.last_criterion = criterion;

        if criterion < self.params.epsilon {
            SweepOutcome::Done(FitStatus::Success)
        } else if self.iteration >= self.params.max_iterations {
            SweepOutcome::Done(FitStatus::MaxIterations)
        } else {
            SweepOutcome::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_convergence_type() {
        assert_eq!("GRADIENT".parse::<ConvergenceType>().unwrap(), ConvergenceType::Gradient);
        assert_eq!("zhang-oles".parse::<ConvergenceType>().unwrap(), ConvergenceType::ZhangOles);
        assert!(matches!(
            "newton".parse::<ConvergenceType>(),
            Err(CcdError::UnknownConvergenceType { .. })
        ));
    }

    #[test]
    fn test_fit_params_validation() {
        assert!(FitParams::default().validate().is_ok());
        assert!(FitParams::new(0, ConvergenceType::Lange, 1e-6).validate().is_err());
        assert!(FitParams::new(5, ConvergenceType::Lange, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_relative_change() {
        assert_eq!(relative_change(3.0, 1.0), 0.5);
        assert_eq!(relative_change(-1.0, -1.0), 0.0);
    }

    #[test]
    fn test_zhang_oles_identical_snapshot_is_zero() {
        let x_beta = vec![0.1, -2.5, 3.0e-7, 1e12];
        let saved = x_beta.clone();
        assert_eq!(zhang_oles_criterion(&x_beta, &saved, None), 0.0);
        assert_eq!(zhang_oles_criterion(&x_beta, &saved, Some(&[1.0, 2.0, 0.0, 1.0])), 0.0);
    }

    #[test]
    fn test_zhang_oles_weighted() {
        let value = zhang_oles_criterion(&[1.0, 2.0], &[0.0, 2.0], Some(&[2.0, 1.0]));
        assert_eq!(value, 2.0 / (1.0 + 4.0));
    }

    #[test]
    fn test_monitor_statuses() {
        let mut monitor = ConvergenceMonitor::new(FitParams::new(3, ConvergenceType::Mittal, 1e-3));
        monitor.start(Some(-10.0));
        assert_eq!(monitor.check(-5.0), SweepOutcome::Continue);
        assert_eq!(monitor.check(-5.0001), SweepOutcome::Done(FitStatus::Success));

        monitor.start(Some(-10.0));
        assert_eq!(monitor.check(-5.0), SweepOutcome::Continue);
        assert_eq!(monitor.check(-3.0), SweepOutcome::Continue);
        assert_eq!(monitor.check(-1.0), SweepOutcome::Done(FitStatus::MaxIterations));

        monitor.start(Some(-10.0));
        assert_eq!(monitor.check(f64::NAN), SweepOutcome::Done(FitStatus::IllConditioned));
    }

    #[test]
    fn test_ill_conditioning_ignores_epsilon() {
        let mut monitor = ConvergenceMonitor::new(FitParams::new(10, ConvergenceType::ZhangOles, 0.0));
        monitor.start(None);
        assert_eq!(monitor.check(f64::INFINITY), SweepOutcome::Done(FitStatus::IllConditioned));
    }
}
