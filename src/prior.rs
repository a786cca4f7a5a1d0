//! Coefficient priors and the per-coordinate Newton step they induce
//!
//! The solver minimises the negative log-likelihood plus the negative log
//! prior. Given the likelihood gradient `g` and Hessian `h` at the current
//! coefficient, each prior yields a closed-form coordinate step:
//!
//! - None:    `-g / h`
//! - Normal:  `-(g + beta / sigma2) / (h + 1 / sigma2)`
//! - Laplace: one-sided Newton steps on either side of the kink at zero,
//!   never crossing zero within a single step.

use std::f64::consts::PI;
use std::str::FromStr;

use crate::error::{CcdError, Result};

/// Prior family placed independently on every coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PriorType {
    None,
    /// L1 penalty with scale lambda
    Laplace,
    /// L2 penalty with variance sigma2
    Normal,
}

impl FromStr for PriorType {
    type Err = CcdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(PriorType::None),
            "laplace" | "l1" | "lasso" => Ok(PriorType::Laplace),
            "normal" | "l2" | "ridge" | "gaussian" => Ok(PriorType::Normal),
            _ => Err(CcdError::UnknownPriorType { name: s.to_string() }),
        }
    }
}

/// Laplace scale lambda for a prior variance
pub fn convert_variance_to_hyperparameter(variance: f64) -> f64 {
    (2.0 / variance).sqrt()
}

/// Prior variance for a Laplace scale lambda
pub fn convert_hyperparameter_to_variance(lambda: f64) -> f64 {
    2.0 / (lambda * lambda)
}

/// Prior type plus its hyperparameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorConfig {
    prior_type: PriorType,
    variance: f64,
    lambda: f64,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            prior_type: PriorType::Laplace,
            variance: 20.0,
            lambda: convert_variance_to_hyperparameter(20.0),
        }
    }
}

impl PriorConfig {
    /// Build a prior of the given type; `variance` is ignored for `None`
    pub fn new(prior_type: PriorType, variance: f64) -> Result<Self> {
        match prior_type {
            PriorType::None => Ok(Self::none()),
            _ => {
                check_variance(variance)?;
                Ok(Self {
                    prior_type,
                    variance,
                    lambda: convert_variance_to_hyperparameter(variance),
                })
            }
        }
    }

    /// Unpenalised maximum likelihood
    pub fn none() -> Self {
        Self {
            prior_type: PriorType::None,
            variance: f64::INFINITY,
            lambda: 0.0,
        }
    }

    pub fn laplace(variance: f64) -> Result<Self> {
        Self::new(PriorType::Laplace, variance)
    }

    /// Laplace prior parameterised directly by its scale lambda
    pub fn laplace_with_lambda(lambda: f64) -> Result<Self> {
        if !(lambda.is_finite() && lambda > 0.0) {
            return Err(CcdError::InvalidInput {
                reason: format!("Laplace scale must be positive and finite, got {}", lambda),
            });
        }
        Ok(Self {
            prior_type: PriorType::Laplace,
            variance: convert_hyperparameter_to_variance(lambda),
            lambda,
        })
    }

    pub fn normal(variance: f64) -> Result<Self> {
        Self::new(PriorType::Normal, variance)
    }

    pub fn prior_type(&self) -> PriorType {
        self.prior_type
    }

    /// Prior variance (sigma2); infinite for `None`
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Laplace scale; zero for `None`
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Replace the prior variance, keeping lambda in sync
    pub fn set_variance(&mut self, variance: f64) -> Result<()> {
        check_variance(variance)?;
        self.variance = variance;
        self.lambda = convert_variance_to_hyperparameter(variance);
        Ok(())
    }

    /// Hyperparameter on the variance scale (0 for `None`)
    pub fn hyperprior(&self) -> f64 {
        match self.prior_type {
            PriorType::None => 0.0,
            PriorType::Laplace => convert_hyperparameter_to_variance(self.lambda),
            PriorType::Normal => self.variance,
        }
    }

    /// Whether this prior penalises coefficients at all
    pub fn is_regularized(&self) -> bool {
        self.prior_type != PriorType::None
    }

    /// Coordinate step for gradient `g` and Hessian `h` at coefficient `beta`
    pub fn compute_delta(&self, gradient: f64, hessian: f64, beta: f64) -> f64 {
        match self.prior_type {
            PriorType::None => -gradient / hessian,
            PriorType::Normal => {
                -(gradient + beta / self.variance) / (hessian + 1.0 / self.variance)
            }
            PriorType::Laplace => laplace_delta(gradient, hessian, beta, self.lambda),
        }
    }

    /// Log prior density of a coefficient vector
    pub fn log_density(&self, beta: &[f64]) -> f64 {
        let j = beta.len() as f64;
        match self.prior_type {
            PriorType::None => 0.0,
            PriorType::Laplace => {
                let one_norm: f64 = beta.iter().map(|b| b.abs()).sum();
                j * (0.5 * self.lambda).ln() - self.lambda * one_norm
            }
            PriorType::Normal => {
                let two_norm_sq: f64 = beta.iter().map(|b| b * b).sum();
                -0.5 * j * (2.0 * PI * self.variance).ln() - 0.5 * two_norm_sq / self.variance
            }
        }
    }
}

impl std::fmt::Display for PriorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.prior_type {
            PriorType::None => write!(f, "None()"),
            PriorType::Laplace => write!(f, "Laplace({})", self.lambda),
            PriorType::Normal => write!(f, "Normal({})", self.variance),
        }
    }
}

fn check_variance(variance: f64) -> Result<()> {
    if !(variance.is_finite() && variance > 0.0) {
        return Err(CcdError::InvalidInput {
            reason: format!("Prior variance must be positive and finite, got {}", variance),
        });
    }
    Ok(())
}

#[inline]
fn sign(x: f64) -> i32 {
    if x == 0.0 {
        0
    } else if x < 0.0 {
        -1
    } else {
        1
    }
}

/// Soft-threshold step via one-sided Newton updates.
///
/// At zero the coefficient only leaves the kink when one of the one-sided
/// steps points away from it; a non-zero coefficient that would change sign
/// is snapped to exactly zero.
fn laplace_delta(gradient: f64, hessian: f64, beta: f64, lambda: f64) -> f64 {
    let neg_update = -(gradient - lambda) / hessian;
    let pos_update = -(gradient + lambda) / hessian;

    let sign_beta = sign(beta);
    if sign_beta == 0 {
        if neg_update < 0.0 {
            neg_update
        } else if pos_update > 0.0 {
            pos_update
        } else {
            0.0
        }
    } else {
        let delta = if sign_beta < 0 { neg_update } else { pos_update };
        if sign(beta + delta) != sign_beta {
            -beta
        } else {
            delta
        }
    }
}
