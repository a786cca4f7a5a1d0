//! Coefficient report produced after a fit

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::ccd::FitStatus;

/// Two-sided Wald p-value for a standard normal statistic
fn wald_p_value(z: f64) -> Option<f64> {
    let normal = Normal::new(0.0, 1.0).ok()?;
    Some(2.0 * normal.cdf(-z.abs()))
}

/// One coefficient with its optional asymptotic standard error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoefficientRow {
    pub label: String,
    pub estimate: f64,
    /// Square root of the asymptotic variance; absent for coefficients at zero
    pub standard_error: Option<f64>,
    pub z_score: Option<f64>,
    pub p_value: Option<f64>,
}

impl CoefficientRow {
    pub fn new(label: impl Into<String>, estimate: f64, standard_error: Option<f64>) -> Self {
        let z_score = standard_error
            .filter(|&se| se > 0.0)
            .map(|se| estimate / se);
        let p_value = z_score.and_then(wald_p_value);
        Self {
            label: label.into(),
            estimate,
            standard_error,
            z_score,
            p_value,
        }
    }
}

/// Tabular fit report, one row per coefficient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoefficientReport {
    pub model: String,
    pub prior: String,
    /// Status of the most recent fit, if any
    pub status: Option<FitStatus>,
    /// Sweeps across every fit of the solver
    pub iterations: usize,
    pub log_likelihood: f64,
    pub log_prior: f64,
    pub coefficients: Vec<CoefficientRow>,
}

impl CoefficientReport {
    pub fn n_coefficients(&self) -> usize {
        self.coefficients.len()
    }

    /// Whether any row carries a standard error
    pub fn has_standard_errors(&self) -> bool {
        self.coefficients.iter().any(|c| c.standard_error.is_some())
    }

    /// Coefficients that are not exactly zero
    pub fn nonzero(&self) -> impl Iterator<Item = &CoefficientRow> {
        self.coefficients.iter().filter(|c| c.estimate != 0.0)
    }

    pub fn get(&self, label: &str) -> Option<&CoefficientRow> {
        self.coefficients.iter().find(|c| c.label == label)
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            model: self.model.clone(),
            prior: self.prior.clone(),
            status: self.status,
            iterations: self.iterations,
            log_likelihood: self.log_likelihood,
            log_prior: self.log_prior,
            total: self.n_coefficients(),
            nonzero: self.nonzero().count(),
        }
    }
}

/// Short human-readable digest of a [`CoefficientReport`]
#[derive(Debug, Clone)]
pub struct ReportSummary {
    pub model: String,
    pub prior: String,
    pub status: Option<FitStatus>,
    pub iterations: usize,
    pub log_likelihood: f64,
    pub log_prior: f64,
    pub total: usize,
    pub nonzero: usize,
}

impl std::fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "CCD Fit Summary")?;
        writeln!(f, "===============")?;
        writeln!(f, "Model: {}", self.model)?;
        writeln!(f, "Prior: {}", self.prior)?;
        match self.status {
            Some(status) => writeln!(f, "Status: {} after {} iterations", status, self.iterations)?,
            None => writeln!(f, "Status: not fitted")?,
        }
        writeln!(f, "Log likelihood: {:.6}", self.log_likelihood)?;
        writeln!(f, "Log prior: {:.6}", self.log_prior)?;
        writeln!(f, "Non-zero coefficients: {} of {}", self.nonzero, self.total)?;
        Ok(())
    }
}
