//! Per-coordinate trust region

use crate::error::{CcdError, Result};

/// Bound every coordinate starts a fit with
pub const DEFAULT_INITIAL_BOUND: f64 = 2.0;

/// Step bounds, one per coordinate, always strictly positive
#[derive(Debug, Clone)]
pub struct TrustRegion {
    bounds: Vec<f64>,
    initial: f64,
}

impl TrustRegion {
    pub fn new(n_coefficients: usize) -> Self {
        Self {
            bounds: vec![DEFAULT_INITIAL_BOUND; n_coefficients],
            initial: DEFAULT_INITIAL_BOUND,
        }
    }

    /// Change the bound used by subsequent resets
    pub fn set_initial(&mut self, bound: f64) -> Result<()> {
        if !(bound.is_finite() && bound > 0.0) {
            return Err(CcdError::InvalidInput {
                reason: format!("Initial trust-region bound must be positive, got {}", bound),
            });
        }
        self.initial = bound;
        Ok(())
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    pub fn reset(&mut self) {
        self.bounds.fill(self.initial);
    }

    pub fn bound(&self, index: usize) -> f64 {
        self.bounds[index]
    }

    /// Clip `step` into `[-bound, bound]` and adapt the bound to
    /// `max(2 |clipped|, bound / 2)`, never below [`f64::MIN_POSITIVE`]
    pub fn apply(&mut self, index: usize, step: f64) -> f64 {
        let bound = self.bounds[index];
        let clipped = step.clamp(-bound, bound);
        self.bounds[index] = (2.0 * clipped.abs()).max(0.5 * bound).max(f64::MIN_POSITIVE);
        clipped
    }
}
