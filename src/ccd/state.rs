//! Lazy validity flags for derived solver state

/// Which derived quantities are consistent with the current coefficients,
/// weights and prior
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidityFlags {
    pub x_beta_known: bool,
    pub weights_valid: bool,
    pub sufficient_statistics_known: bool,
    pub fisher_information_known: bool,
}

impl ValidityFlags {
    /// Every flag false
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive every flag back to false after an external mutation
    pub fn invalidate_all(&mut self) {
        *self = Self::default();
    }

    /// Coefficients moved: statistics and information are stale,
    /// the linear predictor may or may not have been kept in step
    pub fn coefficients_changed(&mut self) {
        self.sufficient_statistics_known = false;
        self.fisher_information_known = false;
    }

    pub fn all_valid(&self) -> bool {
        self.x_beta_known
            && self.weights_valid
            && self.sufficient_statistics_known
            && self.fisher_information_known
    }
}
