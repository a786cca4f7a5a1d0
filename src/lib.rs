//! rust_ccd: regularized generalized linear models by cyclic coordinate descent
//!
//! Coefficients are updated one at a time with a Newton step on the penalized
//! log-likelihood, bounded by a per-coordinate trust region. Laplace (L1)
//! priors are handled exactly at zero, so fits are sparse.
//!
//! # Example
//!
//! ```ignore
//! use rust_ccd::prelude::*;
//!
//! let data = read_design_matrix("design.csv", &DesignFileSpec::new("y"))?;
//! let prior = PriorConfig::laplace(1.0)?;
//! let mut ccd = CyclicCoordinateDescent::with_model_type(&data, ModelType::Logistic, prior)?;
//! let status = ccd.fit(&FitParams::default())?;
//! let report = ccd.report(true)?;
//! ```

pub mod ccd;
pub mod cli;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod prior;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ccd::{ConvergenceType, CyclicCoordinateDescent, FitParams, FitStatus};
    pub use crate::data::{CompressedColumn, DesignMatrix, FormatType};
    pub use crate::error::{CcdError, Result};
    pub use crate::io::{
        read_design_matrix, write_results, write_results_json, CoefficientReport, DesignFileSpec,
    };
    pub use crate::model::{create_model, ModelSpecifics, ModelType};
    pub use crate::prior::{
        convert_hyperparameter_to_variance, convert_variance_to_hyperparameter, PriorConfig, PriorType,
    };
}

use prelude::*;

/// Fit one model with default parameters and return the coefficient report
pub fn fit_model(data: &DesignMatrix, model_type: ModelType, prior: PriorConfig, with_ase: bool) -> Result<CoefficientReport> {
    let mut ccd = CyclicCoordinateDescent::with_model_type(data, model_type, prior)?;
    ccd.fit(&FitParams::default())?;
    ccd.report(with_ase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_pipeline() {
        // Logistic outcome driven by the first covariate, second is noise
        let x1 = vec![2.0, 1.5, -1.0, 0.5, -2.0, 1.0, -0.5, -1.5, 0.8, -0.3];
        let x2 = vec![0.1, -0.2, 0.3, 0.0, 0.2, -0.1, 0.0, 0.1, -0.3, 0.2];
        let y = vec![1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let cols = vec![
            CompressedColumn::dense("intercept", vec![1.0; 10]),
            CompressedColumn::dense("signal", x1),
            CompressedColumn::from_dense_auto("noise", x2),
        ];
        let data = DesignMatrix::new(cols, y).unwrap();

        let report = fit_model(&data, ModelType::Logistic, PriorConfig::laplace(1.0).unwrap(), true).unwrap();

        assert_eq!(report.n_coefficients(), 3);
        assert_eq!(report.status, Some(FitStatus::Success));
        assert!(report.get("signal").unwrap().estimate > 0.0);

        let summary = report.summary();
        println!("{}", summary);
    }
}
