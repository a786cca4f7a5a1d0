//! Input/Output for design files and fit reports

mod csv;
mod results;

pub use self::csv::{read_design_matrix, write_results, write_results_json, DesignFileSpec};
pub use results::{CoefficientReport, CoefficientRow, ReportSummary};
