//! Covariate data: compressed columns and the design matrix

mod column;
mod matrix;

pub use column::{ColumnIter, CompressedColumn, FormatType};
pub use matrix::DesignMatrix;
