//! Error types for rust_ccd

use thiserror::Error;

/// Main error type for coordinate descent fitting
#[derive(Error, Debug)]
pub enum CcdError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Unknown prior type: {name}")]
    UnknownPriorType { name: String },

    #[error("Unknown convergence criterion: {name}")]
    UnknownConvergenceType { name: String },

    #[error("Unknown model type: {name}")]
    UnknownModelType { name: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Invalid design matrix: {reason}")]
    InvalidDesignMatrix { reason: String },

    /// Sufficient statistics were stale when a coordinate update was attempted.
    #[error("Error in state synchronization during {operation}")]
    StateSynchronization { operation: String },

    #[error("Singular matrix in {operation}")]
    SingularMatrix { operation: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for rust_ccd operations
pub type Result<T> = std::result::Result<T, CcdError>;
