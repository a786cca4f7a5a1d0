//! Cyclic coordinate descent solver
//!
//! - `state`: lazy validity flags for derived quantities
//! - `bounds`: per-coordinate trust region
//! - `convergence`: convergence criteria, fit parameters and terminal statuses
//! - `variance`: Fisher information and asymptotic variance
//! - `solver`: the sweep driver tying these together

mod bounds;
mod convergence;
mod solver;
mod state;
mod variance;

pub use bounds::{TrustRegion, DEFAULT_INITIAL_BOUND};
pub use convergence::{
    relative_change, zhang_oles_criterion, ConvergenceMonitor, ConvergenceType, FitParams, FitStatus,
    SweepOutcome,
};
pub use solver::CyclicCoordinateDescent;
pub use state::ValidityFlags;
pub use variance::{invert_symmetric, FisherCache, HessianIndexMap};
