//! Numeric kernels for the Packwatch estimation pipeline.
//!
//! Everything here runs in double precision on small fixed-size systems:
//! 2×2 and 3×3 linear solves, ordinary least-squares regression, averaging
//! with a coefficient of determination, and the hyperbolic relaxation-curve
//! fit with its t₀ grid search. Values with magnitude below the caller's
//! epsilon are treated as zero; a determinant (or pivot) under the epsilon
//! reports a singular system rather than dividing through it.

pub mod hyperbolic;
pub mod regression;
pub mod solve;

pub use hyperbolic::{
    DIVIDER, FitModel, HyperbolicFit, fit_hyperbolic, fit_hyperbolic_optimal_t0,
};
pub use regression::{Average, LinearFit, average, linear_regression};
pub use solve::{solve_2x2, solve_3x3};

use thiserror::Error;

/// Kernel failures. All of them are absorbed by the pipeline as coded
/// diagnostics; none aborts processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Determinant or pivot magnitude below the zero epsilon.
    #[error("singular system")]
    Singular,

    /// Empty, mismatched or otherwise unusable sample range.
    #[error("invalid sample range")]
    InvalidRange,

    /// A sample sits at or left of the fit singularity t₀.
    #[error("fit singularity inside the sample range")]
    SingularityInRange,
}

pub type Result<T> = std::result::Result<T, Error>;
