//! Error types for integrator operations.

use ks_core::CoreError;
use thiserror::Error;

/// Errors that can occur while integrating.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },

    #[error("Integrator used before init")]
    NotInitialized,

    #[error("Derivative or root callback failed at t={t}")]
    CallbackFailed { t: f64 },

    #[error("Too much work: {steps} steps taken before reaching the target, t={t}")]
    TooMuchWork { steps: usize, t: f64 },

    #[error("Step size {h} fell below the minimum at t={t}")]
    StepTooSmall { t: f64, h: f64 },

    #[error("Numeric error: {what}")]
    Numeric { what: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type SolverResult<T> = Result<T, SolverError>;
