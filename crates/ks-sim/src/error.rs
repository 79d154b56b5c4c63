//! Error types for simulation operations.

use ks_model::ModelError;
use ks_solver::SolverError;
use thiserror::Error;

/// Hard failures of a simulation run.
///
/// Numeric degradations during evaluation are not errors here; they are
/// recorded in the run's `ErrorList`.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },

    #[error("Unsupported model: {what}")]
    Unsupported { what: &'static str },

    #[error("Could not allocate simulation state: {what}")]
    Allocation { what: String },

    #[error("Initial values could not be evaluated:\n{diagnostics}")]
    Initialization { diagnostics: String },

    #[error("Event settlement failed at t={time}")]
    SettleFailed { time: f64 },

    #[error("Integration failed at t={time}: {source}")]
    Integration {
        time: f64,
        #[source]
        source: SolverError,
    },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        SimError::InvalidArg { what: what.into() }
    }
}
