//! Stiff ODE integration for kinsim.
//!
//! This crate provides a variable-order BDF integrator with dense output and
//! root finding. The system being integrated is supplied through the
//! [`OdeProblem`] trait and passed to every call, so the integrator never owns
//! simulation state.

pub mod bdf;
pub mod error;
pub mod jacobian;
pub mod newton;
pub mod problem;
pub mod roots;
pub mod settings;
pub mod stats;

pub use bdf::{Bdf, DenseOutput, StepMode, StepReport, StepStatus};
pub use error::{SolverError, SolverResult};
pub use problem::{CallbackError, OdeProblem};
pub use settings::{IntegratorSettings, MAX_ORDER};
pub use stats::IntegratorStats;
