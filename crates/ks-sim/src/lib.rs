//! ks-sim: hybrid continuous/discrete simulation of kinsim models.
//!
//! Provides:
//! - Lazy, memoized expression evaluation with cycle detection
//! - A pending event queue ordered by time and priority
//! - An update coordinator that settles events at a single instant
//! - An adapter that drives the BDF integrator between events
//! - Grid sampling, result series and parallel batch runs

pub mod adapter;
pub mod batch;
pub mod coordinator;
pub mod error;
pub mod eval;
pub mod queue;
pub mod results;
pub mod settings;
pub mod sim;
pub mod state;
pub mod triggers;

pub use adapter::IntegratorAdapter;
pub use batch::run_batch;
pub use coordinator::UpdateCoordinator;
pub use error::{SimError, SimResult};
pub use eval::{EvalStatus, Evaluator};
pub use queue::{EventExecution, EventQueue};
pub use results::{SimResults, Timecourse};
pub use settings::EngineSettings;
pub use sim::{Simulation, TimeGrid};
pub use state::{EventFiring, RunState};
pub use triggers::{RootFunction, lower_triggers};
