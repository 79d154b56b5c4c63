//! ks-core: shared foundation for kinsim.
//!
//! Contains:
//! - ids (typed, compact indices for variables, equations, events and expression nodes)
//! - numeric (Real + tolerances + float helpers)
//! - diagnostics (the accumulating error list threaded through evaluation)
//! - error (shared error types)

pub mod diagnostics;
pub mod error;
pub mod ids;
pub mod numeric;

pub use diagnostics::{Diagnostic, ErrorCode, ErrorList, Severity};
pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
