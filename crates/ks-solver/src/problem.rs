//! Callback interface between the integrator and the system it advances.

use nalgebra::DVector;
use thiserror::Error;

/// Returned by a callback that could not evaluate at the requested point.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("callback evaluation failed")]
pub struct CallbackError;

/// A system `dy/dt = f(t, y)` with optional root functions `g(t, y)`.
///
/// Callbacks take `&mut self` so implementations can cache intermediate
/// values between calls.
pub trait OdeProblem {
    /// Number of root functions.
    fn num_roots(&self) -> usize {
        0
    }

    /// Write `f(t, y)` into `ydot`.
    fn rhs(&mut self, t: f64, y: &DVector<f64>, ydot: &mut DVector<f64>)
    -> Result<(), CallbackError>;

    /// Write `g(t, y)` into `g`.
    fn roots(
        &mut self,
        _t: f64,
        _y: &DVector<f64>,
        _g: &mut DVector<f64>,
    ) -> Result<(), CallbackError> {
        Ok(())
    }
}
