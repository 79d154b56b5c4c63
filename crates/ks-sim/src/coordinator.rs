//! Settlement of discrete changes at a single instant.
//!
//! Provides:
//! - `UpdateCoordinator::settle`, which executes due events and detects
//!   trigger edges until nothing changes
//! - `UpdateCoordinator::initialize`, which computes the initial values of
//!   a run

use ks_core::{ErrorCode, Real, VarId};
use ks_model::{Event, Model, VariableKind};
use tracing::{debug, trace, warn};

use crate::error::{SimError, SimResult};
use crate::eval::EvalStatus;
use crate::queue::EventExecution;
use crate::state::{EventFiring, RunState};

/// Brings a run's values to a consistent state at one instant.
#[derive(Debug, Clone, Copy)]
pub struct UpdateCoordinator<'m> {
    model: &'m Model,
    max_iterations: usize,
}

impl<'m> UpdateCoordinator<'m> {
    pub fn new(model: &'m Model, max_iterations: usize) -> Self {
        Self {
            model,
            max_iterations: max_iterations.max(1),
        }
    }

    /// Settle all discrete changes at `target`.
    ///
    /// Returns false if any Error or Fatal condition was recorded during
    /// this call. Warnings do not fail a settlement.
    pub fn settle(&self, state: &mut RunState, target: Real) -> bool {
        let failures = state.errors.failures();
        state.time = target;

        let mut passes = 0;
        loop {
            if passes == self.max_iterations {
                warn!(time = target, passes, "events kept retriggering; settlement stopped");
                state.errors.error(
                    ErrorCode::SettleLimitExceeded,
                    format!("event settlement at t={target} did not finish within {passes} passes"),
                );
                break;
            }
            passes += 1;

            state.mark_assignments_waiting(self.model);
            self.execute_due(state, target);
            if !self.detect_edges(state, target) {
                break;
            }
        }
        trace!(time = target, passes, "settled");

        let mut ev = state.evaluator(self.model, target);
        for var in self.model.assignment_variables() {
            ev.variable(var);
        }

        state.errors.failures() == failures
    }

    /// Reset `state` and compute the initial values of a run.
    ///
    /// Defaults apply first, then `overrides`, then initial assignments of
    /// variables that were not overridden, then a settlement at the initial
    /// time.
    pub fn initialize(&self, state: &mut RunState, overrides: &[(VarId, Real)]) -> SimResult<()> {
        let model = self.model;
        let t0 = model.initial_time();
        state.reset(model);

        for &(var, value) in overrides {
            let Some(v) = model.variables().get(var.ix()) else {
                return Err(SimError::invalid(format!("no variable with index {var}")));
            };
            if v.kind == VariableKind::Assignment {
                return Err(SimError::invalid(format!(
                    "'{}' is an assignment variable and cannot be overridden",
                    v.name
                )));
            }
            state.values[var.ix()] = value;
        }

        for v in model.variables() {
            let overridden = overrides.iter().any(|&(var, _)| var == v.id);
            let waiting = v.kind == VariableKind::Assignment
                || (v.init_equation.is_some() && !overridden);
            if waiting {
                state.status[v.id.ix()] = EvalStatus::Waiting;
            }
        }

        {
            let mut ev = state.evaluator(model, t0);
            for &eq in model.init_assignments() {
                ev.variable(model.equation(eq).variable);
            }
        }

        let settled = self.settle(state, t0);
        if !settled || state.errors.has_failures() {
            return Err(SimError::Initialization {
                diagnostics: state.errors.to_string(),
            });
        }
        debug!(time = t0, overrides = overrides.len(), "initial values computed");
        Ok(())
    }

    /// Run every execution due at or before `target`.
    fn execute_due(&self, state: &mut RunState, target: Real) {
        let model = self.model;
        while state.queue.peek_next_time().is_some_and(|t| t <= target) {
            let Some(exec) = state.queue.pop() else {
                break;
            };
            let event = model.event(exec.event);

            // all right-hand sides are read before any target is written
            let values = match exec.values {
                Some(values) => values,
                None => {
                    let mut ev = state.evaluator(model, target);
                    event
                        .assignments
                        .iter()
                        .map(|&eq| ev.eval(model.equation(eq).math))
                        .collect()
                }
            };
            for (&eq, value) in event.assignments.iter().zip(values) {
                state.values[model.equation(eq).variable.ix()] = value;
            }

            debug!(event = %event.name, time = target, scheduled = exec.time, "event executed");
            state.fired.push(EventFiring {
                event: event.id,
                scheduled: exec.time,
                time: target,
            });
            state.mark_assignments_waiting(model);
        }
    }

    /// Re-evaluate every trigger, schedule rising edges and cancel falling
    /// edges of non-persistent events. Returns whether anything fired.
    fn detect_edges(&self, state: &mut RunState, target: Real) -> bool {
        let mut fired = false;
        for event in self.model.events() {
            let i = event.id.ix();
            let now = state.evaluator(self.model, target).truth(event.trigger);
            let before = state.triggers[i];
            state.triggers[i] = now;

            if before && !now && !event.persistent {
                let removed = state.queue.remove_by_id(event.id);
                if removed > 0 {
                    debug!(event = %event.name, time = target, removed, "pending execution cancelled");
                }
            } else if !before && now {
                fired = true;
                self.schedule(state, event, target);
            }
        }
        fired
    }

    fn schedule(&self, state: &mut RunState, event: &Event, target: Real) {
        let model = self.model;
        let (delay, priority, values) = {
            let mut ev = state.evaluator(model, target);
            let delay = event.delay.map_or(0.0, |d| ev.eval(d));
            let priority = event.priority.map(|p| ev.eval(p));
            let values = event.evaluate_now.then(|| {
                event
                    .assignments
                    .iter()
                    .map(|&eq| ev.eval(model.equation(eq).math))
                    .collect::<Vec<_>>()
            });
            (delay, priority, values)
        };

        if !(delay >= 0.0 && delay.is_finite()) {
            state.errors.error(
                ErrorCode::InvalidInput,
                format!("event '{}' has invalid delay {delay}", event.name),
            );
            return;
        }
        let time = target + delay;
        debug!(event = %event.name, time = target, due = time, "event triggered");
        state.queue.add(EventExecution {
            event: event.id,
            time,
            priority,
            values,
        });
    }
}
