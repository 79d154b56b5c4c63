//! Mutable state of one simulation run.

use std::collections::TryReserveError;

use ks_core::{ErrorCode, ErrorList, EventId, Real};
use ks_model::Model;
use serde::Serialize;

use crate::error::{SimError, SimResult};
use crate::eval::{EvalStatus, Evaluator};
use crate::queue::EventQueue;

/// One executed event, as recorded in the run's event log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EventFiring {
    pub event: EventId,
    /// Time the execution was scheduled for.
    pub scheduled: Real,
    /// Time at which it actually ran.
    pub time: Real,
}

/// Everything a failed advance may have touched, captured before it.
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    time: Real,
    values: Vec<Real>,
    triggers: Vec<bool>,
    queue: EventQueue,
    fired: usize,
}

impl Checkpoint {
    pub(crate) fn time(&self) -> Real {
        self.time
    }
}

/// Values, memoization, trigger states, pending executions and diagnostics
/// of one run. Each run owns its own; the model is shared.
#[derive(Debug)]
pub struct RunState {
    pub(crate) time: Real,
    pub(crate) values: Vec<Real>,
    pub(crate) status: Vec<EvalStatus>,
    pub(crate) triggers: Vec<bool>,
    pub(crate) queue: EventQueue,
    pub(crate) errors: ErrorList,
    pub(crate) fired: Vec<EventFiring>,
}

impl RunState {
    /// Allocate per-variable and per-event storage for `model`.
    pub fn new(model: &Model) -> SimResult<Self> {
        let n = model.num_variables();
        Ok(Self {
            time: model.initial_time(),
            values: filled(n, 0.0).map_err(|e| allocation("variable values", e))?,
            status: filled(n, EvalStatus::Done).map_err(|e| allocation("evaluation status", e))?,
            triggers: filled(model.events().len(), false)
                .map_err(|e| allocation("trigger states", e))?,
            queue: EventQueue::new(),
            errors: ErrorList::new(),
            fired: Vec::new(),
        })
    }

    pub fn time(&self) -> Real {
        self.time
    }

    pub fn values(&self) -> &[Real] {
        &self.values
    }

    pub fn triggers(&self) -> &[bool] {
        &self.triggers
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn errors(&self) -> &ErrorList {
        &self.errors
    }

    /// Executed events, oldest first.
    pub fn event_log(&self) -> &[EventFiring] {
        &self.fired
    }

    /// Evaluator over this state at `time`.
    pub fn evaluator<'a>(&'a mut self, model: &'a Model, time: Real) -> Evaluator<'a> {
        Evaluator::new(
            model,
            time,
            &mut self.values,
            &mut self.status,
            &mut self.errors,
        )
    }

    /// Invalidate every assignment variable so the next read recomputes it.
    pub(crate) fn mark_assignments_waiting(&mut self, model: &Model) {
        for var in model.assignment_variables() {
            self.status[var.ix()] = EvalStatus::Waiting;
        }
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            time: self.time,
            values: self.values.clone(),
            triggers: self.triggers.clone(),
            queue: self.queue.clone(),
            fired: self.fired.len(),
        }
    }

    /// Return to `checkpoint`. Diagnostics recorded since are kept.
    pub(crate) fn restore(&mut self, model: &Model, checkpoint: Checkpoint) {
        self.time = checkpoint.time;
        self.values = checkpoint.values;
        self.triggers = checkpoint.triggers;
        self.queue = checkpoint.queue;
        self.fired.truncate(checkpoint.fired);
        self.mark_assignments_waiting(model);
    }

    /// Forget everything from a previous run.
    pub(crate) fn reset(&mut self, model: &Model) {
        self.time = model.initial_time();
        self.queue.clear();
        self.errors.clear();
        self.fired.clear();
        for (slot, var) in self.values.iter_mut().zip(model.variables()) {
            *slot = var.initial_value();
        }
        self.status.fill(EvalStatus::Done);
        for (slot, event) in self.triggers.iter_mut().zip(model.events()) {
            *slot = event.initial_value;
        }
    }
}

fn filled<T: Clone>(n: usize, value: T) -> Result<Vec<T>, TryReserveError> {
    let mut v = Vec::new();
    v.try_reserve_exact(n)?;
    v.resize(n, value);
    Ok(v)
}

fn allocation(what: &str, err: TryReserveError) -> SimError {
    let mut errors = ErrorList::new();
    errors.fatal(ErrorCode::OutOfMemory, format!("{what}: {err}"));
    tracing::error!(what, %err, "simulation state allocation failed");
    SimError::Allocation {
        what: errors.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ks_model::{EventDef, ModelBuilder};

    #[test]
    fn reset_restores_defaults_and_trigger_initial_values() {
        let mut b = ModelBuilder::new();
        let x = b.add_ode_variable("x", 3.0);
        let p = b.add_parameter("p", 7.0);
        let zero = b.num(0.0);
        b.set_ode(x, zero);
        let t = b.time();
        let trig = b.gt(t, zero);
        b.add_event(EventDef::new("e", trig).initial_value(true).assign(p, zero));
        let model = b.build().unwrap();

        let mut state = RunState::new(&model).unwrap();
        assert_eq!(state.values(), &[0.0, 0.0]);
        state.values[1] = 1.0;
        state.errors.warning(ErrorCode::InvalidInput, "x");
        state.reset(&model);
        assert_eq!(state.values(), &[3.0, 7.0]);
        assert_eq!(state.triggers(), &[true]);
        assert!(state.errors().is_empty());
        assert!(state.queue().is_empty());
    }

    #[test]
    fn restore_undoes_time_values_triggers_queue_and_log() {
        let mut b = ModelBuilder::new();
        let x = b.add_ode_variable("x", 3.0);
        let zero = b.num(0.0);
        b.set_ode(x, zero);
        let t = b.time();
        let trig = b.gt(t, zero);
        b.add_event(EventDef::new("e", trig).assign(x, zero));
        let model = b.build().unwrap();

        let mut state = RunState::new(&model).unwrap();
        state.reset(&model);
        let checkpoint = state.checkpoint();

        let event = model.events()[0].id;
        state.time = 2.0;
        state.values[0] = 9.0;
        state.triggers[0] = true;
        state.queue.add(crate::queue::EventExecution {
            event,
            time: 2.5,
            priority: None,
            values: None,
        });
        state.fired.push(EventFiring {
            event,
            scheduled: 2.0,
            time: 2.0,
        });
        state.errors.error(ErrorCode::InvalidInput, "bad");

        state.restore(&model, checkpoint);
        assert_eq!(state.time(), 0.0);
        assert_eq!(state.values(), &[3.0]);
        assert_eq!(state.triggers(), &[false]);
        assert!(state.queue().is_empty());
        assert!(state.event_log().is_empty());
        assert_eq!(state.errors().failures(), 1);
    }

    #[test]
    fn allocation_error_carries_fatal_diagnostic() {
        let err = Vec::<u64>::new().try_reserve_exact(usize::MAX).unwrap_err();
        let SimError::Allocation { what } = allocation("values", err) else {
            panic!("wrong variant");
        };
        assert!(what.contains("fatal"), "{what}");
        assert!(what.contains("2003"), "{what}");
    }
}
