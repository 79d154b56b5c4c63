//! Bridge between the BDF integrator and the model's evaluation state.
//!
//! Provides:
//! - `IntegratorAdapter`, which advances one run to a requested time,
//!   stopping at event roots and pending executions to settle them
//!
//! Only pure ODE systems are supported: at least one rate equation and no
//! algebraic equations.

use ks_core::{ErrorCode, ErrorList, Real, VarId};
use ks_model::Model;
use ks_solver::{
    Bdf, CallbackError, IntegratorStats, OdeProblem, SolverError, StepMode, StepStatus,
};
use nalgebra::DVector;
use tracing::{debug, warn};

use crate::coordinator::UpdateCoordinator;
use crate::error::{SimError, SimResult};
use crate::settings::EngineSettings;
use crate::state::{Checkpoint, EventFiring, RunState};
use crate::triggers::{RootFunction, lower_triggers};

/// The model seen through the integrator's callback interface.
struct EngineProblem<'a> {
    model: &'a Model,
    roots: &'a [RootFunction],
    state: &'a mut RunState,
}

impl EngineProblem<'_> {
    /// Load a trial state. Assignment variables are invalidated so they
    /// see the new ODE values.
    fn load(&mut self, y: &DVector<f64>) {
        self.state.mark_assignments_waiting(self.model);
        self.model
            .state_layout()
            .scatter(y.as_slice(), &mut self.state.values);
    }

    fn finish(&self, failures: usize) -> Result<(), CallbackError> {
        if self.state.errors.failures() > failures {
            Err(CallbackError)
        } else {
            Ok(())
        }
    }
}

impl OdeProblem for EngineProblem<'_> {
    fn num_roots(&self) -> usize {
        self.roots.len()
    }

    fn rhs(&mut self, t: f64, y: &DVector<f64>, ydot: &mut DVector<f64>) -> Result<(), CallbackError> {
        let failures = self.state.errors.failures();
        self.load(y);
        let model = self.model;
        let mut ev = self.state.evaluator(model, t);
        for (slot, &rate) in model.state_layout().rates().iter().enumerate() {
            ydot[slot] = ev.eval(rate);
        }
        for var in model.assignment_variables() {
            ev.variable(var);
        }
        self.finish(failures)
    }

    fn roots(&mut self, t: f64, y: &DVector<f64>, g: &mut DVector<f64>) -> Result<(), CallbackError> {
        let failures = self.state.errors.failures();
        self.load(y);
        let model = self.model;
        let mut ev = self.state.evaluator(model, t);
        for (slot, root) in self.roots.iter().enumerate() {
            g[slot] = root.eval(&mut ev);
        }
        self.finish(failures)
    }
}

/// One simulation run driven by the BDF integrator.
pub struct IntegratorAdapter<'m> {
    model: &'m Model,
    settings: EngineSettings,
    roots: Vec<RootFunction>,
    state: RunState,
    bdf: Bdf,
    one_step_next: bool,
}

impl<'m> IntegratorAdapter<'m> {
    /// Set up a run at the model's initial time with default values.
    pub fn new(model: &'m Model, settings: EngineSettings) -> SimResult<Self> {
        Self::with_overrides(model, settings, &[])
    }

    /// Set up a run whose initial values of the given variables are replaced.
    pub fn with_overrides(
        model: &'m Model,
        settings: EngineSettings,
        overrides: &[(VarId, Real)],
    ) -> SimResult<Self> {
        settings.validate()?;
        if model.num_odes() == 0 {
            return Err(SimError::Unsupported {
                what: "model has no rate equations",
            });
        }
        if !model.algebraics().is_empty() {
            return Err(SimError::Unsupported {
                what: "model has algebraic equations",
            });
        }

        let roots = lower_triggers(model);
        let bdf = Bdf::new(settings.integrator.clone())?;
        let mut adapter = Self {
            model,
            state: RunState::new(model)?,
            settings,
            roots,
            bdf,
            one_step_next: false,
        };
        adapter.initialize(overrides)?;
        debug!(
            odes = model.num_odes(),
            roots = adapter.roots.len(),
            events = model.events().len(),
            "integrator adapter ready"
        );
        Ok(adapter)
    }

    fn coordinator(&self) -> UpdateCoordinator<'m> {
        UpdateCoordinator::new(self.model, self.settings.max_settle_iterations)
    }

    /// The integrator and the problem it advances, borrowed side by side.
    fn split(&mut self) -> (&mut Bdf, EngineProblem<'_>) {
        let problem = EngineProblem {
            model: self.model,
            roots: &self.roots,
            state: &mut self.state,
        };
        (&mut self.bdf, problem)
    }

    fn ode_state(&self) -> DVector<f64> {
        let layout = self.model.state_layout();
        let mut y = DVector::zeros(layout.len());
        layout.gather(&self.state.values, y.as_mut_slice());
        y
    }

    fn initialize(&mut self, overrides: &[(VarId, Real)]) -> SimResult<()> {
        self.coordinator().initialize(&mut self.state, overrides)?;
        let t0 = self.model.initial_time();
        let y0 = self.ode_state();
        let (bdf, mut problem) = self.split();
        bdf.init(&mut problem, t0, y0)
            .map_err(|source| SimError::Integration { time: t0, source })?;
        self.one_step_next = false;
        Ok(())
    }

    /// Start over from the model's initial values.
    pub fn restart(&mut self) -> SimResult<()> {
        self.initialize(&[])
    }

    /// Start over with the initial values of the given variables replaced.
    pub fn restart_with(&mut self, overrides: &[(VarId, Real)]) -> SimResult<()> {
        self.initialize(overrides)
    }

    /// Advance the run to `end_time`.
    ///
    /// Integration stops at every located trigger root and every pending
    /// execution time to settle discrete changes. If the ODE values change
    /// the integrator restarts from the new state. On failure the run is
    /// returned to where it stood before the failing step: time, values,
    /// trigger states, pending executions and the event log, with the
    /// integrator restarted there. Diagnostics of the failure are kept.
    pub fn solve(&mut self, end_time: Real) -> SimResult<()> {
        let now = self.state.time;
        if !end_time.is_finite() || end_time < now {
            return Err(SimError::invalid(format!(
                "end time {end_time} is before the current time {now}"
            )));
        }

        while self.state.time < end_time {
            let tout = self
                .state
                .queue
                .peek_next_time()
                .filter(|&te| te < end_time)
                .unwrap_or(end_time)
                .max(self.state.time);
            let mode = if self.one_step_next {
                StepMode::OneStep
            } else {
                StepMode::Normal
            };

            let checkpoint = self.state.checkpoint();
            let (bdf, mut problem) = self.split();
            let stepped = bdf.step(&mut problem, tout, mode);
            let report = match stepped {
                Ok(report) => report,
                Err(source) => return Err(self.fail(checkpoint, source)),
            };
            match report.status {
                StepStatus::RootFound => {
                    debug!(t = report.t, roots = ?self.bdf.root_info(), "trigger root located");
                    self.one_step_next = true;
                }
                StepStatus::Success => self.one_step_next = false,
                StepStatus::TooClose => {}
            }

            let model = self.model;
            let layout = model.state_layout();
            layout.scatter(self.bdf.y().as_slice(), &mut self.state.values);
            let before = self.state.values.clone();
            let settled = self.coordinator().settle(&mut self.state, report.t);
            if !settled {
                self.rewind(checkpoint);
                return Err(SimError::SettleFailed { time: report.t });
            }

            let ode_changed = layout
                .vars()
                .iter()
                .any(|v| self.state.values[v.ix()].to_bits() != before[v.ix()].to_bits());
            let others_changed = self.state.values != before;
            let y = self.ode_state();
            let (bdf, mut problem) = self.split();
            let refreshed = if ode_changed {
                debug!(t = report.t, "ODE values changed by an event; restarting integrator");
                bdf.reinit(&mut problem, report.t, y)
            } else if others_changed {
                bdf.refresh_roots(&mut problem)
            } else {
                Ok(())
            };
            if let Err(source) = refreshed {
                return Err(self.fail(checkpoint, source));
            }
        }

        let stats = self.bdf.stats();
        debug!(
            t = end_time,
            steps = stats.steps,
            rhs = stats.rhs_evals,
            restarts = stats.restarts,
            "solve finished"
        );
        Ok(())
    }

    fn fail(&mut self, checkpoint: Checkpoint, source: SolverError) -> SimError {
        let time = checkpoint.time();
        self.state.errors.error(
            ErrorCode::IntegratorFailure,
            format!("integrator failed after t={time}: {source}"),
        );
        self.rewind(checkpoint);
        SimError::Integration { time, source }
    }

    /// Put the run and the integrator back at `checkpoint`.
    fn rewind(&mut self, checkpoint: Checkpoint) {
        let time = checkpoint.time();
        self.state.restore(self.model, checkpoint);
        self.one_step_next = false;
        let y = self.ode_state();
        let (bdf, mut problem) = self.split();
        if let Err(err) = bdf.reinit(&mut problem, time, y) {
            warn!(t = time, %err, "integrator could not be restarted at the last consistent state");
        }
    }

    pub fn model(&self) -> &'m Model {
        self.model
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn time(&self) -> Real {
        self.state.time
    }

    /// Current values of all variables, indexed by `VarId::ix`.
    pub fn values(&self) -> &[Real] {
        &self.state.values
    }

    pub fn value(&self, var: VarId) -> Real {
        self.state.values[var.ix()]
    }

    pub fn errors(&self) -> &ErrorList {
        &self.state.errors
    }

    pub fn event_log(&self) -> &[EventFiring] {
        &self.state.fired
    }

    pub fn roots(&self) -> &[RootFunction] {
        &self.roots
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn stats(&self) -> &IntegratorStats {
        self.bdf.stats()
    }
}
