//! Immutable model specification.

use std::collections::HashMap;

use ks_core::{EqId, EventId, ExprId, Real, VarId};

use crate::expr::Expr;
use crate::indexing::StateLayout;

/// Category of a model variable. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VariableKind {
    /// Advanced in time by the integrator.
    Ode,
    /// Always defined by an assignment equation.
    Assignment,
    /// Constrained by an algebraic equation.
    Algebraic,
    /// Constant unless changed by an event.
    Parameter,
}

/// Category of an equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EquationKind {
    Ode,
    Assignment,
    Algebraic,
    InitAssignment,
    EventAssignment,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variable {
    pub id: VarId,
    pub name: String,
    pub kind: VariableKind,
    /// Equation defining the value (ODE, assignment or algebraic).
    pub equation: Option<EqId>,
    /// Equation defining the value at the initial time only.
    pub init_equation: Option<EqId>,
    /// Literal value used when no equation applies.
    pub default_value: Option<Real>,
}

impl Variable {
    /// Default value, or 0 when none was given.
    pub fn initial_value(&self) -> Real {
        self.default_value.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Equation {
    pub id: EqId,
    pub kind: EquationKind,
    pub variable: VarId,
    pub math: ExprId,
}

/// A discrete, condition-triggered state change.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub trigger: ExprId,
    pub delay: Option<ExprId>,
    pub priority: Option<ExprId>,
    /// Event-assignment equations, in execution order.
    pub assignments: Vec<EqId>,
    /// Trigger state assumed before the first evaluation.
    pub initial_value: bool,
    /// A scheduled execution survives its trigger going false.
    pub persistent: bool,
    /// Assignment values are computed when the trigger fires, not when the
    /// execution runs.
    pub evaluate_now: bool,
}

/// Validated, indexed and read-only model.
///
/// Shared by reference between any number of simulation runs.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Model {
    pub(crate) exprs: Vec<Expr>,
    pub(crate) variables: Vec<Variable>,
    pub(crate) equations: Vec<Equation>,
    pub(crate) events: Vec<Event>,
    pub(crate) odes: Vec<EqId>,
    pub(crate) assignments: Vec<EqId>,
    pub(crate) algebraics: Vec<EqId>,
    pub(crate) init_assignments: Vec<EqId>,
    pub(crate) names: HashMap<String, VarId>,
    pub(crate) layout: StateLayout,
    pub(crate) initial_time: Real,
}

impl Model {
    /// Expression node by id. Ids always come from this model.
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.ix()]
    }

    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.ix()]
    }

    pub fn find_variable(&self, name: &str) -> Option<VarId> {
        self.names.get(name).copied()
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn equations(&self) -> &[Equation] {
        &self.equations
    }

    pub fn equation(&self, id: EqId) -> &Equation {
        &self.equations[id.ix()]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn event(&self, id: EventId) -> &Event {
        &self.events[id.ix()]
    }

    /// ODE equations in state-vector order.
    pub fn odes(&self) -> &[EqId] {
        &self.odes
    }

    pub fn assignments(&self) -> &[EqId] {
        &self.assignments
    }

    pub fn algebraics(&self) -> &[EqId] {
        &self.algebraics
    }

    pub fn init_assignments(&self) -> &[EqId] {
        &self.init_assignments
    }

    /// Variables defined by an assignment equation.
    pub fn assignment_variables(&self) -> impl Iterator<Item = VarId> + '_ {
        self.assignments.iter().map(|&eq| self.equation(eq).variable)
    }

    /// Mapping between ODE variables and integrator state slots.
    pub fn state_layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn num_odes(&self) -> usize {
        self.odes.len()
    }

    pub fn initial_time(&self) -> Real {
        self.initial_time
    }
}
