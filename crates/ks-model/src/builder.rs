//! Incremental model builder.

use std::collections::HashMap;

use ks_core::{EqId, EventId, ExprId, Real, VarId};

use crate::error::{ModelError, ModelResult};
use crate::expr::{Binding, Constant, Expr, Func, LogicOp, Op, RelOp};
use crate::indexing::{self, StateLayout};
use crate::model::{Equation, EquationKind, Event, Model, Variable, VariableKind};
use crate::validate;

/// Description of an event handed to [`ModelBuilder::add_event`].
#[derive(Debug, Clone)]
pub struct EventDef {
    name: String,
    trigger: ExprId,
    delay: Option<ExprId>,
    priority: Option<ExprId>,
    assignments: Vec<(VarId, ExprId)>,
    initial_value: bool,
    persistent: bool,
    evaluate_now: bool,
}

impl EventDef {
    /// New event with the usual defaults: initial trigger value false, not
    /// persistent, assignments evaluated at trigger time.
    pub fn new(name: impl Into<String>, trigger: ExprId) -> Self {
        Self {
            name: name.into(),
            trigger,
            delay: None,
            priority: None,
            assignments: Vec::new(),
            initial_value: false,
            persistent: false,
            evaluate_now: true,
        }
    }

    pub fn delay(mut self, delay: ExprId) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn priority(mut self, priority: ExprId) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn assign(mut self, var: VarId, math: ExprId) -> Self {
        self.assignments.push((var, math));
        self
    }

    pub fn initial_value(mut self, value: bool) -> Self {
        self.initial_value = value;
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn evaluate_now(mut self, evaluate_now: bool) -> Self {
        self.evaluate_now = evaluate_now;
        self
    }
}

/// Builder for constructing a model incrementally.
///
/// Expressions are pushed bottom-up: operands first, then the node that uses
/// them. Call `build()` to validate, index and freeze everything into an
/// immutable [`Model`].
#[derive(Debug, Default)]
pub struct ModelBuilder {
    exprs: Vec<Expr>,
    variables: Vec<Variable>,
    equations: Vec<Equation>,
    events: Vec<Event>,
    initial_time: Real,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- variables -------------------------------------------------------

    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        kind: VariableKind,
        default_value: Option<Real>,
    ) -> VarId {
        let id = VarId::from_index(self.variables.len() as u32);
        self.variables.push(Variable {
            id,
            name: name.into(),
            kind,
            equation: None,
            init_equation: None,
            default_value,
        });
        id
    }

    pub fn add_ode_variable(&mut self, name: impl Into<String>, initial: Real) -> VarId {
        self.add_variable(name, VariableKind::Ode, Some(initial))
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, value: Real) -> VarId {
        self.add_variable(name, VariableKind::Parameter, Some(value))
    }

    pub fn add_assignment_variable(&mut self, name: impl Into<String>) -> VarId {
        self.add_variable(name, VariableKind::Assignment, None)
    }

    pub fn add_algebraic_variable(&mut self, name: impl Into<String>, guess: Real) -> VarId {
        self.add_variable(name, VariableKind::Algebraic, Some(guess))
    }

    pub fn set_initial_time(&mut self, t0: Real) {
        self.initial_time = t0;
    }

    // ----- equations -------------------------------------------------------

    fn push_equation(&mut self, kind: EquationKind, variable: VarId, math: ExprId) -> EqId {
        let id = EqId::from_index(self.equations.len() as u32);
        self.equations.push(Equation {
            id,
            kind,
            variable,
            math,
        });
        id
    }

    /// `d(var)/dt = math`.
    pub fn set_ode(&mut self, var: VarId, math: ExprId) -> EqId {
        self.push_equation(EquationKind::Ode, var, math)
    }

    /// `var := math`, at all times.
    pub fn set_assignment(&mut self, var: VarId, math: ExprId) -> EqId {
        self.push_equation(EquationKind::Assignment, var, math)
    }

    /// `var := math`, at the initial time only.
    pub fn set_init_assignment(&mut self, var: VarId, math: ExprId) -> EqId {
        self.push_equation(EquationKind::InitAssignment, var, math)
    }

    /// `0 = math`, owned by an algebraic variable.
    pub fn add_algebraic(&mut self, var: VarId, math: ExprId) -> EqId {
        self.push_equation(EquationKind::Algebraic, var, math)
    }

    pub fn add_event(&mut self, def: EventDef) -> EventId {
        let id = EventId::from_index(self.events.len() as u32);
        let assignments = def
            .assignments
            .iter()
            .map(|&(var, math)| self.push_equation(EquationKind::EventAssignment, var, math))
            .collect();
        self.events.push(Event {
            id,
            name: def.name,
            trigger: def.trigger,
            delay: def.delay,
            priority: def.priority,
            assignments,
            initial_value: def.initial_value,
            persistent: def.persistent,
            evaluate_now: def.evaluate_now,
        });
        id
    }

    // ----- expressions -----------------------------------------------------

    pub fn push(&mut self, expr: Expr) -> ExprId {
        let id = ExprId::from_index(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn num(&mut self, value: Real) -> ExprId {
        self.push(Expr::Number(value))
    }

    pub fn constant(&mut self, c: Constant) -> ExprId {
        self.push(Expr::Constant(c))
    }

    pub fn time(&mut self) -> ExprId {
        self.push(Expr::Time)
    }

    /// Reference by name; bound to a variable when the model is built.
    pub fn name(&mut self, name: impl Into<String>) -> ExprId {
        self.push(Expr::Name {
            name: name.into(),
            binding: Binding::Unbound,
        })
    }

    /// Reference to a variable already added to this builder.
    pub fn var(&mut self, var: VarId) -> ExprId {
        let name = self
            .variables
            .get(var.ix())
            .map(|v| v.name.clone())
            .unwrap_or_default();
        self.name(name)
    }

    pub fn op(&mut self, op: Op, args: Vec<ExprId>) -> ExprId {
        self.push(Expr::Op(op, args))
    }

    pub fn plus(&mut self, args: Vec<ExprId>) -> ExprId {
        self.op(Op::Plus, args)
    }

    pub fn times(&mut self, args: Vec<ExprId>) -> ExprId {
        self.op(Op::Times, args)
    }

    pub fn minus(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.op(Op::Minus, vec![a, b])
    }

    pub fn neg(&mut self, a: ExprId) -> ExprId {
        self.op(Op::Minus, vec![a])
    }

    pub fn divide(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.op(Op::Divide, vec![a, b])
    }

    pub fn power(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.op(Op::Power, vec![a, b])
    }

    pub fn func(&mut self, f: Func, args: Vec<ExprId>) -> ExprId {
        self.push(Expr::Func(f, args))
    }

    pub fn apply(&mut self, f: Func, a: ExprId) -> ExprId {
        self.func(f, vec![a])
    }

    pub fn sqrt(&mut self, a: ExprId) -> ExprId {
        let two = self.num(2.0);
        self.func(Func::Root, vec![two, a])
    }

    /// Relational chain over adjacent operands.
    pub fn relational(&mut self, op: RelOp, args: Vec<ExprId>) -> ExprId {
        self.push(Expr::Relational(op, args))
    }

    pub fn gt(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.relational(RelOp::Gt, vec![a, b])
    }

    pub fn geq(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.relational(RelOp::Geq, vec![a, b])
    }

    pub fn lt(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.relational(RelOp::Lt, vec![a, b])
    }

    pub fn leq(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.relational(RelOp::Leq, vec![a, b])
    }

    pub fn eq(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.relational(RelOp::Eq, vec![a, b])
    }

    pub fn logical(&mut self, op: LogicOp, args: Vec<ExprId>) -> ExprId {
        self.push(Expr::Logical(op, args))
    }

    pub fn and(&mut self, args: Vec<ExprId>) -> ExprId {
        self.logical(LogicOp::And, args)
    }

    pub fn or(&mut self, args: Vec<ExprId>) -> ExprId {
        self.logical(LogicOp::Or, args)
    }

    pub fn xor(&mut self, args: Vec<ExprId>) -> ExprId {
        self.logical(LogicOp::Xor, args)
    }

    pub fn not(&mut self, a: ExprId) -> ExprId {
        self.logical(LogicOp::Not, vec![a])
    }

    /// `[cond1, value1, ..., otherwise?]`.
    pub fn piecewise(&mut self, parts: Vec<ExprId>) -> ExprId {
        self.push(Expr::Piecewise(parts))
    }

    pub fn delay_op(&mut self, x: ExprId, d: ExprId) -> ExprId {
        self.push(Expr::Delay(vec![x, d]))
    }

    pub fn lambda(&mut self, parts: Vec<ExprId>) -> ExprId {
        self.push(Expr::Lambda(parts))
    }

    pub fn call(&mut self, name: impl Into<String>, args: Vec<ExprId>) -> ExprId {
        self.push(Expr::Call {
            name: name.into(),
            args,
        })
    }

    pub fn empty(&mut self) -> ExprId {
        self.push(Expr::Empty)
    }

    // ----- build -----------------------------------------------------------

    /// Validate, index and freeze the model.
    pub fn build(mut self) -> ModelResult<Model> {
        if !self.initial_time.is_finite() {
            return Err(ModelError::NonFiniteInitialTime {
                value: self.initial_time,
            });
        }

        let mut names = HashMap::with_capacity(self.variables.len());
        for var in &self.variables {
            if names.insert(var.name.clone(), var.id).is_some() {
                return Err(ModelError::DuplicateName {
                    name: var.name.clone(),
                });
            }
        }

        validate::validate_exprs(&self.exprs)?;
        validate::validate_equations(&self.exprs, &self.variables, &self.equations)?;
        validate::validate_events(&self.exprs, &self.variables, &self.equations, &self.events)?;

        let mut odes = Vec::new();
        let mut assignments = Vec::new();
        let mut algebraics = Vec::new();
        let mut init_assignments = Vec::new();
        for eq in &self.equations {
            let var = &mut self.variables[eq.variable.ix()];
            match eq.kind {
                EquationKind::Ode => {
                    var.equation = Some(eq.id);
                    odes.push(eq.id);
                }
                EquationKind::Assignment => {
                    var.equation = Some(eq.id);
                    assignments.push(eq.id);
                }
                EquationKind::Algebraic => {
                    var.equation = Some(eq.id);
                    algebraics.push(eq.id);
                }
                EquationKind::InitAssignment => {
                    var.init_equation = Some(eq.id);
                    init_assignments.push(eq.id);
                }
                EquationKind::EventAssignment => {}
            }
        }

        let unbound = indexing::resolve_names(&mut self.exprs, &names);
        if !unbound.is_empty() {
            tracing::debug!(?unbound, "model contains unbound names");
        }

        let ode_eqs: Vec<&Equation> = odes.iter().map(|id| &self.equations[id.ix()]).collect();
        let layout = StateLayout::new(&self.variables, &ode_eqs);

        tracing::debug!(
            variables = self.variables.len(),
            odes = odes.len(),
            assignments = assignments.len(),
            events = self.events.len(),
            "model built"
        );

        Ok(Model {
            exprs: self.exprs,
            variables: self.variables,
            equations: self.equations,
            events: self.events,
            odes,
            assignments,
            algebraics,
            init_assignments,
            names,
            layout,
            initial_time: self.initial_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_sequential_ids() {
        let mut b = ModelBuilder::new();
        let x = b.add_ode_variable("x", 1.0);
        let k = b.add_parameter("k", 2.0);
        assert_eq!(x.index(), 0);
        assert_eq!(k.index(), 1);
        let e0 = b.num(1.0);
        let e1 = b.num(2.0);
        assert_eq!(e1.index(), e0.index() + 1);
    }

    #[test]
    fn var_reference_uses_name() {
        let mut b = ModelBuilder::new();
        let k = b.add_parameter("k", 2.0);
        let r = b.var(k);
        assert_eq!(
            b.exprs[r.ix()],
            Expr::Name {
                name: "k".into(),
                binding: Binding::Unbound
            }
        );
    }

    #[test]
    fn event_defaults() {
        let mut b = ModelBuilder::new();
        let trig = b.num(1.0);
        let def = EventDef::new("e", trig);
        assert!(!def.initial_value);
        assert!(!def.persistent);
        assert!(def.evaluate_now);
    }

    #[test]
    fn build_links_equations_to_variables() {
        let mut b = ModelBuilder::new();
        let x = b.add_ode_variable("x", 1.0);
        let rhs = b.name("x");
        let rate = b.neg(rhs);
        let ode = b.set_ode(x, rate);
        let seed = b.num(3.0);
        let init = b.set_init_assignment(x, seed);

        let model = b.build().unwrap();
        let var = model.variable(x);
        assert_eq!(var.equation, Some(ode));
        assert_eq!(var.init_equation, Some(init));
        assert_eq!(model.odes(), &[ode]);
        assert_eq!(model.init_assignments(), &[init]);
        assert_eq!(model.state_layout().slot(x), Some(0));
    }
}
