//! Indexing pass and state-vector layout.
//!
//! Runs once when a model is built: name nodes are bound to variable indices
//! and ODE variables are assigned integrator state slots. Nothing is looked
//! up by name during evaluation.

use std::collections::HashMap;

use ks_core::{ExprId, Real, VarId};

use crate::expr::{Binding, Expr};
use crate::model::{Equation, Variable};

/// Names that denote simulation time when no variable claims them.
pub const TIME_SYMBOLS: [&str; 5] = ["t", "T", "time", "Time", "TIME"];

pub fn is_time_symbol(name: &str) -> bool {
    TIME_SYMBOLS.contains(&name)
}

/// Bind every name node. Returns the names left unbound.
pub(crate) fn resolve_names(exprs: &mut [Expr], names: &HashMap<String, VarId>) -> Vec<String> {
    let mut unbound = Vec::new();
    for expr in exprs.iter_mut() {
        if let Expr::Name { name, binding } = expr {
            *binding = match names.get(name.as_str()) {
                Some(&var) => Binding::Variable(var),
                None if is_time_symbol(name) => Binding::Time,
                None => {
                    unbound.push(name.clone());
                    Binding::Unbound
                }
            };
        }
    }
    unbound
}

/// Bidirectional mapping between ODE variables and state slots.
///
/// Slot `i` holds the variable defined by the `i`-th ODE equation.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StateLayout {
    vars: Vec<VarId>,
    rates: Vec<ExprId>,
    slot_of: Vec<Option<usize>>,
}

impl StateLayout {
    pub(crate) fn new(variables: &[Variable], odes: &[&Equation]) -> Self {
        let mut slot_of = vec![None; variables.len()];
        let mut vars = Vec::with_capacity(odes.len());
        let mut rates = Vec::with_capacity(odes.len());
        for (slot, eq) in odes.iter().enumerate() {
            slot_of[eq.variable.ix()] = Some(slot);
            vars.push(eq.variable);
            rates.push(eq.math);
        }
        Self {
            vars,
            rates,
            slot_of,
        }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variable stored in a slot.
    pub fn var(&self, slot: usize) -> VarId {
        self.vars[slot]
    }

    /// Slot of a variable, if it is an ODE variable.
    pub fn slot(&self, var: VarId) -> Option<usize> {
        self.slot_of.get(var.ix()).copied().flatten()
    }

    pub fn vars(&self) -> &[VarId] {
        &self.vars
    }

    /// Rate expressions, aligned with the slots.
    pub fn rates(&self) -> &[ExprId] {
        &self.rates
    }

    /// Copy ODE variable values into a state vector.
    pub fn gather(&self, values: &[Real], state: &mut [Real]) {
        for (dst, var) in state.iter_mut().zip(&self.vars) {
            *dst = values[var.ix()];
        }
    }

    /// Copy a state vector into the ODE variable values.
    pub fn scatter(&self, state: &[Real], values: &mut [Real]) {
        for (src, var) in state.iter().zip(&self.vars) {
            values[var.ix()] = *src;
        }
    }
}
