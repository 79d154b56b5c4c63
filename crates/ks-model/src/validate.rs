//! Model validation logic.

use std::collections::HashSet;

use ks_core::{ExprId, VarId};

use crate::error::{ModelError, ModelResult};
use crate::expr::Expr;
use crate::model::{Equation, EquationKind, Event, Variable, VariableKind};

/// Operands must exist, precede their parent and match the operator arity.
pub(crate) fn validate_exprs(exprs: &[Expr]) -> ModelResult<()> {
    for (i, expr) in exprs.iter().enumerate() {
        let id = ExprId::from_index(i as u32);
        for &child in expr.children() {
            if child.ix() >= i {
                return Err(ModelError::InvalidExpr { expr: id, child });
            }
        }

        let found = expr.children().len();
        let (min, max) = expr.arity();
        if found < min || max.is_some_and(|m| found > m) {
            return Err(ModelError::Arity {
                expr: id,
                op: expr.label(),
                found,
            });
        }
    }
    Ok(())
}

fn check_root(exprs: &[Expr], id: ExprId) -> ModelResult<()> {
    if id.ix() >= exprs.len() {
        return Err(ModelError::InvalidExpr {
            expr: id,
            child: id,
        });
    }
    Ok(())
}

fn check_var(variables: &[Variable], var: VarId) -> ModelResult<&Variable> {
    variables
        .get(var.ix())
        .ok_or(ModelError::UnknownVariable { var })
}

/// Which equation categories may define which variable kinds.
fn kind_accepts(kind: VariableKind, equation: EquationKind) -> bool {
    match equation {
        EquationKind::Ode => kind == VariableKind::Ode,
        EquationKind::Assignment => kind == VariableKind::Assignment,
        EquationKind::Algebraic => kind == VariableKind::Algebraic,
        EquationKind::InitAssignment | EquationKind::EventAssignment => {
            kind != VariableKind::Assignment
        }
    }
}

/// Check equation targets and the one-equation-per-category rule.
pub(crate) fn validate_equations(
    exprs: &[Expr],
    variables: &[Variable],
    equations: &[Equation],
) -> ModelResult<()> {
    let mut seen: HashSet<(VarId, EquationKind)> = HashSet::new();

    for eq in equations {
        check_root(exprs, eq.math)?;
        let var = check_var(variables, eq.variable)?;

        if eq.kind == EquationKind::EventAssignment {
            // Checked per event, where the event id is known.
            continue;
        }
        if !kind_accepts(var.kind, eq.kind) {
            return Err(ModelError::KindMismatch {
                name: var.name.clone(),
                kind: var.kind,
                equation: eq.kind,
            });
        }
        if !seen.insert((eq.variable, eq.kind)) {
            return Err(ModelError::DuplicateEquation {
                name: var.name.clone(),
                equation: eq.kind,
            });
        }
    }

    for var in variables {
        let required = match var.kind {
            VariableKind::Ode => Some(EquationKind::Ode),
            VariableKind::Assignment => Some(EquationKind::Assignment),
            VariableKind::Algebraic | VariableKind::Parameter => None,
        };
        if let Some(equation) = required {
            if !seen.contains(&(var.id, equation)) {
                return Err(ModelError::MissingEquation {
                    name: var.name.clone(),
                    equation,
                });
            }
        }
    }
    Ok(())
}

pub(crate) fn validate_events(
    exprs: &[Expr],
    variables: &[Variable],
    equations: &[Equation],
    events: &[Event],
) -> ModelResult<()> {
    for event in events {
        check_root(exprs, event.trigger)?;
        if let Some(delay) = event.delay {
            check_root(exprs, delay)?;
        }
        if let Some(priority) = event.priority {
            check_root(exprs, priority)?;
        }
        for &eq in &event.assignments {
            let var = check_var(variables, equations[eq.ix()].variable)?;
            if var.kind == VariableKind::Assignment {
                return Err(ModelError::AssignmentTarget {
                    event: event.id,
                    name: var.name.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Op;

    #[test]
    fn forward_reference_rejected() {
        let exprs = vec![Expr::Op(Op::Minus, vec![ExprId::from_index(0)])];
        assert!(matches!(
            validate_exprs(&exprs),
            Err(ModelError::InvalidExpr { .. })
        ));
    }

    #[test]
    fn arity_checked() {
        let exprs = vec![
            Expr::Number(1.0),
            Expr::Op(Op::Divide, vec![ExprId::from_index(0)]),
        ];
        assert!(matches!(
            validate_exprs(&exprs),
            Err(ModelError::Arity { found: 1, .. })
        ));
    }

    #[test]
    fn init_assignment_allowed_on_parameters_only_when_not_assignment() {
        assert!(kind_accepts(VariableKind::Parameter, EquationKind::InitAssignment));
        assert!(kind_accepts(VariableKind::Ode, EquationKind::InitAssignment));
        assert!(!kind_accepts(VariableKind::Assignment, EquationKind::InitAssignment));
    }
}
