//! Lowering of event triggers into continuous root functions.

use ks_core::{ExprId, Real};
use ks_model::{Expr, Model};

use crate::eval::Evaluator;

/// A continuous function whose sign change marks a possible trigger edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootFunction {
    /// `lhs - rhs` for one adjacent pair of a comparison.
    Difference { lhs: ExprId, rhs: ExprId },
    /// The value of a non-relational trigger operand itself.
    Value(ExprId),
}

impl RootFunction {
    pub fn eval(self, ev: &mut Evaluator<'_>) -> Real {
        match self {
            RootFunction::Difference { lhs, rhs } => ev.eval(lhs) - ev.eval(rhs),
            RootFunction::Value(id) => ev.eval(id),
        }
    }
}

/// Root functions for every trigger of `model`, in event order.
///
/// Logical connectives are looked through. A comparison chain of n
/// operands yields n-1 differences. Constant operands never cross and
/// yield nothing.
pub fn lower_triggers(model: &Model) -> Vec<RootFunction> {
    let mut out = Vec::new();
    for event in model.events() {
        lower(model, event.trigger, &mut out);
    }
    out
}

fn lower(model: &Model, id: ExprId, out: &mut Vec<RootFunction>) {
    match model.expr(id) {
        Expr::Logical(_, args) => {
            for &a in args {
                lower(model, a, out);
            }
        }
        Expr::Relational(_, args) => {
            out.extend(args.windows(2).map(|w| RootFunction::Difference {
                lhs: w[0],
                rhs: w[1],
            }));
        }
        Expr::Number(_) | Expr::Constant(_) => {}
        _ => out.push(RootFunction::Value(id)),
    }
}
