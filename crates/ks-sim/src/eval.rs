//! Lazy, memoized expression evaluation.
//!
//! Provides:
//! - `EvalStatus` for per-variable memoization
//! - `Evaluator`, a short-lived view over a run's values that computes
//!   expression trees on demand
//!
//! Evaluation always completes. Problems such as cycles, unresolved
//! names or unsupported constructs are recorded in the run's `ErrorList`
//! and a fallback value of 0 is used.

use ks_core::{ErrorCode, ErrorList, ExprId, Real, VarId, from_bool, truthy};
use ks_model::{Binding, Expr, Func, LogicOp, Model, Op, RelOp, VariableKind};
use tracing::trace;

/// Memoization state of one variable within the current evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalStatus {
    /// Needs recomputation from its defining equation.
    Waiting,
    /// Currently being computed; reaching it again is a cycle.
    InProgress,
    /// Holds a valid value for this pass.
    Done,
}

/// Evaluates expressions of one model at one time against a run's values.
pub struct Evaluator<'a> {
    model: &'a Model,
    time: Real,
    values: &'a mut [Real],
    status: &'a mut [EvalStatus],
    errors: &'a mut ErrorList,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        model: &'a Model,
        time: Real,
        values: &'a mut [Real],
        status: &'a mut [EvalStatus],
        errors: &'a mut ErrorList,
    ) -> Self {
        debug_assert_eq!(values.len(), model.num_variables());
        debug_assert_eq!(status.len(), model.num_variables());
        Self {
            model,
            time,
            values,
            status,
            errors,
        }
    }

    pub fn time(&self) -> Real {
        self.time
    }

    /// Current value of a variable, computing it first if it is waiting.
    ///
    /// Assignment variables are computed from their assignment equation;
    /// other variables from their initial-assignment equation, if any.
    pub fn variable(&mut self, var: VarId) -> Real {
        let i = var.ix();
        match self.status[i] {
            EvalStatus::Done => self.values[i],
            EvalStatus::InProgress => {
                let name = &self.model.variable(var).name;
                self.errors.error(
                    ErrorCode::CyclicDependency,
                    format!("cyclic dependency involving '{name}'"),
                );
                0.0
            }
            EvalStatus::Waiting => {
                let model = self.model;
                let v = model.variable(var);
                let defining = if v.kind == VariableKind::Assignment {
                    v.equation
                } else {
                    v.init_equation
                };
                let Some(eq) = defining else {
                    self.status[i] = EvalStatus::Done;
                    return self.values[i];
                };
                self.status[i] = EvalStatus::InProgress;
                let value = self.eval(model.equation(eq).math);
                self.values[i] = value;
                self.status[i] = EvalStatus::Done;
                value
            }
        }
    }

    /// Evaluate an expression and coerce the result to a boolean.
    pub fn truth(&mut self, id: ExprId) -> bool {
        truthy(self.eval(id))
    }

    pub fn eval(&mut self, id: ExprId) -> Real {
        let model = self.model;
        match model.expr(id) {
            Expr::Number(v) => *v,
            Expr::Constant(c) => c.value(),
            Expr::Time => self.time,
            Expr::Name { name, binding } => match binding {
                Binding::Variable(var) => self.variable(*var),
                Binding::Time => self.time,
                Binding::Unbound => {
                    self.errors.error(
                        ErrorCode::UnresolvedName,
                        format!("name '{name}' does not refer to a variable"),
                    );
                    0.0
                }
            },
            Expr::Op(op, args) => self.op(*op, args),
            Expr::Func(f, args) => self.func(*f, args),
            Expr::Relational(op, args) => from_bool(self.relational(*op, args)),
            Expr::Logical(op, args) => from_bool(self.logical(*op, args)),
            Expr::Piecewise(parts) => self.piecewise(parts),
            Expr::Delay(_) => {
                self.errors.warning(
                    ErrorCode::DelayOperator,
                    "delay operator is not supported; evaluating to 0",
                );
                0.0
            }
            Expr::Lambda(_) => {
                self.errors.warning(
                    ErrorCode::LambdaOutsideDefinition,
                    "lambda outside a function definition evaluates to 0",
                );
                0.0
            }
            Expr::Call { name, .. } => {
                self.errors.warning(
                    ErrorCode::UndefinedFunction,
                    format!("call of undefined function '{name}' evaluates to 0"),
                );
                0.0
            }
            Expr::Empty => {
                self.errors
                    .error(ErrorCode::EmptyNode, "expression has no content");
                0.0
            }
            Expr::Unknown(label) => {
                self.errors.error(
                    ErrorCode::UnknownNode,
                    format!("unknown expression node '{label}'"),
                );
                0.0
            }
        }
    }

    fn arg(&mut self, args: &[ExprId], i: usize) -> Real {
        match args.get(i) {
            Some(&a) => self.eval(a),
            None => {
                self.errors
                    .error(ErrorCode::EmptyNode, "operator is missing an operand");
                0.0
            }
        }
    }

    fn op(&mut self, op: Op, args: &[ExprId]) -> Real {
        match op {
            Op::Plus => {
                let mut acc = 0.0;
                for &a in args {
                    acc += self.eval(a);
                }
                acc
            }
            Op::Times => {
                let mut acc = 1.0;
                for &a in args {
                    acc *= self.eval(a);
                }
                acc
            }
            Op::Minus if args.len() == 1 => -self.arg(args, 0),
            Op::Minus => self.arg(args, 0) - self.arg(args, 1),
            Op::Divide => self.arg(args, 0) / self.arg(args, 1),
            Op::Power => self.arg(args, 0).powf(self.arg(args, 1)),
        }
    }

    fn func(&mut self, f: Func, args: &[ExprId]) -> Real {
        // log and root take an optional leading base/degree
        match (f, args.len()) {
            (Func::Log, 2) => {
                let base = self.arg(args, 0);
                let x = self.arg(args, 1);
                return x.log10() / base.log10();
            }
            (Func::Root, 2) => {
                let degree = self.arg(args, 0);
                let x = self.arg(args, 1);
                return x.powf(1.0 / degree);
            }
            _ => {}
        }

        let x = self.arg(args, 0);
        match f {
            Func::Abs => x.abs(),
            Func::Arccos => x.acos(),
            Func::Arccosh => x.acosh(),
            Func::Arccot => (1.0 / x).atan(),
            Func::Arccoth => (1.0 / x).atanh(),
            Func::Arccsc => (1.0 / x).asin(),
            Func::Arccsch => (1.0 / x).asinh(),
            Func::Arcsec => (1.0 / x).acos(),
            Func::Arcsech => (1.0 / x).acosh(),
            Func::Arcsin => x.asin(),
            Func::Arcsinh => x.asinh(),
            Func::Arctan => x.atan(),
            Func::Arctanh => x.atanh(),
            Func::Ceiling => x.ceil(),
            Func::Cos => x.cos(),
            Func::Cosh => x.cosh(),
            Func::Cot => 1.0 / x.tan(),
            Func::Coth => 1.0 / x.tanh(),
            Func::Csc => 1.0 / x.sin(),
            Func::Csch => 1.0 / x.sinh(),
            Func::Exp => x.exp(),
            Func::Factorial => self.factorial(x),
            Func::Floor => x.floor(),
            Func::Ln => x.ln(),
            Func::Log => x.log10(),
            Func::Root => x.sqrt(),
            Func::Sec => 1.0 / x.cos(),
            Func::Sech => 1.0 / x.cosh(),
            Func::Sin => x.sin(),
            Func::Sinh => x.sinh(),
            Func::Tan => x.tan(),
            Func::Tanh => x.tanh(),
        }
    }

    fn factorial(&mut self, x: Real) -> Real {
        if x.is_nan() {
            return Real::NAN;
        }
        let n = x.floor();
        if n != x {
            trace!(arg = x, floor = n, "non-integer factorial argument");
            self.errors.warning(
                ErrorCode::NonIntegerFactorial,
                "factorial of non-integer argument; flooring",
            );
        }
        // 171! overflows f64
        if n > 170.0 {
            return Real::INFINITY;
        }
        let mut acc = 1.0;
        let mut k = 2.0;
        while k <= n {
            acc *= k;
            k += 1.0;
        }
        acc
    }

    /// Chained comparison: holds when every adjacent pair holds. All
    /// operands are evaluated.
    fn relational(&mut self, op: RelOp, args: &[ExprId]) -> bool {
        let mut holds = true;
        let mut prev: Option<Real> = None;
        for &a in args {
            let v = self.eval(a);
            if let Some(p) = prev {
                holds &= op.holds(p, v);
            }
            prev = Some(v);
        }
        holds
    }

    fn logical(&mut self, op: LogicOp, args: &[ExprId]) -> bool {
        match op {
            LogicOp::And => {
                let mut all = true;
                for &a in args {
                    all &= self.truth(a);
                }
                all
            }
            LogicOp::Or => {
                let mut any = false;
                for &a in args {
                    any |= self.truth(a);
                }
                any
            }
            LogicOp::Xor => {
                let mut odd = false;
                for &a in args {
                    odd ^= self.truth(a);
                }
                odd
            }
            LogicOp::Not => !truthy(self.arg(args, 0)),
        }
    }

    /// First piece whose condition holds; the trailing odd child, if any,
    /// is the fallback. No match and no fallback gives 0.
    fn piecewise(&mut self, parts: &[ExprId]) -> Real {
        let mut pairs = parts.chunks_exact(2);
        for pair in pairs.by_ref() {
            if self.truth(pair[0]) {
                return self.eval(pair[1]);
            }
        }
        match pairs.remainder() {
            [otherwise] => self.eval(*otherwise),
            _ => 0.0,
        }
    }
}
