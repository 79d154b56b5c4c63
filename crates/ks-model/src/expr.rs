//! Arena expression nodes.
//!
//! Expressions are stored in a flat arena owned by the model and addressed by
//! [`ExprId`]. A node only refers to children that were pushed before it, so
//! every expression is a DAG rooted at its id.

use ks_core::{ExprId, Real, VarId};

/// Named mathematical constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    E,
    Pi,
    True,
    False,
}

impl Constant {
    pub fn value(self) -> Real {
        match self {
            Constant::E => std::f64::consts::E,
            Constant::Pi => std::f64::consts::PI,
            Constant::True => 1.0,
            Constant::False => 0.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Constant::E => "exponentiale",
            Constant::Pi => "pi",
            Constant::True => "true",
            Constant::False => "false",
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Op {
    /// n-ary sum (empty sum is 0).
    Plus,
    /// Binary difference, or negation with one operand.
    Minus,
    /// n-ary product (empty product is 1).
    Times,
    Divide,
    Power,
}

impl Op {
    pub fn symbol(self) -> &'static str {
        match self {
            Op::Plus => "+",
            Op::Minus => "-",
            Op::Times => "*",
            Op::Divide => "/",
            Op::Power => "^",
        }
    }

    pub(crate) fn arity(self) -> (usize, Option<usize>) {
        match self {
            Op::Plus | Op::Times => (0, None),
            Op::Minus => (1, Some(2)),
            Op::Divide | Op::Power => (2, Some(2)),
        }
    }
}

/// Built-in elementary functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Func {
    Abs,
    Arccos,
    Arccosh,
    Arccot,
    Arccoth,
    Arccsc,
    Arccsch,
    Arcsec,
    Arcsech,
    Arcsin,
    Arcsinh,
    Arctan,
    Arctanh,
    Ceiling,
    Cos,
    Cosh,
    Cot,
    Coth,
    Csc,
    Csch,
    Exp,
    Factorial,
    Floor,
    Ln,
    /// `log(base, x)`, or `log(x)` in base 10.
    Log,
    /// `root(degree, x)`, or `root(x)` as a square root.
    Root,
    Sec,
    Sech,
    Sin,
    Sinh,
    Tan,
    Tanh,
}

impl Func {
    pub fn name(self) -> &'static str {
        match self {
            Func::Abs => "abs",
            Func::Arccos => "arccos",
            Func::Arccosh => "arccosh",
            Func::Arccot => "arccot",
            Func::Arccoth => "arccoth",
            Func::Arccsc => "arccsc",
            Func::Arccsch => "arccsch",
            Func::Arcsec => "arcsec",
            Func::Arcsech => "arcsech",
            Func::Arcsin => "arcsin",
            Func::Arcsinh => "arcsinh",
            Func::Arctan => "arctan",
            Func::Arctanh => "arctanh",
            Func::Ceiling => "ceiling",
            Func::Cos => "cos",
            Func::Cosh => "cosh",
            Func::Cot => "cot",
            Func::Coth => "coth",
            Func::Csc => "csc",
            Func::Csch => "csch",
            Func::Exp => "exp",
            Func::Factorial => "factorial",
            Func::Floor => "floor",
            Func::Ln => "ln",
            Func::Log => "log",
            Func::Root => "root",
            Func::Sec => "sec",
            Func::Sech => "sech",
            Func::Sin => "sin",
            Func::Sinh => "sinh",
            Func::Tan => "tan",
            Func::Tanh => "tanh",
        }
    }

    pub(crate) fn arity(self) -> (usize, Option<usize>) {
        match self {
            Func::Log | Func::Root => (1, Some(2)),
            _ => (1, Some(1)),
        }
    }
}

/// Relational operators, applied as a chain over adjacent operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelOp {
    Eq,
    Neq,
    Gt,
    Geq,
    Lt,
    Leq,
}

impl RelOp {
    pub fn symbol(self) -> &'static str {
        match self {
            RelOp::Eq => "==",
            RelOp::Neq => "!=",
            RelOp::Gt => ">",
            RelOp::Geq => ">=",
            RelOp::Lt => "<",
            RelOp::Leq => "<=",
        }
    }

    pub fn holds(self, a: Real, b: Real) -> bool {
        match self {
            RelOp::Eq => a == b,
            RelOp::Neq => a != b,
            RelOp::Gt => a > b,
            RelOp::Geq => a >= b,
            RelOp::Lt => a < b,
            RelOp::Leq => a <= b,
        }
    }
}

/// Logical connectives over boolean-coerced operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LogicOp {
    And,
    Or,
    Xor,
    Not,
}

impl LogicOp {
    pub fn name(self) -> &'static str {
        match self {
            LogicOp::And => "and",
            LogicOp::Or => "or",
            LogicOp::Xor => "xor",
            LogicOp::Not => "not",
        }
    }

    pub(crate) fn arity(self) -> (usize, Option<usize>) {
        match self {
            LogicOp::Not => (1, Some(1)),
            _ => (0, None),
        }
    }
}

/// What a name node refers to once the model has been indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Binding {
    Variable(VarId),
    /// A reserved time symbol with no variable of the same name.
    Time,
    Unbound,
}

/// One node of the expression arena.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expr {
    Number(Real),
    Constant(Constant),
    /// The simulation time symbol.
    Time,
    Name { name: String, binding: Binding },
    Op(Op, Vec<ExprId>),
    Func(Func, Vec<ExprId>),
    Relational(RelOp, Vec<ExprId>),
    Logical(LogicOp, Vec<ExprId>),
    /// `[cond1, value1, cond2, value2, ..., otherwise?]`.
    Piecewise(Vec<ExprId>),
    /// `delay(x, d)`; not supported by the engine.
    Delay(Vec<ExprId>),
    /// A lambda body; only meaningful inside a function definition.
    Lambda(Vec<ExprId>),
    /// Call of a function the model does not define.
    Call { name: String, args: Vec<ExprId> },
    /// Placeholder for missing math.
    Empty,
    /// A construct the model builder could not classify.
    Unknown(String),
}

impl Expr {
    /// Operand ids of this node.
    pub fn children(&self) -> &[ExprId] {
        match self {
            Expr::Op(_, c)
            | Expr::Func(_, c)
            | Expr::Relational(_, c)
            | Expr::Logical(_, c)
            | Expr::Piecewise(c)
            | Expr::Delay(c)
            | Expr::Lambda(c) => c,
            Expr::Call { args, .. } => args,
            Expr::Number(_)
            | Expr::Constant(_)
            | Expr::Time
            | Expr::Name { .. }
            | Expr::Empty
            | Expr::Unknown(_) => &[],
        }
    }

    /// True for relational nodes.
    pub fn is_relational(&self) -> bool {
        matches!(self, Expr::Relational(..))
    }

    /// Accepted operand count as `(min, max)`.
    pub(crate) fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Expr::Op(op, _) => op.arity(),
            Expr::Func(f, _) => f.arity(),
            Expr::Relational(..) => (1, None),
            Expr::Logical(op, _) => op.arity(),
            Expr::Piecewise(_) => (1, None),
            Expr::Delay(_) => (2, Some(2)),
            Expr::Lambda(_) | Expr::Call { .. } => (0, None),
            _ => (0, Some(0)),
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Expr::Number(_) => "number",
            Expr::Constant(c) => c.symbol(),
            Expr::Time => "time",
            Expr::Name { .. } => "name",
            Expr::Op(op, _) => op.symbol(),
            Expr::Func(f, _) => f.name(),
            Expr::Relational(op, _) => op.symbol(),
            Expr::Logical(op, _) => op.name(),
            Expr::Piecewise(_) => "piecewise",
            Expr::Delay(_) => "delay",
            Expr::Lambda(_) => "lambda",
            Expr::Call { .. } => "call",
            Expr::Empty => "empty",
            Expr::Unknown(_) => "unknown",
        }
    }
}
