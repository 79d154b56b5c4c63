//! Model construction and validation errors.

use ks_core::{EventId, ExprId, VarId};

use crate::model::{EquationKind, VariableKind};

pub type ModelResult<T> = Result<T, ModelError>;

/// Model construction and validation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Two variables share a name.
    DuplicateName { name: String },

    /// A variable id does not belong to this model.
    UnknownVariable { var: VarId },

    /// An expression id does not belong to this model, or points forward.
    InvalidExpr { expr: ExprId, child: ExprId },

    /// An operator has the wrong number of operands.
    Arity {
        expr: ExprId,
        op: &'static str,
        found: usize,
    },

    /// The equation category cannot define this kind of variable.
    KindMismatch {
        name: String,
        kind: VariableKind,
        equation: EquationKind,
    },

    /// A second equation of the same category for one variable.
    DuplicateEquation { name: String, equation: EquationKind },

    /// A variable lacks the equation its kind requires.
    MissingEquation { name: String, equation: EquationKind },

    /// An event assigns to a variable defined by an assignment equation.
    AssignmentTarget { event: EventId, name: String },

    /// The initial time is NaN or infinite.
    NonFiniteInitialTime { value: f64 },
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::DuplicateName { name } => {
                write!(f, "Variable name '{}' is used more than once", name)
            }
            ModelError::UnknownVariable { var } => {
                write!(f, "Variable {} does not exist", var)
            }
            ModelError::InvalidExpr { expr, child } => {
                write!(f, "Expression {} refers to invalid operand {}", expr, child)
            }
            ModelError::Arity { expr, op, found } => {
                write!(f, "Expression {} ('{}') has {} operands", expr, op, found)
            }
            ModelError::KindMismatch {
                name,
                kind,
                equation,
            } => {
                write!(
                    f,
                    "{:?} equation cannot define {:?} variable '{}'",
                    equation, kind, name
                )
            }
            ModelError::DuplicateEquation { name, equation } => {
                write!(f, "Variable '{}' has more than one {:?} equation", name, equation)
            }
            ModelError::MissingEquation { name, equation } => {
                write!(f, "Variable '{}' has no {:?} equation", name, equation)
            }
            ModelError::AssignmentTarget { event, name } => {
                write!(
                    f,
                    "Event {} assigns to '{}', which is defined by an assignment equation",
                    event, name
                )
            }
            ModelError::NonFiniteInitialTime { value } => {
                write!(f, "Initial time must be finite, got {}", value)
            }
        }
    }
}

impl std::error::Error for ModelError {}
