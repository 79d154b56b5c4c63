//! ks-model: model specification layer for kinsim.
//!
//! Provides:
//! - Arena expression tree (`Expr`, addressed by `ExprId`)
//! - Variables, equations and events
//! - Incremental model builder with validation
//! - Indexing pass binding names to variables, and the ODE state layout
//! - Infix rendering of expressions and models
//!
//! # Example
//!
//! ```
//! use ks_model::ModelBuilder;
//!
//! let mut b = ModelBuilder::new();
//! let x = b.add_ode_variable("x", 10.0);
//! let xr = b.var(x);
//! let rate = b.neg(xr);
//! b.set_ode(x, rate);
//! let model = b.build().unwrap();
//!
//! assert_eq!(model.num_odes(), 1);
//! assert_eq!(model.display_expr(rate).to_string(), "-x");
//! ```

pub mod builder;
pub mod error;
pub mod expr;
pub mod indexing;
pub mod model;
pub mod print;
pub(crate) mod validate;

pub use builder::{EventDef, ModelBuilder};
pub use error::{ModelError, ModelResult};
pub use expr::{Binding, Constant, Expr, Func, LogicOp, Op, RelOp};
pub use indexing::{StateLayout, TIME_SYMBOLS, is_time_symbol};
pub use model::{Equation, EquationKind, Event, Model, Variable, VariableKind};
pub use print::ExprDisplay;
