//! Infix rendering of expressions and models.

use std::fmt;

use ks_core::ExprId;

use crate::expr::{Expr, Op};
use crate::model::{EquationKind, Model};

/// Borrowing adapter that renders one expression in infix form.
pub struct ExprDisplay<'a> {
    model: &'a Model,
    root: ExprId,
}

impl Model {
    pub fn display_expr(&self, root: ExprId) -> ExprDisplay<'_> {
        ExprDisplay { model: self, root }
    }
}

/// Binding strength; higher binds tighter.
fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Relational(..) => 1,
        Expr::Op(Op::Plus, c) if c.len() > 1 => 2,
        Expr::Op(Op::Minus, c) if c.len() > 1 => 2,
        Expr::Op(Op::Times, c) if c.len() > 1 => 3,
        Expr::Op(Op::Divide, _) => 3,
        Expr::Op(Op::Minus, _) => 4,
        Expr::Op(Op::Power, _) => 5,
        _ => 6,
    }
}

impl ExprDisplay<'_> {
    fn write_node(&self, f: &mut fmt::Formatter<'_>, id: ExprId) -> fmt::Result {
        let expr = self.model.expr(id);
        match expr {
            Expr::Number(v) => write!(f, "{}", v),
            Expr::Constant(c) => f.write_str(c.symbol()),
            Expr::Time => f.write_str("time"),
            Expr::Name { name, .. } => f.write_str(name),
            Expr::Op(Op::Plus, c) if c.is_empty() => f.write_str("0"),
            Expr::Op(Op::Times, c) if c.is_empty() => f.write_str("1"),
            Expr::Op(Op::Minus, c) if c.len() == 1 => {
                f.write_str("-")?;
                self.write_operand(f, c[0], precedence(expr), true)
            }
            Expr::Op(op, c) => {
                let prec = precedence(expr);
                for (i, &child) in c.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", op.symbol())?;
                    }
                    // Right operands of non-associative operators need parens
                    // at equal precedence.
                    let strict = i > 0 && matches!(op, Op::Minus | Op::Divide | Op::Power);
                    self.write_operand(f, child, prec, strict)?;
                }
                Ok(())
            }
            Expr::Relational(op, c) => {
                for (i, &child) in c.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", op.symbol())?;
                    }
                    self.write_operand(f, child, precedence(expr), true)?;
                }
                Ok(())
            }
            Expr::Func(func, c) => self.write_call(f, func.name(), c),
            Expr::Logical(op, c) => self.write_call(f, op.name(), c),
            Expr::Piecewise(c) => self.write_call(f, "piecewise", c),
            Expr::Delay(c) => self.write_call(f, "delay", c),
            Expr::Lambda(c) => self.write_call(f, "lambda", c),
            Expr::Call { name, args } => self.write_call(f, name, args),
            Expr::Empty => f.write_str("<empty>"),
            Expr::Unknown(label) => write!(f, "<unknown {}>", label),
        }
    }

    fn write_operand(
        &self,
        f: &mut fmt::Formatter<'_>,
        id: ExprId,
        parent: u8,
        strict: bool,
    ) -> fmt::Result {
        let child = precedence(self.model.expr(id));
        let wrap = child < parent || (strict && child == parent);
        if wrap {
            f.write_str("(")?;
        }
        self.write_node(f, id)?;
        if wrap {
            f.write_str(")")?;
        }
        Ok(())
    }

    fn write_call(&self, f: &mut fmt::Formatter<'_>, name: &str, args: &[ExprId]) -> fmt::Result {
        write!(f, "{}(", name)?;
        for (i, &arg) in args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            self.write_node(f, arg)?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_node(f, self.root)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for var in &self.variables {
            write!(f, "{:?} {}", var.kind, var.name)?;
            if let Some(v) = var.default_value {
                write!(f, " = {}", v)?;
            }
            writeln!(f)?;
        }
        for eq in &self.equations {
            let name = &self.variable(eq.variable).name;
            let math = self.display_expr(eq.math);
            match eq.kind {
                EquationKind::Ode => writeln!(f, "d{}/dt = {}", name, math)?,
                EquationKind::Assignment => writeln!(f, "{} := {}", name, math)?,
                EquationKind::Algebraic => writeln!(f, "0 = {}", math)?,
                EquationKind::InitAssignment => writeln!(f, "init {} := {}", name, math)?,
                EquationKind::EventAssignment => {}
            }
        }
        for event in &self.events {
            write!(f, "event {}: when {}", event.name, self.display_expr(event.trigger))?;
            if let Some(delay) = event.delay {
                write!(f, " after {}", self.display_expr(delay))?;
            }
            if let Some(priority) = event.priority {
                write!(f, " priority {}", self.display_expr(priority))?;
            }
            f.write_str(" {")?;
            for (i, &eq) in event.assignments.iter().enumerate() {
                let eq = self.equation(eq);
                if i > 0 {
                    f.write_str(";")?;
                }
                write!(
                    f,
                    " {} := {}",
                    self.variable(eq.variable).name,
                    self.display_expr(eq.math)
                )?;
            }
            writeln!(f, " }}")?;
        }
        Ok(())
    }
}
