//! Expression engine.
//!
//! Parses infix expression text into an immutable AST and evaluates it
//! against a caller-supplied variable lookup. The AST is generic over the
//! symbol type: the model keeps plain names, the compiler rebinds them to
//! storage locations with [`Expr::map_symbols`].
//!
//! ```
//! use lems_runtime::expr::{evaluate, parse};
//!
//! let ast = parse("-v / tau").unwrap();
//! let value = evaluate(&ast, |name| match name {
//!     "v" => Some(-0.06),
//!     "tau" => Some(0.02),
//!     _ => None,
//! })
//! .unwrap();
//! assert!((value - 3.0).abs() < 1e-12);
//! ```

mod parser;
pub(crate) mod token;

use std::convert::Infallible;
use std::fmt;

use crate::error::{EvalError, ParseError};

pub use parser::parse;

/// Binary operators, from loosest to tightest binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Or,
    And,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    /// Logical and relational operators share the lowest level.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or
            | BinaryOp::And
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Eq
            | BinaryOp::Ne => 1,
            BinaryOp::Add | BinaryOp::Sub => 2,
            BinaryOp::Mul | BinaryOp::Div => 3,
            BinaryOp::Pow => 4,
        }
    }

    pub(crate) fn from_dotted(name: &str) -> Option<Self> {
        Some(match name {
            "gt" => BinaryOp::Gt,
            "ge" | "geq" => BinaryOp::Ge,
            "lt" => BinaryOp::Lt,
            "le" | "leq" => BinaryOp::Le,
            "eq" => BinaryOp::Eq,
            "ne" | "neq" => BinaryOp::Ne,
            "and" => BinaryOp::And,
            "or" => BinaryOp::Or,
            _ => return None,
        })
    }

    /// Applies the operator. Comparisons and logic yield 1.0 or 0.0.
    pub fn apply(self, a: f64, b: f64) -> f64 {
        let truth = |cond: bool| if cond { 1.0 } else { 0.0 };
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Lt => truth(a < b),
            BinaryOp::Le => truth(a <= b),
            BinaryOp::Gt => truth(a > b),
            BinaryOp::Ge => truth(a >= b),
            BinaryOp::Eq => truth(a == b),
            BinaryOp::Ne => truth(a != b),
            BinaryOp::And => truth(a != 0.0 && b != 0.0),
            BinaryOp::Or => truth(a != 0.0 || b != 0.0),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => ".or.",
            BinaryOp::And => ".and.",
            BinaryOp::Lt => ".lt.",
            BinaryOp::Le => ".le.",
            BinaryOp::Gt => ".gt.",
            BinaryOp::Ge => ".ge.",
            BinaryOp::Eq => ".eq.",
            BinaryOp::Ne => ".neq.",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }
}

/// Built-in unary functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Ceil,
    Floor,
    Heaviside,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "sinh" => Function::Sinh,
            "cosh" => Function::Cosh,
            "tanh" => Function::Tanh,
            "exp" => Function::Exp,
            "log" | "ln" => Function::Ln,
            "log10" => Function::Log10,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            "ceil" => Function::Ceil,
            "floor" => Function::Floor,
            "H" => Function::Heaviside,
            _ => return None,
        })
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            Function::Sin => x.sin(),
            Function::Cos => x.cos(),
            Function::Tan => x.tan(),
            Function::Sinh => x.sinh(),
            Function::Cosh => x.cosh(),
            Function::Tanh => x.tanh(),
            Function::Exp => x.exp(),
            Function::Ln => x.ln(),
            Function::Log10 => x.log10(),
            Function::Sqrt => x.sqrt(),
            Function::Abs => x.abs(),
            Function::Ceil => x.ceil(),
            Function::Floor => x.floor(),
            Function::Heaviside => {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    0.0
                } else {
                    0.5
                }
            }
        }
    }

    fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Sinh => "sinh",
            Function::Cosh => "cosh",
            Function::Tanh => "tanh",
            Function::Exp => "exp",
            Function::Ln => "log",
            Function::Log10 => "log10",
            Function::Sqrt => "sqrt",
            Function::Abs => "abs",
            Function::Ceil => "ceil",
            Function::Floor => "floor",
            Function::Heaviside => "H",
        }
    }
}

/// Expression tree. `S` is the symbol representation.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr<S = String> {
    Number(f64),
    Symbol(S),
    Operator {
        op: BinaryOp,
        left: Box<Expr<S>>,
        right: Box<Expr<S>>,
    },
    Function {
        func: Function,
        arg: Box<Expr<S>>,
    },
}

impl<S> Expr<S> {
    /// Evaluates the tree, propagating the first lookup failure.
    pub fn try_eval<E, F>(&self, lookup: &mut F) -> Result<f64, E>
    where
        F: FnMut(&S) -> Result<f64, E>,
    {
        Ok(match self {
            Expr::Number(value) => *value,
            Expr::Symbol(symbol) => lookup(symbol)?,
            Expr::Operator { op, left, right } => {
                let a = left.try_eval(lookup)?;
                let b = right.try_eval(lookup)?;
                op.apply(a, b)
            }
            Expr::Function { func, arg } => func.apply(arg.try_eval(lookup)?),
        })
    }

    /// Evaluates the tree with a lookup that cannot fail.
    pub fn eval<F>(&self, mut lookup: F) -> f64
    where
        F: FnMut(&S) -> f64,
    {
        match self.try_eval(&mut |symbol| Ok::<f64, Infallible>(lookup(symbol))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Rebuilds the tree with every symbol mapped through `f`.
    pub fn map_symbols<T, E, F>(&self, f: &mut F) -> Result<Expr<T>, E>
    where
        F: FnMut(&S) -> Result<T, E>,
    {
        Ok(match self {
            Expr::Number(value) => Expr::Number(*value),
            Expr::Symbol(symbol) => Expr::Symbol(f(symbol)?),
            Expr::Operator { op, left, right } => Expr::Operator {
                op: *op,
                left: Box::new(left.map_symbols(f)?),
                right: Box::new(right.map_symbols(f)?),
            },
            Expr::Function { func, arg } => Expr::Function {
                func: *func,
                arg: Box::new(arg.map_symbols(f)?),
            },
        })
    }

    /// Symbols referenced by the tree, in left-to-right order.
    pub fn symbols(&self) -> Vec<&S> {
        let mut out = Vec::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols<'a>(&'a self, out: &mut Vec<&'a S>) {
        match self {
            Expr::Number(_) => {}
            Expr::Symbol(symbol) => out.push(symbol),
            Expr::Operator { left, right, .. } => {
                left.collect_symbols(out);
                right.collect_symbols(out);
            }
            Expr::Function { arg, .. } => arg.collect_symbols(out),
        }
    }
}

impl<S: fmt::Display> fmt::Display for Expr<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(value) => write!(f, "{value}"),
            Expr::Symbol(symbol) => write!(f, "{symbol}"),
            Expr::Operator { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Function { func, arg } => write!(f, "{}({arg})", func.name()),
        }
    }
}

/// Evaluates a name-keyed expression.
///
/// Fails with [`EvalError::UnresolvedSymbol`] for the first name the lookup
/// cannot resolve.
pub fn evaluate<F>(expr: &Expr, lookup: F) -> Result<f64, EvalError>
where
    F: Fn(&str) -> Option<f64>,
{
    expr.try_eval(&mut |name: &String| {
        lookup(name).ok_or_else(|| EvalError::UnresolvedSymbol(name.clone()))
    })
}

/// Expression source text together with its parsed tree.
///
/// Parsing happens at construction so malformed text is reported when the
/// model is declared, not when it is run.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    text: String,
    ast: Expr,
}

impl Expression {
    pub fn parse(text: impl Into<String>) -> Result<Self, ParseError> {
        let text = text.into();
        let ast = parse(&text)?;
        Ok(Self { text, ast })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Distinct names referenced by the expression, in first-use order.
    pub fn symbols(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for symbol in self.ast.symbols() {
            if !seen.contains(&symbol.as_str()) {
                seen.push(symbol);
            }
        }
        seen
    }

    pub fn evaluate<F>(&self, lookup: F) -> Result<f64, EvalError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        evaluate(&self.ast, lookup)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
