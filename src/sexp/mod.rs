//! The search expression language: syntax tree and evaluation results.
//!
//! # Syntax
//!
//! ```text
//! (match-all (and (header-contains "subject" "invoice")
//!                 (not (system-flag "seen"))))
//! ```
//!
//! - `(name arg...)` calls a built-in
//! - `"text"` strings, with `\"` and `\\` escapes
//! - integers with an optional sign
//! - `#t` / `#f` booleans
//! - bare words are symbols and evaluate to their own name
//! - `;` starts a comment that runs to the end of the line

mod parser;

pub use parser::parse;

use std::fmt;

use crate::model::mail::Uid;

/// A node of a parsed search expression. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Bool(bool),
    Int(i64),
    String(String),
    Symbol(String),
    /// `(name args...)`
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    /// Build a call node.
    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.to_string(),
            args,
        }
    }

    /// The literal text of a `String` or `Symbol` node.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Expr::String(s) | Expr::Symbol(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Bool(true) => f.write_str("#t"),
            Expr::Bool(false) => f.write_str("#f"),
            Expr::Int(n) => write!(f, "{n}"),
            Expr::String(s) => {
                f.write_str("\"")?;
                for ch in s.chars() {
                    if ch == '"' || ch == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{ch}")?;
                }
                f.write_str("\"")
            }
            Expr::Symbol(s) => f.write_str(s),
            Expr::Call { name, args } => {
                write!(f, "({name}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// The result of evaluating one expression node.
///
/// Predicates return a scalar when a current message is set and an array of
/// identifiers otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
    /// Matching identifiers; may hold duplicates until reconciled.
    Uids(Vec<Uid>),
}

impl Value {
    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::String(_) => "string",
            Value::Uids(_) => "array",
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Uids(_))
    }
}
