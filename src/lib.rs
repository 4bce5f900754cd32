//! jsonlisp - a small Lisp whose surface syntax is JSON
//!
//! Every program is a single JSON document. Arrays double as S-expressions,
//! strings double as operation names and bound identifiers, and the remaining
//! JSON scalars map directly onto interpreter values:
//!
//! ```json
//! ["program",
//!     ["set", "x", 40],
//!     ["print", ["+", ["get", "x"], 2]],
//!     ["test", ["=", ["get", "x"], 40]]]
//! ```
//!
//! ## Evaluation model
//!
//! - Only arrays are evaluated. Every other value, including a bare string,
//!   evaluates to itself. Looking a name up is an explicit act (`get`).
//! - The head of an array names a special form. Each special form decides for
//!   itself which of its arguments are evaluated, and in which order.
//! - All persistent state lives in a single [`evaluator::SymbolTable`] owned by
//!   the [`evaluator::Interpreter`] that is passed into every evaluation call.
//! - `lambda` and `macro` are applied by substitution into their body. There are
//!   no closures and no nested scopes.
//!
//! ## Modules
//!
//! - `ast`: the `Value` tagged union, rendering and structural equality
//! - `typecheck`: positional tag checking with the repeat-last policy
//! - `evaluator`: the symbol table, interpreter context and special forms
//! - `builtinops`: the registry mapping form names to their implementations
//! - `json`: conversion between JSON text, `serde_json` trees and `Value`

use std::fmt;

use crate::ast::Tag;

/// Default maximum evaluation depth.
/// Deeply recursive programs fail with an evaluation error instead of
/// exhausting the native stack. Every level costs several native frames, so
/// the limit must stay well inside a 2 MB thread stack.
pub const MAX_EVAL_DEPTH: usize = 64;

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// JSON text could not be decoded
    ParseError(String),
    /// A value had the wrong shape for the operation consuming it
    TypeError(String),
    /// A value's tag did not match the tag an operation expected
    TypeMismatch { found: Tag, expected: Tag },
    EvalError(String),
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>, // Optional expression context
    },
    /// The interpreter's output sink rejected a write
    IoError(String),
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(msg) => write!(f, "ParseError: {msg}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::TypeMismatch { found, expected } => {
                write!(f, "Mismatched types {found} and {expected}")
            }
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
            Error::ArityError {
                expected,
                got,
                expression,
            } => match expression {
                Some(expr) => write!(
                    f,
                    "ArityError: expression {expr}: expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "ArityError: function expected {expected} arguments but got {got}"
                ),
            },
            Error::IoError(msg) => write!(f, "IoError: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod json;
pub mod typecheck;
