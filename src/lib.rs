//! Purple - a small Scheme-like interpreter
//!
//! This crate reads Scheme-like source text into tagged [`Value`] trees and
//! evaluates them with an explicit control stack rather than native recursion.
//! The engine therefore supports:
//!
//! - proper tail calls: tail-recursive loops run in bounded native stack space,
//! - first-class, re-entrant continuations via `call/cc`,
//! - lexically scoped closures that share and mutate their environments.
//!
//! ```scheme
//! (define (count n) (if (= n 0) "done" (count (- n 1))))
//! (count 100000)                                ; no stack growth
//! (* 3 (call/cc (lambda (k) (k 2))))            ; => 6
//! (let ((x 23)) (set! x 42) x)                  ; => 42
//! ```
//!
//! ## Quick start
//!
//! ```
//! use purple::Interpreter;
//!
//! let mut interp = Interpreter::new();
//! let result = interp.eval_str("((lambda (x) (+ x 1)) 6)").unwrap();
//! assert_eq!(result.map(|v| v.to_string()), Some("7".to_owned()));
//! ```
//!
//! ## Modules
//!
//! - `ast`: the value model (numbers, strings, symbols, lists, procedures, spans)
//! - `environment`: parent-linked symbol tables shared by closures
//! - `reader`: source text to values, with source positions
//! - `evaluator`: the control-stack engine and the [`Interpreter`] driver
//! - `builtinops`: native procedures installed in the base table
//! - `diagnostic`: renders an [`Error`] against the source lines it refers to

use std::fmt;

use crate::ast::{Span, Value};

/// Maximum reader nesting depth. Lists and quotes deeper than this are
/// rejected instead of exhausting the native stack while reading.
pub const MAX_PARSE_DEPTH: usize = 512;

/// The fixed taxonomy of failures. The `Display` form of each kind is the
/// human-readable message shown by the diagnostic renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    #[error("Bad number")]
    BadNumber,
    #[error("Undefined symbol")]
    UndefinedSymbol,
    #[error("Unclosed string")]
    UnclosedString,
    #[error("Unclosed list")]
    UnclosedList,
    #[error("Unexpected closing bracket")]
    UnexpectedClosingBracket,
    #[error("Unsupported feature")]
    Unsupported,
    #[error("Not a procedure")]
    NotProcedure,
    #[error("Not a procedure or syntax")]
    NotProcedureOrSyntax,
    #[error("Symbol is already defined")]
    AlreadyDefined,
    #[error("That can not be defined")]
    Undefinable,
    #[error("Not implemented here")]
    NotImplemented,
    #[error("Malformed special form")]
    MalformedForm,
    #[error("Wrong number of arguments")]
    WrongArgumentCount,
    #[error("Wrong type of argument")]
    WrongType,
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Expression has no value")]
    NoValue,
    #[error("Expression nested too deeply")]
    NestingTooDeep,
    #[error("Evaluation step limit exceeded")]
    StepLimitExceeded,
    #[error("Number out of range")]
    NumberOutOfRange,
}

/// What an [`Error`] points at: a stretch of source text, or a runtime value.
///
/// A value may itself carry a span (it was read from source) or not (it was
/// synthesized, e.g. the result of arithmetic); the renderer handles both.
#[derive(Debug, Clone)]
pub enum Subject {
    Text(Span),
    Value(Value),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Text(span) => write!(f, "{span}"),
            Subject::Value(value) => match &value.span {
                Some(span) => write!(f, "{value} at {span}"),
                None => write!(f, "{value}"),
            },
        }
    }
}

/// Error raised while reading or evaluating. Errors abort the current
/// top-level form only; definitions committed by earlier forms remain.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {subject}{}", .detail.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
pub struct Error {
    pub kind: ErrorKind,
    pub subject: Subject,
    /// Optional extra sentence, e.g. "expected number"
    pub detail: Option<String>,
}

impl Error {
    /// Error about a stretch of source text
    pub fn about_text(kind: ErrorKind, span: Span) -> Self {
        Error {
            kind,
            subject: Subject::Text(span),
            detail: None,
        }
    }

    /// Error about an offending value
    pub fn about_value(kind: ErrorKind, value: Value) -> Self {
        Error {
            kind,
            subject: Subject::Value(value),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Re-target an error whose subject has no source position to `form`,
    /// provided `form` itself was read from source.
    pub(crate) fn or_at(self, form: &Value) -> Self {
        match &self.subject {
            Subject::Value(value) if value.span.is_none() && form.span.is_some() => {
                let detail = match self.detail {
                    Some(detail) => format!("{detail}, got {value}"),
                    None => format!("got {value}"),
                };
                Error {
                    kind: self.kind,
                    subject: Subject::Value(form.clone()),
                    detail: Some(detail),
                }
            }
            _ => self,
        }
    }

    /// The span to highlight, if any
    pub fn span(&self) -> Option<&Span> {
        match &self.subject {
            Subject::Text(span) => Some(span),
            Subject::Value(value) => value.span.as_ref(),
        }
    }
}

pub mod ast;
pub mod builtinops;
pub mod diagnostic;
pub mod environment;
pub mod evaluator;
pub mod reader;

pub use diagnostic::render;
pub use evaluator::{Interpreter, InterpreterConfig};
pub use reader::{ReadConfig, read, read_with_config};
