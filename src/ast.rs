//! This module defines the runtime value model of the interpreter. Every datum,
//! whether read from source or produced by evaluation, is a [`Value`]: a
//! [`ValueKind`] payload plus an optional source [`Span`] used only for
//! diagnostics. Lists are the only compound data structure; there is no
//! separate pair type. Ergonomic helpers such as [`val`], [`sym`] and [`nil`]
//! build values in code and tests, and `From` conversions cover common Rust
//! literals. Equality is structural and ignores spans, so a quoted datum
//! compares equal to the same datum built by hand.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::builtinops::Builtin;
use crate::environment::Environment;
use crate::evaluator::Stack;

/// Integer payload of [`Number::Integer`]
pub(crate) type NumberType = i64;

/// A (column, line) cursor into source text, both zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub column: usize,
    pub line: usize,
}

impl Position {
    pub fn new(column: usize, line: usize) -> Self {
        Position { column, line }
    }
}

/// Source region a value was read from. `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub begin: Position,
    pub end: Position,
    pub file: Option<Rc<str>>,
}

impl Span {
    pub fn new(begin: Position, end: Position) -> Self {
        Span {
            begin,
            end,
            file: None,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{file}:")?;
        }
        write!(f, "{}:{}", self.begin.line + 1, self.begin.column + 1)
    }
}

/// Numeric payload: exact integers, falling back to floats for inexact
/// division and for integer overflow.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Integer(NumberType),
    Real(f64),
}

macro_rules! promoting_arithmetic {
    ($name:ident, $checked:ident, $op:tt) => {
        /// Integer arithmetic, promoting to a real on overflow
        pub fn $name(self, other: Number) -> Number {
            match (self, other) {
                (Number::Integer(a), Number::Integer(b)) => a
                    .$checked(b)
                    .map_or_else(|| Number::Real(a as f64 $op b as f64), Number::Integer),
                _ => Number::Real(self.to_f64() $op other.to_f64()),
            }
        }
    };
}

impl Number {
    pub fn to_f64(self) -> f64 {
        match self {
            Number::Integer(n) => n as f64,
            Number::Real(x) => x,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Integer(n) => n == 0,
            Number::Real(x) => x == 0.0,
        }
    }

    promoting_arithmetic!(add, checked_add, +);
    promoting_arithmetic!(sub, checked_sub, -);
    promoting_arithmetic!(mul, checked_mul, *);

    /// Division, exact when the divisor divides the dividend.
    /// Returns `None` when dividing by zero.
    pub fn div(self, other: Number) -> Option<Number> {
        if other.is_zero() {
            return None;
        }
        Some(match (self, other) {
            (Number::Integer(a), Number::Integer(b))
                if a.checked_rem(b) == Some(0) && a.checked_div(b).is_some() =>
            {
                Number::Integer(a / b)
            }
            _ => Number::Real(self.to_f64() / other.to_f64()),
        })
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a == b,
            _ => self.to_f64() == other.to_f64(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a.partial_cmp(b),
            _ => self.to_f64().partial_cmp(&other.to_f64()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(n) => write!(f, "{n}"),
            Number::Real(x) => write!(f, "{x}"),
        }
    }
}

/// Formal parameter list of a closure. `rest` collects the remaining
/// arguments as a list (the `(a b . rest)` convention).
#[derive(Debug, Clone, PartialEq)]
pub struct Formals {
    pub required: Vec<Rc<str>>,
    pub rest: Option<Rc<str>>,
}

/// User-defined procedure: formals, body sequence and the environment
/// captured at its definition site.
pub struct Closure {
    pub name: Option<Rc<str>>,
    pub formals: Formals,
    pub body: Rc<[Value]>,
    pub env: Environment,
}

/// Callable values
#[derive(Clone)]
pub enum Procedure {
    /// Native procedure from the builtin registry
    Builtin(Rc<Builtin>),
    /// Closure created by `lambda`, `let` or the `define` shorthand
    User(Rc<Closure>),
    /// Saved control stack from `call-with-current-continuation`
    Continuation(Stack),
    /// Saved control stack from `call-with-escape-continuation`
    Escape(Stack),
}

/// Parsed but never expanded `syntax-rules` form
#[derive(Debug, Clone, PartialEq)]
pub struct Syntax {
    pub literals: Vec<Value>,
    pub rules: Vec<Value>,
}

/// Payload of a [`Value`]
#[derive(Clone)]
pub enum ValueKind {
    Number(Number),
    Bool(bool),
    String(Rc<str>),
    Symbol(Rc<str>),
    /// Lists (the empty list represents nil)
    List(Rc<[Value]>),
    Procedure(Procedure),
    Syntax(Rc<Syntax>),
    /// `#!word` pragma, interpreted by the engine
    Shebang(Rc<str>),
}

/// Core value type in the interpreter
///
/// To build values, use the ergonomic helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for empty lists
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub struct Value {
    pub kind: ValueKind,
    /// Where the value was read from; absent for synthesized values
    pub span: Option<Span>,
}

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Value { kind, span: None }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn number(n: impl Into<Number>) -> Self {
        Value::new(ValueKind::Number(n.into()))
    }

    pub fn boolean(b: bool) -> Self {
        Value::new(ValueKind::Bool(b))
    }

    pub fn string(s: impl AsRef<str>) -> Self {
        Value::new(ValueKind::String(s.as_ref().into()))
    }

    pub fn symbol(name: impl AsRef<str>) -> Self {
        Value::new(ValueKind::Symbol(name.as_ref().into()))
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::new(ValueKind::List(items.into_iter().collect()))
    }

    pub fn procedure(procedure: Procedure) -> Self {
        Value::new(ValueKind::Procedure(procedure))
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<[Value]>> {
        match &self.kind {
            ValueKind::List(items) => Some(items),
            _ => None,
        }
    }

    /// Everything is true except `#f`
    pub fn is_truthy(&self) -> bool {
        !matches!(self.kind, ValueKind::Bool(false))
    }

    /// Check if a value represents nil (empty list)
    pub fn is_nil(&self) -> bool {
        matches!(&self.kind, ValueKind::List(items) if items.is_empty())
    }
}

// Runtime lists built with `cons` nest far deeper than the native stack
// allows, so printing, comparing and dropping all walk an explicit worklist.

enum Piece<'a> {
    Value(&'a Value),
    Text(&'static str),
}

impl Value {
    /// Print nested lists as `open elem sep elem ... )`, with `leaf` for
    /// everything else
    fn write_tree(
        &self,
        f: &mut fmt::Formatter<'_>,
        open: &'static str,
        separator: &'static str,
        leaf: fn(&Value, &mut fmt::Formatter<'_>) -> fmt::Result,
    ) -> fmt::Result {
        let mut pending = vec![Piece::Value(self)];
        while let Some(piece) = pending.pop() {
            let value = match piece {
                Piece::Text(text) => {
                    f.write_str(text)?;
                    continue;
                }
                Piece::Value(value) => value,
            };
            let ValueKind::List(items) = &value.kind else {
                leaf(value, f)?;
                continue;
            };
            f.write_str(open)?;
            pending.push(Piece::Text(")"));
            for (i, item) in items.iter().enumerate().rev() {
                pending.push(Piece::Value(item));
                if i > 0 {
                    pending.push(Piece::Text(separator));
                }
            }
        }
        Ok(())
    }
}

fn debug_leaf(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &value.kind {
        ValueKind::Number(n) => write!(f, "Number({n})"),
        ValueKind::Bool(b) => write!(f, "Bool({b})"),
        ValueKind::String(s) => write!(f, "String({s:?})"),
        ValueKind::Symbol(s) => write!(f, "Symbol({s})"),
        _ => display_leaf(value, f),
    }
}

fn display_leaf(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &value.kind {
        ValueKind::Number(n) => write!(f, "{n}"),
        ValueKind::Symbol(s) => write!(f, "{s}"),
        ValueKind::String(s) => {
            write!(f, "\"")?;
            for ch in s.chars() {
                match ch {
                    '"' => write!(f, "\\\"")?,
                    '\\' => write!(f, "\\\\")?,
                    '\n' => write!(f, "\\n")?,
                    '\t' => write!(f, "\\t")?,
                    '\r' => write!(f, "\\r")?,
                    c => write!(f, "{c}")?,
                }
            }
            write!(f, "\"")
        }
        ValueKind::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
        // Lists are expanded by `write_tree`
        ValueKind::List(_) => Ok(()),
        ValueKind::Procedure(procedure) => write!(f, "{procedure}"),
        ValueKind::Syntax(_) => write!(f, "<syntax>"),
        ValueKind::Shebang(word) => write!(f, "#!{word}"),
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, "List(", ", ", debug_leaf)
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
            Procedure::User(closure) => match &closure.name {
                Some(name) => write!(f, "<procedure {name}>"),
                None => write!(f, "<procedure>"),
            },
            Procedure::Continuation(_) => write!(f, "<continuation>"),
            Procedure::Escape(_) => write!(f, "<escape>"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, "(", " ", display_leaf)
    }
}

impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Builtins compare by name, not function pointer
            (Procedure::Builtin(a), Procedure::Builtin(b)) => a.name == b.name,
            (Procedure::User(a), Procedure::User(b)) => Rc::ptr_eq(a, b),
            (Procedure::Continuation(a), Procedure::Continuation(b))
            | (Procedure::Escape(a), Procedure::Escape(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            let same = match (&a.kind, &b.kind) {
                (ValueKind::Number(a), ValueKind::Number(b)) => a == b,
                (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
                (ValueKind::String(a), ValueKind::String(b))
                | (ValueKind::Symbol(a), ValueKind::Symbol(b))
                | (ValueKind::Shebang(a), ValueKind::Shebang(b)) => a == b,
                (ValueKind::List(a), ValueKind::List(b)) => {
                    if a.len() == b.len() && !Rc::ptr_eq(a, b) {
                        pending.extend(a.iter().zip(b.iter()));
                    }
                    a.len() == b.len()
                }
                (ValueKind::Procedure(a), ValueKind::Procedure(b)) => a == b,
                (ValueKind::Syntax(a), ValueKind::Syntax(b)) => Rc::ptr_eq(a, b),
                _ => false, // Different variants are never equal
            };
            if !same {
                return false;
            }
        }
        true
    }
}

// Only uniquely held lists, closures and syntax own anything worth unlinking
fn owns_children(kind: &ValueKind) -> bool {
    match kind {
        ValueKind::List(items) => !items.is_empty() && Rc::strong_count(items) == 1,
        ValueKind::Procedure(Procedure::User(closure)) => Rc::strong_count(closure) == 1,
        ValueKind::Syntax(syntax) => Rc::strong_count(syntax) == 1,
        _ => false,
    }
}

fn take_kind(mut value: Value) -> ValueKind {
    std::mem::replace(&mut value.kind, ValueKind::Bool(false))
}

impl Drop for Value {
    fn drop(&mut self) {
        if !owns_children(&self.kind) {
            return;
        }
        let mut kinds = vec![std::mem::replace(&mut self.kind, ValueKind::Bool(false))];
        let mut scopes: Vec<Environment> = Vec::new();
        loop {
            if let Some(kind) = kinds.pop() {
                match kind {
                    ValueKind::List(mut items) => {
                        if let Some(items) = Rc::get_mut(&mut items) {
                            kinds.extend(items.iter_mut().map(|item| {
                                std::mem::replace(&mut item.kind, ValueKind::Bool(false))
                            }));
                        }
                    }
                    ValueKind::Procedure(Procedure::User(closure)) => {
                        if let Ok(closure) = Rc::try_unwrap(closure) {
                            kinds.push(ValueKind::List(closure.body));
                            scopes.push(closure.env);
                        }
                    }
                    ValueKind::Syntax(syntax) => {
                        if let Ok(syntax) = Rc::try_unwrap(syntax) {
                            kinds.extend(syntax.literals.into_iter().map(take_kind));
                            kinds.extend(syntax.rules.into_iter().map(take_kind));
                        }
                    }
                    _ => {}
                }
            } else if let Some(env) = scopes.pop() {
                if let Some((values, parent)) = env.detach() {
                    kinds.extend(values.into_iter().map(take_kind));
                    scopes.extend(parent);
                }
            } else {
                break;
            }
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::number(n)
    }
}

impl From<f64> for Number {
    fn from(x: f64) -> Self {
        Number::Real(x)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::number(x)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Number {
            fn from(n: $int_type) -> Self {
                Number::Integer(n as NumberType)
            }
        }

        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::number(n)
            }
        }
    };
}

// Generate From implementations for all integer types that fit losslessly
impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into))
    }
}

/// Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::symbol(name)
}

/// Helper function for creating Values - works great in mixed lists!
/// Accepts any type that can be converted to Value
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating empty lists (nil) - follows Lisp/Scheme conventions
pub fn nil() -> Value {
    Value::list([])
}
