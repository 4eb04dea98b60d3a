//! Built-in procedure registry.
//!
//! Native procedures are plain Rust functions with typed parameters, wired
//! through the adapter layer in `evaluator::intooperation` and installed
//! into the base table of every [`Interpreter`](crate::Interpreter).
//!
//! The variadic arithmetic operators (`+`, `-`, `*`, `/`) and other
//! conveniences (`list`, `not`, `map`, ...) are not here: the prelude
//! defines them in the language itself on top of the binary primitives.
//!
//! ## Engine-handled builtins
//!
//! A few builtins need the control stack or the output sink rather than just
//! their arguments (`call-with-current-continuation`,
//! `call-with-escape-continuation`, `apply`, `display`). They are registered
//! here like any other builtin so they can be passed around as values, but
//! their [`OpKind`] tells the engine to apply them itself.
//!
//! ## Errors
//!
//! - **Type checks**: `(car 5)` and `(binary-sum 1 "a")` fail `WrongType`
//! - **Arity checks**: every builtin validates its argument count
//! - **Numbers**: integer overflow promotes to a real; dividing by zero fails
//!   `DivisionByZero` and a real overflowing to infinity fails `NumberOutOfRange`

use std::fmt;
use std::rc::Rc;

use crate::ast::{Number, Value, ValueKind};
use crate::environment::Environment;
use crate::evaluator::intooperation::{
    IntoOperation, IntoVariadicOperation, NumIter, OperationFn, StringIter, ValueIter,
    arity_error, type_error,
};
use crate::{Error, ErrorKind};

/// Accepted argument counts of a builtin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    pub fn validate(self, count: usize) -> Result<(), Error> {
        let ok = match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Any => true,
        };
        if ok { Ok(()) } else { Err(arity_error(self, count)) }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// How a builtin is applied
#[derive(Clone)]
pub enum OpKind {
    /// Native function of the evaluated arguments
    Function(Rc<OperationFn>),
    /// Capture the control stack as a `continuation` and pass it on
    CallWithCurrentContinuation,
    /// Capture the control stack as an `escape` and pass it on
    CallWithEscapeContinuation,
    /// `(apply f a ... list)`
    Apply,
    /// Write the argument to the output sink and return it
    Display,
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::CallWithCurrentContinuation => write!(f, "CallWithCurrentContinuation"),
            OpKind::CallWithEscapeContinuation => write!(f, "CallWithEscapeContinuation"),
            OpKind::Apply => write!(f, "Apply"),
            OpKind::Display => write!(f, "Display"),
        }
    }
}

/// Definition of a built-in procedure
#[derive(Debug, Clone)]
pub struct Builtin {
    /// Name the builtin is bound to in the base table
    pub name: Rc<str>,
    pub op_kind: OpKind,
    /// Accepted argument counts, checked before the builtin runs
    pub arity: Arity,
}

impl Builtin {
    pub fn new(name: &str, arity: Arity, op_kind: OpKind) -> Self {
        Builtin {
            name: name.into(),
            op_kind,
            arity,
        }
    }

    /// The builtin as a first-class procedure value
    pub fn into_value(self) -> Value {
        Value::procedure(crate::ast::Procedure::Builtin(Rc::new(self)))
    }
}

//
// Builtin Function Implementations
//

// A real that overflowed prints as `inf`, which would read back as a symbol
fn finite(result: Number) -> Result<Number, Error> {
    match result {
        Number::Real(x) if !x.is_finite() => {
            Err(Error::about_value(ErrorKind::NumberOutOfRange, Value::number(result)))
        }
        n => Ok(n),
    }
}

fn builtin_sum(a: Number, b: Number) -> Result<Number, Error> {
    finite(a.add(b))
}

fn builtin_subtract(a: Number, b: Number) -> Result<Number, Error> {
    finite(a.sub(b))
}

fn builtin_multiply(a: Number, b: Number) -> Result<Number, Error> {
    finite(a.mul(b))
}

fn builtin_divide(a: Number, b: Number) -> Result<Number, Error> {
    let quotient = a
        .div(b)
        .ok_or_else(|| Error::about_value(ErrorKind::DivisionByZero, Value::number(b)))?;
    finite(quotient)
}

// Chained numeric comparisons: all adjacent pairs must satisfy the operator
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(first: Number, rest: NumIter<'_>) -> bool {
            let mut prev = first;
            for current in rest {
                if !(prev $op current) {
                    return false;
                }
                prev = current;
            }
            true
        }
    };
}

numeric_comparison!(builtin_eq, ==);
numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

fn builtin_car(mut list: ValueIter<'_>) -> Result<Value, Error> {
    match list.next() {
        Some(first) => Ok(first.clone()),
        None => Err(type_error(&Value::list([]), "non-empty list")),
    }
}

fn builtin_cdr(mut list: ValueIter<'_>) -> Result<Value, Error> {
    let Some(_) = list.next() else {
        return Err(type_error(&Value::list([]), "non-empty list"));
    };
    Ok(Value::list(list.cloned()))
}

fn builtin_cons(first: Value, rest: Value) -> Result<Value, Error> {
    match &rest.kind {
        ValueKind::List(tail) => Ok(Value::list(
            std::iter::once(first).chain(tail.iter().cloned()),
        )),
        // No pairs: the second argument must be a list
        _ => Err(type_error(&rest, "list")),
    }
}

fn builtin_null(value: Value) -> bool {
    value.is_nil()
}

fn builtin_equal(first: Value, second: Value) -> bool {
    first == second
}

fn builtin_is_number(value: Value) -> bool {
    matches!(value.kind, ValueKind::Number(_))
}

fn builtin_is_string(value: Value) -> bool {
    matches!(value.kind, ValueKind::String(_))
}

fn builtin_is_symbol(value: Value) -> bool {
    matches!(value.kind, ValueKind::Symbol(_))
}

fn builtin_is_boolean(value: Value) -> bool {
    matches!(value.kind, ValueKind::Bool(_))
}

fn builtin_is_procedure(value: Value) -> bool {
    matches!(value.kind, ValueKind::Procedure(_))
}

fn builtin_string_append(args: StringIter<'_>) -> String {
    args.collect()
}

fn builtin_fixed<Args, F>(f: F) -> OpKind
where
    F: IntoOperation<Args>,
{
    OpKind::Function(<F as IntoOperation<Args>>::into_operation(f))
}

fn builtin_variadic<Args, F>(f: F) -> OpKind
where
    F: IntoVariadicOperation<Args>,
{
    OpKind::Function(<F as IntoVariadicOperation<Args>>::into_variadic_operation(f))
}

/// All built-in procedures, freshly allocated for one interpreter.
///
/// Builtins hold `Rc`s and cannot live in a shared static, so each
/// interpreter builds its own set.
pub(crate) fn get_builtin_ops() -> Vec<Builtin> {
    use Arity::{AtLeast, Exact, Any};

    let comparison = |name: &str, f: fn(Number, NumIter<'_>) -> bool| {
        Builtin::new(name, AtLeast(2), builtin_variadic::<(Number, NumIter<'static>), _>(f))
    };
    let predicate = |name: &str, f: fn(Value) -> bool| {
        Builtin::new(name, Exact(1), builtin_fixed::<(Value,), _>(f))
    };
    let binary = |name: &str, f: fn(Number, Number) -> Result<Number, Error>| {
        Builtin::new(name, Exact(2), builtin_fixed::<(Number, Number), _>(f))
    };

    vec![
        // Arithmetic primitives; the prelude builds the variadic operators on these
        binary("binary-sum", builtin_sum),
        binary("binary-subtract", builtin_subtract),
        binary("binary-multiply", builtin_multiply),
        binary("binary-divide", builtin_divide),
        // Comparison
        comparison("=", builtin_eq),
        comparison("<", builtin_lt),
        comparison(">", builtin_gt),
        comparison("<=", builtin_le),
        comparison(">=", builtin_ge),
        // Lists
        Builtin::new("car", Exact(1), builtin_fixed::<(ValueIter<'static>,), _>(builtin_car)),
        Builtin::new("cdr", Exact(1), builtin_fixed::<(ValueIter<'static>,), _>(builtin_cdr)),
        Builtin::new("cons", Exact(2), builtin_fixed::<(Value, Value), _>(builtin_cons)),
        predicate("null?", builtin_null),
        // Equality and type predicates
        Builtin::new("equal?", Exact(2), builtin_fixed::<(Value, Value), _>(builtin_equal)),
        predicate("number?", builtin_is_number),
        predicate("string?", builtin_is_string),
        predicate("symbol?", builtin_is_symbol),
        predicate("boolean?", builtin_is_boolean),
        predicate("procedure?", builtin_is_procedure),
        // Strings
        Builtin::new(
            "string-append",
            Any,
            builtin_variadic::<(StringIter<'static>,), _>(builtin_string_append),
        ),
        // Applied by the engine
        Builtin::new("display", Exact(1), OpKind::Display),
        Builtin::new("apply", AtLeast(2), OpKind::Apply),
        Builtin::new(
            "call-with-current-continuation",
            Exact(1),
            OpKind::CallWithCurrentContinuation,
        ),
        Builtin::new(
            "call-with-escape-continuation",
            Exact(1),
            OpKind::CallWithEscapeContinuation,
        ),
    ]
}

/// Bind every builtin in `env`
pub(crate) fn install(env: &Environment) {
    for builtin in get_builtin_ops() {
        env.define(builtin.name.clone(), builtin.into_value());
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> Result<Value, ErrorKind> {
        Ok(val(value))
    }

    /// Invoke a builtin through the registry with the canonical erased
    /// signature, checking arity the way the engine does.
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        let op = get_builtin_ops()
            .into_iter()
            .find(|op| &*op.name == name)
            .unwrap();
        op.arity.validate(args.len())?;
        match &op.op_kind {
            OpKind::Function(func) => func(args.to_vec()),
            other => panic!("expected native builtin in tests, got {other:?}: {name}"),
        }
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    fn test_builtin_ops_registry() {
        let ops = get_builtin_ops();
        let find = |name: &str| ops.iter().find(|op| &*op.name == name);

        assert_eq!(find("binary-sum").unwrap().arity, Arity::Exact(2));
        assert_eq!(find("string-append").unwrap().arity, Arity::Any);
        assert!(matches!(find("car").unwrap().op_kind, OpKind::Function(_)));
        assert!(matches!(find("display").unwrap().op_kind, OpKind::Display));
        assert!(matches!(find("apply").unwrap().op_kind, OpKind::Apply));
        assert!(matches!(
            find("call-with-current-continuation").unwrap().op_kind,
            OpKind::CallWithCurrentContinuation
        ));

        // Variadic arithmetic lives in the prelude, not here
        assert!(find("+").is_none());
        assert!(find("list").is_none());

        let env = Environment::new();
        install(&env);
        assert_eq!(env.local_names().len(), ops.len());
        assert_eq!(env.lookup("car").unwrap().to_string(), "<builtin car>");
    }

    #[test]
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Result<Value, ErrorKind>);
        use ErrorKind::*;

        let int_list = val([1, 2, 3]);
        let mixed = val([val(1), val("hello"), val(true), nil()]);

        let test_cases: Vec<TestCase> = vec![
            // ===== ARITHMETIC =====
            test!("binary-sum", &[val(2), val(3)], success(5)),
            test!("binary-sum", &[val(-5), val(10)], success(5)),
            test!("binary-sum", &[val(1), val(0.5)], success(1.5)),
            test!("binary-sum", &[val(i64::MAX), val(1)], success(i64::MAX as f64 + 1.0)),
            test!("binary-sum", &[val(1), val("a")], Err(WrongType)),
            test!("binary-sum", &[val(1)], Err(WrongArgumentCount)),
            test!("binary-subtract", &[val(0), val(5)], success(-5)),
            test!("binary-subtract", &[val(10), val(3)], success(7)),
            test!("binary-multiply", &[val(6), val(7)], success(42)),
            test!("binary-multiply", &[val(2), nil()], Err(WrongType)),
            test!("binary-divide", &[val(4), val(2)], success(2)),
            test!("binary-divide", &[val(1), val(4)], success(0.25)),
            test!("binary-divide", &[val(7), val(2)], success(3.5)),
            test!("binary-divide", &[val(1), val(0)], Err(DivisionByZero)),
            test!("binary-divide", &[val(1), val(0.0)], Err(DivisionByZero)),
            test!("binary-multiply", &[val(1e300), val(1e300)], Err(NumberOutOfRange)),
            test!("binary-sum", &[val(f64::MAX), val(f64::MAX)], Err(NumberOutOfRange)),
            test!("binary-subtract", &[val(-f64::MAX), val(f64::MAX)], Err(NumberOutOfRange)),
            test!("binary-divide", &[val(1e300), val(1e-300)], Err(NumberOutOfRange)),
            test!("binary-multiply", &[val(1e200), val(1e-200)], success(1e200 * 1e-200)),
            // ===== COMPARISON =====
            test!(">", &[val(7), val(3)], success(true)),
            test!(">", &[val(4), val(4)], success(false)),
            test!(">", &[val(9), val(6), val(2)], success(true)),
            test!(">", &[val(9), val(6), val(7)], success(false)),
            test!(">", &[val(5)], Err(WrongArgumentCount)),
            test!(">", &[val("a"), val(3)], Err(WrongType)),
            test!(">=", &[val(7), val(7)], success(true)),
            test!("<", &[val(1), val(2), val(3)], success(true)),
            test!("<", &[val(1), val(3), val(2)], success(false)),
            test!("<=", &[val(3), val(3)], success(true)),
            test!("<=", &[val(8), val(2)], success(false)),
            test!("=", &[val(12), val(12)], success(true)),
            test!("=", &[val(2), val(2.0)], success(true)),
            test!("=", &[val(9), val(9), val(4)], success(false)),
            test!("=", &[val(0), val(false)], Err(WrongType)),
            // ===== LISTS =====
            test!("car", &[val([1, 2, 3])], success(1)),
            test!("car", &[val([val([1]), val(2)])], success([1])),
            test!("car", std::slice::from_ref(&mixed), success(1)),
            test!("car", &[nil()], Err(WrongType)),
            test!("car", &[val(42)], Err(WrongType)),
            test!("car", &[int_list.clone(), int_list.clone()], Err(WrongArgumentCount)),
            test!("cdr", &[val([1, 2, 3])], success([2, 3])),
            test!("cdr", &[val(["only"])], Ok(nil())),
            test!("cdr", &[nil()], Err(WrongType)),
            test!("cdr", &[val(true)], Err(WrongType)),
            test!("cons", &[val(0), val([1, 2])], success([0, 1, 2])),
            test!("cons", &[val("first"), nil()], success(["first"])),
            test!("cons", &[val([1]), val([2])], success([val([1]), val(2)])),
            test!("cons", &[val(1), val(2)], Err(WrongType)),
            test!("cons", &[val(1)], Err(WrongArgumentCount)),
            test!("null?", &[nil()], success(true)),
            test!("null?", &[val(0)], success(false)),
            test!("null?", &[val([1])], success(false)),
            // ===== EQUALITY AND PREDICATES =====
            test!("equal?", &[val(11), val(11)], success(true)),
            test!("equal?", &[val("hello"), val("world")], success(false)),
            test!("equal?", &[val(5), val("5")], success(false)),
            test!("equal?", &[val([1, 2]), val([1, 2])], success(true)),
            test!("equal?", &[sym("a"), sym("a")], success(true)),
            test!("equal?", &[val(5)], Err(WrongArgumentCount)),
            test!("number?", &[val(1.5)], success(true)),
            test!("number?", &[val("1")], success(false)),
            test!("string?", &[val("1")], success(true)),
            test!("symbol?", &[sym("x")], success(true)),
            test!("symbol?", &[val("x")], success(false)),
            test!("boolean?", &[val(false)], success(true)),
            test!("boolean?", &[nil()], success(false)),
            test!("procedure?", &[val(1)], success(false)),
            // ===== STRINGS =====
            test!("string-append", &[], success("")),
            test!("string-append", &[val("hello"), val(" "), val("world")], success("hello world")),
            test!("string-append", &[val("hello"), val(123)], Err(WrongType)),
        ];

        for (test_expr, result, expected) in test_cases {
            match (result, expected) {
                (Ok(actual), Ok(expected_val)) => {
                    assert_eq!(actual, expected_val, "Failed for test case: {test_expr}");
                }
                (Err(err), Err(kind)) => {
                    assert_eq!(err.kind, kind, "Wrong error for test case: {test_expr} ({err})");
                }
                (actual, expected) => panic!(
                    "Unexpected result for test case: {test_expr}\nGot: {actual:?}\nExpected: {expected:?}"
                ),
            }
        }
    }

    #[test]
    fn test_procedure_predicate_on_builtin() {
        let car = get_builtin_ops().into_iter().find(|op| &*op.name == "car").unwrap();
        assert_eq!(call_builtin("procedure?", &[car.into_value()]).unwrap(), val(true));
    }

    #[test]
    fn test_arity_validation() {
        use Arity::*;

        Exact(2).validate(2).unwrap();
        Exact(2).validate(1).unwrap_err();
        Exact(2).validate(3).unwrap_err();

        AtLeast(1).validate(1).unwrap();
        AtLeast(1).validate(2).unwrap();
        AtLeast(1).validate(0).unwrap_err();

        Any.validate(0).unwrap();
        Any.validate(100).unwrap();

        let err = Exact(2).validate(1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::WrongArgumentCount);
        assert_eq!(err.detail.as_deref(), Some("expected 2 argument(s)"));
        assert_eq!(
            AtLeast(2).validate(0).unwrap_err().detail.as_deref(),
            Some("expected at least 2 argument(s)")
        );
    }
}
