use crate::ast::{Number, Value, ValueKind};
use crate::{Error, ErrorKind};
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::rc::Rc;

// NOTE: This module is internal plumbing for the evaluator. It turns
// strongly-typed Rust functions into the erased `OperationFn` stored in
// builtin procedure values. Embedders go through
// `Interpreter::register_builtin_operation` and
// `Interpreter::register_variadic_builtin_operation`.

/// Canonical erased builtin function type.
///
/// Builtins receive ownership of their argument vector, enabling
/// implementations that consume or rearrange arguments if desired.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error>;

/// `WrongArgumentCount` about the number of arguments actually passed
pub(crate) fn arity_error(expected: impl std::fmt::Display, got: usize) -> Error {
    Error::about_value(ErrorKind::WrongArgumentCount, Value::number(got as i64))
        .with_detail(format!("expected {expected} argument(s)"))
}

/// `WrongType` about the offending argument
pub(crate) fn type_error(value: &Value, expected: &str) -> Error {
    Error::about_value(ErrorKind::WrongType, value.clone()).with_detail(format!("expected {expected}"))
}

// =====================================================================
// Fixed parameter conversion
// =====================================================================

/// Turns an argument `Value` into a strongly-typed parameter.
///
/// `Param<'a>` is the type seen by the builtin for the lifetime of the
/// local argument slot, so `&str` and the iterators can borrow from it.
pub trait FromParam {
    type Param<'a>;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error>;
}

impl FromParam for Value {
    type Param<'a> = Value;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        // Move out so builtins can consume owned payloads without cloning
        Ok(std::mem::replace(value, Value::boolean(false)))
    }
}

impl FromParam for Number {
    type Param<'a> = Number;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        match value.kind {
            ValueKind::Number(n) => Ok(n),
            _ => Err(type_error(value, "number")),
        }
    }
}

impl FromParam for bool {
    type Param<'a> = bool;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        match value.kind {
            ValueKind::Bool(b) => Ok(b),
            _ => Err(type_error(value, "boolean")),
        }
    }
}

impl FromParam for &str {
    type Param<'a> = &'a str;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        if let ValueKind::String(s) = &value.kind {
            Ok(s)
        } else {
            Err(type_error(value, "string"))
        }
    }
}

// List arguments are viewed through the typed iterators below
impl<'b, K> FromParam for TypedValueIter<'b, K>
where
    K: ValueElementKind,
{
    type Param<'a> = TypedValueIter<'a, K>;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        if let ValueKind::List(items) = &value.kind {
            TypedValueIter::<K>::new(items)
        } else {
            Err(type_error(value, "list"))
        }
    }
}

// =====================================================================
// Generic typed iterator built on top of the standard slice iterator
// =====================================================================

/// Describes how to view a `Value` slice as a typed iterator.
/// `precheck` validates every element up front so `project` cannot fail.
#[doc(hidden)]
pub trait ValueElementKind {
    type Item<'a>;

    fn precheck(slice: &[Value]) -> Result<(), Error>;
    fn project<'a>(v: &'a Value) -> Self::Item<'a>;
}

/// Iterator over a slice of `Value`s, typed by a [`ValueElementKind`]
#[doc(hidden)]
pub struct TypedValueIter<'a, K: ValueElementKind> {
    inner: std::slice::Iter<'a, Value>,
    _marker: PhantomData<K>,
}

impl<'a, K> TypedValueIter<'a, K>
where
    K: ValueElementKind,
{
    pub(crate) fn new(values: &'a [Value]) -> Result<Self, Error> {
        K::precheck(values)?;
        Ok(TypedValueIter {
            inner: values.iter(),
            _marker: PhantomData,
        })
    }

    /// The elements not yet pulled, as raw values
    pub fn as_slice(&self) -> &'a [Value] {
        self.inner.as_slice()
    }
}

impl<'a, K> Iterator for TypedValueIter<'a, K>
where
    K: ValueElementKind,
{
    type Item = K::Item<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let v = self.inner.next()?;
        Some(K::project(v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K> ExactSizeIterator for TypedValueIter<'_, K> where K: ValueElementKind {}
impl<K> FusedIterator for TypedValueIter<'_, K> where K: ValueElementKind {}

#[doc(hidden)]
pub struct AnyKind;

impl ValueElementKind for AnyKind {
    type Item<'a> = &'a Value;

    fn precheck(_slice: &[Value]) -> Result<(), Error> {
        Ok(())
    }

    fn project<'a>(v: &'a Value) -> Self::Item<'a> {
        v
    }
}

#[doc(hidden)]
pub struct NumberKind;

impl ValueElementKind for NumberKind {
    type Item<'a> = Number;

    fn precheck(slice: &[Value]) -> Result<(), Error> {
        match slice.iter().find(|v| !matches!(v.kind, ValueKind::Number(_))) {
            Some(bad) => Err(type_error(bad, "number")),
            None => Ok(()),
        }
    }

    fn project<'a>(v: &'a Value) -> Self::Item<'a> {
        if let ValueKind::Number(n) = v.kind {
            n
        } else {
            debug_assert!(false, "NumberKind::project saw non-number after precheck");
            unreachable!("NumberKind invariant violated")
        }
    }
}

#[doc(hidden)]
pub struct StringKind;

impl ValueElementKind for StringKind {
    type Item<'a> = &'a str;

    fn precheck(slice: &[Value]) -> Result<(), Error> {
        match slice.iter().find(|v| !matches!(v.kind, ValueKind::String(_))) {
            Some(bad) => Err(type_error(bad, "string")),
            None => Ok(()),
        }
    }

    fn project<'a>(v: &'a Value) -> Self::Item<'a> {
        if let ValueKind::String(s) = &v.kind {
            s
        } else {
            debug_assert!(false, "StringKind::project saw non-string after precheck");
            unreachable!("StringKind invariant violated")
        }
    }
}

/// Borrowed iterator over raw argument values
pub type ValueIter<'a> = TypedValueIter<'a, AnyKind>;

/// Borrowed iterator over numeric arguments; non-numbers are rejected up front
pub type NumIter<'a> = TypedValueIter<'a, NumberKind>;

/// Borrowed iterator over string arguments; non-strings are rejected up front
pub type StringIter<'a> = TypedValueIter<'a, StringKind>;

// =====================================================================
// Rest-parameter support for variadic operations
// =====================================================================

/// Builds a rest parameter from the tail of the argument vector
pub trait FromRest {
    type Param<'a>;

    fn from_rest<'a>(slice: &'a [Value]) -> Result<Self::Param<'a>, Error>;
}

impl<K> FromRest for TypedValueIter<'static, K>
where
    K: ValueElementKind,
{
    type Param<'a> = TypedValueIter<'a, K>;

    fn from_rest<'a>(slice: &'a [Value]) -> Result<Self::Param<'a>, Error> {
        TypedValueIter::<K>::new(slice)
    }
}

// =====================================================================
// Return-type adaptation for builtin functions
// =====================================================================

/// Normalizes builtin return types to `Result<Value, Error>`
pub trait IntoValueResult {
    fn into_value_result(self) -> Result<Value, Error>;
}

impl<T> IntoValueResult for Result<T, Error>
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<T> IntoValueResult for T
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

/// Converts a strongly-typed Rust function or closure into the erased
/// [`OperationFn`], parameterized by its argument tuple type.
pub trait IntoOperation<Args> {
    fn into_operation(self) -> Rc<OperationFn>;
}

/// Like [`IntoOperation`] for functions whose last parameter is a rest
/// iterator (`ValueIter`, `NumIter` or `StringIter`), optionally after a
/// fixed prefix of [`FromParam`] parameters.
pub trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Rc<OperationFn>;
}

// =====================================================================
// Variadic adapters
// =====================================================================

impl<F, I, R> IntoVariadicOperation<(I,)> for F
where
    I: FromRest,
    F: for<'a> Fn(<I as FromRest>::Param<'a>) -> R + 'static,
    R: IntoValueResult,
{
    fn into_variadic_operation(self) -> Rc<OperationFn> {
        Rc::new(move |args: Vec<Value>| {
            let rest_param: <I as FromRest>::Param<'_> = <I as FromRest>::from_rest(&args[..])?;
            let result: R = (self)(rest_param);
            result.into_value_result()
        })
    }
}

macro_rules! impl_into_variadic_operation_for_prefix_and_rest {
    ($prefix:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, I, R, $( $A ),+> IntoVariadicOperation<( $( $A, )+ I, )> for F
        where
            I: FromRest,
            $( $A: FromParam, )+
            F: for<'a> Fn(
                    $( <$A as FromParam>::Param<'a> ),+,
                    <I as FromRest>::Param<'a>,
                ) -> R
                + 'static,
            R: IntoValueResult,
        {
            fn into_variadic_operation(self) -> Rc<OperationFn> {
                Rc::new(move |mut args: Vec<Value>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+, ref mut rest @ .. ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let rest_param: <I as FromRest>::Param<'_> =
                                <I as FromRest>::from_rest(&*rest)?;

                            let result: R = (self)( $( $p ),+, rest_param );
                            result.into_value_result()
                        }
                        _ => Err(arity_error(format!("at least {}", $prefix), len)),
                    }
                })
            }
        }
    };
}

impl_into_variadic_operation_for_prefix_and_rest!(1, v0, p0: A1);
impl_into_variadic_operation_for_prefix_and_rest!(2, v0, p0: A1, v1, p1: A2);
impl_into_variadic_operation_for_prefix_and_rest!(3, v0, p0: A1, v1, p1: A2, v2, p2: A3);

// =====================================================================
// Fixed-arity adapters
// =====================================================================

/// Implements `IntoOperation` for one arity: checks the argument count,
/// then destructures the owned `Vec<Value>` into local slots so
/// `FromParam` can borrow from or consume each argument.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: for<'a> Fn( $( <$A as FromParam>::Param<'a> ),+ ) -> R + 'static,
            $( $A: FromParam, )+
            R: IntoValueResult,
        {
            fn into_operation(self) -> Rc<OperationFn> {
                Rc::new(move |mut args: Vec<Value>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+ ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let result: R = (self)( $( $p ),+ );
                            result.into_value_result()
                        }
                        _ => Err(arity_error($arity, len)),
                    }
                })
            }
        }
    };
}

impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + 'static,
    R: IntoValueResult,
{
    fn into_operation(self) -> Rc<OperationFn> {
        Rc::new(move |args: Vec<Value>| {
            if !args.is_empty() {
                return Err(arity_error(0, args.len()));
            }

            let result: R = (self)();
            result.into_value_result()
        })
    }
}

impl_into_operation_for_arity!(1, v0, p0: A1);
impl_into_operation_for_arity!(2, v0, p0: A1, v1, p1: A2);
impl_into_operation_for_arity!(3, v0, p0: A1, v1, p1: A2, v2, p2: A3);
impl_into_operation_for_arity!(4, v0, p0: A1, v1, p1: A2, v2, p2: A3, v3, p3: A4);
