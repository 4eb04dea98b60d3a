//! Special forms: list-headed constructs whose operands are not evaluated
//! as procedure arguments. Each handler either produces a result directly
//! or pushes the frames that will.

use std::rc::Rc;

use super::Machine;
use super::stack::{Action, Exprs};
use crate::ast::{Closure, Formals, Procedure, Syntax, Value, ValueKind};
use crate::environment::Environment;
use crate::{Error, ErrorKind};

/// The closed set of special-form names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpecialForm {
    Define,
    Set,
    Lambda,
    Let,
    Quote,
    If,
    And,
    Or,
    SyntaxRules,
}

impl SpecialForm {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "define" => SpecialForm::Define,
            "set!" => SpecialForm::Set,
            "lambda" => SpecialForm::Lambda,
            "let" => SpecialForm::Let,
            "quote" => SpecialForm::Quote,
            "if" => SpecialForm::If,
            "and" => SpecialForm::And,
            "or" => SpecialForm::Or,
            "syntax-rules" => SpecialForm::SyntaxRules,
            _ => return None,
        })
    }
}

fn malformed(value: &Value) -> Error {
    Error::about_value(ErrorKind::MalformedForm, value.clone())
}

/// Parse a formals list. `.` must be followed by exactly one final symbol,
/// which collects the remaining arguments.
pub(crate) fn parse_formals(items: &[Value], whole: &Value) -> Result<Formals, Error> {
    let mut required = Vec::new();
    let mut iter = items.iter();

    while let Some(item) = iter.next() {
        let Some(name) = item.as_symbol() else {
            return Err(malformed(item).with_detail("formals must be symbols"));
        };
        if name == "." {
            return match (iter.next(), iter.next()) {
                (Some(rest), None) => match rest.as_symbol() {
                    Some(rest) if rest != "." => Ok(Formals {
                        required,
                        rest: Some(rest.into()),
                    }),
                    _ => Err(malformed(rest).with_detail("formals must be symbols")),
                },
                _ => Err(malformed(whole).with_detail("expected one symbol after '.'")),
            };
        }
        required.push(name.into());
    }

    Ok(Formals {
        required,
        rest: None,
    })
}

/// `(lambda (a b) ...)`, `(lambda (a . rest) ...)` or `(lambda args ...)`
fn lambda_formals(params: &Value) -> Result<Formals, Error> {
    match &params.kind {
        ValueKind::List(items) => parse_formals(items, params),
        ValueKind::Symbol(name) => Ok(Formals {
            required: Vec::new(),
            rest: Some(name.clone()),
        }),
        _ => Err(malformed(params).with_detail("expected formals")),
    }
}

fn closure(
    name: Option<Rc<str>>,
    formals: Formals,
    body: &[Value],
    env: &Environment,
    form: &Value,
) -> Result<Value, Error> {
    if body.is_empty() {
        return Err(malformed(form).with_detail("empty body"));
    }
    Ok(Value::procedure(Procedure::User(Rc::new(Closure {
        name,
        formals,
        body: body.into(),
        env: env.clone(),
    }))))
}

impl Machine<'_> {
    pub(super) fn special_form(
        &mut self,
        kind: SpecialForm,
        form: &Value,
        items: &Rc<[Value]>,
        env: &Environment,
    ) -> Result<(), Error> {
        match kind {
            SpecialForm::Define => self.define(form, items, env),
            SpecialForm::Set => self.set(form, items, env),
            SpecialForm::Lambda => {
                let [_, params, body @ ..] = &items[..] else {
                    return Err(malformed(form));
                };
                let formals = lambda_formals(params)?;
                self.result = Some(closure(None, formals, body, env, form)?);
                Ok(())
            }
            SpecialForm::Let => self.let_form(form, items, env),
            SpecialForm::Quote => {
                let [_, quoted] = &items[..] else {
                    return Err(malformed(form));
                };
                self.result = Some(quoted.clone());
                Ok(())
            }
            SpecialForm::If => {
                let (test, consequent, alternative) = match &items[..] {
                    [_, test, consequent] => (test, consequent, None),
                    [_, test, consequent, alternative] => (test, consequent, Some(alternative.clone())),
                    _ => return Err(malformed(form)),
                };
                self.stack.push(
                    Action::If {
                        form: form.clone(),
                        consequent: consequent.clone(),
                        alternative,
                    },
                    env.clone(),
                );
                self.stack.push(Action::Expr(test.clone()), env.clone());
                Ok(())
            }
            SpecialForm::And | SpecialForm::Or => {
                let Some(first) = items.get(1) else {
                    // Both yield #t without operands; (or) => #t is a kept quirk
                    self.result = Some(Value::boolean(true));
                    return Ok(());
                };
                let rest = Exprs::new(items.clone(), 2);
                let action = if kind == SpecialForm::And {
                    Action::And {
                        form: form.clone(),
                        rest,
                    }
                } else {
                    Action::Or {
                        form: form.clone(),
                        rest,
                    }
                };
                self.stack.push(action, env.clone());
                self.stack.push(Action::Expr(first.clone()), env.clone());
                Ok(())
            }
            SpecialForm::SyntaxRules => {
                let Some(literals) = items.get(1).and_then(Value::as_list) else {
                    return Err(malformed(form));
                };
                let syntax = Syntax {
                    literals: literals.to_vec(),
                    rules: items[2..].to_vec(),
                };
                self.result = Some(Value::new(ValueKind::Syntax(Rc::new(syntax))));
                Ok(())
            }
        }
    }

    /// `(define name expr)` or `(define (name . formals) body ...)`
    fn define(&mut self, form: &Value, items: &Rc<[Value]>, env: &Environment) -> Result<(), Error> {
        let Some(target) = items.get(1) else {
            return Err(malformed(form));
        };

        match &target.kind {
            ValueKind::Symbol(name) => {
                let [_, _, expr] = &items[..] else {
                    return Err(malformed(form));
                };
                if env.is_defined_locally(name) {
                    return Err(Error::about_value(ErrorKind::AlreadyDefined, target.clone()));
                }
                self.stack.push(Action::Define(target.clone()), env.clone());
                self.stack.push(Action::Expr(expr.clone()), env.clone());
                Ok(())
            }
            ValueKind::List(signature) => {
                let Some((head, formals)) = signature.split_first() else {
                    return Err(Error::about_value(ErrorKind::Undefinable, target.clone()));
                };
                let Some(name) = head.as_symbol() else {
                    return Err(Error::about_value(ErrorKind::Undefinable, head.clone()));
                };
                if env.is_defined_locally(name) {
                    return Err(Error::about_value(ErrorKind::AlreadyDefined, head.clone()));
                }
                let formals = parse_formals(formals, target)?;
                let procedure = closure(Some(name.into()), formals, &items[2..], env, form)?;

                self.stack.push(Action::Define(head.clone()), env.clone());
                self.result = Some(procedure);
                Ok(())
            }
            _ => Err(Error::about_value(ErrorKind::Undefinable, target.clone())),
        }
    }

    /// `(set! name expr)`: the binding must already exist in the chain
    fn set(&mut self, form: &Value, items: &Rc<[Value]>, env: &Environment) -> Result<(), Error> {
        let [_, target, expr] = &items[..] else {
            return Err(malformed(form));
        };
        let Some(name) = target.as_symbol() else {
            return Err(Error::about_value(ErrorKind::Undefinable, target.clone()));
        };
        if !env.is_defined(name) {
            return Err(Error::about_value(ErrorKind::UndefinedSymbol, target.clone()));
        }
        self.stack.push(Action::Assign(target.clone()), env.clone());
        self.stack.push(Action::Expr(expr.clone()), env.clone());
        Ok(())
    }

    /// `(let ((name expr) ...) body ...)` runs as `((lambda (name ...) body ...) expr ...)`
    fn let_form(&mut self, form: &Value, items: &Rc<[Value]>, env: &Environment) -> Result<(), Error> {
        let [let_symbol, bindings, body @ ..] = &items[..] else {
            return Err(malformed(form));
        };
        if body.is_empty() {
            return Err(malformed(form).with_detail("empty body"));
        }
        let Some(bindings) = bindings.as_list() else {
            return Err(malformed(bindings).with_detail("expected binding list"));
        };

        let mut names = Vec::with_capacity(bindings.len());
        let mut values = Vec::with_capacity(bindings.len());
        for binding in bindings.iter() {
            match binding.as_list().map(|pair| &pair[..]) {
                Some([name, value]) if name.as_symbol().is_some() => {
                    names.push(name.clone());
                    values.push(value.clone());
                }
                _ => return Err(malformed(binding).with_detail("expected (name expr)")),
            }
        }

        let lambda_symbol = Value::symbol("lambda");
        let lambda_symbol = match &let_symbol.span {
            Some(span) => lambda_symbol.with_span(span.clone()),
            None => lambda_symbol,
        };
        let lambda = Value::list(
            [lambda_symbol, Value::list(names)]
                .into_iter()
                .chain(body.iter().cloned()),
        );
        let lambda = match &form.span {
            Some(span) => lambda.with_span(span.clone()),
            None => lambda,
        };

        self.stack.push(
            Action::Call {
                form: form.clone(),
                evaluated: Vec::new(),
                pending: Exprs::new(values.into(), 0),
            },
            env.clone(),
        );
        self.stack.push(Action::Expr(lambda), env.clone());
        Ok(())
    }
}
