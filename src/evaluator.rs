//! The control-stack engine and the [`Interpreter`] that drives it.
//!
//! Evaluation never recurses on the native stack. Each top-level form starts
//! as a single `Expr` frame; the loop pops the top frame, dispatches on its
//! action and pushes zero or more frames ahead of the remainder. A procedure
//! body is pushed ahead of the caller's existing continuation, so calls in
//! tail position run in constant stack space, and `call/cc` only has to keep
//! a handle on the current stack.

use std::io::Write;

use tracing::{debug, info, warn};

use crate::ast::{Procedure, Value, ValueKind};
use crate::builtinops::{self, Arity, Builtin, OpKind};
use crate::environment::Environment;
use crate::reader::{ReadConfig, read_with_config};
use crate::{Error, ErrorKind};

pub mod intooperation;
mod special_forms;
mod stack;

use intooperation::{IntoOperation, IntoVariadicOperation, arity_error};
use special_forms::SpecialForm;
use stack::{Action, Exprs};
pub use stack::Stack;

/// Source of the base library, evaluated into the base table at startup
const PRELUDE: &str = include_str!("prelude.scm");

/// Interpreter settings
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// Maximum dispatch steps per top-level form; `None` is unbounded
    pub step_limit: Option<u64>,
    /// Start the session with the `#!debug` trace on
    pub trace: bool,
}

/// An interpreter session: the base table of builtins and prelude
/// definitions, the user scope opened beneath it, and the output sink used
/// by `display` and the debug trace.
///
/// Definitions persist across calls to [`Interpreter::eval`]; an error
/// aborts only the form being evaluated.
pub struct Interpreter {
    base: Environment,
    global: Environment,
    config: InterpreterConfig,
    trace: bool,
    output: Box<dyn Write>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        let base = Environment::new();
        builtinops::install(&base);

        let mut interp = Interpreter {
            base: base.clone(),
            global: base.clone(),
            trace: false,
            config,
            output: Box::new(std::io::stdout()),
        };

        let prelude_config = ReadConfig {
            file: Some("prelude.scm".into()),
            ..ReadConfig::default()
        };
        // The prelude is embedded source; failing to load it is a defect in
        // this crate, never a user error. It also runs outside the step budget.
        let prelude = read_with_config(PRELUDE, &prelude_config).expect("prelude must read");
        for form in &prelude {
            interp.run(form, &base, None).expect("prelude must evaluate");
        }
        info!(bindings = base.local_names().len(), "prelude loaded");

        interp.global = base.open();
        interp.trace = interp.config.trace;
        interp
    }

    /// Redirect `display` and trace output
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    /// The user scope
    pub fn environment(&self) -> &Environment {
        &self.global
    }

    /// The table holding builtins and prelude definitions
    pub fn base_environment(&self) -> &Environment {
        &self.base
    }

    pub fn is_tracing(&self) -> bool {
        self.trace
    }

    /// Evaluate one top-level form. Definitions and the debug pragma
    /// produce no value.
    pub fn eval(&mut self, form: &Value) -> Result<Option<Value>, Error> {
        debug!(%form, "evaluating");
        let global = self.global.clone();
        match self.run(form, &global, self.config.step_limit) {
            Ok(result) => {
                debug!(result = ?result.as_ref().map(ToString::to_string), "evaluated");
                Ok(result)
            }
            Err(err) => {
                debug!(error = %err, "evaluation failed");
                Err(err)
            }
        }
    }

    /// Read and evaluate every form in `text`, returning the last result
    pub fn eval_str(&mut self, text: &str) -> Result<Option<Value>, Error> {
        self.eval_str_with_config(text, &ReadConfig::default())
    }

    /// Like [`Interpreter::eval_str`], positioning spans per `config`
    pub fn eval_str_with_config(
        &mut self,
        text: &str,
        config: &ReadConfig,
    ) -> Result<Option<Value>, Error> {
        let mut last = None;
        for form in read_with_config(text, config)? {
            last = self.eval(&form)?;
        }
        Ok(last)
    }

    /// Register a typed Rust function as a builtin procedure.
    ///
    /// Supported parameter types: `Number`, `bool`, `&str`, `Value`, and the
    /// list iterators `ValueIter<'_>`, `NumIter<'_>`, `StringIter<'_>`.
    /// Return any `T: Into<Value>` or `Result<T, Error>`. The argument count
    /// is checked against the function's signature.
    ///
    /// ```
    /// use purple::Interpreter;
    /// use purple::ast::Number;
    ///
    /// let mut interp = Interpreter::new();
    /// interp.register_builtin_operation::<_, (Number,)>("square", |n: Number| n.mul(n));
    /// let result = interp.eval_str("(square 7)").unwrap();
    /// assert_eq!(result.map(|v| v.to_string()), Some("49".to_owned()));
    /// ```
    pub fn register_builtin_operation<F, Args>(&mut self, name: &str, func: F)
    where
        F: IntoOperation<Args>,
    {
        let op_kind = OpKind::Function(func.into_operation());
        self.base
            .define(name, Builtin::new(name, Arity::Any, op_kind).into_value());
    }

    /// Register a typed Rust function whose last parameter is a rest
    /// iterator, e.g. `fn(NumIter<'_>) -> R` or `fn(&str, StringIter<'_>) -> R`.
    /// `arity` is checked before the function runs, since minimum argument
    /// counts of variadic functions are not derivable from the signature.
    pub fn register_variadic_builtin_operation<F, Args>(&mut self, name: &str, arity: Arity, func: F)
    where
        F: IntoVariadicOperation<Args>,
    {
        let op_kind = OpKind::Function(func.into_variadic_operation());
        self.base
            .define(name, Builtin::new(name, arity, op_kind).into_value());
    }

    fn run(
        &mut self,
        form: &Value,
        env: &Environment,
        step_limit: Option<u64>,
    ) -> Result<Option<Value>, Error> {
        let mut machine = Machine {
            stack: Stack::new(),
            result: None,
            form,
            step_limit,
            trace: &mut self.trace,
            output: &mut *self.output,
        };
        machine.stack.push(Action::Expr(form.clone()), env.clone());
        machine.run()
    }
}

/// Engine state for one top-level form
pub(crate) struct Machine<'a> {
    stack: Stack,
    /// Most recent result; `None` after definitions and before the first value
    result: Option<Value>,
    form: &'a Value,
    step_limit: Option<u64>,
    trace: &'a mut bool,
    output: &'a mut dyn Write,
}

fn no_value(form: &Value) -> Error {
    Error::about_value(ErrorKind::NoValue, form.clone())
}

/// The sole argument of a one-argument application
fn single(args: Vec<Value>, form: &Value) -> Result<Value, Error> {
    let count = args.len();
    <[Value; 1]>::try_from(args)
        .map(|[value]| value)
        .map_err(|_| arity_error(1, count).or_at(form))
}

impl Machine<'_> {
    fn run(&mut self) -> Result<Option<Value>, Error> {
        let mut steps: u64 = 0;
        loop {
            if *self.trace && !self.stack.is_empty() {
                self.print_state();
            }
            let Some((action, env)) = self.stack.pop() else {
                return Ok(self.result.take());
            };

            steps += 1;
            if let Some(limit) = self.step_limit
                && steps > limit
            {
                return Err(Error::about_value(ErrorKind::StepLimitExceeded, self.form.clone())
                    .with_detail(format!("limit is {limit} steps")));
            }

            self.step(action, env)?;
        }
    }

    fn step(&mut self, action: Action, env: Environment) -> Result<(), Error> {
        match action {
            Action::Expr(expr) => self.eval_expr(expr, env),
            Action::Define(target) => {
                let value = self.result.take().ok_or_else(|| no_value(&target))?;
                if let Some(name) = target.as_symbol() {
                    env.define(name, value);
                }
                Ok(())
            }
            Action::Assign(target) => {
                let value = self.result.take().ok_or_else(|| no_value(&target))?;
                match target.as_symbol() {
                    Some(name) if env.assign(name, value) => Ok(()),
                    _ => Err(Error::about_value(ErrorKind::UndefinedSymbol, target)),
                }
            }
            Action::Peek(form) => {
                let head = self.result.as_ref().ok_or_else(|| no_value(&form))?;
                match &head.kind {
                    ValueKind::Procedure(_) => {
                        let Some(items) = form.as_list() else {
                            return Err(Error::about_value(ErrorKind::MalformedForm, form));
                        };
                        let pending = Exprs::new(items.clone(), 1);
                        self.stack.push(
                            Action::Call {
                                form,
                                evaluated: Vec::new(),
                                pending,
                            },
                            env,
                        );
                        Ok(())
                    }
                    ValueKind::Syntax(_) => {
                        Err(Error::about_value(ErrorKind::NotImplemented, head.clone()).or_at(&form))
                    }
                    _ => Err(
                        Error::about_value(ErrorKind::NotProcedureOrSyntax, head.clone()).or_at(&form),
                    ),
                }
            }
            Action::Call {
                form,
                mut evaluated,
                pending,
            } => {
                evaluated.push(self.result.take().ok_or_else(|| no_value(&form))?);
                match pending.split_first() {
                    Some((next, rest)) => {
                        self.stack.push(
                            Action::Call {
                                form,
                                evaluated,
                                pending: rest,
                            },
                            env.clone(),
                        );
                        self.stack.push(Action::Expr(next), env);
                        Ok(())
                    }
                    None => {
                        let mut args = evaluated.into_iter();
                        match args.next() {
                            Some(procedure) => self.apply(&form, procedure, args.collect()),
                            None => Err(no_value(&form)),
                        }
                    }
                }
            }
            Action::If {
                form,
                consequent,
                alternative,
            } => {
                let test = self.result.take().ok_or_else(|| no_value(&form))?;
                let branch = if test.is_truthy() { Some(consequent) } else { alternative };
                if let Some(branch) = branch {
                    self.stack.push(Action::Expr(branch), env);
                }
                Ok(())
            }
            Action::And { form, rest } => {
                let value = self.result.take().ok_or_else(|| no_value(&form))?;
                if !value.is_truthy() {
                    self.result = Some(value);
                } else if let Some((next, rest)) = rest.split_first() {
                    self.stack.push(Action::And { form, rest }, env.clone());
                    self.stack.push(Action::Expr(next), env);
                } else {
                    self.result = Some(Value::boolean(true));
                }
                Ok(())
            }
            Action::Or { form, rest } => {
                let value = self.result.take().ok_or_else(|| no_value(&form))?;
                if value.is_truthy() {
                    self.result = Some(value);
                } else if let Some((next, rest)) = rest.split_first() {
                    self.stack.push(Action::Or { form, rest }, env.clone());
                    self.stack.push(Action::Expr(next), env);
                } else {
                    self.result = Some(Value::boolean(false));
                }
                Ok(())
            }
        }
    }

    fn eval_expr(&mut self, expr: Value, env: Environment) -> Result<(), Error> {
        match &expr.kind {
            ValueKind::Number(_)
            | ValueKind::String(_)
            | ValueKind::Bool(_)
            | ValueKind::Procedure(_)
            | ValueKind::Syntax(_) => {
                self.result = Some(expr);
                Ok(())
            }
            ValueKind::Symbol(name) => match env.lookup(name) {
                Some(value) => {
                    self.result = Some(value);
                    Ok(())
                }
                None => Err(Error::about_value(ErrorKind::UndefinedSymbol, expr)),
            },
            ValueKind::Shebang(word) => {
                match &**word {
                    "debug" => *self.trace = true,
                    "nodebug" => *self.trace = false,
                    _ => return Err(Error::about_value(ErrorKind::Unsupported, expr)),
                }
                self.result = None;
                Ok(())
            }
            ValueKind::List(items) => {
                let Some(head) = items.first() else {
                    return Err(Error::about_value(ErrorKind::MalformedForm, expr)
                        .with_detail("empty combination"));
                };
                if let Some(name) = head.as_symbol()
                    && let Some(kind) = SpecialForm::from_name(name)
                {
                    return self.special_form(kind, &expr, items, &env);
                }
                let head = head.clone();
                self.stack.push(Action::Peek(expr), env.clone());
                self.stack.push(Action::Expr(head), env);
                Ok(())
            }
        }
    }

    /// Apply `procedure` to evaluated `args`. The result is either set
    /// directly or left to frames pushed onto the stack.
    fn apply(&mut self, form: &Value, mut procedure: Value, mut args: Vec<Value>) -> Result<(), Error> {
        loop {
            let ValueKind::Procedure(callee) = &procedure.kind else {
                return Err(Error::about_value(ErrorKind::NotProcedure, procedure).or_at(form));
            };
            let callee = callee.clone();

            match callee {
                Procedure::Builtin(builtin) => {
                    builtin.arity.validate(args.len()).map_err(|e| e.or_at(form))?;
                    match &builtin.op_kind {
                        OpKind::Function(func) => {
                            self.result = Some(func(args).map_err(|e| e.or_at(form))?);
                            return Ok(());
                        }
                        OpKind::CallWithCurrentContinuation => {
                            procedure = single(args, form)?;
                            args = vec![Value::procedure(Procedure::Continuation(self.stack.clone()))];
                        }
                        OpKind::CallWithEscapeContinuation => {
                            procedure = single(args, form)?;
                            args = vec![Value::procedure(Procedure::Escape(self.stack.clone()))];
                        }
                        OpKind::Apply => {
                            let count = args.len();
                            let mut spread = args.into_iter();
                            let (Some(f), Some(list)) = (spread.next(), spread.next_back()) else {
                                return Err(arity_error("at least 2", count).or_at(form));
                            };
                            let Some(items) = list.as_list() else {
                                return Err(Error::about_value(ErrorKind::WrongType, list)
                                    .with_detail("expected list")
                                    .or_at(form));
                            };
                            procedure = f;
                            args = spread.chain(items.iter().cloned()).collect();
                        }
                        OpKind::Display => {
                            let value = single(args, form)?;
                            self.write_output(&format!("{value}\n"));
                            self.result = Some(value);
                            return Ok(());
                        }
                    }
                }
                Procedure::User(closure) => {
                    let scope = closure.env.open();
                    let formals = &closure.formals;
                    let required = formals.required.len();
                    let arity = if formals.rest.is_some() {
                        Arity::AtLeast(required)
                    } else {
                        Arity::Exact(required)
                    };
                    arity.validate(args.len()).map_err(|e| e.or_at(form))?;

                    let mut args = args.into_iter();
                    for (name, value) in formals.required.iter().zip(args.by_ref()) {
                        scope.define(name.clone(), value);
                    }
                    if let Some(rest) = &formals.rest {
                        scope.define(rest.clone(), Value::list(args));
                    }

                    // Pushed ahead of the caller's continuation: no return frame
                    for expr in closure.body.iter().rev() {
                        self.stack.push(Action::Expr(expr.clone()), scope.clone());
                    }
                    self.result = None;
                    return Ok(());
                }
                Procedure::Continuation(saved) | Procedure::Escape(saved) => {
                    let value = single(args, form)?;
                    self.stack = saved;
                    self.result = Some(value);
                    return Ok(());
                }
            }
        }
    }

    fn write_output(&mut self, text: &str) {
        if let Err(err) = self.output.write_all(text.as_bytes()).and_then(|()| self.output.flush()) {
            warn!(error = %err, "failed to write to output sink");
        }
    }

    /// Dump the engine state: scopes outermost first, the current result,
    /// and the pending frames top first
    fn print_state(&mut self) {
        let Some(top) = self.stack.frames().next() else {
            return;
        };

        let mut scopes: Vec<String> =
            std::iter::successors(Some(&top.env), |scope| scope.parent())
                .map(|scope| {
                    let names = scope.local_names();
                    if names.len() > 4 {
                        names.len().to_string()
                    } else {
                        names.join(",")
                    }
                })
                .collect();
        scopes.reverse();
        let table: String = scopes.iter().map(|scope| format!("|{scope}    ")).collect();

        let result = self.result.as_ref().map(ToString::to_string).unwrap_or_default();
        let frames: Vec<String> = self.stack.frames().map(|frame| frame.action.to_string()).collect();

        let text = format!(
            ";. TABL {table}\n;. RSLT {result}\n;. STCK {}\n",
            frames.join("\n;.      ")
        );
        self.write_output(&text);
    }
}
