//! Pending operations of the engine.
//!
//! The control stack is a persistent singly linked list of reference-counted
//! frames. Frames are never mutated once pushed: popping only advances a
//! handle, so a captured continuation is nothing more than a cloned
//! [`Stack`] and can be resumed any number of times.

use std::fmt;
use std::rc::Rc;

use crate::ast::Value;
use crate::environment::Environment;

/// Suffix of a shared expression sequence, cheap to clone and advance
#[derive(Clone)]
pub(crate) struct Exprs {
    items: Rc<[Value]>,
    start: usize,
}

impl Exprs {
    /// The elements of `items` from `start` on
    pub(crate) fn new(items: Rc<[Value]>, start: usize) -> Self {
        Exprs { items, start }
    }

    pub(crate) fn as_slice(&self) -> &[Value] {
        self.items.get(self.start..).unwrap_or_default()
    }

    /// First pending expression and the sequence after it
    pub(crate) fn split_first(&self) -> Option<(Value, Exprs)> {
        let first = self.as_slice().first()?.clone();
        Some((first, Exprs::new(self.items.clone(), self.start + 1)))
    }
}

/// What a frame does with the most recent result
#[derive(Clone)]
pub(crate) enum Action {
    /// Evaluate an expression
    Expr(Value),
    /// Bind a symbol in the frame's table to the result
    Define(Value),
    /// Rebind a symbol somewhere in the frame's chain to the result
    Assign(Value),
    /// Evaluate the operands of `form` left to right; `evaluated` starts
    /// with the procedure itself
    Call {
        form: Value,
        evaluated: Vec<Value>,
        pending: Exprs,
    },
    /// The head of `form` has been evaluated; decide how to apply it
    Peek(Value),
    /// Short-circuit conjunction over the untried operands
    And { form: Value, rest: Exprs },
    /// Short-circuit disjunction over the untried operands
    Or { form: Value, rest: Exprs },
    /// Branch on the truthiness of the result
    If {
        form: Value,
        consequent: Value,
        alternative: Option<Value>,
    },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
            for value in values {
                write!(f, " {value}")?;
            }
            Ok(())
        }

        match self {
            Action::Expr(expr) => write!(f, "{expr}"),
            Action::Define(name) => write!(f, "def {name}"),
            Action::Assign(name) => write!(f, "ass {name}"),
            Action::Call {
                evaluated, pending, ..
            } => {
                write!(f, "call")?;
                join(f, evaluated)?;
                write!(f, " ...")?;
                join(f, pending.as_slice())
            }
            Action::Peek(form) => write!(f, "peek {form}"),
            Action::And { rest, .. } => {
                write!(f, "and")?;
                join(f, rest.as_slice())
            }
            Action::Or { rest, .. } => {
                write!(f, "or")?;
                join(f, rest.as_slice())
            }
            Action::If {
                consequent,
                alternative,
                ..
            } => match alternative {
                Some(alternative) => write!(f, "if ... then {consequent} else {alternative}"),
                None => write!(f, "if ... then {consequent}"),
            },
        }
    }
}

/// One pending operation: an action, the table it runs in, and the rest of
/// the stack
pub(crate) struct Frame {
    pub(crate) action: Action,
    pub(crate) env: Environment,
    next: Stack,
}

/// Handle onto the top frame of a control stack; empty means done
#[derive(Clone, Default)]
pub struct Stack(Option<Rc<Frame>>);

impl Stack {
    pub(crate) fn new() -> Self {
        Stack(None)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Push a frame ahead of the current contents
    pub(crate) fn push(&mut self, action: Action, env: Environment) {
        let next = std::mem::take(self);
        *self = Stack(Some(Rc::new(Frame { action, env, next })));
    }

    /// Take the top frame, advancing to the rest of the stack.
    /// Frames still shared with a captured continuation are copied out,
    /// leaving the continuation's view untouched.
    pub(crate) fn pop(&mut self) -> Option<(Action, Environment)> {
        let top = self.0.take()?;
        match Rc::try_unwrap(top) {
            Ok(Frame { action, env, next }) => {
                *self = next;
                Some((action, env))
            }
            Err(shared) => {
                *self = shared.next.clone();
                Some((shared.action.clone(), shared.env.clone()))
            }
        }
    }

    /// Whether both handles point at the same frame
    pub fn ptr_eq(&self, other: &Stack) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Frames from the top down
    pub(crate) fn frames(&self) -> impl Iterator<Item = &Frame> {
        std::iter::successors(self.0.as_deref(), |frame| frame.next.0.as_deref())
    }

    pub fn depth(&self) -> usize {
        self.frames().count()
    }
}

// Unlink iteratively: a long chain dropped recursively would overflow the
// native stack
impl Drop for Stack {
    fn drop(&mut self) {
        let mut next = self.0.take();
        while let Some(frame) = next {
            match Rc::try_unwrap(frame) {
                Ok(mut frame) => next = frame.next.0.take(),
                Err(_) => break,
            }
        }
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.frames().map(|frame| frame.action.to_string()))
            .finish()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    fn expr_text(action: &Action) -> String {
        action.to_string()
    }

    #[test]
    fn test_push_pop_order() {
        let env = Environment::new();
        let mut stack = Stack::new();
        stack.push(Action::Expr(val(1)), env.clone());
        stack.push(Action::Define(sym("x")), env.clone());
        assert_eq!(stack.depth(), 2);

        let (top, _) = stack.pop().unwrap();
        assert_eq!(expr_text(&top), "def x");
        let (next, _) = stack.pop().unwrap();
        assert_eq!(expr_text(&next), "1");
        assert!(stack.pop().is_none());
        assert!(stack.is_empty());
    }

    #[test]
    fn test_captured_stack_survives_pops() {
        let env = Environment::new();
        let mut stack = Stack::new();
        stack.push(Action::Expr(val(1)), env.clone());
        stack.push(Action::Expr(val(2)), env.clone());

        let captured = stack.clone();
        assert!(captured.ptr_eq(&stack));
        stack.pop().unwrap();
        stack.pop().unwrap();
        assert!(stack.is_empty());

        // Resuming the capture replays both frames, twice
        for _ in 0..2 {
            let mut resumed = captured.clone();
            let texts: Vec<_> = std::iter::from_fn(|| resumed.pop())
                .map(|(action, _)| expr_text(&action))
                .collect();
            assert_eq!(texts, vec!["2", "1"]);
        }
    }

    #[test]
    fn test_exprs_split() {
        let items: Rc<[Value]> = vec![sym("a"), sym("b"), sym("c")].into();
        let exprs = Exprs::new(items, 1);
        let (first, rest) = exprs.split_first().unwrap();
        assert_eq!(first, sym("b"));
        assert_eq!(rest.as_slice(), &[sym("c")]);
        let (_, rest) = rest.split_first().unwrap();
        assert!(rest.as_slice().is_empty());
        assert!(rest.split_first().is_none());
        assert!(Exprs::new(Rc::from(Vec::new()), 3).as_slice().is_empty());
    }

    #[test]
    fn test_action_display() {
        let items: Rc<[Value]> = vec![sym("f"), val(1), val(2)].into();
        let call = Action::Call {
            form: val(vec![sym("f"), val(1), val(2)]),
            evaluated: vec![sym("f"), val(1)],
            pending: Exprs::new(items.clone(), 2),
        };
        assert_eq!(call.to_string(), "call f 1 ... 2");
        let and = Action::And {
            form: val(vec![sym("and"), val(1), val(2)]),
            rest: Exprs::new(items, 1),
        };
        assert_eq!(and.to_string(), "and 1 2");
        let branch = Action::If {
            form: val(vec![sym("if"), val(true), val(1)]),
            consequent: val(1),
            alternative: None,
        };
        assert_eq!(branch.to_string(), "if ... then 1");
    }

    #[test]
    fn test_long_chain_drops_iteratively() {
        let env = Environment::new();
        let mut stack = Stack::new();
        for i in 0..500_000 {
            stack.push(Action::Expr(val(i)), env.clone());
        }
        drop(stack);
    }
}
