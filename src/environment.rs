use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Value;

/// Environment for variable bindings
///
/// A cheap handle onto a symbol table plus its optional parent. Clones share
/// the same table: closures and pending operations that captured an
/// environment all observe later `define`s and `set!`s through it. Closures
/// bound inside the table they capture form reference cycles; those are
/// accepted and reclaimed only with the interpreter session.
#[derive(Clone, Default)]
pub struct Environment(Rc<Scope>);

#[derive(Default)]
struct Scope {
    bindings: RefCell<HashMap<Rc<str>, Value>>,
    parent: Option<Environment>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    /// Allocate a new child table with `self` as parent
    pub fn open(&self) -> Environment {
        Environment(Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(self.clone()),
        }))
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    /// Search this table, then the parent chain
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = self;
        loop {
            if let Some(value) = scope.0.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            scope = scope.parent()?;
        }
    }

    /// Whether a binding exists anywhere in the chain reachable from here
    pub fn is_defined(&self, name: &str) -> bool {
        self.owner_of(name).is_some()
    }

    /// Whether this table itself (ignoring parents) binds `name`
    pub fn is_defined_locally(&self, name: &str) -> bool {
        self.0.bindings.borrow().contains_key(name)
    }

    /// Insert into this table only, overwriting an existing local binding
    pub fn define(&self, name: impl Into<Rc<str>>, value: Value) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Rebind `name` in whichever table of the chain owns it.
    /// Returns `false`, leaving every table untouched, when no table does.
    #[must_use]
    pub fn assign(&self, name: &str, value: Value) -> bool {
        match self.owner_of(name) {
            Some(owner) => {
                if let Some(slot) = owner.0.bindings.borrow_mut().get_mut(name) {
                    *slot = value;
                }
                true
            }
            None => false,
        }
    }

    fn owner_of(&self, name: &str) -> Option<&Environment> {
        let mut scope = self;
        loop {
            if scope.is_defined_locally(name) {
                return Some(scope);
            }
            scope = scope.parent()?;
        }
    }

    /// Number of tables in the chain, this one included
    pub fn depth(&self) -> usize {
        std::iter::successors(Some(self), |scope| scope.parent()).count()
    }

    /// Sorted names bound directly in this table
    pub fn local_names(&self) -> Vec<Rc<str>> {
        let mut names: Vec<_> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(Rc<str>, Value)> {
        let mut bindings = HashMap::new();

        // Start with parent bindings (so they can be overridden by local bindings)
        if let Some(parent) = self.parent() {
            for (name, value) in parent.get_all_bindings() {
                bindings.insert(name, value);
            }
        }

        for (name, value) in self.0.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Empty a table no other handle shares, returning its values and its
    /// parent. Lets [`Value`]'s drop release closure chains without recursing.
    pub(crate) fn detach(mut self) -> Option<(Vec<Value>, Option<Environment>)> {
        let scope = Rc::get_mut(&mut self.0)?;
        let values = scope.bindings.get_mut().drain().map(|(_, value)| value).collect();
        Some((values, scope.parent.take()))
    }
}

// Bindings may hold closures over this very table, so only names are printed
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("names", &self.local_names())
            .field("depth", &self.depth())
            .finish()
    }
}
