// src/kernel/env.rs
//! Hierarchical environments
//!
//! An environment is a mutable name→value table with two independent parent
//! relations:
//!
//! - **lexical**: where a definition textually lives; an owning `Rc` link,
//!   since a child scope never outlives its creator
//! - **dynamic**: who is currently executing; a non-owning `Weak` link, which
//!   keeps the worker⇄environment graph free of reference cycles
//!
//! Both lookups resolve innermost-first. A missing symbol resolves to `None`,
//! never an error: programs intentionally probe optional bindings.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::runtime::client::ClientStub;
use crate::runtime::service::{Operation, Service};
use crate::runtime::task::CallContext;
use crate::runtime::worker::Worker;

/// Binding name for the call context of the running evaluation
pub const CONTEXT_BINDING: &str = "%context";

/// Binding name under which a worker exposes itself in its own environment
pub const WORKER_BINDING: &str = "%worker";

/// A value bound in an environment
#[derive(Clone)]
pub enum Value {
    Number(f64),
    Service(Rc<Service>),
    Operation(Rc<Operation>),
    Client(Rc<ClientStub>),
    Worker(Weak<Worker>),
    Context(Rc<dyn CallContext>),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<Rc<Service>> {
        match self {
            Value::Service(service) => Some(Rc::clone(service)),
            _ => None,
        }
    }

    pub fn as_operation(&self) -> Option<Rc<Operation>> {
        match self {
            Value::Operation(operation) => Some(Rc::clone(operation)),
            _ => None,
        }
    }

    pub fn as_context(&self) -> Option<Rc<dyn CallContext>> {
        match self {
            Value::Context(context) => Some(Rc::clone(context)),
            _ => None,
        }
    }

    pub fn as_worker(&self) -> Option<Rc<Worker>> {
        match self {
            Value::Worker(worker) => worker.upgrade(),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Service(s) => write!(f, "Service({})", s.name()),
            Value::Operation(o) => write!(f, "Operation({})", o.name()),
            Value::Client(c) => write!(f, "Client({})", c.name()),
            Value::Worker(_) => write!(f, "Worker"),
            Value::Context(_) => write!(f, "Context"),
        }
    }
}

/// One scope in the environment hierarchy
pub struct Env {
    bindings: RefCell<HashMap<String, Value>>,
    lexical: Option<Rc<Env>>,
    dynamic: RefCell<Option<Weak<Env>>>,
}

impl Env {
    /// Create a root environment with no parents
    pub fn root() -> Rc<Self> {
        Rc::new(Self {
            bindings: RefCell::new(HashMap::new()),
            lexical: None,
            dynamic: RefCell::new(None),
        })
    }

    /// Create a child scope lexically parented on `parent`
    pub fn child(parent: &Rc<Env>) -> Rc<Self> {
        Rc::new(Self {
            bindings: RefCell::new(HashMap::new()),
            lexical: Some(Rc::clone(parent)),
            dynamic: RefCell::new(None),
        })
    }

    /// Rebind the dynamic parent
    ///
    /// Done once when an operation invocation starts, and again each time a
    /// paused task resumes on a (possibly different) worker.
    pub fn set_dynamic_parent(&self, parent: &Rc<Env>) {
        *self.dynamic.borrow_mut() = Some(Rc::downgrade(parent));
    }

    /// Bind `name` in this scope, shadowing outer bindings
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Innermost-first lookup along the lexical chain
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.bindings.borrow().get(name) {
            return Some(value.clone());
        }
        self.lexical.as_ref().and_then(|parent| parent.lookup(name))
    }

    /// Innermost-first lookup along the dynamic chain
    pub fn lookup_dynamic(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.bindings.borrow().get(name) {
            return Some(value.clone());
        }
        self.dynamic
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .and_then(|parent| parent.lookup_dynamic(name))
    }

    /// The call context of the evaluation running in this scope, if any
    pub fn call_context(&self) -> Option<Rc<dyn CallContext>> {
        self.lookup_dynamic(CONTEXT_BINDING)
            .and_then(|value| value.as_context())
    }

    /// The worker executing in this scope, if any; client emissions run
    /// without one
    pub fn executing_worker(&self) -> Option<Rc<Worker>> {
        self.lookup_dynamic(WORKER_BINDING)
            .and_then(|value| value.as_worker())
    }
}

// Manual Debug keeps recursive parents out of the output.
impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("bindings", &self.bindings.borrow().len())
            .field("has_lexical", &self.lexical.is_some())
            .field("has_dynamic", &self.dynamic.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexical_lookup_innermost_first() {
        let root = Env::root();
        root.define("x", Value::Number(1.0));
        let child = Env::child(&root);
        assert_eq!(child.lookup("x").unwrap().as_number(), Some(1.0));

        child.define("x", Value::Number(2.0));
        assert_eq!(child.lookup("x").unwrap().as_number(), Some(2.0));
        // Shadowing never leaks outward
        assert_eq!(root.lookup("x").unwrap().as_number(), Some(1.0));
    }

    #[test]
    fn test_missing_symbol_is_absent_not_error() {
        let root = Env::root();
        assert!(root.lookup("nope").is_none());
        assert!(root.lookup_dynamic("nope").is_none());
    }

    #[test]
    fn test_dynamic_chain_independent_of_lexical() {
        let lexical_root = Env::root();
        lexical_root.define("lex", Value::Number(1.0));

        let dynamic_anchor = Env::root();
        dynamic_anchor.define("dyn", Value::Number(2.0));

        let scope = Env::child(&lexical_root);
        scope.set_dynamic_parent(&dynamic_anchor);

        // Lexical lookup ignores the dynamic parent
        assert!(scope.lookup("dyn").is_none());
        assert_eq!(scope.lookup("lex").unwrap().as_number(), Some(1.0));

        // Dynamic lookup ignores the lexical parent
        assert!(scope.lookup_dynamic("lex").is_none());
        assert_eq!(scope.lookup_dynamic("dyn").unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn test_dynamic_parent_is_non_owning() {
        let scope = Env::root();
        {
            let anchor = Env::root();
            anchor.define("gone", Value::Number(3.0));
            scope.set_dynamic_parent(&anchor);
            assert!(scope.lookup_dynamic("gone").is_some());
        }
        // Anchor dropped; the weak link silently resolves to absent
        assert!(scope.lookup_dynamic("gone").is_none());
    }

    #[test]
    fn test_dynamic_parent_rebinding() {
        let scope = Env::root();
        let first = Env::root();
        first.define("who", Value::Number(1.0));
        let second = Env::root();
        second.define("who", Value::Number(2.0));

        scope.set_dynamic_parent(&first);
        assert_eq!(scope.lookup_dynamic("who").unwrap().as_number(), Some(1.0));
        scope.set_dynamic_parent(&second);
        assert_eq!(scope.lookup_dynamic("who").unwrap().as_number(), Some(2.0));
    }
}
