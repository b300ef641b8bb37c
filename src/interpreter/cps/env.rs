use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::interpreter::cps::procedure::global_bindings;
use crate::interpreter::cps::value::Value;

pub type EnvRef = Rc<RefCell<Env>>;

/// One lexical scope frame. Frames are shared by reference: closures and
/// pending continuations pin their enclosing chain, and the `parent` edges
/// point strictly toward the root, so plain reference counting collects them.
#[derive(PartialEq)]
pub struct Env {
    pub parent: Option<EnvRef>,
    pub values: HashMap<String, Value>,
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.parent {
            Some(ref parent) => write!(f, "<Env {} {:?}>", self.values.len(), parent.borrow()),
            None => write!(f, "<Env root {}>", self.values.len()),
        }
    }
}

impl Env {
    /// A root frame pre-populated with the global bindings.
    pub fn new_root() -> EnvRef {
        let mut env = Env {
            parent: None,
            values: HashMap::new(),
        };
        for (name, value) in global_bindings() {
            env.define(name.to_string(), value);
        }
        Rc::new(RefCell::new(env))
    }

    /// An empty root frame, for evaluations that must not see the globals.
    pub fn new_bare() -> EnvRef {
        Rc::new(RefCell::new(Env {
            parent: None,
            values: HashMap::new(),
        }))
    }

    pub fn new_child(parent: EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Env {
            parent: Some(parent),
            values: HashMap::new(),
        }))
    }

    /// A child of `parent` holding `values`, for layering caller-provided
    /// bindings over a context's root.
    pub fn with_values(values: HashMap<String, Value>, parent: EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Env {
            parent: Some(parent),
            values,
        }))
    }

    /// Binds in the current frame, shadowing any outer binding. Re-binding a
    /// name replaces it.
    pub fn define(&mut self, key: String, value: Value) {
        self.values.insert(key, value);
    }

    /// Assigns to the nearest frame that binds `key`; reports whether one was
    /// found. Callers decide what an unbound assignment means (create at the
    /// root, or a reference error in strict mode).
    pub fn set(&mut self, key: &str, value: Value) -> bool {
        if self.values.contains_key(key) {
            self.values.insert(key.to_string(), value);
            return true;
        }
        match self.parent {
            Some(ref parent) => parent.borrow_mut().set(key, value),
            None => false,
        }
    }

    /// Walks the frame chain; `None` when the name is unbound everywhere.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.values.get(key) {
            Some(value) => Some(value.clone()),
            None => match self.parent {
                Some(ref parent) => parent.borrow().get(key),
                None => None,
            },
        }
    }

    pub fn get_root(env: EnvRef) -> EnvRef {
        let parent = env.borrow().parent.clone();
        match parent {
            Some(parent) => Env::get_root(parent),
            None => env,
        }
    }
}
