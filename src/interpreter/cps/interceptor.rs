use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ast::NodeRef;
use crate::interpreter::cps::env::EnvRef;
use crate::interpreter::cps::value::Value;
use crate::interpreter::cps::RuntimeError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Enter,
    Exit,
}

/// One observer event. `Enter` fires before a node's children are evaluated;
/// `Exit` fires exactly once when its evaluation completes, normally or via
/// an exception packet, carrying the observed value. Events within one
/// evaluation appear in depth-first order, and `script_id` is stable across
/// the whole evaluation of one source.
pub struct Evaluation {
    pub script_id: Rc<str>,
    pub node: NodeRef,
    pub env: EnvRef,
    pub phase: Phase,
    pub value: Option<Value>,
}

impl fmt::Debug for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<{:?} {} #{}",
            self.phase,
            self.node.kind_name(),
            self.script_id
        )?;
        if let Some(value) = &self.value {
            write!(f, " {:?}", value)?;
        }
        write!(f, ">")
    }
}

/// Observer called around every node evaluation. It must not mutate the
/// event; an `Err` is captured and routed onto the error path of the current
/// dispatch, which is also the supported cancellation mechanism.
pub type Interceptor = Rc<dyn Fn(&Evaluation) -> Result<(), RuntimeError>>;

/// Host notification hook for internal interpreter errors (unsupported
/// parameter patterns, malformed AST shapes).
pub type ErrorHook = Rc<dyn Fn(&RuntimeError)>;

static NEXT_SCRIPT_ID: AtomicU64 = AtomicU64::new(1);

/// A fresh script id: a monotonically increasing decimal string.
pub fn next_script_id() -> Rc<str> {
    Rc::from(NEXT_SCRIPT_ID.fetch_add(1, Ordering::Relaxed).to_string())
}

#[derive(Clone)]
pub struct EvaluationConfig {
    pub interceptor: Interceptor,
    pub script_id: Rc<str>,
    pub on_error: Option<ErrorHook>,
    /// When set, assignment to an undeclared identifier is a reference error
    /// instead of creating a binding in the root frame.
    pub strict: bool,
}

impl EvaluationConfig {
    pub fn new() -> EvaluationConfig {
        EvaluationConfig {
            interceptor: Rc::new(|_| Ok(())),
            script_id: next_script_id(),
            on_error: None,
            strict: false,
        }
    }

    pub fn with_interceptor(mut self, interceptor: Interceptor) -> EvaluationConfig {
        self.interceptor = interceptor;
        self
    }

    pub fn with_script_id(mut self, script_id: impl Into<Rc<str>>) -> EvaluationConfig {
        self.script_id = script_id.into();
        self
    }

    pub fn with_on_error(mut self, hook: ErrorHook) -> EvaluationConfig {
        self.on_error = Some(hook);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> EvaluationConfig {
        self.strict = strict;
        self
    }

    /// Reports an internal error to the host hook, if one is installed.
    pub fn report(&self, error: &RuntimeError) {
        if let Some(hook) = &self.on_error {
            hook(error);
        }
    }

    /// Emits one observer event.
    pub fn emit(
        &self,
        node: &NodeRef,
        env: &EnvRef,
        phase: Phase,
        value: Option<Value>,
    ) -> Result<(), RuntimeError> {
        (self.interceptor)(&Evaluation {
            script_id: self.script_id.clone(),
            node: node.clone(),
            env: env.clone(),
            phase,
            value,
        })
    }
}

impl Default for EvaluationConfig {
    fn default() -> EvaluationConfig {
        EvaluationConfig::new()
    }
}

impl fmt::Debug for EvaluationConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<EvaluationConfig #{} strict={}>",
            self.script_id, self.strict
        )
    }
}
