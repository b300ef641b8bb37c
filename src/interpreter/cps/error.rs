use std::fmt;

use crate::ast::NodeRef;
use crate::interpreter::cps::object;
use crate::interpreter::cps::value::Value;

/// Host-internal failure: malformed AST shapes, parser errors, interceptor
/// failures. Not observable by interpreted programs.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub message: String,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RuntimeError: {}", self.message)
    }
}

#[macro_export]
macro_rules! runtime_error {
    ($($arg:tt)*) => (
        return Err($crate::interpreter::cps::RuntimeError { message: format!($($arg)*) })
    )
}

/// The non-local control transfer carried by an [`ExceptionPacket`].
#[derive(Clone, Debug, PartialEq)]
pub enum Control {
    /// A user `throw`, or a host error shaped as a throwable error object.
    Throw(Value),
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
    /// An operation outside the supported subset. Passes through `try`.
    NotImplemented(String),
}

/// The sole mechanism for non-local control transfer. Packets travel on the
/// error path of the trampoline until a continuation claims them: function
/// bodies claim `Return`, loops claim unlabeled `Break`/`Continue`, `try`
/// claims `Throw`. Exit guards stamp the packet with the innermost node it
/// crossed.
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionPacket {
    pub control: Control,
    pub location: Option<NodeRef>,
}

impl ExceptionPacket {
    pub fn throw(value: Value) -> ExceptionPacket {
        ExceptionPacket {
            control: Control::Throw(value),
            location: None,
        }
    }

    pub fn ret(value: Value) -> ExceptionPacket {
        ExceptionPacket {
            control: Control::Return(value),
            location: None,
        }
    }

    pub fn brk(label: Option<String>) -> ExceptionPacket {
        ExceptionPacket {
            control: Control::Break(label),
            location: None,
        }
    }

    pub fn cont(label: Option<String>) -> ExceptionPacket {
        ExceptionPacket {
            control: Control::Continue(label),
            location: None,
        }
    }

    pub fn not_implemented(what: impl Into<String>) -> ExceptionPacket {
        ExceptionPacket {
            control: Control::NotImplemented(what.into()),
            location: None,
        }
    }

    /// A `Throw` packet carrying an error object with `name` and `message`.
    pub fn error(name: &str, message: impl Into<String>) -> ExceptionPacket {
        ExceptionPacket::throw(object::error_object(name, &message.into()))
    }

    pub fn type_error(message: impl Into<String>) -> ExceptionPacket {
        ExceptionPacket::error("TypeError", message)
    }

    pub fn reference_error(message: impl Into<String>) -> ExceptionPacket {
        ExceptionPacket::error("ReferenceError", message)
    }

    pub fn syntax_error(message: impl Into<String>) -> ExceptionPacket {
        ExceptionPacket::error("SyntaxError", message)
    }

    /// Stamps the packet with `node` unless an inner node already claimed it.
    pub fn locate(mut self, node: &NodeRef) -> ExceptionPacket {
        if self.location.is_none() {
            self.location = Some(node.clone());
        }
        self
    }

    /// The value observable by the interceptor when this packet crosses an
    /// exit guard.
    pub fn observed_value(&self) -> Value {
        match &self.control {
            Control::Throw(value) | Control::Return(value) => value.clone(),
            Control::Break(_) | Control::Continue(_) => Value::Undefined,
            Control::NotImplemented(what) => Value::String(what.clone()),
        }
    }

    /// The `name` property of a thrown error object, if the packet carries
    /// one.
    pub fn error_name(&self) -> Option<String> {
        match &self.control {
            Control::Throw(value) => match object::get_property(value, "name") {
                Ok(Value::String(name)) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for ExceptionPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.control {
            Control::Throw(value) => write!(f, "uncaught {:?}", value)?,
            Control::Return(value) => write!(f, "return outside a function: {:?}", value)?,
            Control::Break(None) => write!(f, "break outside a loop")?,
            Control::Break(Some(label)) => write!(f, "unmatched break label: {}", label)?,
            Control::Continue(None) => write!(f, "continue outside a loop")?,
            Control::Continue(Some(label)) => write!(f, "unmatched continue label: {}", label)?,
            Control::NotImplemented(what) => write!(f, "not implemented: {}", what)?,
        }
        if let Some(node) = &self.location {
            write!(f, " (at {}", node.kind_name())?;
            if let Some(loc) = &node.loc {
                write!(f, " {}", loc)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
