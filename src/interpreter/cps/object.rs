use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::interpreter::cps::procedure::Function;
use crate::interpreter::cps::value::Value;
use crate::interpreter::cps::ExceptionPacket;

/// A host container: plain record or array. Shared by reference, like every
/// other mutable structure in the interpreter.
#[derive(PartialEq, Clone)]
pub enum Obj {
    Record(HashMap<String, Value>),
    Array(Vec<Value>),
}

pub type ObjRef = Rc<RefCell<Obj>>;

pub fn new_record(values: HashMap<String, Value>) -> Value {
    Value::Object(Rc::new(RefCell::new(Obj::Record(values))))
}

pub fn new_array(elements: Vec<Value>) -> Value {
    Value::Object(Rc::new(RefCell::new(Obj::Array(elements))))
}

/// An error value with `name` and `message` properties, the shape thrown for
/// host-level failures.
pub fn error_object(name: &str, message: &str) -> Value {
    let mut values = HashMap::new();
    values.insert("name".to_string(), Value::String(name.to_string()));
    values.insert("message".to_string(), Value::String(message.to_string()));
    new_record(values)
}

pub fn is_array(value: &Value) -> bool {
    match value {
        Value::Object(obj) => matches!(&*obj.borrow(), Obj::Array(_)),
        _ => false,
    }
}

/// Property read. Numeric keys index arrays and strings, `length` reports
/// their size, method names resolve to named natives; anything unbound reads
/// as `undefined`. Reads on `undefined`/`null` are type errors.
pub fn get_property(target: &Value, key: &str) -> Result<Value, ExceptionPacket> {
    match target {
        Value::Object(obj) => match &*obj.borrow() {
            Obj::Record(values) => Ok(values.get(key).cloned().unwrap_or(Value::Undefined)),
            Obj::Array(elements) => {
                if key == "length" {
                    return Ok(Value::Number(elements.len() as f64));
                }
                if let Ok(index) = key.parse::<usize>() {
                    return Ok(elements.get(index).cloned().unwrap_or(Value::Undefined));
                }
                Ok(array_method(key)
                    .map(|name| Value::Function(Function::Native(name)))
                    .unwrap_or(Value::Undefined))
            }
        },
        Value::String(s) => {
            if key == "length" {
                return Ok(Value::Number(s.chars().count() as f64));
            }
            if let Ok(index) = key.parse::<usize>() {
                return Ok(s
                    .chars()
                    .nth(index)
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or(Value::Undefined));
            }
            Ok(string_method(key)
                .map(|name| Value::Function(Function::Native(name)))
                .unwrap_or(Value::Undefined))
        }
        Value::Function(func) => match key {
            "call" => Ok(Value::Function(Function::Native("function.call"))),
            "apply" => Ok(Value::Function(Function::Native("function.apply"))),
            "name" => Ok(func
                .name()
                .map(Value::String)
                .unwrap_or(Value::String(String::new()))),
            _ => Ok(Value::Undefined),
        },
        Value::Undefined | Value::Null => Err(ExceptionPacket::type_error(format!(
            "cannot read property '{}' of {}",
            key,
            target.to_string_value()
        ))),
        _ => Ok(Value::Undefined),
    }
}

/// Property write. Arrays accept numeric indices (padding with `undefined`
/// beyond the end) and `length`; writes on anything but a container are type
/// errors.
pub fn set_property(target: &Value, key: &str, value: Value) -> Result<(), ExceptionPacket> {
    match target {
        Value::Object(obj) => match &mut *obj.borrow_mut() {
            Obj::Record(values) => {
                values.insert(key.to_string(), value);
                Ok(())
            }
            Obj::Array(elements) => {
                if key == "length" {
                    let len = value.to_number().map(|n| n as usize).unwrap_or(0);
                    elements.resize(len, Value::Undefined);
                    return Ok(());
                }
                match key.parse::<usize>() {
                    Ok(index) => {
                        if index >= elements.len() {
                            elements.resize(index + 1, Value::Undefined);
                        }
                        elements[index] = value;
                        Ok(())
                    }
                    Err(_) => Err(ExceptionPacket::type_error(format!(
                        "cannot set property '{}' of an array",
                        key
                    ))),
                }
            }
        },
        _ => Err(ExceptionPacket::type_error(format!(
            "cannot set property '{}' of {}",
            key,
            target.to_string_value()
        ))),
    }
}

pub fn has_property(target: &Value, key: &str) -> Result<bool, ExceptionPacket> {
    match target {
        Value::Object(obj) => match &*obj.borrow() {
            Obj::Record(values) => Ok(values.contains_key(key)),
            Obj::Array(elements) => Ok(key == "length"
                || key
                    .parse::<usize>()
                    .map(|index| index < elements.len())
                    .unwrap_or(false)),
        },
        _ => Err(ExceptionPacket::type_error(format!(
            "cannot use 'in' on {}",
            target.to_string_value()
        ))),
    }
}

/// Key enumeration for `for..in`: record keys (sorted, since records do not
/// track insertion order) and array indices.
pub fn enumerate_keys(target: &Value) -> Result<Vec<String>, ExceptionPacket> {
    match target {
        Value::Object(obj) => match &*obj.borrow() {
            Obj::Record(values) => {
                let mut keys: Vec<String> = values.keys().cloned().collect();
                keys.sort();
                Ok(keys)
            }
            Obj::Array(elements) => Ok((0..elements.len()).map(|i| i.to_string()).collect()),
        },
        Value::Undefined | Value::Null => Ok(Vec::new()),
        _ => Ok(Vec::new()),
    }
}

/// Value iteration for `for..of`: a snapshot of array elements, or the
/// characters of a string. Anything else is not iterable.
pub fn iterate(target: &Value) -> Result<Vec<Value>, ExceptionPacket> {
    match target {
        Value::Object(obj) => match &*obj.borrow() {
            Obj::Array(elements) => Ok(elements.clone()),
            Obj::Record(_) => Err(ExceptionPacket::type_error("object is not iterable")),
        },
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        other => Err(ExceptionPacket::type_error(format!(
            "{} is not iterable",
            other.to_string_value()
        ))),
    }
}

fn array_method(key: &str) -> Option<&'static str> {
    match key {
        "push" => Some("array.push"),
        "pop" => Some("array.pop"),
        "slice" => Some("array.slice"),
        "indexOf" => Some("array.indexOf"),
        "includes" => Some("array.includes"),
        "join" => Some("array.join"),
        "concat" => Some("array.concat"),
        "map" => Some("array.map"),
        "filter" => Some("array.filter"),
        "forEach" => Some("array.forEach"),
        _ => None,
    }
}

fn string_method(key: &str) -> Option<&'static str> {
    match key {
        "slice" => Some("string.slice"),
        "indexOf" => Some("string.indexOf"),
        "includes" => Some("string.includes"),
        "split" => Some("string.split"),
        "charAt" => Some("string.charAt"),
        "toUpperCase" => Some("string.toUpperCase"),
        "toLowerCase" => Some("string.toLowerCase"),
        _ => None,
    }
}

impl fmt::Display for Obj {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Obj::Array(elements) => {
                let parts: Vec<String> = elements.iter().map(|v| format!("{:?}", v)).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Obj::Record(values) => {
                let mut keys: Vec<&String> = values.keys().collect();
                keys.sort();
                let parts: Vec<String> = keys
                    .into_iter()
                    .map(|k| format!("{}: {:?}", k, values[k]))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
