//! JSON bridging for values: powers `JSON.stringify`/`JSON.parse` and lets
//! hosts seed environments from JSON data. Data values round-trip; functions
//! have no JSON form and collapse to `null`, like the surface language's
//! stringification.

use std::collections::HashMap;

use serde_json::{Map, Number, Value as Json};

use crate::interpreter::cps::object::{self, Obj};
use crate::interpreter::cps::value::Value;

pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Undefined | Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        // integral numbers keep their integer spelling
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 9e15 => {
            Json::Number(Number::from(*n as i64))
        }
        Value::Number(n) => Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
        Value::String(s) => Json::String(s.clone()),
        Value::Object(obj) => match &*obj.borrow() {
            Obj::Array(elements) => Json::Array(elements.iter().map(to_json).collect()),
            Obj::Record(values) => {
                let mut fields = Map::new();
                let mut keys: Vec<&String> = values.keys().collect();
                keys.sort();
                for key in keys {
                    fields.insert(key.clone(), to_json(&values[key]));
                }
                Json::Object(fields)
            }
        },
        Value::Function(_) => Json::Null,
    }
}

pub fn from_json(raw: &Json) -> Value {
    match raw {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::String(s.clone()),
        Json::Array(elements) => object::new_array(elements.iter().map(from_json).collect()),
        Json::Object(fields) => {
            let values: HashMap<String, Value> = fields
                .iter()
                .map(|(key, value)| (key.clone(), from_json(value)))
                .collect();
            object::new_record(values)
        }
    }
}
