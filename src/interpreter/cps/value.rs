use std::fmt;
use std::rc::Rc;

use crate::interpreter::cps::object::{Obj, ObjRef};
use crate::interpreter::cps::procedure::Function;
use crate::interpreter::cps::RuntimeError;
use crate::runtime_error;

/// The uniform value type of the interpreted language.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),

    /// Host containers: plain records and arrays.
    Object(ObjRef),

    Function(Function),
}

/// Structural equality for data, pointer identity for functions. Used by
/// tests and container comparisons; the `===` operator goes through
/// [`Value::strict_eq`] instead, which compares objects by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl std::ops::Add for Value {
    type Output = Result<Value, RuntimeError>;

    fn add(self, rhs: Self) -> Self::Output {
        let a = self.to_primitive();
        let b = rhs.to_primitive();
        match (&a, &b) {
            (Value::String(_), _) | (_, Value::String(_)) => Ok(Value::String(format!(
                "{}{}",
                a.to_string_value(),
                b.to_string_value()
            ))),
            _ => Ok(Value::Number(a.to_number()? + b.to_number()?)),
        }
    }
}

impl std::ops::Sub for Value {
    type Output = Result<Value, RuntimeError>;

    fn sub(self, rhs: Self) -> Self::Output {
        Ok(Value::Number(self.to_number()? - rhs.to_number()?))
    }
}

impl std::ops::Mul for Value {
    type Output = Result<Value, RuntimeError>;

    fn mul(self, rhs: Self) -> Self::Output {
        Ok(Value::Number(self.to_number()? * rhs.to_number()?))
    }
}

impl std::ops::Div for Value {
    type Output = Result<Value, RuntimeError>;

    fn div(self, rhs: Self) -> Self::Output {
        Ok(Value::Number(self.to_number()? / rhs.to_number()?))
    }
}

impl std::ops::Rem for Value {
    type Output = Result<Value, RuntimeError>;

    fn rem(self, rhs: Self) -> Self::Output {
        Ok(Value::Number(self.to_number()? % rhs.to_number()?))
    }
}

impl std::ops::Neg for Value {
    type Output = Result<Value, RuntimeError>;

    fn neg(self) -> Self::Output {
        Ok(Value::Number(-self.to_number()?))
    }
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) | Value::Function(_) => true,
        }
    }

    /// Numeric coercion. Only function values refuse it; everything else
    /// coerces, producing `NaN` where no number exists.
    pub fn to_number(&self) -> Result<f64, RuntimeError> {
        match self {
            Value::Undefined => Ok(f64::NAN),
            Value::Null => Ok(0.0),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Ok(*n),
            Value::String(s) => Ok(string_to_number(s)),
            Value::Object(_) => self.to_primitive().to_number(),
            Value::Function(f) => runtime_error!("Cannot convert {:?} to a number", f),
        }
    }

    /// String coercion, matching the surface language's `String(x)`.
    pub fn to_string_value(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Object(obj) => match &*obj.borrow() {
                Obj::Array(elements) => elements
                    .iter()
                    .map(Value::to_string_value)
                    .collect::<Vec<String>>()
                    .join(","),
                Obj::Record(_) => "[object Object]".to_string(),
            },
            Value::Function(_) => "#<function>".to_string(),
        }
    }

    /// Property-key coercion for computed member access.
    pub fn to_property_key(&self) -> String {
        self.to_string_value()
    }

    /// Objects flatten to their string form before arithmetic, so `[] + 1`
    /// and `({}) + "x"` behave like the surface language.
    pub fn to_primitive(&self) -> Value {
        match self {
            Value::Object(_) => Value::String(self.to_string_value()),
            other => other.clone(),
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// `===`: same type and value, objects by identity.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }

    /// `==`: the abstract-equality ladder. Mixed-type comparands converge
    /// through numeric and primitive coercion until a same-type comparison
    /// applies.
    pub fn loose_eq(&self, other: &Value) -> Result<bool, RuntimeError> {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => Ok(true),
            (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Boolean(_), Value::Boolean(_))
            | (Value::Object(_), Value::Object(_))
            | (Value::Function(_), Value::Function(_)) => Ok(self.strict_eq(other)),

            (Value::Number(a), Value::String(_)) => Ok(*a == other.to_number()?),
            (Value::String(_), Value::Number(b)) => Ok(self.to_number()? == *b),

            (Value::Boolean(_), _) => Value::Number(self.to_number()?).loose_eq(other),
            (_, Value::Boolean(_)) => self.loose_eq(&Value::Number(other.to_number()?)),

            (Value::Object(_), Value::Number(_) | Value::String(_)) => {
                self.to_primitive().loose_eq(other)
            }
            (Value::Number(_) | Value::String(_), Value::Object(_)) => {
                self.loose_eq(&other.to_primitive())
            }

            _ => Ok(false),
        }
    }
}

/// String-to-number coercion: trimmed, empty is zero, `Infinity` is spelled
/// case-sensitively, `0x` prefixes parse as hex, anything else falls back to
/// a float parse and then `NaN`.
fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    // Rust accepts "inf"/"infinity" case-insensitively; the surface language
    // accepts only the exact "Infinity" spelling handled above.
    let unsigned = trimmed
        .strip_prefix('+')
        .or_else(|| trimmed.strip_prefix('-'))
        .unwrap_or(trimmed);
    if unsigned.eq_ignore_ascii_case("inf") || unsigned.eq_ignore_ascii_case("infinity") {
        return f64::NAN;
    }

    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }

    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e21 {
        return format!("{}", n as i64);
    }
    format!("{}", n)
}

/// `ToInt32`: modular reduction into the signed 32-bit range.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let modulus = 4294967296.0;
    let mut m = n.trunc() % modulus;
    if m < 0.0 {
        m += modulus;
    }
    if m >= modulus / 2.0 {
        (m - modulus) as i32
    } else {
        m as i32
    }
}

/// `ToUint32`: modular reduction into the unsigned 32-bit range.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let modulus = 4294967296.0;
    let mut m = n.trunc() % modulus;
    if m < 0.0 {
        m += modulus;
    }
    m as u32
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Object(obj) => write!(f, "{}", obj.borrow()),
            Value::Function(func) => write!(f, "{:?}", func),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            _ => write!(f, "{}", self),
        }
    }
}
