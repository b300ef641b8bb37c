use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::ast::{NodeRef, Pattern};
use crate::interpreter::cps::cont::Cont;
use crate::interpreter::cps::trampoline::run_loop;
use crate::interpreter::cps::value::Value;
use crate::interpreter::cps::{
    object, Ctx, Env, EnvRef, EvaluationConfig, ExceptionPacket, Phase, RuntimeError, Trampoline,
};
use crate::interpreter::cps_json;
use crate::runtime_error;

/// A callable value: an interpreted function closing over its defining
/// environment, or a named host native dispatched through [`builtin`].
#[derive(Clone)]
pub enum Function {
    Meta(Rc<MetaFunction>),
    Native(&'static str),
}

impl PartialEq for Function {
    fn eq(&self, other: &Function) -> bool {
        match (self, other) {
            (Function::Meta(a), Function::Meta(b)) => Rc::ptr_eq(a, b),
            (Function::Native(a), Function::Native(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Function::Meta(meta) => match meta.name() {
                Some(name) => write!(f, "#<function:{}>", name),
                None => write!(f, "#<function>"),
            },
            Function::Native(name) => write!(f, "#<native:{}>", name),
        }
    }
}

impl Function {
    pub fn name(&self) -> Option<String> {
        match self {
            Function::Meta(meta) => meta.name(),
            Function::Native(name) => {
                Some(name.rsplit('.').next().unwrap_or(name).to_string())
            }
        }
    }
}

/// An interpreted function value: its function node, the captured enclosing
/// frame, and the configuration snapshot taken at creation time. The closure
/// edge is read-only once set; the frames it pins stay alive with the
/// function.
pub struct MetaFunction {
    pub node: NodeRef,
    pub closure: EnvRef,
    pub config: Rc<EvaluationConfig>,
}

impl MetaFunction {
    pub fn new(node: &NodeRef, ctx: &Ctx) -> Rc<MetaFunction> {
        Rc::new(MetaFunction {
            node: node.clone(),
            closure: ctx.env.clone(),
            config: ctx.cfg.clone(),
        })
    }

    pub fn name(&self) -> Option<String> {
        self.node.function().and_then(|f| f.id.clone())
    }
}

impl fmt::Debug for MetaFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "#<function:{}>", name),
            None => write!(f, "#<function>"),
        }
    }
}

/// Applies a callee within the running trampoline. Natives complete in one
/// step; meta-functions bounce into their body.
pub fn apply(
    callee: Value,
    this: Value,
    args: Vec<Value>,
    construct: bool,
    k: Box<Cont>,
) -> Result<Trampoline, RuntimeError> {
    debug!("apply {:?} ({} args)", callee, args.len());
    match callee {
        Value::Function(Function::Native(name)) => match builtin(name, this, args) {
            Ok(result) => Ok(Trampoline::Run(result, *k)),
            Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
        },
        Value::Function(Function::Meta(meta)) => apply_meta(meta, this, args, construct, k),
        other => Ok(Trampoline::Unwind(
            ExceptionPacket::type_error(format!("{:?} is not a function", other)),
            *k,
        )),
    }
}

/// Invokes a meta-function: builds the invocation frame (`this`, `arguments`,
/// the bound parameters) over the captured closure, emits the observer
/// `enter` on the function node, and evaluates the body behind a
/// function-boundary continuation. A `Return` packet becomes the result;
/// anything else is stamped with the function node and keeps unwinding; the
/// observer `exit` fires exactly once either way.
pub fn apply_meta(
    meta: Rc<MetaFunction>,
    this: Value,
    args: Vec<Value>,
    construct: bool,
    k: Box<Cont>,
) -> Result<Trampoline, RuntimeError> {
    let function = match meta.node.function() {
        Some(function) => function.clone(),
        None => runtime_error!("not a function node: {}", meta.node.kind_name()),
    };

    let this_val = match construct {
        true => object::new_record(HashMap::new()),
        false => this,
    };
    let env = Env::new_child(meta.closure.clone());
    env.borrow_mut().define("this".to_string(), this_val.clone());
    env.borrow_mut()
        .define("arguments".to_string(), object::new_array(args.clone()));

    if let Err(packet) = bind_params(&env, &function.params, &args, &meta.config) {
        return Ok(Trampoline::Unwind(packet.locate(&meta.node), *k));
    }

    let ctx = Ctx::new(env, meta.config.clone());
    if let Err(e) = ctx.cfg.emit(&meta.node, &ctx.env, Phase::Enter, None) {
        debug!("interceptor failed on function enter: {}", e);
        return Ok(Trampoline::Unwind(
            ExceptionPacket::error("Error", e.message).locate(&meta.node),
            *k,
        ));
    }

    let exit = Cont::ExitNode {
        node: meta.node.clone(),
        ctx: ctx.clone(),
        k,
    };
    let boundary = Cont::FnReturn {
        node: meta.node.clone(),
        this: match construct {
            true => Some(this_val),
            false => None,
        },
        k: Box::new(exit),
    };
    Ok(Trampoline::Bounce(function.body.clone(), ctx, boundary))
}

/// Parameter binding: identifiers take the next positional argument, a rest
/// element takes the remaining ones as an array (empty when none are left).
/// Anything else is unsupported; the host hook is notified and the
/// invocation aborts.
fn bind_params(
    env: &EnvRef,
    params: &[Pattern],
    args: &[Value],
    cfg: &EvaluationConfig,
) -> Result<(), ExceptionPacket> {
    let mut index = 0;
    for param in params {
        match param {
            Pattern::Identifier { name } => {
                let value = args.get(index).cloned().unwrap_or(Value::Undefined);
                env.borrow_mut().define(name.clone(), value);
                index += 1;
            }
            Pattern::RestElement { argument } => match &**argument {
                Pattern::Identifier { name } => {
                    let rest = args.get(index..).map(<[Value]>::to_vec).unwrap_or_default();
                    env.borrow_mut()
                        .define(name.clone(), object::new_array(rest));
                    break;
                }
                other => return Err(unsupported_param(cfg, other)),
            },
            other => return Err(unsupported_param(cfg, other)),
        }
    }
    Ok(())
}

fn unsupported_param(cfg: &EvaluationConfig, pattern: &Pattern) -> ExceptionPacket {
    let error = RuntimeError {
        message: format!("parameter pattern {:?} is not supported", pattern),
    };
    cfg.report(&error);
    ExceptionPacket::not_implemented(error.message)
}

/// Drives a meta-function to completion on the caller's stack, for host code
/// entering interpreted code. Within a running evaluation, [`apply`] is the
/// in-trampoline path instead.
pub fn evaluate_meta_function(
    meta: Rc<MetaFunction>,
    this: Value,
    args: Vec<Value>,
) -> Result<Value, ExceptionPacket> {
    let cfg = meta.config.clone();
    match apply_meta(meta, this, args, false, Box::new(Cont::Return)) {
        Ok(step) => run_loop(step, &cfg),
        Err(error) => {
            cfg.report(&error);
            Err(ExceptionPacket::error("InternalError", error.message))
        }
    }
}

/// Packages a meta-function as a host-callable closure. The call completes
/// synchronously; an error packet comes back as `Err` with the thrown value
/// inside.
pub fn create_meta_function_wrapper(
    meta: Rc<MetaFunction>,
) -> impl Fn(Value, Vec<Value>) -> Result<Value, ExceptionPacket> {
    move |this, args| evaluate_meta_function(meta.clone(), this, args)
}

/// Calls any callable value from host code.
pub fn call_value(callee: &Value, this: Value, args: Vec<Value>) -> Result<Value, ExceptionPacket> {
    match callee {
        Value::Function(Function::Meta(meta)) => evaluate_meta_function(meta.clone(), this, args),
        Value::Function(Function::Native(name)) => builtin(name, this, args),
        other => Err(ExceptionPacket::type_error(format!(
            "{:?} is not a function",
            other
        ))),
    }
}

fn native(name: &'static str) -> Value {
    Value::Function(Function::Native(name))
}

fn record_of(pairs: Vec<(&str, Value)>) -> Value {
    object::new_record(
        pairs
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}

/// The bindings installed into every root frame.
pub fn global_bindings() -> Vec<(&'static str, Value)> {
    vec![
        ("undefined", Value::Undefined),
        ("NaN", Value::Number(f64::NAN)),
        ("Infinity", Value::Number(f64::INFINITY)),
        ("console", record_of(vec![("log", native("console.log"))])),
        (
            "Math",
            record_of(vec![
                ("floor", native("Math.floor")),
                ("ceil", native("Math.ceil")),
                ("abs", native("Math.abs")),
                ("min", native("Math.min")),
                ("max", native("Math.max")),
                ("pow", native("Math.pow")),
                ("sqrt", native("Math.sqrt")),
                ("PI", Value::Number(std::f64::consts::PI)),
                ("E", Value::Number(std::f64::consts::E)),
            ]),
        ),
        (
            "JSON",
            record_of(vec![
                ("stringify", native("JSON.stringify")),
                ("parse", native("JSON.parse")),
            ]),
        ),
        ("Object", record_of(vec![("keys", native("Object.keys"))])),
        (
            "Array",
            record_of(vec![("isArray", native("Array.isArray"))]),
        ),
        ("parseInt", native("parseInt")),
        ("parseFloat", native("parseFloat")),
        ("isNaN", native("isNaN")),
        ("String", native("String")),
        ("Number", native("Number")),
        ("Boolean", native("Boolean")),
        ("Error", native("Error")),
        ("TypeError", native("TypeError")),
        ("ReferenceError", native("ReferenceError")),
    ]
}

/// Named-native dispatch. `this` is the receiver for method-style natives and
/// `undefined` for free functions.
pub fn builtin(f: &'static str, this: Value, args: Vec<Value>) -> Result<Value, ExceptionPacket> {
    match f {
        "console.log" => console_log(args),

        "Math.floor" => math_unary(args, f64::floor),
        "Math.ceil" => math_unary(args, f64::ceil),
        "Math.abs" => math_unary(args, f64::abs),
        "Math.sqrt" => math_unary(args, f64::sqrt),
        "Math.pow" => {
            let base = number_arg(&args, 0)?;
            let exponent = number_arg(&args, 1)?;
            Ok(Value::Number(base.powf(exponent)))
        }
        "Math.min" => math_fold(args, f64::INFINITY, f64::min),
        "Math.max" => math_fold(args, f64::NEG_INFINITY, f64::max),

        "JSON.stringify" => {
            let value = args.first().cloned().unwrap_or(Value::Undefined);
            match serde_json::to_string(&cps_json::to_json(&value)) {
                Ok(text) => Ok(Value::String(text)),
                Err(e) => Err(ExceptionPacket::type_error(format!(
                    "cannot stringify: {}",
                    e
                ))),
            }
        }
        "JSON.parse" => {
            let text = args.first().cloned().unwrap_or(Value::Undefined);
            match serde_json::from_str(&text.to_string_value()) {
                Ok(raw) => Ok(cps_json::from_json(&raw)),
                Err(e) => Err(ExceptionPacket::syntax_error(format!("invalid JSON: {}", e))),
            }
        }

        "Object.keys" => {
            let target = args.first().cloned().unwrap_or(Value::Undefined);
            let keys = object::enumerate_keys(&target)?;
            Ok(object::new_array(
                keys.into_iter().map(Value::String).collect(),
            ))
        }
        "Array.isArray" => Ok(Value::Boolean(
            args.first().map(object::is_array).unwrap_or(false),
        )),

        "parseInt" => parse_int(args),
        "parseFloat" => parse_float(args),
        "isNaN" => {
            let n = args
                .first()
                .cloned()
                .unwrap_or(Value::Undefined)
                .to_number()
                .unwrap_or(f64::NAN);
            Ok(Value::Boolean(n.is_nan()))
        }
        "String" => Ok(Value::String(
            args.first()
                .map(Value::to_string_value)
                .unwrap_or_default(),
        )),
        "Number" => {
            let n = match args.first() {
                Some(value) => value
                    .to_number()
                    .map_err(|e| ExceptionPacket::type_error(e.message))?,
                None => 0.0,
            };
            Ok(Value::Number(n))
        }
        "Boolean" => Ok(Value::Boolean(
            args.first().map(Value::truthy).unwrap_or(false),
        )),

        "Error" | "TypeError" | "ReferenceError" => {
            let message = args
                .first()
                .map(Value::to_string_value)
                .unwrap_or_default();
            Ok(object::error_object(f, &message))
        }

        "array.push" | "array.pop" | "array.slice" | "array.indexOf" | "array.includes"
        | "array.join" | "array.concat" | "array.map" | "array.filter" | "array.forEach" => {
            array_builtin(f, this, args)
        }

        "string.slice" | "string.indexOf" | "string.includes" | "string.split"
        | "string.charAt" | "string.toUpperCase" | "string.toLowerCase" => {
            string_builtin(f, this, args)
        }

        "function.call" => {
            let mut args = args;
            let this_arg = match args.is_empty() {
                true => Value::Undefined,
                false => args.remove(0),
            };
            call_value(&this, this_arg, args)
        }
        "function.apply" => {
            let this_arg = args.first().cloned().unwrap_or(Value::Undefined);
            let call_args = match args.get(1) {
                Some(list) => object::iterate(list)?,
                None => Vec::new(),
            };
            call_value(&this, this_arg, call_args)
        }

        _ => Err(ExceptionPacket::not_implemented(format!(
            "native {}",
            f
        ))),
    }
}

fn console_log(args: Vec<Value>) -> Result<Value, ExceptionPacket> {
    let line = args
        .iter()
        .map(|v| format!("{}", v))
        .collect::<Vec<String>>()
        .join(" ");
    println!("{}", line);
    Ok(Value::Undefined)
}

fn number_arg(args: &[Value], index: usize) -> Result<f64, ExceptionPacket> {
    args.get(index)
        .cloned()
        .unwrap_or(Value::Undefined)
        .to_number()
        .map_err(|e| ExceptionPacket::type_error(e.message))
}

fn math_unary(args: Vec<Value>, op: fn(f64) -> f64) -> Result<Value, ExceptionPacket> {
    Ok(Value::Number(op(number_arg(&args, 0)?)))
}

fn math_fold(
    args: Vec<Value>,
    initial: f64,
    op: fn(f64, f64) -> f64,
) -> Result<Value, ExceptionPacket> {
    let mut acc = initial;
    for (index, _) in args.iter().enumerate() {
        let n = number_arg(&args, index)?;
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        acc = op(acc, n);
    }
    Ok(Value::Number(acc))
}

fn parse_int(args: Vec<Value>) -> Result<Value, ExceptionPacket> {
    let text = args
        .first()
        .map(Value::to_string_value)
        .unwrap_or_default();
    let radix = match args.get(1) {
        Some(Value::Undefined) | None => 10,
        Some(_) => {
            let r = number_arg(&args, 1)?;
            if r == 0.0 {
                10
            } else if (2.0..=36.0).contains(&r) {
                r as u32
            } else {
                return Ok(Value::Number(f64::NAN));
            }
        }
    };

    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits = match radix {
        16 => digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits),
        _ => digits,
    };

    let prefix: String = digits
        .chars()
        .take_while(|c| c.is_digit(radix))
        .collect();
    if prefix.is_empty() {
        return Ok(Value::Number(f64::NAN));
    }
    let n = i64::from_str_radix(&prefix, radix).map(|n| n as f64).unwrap_or(f64::NAN);
    Ok(Value::Number(if negative { -n } else { n }))
}

fn parse_float(args: Vec<Value>) -> Result<Value, ExceptionPacket> {
    let text = args
        .first()
        .map(Value::to_string_value)
        .unwrap_or_default();
    let trimmed = text.trim();

    // Longest numeric prefix: sign, digits, one dot, one signed exponent.
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let mut prev = None;
    for (i, c) in trimmed.char_indices() {
        match c {
            '0'..='9' => end = i + 1,
            '+' | '-' if i == 0 || matches!(prev, Some('e') | Some('E')) => {}
            '.' if !seen_dot && !seen_exp => seen_dot = true,
            'e' | 'E' if !seen_exp && end > 0 => seen_exp = true,
            _ => break,
        }
        prev = Some(c);
    }
    Ok(Value::Number(trimmed[..end].parse::<f64>().unwrap_or(f64::NAN)))
}

fn with_array<T>(
    this: &Value,
    f: impl FnOnce(&mut Vec<Value>) -> T,
) -> Result<T, ExceptionPacket> {
    match this {
        Value::Object(obj) => match &mut *obj.borrow_mut() {
            object::Obj::Array(elements) => Ok(f(elements)),
            object::Obj::Record(_) => Err(ExceptionPacket::type_error("receiver is not an array")),
        },
        _ => Err(ExceptionPacket::type_error("receiver is not an array")),
    }
}

/// Start/end clamping shared by `array.slice` and `string.slice`; negative
/// offsets count from the end.
fn slice_bounds(len: usize, start: Option<f64>, end: Option<f64>) -> (usize, usize) {
    let resolve = |n: f64| -> usize {
        if n.is_nan() {
            0
        } else if n < 0.0 {
            (len as f64 + n).max(0.0) as usize
        } else {
            (n as usize).min(len)
        }
    };
    let from = start.map(resolve).unwrap_or(0);
    let to = end.map(resolve).unwrap_or(len);
    (from, to.max(from))
}

fn array_builtin(f: &'static str, this: Value, args: Vec<Value>) -> Result<Value, ExceptionPacket> {
    match f {
        "array.push" => with_array(&this, |elements| {
            elements.extend(args.iter().cloned());
            Value::Number(elements.len() as f64)
        }),
        "array.pop" => with_array(&this, |elements| elements.pop().unwrap_or(Value::Undefined)),
        "array.slice" => {
            let start = match args.first() {
                Some(Value::Undefined) | None => None,
                Some(_) => Some(number_arg(&args, 0)?),
            };
            let end = match args.get(1) {
                Some(Value::Undefined) | None => None,
                Some(_) => Some(number_arg(&args, 1)?),
            };
            with_array(&this, |elements| {
                let (from, to) = slice_bounds(elements.len(), start, end);
                object::new_array(elements[from..to].to_vec())
            })
        }
        "array.indexOf" => {
            let needle = args.first().cloned().unwrap_or(Value::Undefined);
            with_array(&this, |elements| {
                Value::Number(
                    elements
                        .iter()
                        .position(|v| v.strict_eq(&needle))
                        .map(|i| i as f64)
                        .unwrap_or(-1.0),
                )
            })
        }
        "array.includes" => {
            let needle = args.first().cloned().unwrap_or(Value::Undefined);
            with_array(&this, |elements| {
                Value::Boolean(elements.iter().any(|v| v.strict_eq(&needle)))
            })
        }
        "array.join" => {
            let separator = match args.first() {
                Some(Value::Undefined) | None => ",".to_string(),
                Some(sep) => sep.to_string_value(),
            };
            with_array(&this, |elements| {
                let parts: Vec<String> = elements
                    .iter()
                    .map(|v| match v {
                        // join renders missing values as empty, not "undefined"
                        Value::Undefined | Value::Null => String::new(),
                        other => other.to_string_value(),
                    })
                    .collect();
                Value::String(parts.join(&separator))
            })
        }
        "array.concat" => {
            let mut combined = with_array(&this, |elements| elements.clone())?;
            for arg in args {
                match object::iterate(&arg) {
                    Ok(items) if object::is_array(&arg) => combined.extend(items),
                    _ => combined.push(arg),
                }
            }
            Ok(object::new_array(combined))
        }
        "array.map" | "array.filter" | "array.forEach" => {
            let callback = args.first().cloned().unwrap_or(Value::Undefined);
            let snapshot = with_array(&this, |elements| elements.clone())?;
            let mut mapped = Vec::with_capacity(snapshot.len());
            for (index, item) in snapshot.into_iter().enumerate() {
                let result = call_value(
                    &callback,
                    Value::Undefined,
                    vec![item.clone(), Value::Number(index as f64), this.clone()],
                )?;
                match f {
                    "array.map" => mapped.push(result),
                    "array.filter" => {
                        if result.truthy() {
                            mapped.push(item);
                        }
                    }
                    _ => {}
                }
            }
            match f {
                "array.forEach" => Ok(Value::Undefined),
                _ => Ok(object::new_array(mapped)),
            }
        }
        _ => Err(ExceptionPacket::not_implemented(format!("native {}", f))),
    }
}

fn string_builtin(
    f: &'static str,
    this: Value,
    args: Vec<Value>,
) -> Result<Value, ExceptionPacket> {
    let text = match &this {
        Value::String(s) => s.clone(),
        other => other.to_string_value(),
    };
    match f {
        "string.slice" => {
            let chars: Vec<char> = text.chars().collect();
            let start = match args.first() {
                Some(Value::Undefined) | None => None,
                Some(_) => Some(number_arg(&args, 0)?),
            };
            let end = match args.get(1) {
                Some(Value::Undefined) | None => None,
                Some(_) => Some(number_arg(&args, 1)?),
            };
            let (from, to) = slice_bounds(chars.len(), start, end);
            Ok(Value::String(chars[from..to].iter().collect()))
        }
        "string.indexOf" => {
            let needle = args
                .first()
                .map(Value::to_string_value)
                .unwrap_or_default();
            Ok(Value::Number(
                text.find(&needle)
                    .map(|byte| text[..byte].chars().count() as f64)
                    .unwrap_or(-1.0),
            ))
        }
        "string.includes" => {
            let needle = args
                .first()
                .map(Value::to_string_value)
                .unwrap_or_default();
            Ok(Value::Boolean(text.contains(&needle)))
        }
        "string.split" => {
            let parts: Vec<Value> = match args.first() {
                Some(Value::Undefined) | None => vec![Value::String(text)],
                Some(separator) => {
                    let separator = separator.to_string_value();
                    match separator.is_empty() {
                        true => text.chars().map(|c| Value::String(c.to_string())).collect(),
                        false => text
                            .split(&separator)
                            .map(|part| Value::String(part.to_string()))
                            .collect(),
                    }
                }
            };
            Ok(object::new_array(parts))
        }
        "string.charAt" => {
            let index = number_arg(&args, 0).unwrap_or(0.0);
            let c = match index >= 0.0 {
                true => text.chars().nth(index as usize),
                false => None,
            };
            Ok(Value::String(c.map(String::from).unwrap_or_default()))
        }
        "string.toUpperCase" => Ok(Value::String(text.to_uppercase())),
        "string.toLowerCase" => Ok(Value::String(text.to_lowercase())),
        _ => Err(ExceptionPacket::not_implemented(format!("native {}", f))),
    }
}
