//! Application of the surface language's operators over [`Value`]s. The
//! arithmetic core lives on `Value` as `std::ops` impls; this module layers
//! equality, relational, bitwise and unary application on top and converts
//! coercion failures into throwable type-error packets.

use crate::ast::ops::{BinaryOp, UnaryOp};
use crate::interpreter::cps::object;
use crate::interpreter::cps::value::{to_int32, to_uint32, Value};
use crate::interpreter::cps::{ExceptionPacket, RuntimeError};

pub fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ExceptionPacket> {
    match op {
        BinaryOp::Add => (lhs + rhs).map_err(thrown),
        BinaryOp::Sub => (lhs - rhs).map_err(thrown),
        BinaryOp::Mul => (lhs * rhs).map_err(thrown),
        BinaryOp::Div => (lhs / rhs).map_err(thrown),
        BinaryOp::Mod => (lhs % rhs).map_err(thrown),

        BinaryOp::StrictEq => Ok(Value::Boolean(lhs.strict_eq(&rhs))),
        BinaryOp::StrictNotEq => Ok(Value::Boolean(!lhs.strict_eq(&rhs))),
        BinaryOp::Eq => lhs.loose_eq(&rhs).map(Value::Boolean).map_err(thrown),
        BinaryOp::NotEq => lhs
            .loose_eq(&rhs)
            .map(|eq| Value::Boolean(!eq))
            .map_err(thrown),

        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            compare(op, lhs, rhs).map_err(thrown)
        }

        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr | BinaryOp::BitAnd | BinaryOp::BitOr
        | BinaryOp::BitXor => bitwise(op, lhs, rhs).map_err(thrown),

        BinaryOp::In => {
            let key = lhs.to_property_key();
            object::has_property(&rhs, &key).map(Value::Boolean)
        }
        BinaryOp::Instanceof => Err(ExceptionPacket::not_implemented("instanceof")),
    }
}

pub fn apply_unary(op: UnaryOp, operand: Value) -> Result<Value, ExceptionPacket> {
    match op {
        UnaryOp::Minus => (-operand).map_err(thrown),
        UnaryOp::Plus => operand.to_number().map(Value::Number).map_err(thrown),
        UnaryOp::Not => Ok(Value::Boolean(!operand.truthy())),
        UnaryOp::BitNot => operand
            .to_number()
            .map(|n| Value::Number(!to_int32(n) as f64))
            .map_err(thrown),
        UnaryOp::Typeof => Ok(Value::String(operand.type_of().to_string())),
        UnaryOp::Void => Ok(Value::Undefined),
        UnaryOp::Delete => Err(ExceptionPacket::not_implemented("delete operator")),
    }
}

/// Relational comparison: strings compare lexicographically, everything else
/// through numeric coercion, with `NaN` incomparable.
fn compare(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    if let (Value::String(a), Value::String(b)) = (&lhs, &rhs) {
        return Ok(Value::Boolean(match op {
            BinaryOp::Lt => a < b,
            BinaryOp::LtEq => a <= b,
            BinaryOp::Gt => a > b,
            BinaryOp::GtEq => a >= b,
            _ => unreachable!("compare called with a non-relational operator"),
        }));
    }

    let a = lhs.to_number()?;
    let b = rhs.to_number()?;
    if a.is_nan() || b.is_nan() {
        return Ok(Value::Boolean(false));
    }
    Ok(Value::Boolean(match op {
        BinaryOp::Lt => a < b,
        BinaryOp::LtEq => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::GtEq => a >= b,
        _ => unreachable!("compare called with a non-relational operator"),
    }))
}

fn bitwise(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    let a = lhs.to_number()?;
    let b = rhs.to_number()?;
    let result = match op {
        BinaryOp::Shl => (to_int32(a) << (to_uint32(b) & 31)) as f64,
        BinaryOp::Shr => (to_int32(a) >> (to_uint32(b) & 31)) as f64,
        BinaryOp::UShr => (to_uint32(a) >> (to_uint32(b) & 31)) as f64,
        BinaryOp::BitAnd => (to_int32(a) & to_int32(b)) as f64,
        BinaryOp::BitOr => (to_int32(a) | to_int32(b)) as f64,
        BinaryOp::BitXor => (to_int32(a) ^ to_int32(b)) as f64,
        _ => unreachable!("bitwise called with a non-bitwise operator"),
    };
    Ok(Value::Number(result))
}

fn thrown(error: RuntimeError) -> ExceptionPacket {
    ExceptionPacket::type_error(error.message)
}
