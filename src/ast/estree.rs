//! Post-parse validator: converts arbitrary ESTree-shaped JSON (the output of
//! any compatible surface parser) into the closed node set of
//! [`crate::ast::NodeKind`]. Node types and operators outside the closed set
//! map onto `Unknown` nodes, which fail explicitly when evaluated.

use serde_json::{Map, Value as Json};

use crate::ast::ops::{ASSIGN_OPS, BINARY_OPS, LOGICAL_OPS, UNARY_OPS, UPDATE_OPS};
use crate::ast::{FunctionNode, LiteralValue, Loc, Node, NodeKind, NodeRef, Pattern, Pos, Property};
use crate::interpreter::cps::RuntimeError;
use crate::runtime_error;

/// Parses ESTree JSON text and validates it into a node tree.
pub fn parse(source: &str) -> Result<NodeRef, RuntimeError> {
    let raw: Json = match serde_json::from_str(source) {
        Ok(raw) => raw,
        Err(e) => runtime_error!("malformed AST JSON: {}", e),
    };
    from_json(&raw)
}

/// Validates one ESTree JSON value into a node tree.
pub fn from_json(raw: &Json) -> Result<NodeRef, RuntimeError> {
    let fields = match raw.as_object() {
        Some(fields) => fields,
        None => runtime_error!("expected an AST node object, got: {}", raw),
    };
    let ty = match fields.get("type").and_then(Json::as_str) {
        Some(ty) => ty,
        None => runtime_error!("AST node without a type tag: {}", raw),
    };

    let kind = match ty {
        "Program" => NodeKind::Program {
            body: node_list(fields, "body")?,
        },
        "Literal" => match literal_value(fields) {
            Some(value) => NodeKind::Literal { value },
            None => NodeKind::Unknown {
                kind: "Literal regex".to_string(),
            },
        },
        "Identifier" => NodeKind::Identifier {
            name: text(fields, "name")?,
        },
        "ThisExpression" => NodeKind::ThisExpression,
        "BinaryExpression" => {
            let op = text(fields, "operator")?;
            match BINARY_OPS.get(op.as_str()) {
                Some(op) => NodeKind::BinaryExpression {
                    operator: *op,
                    left: child(fields, "left")?,
                    right: child(fields, "right")?,
                },
                None => unknown_op(ty, &op),
            }
        }
        "LogicalExpression" => {
            let op = text(fields, "operator")?;
            match LOGICAL_OPS.get(op.as_str()) {
                Some(op) => NodeKind::LogicalExpression {
                    operator: *op,
                    left: child(fields, "left")?,
                    right: child(fields, "right")?,
                },
                None => unknown_op(ty, &op),
            }
        }
        "UnaryExpression" => {
            let op = text(fields, "operator")?;
            match UNARY_OPS.get(op.as_str()) {
                Some(op) => NodeKind::UnaryExpression {
                    operator: *op,
                    argument: child(fields, "argument")?,
                },
                None => unknown_op(ty, &op),
            }
        }
        "UpdateExpression" => {
            let op = text(fields, "operator")?;
            match UPDATE_OPS.get(op.as_str()) {
                Some(op) => NodeKind::UpdateExpression {
                    operator: *op,
                    prefix: flag(fields, "prefix"),
                    argument: child(fields, "argument")?,
                },
                None => unknown_op(ty, &op),
            }
        }
        "AssignmentExpression" => {
            let op = text(fields, "operator")?;
            match ASSIGN_OPS.get(op.as_str()) {
                Some(op) => NodeKind::AssignmentExpression {
                    operator: *op,
                    left: child(fields, "left")?,
                    right: child(fields, "right")?,
                },
                None => unknown_op(ty, &op),
            }
        }
        "MemberExpression" => NodeKind::MemberExpression {
            object: child(fields, "object")?,
            property: child(fields, "property")?,
            computed: flag(fields, "computed"),
        },
        "CallExpression" => NodeKind::CallExpression {
            callee: child(fields, "callee")?,
            arguments: node_list(fields, "arguments")?,
        },
        "NewExpression" => NodeKind::NewExpression {
            callee: child(fields, "callee")?,
            arguments: node_list(fields, "arguments")?,
        },
        "ArrayExpression" => {
            let raw_elements = match fields.get("elements").and_then(Json::as_array) {
                Some(elements) => elements,
                None => runtime_error!("ArrayExpression without elements"),
            };
            let mut elements = Vec::with_capacity(raw_elements.len());
            for element in raw_elements {
                elements.push(match element {
                    Json::Null => None,
                    _ => Some(from_json(element)?),
                });
            }
            NodeKind::ArrayExpression { elements }
        }
        "ObjectExpression" => {
            let raw_properties = match fields.get("properties").and_then(Json::as_array) {
                Some(properties) => properties,
                None => runtime_error!("ObjectExpression without properties"),
            };
            let mut properties = Vec::with_capacity(raw_properties.len());
            for property in raw_properties {
                properties.push(property_entry(property)?);
            }
            NodeKind::ObjectExpression { properties }
        }
        "FunctionExpression" => NodeKind::FunctionExpression(function(fields)?),
        "FunctionDeclaration" => NodeKind::FunctionDeclaration(function(fields)?),
        "ArrowFunctionExpression" => NodeKind::ArrowFunctionExpression(function(fields)?),
        "BlockStatement" => NodeKind::BlockStatement {
            body: node_list(fields, "body")?,
        },
        "ExpressionStatement" => NodeKind::ExpressionStatement {
            expression: child(fields, "expression")?,
        },
        "VariableDeclaration" => NodeKind::VariableDeclaration {
            kind: fields
                .get("kind")
                .and_then(Json::as_str)
                .unwrap_or("var")
                .to_string(),
            declarations: node_list(fields, "declarations")?,
        },
        "VariableDeclarator" => NodeKind::VariableDeclarator {
            id: pattern(required(fields, "id")?),
            init: opt_child(fields, "init")?,
        },
        "IfStatement" => NodeKind::IfStatement {
            test: child(fields, "test")?,
            consequent: child(fields, "consequent")?,
            alternate: opt_child(fields, "alternate")?,
        },
        "ConditionalExpression" => NodeKind::ConditionalExpression {
            test: child(fields, "test")?,
            consequent: child(fields, "consequent")?,
            alternate: child(fields, "alternate")?,
        },
        "WhileStatement" => NodeKind::WhileStatement {
            test: child(fields, "test")?,
            body: child(fields, "body")?,
        },
        "DoWhileStatement" => NodeKind::DoWhileStatement {
            body: child(fields, "body")?,
            test: child(fields, "test")?,
        },
        "ForStatement" => NodeKind::ForStatement {
            init: opt_child(fields, "init")?,
            test: opt_child(fields, "test")?,
            update: opt_child(fields, "update")?,
            body: child(fields, "body")?,
        },
        "ForOfStatement" => NodeKind::ForOfStatement {
            left: child(fields, "left")?,
            right: child(fields, "right")?,
            body: child(fields, "body")?,
        },
        "ForInStatement" => NodeKind::ForInStatement {
            left: child(fields, "left")?,
            right: child(fields, "right")?,
            body: child(fields, "body")?,
        },
        "BreakStatement" => NodeKind::BreakStatement {
            label: label(fields),
        },
        "ContinueStatement" => NodeKind::ContinueStatement {
            label: label(fields),
        },
        "ReturnStatement" => NodeKind::ReturnStatement {
            argument: opt_child(fields, "argument")?,
        },
        "ThrowStatement" => NodeKind::ThrowStatement {
            argument: child(fields, "argument")?,
        },
        "TryStatement" => NodeKind::TryStatement {
            block: child(fields, "block")?,
            handler: opt_child(fields, "handler")?,
            finalizer: opt_child(fields, "finalizer")?,
        },
        "CatchClause" => NodeKind::CatchClause {
            param: match fields.get("param") {
                None | Some(Json::Null) => None,
                Some(raw) => Some(pattern(raw)),
            },
            body: child(fields, "body")?,
        },
        "Unknown" => NodeKind::Unknown {
            kind: fields
                .get("kind")
                .and_then(Json::as_str)
                .unwrap_or("Unknown")
                .to_string(),
        },
        other => NodeKind::Unknown {
            kind: other.to_string(),
        },
    };

    Ok(Node::with_loc(kind, loc(fields)))
}

fn unknown_op(ty: &str, op: &str) -> NodeKind {
    NodeKind::Unknown {
        kind: format!("{} {}", ty, op),
    }
}

fn required<'a>(fields: &'a Map<String, Json>, key: &str) -> Result<&'a Json, RuntimeError> {
    match fields.get(key) {
        Some(raw) if !raw.is_null() => Ok(raw),
        _ => runtime_error!("AST node is missing the `{}` field", key),
    }
}

fn text(fields: &Map<String, Json>, key: &str) -> Result<String, RuntimeError> {
    match fields.get(key).and_then(Json::as_str) {
        Some(s) => Ok(s.to_string()),
        None => runtime_error!("AST node is missing the `{}` string field", key),
    }
}

fn flag(fields: &Map<String, Json>, key: &str) -> bool {
    fields.get(key).and_then(Json::as_bool).unwrap_or(false)
}

fn child(fields: &Map<String, Json>, key: &str) -> Result<NodeRef, RuntimeError> {
    from_json(required(fields, key)?)
}

fn opt_child(fields: &Map<String, Json>, key: &str) -> Result<Option<NodeRef>, RuntimeError> {
    match fields.get(key) {
        None | Some(Json::Null) => Ok(None),
        Some(raw) => Ok(Some(from_json(raw)?)),
    }
}

fn node_list(fields: &Map<String, Json>, key: &str) -> Result<Vec<NodeRef>, RuntimeError> {
    let raw_list = match fields.get(key).and_then(Json::as_array) {
        Some(raw_list) => raw_list,
        None => runtime_error!("AST node is missing the `{}` list field", key),
    };
    raw_list.iter().map(from_json).collect()
}

/// `Literal.value`; returns `None` for regex literals, which have no JSON
/// value representation.
fn literal_value(fields: &Map<String, Json>) -> Option<LiteralValue> {
    if fields.contains_key("regex") {
        return None;
    }
    match fields.get("value") {
        None | Some(Json::Null) => Some(LiteralValue::Null),
        Some(Json::Bool(b)) => Some(LiteralValue::Boolean(*b)),
        Some(Json::Number(n)) => Some(LiteralValue::Number(n.as_f64().unwrap_or(f64::NAN))),
        Some(Json::String(s)) => Some(LiteralValue::String(s.clone())),
        Some(_) => None,
    }
}

/// Accepts both an identifier node and a bare string, so serialized trees
/// round-trip.
fn ident_name(raw: &Json) -> Option<String> {
    match raw {
        Json::String(s) => Some(s.clone()),
        Json::Object(fields) => match fields.get("type").and_then(Json::as_str) {
            Some("Identifier") => fields
                .get("name")
                .and_then(Json::as_str)
                .map(str::to_string),
            _ => None,
        },
        _ => None,
    }
}

fn label(fields: &Map<String, Json>) -> Option<String> {
    fields.get("label").and_then(ident_name)
}

fn pattern(raw: &Json) -> Pattern {
    let fields = match raw.as_object() {
        Some(fields) => fields,
        None => {
            return Pattern::Unsupported {
                kind: raw.to_string(),
            }
        }
    };
    match fields.get("type").and_then(Json::as_str) {
        Some("Identifier") => match fields.get("name").and_then(Json::as_str) {
            Some(name) => Pattern::Identifier {
                name: name.to_string(),
            },
            None => Pattern::Unsupported {
                kind: "Identifier".to_string(),
            },
        },
        Some("RestElement") => match fields.get("argument") {
            Some(argument) => Pattern::RestElement {
                argument: Box::new(pattern(argument)),
            },
            None => Pattern::Unsupported {
                kind: "RestElement".to_string(),
            },
        },
        Some(other) => Pattern::Unsupported {
            kind: other.to_string(),
        },
        None => Pattern::Unsupported {
            kind: "pattern".to_string(),
        },
    }
}

fn function(fields: &Map<String, Json>) -> Result<FunctionNode, RuntimeError> {
    let params = match fields.get("params").and_then(Json::as_array) {
        Some(raw_params) => raw_params.iter().map(pattern).collect(),
        None => Vec::new(),
    };
    Ok(FunctionNode {
        id: fields.get("id").and_then(ident_name),
        params,
        body: child(fields, "body")?,
    })
}

/// One entry of an object literal. Entry kinds outside plain `init`
/// properties (spreads, getters) degrade to a computed `Unknown` key so the
/// failure surfaces at evaluation time.
fn property_entry(raw: &Json) -> Result<Property, RuntimeError> {
    let unsupported = |kind: &str| Property {
        key: Node::new(NodeKind::Unknown {
            kind: kind.to_string(),
        }),
        value: Node::new(NodeKind::Unknown {
            kind: kind.to_string(),
        }),
        computed: true,
    };

    let fields = match raw.as_object() {
        Some(fields) => fields,
        None => runtime_error!("expected an object property, got: {}", raw),
    };
    match fields.get("type").and_then(Json::as_str) {
        None | Some("Property") => {
            if let Some(kind) = fields.get("kind").and_then(Json::as_str) {
                if kind != "init" {
                    return Ok(unsupported(&format!("Property {}", kind)));
                }
            }
            Ok(Property {
                key: child(fields, "key")?,
                value: child(fields, "value")?,
                computed: flag(fields, "computed"),
            })
        }
        Some(other) => Ok(unsupported(other)),
    }
}

fn loc(fields: &Map<String, Json>) -> Option<Loc> {
    let loc = fields.get("loc")?.as_object()?;
    Some(Loc {
        start: pos(loc.get("start")?)?,
        end: pos(loc.get("end")?)?,
    })
}

fn pos(raw: &Json) -> Option<Pos> {
    let fields = raw.as_object()?;
    Some(Pos {
        line: fields.get("line")?.as_u64()? as u32,
        column: fields.get("column")?.as_u64()? as u32,
    })
}
