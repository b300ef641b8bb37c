#![allow(unused_imports)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{json, Value as Json};

use crate::ast::estree;
use crate::interpreter::cps::env::Env;
use crate::interpreter::cps::error::*;
use crate::interpreter::cps::trampoline::*;
use crate::interpreter::cps::value::*;
use crate::interpreter::cps::*;
use crate::interpreter::EvaluationContext;

// Builders for ESTree JSON, so test programs stay readable.

fn program(body: Vec<Json>) -> Json {
    json!({"type": "Program", "body": body})
}

fn stmt(expression: Json) -> Json {
    json!({"type": "ExpressionStatement", "expression": expression})
}

fn lit(value: impl Into<Json>) -> Json {
    json!({"type": "Literal", "value": value.into()})
}

fn ident(name: &str) -> Json {
    json!({"type": "Identifier", "name": name})
}

fn binary(operator: &str, left: Json, right: Json) -> Json {
    json!({"type": "BinaryExpression", "operator": operator, "left": left, "right": right})
}

fn logical(operator: &str, left: Json, right: Json) -> Json {
    json!({"type": "LogicalExpression", "operator": operator, "left": left, "right": right})
}

fn unary(operator: &str, argument: Json) -> Json {
    json!({"type": "UnaryExpression", "operator": operator, "argument": argument})
}

fn update(operator: &str, prefix: bool, argument: Json) -> Json {
    json!({"type": "UpdateExpression", "operator": operator, "prefix": prefix, "argument": argument})
}

fn assign(operator: &str, left: Json, right: Json) -> Json {
    json!({"type": "AssignmentExpression", "operator": operator, "left": left, "right": right})
}

fn member(object: Json, name: &str) -> Json {
    json!({"type": "MemberExpression", "object": object, "property": ident(name), "computed": false})
}

fn index(object: Json, key: Json) -> Json {
    json!({"type": "MemberExpression", "object": object, "property": key, "computed": true})
}

fn call(callee: Json, arguments: Vec<Json>) -> Json {
    json!({"type": "CallExpression", "callee": callee, "arguments": arguments})
}

fn construct(callee: Json, arguments: Vec<Json>) -> Json {
    json!({"type": "NewExpression", "callee": callee, "arguments": arguments})
}

fn array(elements: Vec<Json>) -> Json {
    json!({"type": "ArrayExpression", "elements": elements})
}

fn object_lit(properties: Vec<(Json, Json, bool)>) -> Json {
    let properties: Vec<Json> = properties
        .into_iter()
        .map(|(key, value, computed)| {
            json!({"type": "Property", "key": key, "value": value, "computed": computed})
        })
        .collect();
    json!({"type": "ObjectExpression", "properties": properties})
}

fn record(pairs: Vec<(&str, Json)>) -> Json {
    object_lit(
        pairs
            .into_iter()
            .map(|(name, value)| (ident(name), value, false))
            .collect(),
    )
}

fn block(body: Vec<Json>) -> Json {
    json!({"type": "BlockStatement", "body": body})
}

fn var(kind: &str, name: &str, init: Option<Json>) -> Json {
    json!({
        "type": "VariableDeclaration",
        "kind": kind,
        "declarations": [{"type": "VariableDeclarator", "id": ident(name), "init": init}],
    })
}

fn func_decl(name: &str, params: Vec<Json>, body: Vec<Json>) -> Json {
    json!({
        "type": "FunctionDeclaration",
        "id": ident(name),
        "params": params,
        "body": block(body),
    })
}

fn func_expr(params: Vec<Json>, body: Vec<Json>) -> Json {
    json!({"type": "FunctionExpression", "params": params, "body": block(body)})
}

fn rest(name: &str) -> Json {
    json!({"type": "RestElement", "argument": ident(name)})
}

fn ret(argument: Option<Json>) -> Json {
    json!({"type": "ReturnStatement", "argument": argument})
}

fn throw(argument: Json) -> Json {
    json!({"type": "ThrowStatement", "argument": argument})
}

fn if_stmt(test: Json, consequent: Json, alternate: Option<Json>) -> Json {
    json!({"type": "IfStatement", "test": test, "consequent": consequent, "alternate": alternate})
}

fn while_stmt(test: Json, body: Json) -> Json {
    json!({"type": "WhileStatement", "test": test, "body": body})
}

fn do_while(body: Json, test: Json) -> Json {
    json!({"type": "DoWhileStatement", "body": body, "test": test})
}

fn for_stmt(init: Option<Json>, test: Option<Json>, update: Option<Json>, body: Json) -> Json {
    json!({"type": "ForStatement", "init": init, "test": test, "update": update, "body": body})
}

fn for_of(name: &str, right: Json, body: Json) -> Json {
    json!({"type": "ForOfStatement", "left": var("let", name, None), "right": right, "body": body})
}

fn for_in(name: &str, right: Json, body: Json) -> Json {
    json!({"type": "ForInStatement", "left": var("let", name, None), "right": right, "body": body})
}

fn brk(label: Option<&str>) -> Json {
    json!({"type": "BreakStatement", "label": label.map(ident)})
}

fn cont_stmt(label: Option<&str>) -> Json {
    json!({"type": "ContinueStatement", "label": label.map(ident)})
}

fn try_stmt(body: Vec<Json>, catch: Option<(&str, Vec<Json>)>, finally: Option<Vec<Json>>) -> Json {
    let handler = catch.map(|(param, body)| {
        json!({"type": "CatchClause", "param": ident(param), "body": block(body)})
    });
    json!({
        "type": "TryStatement",
        "block": block(body),
        "handler": handler,
        "finalizer": finally.map(block),
    })
}

fn eval(source: Json) -> Result<Value, ExceptionPacket> {
    EvaluationContext::new().eval_to_result(source, None)
}

/// Evaluates with the given bindings layered over the root; returns the
/// result and the layer so tests can inspect mutations.
fn eval_in(source: Json, values: Vec<(&str, Value)>) -> (Result<Value, ExceptionPacket>, EnvRef) {
    let context = EvaluationContext::new();
    let env = context.layer(
        values
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    );
    let result = context.eval_to_result(source, Some(env.clone()));
    (result, env)
}

fn number(n: f64) -> Value {
    Value::Number(n)
}

fn string(s: &str) -> Value {
    Value::String(s.to_string())
}

mod test_expressions {
    use super::*;

    #[test]
    fn test_literal_evaluates_to_itself() {
        assert_eq!(eval(program(vec![stmt(lit(42))])).unwrap(), number(42.0));
        assert_eq!(eval(program(vec![stmt(lit("hi"))])).unwrap(), string("hi"));
        assert_eq!(eval(program(vec![stmt(lit(true))])).unwrap(), Value::Boolean(true));
        assert_eq!(eval(program(vec![stmt(lit(Json::Null))])).unwrap(), Value::Null);
    }

    #[test]
    fn test_empty_program() {
        assert_eq!(eval(program(vec![])).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_two_plus_two() {
        let source = program(vec![stmt(binary("+", lit(2), lit(2)))]);
        assert_eq!(eval(source).unwrap(), number(4.0));
    }

    #[test]
    fn test_addition_from_environment() {
        let source = program(vec![stmt(binary("+", ident("a"), ident("b")))]);
        let (result, _) = eval_in(source, vec![("a", number(1.0)), ("b", number(3.0))]);
        assert_eq!(result.unwrap(), number(4.0));
    }

    #[test]
    fn test_string_concatenation() {
        let source = program(vec![stmt(binary("+", lit("n="), lit(3)))]);
        assert_eq!(eval(source).unwrap(), string("n=3"));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(
            eval(program(vec![stmt(binary("%", lit(7), lit(4)))])).unwrap(),
            number(3.0)
        );
        assert_eq!(
            eval(program(vec![stmt(binary(
                "-",
                binary("*", lit(2), lit(3)),
                lit(1)
            ))]))
            .unwrap(),
            number(5.0)
        );
        assert_eq!(
            eval(program(vec![stmt(binary("/", lit(1), lit(0)))])).unwrap(),
            number(f64::INFINITY)
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            eval(program(vec![stmt(binary("<", lit(1), lit(2)))])).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            eval(program(vec![stmt(binary("<", lit("a"), lit("b")))])).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            eval(program(vec![stmt(binary(">=", lit("10"), lit(9)))])).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_equality() {
        assert_eq!(
            eval(program(vec![stmt(binary("==", lit("1"), lit(1)))])).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            eval(program(vec![stmt(binary("===", lit("1"), lit(1)))])).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            eval(program(vec![stmt(binary(
                "==",
                lit(Json::Null),
                ident("undefined")
            ))]))
            .unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            eval(program(vec![stmt(binary("==", ident("NaN"), ident("NaN")))])).unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn test_logical_short_circuit_skips_the_right_operand() {
        // `boom` is unbound; short-circuiting means it is never evaluated.
        let source = program(vec![stmt(logical("&&", lit(false), ident("boom")))]);
        assert_eq!(eval(source).unwrap(), Value::Boolean(false));

        let source = program(vec![stmt(logical("||", lit(7), ident("boom")))]);
        assert_eq!(eval(source).unwrap(), number(7.0));
    }

    #[test]
    fn test_nullish_coalescing() {
        let source = program(vec![stmt(logical("??", lit(Json::Null), lit(5)))]);
        assert_eq!(eval(source).unwrap(), number(5.0));

        // 0 is falsy but not nullish
        let source = program(vec![stmt(logical("??", lit(0), lit(5)))]);
        assert_eq!(eval(source).unwrap(), number(0.0));
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(
            eval(program(vec![stmt(unary("typeof", lit(1)))])).unwrap(),
            string("number")
        );
        assert_eq!(
            eval(program(vec![stmt(unary("-", lit("3")))])).unwrap(),
            number(-3.0)
        );
        assert_eq!(
            eval(program(vec![stmt(unary("!", lit(0)))])).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            eval(program(vec![stmt(unary("void", lit(1)))])).unwrap(),
            Value::Undefined
        );
        assert_eq!(
            eval(program(vec![stmt(unary("~", lit(0)))])).unwrap(),
            number(-1.0)
        );
    }

    #[test]
    fn test_conditional_expression() {
        let source = program(vec![stmt(json!({
            "type": "ConditionalExpression",
            "test": lit(true),
            "consequent": lit(1),
            "alternate": lit(2),
        }))]);
        assert_eq!(eval(source).unwrap(), number(1.0));
    }

    #[test]
    fn test_pure_expression_is_idempotent() {
        let context = EvaluationContext::new();
        let env = context.layer(HashMap::new());
        let source = program(vec![stmt(binary("*", lit(6), lit(7)))]);
        let first = context.eval_to_result(source.clone(), Some(env.clone())).unwrap();
        let second = context.eval_to_result(source, Some(env)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_text_source_goes_through_the_parser() {
        let source = program(vec![stmt(binary("+", lit(2), lit(2)))]).to_string();
        let context = EvaluationContext::new();
        assert_eq!(context.eval_to_result(source, None).unwrap(), number(4.0));
    }

    #[test]
    fn test_unparsable_text_reports_through_the_error_continuation() {
        let context = EvaluationContext::new();
        let packet = context.eval_to_result("not json", None).unwrap_err();
        assert_eq!(packet.error_name().as_deref(), Some("SyntaxError"));
    }

    #[test]
    fn test_serialized_tree_evaluates_identically() {
        let source = program(vec![stmt(binary("+", lit(2), binary("*", lit(3), lit(4))))]);
        let node = estree::from_json(&source).unwrap();
        let reparsed = estree::from_json(&serde_json::to_value(&*node).unwrap()).unwrap();
        let context = EvaluationContext::new();
        assert_eq!(
            context.eval_to_result(node, None).unwrap(),
            context.eval_to_result(reparsed, None).unwrap()
        );
    }
}

mod test_bindings {
    use super::*;

    #[test]
    fn test_update_expression_counts() {
        // let c = 0; c++; c  =>  1, and the frame afterwards holds c == 1
        let source = program(vec![
            var("let", "c", Some(lit(0))),
            stmt(update("++", false, ident("c"))),
            stmt(ident("c")),
        ]);
        let (result, env) = eval_in(source, vec![]);
        assert_eq!(result.unwrap(), number(1.0));
        assert_eq!(env.borrow().get("c"), Some(number(1.0)));
    }

    #[test]
    fn test_postfix_yields_the_old_value_prefix_the_new() {
        let source = program(vec![
            var("let", "c", Some(lit(5))),
            stmt(update("++", false, ident("c"))),
        ]);
        assert_eq!(eval(source).unwrap(), number(5.0));

        let source = program(vec![
            var("let", "c", Some(lit(5))),
            stmt(update("--", true, ident("c"))),
        ]);
        assert_eq!(eval(source).unwrap(), number(4.0));
    }

    #[test]
    fn test_compound_assignment() {
        let source = program(vec![
            var("let", "a", Some(lit(5))),
            stmt(assign("+=", ident("a"), lit(2))),
            stmt(assign("<<=", ident("a"), lit(2))),
        ]);
        assert_eq!(eval(source).unwrap(), number(28.0));
    }

    #[test]
    fn test_declaration_without_initializer_binds_undefined() {
        let source = program(vec![var("let", "x", None), stmt(ident("x"))]);
        assert_eq!(eval(source).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_inner_shadow_reads_inner_outer_stays() {
        let source = program(vec![
            block(vec![
                var("let", "x", Some(lit(2))),
                stmt(assign("=", ident("x"), lit(3))),
            ]),
            stmt(ident("x")),
        ]);
        let (result, env) = eval_in(source, vec![("x", number(1.0))]);
        assert_eq!(result.unwrap(), number(1.0));
        assert_eq!(env.borrow().get("x"), Some(number(1.0)));
    }

    #[test]
    fn test_assignment_reaches_the_outer_frame() {
        let source = program(vec![
            block(vec![stmt(assign("=", ident("x"), lit(5)))]),
            stmt(ident("x")),
        ]);
        let (result, env) = eval_in(source, vec![("x", number(1.0))]);
        assert_eq!(result.unwrap(), number(5.0));
        assert_eq!(env.borrow().get("x"), Some(number(5.0)));
    }

    #[test]
    fn test_sloppy_assignment_creates_the_binding_at_the_root() {
        let context = EvaluationContext::new();
        let env = context.layer(HashMap::new());
        let source = program(vec![stmt(assign("=", ident("z"), lit(9)))]);
        context.eval_to_result(source, Some(env.clone())).unwrap();
        // the layered frame itself holds nothing; the root does
        assert!(!env.borrow().values.contains_key("z"));
        assert_eq!(context.root().borrow().get("z"), Some(number(9.0)));
    }

    #[test]
    fn test_strict_assignment_to_undeclared_is_a_reference_error() {
        let context = EvaluationContext::new();
        let config = EvaluationConfig::new().with_strict(true);
        let settled = RefCell::new(None);
        context.evaluate(
            program(vec![stmt(assign("=", ident("z"), lit(9)))]),
            |_| panic!("strict assignment must not succeed"),
            |packet| *settled.borrow_mut() = Some(packet),
            None,
            Some(config),
        );
        let packet = settled.into_inner().expect("evaluation settled");
        assert_eq!(packet.error_name().as_deref(), Some("ReferenceError"));
    }
}

mod test_objects {
    use super::*;

    #[test]
    fn test_member_read_and_write() {
        let source = program(vec![
            var("let", "o", Some(record(vec![("a", record(vec![("b", lit(2))]))]))),
            stmt(member(member(ident("o"), "a"), "b")),
        ]);
        assert_eq!(eval(source).unwrap(), number(2.0));

        let source = program(vec![
            var("let", "o", Some(record(vec![]))),
            stmt(assign("=", member(ident("o"), "x"), lit(1))),
            stmt(assign("=", index(ident("o"), lit("y")), lit(2))),
            stmt(binary("+", member(ident("o"), "x"), member(ident("o"), "y"))),
        ]);
        assert_eq!(eval(source).unwrap(), number(3.0));
    }

    #[test]
    fn test_member_update() {
        let source = program(vec![
            var("let", "o", Some(record(vec![("n", lit(7))]))),
            stmt(update("++", false, member(ident("o"), "n"))),
            stmt(member(ident("o"), "n")),
        ]);
        assert_eq!(eval(source).unwrap(), number(8.0));
    }

    #[test]
    fn test_array_indexing_and_length() {
        let source = program(vec![stmt(index(array(vec![lit(10), lit(20)]), lit(1)))]);
        assert_eq!(eval(source).unwrap(), number(20.0));

        let source = program(vec![stmt(member(array(vec![lit(1), lit(2), lit(3)]), "length"))]);
        assert_eq!(eval(source).unwrap(), number(3.0));
    }

    #[test]
    fn test_computed_object_key() {
        let source = program(vec![
            var(
                "let",
                "o",
                Some(object_lit(vec![(
                    binary("+", lit("k"), lit(1)),
                    lit(2),
                    true,
                )])),
            ),
            stmt(member(ident("o"), "k1")),
        ]);
        assert_eq!(eval(source).unwrap(), number(2.0));
    }

    #[test]
    fn test_array_elision_reads_as_undefined() {
        let source = program(vec![stmt(index(
            json!({"type": "ArrayExpression", "elements": [lit(1), Json::Null, lit(3)]}),
            lit(1),
        ))]);
        assert_eq!(eval(source).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_property_read_on_undefined_is_a_type_error() {
        let source = program(vec![stmt(member(ident("undefined"), "x"))]);
        let packet = eval(source).unwrap_err();
        assert_eq!(packet.error_name().as_deref(), Some("TypeError"));
    }

    #[test]
    fn test_array_methods() {
        let source = program(vec![
            var("let", "xs", Some(array(vec![lit(1), lit(2), lit(3)]))),
            stmt(call(member(ident("xs"), "push"), vec![lit(4)])),
            stmt(call(member(ident("xs"), "join"), vec![lit("-")])),
        ]);
        assert_eq!(eval(source).unwrap(), string("1-2-3-4"));

        let source = program(vec![stmt(call(
            member(array(vec![lit(1), lit(2), lit(3)]), "slice"),
            vec![lit(1)],
        ))]);
        assert_eq!(
            eval(source).unwrap(),
            object::new_array(vec![number(2.0), number(3.0)])
        );

        let source = program(vec![stmt(call(
            member(array(vec![lit("a"), lit("b")]), "indexOf"),
            vec![lit("b")],
        ))]);
        assert_eq!(eval(source).unwrap(), number(1.0));
    }

    #[test]
    fn test_string_methods() {
        let source = program(vec![stmt(member(lit("hello"), "length"))]);
        assert_eq!(eval(source).unwrap(), number(5.0));

        let source = program(vec![stmt(call(member(lit("hello"), "toUpperCase"), vec![]))]);
        assert_eq!(eval(source).unwrap(), string("HELLO"));

        let source = program(vec![stmt(call(member(lit("a,b"), "split"), vec![lit(",")]))]);
        assert_eq!(
            eval(source).unwrap(),
            object::new_array(vec![string("a"), string("b")])
        );
    }
}

mod test_control_flow {
    use super::*;

    #[test]
    fn test_if_else() {
        let source = program(vec![
            var("let", "r", Some(lit(0))),
            if_stmt(
                binary(">", lit(2), lit(1)),
                block(vec![stmt(assign("=", ident("r"), lit(1)))]),
                Some(block(vec![stmt(assign("=", ident("r"), lit(2)))])),
            ),
            stmt(ident("r")),
        ]);
        assert_eq!(eval(source).unwrap(), number(1.0));
    }

    #[test]
    fn test_while_sum() {
        let source = program(vec![
            var("let", "i", Some(lit(0))),
            var("let", "s", Some(lit(0))),
            while_stmt(
                binary("<", ident("i"), lit(5)),
                block(vec![
                    stmt(assign("+=", ident("s"), ident("i"))),
                    stmt(update("++", false, ident("i"))),
                ]),
            ),
            stmt(ident("s")),
        ]);
        assert_eq!(eval(source).unwrap(), number(10.0));
    }

    #[test]
    fn test_do_while_runs_at_least_once() {
        let source = program(vec![
            var("let", "i", Some(lit(10))),
            do_while(
                block(vec![stmt(update("++", false, ident("i")))]),
                lit(false),
            ),
            stmt(ident("i")),
        ]);
        assert_eq!(eval(source).unwrap(), number(11.0));
    }

    #[test]
    fn test_for_loop_with_break_and_continue() {
        // sum odd numbers below 10, stop at 7
        let source = program(vec![
            var("let", "s", Some(lit(0))),
            for_stmt(
                Some(var("let", "i", Some(lit(0)))),
                Some(binary("<", ident("i"), lit(10))),
                Some(update("++", false, ident("i"))),
                block(vec![
                    if_stmt(
                        binary("===", binary("%", ident("i"), lit(2)), lit(0)),
                        cont_stmt(None),
                        None,
                    ),
                    if_stmt(binary(">", ident("i"), lit(7)), brk(None), None),
                    stmt(assign("+=", ident("s"), ident("i"))),
                ]),
            ),
            stmt(ident("s")),
        ]);
        // 1 + 3 + 5 + 7
        assert_eq!(eval(source).unwrap(), number(16.0));
    }

    #[test]
    fn test_break_stops_only_the_inner_loop() {
        let source = program(vec![
            var("let", "n", Some(lit(0))),
            for_stmt(
                Some(var("let", "i", Some(lit(0)))),
                Some(binary("<", ident("i"), lit(3))),
                Some(update("++", false, ident("i"))),
                block(vec![
                    while_stmt(lit(true), block(vec![brk(None)])),
                    stmt(update("++", false, ident("n"))),
                ]),
            ),
            stmt(ident("n")),
        ]);
        assert_eq!(eval(source).unwrap(), number(3.0));
    }

    #[test]
    fn test_labeled_break_re_raises_to_the_top() {
        let source = program(vec![while_stmt(lit(true), block(vec![brk(Some("out"))]))]);
        let packet = eval(source).unwrap_err();
        assert_eq!(packet.control, Control::Break(Some("out".to_string())));
    }

    #[test]
    fn test_for_of_over_an_array() {
        let source = program(vec![
            var("let", "s", Some(lit(0))),
            for_of(
                "x",
                array(vec![lit(1), lit(2), lit(3)]),
                block(vec![stmt(assign("+=", ident("s"), ident("x")))]),
            ),
            stmt(ident("s")),
        ]);
        assert_eq!(eval(source).unwrap(), number(6.0));
    }

    #[test]
    fn test_for_of_over_a_string() {
        let source = program(vec![
            var("let", "s", Some(lit(""))),
            for_of(
                "c",
                lit("abc"),
                block(vec![stmt(assign("+=", ident("s"), ident("c")))]),
            ),
            stmt(ident("s")),
        ]);
        assert_eq!(eval(source).unwrap(), string("abc"));
    }

    #[test]
    fn test_for_in_enumerates_keys() {
        let source = program(vec![
            var("let", "s", Some(lit(""))),
            for_in(
                "k",
                record(vec![("a", lit(1)), ("b", lit(2))]),
                block(vec![stmt(assign("+=", ident("s"), ident("k")))]),
            ),
            stmt(ident("s")),
        ]);
        assert_eq!(eval(source).unwrap(), string("ab"));
    }

    #[test]
    fn test_for_in_over_an_array_yields_indices() {
        let source = program(vec![
            var("let", "s", Some(lit(""))),
            for_in(
                "i",
                array(vec![lit(7), lit(8)]),
                block(vec![stmt(assign("+=", ident("s"), ident("i")))]),
            ),
            stmt(ident("s")),
        ]);
        assert_eq!(eval(source).unwrap(), string("01"));
    }

    #[test]
    fn test_deep_iteration_does_not_grow_the_stack() {
        let source = program(vec![
            var("let", "i", Some(lit(0))),
            while_stmt(
                binary("<", ident("i"), lit(50_000)),
                block(vec![stmt(update("++", false, ident("i")))]),
            ),
            stmt(ident("i")),
        ]);
        assert_eq!(eval(source).unwrap(), number(50_000.0));
    }
}

mod test_functions {
    use super::*;

    #[test]
    fn test_declare_and_call() {
        // function f(x) { return x * 2 }  f(21)  =>  42
        let source = program(vec![
            func_decl(
                "f",
                vec![ident("x")],
                vec![ret(Some(binary("*", ident("x"), lit(2))))],
            ),
            stmt(call(ident("f"), vec![lit(21)])),
        ]);
        assert_eq!(eval(source).unwrap(), number(42.0));
    }

    #[test]
    fn test_rest_parameter_collects_the_tail() {
        // function r(...xs) { return xs.length }  r(1,2,3,4)  =>  4
        let source = program(vec![
            func_decl(
                "r",
                vec![rest("xs")],
                vec![ret(Some(member(ident("xs"), "length")))],
            ),
            stmt(call(ident("r"), vec![lit(1), lit(2), lit(3), lit(4)])),
        ]);
        assert_eq!(eval(source).unwrap(), number(4.0));
    }

    #[test]
    fn test_rest_parameter_is_empty_not_absent() {
        let source = program(vec![
            func_decl(
                "r",
                vec![ident("a"), rest("xs")],
                vec![ret(Some(member(ident("xs"), "length")))],
            ),
            stmt(call(ident("r"), vec![lit(1)])),
        ]);
        assert_eq!(eval(source).unwrap(), number(0.0));
    }

    #[test]
    fn test_arguments_binding() {
        let source = program(vec![
            func_decl("f", vec![], vec![ret(Some(member(ident("arguments"), "length")))]),
            stmt(call(ident("f"), vec![lit(1), lit(2)])),
        ]);
        assert_eq!(eval(source).unwrap(), number(2.0));
    }

    #[test]
    fn test_missing_arguments_bind_undefined() {
        let source = program(vec![
            func_decl("f", vec![ident("a"), ident("b")], vec![ret(Some(ident("b")))]),
            stmt(call(ident("f"), vec![lit(1)])),
        ]);
        assert_eq!(eval(source).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_return_equals_last_expression() {
        let explicit = program(vec![
            func_decl("f", vec![], vec![ret(Some(lit(42)))]),
            stmt(call(ident("f"), vec![])),
        ]);
        let implicit = program(vec![
            func_decl("f", vec![], vec![stmt(lit(42))]),
            stmt(call(ident("f"), vec![])),
        ]);
        assert_eq!(eval(explicit).unwrap(), eval(implicit).unwrap());
    }

    #[test]
    fn test_return_short_circuits_the_body() {
        let source = program(vec![
            func_decl(
                "f",
                vec![],
                vec![ret(Some(lit(1))), stmt(ident("boom"))],
            ),
            stmt(call(ident("f"), vec![])),
        ]);
        assert_eq!(eval(source).unwrap(), number(1.0));
    }

    #[test]
    fn test_closure_counter() {
        let source = program(vec![
            func_decl(
                "counter",
                vec![],
                vec![
                    var("let", "n", Some(lit(0))),
                    ret(Some(func_expr(
                        vec![],
                        vec![stmt(update("++", true, ident("n"))), ret(Some(ident("n")))],
                    ))),
                ],
            ),
            var("let", "c", Some(call(ident("counter"), vec![]))),
            stmt(call(ident("c"), vec![])),
            stmt(call(ident("c"), vec![])),
        ]);
        assert_eq!(eval(source).unwrap(), number(2.0));
    }

    #[test]
    fn test_this_in_a_method_call() {
        let source = program(vec![
            var(
                "let",
                "o",
                Some(record(vec![
                    ("v", lit(5)),
                    (
                        "get",
                        func_expr(
                            vec![],
                            vec![ret(Some(member(
                                json!({"type": "ThisExpression"}),
                                "v",
                            )))],
                        ),
                    ),
                ])),
            ),
            stmt(call(member(ident("o"), "get"), vec![])),
        ]);
        assert_eq!(eval(source).unwrap(), number(5.0));
    }

    #[test]
    fn test_new_binds_a_fresh_this() {
        let source = program(vec![
            func_decl(
                "P",
                vec![ident("n")],
                vec![stmt(assign(
                    "=",
                    member(json!({"type": "ThisExpression"}), "n"),
                    ident("n"),
                ))],
            ),
            stmt(member(construct(ident("P"), vec![lit(7)]), "n")),
        ]);
        assert_eq!(eval(source).unwrap(), number(7.0));
    }

    #[test]
    fn test_new_prefers_an_explicit_object_return() {
        let source = program(vec![
            func_decl("Q", vec![], vec![ret(Some(record(vec![("a", lit(1))])))]),
            stmt(member(construct(ident("Q"), vec![]), "a")),
        ]);
        assert_eq!(eval(source).unwrap(), number(1.0));
    }

    #[test]
    fn test_calling_a_non_function_is_a_type_error() {
        let source = program(vec![stmt(call(lit(3), vec![]))]);
        let packet = eval(source).unwrap_err();
        assert_eq!(packet.error_name().as_deref(), Some("TypeError"));
    }

    #[test]
    fn test_map_with_an_interpreted_callback() {
        let source = program(vec![stmt(call(
            member(array(vec![lit(1), lit(2), lit(3)]), "map"),
            vec![func_expr(
                vec![ident("x")],
                vec![ret(Some(binary("*", ident("x"), lit(2))))],
            )],
        ))]);
        assert_eq!(
            eval(source).unwrap(),
            object::new_array(vec![number(2.0), number(4.0), number(6.0)])
        );
    }

    #[test]
    fn test_function_call_native() {
        let source = program(vec![
            func_decl(
                "f",
                vec![ident("a")],
                vec![ret(Some(binary(
                    "+",
                    member(json!({"type": "ThisExpression"}), "base"),
                    ident("a"),
                )))],
            ),
            stmt(call(
                member(ident("f"), "call"),
                vec![record(vec![("base", lit(10))]), lit(5)],
            )),
        ]);
        assert_eq!(eval(source).unwrap(), number(15.0));
    }
}

mod test_exceptions {
    use super::*;

    #[test]
    fn test_throw_caught_by_catch() {
        // try { throw "v" } catch (e) { e }  =>  "v"
        let source = program(vec![try_stmt(
            vec![throw(lit("v"))],
            Some(("e", vec![stmt(ident("e"))])),
            None,
        )]);
        assert_eq!(eval(source).unwrap(), string("v"));
    }

    #[test]
    fn test_throw_inside_for_of_inside_try() {
        // for (let o of [1,2,3]) { throw 'e' } wrapped in try/catch  =>  "e"
        let source = program(vec![try_stmt(
            vec![for_of(
                "o",
                array(vec![lit(1), lit(2), lit(3)]),
                block(vec![throw(lit("e"))]),
            )],
            Some(("e", vec![stmt(ident("e"))])),
            None,
        )]);
        assert_eq!(eval(source).unwrap(), string("e"));
    }

    #[test]
    fn test_uncaught_throw_reaches_the_error_continuation() {
        let source = program(vec![throw(lit("boom"))]);
        let packet = eval(source).unwrap_err();
        assert_eq!(packet.control, Control::Throw(string("boom")));
        assert!(packet.location.is_some());
    }

    #[test]
    fn test_finally_runs_on_every_path() {
        let source = program(vec![
            var("let", "log", Some(lit(""))),
            try_stmt(
                vec![throw(lit("x"))],
                Some(("e", vec![stmt(assign("+=", ident("log"), lit("c")))])),
                Some(vec![stmt(assign("+=", ident("log"), lit("f")))]),
            ),
            stmt(ident("log")),
        ]);
        assert_eq!(eval(source).unwrap(), string("cf"));

        let source = program(vec![
            var("let", "log", Some(lit(""))),
            try_stmt(
                vec![stmt(assign("+=", ident("log"), lit("t")))],
                Some(("e", vec![stmt(assign("+=", ident("log"), lit("c")))])),
                Some(vec![stmt(assign("+=", ident("log"), lit("f")))]),
            ),
            stmt(ident("log")),
        ]);
        assert_eq!(eval(source).unwrap(), string("tf"));
    }

    #[test]
    fn test_abrupt_finally_supersedes() {
        let source = program(vec![try_stmt(
            vec![throw(lit("a"))],
            None,
            Some(vec![throw(lit("b"))]),
        )]);
        let packet = eval(source).unwrap_err();
        assert_eq!(packet.control, Control::Throw(string("b")));
    }

    #[test]
    fn test_return_passes_through_catch_but_runs_finally() {
        let source = program(vec![
            var("let", "log", Some(lit(""))),
            func_decl(
                "f",
                vec![],
                vec![try_stmt(
                    vec![ret(Some(lit(1)))],
                    Some(("e", vec![stmt(lit(99))])),
                    Some(vec![stmt(assign("+=", ident("log"), lit("f")))]),
                )],
            ),
            stmt(binary("+", call(ident("f"), vec![]), ident("log"))),
        ]);
        assert_eq!(eval(source).unwrap(), string("1f"));
    }

    #[test]
    fn test_unbound_identifier_never_calls_the_success_continuation() {
        let context = EvaluationContext::new();
        let settled = RefCell::new(None);
        context.evaluate(
            program(vec![stmt(ident("window"))]),
            |_| panic!("an unbound identifier must not succeed"),
            |packet| *settled.borrow_mut() = Some(packet),
            None,
            None,
        );
        let packet = settled.into_inner().expect("evaluation settled");
        assert_eq!(packet.error_name().as_deref(), Some("ReferenceError"));
        assert!(packet.location.is_some());
    }

    #[test]
    fn test_reference_error_is_catchable() {
        let source = program(vec![try_stmt(
            vec![stmt(ident("window"))],
            Some(("e", vec![stmt(member(ident("e"), "name"))])),
            None,
        )]);
        assert_eq!(eval(source).unwrap(), string("ReferenceError"));
    }

    #[test]
    fn test_unknown_node_kind_fails_explicitly() {
        let source = program(vec![stmt(json!({"type": "AwaitExpression"}))]);
        let packet = eval(source).unwrap_err();
        assert_eq!(
            packet.control,
            Control::NotImplemented("AwaitExpression".to_string())
        );
    }

    #[test]
    fn test_unknown_node_kind_passes_through_try() {
        let source = program(vec![try_stmt(
            vec![stmt(json!({"type": "AwaitExpression"}))],
            Some(("e", vec![stmt(lit(1))])),
            None,
        )]);
        assert!(matches!(
            eval(source).unwrap_err().control,
            Control::NotImplemented(_)
        ));
    }

    #[test]
    fn test_unsupported_assignment_operator() {
        let source = program(vec![stmt(json!({
            "type": "AssignmentExpression",
            "operator": "**=",
            "left": ident("a"),
            "right": lit(1),
        }))]);
        let packet = eval(source).unwrap_err();
        assert!(matches!(packet.control, Control::NotImplemented(_)));
    }

    #[test]
    fn test_unsupported_parameter_pattern_notifies_the_host() {
        let reported = Rc::new(RefCell::new(Vec::new()));
        let hook = reported.clone();
        let config = EvaluationConfig::new().with_on_error(Rc::new(move |error| {
            hook.borrow_mut().push(error.message.clone());
        }));

        let context = EvaluationContext::new();
        let settled = RefCell::new(None);
        let source = program(vec![
            json!({
                "type": "FunctionDeclaration",
                "id": ident("f"),
                "params": [{"type": "ObjectPattern", "properties": []}],
                "body": block(vec![]),
            }),
            stmt(call(ident("f"), vec![lit(1)])),
        ]);
        context.evaluate(
            source,
            |_| panic!("unsupported pattern must not succeed"),
            |packet| *settled.borrow_mut() = Some(packet),
            None,
            Some(config),
        );
        let packet = settled.into_inner().expect("evaluation settled");
        assert!(matches!(packet.control, Control::NotImplemented(_)));
        assert_eq!(reported.borrow().len(), 1);
    }

    #[test]
    fn test_thrown_error_object_keeps_its_shape() {
        let source = program(vec![try_stmt(
            vec![throw(construct(ident("TypeError"), vec![lit("bad")]))],
            Some(("e", vec![stmt(member(ident("e"), "message"))])),
            None,
        )]);
        assert_eq!(eval(source).unwrap(), string("bad"));
    }
}

mod test_natives {
    use super::*;

    #[test]
    fn test_math() {
        let source = program(vec![stmt(call(member(ident("Math"), "floor"), vec![lit(2.7)]))]);
        assert_eq!(eval(source).unwrap(), number(2.0));

        let source = program(vec![stmt(call(
            member(ident("Math"), "max"),
            vec![lit(1), lit(5), lit(3)],
        ))]);
        assert_eq!(eval(source).unwrap(), number(5.0));
    }

    #[test]
    fn test_json_round_trip() {
        let source = program(vec![stmt(member(
            call(member(ident("JSON"), "parse"), vec![lit("{\"a\": 1}")]),
            "a",
        ))]);
        assert_eq!(eval(source).unwrap(), number(1.0));

        let source = program(vec![stmt(call(
            member(ident("JSON"), "stringify"),
            vec![array(vec![lit(1), lit(2)])],
        ))]);
        assert_eq!(eval(source).unwrap(), string("[1,2]"));
    }

    #[test]
    fn test_parsing_helpers() {
        let source = program(vec![stmt(call(ident("parseInt"), vec![lit("42px")]))]);
        assert_eq!(eval(source).unwrap(), number(42.0));

        let source = program(vec![stmt(call(ident("parseFloat"), vec![lit("3.5x")]))]);
        assert_eq!(eval(source).unwrap(), number(3.5));

        let source = program(vec![stmt(call(ident("isNaN"), vec![lit("x")]))]);
        assert_eq!(eval(source).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_object_keys_and_is_array() {
        let source = program(vec![stmt(call(
            member(ident("Object"), "keys"),
            vec![record(vec![("b", lit(1)), ("a", lit(2))])],
        ))]);
        assert_eq!(
            eval(source).unwrap(),
            object::new_array(vec![string("a"), string("b")])
        );

        let source = program(vec![stmt(call(
            member(ident("Array"), "isArray"),
            vec![array(vec![])],
        ))]);
        assert_eq!(eval(source).unwrap(), Value::Boolean(true));
    }
}

mod test_interceptor {
    use super::*;

    type Event = (Phase, &'static str, Rc<str>);

    fn record_events(source: Json) -> Vec<Event> {
        let events: Rc<RefCell<Vec<Event>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let config = EvaluationConfig::new().with_interceptor(Rc::new(move |evaluation| {
            sink.borrow_mut().push((
                evaluation.phase,
                evaluation.node.kind_name(),
                evaluation.script_id.clone(),
            ));
            Ok(())
        }));
        let context = EvaluationContext::new();
        context.evaluate(source, |_| {}, |_| {}, None, Some(config));
        let recorded = events.borrow().clone();
        recorded
    }

    #[test]
    fn test_enter_and_exit_balance() {
        let source = program(vec![
            var("let", "x", Some(binary("+", lit(1), lit(2)))),
            stmt(ident("x")),
        ]);
        let events = record_events(source);

        let mut depth = 0i64;
        for (phase, _, _) in &events {
            match phase {
                Phase::Enter => depth += 1,
                Phase::Exit => {
                    depth -= 1;
                    assert!(depth >= 0, "exit without a matching enter");
                }
            }
        }
        assert_eq!(depth, 0, "enters and exits must balance");
        assert!(!events.is_empty());
    }

    #[test]
    fn test_events_are_depth_first() {
        let source = program(vec![stmt(binary("+", lit(1), lit(2)))]);
        let events = record_events(source);
        let names: Vec<(Phase, &str)> = events
            .iter()
            .map(|(phase, name, _)| (*phase, *name))
            .collect();
        assert_eq!(
            names,
            vec![
                (Phase::Enter, "Program"),
                (Phase::Enter, "ExpressionStatement"),
                (Phase::Enter, "BinaryExpression"),
                (Phase::Enter, "Literal"),
                (Phase::Exit, "Literal"),
                (Phase::Enter, "Literal"),
                (Phase::Exit, "Literal"),
                (Phase::Exit, "BinaryExpression"),
                (Phase::Exit, "ExpressionStatement"),
                (Phase::Exit, "Program"),
            ]
        );
    }

    #[test]
    fn test_exit_fires_on_the_error_path_too() {
        let source = program(vec![throw(lit("x"))]);
        let events = record_events(source);
        let enters = events.iter().filter(|(p, _, _)| *p == Phase::Enter).count();
        let exits = events.iter().filter(|(p, _, _)| *p == Phase::Exit).count();
        assert_eq!(enters, exits);
    }

    #[test]
    fn test_script_id_is_stable_within_one_evaluation() {
        let source = program(vec![stmt(binary("+", lit(1), lit(2)))]);
        let events = record_events(source);
        let first = events[0].2.clone();
        assert!(events.iter().all(|(_, _, id)| *id == first));
    }

    #[test]
    fn test_function_invocation_emits_events_on_the_function_node() {
        let source = program(vec![
            func_decl("f", vec![], vec![ret(Some(lit(1)))]),
            stmt(call(ident("f"), vec![])),
        ]);
        let events = record_events(source);
        let function_events: Vec<Phase> = events
            .iter()
            .filter(|(_, name, _)| *name == "FunctionDeclaration")
            .map(|(phase, _, _)| *phase)
            .collect();
        // once for the declaration, once for the invocation
        assert_eq!(
            function_events,
            vec![Phase::Enter, Phase::Exit, Phase::Enter, Phase::Exit]
        );
    }

    #[test]
    fn test_interceptor_error_cancels_the_evaluation() {
        let config = EvaluationConfig::new().with_interceptor(Rc::new(|evaluation| {
            match evaluation.node.kind_name() {
                "Literal" => Err(RuntimeError {
                    message: "cancelled".to_string(),
                }),
                _ => Ok(()),
            }
        }));
        let context = EvaluationContext::new();
        let settled = RefCell::new(None);
        context.evaluate(
            program(vec![stmt(lit(1))]),
            |_| panic!("cancelled evaluation must not succeed"),
            |packet| *settled.borrow_mut() = Some(packet),
            None,
            Some(config),
        );
        let packet = settled.into_inner().expect("evaluation settled");
        assert!(matches!(packet.control, Control::Throw(_)));
    }
}

mod test_bridge {
    use super::*;
    use crate::interpreter::cps::cont::Cont;
    use crate::interpreter::Source;

    fn meta_of(source: Json) -> Rc<MetaFunction> {
        match eval(source).unwrap() {
            Value::Function(Function::Meta(meta)) => meta,
            other => panic!("expected a meta function, got {:?}", other),
        }
    }

    #[test]
    fn test_wrapper_matches_interpreted_call() {
        let definition = vec![func_decl(
            "f",
            vec![ident("x")],
            vec![ret(Some(binary("*", ident("x"), lit(2))))],
        )];

        let mut interpreted = definition.clone();
        interpreted.push(stmt(call(ident("f"), vec![lit(21)])));
        let via_eval = eval(program(interpreted)).unwrap();

        let mut reflected = definition;
        reflected.push(stmt(ident("f")));
        let meta = meta_of(program(reflected));
        let wrapper = create_meta_function_wrapper(meta);
        let via_wrapper = wrapper(Value::Undefined, vec![Value::Number(21.0)]).unwrap();

        assert_eq!(via_eval, via_wrapper);
    }

    #[test]
    fn test_wrapper_surfaces_the_thrown_value() {
        let source = program(vec![
            func_decl("f", vec![], vec![throw(lit("nope"))]),
            stmt(ident("f")),
        ]);
        let wrapper = create_meta_function_wrapper(meta_of(source));
        let packet = wrapper(Value::Undefined, vec![]).unwrap_err();
        assert_eq!(packet.control, Control::Throw(string("nope")));
    }

    #[test]
    fn test_evaluate_meta_function_directly() {
        let source = program(vec![
            func_decl(
                "add",
                vec![ident("a"), ident("b")],
                vec![ret(Some(binary("+", ident("a"), ident("b"))))],
            ),
            stmt(ident("add")),
        ]);
        let meta = meta_of(source);
        let result =
            evaluate_meta_function(meta, Value::Undefined, vec![number(2.0), number(3.0)]);
        assert_eq!(result.unwrap(), number(5.0));
    }

    #[test]
    fn test_eval_function_body() {
        let context = EvaluationContext::new();
        let source = func_expr(vec![], vec![var("let", "x", Some(lit(3))), stmt(ident("x"))]);
        let result = context.eval_function_body(Source::Json(source), None);
        assert_eq!(result.unwrap(), number(3.0));
    }

    #[test]
    fn test_return_continuation_lands() {
        let step = Cont::Return.run(number(42.0)).unwrap();
        match step {
            Trampoline::Land(value) => assert_eq!(value, number(42.0)),
            other => panic!("expected Land(42), got {:?}", other),
        }
    }

    #[test]
    fn test_return_continuation_fails_on_a_packet() {
        let step = Cont::Return.catch(ExceptionPacket::throw(string("x"))).unwrap();
        match step {
            Trampoline::Fail(packet) => assert_eq!(packet.control, Control::Throw(string("x"))),
            other => panic!("expected Fail, got {:?}", other),
        }
    }
}
