use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{LiteralValue, NodeKind, NodeRef, Pattern};
use crate::interpreter::cps::cont::{
    eval_declarators, eval_elements, eval_props, eval_seq, Cont,
};
use crate::interpreter::cps::procedure::MetaFunction;
use crate::interpreter::cps::value::Value;
use crate::interpreter::cps::{
    Ctx, EvaluationConfig, ExceptionPacket, Function, Phase, RuntimeError,
};
use crate::runtime_error;

/// One step of the evaluation loop. `Bounce` dispatches a node, `Run` feeds a
/// value into a continuation, `Unwind` feeds an exception packet into one,
/// `Land`/`Fail` terminate. Because every step returns here instead of
/// recursing, iteration runs in constant stack space.
pub enum Trampoline {
    Bounce(NodeRef, Ctx, Cont),
    Run(Value, Cont),
    Unwind(ExceptionPacket, Cont),
    Land(Value),
    Fail(ExceptionPacket),
}

impl std::fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trampoline::Bounce(node, _, k) => {
                write!(f, "Bounce({}, env, {:?})", node.kind_name(), k)
            }
            Trampoline::Run(val, k) => write!(f, "Run({:?}, {:?})", val, k),
            Trampoline::Unwind(packet, k) => write!(f, "Unwind({}, {:?})", packet, k),
            Trampoline::Land(val) => write!(f, "Land({:?})", val),
            Trampoline::Fail(packet) => write!(f, "Fail({})", packet),
        }
    }
}

/// Evaluates one node to completion. The top-level continuation is `Return`;
/// internal errors are reported to the host hook and surface as throw
/// packets.
pub fn run_node(node: NodeRef, ctx: Ctx) -> Result<Value, ExceptionPacket> {
    let cfg = ctx.cfg.clone();
    run_loop(Trampoline::Bounce(node, ctx, Cont::Return), &cfg)
}

/// The driver loop: bounces until the evaluation lands or fails.
pub fn run_loop(
    step: Trampoline,
    cfg: &Rc<EvaluationConfig>,
) -> Result<Value, ExceptionPacket> {
    let mut step = step;
    loop {
        trace!("{:?}", step);
        let next = match step {
            Trampoline::Bounce(node, ctx, k) => bounce(node, ctx, k),
            Trampoline::Run(val, k) => k.run(val),
            Trampoline::Unwind(packet, k) => k.catch(packet),
            Trampoline::Land(val) => return Ok(val),
            Trampoline::Fail(packet) => return Err(packet),
        };
        step = match next {
            Ok(next) => next,
            Err(error) => {
                cfg.report(&error);
                return Err(ExceptionPacket::error("InternalError", error.message));
            }
        };
    }
}

/// Node dispatch: emits the interceptor `enter` event, installs the exit
/// guard, then delegates on the node kind.
pub fn bounce(node: NodeRef, ctx: Ctx, k: Cont) -> Result<Trampoline, RuntimeError> {
    if let Err(e) = ctx.cfg.emit(&node, &ctx.env, Phase::Enter, None) {
        debug!("interceptor failed on enter: {}", e);
        return Ok(Trampoline::Unwind(
            ExceptionPacket::error("Error", e.message).locate(&node),
            k,
        ));
    }
    let k = Cont::ExitNode {
        node: node.clone(),
        ctx: ctx.clone(),
        k: Box::new(k),
    };
    dispatch(node, ctx, k)
}

fn dispatch(node: NodeRef, ctx: Ctx, k: Cont) -> Result<Trampoline, RuntimeError> {
    match &node.kind {
        NodeKind::Program { body } => eval_seq(VecDeque::from(body.clone()), ctx, Box::new(k)),
        NodeKind::BlockStatement { body } => {
            eval_seq(VecDeque::from(body.clone()), ctx.child(), Box::new(k))
        }
        NodeKind::ExpressionStatement { expression } => {
            Ok(Trampoline::Bounce(expression.clone(), ctx, k))
        }

        NodeKind::Literal { value } => Ok(Trampoline::Run(literal(value), k)),
        NodeKind::Identifier { name } => match ctx.env.borrow().get(name) {
            Some(value) => Ok(Trampoline::Run(value, k)),
            None => Ok(Trampoline::Unwind(
                ExceptionPacket::reference_error(format!("{} is not defined", name))
                    .locate(&node),
                k,
            )),
        },
        NodeKind::ThisExpression => Ok(Trampoline::Run(
            ctx.env.borrow().get("this").unwrap_or(Value::Undefined),
            k,
        )),

        NodeKind::BinaryExpression {
            operator,
            left,
            right,
        } => Ok(Trampoline::Bounce(
            left.clone(),
            ctx.clone(),
            Cont::EvalBinaryRhs(*operator, right.clone(), ctx, Box::new(k)),
        )),
        NodeKind::LogicalExpression {
            operator,
            left,
            right,
        } => Ok(Trampoline::Bounce(
            left.clone(),
            ctx.clone(),
            Cont::EvalLogicalRhs(*operator, right.clone(), ctx, Box::new(k)),
        )),
        NodeKind::UnaryExpression { operator, argument } => Ok(Trampoline::Bounce(
            argument.clone(),
            ctx,
            Cont::ApplyUnary(*operator, Box::new(k)),
        )),
        NodeKind::UpdateExpression {
            operator,
            prefix,
            argument,
        } => eval_update(&node, *operator, *prefix, argument, ctx, k),
        NodeKind::AssignmentExpression {
            operator,
            left,
            right,
        } => eval_assignment(&node, operator.binary(), left, right, ctx, k),
        NodeKind::MemberExpression {
            object,
            property,
            computed,
        } => Ok(Trampoline::Bounce(
            object.clone(),
            ctx.clone(),
            Cont::GetMember {
                property: property.clone(),
                computed: *computed,
                ctx,
                k: Box::new(k),
            },
        )),

        NodeKind::CallExpression { callee, arguments } => {
            let arguments = VecDeque::from(arguments.clone());
            match &callee.kind {
                NodeKind::MemberExpression {
                    object,
                    property,
                    computed,
                } => Ok(Trampoline::Bounce(
                    object.clone(),
                    ctx.clone(),
                    Cont::CallMember {
                        property: property.clone(),
                        computed: *computed,
                        arguments,
                        ctx,
                        k: Box::new(k),
                    },
                )),
                _ => Ok(Trampoline::Bounce(
                    callee.clone(),
                    ctx.clone(),
                    Cont::CallCallee {
                        arguments,
                        construct: false,
                        ctx,
                        k: Box::new(k),
                    },
                )),
            }
        }
        NodeKind::NewExpression { callee, arguments } => Ok(Trampoline::Bounce(
            callee.clone(),
            ctx.clone(),
            Cont::CallCallee {
                arguments: VecDeque::from(arguments.clone()),
                construct: true,
                ctx,
                k: Box::new(k),
            },
        )),

        NodeKind::ArrayExpression { elements } => {
            eval_elements(VecDeque::from(elements.clone()), Vec::new(), ctx, Box::new(k))
        }
        NodeKind::ObjectExpression { properties } => {
            eval_props(VecDeque::from(properties.clone()), Vec::new(), ctx, Box::new(k))
        }

        NodeKind::FunctionExpression(_) | NodeKind::ArrowFunctionExpression(_) => Ok(
            Trampoline::Run(Value::Function(Function::Meta(MetaFunction::new(&node, &ctx))), k),
        ),
        NodeKind::FunctionDeclaration(function) => {
            let meta = Value::Function(Function::Meta(MetaFunction::new(&node, &ctx)));
            match &function.id {
                Some(name) => {
                    ctx.env.borrow_mut().define(name.clone(), meta);
                    Ok(Trampoline::Run(Value::Undefined, k))
                }
                None => Ok(Trampoline::Unwind(
                    ExceptionPacket::not_implemented("anonymous function declaration")
                        .locate(&node),
                    k,
                )),
            }
        }

        NodeKind::VariableDeclaration { declarations, .. } => {
            eval_declarators(VecDeque::from(declarations.clone()), ctx, Box::new(k))
        }

        NodeKind::IfStatement {
            test,
            consequent,
            alternate,
        } => Ok(Trampoline::Bounce(
            test.clone(),
            ctx.clone(),
            Cont::Branch(consequent.clone(), alternate.clone(), ctx, Box::new(k)),
        )),
        NodeKind::ConditionalExpression {
            test,
            consequent,
            alternate,
        } => Ok(Trampoline::Bounce(
            test.clone(),
            ctx.clone(),
            Cont::Branch(
                consequent.clone(),
                Some(alternate.clone()),
                ctx,
                Box::new(k),
            ),
        )),

        NodeKind::WhileStatement { test, body } => Ok(Trampoline::Bounce(
            test.clone(),
            ctx.clone(),
            Cont::LoopTest {
                test: Some(test.clone()),
                update: None,
                body: body.clone(),
                ctx,
                k: Box::new(k),
            },
        )),
        NodeKind::DoWhileStatement { body, test } => Ok(Trampoline::Bounce(
            body.clone(),
            ctx.clone(),
            Cont::LoopIter {
                test: Some(test.clone()),
                update: None,
                body: body.clone(),
                ctx,
                k: Box::new(k),
            },
        )),
        NodeKind::ForStatement {
            init,
            test,
            update,
            body,
        } => {
            // The loop gets one frame of its own; `let` initializers live
            // there for the whole loop.
            let loop_ctx = ctx.child();
            let after_init = Cont::LoopUpdate {
                test: test.clone(),
                update: update.clone(),
                body: body.clone(),
                ctx: loop_ctx.clone(),
                k: Box::new(k),
            };
            match init {
                Some(init) => Ok(Trampoline::Bounce(init.clone(), loop_ctx, after_init)),
                None => after_init.run(Value::Undefined),
            }
        }

        NodeKind::ForOfStatement { left, right, body } => {
            eval_for_iteration(&node, left, right, body, false, ctx, k)
        }
        NodeKind::ForInStatement { left, right, body } => {
            eval_for_iteration(&node, left, right, body, true, ctx, k)
        }

        NodeKind::BreakStatement { label } => Ok(Trampoline::Unwind(
            ExceptionPacket::brk(label.clone()).locate(&node),
            k,
        )),
        NodeKind::ContinueStatement { label } => Ok(Trampoline::Unwind(
            ExceptionPacket::cont(label.clone()).locate(&node),
            k,
        )),
        NodeKind::ReturnStatement { argument } => match argument {
            Some(argument) => Ok(Trampoline::Bounce(
                argument.clone(),
                ctx,
                Cont::RaiseReturn(Box::new(k)),
            )),
            None => Ok(Trampoline::Unwind(
                ExceptionPacket::ret(Value::Undefined).locate(&node),
                k,
            )),
        },
        NodeKind::ThrowStatement { argument } => Ok(Trampoline::Bounce(
            argument.clone(),
            ctx,
            Cont::RaiseThrow(Box::new(k)),
        )),

        NodeKind::TryStatement {
            block,
            handler,
            finalizer,
        } => Ok(Trampoline::Bounce(
            block.clone(),
            ctx.clone(),
            Cont::TryCatch {
                handler: handler.clone(),
                finalizer: finalizer.clone(),
                ctx,
                k: Box::new(k),
            },
        )),

        NodeKind::VariableDeclarator { .. } | NodeKind::CatchClause { .. } => {
            runtime_error!("{} cannot be evaluated directly", node.kind_name())
        }

        NodeKind::Unknown { kind } => Ok(Trampoline::Unwind(
            ExceptionPacket::not_implemented(kind.clone()).locate(&node),
            k,
        )),
    }
}

pub fn literal(value: &LiteralValue) -> Value {
    match value {
        LiteralValue::Null => Value::Null,
        LiteralValue::Boolean(b) => Value::Boolean(*b),
        LiteralValue::Number(n) => Value::Number(*n),
        LiteralValue::String(s) => Value::String(s.clone()),
    }
}

fn eval_update(
    node: &NodeRef,
    op: crate::ast::ops::UpdateOp,
    prefix: bool,
    argument: &NodeRef,
    ctx: Ctx,
    k: Cont,
) -> Result<Trampoline, RuntimeError> {
    use crate::ast::ops::UpdateOp;

    match &argument.kind {
        NodeKind::Identifier { name } => {
            let old = match ctx.env.borrow().get(name) {
                Some(old) => old,
                None => {
                    return Ok(Trampoline::Unwind(
                        ExceptionPacket::reference_error(format!("{} is not defined", name))
                            .locate(node),
                        k,
                    ))
                }
            };
            let old = match old.to_number() {
                Ok(old) => old,
                Err(e) => {
                    return Ok(Trampoline::Unwind(
                        ExceptionPacket::type_error(e.message).locate(node),
                        k,
                    ))
                }
            };
            let new = match op {
                UpdateOp::Inc => old + 1.0,
                UpdateOp::Dec => old - 1.0,
            };
            ctx.env.borrow_mut().set(name, Value::Number(new));
            Ok(Trampoline::Run(
                Value::Number(if prefix { new } else { old }),
                k,
            ))
        }
        NodeKind::MemberExpression {
            object,
            property,
            computed,
        } => Ok(Trampoline::Bounce(
            object.clone(),
            ctx.clone(),
            Cont::UpdateMember {
                property: property.clone(),
                computed: *computed,
                op,
                prefix,
                ctx,
                k: Box::new(k),
            },
        )),
        _ => Ok(Trampoline::Unwind(
            ExceptionPacket::not_implemented(format!(
                "update of a {} target",
                argument.kind_name()
            ))
            .locate(node),
            k,
        )),
    }
}

fn eval_assignment(
    node: &NodeRef,
    op: Option<crate::ast::ops::BinaryOp>,
    left: &NodeRef,
    right: &NodeRef,
    ctx: Ctx,
    k: Cont,
) -> Result<Trampoline, RuntimeError> {
    match &left.kind {
        NodeKind::Identifier { name } => Ok(Trampoline::Bounce(
            right.clone(),
            ctx.clone(),
            Cont::AssignIdent(name.clone(), op, ctx, Box::new(k)),
        )),
        NodeKind::MemberExpression {
            object,
            property,
            computed,
        } => Ok(Trampoline::Bounce(
            object.clone(),
            ctx.clone(),
            Cont::AssignMember {
                property: property.clone(),
                computed: *computed,
                op,
                rhs: right.clone(),
                ctx,
                k: Box::new(k),
            },
        )),
        _ => Ok(Trampoline::Unwind(
            ExceptionPacket::not_implemented(format!(
                "assignment to a {} target",
                left.kind_name()
            ))
            .locate(node),
            k,
        )),
    }
}

/// `for..of` / `for..in`: the loop variable is a single-identifier
/// declaration, or a bare identifier assigned each round.
fn eval_for_iteration(
    node: &NodeRef,
    left: &NodeRef,
    right: &NodeRef,
    body: &NodeRef,
    keys: bool,
    ctx: Ctx,
    k: Cont,
) -> Result<Trampoline, RuntimeError> {
    let binding = match &left.kind {
        NodeKind::Identifier { name } => Some((name.clone(), false)),
        NodeKind::VariableDeclaration { declarations, .. } => match declarations.as_slice() {
            [declarator] => match &declarator.kind {
                NodeKind::VariableDeclarator {
                    id: Pattern::Identifier { name },
                    init: None,
                } => Some((name.clone(), true)),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    };
    match binding {
        Some((binding, declare)) => Ok(Trampoline::Bounce(
            right.clone(),
            ctx.clone(),
            Cont::IterInit {
                binding,
                declare,
                keys,
                body: body.clone(),
                ctx,
                k: Box::new(k),
            },
        )),
        None => Ok(Trampoline::Unwind(
            ExceptionPacket::not_implemented(format!(
                "loop binding {}",
                left.kind_name()
            ))
            .locate(node),
            k,
        )),
    }
}
