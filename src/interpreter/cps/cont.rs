use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

use crate::ast::ops::{BinaryOp, LogicalOp, UnaryOp, UpdateOp};
use crate::ast::{NodeKind, NodeRef, Pattern, Property};
use crate::interpreter::cps::procedure::apply;
use crate::interpreter::cps::trampoline::literal;
use crate::interpreter::cps::value::Value;
use crate::interpreter::cps::{
    object, operators, Control, Ctx, Env, ExceptionPacket, Phase, RuntimeError, Trampoline,
};
use crate::runtime_error;

/// Defunctionalized continuations. Every variant holds what it needs to
/// resume once the pending sub-evaluation delivers a value, plus the next
/// continuation. `run` consumes the continuation with a value; `catch`
/// consumes it with an exception packet, which is how non-local control finds
/// the construct that claims it.
pub enum Cont {
    /// Rest of a statement sequence; yields the last statement's value.
    EvalSeq(VecDeque<NodeRef>, Ctx, Box<Cont>),

    EvalBinaryRhs(BinaryOp, NodeRef, Ctx, Box<Cont>),
    ApplyBinary(BinaryOp, Value, Box<Cont>),
    EvalLogicalRhs(LogicalOp, NodeRef, Ctx, Box<Cont>),
    ApplyUnary(UnaryOp, Box<Cont>),

    /// Consequent / optional alternate, keyed on the test value.
    Branch(NodeRef, Option<NodeRef>, Ctx, Box<Cont>),

    /// Binds the just-evaluated initializer, then the remaining declarators.
    BindDeclarators(String, VecDeque<NodeRef>, Ctx, Box<Cont>),

    AssignIdent(String, Option<BinaryOp>, Ctx, Box<Cont>),
    AssignMember {
        property: NodeRef,
        computed: bool,
        op: Option<BinaryOp>,
        rhs: NodeRef,
        ctx: Ctx,
        k: Box<Cont>,
    },
    AssignMemberKey {
        object: Value,
        op: Option<BinaryOp>,
        rhs: NodeRef,
        ctx: Ctx,
        k: Box<Cont>,
    },
    AssignMemberValue {
        object: Value,
        key: String,
        op: Option<BinaryOp>,
        k: Box<Cont>,
    },

    UpdateMember {
        property: NodeRef,
        computed: bool,
        op: UpdateOp,
        prefix: bool,
        ctx: Ctx,
        k: Box<Cont>,
    },
    UpdateMemberKey {
        object: Value,
        op: UpdateOp,
        prefix: bool,
        k: Box<Cont>,
    },

    GetMember {
        property: NodeRef,
        computed: bool,
        ctx: Ctx,
        k: Box<Cont>,
    },
    GetProperty {
        object: Value,
        k: Box<Cont>,
    },

    /// Callee evaluated; arguments pending. Plain calls and `new`.
    CallCallee {
        arguments: VecDeque<NodeRef>,
        construct: bool,
        ctx: Ctx,
        k: Box<Cont>,
    },
    /// Receiver of a method call evaluated; the member key is next.
    CallMember {
        property: NodeRef,
        computed: bool,
        arguments: VecDeque<NodeRef>,
        ctx: Ctx,
        k: Box<Cont>,
    },
    CallMethod {
        object: Value,
        arguments: VecDeque<NodeRef>,
        ctx: Ctx,
        k: Box<Cont>,
    },
    /// Argument accumulation, then application.
    EvalArgs {
        callee: Value,
        this: Value,
        construct: bool,
        rest: VecDeque<NodeRef>,
        acc: Vec<Value>,
        ctx: Ctx,
        k: Box<Cont>,
    },

    EvalElems {
        rest: VecDeque<Option<NodeRef>>,
        acc: Vec<Value>,
        ctx: Ctx,
        k: Box<Cont>,
    },
    ObjPropKey {
        value: NodeRef,
        rest: VecDeque<Property>,
        acc: Vec<(String, Value)>,
        ctx: Ctx,
        k: Box<Cont>,
    },
    ObjPropValue {
        key: String,
        rest: VecDeque<Property>,
        acc: Vec<(String, Value)>,
        ctx: Ctx,
        k: Box<Cont>,
    },

    /// `while`/`do..while`/`for` trampoline. `LoopTest` judges the test
    /// value, `LoopIter` resumes after a body pass and claims unlabeled
    /// break/continue, `LoopUpdate` resumes after a `for` update expression.
    LoopTest {
        test: Option<NodeRef>,
        update: Option<NodeRef>,
        body: NodeRef,
        ctx: Ctx,
        k: Box<Cont>,
    },
    LoopIter {
        test: Option<NodeRef>,
        update: Option<NodeRef>,
        body: NodeRef,
        ctx: Ctx,
        k: Box<Cont>,
    },
    LoopUpdate {
        test: Option<NodeRef>,
        update: Option<NodeRef>,
        body: NodeRef,
        ctx: Ctx,
        k: Box<Cont>,
    },

    /// `for..of` / `for..in`: the iterable just evaluated.
    IterInit {
        binding: String,
        declare: bool,
        keys: bool,
        body: NodeRef,
        ctx: Ctx,
        k: Box<Cont>,
    },
    IterNext {
        binding: String,
        declare: bool,
        items: VecDeque<Value>,
        body: NodeRef,
        ctx: Ctx,
        k: Box<Cont>,
    },

    RaiseReturn(Box<Cont>),
    RaiseThrow(Box<Cont>),

    TryCatch {
        handler: Option<NodeRef>,
        finalizer: Option<NodeRef>,
        ctx: Ctx,
        k: Box<Cont>,
    },
    /// Runs the finalizer after a catch body, on either completion path.
    FinallyGate {
        finalizer: NodeRef,
        ctx: Ctx,
        k: Box<Cont>,
    },
    /// Replays the sealed completion once the finalizer finishes; an abrupt
    /// finalizer supersedes it.
    FinallySeal {
        completion: Result<Value, ExceptionPacket>,
        k: Box<Cont>,
    },

    /// Function-body boundary: claims `Return`, settles constructor results,
    /// stamps escaping packets with the function node.
    FnReturn {
        node: NodeRef,
        this: Option<Value>,
        k: Box<Cont>,
    },
    /// Interceptor exit guard; fires exactly once, on either path.
    ExitNode {
        node: NodeRef,
        ctx: Ctx,
        k: Box<Cont>,
    },

    Return,
}

impl Cont {
    pub fn run(self, val: Value) -> Result<Trampoline, RuntimeError> {
        match self {
            Cont::EvalSeq(rest, ctx, k) => match rest.is_empty() {
                true => Ok(Trampoline::Run(val, *k)),
                false => eval_seq(rest, ctx, k),
            },

            Cont::EvalBinaryRhs(op, right, ctx, k) => {
                Ok(Trampoline::Bounce(right, ctx, Cont::ApplyBinary(op, val, k)))
            }
            Cont::ApplyBinary(op, lhs, k) => match operators::apply_binary(op, lhs, val) {
                Ok(result) => Ok(Trampoline::Run(result, *k)),
                Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
            },
            Cont::EvalLogicalRhs(op, right, ctx, k) => {
                let short_circuit = match op {
                    LogicalOp::And => !val.truthy(),
                    LogicalOp::Or => val.truthy(),
                    LogicalOp::Nullish => !matches!(val, Value::Undefined | Value::Null),
                };
                match short_circuit {
                    true => Ok(Trampoline::Run(val, *k)),
                    false => Ok(Trampoline::Bounce(right, ctx, *k)),
                }
            }
            Cont::ApplyUnary(op, k) => match operators::apply_unary(op, val) {
                Ok(result) => Ok(Trampoline::Run(result, *k)),
                Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
            },

            Cont::Branch(consequent, alternate, ctx, k) => match val.truthy() {
                true => Ok(Trampoline::Bounce(consequent, ctx, *k)),
                false => match alternate {
                    Some(alternate) => Ok(Trampoline::Bounce(alternate, ctx, *k)),
                    None => Ok(Trampoline::Run(Value::Undefined, *k)),
                },
            },

            Cont::BindDeclarators(name, rest, ctx, k) => {
                ctx.env.borrow_mut().define(name, val);
                eval_declarators(rest, ctx, k)
            }

            Cont::AssignIdent(name, op, ctx, k) => match op {
                None => match assign_variable(&ctx, &name, val.clone()) {
                    Ok(()) => Ok(Trampoline::Run(val, *k)),
                    Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
                },
                Some(op) => {
                    let old = match ctx.env.borrow().get(&name) {
                        Some(old) => old,
                        None => {
                            return Ok(Trampoline::Unwind(
                                ExceptionPacket::reference_error(format!(
                                    "{} is not defined",
                                    name
                                )),
                                *k,
                            ))
                        }
                    };
                    match operators::apply_binary(op, old, val) {
                        Ok(combined) => {
                            ctx.env.borrow_mut().set(&name, combined.clone());
                            Ok(Trampoline::Run(combined, *k))
                        }
                        Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
                    }
                }
            },

            Cont::AssignMember {
                property,
                computed,
                op,
                rhs,
                ctx,
                k,
            } => match computed {
                true => Ok(Trampoline::Bounce(
                    property,
                    ctx.clone(),
                    Cont::AssignMemberKey {
                        object: val,
                        op,
                        rhs,
                        ctx,
                        k,
                    },
                )),
                false => match static_key(&property) {
                    Ok(key) => Ok(Trampoline::Bounce(
                        rhs,
                        ctx,
                        Cont::AssignMemberValue {
                            object: val,
                            key,
                            op,
                            k,
                        },
                    )),
                    Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
                },
            },
            Cont::AssignMemberKey {
                object,
                op,
                rhs,
                ctx,
                k,
            } => Ok(Trampoline::Bounce(
                rhs,
                ctx,
                Cont::AssignMemberValue {
                    object,
                    key: val.to_property_key(),
                    op,
                    k,
                },
            )),
            Cont::AssignMemberValue { object, key, op, k } => {
                let result = match op {
                    None => object::set_property(&object, &key, val.clone()).map(|_| val),
                    Some(op) => object::get_property(&object, &key)
                        .and_then(|old| operators::apply_binary(op, old, val))
                        .and_then(|combined| {
                            object::set_property(&object, &key, combined.clone())
                                .map(|_| combined)
                        }),
                };
                match result {
                    Ok(result) => Ok(Trampoline::Run(result, *k)),
                    Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
                }
            }

            Cont::UpdateMember {
                property,
                computed,
                op,
                prefix,
                ctx,
                k,
            } => match computed {
                true => Ok(Trampoline::Bounce(
                    property,
                    ctx,
                    Cont::UpdateMemberKey {
                        object: val,
                        op,
                        prefix,
                        k,
                    },
                )),
                false => match static_key(&property)
                    .and_then(|key| member_update(&val, &key, op, prefix))
                {
                    Ok(result) => Ok(Trampoline::Run(result, *k)),
                    Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
                },
            },
            Cont::UpdateMemberKey {
                object,
                op,
                prefix,
                k,
            } => match member_update(&object, &val.to_property_key(), op, prefix) {
                Ok(result) => Ok(Trampoline::Run(result, *k)),
                Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
            },

            Cont::GetMember {
                property,
                computed,
                ctx,
                k,
            } => match computed {
                true => Ok(Trampoline::Bounce(
                    property,
                    ctx,
                    Cont::GetProperty { object: val, k },
                )),
                false => match static_key(&property)
                    .and_then(|key| object::get_property(&val, &key))
                {
                    Ok(result) => Ok(Trampoline::Run(result, *k)),
                    Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
                },
            },
            Cont::GetProperty { object, k } => {
                match object::get_property(&object, &val.to_property_key()) {
                    Ok(result) => Ok(Trampoline::Run(result, *k)),
                    Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
                }
            }

            Cont::CallCallee {
                arguments,
                construct,
                ctx,
                k,
            } => eval_args(val, Value::Undefined, construct, arguments, Vec::new(), ctx, k),
            Cont::CallMember {
                property,
                computed,
                arguments,
                ctx,
                k,
            } => match computed {
                true => Ok(Trampoline::Bounce(
                    property,
                    ctx.clone(),
                    Cont::CallMethod {
                        object: val,
                        arguments,
                        ctx,
                        k,
                    },
                )),
                false => match static_key(&property)
                    .and_then(|key| object::get_property(&val, &key))
                {
                    Ok(callee) => eval_args(callee, val, false, arguments, Vec::new(), ctx, k),
                    Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
                },
            },
            Cont::CallMethod {
                object,
                arguments,
                ctx,
                k,
            } => match object::get_property(&object, &val.to_property_key()) {
                Ok(callee) => eval_args(callee, object, false, arguments, Vec::new(), ctx, k),
                Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
            },
            Cont::EvalArgs {
                callee,
                this,
                construct,
                rest,
                mut acc,
                ctx,
                k,
            } => {
                acc.push(val);
                eval_args(callee, this, construct, rest, acc, ctx, k)
            }

            Cont::EvalElems {
                rest,
                mut acc,
                ctx,
                k,
            } => {
                acc.push(val);
                eval_elements(rest, acc, ctx, k)
            }
            Cont::ObjPropKey {
                value,
                rest,
                acc,
                ctx,
                k,
            } => Ok(Trampoline::Bounce(
                value,
                ctx.clone(),
                Cont::ObjPropValue {
                    key: val.to_property_key(),
                    rest,
                    acc,
                    ctx,
                    k,
                },
            )),
            Cont::ObjPropValue {
                key,
                rest,
                mut acc,
                ctx,
                k,
            } => {
                acc.push((key, val));
                eval_props(rest, acc, ctx, k)
            }

            Cont::LoopTest {
                test,
                update,
                body,
                ctx,
                k,
            } => match val.truthy() {
                true => Ok(Trampoline::Bounce(
                    body.clone(),
                    ctx.clone(),
                    Cont::LoopIter {
                        test,
                        update,
                        body,
                        ctx,
                        k,
                    },
                )),
                false => Ok(Trampoline::Run(Value::Undefined, *k)),
            },
            Cont::LoopIter {
                test,
                update,
                body,
                ctx,
                k,
            } => match update {
                Some(update) => Ok(Trampoline::Bounce(
                    update.clone(),
                    ctx.clone(),
                    Cont::LoopUpdate {
                        test,
                        update: Some(update),
                        body,
                        ctx,
                        k,
                    },
                )),
                None => Ok(loop_continue(test, None, body, ctx, k)),
            },
            Cont::LoopUpdate {
                test,
                update,
                body,
                ctx,
                k,
            } => Ok(loop_continue(test, update, body, ctx, k)),

            Cont::IterInit {
                binding,
                declare,
                keys,
                body,
                ctx,
                k,
            } => {
                let items = match keys {
                    true => object::enumerate_keys(&val)
                        .map(|keys| keys.into_iter().map(Value::String).collect()),
                    false => object::iterate(&val),
                };
                match items {
                    Ok(items) => iter_step(binding, declare, VecDeque::from(items), body, ctx, k),
                    Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
                }
            }
            Cont::IterNext {
                binding,
                declare,
                items,
                body,
                ctx,
                k,
            } => iter_step(binding, declare, items, body, ctx, k),

            Cont::RaiseReturn(k) => Ok(Trampoline::Unwind(ExceptionPacket::ret(val), *k)),
            Cont::RaiseThrow(k) => Ok(Trampoline::Unwind(ExceptionPacket::throw(val), *k)),

            Cont::TryCatch {
                finalizer, ctx, k, ..
            } => match finalizer {
                Some(finalizer) => Ok(Trampoline::Bounce(
                    finalizer,
                    ctx,
                    Cont::FinallySeal {
                        completion: Ok(val),
                        k,
                    },
                )),
                None => Ok(Trampoline::Run(val, *k)),
            },
            Cont::FinallyGate { finalizer, ctx, k } => Ok(Trampoline::Bounce(
                finalizer,
                ctx,
                Cont::FinallySeal {
                    completion: Ok(val),
                    k,
                },
            )),
            Cont::FinallySeal { completion, k } => match completion {
                Ok(sealed) => Ok(Trampoline::Run(sealed, *k)),
                Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
            },

            Cont::FnReturn { this, k, .. } => Ok(Trampoline::Run(settle_construct(val, this), *k)),
            Cont::ExitNode { node, ctx, k } => {
                match ctx.cfg.emit(&node, &ctx.env, Phase::Exit, Some(val.clone())) {
                    Ok(()) => Ok(Trampoline::Run(val, *k)),
                    Err(e) => {
                        debug!("interceptor failed on exit: {}", e);
                        Ok(Trampoline::Unwind(
                            ExceptionPacket::error("Error", e.message).locate(&node),
                            *k,
                        ))
                    }
                }
            }

            Cont::Return => Ok(Trampoline::Land(val)),
        }
    }

    /// Unwinds an exception packet one continuation at a time. Most
    /// continuations pass it through; the bridging constructs claim what is
    /// theirs.
    pub fn catch(self, packet: ExceptionPacket) -> Result<Trampoline, RuntimeError> {
        match self {
            Cont::LoopIter {
                test,
                update,
                body,
                ctx,
                k,
            } => match packet.control {
                Control::Break(None) => Ok(Trampoline::Run(Value::Undefined, *k)),
                Control::Continue(None) => match update {
                    Some(update) => Ok(Trampoline::Bounce(
                        update.clone(),
                        ctx.clone(),
                        Cont::LoopUpdate {
                            test,
                            update: Some(update),
                            body,
                            ctx,
                            k,
                        },
                    )),
                    None => Ok(loop_continue(test, None, body, ctx, k)),
                },
                _ => Ok(Trampoline::Unwind(packet, *k)),
            },
            Cont::IterNext {
                binding,
                declare,
                items,
                body,
                ctx,
                k,
            } => match packet.control {
                Control::Break(None) => Ok(Trampoline::Run(Value::Undefined, *k)),
                Control::Continue(None) => iter_step(binding, declare, items, body, ctx, k),
                _ => Ok(Trampoline::Unwind(packet, *k)),
            },

            Cont::TryCatch {
                handler,
                finalizer,
                ctx,
                k,
            } => {
                let caught = match (&packet.control, &handler) {
                    (Control::Throw(thrown), Some(handler)) => Some((thrown.clone(), handler.clone())),
                    _ => None,
                };
                match caught {
                    Some((thrown, handler)) => {
                        let after = match finalizer {
                            Some(finalizer) => Cont::FinallyGate {
                                finalizer,
                                ctx: ctx.clone(),
                                k,
                            },
                            None => *k,
                        };
                        let (param, body) = match &handler.kind {
                            NodeKind::CatchClause { param, body } => (param.clone(), body.clone()),
                            _ => runtime_error!("TryStatement handler is not a CatchClause"),
                        };
                        let hctx = ctx.child();
                        match param {
                            None => {}
                            Some(Pattern::Identifier { name }) => {
                                hctx.env.borrow_mut().define(name, thrown);
                            }
                            Some(other) => {
                                let error = RuntimeError {
                                    message: format!("catch parameter pattern {:?} is not supported", other),
                                };
                                ctx.cfg.report(&error);
                                return Ok(Trampoline::Unwind(
                                    ExceptionPacket::not_implemented(error.message)
                                        .locate(&handler),
                                    after,
                                ));
                            }
                        }
                        Ok(Trampoline::Bounce(body, hctx, after))
                    }
                    None => match finalizer {
                        Some(finalizer) => Ok(Trampoline::Bounce(
                            finalizer,
                            ctx,
                            Cont::FinallySeal {
                                completion: Err(packet),
                                k,
                            },
                        )),
                        None => Ok(Trampoline::Unwind(packet, *k)),
                    },
                }
            }
            Cont::FinallyGate { finalizer, ctx, k } => Ok(Trampoline::Bounce(
                finalizer,
                ctx,
                Cont::FinallySeal {
                    completion: Err(packet),
                    k,
                },
            )),
            // The finalizer itself completed abruptly; its packet supersedes
            // the sealed completion.
            Cont::FinallySeal { k, .. } => Ok(Trampoline::Unwind(packet, *k)),

            Cont::FnReturn { node, this, k } => match packet.control {
                Control::Return(result) => {
                    Ok(Trampoline::Run(settle_construct(result, this), *k))
                }
                _ => Ok(Trampoline::Unwind(packet.locate(&node), *k)),
            },
            Cont::ExitNode { node, ctx, k } => {
                if let Err(e) = ctx.cfg.emit(
                    &node,
                    &ctx.env,
                    Phase::Exit,
                    Some(packet.observed_value()),
                ) {
                    debug!("interceptor failed during unwind: {}", e);
                }
                Ok(Trampoline::Unwind(packet.locate(&node), *k))
            }

            Cont::Return => Ok(Trampoline::Fail(packet)),

            other => Ok(Trampoline::Unwind(packet, other.into_next()?)),
        }
    }

    /// The next continuation of a pass-through variant, for unwinding.
    fn into_next(self) -> Result<Cont, RuntimeError> {
        match self {
            Cont::EvalSeq(_, _, k)
            | Cont::EvalBinaryRhs(_, _, _, k)
            | Cont::ApplyBinary(_, _, k)
            | Cont::EvalLogicalRhs(_, _, _, k)
            | Cont::ApplyUnary(_, k)
            | Cont::Branch(_, _, _, k)
            | Cont::BindDeclarators(_, _, _, k)
            | Cont::AssignIdent(_, _, _, k)
            | Cont::AssignMember { k, .. }
            | Cont::AssignMemberKey { k, .. }
            | Cont::AssignMemberValue { k, .. }
            | Cont::UpdateMember { k, .. }
            | Cont::UpdateMemberKey { k, .. }
            | Cont::GetMember { k, .. }
            | Cont::GetProperty { k, .. }
            | Cont::CallCallee { k, .. }
            | Cont::CallMember { k, .. }
            | Cont::CallMethod { k, .. }
            | Cont::EvalArgs { k, .. }
            | Cont::EvalElems { k, .. }
            | Cont::ObjPropKey { k, .. }
            | Cont::ObjPropValue { k, .. }
            | Cont::LoopTest { k, .. }
            | Cont::LoopUpdate { k, .. }
            | Cont::IterInit { k, .. }
            | Cont::RaiseReturn(k)
            | Cont::RaiseThrow(k) => Ok(*k),
            other => runtime_error!("cannot unwind through {:?}", other),
        }
    }
}

/// Evaluates the next statement of a non-empty sequence.
pub fn eval_seq(
    mut rest: VecDeque<NodeRef>,
    ctx: Ctx,
    k: Box<Cont>,
) -> Result<Trampoline, RuntimeError> {
    match rest.pop_front() {
        Some(first) => Ok(Trampoline::Bounce(
            first,
            ctx.clone(),
            Cont::EvalSeq(rest, ctx, k),
        )),
        None => Ok(Trampoline::Run(Value::Undefined, *k)),
    }
}

/// Binds declarators left to right; initializers evaluate through the
/// trampoline, absent initializers bind `undefined` directly.
pub fn eval_declarators(
    mut rest: VecDeque<NodeRef>,
    ctx: Ctx,
    k: Box<Cont>,
) -> Result<Trampoline, RuntimeError> {
    loop {
        let declarator = match rest.pop_front() {
            Some(declarator) => declarator,
            None => return Ok(Trampoline::Run(Value::Undefined, *k)),
        };
        let (id, init) = match &declarator.kind {
            NodeKind::VariableDeclarator { id, init } => (id.clone(), init.clone()),
            _ => runtime_error!(
                "VariableDeclaration contains a {} node",
                declarator.kind_name()
            ),
        };
        let name = match id {
            Pattern::Identifier { name } => name,
            other => {
                let error = RuntimeError {
                    message: format!("declaration pattern {:?} is not supported", other),
                };
                ctx.cfg.report(&error);
                return Ok(Trampoline::Unwind(
                    ExceptionPacket::not_implemented(error.message).locate(&declarator),
                    *k,
                ));
            }
        };
        match init {
            Some(init) => {
                return Ok(Trampoline::Bounce(
                    init,
                    ctx.clone(),
                    Cont::BindDeclarators(name, rest, ctx, k),
                ))
            }
            None => {
                ctx.env.borrow_mut().define(name, Value::Undefined);
            }
        }
    }
}

/// Evaluates the next pending call argument, or applies the callee.
pub fn eval_args(
    callee: Value,
    this: Value,
    construct: bool,
    mut rest: VecDeque<NodeRef>,
    acc: Vec<Value>,
    ctx: Ctx,
    k: Box<Cont>,
) -> Result<Trampoline, RuntimeError> {
    match rest.pop_front() {
        Some(first) => Ok(Trampoline::Bounce(
            first,
            ctx.clone(),
            Cont::EvalArgs {
                callee,
                this,
                construct,
                rest,
                acc,
                ctx,
                k,
            },
        )),
        None => apply(callee, this, acc, construct, k),
    }
}

/// Evaluates the next array element; elisions contribute `undefined` without
/// a bounce.
pub fn eval_elements(
    mut rest: VecDeque<Option<NodeRef>>,
    mut acc: Vec<Value>,
    ctx: Ctx,
    k: Box<Cont>,
) -> Result<Trampoline, RuntimeError> {
    loop {
        match rest.pop_front() {
            None => return Ok(Trampoline::Run(object::new_array(acc), *k)),
            Some(None) => acc.push(Value::Undefined),
            Some(Some(element)) => {
                return Ok(Trampoline::Bounce(
                    element,
                    ctx.clone(),
                    Cont::EvalElems { rest, acc, ctx, k },
                ))
            }
        }
    }
}

/// Evaluates the next object-literal entry: computed keys bounce through the
/// trampoline, static keys go straight to the value.
pub fn eval_props(
    mut rest: VecDeque<Property>,
    acc: Vec<(String, Value)>,
    ctx: Ctx,
    k: Box<Cont>,
) -> Result<Trampoline, RuntimeError> {
    match rest.pop_front() {
        None => Ok(Trampoline::Run(
            object::new_record(acc.into_iter().collect()),
            *k,
        )),
        Some(Property {
            key,
            value,
            computed,
        }) => match computed {
            true => Ok(Trampoline::Bounce(
                key,
                ctx.clone(),
                Cont::ObjPropKey {
                    value,
                    rest,
                    acc,
                    ctx,
                    k,
                },
            )),
            false => match static_key(&key) {
                Ok(key) => Ok(Trampoline::Bounce(
                    value,
                    ctx.clone(),
                    Cont::ObjPropValue {
                        key,
                        rest,
                        acc,
                        ctx,
                        k,
                    },
                )),
                Err(packet) => Ok(Trampoline::Unwind(packet, *k)),
            },
        },
    }
}

/// Re-enters a loop after a body pass: test when there is one, straight back
/// into the body otherwise.
pub fn loop_continue(
    test: Option<NodeRef>,
    update: Option<NodeRef>,
    body: NodeRef,
    ctx: Ctx,
    k: Box<Cont>,
) -> Trampoline {
    match test {
        Some(test) => Trampoline::Bounce(
            test.clone(),
            ctx.clone(),
            Cont::LoopTest {
                test: Some(test),
                update,
                body,
                ctx,
                k,
            },
        ),
        None => Trampoline::Bounce(
            body.clone(),
            ctx.clone(),
            Cont::LoopIter {
                test: None,
                update,
                body,
                ctx,
                k,
            },
        ),
    }
}

/// Advances a `for..of`/`for..in` loop by one item. Each iteration binds the
/// loop variable in a fresh frame (declaration form) or assigns it
/// (identifier form).
pub fn iter_step(
    binding: String,
    declare: bool,
    mut items: VecDeque<Value>,
    body: NodeRef,
    ctx: Ctx,
    k: Box<Cont>,
) -> Result<Trampoline, RuntimeError> {
    let item = match items.pop_front() {
        Some(item) => item,
        None => return Ok(Trampoline::Run(Value::Undefined, *k)),
    };
    let iteration_ctx = match declare {
        true => {
            let iteration_ctx = ctx.child();
            iteration_ctx
                .env
                .borrow_mut()
                .define(binding.clone(), item);
            iteration_ctx
        }
        false => match assign_variable(&ctx, &binding, item) {
            Ok(()) => ctx.clone(),
            Err(packet) => return Ok(Trampoline::Unwind(packet, *k)),
        },
    };
    Ok(Trampoline::Bounce(
        body.clone(),
        iteration_ctx,
        Cont::IterNext {
            binding,
            declare,
            items,
            body,
            ctx,
            k,
        },
    ))
}

/// Assignment to an identifier: nearest binding frame, else the sloppy
/// create-at-root rule, else a reference error in strict mode.
pub fn assign_variable(ctx: &Ctx, name: &str, value: Value) -> Result<(), ExceptionPacket> {
    if ctx.env.borrow_mut().set(name, value.clone()) {
        return Ok(());
    }
    if ctx.cfg.strict {
        return Err(ExceptionPacket::reference_error(format!(
            "{} is not defined",
            name
        )));
    }
    Env::get_root(ctx.env.clone())
        .borrow_mut()
        .define(name.to_string(), value);
    Ok(())
}

/// The key of a non-computed member access or object-literal entry.
fn static_key(node: &NodeRef) -> Result<String, ExceptionPacket> {
    match &node.kind {
        NodeKind::Identifier { name } => Ok(name.clone()),
        NodeKind::Literal { value } => Ok(literal(value).to_property_key()),
        _ => Err(
            ExceptionPacket::not_implemented(format!("property key {}", node.kind_name()))
                .locate(node),
        ),
    }
}

/// `++`/`--` on a member: read, coerce, write back. The postfix result is the
/// numeric-coerced pre-update value.
fn member_update(
    object: &Value,
    key: &str,
    op: UpdateOp,
    prefix: bool,
) -> Result<Value, ExceptionPacket> {
    let old = object::get_property(object, key)?;
    let old = old
        .to_number()
        .map_err(|e| ExceptionPacket::type_error(e.message))?;
    let new = match op {
        UpdateOp::Inc => old + 1.0,
        UpdateOp::Dec => old - 1.0,
    };
    object::set_property(object, key, Value::Number(new))?;
    Ok(Value::Number(if prefix { new } else { old }))
}

/// Constructor-call result: an explicit object return wins, anything else
/// yields the fresh `this`.
fn settle_construct(result: Value, this: Option<Value>) -> Value {
    match this {
        Some(this) => match result {
            Value::Object(_) => result,
            _ => this,
        },
        None => result,
    }
}

impl fmt::Debug for Cont {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cont::EvalSeq(rest, _, k) => write!(f, "<EvalSeq {} {:?}>", rest.len(), k),
            Cont::EvalBinaryRhs(op, _, _, k) => write!(f, "<EvalBinaryRhs {} {:?}>", op.as_str(), k),
            Cont::ApplyBinary(op, lhs, k) => {
                write!(f, "<ApplyBinary {:?} {} {:?}>", lhs, op.as_str(), k)
            }
            Cont::EvalLogicalRhs(op, _, _, k) => {
                write!(f, "<EvalLogicalRhs {} {:?}>", op.as_str(), k)
            }
            Cont::ApplyUnary(op, k) => write!(f, "<ApplyUnary {} {:?}>", op.as_str(), k),
            Cont::Branch(_, _, _, k) => write!(f, "<Branch {:?}>", k),
            Cont::BindDeclarators(name, _, _, k) => write!(f, "<BindDeclarators {} {:?}>", name, k),
            Cont::AssignIdent(name, _, _, k) => write!(f, "<AssignIdent {} {:?}>", name, k),
            Cont::AssignMember { k, .. } => write!(f, "<AssignMember {:?}>", k),
            Cont::AssignMemberKey { k, .. } => write!(f, "<AssignMemberKey {:?}>", k),
            Cont::AssignMemberValue { key, k, .. } => {
                write!(f, "<AssignMemberValue {} {:?}>", key, k)
            }
            Cont::UpdateMember { k, .. } => write!(f, "<UpdateMember {:?}>", k),
            Cont::UpdateMemberKey { k, .. } => write!(f, "<UpdateMemberKey {:?}>", k),
            Cont::GetMember { k, .. } => write!(f, "<GetMember {:?}>", k),
            Cont::GetProperty { k, .. } => write!(f, "<GetProperty {:?}>", k),
            Cont::CallCallee { k, .. } => write!(f, "<CallCallee {:?}>", k),
            Cont::CallMember { k, .. } => write!(f, "<CallMember {:?}>", k),
            Cont::CallMethod { k, .. } => write!(f, "<CallMethod {:?}>", k),
            Cont::EvalArgs { rest, acc, k, .. } => {
                write!(f, "<EvalArgs rest={} acc={} {:?}>", rest.len(), acc.len(), k)
            }
            Cont::EvalElems { rest, acc, k, .. } => {
                write!(f, "<EvalElems rest={} acc={} {:?}>", rest.len(), acc.len(), k)
            }
            Cont::ObjPropKey { k, .. } => write!(f, "<ObjPropKey {:?}>", k),
            Cont::ObjPropValue { key, k, .. } => write!(f, "<ObjPropValue {} {:?}>", key, k),
            Cont::LoopTest { k, .. } => write!(f, "<LoopTest {:?}>", k),
            Cont::LoopIter { k, .. } => write!(f, "<LoopIter {:?}>", k),
            Cont::LoopUpdate { k, .. } => write!(f, "<LoopUpdate {:?}>", k),
            Cont::IterInit { binding, k, .. } => write!(f, "<IterInit {} {:?}>", binding, k),
            Cont::IterNext {
                binding, items, k, ..
            } => write!(f, "<IterNext {} items={} {:?}>", binding, items.len(), k),
            Cont::RaiseReturn(k) => write!(f, "<RaiseReturn {:?}>", k),
            Cont::RaiseThrow(k) => write!(f, "<RaiseThrow {:?}>", k),
            Cont::TryCatch { k, .. } => write!(f, "<TryCatch {:?}>", k),
            Cont::FinallyGate { k, .. } => write!(f, "<FinallyGate {:?}>", k),
            Cont::FinallySeal { completion, k } => {
                write!(f, "<FinallySeal ok={} {:?}>", completion.is_ok(), k)
            }
            Cont::FnReturn { node, k, .. } => write!(f, "<FnReturn {} {:?}>", node.kind_name(), k),
            Cont::ExitNode { node, k, .. } => write!(f, "<ExitNode {} {:?}>", node.kind_name(), k),
            Cont::Return => write!(f, "<Return>"),
        }
    }
}
