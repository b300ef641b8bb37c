//! `metascript` evaluates the AST of a small curly-brace scripting language in
//! continuation-passing style. Evaluation is driven by a trampoline over
//! defunctionalized continuations; non-local control transfer (`return`,
//! `throw`, `break`, `continue`) travels as exception packets on the error
//! path, and an observer (the interceptor) is notified on entry and exit of
//! every node evaluation.
//!
//! The crate does not bundle a surface-syntax parser. Parsers plug in through
//! [`interpreter::Parse`]; the bundled [`interpreter::EstreeParser`] accepts
//! ESTree-shaped JSON and validates it into the closed node set of
//! [`ast::NodeKind`].

pub mod ast;
pub mod interpreter;

pub use interpreter::cps::{
    create_meta_function_wrapper, evaluate_meta_function, Control, Env, EnvRef, Evaluation,
    EvaluationConfig, ExceptionPacket, Function, MetaFunction, Phase, RuntimeError, Value,
};
pub use interpreter::{EstreeParser, EvaluationContext, Parse, Source};
