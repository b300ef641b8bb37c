pub mod cps;
pub mod cps_json;

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value as Json;
use tracing::info;

use crate::ast::{estree, NodeKind, NodeRef};
use crate::interpreter::cps::{
    next_script_id, run_node, Ctx, Env, EnvRef, EvaluationConfig, ExceptionPacket, MetaFunction,
    RuntimeError, Value,
};

/// The external-parser seam: anything that turns source text into a node
/// tree. A surface-syntax parser plugs in here; the bundled [`EstreeParser`]
/// accepts ESTree JSON instead.
pub trait Parse {
    fn parse(&self, source: &str) -> Result<NodeRef, RuntimeError>;
}

/// Parses ESTree-shaped JSON text through the post-parse validator.
pub struct EstreeParser;

impl Parse for EstreeParser {
    fn parse(&self, source: &str) -> Result<NodeRef, RuntimeError> {
        estree::parse(source)
    }
}

/// What an evaluation can start from: source text for the configured parser,
/// raw parser output, a pre-validated node, or a function value whose body is
/// re-entered.
pub enum Source {
    Text(String),
    Json(Json),
    Node(NodeRef),
    Function(Rc<MetaFunction>),
}

impl From<&str> for Source {
    fn from(source: &str) -> Source {
        Source::Text(source.to_string())
    }
}

impl From<String> for Source {
    fn from(source: String) -> Source {
        Source::Text(source)
    }
}

impl From<Json> for Source {
    fn from(raw: Json) -> Source {
        Source::Json(raw)
    }
}

impl From<NodeRef> for Source {
    fn from(node: NodeRef) -> Source {
        Source::Node(node)
    }
}

impl From<Rc<MetaFunction>> for Source {
    fn from(meta: Rc<MetaFunction>) -> Source {
        Source::Function(meta)
    }
}

/// The evaluation façade: a root environment with the global bindings, a
/// default configuration, and a parser. Each `evaluate` call layers its own
/// frame and configuration over these defaults and drives the trampoline to
/// completion, calling exactly one of the two continuations.
pub struct EvaluationContext {
    root: EnvRef,
    config: EvaluationConfig,
    parser: Rc<dyn Parse>,
}

impl EvaluationContext {
    pub fn new() -> EvaluationContext {
        EvaluationContext {
            root: Env::new_root(),
            config: EvaluationConfig::new(),
            parser: Rc::new(EstreeParser),
        }
    }

    pub fn with_config(mut self, config: EvaluationConfig) -> EvaluationContext {
        self.config = config;
        self
    }

    pub fn with_parser(mut self, parser: Rc<dyn Parse>) -> EvaluationContext {
        self.parser = parser;
        self
    }

    pub fn root(&self) -> EnvRef {
        self.root.clone()
    }

    /// A child frame over the root, pre-seeded with `values`. The frame is
    /// where top-level bindings of an evaluation land, so callers can inspect
    /// it afterwards.
    pub fn layer(&self, values: HashMap<String, Value>) -> EnvRef {
        Env::with_values(values, self.root.clone())
    }

    /// Primary entrypoint. Resolves `source` to a node tree, layers `env`
    /// (fresh child of the root when absent), merges `config` over the
    /// context default, assigns a script id, and evaluates. Success calls
    /// `c(value)`; failure, including parse failure, calls `cerr(packet)`.
    pub fn evaluate<C, E>(
        &self,
        source: impl Into<Source>,
        c: C,
        cerr: E,
        env: Option<EnvRef>,
        config: Option<EvaluationConfig>,
    ) where
        C: FnOnce(Value),
        E: FnOnce(ExceptionPacket),
    {
        let node = match self.resolve(source.into()) {
            Ok(node) => node,
            Err(error) => {
                self.config.report(&error);
                return cerr(ExceptionPacket::syntax_error(error.message));
            }
        };
        let env = env.unwrap_or_else(|| Env::new_child(self.root.clone()));
        // absent config: the context default with a fresh script id
        let cfg = config
            .unwrap_or_else(|| self.config.clone().with_script_id(next_script_id()));
        info!("evaluate #{} {}", cfg.script_id, node.kind_name());
        match run_node(node, Ctx::new(env, Rc::new(cfg))) {
            Ok(value) => c(value),
            Err(packet) => cerr(packet),
        }
    }

    /// The settled-future adapter: resolves with the success value, rejects
    /// with the packet.
    pub fn eval_to_result(
        &self,
        source: impl Into<Source>,
        env: Option<EnvRef>,
    ) -> Result<Value, ExceptionPacket> {
        let settled = std::cell::Cell::new(None);
        self.evaluate(
            source,
            |value| settled.set(Some(Ok(value))),
            |packet| settled.set(Some(Err(packet))),
            env,
            None,
        );
        settled
            .into_inner()
            .expect("evaluation settles synchronously")
    }

    /// Resolves `source` to a function node and evaluates its body directly
    /// in `env`, so hosts can run a function's statements against an
    /// environment of their choosing.
    pub fn eval_function_body(
        &self,
        source: impl Into<Source>,
        env: Option<EnvRef>,
    ) -> Result<Value, ExceptionPacket> {
        let node = self
            .resolve(source.into())
            .map_err(|e| ExceptionPacket::syntax_error(e.message))?;
        let body = function_body(&node)
            .ok_or_else(|| ExceptionPacket::syntax_error("source is not a single function"))?;
        let env = env.unwrap_or_else(|| Env::new_child(self.root.clone()));
        let cfg = self.config.clone().with_script_id(next_script_id());
        run_node(body, Ctx::new(env, Rc::new(cfg)))
    }

    fn resolve(&self, source: Source) -> Result<NodeRef, RuntimeError> {
        match source {
            Source::Text(text) => self.parser.parse(&text),
            Source::Json(raw) => estree::from_json(&raw),
            Source::Node(node) => Ok(node),
            Source::Function(meta) => Ok(meta.node.clone()),
        }
    }
}

impl Default for EvaluationContext {
    fn default() -> EvaluationContext {
        EvaluationContext::new()
    }
}

/// The body of the function `node` denotes: the node itself, a single
/// function declaration, or a program wrapping one function.
fn function_body(node: &NodeRef) -> Option<NodeRef> {
    if let Some(function) = node.function() {
        return Some(function.body.clone());
    }
    if let NodeKind::Program { body } = &node.kind {
        if let [single] = body.as_slice() {
            if let Some(function) = single.function() {
                return Some(function.body.clone());
            }
            if let NodeKind::ExpressionStatement { expression } = &single.kind {
                if let Some(function) = expression.function() {
                    return Some(function.body.clone());
                }
            }
        }
    }
    None
}
