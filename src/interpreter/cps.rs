pub mod cont;
pub mod env;
pub mod error;
pub mod interceptor;
pub mod object;
pub mod operators;
pub mod procedure;
pub mod trampoline;
pub mod value;

#[cfg(test)]
mod tests;

use std::rc::Rc;

pub use cont::Cont;
pub use env::{Env, EnvRef};
pub use error::{Control, ExceptionPacket, RuntimeError};
pub use interceptor::{
    next_script_id, ErrorHook, Evaluation, EvaluationConfig, Interceptor, Phase,
};
pub use object::{Obj, ObjRef};
pub use procedure::{
    builtin, create_meta_function_wrapper, evaluate_meta_function, Function, MetaFunction,
};
pub use trampoline::{run_node, Trampoline};
pub use value::Value;

/// The per-evaluation state threaded through every continuation: the current
/// scope frame and the configuration snapshot. The config only changes at
/// meta-function boundaries, where the callee's creation-time snapshot takes
/// over.
#[derive(Clone)]
pub struct Ctx {
    pub env: EnvRef,
    pub cfg: Rc<EvaluationConfig>,
}

impl Ctx {
    pub fn new(env: EnvRef, cfg: Rc<EvaluationConfig>) -> Ctx {
        Ctx { env, cfg }
    }

    /// The same configuration over a fresh child frame.
    pub fn child(&self) -> Ctx {
        Ctx {
            env: Env::new_child(self.env.clone()),
            cfg: self.cfg.clone(),
        }
    }

    pub fn with_env(&self, env: EnvRef) -> Ctx {
        Ctx {
            env,
            cfg: self.cfg.clone(),
        }
    }
}
