//! Quire evaluators.
//!
//! [`evaluate`] walks a formula AST against a [`FormulaScope`]; [`script::run`]
//! executes a script against a [`script::HostScope`]. Neither knows about
//! folders or memoization: the engine supplies both scopes.

mod env;
mod error;
mod evaluator;
pub mod math;
mod methods;
pub mod script;

pub use env::Environment;
pub use error::{EvalError, EvalResult, ScriptError, StackFrame};
pub use evaluator::{evaluate, FormulaContext, FormulaScope, DEFAULT_MAX_CALL_DEPTH};
pub use script::{run as run_script, Globals, HostScope, ScriptOptions};
