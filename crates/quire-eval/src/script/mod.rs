//! The script interpreter.
//!
//! Scripts run against a [`HostScope`] that supplies every name the
//! script does not declare itself. Host bindings are read-only: assigning
//! to or deleting one fails with [`EvalError::ReadOnly`].
//!
//! ```ignore
//! let script = parse_script(&SourceFile::new("main", "return 1 + 2;")).into_result()?;
//! let value = run(&script, Rc::new(Globals::new()), &ScriptOptions::default())?;
//! ```
//!
//! [`EvalError::ReadOnly`]: crate::EvalError::ReadOnly

pub mod builtins;
mod interpreter;
mod methods;
mod ops;
mod scope;

use std::rc::Rc;

use quire_types::ast::script::Script;
use quire_value::{NativeValue, ValueResult};
use rustc_hash::FxHashMap;

use crate::error::ScriptError;
use crate::evaluator::DEFAULT_MAX_CALL_DEPTH;
use interpreter::Interpreter;

/// Name resolution outside the script's own declarations.
pub trait HostScope {
    /// Whether `name` resolves, without evaluating anything.
    fn has(&self, name: &str) -> bool;

    /// The value bound to `name`, or `None` when nothing is.
    fn get(&self, name: &str) -> ValueResult<Option<NativeValue>>;
}

/// A fixed host scope: the built-in globals plus caller-provided values.
#[derive(Debug, Default, Clone)]
pub struct Globals {
    values: FxHashMap<String, NativeValue>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: NativeValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }
}

impl HostScope for Globals {
    fn has(&self, name: &str) -> bool {
        builtins::is_global(name) || self.values.contains_key(name)
    }

    fn get(&self, name: &str) -> ValueResult<Option<NativeValue>> {
        Ok(builtins::global(name).or_else(|| self.values.get(name).cloned()))
    }
}

/// Per-execution settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOptions {
    /// Function name of the top-level frame in stack traces.
    pub name: String,
    pub max_call_depth: u32,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl ScriptOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_max_call_depth(mut self, depth: u32) -> Self {
        self.max_call_depth = depth;
        self
    }
}

/// Execute a script. A top-level `return` yields its value; a script
/// that completes without one yields `null`.
pub fn run(script: &Script, host: Rc<dyn HostScope>, options: &ScriptOptions) -> Result<NativeValue, ScriptError> {
    tracing::trace!(script = %options.name, "running script");
    let interpreter = Interpreter::new(host, options.max_call_depth);
    interpreter.run(script, &options.name)
}
