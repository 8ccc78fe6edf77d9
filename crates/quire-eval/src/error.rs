//! Runtime error types for both evaluators.

use std::fmt;

use quire_value::ValueError;
use thiserror::Error;

/// Evaluation error: runtime traps, failed lookups, engine conditions
/// passed through a binding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Division by zero, non-finite results.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),
    /// `null.field`, `null[i]`.
    #[error("cannot read '{0}' of null")]
    NullAccess(String),
    #[error("'{0}' is not defined")]
    UndefinedVariable(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// A dependency of the current expression failed.
    #[error("error in dependency '{name}': {message}")]
    Dependency { name: String, message: String },
    /// A script wrote to or deleted a binding it did not declare.
    #[error("cannot modify '{0}': engine bindings are read-only")]
    ReadOnly(String),
    #[error("assignment to constant '{0}'")]
    ConstAssignment(String),
    /// An uncaught script `throw`.
    #[error("uncaught {0}")]
    Thrown(String),
    #[error("maximum call stack size exceeded")]
    StackOverflow,
    /// A failure the engine itself raised (cycles, unresolved modules).
    #[error("{0}")]
    Engine(String),
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error("{0}")]
    Runtime(String),
}

impl EvalError {
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch(message.into())
    }

    /// Returns `true` when the failure is engine-internal and must keep
    /// that classification through every dependent expression.
    pub fn is_engine(&self) -> bool {
        match self {
            Self::Engine(_) => true,
            Self::Value(err) => err.is_engine(),
            _ => false,
        }
    }
}

impl From<EvalError> for ValueError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::Value(inner) => inner,
            EvalError::Engine(message) => ValueError::Engine(message),
            other => ValueError::Runtime(other.to_string()),
        }
    }
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;

/// One entry of a script stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function: String,
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {} ({}:{})", self.function, self.line, self.col)
    }
}

/// Frames kept on a trace; deep recursion keeps only the innermost.
const MAX_STACK_FRAMES: usize = 32;

/// A script failure together with the call stack it unwound through,
/// innermost frame first.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct ScriptError {
    pub error: EvalError,
    pub stack: Vec<StackFrame>,
    /// Position inside the innermost unfinished frame, set by the first
    /// statement the error escapes.
    pub(crate) pending: Option<(u32, u32)>,
}

impl ScriptError {
    pub fn new(error: EvalError) -> Self {
        Self {
            error,
            stack: Vec::new(),
            pending: None,
        }
    }

    pub fn is_engine(&self) -> bool {
        self.error.is_engine()
    }

    /// The stack rendered one frame per line.
    pub fn trace(&self) -> Option<String> {
        if self.stack.is_empty() {
            return None;
        }
        let lines: Vec<String> = self.stack.iter().map(ToString::to_string).collect();
        Some(lines.join("\n"))
    }

    pub(crate) fn locate(&mut self, line: u32, col: u32) {
        if self.pending.is_none() {
            self.pending = Some((line, col));
        }
    }

    /// Close the innermost frame under `function`.
    pub(crate) fn unwind(&mut self, function: &str) {
        if let Some((line, col)) = self.pending.take() {
            if self.stack.len() >= MAX_STACK_FRAMES {
                return;
            }
            self.stack.push(StackFrame {
                function: function.to_string(),
                line,
                col,
            });
        }
    }
}

impl From<EvalError> for ScriptError {
    fn from(error: EvalError) -> Self {
        Self::new(error)
    }
}

impl From<ValueError> for ScriptError {
    fn from(err: ValueError) -> Self {
        Self::new(EvalError::Value(err))
    }
}

impl From<ScriptError> for ValueError {
    fn from(err: ScriptError) -> Self {
        err.error.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_classification_survives_conversion() {
        let err = EvalError::Engine("circular reference".into());
        assert!(err.is_engine());
        let value: ValueError = err.into();
        assert_eq!(value, ValueError::Engine("circular reference".into()));
        assert!(EvalError::from(value).is_engine());
    }

    #[test]
    fn test_runtime_errors_flatten_to_message() {
        let value: ValueError = EvalError::Arithmetic("division by zero".into()).into();
        assert_eq!(value, ValueError::Runtime("arithmetic error: division by zero".into()));
    }

    #[test]
    fn test_unwind_records_pending_location_once() {
        let mut err = ScriptError::new(EvalError::Thrown("boom".into()));
        err.locate(3, 5);
        err.locate(9, 9);
        err.unwind("inner");
        err.locate(7, 1);
        err.unwind("main");
        assert_eq!(err.trace().as_deref(), Some("at inner (3:5)\nat main (7:1)"));
    }
}
