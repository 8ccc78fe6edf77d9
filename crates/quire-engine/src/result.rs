//! The outcome of evaluating one expression.

use quire_eval::{EvalError, ScriptError};
use quire_types::{ErrorDetail, ErrorKind};
use quire_value::{to_json, NativeValue, TypedValue, ValueError};
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Either a value, in both its native and typed forms, or a failure with
/// at least one detail.
#[derive(Debug, Clone)]
pub enum EvaluationResult {
    Value {
        value: NativeValue,
        typed: TypedValue,
    },
    Error {
        message: String,
        details: Vec<ErrorDetail>,
    },
}

impl EvaluationResult {
    pub(crate) fn success(value: NativeValue, typed: TypedValue) -> Self {
        Self::Value { value, typed }
    }

    /// A failure whose message is the first detail's.
    pub(crate) fn failure(details: Vec<ErrorDetail>) -> Self {
        let message = details
            .first()
            .map_or_else(|| "evaluation failed".to_string(), |detail| detail.message.clone());
        Self::Error { message, details }
    }

    pub(crate) fn engine(message: impl Into<String>) -> Self {
        Self::failure(vec![ErrorDetail::new(ErrorKind::Engine, message)])
    }

    pub(crate) fn from_eval_error(err: &EvalError) -> Self {
        let kind = if err.is_engine() { ErrorKind::Engine } else { ErrorKind::Runtime };
        Self::failure(vec![ErrorDetail::new(kind, err.to_string())])
    }

    pub(crate) fn from_script_error(err: &ScriptError) -> Self {
        let kind = if err.is_engine() { ErrorKind::Engine } else { ErrorKind::Runtime };
        Self::failure(vec![ErrorDetail::new(kind, err.to_string()).with_stack(err.trace())])
    }

    pub(crate) fn from_value_error(err: &ValueError) -> Self {
        let kind = if err.is_engine() { ErrorKind::Engine } else { ErrorKind::Runtime };
        Self::failure(vec![ErrorDetail::new(kind, err.to_string())])
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Value { .. })
    }

    pub fn value(&self) -> Option<&NativeValue> {
        match self {
            Self::Value { value, .. } => Some(value),
            Self::Error { .. } => None,
        }
    }

    pub fn typed(&self) -> Option<&TypedValue> {
        match self {
            Self::Value { typed, .. } => Some(typed),
            Self::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error { message, .. } => Some(message),
            Self::Value { .. } => None,
        }
    }

    pub fn error_details(&self) -> Option<&[ErrorDetail]> {
        match self {
            Self::Error { details, .. } => Some(details),
            Self::Value { .. } => None,
        }
    }

    /// Kind of the first detail.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_details()?.first().map(|detail| detail.kind)
    }

    /// The typed value, or an error tag carrying the failure.
    pub fn to_value(&self) -> TypedValue {
        match self {
            Self::Value { typed, .. } => typed.clone(),
            Self::Error { message, .. } => {
                TypedValue::error(self.error_kind().unwrap_or(ErrorKind::Runtime).as_str(), message.clone())
            }
        }
    }
}

/// `{ "value", "type", "error", "errorDetails" }`, with `null` for the
/// absent side.
impl Serialize for EvaluationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("EvaluationResult", 4)?;
        match self {
            Self::Value { typed, .. } => {
                state.serialize_field("value", &to_json(typed))?;
                state.serialize_field("type", typed.type_name())?;
                state.serialize_field("error", &None::<&str>)?;
                state.serialize_field("errorDetails", &None::<&[ErrorDetail]>)?;
            }
            Self::Error { message, details } => {
                state.serialize_field("value", &None::<()>)?;
                state.serialize_field("type", &None::<&str>)?;
                state.serialize_field("error", message)?;
                state.serialize_field("errorDetails", details)?;
            }
        }
        state.end()
    }
}
