//! Structured error details reported by the evaluation engine.

use serde::{Deserialize, Serialize};

/// Where an evaluation error originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Malformed formula source.
    Parser,
    /// A failure while executing either language.
    Runtime,
    /// Engine bookkeeping failures: circular references, missing modules,
    /// cyclic native values.
    Engine,
}

impl ErrorKind {
    /// The lowercase tag used in JSON and in error-tag values.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parser => "parser",
            Self::Runtime => "runtime",
            Self::Engine => "engine",
        }
    }
}

/// A resolved position inside a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Byte offset into the source.
    pub index: usize,
    /// 1-based line.
    pub line: u32,
    /// 1-based column (characters).
    pub column: u32,
    /// Span length in bytes.
    pub length: usize,
}

/// The offending source line and an underline marking the error span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub line_text: String,
    pub underline: String,
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n{}", self.line_text, self.underline)
    }
}

/// One entry of an evaluation result's error detail list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorDetail {
    /// A detail with no location information.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            context: None,
            stack: None,
        }
    }

    /// Attach a source location and context snippet.
    pub fn with_location(mut self, location: SourceLocation, context: ErrorContext) -> Self {
        self.location = Some(location);
        self.context = Some(context);
        self
    }

    /// Attach an execution stack.
    pub fn with_stack(mut self, stack: Option<String>) -> Self {
        self.stack = stack;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_json_omits_missing_fields() {
        let detail = ErrorDetail::new(ErrorKind::Engine, "circular reference");
        let json = serde_json::to_string(&detail).unwrap();
        assert_eq!(json, r#"{"kind":"engine","message":"circular reference"}"#);
    }

    #[test]
    fn test_context_display() {
        let ctx = ErrorContext {
            line_text: "1 + )".into(),
            underline: "    ^".into(),
        };
        assert_eq!(ctx.to_string(), "1 + )\n    ^");
    }
}
