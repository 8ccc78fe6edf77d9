//! Shared types for Quire.
//!
//! This crate defines the AST node types for both expression languages,
//! source spans, syntax-error collections, and the structured diagnostic
//! details the evaluation engine reports to its consumers.

mod diagnostic;
mod error;
mod span;
pub mod ast;

pub use diagnostic::{ErrorContext, ErrorDetail, ErrorKind, SourceLocation};
pub use error::{ErrorCategory, ErrorCode, SyntaxError, SyntaxErrors, MAX_ERRORS};
pub use span::{SourceFile, Span};

/// Language tag carried by every expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// The declarative single-expression language.
    Formula,
    /// The imperative statement language.
    Script,
}

impl Language {
    /// Map a language tag or file extension onto a language.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "formula" | "fx" => Some(Self::Formula),
            "script" | "js" => Some(Self::Script),
            _ => None,
        }
    }

    /// Canonical file extension for sources in this language.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Formula => "fx",
            Self::Script => "js",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Formula => write!(f, "formula"),
            Self::Script => write!(f, "script"),
        }
    }
}
