//! AST node types for both Quire languages.
//!
//! Every node carries a [`Span`] for error reporting. Function bodies are
//! reference-counted so closures can hold on to them without cloning trees.

pub mod formula;
pub mod script;

use crate::Span;

/// A spanned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}
