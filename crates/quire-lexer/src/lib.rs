//! Quire lexer: converts formula or script source text into a token stream.

pub mod lexer;
pub mod token;

pub use lexer::{LexResult, Lexer};
pub use token::{Dialect, NumberLit, Token, TokenKind, FORMULA_KEYWORDS, SCRIPT_KEYWORDS};
