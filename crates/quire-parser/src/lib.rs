//! Quire parser: converts a token stream into a formula or script AST.

mod parse_expr;
mod parse_formula;
mod parse_stmt;
mod parser;

pub use parser::{ParseResult, Parser};

use quire_lexer::{Dialect, Lexer};
use quire_types::ast::formula;
use quire_types::ast::script::Script;
use quire_types::SourceFile;

/// Lex and parse a formula source text.
///
/// Lexer errors come first in the returned collection.
pub fn parse_formula(source: &SourceFile) -> ParseResult<formula::Expr> {
    let lexed = Lexer::new(source, Dialect::Formula).lex();
    let parsed = Parser::new(lexed.tokens, source, Dialect::Formula).parse_formula();
    merge(lexed.errors, parsed)
}

/// Lex and parse a script source text.
pub fn parse_script(source: &SourceFile) -> ParseResult<Script> {
    let lexed = Lexer::new(source, Dialect::Script).lex();
    let parsed = Parser::new(lexed.tokens, source, Dialect::Script).parse_script();
    merge(lexed.errors, parsed)
}

fn merge<T>(mut errors: quire_types::SyntaxErrors, parsed: ParseResult<T>) -> ParseResult<T> {
    errors.extend(parsed.errors);
    ParseResult {
        program: parsed.program,
        errors,
    }
}
