//! Core parser infrastructure: token cursor, error reporting, helpers.

use quire_lexer::{Dialect, Token, TokenKind};
use quire_types::ast::formula;
use quire_types::ast::script::Script;
use quire_types::ast::Ident;
use quire_types::{ErrorCode, SourceFile, Span, SyntaxError, SyntaxErrors, MAX_ERRORS};

/// Maximum expression nesting before the parser bails out.
pub(crate) const MAX_NESTING: u32 = 64;

/// The Quire parser.
///
/// Consumes a token stream produced by the lexer and builds an AST for
/// either dialect. Collects errors and attempts recovery when possible.
pub struct Parser<'src> {
    /// The token stream.
    tokens: Vec<Token>,
    /// Current index into `tokens`.
    pos: usize,
    /// Source file for error context.
    source_file: &'src SourceFile,
    /// Which language the tokens came from.
    dialect: Dialect,
    /// Collected errors.
    errors: SyntaxErrors,
    /// Current expression nesting depth.
    pub(crate) depth: u32,
    /// Number of enclosing loops (for `break`/`continue` placement).
    pub(crate) loop_depth: u32,
}

/// Result of parsing.
pub struct ParseResult<T> {
    /// The AST, absent when the input could not be parsed at all.
    pub program: Option<T>,
    pub errors: SyntaxErrors,
}

impl<T> ParseResult<T> {
    /// The AST if parsing produced no errors, otherwise every error.
    pub fn into_result(self) -> Result<T, SyntaxErrors> {
        match self.program {
            Some(program) if !self.errors.has_errors() => Ok(program),
            _ => Err(self.errors),
        }
    }
}

impl<'src> Parser<'src> {
    /// Create a new parser from a token stream and source file.
    pub fn new(tokens: Vec<Token>, source_file: &'src SourceFile, dialect: Dialect) -> Self {
        Self {
            tokens,
            pos: 0,
            source_file,
            dialect,
            errors: SyntaxErrors::empty(),
            depth: 0,
            loop_depth: 0,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the current token without advancing.
    pub(crate) fn peek(&self) -> &Token {
        static EOF: Token = Token {
            kind: TokenKind::Eof,
            span: Span {
                start: 0,
                end: 0,
                line: 1,
                col: 1,
            },
        };
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .unwrap_or(&EOF)
    }

    /// Returns the kind of the current token.
    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    /// Advance the cursor by one and return the consumed token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Returns the previously consumed token's span.
    pub(crate) fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::point(0, 1, 1)
        }
    }

    /// Returns the span of the current token.
    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    /// Returns `true` if the current token is `Eof`.
    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    /// Index of the current token.
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Check if the current token matches the given kind exactly.
    pub(crate) fn check_exact(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check_exact(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Look ahead by `n` tokens from current position.
    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    /// Expect a specific token kind. Returns the token if matched, or emits an error.
    pub(crate) fn expect(&mut self, expected: &TokenKind) -> Option<Token> {
        if self.check_exact(expected) {
            Some(self.advance())
        } else {
            let code = if self.at_end() {
                ErrorCode::UNCLOSED_DELIMITER
            } else {
                ErrorCode::UNEXPECTED_TOKEN
            };
            self.error_at_current(
                code,
                format!("expected '{}', got '{}'", expected, self.peek_kind()),
            );
            None
        }
    }

    /// Expect an identifier token.
    pub(crate) fn expect_identifier(&mut self) -> Option<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                let span = self.advance().span;
                Some(Ident::new(name, span))
            }
            _ => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected identifier, got '{}'", self.peek_kind()),
                );
                None
            }
        }
    }

    /// Expect a name after `.`: identifiers and keywords are both accepted
    /// (`list.if` reads the key `if`).
    pub(crate) fn expect_member_name(&mut self) -> Option<Ident> {
        let kind = self.peek_kind().clone();
        match &kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let span = self.advance().span;
                Some(Ident::new(name, span))
            }
            _ if kind.is_keyword() => {
                let span = self.advance().span;
                Some(Ident::new(kind.to_string(), span))
            }
            _ => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected property name, got '{}'", self.peek_kind()),
                );
                None
            }
        }
    }

    /// Expect a record/object key: identifier, keyword, string or number.
    pub(crate) fn expect_key(&mut self) -> Option<Ident> {
        match self.peek_kind().clone() {
            TokenKind::StringLiteral(s) => {
                let span = self.advance().span;
                Some(Ident::new(s, span))
            }
            TokenKind::Number(n) => {
                let span = self.advance().span;
                let text = match n {
                    quire_lexer::NumberLit::Int(i) => i.to_string(),
                    quire_lexer::NumberLit::Big(digits) => digits,
                    quire_lexer::NumberLit::Float(f) => f.to_string(),
                };
                Some(Ident::new(text, span))
            }
            _ => self.expect_member_name(),
        }
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    /// Report an error at the current token position.
    pub(crate) fn error_at_current(&mut self, code: ErrorCode, message: impl Into<String>) {
        let span = self.current_span();
        self.error_at(code, message, span);
    }

    /// Report an error at a specific span.
    pub(crate) fn error_at(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let source_line = self.source_file.line(span.line).unwrap_or("").to_string();
        let error = SyntaxError::new(&self.source_file.name, code, message, span, source_line);
        self.errors.push(error);
    }

    /// Returns `true` if we've hit the error limit and should stop.
    pub(crate) fn too_many_errors(&self) -> bool {
        self.errors.total_errors >= MAX_ERRORS
    }

    /// Enter one level of expression nesting; reports and returns `false`
    /// past the limit.
    pub(crate) fn enter_nesting(&mut self) -> bool {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            self.error_at_current(
                ErrorCode::NESTING_LIMIT_EXCEEDED,
                format!("maximum nesting depth is {MAX_NESTING}"),
            );
            self.depth -= 1;
            return false;
        }
        true
    }

    pub(crate) fn leave_nesting(&mut self) {
        self.depth -= 1;
    }

    // ── Synchronization ───────────────────────────────────────────────────────

    /// Skip tokens until we reach a statement boundary.
    /// Used after an error to resume at a known-good position; `from` is
    /// where the failed statement began, so at least one token is consumed.
    pub(crate) fn synchronize(&mut self, from: usize) {
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::RBrace
                | TokenKind::Let
                | TokenKind::Const
                | TokenKind::Function
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Return
                | TokenKind::Throw
                    if self.pos > from =>
                {
                    return
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Parse the token stream as a single formula expression.
    ///
    /// Source with no tokens at all parses as `null`.
    pub fn parse_formula(mut self) -> ParseResult<formula::Expr> {
        let program = if self.at_end() {
            Some(formula::Expr::new(formula::ExprKind::Null, self.current_span()))
        } else {
            let expr = self.parse_formula_expr();
            if expr.is_some() && !self.at_end() {
                self.error_at_current(
                    ErrorCode::TRAILING_INPUT,
                    format!("unexpected '{}' after end of expression", self.peek_kind()),
                );
            }
            expr
        };
        ParseResult {
            program,
            errors: self.errors,
        }
    }

    /// Parse the token stream as a script body.
    pub fn parse_script(mut self) -> ParseResult<Script> {
        let start = self.current_span();
        let mut body = Vec::new();
        while !self.at_end() {
            if self.too_many_errors() {
                break;
            }
            if self.check_exact(&TokenKind::RBrace) {
                self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, "unexpected '}'");
                self.advance();
                continue;
            }
            let from = self.pos;
            match self.parse_statement() {
                Some(stmt) => body.push(stmt),
                None => self.synchronize(from),
            }
        }
        let span = start.merge(self.previous_span());
        ParseResult {
            program: Some(Script { body, span }),
            errors: self.errors,
        }
    }
}
