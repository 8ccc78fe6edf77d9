//! Core Quire lexer: converts source text to a token stream.
//!
//! Features:
//! - One scanner for both dialects; keywords and a handful of operators
//!   (`&&`, `||`, `!`, `===`, `++`, compound assignment) are dialect-specific
//! - String interpolation with `${expr}` via a mode stack (formula `"..."`
//!   strings, script backtick templates)
//! - `//` line comments and `/* */` block comments are skipped
//! - Newlines are plain whitespace
//! - Error recovery: collects up to 20 errors instead of stopping at the first

use quire_types::{ErrorCode, SourceFile, Span, SyntaxError, SyntaxErrors};

use crate::token::{Dialect, NumberLit, Token, TokenKind};

/// Lexer mode: tracks whether we're scanning top-level code or inside
/// a string interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Normal code scanning.
    Normal,
    /// Inside a string literal after an interpolation closed, scanning text
    /// until the closing quote or the next `${`.
    String { quote: u8 },
    /// Inside a `${...}` interpolation expression. `brace_depth` tracks
    /// nested braces so we know when the interpolation's closing `}` is
    /// reached; `quote` is the delimiter of the enclosing string.
    Interpolation { brace_depth: u32, quote: u8 },
}

/// Position snapshot taken at the start of a token.
#[derive(Debug, Clone, Copy)]
struct Mark {
    pos: usize,
    line: u32,
    col: u32,
}

/// The Quire lexer.
///
/// Converts source text into a vector of [`Token`]s, collecting up to
/// [`quire_types::MAX_ERRORS`] errors along the way.
pub struct Lexer<'src> {
    /// The full source text.
    text: &'src str,
    /// The same text as bytes.
    source: &'src [u8],
    /// Source file for error reporting.
    source_file: &'src SourceFile,
    /// Which language's keywords and operators apply.
    dialect: Dialect,
    /// Current byte offset into `source`.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based, in characters).
    col: u32,
    /// Collected errors.
    errors: SyntaxErrors,
    /// Mode stack for string interpolation.
    mode_stack: Vec<Mode>,
    /// Pending tokens to emit before the next scan (used for interpolation).
    pending: Vec<Token>,
}

/// Result of lexing: tokens + any errors collected.
pub struct LexResult {
    /// The token stream (always ends with [`TokenKind::Eof`]).
    pub tokens: Vec<Token>,
    /// Errors encountered during lexing.
    pub errors: SyntaxErrors,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source file.
    pub fn new(source_file: &'src SourceFile, dialect: Dialect) -> Self {
        Self {
            text: &source_file.source,
            source: source_file.source.as_bytes(),
            source_file,
            dialect,
            pos: 0,
            line: 1,
            col: 1,
            errors: SyntaxErrors::empty(),
            mode_stack: vec![Mode::Normal],
            pending: Vec::new(),
        }
    }

    /// Lex the entire source file into a token stream.
    pub fn lex(mut self) -> LexResult {
        let mut tokens = Vec::new();

        loop {
            if self.errors.is_full() {
                break;
            }

            // Drain any pending tokens first (e.g. InterpolationStart after StringStart)
            if let Some(pending) = self.pending.pop() {
                tokens.push(pending);
                continue;
            }

            let token = match self.current_mode() {
                Mode::Normal | Mode::Interpolation { .. } => self.scan_normal(),
                Mode::String { quote } => {
                    let start = self.mark();
                    self.scan_string_body(start, quote, true)
                }
            };

            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);

            if is_eof {
                break;
            }
        }

        // Ensure token stream always ends with Eof
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            tokens.push(Token::new(TokenKind::Eof, self.current_span()));
        }

        LexResult {
            tokens,
            errors: self.errors,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Mode stack helpers
    // ─────────────────────────────────────────────────────────────

    fn current_mode(&self) -> Mode {
        *self.mode_stack.last().unwrap_or(&Mode::Normal)
    }

    fn push_mode(&mut self, mode: Mode) {
        self.mode_stack.push(mode);
    }

    fn pop_mode(&mut self) {
        if self.mode_stack.len() > 1 {
            self.mode_stack.pop();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.text.get(self.pos..)?.chars().next()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else if ch & 0xC0 != 0x80 {
            // Continuation bytes of a multi-byte character don't move the column.
            self.col += 1;
        }
        Some(ch)
    }

    /// Advance past one full character and return it.
    fn advance_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        for _ in 0..ch.len_utf8() {
            self.advance();
        }
        Some(ch)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            col: self.col,
        }
    }

    fn current_span(&self) -> Span {
        Span::point(self.pos as u32, self.line, self.col)
    }

    fn span_from(&self, start: Mark) -> Span {
        Span::new(start.pos as u32, self.pos as u32, start.line, start.col)
    }

    fn token_from(&self, kind: TokenKind, start: Mark) -> Token {
        Token::new(kind, self.span_from(start))
    }

    fn emit_error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let source_line = self.source_file.line(span.line).unwrap_or("").to_string();
        let err = SyntaxError::new(&self.source_file.name, code, message, span, source_line);
        self.errors.push(err);
    }

    // ─────────────────────────────────────────────────────────────
    // Whitespace & comments
    // ─────────────────────────────────────────────────────────────

    /// Skip whitespace, line comments and block comments.
    fn skip_trivia(&mut self) {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(b' ' | b'\t' | b'\r' | b'\n'), _) => {
                    self.advance();
                }
                (Some(b'/'), Some(b'/')) => {
                    while let Some(ch) = self.peek() {
                        if ch == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                (Some(b'/'), Some(b'*')) => self.skip_block_comment(),
                _ => break,
            }
        }
    }

    fn skip_block_comment(&mut self) {
        let start = self.mark();
        self.advance();
        self.advance();
        loop {
            match self.peek() {
                None => {
                    let span = self.span_from(start);
                    self.emit_error(
                        ErrorCode::UNTERMINATED_COMMENT,
                        "Unterminated block comment",
                        span,
                    );
                    return;
                }
                Some(b'*') if self.peek_at(1) == Some(b'/') => {
                    self.advance();
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Normal-mode scanning
    // ─────────────────────────────────────────────────────────────

    /// Scan one token in normal (non-string) mode.
    fn scan_normal(&mut self) -> Token {
        self.skip_trivia();

        // If we've hit the error cap, stop immediately
        if self.errors.is_full() {
            return Token::new(TokenKind::Eof, self.current_span());
        }

        if self.at_end() {
            // If we're still inside an interpolation, the string never closed
            if self
                .mode_stack
                .iter()
                .any(|m| matches!(m, Mode::String { .. } | Mode::Interpolation { .. }))
            {
                self.emit_error(
                    ErrorCode::UNTERMINATED_STRING,
                    "Unterminated string literal",
                    self.current_span(),
                );
            }
            return Token::new(TokenKind::Eof, self.current_span());
        }

        let start = self.mark();
        let script = self.dialect == Dialect::Script;

        let Some(ch) = self.peek_char() else {
            return Token::new(TokenKind::Eof, self.current_span());
        };
        if ch.is_ascii_digit() {
            return self.scan_number(start);
        }
        if ch.is_alphabetic() || ch == '_' || (script && ch == '$') {
            return self.scan_identifier(start);
        }

        self.advance_char();
        match ch {
            // ── String literals ──
            '"' => {
                let interpolating = !script;
                self.scan_string(start, b'"', interpolating)
            }
            '\'' if script => self.scan_string(start, b'\'', false),
            '`' if script => self.scan_string(start, b'`', true),

            // ── Operators ──
            '+' => {
                if script && self.peek() == Some(b'+') {
                    self.advance();
                    self.token_from(TokenKind::PlusPlus, start)
                } else if script && self.peek() == Some(b'=') {
                    self.advance();
                    self.token_from(TokenKind::PlusEq, start)
                } else {
                    self.token_from(TokenKind::Plus, start)
                }
            }
            '-' => {
                if script && self.peek() == Some(b'-') {
                    self.advance();
                    self.token_from(TokenKind::MinusMinus, start)
                } else if script && self.peek() == Some(b'=') {
                    self.advance();
                    self.token_from(TokenKind::MinusEq, start)
                } else {
                    self.token_from(TokenKind::Minus, start)
                }
            }
            '*' => {
                if script && self.peek() == Some(b'*') {
                    self.advance();
                    self.token_from(TokenKind::StarStar, start)
                } else if script && self.peek() == Some(b'=') {
                    self.advance();
                    self.token_from(TokenKind::StarEq, start)
                } else {
                    self.token_from(TokenKind::Star, start)
                }
            }
            '/' => {
                // `//` and `/*` were consumed as trivia, so bare `/` is division
                if script && self.peek() == Some(b'=') {
                    self.advance();
                    self.token_from(TokenKind::SlashEq, start)
                } else {
                    self.token_from(TokenKind::Slash, start)
                }
            }
            '%' => self.token_from(TokenKind::Percent, start),

            '=' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    if script && self.peek() == Some(b'=') {
                        self.advance();
                        self.token_from(TokenKind::EqEqEq, start)
                    } else {
                        self.token_from(TokenKind::EqEq, start)
                    }
                }
                Some(b'>') => {
                    self.advance();
                    self.token_from(TokenKind::FatArrow, start)
                }
                _ => self.token_from(TokenKind::Eq, start),
            },

            '!' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    if script && self.peek() == Some(b'=') {
                        self.advance();
                        self.token_from(TokenKind::BangEqEq, start)
                    } else {
                        self.token_from(TokenKind::BangEq, start)
                    }
                } else if script {
                    self.token_from(TokenKind::Bang, start)
                } else {
                    self.reject(start, "Unexpected character '!'; use 'not' for negation")
                }
            }

            '<' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    self.token_from(TokenKind::LessEq, start)
                } else {
                    self.token_from(TokenKind::Less, start)
                }
            }
            '>' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    self.token_from(TokenKind::GreaterEq, start)
                } else {
                    self.token_from(TokenKind::Greater, start)
                }
            }

            '&' if self.peek() == Some(b'&') => {
                self.advance();
                if script {
                    self.token_from(TokenKind::AmpAmp, start)
                } else {
                    self.reject(start, "Unexpected '&&'; use 'and'")
                }
            }
            '|' if self.peek() == Some(b'|') => {
                self.advance();
                if script {
                    self.token_from(TokenKind::PipePipe, start)
                } else {
                    self.reject(start, "Unexpected '||'; use 'or'")
                }
            }

            '?' => {
                if self.peek() == Some(b'?') {
                    self.advance();
                    self.token_from(TokenKind::QuestionQuestion, start)
                } else {
                    self.token_from(TokenKind::Question, start)
                }
            }

            '.' => {
                if self.peek() == Some(b'.') && self.peek_at(1) == Some(b'.') {
                    self.advance();
                    self.advance();
                    self.token_from(TokenKind::DotDotDot, start)
                } else {
                    self.token_from(TokenKind::Dot, start)
                }
            }

            '(' => self.token_from(TokenKind::LParen, start),
            ')' => self.token_from(TokenKind::RParen, start),
            '[' => self.token_from(TokenKind::LBracket, start),
            ']' => self.token_from(TokenKind::RBracket, start),
            ',' => self.token_from(TokenKind::Comma, start),
            ':' => self.token_from(TokenKind::Colon, start),
            ';' => self.token_from(TokenKind::Semicolon, start),

            '{' => {
                // If we're in interpolation mode, track brace depth
                if let Some(Mode::Interpolation { brace_depth, .. }) = self.mode_stack.last_mut() {
                    *brace_depth += 1;
                }
                self.token_from(TokenKind::LBrace, start)
            }

            '}' => {
                // Check if this closes an interpolation
                if let Mode::Interpolation { brace_depth, quote } = self.current_mode() {
                    if brace_depth == 0 {
                        // This `}` ends the interpolation; switch back to string mode
                        self.pop_mode();
                        self.push_mode(Mode::String { quote });
                        return self.token_from(TokenKind::InterpolationEnd, start);
                    }
                    if let Some(Mode::Interpolation { brace_depth, .. }) =
                        self.mode_stack.last_mut()
                    {
                        *brace_depth -= 1;
                    }
                }
                self.token_from(TokenKind::RBrace, start)
            }

            _ => self.reject(start, format!("Unexpected character '{ch}'")),
        }
    }

    /// Report an unexpected character and continue with the next token.
    fn reject(&mut self, start: Mark, message: impl Into<String>) -> Token {
        let span = self.span_from(start);
        self.emit_error(ErrorCode::UNEXPECTED_CHARACTER, message, span);
        self.scan_normal()
    }

    // ─────────────────────────────────────────────────────────────
    // Number literals
    // ─────────────────────────────────────────────────────────────

    fn scan_number(&mut self, start: Mark) -> Token {
        let mut is_float = false;
        while let Some(b'0'..=b'9') = self.peek() {
            self.advance();
        }

        // Fraction
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            is_float = true;
            self.advance(); // consume '.'
            while let Some(b'0'..=b'9') = self.peek() {
                self.advance();
            }
        }

        // Exponent
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let digit_at = if matches!(self.peek_at(1), Some(b'+' | b'-')) { 2 } else { 1 };
            if matches!(self.peek_at(digit_at), Some(b'0'..=b'9')) {
                is_float = true;
                for _ in 0..digit_at {
                    self.advance();
                }
                while let Some(b'0'..=b'9') = self.peek() {
                    self.advance();
                }
            }
        }

        let text = &self.text[start.pos..self.pos];
        let lit = if is_float {
            match text.parse::<f64>() {
                Ok(value) => NumberLit::Float(value),
                Err(_) => {
                    let span = self.span_from(start);
                    self.emit_error(
                        ErrorCode::INVALID_NUMBER,
                        format!("Invalid number literal '{text}'"),
                        span,
                    );
                    NumberLit::Float(0.0)
                }
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => NumberLit::Int(value),
                Err(_) => NumberLit::Big(text.trim_start_matches('0').to_string()),
            }
        };

        self.token_from(TokenKind::Number(lit), start)
    }

    // ─────────────────────────────────────────────────────────────
    // Identifiers & keywords
    // ─────────────────────────────────────────────────────────────

    fn scan_identifier(&mut self, start: Mark) -> Token {
        let script = self.dialect == Dialect::Script;
        while let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '_' || (script && ch == '$') {
                self.advance_char();
            } else {
                break;
            }
        }

        let text = &self.text[start.pos..self.pos];
        let kind = TokenKind::from_keyword(self.dialect, text)
            .unwrap_or_else(|| TokenKind::Identifier(text.to_string()));

        self.token_from(kind, start)
    }

    // ─────────────────────────────────────────────────────────────
    // String literals & interpolation
    // ─────────────────────────────────────────────────────────────

    /// Scan a string literal starting after the opening quote.
    ///
    /// A plain string yields `StringLiteral`; an interpolating string that
    /// reaches `${` yields `StringStart` and switches modes.
    fn scan_string(&mut self, start: Mark, quote: u8, interpolating: bool) -> Token {
        if interpolating {
            self.scan_string_body(start, quote, false)
        } else {
            self.scan_plain_string(start, quote)
        }
    }

    fn scan_plain_string(&mut self, start: Mark, quote: u8) -> Token {
        let mut buf = String::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    let span = self.span_from(start);
                    self.emit_error(
                        ErrorCode::UNTERMINATED_STRING,
                        "Unterminated string literal",
                        span,
                    );
                    return self.token_from(TokenKind::StringLiteral(buf), start);
                }
                Some(ch) if ch == quote => {
                    self.advance();
                    return self.token_from(TokenKind::StringLiteral(buf), start);
                }
                Some(b'\\') => {
                    if let Some(escaped) = self.scan_escape_sequence() {
                        buf.push(escaped);
                    }
                }
                Some(_) => {
                    if let Some(ch) = self.advance_char() {
                        buf.push(ch);
                    }
                }
            }
        }
    }

    /// Scan interpolating string content up to the closing quote or the
    /// next `${`.
    ///
    /// `continuation` is `true` when resuming after an interpolation closed;
    /// the emitted tokens are then `StringPart`/`StringEnd` instead of
    /// `StringStart`/`StringLiteral`.
    fn scan_string_body(&mut self, start: Mark, quote: u8, continuation: bool) -> Token {
        let mut buf = String::new();
        let multiline = quote == b'`';

        loop {
            match self.peek() {
                None => return self.unterminated(start, buf, continuation),
                Some(b'\n') if !multiline => return self.unterminated(start, buf, continuation),
                Some(ch) if ch == quote => {
                    self.advance();
                    if continuation {
                        self.pop_mode();
                        return self.token_from(TokenKind::StringEnd(buf), start);
                    }
                    return self.token_from(TokenKind::StringLiteral(buf), start);
                }
                Some(b'\\') => {
                    if let Some(escaped) = self.scan_escape_sequence() {
                        buf.push(escaped);
                    }
                }
                Some(b'$') if self.peek_at(1) == Some(b'{') => {
                    let interp_start = self.mark();
                    self.advance(); // consume '$'
                    self.advance(); // consume '{'
                    let interp_span = self.span_from(interp_start);
                    if continuation {
                        // Replace current String mode with Interpolation
                        self.pop_mode();
                    }
                    self.push_mode(Mode::Interpolation {
                        brace_depth: 0,
                        quote,
                    });
                    // Queue InterpolationStart so it appears after this text
                    self.pending
                        .push(Token::new(TokenKind::InterpolationStart, interp_span));
                    let kind = if continuation {
                        TokenKind::StringPart(buf)
                    } else {
                        TokenKind::StringStart(buf)
                    };
                    return Token::new(kind, Span::new(start.pos as u32, interp_start.pos as u32, start.line, start.col));
                }
                Some(_) => {
                    if let Some(ch) = self.advance_char() {
                        buf.push(ch);
                    }
                }
            }
        }
    }

    fn unterminated(&mut self, start: Mark, buf: String, continuation: bool) -> Token {
        let span = self.span_from(start);
        self.emit_error(
            ErrorCode::UNTERMINATED_STRING,
            "Unterminated string literal",
            span,
        );
        if continuation {
            self.pop_mode();
            return self.token_from(TokenKind::StringEnd(buf), start);
        }
        self.token_from(TokenKind::StringLiteral(buf), start)
    }

    /// Scan an escape sequence starting at the `\`.
    /// Returns the unescaped character, or `None` if invalid (error emitted).
    fn scan_escape_sequence(&mut self) -> Option<char> {
        let start = self.mark();
        self.advance(); // consume the '\'

        match self.advance_char() {
            Some('"') => Some('"'),
            Some('\'') => Some('\''),
            Some('`') => Some('`'),
            Some('\\') => Some('\\'),
            Some('n') => Some('\n'),
            Some('t') => Some('\t'),
            Some('r') => Some('\r'),
            Some('0') => Some('\0'),
            Some('$') => Some('$'),
            Some('u') => self.scan_unicode_escape(start),
            Some(ch) => {
                let span = self.span_from(start);
                self.emit_error(
                    ErrorCode::INVALID_ESCAPE,
                    format!("Invalid escape sequence '\\{ch}'"),
                    span,
                );
                Some(ch) // error recovery: emit the char as-is
            }
            None => {
                let span = self.span_from(start);
                self.emit_error(
                    ErrorCode::UNTERMINATED_STRING,
                    "Unexpected end of input in escape sequence",
                    span,
                );
                None
            }
        }
    }

    /// `\u{1F600}`
    fn scan_unicode_escape(&mut self, start: Mark) -> Option<char> {
        if self.peek() != Some(b'{') {
            let span = self.span_from(start);
            self.emit_error(ErrorCode::INVALID_ESCAPE, "Expected '{' after '\\u'", span);
            return None;
        }
        self.advance();
        let digits_start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F')) {
            self.advance();
        }
        let digits = &self.text[digits_start..self.pos];
        let closed = self.peek() == Some(b'}');
        if closed {
            self.advance();
        }
        let decoded = u32::from_str_radix(digits, 16).ok().and_then(char::from_u32);
        match decoded {
            Some(ch) if closed => Some(ch),
            _ => {
                let span = self.span_from(start);
                self.emit_error(
                    ErrorCode::INVALID_ESCAPE,
                    format!("Invalid unicode escape '\\u{{{digits}}}'"),
                    span,
                );
                None
            }
        }
    }
}
