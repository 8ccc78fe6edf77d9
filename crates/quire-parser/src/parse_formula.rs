//! Formula expression parsing with full operator precedence.
//!
//! Precedence (lowest → highest):
//! 8. `or`
//! 7. `and`
//! 6. `??` (null-coalescing)
//! 5. `==`, `!=`, `<`, `>`, `<=`, `>=` (no chaining)
//! 4. `+`, `-`
//! 3. `*`, `/`, `%`
//! 2. unary `-`, `not`
//! 1. `.name`, `[index]`, `(args)` (postfix)
//!
//! `if`/`let`/`fn` forms extend as far to the right as possible.

use quire_lexer::{NumberLit, TokenKind};
use quire_types::ast::formula::*;
use quire_types::{ErrorCode, Span};
use std::rc::Rc;

use crate::parser::Parser;

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Point
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse a formula expression.
    pub(crate) fn parse_formula_expr(&mut self) -> Option<Expr> {
        if !self.enter_nesting() {
            return None;
        }
        let result = self.parse_formula_or();
        self.leave_nesting();
        result
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Precedence Chain
    // ══════════════════════════════════════════════════════════════════════════

    fn formula_binary(left: Expr, op: BinOp, right: Expr) -> Expr {
        let span = left.span.merge(right.span);
        Expr::new(
            ExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            span,
        )
    }

    /// `OrExpr = AndExpr { "or" AndExpr }`
    fn parse_formula_or(&mut self) -> Option<Expr> {
        let mut left = self.parse_formula_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_formula_and()?;
            left = Self::formula_binary(left, BinOp::Or, right);
        }
        Some(left)
    }

    /// `AndExpr = CoalesceExpr { "and" CoalesceExpr }`
    fn parse_formula_and(&mut self) -> Option<Expr> {
        let mut left = self.parse_formula_coalesce()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_formula_coalesce()?;
            left = Self::formula_binary(left, BinOp::And, right);
        }
        Some(left)
    }

    /// `CoalesceExpr = CompExpr { "??" CompExpr }`
    fn parse_formula_coalesce(&mut self) -> Option<Expr> {
        let mut left = self.parse_comparison()?;
        while self.eat(&TokenKind::QuestionQuestion) {
            let right = self.parse_comparison()?;
            let span = left.span.merge(right.span);
            left = Expr::new(
                ExprKind::Coalesce {
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Some(left)
    }

    /// `CompExpr = AddExpr [ CompOp AddExpr ]`
    ///
    /// Comparison operators do NOT chain: `a < b < c` is a parse error.
    fn parse_comparison(&mut self) -> Option<Expr> {
        let mut left = self.parse_add()?;
        let mut chained = false;
        while let Some(op) = self.match_comparison_op() {
            // Reject chaining, but keep parsing so the rest of the input is consumed
            if chained {
                self.error_at_current(
                    ErrorCode::CHAINED_COMPARISON,
                    "comparison operators cannot be chained; use 'and' to combine: a < b and b < c",
                );
            }
            self.advance(); // consume operator
            let right = self.parse_add()?;
            left = Self::formula_binary(left, op, right);
            chained = true;
        }
        Some(left)
    }

    /// Check if current token is a comparison operator, return corresponding BinOp.
    fn match_comparison_op(&self) -> Option<BinOp> {
        match self.peek_kind() {
            TokenKind::EqEq => Some(BinOp::Eq),
            TokenKind::BangEq => Some(BinOp::NotEq),
            TokenKind::Less => Some(BinOp::Less),
            TokenKind::Greater => Some(BinOp::Greater),
            TokenKind::LessEq => Some(BinOp::LessEq),
            TokenKind::GreaterEq => Some(BinOp::GreaterEq),
            _ => None,
        }
    }

    /// `AddExpr = MulExpr { ("+" | "-") MulExpr }`
    fn parse_add(&mut self) -> Option<Expr> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_mul()?;
            left = Self::formula_binary(left, op, right);
        }
        Some(left)
    }

    /// `MulExpr = UnaryExpr { ("*" | "/" | "%") UnaryExpr }`
    fn parse_mul(&mut self) -> Option<Expr> {
        let mut left = self.parse_formula_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_formula_unary()?;
            left = Self::formula_binary(left, op, right);
        }
        Some(left)
    }

    /// `UnaryExpr = { "not" | "-" } PostfixExpr`
    fn parse_formula_unary(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let op = match self.peek_kind() {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.parse_formula_postfix(),
        };
        self.advance();
        if !self.enter_nesting() {
            return None;
        }
        let operand = self.parse_formula_unary();
        self.leave_nesting();
        let operand = operand?;
        let span = start.merge(operand.span);
        Some(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// `PostfixExpr = PrimaryExpr { "." Name | "[" Expr "]" | "(" Args ")" }`
    fn parse_formula_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_formula_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance(); // eat `.`
                    let name = self.expect_member_name()?;
                    let span = expr.span.merge(name.span);
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            name,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance(); // eat `[`
                    let index = self.parse_formula_expr()?;
                    self.expect(&TokenKind::RBracket)?;
                    let span = expr.span.merge(self.previous_span());
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    self.advance(); // eat `(`
                    let args = self.parse_arg_list()?;
                    self.expect(&TokenKind::RParen)?;
                    let span = expr.span.merge(self.previous_span());
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Some(expr)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Primary Expressions
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse a primary expression.
    fn parse_formula_primary(&mut self) -> Option<Expr> {
        let start = self.current_span();
        match self.peek_kind().clone() {
            // ── Literals ────────────────────────────────────────────────
            TokenKind::Number(n) => {
                self.advance();
                let kind = match n {
                    NumberLit::Int(i) => ExprKind::Integer(i),
                    NumberLit::Big(digits) => ExprKind::BigInteger(digits),
                    NumberLit::Float(f) => ExprKind::Float(f),
                };
                Some(Expr::new(kind, start))
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Some(Expr::new(ExprKind::String(s), start))
            }
            TokenKind::StringStart(s) => {
                self.advance();
                self.parse_string_interpolation(s, start)
            }
            TokenKind::True => {
                self.advance();
                Some(Expr::new(ExprKind::Bool(true), start))
            }
            TokenKind::False => {
                self.advance();
                Some(Expr::new(ExprKind::Bool(false), start))
            }
            TokenKind::Null => {
                self.advance();
                Some(Expr::new(ExprKind::Null, start))
            }

            // ── Collections ─────────────────────────────────────────────
            TokenKind::LBracket => self.parse_list_literal(),
            TokenKind::LBrace => self.parse_record_literal(),

            // ── Grouping ────────────────────────────────────────────────
            TokenKind::LParen => {
                self.advance(); // eat `(`
                let inner = self.parse_formula_expr()?;
                self.expect(&TokenKind::RParen)?;
                let span = start.merge(self.previous_span());
                Some(Expr::new(ExprKind::Paren(Box::new(inner)), span))
            }

            // ── Forms ───────────────────────────────────────────────────
            TokenKind::If => self.parse_if(),
            TokenKind::Let => self.parse_let(),
            TokenKind::Fn => self.parse_lambda(),

            TokenKind::Identifier(name) => {
                self.advance();
                Some(Expr::new(ExprKind::Identifier(name), start))
            }

            _ => {
                let code = if self.at_end() {
                    ErrorCode::EXPECTED_EXPRESSION
                } else {
                    ErrorCode::UNEXPECTED_TOKEN
                };
                self.error_at_current(
                    code,
                    format!("expected expression, got '{}'", self.peek_kind()),
                );
                None
            }
        }
    }

    /// Parse a comma-separated argument list (inside parens).
    fn parse_arg_list(&mut self) -> Option<Vec<Expr>> {
        let mut args = Vec::new();
        if self.check_exact(&TokenKind::RParen) {
            return Some(args);
        }
        loop {
            args.push(self.parse_formula_expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            // Allow trailing comma before `)`
            if self.check_exact(&TokenKind::RParen) {
                break;
            }
        }
        Some(args)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Forms
    // ══════════════════════════════════════════════════════════════════════════

    /// `if cond then a else b`
    fn parse_if(&mut self) -> Option<Expr> {
        let start = self.current_span();
        self.advance(); // eat `if`
        let condition = self.parse_formula_expr()?;
        self.expect(&TokenKind::Then)?;
        let then_branch = self.parse_formula_expr()?;
        self.expect(&TokenKind::Else)?;
        let else_branch = self.parse_formula_expr()?;
        let span = start.merge(else_branch.span);
        Some(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            span,
        ))
    }

    /// `let name = value in body`
    fn parse_let(&mut self) -> Option<Expr> {
        let start = self.current_span();
        self.advance(); // eat `let`
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Eq)?;
        let value = self.parse_formula_expr()?;
        self.expect(&TokenKind::In)?;
        let body = self.parse_formula_expr()?;
        let span = start.merge(body.span);
        Some(Expr::new(
            ExprKind::Let {
                name,
                value: Box::new(value),
                body: Box::new(body),
            },
            span,
        ))
    }

    /// `fn(params) => body`
    fn parse_lambda(&mut self) -> Option<Expr> {
        let start = self.current_span();
        self.advance(); // eat `fn`
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check_exact(&TokenKind::RParen) {
            loop {
                params.push(self.expect_identifier()?);
                if !self.eat(&TokenKind::Comma) || self.check_exact(&TokenKind::RParen) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::FatArrow)?;
        let body = self.parse_formula_expr()?;
        let span = start.merge(body.span);
        Some(Expr::new(
            ExprKind::Lambda(Rc::new(Lambda { params, body, span })),
            span,
        ))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Literals
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse `[expr, ...spread, ...]`
    fn parse_list_literal(&mut self) -> Option<Expr> {
        let start = self.current_span();
        self.advance(); // eat `[`
        let mut items = Vec::new();
        if !self.check_exact(&TokenKind::RBracket) {
            loop {
                if self.eat(&TokenKind::DotDotDot) {
                    items.push(ListItem::Spread(self.parse_formula_expr()?));
                } else {
                    items.push(ListItem::Item(self.parse_formula_expr()?));
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                // Trailing comma
                if self.check_exact(&TokenKind::RBracket) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBracket)?;
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::List(items), span))
    }

    /// Parse `{ key: expr, "quoted key": expr, shorthand, ...spread }` or `{}`
    fn parse_record_literal(&mut self) -> Option<Expr> {
        let start = self.current_span();
        self.advance(); // eat `{`
        let mut entries = Vec::new();
        if !self.check_exact(&TokenKind::RBrace) {
            loop {
                if self.eat(&TokenKind::DotDotDot) {
                    entries.push(RecordEntry::Spread(self.parse_formula_expr()?));
                } else {
                    let shorthand = matches!(self.peek_kind(), TokenKind::Identifier(_))
                        && matches!(self.look_ahead(1), TokenKind::Comma | TokenKind::RBrace);
                    let key = self.expect_key()?;
                    let value = if shorthand {
                        Expr::new(ExprKind::Identifier(key.name.clone()), key.span)
                    } else {
                        self.expect(&TokenKind::Colon)?;
                        self.parse_formula_expr()?
                    };
                    entries.push(RecordEntry::Field { key, value });
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                // Trailing comma
                if self.check_exact(&TokenKind::RBrace) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBrace)?;
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::Record(entries), span))
    }

    /// Parse an interpolated string: `"text ${expr} more ${expr} end"`
    ///
    /// Called after the `StringStart` token has been consumed.
    fn parse_string_interpolation(&mut self, start_text: String, start_span: Span) -> Option<Expr> {
        let mut parts = Vec::new();
        if !start_text.is_empty() {
            parts.push(StringPart::Literal(start_text));
        }
        loop {
            self.expect(&TokenKind::InterpolationStart)?;
            let expr = self.parse_formula_expr()?;
            parts.push(StringPart::Expr(expr));
            self.expect(&TokenKind::InterpolationEnd)?;
            match self.peek_kind().clone() {
                TokenKind::StringPart(s) => {
                    self.advance();
                    if !s.is_empty() {
                        parts.push(StringPart::Literal(s));
                    }
                }
                TokenKind::StringEnd(s) => {
                    self.advance();
                    if !s.is_empty() {
                        parts.push(StringPart::Literal(s));
                    }
                    break;
                }
                _ => {
                    self.error_at_current(
                        ErrorCode::UNCLOSED_DELIMITER,
                        "unterminated string interpolation",
                    );
                    return None;
                }
            }
        }
        let span = start_span.merge(self.previous_span());
        Some(Expr::new(ExprKind::Interpolation(parts), span))
    }
}
