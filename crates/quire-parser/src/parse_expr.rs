//! Script expression parsing.
//!
//! Precedence (lowest → highest):
//! 1. assignment `= += -= *= /=` (right-assoc), arrow functions
//! 2. conditional `?:`
//! 3. `??`
//! 4. `||`
//! 5. `&&`
//! 6. `== != === !==`
//! 7. `< > <= >=`
//! 8. `+ -`
//! 9. `* / %`
//! 10. `**` (right-assoc)
//! 11. unary `! - + typeof delete`, prefix `++ --`
//! 12. postfix `++ --`
//! 13. `.name`, `[index]`, `(args)`

use quire_lexer::TokenKind;
use quire_types::ast::script::*;
use quire_types::ast::Ident;
use quire_types::{ErrorCode, Span};
use std::rc::Rc;

use crate::parser::Parser;

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Point
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse a script expression.
    pub(crate) fn parse_expression(&mut self) -> Option<Expr> {
        if !self.enter_nesting() {
            return None;
        }
        let result = self.parse_assignment();
        self.leave_nesting();
        result
    }

    fn parse_assignment(&mut self) -> Option<Expr> {
        if self.is_arrow_start() {
            return self.parse_arrow();
        }
        let target = self.parse_conditional()?;
        let op = match self.peek_kind() {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::Add,
            TokenKind::MinusEq => AssignOp::Sub,
            TokenKind::StarEq => AssignOp::Mul,
            TokenKind::SlashEq => AssignOp::Div,
            _ => return Some(target),
        };
        self.check_assign_target(&target);
        self.advance(); // eat operator
        let value = self.parse_expression()?;
        let span = target.span.merge(value.span);
        Some(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    /// Only names, members and indexes can be assigned or updated.
    fn check_assign_target(&mut self, target: &Expr) {
        if !matches!(
            target.kind,
            ExprKind::Identifier(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
        ) {
            self.error_at(
                ErrorCode::INVALID_ASSIGNMENT_TARGET,
                "invalid assignment target",
                target.span,
            );
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Arrow Functions
    // ══════════════════════════════════════════════════════════════════════════

    /// `x =>` or `( ... ) =>` ahead?
    fn is_arrow_start(&self) -> bool {
        match self.peek_kind() {
            TokenKind::Identifier(_) => *self.look_ahead(1) == TokenKind::FatArrow,
            TokenKind::LParen => {
                let mut depth = 0usize;
                let mut n = 0;
                loop {
                    match self.look_ahead(n) {
                        TokenKind::LParen => depth += 1,
                        TokenKind::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                return *self.look_ahead(n + 1) == TokenKind::FatArrow;
                            }
                        }
                        TokenKind::Eof => return false,
                        _ => {}
                    }
                    n += 1;
                }
            }
            _ => false,
        }
    }

    fn parse_arrow(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let params = if self.check_exact(&TokenKind::LParen) {
            self.parse_params()?
        } else {
            vec![self.expect_identifier()?]
        };
        self.expect(&TokenKind::FatArrow)?;
        let body = if self.check_exact(&TokenKind::LBrace) {
            FunctionBody::Block(self.parse_function_body()?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_expression()?))
        };
        let span = start.merge(self.previous_span());
        let function = Function {
            name: None,
            params,
            body,
            span,
        };
        Some(Expr::new(ExprKind::Function(Rc::new(function)), span))
    }

    /// `( a, b, c )`
    pub(crate) fn parse_params(&mut self) -> Option<Vec<Ident>> {
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
        Some(params)
    }

    /// `function [name](params) { body }`, as a declaration or an expression.
    pub(crate) fn parse_function(&mut self) -> Option<Rc<Function>> {
        let start = self.current_span();
        self.expect(&TokenKind::Function)?;
        let name = match self.peek_kind() {
            TokenKind::Identifier(_) => Some(self.expect_identifier()?),
            _ => None,
        };
        let params = self.parse_params()?;
        let body = self.parse_function_body()?;
        let span = start.merge(self.previous_span());
        Some(Rc::new(Function {
            name,
            params,
            body: FunctionBody::Block(body),
            span,
        }))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Precedence Chain
    // ══════════════════════════════════════════════════════════════════════════

    fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
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

    fn logical(left: Expr, op: LogicalOp, right: Expr) -> Expr {
        let span = left.span.merge(right.span);
        Expr::new(
            ExprKind::Logical {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            span,
        )
    }

    /// `test ? consequent : alternate`
    fn parse_conditional(&mut self) -> Option<Expr> {
        let test = self.parse_coalesce()?;
        if !self.eat(&TokenKind::Question) {
            return Some(test);
        }
        let consequent = self.parse_expression()?;
        self.expect(&TokenKind::Colon)?;
        let alternate = self.parse_expression()?;
        let span = test.span.merge(alternate.span);
        Some(Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            span,
        ))
    }

    fn parse_coalesce(&mut self) -> Option<Expr> {
        let mut left = self.parse_or()?;
        while self.eat(&TokenKind::QuestionQuestion) {
            let right = self.parse_or()?;
            left = Self::logical(left, LogicalOp::Coalesce, right);
        }
        Some(left)
    }

    fn parse_or(&mut self) -> Option<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::PipePipe) {
            let right = self.parse_and()?;
            left = Self::logical(left, LogicalOp::Or, right);
        }
        Some(left)
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat(&TokenKind::AmpAmp) {
            let right = self.parse_equality()?;
            left = Self::logical(left, LogicalOp::And, right);
        }
        Some(left)
    }

    fn parse_equality(&mut self) -> Option<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::BangEq => BinOp::NotEq,
                TokenKind::EqEqEq => BinOp::StrictEq,
                TokenKind::BangEqEq => BinOp::StrictNotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Self::binary(left, op, right);
        }
        Some(left)
    }

    fn parse_relational(&mut self) -> Option<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Less => BinOp::Less,
                TokenKind::Greater => BinOp::Greater,
                TokenKind::LessEq => BinOp::LessEq,
                TokenKind::GreaterEq => BinOp::GreaterEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Self::binary(left, op, right);
        }
        Some(left)
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Self::binary(left, op, right);
        }
        Some(left)
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut left = self.parse_exponent()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_exponent()?;
            left = Self::binary(left, op, right);
        }
        Some(left)
    }

    /// `UnaryExpr [ "**" ExponentExpr ]`
    fn parse_exponent(&mut self) -> Option<Expr> {
        let base = self.parse_unary()?;
        if !self.eat(&TokenKind::StarStar) {
            return Some(base);
        }
        if !self.enter_nesting() {
            return None;
        }
        let exponent = self.parse_exponent();
        self.leave_nesting();
        Some(Self::binary(base, BinOp::Pow, exponent?))
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let op = match self.peek_kind() {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Typeof => UnaryOp::Typeof,
            TokenKind::Delete => UnaryOp::Delete,
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let increment = self.advance().kind == TokenKind::PlusPlus;
                let target = self.parse_unary()?;
                self.check_assign_target(&target);
                let span = start.merge(target.span);
                return Some(Expr::new(
                    ExprKind::Update {
                        increment,
                        prefix: true,
                        target: Box::new(target),
                    },
                    span,
                ));
            }
            _ => return self.parse_postfix(),
        };
        self.advance();
        if !self.enter_nesting() {
            return None;
        }
        let operand = self.parse_unary();
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

    /// Postfix `++`/`--` bind only when on the same line as the operand.
    fn parse_postfix(&mut self) -> Option<Expr> {
        let expr = self.parse_call_member()?;
        let same_line = self.current_span().line == self.previous_span().line;
        let increment = match self.peek_kind() {
            TokenKind::PlusPlus if same_line => true,
            TokenKind::MinusMinus if same_line => false,
            _ => return Some(expr),
        };
        self.advance();
        self.check_assign_target(&expr);
        let span = expr.span.merge(self.previous_span());
        Some(Expr::new(
            ExprKind::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            },
            span,
        ))
    }

    fn parse_call_member(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance(); // eat `.`
                    let property = self.expect_member_name()?;
                    let span = expr.span.merge(property.span);
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance(); // eat `[`
                    let index = self.parse_expression()?;
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
                    let args = self.parse_items(&TokenKind::RParen)?;
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

    /// Comma-separated, spreadable items up to and including `close`.
    fn parse_items(&mut self, close: &TokenKind) -> Option<Vec<ArrayItem>> {
        let mut items = Vec::new();
        while !self.check_exact(close) {
            if self.eat(&TokenKind::DotDotDot) {
                items.push(ArrayItem::Spread(self.parse_expression()?));
            } else {
                items.push(ArrayItem::Item(self.parse_expression()?));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Some(items)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Primary Expressions
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_primary(&mut self) -> Option<Expr> {
        let start = self.current_span();
        match self.peek_kind().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Some(Expr::new(ExprKind::Number(n.as_f64()), start))
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Some(Expr::new(ExprKind::String(s), start))
            }
            TokenKind::StringStart(s) => {
                self.advance();
                self.parse_template(s, start)
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
            TokenKind::Undefined => {
                self.advance();
                Some(Expr::new(ExprKind::Undefined, start))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Some(Expr::new(ExprKind::Identifier(name), start))
            }
            TokenKind::LBracket => {
                self.advance(); // eat `[`
                let items = self.parse_items(&TokenKind::RBracket)?;
                let span = start.merge(self.previous_span());
                Some(Expr::new(ExprKind::Array(items), span))
            }
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::LParen => {
                self.advance(); // eat `(`
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                Some(inner)
            }
            TokenKind::Function => {
                let function = self.parse_function()?;
                let span = function.span;
                Some(Expr::new(ExprKind::Function(function), span))
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

    /// `{ a: 1, b, ...rest, "k": v, method(x) { ... } }`
    fn parse_object_literal(&mut self) -> Option<Expr> {
        let start = self.current_span();
        self.advance(); // eat `{`
        let mut properties = Vec::new();
        while !self.check_exact(&TokenKind::RBrace) {
            if self.eat(&TokenKind::DotDotDot) {
                properties.push(Property::Spread(self.parse_expression()?));
            } else {
                let shorthand = matches!(self.peek_kind(), TokenKind::Identifier(_))
                    && matches!(self.look_ahead(1), TokenKind::Comma | TokenKind::RBrace);
                let key = self.expect_key()?;
                let value = if shorthand {
                    Expr::new(ExprKind::Identifier(key.name.clone()), key.span)
                } else if self.check_exact(&TokenKind::LParen) {
                    let params = self.parse_params()?;
                    let body = self.parse_function_body()?;
                    let span = key.span.merge(self.previous_span());
                    let method = Function {
                        name: Some(key.clone()),
                        params,
                        body: FunctionBody::Block(body),
                        span,
                    };
                    Expr::new(ExprKind::Function(Rc::new(method)), span)
                } else {
                    self.expect(&TokenKind::Colon)?;
                    self.parse_expression()?
                };
                properties.push(Property::Field { key, value });
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::Object(properties), span))
    }

    /// Parse a template literal after its `StringStart` token.
    fn parse_template(&mut self, start_text: String, start_span: Span) -> Option<Expr> {
        let mut parts = Vec::new();
        if !start_text.is_empty() {
            parts.push(TemplatePart::Literal(start_text));
        }
        loop {
            self.expect(&TokenKind::InterpolationStart)?;
            let expr = self.parse_expression()?;
            parts.push(TemplatePart::Expr(expr));
            self.expect(&TokenKind::InterpolationEnd)?;
            match self.peek_kind().clone() {
                TokenKind::StringPart(s) => {
                    self.advance();
                    if !s.is_empty() {
                        parts.push(TemplatePart::Literal(s));
                    }
                }
                TokenKind::StringEnd(s) => {
                    self.advance();
                    if !s.is_empty() {
                        parts.push(TemplatePart::Literal(s));
                    }
                    break;
                }
                _ => {
                    self.error_at_current(
                        ErrorCode::UNCLOSED_DELIMITER,
                        "unterminated template literal",
                    );
                    return None;
                }
            }
        }
        let span = start_span.merge(self.previous_span());
        Some(Expr::new(ExprKind::Template(parts), span))
    }
}
