//! Script statement parsing.

use crate::parser::Parser;
use quire_lexer::TokenKind;
use quire_types::ast::script::*;
use quire_types::ErrorCode;

impl<'src> Parser<'src> {
    /// Parse `{ stmts... }` and return the statements.
    pub(crate) fn parse_block_body(&mut self) -> Option<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check_exact(&TokenKind::RBrace) && !self.at_end() {
            if self.too_many_errors() {
                break;
            }
            let from = self.position();
            match self.parse_statement() {
                Some(stmt) => stmts.push(stmt),
                None => self.synchronize(from),
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Some(stmts)
    }

    /// A function body: a block where `break`/`continue` cannot reach
    /// loops outside the function.
    pub(crate) fn parse_function_body(&mut self) -> Option<Vec<Stmt>> {
        let saved = std::mem::replace(&mut self.loop_depth, 0);
        let body = self.parse_block_body();
        self.loop_depth = saved;
        body
    }

    /// Parse a single statement.
    pub(crate) fn parse_statement(&mut self) -> Option<Stmt> {
        match self.peek_kind() {
            TokenKind::Let | TokenKind::Const => {
                let stmt = self.parse_declaration()?;
                self.end_statement();
                Some(stmt)
            }
            TokenKind::Function if matches!(self.look_ahead(1), TokenKind::Identifier(_)) => {
                self.parse_function().map(Stmt::Function)
            }
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::Break | TokenKind::Continue => self.parse_jump_stmt(),
            TokenKind::Throw => {
                let start = self.advance().span;
                let value = self.parse_expression()?;
                let span = start.merge(value.span);
                self.end_statement();
                Some(Stmt::Throw { value, span })
            }
            TokenKind::LBrace => {
                let start = self.current_span();
                let body = self.parse_block_body()?;
                let span = start.merge(self.previous_span());
                Some(Stmt::Block { body, span })
            }
            TokenKind::Semicolon => Some(Stmt::Empty(self.advance().span)),
            _ => {
                let expr = self.parse_expression()?;
                self.end_statement();
                Some(Stmt::Expr(expr))
            }
        }
    }

    /// Statements end with `;`, a line break, `}` or end of input.
    fn end_statement(&mut self) {
        if self.eat(&TokenKind::Semicolon)
            || self.at_end()
            || self.check_exact(&TokenKind::RBrace)
            || self.current_span().line > self.previous_span().line
        {
            return;
        }
        self.error_at_current(
            ErrorCode::UNEXPECTED_TOKEN,
            format!("expected ';', got '{}'", self.peek_kind()),
        );
    }

    /// `let name [= init]` / `const name = init` (without the terminator)
    fn parse_declaration(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        let kind = match self.advance().kind {
            TokenKind::Const => DeclKind::Const,
            _ => DeclKind::Let,
        };
        let name = self.expect_identifier()?;
        let init = if self.eat(&TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            if kind == DeclKind::Const {
                self.error_at_current(
                    ErrorCode::EXPECTED_EXPRESSION,
                    format!("missing initializer in const declaration of '{}'", name.name),
                );
            }
            None
        };
        let span = start.merge(self.previous_span());
        Some(Stmt::Decl {
            kind,
            name,
            init,
            span,
        })
    }

    /// `( expr )`
    fn parse_condition(&mut self) -> Option<Expr> {
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        Some(condition)
    }

    /// `if (cond) stmt [else stmt]`
    fn parse_if_stmt(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // eat `if`
        let condition = self.parse_condition()?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        let span = start.merge(self.previous_span());
        Some(Stmt::If {
            condition,
            then_branch,
            else_branch,
            span,
        })
    }

    /// A loop body, with `break`/`continue` allowed.
    fn parse_loop_body(&mut self) -> Option<Box<Stmt>> {
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        body.map(Box::new)
    }

    /// `while (cond) stmt`
    fn parse_while_stmt(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // eat `while`
        let condition = self.parse_condition()?;
        let body = self.parse_loop_body()?;
        let span = start.merge(self.previous_span());
        Some(Stmt::While {
            condition,
            body,
            span,
        })
    }

    /// `for (init; test; update) stmt` or `for (const x of xs) stmt`
    fn parse_for_stmt(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // eat `for`
        self.expect(&TokenKind::LParen)?;

        let is_for_of = matches!(self.peek_kind(), TokenKind::Let | TokenKind::Const)
            && matches!(self.look_ahead(1), TokenKind::Identifier(_))
            && *self.look_ahead(2) == TokenKind::Of;
        if is_for_of {
            let kind = match self.advance().kind {
                TokenKind::Const => DeclKind::Const,
                _ => DeclKind::Let,
            };
            let name = self.expect_identifier()?;
            self.expect(&TokenKind::Of)?;
            let iterable = self.parse_expression()?;
            self.expect(&TokenKind::RParen)?;
            let body = self.parse_loop_body()?;
            let span = start.merge(self.previous_span());
            return Some(Stmt::ForOf {
                kind,
                name,
                iterable,
                body,
                span,
            });
        }

        let init = match self.peek_kind() {
            TokenKind::Semicolon => None,
            TokenKind::Let | TokenKind::Const => Some(Box::new(self.parse_declaration()?)),
            _ => Some(Box::new(Stmt::Expr(self.parse_expression()?))),
        };
        self.expect(&TokenKind::Semicolon)?;
        let test = if self.check_exact(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;
        let update = if self.check_exact(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_loop_body()?;
        let span = start.merge(self.previous_span());
        Some(Stmt::For {
            init,
            test,
            update,
            body,
            span,
        })
    }

    /// `return [expr]`. A value must start on the same line.
    fn parse_return_stmt(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // eat `return`
        let bare = self.at_end()
            || self.check_exact(&TokenKind::Semicolon)
            || self.check_exact(&TokenKind::RBrace)
            || self.current_span().line > start.line;
        let value = if bare {
            None
        } else {
            Some(self.parse_expression()?)
        };
        let span = start.merge(self.previous_span());
        self.end_statement();
        Some(Stmt::Return { value, span })
    }

    /// `break` / `continue`
    fn parse_jump_stmt(&mut self) -> Option<Stmt> {
        let token = self.advance();
        let word = token.kind.to_string();
        if self.loop_depth == 0 {
            self.error_at(
                ErrorCode::MISPLACED_CONTROL_FLOW,
                format!("'{word}' outside of a loop"),
                token.span,
            );
        }
        self.end_statement();
        if token.kind == TokenKind::Break {
            Some(Stmt::Break(token.span))
        } else {
            Some(Stmt::Continue(token.span))
        }
    }
}
