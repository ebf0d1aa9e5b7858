// Statement parsing for the Kei language

use super::Parser;
use crate::ParseError;
use kei_ast::*;
use kei_lexer::TokenKind;

impl<'a> Parser<'a> {
    pub(crate) fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.peek().span;
        match self.peek_kind() {
            TokenKind::Let => self.parse_let(),
            TokenKind::Const => self.parse_const(),
            TokenKind::Return => {
                self.advance();
                let value = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.consume(TokenKind::Semicolon, "Expected ';' after return")?;
                Ok(Stmt {
                    kind: StmtKind::Return(value),
                    span: self.span_from(start),
                })
            }
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::While => {
                self.advance();
                let cond = self.parse_condition_expr()?;
                let body = self.parse_block()?;
                Ok(Stmt {
                    kind: StmtKind::While { cond, body },
                    span: self.span_from(start),
                })
            }
            TokenKind::For => {
                self.advance();
                let var = self.consume_identifier("loop variable name")?;
                self.consume(TokenKind::In, "Expected 'in' after loop variable")?;
                let iter = self.parse_condition_expr()?;
                let body = self.parse_block()?;
                Ok(Stmt {
                    kind: StmtKind::For { var, iter, body },
                    span: self.span_from(start),
                })
            }
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Defer => {
                self.advance();
                let inner = self.parse_stmt()?;
                Ok(Stmt {
                    kind: StmtKind::Defer(Box::new(inner)),
                    span: self.span_from(start),
                })
            }
            TokenKind::Break => {
                self.advance();
                self.consume(TokenKind::Semicolon, "Expected ';' after 'break'")?;
                Ok(Stmt {
                    kind: StmtKind::Break,
                    span: self.span_from(start),
                })
            }
            TokenKind::Continue => {
                self.advance();
                self.consume(TokenKind::Semicolon, "Expected ';' after 'continue'")?;
                Ok(Stmt {
                    kind: StmtKind::Continue,
                    span: self.span_from(start),
                })
            }
            TokenKind::Assert => {
                self.advance();
                let (cond, message) = self.parse_check_args("assert")?;
                Ok(Stmt {
                    kind: StmtKind::Assert { cond, message },
                    span: self.span_from(start),
                })
            }
            TokenKind::Require => {
                self.advance();
                let (cond, message) = self.parse_check_args("require")?;
                Ok(Stmt {
                    kind: StmtKind::Require { cond, message },
                    span: self.span_from(start),
                })
            }
            TokenKind::Unsafe if self.peek_nth(1).kind == TokenKind::LBrace => {
                self.advance();
                let block = self.parse_block()?;
                Ok(Stmt {
                    kind: StmtKind::Unsafe(block),
                    span: self.span_from(start),
                })
            }
            TokenKind::LBrace => {
                let block = self.parse_block()?;
                Ok(Stmt {
                    kind: StmtKind::Block(block),
                    span: self.span_from(start),
                })
            }
            _ => self.parse_expr_stmt(),
        }
    }

    /// Expression statement. A bare trailing expression (no semicolon,
    /// directly before `}`) is legal: it is the enclosing expression
    /// block's value. The statement span always excludes the semicolon.
    fn parse_expr_stmt(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.parse_expr()?;
        let span = expr.span;
        let semi = if self.match_kind(TokenKind::Semicolon) {
            true
        } else if self.check(TokenKind::RBrace) {
            false
        } else {
            return Err(self.error("expected ';' or '}'"));
        };
        Ok(Stmt {
            kind: StmtKind::Expr { expr, semi },
            span,
        })
    }

    fn parse_let(&mut self) -> Result<Stmt, ParseError> {
        let start = self.consume(TokenKind::Let, "Expected 'let'")?.span;
        let is_mut = self.match_kind(TokenKind::Mut);
        let name = self.consume_identifier("variable name")?;
        let ty = if self.match_kind(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.consume(TokenKind::Eq, "Expected '=' in let binding")?;
        let value = self.parse_expr()?;
        self.consume(TokenKind::Semicolon, "Expected ';' after let binding")?;
        Ok(Stmt {
            kind: StmtKind::Let {
                name,
                is_mut,
                ty,
                value,
            },
            span: self.span_from(start),
        })
    }

    fn parse_const(&mut self) -> Result<Stmt, ParseError> {
        let start = self.consume(TokenKind::Const, "Expected 'const'")?.span;
        let name = self.consume_identifier("constant name")?;
        let ty = if self.match_kind(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.consume(TokenKind::Eq, "Expected '=' in const binding")?;
        let value = self.parse_expr()?;
        self.consume(TokenKind::Semicolon, "Expected ';' after const binding")?;
        Ok(Stmt {
            kind: StmtKind::Const { name, ty, value },
            span: self.span_from(start),
        })
    }

    fn parse_if_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.consume(TokenKind::If, "Expected 'if'")?.span;
        let cond = self.parse_condition_expr()?;
        let then_block = self.parse_block()?;

        let else_branch = if self.match_kind(TokenKind::Else) {
            if self.check(TokenKind::If) {
                Some(Box::new(self.parse_if_stmt()?))
            } else {
                let block_start = self.peek().span;
                let block = self.parse_block()?;
                Some(Box::new(Stmt {
                    kind: StmtKind::Block(block),
                    span: self.span_from(block_start),
                }))
            }
        } else {
            None
        };

        Ok(Stmt {
            kind: StmtKind::If {
                cond,
                then_block,
                else_branch,
            },
            span: self.span_from(start),
        })
    }

    /// `switch expr { case pat: stmts … default: stmts }`
    fn parse_switch(&mut self) -> Result<Stmt, ParseError> {
        let start = self.consume(TokenKind::Switch, "Expected 'switch'")?.span;
        let scrutinee = self.parse_condition_expr()?;
        self.consume(TokenKind::LBrace, "Expected '{' after switch expression")?;

        let mut cases = Vec::new();
        let mut default: Option<Block> = None;

        while !self.check(TokenKind::RBrace) && !self.at_end() {
            if self.match_kind(TokenKind::Case) {
                let case_start = self.previous().span;
                let pattern = self.parse_case_pattern()?;
                self.consume(TokenKind::Colon, "Expected ':' after case pattern")?;
                let body = self.parse_case_body()?;
                cases.push(SwitchCase {
                    pattern,
                    body,
                    span: self.span_from(case_start),
                });
            } else if self.match_kind(TokenKind::Default) {
                self.consume(TokenKind::Colon, "Expected ':' after 'default'")?;
                let body = self.parse_case_body()?;
                if default.is_some() {
                    let loc = self.file.location(self.previous().span.start);
                    self.diags.emit_error(
                        kei_diagnostics::error_codes::UNEXPECTED_TOKEN,
                        "duplicate 'default' clause in switch".to_string(),
                        loc,
                    );
                } else {
                    default = Some(body);
                }
            } else {
                return Err(self.error("Expected 'case' or 'default' in switch body"));
            }
        }

        self.consume(TokenKind::RBrace, "Expected '}' after switch body")?;

        Ok(Stmt {
            kind: StmtKind::Switch {
                scrutinee,
                cases,
                default,
            },
            span: self.span_from(start),
        })
    }

    fn parse_case_pattern(&mut self) -> Result<CasePattern, ParseError> {
        if self.check(TokenKind::Identifier)
            && matches!(
                self.peek_nth(1).kind,
                TokenKind::Colon | TokenKind::LParen
            )
        {
            let name = self.advance().lexeme.clone();
            let mut bindings = Vec::new();
            if self.match_kind(TokenKind::LParen) {
                loop {
                    bindings.push(self.consume_identifier("binding name")?);
                    if !self.match_kind(TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RParen, "Expected ')' after case bindings")?;
            }
            return Ok(CasePattern::Variant { name, bindings });
        }
        let expr = self.parse_condition_expr()?;
        Ok(CasePattern::Literal(expr))
    }

    /// Statements up to the next `case`, `default`, or `}`.
    fn parse_case_body(&mut self) -> Result<Block, ParseError> {
        let start = self.peek().span;
        let mut stmts = Vec::new();
        while !self.check(TokenKind::Case)
            && !self.check(TokenKind::Default)
            && !self.check(TokenKind::RBrace)
            && !self.at_end()
        {
            stmts.push(self.parse_stmt()?);
        }
        let span = if stmts.is_empty() {
            start
        } else {
            self.span_from(start)
        };
        Ok(Block { stmts, span })
    }

    /// `(cond)` / `(cond, message)` argument list of assert/require.
    fn parse_check_args(&mut self, what: &str) -> Result<(Expr, Option<Expr>), ParseError> {
        self.consume(TokenKind::LParen, &format!("Expected '(' after '{}'", what))?;
        let cond = self.parse_expr()?;
        let message = if self.match_kind(TokenKind::Comma) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.consume(TokenKind::RParen, &format!("Expected ')' after {} arguments", what))?;
        self.consume(TokenKind::Semicolon, &format!("Expected ';' after '{}'", what))?;
        Ok((cond, message))
    }

    /// Expression in a position where `{` begins a block, not a struct
    /// literal.
    pub(crate) fn parse_condition_expr(&mut self) -> Result<Expr, ParseError> {
        let saved = std::mem::replace(&mut self.no_struct_literal, true);
        let result = self.parse_expr();
        self.no_struct_literal = saved;
        result
    }
}
