// Expression parsing for the Kei language
//
// Pratt core: a binding-power table drives infix parsing; prefix and
// postfix forms are handled around it. The single point of backtracking
// is the speculative generic-argument parse after `name <`.

use super::Parser;
use crate::ParseError;
use kei_ast::*;
use kei_diagnostics::error_codes;
use kei_lexer::{NumSuffix, TokenKind, TokenValue};

/// Binding power of the prefix operators `! ~ - &`.
const PREFIX_BP: u8 = 90;
/// `move` / `throw` bind just tighter than assignment.
const KEYWORD_PREFIX_BP: u8 = 14;
const RANGE_BP: (u8, u8) = (65, 66);
const ASSIGN_BP: (u8, u8) = (11, 10);

fn binary_binding(kind: TokenKind) -> Option<(BinaryOp, u8, u8)> {
    use BinaryOp::*;
    use TokenKind as T;
    Some(match kind {
        T::Star => (Mul, 80, 81),
        T::Slash => (Div, 80, 81),
        T::Percent => (Mod, 80, 81),
        T::Plus => (Add, 70, 71),
        T::Minus => (Sub, 70, 71),
        T::Shl => (Shl, 60, 61),
        T::Shr => (Shr, 60, 61),
        T::Lt => (Lt, 55, 56),
        T::LtEq => (LtEq, 55, 56),
        T::Gt => (Gt, 55, 56),
        T::GtEq => (GtEq, 55, 56),
        T::EqEq => (EqEq, 50, 51),
        T::NotEq => (NotEq, 50, 51),
        T::Amp => (BitAnd, 45, 46),
        T::Caret => (BitXor, 40, 41),
        T::Pipe => (BitOr, 35, 36),
        T::AmpAmp => (And, 30, 31),
        T::PipePipe => (Or, 25, 26),
        _ => return None,
    })
}

/// Compound-assignment operator, or `None` for plain `=`.
fn assign_binding(kind: TokenKind) -> Option<Option<BinaryOp>> {
    use BinaryOp::*;
    use TokenKind as T;
    Some(match kind {
        T::Eq => None,
        T::PlusEq => Some(Add),
        T::MinusEq => Some(Sub),
        T::StarEq => Some(Mul),
        T::SlashEq => Some(Div),
        T::PercentEq => Some(Mod),
        T::AmpEq => Some(BitAnd),
        T::PipeEq => Some(BitOr),
        T::CaretEq => Some(BitXor),
        T::ShlEq => Some(Shl),
        T::ShrEq => Some(Shr),
        _ => return None,
    })
}

fn suffix_name(suffix: NumSuffix) -> &'static str {
    match suffix {
        NumSuffix::I8 => "i8",
        NumSuffix::I16 => "i16",
        NumSuffix::I32 => "i32",
        NumSuffix::I64 => "i64",
        NumSuffix::U8 => "u8",
        NumSuffix::U16 => "u16",
        NumSuffix::U32 => "u32",
        NumSuffix::U64 => "u64",
        NumSuffix::Isize => "isize",
        NumSuffix::Usize => "usize",
        NumSuffix::F32 => "f32",
        NumSuffix::F64 => "f64",
    }
}

impl<'a> Parser<'a> {
    pub(crate) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_bp(0)
    }

    /// Expression in a context where `{` cannot be confused with a block,
    /// so struct literals are allowed again (parens, brackets, arguments).
    pub(crate) fn parse_free_expr(&mut self) -> Result<Expr, ParseError> {
        let saved = std::mem::replace(&mut self.no_struct_literal, false);
        let result = self.parse_expr();
        self.no_struct_literal = saved;
        result
    }

    fn parse_bp(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let kind = self.peek_kind();

            if let Some(op) = assign_binding(kind) {
                if ASSIGN_BP.0 < min_bp {
                    break;
                }
                self.advance();
                let value = self.parse_bp(ASSIGN_BP.1)?;
                let span = lhs.span.to(value.span);
                lhs = self.mk_expr(
                    ExprKind::Assign {
                        op,
                        target: Box::new(lhs),
                        value: Box::new(value),
                    },
                    span,
                );
                continue;
            }

            if matches!(kind, TokenKind::DotDot | TokenKind::DotDotEq) {
                if RANGE_BP.0 < min_bp {
                    break;
                }
                let inclusive = kind == TokenKind::DotDotEq;
                self.advance();
                let end = self.parse_bp(RANGE_BP.1)?;
                if matches!(self.peek_kind(), TokenKind::DotDot | TokenKind::DotDotEq) {
                    return Err(self.error("Range expressions cannot be chained"));
                }
                let span = lhs.span.to(end.span);
                lhs = self.mk_expr(
                    ExprKind::Range {
                        start: Box::new(lhs),
                        end: Box::new(end),
                        inclusive,
                    },
                    span,
                );
                continue;
            }

            if let Some((op, l_bp, r_bp)) = binary_binding(kind) {
                if l_bp < min_bp {
                    break;
                }
                self.advance();
                let rhs = self.parse_bp(r_bp)?;
                let span = lhs.span.to(rhs.span);
                lhs = self.mk_expr(
                    ExprKind::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    span,
                );
                continue;
            }

            break;
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().span;
        let op = match self.peek_kind() {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Amp => Some(UnaryOp::AddrOf),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_bp(PREFIX_BP)?;
            let span = start.to(operand.span);
            return Ok(self.mk_expr(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }

        match self.peek_kind() {
            TokenKind::Move => {
                self.advance();
                let operand = self.parse_bp(KEYWORD_PREFIX_BP)?;
                let span = start.to(operand.span);
                Ok(self.mk_expr(ExprKind::Move(Box::new(operand)), span))
            }
            TokenKind::Throw => {
                self.advance();
                let operand = self.parse_bp(KEYWORD_PREFIX_BP)?;
                let span = start.to(operand.span);
                Ok(self.mk_expr(ExprKind::Throw(Box::new(operand)), span))
            }
            _ => {
                let primary = self.parse_primary()?;
                self.parse_postfix(primary)
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let start = token.span;

        match token.kind {
            TokenKind::IntLiteral => {
                self.advance();
                let (value, suffix) = match token.value {
                    Some(TokenValue::Int { value, suffix }) => {
                        (value, suffix.map(|s| suffix_name(s).to_string()))
                    }
                    _ => (0, None),
                };
                Ok(self.mk_expr(ExprKind::IntLiteral { value, suffix }, start))
            }
            TokenKind::FloatLiteral => {
                self.advance();
                let (value, suffix) = match token.value {
                    Some(TokenValue::Float { value, suffix }) => {
                        (value, suffix.map(|s| suffix_name(s).to_string()))
                    }
                    _ => (0.0, None),
                };
                Ok(self.mk_expr(ExprKind::FloatLiteral { value, suffix }, start))
            }
            TokenKind::StringLiteral => {
                self.advance();
                let value = match token.value {
                    Some(TokenValue::Str(s)) => s,
                    _ => String::new(),
                };
                Ok(self.mk_expr(ExprKind::StringLiteral(value), start))
            }
            TokenKind::True => {
                self.advance();
                Ok(self.mk_expr(ExprKind::BoolLiteral(true), start))
            }
            TokenKind::False => {
                self.advance();
                Ok(self.mk_expr(ExprKind::BoolLiteral(false), start))
            }
            TokenKind::Null => {
                self.advance();
                Ok(self.mk_expr(ExprKind::NullLiteral, start))
            }
            TokenKind::Identifier | TokenKind::SelfKw | TokenKind::Panic => {
                self.advance();
                Ok(self.mk_expr(ExprKind::Identifier(token.lexeme.clone()), start))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_free_expr()?;
                self.consume(TokenKind::RParen, "Expected ')' after expression")?;
                let span = self.span_from(start);
                Ok(self.mk_expr(ExprKind::Group(Box::new(inner)), span))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        elements.push(self.parse_free_expr()?);
                        if !self.match_kind(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(TokenKind::RBracket, "Expected ']' after array elements")?;
                let span = self.span_from(start);
                Ok(self.mk_expr(ExprKind::ArrayLiteral(elements), span))
            }
            TokenKind::If => self.parse_if_expr(),
            TokenKind::Unsafe => {
                self.advance();
                let block = self.parse_block()?;
                let span = self.span_from(start);
                Ok(self.mk_expr(ExprKind::Unsafe(block), span))
            }
            _ => Err(self.error_with_code(
                error_codes::EXPECTED_EXPRESSION,
                "Expected expression",
            )),
        }
    }

    /// `if cond { … } else { … }` as an expression. Each block is an
    /// expression block: a trailing bare expression is its value.
    fn parse_if_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.consume(TokenKind::If, "Expected 'if'")?.span;
        let cond = self.parse_condition_expr()?;
        let then_block = self.parse_block()?;

        let else_block = if self.match_kind(TokenKind::Else) {
            if self.check(TokenKind::If) {
                // else-if chain: wrap the nested if-expression in a block
                let nested = self.parse_if_expr()?;
                let span = nested.span;
                Some(Block {
                    stmts: vec![Stmt {
                        span,
                        kind: StmtKind::Expr {
                            expr: nested,
                            semi: false,
                        },
                    }],
                    span,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        let span = self.span_from(start);
        Ok(self.mk_expr(
            ExprKind::If {
                cond: Box::new(cond),
                then_block,
                else_block,
            },
            span,
        ))
    }

    fn parse_postfix(&mut self, mut lhs: Expr) -> Result<Expr, ParseError> {
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let field = self.consume_identifier("field or method name")?;
                    let span = lhs.span.to(self.previous().span);
                    lhs = self.mk_expr(
                        ExprKind::Member {
                            object: Box::new(lhs),
                            field,
                        },
                        span,
                    );
                }
                TokenKind::DotStar => {
                    self.advance();
                    let span = lhs.span.to(self.previous().span);
                    lhs = self.mk_expr(ExprKind::Deref(Box::new(lhs)), span);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_free_expr()?;
                    self.consume(TokenKind::RBracket, "Expected ']' after index")?;
                    let span = lhs.span.to(self.previous().span);
                    lhs = self.mk_expr(
                        ExprKind::Index {
                            object: Box::new(lhs),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    lhs = self.parse_call(lhs, Vec::new())?;
                }
                TokenKind::PlusPlus => {
                    self.advance();
                    let span = lhs.span.to(self.previous().span);
                    lhs = self.mk_expr(ExprKind::Increment(Box::new(lhs)), span);
                }
                TokenKind::MinusMinus => {
                    self.advance();
                    let span = lhs.span.to(self.previous().span);
                    lhs = self.mk_expr(ExprKind::Decrement(Box::new(lhs)), span);
                }
                TokenKind::As => {
                    self.advance();
                    let ty = self.parse_type()?;
                    let span = lhs.span.to(ty.span);
                    lhs = self.mk_expr(
                        ExprKind::Cast {
                            expr: Box::new(lhs),
                            ty,
                        },
                        span,
                    );
                }
                TokenKind::Catch => {
                    lhs = self.parse_catch(lhs)?;
                }
                TokenKind::Lt
                    if matches!(
                        lhs.kind,
                        ExprKind::Identifier(_) | ExprKind::Member { .. }
                    ) =>
                {
                    match self.try_generic_postfix(lhs)? {
                        Ok(expr) => lhs = expr,
                        // speculation failed: `<` is a comparison, postfix
                        // parsing is over for this operand
                        Err(original) => return Ok(original),
                    }
                }
                TokenKind::LBrace
                    if !self.no_struct_literal
                        && matches!(lhs.kind, ExprKind::Identifier(_)) =>
                {
                    lhs = self.parse_struct_literal(lhs, Vec::new())?;
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    /// Speculatively parse `<T, U>` after an identifier or member access.
    /// Commits only when the list closes with `>` and the next token is
    /// `(` (generic call) or `{` (generic struct literal); otherwise
    /// cursor and diagnostics are restored and the caller treats `<` as a
    /// comparison. Returns `Err(lhs)` on rollback.
    fn try_generic_postfix(&mut self, lhs: Expr) -> Result<Result<Expr, Expr>, ParseError> {
        let cp = self.checkpoint();
        self.advance(); // '<'

        let mut args = Vec::new();
        let mut closed = false;
        loop {
            match self.parse_type_arg() {
                Ok(arg) => args.push(arg),
                Err(_) => break,
            }
            if self.match_kind(TokenKind::Comma) {
                continue;
            }
            closed = self.expect_gt("Expected '>' after type arguments").is_ok();
            break;
        }

        // the success path emits no diagnostics, so committing needs no
        // rollback; any failed attempt restores cursor, diagnostics, and
        // token edits together
        if closed {
            if self.check(TokenKind::LParen) {
                let call = self.parse_call(lhs, args)?;
                return Ok(Ok(call));
            }
            if self.check(TokenKind::LBrace)
                && !self.no_struct_literal
                && matches!(lhs.kind, ExprKind::Identifier(_))
            {
                let literal = self.parse_struct_literal(lhs, args)?;
                return Ok(Ok(literal));
            }
        }

        self.restore(cp);
        Ok(Err(lhs))
    }

    fn parse_call(&mut self, callee: Expr, type_args: Vec<TypeExpr>) -> Result<Expr, ParseError> {
        self.consume(TokenKind::LParen, "Expected '('")?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_free_expr()?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expected ')' after arguments")?;
        let span = callee.span.to(self.previous().span);
        Ok(self.mk_expr(
            ExprKind::Call {
                callee: Box::new(callee),
                type_args,
                args,
            },
            span,
        ))
    }

    fn parse_struct_literal(
        &mut self,
        name_expr: Expr,
        type_args: Vec<TypeExpr>,
    ) -> Result<Expr, ParseError> {
        let name = match &name_expr.kind {
            ExprKind::Identifier(name) => name.clone(),
            _ => return Err(self.error("Struct literal requires a type name")),
        };
        self.consume(TokenKind::LBrace, "Expected '{'")?;

        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            let field_name = self.consume_identifier("field name")?;
            self.consume(TokenKind::Colon, "Expected ':' after field name")?;
            let value = self.parse_free_expr()?;
            fields.push((field_name, value));
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RBrace, "Expected '}' after struct literal")?;

        let span = name_expr.span.to(self.previous().span);
        Ok(self.mk_expr(
            ExprKind::StructLiteral {
                name,
                type_args,
                fields,
            },
            span,
        ))
    }

    /// `expr catch panic` / `expr catch throw` /
    /// `expr catch { Err e: …  default e: … }`
    fn parse_catch(&mut self, operand: Expr) -> Result<Expr, ParseError> {
        self.consume(TokenKind::Catch, "Expected 'catch'")?;

        let handler = match self.peek_kind() {
            TokenKind::Panic => {
                self.advance();
                CatchHandler::Panic
            }
            TokenKind::Throw => {
                self.advance();
                CatchHandler::Rethrow
            }
            TokenKind::LBrace => {
                self.advance();
                let mut arms = Vec::new();
                while !self.check(TokenKind::RBrace) && !self.at_end() {
                    let arm_start = self.peek().span;
                    let error_type = if self.match_kind(TokenKind::Default) {
                        None
                    } else {
                        Some(self.consume_identifier("error type name")?)
                    };
                    let binding = self.consume_identifier("error binding name")?;
                    self.consume(TokenKind::Colon, "Expected ':' after catch binding")?;
                    let body = if self.check(TokenKind::LBrace) {
                        self.parse_block()?
                    } else {
                        let stmt = self.parse_stmt()?;
                        let span = stmt.span;
                        Block {
                            stmts: vec![stmt],
                            span,
                        }
                    };
                    arms.push(CatchArm {
                        error_type,
                        binding,
                        body,
                        span: arm_start.to(self.previous().span),
                    });
                }
                self.consume(TokenKind::RBrace, "Expected '}' after catch clauses")?;
                CatchHandler::Block { arms }
            }
            _ => {
                return Err(self.error("Expected 'panic', 'throw', or '{' after 'catch'"));
            }
        };

        let span = operand.span.to(self.previous().span);
        Ok(self.mk_expr(
            ExprKind::Catch {
                operand: Box::new(operand),
                handler,
            },
            span,
        ))
    }
}
