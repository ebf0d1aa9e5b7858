// Type expression parsing for the Kei language

use super::Parser;
use crate::ParseError;
use kei_ast::*;
use kei_lexer::TokenKind;

impl<'a> Parser<'a> {
    /// Named type (`Box`, `i32`, `ptr`) or generic application
    /// (`ptr<u8>`, `array<i32, 16>`, `Pair<i32, bool>`).
    pub(crate) fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        let token = self.peek().clone();
        if token.kind != TokenKind::Identifier && !token.kind.is_type_keyword() {
            return Err(self.error_with_code(
                kei_diagnostics::error_codes::EXPECTED_TYPE,
                "Expected type",
            ));
        }
        self.advance();
        let name = token.lexeme.clone();
        let start = token.span;

        if !self.check(TokenKind::Lt) {
            return Ok(TypeExpr {
                kind: TypeExprKind::Named(name),
                span: start,
            });
        }

        self.advance(); // '<'
        let mut args = Vec::new();
        loop {
            args.push(self.parse_type_arg()?);
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        self.expect_gt("Expected '>' after type arguments")?;

        Ok(TypeExpr {
            kind: TypeExprKind::Generic { name, args },
            span: self.span_from(start),
        })
    }

    /// A type argument is a type, or a literal integer in contexts like
    /// `array<T, 16>` (carried as a named type whose name is the lexeme).
    pub(crate) fn parse_type_arg(&mut self) -> Result<TypeExpr, ParseError> {
        if self.check(TokenKind::IntLiteral) {
            let token = self.advance();
            return Ok(TypeExpr {
                kind: TypeExprKind::Named(token.lexeme.clone()),
                span: token.span,
            });
        }
        self.parse_type()
    }

    /// Consume a closing `>`, splitting a `>>` token in two so nested
    /// generic arguments like `ptr<ptr<u8>>` close correctly. Splits are
    /// journaled and undone if a speculative parse backtracks.
    pub(crate) fn expect_gt(&mut self, message: &str) -> Result<(), ParseError> {
        if self.match_kind(TokenKind::Gt) {
            return Ok(());
        }
        if self.check(TokenKind::Shr) {
            let idx = self.pos;
            let original = self.tokens[idx].clone();
            let mut second = original.clone();
            second.kind = TokenKind::Gt;
            second.span.start += 1;
            second.column += 1;
            second.lexeme = ">".to_string();
            self.edits.push((idx, original));
            self.tokens[idx] = second;
            // the first '>' is consumed; the narrowed token remains current
            return Ok(());
        }
        Err(self.error(message))
    }
}
