// Top-level declaration parsing for the Kei language

use super::Parser;
use crate::ParseError;
use kei_ast::*;
use kei_diagnostics::error_codes;
use kei_lexer::TokenKind;

impl<'a> Parser<'a> {
    pub(crate) fn parse_decl(&mut self) -> Result<Decl, ParseError> {
        let start = self.peek().span;
        let is_pub = self.match_kind(TokenKind::Pub);

        match self.peek_kind() {
            TokenKind::Import => {
                if is_pub {
                    self.diags.emit_error(
                        error_codes::INVALID_MODIFIER,
                        "'pub' is not allowed on imports".to_string(),
                        self.file.location(start.start),
                    );
                }
                self.parse_import().map(Decl::Import)
            }
            TokenKind::Extern => {
                if is_pub {
                    self.diags.emit_error(
                        error_codes::INVALID_MODIFIER,
                        "'pub' is not allowed on extern functions".to_string(),
                        self.file.location(start.start),
                    );
                }
                self.parse_extern_function().map(Decl::ExternFunction)
            }
            TokenKind::Fn => {
                self.advance();
                self.parse_function(is_pub, start).map(Decl::Function)
            }
            TokenKind::Struct => self.parse_struct(is_pub, false, start).map(Decl::Struct),
            TokenKind::Unsafe if self.peek_nth(1).kind == TokenKind::Struct => {
                self.advance(); // 'unsafe'
                self.parse_struct(is_pub, true, start).map(Decl::Struct)
            }
            TokenKind::Enum => self.parse_enum(is_pub, start).map(Decl::Enum),
            TokenKind::Type => self.parse_type_alias(is_pub, start).map(Decl::TypeAlias),
            TokenKind::Static => self.parse_static(is_pub, start).map(Decl::Static),
            _ => Err(self.error_with_code(
                error_codes::EXPECTED_DECLARATION,
                "Expected declaration (fn, struct, unsafe struct, enum, type, static, import, extern fn)",
            )),
        }
    }

    /// `import { a, b } from path.seg;` | `import path.seg;`
    pub(crate) fn parse_import(&mut self) -> Result<Import, ParseError> {
        let start = self.consume(TokenKind::Import, "Expected 'import'")?.span;

        let mut names = Vec::new();
        if self.match_kind(TokenKind::LBrace) {
            loop {
                names.push(self.consume_identifier("imported name")?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
            self.consume(TokenKind::RBrace, "Expected '}' after import list")?;
            self.consume(TokenKind::From, "Expected 'from' after import list")?;
        }

        let mut path = vec![self.consume_identifier("module path")?];
        while self.match_kind(TokenKind::Dot) {
            path.push(self.consume_identifier("module path segment")?);
        }
        self.consume(TokenKind::Semicolon, "Expected ';' after import")?;

        Ok(Import {
            names,
            path,
            span: self.span_from(start),
        })
    }

    /// `extern fn name(params) -> Ret;`
    pub(crate) fn parse_extern_function(&mut self) -> Result<ExternFunction, ParseError> {
        let start = self.consume(TokenKind::Extern, "Expected 'extern'")?.span;
        self.consume(TokenKind::Fn, "Expected 'fn' after 'extern'")?;
        let name = self.consume_identifier("extern function name")?;
        let params = self.parse_params()?;
        let return_type = if self.match_kind(TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after extern declaration")?;

        Ok(ExternFunction {
            name,
            params,
            return_type,
            span: self.span_from(start),
        })
    }

    /// Body of `fn` — the keyword itself is consumed by the caller so
    /// struct methods share this path.
    pub(crate) fn parse_function(
        &mut self,
        is_pub: bool,
        start: kei_diagnostics::Span,
    ) -> Result<Function, ParseError> {
        let name = if self.check(TokenKind::Identifier) {
            self.advance().lexeme.clone()
        } else {
            return Err(self.error("Expected function name"));
        };

        let generic_params = self.parse_generic_params()?;
        let params = self.parse_params()?;

        let return_type = if self.match_kind(TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let mut throws = Vec::new();
        if self.match_kind(TokenKind::Throws) {
            loop {
                throws.push(self.parse_type()?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }

        let body = self.parse_block()?;

        Ok(Function {
            is_pub,
            name,
            generic_params,
            params,
            return_type,
            throws,
            body,
            span: self.span_from(start),
        })
    }

    /// `<T, U>` — plain type parameters, no bounds.
    pub(crate) fn parse_generic_params(&mut self) -> Result<Vec<String>, ParseError> {
        if !self.match_kind(TokenKind::Lt) {
            return Ok(Vec::new());
        }
        let mut params = Vec::new();
        loop {
            params.push(self.consume_identifier("type parameter name")?);
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        self.expect_gt("Expected '>' after type parameters")?;
        Ok(params)
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.consume(TokenKind::LParen, "Expected '('")?;
        let mut params = Vec::new();

        if !self.check(TokenKind::RParen) {
            loop {
                let start = self.peek().span;
                let is_mut = self.match_kind(TokenKind::Mut);
                let is_move = self.match_kind(TokenKind::Move);
                let name = if self.check(TokenKind::SelfKw) {
                    self.advance().lexeme.clone()
                } else {
                    self.consume_identifier("parameter name")?
                };
                self.consume(TokenKind::Colon, "Expected ':' after parameter name")?;
                let ty = self.parse_type()?;
                params.push(Param {
                    name,
                    ty,
                    is_mut,
                    is_move,
                    span: self.span_from(start),
                });
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::RParen, "Expected ')' after parameters")?;
        Ok(params)
    }

    /// `struct Name<T> { field: Type; … fn method(…) { … } }`
    pub(crate) fn parse_struct(
        &mut self,
        is_pub: bool,
        is_unsafe: bool,
        start: kei_diagnostics::Span,
    ) -> Result<StructDecl, ParseError> {
        self.consume(TokenKind::Struct, "Expected 'struct'")?;
        let name = self.consume_identifier("struct name")?;
        let generic_params = self.parse_generic_params()?;
        self.consume(TokenKind::LBrace, "Expected '{' after struct name")?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();

        while !self.check(TokenKind::RBrace) && !self.at_end() {
            if self.match_kind(TokenKind::Fn) {
                let fn_start = self.previous().span;
                methods.push(self.parse_function(false, fn_start)?);
            } else {
                let field_start = self.peek().span;
                let field_name = self.consume_identifier("field name")?;
                self.consume(TokenKind::Colon, "Expected ':' after field name")?;
                let ty = self.parse_type()?;
                self.consume(TokenKind::Semicolon, "Expected ';' after field")?;
                fields.push(Field {
                    name: field_name,
                    ty,
                    span: self.span_from(field_start),
                });
            }
        }

        self.consume(TokenKind::RBrace, "Expected '}' after struct body")?;

        Ok(StructDecl {
            is_pub,
            is_unsafe,
            name,
            generic_params,
            fields,
            methods,
            span: self.span_from(start),
        })
    }

    /// `enum Name : u8 { Unit, Data(T1, T2), }`
    pub(crate) fn parse_enum(
        &mut self,
        is_pub: bool,
        start: kei_diagnostics::Span,
    ) -> Result<EnumDecl, ParseError> {
        self.consume(TokenKind::Enum, "Expected 'enum'")?;
        let name = self.consume_identifier("enum name")?;

        let base_type = if self.match_kind(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        self.consume(TokenKind::LBrace, "Expected '{' after enum name")?;
        let mut variants = Vec::new();

        while !self.check(TokenKind::RBrace) && !self.at_end() {
            let variant_start = self.peek().span;
            let variant_name = self.consume_identifier("enum variant name")?;

            let mut variant_fields = Vec::new();
            if self.match_kind(TokenKind::LParen) {
                loop {
                    variant_fields.push(self.parse_type()?);
                    if !self.match_kind(TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RParen, "Expected ')' after variant data")?;
            }

            variants.push(EnumVariant {
                name: variant_name,
                fields: variant_fields,
                span: self.span_from(variant_start),
            });

            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }

        self.consume(TokenKind::RBrace, "Expected '}' after enum body")?;

        Ok(EnumDecl {
            is_pub,
            name,
            base_type,
            variants,
            span: self.span_from(start),
        })
    }

    /// `type Name = Type;`
    pub(crate) fn parse_type_alias(
        &mut self,
        is_pub: bool,
        start: kei_diagnostics::Span,
    ) -> Result<TypeAlias, ParseError> {
        self.consume(TokenKind::Type, "Expected 'type'")?;
        let name = self.consume_identifier("type alias name")?;
        self.consume(TokenKind::Eq, "Expected '=' in type alias")?;
        let ty = self.parse_type()?;
        self.consume(TokenKind::Semicolon, "Expected ';' after type alias")?;

        Ok(TypeAlias {
            is_pub,
            name,
            ty,
            span: self.span_from(start),
        })
    }

    /// `static NAME: Type = expr;`
    pub(crate) fn parse_static(
        &mut self,
        is_pub: bool,
        start: kei_diagnostics::Span,
    ) -> Result<StaticDecl, ParseError> {
        self.consume(TokenKind::Static, "Expected 'static'")?;
        let name = self.consume_identifier("static name")?;
        self.consume(TokenKind::Colon, "Expected ':' after static name")?;
        let ty = self.parse_type()?;
        self.consume(TokenKind::Eq, "Expected '=' in static declaration")?;
        let value = self.parse_expr()?;
        self.consume(TokenKind::Semicolon, "Expected ';' after static declaration")?;

        Ok(StaticDecl {
            is_pub,
            name,
            ty,
            value,
            span: self.span_from(start),
        })
    }
}
