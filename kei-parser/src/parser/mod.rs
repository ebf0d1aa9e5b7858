// Modular parser for the Kei language
// This module organizes the parser into logical components

use crate::ParseError;
use kei_ast::*;
use kei_diagnostics::{error_codes, DiagnosticEngine, SourceFile, Span};
use kei_lexer::{Token, TokenKind};

mod expressions;
mod items;
mod statements;
mod types;

/// Cursor + diagnostics savepoint for speculative parsing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    pos: usize,
    diag_len: usize,
    edits_len: usize,
}

pub struct Parser<'a> {
    pub(crate) file: &'a SourceFile,
    pub(crate) tokens: Vec<Token>,
    pub(crate) pos: usize,
    pub(crate) diags: &'a mut DiagnosticEngine,
    pub(crate) next_id: NodeId,
    /// Suppresses `Name { … }` struct literals where a `{` starts a block
    /// (if/while/for/switch headers).
    pub(crate) no_struct_literal: bool,
    /// Journal of `>>`-splitting token edits, undone on backtrack.
    pub(crate) edits: Vec<(usize, Token)>,
}

impl<'a> Parser<'a> {
    pub fn new(file: &'a SourceFile, diags: &'a mut DiagnosticEngine) -> Self {
        let tokens = kei_lexer::tokenize(file, diags);
        Self {
            file,
            tokens,
            pos: 0,
            diags,
            next_id: 0,
            no_struct_literal: false,
            edits: Vec::new(),
        }
    }

    /// Parse a whole program, recovering at declaration boundaries.
    /// Declarations appear in source order.
    pub fn parse_program(&mut self) -> Program {
        let mut decls = Vec::new();
        while !self.at_end() {
            match self.parse_decl() {
                Ok(decl) => decls.push(decl),
                Err(_) => self.synchronize(),
            }
        }
        Program { decls }
    }

    // ==================== Helper Methods ====================

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    pub(crate) fn peek_nth(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    pub(crate) fn at_end(&self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(crate) fn advance(&mut self) -> &Token {
        if !self.at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    pub(crate) fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance().clone())
        } else {
            Err(self.error(message))
        }
    }

    /// Consume an identifier and return its lexeme.
    pub(crate) fn consume_identifier(&mut self, what: &str) -> Result<String, ParseError> {
        if self.check(TokenKind::Identifier) {
            Ok(self.advance().lexeme.clone())
        } else {
            Err(self.error(&format!("Expected {}", what)))
        }
    }

    /// Record a diagnostic at the current token and return the recovery
    /// signal.
    pub(crate) fn error(&mut self, message: &str) -> ParseError {
        self.error_with_code(error_codes::UNEXPECTED_TOKEN, message)
    }

    pub(crate) fn error_with_code(&mut self, code: &str, message: &str) -> ParseError {
        let token = self.peek();
        let location = self.file.location(token.span.start);
        let shown = if token.kind == TokenKind::Eof {
            format!("{}, found end of file", message)
        } else {
            format!("{}, found '{}'", message, token.lexeme)
        };
        self.diags.emit_error(code, shown, location.clone());
        ParseError::Syntax {
            location: location.to_string(),
            message: message.to_string(),
        }
    }

    /// Savepoint for speculative parsing: cursor position, diagnostics
    /// length, and the token-edit journal.
    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            diag_len: self.diags.len(),
            edits_len: self.edits.len(),
        }
    }

    pub(crate) fn restore(&mut self, cp: Checkpoint) {
        self.pos = cp.pos;
        self.diags.truncate_to(cp.diag_len);
        while self.edits.len() > cp.edits_len {
            if let Some((idx, original)) = self.edits.pop() {
                self.tokens[idx] = original;
            }
        }
    }

    /// Skip the offending token, then advance until just past a `;` or
    /// `}`, or until the current token starts a statement or declaration.
    /// Always makes progress so recovery loops terminate.
    pub(crate) fn synchronize(&mut self) {
        use TokenKind::*;
        self.advance();
        while !self.at_end() {
            match self.previous().kind {
                Semicolon | RBrace => return,
                _ => {}
            }
            match self.peek_kind() {
                Fn | Struct | Enum | Type | Import | Static | Extern | Pub | Let | Const
                | Return | If | While | For | Switch | Defer | Break | Continue | Assert
                | Require | Unsafe => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    pub(crate) fn next_node_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn mk_expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        Expr {
            id: self.next_node_id(),
            kind,
            span,
        }
    }

    /// Span from `start` to the end of the previously consumed token.
    pub(crate) fn span_from(&self, start: Span) -> Span {
        start.to(self.previous().span)
    }

    // ==================== Blocks ====================

    pub(crate) fn parse_block(&mut self) -> Result<Block, ParseError> {
        let open = self.consume(TokenKind::LBrace, "Expected '{'")?;
        let mut stmts = Vec::new();

        while !self.check(TokenKind::RBrace) && !self.at_end() {
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(_) => {
                    self.synchronize();
                    // a closing brace consumed during recovery ends the block
                    if self.previous().kind == TokenKind::RBrace {
                        return Ok(Block {
                            stmts,
                            span: open.span.to(self.previous().span),
                        });
                    }
                }
            }
        }

        self.consume(TokenKind::RBrace, "Expected '}'")?;
        Ok(Block {
            stmts,
            span: open.span.to(self.previous().span),
        })
    }
}
