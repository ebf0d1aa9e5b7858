//! Lexer for the Kei language.
//!
//! Turns a [`SourceFile`] into a `Vec<Token>` ending in a distinguished
//! `Eof` token. The scanner never aborts: malformed input produces an
//! `Error` token plus a diagnostic and scanning continues, so the parser
//! always sees a well-formed stream.

use kei_diagnostics::{error_codes, DiagnosticEngine, SourceFile, Span};
use thiserror::Error;

mod token;
pub use token::{is_reserved_keyword, keyword_kind, NumSuffix, Token, TokenKind, TokenValue};

/// Lexical failures that consume input and surface as `Error` tokens.
#[derive(Debug, Clone, Error)]
pub enum LexError {
    #[error("Unexpected character '{ch}'")]
    UnexpectedCharacter { ch: char, span: Span },
    #[error("Unterminated string literal")]
    UnterminatedString { span: Span },
    #[error("Unterminated multi-line comment")]
    UnterminatedComment { span: Span },
    #[error("Malformed numeric literal: {detail}")]
    MalformedLiteral { detail: String, span: Span },
}

impl LexError {
    fn span(&self) -> Span {
        match self {
            LexError::UnexpectedCharacter { span, .. }
            | LexError::UnterminatedString { span }
            | LexError::UnterminatedComment { span }
            | LexError::MalformedLiteral { span, .. } => *span,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            LexError::UnexpectedCharacter { .. } => error_codes::UNEXPECTED_CHARACTER,
            LexError::UnterminatedString { .. } => error_codes::UNTERMINATED_STRING,
            LexError::UnterminatedComment { .. } => error_codes::UNTERMINATED_COMMENT,
            LexError::MalformedLiteral { .. } => error_codes::MALFORMED_LITERAL,
        }
    }
}

/// Scanner state: a cursor over the source buffer.
pub struct Lexer<'a> {
    file: &'a SourceFile,
    src: &'a str,
    pos: usize,
}

/// Tokenize a whole file, appending lexical diagnostics to `diags`.
pub fn tokenize(file: &SourceFile, diags: &mut DiagnosticEngine) -> Vec<Token> {
    Lexer::new(file).run(diags)
}

impl<'a> Lexer<'a> {
    pub fn new(file: &'a SourceFile) -> Self {
        Self {
            file,
            src: file.source(),
            pos: 0,
        }
    }

    pub fn run(mut self, diags: &mut DiagnosticEngine) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia(diags);
            if self.pos >= self.src.len() {
                break;
            }
            let start = self.pos;
            match self.scan_token(diags) {
                Ok(token) => tokens.push(token),
                Err(err) => {
                    let span = err.span();
                    diags.emit_error(err.code(), err.to_string(), self.file.location(span.start));
                    tokens.push(self.make_token(TokenKind::Error, start.min(span.start), None));
                }
            }
        }
        let end = self.src.len();
        let (line, column) = self.file.line_col(end);
        tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            span: Span::new(end, end),
            line,
            column,
            value: None,
        });
        tokens
    }

    // ==================== cursor primitives ====================

    fn peek(&self, n: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + n).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.src.get(self.pos..).and_then(|s| s.chars().next())
    }

    fn bump(&mut self, n: usize) {
        self.pos += n;
    }

    fn make_token(&self, kind: TokenKind, start: usize, value: Option<TokenValue>) -> Token {
        let span = Span::new(start, self.pos);
        let (line, column) = self.file.line_col(start);
        Token {
            kind,
            lexeme: self.src.get(start..self.pos).unwrap_or("").to_string(),
            span,
            line,
            column,
            value,
        }
    }

    // ==================== trivia ====================

    /// Skip whitespace and comments. Block comments do not nest; an
    /// unterminated one is reported at its opening `/*`.
    fn skip_trivia(&mut self, diags: &mut DiagnosticEngine) {
        loop {
            match self.peek(0) {
                Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(0x0c) => self.bump(1),
                Some(b'/') if self.peek(1) == Some(b'/') => {
                    while let Some(c) = self.peek(0) {
                        if c == b'\n' {
                            break;
                        }
                        self.bump(1);
                    }
                }
                Some(b'/') if self.peek(1) == Some(b'*') => {
                    let open = self.pos;
                    self.bump(2);
                    let mut closed = false;
                    while self.pos < self.src.len() {
                        if self.peek(0) == Some(b'*') && self.peek(1) == Some(b'/') {
                            self.bump(2);
                            closed = true;
                            break;
                        }
                        self.bump(1);
                    }
                    if !closed {
                        diags.emit_error(
                            error_codes::UNTERMINATED_COMMENT,
                            "Unterminated multi-line comment".to_string(),
                            self.file.location(open),
                        );
                    }
                }
                _ => break,
            }
        }
    }

    // ==================== tokens ====================

    fn scan_token(&mut self, diags: &mut DiagnosticEngine) -> Result<Token, LexError> {
        let start = self.pos;
        let c = match self.peek(0) {
            Some(c) => c,
            None => return Ok(self.make_token(TokenKind::Eof, start, None)),
        };

        if c == b'_' || c.is_ascii_alphabetic() {
            return Ok(self.scan_identifier(diags));
        }
        if c.is_ascii_digit() || (c == b'.' && self.peek(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.scan_number();
        }
        if c == b'"' {
            return self.scan_string(diags);
        }
        self.scan_operator()
    }

    fn scan_identifier(&mut self, diags: &mut DiagnosticEngine) -> Token {
        let start = self.pos;
        while let Some(c) = self.peek(0) {
            if c == b'_' || c.is_ascii_alphanumeric() {
                self.bump(1);
            } else {
                break;
            }
        }
        let text = self.src.get(start..self.pos).unwrap_or("");

        if let Some(kind) = keyword_kind(text) {
            let value = match kind {
                TokenKind::True => Some(TokenValue::Bool(true)),
                TokenKind::False => Some(TokenValue::Bool(false)),
                _ => None,
            };
            return self.make_token(kind, start, value);
        }
        if is_reserved_keyword(text) {
            diags.emit_error(
                error_codes::RESERVED_KEYWORD,
                format!("'{}' is reserved for future use", text),
                self.file.location(start),
            );
            return self.make_token(TokenKind::Reserved, start, None);
        }
        self.make_token(TokenKind::Identifier, start, None)
    }

    fn scan_number(&mut self) -> Result<Token, LexError> {
        let start = self.pos;

        let radix: u32 = if self.peek(0) == Some(b'0') {
            match self.peek(1) {
                Some(b'x') | Some(b'X') => 16,
                Some(b'b') | Some(b'B') => 2,
                Some(b'o') | Some(b'O') => 8,
                _ => 10,
            }
        } else {
            10
        };

        if radix != 10 {
            return self.scan_radix_literal(start, radix);
        }

        let mut digits = String::new();
        let mut is_float = false;

        self.read_digits(&mut digits);

        // Fraction only when '.' is followed by a digit, so `0..n` still
        // lexes as int, range, ident. Covers leading-dot floats like `.5`.
        if self.peek(0) == Some(b'.') && self.peek(1).is_some_and(|d| d.is_ascii_digit()) {
            is_float = true;
            if digits.is_empty() {
                digits.push('0');
            }
            digits.push('.');
            self.bump(1);
            self.read_digits(&mut digits);
        }

        if matches!(self.peek(0), Some(b'e') | Some(b'E')) {
            let mut exp_probe = 1;
            if matches!(self.peek(1), Some(b'+') | Some(b'-')) {
                exp_probe = 2;
            }
            if self.peek(exp_probe).is_some_and(|d| d.is_ascii_digit()) {
                is_float = true;
                digits.push('e');
                self.bump(1);
                if matches!(self.peek(0), Some(b'+') | Some(b'-')) {
                    digits.push(self.peek(0).unwrap_or(b'+') as char);
                    self.bump(1);
                }
                self.read_digits(&mut digits);
            } else {
                // 'e' with no exponent digits: consume the marker so the
                // error span covers the whole malformed literal
                self.bump(exp_probe);
                let span = Span::new(start, self.pos);
                return Err(LexError::MalformedLiteral {
                    detail: "exponent has no digits".to_string(),
                    span,
                });
            }
        }

        let suffix_start = self.pos;
        while self
            .peek(0)
            .is_some_and(|c| c == b'_' || c.is_ascii_alphanumeric())
        {
            self.bump(1);
        }
        let suffix_text = self.src.get(suffix_start..self.pos).unwrap_or("");
        let suffix = if suffix_text.is_empty() {
            None
        } else {
            match NumSuffix::parse(suffix_text) {
                Some(s) => Some(s),
                None => {
                    return Err(LexError::MalformedLiteral {
                        detail: format!("invalid suffix '{}'", suffix_text),
                        span: Span::new(start, self.pos),
                    })
                }
            }
        };

        if is_float || suffix.is_some_and(NumSuffix::is_float) {
            if suffix.is_some() && !suffix.is_some_and(NumSuffix::is_float) {
                return Err(LexError::MalformedLiteral {
                    detail: format!("integer suffix '{}' on float literal", suffix_text),
                    span: Span::new(start, self.pos),
                });
            }
            let value: f64 = digits.parse().map_err(|_| LexError::MalformedLiteral {
                detail: "invalid float literal".to_string(),
                span: Span::new(start, self.pos),
            })?;
            Ok(self.make_token(
                TokenKind::FloatLiteral,
                start,
                Some(TokenValue::Float { value, suffix }),
            ))
        } else {
            let value =
                u128::from_str_radix(&digits, 10).map_err(|_| LexError::MalformedLiteral {
                    detail: "integer literal too large".to_string(),
                    span: Span::new(start, self.pos),
                })?;
            Ok(self.make_token(
                TokenKind::IntLiteral,
                start,
                Some(TokenValue::Int { value, suffix }),
            ))
        }
    }

    /// `0x` / `0b` / `0o` literals with separators and an optional integer
    /// suffix.
    fn scan_radix_literal(&mut self, start: usize, radix: u32) -> Result<Token, LexError> {
        self.bump(2); // prefix
        let body_start = self.pos;
        while self
            .peek(0)
            .is_some_and(|c| c == b'_' || c.is_ascii_alphanumeric())
        {
            self.bump(1);
        }
        let body: String = self
            .src
            .get(body_start..self.pos)
            .unwrap_or("")
            .chars()
            .filter(|&c| c != '_')
            .collect();

        // Split a trailing integer suffix off the digit body. Float
        // suffixes are never valid here; for hex, 'i'/'u' cannot be digits
        // so the split is unambiguous.
        let (digits, suffix) = split_int_suffix(&body);
        let span = Span::new(start, self.pos);

        if digits.is_empty() {
            return Err(LexError::MalformedLiteral {
                detail: "missing digits after base prefix".to_string(),
                span,
            });
        }
        let value = u128::from_str_radix(digits, radix).map_err(|_| LexError::MalformedLiteral {
            detail: format!("invalid digit for base {} literal", radix),
            span,
        })?;
        Ok(self.make_token(
            TokenKind::IntLiteral,
            start,
            Some(TokenValue::Int { value, suffix }),
        ))
    }

    fn read_digits(&mut self, out: &mut String) {
        while let Some(c) = self.peek(0) {
            if c.is_ascii_digit() {
                out.push(c as char);
                self.bump(1);
            } else if c == b'_' {
                self.bump(1);
            } else {
                break;
            }
        }
    }

    fn scan_string(&mut self, diags: &mut DiagnosticEngine) -> Result<Token, LexError> {
        let start = self.pos;
        self.bump(1); // opening quote
        let mut value = String::new();

        loop {
            match self.peek(0) {
                None | Some(b'\n') | Some(b'\r') => {
                    // leave the newline for trivia so scanning resumes on
                    // the next line
                    return Err(LexError::UnterminatedString {
                        span: Span::new(start, self.pos),
                    });
                }
                Some(b'"') => {
                    self.bump(1);
                    return Ok(self.make_token(
                        TokenKind::StringLiteral,
                        start,
                        Some(TokenValue::Str(value)),
                    ));
                }
                Some(b'\\') => {
                    self.bump(1);
                    self.scan_escape(&mut value, diags);
                }
                Some(_) => {
                    if let Some(c) = self.peek_char() {
                        value.push(c);
                        self.bump(c.len_utf8());
                    } else {
                        self.bump(1);
                    }
                }
            }
        }
    }

    fn scan_escape(&mut self, out: &mut String, diags: &mut DiagnosticEngine) {
        let esc_pos = self.pos.saturating_sub(1);
        match self.peek(0) {
            Some(b'n') => {
                out.push('\n');
                self.bump(1);
            }
            Some(b't') => {
                out.push('\t');
                self.bump(1);
            }
            Some(b'r') => {
                out.push('\r');
                self.bump(1);
            }
            Some(b'\\') => {
                out.push('\\');
                self.bump(1);
            }
            Some(b'"') => {
                out.push('"');
                self.bump(1);
            }
            Some(b'0') => {
                out.push('\0');
                self.bump(1);
            }
            Some(b'x') => {
                self.bump(1);
                let mut hex = String::new();
                for _ in 0..2 {
                    if let Some(c) = self.peek(0) {
                        if c.is_ascii_hexdigit() {
                            hex.push(c as char);
                            self.bump(1);
                            continue;
                        }
                    }
                    break;
                }
                match u8::from_str_radix(&hex, 16) {
                    Ok(b) if hex.len() == 2 => out.push(b as char),
                    _ => diags.emit_error(
                        error_codes::INVALID_ESCAPE,
                        "Invalid '\\x' escape: expected two hex digits".to_string(),
                        self.file.location(esc_pos),
                    ),
                }
            }
            Some(b'u') => {
                self.bump(1);
                if self.peek(0) == Some(b'{') {
                    self.bump(1);
                    let mut hex = String::new();
                    while let Some(c) = self.peek(0) {
                        if c.is_ascii_hexdigit() {
                            hex.push(c as char);
                            self.bump(1);
                        } else {
                            break;
                        }
                    }
                    let closed = self.peek(0) == Some(b'}');
                    if closed {
                        self.bump(1);
                    }
                    let decoded = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .filter(|_| closed && !hex.is_empty());
                    match decoded {
                        Some(c) => out.push(c),
                        None => diags.emit_error(
                            error_codes::INVALID_ESCAPE,
                            "Invalid '\\u{...}' escape".to_string(),
                            self.file.location(esc_pos),
                        ),
                    }
                } else {
                    diags.emit_error(
                        error_codes::INVALID_ESCAPE,
                        "Invalid '\\u' escape: expected '{'".to_string(),
                        self.file.location(esc_pos),
                    );
                }
            }
            Some(other) => {
                diags.emit_error(
                    error_codes::INVALID_ESCAPE,
                    format!("Invalid escape sequence '\\{}'", other as char),
                    self.file.location(esc_pos),
                );
                out.push(other as char);
                self.bump(1);
            }
            None => {}
        }
    }

    /// Longest-match operator/punctuation scan with up to three characters
    /// of lookahead.
    fn scan_operator(&mut self) -> Result<Token, LexError> {
        use TokenKind::*;
        let start = self.pos;
        let c0 = self.peek(0).unwrap_or(0);
        let c1 = self.peek(1);
        let c2 = self.peek(2);

        let (kind, len) = match c0 {
            b'<' => match (c1, c2) {
                (Some(b'<'), Some(b'=')) => (ShlEq, 3),
                (Some(b'<'), _) => (Shl, 2),
                (Some(b'='), _) => (LtEq, 2),
                _ => (Lt, 1),
            },
            b'>' => match (c1, c2) {
                (Some(b'>'), Some(b'=')) => (ShrEq, 3),
                (Some(b'>'), _) => (Shr, 2),
                (Some(b'='), _) => (GtEq, 2),
                _ => (Gt, 1),
            },
            b'.' => match (c1, c2) {
                (Some(b'.'), Some(b'=')) => (DotDotEq, 3),
                (Some(b'.'), _) => (DotDot, 2),
                (Some(b'*'), _) => (DotStar, 2),
                _ => (Dot, 1),
            },
            b'+' => match c1 {
                Some(b'+') => (PlusPlus, 2),
                Some(b'=') => (PlusEq, 2),
                _ => (Plus, 1),
            },
            b'-' => match c1 {
                Some(b'-') => (MinusMinus, 2),
                Some(b'=') => (MinusEq, 2),
                Some(b'>') => (Arrow, 2),
                _ => (Minus, 1),
            },
            b'*' => match c1 {
                Some(b'=') => (StarEq, 2),
                _ => (Star, 1),
            },
            b'/' => match c1 {
                Some(b'=') => (SlashEq, 2),
                _ => (Slash, 1),
            },
            b'%' => match c1 {
                Some(b'=') => (PercentEq, 2),
                _ => (Percent, 1),
            },
            b'=' => match c1 {
                Some(b'=') => (EqEq, 2),
                Some(b'>') => (FatArrow, 2),
                _ => (Eq, 1),
            },
            b'!' => match c1 {
                Some(b'=') => (NotEq, 2),
                _ => (Bang, 1),
            },
            b'&' => match c1 {
                Some(b'&') => (AmpAmp, 2),
                Some(b'=') => (AmpEq, 2),
                _ => (Amp, 1),
            },
            b'|' => match c1 {
                Some(b'|') => (PipePipe, 2),
                Some(b'=') => (PipeEq, 2),
                _ => (Pipe, 1),
            },
            b'^' => match c1 {
                Some(b'=') => (CaretEq, 2),
                _ => (Caret, 1),
            },
            b'~' => (Tilde, 1),
            b'(' => (LParen, 1),
            b')' => (RParen, 1),
            b'{' => (LBrace, 1),
            b'}' => (RBrace, 1),
            b'[' => (LBracket, 1),
            b']' => (RBracket, 1),
            b',' => (Comma, 1),
            b';' => (Semicolon, 1),
            b':' => (Colon, 1),
            _ => {
                let ch = self.peek_char().unwrap_or('\u{fffd}');
                self.bump(ch.len_utf8());
                return Err(LexError::UnexpectedCharacter {
                    ch,
                    span: Span::new(start, self.pos),
                });
            }
        };

        self.bump(len);
        Ok(self.make_token(kind, start, None))
    }
}

/// Split a trailing integer type-suffix off a radix-literal body.
/// 'i'/'u' are never digits in any accepted radix, so the split is exact.
fn split_int_suffix(body: &str) -> (&str, Option<NumSuffix>) {
    const SUFFIXES: [&str; 10] = [
        "isize", "usize", "i16", "i32", "i64", "u16", "u32", "u64", "i8", "u8",
    ];
    for suffix in SUFFIXES {
        if let Some(digits) = body.strip_suffix(suffix) {
            return (digits, NumSuffix::parse(suffix));
        }
    }
    (body, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (Vec<Token>, DiagnosticEngine) {
        let file = SourceFile::new("test.kei", source);
        let mut diags = DiagnosticEngine::new();
        let tokens = tokenize(&file, &mut diags);
        (tokens, diags)
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let (tokens, diags) = lex("fn let mut move my_var _private count9");
        assert!(!diags.has_errors());
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Fn,
                TokenKind::Let,
                TokenKind::Mut,
                TokenKind::Move,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
        assert_eq!(tokens[4].lexeme, "my_var");
    }

    #[test]
    fn test_comment_line_tracking() {
        let source = "// Line 1 comment\nlet x = 42; // Line 2 comment\n/* Multi-line\n   comment */\nlet y = 24;";
        let (tokens, diags) = lex(source);
        assert_eq!(diags.len(), 0);
        assert_eq!(tokens[0].kind, TokenKind::Let);
        assert_eq!((tokens[0].line, tokens[0].column), (2, 1));
        let second_let = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Let)
            .nth(1)
            .unwrap();
        assert_eq!((second_let.line, second_let.column), (5, 1));
    }

    #[test]
    fn test_unterminated_block_comment() {
        let (tokens, diags) = lex("/* oops\nlet x = 1;");
        assert_eq!(diags.len(), 1);
        assert!(diags.diagnostics()[0]
            .message
            .contains("Unterminated multi-line comment"));
        // comment swallows the rest of the file
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
        // diagnostic points at the opening /*
        assert_eq!(diags.diagnostics()[0].location.line, 1);
        assert_eq!(diags.diagnostics()[0].location.column, 1);
    }

    #[test]
    fn test_int_literals() {
        let (tokens, diags) = lex("42 1_000_000 0xFF 0b1010 0o777 42u8 0xFFu16");
        assert!(!diags.has_errors());
        let values: Vec<u128> = tokens
            .iter()
            .filter_map(|t| match &t.value {
                Some(TokenValue::Int { value, .. }) => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![42, 1_000_000, 255, 10, 511, 42, 255]);
        assert_eq!(
            tokens[5].value,
            Some(TokenValue::Int {
                value: 42,
                suffix: Some(NumSuffix::U8)
            })
        );
        assert_eq!(
            tokens[6].value,
            Some(TokenValue::Int {
                value: 255,
                suffix: Some(NumSuffix::U16)
            })
        );
    }

    #[test]
    fn test_float_literals() {
        let (tokens, diags) = lex("3.14 1.5e10 2.0E-5 .5 1f32");
        assert!(!diags.has_errors());
        let values: Vec<f64> = tokens
            .iter()
            .filter_map(|t| match &t.value {
                Some(TokenValue::Float { value, .. }) => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![3.14, 1.5e10, 2.0e-5, 0.5, 1.0]);
    }

    #[test]
    fn test_range_does_not_eat_dot() {
        let (tokens, _) = lex("0..n");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::IntLiteral,
                TokenKind::DotDot,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_malformed_literals() {
        let (tokens, diags) = lex("0x 1e 42q8");
        assert_eq!(diags.error_count(), 3);
        assert_eq!(
            tokens.iter().filter(|t| t.kind == TokenKind::Error).count(),
            3
        );
    }

    #[test]
    fn test_string_literals_and_escapes() {
        let (tokens, diags) = lex(r#""hello" "a\tb\n" "\x41" "\u{1F600}""#);
        assert!(!diags.has_errors());
        let strings: Vec<&str> = tokens
            .iter()
            .filter_map(|t| match &t.value {
                Some(TokenValue::Str(s)) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(strings, vec!["hello", "a\tb\n", "A", "😀"]);
    }

    #[test]
    fn test_unterminated_string_resumes_next_line() {
        let (tokens, diags) = lex("let s = \"oops\nlet x = 1;");
        assert_eq!(diags.error_count(), 1);
        assert!(diags.diagnostics()[0].message.contains("Unterminated string"));
        // scanning resumed: the second let is present
        let lets = tokens.iter().filter(|t| t.kind == TokenKind::Let).count();
        assert_eq!(lets, 2);
    }

    #[test]
    fn test_operators_longest_match() {
        let (tokens, _) = lex("<<= ..= -> => .* ++ -- << <= < == =");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::ShlEq,
                TokenKind::DotDotEq,
                TokenKind::Arrow,
                TokenKind::FatArrow,
                TokenKind::DotStar,
                TokenKind::PlusPlus,
                TokenKind::MinusMinus,
                TokenKind::Shl,
                TokenKind::LtEq,
                TokenKind::Lt,
                TokenKind::EqEq,
                TokenKind::Eq,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_reserved_keyword() {
        let (tokens, diags) = lex("let match = 1;");
        assert_eq!(diags.error_count(), 1);
        assert!(diags.diagnostics()[0]
            .message
            .contains("'match' is reserved for future use"));
        assert_eq!(tokens[1].kind, TokenKind::Reserved);
        assert_eq!(tokens[1].lexeme, "match");
    }

    #[test]
    fn test_unexpected_character() {
        let (tokens, diags) = lex("let x = @;");
        assert_eq!(diags.error_count(), 1);
        assert!(diags.diagnostics()[0].message.contains("Unexpected character"));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Error));
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_bool_values_preparsed() {
        let (tokens, _) = lex("true false");
        assert_eq!(tokens[0].value, Some(TokenValue::Bool(true)));
        assert_eq!(tokens[1].value, Some(TokenValue::Bool(false)));
    }

    #[test]
    fn test_token_line_col_matches_source_map() {
        let source = "let a = 1;\n  let b = 2;\r\nlet c = 3;";
        let file = SourceFile::new("test.kei", source);
        let mut diags = DiagnosticEngine::new();
        let tokens = tokenize(&file, &mut diags);
        for token in &tokens {
            let (line, col) = file.line_col(token.span.start);
            assert_eq!((token.line, token.column), (line, col), "{:?}", token);
        }
    }

    #[test]
    fn test_spans_cover_source() {
        let source = "fn main() -> i32 { return 40 + 2; } // done";
        let file = SourceFile::new("test.kei", source);
        let mut diags = DiagnosticEngine::new();
        let tokens = tokenize(&file, &mut diags);
        // spans are ordered, non-overlapping, and inside the buffer
        let mut prev_end = 0;
        for token in &tokens {
            assert!(token.span.start >= prev_end);
            assert!(token.span.end <= source.len());
            prev_end = token.span.end;
            // every gap is whitespace or comment text
        }
        assert_eq!(tokens.last().unwrap().span, Span::new(source.len(), source.len()));
    }
}
