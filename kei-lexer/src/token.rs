//! Token model for the Kei language.

use kei_diagnostics::Span;
use serde::{Deserialize, Serialize};

/// Token kinds for the Kei programming language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    Identifier,

    // Keywords
    Fn,
    Let,
    Const,
    Mut,
    Move,
    Pub,
    Static,
    Extern,
    Struct,
    Unsafe,
    Enum,
    Type,
    Import,
    From,
    In,
    If,
    Else,
    While,
    For,
    Switch,
    Case,
    Default,
    Defer,
    Break,
    Continue,
    Return,
    Assert,
    Require,
    Throw,
    Throws,
    Catch,
    Panic,
    As,
    SelfKw,
    True,
    False,
    Null,

    // Primitive and collection type keywords
    Int,
    Uint,
    Bool,
    String,
    Void,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Isize,
    Usize,
    Byte,
    Short,
    Long,
    Float,
    Double,
    Ptr,
    Array,
    Slice,
    Dynarray,

    /// Any keyword reserved for future use (`async`, `match`, `trait`, ...).
    /// Produced with a diagnostic so the parser still sees a token.
    Reserved,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    ShlEq,
    ShrEq,
    Eq,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Shl,
    Shr,
    AmpAmp,
    PipePipe,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    DotDot,
    DotDotEq,
    DotStar,
    Dot,
    Arrow,
    FatArrow,
    PlusPlus,
    MinusMinus,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,

    /// Lexically malformed input. The scanner never aborts; it produces an
    /// `Error` token plus a diagnostic and keeps going.
    Error,
    Eof,
}

impl TokenKind {
    pub fn is_type_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::Int
                | TokenKind::Uint
                | TokenKind::Bool
                | TokenKind::String
                | TokenKind::Void
                | TokenKind::I8
                | TokenKind::I16
                | TokenKind::I32
                | TokenKind::I64
                | TokenKind::U8
                | TokenKind::U16
                | TokenKind::U32
                | TokenKind::U64
                | TokenKind::F32
                | TokenKind::F64
                | TokenKind::Isize
                | TokenKind::Usize
                | TokenKind::Byte
                | TokenKind::Short
                | TokenKind::Long
                | TokenKind::Float
                | TokenKind::Double
                | TokenKind::Ptr
                | TokenKind::Array
                | TokenKind::Slice
                | TokenKind::Dynarray
        )
    }
}

/// Numeric literal type suffix (`42u8`, `1.5f32`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumSuffix {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Isize,
    Usize,
    F32,
    F64,
}

impl NumSuffix {
    pub fn parse(s: &str) -> Option<NumSuffix> {
        Some(match s {
            "i8" => NumSuffix::I8,
            "i16" => NumSuffix::I16,
            "i32" => NumSuffix::I32,
            "i64" => NumSuffix::I64,
            "u8" => NumSuffix::U8,
            "u16" => NumSuffix::U16,
            "u32" => NumSuffix::U32,
            "u64" => NumSuffix::U64,
            "isize" => NumSuffix::Isize,
            "usize" => NumSuffix::Usize,
            "f32" => NumSuffix::F32,
            "f64" => NumSuffix::F64,
            _ => return None,
        })
    }

    pub fn is_float(self) -> bool {
        matches!(self, NumSuffix::F32 | NumSuffix::F64)
    }
}

/// Pre-parsed literal payload carried on the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenValue {
    Int {
        value: u128,
        suffix: Option<NumSuffix>,
    },
    Float {
        value: f64,
        suffix: Option<NumSuffix>,
    },
    Str(String),
    Bool(bool),
}

/// A single token with its source span and 1-based line/column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
    pub line: u32,
    pub column: u32,
    pub value: Option<TokenValue>,
}

/// Look up an identifier in the active-keyword table.
pub fn keyword_kind(ident: &str) -> Option<TokenKind> {
    Some(match ident {
        "fn" => TokenKind::Fn,
        "let" => TokenKind::Let,
        "const" => TokenKind::Const,
        "mut" => TokenKind::Mut,
        "move" => TokenKind::Move,
        "pub" => TokenKind::Pub,
        "static" => TokenKind::Static,
        "extern" => TokenKind::Extern,
        "struct" => TokenKind::Struct,
        "unsafe" => TokenKind::Unsafe,
        "enum" => TokenKind::Enum,
        "type" => TokenKind::Type,
        "import" => TokenKind::Import,
        "from" => TokenKind::From,
        "in" => TokenKind::In,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "defer" => TokenKind::Defer,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "return" => TokenKind::Return,
        "assert" => TokenKind::Assert,
        "require" => TokenKind::Require,
        "throw" => TokenKind::Throw,
        "throws" => TokenKind::Throws,
        "catch" => TokenKind::Catch,
        "panic" => TokenKind::Panic,
        "as" => TokenKind::As,
        "self" => TokenKind::SelfKw,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "int" => TokenKind::Int,
        "uint" => TokenKind::Uint,
        "bool" => TokenKind::Bool,
        "string" => TokenKind::String,
        "void" => TokenKind::Void,
        "i8" => TokenKind::I8,
        "i16" => TokenKind::I16,
        "i32" => TokenKind::I32,
        "i64" => TokenKind::I64,
        "u8" => TokenKind::U8,
        "u16" => TokenKind::U16,
        "u32" => TokenKind::U32,
        "u64" => TokenKind::U64,
        "f32" => TokenKind::F32,
        "f64" => TokenKind::F64,
        "isize" => TokenKind::Isize,
        "usize" => TokenKind::Usize,
        "byte" => TokenKind::Byte,
        "short" => TokenKind::Short,
        "long" => TokenKind::Long,
        "float" => TokenKind::Float,
        "double" => TokenKind::Double,
        "ptr" => TokenKind::Ptr,
        "array" => TokenKind::Array,
        "slice" => TokenKind::Slice,
        "dynarray" => TokenKind::Dynarray,
        _ => return None,
    })
}

/// Keywords rejected with a diagnostic but still tokenized, so the parser
/// can recover around them.
pub fn is_reserved_keyword(ident: &str) -> bool {
    matches!(
        ident,
        "async"
            | "await"
            | "closure"
            | "generic"
            | "impl"
            | "interface"
            | "macro"
            | "match"
            | "override"
            | "private"
            | "protected"
            | "ref"
            | "shared"
            | "super"
            | "trait"
            | "virtual"
            | "where"
            | "yield"
    )
}
