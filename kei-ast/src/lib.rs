//! Abstract syntax tree for the Kei language.
//!
//! The parser produces this tree once; later passes never mutate it.
//! Every node carries a byte [`Span`]. Expressions additionally carry a
//! [`NodeId`] so the checker can attach side-tables (expression types,
//! generic resolutions) keyed by integer id instead of object identity.

use kei_diagnostics::Span;
use serde::{Deserialize, Serialize};

/// Integer identity of an expression node, unique within one `Program`.
pub type NodeId = u32;

/// Root of the AST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub decls: Vec<Decl>,
}

/// Top-level declarations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    Function(Function),
    ExternFunction(ExternFunction),
    Struct(StructDecl),
    Enum(EnumDecl),
    TypeAlias(TypeAlias),
    Import(Import),
    Static(StaticDecl),
}

impl Decl {
    pub fn span(&self) -> Span {
        match self {
            Decl::Function(d) => d.span,
            Decl::ExternFunction(d) => d.span,
            Decl::Struct(d) => d.span,
            Decl::Enum(d) => d.span,
            Decl::TypeAlias(d) => d.span,
            Decl::Import(d) => d.span,
            Decl::Static(d) => d.span,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Decl::Function(d) => Some(&d.name),
            Decl::ExternFunction(d) => Some(&d.name),
            Decl::Struct(d) => Some(&d.name),
            Decl::Enum(d) => Some(&d.name),
            Decl::TypeAlias(d) => Some(&d.name),
            Decl::Import(_) => None,
            Decl::Static(d) => Some(&d.name),
        }
    }
}

/// Function definition (free function or struct method)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub is_pub: bool,
    pub name: String,
    pub generic_params: Vec<String>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub throws: Vec<TypeExpr>,
    pub body: Block,
    pub span: Span,
}

/// Function parameter with the `mut` / `move` modifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub is_mut: bool,
    pub is_move: bool,
    pub span: Span,
}

/// `extern fn name(params) -> Ret;` — body provided by the linker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternFunction {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub span: Span,
}

/// `struct` / `unsafe struct` with inline methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub is_pub: bool,
    pub is_unsafe: bool,
    pub name: String,
    pub generic_params: Vec<String>,
    pub fields: Vec<Field>,
    pub methods: Vec<Function>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

/// Sum-typed enum with optional integer base type and data variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub is_pub: bool,
    pub name: String,
    pub base_type: Option<TypeExpr>,
    pub variants: Vec<EnumVariant>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumVariant {
    pub name: String,
    pub fields: Vec<TypeExpr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAlias {
    pub is_pub: bool,
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

/// `import { a, b } from path.seg;` or `import path.seg;`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    /// Named imports; empty for whole-module imports.
    pub names: Vec<String>,
    pub path: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticDecl {
    pub is_pub: bool,
    pub name: String,
    pub ty: TypeExpr,
    pub value: Expr,
    pub span: Span,
}

/// Syntactic type reference. `array<T, 16>` carries the length as a
/// `Named` argument whose name is the integer lexeme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExprKind {
    Named(String),
    Generic { name: String, args: Vec<TypeExpr> },
}

impl TypeExpr {
    pub fn name(&self) -> &str {
        match &self.kind {
            TypeExprKind::Named(name) => name,
            TypeExprKind::Generic { name, .. } => name,
        }
    }
}

/// Brace-enclosed statement list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Block(Block),
    Let {
        name: String,
        is_mut: bool,
        ty: Option<TypeExpr>,
        value: Expr,
    },
    Const {
        name: String,
        ty: Option<TypeExpr>,
        value: Expr,
    },
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_block: Block,
        /// `else` block or a nested `If` statement for `else if` chains.
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    For {
        var: String,
        iter: Expr,
        body: Block,
    },
    Switch {
        scrutinee: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Block>,
    },
    Defer(Box<Stmt>),
    Break,
    Continue,
    /// Expression statement. The span excludes any terminating semicolon;
    /// `semi` records whether one was present (a bare trailing expression
    /// in an expression block is the block's value).
    Expr {
        expr: Expr,
        semi: bool,
    },
    Assert {
        cond: Expr,
        message: Option<Expr>,
    },
    Require {
        cond: Expr,
        message: Option<Expr>,
    },
    Unsafe(Block),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub pattern: CasePattern,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CasePattern {
    /// `case Variant:` / `case Variant(a, b):`
    Variant { name: String, bindings: Vec<String> },
    /// `case 3:` on integer scrutinees
    Literal(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    IntLiteral {
        value: u128,
        suffix: Option<String>,
    },
    FloatLiteral {
        value: f64,
        suffix: Option<String>,
    },
    StringLiteral(String),
    BoolLiteral(bool),
    NullLiteral,
    Identifier(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `=` and compound assignments; `op` is the compound operator if any.
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        type_args: Vec<TypeExpr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        field: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    /// Postfix `.*` raw-pointer dereference
    Deref(Box<Expr>),
    StructLiteral {
        name: String,
        type_args: Vec<TypeExpr>,
        fields: Vec<(String, Expr)>,
    },
    /// `if cond { … } else { … }` in expression position; blocks are
    /// expression blocks whose trailing bare expression is the value.
    If {
        cond: Box<Expr>,
        then_block: Block,
        else_block: Option<Block>,
    },
    Move(Box<Expr>),
    Throw(Box<Expr>),
    Catch {
        operand: Box<Expr>,
        handler: CatchHandler,
    },
    Group(Box<Expr>),
    /// Postfix `++`
    Increment(Box<Expr>),
    /// Postfix `--`
    Decrement(Box<Expr>),
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
    },
    /// `unsafe { … }` in expression position
    Unsafe(Block),
    Cast {
        expr: Box<Expr>,
        ty: TypeExpr,
    },
    ArrayLiteral(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CatchHandler {
    /// `expr catch panic`
    Panic,
    /// `expr catch throw` — re-raise into the enclosing throws contract
    Rethrow,
    /// `expr catch { Err e: …  default e: … }`
    Block { arms: Vec<CatchArm> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchArm {
    /// `None` marks the `default` clause.
    pub error_type: Option<String>,
    pub binding: String,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    LtEq,
    Gt,
    GtEq,
    EqEq,
    NotEq,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
                | BinaryOp::EqEq
                | BinaryOp::NotEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::EqEq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `~`
    BitNot,
    /// unary `-`
    Neg,
    /// `&`
    AddrOf,
}

impl Expr {
    /// The identifier named by this expression, looking through groups.
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            ExprKind::Group(inner) => inner.as_identifier(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_roundtrip() {
        let expr = Expr {
            id: 7,
            span: Span::new(0, 5),
            kind: ExprKind::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(Expr {
                    id: 5,
                    span: Span::new(0, 1),
                    kind: ExprKind::IntLiteral {
                        value: 1,
                        suffix: None,
                    },
                }),
                rhs: Box::new(Expr {
                    id: 6,
                    span: Span::new(4, 5),
                    kind: ExprKind::Identifier("x".to_string()),
                }),
            },
        };
        let json = serde_json::to_string(&expr).unwrap();
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(expr, back);
    }

    #[test]
    fn test_as_identifier_through_group() {
        let ident = Expr {
            id: 1,
            span: Span::new(1, 2),
            kind: ExprKind::Identifier("a".to_string()),
        };
        let grouped = Expr {
            id: 2,
            span: Span::new(0, 3),
            kind: ExprKind::Group(Box::new(ident)),
        };
        assert_eq!(grouped.as_identifier(), Some("a"));
    }
}
