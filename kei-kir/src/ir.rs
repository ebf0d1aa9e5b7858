//! KIR: basic-block SSA intermediate representation.
//!
//! SSA identifiers are strings of the form `%<n>` (and `%<n>.<variant>`
//! for derived values); globals are `@name`. Every block carries its phi
//! nodes at the top, a sequence of instructions, and exactly one
//! terminator. Local variables are materialized with `stack_alloc` plus
//! `load`/`store`; promotion into registers is the C compiler's job.

use kei_checker::types::Type;
use std::collections::{HashMap, HashSet};
use std::fmt;

pub type ValueId = String;
pub type BlockId = u32;

#[derive(Debug, Clone)]
pub struct KirModule {
    pub name: String,
    pub globals: Vec<KirGlobal>,
    pub functions: Vec<KirFunction>,
    pub types: Vec<KirTypeDef>,
    pub externs: Vec<KirExtern>,
}

#[derive(Debug, Clone)]
pub struct KirGlobal {
    pub name: String,
    pub ty: Type,
    pub init: Const,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(i128),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
}

#[derive(Debug, Clone)]
pub struct KirExtern {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
}

#[derive(Debug, Clone)]
pub enum KirTypeDef {
    Struct {
        name: String,
        fields: Vec<(String, Type)>,
        has_destroy: bool,
        has_oncopy: bool,
    },
    Enum {
        name: String,
        base: Type,
        variants: Vec<(String, Vec<Type>)>,
    },
}

#[derive(Debug, Clone)]
pub struct KirFunction {
    pub name: String,
    /// Parameter names and types; parameter values are `%0..%n-1`.
    pub params: Vec<(String, Type)>,
    pub return_type: Type,
    /// Non-empty marks a throws-protocol function: the last two params
    /// are the success out-pointer and the error out-pointer, and the
    /// returned i32 is the variant tag (0 = success).
    pub throws_types: Vec<Type>,
    pub local_count: u32,
    pub blocks: Vec<KirBlock>,
}

#[derive(Debug, Clone)]
pub struct KirBlock {
    pub id: BlockId,
    pub label: String,
    pub phis: Vec<Phi>,
    pub insts: Vec<Inst>,
    pub term: Terminator,
}

#[derive(Debug, Clone)]
pub struct Phi {
    pub dest: ValueId,
    pub ty: Type,
    pub incoming: Vec<(ValueId, BlockId)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Mod => "mod",
            BinOp::Eq => "eq",
            BinOp::Neq => "neq",
            BinOp::Lt => "lt",
            BinOp::Gt => "gt",
            BinOp::Lte => "lte",
            BinOp::Gte => "gte",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::BitAnd => "bit_and",
            BinOp::BitOr => "bit_or",
            BinOp::BitXor => "bit_xor",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub enum Inst {
    // memory
    StackAlloc {
        dest: ValueId,
        ty: Type,
    },
    Load {
        dest: ValueId,
        ptr: ValueId,
        ty: Type,
    },
    Store {
        ptr: ValueId,
        value: ValueId,
        ty: Type,
    },
    FieldPtr {
        dest: ValueId,
        base: ValueId,
        struct_name: String,
        field: String,
        index: usize,
    },
    IndexPtr {
        dest: ValueId,
        base: ValueId,
        index: ValueId,
        elem_ty: Type,
    },

    // arithmetic / comparison
    BinOp {
        dest: ValueId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        ty: Type,
    },
    Neg {
        dest: ValueId,
        operand: ValueId,
        ty: Type,
    },
    Not {
        dest: ValueId,
        operand: ValueId,
    },
    BitNot {
        dest: ValueId,
        operand: ValueId,
        ty: Type,
    },

    // constants
    ConstInt {
        dest: ValueId,
        value: i128,
        ty: Type,
    },
    ConstFloat {
        dest: ValueId,
        value: f64,
        ty: Type,
    },
    ConstBool {
        dest: ValueId,
        value: bool,
    },
    ConstString {
        dest: ValueId,
        value: String,
    },
    ConstNull {
        dest: ValueId,
        ty: Type,
    },

    // calls
    Call {
        dest: ValueId,
        func: String,
        args: Vec<ValueId>,
    },
    CallVoid {
        func: String,
        args: Vec<ValueId>,
    },
    CallExtern {
        dest: ValueId,
        func: String,
        args: Vec<ValueId>,
    },
    CallExternVoid {
        func: String,
        args: Vec<ValueId>,
    },
    /// Throws-protocol invocation: `dest` receives the i32 tag; `out`
    /// and `err` are caller-allocated result buffers. The `err` slot is
    /// typed void — the emitter sizes the union from the callee's
    /// throws list.
    CallThrows {
        dest: ValueId,
        func: String,
        args: Vec<ValueId>,
        out: ValueId,
        err: ValueId,
    },

    // type operations
    Cast {
        dest: ValueId,
        value: ValueId,
        from: Type,
        to: Type,
    },
    SizeOf {
        dest: ValueId,
        ty: Type,
    },

    // lifecycle
    Destroy {
        value: ValueId,
        ty: Type,
    },
    Oncopy {
        dest: ValueId,
        value: ValueId,
        ty: Type,
    },
    Move {
        dest: ValueId,
        value: ValueId,
        ty: Type,
    },

    // debug checks
    BoundsCheck {
        index: ValueId,
        len: ValueId,
    },
    OverflowCheck {
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        ty: Type,
    },
    NullCheck {
        ptr: ValueId,
    },
    AssertCheck {
        cond: ValueId,
        message: String,
    },
    RequireCheck {
        cond: ValueId,
        message: String,
    },
}

impl Inst {
    /// SSA destination defined by this instruction, if any.
    pub fn dest(&self) -> Option<&str> {
        match self {
            Inst::StackAlloc { dest, .. }
            | Inst::Load { dest, .. }
            | Inst::FieldPtr { dest, .. }
            | Inst::IndexPtr { dest, .. }
            | Inst::BinOp { dest, .. }
            | Inst::Neg { dest, .. }
            | Inst::Not { dest, .. }
            | Inst::BitNot { dest, .. }
            | Inst::ConstInt { dest, .. }
            | Inst::ConstFloat { dest, .. }
            | Inst::ConstBool { dest, .. }
            | Inst::ConstString { dest, .. }
            | Inst::ConstNull { dest, .. }
            | Inst::Call { dest, .. }
            | Inst::CallExtern { dest, .. }
            | Inst::CallThrows { dest, .. }
            | Inst::Cast { dest, .. }
            | Inst::SizeOf { dest, .. }
            | Inst::Oncopy { dest, .. }
            | Inst::Move { dest, .. } => Some(dest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Terminator {
    Ret { value: ValueId },
    RetVoid,
    Jump { target: BlockId },
    Br {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Switch {
        value: ValueId,
        cases: Vec<(i128, BlockId)>,
        default: BlockId,
    },
    Unreachable,
}

impl Terminator {
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            Terminator::Jump { target } => vec![*target],
            Terminator::Br {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Switch { cases, default, .. } => {
                let mut targets: Vec<BlockId> = cases.iter().map(|(_, b)| *b).collect();
                targets.push(*default);
                targets
            }
            _ => Vec::new(),
        }
    }
}

// ==================== structural validation ====================

/// Check the SSA and CFG invariants tests rely on: unique definitions,
/// phi incoming lists matching predecessors, and resolvable targets.
pub fn validate_function(func: &KirFunction) -> Result<(), String> {
    let block_ids: HashSet<BlockId> = func.blocks.iter().map(|b| b.id).collect();
    if block_ids.len() != func.blocks.len() {
        return Err(format!("{}: duplicate block ids", func.name));
    }

    let mut defined: HashSet<String> = HashSet::new();
    for i in 0..func.params.len() {
        // parameter values are pre-defined
        defined.insert(format!("%{}", i));
    }

    let mut predecessors: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
    for block in &func.blocks {
        for target in block.term.targets() {
            if !block_ids.contains(&target) {
                return Err(format!(
                    "{}: block b{} jumps to unknown block b{}",
                    func.name, block.id, target
                ));
            }
            predecessors.entry(target).or_default().insert(block.id);
        }
    }

    for block in &func.blocks {
        for phi in &block.phis {
            if !defined.insert(phi.dest.clone()) {
                return Err(format!(
                    "{}: value {} defined more than once",
                    func.name, phi.dest
                ));
            }
            let preds = predecessors.get(&block.id).cloned().unwrap_or_default();
            let incoming: HashSet<BlockId> = phi.incoming.iter().map(|(_, b)| *b).collect();
            if incoming != preds {
                return Err(format!(
                    "{}: phi {} in b{} covers {:?}, predecessors are {:?}",
                    func.name, phi.dest, block.id, incoming, preds
                ));
            }
        }
        for inst in &block.insts {
            if let Some(dest) = inst.dest() {
                if !defined.insert(dest.to_string()) {
                    return Err(format!(
                        "{}: value {} defined more than once",
                        func.name, dest
                    ));
                }
            }
        }
    }

    Ok(())
}

// ==================== textual dump ====================

impl fmt::Display for KirModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for def in &self.types {
            match def {
                KirTypeDef::Struct {
                    name,
                    fields,
                    has_destroy,
                    has_oncopy,
                } => {
                    let fields: Vec<String> = fields
                        .iter()
                        .map(|(field, ty)| format!("{}: {}", field, ty))
                        .collect();
                    let mut hooks = String::new();
                    if *has_destroy {
                        hooks.push_str(" destroy");
                    }
                    if *has_oncopy {
                        hooks.push_str(" oncopy");
                    }
                    writeln!(f, "type {} = struct {{ {} }}{}", name, fields.join("; "), hooks)?;
                }
                KirTypeDef::Enum {
                    name,
                    base,
                    variants,
                } => {
                    let variants: Vec<String> = variants
                        .iter()
                        .map(|(variant, fields)| {
                            if fields.is_empty() {
                                variant.clone()
                            } else {
                                let fields: Vec<String> =
                                    fields.iter().map(|t| t.to_string()).collect();
                                format!("{}({})", variant, fields.join(", "))
                            }
                        })
                        .collect();
                    writeln!(f, "type {} = enum {} {{ {} }}", name, base, variants.join(", "))?;
                }
            }
        }
        for ext in &self.externs {
            let params: Vec<String> = ext.params.iter().map(|t| t.to_string()).collect();
            writeln!(f, "extern @{}({}) -> {}", ext.name, params.join(", "), ext.ret)?;
        }
        for global in &self.globals {
            writeln!(f, "global @{}: {} = {:?}", global.name, global.ty, global.init)?;
        }
        for func in &self.functions {
            writeln!(f, "{}", func)?;
        }
        Ok(())
    }
}

impl fmt::Display for KirFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .enumerate()
            .map(|(i, (name, ty))| format!("%{} /*{}*/: {}", i, name, ty))
            .collect();
        write!(f, "fn @{}({}) -> {}", self.name, params.join(", "), self.return_type)?;
        if !self.throws_types.is_empty() {
            let throws: Vec<String> = self.throws_types.iter().map(|t| t.to_string()).collect();
            write!(f, " throws [{}]", throws.join(", "))?;
        }
        writeln!(f, " {{")?;
        for block in &self.blocks {
            writeln!(f, "{}", block)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for KirBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "b{}: ; {}", self.id, self.label)?;
        for phi in &self.phis {
            let incoming: Vec<String> = phi
                .incoming
                .iter()
                .map(|(v, b)| format!("[{}, b{}]", v, b))
                .collect();
            writeln!(f, "  {} = phi {} {}", phi.dest, phi.ty, incoming.join(", "))?;
        }
        for inst in &self.insts {
            writeln!(f, "  {}", inst)?;
        }
        write!(f, "  {}", self.term)
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::StackAlloc { dest, ty } => write!(f, "{} = stack_alloc {}", dest, ty),
            Inst::Load { dest, ptr, ty } => write!(f, "{} = load {} {}", dest, ty, ptr),
            Inst::Store { ptr, value, ty } => write!(f, "store {} {}, {}", ty, value, ptr),
            Inst::FieldPtr {
                dest,
                base,
                struct_name,
                field,
                index,
            } => write!(
                f,
                "{} = field_ptr {} {}.{} #{}",
                dest, base, struct_name, field, index
            ),
            Inst::IndexPtr {
                dest,
                base,
                index,
                elem_ty,
            } => write!(f, "{} = index_ptr {} {}[{}]", dest, elem_ty, base, index),
            Inst::BinOp {
                dest,
                op,
                lhs,
                rhs,
                ty,
            } => write!(f, "{} = bin_op {} {} {}, {}", dest, op, ty, lhs, rhs),
            Inst::Neg { dest, operand, ty } => write!(f, "{} = neg {} {}", dest, ty, operand),
            Inst::Not { dest, operand } => write!(f, "{} = not {}", dest, operand),
            Inst::BitNot { dest, operand, ty } => {
                write!(f, "{} = bit_not {} {}", dest, ty, operand)
            }
            Inst::ConstInt { dest, value, ty } => {
                write!(f, "{} = const_int {} {}", dest, ty, value)
            }
            Inst::ConstFloat { dest, value, ty } => {
                write!(f, "{} = const_float {} {}", dest, ty, value)
            }
            Inst::ConstBool { dest, value } => write!(f, "{} = const_bool {}", dest, value),
            Inst::ConstString { dest, value } => {
                write!(f, "{} = const_string {:?}", dest, value)
            }
            Inst::ConstNull { dest, ty } => write!(f, "{} = const_null {}", dest, ty),
            Inst::Call { dest, func, args } => {
                write!(f, "{} = call @{}({})", dest, func, args.join(", "))
            }
            Inst::CallVoid { func, args } => {
                write!(f, "call_void @{}({})", func, args.join(", "))
            }
            Inst::CallExtern { dest, func, args } => {
                write!(f, "{} = call_extern @{}({})", dest, func, args.join(", "))
            }
            Inst::CallExternVoid { func, args } => {
                write!(f, "call_extern_void @{}({})", func, args.join(", "))
            }
            Inst::CallThrows {
                dest,
                func,
                args,
                out,
                err,
            } => write!(
                f,
                "{} = call_throws @{}({}) out {} err {}",
                dest,
                func,
                args.join(", "),
                out,
                err
            ),
            Inst::Cast {
                dest,
                value,
                from,
                to,
            } => write!(f, "{} = cast {} {} to {}", dest, from, value, to),
            Inst::SizeOf { dest, ty } => write!(f, "{} = sizeof {}", dest, ty),
            Inst::Destroy { value, ty } => write!(f, "destroy {} {}", ty, value),
            Inst::Oncopy { dest, value, ty } => {
                write!(f, "{} = oncopy {} {}", dest, ty, value)
            }
            Inst::Move { dest, value, ty } => write!(f, "{} = move {} {}", dest, ty, value),
            Inst::BoundsCheck { index, len } => write!(f, "bounds_check {}, {}", index, len),
            Inst::OverflowCheck { op, lhs, rhs, ty } => {
                write!(f, "overflow_check {} {} {}, {}", op, ty, lhs, rhs)
            }
            Inst::NullCheck { ptr } => write!(f, "null_check {}", ptr),
            Inst::AssertCheck { cond, message } => {
                write!(f, "assert_check {}, {:?}", cond, message)
            }
            Inst::RequireCheck { cond, message } => {
                write!(f, "require_check {}, {:?}", cond, message)
            }
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Ret { value } => write!(f, "ret {}", value),
            Terminator::RetVoid => write!(f, "ret_void"),
            Terminator::Jump { target } => write!(f, "jump b{}", target),
            Terminator::Br {
                cond,
                then_block,
                else_block,
            } => write!(f, "br {}, b{}, b{}", cond, then_block, else_block),
            Terminator::Switch {
                value,
                cases,
                default,
            } => {
                let cases: Vec<String> = cases
                    .iter()
                    .map(|(v, b)| format!("{} -> b{}", v, b))
                    .collect();
                write!(
                    f,
                    "switch {} [{}] default b{}",
                    value,
                    cases.join(", "),
                    default
                )
            }
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}
