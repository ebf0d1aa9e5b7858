// Lowering from the typed AST to KIR.
//
// Local variables are materialized with stack_alloc + load/store. Each
// lexical scope tracks its variables in declaration order plus its
// deferred statements; every exit edge (fall-through, return, break,
// continue) runs defers LIFO and destroys in reverse declaration
// order, skipping moved variables.

use crate::ir::*;
use kei_ast::*;
use kei_checker::types::{FunctionSig, Type, I32, U64};
use kei_checker::{Analysis, LoweredFn};
use log::debug;
use std::collections::{HashMap, HashSet};

mod exprs;

#[derive(Debug, Clone)]
pub struct LowerOptions {
    /// Emit bounds/overflow/null/assert checks (debug builds).
    pub debug_checks: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self { debug_checks: true }
    }
}

/// Lower a fully checked program into a KIR module. Only concrete
/// (monomorphized) functions are lowered; the checker's analysis names
/// them all in `lowered_fns`.
pub fn lower_module(name: &str, analysis: &Analysis, options: &LowerOptions) -> KirModule {
    let mut types: Vec<KirTypeDef> = Vec::new();
    let mut struct_names: Vec<&String> = analysis.structs.keys().collect();
    struct_names.sort();
    for sname in struct_names {
        let info = &analysis.structs[sname];
        types.push(KirTypeDef::Struct {
            name: info.name.clone(),
            fields: info.fields.clone(),
            has_destroy: info.has_destroy_hook || info.auto_destroy,
            has_oncopy: info.has_oncopy_hook || info.auto_oncopy,
        });
    }
    let mut enum_names: Vec<&String> = analysis.enums.keys().collect();
    enum_names.sort();
    for ename in enum_names {
        let info = &analysis.enums[ename];
        types.push(KirTypeDef::Enum {
            name: info.name.clone(),
            base: info.base.clone(),
            variants: info
                .variants
                .iter()
                .map(|v| (v.name.clone(), v.fields.clone()))
                .collect(),
        });
    }

    let mut externs: Vec<KirExtern> = analysis
        .externs
        .iter()
        .map(|(ext_name, sig)| KirExtern {
            name: ext_name.clone(),
            params: sig.params.iter().map(|p| p.ty.clone()).collect(),
            ret: sig.ret.clone(),
        })
        .collect();

    let globals = analysis
        .statics
        .iter()
        .map(|(decl, ty)| KirGlobal {
            name: decl.name.clone(),
            ty: ty.clone(),
            init: const_eval(&decl.value),
        })
        .collect();

    let mut runtime: HashSet<String> = HashSet::new();
    let mut functions = Vec::new();
    for lowered in &analysis.lowered_fns {
        debug!("lowering function {}", lowered.kir_name);
        let lowerer = FnLowerer::new(analysis, options.debug_checks, &mut runtime, lowered);
        functions.push(lowerer.lower(lowered));
    }

    // runtime support calls referenced by the lowered code
    let mut runtime_names: Vec<String> = runtime.into_iter().collect();
    runtime_names.sort();
    for rt in runtime_names {
        let (params, ret) = runtime_extern_sig(&rt);
        externs.push(KirExtern {
            name: rt,
            params,
            ret,
        });
    }

    KirModule {
        name: name.to_string(),
        globals,
        functions,
        types,
        externs,
    }
}

fn runtime_extern_sig(name: &str) -> (Vec<Type>, Type) {
    match name {
        "kei_alloc" => (vec![U64], Type::Ptr(Box::new(Type::Int {
            bits: 8,
            signed: false,
        }))),
        "kei_free" => (
            vec![Type::Ptr(Box::new(Type::Int {
                bits: 8,
                signed: false,
            }))],
            Type::Void,
        ),
        "kei_strlen" => (vec![Type::Str], U64),
        _ => (vec![Type::Str], Type::Void), // kei_panic
    }
}

/// Constant-fold a static initializer (the checker already required a
/// literal shape).
fn const_eval(expr: &Expr) -> Const {
    match &expr.kind {
        ExprKind::IntLiteral { value, .. } => Const::Int(*value as i128),
        ExprKind::FloatLiteral { value, .. } => Const::Float(*value),
        ExprKind::BoolLiteral(value) => Const::Bool(*value),
        ExprKind::StringLiteral(value) => Const::Str(value.clone()),
        ExprKind::NullLiteral => Const::Null,
        ExprKind::Group(inner) => const_eval(inner),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match const_eval(operand) {
            Const::Int(v) => Const::Int(-v),
            Const::Float(v) => Const::Float(-v),
            other => other,
        },
        _ => Const::Null,
    }
}

pub(crate) struct LocalVar {
    pub slot: ValueId,
    pub ty: Type,
    pub moved: bool,
}

#[derive(Default)]
pub(crate) struct LowerScope<'a> {
    pub vars: HashMap<String, LocalVar>,
    pub order: Vec<String>,
    pub defers: Vec<&'a Stmt>,
}

pub(crate) struct LoopCtx {
    pub break_target: BlockId,
    pub continue_target: BlockId,
    pub scope_depth: usize,
}

pub(crate) struct FnLowerer<'a> {
    pub analysis: &'a Analysis,
    pub debug: bool,
    pub runtime: &'a mut HashSet<String>,
    pub blocks: Vec<KirBlock>,
    pub current: usize,
    pub terminated: bool,
    pub next_value: u32,
    pub scopes: Vec<LowerScope<'a>>,
    pub loops: Vec<LoopCtx>,
    pub ret_ty: Type,
    pub throws: Vec<Type>,
    pub out_ptr: Option<ValueId>,
    pub err_ptr: Option<ValueId>,
    pub local_count: u32,
}

impl<'a> FnLowerer<'a> {
    pub fn new(
        analysis: &'a Analysis,
        debug: bool,
        runtime: &'a mut HashSet<String>,
        lowered: &'a LoweredFn,
    ) -> Self {
        Self {
            analysis,
            debug,
            runtime,
            blocks: Vec::new(),
            current: 0,
            terminated: false,
            next_value: 0,
            scopes: Vec::new(),
            loops: Vec::new(),
            ret_ty: lowered.sig.ret.clone(),
            throws: lowered.sig.throws.clone(),
            out_ptr: None,
            err_ptr: None,
            local_count: 0,
        }
    }

    pub fn lower(mut self, lowered: &'a LoweredFn) -> KirFunction {
        let sig: &FunctionSig = &lowered.sig;
        let is_throws = !sig.throws.is_empty();

        let mut params: Vec<(String, Type)> = sig
            .params
            .iter()
            .map(|p| (p.name.clone(), p.ty.clone()))
            .collect();
        if is_throws {
            params.push(("out".to_string(), Type::Ptr(Box::new(sig.ret.clone()))));
            params.push(("err".to_string(), Type::Ptr(Box::new(Type::Void))));
            self.out_ptr = Some(format!("%{}", sig.params.len()));
            self.err_ptr = Some(format!("%{}", sig.params.len() + 1));
        }
        self.next_value = params.len() as u32;

        self.new_block("entry");
        self.scopes.push(LowerScope::default());

        // materialize parameter slots; a `move` parameter transfers
        // ownership into the callee and is destroy-tracked like a local
        for (i, param) in sig.params.iter().enumerate() {
            let slot = self.fresh();
            self.emit(Inst::StackAlloc {
                dest: slot.clone(),
                ty: param.ty.clone(),
            });
            self.local_count += 1;
            self.emit(Inst::Store {
                ptr: slot.clone(),
                value: format!("%{}", i),
                ty: param.ty.clone(),
            });
            let tracked = param.is_move;
            self.declare_var(&param.name, slot, param.ty.clone(), !tracked);
        }

        self.lower_block_stmts(&lowered.decl.body);

        if !self.terminated {
            self.emit_scope_exit(self.scopes.len() - 1);
            if is_throws {
                let tag = self.const_int(0, I32);
                self.set_term(Terminator::Ret { value: tag });
            } else if self.ret_ty == Type::Void {
                self.set_term(Terminator::RetVoid);
            } else {
                self.set_term(Terminator::Unreachable);
            }
        }

        KirFunction {
            name: lowered.kir_name.clone(),
            params,
            return_type: if is_throws { I32 } else { sig.ret.clone() },
            throws_types: sig.throws.clone(),
            local_count: self.local_count,
            blocks: self.blocks,
        }
    }

    // ==================== builder primitives ====================

    pub(crate) fn fresh(&mut self) -> ValueId {
        let id = format!("%{}", self.next_value);
        self.next_value += 1;
        id
    }

    pub(crate) fn emit(&mut self, inst: Inst) {
        if !self.terminated {
            self.blocks[self.current].insts.push(inst);
        }
    }

    pub(crate) fn new_block(&mut self, label: &str) -> BlockId {
        let id = self.blocks.len() as BlockId;
        self.blocks.push(KirBlock {
            id,
            label: label.to_string(),
            phis: Vec::new(),
            insts: Vec::new(),
            term: Terminator::Unreachable,
        });
        if self.blocks.len() == 1 {
            self.current = 0;
            self.terminated = false;
        }
        id
    }

    pub(crate) fn switch_to(&mut self, id: BlockId) {
        self.current = id as usize;
        self.terminated = false;
    }

    pub(crate) fn current_block(&self) -> BlockId {
        self.current as BlockId
    }

    pub(crate) fn set_term(&mut self, term: Terminator) {
        if !self.terminated {
            self.blocks[self.current].term = term;
            self.terminated = true;
        }
    }

    pub(crate) fn const_int(&mut self, value: i128, ty: Type) -> ValueId {
        let dest = self.fresh();
        self.emit(Inst::ConstInt {
            dest: dest.clone(),
            value,
            ty,
        });
        dest
    }

    pub(crate) fn runtime_panic(&mut self, message: &str) {
        self.runtime.insert("kei_panic".to_string());
        let msg = self.fresh();
        self.emit(Inst::ConstString {
            dest: msg.clone(),
            value: message.to_string(),
        });
        self.emit(Inst::CallExternVoid {
            func: "kei_panic".to_string(),
            args: vec![msg],
        });
        self.set_term(Terminator::Unreachable);
    }

    // ==================== variable tracking ====================

    pub(crate) fn declare_var(&mut self, name: &str, slot: ValueId, ty: Type, untracked: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.vars.insert(
                name.to_string(),
                LocalVar {
                    slot,
                    ty,
                    moved: untracked,
                },
            );
            scope.order.push(name.to_string());
        }
    }

    pub(crate) fn lookup_var(&self, name: &str) -> Option<&LocalVar> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.vars.get(name))
    }

    pub(crate) fn set_var_moved(&mut self, name: &str, moved: bool) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(var) = scope.vars.get_mut(name) {
                var.moved = moved;
                return;
            }
        }
    }

    // ==================== scope exits ====================

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(LowerScope::default());
    }

    pub(crate) fn pop_scope_exit(&mut self) {
        if !self.terminated {
            self.emit_scope_exit(self.scopes.len() - 1);
        }
        self.scopes.pop();
    }

    /// Run one scope's defers (LIFO) and destroys (reverse declaration
    /// order, skipping moved variables).
    pub(crate) fn emit_scope_exit(&mut self, index: usize) {
        self.emit_scope_exit_skipping(index, None);
    }

    fn emit_scope_exit_skipping(&mut self, index: usize, skip: Option<&str>) {
        let defers: Vec<&'a Stmt> = self.scopes[index].defers.clone();
        for deferred in defers.iter().rev() {
            self.lower_stmt(deferred);
        }

        let destroys: Vec<(ValueId, Type)> = {
            let scope = &self.scopes[index];
            scope
                .order
                .iter()
                .rev()
                .filter(|name| Some(name.as_str()) != skip)
                .filter_map(|name| scope.vars.get(name))
                .filter(|var| !var.moved && self.analysis.needs_destroy(&var.ty))
                .map(|var| (var.slot.clone(), var.ty.clone()))
                .collect()
        };
        for (slot, ty) in destroys {
            let value = self.fresh();
            self.emit(Inst::Load {
                dest: value.clone(),
                ptr: slot,
                ty: ty.clone(),
            });
            self.emit(Inst::Destroy { value, ty });
        }
    }

    /// All scopes, innermost first — used by `return` and `throw`.
    /// `skip` names a returned local whose value must survive.
    pub(crate) fn emit_all_scope_exits(&mut self, skip: Option<&str>) {
        for index in (0..self.scopes.len()).rev() {
            self.emit_scope_exit_skipping(index, skip);
        }
    }

    /// Scopes inner to a loop, for break/continue edges.
    pub(crate) fn emit_scope_exits_to_depth(&mut self, depth: usize) {
        for index in (depth..self.scopes.len()).rev() {
            self.emit_scope_exit(index);
        }
    }

    // ==================== statements ====================

    pub(crate) fn lower_block_stmts(&mut self, block: &'a Block) {
        for stmt in &block.stmts {
            if self.terminated {
                break;
            }
            self.lower_stmt(stmt);
        }
    }

    pub(crate) fn lower_stmt(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Block(block) | StmtKind::Unsafe(block) => {
                self.push_scope();
                self.lower_block_stmts(block);
                self.pop_scope_exit();
            }
            StmtKind::Let { name, value, .. } | StmtKind::Const { name, value, .. } => {
                self.lower_binding(name, value);
            }
            StmtKind::Return(value) => self.lower_return(value.as_ref()),
            StmtKind::If {
                cond,
                then_block,
                else_branch,
            } => self.lower_if(cond, then_block, else_branch.as_deref()),
            StmtKind::While { cond, body } => self.lower_while(cond, body),
            StmtKind::For { var, iter, body } => self.lower_for(var, iter, body),
            StmtKind::Switch {
                scrutinee,
                cases,
                default,
            } => self.lower_switch(scrutinee, cases, default.as_ref()),
            StmtKind::Defer(inner) => {
                if let Some(scope) = self.scopes.last_mut() {
                    scope.defers.push(inner);
                }
            }
            StmtKind::Break => {
                let (target, depth) = match self.loops.last() {
                    Some(ctx) => (ctx.break_target, ctx.scope_depth),
                    None => return,
                };
                self.emit_scope_exits_to_depth(depth);
                self.set_term(Terminator::Jump { target });
            }
            StmtKind::Continue => {
                let (target, depth) = match self.loops.last() {
                    Some(ctx) => (ctx.continue_target, ctx.scope_depth),
                    None => return,
                };
                self.emit_scope_exits_to_depth(depth);
                self.set_term(Terminator::Jump { target });
            }
            StmtKind::Expr { expr, .. } => {
                let ty = self.analysis.expr_type(expr.id);
                if let Some(value) = self.lower_expr(expr) {
                    // discarded owned temporary with lifecycle
                    if self.analysis.needs_destroy(&ty) && is_owned_temporary(expr) {
                        self.emit(Inst::Destroy { value, ty });
                    }
                }
            }
            StmtKind::Assert { cond, message } => {
                let value = match self.lower_expr(cond) {
                    Some(value) => value,
                    None => return,
                };
                if self.debug {
                    self.emit(Inst::AssertCheck {
                        cond: value,
                        message: message_text(message.as_ref(), "assertion failed"),
                    });
                }
            }
            StmtKind::Require { cond, message } => self.lower_require(cond, message.as_ref()),
        }
    }

    fn lower_binding(&mut self, name: &str, value: &'a Expr) {
        let ty = self
            .analysis
            .binding_types
            .get(&value.id)
            .cloned()
            .unwrap_or_else(|| self.analysis.expr_type(value.id));

        let mut init = match self.lower_expr(value) {
            Some(init) => init,
            None => return,
        };

        // copying (not moving) out of an existing place clones through
        // the oncopy hook; fresh rvalues transfer ownership as-is
        if self.analysis.needs_oncopy(&ty) && is_copy_source(value) {
            let copied = self.fresh();
            self.emit(Inst::Oncopy {
                dest: copied.clone(),
                value: init,
                ty: ty.clone(),
            });
            init = copied;
        }

        let slot = self.fresh();
        self.emit(Inst::StackAlloc {
            dest: slot.clone(),
            ty: ty.clone(),
        });
        self.local_count += 1;
        self.emit(Inst::Store {
            ptr: slot.clone(),
            value: init,
            ty: ty.clone(),
        });
        self.declare_var(name, slot, ty, false);
    }

    fn lower_return(&mut self, value: Option<&'a Expr>) {
        // a returned tracked local escapes this function: do not destroy
        let skip = value
            .and_then(|v| v.as_identifier())
            .filter(|name| self.lookup_var(name).is_some())
            .map(str::to_string);

        let lowered = value.and_then(|v| self.lower_expr(v));

        self.emit_all_scope_exits(skip.as_deref());

        if let Some(out) = self.out_ptr.clone() {
            if let Some(result) = lowered {
                self.emit(Inst::Store {
                    ptr: out,
                    value: result,
                    ty: self.ret_ty.clone(),
                });
            }
            let tag = self.const_int(0, I32);
            self.set_term(Terminator::Ret { value: tag });
        } else {
            match lowered {
                Some(result) => self.set_term(Terminator::Ret { value: result }),
                None => self.set_term(Terminator::RetVoid),
            }
        }
    }

    fn lower_if(&mut self, cond: &'a Expr, then_block: &'a Block, else_branch: Option<&'a Stmt>) {
        let cond_value = match self.lower_expr(cond) {
            Some(value) => value,
            None => return,
        };
        let then_b = self.new_block("then");
        let cont = if else_branch.is_some() {
            let else_b = self.new_block("else");
            let cont = self.new_block("endif");
            self.set_term(Terminator::Br {
                cond: cond_value,
                then_block: then_b,
                else_block: else_b,
            });

            self.switch_to(then_b);
            self.push_scope();
            self.lower_block_stmts(then_block);
            self.pop_scope_exit();
            self.set_term(Terminator::Jump { target: cont });

            self.switch_to(else_b);
            if let Some(else_branch) = else_branch {
                self.lower_stmt(else_branch);
            }
            self.set_term(Terminator::Jump { target: cont });
            cont
        } else {
            let cont = self.new_block("endif");
            self.set_term(Terminator::Br {
                cond: cond_value,
                then_block: then_b,
                else_block: cont,
            });

            self.switch_to(then_b);
            self.push_scope();
            self.lower_block_stmts(then_block);
            self.pop_scope_exit();
            self.set_term(Terminator::Jump { target: cont });
            cont
        };
        self.switch_to(cont);
    }

    fn lower_while(&mut self, cond: &'a Expr, body: &'a Block) {
        let cond_b = self.new_block("while.cond");
        let body_b = self.new_block("while.body");
        let exit_b = self.new_block("while.end");

        self.set_term(Terminator::Jump { target: cond_b });
        self.switch_to(cond_b);
        let cond_value = match self.lower_expr(cond) {
            Some(value) => value,
            None => return,
        };
        self.set_term(Terminator::Br {
            cond: cond_value,
            then_block: body_b,
            else_block: exit_b,
        });

        self.loops.push(LoopCtx {
            break_target: exit_b,
            continue_target: cond_b,
            scope_depth: self.scopes.len(),
        });
        self.switch_to(body_b);
        self.push_scope();
        self.lower_block_stmts(body);
        self.pop_scope_exit();
        self.set_term(Terminator::Jump { target: cond_b });
        self.loops.pop();

        self.switch_to(exit_b);
    }

    fn lower_for(&mut self, var: &'a str, iter: &'a Expr, body: &'a Block) {
        let iter_ty = self.analysis.expr_type(iter.id);
        match iter_ty {
            Type::Range(elem) => self.lower_for_range(var, iter, body, (*elem).clone()),
            Type::Array { elem, len } => {
                self.lower_for_sequence(var, iter, body, (*elem).clone(), len)
            }
            Type::Slice(elem) => self.lower_for_sequence(var, iter, body, (*elem).clone(), None),
            _ => {}
        }
    }

    fn lower_for_range(&mut self, var: &'a str, iter: &'a Expr, body: &'a Block, elem: Type) {
        // bounds: inline range expressions avoid materializing the range
        let (start, end, inclusive) = match range_parts(iter) {
            Some((start_expr, end_expr, inclusive)) => {
                let start = self.lower_expr(start_expr);
                let end = self.lower_expr(end_expr);
                match (start, end) {
                    (Some(start), Some(end)) => (start, end, inclusive),
                    _ => return,
                }
            }
            None => {
                let range_value = match self.lower_expr(iter) {
                    Some(value) => value,
                    None => return,
                };
                let (start, end) = self.load_range_bounds(range_value, &elem);
                (start, end, false)
            }
        };

        let idx_slot = self.fresh();
        self.emit(Inst::StackAlloc {
            dest: idx_slot.clone(),
            ty: elem.clone(),
        });
        self.local_count += 1;
        self.emit(Inst::Store {
            ptr: idx_slot.clone(),
            value: start,
            ty: elem.clone(),
        });

        let cond_b = self.new_block("for.cond");
        let body_b = self.new_block("for.body");
        let step_b = self.new_block("for.step");
        let exit_b = self.new_block("for.end");

        self.set_term(Terminator::Jump { target: cond_b });
        self.switch_to(cond_b);
        let current = self.fresh();
        self.emit(Inst::Load {
            dest: current.clone(),
            ptr: idx_slot.clone(),
            ty: elem.clone(),
        });
        let cmp = self.fresh();
        self.emit(Inst::BinOp {
            dest: cmp.clone(),
            op: if inclusive { BinOp::Lte } else { BinOp::Lt },
            lhs: current.clone(),
            rhs: end,
            ty: elem.clone(),
        });
        self.set_term(Terminator::Br {
            cond: cmp,
            then_block: body_b,
            else_block: exit_b,
        });

        self.loops.push(LoopCtx {
            break_target: exit_b,
            continue_target: step_b,
            scope_depth: self.scopes.len(),
        });
        self.switch_to(body_b);
        self.push_scope();
        self.declare_var(var, idx_slot.clone(), elem.clone(), true);
        self.lower_block_stmts(body);
        self.pop_scope_exit();
        self.set_term(Terminator::Jump { target: step_b });
        self.loops.pop();

        self.switch_to(step_b);
        let stepped = self.fresh();
        self.emit(Inst::Load {
            dest: stepped.clone(),
            ptr: idx_slot.clone(),
            ty: elem.clone(),
        });
        let one = self.const_int(1, elem.clone());
        let next = self.fresh();
        self.emit(Inst::BinOp {
            dest: next.clone(),
            op: BinOp::Add,
            lhs: stepped,
            rhs: one,
            ty: elem.clone(),
        });
        self.emit(Inst::Store {
            ptr: idx_slot,
            value: next,
            ty: elem,
        });
        self.set_term(Terminator::Jump { target: cond_b });

        self.switch_to(exit_b);
    }

    fn lower_for_sequence(
        &mut self,
        var: &'a str,
        iter: &'a Expr,
        body: &'a Block,
        elem: Type,
        len: Option<u64>,
    ) {
        let (place_ptr, _) = match self.lower_place(iter) {
            Some(place) => place,
            None => return,
        };
        // a fixed array is indexed in place; a slice header carries its
        // data pointer and length
        let (base_ptr, len_value) = match len {
            Some(len) => (place_ptr, self.const_int(len as i128, U64)),
            None => (self.slice_data(&place_ptr), self.slice_len(&place_ptr)),
        };

        let idx_slot = self.fresh();
        self.emit(Inst::StackAlloc {
            dest: idx_slot.clone(),
            ty: U64,
        });
        self.local_count += 1;
        let zero = self.const_int(0, U64);
        self.emit(Inst::Store {
            ptr: idx_slot.clone(),
            value: zero,
            ty: U64,
        });

        let cond_b = self.new_block("for.cond");
        let body_b = self.new_block("for.body");
        let step_b = self.new_block("for.step");
        let exit_b = self.new_block("for.end");

        self.set_term(Terminator::Jump { target: cond_b });
        self.switch_to(cond_b);
        let idx = self.fresh();
        self.emit(Inst::Load {
            dest: idx.clone(),
            ptr: idx_slot.clone(),
            ty: U64,
        });
        let cmp = self.fresh();
        self.emit(Inst::BinOp {
            dest: cmp.clone(),
            op: BinOp::Lt,
            lhs: idx.clone(),
            rhs: len_value.clone(),
            ty: U64,
        });
        self.set_term(Terminator::Br {
            cond: cmp,
            then_block: body_b,
            else_block: exit_b,
        });

        self.loops.push(LoopCtx {
            break_target: exit_b,
            continue_target: step_b,
            scope_depth: self.scopes.len(),
        });
        self.switch_to(body_b);
        self.push_scope();
        let idx2 = self.fresh();
        self.emit(Inst::Load {
            dest: idx2.clone(),
            ptr: idx_slot.clone(),
            ty: U64,
        });
        let elem_ptr = self.fresh();
        self.emit(Inst::IndexPtr {
            dest: elem_ptr.clone(),
            base: base_ptr.clone(),
            index: idx2,
            elem_ty: elem.clone(),
        });
        let elem_value = self.fresh();
        self.emit(Inst::Load {
            dest: elem_value.clone(),
            ptr: elem_ptr,
            ty: elem.clone(),
        });
        let var_slot = self.fresh();
        self.emit(Inst::StackAlloc {
            dest: var_slot.clone(),
            ty: elem.clone(),
        });
        self.local_count += 1;
        self.emit(Inst::Store {
            ptr: var_slot.clone(),
            value: elem_value,
            ty: elem.clone(),
        });
        self.declare_var(var, var_slot, elem.clone(), true);
        self.lower_block_stmts(body);
        self.pop_scope_exit();
        self.set_term(Terminator::Jump { target: step_b });
        self.loops.pop();

        self.switch_to(step_b);
        let idx3 = self.fresh();
        self.emit(Inst::Load {
            dest: idx3.clone(),
            ptr: idx_slot.clone(),
            ty: U64,
        });
        let one = self.const_int(1, U64);
        let next = self.fresh();
        self.emit(Inst::BinOp {
            dest: next.clone(),
            op: BinOp::Add,
            lhs: idx3,
            rhs: one,
            ty: U64,
        });
        self.emit(Inst::Store {
            ptr: idx_slot,
            value: next,
            ty: U64,
        });
        self.set_term(Terminator::Jump { target: cond_b });

        self.switch_to(exit_b);
    }

    fn lower_switch(
        &mut self,
        scrutinee: &'a Expr,
        cases: &'a [SwitchCase],
        default: Option<&'a Block>,
    ) {
        let scrut_ty = self.analysis.expr_type(scrutinee.id);
        match scrut_ty {
            Type::Enum { name } => self.lower_enum_switch(scrutinee, &name, cases, default),
            _ => self.lower_int_switch(scrutinee, cases, default),
        }
    }

    fn lower_enum_switch(
        &mut self,
        scrutinee: &'a Expr,
        enum_name: &str,
        cases: &'a [SwitchCase],
        default: Option<&'a Block>,
    ) {
        let info = match self.analysis.enums.get(enum_name) {
            Some(info) => info.clone(),
            None => return,
        };

        let (scrut_ptr, _) = match self.lower_place(scrutinee) {
            Some(place) => place,
            None => return,
        };
        let tag_ptr = self.fresh();
        self.emit(Inst::FieldPtr {
            dest: tag_ptr.clone(),
            base: scrut_ptr.clone(),
            struct_name: enum_name.to_string(),
            field: "tag".to_string(),
            index: 0,
        });
        let tag = self.fresh();
        self.emit(Inst::Load {
            dest: tag.clone(),
            ptr: tag_ptr,
            ty: info.base.clone(),
        });

        let exit_b = self.new_block("switch.end");
        let mut case_targets = Vec::new();
        let mut arms: Vec<(BlockId, &SwitchCase, Option<&kei_checker::VariantInfo>)> = Vec::new();
        for case in cases {
            let block = self.new_block("case");
            if let CasePattern::Variant { name, .. } = &case.pattern {
                if let Some(variant) = info.variants.iter().find(|v| v.name == *name) {
                    case_targets.push((variant.tag as i128, block));
                    arms.push((block, case, Some(variant)));
                    continue;
                }
            }
            arms.push((block, case, None));
        }
        let default_b = match default {
            Some(_) => self.new_block("switch.default"),
            None => exit_b,
        };
        self.set_term(Terminator::Switch {
            value: tag,
            cases: case_targets,
            default: default_b,
        });

        for (block, case, variant) in arms {
            self.switch_to(block);
            self.push_scope();
            if let (CasePattern::Variant { bindings, .. }, Some(variant)) =
                (&case.pattern, variant)
            {
                for (index, (binding, field_ty)) in
                    bindings.iter().zip(&variant.fields).enumerate()
                {
                    let payload_ptr = self.fresh();
                    self.emit(Inst::FieldPtr {
                        dest: payload_ptr.clone(),
                        base: scrut_ptr.clone(),
                        struct_name: enum_name.to_string(),
                        field: format!("{}.v{}", variant.name, index),
                        index: index + 1,
                    });
                    let payload = self.fresh();
                    self.emit(Inst::Load {
                        dest: payload.clone(),
                        ptr: payload_ptr,
                        ty: field_ty.clone(),
                    });
                    let slot = self.fresh();
                    self.emit(Inst::StackAlloc {
                        dest: slot.clone(),
                        ty: field_ty.clone(),
                    });
                    self.local_count += 1;
                    self.emit(Inst::Store {
                        ptr: slot.clone(),
                        value: payload,
                        ty: field_ty.clone(),
                    });
                    self.declare_var(binding, slot, field_ty.clone(), true);
                }
            }
            self.lower_block_stmts(&case.body);
            self.pop_scope_exit();
            self.set_term(Terminator::Jump { target: exit_b });
        }

        if let Some(default_block) = default {
            self.switch_to(default_b);
            self.push_scope();
            self.lower_block_stmts(default_block);
            self.pop_scope_exit();
            self.set_term(Terminator::Jump { target: exit_b });
        }

        self.switch_to(exit_b);
    }

    fn lower_int_switch(
        &mut self,
        scrutinee: &'a Expr,
        cases: &'a [SwitchCase],
        default: Option<&'a Block>,
    ) {
        let value = match self.lower_expr(scrutinee) {
            Some(value) => value,
            None => return,
        };

        let exit_b = self.new_block("switch.end");
        let mut case_targets = Vec::new();
        let mut arms = Vec::new();
        for case in cases {
            let constant = match &case.pattern {
                CasePattern::Literal(expr) => const_int_of(expr),
                CasePattern::Variant { .. } => None,
            };
            let block = self.new_block("case");
            if let Some(constant) = constant {
                case_targets.push((constant, block));
            }
            arms.push((block, case));
        }
        let default_b = match default {
            Some(_) => self.new_block("switch.default"),
            None => exit_b,
        };
        self.set_term(Terminator::Switch {
            value,
            cases: case_targets,
            default: default_b,
        });

        for (block, case) in arms {
            self.switch_to(block);
            self.push_scope();
            self.lower_block_stmts(&case.body);
            self.pop_scope_exit();
            self.set_term(Terminator::Jump { target: exit_b });
        }
        if let Some(default_block) = default {
            self.switch_to(default_b);
            self.push_scope();
            self.lower_block_stmts(default_block);
            self.pop_scope_exit();
            self.set_term(Terminator::Jump { target: exit_b });
        }

        self.switch_to(exit_b);
    }

    /// `require(cond, msg)` branches on the condition; the failure edge
    /// records `require_check` and synthesizes an early return of error
    /// tag 1 inside a throws function, or a panic otherwise.
    fn lower_require(&mut self, cond: &'a Expr, message: Option<&'a Expr>) {
        let cond_value = match self.lower_expr(cond) {
            Some(value) => value,
            None => return,
        };
        let ok_b = self.new_block("require.ok");
        let fail_b = self.new_block("require.fail");
        self.set_term(Terminator::Br {
            cond: cond_value.clone(),
            then_block: ok_b,
            else_block: fail_b,
        });

        self.switch_to(fail_b);
        self.emit(Inst::RequireCheck {
            cond: cond_value,
            message: message_text(message, "requirement failed"),
        });
        if self.err_ptr.is_some() {
            self.emit_all_scope_exits(None);
            let tag = self.const_int(1, I32);
            self.set_term(Terminator::Ret { value: tag });
        } else {
            self.runtime_panic(&message_text(message, "requirement failed"));
        }

        self.switch_to(ok_b);
    }
}

// ==================== small helpers ====================

/// Reading an existing place copies it; everything else (literals,
/// calls, moves) produces a fresh value that is owned outright.
pub(crate) fn is_copy_source(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Identifier(_) | ExprKind::Member { .. } | ExprKind::Index { .. } => true,
        ExprKind::Group(inner) => is_copy_source(inner),
        _ => false,
    }
}

/// A discarded expression whose value is a fresh owned temporary —
/// places, assignments, and step expressions just reference storage
/// that stays live.
pub(crate) fn is_owned_temporary(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Identifier(_)
        | ExprKind::Member { .. }
        | ExprKind::Index { .. }
        | ExprKind::Assign { .. }
        | ExprKind::Increment(_)
        | ExprKind::Decrement(_) => false,
        ExprKind::Group(inner) => is_owned_temporary(inner),
        _ => true,
    }
}

pub(crate) fn range_parts(expr: &Expr) -> Option<(&Expr, &Expr, bool)> {
    match &expr.kind {
        ExprKind::Range {
            start,
            end,
            inclusive,
        } => Some((start, end, *inclusive)),
        ExprKind::Group(inner) => range_parts(inner),
        _ => None,
    }
}

pub(crate) fn const_int_of(expr: &Expr) -> Option<i128> {
    match &expr.kind {
        ExprKind::IntLiteral { value, .. } => Some(*value as i128),
        ExprKind::Group(inner) => const_int_of(inner),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => const_int_of(operand).map(|v| -v),
        _ => None,
    }
}

fn message_text(message: Option<&Expr>, fallback: &str) -> String {
    match message.map(|m| &m.kind) {
        Some(ExprKind::StringLiteral(text)) => text.clone(),
        _ => fallback.to_string(),
    }
}
