// Expression lowering.
//
// `lower_expr` yields the SSA value of an expression (`None` for void),
// `lower_place` yields an address for lvalues, materializing rvalues
// into temporary slots where needed.

use super::*;
use kei_checker::Builtin;

impl<'a> FnLowerer<'a> {
    pub(crate) fn lower_expr(&mut self, expr: &'a Expr) -> Option<ValueId> {
        match &expr.kind {
            ExprKind::IntLiteral { value, .. } => {
                let ty = self.analysis.expr_type(expr.id);
                Some(self.const_int(*value as i128, ty))
            }
            ExprKind::FloatLiteral { value, .. } => {
                let ty = self.analysis.expr_type(expr.id);
                let dest = self.fresh();
                self.emit(Inst::ConstFloat {
                    dest: dest.clone(),
                    value: *value,
                    ty,
                });
                Some(dest)
            }
            ExprKind::StringLiteral(value) => {
                let dest = self.fresh();
                self.emit(Inst::ConstString {
                    dest: dest.clone(),
                    value: value.clone(),
                });
                Some(dest)
            }
            ExprKind::BoolLiteral(value) => {
                let dest = self.fresh();
                self.emit(Inst::ConstBool {
                    dest: dest.clone(),
                    value: *value,
                });
                Some(dest)
            }
            ExprKind::NullLiteral => {
                let dest = self.fresh();
                self.emit(Inst::ConstNull {
                    dest: dest.clone(),
                    ty: Type::Null,
                });
                Some(dest)
            }
            ExprKind::Identifier(name) => {
                let (ptr, ty) = self.name_place(name)?;
                let dest = self.fresh();
                self.emit(Inst::Load {
                    dest: dest.clone(),
                    ptr,
                    ty,
                });
                Some(dest)
            }
            ExprKind::Binary { op, lhs, rhs } if op.is_logical() => {
                self.lower_logical(*op, lhs, rhs)
            }
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(expr, *op, lhs, rhs),
            ExprKind::Unary { op, operand } => self.lower_unary(expr, *op, operand),
            ExprKind::Assign { op, target, value } => self.lower_assign(*op, target, value),
            ExprKind::Call { callee, args, .. } => self.lower_call(expr, callee, args),
            ExprKind::Member { object, field } => {
                // `Color.Red` names an enum unit variant, not a field
                if let ExprKind::Identifier(name) = &object.kind {
                    if self.analysis.enums.contains_key(name) {
                        let enum_name = name.clone();
                        let variant = field.clone();
                        return self.lower_enum_unit(&enum_name, &variant);
                    }
                }
                let (ptr, ty) = self.lower_place(expr)?;
                let dest = self.fresh();
                self.emit(Inst::Load {
                    dest: dest.clone(),
                    ptr,
                    ty,
                });
                Some(dest)
            }
            ExprKind::Index { .. } => {
                let (ptr, ty) = self.lower_place(expr)?;
                let dest = self.fresh();
                self.emit(Inst::Load {
                    dest: dest.clone(),
                    ptr,
                    ty,
                });
                Some(dest)
            }
            ExprKind::Deref(inner) => {
                let ptr = self.lower_expr(inner)?;
                if self.debug {
                    self.emit(Inst::NullCheck { ptr: ptr.clone() });
                }
                let ty = self.analysis.expr_type(expr.id);
                let dest = self.fresh();
                self.emit(Inst::Load {
                    dest: dest.clone(),
                    ptr,
                    ty,
                });
                Some(dest)
            }
            ExprKind::StructLiteral { fields, .. } => self.lower_struct_literal(expr, fields),
            ExprKind::If {
                cond,
                then_block,
                else_block,
            } => self.lower_if_expr(expr, cond, then_block, else_block.as_ref()),
            ExprKind::Move(inner) => {
                let value = self.lower_expr(inner)?;
                let ty = self.analysis.expr_type(inner.id);
                let dest = self.fresh();
                self.emit(Inst::Move {
                    dest: dest.clone(),
                    value,
                    ty,
                });
                if let Some(name) = inner.as_identifier() {
                    self.set_var_moved(name, true);
                }
                Some(dest)
            }
            ExprKind::Throw(inner) => {
                let value = self.lower_expr(inner)?;
                let ty = self.analysis.expr_type(inner.id);
                let index = self.throws.iter().position(|t| *t == ty).unwrap_or(0);
                if let Some(err) = self.err_ptr.clone() {
                    self.emit(Inst::Store {
                        ptr: err,
                        value,
                        ty,
                    });
                }
                self.emit_all_scope_exits(None);
                let tag = self.const_int(index as i128 + 1, I32);
                self.set_term(Terminator::Ret { value: tag });
                None
            }
            ExprKind::Catch { operand, handler } => self.lower_catch(operand, handler),
            ExprKind::Group(inner) => self.lower_expr(inner),
            ExprKind::Increment(inner) => self.lower_step(inner, BinOp::Add),
            ExprKind::Decrement(inner) => self.lower_step(inner, BinOp::Sub),
            ExprKind::Range { .. } => self.lower_range_value(expr),
            ExprKind::Unsafe(block) => self.lower_block_value(block),
            ExprKind::Cast { expr: inner, ty: _ } => {
                let value = self.lower_expr(inner)?;
                let from = self.analysis.expr_type(inner.id);
                let to = self.analysis.expr_type(expr.id);
                let dest = self.fresh();
                self.emit(Inst::Cast {
                    dest: dest.clone(),
                    value,
                    from,
                    to,
                });
                Some(dest)
            }
            ExprKind::ArrayLiteral(elements) => self.lower_array_literal(expr, elements),
        }
    }

    /// Address of a named local or static global.
    fn name_place(&mut self, name: &str) -> Option<(ValueId, Type)> {
        if let Some(var) = self.lookup_var(name) {
            return Some((var.slot.clone(), var.ty.clone()));
        }
        self.analysis
            .statics
            .iter()
            .find(|(decl, _)| decl.name == name)
            .map(|(decl, ty)| (format!("@{}", decl.name), ty.clone()))
    }

    pub(crate) fn lower_place(&mut self, expr: &'a Expr) -> Option<(ValueId, Type)> {
        match &expr.kind {
            ExprKind::Identifier(name) => self.name_place(name),
            ExprKind::Member { object, field } => {
                let (base, base_ty) = self.lower_place(object)?;
                let struct_name = match base_ty {
                    Type::Struct { name } => name,
                    _ => return None,
                };
                let info = self.analysis.structs.get(&struct_name)?;
                let (index, (_, field_ty)) = info
                    .fields
                    .iter()
                    .enumerate()
                    .find(|(_, (f, _))| f == field)?;
                let field_ty = field_ty.clone();
                let dest = self.fresh();
                self.emit(Inst::FieldPtr {
                    dest: dest.clone(),
                    base,
                    struct_name,
                    field: field.clone(),
                    index,
                });
                Some((dest, field_ty))
            }
            ExprKind::Index { object, index } => self.lower_index_place(expr, object, index),
            ExprKind::Deref(inner) => {
                let ptr = self.lower_expr(inner)?;
                if self.debug {
                    self.emit(Inst::NullCheck { ptr: ptr.clone() });
                }
                let ty = self.analysis.expr_type(expr.id);
                Some((ptr, ty))
            }
            ExprKind::Group(inner) => self.lower_place(inner),
            _ => {
                // rvalue: materialize a temporary slot
                let ty = self.analysis.expr_type(expr.id);
                let value = self.lower_expr(expr)?;
                let slot = self.fresh();
                self.emit(Inst::StackAlloc {
                    dest: slot.clone(),
                    ty: ty.clone(),
                });
                self.local_count += 1;
                self.emit(Inst::Store {
                    ptr: slot.clone(),
                    value,
                    ty: ty.clone(),
                });
                Some((slot, ty))
            }
        }
    }

    fn lower_index_place(
        &mut self,
        expr: &'a Expr,
        object: &'a Expr,
        index: &'a Expr,
    ) -> Option<(ValueId, Type)> {
        let object_ty = self.analysis.expr_type(object.id);
        match object_ty {
            Type::Array { elem, len } => {
                let (base, _) = self.lower_place(object)?;
                let idx = self.lower_expr(index)?;
                if self.debug {
                    if let Some(len) = len {
                        let len_value = self.const_int(len as i128, U64);
                        self.emit(Inst::BoundsCheck {
                            index: idx.clone(),
                            len: len_value,
                        });
                    }
                }
                let dest = self.fresh();
                self.emit(Inst::IndexPtr {
                    dest: dest.clone(),
                    base,
                    index: idx,
                    elem_ty: (*elem).clone(),
                });
                Some((dest, (*elem).clone()))
            }
            Type::Slice(elem) => {
                let (header, _) = self.lower_place(object)?;
                let data = self.slice_data(&header);
                let idx = self.lower_expr(index)?;
                if self.debug {
                    let len = self.slice_len(&header);
                    self.emit(Inst::BoundsCheck {
                        index: idx.clone(),
                        len,
                    });
                }
                let dest = self.fresh();
                self.emit(Inst::IndexPtr {
                    dest: dest.clone(),
                    base: data,
                    index: idx,
                    elem_ty: (*elem).clone(),
                });
                Some((dest, (*elem).clone()))
            }
            Type::Ptr(pointee) => {
                let base = self.lower_expr(object)?;
                if self.debug {
                    self.emit(Inst::NullCheck { ptr: base.clone() });
                }
                let idx = self.lower_expr(index)?;
                let dest = self.fresh();
                self.emit(Inst::IndexPtr {
                    dest: dest.clone(),
                    base,
                    index: idx,
                    elem_ty: (*pointee).clone(),
                });
                Some((dest, (*pointee).clone()))
            }
            Type::Str => {
                let base = self.lower_expr(object)?;
                let idx = self.lower_expr(index)?;
                let dest = self.fresh();
                self.emit(Inst::IndexPtr {
                    dest: dest.clone(),
                    base,
                    index: idx,
                    elem_ty: Type::CChar,
                });
                Some((dest, self.analysis.expr_type(expr.id)))
            }
            _ => None,
        }
    }

    pub(crate) fn slice_data(&mut self, header: &ValueId) -> ValueId {
        let field = self.fresh();
        self.emit(Inst::FieldPtr {
            dest: field.clone(),
            base: header.clone(),
            struct_name: "slice".to_string(),
            field: "ptr".to_string(),
            index: 0,
        });
        let dest = self.fresh();
        self.emit(Inst::Load {
            dest: dest.clone(),
            ptr: field,
            ty: Type::Ptr(Box::new(Type::Void)),
        });
        dest
    }

    pub(crate) fn slice_len(&mut self, header: &ValueId) -> ValueId {
        let field = self.fresh();
        self.emit(Inst::FieldPtr {
            dest: field.clone(),
            base: header.clone(),
            struct_name: "slice".to_string(),
            field: "len".to_string(),
            index: 1,
        });
        let dest = self.fresh();
        self.emit(Inst::Load {
            dest: dest.clone(),
            ptr: field,
            ty: U64,
        });
        dest
    }

    // ==================== operators ====================

    fn lower_logical(&mut self, op: BinaryOp, lhs: &'a Expr, rhs: &'a Expr) -> Option<ValueId> {
        let lhs_value = self.lower_expr(lhs)?;
        let entry = self.current_block();
        let rhs_b = self.new_block("logic.rhs");
        let end_b = self.new_block("logic.end");
        match op {
            BinaryOp::And => self.set_term(Terminator::Br {
                cond: lhs_value.clone(),
                then_block: rhs_b,
                else_block: end_b,
            }),
            _ => self.set_term(Terminator::Br {
                cond: lhs_value.clone(),
                then_block: end_b,
                else_block: rhs_b,
            }),
        }

        self.switch_to(rhs_b);
        let rhs_value = self.lower_expr(rhs)?;
        let rhs_exit = self.current_block();
        self.set_term(Terminator::Jump { target: end_b });

        self.switch_to(end_b);
        let dest = self.fresh();
        self.blocks[end_b as usize].phis.push(Phi {
            dest: dest.clone(),
            ty: Type::Bool,
            incoming: vec![(lhs_value, entry), (rhs_value, rhs_exit)],
        });
        Some(dest)
    }

    fn lower_binary(
        &mut self,
        expr: &'a Expr,
        op: BinaryOp,
        lhs: &'a Expr,
        rhs: &'a Expr,
    ) -> Option<ValueId> {
        let lhs_value = self.lower_expr(lhs)?;
        let rhs_value = self.lower_expr(rhs)?;
        let operand_ty = self.analysis.expr_type(lhs.id);
        let ir_op = bin_op_of(op);

        if self.debug
            && matches!(ir_op, BinOp::Add | BinOp::Sub | BinOp::Mul)
            && matches!(operand_ty, Type::Int { signed: true, .. })
        {
            self.emit(Inst::OverflowCheck {
                op: ir_op,
                lhs: lhs_value.clone(),
                rhs: rhs_value.clone(),
                ty: operand_ty.clone(),
            });
        }

        let result_ty = self.analysis.expr_type(expr.id);
        let ty = if op.is_comparison() {
            operand_ty
        } else {
            result_ty
        };
        let dest = self.fresh();
        self.emit(Inst::BinOp {
            dest: dest.clone(),
            op: ir_op,
            lhs: lhs_value,
            rhs: rhs_value,
            ty,
        });
        Some(dest)
    }

    fn lower_unary(&mut self, expr: &'a Expr, op: UnaryOp, operand: &'a Expr) -> Option<ValueId> {
        if op == UnaryOp::AddrOf {
            let (ptr, _) = self.lower_place(operand)?;
            return Some(ptr);
        }
        let value = self.lower_expr(operand)?;
        let ty = self.analysis.expr_type(expr.id);
        let dest = self.fresh();
        match op {
            UnaryOp::Neg => self.emit(Inst::Neg {
                dest: dest.clone(),
                operand: value,
                ty,
            }),
            UnaryOp::Not => self.emit(Inst::Not {
                dest: dest.clone(),
                operand: value,
            }),
            UnaryOp::BitNot => self.emit(Inst::BitNot {
                dest: dest.clone(),
                operand: value,
                ty,
            }),
            UnaryOp::AddrOf => unreachable!("handled above"),
        }
        Some(dest)
    }

    fn lower_assign(
        &mut self,
        op: Option<BinaryOp>,
        target: &'a Expr,
        value: &'a Expr,
    ) -> Option<ValueId> {
        let (ptr, ty) = self.lower_place(target)?;

        match op {
            None => {
                let mut new_value = self.lower_expr(value)?;

                // destroy the old value of a tracked variable before the
                // slot is overwritten; a moved-out variable has nothing
                // left to destroy
                if let Some(name) = target.as_identifier() {
                    let live = self
                        .lookup_var(name)
                        .map(|var| !var.moved)
                        .unwrap_or(false);
                    if live && self.analysis.needs_destroy(&ty) {
                        let old = self.fresh();
                        self.emit(Inst::Load {
                            dest: old.clone(),
                            ptr: ptr.clone(),
                            ty: ty.clone(),
                        });
                        self.emit(Inst::Destroy {
                            value: old,
                            ty: ty.clone(),
                        });
                    }
                }

                if self.analysis.needs_oncopy(&ty) && is_copy_source(value) {
                    let copied = self.fresh();
                    self.emit(Inst::Oncopy {
                        dest: copied.clone(),
                        value: new_value,
                        ty: ty.clone(),
                    });
                    new_value = copied;
                }
                self.emit(Inst::Store {
                    ptr,
                    value: new_value.clone(),
                    ty,
                });
                if let Some(name) = target.as_identifier() {
                    self.set_var_moved(name, false);
                }
                Some(new_value)
            }
            Some(op) => {
                let old = self.fresh();
                self.emit(Inst::Load {
                    dest: old.clone(),
                    ptr: ptr.clone(),
                    ty: ty.clone(),
                });
                let rhs = self.lower_expr(value)?;
                let ir_op = bin_op_of(op);
                if self.debug
                    && matches!(ir_op, BinOp::Add | BinOp::Sub | BinOp::Mul)
                    && matches!(ty, Type::Int { signed: true, .. })
                {
                    self.emit(Inst::OverflowCheck {
                        op: ir_op,
                        lhs: old.clone(),
                        rhs: rhs.clone(),
                        ty: ty.clone(),
                    });
                }
                let result = self.fresh();
                self.emit(Inst::BinOp {
                    dest: result.clone(),
                    op: ir_op,
                    lhs: old,
                    rhs,
                    ty: ty.clone(),
                });
                self.emit(Inst::Store {
                    ptr,
                    value: result.clone(),
                    ty,
                });
                Some(result)
            }
        }
    }

    fn lower_step(&mut self, operand: &'a Expr, op: BinOp) -> Option<ValueId> {
        let (ptr, ty) = self.lower_place(operand)?;
        let old = self.fresh();
        self.emit(Inst::Load {
            dest: old.clone(),
            ptr: ptr.clone(),
            ty: ty.clone(),
        });
        let one = self.const_int(1, ty.clone());
        if self.debug && matches!(ty, Type::Int { signed: true, .. }) {
            self.emit(Inst::OverflowCheck {
                op,
                lhs: old.clone(),
                rhs: one.clone(),
                ty: ty.clone(),
            });
        }
        let next = self.fresh();
        self.emit(Inst::BinOp {
            dest: next.clone(),
            op,
            lhs: old.clone(),
            rhs: one,
            ty: ty.clone(),
        });
        self.emit(Inst::Store {
            ptr,
            value: next,
            ty,
        });
        // postfix semantics: the expression's value is the old one
        Some(old)
    }

    // ==================== aggregate values ====================

    fn lower_struct_literal(
        &mut self,
        expr: &'a Expr,
        fields: &'a [(String, Expr)],
    ) -> Option<ValueId> {
        let ty = self.analysis.expr_type(expr.id);
        let struct_name = match &ty {
            Type::Struct { name } => name.clone(),
            _ => return None,
        };
        let info = self.analysis.structs.get(&struct_name)?.clone();

        let slot = self.fresh();
        self.emit(Inst::StackAlloc {
            dest: slot.clone(),
            ty: ty.clone(),
        });
        self.local_count += 1;

        for (field_name, value) in fields {
            let (index, field_ty) = match info
                .fields
                .iter()
                .enumerate()
                .find(|(_, (f, _))| f == field_name)
            {
                Some((index, (_, field_ty))) => (index, field_ty.clone()),
                None => continue,
            };
            let mut field_value = self.lower_expr(value)?;
            if self.analysis.needs_oncopy(&field_ty) && is_copy_source(value) {
                let copied = self.fresh();
                self.emit(Inst::Oncopy {
                    dest: copied.clone(),
                    value: field_value,
                    ty: field_ty.clone(),
                });
                field_value = copied;
            }
            let field_ptr = self.fresh();
            self.emit(Inst::FieldPtr {
                dest: field_ptr.clone(),
                base: slot.clone(),
                struct_name: struct_name.clone(),
                field: field_name.clone(),
                index,
            });
            self.emit(Inst::Store {
                ptr: field_ptr,
                value: field_value,
                ty: field_ty,
            });
        }

        let dest = self.fresh();
        self.emit(Inst::Load {
            dest: dest.clone(),
            ptr: slot,
            ty,
        });
        Some(dest)
    }

    fn lower_array_literal(&mut self, expr: &'a Expr, elements: &'a [Expr]) -> Option<ValueId> {
        let ty = self.analysis.expr_type(expr.id);
        let elem_ty = match &ty {
            Type::Array { elem, .. } => (**elem).clone(),
            _ => return None,
        };
        let slot = self.fresh();
        self.emit(Inst::StackAlloc {
            dest: slot.clone(),
            ty: ty.clone(),
        });
        self.local_count += 1;
        for (i, element) in elements.iter().enumerate() {
            let value = self.lower_expr(element)?;
            let index = self.const_int(i as i128, U64);
            let elem_ptr = self.fresh();
            self.emit(Inst::IndexPtr {
                dest: elem_ptr.clone(),
                base: slot.clone(),
                index,
                elem_ty: elem_ty.clone(),
            });
            self.emit(Inst::Store {
                ptr: elem_ptr,
                value,
                ty: elem_ty.clone(),
            });
        }
        let dest = self.fresh();
        self.emit(Inst::Load {
            dest: dest.clone(),
            ptr: slot,
            ty,
        });
        Some(dest)
    }

    fn lower_range_value(&mut self, expr: &'a Expr) -> Option<ValueId> {
        let ty = self.analysis.expr_type(expr.id);
        let elem = match &ty {
            Type::Range(elem) => (**elem).clone(),
            _ => return None,
        };
        let (start_expr, end_expr, _) = range_parts(expr)?;
        let start = self.lower_expr(start_expr)?;
        let end = self.lower_expr(end_expr)?;

        let struct_name = kei_checker::types::mangle_type_name(&ty);
        let slot = self.fresh();
        self.emit(Inst::StackAlloc {
            dest: slot.clone(),
            ty: ty.clone(),
        });
        self.local_count += 1;
        for (index, (field, value)) in [("start", start), ("end", end)].into_iter().enumerate() {
            let field_ptr = self.fresh();
            self.emit(Inst::FieldPtr {
                dest: field_ptr.clone(),
                base: slot.clone(),
                struct_name: struct_name.clone(),
                field: field.to_string(),
                index,
            });
            self.emit(Inst::Store {
                ptr: field_ptr,
                value,
                ty: elem.clone(),
            });
        }
        let dest = self.fresh();
        self.emit(Inst::Load {
            dest: dest.clone(),
            ptr: slot,
            ty,
        });
        Some(dest)
    }

    /// Start/end of a range value that was not written inline.
    pub(crate) fn load_range_bounds(&mut self, range_value: ValueId, elem: &Type) -> (ValueId, ValueId) {
        let ty = Type::Range(Box::new(elem.clone()));
        let struct_name = kei_checker::types::mangle_type_name(&ty);
        let slot = self.fresh();
        self.emit(Inst::StackAlloc {
            dest: slot.clone(),
            ty: ty.clone(),
        });
        self.local_count += 1;
        self.emit(Inst::Store {
            ptr: slot.clone(),
            value: range_value,
            ty,
        });
        let mut bounds = Vec::new();
        for (index, field) in ["start", "end"].iter().enumerate() {
            let field_ptr = self.fresh();
            self.emit(Inst::FieldPtr {
                dest: field_ptr.clone(),
                base: slot.clone(),
                struct_name: struct_name.clone(),
                field: field.to_string(),
                index,
            });
            let value = self.fresh();
            self.emit(Inst::Load {
                dest: value.clone(),
                ptr: field_ptr,
                ty: elem.clone(),
            });
            bounds.push(value);
        }
        let end = bounds.pop().unwrap_or_default();
        let start = bounds.pop().unwrap_or_default();
        (start, end)
    }

    fn lower_if_expr(
        &mut self,
        expr: &'a Expr,
        cond: &'a Expr,
        then_block: &'a Block,
        else_block: Option<&'a Block>,
    ) -> Option<ValueId> {
        let ty = self.analysis.expr_type(expr.id);
        let cond_value = self.lower_expr(cond)?;
        let then_b = self.new_block("ifexpr.then");

        let else_block = match else_block {
            Some(block) => block,
            None => {
                let cont = self.new_block("ifexpr.end");
                self.set_term(Terminator::Br {
                    cond: cond_value,
                    then_block: then_b,
                    else_block: cont,
                });
                self.switch_to(then_b);
                self.lower_block_value(then_block);
                self.set_term(Terminator::Jump { target: cont });
                self.switch_to(cont);
                return None;
            }
        };

        let else_b = self.new_block("ifexpr.else");
        let end_b = self.new_block("ifexpr.end");
        self.set_term(Terminator::Br {
            cond: cond_value,
            then_block: then_b,
            else_block: else_b,
        });

        self.switch_to(then_b);
        let then_value = self.lower_block_value(then_block);
        let then_exit = self.current_block();
        let then_falls = !self.terminated;
        self.set_term(Terminator::Jump { target: end_b });

        self.switch_to(else_b);
        let else_value = self.lower_block_value(else_block);
        let else_exit = self.current_block();
        let else_falls = !self.terminated;
        self.set_term(Terminator::Jump { target: end_b });

        self.switch_to(end_b);

        // merge the branch values with a phi over the fall-through edges
        let mut incoming = Vec::new();
        if then_falls {
            incoming.push((then_value, then_exit));
        }
        if else_falls {
            incoming.push((else_value, else_exit));
        }
        if ty == Type::Void || incoming.is_empty() {
            return None;
        }
        let complete: Option<Vec<(ValueId, BlockId)>> = incoming
            .into_iter()
            .map(|(value, block)| value.map(|v| (v, block)))
            .collect();
        let incoming = complete?;
        let dest = self.fresh();
        self.blocks[end_b as usize].phis.push(Phi {
            dest: dest.clone(),
            ty,
            incoming,
        });
        Some(dest)
    }

    /// Expression block: statements plus an optional trailing value.
    pub(crate) fn lower_block_value(&mut self, block: &'a Block) -> Option<ValueId> {
        self.push_scope();
        let mut value = None;
        let last = block.stmts.len().saturating_sub(1);
        for (i, stmt) in block.stmts.iter().enumerate() {
            if self.terminated {
                break;
            }
            if i == last {
                if let StmtKind::Expr { expr, semi: false } = &stmt.kind {
                    value = self.lower_expr(expr);
                    continue;
                }
            }
            self.lower_stmt(stmt);
        }
        self.pop_scope_exit();
        value
    }

    // ==================== calls ====================

    fn lower_call(
        &mut self,
        expr: &'a Expr,
        callee: &'a Expr,
        args: &'a [Expr],
    ) -> Option<ValueId> {
        if let Some(builtin) = self.analysis.builtin_calls.get(&expr.id).cloned() {
            return self.lower_builtin(builtin, args);
        }

        // enum variant constructor
        if let ExprKind::Member { object, field } = &callee.kind {
            if let ExprKind::Identifier(enum_name) = &object.kind {
                if self.analysis.enums.contains_key(enum_name) {
                    let enum_name = enum_name.clone();
                    let field = field.clone();
                    return self.construct_enum(&enum_name, &field, args);
                }
            }
        }

        let target = self.analysis.call_targets.get(&expr.id).cloned()?;
        let sig = self.analysis.functions.get(&target).cloned()?;

        let mut values = Vec::new();
        if let ExprKind::Member { object, .. } = &callee.kind {
            values.push(self.lower_expr(object)?);
        }
        for arg in args {
            values.push(self.lower_expr(arg)?);
        }

        if !sig.throws.is_empty() {
            let (tag, out, err) = self.emit_call_throws(&target, &sig, values);
            // not under a catch: propagate into the enclosing contract
            let ok_b = self.new_block("call.ok");
            let prop_b = self.new_block("call.err");
            let zero = self.const_int(0, I32);
            let is_ok = self.fresh();
            self.emit(Inst::BinOp {
                dest: is_ok.clone(),
                op: BinOp::Eq,
                lhs: tag.clone(),
                rhs: zero,
                ty: I32,
            });
            self.set_term(Terminator::Br {
                cond: is_ok,
                then_block: ok_b,
                else_block: prop_b,
            });

            self.switch_to(prop_b);
            self.propagate_error(tag, &err, &sig.throws);

            self.switch_to(ok_b);
            if sig.ret == Type::Void {
                return None;
            }
            let result = self.fresh();
            self.emit(Inst::Load {
                dest: result.clone(),
                ptr: out,
                ty: sig.ret.clone(),
            });
            return Some(result);
        }

        if sig.is_extern {
            if sig.ret == Type::Void {
                self.emit(Inst::CallExternVoid {
                    func: target,
                    args: values,
                });
                None
            } else {
                let dest = self.fresh();
                self.emit(Inst::CallExtern {
                    dest: dest.clone(),
                    func: target,
                    args: values,
                });
                Some(dest)
            }
        } else if sig.ret == Type::Void {
            self.emit(Inst::CallVoid {
                func: target,
                args: values,
            });
            None
        } else {
            let dest = self.fresh();
            self.emit(Inst::Call {
                dest: dest.clone(),
                func: target,
                args: values,
            });
            Some(dest)
        }
    }

    /// Allocate out/err buffers and invoke through the throws protocol.
    fn emit_call_throws(
        &mut self,
        target: &str,
        sig: &FunctionSig,
        args: Vec<ValueId>,
    ) -> (ValueId, ValueId, ValueId) {
        let out = self.fresh();
        self.emit(Inst::StackAlloc {
            dest: out.clone(),
            ty: sig.ret.clone(),
        });
        self.local_count += 1;
        let err = self.fresh();
        self.emit(Inst::StackAlloc {
            dest: err.clone(),
            ty: Type::Void,
        });
        self.local_count += 1;
        let tag = self.fresh();
        self.emit(Inst::CallThrows {
            dest: tag.clone(),
            func: target.to_string(),
            args,
            out: out.clone(),
            err: err.clone(),
        });
        (tag, out, err)
    }

    /// In the current (error-path) block: copy the callee's error union
    /// into the enclosing err slot, clean up, and return the tag mapped
    /// into the enclosing throws list.
    fn propagate_error(&mut self, tag: ValueId, err: &ValueId, callee_throws: &[Type]) {
        let enclosing_err = match self.err_ptr.clone() {
            Some(err_ptr) => err_ptr,
            None => {
                self.runtime_panic("unhandled error");
                return;
            }
        };
        let union_value = self.fresh();
        self.emit(Inst::Load {
            dest: union_value.clone(),
            ptr: err.clone(),
            ty: Type::Void,
        });
        self.emit(Inst::Store {
            ptr: enclosing_err,
            value: union_value,
            ty: Type::Void,
        });
        self.emit_all_scope_exits(None);

        let mapping: Vec<(i128, i128)> = callee_throws
            .iter()
            .enumerate()
            .map(|(i, thrown)| {
                let enclosing = self
                    .throws
                    .iter()
                    .position(|t| t == thrown)
                    .unwrap_or(i);
                (i as i128 + 1, enclosing as i128 + 1)
            })
            .collect();

        if mapping.iter().all(|(from, to)| from == to) {
            self.set_term(Terminator::Ret { value: tag });
            return;
        }

        let mut cases = Vec::new();
        let mut rets = Vec::new();
        for (from, to) in mapping {
            let block = self.new_block("remap");
            cases.push((from, block));
            rets.push((block, to));
        }
        let unreachable_b = self.new_block("remap.dead");
        self.set_term(Terminator::Switch {
            value: tag,
            cases,
            default: unreachable_b,
        });
        for (block, to) in rets {
            self.switch_to(block);
            let mapped = self.const_int(to, I32);
            self.set_term(Terminator::Ret { value: mapped });
        }
        self.switch_to(unreachable_b);
        self.set_term(Terminator::Unreachable);
    }

    fn lower_builtin(&mut self, builtin: Builtin, args: &'a [Expr]) -> Option<ValueId> {
        match builtin {
            Builtin::Alloc(elem) => {
                let count = self.lower_expr(args.first()?)?;
                let size = self.fresh();
                self.emit(Inst::SizeOf {
                    dest: size.clone(),
                    ty: elem.clone(),
                });
                let total = self.fresh();
                self.emit(Inst::BinOp {
                    dest: total.clone(),
                    op: BinOp::Mul,
                    lhs: count,
                    rhs: size,
                    ty: U64,
                });
                self.runtime.insert("kei_alloc".to_string());
                let raw = self.fresh();
                self.emit(Inst::CallExtern {
                    dest: raw.clone(),
                    func: "kei_alloc".to_string(),
                    args: vec![total],
                });
                let dest = self.fresh();
                self.emit(Inst::Cast {
                    dest: dest.clone(),
                    value: raw,
                    from: Type::Ptr(Box::new(Type::Int {
                        bits: 8,
                        signed: false,
                    })),
                    to: Type::Ptr(Box::new(elem)),
                });
                Some(dest)
            }
            Builtin::Free => {
                let ptr = self.lower_expr(args.first()?)?;
                self.runtime.insert("kei_free".to_string());
                self.emit(Inst::CallExternVoid {
                    func: "kei_free".to_string(),
                    args: vec![ptr],
                });
                None
            }
            Builtin::Sizeof(ty) => {
                let dest = self.fresh();
                self.emit(Inst::SizeOf {
                    dest: dest.clone(),
                    ty,
                });
                Some(dest)
            }
            Builtin::Len => {
                let arg = args.first()?;
                let arg_ty = self.analysis.expr_type(arg.id);
                match arg_ty {
                    Type::Array {
                        len: Some(len), ..
                    } => Some(self.const_int(len as i128, U64)),
                    Type::Array { len: None, .. } | Type::Slice(_) => {
                        let (header, _) = self.lower_place(arg)?;
                        Some(self.slice_len(&header))
                    }
                    Type::Str => {
                        let value = self.lower_expr(arg)?;
                        self.runtime.insert("kei_strlen".to_string());
                        let dest = self.fresh();
                        self.emit(Inst::CallExtern {
                            dest: dest.clone(),
                            func: "kei_strlen".to_string(),
                            args: vec![value],
                        });
                        Some(dest)
                    }
                    _ => None,
                }
            }
            Builtin::Panic => {
                let message = self.lower_expr(args.first()?)?;
                self.runtime.insert("kei_panic".to_string());
                self.emit(Inst::CallExternVoid {
                    func: "kei_panic".to_string(),
                    args: vec![message],
                });
                self.set_term(Terminator::Unreachable);
                None
            }
        }
    }

    fn construct_enum(
        &mut self,
        enum_name: &str,
        variant_name: &str,
        args: &'a [Expr],
    ) -> Option<ValueId> {
        let info = self.analysis.enums.get(enum_name)?.clone();
        let variant = info.variants.iter().find(|v| v.name == variant_name)?.clone();

        let enum_ty = Type::Enum {
            name: enum_name.to_string(),
        };
        let slot = self.fresh();
        self.emit(Inst::StackAlloc {
            dest: slot.clone(),
            ty: enum_ty.clone(),
        });
        self.local_count += 1;

        let tag_ptr = self.fresh();
        self.emit(Inst::FieldPtr {
            dest: tag_ptr.clone(),
            base: slot.clone(),
            struct_name: enum_name.to_string(),
            field: "tag".to_string(),
            index: 0,
        });
        let tag_value = self.const_int(variant.tag as i128, info.base.clone());
        self.emit(Inst::Store {
            ptr: tag_ptr,
            value: tag_value,
            ty: info.base.clone(),
        });

        for (index, (arg, field_ty)) in args.iter().zip(&variant.fields).enumerate() {
            let value = self.lower_expr(arg)?;
            let payload_ptr = self.fresh();
            self.emit(Inst::FieldPtr {
                dest: payload_ptr.clone(),
                base: slot.clone(),
                struct_name: enum_name.to_string(),
                field: format!("{}.v{}", variant.name, index),
                index: index + 1,
            });
            self.emit(Inst::Store {
                ptr: payload_ptr,
                value,
                ty: field_ty.clone(),
            });
        }

        let dest = self.fresh();
        self.emit(Inst::Load {
            dest: dest.clone(),
            ptr: slot,
            ty: enum_ty,
        });
        Some(dest)
    }

    /// Enum unit-variant value in expression position (`Color.Red`).
    pub(crate) fn lower_enum_unit(
        &mut self,
        enum_name: &str,
        variant_name: &str,
    ) -> Option<ValueId> {
        self.construct_enum(enum_name, variant_name, &[])
    }

    // ==================== catch ====================

    fn lower_catch(&mut self, operand: &'a Expr, handler: &'a CatchHandler) -> Option<ValueId> {
        let call = unwrap_call(operand)?;
        let (call_expr, callee, args) = call;
        let target = self.analysis.call_targets.get(&call_expr.id).cloned()?;
        let sig = self.analysis.functions.get(&target).cloned()?;
        if sig.throws.is_empty() {
            return self.lower_expr(operand);
        }

        let mut values = Vec::new();
        if let ExprKind::Member { object, .. } = &callee.kind {
            values.push(self.lower_expr(object)?);
        }
        for arg in args {
            values.push(self.lower_expr(arg)?);
        }
        let (tag, out, err) = self.emit_call_throws(&target, &sig, values);

        let result_slot = if sig.ret != Type::Void {
            let slot = self.fresh();
            self.emit(Inst::StackAlloc {
                dest: slot.clone(),
                ty: sig.ret.clone(),
            });
            self.local_count += 1;
            Some(slot)
        } else {
            None
        };

        let ok_b = self.new_block("catch.ok");
        let end_b = self.new_block("catch.end");

        match handler {
            CatchHandler::Panic => {
                let fail_b = self.new_block("catch.panic");
                self.branch_on_ok(&tag, ok_b, fail_b);
                self.switch_to(fail_b);
                self.runtime_panic("uncaught error");
            }
            CatchHandler::Rethrow => {
                let fail_b = self.new_block("catch.rethrow");
                self.branch_on_ok(&tag, ok_b, fail_b);
                self.switch_to(fail_b);
                self.propagate_error(tag.clone(), &err, &sig.throws);
            }
            CatchHandler::Block { arms } => {
                // one block per arm; several tags may share the default
                let mut arm_blocks = Vec::new();
                for arm in arms {
                    arm_blocks.push((self.new_block("catch.arm"), arm));
                }
                let dead_b = self.new_block("catch.dead");

                let mut cases = vec![(0i128, ok_b)];
                let default_b = arms
                    .iter()
                    .position(|arm| arm.error_type.is_none())
                    .map(|i| arm_blocks[i].0)
                    .unwrap_or(dead_b);
                for (i, thrown) in sig.throws.iter().enumerate() {
                    let thrown_name = nominal_name(thrown);
                    if let Some(pos) = arms
                        .iter()
                        .position(|arm| arm.error_type.as_deref() == Some(thrown_name.as_str()))
                    {
                        cases.push((i as i128 + 1, arm_blocks[pos].0));
                    }
                }
                self.set_term(Terminator::Switch {
                    value: tag.clone(),
                    cases,
                    default: default_b,
                });

                for (block, arm) in arm_blocks {
                    self.switch_to(block);
                    self.push_scope();
                    let binding_ty = arm
                        .error_type
                        .as_deref()
                        .and_then(|name| {
                            sig.throws.iter().find(|t| nominal_name(t) == name).cloned()
                        })
                        .unwrap_or(Type::Void);
                    let bound = self.fresh();
                    self.emit(Inst::Load {
                        dest: bound.clone(),
                        ptr: err.clone(),
                        ty: binding_ty.clone(),
                    });
                    let slot = self.fresh();
                    self.emit(Inst::StackAlloc {
                        dest: slot.clone(),
                        ty: binding_ty.clone(),
                    });
                    self.local_count += 1;
                    self.emit(Inst::Store {
                        ptr: slot.clone(),
                        value: bound,
                        ty: binding_ty.clone(),
                    });
                    self.declare_var(&arm.binding, slot, binding_ty, true);
                    self.lower_block_stmts(&arm.body);
                    self.pop_scope_exit();
                    self.set_term(Terminator::Jump { target: end_b });
                }

                self.switch_to(dead_b);
                self.set_term(Terminator::Unreachable);
            }
        }

        self.switch_to(ok_b);
        if let Some(slot) = &result_slot {
            let success = self.fresh();
            self.emit(Inst::Load {
                dest: success.clone(),
                ptr: out,
                ty: sig.ret.clone(),
            });
            self.emit(Inst::Store {
                ptr: slot.clone(),
                value: success,
                ty: sig.ret.clone(),
            });
        }
        self.set_term(Terminator::Jump { target: end_b });

        self.switch_to(end_b);
        result_slot.map(|slot| {
            let dest = self.fresh();
            self.emit(Inst::Load {
                dest: dest.clone(),
                ptr: slot,
                ty: sig.ret.clone(),
            });
            dest
        })
    }

    fn branch_on_ok(&mut self, tag: &ValueId, ok_b: BlockId, fail_b: BlockId) {
        let zero = self.const_int(0, I32);
        let is_ok = self.fresh();
        self.emit(Inst::BinOp {
            dest: is_ok.clone(),
            op: BinOp::Eq,
            lhs: tag.clone(),
            rhs: zero,
            ty: I32,
        });
        self.set_term(Terminator::Br {
            cond: is_ok,
            then_block: ok_b,
            else_block: fail_b,
        });
    }
}

fn bin_op_of(op: BinaryOp) -> BinOp {
    match op {
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Sub => BinOp::Sub,
        BinaryOp::Mul => BinOp::Mul,
        BinaryOp::Div => BinOp::Div,
        BinaryOp::Mod => BinOp::Mod,
        BinaryOp::Shl => BinOp::Shl,
        BinaryOp::Shr => BinOp::Shr,
        BinaryOp::Lt => BinOp::Lt,
        BinaryOp::LtEq => BinOp::Lte,
        BinaryOp::Gt => BinOp::Gt,
        BinaryOp::GtEq => BinOp::Gte,
        BinaryOp::EqEq => BinOp::Eq,
        BinaryOp::NotEq => BinOp::Neq,
        BinaryOp::BitAnd => BinOp::BitAnd,
        BinaryOp::BitXor => BinOp::BitXor,
        BinaryOp::BitOr => BinOp::BitOr,
        BinaryOp::And => BinOp::And,
        BinaryOp::Or => BinOp::Or,
    }
}

fn nominal_name(ty: &Type) -> String {
    match ty {
        Type::Struct { name } | Type::Enum { name } => name.clone(),
        other => other.to_string(),
    }
}

fn unwrap_call(expr: &Expr) -> Option<(&Expr, &Expr, &[Expr])> {
    match &expr.kind {
        ExprKind::Call { callee, args, .. } => Some((expr, callee, args)),
        ExprKind::Group(inner) => unwrap_call(inner),
        _ => None,
    }
}
