// Expression checking: name resolution, operators, calls with overload
// resolution and monomorphization, member access, the throws/catch
// contract, move analysis, and unsafe gating.

use super::*;
use crate::scope::Symbol;

impl Checker<'_> {
    pub(crate) fn check_expr(&mut self, expr: &Expr) -> Type {
        let ty = self.check_expr_inner(expr);
        self.record(expr.id, ty)
    }

    /// Errors caused by unresolved type parameters are suppressed inside
    /// generic templates; instances are re-checked with concrete types.
    pub(crate) fn suppressed(&self, tys: &[&Type]) -> bool {
        self.in_template && tys.iter().any(|t| t.is_generic_dependent())
    }

    fn check_expr_inner(&mut self, expr: &Expr) -> Type {
        match &expr.kind {
            ExprKind::IntLiteral { value, suffix } => self.check_int_literal(expr, *value, suffix),
            ExprKind::FloatLiteral { suffix, .. } => match suffix.as_deref() {
                Some("f32") => F32,
                _ => F64,
            },
            ExprKind::StringLiteral(_) => Type::Str,
            ExprKind::BoolLiteral(_) => Type::Bool,
            ExprKind::NullLiteral => Type::Null,
            ExprKind::Identifier(name) => self.check_identifier(expr, name),
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(expr, *op, lhs, rhs),
            ExprKind::Unary { op, operand } => self.check_unary(expr, *op, operand),
            ExprKind::Assign { op, target, value } => {
                self.check_assign(expr, *op, target, value)
            }
            ExprKind::Call {
                callee,
                type_args,
                args,
            } => self.check_call(expr, callee, type_args, args),
            ExprKind::Member { object, field } => self.check_member(expr, object, field),
            ExprKind::Index { object, index } => self.check_index(object, index),
            ExprKind::Deref(inner) => self.check_deref(expr, inner),
            ExprKind::StructLiteral {
                name,
                type_args,
                fields,
            } => self.check_struct_literal(expr, name, type_args, fields),
            ExprKind::If {
                cond,
                then_block,
                else_block,
            } => self.check_if_expr(expr, cond, then_block, else_block.as_ref()),
            ExprKind::Move(inner) => self.check_move(expr, inner),
            ExprKind::Throw(inner) => self.check_throw(inner),
            ExprKind::Catch { operand, handler } => self.check_catch(operand, handler),
            ExprKind::Group(inner) => self.check_expr(inner),
            ExprKind::Increment(inner) => self.check_step(expr, inner, "++"),
            ExprKind::Decrement(inner) => self.check_step(expr, inner, "--"),
            ExprKind::Range {
                start,
                end,
                inclusive: _,
            } => self.check_range(start, end),
            ExprKind::Unsafe(block) => self.check_block_value(block, true),
            ExprKind::Cast { expr: inner, ty } => self.check_cast(expr, inner, ty),
            ExprKind::ArrayLiteral(elements) => self.check_array_literal(expr, elements),
        }
    }

    fn check_int_literal(&mut self, expr: &Expr, value: u128, suffix: &Option<String>) -> Type {
        match suffix.as_deref().and_then(suffix_type) {
            Some(ty) => {
                if !int_literal_fits(value, false, &ty) {
                    self.error_at(
                        error_codes::LITERAL_OUT_OF_RANGE,
                        expr.span,
                        format!("integer literal out of range for type {}", ty),
                    );
                }
                ty
            }
            None => {
                if int_literal_fits(value, false, &I32) {
                    I32
                } else if int_literal_fits(value, false, &I64) {
                    I64
                } else if int_literal_fits(value, false, &U64) {
                    U64
                } else {
                    self.error_at(
                        error_codes::LITERAL_OUT_OF_RANGE,
                        expr.span,
                        "integer literal too large for any integer type".to_string(),
                    );
                    Type::Error
                }
            }
        }
    }

    fn check_identifier(&mut self, expr: &Expr, name: &str) -> Type {
        match self.scopes.lookup(name).cloned() {
            Some(Symbol::Variable { ty, moved, .. }) => {
                if moved {
                    self.error_at(
                        error_codes::USE_AFTER_MOVE,
                        expr.span,
                        format!("use of moved variable '{}'", name),
                    );
                }
                ty
            }
            Some(Symbol::Function { overloads }) => overloads
                .into_iter()
                .next()
                .map(|sig| Type::Function(Box::new(sig)))
                .unwrap_or(Type::Error),
            Some(Symbol::Module { name }) => Type::Module { name },
            None => {
                let candidates = self.scopes.visible_names();
                let suggestions =
                    kei_diagnostics::fuzzy::find_similar_names(name, &candidates, 0.75, 1);
                let mut message = format!("Undefined variable '{}'", name);
                if let Some(hint) = suggestions.first() {
                    message.push_str(&format!(" (did you mean '{}'?)", hint));
                }
                self.error_at(error_codes::UNDEFINED_NAME, expr.span, message);
                Type::Error
            }
        }
    }

    // ==================== operators ====================

    fn check_binary(&mut self, expr: &Expr, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Type {
        let lt = self.check_expr(lhs);
        let rt = self.check_expr(rhs);
        if lt.is_error() || rt.is_error() || self.suppressed(&[&lt, &rt]) {
            return if op.is_comparison() || op.is_logical() {
                Type::Bool
            } else {
                Type::Error
            };
        }

        use BinaryOp::*;
        match op {
            And | Or => {
                if lt != Type::Bool || rt != Type::Bool {
                    self.type_error(expr.span, &lt, &rt, op);
                }
                Type::Bool
            }
            EqEq | NotEq => {
                if !self.comparable(lhs, &lt, rhs, &rt) {
                    self.type_error(expr.span, &lt, &rt, op);
                }
                Type::Bool
            }
            Lt | LtEq | Gt | GtEq => {
                if self.unify_numeric(lhs, &lt, rhs, &rt).is_none() {
                    self.type_error(expr.span, &lt, &rt, op);
                }
                Type::Bool
            }
            Add | Sub => {
                // raw pointer arithmetic, gated on unsafe
                if let (Type::Ptr(_), Type::Int { .. }) = (&lt, &rt) {
                    self.require_unsafe(expr.span, "raw pointer arithmetic");
                    return lt;
                }
                match self.unify_numeric(lhs, &lt, rhs, &rt) {
                    Some(ty) => ty,
                    None => {
                        self.type_error(expr.span, &lt, &rt, op);
                        Type::Error
                    }
                }
            }
            Mul | Div => match self.unify_numeric(lhs, &lt, rhs, &rt) {
                Some(ty) => ty,
                None => {
                    self.type_error(expr.span, &lt, &rt, op);
                    Type::Error
                }
            },
            Mod | BitAnd | BitOr | BitXor => {
                match self.unify_numeric(lhs, &lt, rhs, &rt) {
                    Some(ty) if ty.is_int() => ty,
                    _ => {
                        self.type_error(expr.span, &lt, &rt, op);
                        Type::Error
                    }
                }
            }
            Shl | Shr => {
                if lt.is_int() && rt.is_int() {
                    lt
                } else {
                    self.type_error(expr.span, &lt, &rt, op);
                    Type::Error
                }
            }
        }
    }

    fn type_error(&mut self, span: Span, lt: &Type, rt: &Type, op: BinaryOp) {
        self.error_at(
            error_codes::TYPE_MISMATCH,
            span,
            format!(
                "mismatched types {} and {} for operator '{}'",
                lt,
                rt,
                op.symbol()
            ),
        );
    }

    /// Operands of an arithmetic/comparison operator: equal types, or an
    /// untyped literal adopting the other side's numeric type.
    fn unify_numeric(&self, le: &Expr, lt: &Type, re: &Expr, rt: &Type) -> Option<Type> {
        if lt == rt && lt.is_numeric() {
            return Some(lt.clone());
        }
        if self.literal_adopts(le, lt, rt) {
            return Some(rt.clone());
        }
        if self.literal_adopts(re, rt, lt) {
            return Some(lt.clone());
        }
        None
    }

    /// Can `expr` (typed `from` by default) adopt the type `to`?
    fn literal_adopts(&self, expr: &Expr, from: &Type, to: &Type) -> bool {
        if !to.is_numeric() {
            return false;
        }
        match literal_shape(expr) {
            Some(LiteralShape::Int { value, negated }) => {
                from.is_int() && int_literal_fits(value, negated, to)
            }
            Some(LiteralShape::Float) => from.is_float() && float_literal_fits(to),
            None => false,
        }
    }

    fn comparable(&self, le: &Expr, lt: &Type, re: &Expr, rt: &Type) -> bool {
        if self.unify_numeric(le, lt, re, rt).is_some() {
            return true;
        }
        match (lt, rt) {
            (Type::Bool, Type::Bool)
            | (Type::Str, Type::Str)
            | (Type::CChar, Type::CChar)
            | (Type::Ptr(_), Type::Null)
            | (Type::Null, Type::Ptr(_)) => true,
            (Type::Ptr(a), Type::Ptr(b)) => a == b,
            (Type::Enum { name: a }, Type::Enum { name: b }) => a == b,
            _ => false,
        }
    }

    fn check_unary(&mut self, expr: &Expr, op: UnaryOp, operand: &Expr) -> Type {
        let ty = self.check_expr(operand);
        if ty.is_error() || self.suppressed(&[&ty]) {
            return Type::Error;
        }
        match op {
            UnaryOp::Not => {
                if ty != Type::Bool {
                    self.error_at(
                        error_codes::TYPE_MISMATCH,
                        expr.span,
                        format!("operator '!' requires 'bool', found {}", ty),
                    );
                }
                Type::Bool
            }
            UnaryOp::BitNot => {
                if !ty.is_int() {
                    self.error_at(
                        error_codes::TYPE_MISMATCH,
                        expr.span,
                        format!("operator '~' requires an integer type, found {}", ty),
                    );
                    return Type::Error;
                }
                ty
            }
            UnaryOp::Neg => {
                let ok = matches!(&ty, Type::Int { signed: true, .. } | Type::Float { .. });
                if !ok {
                    self.error_at(
                        error_codes::TYPE_MISMATCH,
                        expr.span,
                        format!("cannot negate a value of type {}", ty),
                    );
                    return Type::Error;
                }
                ty
            }
            UnaryOp::AddrOf => Type::Ptr(Box::new(ty)),
        }
    }

    fn check_assign(
        &mut self,
        expr: &Expr,
        op: Option<BinaryOp>,
        target: &Expr,
        value: &Expr,
    ) -> Type {
        let target_ty = self.check_assign_target(target);
        let value_ty = self.check_expr(value);

        if target_ty.is_error() || self.suppressed(&[&target_ty, &value_ty]) {
            return target_ty;
        }

        match op {
            None => {
                if !self.assignable_with_literal(value, &value_ty, &target_ty) {
                    if self.is_int_literal_overflow(value, &value_ty, &target_ty) {
                        self.error_at(
                            error_codes::LITERAL_OUT_OF_RANGE,
                            value.span,
                            format!("integer literal out of range for type {}", target_ty),
                        );
                    } else {
                        self.error_at(
                            error_codes::TYPE_MISMATCH,
                            expr.span,
                            format!("cannot assign {} to {}", value_ty, target_ty),
                        );
                    }
                }
            }
            Some(op) => {
                // compound assignment desugars to the binary operator
                let valid = match op {
                    BinaryOp::Shl | BinaryOp::Shr => {
                        target_ty.is_int() && value_ty.is_int()
                    }
                    BinaryOp::Mod | BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                        target_ty.is_int()
                            && self
                                .unify_numeric(target, &target_ty, value, &value_ty)
                                .is_some()
                    }
                    _ => self
                        .unify_numeric(target, &target_ty, value, &value_ty)
                        .is_some(),
                };
                if !valid {
                    self.error_at(
                        error_codes::TYPE_MISMATCH,
                        expr.span,
                        format!(
                            "invalid compound assignment '{}=' between {} and {}",
                            op.symbol(),
                            target_ty,
                            value_ty
                        ),
                    );
                }
            }
        }

        // re-initializing a moved variable makes it live again
        if op.is_none() {
            if let Some(name) = target.as_identifier() {
                self.scopes.mark_moved(name, false);
            }
        }

        target_ty
    }

    /// Validate an lvalue and return its type.
    fn check_assign_target(&mut self, target: &Expr) -> Type {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let info = match self.scopes.lookup(name) {
                    Some(Symbol::Variable { ty, is_mut, .. }) => Some((ty.clone(), *is_mut)),
                    _ => None,
                };
                match info {
                    Some((ty, is_mut)) => {
                        if !is_mut {
                            self.error_at(
                                error_codes::IMMUTABLE_ASSIGN,
                                target.span,
                                format!("cannot assign to immutable variable '{}'", name),
                            );
                        }
                        self.record(target.id, ty.clone());
                        ty
                    }
                    None => self.check_expr(target),
                }
            }
            ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::Deref(_) => {
                self.check_expr(target)
            }
            ExprKind::Group(inner) => {
                let ty = self.check_assign_target(inner);
                self.record(target.id, ty.clone());
                ty
            }
            _ => {
                self.error_at(
                    error_codes::TYPE_MISMATCH,
                    target.span,
                    "invalid assignment target".to_string(),
                );
                self.check_expr(target)
            }
        }
    }

    fn check_step(&mut self, expr: &Expr, operand: &Expr, symbol: &str) -> Type {
        let ty = self.check_assign_target(operand);
        self.record(operand.id, ty.clone());
        if !ty.is_error() && !ty.is_int() && !self.suppressed(&[&ty]) {
            self.error_at(
                error_codes::TYPE_MISMATCH,
                expr.span,
                format!("operator '{}' requires an integer type, found {}", symbol, ty),
            );
            return Type::Error;
        }
        ty
    }

    fn check_range(&mut self, start: &Expr, end: &Expr) -> Type {
        let st = self.check_expr(start);
        let et = self.check_expr(end);
        if st.is_error() || et.is_error() {
            return Type::Range(Box::new(Type::Error));
        }
        match self.unify_numeric(start, &st, end, &et) {
            Some(ty) if ty.is_int() => Type::Range(Box::new(ty)),
            _ => {
                self.error_at(
                    error_codes::TYPE_MISMATCH,
                    start.span.to(end.span),
                    format!("range bounds must be matching integers, found {} and {}", st, et),
                );
                Type::Range(Box::new(Type::Error))
            }
        }
    }

    // ==================== member / index / deref ====================

    fn check_member(&mut self, expr: &Expr, object: &Expr, field: &str) -> Type {
        // `Enum.Variant` — the object names a type, not a value
        if let ExprKind::Identifier(name) = &object.kind {
            if let Some(info) = self.enums.get(name).cloned() {
                self.record(object.id, Type::Enum { name: name.clone() });
                return match info.variants.iter().find(|v| v.name == *field) {
                    Some(_) => Type::Enum { name: name.clone() },
                    None => {
                        self.error_at(
                            error_codes::NO_SUCH_FIELD,
                            expr.span,
                            format!("enum '{}' has no variant '{}'", name, field),
                        );
                        Type::Error
                    }
                };
            }
        }

        let object_ty = self.check_expr(object);
        match &object_ty {
            Type::Struct { name } => {
                let info = match self.structs.get(name) {
                    Some(info) => info.clone(),
                    None => return Type::Error,
                };
                if let Some((_, field_ty)) = info.fields.iter().find(|(f, _)| f == field) {
                    return field_ty.clone();
                }
                if let Some(sig) = info.methods.get(field) {
                    return Type::Function(Box::new(sig.clone()));
                }
                let field_names: Vec<String> =
                    info.fields.iter().map(|(f, _)| f.clone()).collect();
                let suggestions =
                    kei_diagnostics::fuzzy::find_similar_names(field, &field_names, 0.75, 1);
                let mut message = format!("no field or method '{}' on type {}", field, name);
                if let Some(hint) = suggestions.first() {
                    message.push_str(&format!(" (did you mean '{}'?)", hint));
                }
                self.error_at(error_codes::NO_SUCH_FIELD, expr.span, message);
                Type::Error
            }
            Type::Module { .. } => Type::Error,
            Type::Error => Type::Error,
            other if self.suppressed(&[other]) => Type::Error,
            other => {
                self.error_at(
                    error_codes::NO_SUCH_FIELD,
                    expr.span,
                    format!("type {} has no fields", other),
                );
                Type::Error
            }
        }
    }

    fn check_index(&mut self, object: &Expr, index: &Expr) -> Type {
        let object_ty = self.check_expr(object);
        let index_ty = self.check_expr(index);
        if !index_ty.is_error() && !index_ty.is_int() && !self.suppressed(&[&index_ty]) {
            self.error_at(
                error_codes::TYPE_MISMATCH,
                index.span,
                format!("index must be an integer, found {}", index_ty),
            );
        }
        match object_ty {
            Type::Array { elem, .. } => *elem,
            Type::Slice(elem) => *elem,
            Type::Str => Type::CChar,
            Type::Ptr(pointee) => {
                self.require_unsafe(object.span, "raw pointer indexing");
                *pointee
            }
            Type::Error => Type::Error,
            other if self.suppressed(&[&other]) => Type::Error,
            other => {
                self.error_at(
                    error_codes::TYPE_MISMATCH,
                    object.span,
                    format!("cannot index a value of type {}", other),
                );
                Type::Error
            }
        }
    }

    fn check_deref(&mut self, expr: &Expr, inner: &Expr) -> Type {
        let ty = self.check_expr(inner);
        match ty {
            Type::Ptr(pointee) => {
                self.require_unsafe(expr.span, "raw pointer dereference");
                *pointee
            }
            Type::Error => Type::Error,
            other if self.suppressed(&[&other]) => Type::Error,
            other => {
                self.error_at(
                    error_codes::TYPE_MISMATCH,
                    expr.span,
                    format!("cannot dereference a value of type {}", other),
                );
                Type::Error
            }
        }
    }

    pub(crate) fn require_unsafe(&mut self, span: Span, what: &str) {
        if !self.scopes.inside_unsafe() {
            self.error_at(
                error_codes::UNSAFE_REQUIRED,
                span,
                format!("{} requires an unsafe block", what),
            );
        }
    }

    // ==================== calls ====================

    fn check_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        type_args: &[TypeExpr],
        args: &[Expr],
    ) -> Type {
        let arg_types: Vec<Type> = args.iter().map(|a| self.check_expr(a)).collect();

        match &callee.kind {
            ExprKind::Identifier(name) => {
                let symbol = self.scopes.lookup(name).cloned();
                match symbol {
                    Some(Symbol::Function { overloads }) => self.check_named_call(
                        expr, callee, name, &overloads, type_args, args, &arg_types,
                    ),
                    Some(Symbol::Module { .. }) => {
                        self.record(callee.id, Type::Error);
                        Type::Error
                    }
                    Some(Symbol::Variable { ty: Type::Error, .. }) => {
                        self.record(callee.id, Type::Error);
                        Type::Error
                    }
                    Some(Symbol::Variable { ty, .. }) => {
                        self.record(callee.id, ty);
                        self.error_at(
                            error_codes::NOT_CALLABLE,
                            callee.span,
                            format!("'{}' is not a function", name),
                        );
                        Type::Error
                    }
                    None => self.check_builtin_call(expr, callee, name, type_args, args, &arg_types),
                }
            }
            ExprKind::Member { object, field } => {
                self.check_method_call(expr, callee, object, field, args, &arg_types)
            }
            _ => {
                let callee_ty = self.check_expr(callee);
                if !callee_ty.is_error() {
                    self.error_at(
                        error_codes::NOT_CALLABLE,
                        callee.span,
                        "expression is not callable".to_string(),
                    );
                }
                Type::Error
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_named_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        name: &str,
        overloads: &[FunctionSig],
        type_args: &[TypeExpr],
        args: &[Expr],
        arg_types: &[Type],
    ) -> Type {
        // generic function: explicit args or inference, then instantiate
        if overloads.len() == 1 && !overloads[0].generic_params.is_empty() {
            return self.check_generic_call(
                expr,
                callee,
                name,
                &overloads[0].clone(),
                type_args,
                args,
                arg_types,
            );
        }

        if !type_args.is_empty() {
            self.error_at(
                error_codes::ARITY_MISMATCH,
                expr.span,
                format!("function '{}' takes no type arguments", name),
            );
        }

        let index = match self.resolve_overload(expr.span, name, overloads, args, arg_types) {
            Some(index) => index,
            None => {
                self.record(callee.id, Type::Error);
                return Type::Error;
            }
        };
        let sig = overloads[index].clone();
        self.record(callee.id, Type::Function(Box::new(sig.clone())));

        let kir_name = self
            .fn_overload_names
            .get(name)
            .and_then(|names| names.get(index))
            .cloned()
            .unwrap_or_else(|| name.to_string());
        self.call_targets.insert(expr.id, kir_name);

        if sig.is_extern {
            self.require_unsafe(expr.span, &format!("call to extern function '{}'", name));
        }
        self.enforce_throws(expr, name, &sig.throws);
        sig.ret
    }

    #[allow(clippy::too_many_arguments)]
    fn check_generic_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        name: &str,
        template_sig: &FunctionSig,
        type_args: &[TypeExpr],
        args: &[Expr],
        arg_types: &[Type],
    ) -> Type {
        let params = &template_sig.generic_params;
        let resolved_args: Vec<Type> = if type_args.is_empty() {
            // inference: traverse declared and provided types in parallel
            let mut map = HashMap::new();
            for (param, arg_ty) in template_sig.params.iter().zip(arg_types) {
                self.infer_type_args(&param.ty, arg_ty, &mut map);
            }
            let mut resolved = Vec::new();
            for param in params {
                match map.get(param) {
                    Some(ty) => resolved.push(ty.clone()),
                    None => {
                        if self.in_template {
                            return Type::Error;
                        }
                        self.diags.emit(
                            kei_diagnostics::Diagnostic::error(
                                error_codes::CANNOT_INFER,
                                format!(
                                    "cannot infer type parameter '{}' for call to '{}'",
                                    param, name
                                ),
                                self.location(expr.span),
                            )
                            .with_help(format!(
                                "specify the type arguments explicitly: {}<...>(...)",
                                name
                            )),
                        );
                        return Type::Error;
                    }
                }
            }
            resolved
        } else {
            if type_args.len() != params.len() {
                self.error_at(
                    error_codes::ARITY_MISMATCH,
                    expr.span,
                    format!(
                        "'{}' takes {} type argument{}, found {}",
                        name,
                        params.len(),
                        if params.len() == 1 { "" } else { "s" },
                        type_args.len()
                    ),
                );
                return Type::Error;
            }
            type_args.iter().map(|t| self.resolve_type(t)).collect()
        };

        if resolved_args.iter().any(Type::is_error) {
            return Type::Error;
        }
        if resolved_args.iter().any(Type::is_generic_dependent) {
            // inside a template: instances resolve this when re-checked
            return Type::Error;
        }

        let sig = self.instantiate_function(name, template_sig, &resolved_args, expr.id);
        self.record(callee.id, Type::Function(Box::new(sig.clone())));
        self.check_arg_types(expr.span, name, &sig, args, arg_types);
        self.enforce_throws(expr, name, &sig.throws);
        sig.ret
    }

    fn check_method_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        object: &Expr,
        field: &str,
        args: &[Expr],
        arg_types: &[Type],
    ) -> Type {
        // enum variant constructor: Shape.Circle(1.0)
        if let ExprKind::Identifier(name) = &object.kind {
            if let Some(info) = self.enums.get(name).cloned() {
                self.record(object.id, Type::Enum { name: name.clone() });
                let enum_ty = Type::Enum { name: name.clone() };
                self.record(callee.id, enum_ty.clone());
                match info.variants.iter().find(|v| v.name == *field) {
                    Some(variant) => {
                        if variant.fields.len() != args.len() {
                            self.error_at(
                                error_codes::ARITY_MISMATCH,
                                expr.span,
                                format!(
                                    "variant '{}' takes {} argument{}, found {}",
                                    field,
                                    variant.fields.len(),
                                    if variant.fields.len() == 1 { "" } else { "s" },
                                    args.len()
                                ),
                            );
                        }
                        for ((arg, arg_ty), field_ty) in
                            args.iter().zip(arg_types).zip(&variant.fields)
                        {
                            if !self.assignable_with_literal(arg, arg_ty, field_ty) {
                                self.error_at(
                                    error_codes::TYPE_MISMATCH,
                                    arg.span,
                                    format!(
                                        "variant field expects {}, found {}",
                                        field_ty, arg_ty
                                    ),
                                );
                            }
                        }
                        return enum_ty;
                    }
                    None => {
                        self.error_at(
                            error_codes::NO_SUCH_FIELD,
                            expr.span,
                            format!("enum '{}' has no variant '{}'", name, field),
                        );
                        return Type::Error;
                    }
                }
            }
        }

        let object_ty = self.check_expr(object);
        let struct_name = match &object_ty {
            Type::Struct { name } => name.clone(),
            Type::Module { .. } | Type::Error => {
                self.record(callee.id, Type::Error);
                return Type::Error;
            }
            other if self.suppressed(&[other]) => {
                self.record(callee.id, Type::Error);
                return Type::Error;
            }
            other => {
                self.error_at(
                    error_codes::NO_SUCH_METHOD,
                    callee.span,
                    format!("type {} has no methods", other),
                );
                self.record(callee.id, Type::Error);
                return Type::Error;
            }
        };

        let sig = match self
            .structs
            .get(&struct_name)
            .and_then(|info| info.methods.get(field))
            .cloned()
        {
            Some(sig) => sig,
            None => {
                self.error_at(
                    error_codes::NO_SUCH_METHOD,
                    callee.span,
                    format!("no method '{}' on type {}", field, struct_name),
                );
                self.record(callee.id, Type::Error);
                return Type::Error;
            }
        };
        self.record(callee.id, Type::Function(Box::new(sig.clone())));

        // first parameter is the receiver
        let expected = sig.params.len().saturating_sub(1);
        if args.len() != expected {
            self.error_at(
                error_codes::ARITY_MISMATCH,
                expr.span,
                format!(
                    "method '{}' takes {} argument{}, found {}",
                    field,
                    expected,
                    if expected == 1 { "" } else { "s" },
                    args.len()
                ),
            );
        } else {
            for ((arg, arg_ty), param) in args.iter().zip(arg_types).zip(sig.params.iter().skip(1))
            {
                if !self.assignable_with_literal(arg, arg_ty, &param.ty) {
                    self.error_at(
                        error_codes::TYPE_MISMATCH,
                        arg.span,
                        format!(
                            "argument '{}' expects {}, found {}",
                            param.name, param.ty, arg_ty
                        ),
                    );
                }
            }
        }

        self.call_targets
            .insert(expr.id, method_kir_name(&struct_name, field));
        self.enforce_throws(expr, field, &sig.throws);
        sig.ret
    }

    fn check_builtin_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        name: &str,
        type_args: &[TypeExpr],
        args: &[Expr],
        arg_types: &[Type],
    ) -> Type {
        let resolved_type_args: Vec<Type> =
            type_args.iter().map(|t| self.resolve_type(t)).collect();

        let ret = match name {
            "alloc" => {
                self.require_unsafe(expr.span, "call to 'alloc'");
                let elem = match resolved_type_args.as_slice() {
                    [ty] => ty.clone(),
                    _ => {
                        self.error_at(
                            error_codes::ARITY_MISMATCH,
                            expr.span,
                            "'alloc' takes exactly one type argument".to_string(),
                        );
                        Type::Error
                    }
                };
                if args.len() != 1 || !arg_types.first().map(Type::is_int).unwrap_or(false) {
                    self.error_at(
                        error_codes::ARITY_MISMATCH,
                        expr.span,
                        "'alloc' takes one integer count argument".to_string(),
                    );
                }
                self.builtin_calls.insert(expr.id, Builtin::Alloc(elem.clone()));
                Type::Ptr(Box::new(elem))
            }
            "free" => {
                self.require_unsafe(expr.span, "call to 'free'");
                if args.len() != 1 || !arg_types.first().map(Type::is_ptr).unwrap_or(false) {
                    self.error_at(
                        error_codes::ARITY_MISMATCH,
                        expr.span,
                        "'free' takes one pointer argument".to_string(),
                    );
                }
                self.builtin_calls.insert(expr.id, Builtin::Free);
                Type::Void
            }
            "sizeof" => {
                let ty = match resolved_type_args.as_slice() {
                    [ty] => ty.clone(),
                    _ => {
                        self.error_at(
                            error_codes::ARITY_MISMATCH,
                            expr.span,
                            "'sizeof' takes exactly one type argument".to_string(),
                        );
                        Type::Error
                    }
                };
                if !args.is_empty() {
                    self.error_at(
                        error_codes::ARITY_MISMATCH,
                        expr.span,
                        "'sizeof' takes no value arguments".to_string(),
                    );
                }
                self.builtin_calls.insert(expr.id, Builtin::Sizeof(ty));
                U64
            }
            "len" => {
                let ok = matches!(
                    arg_types.first(),
                    Some(Type::Array { .. }) | Some(Type::Slice(_)) | Some(Type::Str)
                        | Some(Type::Error)
                );
                if args.len() != 1 || !ok {
                    self.error_at(
                        error_codes::ARITY_MISMATCH,
                        expr.span,
                        "'len' takes one array, slice, or string argument".to_string(),
                    );
                }
                self.builtin_calls.insert(expr.id, Builtin::Len);
                U64
            }
            "panic" => {
                if args.len() != 1 || !matches!(arg_types.first(), Some(Type::Str) | Some(Type::Error))
                {
                    self.error_at(
                        error_codes::ARITY_MISMATCH,
                        expr.span,
                        "'panic' takes one string argument".to_string(),
                    );
                }
                self.builtin_calls.insert(expr.id, Builtin::Panic);
                Type::Void
            }
            _ => {
                let candidates = self.scopes.visible_names();
                let suggestions =
                    kei_diagnostics::fuzzy::find_similar_names(name, &candidates, 0.75, 1);
                let mut message = format!("Undefined function '{}'", name);
                if let Some(hint) = suggestions.first() {
                    message.push_str(&format!(" (did you mean '{}'?)", hint));
                }
                self.error_at(error_codes::UNDEFINED_NAME, callee.span, message);
                Type::Error
            }
        };
        self.record(callee.id, Type::Error);
        ret
    }

    /// Exact-match first; on none, retry with assignability and literal
    /// widening; ambiguity is an error.
    fn resolve_overload(
        &mut self,
        span: Span,
        name: &str,
        overloads: &[FunctionSig],
        args: &[Expr],
        arg_types: &[Type],
    ) -> Option<usize> {
        if arg_types.iter().any(Type::is_error) {
            return None;
        }

        let arity_matches: Vec<usize> = (0..overloads.len())
            .filter(|&i| overloads[i].params.len() == args.len())
            .collect();
        if arity_matches.is_empty() {
            let expected = overloads
                .first()
                .map(|o| o.params.len())
                .unwrap_or(0);
            self.error_at(
                error_codes::ARITY_MISMATCH,
                span,
                format!(
                    "function '{}' takes {} argument{}, found {}",
                    name,
                    expected,
                    if expected == 1 { "" } else { "s" },
                    args.len()
                ),
            );
            return None;
        }

        let exact: Vec<usize> = arity_matches
            .iter()
            .copied()
            .filter(|&i| {
                overloads[i]
                    .params
                    .iter()
                    .zip(arg_types)
                    .all(|(p, a)| types_equal(&p.ty, a))
            })
            .collect();
        if exact.len() == 1 {
            return exact.first().copied();
        }

        let loose: Vec<usize> = arity_matches
            .iter()
            .copied()
            .filter(|&i| {
                overloads[i]
                    .params
                    .iter()
                    .zip(arg_types.iter().zip(args))
                    .all(|(p, (a, e))| self.assignable_with_literal(e, a, &p.ty))
            })
            .collect();
        match loose.len() {
            1 => loose.first().copied(),
            0 => {
                if self.suppressed(&arg_types.iter().collect::<Vec<_>>()) {
                    return None;
                }
                let shown: Vec<String> = arg_types.iter().map(|t| t.to_string()).collect();
                self.error_at(
                    error_codes::TYPE_MISMATCH,
                    span,
                    format!(
                        "no overload of '{}' matches argument types ({})",
                        name,
                        shown.join(", ")
                    ),
                );
                None
            }
            _ => {
                self.error_at(
                    error_codes::AMBIGUOUS_OVERLOAD,
                    span,
                    format!("ambiguous call to overloaded function '{}'", name),
                );
                None
            }
        }
    }

    fn check_arg_types(
        &mut self,
        span: Span,
        name: &str,
        sig: &FunctionSig,
        args: &[Expr],
        arg_types: &[Type],
    ) {
        if args.len() != sig.params.len() {
            self.error_at(
                error_codes::ARITY_MISMATCH,
                span,
                format!(
                    "function '{}' takes {} argument{}, found {}",
                    name,
                    sig.params.len(),
                    if sig.params.len() == 1 { "" } else { "s" },
                    args.len()
                ),
            );
            return;
        }
        for ((arg, arg_ty), param) in args.iter().zip(arg_types).zip(&sig.params) {
            if !self.assignable_with_literal(arg, arg_ty, &param.ty) {
                self.error_at(
                    error_codes::TYPE_MISMATCH,
                    arg.span,
                    format!(
                        "argument '{}' expects {}, found {}",
                        param.name, param.ty, arg_ty
                    ),
                );
            }
        }
    }

    // ==================== throws / catch ====================

    /// A call into the throws protocol must be the direct operand of a
    /// `catch`, or every thrown type must be covered by the enclosing
    /// function's `throws` clause.
    fn enforce_throws(&mut self, expr: &Expr, name: &str, throws: &[Type]) {
        if throws.is_empty() {
            return;
        }
        self.call_throws.insert(expr.id, throws.to_vec());

        if self.catch_operand == Some(expr.id) {
            return;
        }
        let covered = match &self.fn_ctx {
            Some(ctx) => throws
                .iter()
                .all(|t| ctx.throws.iter().any(|u| types_equal(t, u))),
            None => false,
        };
        if !covered {
            self.error_at(
                error_codes::UNCAUGHT_THROWS,
                expr.span,
                format!(
                    "call to throwing function '{}' must be caught with 'catch' or declared in this function's 'throws'",
                    name
                ),
            );
        }
    }

    fn check_throw(&mut self, inner: &Expr) -> Type {
        let thrown = self.check_expr(inner);
        if thrown.is_error() || self.suppressed(&[&thrown]) {
            return Type::Void;
        }
        let declared = self
            .fn_ctx
            .as_ref()
            .map(|ctx| ctx.throws.clone())
            .unwrap_or_default();
        if !declared.iter().any(|t| types_equal(t, &thrown)) {
            self.error_at(
                error_codes::UNDECLARED_THROW,
                inner.span,
                format!(
                    "thrown type {} is not declared in the function's 'throws' clause",
                    thrown
                ),
            );
        }
        Type::Void
    }

    fn check_catch(&mut self, operand: &Expr, handler: &CatchHandler) -> Type {
        let saved = self.catch_operand.replace(operand.id);
        let operand_ty = self.check_expr(operand);
        self.catch_operand = saved;

        let thrown = self.call_throws.get(&operand.id).cloned().unwrap_or_default();
        if thrown.is_empty() {
            if !operand_ty.is_error() && !self.in_template {
                self.error_at(
                    error_codes::UNCAUGHT_THROWS,
                    operand.span,
                    "'catch' applied to an expression that cannot throw".to_string(),
                );
            }
            return operand_ty;
        }

        match handler {
            CatchHandler::Panic => {}
            CatchHandler::Rethrow => {
                let covered = match &self.fn_ctx {
                    Some(ctx) => thrown
                        .iter()
                        .all(|t| ctx.throws.iter().any(|u| types_equal(t, u))),
                    None => false,
                };
                if !covered {
                    self.error_at(
                        error_codes::UNCAUGHT_THROWS,
                        operand.span,
                        "'catch throw' requires the enclosing function to declare every rethrown type".to_string(),
                    );
                }
            }
            CatchHandler::Block { arms } => {
                let mut covered: Vec<String> = Vec::new();
                let mut has_default = false;
                for arm in arms {
                    match &arm.error_type {
                        Some(type_name) => {
                            let matched = thrown
                                .iter()
                                .find(|t| type_display_name(t) == *type_name)
                                .cloned();
                            match matched {
                                Some(err_ty) => {
                                    if covered.contains(type_name) {
                                        self.error_at(
                                            error_codes::DUPLICATE_VARIANT,
                                            arm.span,
                                            format!("duplicate catch arm for '{}'", type_name),
                                        );
                                    } else {
                                        covered.push(type_name.clone());
                                    }
                                    self.check_catch_arm(arm, err_ty);
                                }
                                None => {
                                    self.error_at(
                                        error_codes::MISSING_CATCH_ARM,
                                        arm.span,
                                        format!(
                                            "'{}' is not thrown by this call",
                                            type_name
                                        ),
                                    );
                                    self.check_catch_arm(arm, Type::Error);
                                }
                            }
                        }
                        None => {
                            has_default = true;
                            let remaining: Vec<Type> = thrown
                                .iter()
                                .filter(|t| !covered.contains(&type_display_name(t)))
                                .cloned()
                                .collect();
                            let binding_ty = match remaining.as_slice() {
                                [single] => single.clone(),
                                _ => Type::Error,
                            };
                            self.check_catch_arm(arm, binding_ty);
                        }
                    }
                }
                if !has_default {
                    let missing: Vec<String> = thrown
                        .iter()
                        .map(type_display_name)
                        .filter(|n| !covered.contains(n))
                        .collect();
                    if !missing.is_empty() {
                        self.error_at(
                            error_codes::MISSING_CATCH_ARM,
                            operand.span,
                            format!(
                                "catch does not handle error type{}: {}",
                                if missing.len() == 1 { "" } else { "s" },
                                missing.join(", ")
                            ),
                        );
                    }
                }
            }
        }

        operand_ty
    }

    fn check_catch_arm(&mut self, arm: &CatchArm, binding_ty: Type) {
        self.scopes.push(false, false);
        self.scopes.declare(
            &arm.binding,
            Symbol::Variable {
                ty: binding_ty,
                is_mut: false,
                moved: false,
            },
        );
        self.check_block_stmts(&arm.body);
        self.scopes.pop();
    }

    // ==================== literals and structures ====================

    fn check_struct_literal(
        &mut self,
        expr: &Expr,
        name: &str,
        type_args: &[TypeExpr],
        fields: &[(String, Expr)],
    ) -> Type {
        let field_types: Vec<Type> = fields
            .iter()
            .map(|(_, value)| self.check_expr(value))
            .collect();

        let struct_name = if self.generic_struct_templates.contains_key(name) {
            let resolved: Vec<Type> = if type_args.is_empty() {
                match self.infer_struct_type_args(expr, name, fields, &field_types) {
                    Some(args) => args,
                    None => return Type::Error,
                }
            } else {
                type_args.iter().map(|t| self.resolve_type(t)).collect()
            };
            if resolved.iter().any(Type::is_error) {
                return Type::Error;
            }
            if resolved.iter().any(Type::is_generic_dependent) {
                return Type::Generic {
                    base: name.to_string(),
                    args: resolved,
                };
            }
            match self.monomorphize_struct(name, &resolved, expr.span) {
                Type::Struct { name } => {
                    self.generic_resolutions.insert(expr.id, name.clone());
                    name
                }
                _ => return Type::Error,
            }
        } else if self.structs.contains_key(name) {
            if !type_args.is_empty() {
                self.error_at(
                    error_codes::ARITY_MISMATCH,
                    expr.span,
                    format!("struct '{}' takes no type arguments", name),
                );
            }
            name.to_string()
        } else {
            self.error_at(
                error_codes::UNDEFINED_TYPE,
                expr.span,
                format!("Undefined struct '{}'", name),
            );
            return Type::Error;
        };

        let info = match self.structs.get(&struct_name) {
            Some(info) => info.clone(),
            None => return Type::Error,
        };

        let mut seen: Vec<&str> = Vec::new();
        for ((field_name, value), value_ty) in fields.iter().zip(&field_types) {
            if seen.contains(&field_name.as_str()) {
                self.error_at(
                    error_codes::DUPLICATE_FIELD,
                    value.span,
                    format!("duplicate field '{}' in struct literal", field_name),
                );
                continue;
            }
            seen.push(field_name);
            match info.fields.iter().find(|(f, _)| f == field_name) {
                Some((_, field_ty)) => {
                    if !self.assignable_with_literal(value, value_ty, field_ty) {
                        self.error_at(
                            error_codes::TYPE_MISMATCH,
                            value.span,
                            format!(
                                "field '{}' expects {}, found {}",
                                field_name, field_ty, value_ty
                            ),
                        );
                    }
                }
                None => {
                    self.error_at(
                        error_codes::NO_SUCH_FIELD,
                        value.span,
                        format!("struct '{}' has no field '{}'", struct_name, field_name),
                    );
                }
            }
        }
        for (field_name, _) in &info.fields {
            if !fields.iter().any(|(f, _)| f == field_name) {
                self.error_at(
                    error_codes::TYPE_MISMATCH,
                    expr.span,
                    format!("missing field '{}' in struct literal", field_name),
                );
            }
        }

        Type::Struct { name: struct_name }
    }

    /// Infer a generic struct literal's type arguments from its field
    /// values, reusing the first mapping for each parameter.
    fn infer_struct_type_args(
        &mut self,
        expr: &Expr,
        name: &str,
        fields: &[(String, Expr)],
        field_types: &[Type],
    ) -> Option<Vec<Type>> {
        let template = self.generic_struct_templates.get(name)?.clone();
        self.push_template_bindings(&template.generic_params);
        let declared: Vec<(String, Type)> = template
            .fields
            .iter()
            .map(|f| (f.name.clone(), self.resolve_type(&f.ty)))
            .collect();
        self.pop_template_bindings();

        let mut map = HashMap::new();
        for ((field_name, _), value_ty) in fields.iter().zip(field_types) {
            if let Some((_, declared_ty)) = declared.iter().find(|(f, _)| f == field_name) {
                self.infer_type_args(declared_ty, value_ty, &mut map);
            }
        }

        let mut resolved = Vec::new();
        for param in &template.generic_params {
            match map.get(param) {
                Some(ty) => resolved.push(ty.clone()),
                None => {
                    if !self.in_template {
                        self.diags.emit(
                            kei_diagnostics::Diagnostic::error(
                                error_codes::CANNOT_INFER,
                                format!(
                                    "cannot infer type parameter '{}' for struct '{}'",
                                    param, name
                                ),
                                self.location(expr.span),
                            )
                            .with_help(format!(
                                "specify the type arguments explicitly: {}<...>{{...}}",
                                name
                            )),
                        );
                    }
                    return None;
                }
            }
        }
        Some(resolved)
    }

    fn check_if_expr(
        &mut self,
        expr: &Expr,
        cond: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
    ) -> Type {
        self.check_condition(cond);

        let base = self.scopes.moved_snapshot();
        let then_ty = self.check_block_value(then_block, false);
        let after_then = self.scopes.moved_snapshot();
        self.scopes.restore_moved(&base);

        let else_ty = match else_block {
            Some(block) => {
                let ty = self.check_block_value(block, false);
                let snapshot = self.scopes.moved_snapshot();
                self.scopes.restore_moved(&base);
                self.scopes.join_moved(&[after_then, snapshot]);
                ty
            }
            None => {
                self.scopes.join_moved(&[after_then]);
                if then_ty != Type::Void && !then_ty.is_error() {
                    self.error_at(
                        error_codes::TYPE_MISMATCH,
                        expr.span,
                        "if expression with a value requires an 'else' block".to_string(),
                    );
                }
                return Type::Void;
            }
        };

        if types_equal(&then_ty, &else_ty) {
            then_ty
        } else if is_assignable_to(&else_ty, &then_ty) {
            then_ty
        } else if is_assignable_to(&then_ty, &else_ty) {
            else_ty
        } else if self.suppressed(&[&then_ty, &else_ty]) {
            Type::Error
        } else {
            self.error_at(
                error_codes::TYPE_MISMATCH,
                expr.span,
                format!(
                    "if and else branches have mismatched types {} and {}",
                    then_ty, else_ty
                ),
            );
            Type::Error
        }
    }

    /// Check an expression block and produce its value type: the trailing
    /// bare expression's type, or void.
    pub(crate) fn check_block_value(&mut self, block: &Block, is_unsafe: bool) -> Type {
        self.scopes.push(is_unsafe, false);
        let mut value_ty = Type::Void;
        for (i, stmt) in block.stmts.iter().enumerate() {
            if i + 1 == block.stmts.len() {
                if let StmtKind::Expr { expr, semi: false } = &stmt.kind {
                    value_ty = self.check_expr(expr);
                    continue;
                }
            }
            self.check_stmt(stmt);
        }
        self.scopes.pop();
        value_ty
    }

    fn check_move(&mut self, expr: &Expr, inner: &Expr) -> Type {
        let ty = self.check_expr(inner);
        match inner.as_identifier() {
            Some(name) => {
                if self.scopes.lookup(name).is_some() {
                    self.scopes.mark_moved(name, true);
                }
            }
            None => {
                self.error_at(
                    error_codes::INVALID_MOVE,
                    expr.span,
                    "'move' requires a variable".to_string(),
                );
            }
        }
        ty
    }

    fn check_cast(&mut self, expr: &Expr, inner: &Expr, ty: &TypeExpr) -> Type {
        let from = self.check_expr(inner);
        let to = self.resolve_type(ty);
        if from.is_error() || to.is_error() || self.suppressed(&[&from, &to]) {
            return to;
        }

        let ok = match (&from, &to) {
            _ if from == to => true,
            (a, b) if a.is_numeric() && b.is_numeric() => true,
            (Type::Bool, b) if b.is_int() => true,
            (Type::CChar, b) if b.is_int() => true,
            (a, Type::CChar) if a.is_int() => true,
            (Type::Enum { .. }, b) if b.is_int() => true,
            (Type::Ptr(_), Type::Ptr(_)) => {
                self.require_unsafe(expr.span, "raw pointer cast");
                true
            }
            (Type::Ptr(_), b) if b.is_int() => {
                self.require_unsafe(expr.span, "pointer-to-integer cast");
                true
            }
            (a, Type::Ptr(_)) if a.is_int() => {
                self.require_unsafe(expr.span, "integer-to-pointer cast");
                true
            }
            (Type::Str, Type::Ptr(inner_ty)) if **inner_ty == Type::CChar => {
                self.require_unsafe(expr.span, "string-to-pointer cast");
                true
            }
            _ => false,
        };
        if !ok {
            self.error_at(
                error_codes::INVALID_CAST,
                expr.span,
                format!("cannot cast {} to {}", from, to),
            );
            return Type::Error;
        }
        to
    }

    fn check_array_literal(&mut self, expr: &Expr, elements: &[Expr]) -> Type {
        if elements.is_empty() {
            self.error_at(
                error_codes::CANNOT_INFER,
                expr.span,
                "cannot infer the element type of an empty array literal".to_string(),
            );
            return Type::Error;
        }
        let elem_types: Vec<Type> = elements.iter().map(|e| self.check_expr(e)).collect();
        let elem_ty = elem_types[0].clone();
        for (element, ty) in elements.iter().zip(&elem_types).skip(1) {
            if !self.assignable_with_literal(element, ty, &elem_ty) {
                self.error_at(
                    error_codes::TYPE_MISMATCH,
                    element.span,
                    format!("array element expects {}, found {}", elem_ty, ty),
                );
            }
        }
        Type::Array {
            elem: Box::new(elem_ty),
            len: Some(elements.len() as u64),
        }
    }

    // ==================== assignability helpers ====================

    pub(crate) fn assignable_with_literal(&self, expr: &Expr, from: &Type, to: &Type) -> bool {
        if is_assignable_to(from, to) {
            return true;
        }
        if self.suppressed(&[from, to]) {
            return true;
        }
        match literal_shape(expr) {
            Some(LiteralShape::Int { value, negated }) => {
                from.is_int() && int_literal_fits(value, negated, to)
            }
            Some(LiteralShape::Float) => from.is_float() && float_literal_fits(to),
            None => false,
        }
    }

    pub(crate) fn is_int_literal_overflow(&self, expr: &Expr, from: &Type, to: &Type) -> bool {
        if !from.is_int() || !to.is_int() {
            return false;
        }
        matches!(
            literal_shape(expr),
            Some(LiteralShape::Int { value, negated }) if !int_literal_fits(value, negated, to)
        )
    }
}

enum LiteralShape {
    Int { value: u128, negated: bool },
    Float,
}

/// Untyped literal structure of an expression, looking through groups
/// and unary minus. Suffixed literals are already typed and excluded.
fn literal_shape(expr: &Expr) -> Option<LiteralShape> {
    match &expr.kind {
        ExprKind::IntLiteral {
            value,
            suffix: None,
        } => Some(LiteralShape::Int {
            value: *value,
            negated: false,
        }),
        ExprKind::FloatLiteral { suffix: None, .. } => Some(LiteralShape::Float),
        ExprKind::Group(inner) => literal_shape(inner),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match literal_shape(operand) {
            Some(LiteralShape::Int { value, .. }) => Some(LiteralShape::Int {
                value,
                negated: true,
            }),
            other => other,
        },
        _ => None,
    }
}

fn type_display_name(ty: &Type) -> String {
    match ty {
        Type::Struct { name } | Type::Enum { name } => name.clone(),
        other => other.to_string(),
    }
}
