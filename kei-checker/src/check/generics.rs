// Monomorphization of generic structs and functions.
//
// Instances are cached by mangled name. Instantiated bodies are AST
// clones with freshly assigned node ids, queued and checked after the
// requesting function so scope state never interleaves.

use super::*;
use log::debug;

impl Checker<'_> {
    /// Concrete instance of a generic struct, creating and caching it on
    /// first use. `args` must be fully concrete.
    pub(crate) fn monomorphize_struct(&mut self, base: &str, args: &[Type], span: Span) -> Type {
        let mangled = mangle_generic_name(base, args);
        if self.structs.contains_key(&mangled) {
            return Type::Struct { name: mangled };
        }

        let template = match self.generic_struct_templates.get(base) {
            Some(t) => t.clone(),
            None => {
                self.error_at(
                    error_codes::UNDEFINED_TYPE,
                    span,
                    format!("Undefined generic type '{}'", base),
                );
                return Type::Error;
            }
        };
        debug!("monomorphizing struct {} -> {}", base, mangled);

        // register the name first so recursive fields (ptr<Node<T>>)
        // resolve while the instance is being built
        self.structs.insert(
            mangled.clone(),
            StructInfo {
                name: mangled.clone(),
                fields: Vec::new(),
                methods: HashMap::new(),
                is_unsafe: template.is_unsafe,
                generic_base: Some(base.to_string()),
                generic_args: args.to_vec(),
                has_destroy_hook: false,
                has_oncopy_hook: false,
                auto_destroy: false,
                auto_oncopy: false,
            },
        );
        self.mono_structs.insert(
            mangled.clone(),
            MonoStruct {
                original: base.to_string(),
                type_args: args.to_vec(),
            },
        );

        let bindings: HashMap<String, Type> = template
            .generic_params
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();

        self.type_param_bindings.push(bindings.clone());
        let mut fields = Vec::new();
        for field in &template.fields {
            fields.push((field.name.clone(), self.resolve_type(&field.ty)));
        }
        let mut methods = HashMap::new();
        for method in &template.methods {
            methods.insert(method.name.clone(), self.build_fn_sig(method, false));
        }
        let self_ty = Type::Struct {
            name: mangled.clone(),
        };
        self.validate_struct_shape(&template, &self_ty);
        self.type_param_bindings.pop();

        let has_destroy_hook = methods.contains_key("__destroy");
        let has_oncopy_hook = methods.contains_key("__oncopy");
        if let Some(info) = self.structs.get_mut(&mangled) {
            info.fields = fields;
            info.methods = methods.clone();
            info.has_destroy_hook = has_destroy_hook;
            info.has_oncopy_hook = has_oncopy_hook;
        }

        for method in &template.methods {
            let kir_name = method_kir_name(&mangled, &method.name);
            let sig = match methods.get(&method.name) {
                Some(sig) => sig.clone(),
                None => continue,
            };
            self.functions.insert(kir_name.clone(), sig.clone());
            let mut decl = method.clone();
            self.refresh_node_ids(&mut decl);
            self.pending.push_back(PendingInstance {
                kir_name,
                decl,
                sig,
                self_type: Some(self_ty.clone()),
                bindings: bindings.clone(),
            });
        }

        Type::Struct { name: mangled }
    }

    /// Concrete instance of a generic function. Records the resolution
    /// for the call site and returns the substituted signature.
    pub(crate) fn instantiate_function(
        &mut self,
        name: &str,
        template_sig: &FunctionSig,
        args: &[Type],
        call_id: NodeId,
    ) -> FunctionSig {
        let mangled = mangle_generic_name(name, args);
        self.generic_resolutions.insert(call_id, mangled.clone());
        self.call_targets.insert(call_id, mangled.clone());

        if let Some(mono) = self.mono_fns.get(&mangled) {
            return mono.sig.clone();
        }

        let bindings: HashMap<String, Type> = template_sig
            .generic_params
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        let sig = substitute_sig(template_sig, &bindings);
        debug!("monomorphizing function {} -> {}", name, mangled);

        self.mono_fns.insert(
            mangled.clone(),
            MonoFn {
                original_name: name.to_string(),
                mangled_name: mangled.clone(),
                type_args: args.to_vec(),
                sig: sig.clone(),
            },
        );
        self.functions.insert(mangled.clone(), sig.clone());

        if let Some(template) = self.generic_fn_templates.get(name).cloned() {
            let mut decl = template;
            self.refresh_node_ids(&mut decl);
            self.pending.push_back(PendingInstance {
                kir_name: mangled,
                decl,
                sig: sig.clone(),
                self_type: None,
                bindings,
            });
        }
        sig
    }

    /// Traverse declared and provided types in parallel, recording the
    /// first binding seen for each type parameter.
    pub(crate) fn infer_type_args(
        &self,
        declared: &Type,
        provided: &Type,
        map: &mut HashMap<String, Type>,
    ) {
        match (declared, provided) {
            (Type::TypeParam(name), _) => {
                if !provided.is_error() {
                    map.entry(name.clone()).or_insert_with(|| provided.clone());
                }
            }
            (Type::Ptr(d), Type::Ptr(p))
            | (Type::Slice(d), Type::Slice(p))
            | (Type::Range(d), Type::Range(p)) => self.infer_type_args(d, p, map),
            (Type::Array { elem: d, .. }, Type::Array { elem: p, .. }) => {
                self.infer_type_args(d, p, map)
            }
            (Type::Generic { base, args }, Type::Struct { name }) => {
                if let Some(info) = self.structs.get(name) {
                    if info.generic_base.as_deref() == Some(base.as_str()) {
                        for (d, p) in args.iter().zip(&info.generic_args) {
                            self.infer_type_args(d, p, map);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Check the bodies of queued instances. Instantiations requested
    /// while draining append to the same queue.
    pub(crate) fn drain_pending(&mut self) {
        while let Some(pending) = self.pending.pop_front() {
            let saved_bindings = std::mem::take(&mut self.type_param_bindings);
            self.type_param_bindings.push(pending.bindings.clone());
            let saved_template = std::mem::replace(&mut self.in_template, false);

            self.check_function_body(&pending.decl, &pending.sig, pending.self_type.as_ref());

            self.in_template = saved_template;
            self.type_param_bindings = saved_bindings;

            self.lowered_fns.push(LoweredFn {
                kir_name: pending.kir_name,
                decl: pending.decl,
                sig: pending.sig,
                self_type: pending.self_type,
            });
        }
    }

    /// Give every expression in a cloned declaration a fresh node id so
    /// its `type_map` rows don't collide with the template's.
    pub(crate) fn refresh_node_ids(&mut self, func: &mut Function) {
        let mut next = self.next_node_id;
        walk_block_exprs_mut(&mut func.body, &mut |expr| {
            expr.id = next;
            next += 1;
        });
        self.next_node_id = next;
    }
}

// ==================== AST walkers ====================

pub(crate) fn walk_program_exprs(program: &Program, f: &mut impl FnMut(&Expr)) {
    for decl in &program.decls {
        match decl {
            Decl::Function(func) => walk_block_exprs(&func.body, f),
            Decl::Struct(s) => {
                for method in &s.methods {
                    walk_block_exprs(&method.body, f);
                }
            }
            Decl::Static(s) => walk_expr(&s.value, f),
            _ => {}
        }
    }
}

fn walk_block_exprs(block: &Block, f: &mut impl FnMut(&Expr)) {
    for stmt in &block.stmts {
        walk_stmt_exprs(stmt, f);
    }
}

fn walk_stmt_exprs(stmt: &Stmt, f: &mut impl FnMut(&Expr)) {
    match &stmt.kind {
        StmtKind::Block(block) | StmtKind::Unsafe(block) => walk_block_exprs(block, f),
        StmtKind::Let { value, .. } | StmtKind::Const { value, .. } => walk_expr(value, f),
        StmtKind::Return(value) => {
            if let Some(value) = value {
                walk_expr(value, f);
            }
        }
        StmtKind::If {
            cond,
            then_block,
            else_branch,
        } => {
            walk_expr(cond, f);
            walk_block_exprs(then_block, f);
            if let Some(else_branch) = else_branch {
                walk_stmt_exprs(else_branch, f);
            }
        }
        StmtKind::While { cond, body } => {
            walk_expr(cond, f);
            walk_block_exprs(body, f);
        }
        StmtKind::For { iter, body, .. } => {
            walk_expr(iter, f);
            walk_block_exprs(body, f);
        }
        StmtKind::Switch {
            scrutinee,
            cases,
            default,
        } => {
            walk_expr(scrutinee, f);
            for case in cases {
                if let CasePattern::Literal(expr) = &case.pattern {
                    walk_expr(expr, f);
                }
                walk_block_exprs(&case.body, f);
            }
            if let Some(default) = default {
                walk_block_exprs(default, f);
            }
        }
        StmtKind::Defer(inner) => walk_stmt_exprs(inner, f),
        StmtKind::Expr { expr, .. } => walk_expr(expr, f),
        StmtKind::Assert { cond, message } | StmtKind::Require { cond, message } => {
            walk_expr(cond, f);
            if let Some(message) = message {
                walk_expr(message, f);
            }
        }
        StmtKind::Break | StmtKind::Continue => {}
    }
}

fn walk_expr(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    f(expr);
    match &expr.kind {
        ExprKind::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, f);
            walk_expr(rhs, f);
        }
        ExprKind::Unary { operand, .. } => walk_expr(operand, f),
        ExprKind::Assign { target, value, .. } => {
            walk_expr(target, f);
            walk_expr(value, f);
        }
        ExprKind::Call { callee, args, .. } => {
            walk_expr(callee, f);
            for arg in args {
                walk_expr(arg, f);
            }
        }
        ExprKind::Member { object, .. } => walk_expr(object, f),
        ExprKind::Index { object, index } => {
            walk_expr(object, f);
            walk_expr(index, f);
        }
        ExprKind::Deref(inner)
        | ExprKind::Move(inner)
        | ExprKind::Throw(inner)
        | ExprKind::Group(inner)
        | ExprKind::Increment(inner)
        | ExprKind::Decrement(inner) => walk_expr(inner, f),
        ExprKind::StructLiteral { fields, .. } => {
            for (_, value) in fields {
                walk_expr(value, f);
            }
        }
        ExprKind::If {
            cond,
            then_block,
            else_block,
        } => {
            walk_expr(cond, f);
            walk_block_exprs(then_block, f);
            if let Some(else_block) = else_block {
                walk_block_exprs(else_block, f);
            }
        }
        ExprKind::Catch { operand, handler } => {
            walk_expr(operand, f);
            if let CatchHandler::Block { arms } = handler {
                for arm in arms {
                    walk_block_exprs(&arm.body, f);
                }
            }
        }
        ExprKind::Range { start, end, .. } => {
            walk_expr(start, f);
            walk_expr(end, f);
        }
        ExprKind::Unsafe(block) => walk_block_exprs(block, f),
        ExprKind::Cast { expr: inner, .. } => walk_expr(inner, f),
        ExprKind::ArrayLiteral(elements) => {
            for element in elements {
                walk_expr(element, f);
            }
        }
        ExprKind::IntLiteral { .. }
        | ExprKind::FloatLiteral { .. }
        | ExprKind::StringLiteral(_)
        | ExprKind::BoolLiteral(_)
        | ExprKind::NullLiteral
        | ExprKind::Identifier(_) => {}
    }
}

pub(crate) fn walk_block_exprs_mut(block: &mut Block, f: &mut impl FnMut(&mut Expr)) {
    for stmt in &mut block.stmts {
        walk_stmt_exprs_mut(stmt, f);
    }
}

fn walk_stmt_exprs_mut(stmt: &mut Stmt, f: &mut impl FnMut(&mut Expr)) {
    match &mut stmt.kind {
        StmtKind::Block(block) | StmtKind::Unsafe(block) => walk_block_exprs_mut(block, f),
        StmtKind::Let { value, .. } | StmtKind::Const { value, .. } => walk_expr_mut(value, f),
        StmtKind::Return(value) => {
            if let Some(value) = value {
                walk_expr_mut(value, f);
            }
        }
        StmtKind::If {
            cond,
            then_block,
            else_branch,
        } => {
            walk_expr_mut(cond, f);
            walk_block_exprs_mut(then_block, f);
            if let Some(else_branch) = else_branch {
                walk_stmt_exprs_mut(else_branch, f);
            }
        }
        StmtKind::While { cond, body } => {
            walk_expr_mut(cond, f);
            walk_block_exprs_mut(body, f);
        }
        StmtKind::For { iter, body, .. } => {
            walk_expr_mut(iter, f);
            walk_block_exprs_mut(body, f);
        }
        StmtKind::Switch {
            scrutinee,
            cases,
            default,
        } => {
            walk_expr_mut(scrutinee, f);
            for case in cases {
                if let CasePattern::Literal(expr) = &mut case.pattern {
                    walk_expr_mut(expr, f);
                }
                walk_block_exprs_mut(&mut case.body, f);
            }
            if let Some(default) = default {
                walk_block_exprs_mut(default, f);
            }
        }
        StmtKind::Defer(inner) => walk_stmt_exprs_mut(inner, f),
        StmtKind::Expr { expr, .. } => walk_expr_mut(expr, f),
        StmtKind::Assert { cond, message } | StmtKind::Require { cond, message } => {
            walk_expr_mut(cond, f);
            if let Some(message) = message {
                walk_expr_mut(message, f);
            }
        }
        StmtKind::Break | StmtKind::Continue => {}
    }
}

fn walk_expr_mut(expr: &mut Expr, f: &mut impl FnMut(&mut Expr)) {
    f(expr);
    match &mut expr.kind {
        ExprKind::Binary { lhs, rhs, .. } => {
            walk_expr_mut(lhs, f);
            walk_expr_mut(rhs, f);
        }
        ExprKind::Unary { operand, .. } => walk_expr_mut(operand, f),
        ExprKind::Assign { target, value, .. } => {
            walk_expr_mut(target, f);
            walk_expr_mut(value, f);
        }
        ExprKind::Call { callee, args, .. } => {
            walk_expr_mut(callee, f);
            for arg in args {
                walk_expr_mut(arg, f);
            }
        }
        ExprKind::Member { object, .. } => walk_expr_mut(object, f),
        ExprKind::Index { object, index } => {
            walk_expr_mut(object, f);
            walk_expr_mut(index, f);
        }
        ExprKind::Deref(inner)
        | ExprKind::Move(inner)
        | ExprKind::Throw(inner)
        | ExprKind::Group(inner)
        | ExprKind::Increment(inner)
        | ExprKind::Decrement(inner) => walk_expr_mut(inner, f),
        ExprKind::StructLiteral { fields, .. } => {
            for (_, value) in fields {
                walk_expr_mut(value, f);
            }
        }
        ExprKind::If {
            cond,
            then_block,
            else_block,
        } => {
            walk_expr_mut(cond, f);
            walk_block_exprs_mut(then_block, f);
            if let Some(else_block) = else_block {
                walk_block_exprs_mut(else_block, f);
            }
        }
        ExprKind::Catch { operand, handler } => {
            walk_expr_mut(operand, f);
            if let CatchHandler::Block { arms } = handler {
                for arm in arms {
                    walk_block_exprs_mut(&mut arm.body, f);
                }
            }
        }
        ExprKind::Range { start, end, .. } => {
            walk_expr_mut(start, f);
            walk_expr_mut(end, f);
        }
        ExprKind::Unsafe(block) => walk_block_exprs_mut(block, f),
        ExprKind::Cast { expr: inner, .. } => walk_expr_mut(inner, f),
        ExprKind::ArrayLiteral(elements) => {
            for element in elements {
                walk_expr_mut(element, f);
            }
        }
        ExprKind::IntLiteral { .. }
        | ExprKind::FloatLiteral { .. }
        | ExprKind::StringLiteral(_)
        | ExprKind::BoolLiteral(_)
        | ExprKind::NullLiteral
        | ExprKind::Identifier(_) => {}
    }
}
