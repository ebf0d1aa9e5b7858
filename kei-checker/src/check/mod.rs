// Semantic analysis for the Kei language.
//
// Phases: collect declarations (names first, then signatures so forward
// references resolve), validate struct shape and lifecycle hooks, check
// bodies, monomorphize on demand, then drain the instantiation queue and
// finalize lifecycle flags.

use crate::scope::{ScopeStack, Symbol};
use crate::types::*;
use kei_ast::*;
use kei_diagnostics::{error_codes, DiagnosticEngine, Location, SourceFile, Span};
use std::collections::{HashMap, VecDeque};

mod exprs;
mod generics;
mod stmts;

/// Concrete struct shape. Monomorphized instances live here under their
/// mangled name next to plain structs.
#[derive(Debug, Clone)]
pub struct StructInfo {
    pub name: String,
    pub fields: Vec<(String, Type)>,
    pub methods: HashMap<String, FunctionSig>,
    pub is_unsafe: bool,
    pub generic_base: Option<String>,
    pub generic_args: Vec<Type>,
    pub has_destroy_hook: bool,
    pub has_oncopy_hook: bool,
    /// Synthesized: some field transitively carries lifecycle hooks, so
    /// the lowerer recurses into fields instead of calling a user hook.
    pub auto_destroy: bool,
    pub auto_oncopy: bool,
}

#[derive(Debug, Clone)]
pub struct VariantInfo {
    pub name: String,
    pub fields: Vec<Type>,
    pub tag: u64,
}

#[derive(Debug, Clone)]
pub struct EnumInfo {
    pub name: String,
    pub base: Type,
    pub variants: Vec<VariantInfo>,
}

/// Monomorphization cache entry for structs.
#[derive(Debug, Clone)]
pub struct MonoStruct {
    pub original: String,
    pub type_args: Vec<Type>,
}

/// Monomorphization cache entry for functions.
#[derive(Debug, Clone)]
pub struct MonoFn {
    pub original_name: String,
    pub mangled_name: String,
    pub type_args: Vec<Type>,
    pub sig: FunctionSig,
}

/// A concrete function ready for lowering: free function, method, or
/// monomorphized instance. Instantiated declarations are AST clones with
/// freshly assigned node ids, checked under their own bindings.
#[derive(Debug, Clone)]
pub struct LoweredFn {
    pub kir_name: String,
    pub decl: Function,
    pub sig: FunctionSig,
    pub self_type: Option<Type>,
}

/// Compiler-provided callees resolved at check time.
#[derive(Debug, Clone)]
pub enum Builtin {
    Alloc(Type),
    Free,
    Sizeof(Type),
    Len,
    Panic,
}

/// Everything the lowerer needs, produced by one checker run.
#[derive(Debug, Default)]
pub struct Analysis {
    pub type_map: HashMap<NodeId, Type>,
    pub generic_resolutions: HashMap<NodeId, String>,
    /// Resolved KIR callee name per direct call expression.
    pub call_targets: HashMap<NodeId, String>,
    /// Thrown types per call expression whose callee uses the throws
    /// protocol.
    pub call_throws: HashMap<NodeId, Vec<Type>>,
    /// Declared (or inferred) type of each `let`/`const` binding, keyed
    /// by the initializer expression — it can be wider than the
    /// initializer's own type.
    pub binding_types: HashMap<NodeId, Type>,
    pub builtin_calls: HashMap<NodeId, Builtin>,
    pub structs: HashMap<String, StructInfo>,
    pub enums: HashMap<String, EnumInfo>,
    pub mono_structs: HashMap<String, MonoStruct>,
    pub mono_fns: HashMap<String, MonoFn>,
    /// KIR function name → signature, externs included.
    pub functions: HashMap<String, FunctionSig>,
    pub externs: Vec<(String, FunctionSig)>,
    pub statics: Vec<(StaticDecl, Type)>,
    pub lowered_fns: Vec<LoweredFn>,
}

impl Analysis {
    pub fn expr_type(&self, id: NodeId) -> Type {
        self.type_map.get(&id).cloned().unwrap_or(Type::Error)
    }

    /// Does a value of this type need a destroy at scope exit?
    pub fn needs_destroy(&self, ty: &Type) -> bool {
        match ty {
            Type::Struct { name } => self
                .structs
                .get(name)
                .map(|info| info.has_destroy_hook || info.auto_destroy)
                .unwrap_or(false),
            Type::Array { elem, .. } => self.needs_destroy(elem),
            _ => false,
        }
    }

    pub fn needs_oncopy(&self, ty: &Type) -> bool {
        match ty {
            Type::Struct { name } => self
                .structs
                .get(name)
                .map(|info| info.has_oncopy_hook || info.auto_oncopy)
                .unwrap_or(false),
            Type::Array { elem, .. } => self.needs_oncopy(elem),
            _ => false,
        }
    }
}

pub(crate) struct FnCtx {
    pub ret: Type,
    pub throws: Vec<Type>,
}

/// A generic instance whose body still has to be checked. Queued so
/// instantiation never re-enters the scope stack of the function being
/// checked when the instance was requested.
pub(crate) struct PendingInstance {
    pub kir_name: String,
    pub decl: Function,
    pub sig: FunctionSig,
    pub self_type: Option<Type>,
    pub bindings: HashMap<String, Type>,
}

pub struct Checker<'a> {
    pub(crate) file: &'a SourceFile,
    pub(crate) diags: &'a mut DiagnosticEngine,
    pub(crate) scopes: ScopeStack,

    pub(crate) structs: HashMap<String, StructInfo>,
    pub(crate) enums: HashMap<String, EnumInfo>,
    pub(crate) aliases: HashMap<String, Type>,
    pub(crate) generic_struct_templates: HashMap<String, StructDecl>,
    pub(crate) generic_fn_templates: HashMap<String, Function>,
    /// Overload KIR names per free-function name, in declaration order.
    pub(crate) fn_overload_names: HashMap<String, Vec<String>>,

    pub(crate) type_map: HashMap<NodeId, Type>,
    pub(crate) generic_resolutions: HashMap<NodeId, String>,
    pub(crate) call_targets: HashMap<NodeId, String>,
    pub(crate) call_throws: HashMap<NodeId, Vec<Type>>,
    pub(crate) binding_types: HashMap<NodeId, Type>,
    pub(crate) builtin_calls: HashMap<NodeId, Builtin>,
    pub(crate) mono_structs: HashMap<String, MonoStruct>,
    pub(crate) mono_fns: HashMap<String, MonoFn>,
    pub(crate) functions: HashMap<String, FunctionSig>,
    pub(crate) externs: Vec<(String, FunctionSig)>,
    pub(crate) statics: Vec<(StaticDecl, Type)>,
    pub(crate) lowered_fns: Vec<LoweredFn>,

    pub(crate) fn_ctx: Option<FnCtx>,
    /// Call expression that is the direct operand of a `catch`.
    pub(crate) catch_operand: Option<NodeId>,
    /// Innermost-first stack of type-parameter bindings. Template mode
    /// binds `T -> TypeParam(T)`; instance mode binds concrete types.
    pub(crate) type_param_bindings: Vec<HashMap<String, Type>>,
    pub(crate) in_template: bool,
    pub(crate) pending: VecDeque<PendingInstance>,
    pub(crate) next_node_id: NodeId,
}

/// Run the checker over a parsed program.
pub fn check_program(
    program: &Program,
    file: &SourceFile,
    diags: &mut DiagnosticEngine,
) -> Analysis {
    let mut checker = Checker::new(file, diags);
    checker.next_node_id = max_node_id(program) + 1;
    checker.collect(program);
    checker.check_bodies(program);
    checker.drain_pending();
    checker.finalize()
}

impl<'a> Checker<'a> {
    pub fn new(file: &'a SourceFile, diags: &'a mut DiagnosticEngine) -> Self {
        Self {
            file,
            diags,
            scopes: ScopeStack::new(),
            structs: HashMap::new(),
            enums: HashMap::new(),
            aliases: HashMap::new(),
            generic_struct_templates: HashMap::new(),
            generic_fn_templates: HashMap::new(),
            fn_overload_names: HashMap::new(),
            type_map: HashMap::new(),
            generic_resolutions: HashMap::new(),
            call_targets: HashMap::new(),
            call_throws: HashMap::new(),
            binding_types: HashMap::new(),
            builtin_calls: HashMap::new(),
            mono_structs: HashMap::new(),
            mono_fns: HashMap::new(),
            functions: HashMap::new(),
            externs: Vec::new(),
            statics: Vec::new(),
            lowered_fns: Vec::new(),
            fn_ctx: None,
            catch_operand: None,
            type_param_bindings: Vec::new(),
            in_template: false,
            pending: VecDeque::new(),
            next_node_id: 0,
        }
    }

    pub(crate) fn error_at(&mut self, code: &str, span: Span, message: String) {
        let location = self.location(span);
        self.diags.emit_error(code, message, location);
    }

    pub(crate) fn location(&self, span: Span) -> Location {
        self.file.location(span.start)
    }

    pub(crate) fn record(&mut self, id: NodeId, ty: Type) -> Type {
        self.type_map.insert(id, ty.clone());
        ty
    }

    // ==================== Phase 1: collection ====================

    fn collect(&mut self, program: &Program) {
        // pass A: register every nominal name so forward references work
        for decl in &program.decls {
            match decl {
                Decl::Struct(s) => {
                    if self.type_name_taken(&s.name) {
                        self.error_at(
                            error_codes::DUPLICATE_DEFINITION,
                            s.span,
                            format!("duplicate definition of type '{}'", s.name),
                        );
                        continue;
                    }
                    if s.generic_params.is_empty() {
                        self.structs.insert(
                            s.name.clone(),
                            StructInfo {
                                name: s.name.clone(),
                                fields: Vec::new(),
                                methods: HashMap::new(),
                                is_unsafe: s.is_unsafe,
                                generic_base: None,
                                generic_args: Vec::new(),
                                has_destroy_hook: false,
                                has_oncopy_hook: false,
                                auto_destroy: false,
                                auto_oncopy: false,
                            },
                        );
                    } else {
                        self.generic_struct_templates.insert(s.name.clone(), s.clone());
                    }
                }
                Decl::Enum(e) => {
                    if self.type_name_taken(&e.name) {
                        self.error_at(
                            error_codes::DUPLICATE_DEFINITION,
                            e.span,
                            format!("duplicate definition of type '{}'", e.name),
                        );
                        continue;
                    }
                    self.enums.insert(
                        e.name.clone(),
                        EnumInfo {
                            name: e.name.clone(),
                            base: I32,
                            variants: Vec::new(),
                        },
                    );
                }
                _ => {}
            }
        }

        // pass B: signatures, fields, aliases, imports
        for decl in &program.decls {
            match decl {
                Decl::TypeAlias(alias) => {
                    let ty = self.resolve_type(&alias.ty);
                    self.aliases.insert(alias.name.clone(), ty);
                }
                Decl::Import(import) => self.collect_import(import),
                _ => {}
            }
        }

        for decl in &program.decls {
            match decl {
                Decl::Struct(s) if s.generic_params.is_empty() => self.collect_struct(s),
                Decl::Struct(s) => self.check_template_struct_shape(s),
                Decl::Enum(e) => self.collect_enum(e),
                Decl::Function(f) => self.collect_function(f),
                Decl::ExternFunction(f) => self.collect_extern(f),
                Decl::Static(s) => {
                    let ty = self.resolve_type(&s.ty);
                    self.scopes.declare_global(
                        &s.name,
                        Symbol::Variable {
                            ty,
                            is_mut: false,
                            moved: false,
                        },
                    );
                }
                _ => {}
            }
        }
    }

    fn type_name_taken(&self, name: &str) -> bool {
        self.structs.contains_key(name)
            || self.enums.contains_key(name)
            || self.generic_struct_templates.contains_key(name)
    }

    fn collect_import(&mut self, import: &Import) {
        if import.names.is_empty() {
            // whole-module import binds the last path segment; member
            // lookups yield Error since resolution happens externally
            if let Some(last) = import.path.last() {
                self.scopes.declare_global(
                    last,
                    Symbol::Module {
                        name: import.path.join("."),
                    },
                );
            }
        } else {
            for name in &import.names {
                self.scopes.declare_global(
                    name,
                    Symbol::Variable {
                        ty: Type::Error,
                        is_mut: false,
                        moved: false,
                    },
                );
                self.scopes.declare_global_type(name, Type::Error);
            }
        }
    }

    fn collect_struct(&mut self, decl: &StructDecl) {
        let mut fields = Vec::new();
        let mut seen_fields: HashMap<&str, Span> = HashMap::new();
        for field in &decl.fields {
            if seen_fields.insert(&field.name, field.span).is_some() {
                self.error_at(
                    error_codes::DUPLICATE_FIELD,
                    field.span,
                    format!("duplicate field '{}' in struct '{}'", field.name, decl.name),
                );
                continue;
            }
            let ty = self.resolve_type(&field.ty);
            fields.push((field.name.clone(), ty));
        }

        let mut methods = HashMap::new();
        for method in &decl.methods {
            let sig = self.build_fn_sig(method, false);
            if methods.insert(method.name.clone(), sig).is_some() {
                self.error_at(
                    error_codes::DUPLICATE_METHOD,
                    method.span,
                    format!("duplicate method '{}' in struct '{}'", method.name, decl.name),
                );
            }
        }

        let has_destroy_hook = methods.contains_key("__destroy");
        let has_oncopy_hook = methods.contains_key("__oncopy");

        if let Some(info) = self.structs.get_mut(&decl.name) {
            info.fields = fields;
            info.methods = methods;
            info.has_destroy_hook = has_destroy_hook;
            info.has_oncopy_hook = has_oncopy_hook;
        }

        self.validate_struct_shape(decl, &Type::Struct {
            name: decl.name.clone(),
        });

        // methods are callable as mangled free functions in KIR
        let info = match self.structs.get(&decl.name) {
            Some(info) => info.clone(),
            None => return,
        };
        for (mname, sig) in &info.methods {
            self.functions
                .insert(method_kir_name(&decl.name, mname), sig.clone());
        }
    }

    /// A generic template is validated for shape only; its concrete
    /// instances are validated again with substituted types.
    fn check_template_struct_shape(&mut self, decl: &StructDecl) {
        self.push_template_bindings(&decl.generic_params);
        let self_ty = Type::Generic {
            base: decl.name.clone(),
            args: decl
                .generic_params
                .iter()
                .map(|p| Type::TypeParam(p.clone()))
                .collect(),
        };
        self.validate_struct_shape(decl, &self_ty);
        self.pop_template_bindings();
    }

    /// Lifecycle rules: a plain struct may not (transitively) contain a
    /// raw pointer — an unsafe struct encapsulates its pointers behind
    /// hooks, so recursion stops there. Unsafe structs with pointer
    /// fields must define both hooks with exact signatures; hooks may
    /// not throw.
    fn validate_struct_shape(&mut self, decl: &StructDecl, self_ty: &Type) {
        let mut has_ptr_field = false;
        for field in &decl.fields {
            let ty = self.resolve_type(&field.ty);
            if ty.contains_ptr() {
                has_ptr_field = true;
            }
            if !decl.is_unsafe && self.type_exposes_ptr(&ty, &mut Vec::new()) {
                self.error_at(
                    error_codes::PTR_IN_PLAIN_STRUCT,
                    field.span,
                    format!(
                        "struct '{}' contains pointer field '{}' and requires 'unsafe struct'",
                        decl.name, field.name
                    ),
                );
            }
        }

        let destroy = decl.methods.iter().find(|m| m.name == "__destroy");
        let oncopy = decl.methods.iter().find(|m| m.name == "__oncopy");

        if decl.is_unsafe && has_ptr_field {
            if destroy.is_none() {
                self.error_at(
                    error_codes::MISSING_LIFECYCLE_HOOK,
                    decl.span,
                    format!(
                        "unsafe struct '{}' with pointer fields must define '__destroy'",
                        decl.name
                    ),
                );
            }
            if oncopy.is_none() {
                self.error_at(
                    error_codes::MISSING_LIFECYCLE_HOOK,
                    decl.span,
                    format!(
                        "unsafe struct '{}' with pointer fields must define '__oncopy'",
                        decl.name
                    ),
                );
            }
        }

        if let Some(hook) = destroy {
            self.validate_hook(hook, self_ty, &Type::Void);
        }
        if let Some(hook) = oncopy {
            self.validate_hook(hook, self_ty, self_ty);
        }
    }

    fn validate_hook(&mut self, hook: &Function, self_ty: &Type, expected_ret: &Type) {
        if !hook.throws.is_empty() {
            self.error_at(
                error_codes::HOOK_SIGNATURE,
                hook.span,
                format!("lifecycle hook '{}' may not declare 'throws'", hook.name),
            );
        }
        if hook.params.len() != 1 || hook.params[0].name != "self" {
            self.error_at(
                error_codes::HOOK_SIGNATURE,
                hook.span,
                format!(
                    "lifecycle hook '{}' must take exactly one parameter named 'self'",
                    hook.name
                ),
            );
            return;
        }
        let param_ty = self.resolve_type(&hook.params[0].ty);
        if !param_ty.is_error() && param_ty != *self_ty {
            self.error_at(
                error_codes::HOOK_SIGNATURE,
                hook.params[0].span,
                format!(
                    "'self' parameter of '{}' must have type {}, found {}",
                    hook.name, self_ty, param_ty
                ),
            );
        }
        let ret = hook
            .return_type
            .as_ref()
            .map(|t| self.resolve_type(t))
            .unwrap_or(Type::Void);
        if !ret.is_error() && ret != *expected_ret {
            self.error_at(
                error_codes::HOOK_SIGNATURE,
                hook.span,
                format!(
                    "lifecycle hook '{}' must return {}, found {}",
                    hook.name, expected_ret, ret
                ),
            );
        }
    }

    fn collect_enum(&mut self, decl: &EnumDecl) {
        let base = decl
            .base_type
            .as_ref()
            .map(|t| self.resolve_type(t))
            .unwrap_or(I32);
        if !base.is_int() && !base.is_error() {
            self.error_at(
                error_codes::TYPE_MISMATCH,
                decl.span,
                format!("enum base type must be an integer type, found {}", base),
            );
        }

        let mut variants: Vec<VariantInfo> = Vec::new();
        for (tag, variant) in decl.variants.iter().enumerate() {
            if variants.iter().any(|v| v.name == variant.name) {
                self.error_at(
                    error_codes::DUPLICATE_VARIANT,
                    variant.span,
                    format!(
                        "duplicate variant '{}' in enum '{}'",
                        variant.name, decl.name
                    ),
                );
                continue;
            }
            let fields = variant
                .fields
                .iter()
                .map(|t| self.resolve_type(t))
                .collect();
            variants.push(VariantInfo {
                name: variant.name.clone(),
                fields,
                tag: tag as u64,
            });
        }

        if let Some(info) = self.enums.get_mut(&decl.name) {
            info.base = base;
            info.variants = variants;
        }
    }

    pub(crate) fn build_fn_sig(&mut self, func: &Function, is_extern: bool) -> FunctionSig {
        if !func.generic_params.is_empty() {
            self.push_template_bindings(&func.generic_params);
        }
        let params = func
            .params
            .iter()
            .map(|p| ParamSig {
                name: p.name.clone(),
                ty: self.resolve_type(&p.ty),
                is_mut: p.is_mut,
                is_move: p.is_move,
            })
            .collect();
        let ret = func
            .return_type
            .as_ref()
            .map(|t| self.resolve_type(t))
            .unwrap_or(Type::Void);
        let throws = func.throws.iter().map(|t| self.resolve_type(t)).collect();
        if !func.generic_params.is_empty() {
            self.pop_template_bindings();
        }
        FunctionSig {
            params,
            ret,
            throws,
            generic_params: func.generic_params.clone(),
            is_extern,
        }
    }

    fn collect_function(&mut self, func: &Function) {
        if !func.generic_params.is_empty() {
            let sig = self.build_fn_sig(func, false);
            if self.generic_fn_templates.contains_key(&func.name) {
                self.error_at(
                    error_codes::DUPLICATE_DEFINITION,
                    func.span,
                    format!("duplicate definition of generic function '{}'", func.name),
                );
                return;
            }
            self.generic_fn_templates
                .insert(func.name.clone(), func.clone());
            self.scopes.declare_global(
                &func.name,
                Symbol::Function {
                    overloads: vec![sig],
                },
            );
            return;
        }

        let sig = self.build_fn_sig(func, false);
        let existing = match self.scopes.lookup(&func.name) {
            Some(Symbol::Function { overloads }) => {
                Some(overloads.iter().any(|o| same_signature(o, &sig)))
            }
            Some(_) => None,
            None => {
                self.scopes.declare_global(
                    &func.name,
                    Symbol::Function {
                        overloads: vec![sig.clone()],
                    },
                );
                self.assign_overload_names(&func.name);
                return;
            }
        };
        match existing {
            Some(true) => {
                self.error_at(
                    error_codes::DUPLICATE_DEFINITION,
                    func.span,
                    format!("duplicate definition of function '{}'", func.name),
                );
            }
            Some(false) => {
                if let Some(Symbol::Function { overloads }) = self.scopes.lookup_mut(&func.name) {
                    overloads.push(sig);
                }
                self.assign_overload_names(&func.name);
            }
            None => {
                self.error_at(
                    error_codes::DUPLICATE_DEFINITION,
                    func.span,
                    format!("'{}' is already defined", func.name),
                );
            }
        }
    }

    /// Recompute KIR names for a free function's overload set: a single
    /// overload keeps the source name, further ones get param-mangled
    /// names.
    fn assign_overload_names(&mut self, name: &str) {
        let overloads = match self.scopes.lookup(name) {
            Some(Symbol::Function { overloads }) => overloads.clone(),
            _ => return,
        };
        let mut names = Vec::new();
        for sig in &overloads {
            let kir_name = if overloads.len() == 1 {
                name.to_string()
            } else {
                let mut mangled = name.to_string();
                for p in &sig.params {
                    mangled.push('_');
                    mangled.push_str(&mangle_type_name(&p.ty));
                }
                mangled
            };
            self.functions.insert(kir_name.clone(), sig.clone());
            names.push(kir_name);
        }
        // a name that stopped being the single overload loses its bare key
        if overloads.len() == 2 {
            self.functions.remove(name);
        }
        self.fn_overload_names.insert(name.to_string(), names);
    }

    fn collect_extern(&mut self, func: &ExternFunction) {
        let params = func
            .params
            .iter()
            .map(|p| ParamSig {
                name: p.name.clone(),
                ty: self.resolve_type(&p.ty),
                is_mut: p.is_mut,
                is_move: p.is_move,
            })
            .collect();
        let ret = func
            .return_type
            .as_ref()
            .map(|t| self.resolve_type(t))
            .unwrap_or(Type::Void);
        let sig = FunctionSig {
            params,
            ret,
            throws: Vec::new(),
            generic_params: Vec::new(),
            is_extern: true,
        };
        if self.scopes.lookup(&func.name).is_some() {
            self.error_at(
                error_codes::DUPLICATE_DEFINITION,
                func.span,
                format!("'{}' is already defined", func.name),
            );
            return;
        }
        self.scopes.declare_global(
            &func.name,
            Symbol::Function {
                overloads: vec![sig.clone()],
            },
        );
        self.functions.insert(func.name.clone(), sig.clone());
        self.externs.push((func.name.clone(), sig));
        self.fn_overload_names
            .insert(func.name.clone(), vec![func.name.clone()]);
    }

    // ==================== Phase 3: bodies ====================

    fn check_bodies(&mut self, program: &Program) {
        let mut overload_seen: HashMap<String, usize> = HashMap::new();

        for decl in &program.decls {
            match decl {
                Decl::Function(func) if func.generic_params.is_empty() => {
                    let index = {
                        let counter = overload_seen.entry(func.name.clone()).or_insert(0);
                        let index = *counter;
                        *counter += 1;
                        index
                    };
                    let kir_name = self
                        .fn_overload_names
                        .get(&func.name)
                        .and_then(|names| names.get(index))
                        .cloned()
                        .unwrap_or_else(|| func.name.clone());
                    let sig = match self.functions.get(&kir_name) {
                        Some(sig) => sig.clone(),
                        None => continue,
                    };
                    self.check_function_body(func, &sig, None);
                    self.lowered_fns.push(LoweredFn {
                        kir_name,
                        decl: func.clone(),
                        sig,
                        self_type: None,
                    });
                }
                Decl::Function(func) => self.check_template_function(func),
                Decl::Struct(s) if s.generic_params.is_empty() => {
                    let self_ty = Type::Struct {
                        name: s.name.clone(),
                    };
                    for method in &s.methods {
                        let sig = match self
                            .structs
                            .get(&s.name)
                            .and_then(|info| info.methods.get(&method.name))
                        {
                            Some(sig) => sig.clone(),
                            None => continue,
                        };
                        self.check_function_body(method, &sig, Some(&self_ty));
                        self.lowered_fns.push(LoweredFn {
                            kir_name: method_kir_name(&s.name, &method.name),
                            decl: method.clone(),
                            sig,
                            self_type: Some(self_ty.clone()),
                        });
                    }
                }
                Decl::Struct(s) => {
                    self.push_template_bindings(&s.generic_params);
                    self.in_template = true;
                    let self_ty = Type::Generic {
                        base: s.name.clone(),
                        args: s
                            .generic_params
                            .iter()
                            .map(|p| Type::TypeParam(p.clone()))
                            .collect(),
                    };
                    for method in &s.methods {
                        let sig = self.build_fn_sig(method, false);
                        self.check_function_body(method, &sig, Some(&self_ty));
                    }
                    self.in_template = false;
                    self.pop_template_bindings();
                }
                Decl::Static(s) => self.check_static(s),
                _ => {}
            }
        }
    }

    fn check_template_function(&mut self, func: &Function) {
        self.push_template_bindings(&func.generic_params);
        self.in_template = true;
        let sig = self.build_fn_sig(func, false);
        self.check_function_body(func, &sig, None);
        self.in_template = false;
        self.pop_template_bindings();
    }

    fn check_static(&mut self, decl: &StaticDecl) {
        let declared = self.resolve_type(&decl.ty);
        let value_ty = self.check_expr(&decl.value);
        if !self.assignable_with_literal(&decl.value, &value_ty, &declared) {
            self.error_at(
                error_codes::TYPE_MISMATCH,
                decl.value.span,
                format!(
                    "static '{}' declared as {} but initialized with {}",
                    decl.name, declared, value_ty
                ),
            );
        }
        if !is_const_expr(&decl.value) {
            self.error_at(
                error_codes::TYPE_MISMATCH,
                decl.value.span,
                format!("static '{}' initializer must be a constant", decl.name),
            );
        }
        self.statics.push((decl.clone(), declared));
    }

    pub(crate) fn check_function_body(
        &mut self,
        func: &Function,
        sig: &FunctionSig,
        _self_type: Option<&Type>,
    ) {
        self.scopes.push(false, false);
        for param in &sig.params {
            self.scopes.declare(
                &param.name,
                Symbol::Variable {
                    ty: param.ty.clone(),
                    is_mut: param.is_mut,
                    moved: false,
                },
            );
        }
        let saved_ctx = self.fn_ctx.replace(FnCtx {
            ret: sig.ret.clone(),
            throws: sig.throws.clone(),
        });
        self.check_block_stmts(&func.body);
        self.fn_ctx = saved_ctx;
        self.scopes.pop();
    }

    // ==================== template binding helpers ====================

    pub(crate) fn push_template_bindings(&mut self, params: &[String]) {
        let map = params
            .iter()
            .map(|p| (p.clone(), Type::TypeParam(p.clone())))
            .collect();
        self.type_param_bindings.push(map);
    }

    pub(crate) fn pop_template_bindings(&mut self) {
        self.type_param_bindings.pop();
    }

    pub(crate) fn lookup_type_param(&self, name: &str) -> Option<Type> {
        self.type_param_bindings
            .iter()
            .rev()
            .find_map(|map| map.get(name).cloned())
    }

    // ==================== type resolution ====================

    pub(crate) fn resolve_type(&mut self, te: &TypeExpr) -> Type {
        match &te.kind {
            TypeExprKind::Named(name) => self.resolve_named_type(name, te.span),
            TypeExprKind::Generic { name, args } => match name.as_str() {
                "ptr" => {
                    let inner = self.resolve_single_arg(name, args, te.span);
                    Type::Ptr(Box::new(inner))
                }
                "slice" | "dynarray" => {
                    let inner = self.resolve_single_arg(name, args, te.span);
                    Type::Slice(Box::new(inner))
                }
                "array" => self.resolve_array_type(args, te.span),
                _ => self.resolve_generic_struct_type(name, args, te.span),
            },
        }
    }

    fn resolve_named_type(&mut self, name: &str, span: Span) -> Type {
        if let Some(bound) = self.lookup_type_param(name) {
            return bound;
        }
        if let Some(prim) = primitive_type(name) {
            return prim;
        }
        if matches!(name, "ptr" | "array" | "slice" | "dynarray") {
            self.error_at(
                error_codes::EXPECTED_TYPE,
                span,
                format!("type '{}' requires type arguments", name),
            );
            return Type::Error;
        }
        if self.structs.contains_key(name) {
            return Type::Struct {
                name: name.to_string(),
            };
        }
        if self.enums.contains_key(name) {
            return Type::Enum {
                name: name.to_string(),
            };
        }
        if let Some(alias) = self.aliases.get(name) {
            return alias.clone();
        }
        if self.generic_struct_templates.contains_key(name) {
            self.error_at(
                error_codes::EXPECTED_TYPE,
                span,
                format!("generic struct '{}' requires type arguments", name),
            );
            return Type::Error;
        }
        if let Some(ty) = self.scopes.lookup_type(name) {
            return ty.clone();
        }
        let candidates = self.scopes.visible_type_names();
        let mut all: Vec<String> = self.structs.keys().cloned().collect();
        all.extend(self.enums.keys().cloned());
        all.extend(candidates);
        let suggestions = kei_diagnostics::fuzzy::find_similar_names(name, &all, 0.75, 1);
        let mut message = format!("Undefined type '{}'", name);
        if let Some(hint) = suggestions.first() {
            message.push_str(&format!(" (did you mean '{}'?)", hint));
        }
        self.error_at(error_codes::UNDEFINED_TYPE, span, message);
        Type::Error
    }

    fn resolve_single_arg(&mut self, name: &str, args: &[TypeExpr], span: Span) -> Type {
        if args.len() != 1 {
            self.error_at(
                error_codes::ARITY_MISMATCH,
                span,
                format!("'{}' takes exactly one type argument", name),
            );
            return Type::Error;
        }
        self.resolve_type(&args[0])
    }

    fn resolve_array_type(&mut self, args: &[TypeExpr], span: Span) -> Type {
        if args.is_empty() || args.len() > 2 {
            self.error_at(
                error_codes::ARITY_MISMATCH,
                span,
                "'array' takes an element type and an optional length".to_string(),
            );
            return Type::Error;
        }
        let elem = self.resolve_type(&args[0]);
        let len = match args.get(1) {
            Some(arg) => match arg_as_length(arg) {
                Some(len) => Some(len),
                None => {
                    self.error_at(
                        error_codes::EXPECTED_TYPE,
                        arg.span,
                        "array length must be an integer literal".to_string(),
                    );
                    None
                }
            },
            None => None,
        };
        Type::Array {
            elem: Box::new(elem),
            len,
        }
    }

    fn resolve_generic_struct_type(
        &mut self,
        name: &str,
        args: &[TypeExpr],
        span: Span,
    ) -> Type {
        let resolved: Vec<Type> = args.iter().map(|a| self.resolve_type(a)).collect();
        let template_params = match self.generic_struct_templates.get(name) {
            Some(t) => t.generic_params.len(),
            None => {
                self.error_at(
                    error_codes::UNDEFINED_TYPE,
                    span,
                    format!("Undefined generic type '{}'", name),
                );
                return Type::Error;
            }
        };
        if resolved.len() != template_params {
            self.error_at(
                error_codes::ARITY_MISMATCH,
                span,
                format!(
                    "'{}' takes {} type argument{}, found {}",
                    name,
                    template_params,
                    if template_params == 1 { "" } else { "s" },
                    resolved.len()
                ),
            );
            return Type::Error;
        }
        if resolved.iter().any(Type::is_error) {
            return Type::Error;
        }
        if resolved.iter().any(Type::is_generic_dependent) {
            return Type::Generic {
                base: name.to_string(),
                args: resolved,
            };
        }
        self.monomorphize_struct(name, &resolved, span)
    }

    // ==================== finalize ====================

    fn finalize(mut self) -> Analysis {
        // synthesize autoDestroy/autoOncopy: a struct without a user hook
        // whose fields transitively carry hooks gets the recursive flag
        let names: Vec<String> = self.structs.keys().cloned().collect();
        for name in &names {
            let auto_destroy = !self.structs[name].has_destroy_hook
                && self.struct_fields_need(name, true, &mut Vec::new());
            let auto_oncopy = !self.structs[name].has_oncopy_hook
                && self.struct_fields_need(name, false, &mut Vec::new());
            if let Some(info) = self.structs.get_mut(name) {
                info.auto_destroy = auto_destroy;
                info.auto_oncopy = auto_oncopy;
            }
        }

        Analysis {
            type_map: self.type_map,
            generic_resolutions: self.generic_resolutions,
            call_targets: self.call_targets,
            call_throws: self.call_throws,
            binding_types: self.binding_types,
            builtin_calls: self.builtin_calls,
            structs: self.structs,
            enums: self.enums,
            mono_structs: self.mono_structs,
            mono_fns: self.mono_fns,
            functions: self.functions,
            externs: self.externs,
            statics: self.statics,
            lowered_fns: self.lowered_fns,
        }
    }

    fn struct_fields_need(&self, name: &str, destroy: bool, visiting: &mut Vec<String>) -> bool {
        if visiting.iter().any(|n| n == name) {
            return false;
        }
        visiting.push(name.to_string());
        let result = match self.structs.get(name) {
            Some(info) => info
                .fields
                .iter()
                .any(|(_, ty)| self.type_needs_lifecycle(ty, destroy, visiting)),
            None => false,
        };
        visiting.pop();
        result
    }

    /// A raw pointer reachable without crossing an unsafe struct
    /// boundary.
    fn type_exposes_ptr(&self, ty: &Type, visiting: &mut Vec<String>) -> bool {
        match ty {
            Type::Ptr(_) => true,
            Type::Array { elem, .. } => self.type_exposes_ptr(elem, visiting),
            Type::Slice(elem) => self.type_exposes_ptr(elem, visiting),
            Type::Struct { name } => match self.structs.get(name) {
                Some(info) if !info.is_unsafe => {
                    if visiting.iter().any(|n| n == name) {
                        return false;
                    }
                    visiting.push(name.clone());
                    let result = info
                        .fields
                        .iter()
                        .any(|(_, field_ty)| self.type_exposes_ptr(field_ty, visiting));
                    visiting.pop();
                    result
                }
                _ => false,
            },
            _ => false,
        }
    }

    fn type_needs_lifecycle(&self, ty: &Type, destroy: bool, visiting: &mut Vec<String>) -> bool {
        match ty {
            Type::Struct { name } => match self.structs.get(name) {
                Some(info) => {
                    let has_hook = if destroy {
                        info.has_destroy_hook
                    } else {
                        info.has_oncopy_hook
                    };
                    has_hook || self.struct_fields_need(name, destroy, visiting)
                }
                None => false,
            },
            Type::Array { elem, .. } => self.type_needs_lifecycle(elem, destroy, visiting),
            _ => false,
        }
    }
}

pub(crate) fn method_kir_name(struct_name: &str, method: &str) -> String {
    format!("{}_{}", struct_name, method)
}

fn same_signature(a: &FunctionSig, b: &FunctionSig) -> bool {
    a.params.len() == b.params.len()
        && a.params
            .iter()
            .zip(&b.params)
            .all(|(x, y)| types_equal(&x.ty, &y.ty))
}

fn arg_as_length(arg: &TypeExpr) -> Option<u64> {
    match &arg.kind {
        TypeExprKind::Named(name) => name.replace('_', "").parse().ok(),
        _ => None,
    }
}

fn is_const_expr(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::IntLiteral { .. }
        | ExprKind::FloatLiteral { .. }
        | ExprKind::StringLiteral(_)
        | ExprKind::BoolLiteral(_)
        | ExprKind::NullLiteral => true,
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => is_const_expr(operand),
        ExprKind::Group(inner) => is_const_expr(inner),
        _ => false,
    }
}

/// Highest expression node id in the program, so instantiated clones get
/// fresh ids beyond it.
fn max_node_id(program: &Program) -> NodeId {
    let mut max = 0;
    generics::walk_program_exprs(program, &mut |expr| {
        if expr.id > max {
            max = expr.id;
        }
    });
    max
}
