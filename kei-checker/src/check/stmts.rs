// Statement checking: bindings, control flow, and the conservative
// branch rule for moves — if any branch may move a variable, it counts
// as moved after the join.

use super::*;
use crate::scope::Symbol;

impl Checker<'_> {
    pub(crate) fn check_block(&mut self, block: &Block, is_unsafe: bool, is_loop: bool) {
        self.scopes.push(is_unsafe, is_loop);
        self.check_block_stmts(block);
        self.scopes.pop();
    }

    pub(crate) fn check_block_stmts(&mut self, block: &Block) {
        for stmt in &block.stmts {
            self.check_stmt(stmt);
        }
    }

    pub(crate) fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(block) => self.check_block(block, false, false),
            StmtKind::Unsafe(block) => self.check_block(block, true, false),
            StmtKind::Let {
                name,
                is_mut,
                ty,
                value,
            } => self.check_binding(stmt.span, name, *is_mut, ty.as_ref(), value),
            StmtKind::Const { name, ty, value } => {
                self.check_binding(stmt.span, name, false, ty.as_ref(), value)
            }
            StmtKind::Return(value) => self.check_return(stmt.span, value.as_ref()),
            StmtKind::If {
                cond,
                then_block,
                else_branch,
            } => {
                self.check_condition(cond);

                let base = self.scopes.moved_snapshot();
                self.check_block(then_block, false, false);
                let after_then = self.scopes.moved_snapshot();
                self.scopes.restore_moved(&base);

                let after_else = match else_branch {
                    Some(else_branch) => {
                        self.check_stmt(else_branch);
                        let snapshot = self.scopes.moved_snapshot();
                        self.scopes.restore_moved(&base);
                        snapshot
                    }
                    None => base.clone(),
                };

                self.scopes.join_moved(&[after_then, after_else]);
            }
            StmtKind::While { cond, body } => {
                self.check_condition(cond);
                let base = self.scopes.moved_snapshot();
                self.check_block(body, false, true);
                let after_body = self.scopes.moved_snapshot();
                self.scopes.restore_moved(&base);
                self.scopes.join_moved(&[after_body]);
            }
            StmtKind::For { var, iter, body } => {
                let iter_ty = self.check_expr(iter);
                let elem = match &iter_ty {
                    Type::Range(elem) => (**elem).clone(),
                    Type::Array { elem, .. } => (**elem).clone(),
                    Type::Slice(elem) => (**elem).clone(),
                    Type::Error => Type::Error,
                    other => {
                        self.error_at(
                            error_codes::TYPE_MISMATCH,
                            iter.span,
                            format!("cannot iterate over a value of type {}", other),
                        );
                        Type::Error
                    }
                };

                let base = self.scopes.moved_snapshot();
                self.scopes.push(false, true);
                self.scopes.declare(
                    var,
                    Symbol::Variable {
                        ty: elem,
                        is_mut: false,
                        moved: false,
                    },
                );
                self.check_block_stmts(body);
                self.scopes.pop();
                let after_body = self.scopes.moved_snapshot();
                self.scopes.restore_moved(&base);
                self.scopes.join_moved(&[after_body]);
            }
            StmtKind::Switch {
                scrutinee,
                cases,
                default,
            } => self.check_switch(scrutinee, cases, default.as_ref()),
            StmtKind::Defer(inner) => self.check_stmt(inner),
            StmtKind::Break => {
                if !self.scopes.inside_loop() {
                    self.error_at(
                        error_codes::BREAK_OUTSIDE_LOOP,
                        stmt.span,
                        "'break' outside of a loop".to_string(),
                    );
                }
            }
            StmtKind::Continue => {
                if !self.scopes.inside_loop() {
                    self.error_at(
                        error_codes::BREAK_OUTSIDE_LOOP,
                        stmt.span,
                        "'continue' outside of a loop".to_string(),
                    );
                }
            }
            StmtKind::Expr { expr, .. } => {
                self.check_expr(expr);
            }
            StmtKind::Assert { cond, message } => self.check_runtime_check(cond, message.as_ref()),
            StmtKind::Require { cond, message } => {
                self.check_runtime_check(cond, message.as_ref())
            }
        }
    }

    fn check_binding(
        &mut self,
        span: Span,
        name: &str,
        is_mut: bool,
        ty: Option<&TypeExpr>,
        value: &Expr,
    ) {
        let declared = ty.map(|t| self.resolve_type(t));
        let value_ty = self.check_expr(value);

        let final_ty = match declared {
            Some(declared) => {
                if !self.assignable_with_literal(value, &value_ty, &declared) {
                    if self.is_int_literal_overflow(value, &value_ty, &declared) {
                        self.error_at(
                            error_codes::LITERAL_OUT_OF_RANGE,
                            value.span,
                            format!("integer literal out of range for type {}", declared),
                        );
                    } else {
                        self.error_at(
                            error_codes::TYPE_MISMATCH,
                            value.span,
                            format!(
                                "cannot initialize '{}' of type {} with a value of type {}",
                                name, declared, value_ty
                            ),
                        );
                    }
                }
                declared
            }
            None => {
                if value_ty == Type::Null {
                    self.error_at(
                        error_codes::CANNOT_INFER,
                        span,
                        format!("cannot infer the type of '{}' from 'null'", name),
                    );
                    Type::Error
                } else if value_ty == Type::Void {
                    self.error_at(
                        error_codes::TYPE_MISMATCH,
                        value.span,
                        format!("cannot bind '{}' to a void expression", name),
                    );
                    Type::Error
                } else {
                    value_ty
                }
            }
        };

        self.binding_types.insert(value.id, final_ty.clone());
        self.scopes.declare(
            name,
            Symbol::Variable {
                ty: final_ty,
                is_mut,
                moved: false,
            },
        );
    }

    fn check_return(&mut self, span: Span, value: Option<&Expr>) {
        let expected = match &self.fn_ctx {
            Some(ctx) => ctx.ret.clone(),
            None => return,
        };
        match value {
            Some(value) => {
                let actual = self.check_expr(value);
                if expected == Type::Void && !actual.is_error() && actual != Type::Void {
                    self.error_at(
                        error_codes::RETURN_TYPE,
                        value.span,
                        "function without a return type cannot return a value".to_string(),
                    );
                } else if !self.assignable_with_literal(value, &actual, &expected) {
                    self.error_at(
                        error_codes::RETURN_TYPE,
                        value.span,
                        format!(
                            "return type mismatch: expected {}, found {}",
                            expected, actual
                        ),
                    );
                }
            }
            None => {
                if expected != Type::Void && !expected.is_error() {
                    self.error_at(
                        error_codes::RETURN_TYPE,
                        span,
                        format!("expected a return value of type {}", expected),
                    );
                }
            }
        }
    }

    pub(crate) fn check_condition(&mut self, cond: &Expr) {
        let ty = self.check_expr(cond);
        if !ty.is_error() && ty != Type::Bool && !self.suppressed(&[&ty]) {
            self.error_at(
                error_codes::INVALID_CONDITION,
                cond.span,
                format!("condition must be 'bool', found {}", ty),
            );
        }
    }

    fn check_runtime_check(&mut self, cond: &Expr, message: Option<&Expr>) {
        self.check_condition(cond);
        if let Some(message) = message {
            let ty = self.check_expr(message);
            if !ty.is_error() && ty != Type::Str {
                self.error_at(
                    error_codes::TYPE_MISMATCH,
                    message.span,
                    format!("check message must be a string, found {}", ty),
                );
            }
        }
    }

    fn check_switch(&mut self, scrutinee: &Expr, cases: &[SwitchCase], default: Option<&Block>) {
        let scrut_ty = self.check_expr(scrutinee);

        let enum_info = match &scrut_ty {
            Type::Enum { name } => self.enums.get(name).cloned(),
            _ => None,
        };

        let base = self.scopes.moved_snapshot();
        let mut outcomes = Vec::new();
        let mut covered: Vec<String> = Vec::new();

        for case in cases {
            self.scopes.push(false, false);
            match (&case.pattern, &enum_info) {
                (CasePattern::Variant { name, bindings }, Some(info)) => {
                    match info.variants.iter().find(|v| v.name == *name) {
                        Some(variant) => {
                            if covered.contains(name) {
                                self.error_at(
                                    error_codes::DUPLICATE_VARIANT,
                                    case.span,
                                    format!("duplicate case for variant '{}'", name),
                                );
                            } else {
                                covered.push(name.clone());
                            }
                            if bindings.len() != variant.fields.len() {
                                self.error_at(
                                    error_codes::ARITY_MISMATCH,
                                    case.span,
                                    format!(
                                        "variant '{}' has {} field{}, pattern binds {}",
                                        name,
                                        variant.fields.len(),
                                        if variant.fields.len() == 1 { "" } else { "s" },
                                        bindings.len()
                                    ),
                                );
                            }
                            for (binding, field_ty) in bindings.iter().zip(&variant.fields) {
                                self.scopes.declare(
                                    binding,
                                    Symbol::Variable {
                                        ty: field_ty.clone(),
                                        is_mut: false,
                                        moved: false,
                                    },
                                );
                            }
                        }
                        None => {
                            self.error_at(
                                error_codes::NO_SUCH_FIELD,
                                case.span,
                                format!("enum '{}' has no variant '{}'", info.name, name),
                            );
                        }
                    }
                }
                (CasePattern::Variant { name, .. }, None) => {
                    if !scrut_ty.is_error() && !self.suppressed(&[&scrut_ty]) {
                        self.error_at(
                            error_codes::TYPE_MISMATCH,
                            case.span,
                            format!(
                                "variant pattern '{}' on non-enum scrutinee of type {}",
                                name, scrut_ty
                            ),
                        );
                    }
                }
                (CasePattern::Literal(expr), _) => {
                    let lit_ty = self.check_expr(expr);
                    if enum_info.is_some() {
                        self.error_at(
                            error_codes::TYPE_MISMATCH,
                            expr.span,
                            "switch on an enum requires variant patterns".to_string(),
                        );
                    } else if !self.assignable_with_literal(expr, &lit_ty, &scrut_ty)
                        && !self.assignable_with_literal(expr, &scrut_ty, &lit_ty)
                    {
                        self.error_at(
                            error_codes::TYPE_MISMATCH,
                            expr.span,
                            format!(
                                "case value of type {} does not match scrutinee type {}",
                                lit_ty, scrut_ty
                            ),
                        );
                    }
                }
            }

            self.check_block_stmts(&case.body);
            self.scopes.pop();
            outcomes.push(self.scopes.moved_snapshot());
            self.scopes.restore_moved(&base);
        }

        if let Some(default) = default {
            self.check_block(default, false, false);
            outcomes.push(self.scopes.moved_snapshot());
            self.scopes.restore_moved(&base);
        }

        self.scopes.join_moved(&outcomes);

        if let Some(info) = &enum_info {
            if default.is_none() {
                let missing: Vec<&str> = info
                    .variants
                    .iter()
                    .filter(|v| !covered.contains(&v.name))
                    .map(|v| v.name.as_str())
                    .collect();
                if !missing.is_empty() {
                    self.error_at(
                        error_codes::NON_EXHAUSTIVE_SWITCH,
                        scrutinee.span,
                        format!(
                            "switch on enum '{}' does not cover variant{}: {}",
                            info.name,
                            if missing.len() == 1 { "" } else { "s" },
                            missing.join(", ")
                        ),
                    );
                }
            }
        }
    }
}
