// Parser integration tests: precedence, generic disambiguation, spans,
// recovery.

use kei_ast::*;
use kei_diagnostics::{DiagnosticEngine, SourceFile};
use kei_parser::Parser;

fn parse_ok(source: &str) -> Program {
    let file = SourceFile::new("test.kei", source);
    let mut diags = DiagnosticEngine::new();
    let program = Parser::new(&file, &mut diags).parse_program();
    assert!(
        !diags.has_errors(),
        "unexpected diagnostics: {:?}",
        diags.diagnostics()
    );
    program
}

fn parse_with_errors(source: &str) -> (Program, usize) {
    let file = SourceFile::new("test.kei", source);
    let mut diags = DiagnosticEngine::new();
    let program = Parser::new(&file, &mut diags).parse_program();
    (program, diags.error_count())
}

/// First expression of the first function body.
fn first_expr(program: &Program) -> &Expr {
    for decl in &program.decls {
        if let Decl::Function(func) = decl {
            for stmt in &func.body.stmts {
                match &stmt.kind {
                    StmtKind::Expr { expr, .. } => return expr,
                    StmtKind::Let { value, .. } => return value,
                    StmtKind::Return(Some(value)) => return value,
                    _ => {}
                }
            }
        }
    }
    panic!("no expression found");
}

#[test]
fn test_precedence_mul_over_add() {
    let program = parse_ok("fn main() -> i32 { return 1 + 2 * 3; }");
    let expr = first_expr(&program);
    match &expr.kind {
        ExprKind::Binary { op, lhs, rhs } => {
            assert_eq!(*op, BinaryOp::Add);
            assert!(matches!(
                lhs.kind,
                ExprKind::IntLiteral { value: 1, .. }
            ));
            match &rhs.kind {
                ExprKind::Binary { op, .. } => assert_eq!(*op, BinaryOp::Mul),
                other => panic!("expected nested mul, got {:?}", other),
            }
        }
        other => panic!("expected binary add, got {:?}", other),
    }
}

#[test]
fn test_comparison_chain_precedence() {
    let program = parse_ok("fn f() -> bool { return 1 + 2 < 3 << 1; }");
    let expr = first_expr(&program);
    // (1 + 2) < (3 << 1)
    match &expr.kind {
        ExprKind::Binary { op, lhs, rhs } => {
            assert_eq!(*op, BinaryOp::Lt);
            assert!(matches!(
                lhs.kind,
                ExprKind::Binary {
                    op: BinaryOp::Add,
                    ..
                }
            ));
            assert!(matches!(
                rhs.kind,
                ExprKind::Binary {
                    op: BinaryOp::Shl,
                    ..
                }
            ));
        }
        other => panic!("expected comparison, got {:?}", other),
    }
}

#[test]
fn test_assignment_right_associative() {
    let program = parse_ok("fn f() { a = b = c; }");
    let expr = first_expr(&program);
    match &expr.kind {
        ExprKind::Assign { op: None, value, .. } => {
            assert!(matches!(value.kind, ExprKind::Assign { .. }));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn test_generic_call_disambiguation() {
    let program = parse_ok("fn main() { f<i32, bool>(a, b); }");
    let expr = first_expr(&program);
    match &expr.kind {
        ExprKind::Call {
            type_args, args, ..
        } => {
            assert_eq!(type_args.len(), 2);
            assert_eq!(type_args[0].name(), "i32");
            assert_eq!(type_args[1].name(), "bool");
            assert_eq!(args.len(), 2);
        }
        other => panic!("expected generic call, got {:?}", other),
    }
}

#[test]
fn test_less_than_is_not_generic() {
    // a < b, c > d inside an argument list stays two comparisons
    let program = parse_ok("fn main() { g(a < b, c > d); }");
    let expr = first_expr(&program);
    match &expr.kind {
        ExprKind::Call {
            type_args, args, ..
        } => {
            assert!(type_args.is_empty());
            assert_eq!(args.len(), 2);
            assert!(matches!(
                args[0].kind,
                ExprKind::Binary {
                    op: BinaryOp::Lt,
                    ..
                }
            ));
            assert!(matches!(
                args[1].kind,
                ExprKind::Binary {
                    op: BinaryOp::Gt,
                    ..
                }
            ));
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_generic_struct_literal() {
    let program = parse_ok("fn main() { let p = Pair<i32, bool>{a: 1, b: true}; }");
    let expr = first_expr(&program);
    match &expr.kind {
        ExprKind::StructLiteral {
            name,
            type_args,
            fields,
        } => {
            assert_eq!(name, "Pair");
            assert_eq!(type_args.len(), 2);
            assert_eq!(fields.len(), 2);
        }
        other => panic!("expected struct literal, got {:?}", other),
    }
}

#[test]
fn test_nested_generic_args_split_shr() {
    let program = parse_ok("fn main() { let b = f<ptr<ptr<u8>>>(x); }");
    let expr = first_expr(&program);
    match &expr.kind {
        ExprKind::Call { type_args, .. } => {
            assert_eq!(type_args.len(), 1);
            match &type_args[0].kind {
                TypeExprKind::Generic { name, args } => {
                    assert_eq!(name, "ptr");
                    assert!(matches!(&args[0].kind, TypeExprKind::Generic { name, .. } if name == "ptr"));
                }
                other => panic!("expected nested generic, got {:?}", other),
            }
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_shift_right_survives_failed_speculation() {
    // `a < b >> c` must stay a comparison against a shift even though the
    // speculative parse narrows the `>>` token before backtracking
    let program = parse_ok("fn main() { let r = a < b >> c; }");
    let expr = first_expr(&program);
    match &expr.kind {
        ExprKind::Binary { op, rhs, .. } => {
            assert_eq!(*op, BinaryOp::Lt);
            assert!(matches!(
                rhs.kind,
                ExprKind::Binary {
                    op: BinaryOp::Shr,
                    ..
                }
            ));
        }
        other => panic!("expected comparison of shift, got {:?}", other),
    }
}

#[test]
fn test_range_groups_with_additive() {
    let program = parse_ok("fn main() { for i in 0..n + 1 { } }");
    let decl = &program.decls[0];
    let Decl::Function(func) = decl else {
        panic!("expected function")
    };
    let StmtKind::For { iter, .. } = &func.body.stmts[0].kind else {
        panic!("expected for")
    };
    match &iter.kind {
        ExprKind::Range { end, .. } => {
            // 0..(n + 1)
            assert!(matches!(
                end.kind,
                ExprKind::Binary {
                    op: BinaryOp::Add,
                    ..
                }
            ));
        }
        other => panic!("expected range, got {:?}", other),
    }
}

#[test]
fn test_range_chaining_rejected() {
    let (_, errors) = parse_with_errors("fn main() { let r = 0..1..2; }");
    assert!(errors >= 1);
}

#[test]
fn test_postfix_forms() {
    let program = parse_ok("fn main() { buf.data.*[i] = x++; }");
    let expr = first_expr(&program);
    match &expr.kind {
        ExprKind::Assign { target, value, .. } => {
            assert!(matches!(target.kind, ExprKind::Index { .. }));
            assert!(matches!(value.kind, ExprKind::Increment(_)));
            let ExprKind::Index { object, .. } = &target.kind else {
                unreachable!()
            };
            assert!(matches!(object.kind, ExprKind::Deref(_)));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn test_cast_and_catch_postfix() {
    let program = parse_ok("fn main() { let x = read() catch panic; let y = x as u8; }");
    let Decl::Function(func) = &program.decls[0] else {
        panic!()
    };
    let StmtKind::Let { value, .. } = &func.body.stmts[0].kind else {
        panic!()
    };
    assert!(matches!(
        value.kind,
        ExprKind::Catch {
            handler: CatchHandler::Panic,
            ..
        }
    ));
    let StmtKind::Let { value, .. } = &func.body.stmts[1].kind else {
        panic!()
    };
    assert!(matches!(value.kind, ExprKind::Cast { .. }));
}

#[test]
fn test_catch_block_arms() {
    let source = r#"
        fn main() {
            let v = parse() catch {
                ParseError e: return 1;
                default e: {
                    return 2;
                }
            };
        }
    "#;
    let program = parse_ok(source);
    let Decl::Function(func) = &program.decls[0] else {
        panic!()
    };
    let StmtKind::Let { value, .. } = &func.body.stmts[0].kind else {
        panic!()
    };
    let ExprKind::Catch {
        handler: CatchHandler::Block { arms },
        ..
    } = &value.kind
    else {
        panic!("expected catch block, got {:?}", value.kind)
    };
    assert_eq!(arms.len(), 2);
    assert_eq!(arms[0].error_type.as_deref(), Some("ParseError"));
    assert_eq!(arms[0].binding, "e");
    assert!(arms[1].error_type.is_none());
}

#[test]
fn test_if_expression_with_trailing_value() {
    let program = parse_ok("fn main() { let m = if a > b { a } else { b }; }");
    let expr = first_expr(&program);
    let ExprKind::If {
        then_block,
        else_block,
        ..
    } = &expr.kind
    else {
        panic!("expected if expression, got {:?}", expr.kind)
    };
    let StmtKind::Expr { semi, .. } = &then_block.stmts[0].kind else {
        panic!("expected trailing expression")
    };
    assert!(!semi);
    assert!(else_block.is_some());
}

#[test]
fn test_unsafe_struct_and_hooks_parse() {
    let source = r#"
        unsafe struct Buf {
            data: ptr<u8>;
            len: u64;
            fn __destroy(self: Buf) { }
            fn __oncopy(self: Buf) -> Buf { return self; }
        }
    "#;
    let program = parse_ok(source);
    let Decl::Struct(decl) = &program.decls[0] else {
        panic!("expected struct")
    };
    assert!(decl.is_unsafe);
    assert_eq!(decl.fields.len(), 2);
    assert_eq!(decl.methods.len(), 2);
    assert_eq!(decl.methods[0].name, "__destroy");
}

#[test]
fn test_declaration_forms() {
    let source = r#"
        import { io, fmt } from std.core;
        import std.mem;
        extern fn malloc(size: u64) -> ptr<u8>;
        static LIMIT: i32 = 100;
        type Id = u64;
        enum Shape { Circle(f64), Rect(f64, f64), Empty }
        pub fn area(s: Shape) -> f64 throws MathError { return 0.0; }
    "#;
    let program = parse_ok(source);
    assert_eq!(program.decls.len(), 7);
    // source order is preserved
    assert!(matches!(program.decls[0], Decl::Import(_)));
    assert!(matches!(program.decls[2], Decl::ExternFunction(_)));
    let Decl::Enum(e) = &program.decls[5] else {
        panic!()
    };
    assert_eq!(e.variants.len(), 3);
    assert_eq!(e.variants[0].fields.len(), 1);
    assert_eq!(e.variants[2].fields.len(), 0);
    let Decl::Function(f) = &program.decls[6] else {
        panic!()
    };
    assert!(f.is_pub);
    assert_eq!(f.throws.len(), 1);
}

#[test]
fn test_pub_rejected_on_import() {
    let (_, errors) = parse_with_errors("pub import std.io;");
    assert!(errors >= 1);
}

#[test]
fn test_well_formed_input_zero_diagnostics() {
    let source = r#"
        struct Point { x: i32; y: i32; }
        fn add(a: Point, b: Point) -> Point {
            return Point{x: a.x + b.x, y: a.y + b.y};
        }
        fn main() -> i32 {
            let p = add(Point{x: 1, y: 2}, Point{x: 3, y: 4});
            let mut total = 0;
            for i in 0..10 {
                total += p.x;
            }
            while total > 100 { total -= 1; }
            switch total {
                case 0: return 0;
                default: return total;
            }
        }
    "#;
    let file = SourceFile::new("test.kei", source);
    let mut diags = DiagnosticEngine::new();
    let _ = Parser::new(&file, &mut diags).parse_program();
    assert_eq!(diags.len(), 0, "{:?}", diags.diagnostics());
}

#[test]
fn test_recovery_collects_multiple_errors() {
    let source = r#"
        fn valid1() -> i32 { return 42; }
        fn broken1( { bad syntax here
        fn valid2() -> i32 { return 100; }
        fn broken2() -> { another error }
        fn valid3() -> i32 { return 200; }
    "#;
    let (program, errors) = parse_with_errors(source);
    assert!(errors >= 2, "should collect at least 2 errors, got {}", errors);
    // recovery keeps the valid functions
    let names: Vec<_> = program
        .decls
        .iter()
        .filter_map(|d| d.name().map(String::from))
        .collect();
    assert!(names.contains(&"valid1".to_string()));
    assert!(names.contains(&"valid3".to_string()));
}

#[test]
fn test_missing_semicolon_message() {
    let (_, errors) = parse_with_errors("fn main() { let x = 1; x + 1 let y = 2; }");
    assert!(errors >= 1);
    let file = SourceFile::new("test.kei", "fn main() { a() b() }");
    let mut diags = DiagnosticEngine::new();
    let _ = Parser::new(&file, &mut diags).parse_program();
    assert!(diags
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("expected ';' or '}'")));
}

#[test]
fn test_spans_nest() {
    let source = "fn main() -> i32 { return 1 + 2 * 3; }";
    let program = parse_ok(source);
    let Decl::Function(func) = &program.decls[0] else {
        panic!()
    };
    let stmt = &func.body.stmts[0];
    assert!(func.span.start <= stmt.span.start && stmt.span.end <= func.span.end);
    let StmtKind::Return(Some(expr)) = &stmt.kind else {
        panic!()
    };
    assert!(stmt.span.start <= expr.span.start && expr.span.end <= stmt.span.end);
    let ExprKind::Binary { lhs, rhs, .. } = &expr.kind else {
        panic!()
    };
    for child in [lhs, rhs] {
        assert!(expr.span.start <= child.span.start && child.span.end <= expr.span.end);
        assert!(child.span.start <= child.span.end);
    }
    // the expression re-lexes to the same text
    assert_eq!(&source[expr.span.start..expr.span.end], "1 + 2 * 3");
}

#[test]
fn test_expr_stmt_span_excludes_semicolon() {
    let source = "fn main() { f(); }";
    let program = parse_ok(source);
    let Decl::Function(func) = &program.decls[0] else {
        panic!()
    };
    let stmt = &func.body.stmts[0];
    assert_eq!(&source[stmt.span.start..stmt.span.end], "f()");
}

#[test]
fn test_defer_and_unsafe_statements() {
    let source = r#"
        fn main() {
            unsafe {
                let p = alloc<u8>(16);
                defer free(p);
            }
        }
    "#;
    let program = parse_ok(source);
    let Decl::Function(func) = &program.decls[0] else {
        panic!()
    };
    let StmtKind::Unsafe(block) = &func.body.stmts[0].kind else {
        panic!("expected unsafe block")
    };
    assert!(matches!(block.stmts[1].kind, StmtKind::Defer(_)));
}

#[test]
fn test_move_expression() {
    let program = parse_ok("fn main() { let b = move a; }");
    let expr = first_expr(&program);
    assert!(matches!(expr.kind, ExprKind::Move(_)));
}

#[test]
fn test_node_ids_unique() {
    let program = parse_ok("fn main() { let x = 1 + 2; let y = x * x; }");
    let mut ids = Vec::new();
    fn collect(expr: &Expr, ids: &mut Vec<NodeId>) {
        ids.push(expr.id);
        match &expr.kind {
            ExprKind::Binary { lhs, rhs, .. } => {
                collect(lhs, ids);
                collect(rhs, ids);
            }
            ExprKind::Group(inner) | ExprKind::Move(inner) => collect(inner, ids),
            _ => {}
        }
    }
    let Decl::Function(func) = &program.decls[0] else {
        panic!()
    };
    for stmt in &func.body.stmts {
        if let StmtKind::Let { value, .. } = &stmt.kind {
            collect(value, &mut ids);
        }
    }
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), ids.len(), "node ids must be unique");
}
