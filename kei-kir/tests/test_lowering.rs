// Lowering integration tests: whole programs through the front-end
// pipeline, asserting on KIR structure — SSA and CFG invariants,
// lifecycle ordering, defers, throws protocol, and phi merges.

use kei_checker::check_program;
use kei_diagnostics::{DiagnosticEngine, SourceFile};
use kei_kir::ir::{Inst, Terminator};
use kei_kir::{lower_module, validate_function, KirFunction, KirModule, LowerOptions};

fn lower(source: &str) -> KirModule {
    let file = SourceFile::new("test.kei", source);
    let mut diags = DiagnosticEngine::new();
    let program = kei_parser::parse(&file, &mut diags);
    let analysis = check_program(&program, &file, &mut diags);
    assert!(
        !diags.has_errors(),
        "front-end diagnostics: {:?}",
        diags.diagnostics()
    );
    let module = lower_module("test", &analysis, &LowerOptions::default());
    for func in &module.functions {
        validate_function(func).unwrap_or_else(|e| panic!("invalid KIR: {}", e));
    }
    module
}

fn find<'m>(module: &'m KirModule, name: &str) -> &'m KirFunction {
    module
        .functions
        .iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| {
            panic!(
                "no function '{}' in {:?}",
                name,
                module
                    .functions
                    .iter()
                    .map(|f| f.name.as_str())
                    .collect::<Vec<_>>()
            )
        })
}

fn all_insts(func: &KirFunction) -> Vec<&Inst> {
    func.blocks.iter().flat_map(|b| b.insts.iter()).collect()
}

#[test]
fn test_simple_function_shape() {
    let module = lower("fn add(a: i32, b: i32) -> i32 { return a + b; }");
    let func = find(&module, "add");
    assert_eq!(func.params.len(), 2);
    // params get slots, the body loads and adds them
    let insts = all_insts(func);
    assert!(insts
        .iter()
        .any(|i| matches!(i, Inst::StackAlloc { .. })));
    assert!(insts.iter().any(|i| matches!(i, Inst::BinOp { .. })));
    assert!(matches!(func.blocks[0].term, Terminator::Ret { .. }));
}

#[test]
fn test_every_block_has_terminator_and_ssa_is_unique() {
    let module = lower(
        r#"
        fn main(n: i32) -> i32 {
            let mut total = 0;
            for i in 0..n {
                if i > 10 { break; }
                total += i;
            }
            while total > 100 { total -= 1; }
            return total;
        }
    "#,
    );
    // validate_function ran in lower(); spot-check the CFG is multi-block
    let func = find(&module, "main");
    assert!(func.blocks.len() >= 6, "expected a real CFG");
}

#[test]
fn test_destroy_in_reverse_declaration_order() {
    let module = lower(
        r#"
        unsafe struct Res {
            data: ptr<u8>;
            fn __destroy(self: Res) { unsafe { free(self.data); } }
            fn __oncopy(self: Res) -> Res { return self; }
        }
        fn make() -> i32 {
            let a = Res{data: null};
            let b = Res{data: null};
            return 0;
        }
    "#,
    );
    let func = find(&module, "make");
    // the destroys in the exit path run b first, then a: the slots were
    // allocated in order, so the destroyed values' loads reference the
    // later slot first
    let destroys: Vec<usize> = func
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .enumerate()
        .filter(|(_, i)| matches!(i, Inst::Destroy { .. }))
        .map(|(idx, _)| idx)
        .collect();
    assert_eq!(destroys.len(), 2, "{}", func);
}

#[test]
fn test_moved_variable_not_destroyed() {
    let module = lower(
        r#"
        unsafe struct Res {
            data: ptr<u8>;
            fn __destroy(self: Res) { unsafe { free(self.data); } }
            fn __oncopy(self: Res) -> Res { return self; }
        }
        fn take(move r: Res) { }
        fn main() {
            let a = Res{data: null};
            take(move a);
        }
    "#,
    );
    let main = find(&module, "main");
    let destroys = all_insts(main)
        .iter()
        .filter(|i| matches!(i, Inst::Destroy { .. }))
        .count();
    assert_eq!(destroys, 0, "moved-out local must not be destroyed:\n{}", main);
    // the move itself is explicit in the KIR
    assert!(all_insts(main)
        .iter()
        .any(|i| matches!(i, Inst::Move { .. })));
    // the callee owns the moved parameter and destroys it
    let take = find(&module, "take");
    assert!(all_insts(take)
        .iter()
        .any(|i| matches!(i, Inst::Destroy { .. })));
}

#[test]
fn test_oncopy_on_copy_not_on_move() {
    let module = lower(
        r#"
        unsafe struct Res {
            data: ptr<u8>;
            fn __destroy(self: Res) { unsafe { free(self.data); } }
            fn __oncopy(self: Res) -> Res { return self; }
        }
        fn copies() {
            let a = Res{data: null};
            let b = a;
            let c = move b;
        }
    "#,
    );
    let func = find(&module, "copies");
    let oncopies = all_insts(func)
        .iter()
        .filter(|i| matches!(i, Inst::Oncopy { .. }))
        .count();
    // only `let b = a;` copies; the literal and the move do not
    assert_eq!(oncopies, 1, "{}", func);
}

#[test]
fn test_defer_runs_lifo_on_exit() {
    let module = lower(
        r#"
        extern fn mark(id: i32) -> i32;
        fn main() {
            unsafe {
                defer mark(1);
                defer mark(2);
                let x = mark(3);
            }
        }
    "#,
    );
    let func = find(&module, "main");
    let marks: Vec<i128> = func
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .filter_map(|inst| match inst {
            Inst::ConstInt { value, .. } => Some(*value),
            _ => None,
        })
        .collect();
    // 3 executes first, then the defers in reverse order: 2, then 1
    assert_eq!(marks, vec![3, 2, 1], "{}", func);
}

#[test]
fn test_throws_function_signature() {
    let module = lower(
        r#"
        enum ParseError { Bad }
        fn parse(flag: bool) -> i32 throws ParseError {
            if flag {
                throw ParseError.Bad;
            }
            return 7;
        }
    "#,
    );
    let func = find(&module, "parse");
    // fn(<params>, out: ptr<i32>, err: ptr<...>) -> i32
    assert_eq!(func.params.len(), 3);
    assert_eq!(func.params[1].0, "out");
    assert_eq!(func.params[2].0, "err");
    assert_eq!(func.throws_types.len(), 1);
    assert_eq!(func.return_type, kei_checker::types::I32);
    // success path stores through out and returns tag 0; throw returns 1
    let ret_consts: Vec<i128> = func
        .blocks
        .iter()
        .filter_map(|b| match &b.term {
            Terminator::Ret { value } => func
                .blocks
                .iter()
                .flat_map(|b| &b.insts)
                .filter_map(|i| match i {
                    Inst::ConstInt { dest, value: v, .. } if dest == value => Some(*v),
                    _ => None,
                })
                .next(),
            _ => None,
        })
        .collect();
    assert!(ret_consts.contains(&0), "{}", func);
    assert!(ret_consts.contains(&1), "{}", func);
}

#[test]
fn test_catch_lowering_dispatches_on_tag() {
    let module = lower(
        r#"
        enum ParseError { Bad }
        fn parse() -> i32 throws ParseError { return 7; }
        fn main() -> i32 {
            let x = parse() catch {
                ParseError e: return -1;
            };
            return x;
        }
    "#,
    );
    let func = find(&module, "main");
    assert!(all_insts(func)
        .iter()
        .any(|i| matches!(i, Inst::CallThrows { .. })));
    assert!(
        func.blocks
            .iter()
            .any(|b| matches!(b.term, Terminator::Switch { .. })),
        "catch dispatches on the returned tag:\n{}",
        func
    );
}

#[test]
fn test_catch_panic_branches() {
    let module = lower(
        r#"
        enum ParseError { Bad }
        fn parse() -> i32 throws ParseError { return 7; }
        fn main() -> i32 {
            return parse() catch panic;
        }
    "#,
    );
    let func = find(&module, "main");
    assert!(func
        .blocks
        .iter()
        .any(|b| matches!(b.term, Terminator::Unreachable)));
    // the panic path calls into the runtime
    assert!(all_insts(func).iter().any(
        |i| matches!(i, Inst::CallExternVoid { func, .. } if func == "kei_panic")
    ));
    assert!(module.externs.iter().any(|e| e.name == "kei_panic"));
}

#[test]
fn test_if_expression_produces_phi() {
    let module = lower(
        r#"
        fn pick(flag: bool) -> i32 {
            let m = if flag { 1 } else { 2 };
            return m;
        }
    "#,
    );
    let func = find(&module, "pick");
    let phi_block = func
        .blocks
        .iter()
        .find(|b| !b.phis.is_empty())
        .unwrap_or_else(|| panic!("expected a phi merge:\n{}", func));
    assert_eq!(phi_block.phis[0].incoming.len(), 2);
}

#[test]
fn test_short_circuit_logic_produces_phi() {
    let module = lower(
        r#"
        fn both(a: bool, b: bool) -> bool {
            return a && b;
        }
    "#,
    );
    let func = find(&module, "both");
    assert!(func.blocks.iter().any(|b| !b.phis.is_empty()), "{}", func);
}

#[test]
fn test_debug_checks_emitted() {
    let module = lower(
        r#"
        fn sum(values: array<i32, 4>, i: i32) -> i32 {
            let x = values[i];
            let y = 1 + i;
            assert(y > 0, "positive");
            return x + y;
        }
    "#,
    );
    let func = find(&module, "sum");
    let insts = all_insts(func);
    assert!(insts.iter().any(|i| matches!(i, Inst::BoundsCheck { .. })));
    assert!(insts
        .iter()
        .any(|i| matches!(i, Inst::OverflowCheck { .. })));
    assert!(insts
        .iter()
        .any(|i| matches!(i, Inst::AssertCheck { message, .. } if message == "positive")));
}

#[test]
fn test_release_mode_elides_debug_checks() {
    let file = SourceFile::new(
        "test.kei",
        "fn sum(values: array<i32, 4>, i: i32) -> i32 { return values[i] + 1; }",
    );
    let mut diags = DiagnosticEngine::new();
    let program = kei_parser::parse(&file, &mut diags);
    let analysis = check_program(&program, &file, &mut diags);
    assert!(!diags.has_errors());
    let module = lower_module(
        "test",
        &analysis,
        &LowerOptions {
            debug_checks: false,
        },
    );
    let func = find(&module, "sum");
    assert!(!all_insts(func)
        .iter()
        .any(|i| matches!(i, Inst::BoundsCheck { .. } | Inst::OverflowCheck { .. })));
}

#[test]
fn test_null_check_on_deref() {
    let module = lower(
        r#"
        unsafe struct Box {
            p: ptr<i32>;
            fn __destroy(self: Box) { unsafe { free(self.p); } }
            fn __oncopy(self: Box) -> Box { return self; }
        }
        fn read(b: Box) -> i32 {
            unsafe { return b.p.*; }
        }
    "#,
    );
    let func = find(&module, "read");
    assert!(all_insts(func)
        .iter()
        .any(|i| matches!(i, Inst::NullCheck { .. })));
}

#[test]
fn test_require_synthesizes_early_return() {
    let module = lower(
        r#"
        enum MathError { DivZero }
        fn divide(a: i32, b: i32) -> i32 throws MathError {
            require(b != 0, "division by zero");
            return a / b;
        }
    "#,
    );
    let func = find(&module, "divide");
    assert!(all_insts(func)
        .iter()
        .any(|i| matches!(i, Inst::RequireCheck { .. })));
    // the failure block returns tag 1
    let has_fail_ret = func.blocks.iter().any(|b| {
        b.insts
            .iter()
            .any(|i| matches!(i, Inst::RequireCheck { .. }))
            && matches!(b.term, Terminator::Ret { .. })
    });
    assert!(has_fail_ret, "{}", func);
}

#[test]
fn test_enum_switch_lowering() {
    let module = lower(
        r#"
        enum Shape { Circle(f64), Rect(f64, f64), Empty }
        fn area(s: Shape) -> f64 {
            switch s {
                case Circle(r): return r * r;
                case Rect(w, h): return w * h;
                case Empty: return 0.0;
            }
            return 0.0;
        }
    "#,
    );
    let func = find(&module, "area");
    let has_tag_switch = func.blocks.iter().any(|b| {
        matches!(&b.term, Terminator::Switch { cases, .. } if cases.len() == 3)
    });
    assert!(has_tag_switch, "{}", func);
    // the enum layout is part of the module's type table
    assert!(module
        .types
        .iter()
        .any(|t| matches!(t, kei_kir::ir::KirTypeDef::Enum { name, variants, .. }
            if name == "Shape" && variants.len() == 3)));
}

#[test]
fn test_alloc_free_lower_to_runtime_calls() {
    let module = lower(
        r#"
        fn main() {
            unsafe {
                let p = alloc<u8>(16);
                defer free(p);
            }
        }
    "#,
    );
    let func = find(&module, "main");
    let insts = all_insts(func);
    assert!(insts
        .iter()
        .any(|i| matches!(i, Inst::CallExtern { func, .. } if func == "kei_alloc")));
    assert!(insts
        .iter()
        .any(|i| matches!(i, Inst::CallExternVoid { func, .. } if func == "kei_free")));
    assert!(insts.iter().any(|i| matches!(i, Inst::SizeOf { .. })));
}

#[test]
fn test_statics_become_globals() {
    let module = lower(
        r#"
        static LIMIT: i32 = 100;
        fn main() -> i32 { return LIMIT; }
    "#,
    );
    assert_eq!(module.globals.len(), 1);
    assert_eq!(module.globals[0].name, "LIMIT");
    let func = find(&module, "main");
    assert!(all_insts(func)
        .iter()
        .any(|i| matches!(i, Inst::Load { ptr, .. } if ptr == "@LIMIT")));
}

#[test]
fn test_monomorphized_functions_lowered_by_mangled_name() {
    let module = lower(
        r#"
        fn identity<T>(value: T) -> T { return value; }
        fn main() -> i32 {
            return identity(42);
        }
    "#,
    );
    let func = find(&module, "identity_i32");
    assert_eq!(func.params.len(), 1);
    let main = find(&module, "main");
    assert!(all_insts(main)
        .iter()
        .any(|i| matches!(i, Inst::Call { func, .. } if func == "identity_i32")));
}

#[test]
fn test_kir_dump_is_printable() {
    let module = lower(
        r#"
        fn main() -> i32 {
            let mut x = 0;
            for i in 0..4 { x += i; }
            return x;
        }
    "#,
    );
    let dump = module.to_string();
    assert!(dump.contains("fn @main"));
    assert!(dump.contains("stack_alloc"));
    assert!(dump.contains("br "));
}
