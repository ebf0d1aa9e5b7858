// Checker integration tests: whole programs through lexer + parser +
// checker, asserting on diagnostics and analysis side-tables.

use kei_checker::{check_program, Analysis};
use kei_diagnostics::{DiagnosticEngine, SourceFile};

fn check(source: &str) -> (Analysis, DiagnosticEngine) {
    let file = SourceFile::new("test.kei", source);
    let mut diags = DiagnosticEngine::new();
    let program = kei_parser::parse(&file, &mut diags);
    assert!(
        !diags.has_errors(),
        "parse errors: {:?}",
        diags.diagnostics()
    );
    let analysis = check_program(&program, &file, &mut diags);
    (analysis, diags)
}

fn check_ok(source: &str) -> Analysis {
    let (analysis, diags) = check(source);
    assert!(
        !diags.has_errors(),
        "unexpected diagnostics: {:?}",
        diags.diagnostics()
    );
    analysis
}

fn expect_error(source: &str, substring: &str) {
    let (_, diags) = check(source);
    assert!(
        diags
            .diagnostics()
            .iter()
            .any(|d| d.message.contains(substring)),
        "expected a diagnostic containing {:?}, got {:?}",
        substring,
        diags
            .diagnostics()
            .iter()
            .map(|d| d.message.as_str())
            .collect::<Vec<_>>()
    );
}

#[test]
fn test_well_typed_program() {
    check_ok(
        r#"
        struct Point { x: i32; y: i32; }
        fn add(a: Point, b: Point) -> Point {
            return Point{x: a.x + b.x, y: a.y + b.y};
        }
        fn main() -> i32 {
            let p = add(Point{x: 1, y: 2}, Point{x: 3, y: 4});
            return p.x;
        }
    "#,
    );
}

#[test]
fn test_undefined_variable_with_suggestion() {
    expect_error(
        "fn main() -> i32 { let count = 1; return countr; }",
        "Undefined variable 'countr'",
    );
}

#[test]
fn test_type_mismatch_on_let() {
    expect_error(
        "fn main() { let x: bool = 42; }",
        "cannot initialize 'x' of type bool",
    );
}

#[test]
fn test_integer_literal_overflow_is_error() {
    expect_error(
        "fn main() { let x: i8 = 300; }",
        "integer literal out of range for type i8",
    );
}

#[test]
fn test_literal_widening_allowed() {
    check_ok("fn main() { let x: u8 = 200; let y: i64 = 5; let f: f64 = 1; }");
}

#[test]
fn test_plain_struct_with_ptr_rejected() {
    expect_error(
        "struct Buf { data: ptr<u8>; }",
        "requires 'unsafe struct'",
    );
}

#[test]
fn test_unsafe_struct_missing_hooks() {
    let source = "unsafe struct Buf { data: ptr<u8>; }";
    expect_error(source, "must define '__destroy'");
    expect_error(source, "must define '__oncopy'");
}

#[test]
fn test_unsafe_struct_with_hooks_ok() {
    check_ok(
        r#"
        unsafe struct Buf {
            data: ptr<u8>;
            fn __destroy(self: Buf) { unsafe { free(self.data); } }
            fn __oncopy(self: Buf) -> Buf { return self; }
        }
    "#,
    );
}

#[test]
fn test_hook_signature_validated() {
    expect_error(
        r#"
        unsafe struct Buf {
            data: ptr<u8>;
            fn __destroy(self: Buf, extra: i32) { }
            fn __oncopy(self: Buf) -> Buf { return self; }
        }
    "#,
        "exactly one parameter named 'self'",
    );
    expect_error(
        r#"
        unsafe struct Buf {
            data: ptr<u8>;
            fn __destroy(self: Buf) -> i32 { return 0; }
            fn __oncopy(self: Buf) -> Buf { return self; }
        }
    "#,
        "must return void",
    );
}

#[test]
fn test_hooks_may_not_throw() {
    expect_error(
        r#"
        enum IoError { Failed }
        unsafe struct Buf {
            data: ptr<u8>;
            fn __destroy(self: Buf) throws IoError { }
            fn __oncopy(self: Buf) -> Buf { return self; }
        }
    "#,
        "may not declare 'throws'",
    );
}

#[test]
fn test_use_after_move() {
    expect_error(
        r#"
        struct Data { value: i32; }
        fn main() -> i32 {
            let a = Data{value: 42};
            let b = move a;
            return a.value;
        }
    "#,
        "use of moved variable 'a'",
    );
}

#[test]
fn test_move_in_branch_is_conservative() {
    expect_error(
        r#"
        struct Data { value: i32; }
        fn consume(move d: Data) { }
        fn main(flag: bool) -> i32 {
            let a = Data{value: 1};
            if flag {
                let b = move a;
            }
            return a.value;
        }
    "#,
        "use of moved variable 'a'",
    );
}

#[test]
fn test_reassignment_revives_moved_variable() {
    check_ok(
        r#"
        struct Data { value: i32; }
        fn main() -> i32 {
            let mut a = Data{value: 1};
            let b = move a;
            a = Data{value: 2};
            return a.value;
        }
    "#,
    );
}

#[test]
fn test_move_of_non_variable_rejected() {
    expect_error(
        r#"
        struct Data { value: i32; }
        fn main() {
            let a = Data{value: 1};
            let b = move a.value;
        }
    "#,
        "'move' requires a variable",
    );
}

#[test]
fn test_unsafe_gating() {
    expect_error(
        "fn main() { let p = alloc<u8>(16); }",
        "requires an unsafe block",
    );
    expect_error(
        r#"
        extern fn getchar() -> i32;
        fn main() { let c = getchar(); }
    "#,
        "requires an unsafe block",
    );
    check_ok(
        r#"
        extern fn getchar() -> i32;
        fn main() { let c = unsafe { getchar() }; }
    "#,
    );
}

#[test]
fn test_deref_requires_unsafe() {
    expect_error(
        r#"
        unsafe struct Box {
            p: ptr<i32>;
            fn __destroy(self: Box) { }
            fn __oncopy(self: Box) -> Box { return self; }
        }
        fn read(b: Box) -> i32 { return b.p.*; }
    "#,
        "raw pointer dereference requires an unsafe block",
    );
}

#[test]
fn test_throws_requires_catch_or_declaration() {
    expect_error(
        r#"
        enum ParseError { Bad }
        fn parse() -> i32 throws ParseError { return 1; }
        fn main() { let x = parse(); }
    "#,
        "must be caught with 'catch' or declared",
    );
    check_ok(
        r#"
        enum ParseError { Bad }
        fn parse() -> i32 throws ParseError { return 1; }
        fn main() { let x = parse() catch panic; }
        fn forward() -> i32 throws ParseError { return parse(); }
    "#,
    );
}

#[test]
fn test_catch_block_exhaustiveness() {
    expect_error(
        r#"
        enum ParseError { Bad }
        enum IoError { Closed }
        fn load() -> i32 throws ParseError, IoError { return 1; }
        fn main() {
            let x = load() catch {
                ParseError e: panic("bad");
            };
        }
    "#,
        "catch does not handle error type",
    );
    check_ok(
        r#"
        enum ParseError { Bad }
        enum IoError { Closed }
        fn load() -> i32 throws ParseError, IoError { return 1; }
        fn main() {
            let x = load() catch {
                ParseError e: panic("bad");
                default e: panic("other");
            };
        }
    "#,
    );
}

#[test]
fn test_throw_must_be_declared() {
    expect_error(
        r#"
        enum ParseError { Bad }
        enum IoError { Closed }
        fn f() -> i32 throws ParseError {
            throw IoError.Closed;
        }
    "#,
        "not declared in the function's 'throws' clause",
    );
}

#[test]
fn test_monomorphization_identity() {
    let analysis = check_ok(
        r#"
        struct Pair<A, B> { a: A; b: B; }
        fn main() {
            let p = Pair<i32, bool>{a: 1, b: true};
            let q = Pair<i32, bool>{a: 2, b: false};
        }
    "#,
    );
    assert!(analysis.mono_structs.contains_key("Pair_i32_bool"));
    assert_eq!(
        analysis.mono_structs.len(),
        1,
        "both literals share one instance"
    );
    // both literal sites resolve to the same mangled name
    let resolutions: Vec<&String> = analysis.generic_resolutions.values().collect();
    assert_eq!(resolutions.len(), 2);
    assert!(resolutions.iter().all(|r| *r == "Pair_i32_bool"));
}

#[test]
fn test_generic_function_inference() {
    let analysis = check_ok(
        r#"
        fn identity<T>(value: T) -> T { return value; }
        fn main() -> i32 {
            let x = identity(42);
            let b = identity(true);
            return x;
        }
    "#,
    );
    assert!(analysis.mono_fns.contains_key("identity_i32"));
    assert!(analysis.mono_fns.contains_key("identity_bool"));
}

#[test]
fn test_cannot_infer_type_parameter() {
    expect_error(
        r#"
        struct Empty<T> { marker: i32; }
        fn main() {
            let e = Empty{marker: 1};
        }
    "#,
        "cannot infer type parameter 'T'",
    );
}

#[test]
fn test_generic_struct_methods_instantiate() {
    let analysis = check_ok(
        r#"
        struct Holder<T> {
            value: T;
            fn get(self: Holder<T>) -> T { return self.value; }
        }
        fn main() -> i32 {
            let h = Holder<i32>{value: 7};
            return h.get();
        }
    "#,
    );
    assert!(analysis.structs.contains_key("Holder_i32"));
    assert!(analysis
        .lowered_fns
        .iter()
        .any(|f| f.kir_name == "Holder_i32_get"));
}

#[test]
fn test_overload_resolution() {
    let analysis = check_ok(
        r#"
        fn describe(x: i32) -> i32 { return 1; }
        fn describe(x: bool) -> i32 { return 2; }
        fn main() -> i32 {
            return describe(5) + describe(true);
        }
    "#,
    );
    // overloads get param-mangled KIR names
    assert!(analysis.functions.contains_key("describe_i32"));
    assert!(analysis.functions.contains_key("describe_bool"));
}

#[test]
fn test_duplicate_signature_rejected() {
    expect_error(
        r#"
        fn f(x: i32) { }
        fn f(y: i32) { }
    "#,
        "duplicate definition of function 'f'",
    );
}

#[test]
fn test_duplicate_method_rejected() {
    expect_error(
        r#"
        struct S {
            x: i32;
            fn get(self: S) -> i32 { return self.x; }
            fn get(self: S) -> i32 { return 0; }
        }
    "#,
        "duplicate method 'get'",
    );
}

#[test]
fn test_duplicate_enum_variant_rejected() {
    expect_error(
        "enum Color { Red, Red }",
        "duplicate variant 'Red'",
    );
}

#[test]
fn test_switch_exhaustiveness() {
    expect_error(
        r#"
        enum Color { Red, Green, Blue }
        fn name(c: Color) -> i32 {
            switch c {
                case Red: return 0;
                case Green: return 1;
            }
            return 2;
        }
    "#,
        "does not cover variant",
    );
    check_ok(
        r#"
        enum Color { Red, Green, Blue }
        fn name(c: Color) -> i32 {
            switch c {
                case Red: return 0;
                default: return 9;
            }
            return 2;
        }
    "#,
    );
}

#[test]
fn test_switch_payload_bindings() {
    check_ok(
        r#"
        enum Shape { Circle(f64), Rect(f64, f64) }
        fn area(s: Shape) -> f64 {
            switch s {
                case Circle(r): return r * r;
                case Rect(w, h): return w * h;
            }
            return 0.0;
        }
    "#,
    );
}

#[test]
fn test_immutable_assignment_rejected() {
    expect_error(
        "fn main() { let x = 1; x = 2; }",
        "cannot assign to immutable variable 'x'",
    );
    check_ok("fn main() { let mut x = 1; x = 2; x += 3; }");
}

#[test]
fn test_condition_must_be_bool() {
    expect_error("fn main() { if 1 { } }", "condition must be 'bool'");
}

#[test]
fn test_break_outside_loop() {
    let file = SourceFile::new("test.kei", "fn main() { break; }");
    let mut diags = DiagnosticEngine::new();
    let program = kei_parser::parse(&file, &mut diags);
    let _ = check_program(&program, &file, &mut diags);
    assert!(diags
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("'break' outside of a loop")));
}

#[test]
fn test_typed_expressions_recorded() {
    let analysis = check_ok(
        r#"
        fn main() -> i32 {
            let x = 1 + 2;
            return x;
        }
    "#,
    );
    // every recorded expression type in a non-template function is
    // concrete
    assert!(!analysis.type_map.is_empty());
    for ty in analysis.type_map.values() {
        assert!(
            !matches!(ty, kei_checker::types::Type::TypeParam(_)),
            "unexpected type parameter in type map"
        );
    }
}

#[test]
fn test_if_expression_types() {
    check_ok("fn main(flag: bool) -> i32 { let m = if flag { 1 } else { 2 }; return m; }");
    expect_error(
        "fn main(flag: bool) { let m = if flag { 1 } else { true }; }",
        "mismatched types",
    );
}

#[test]
fn test_extern_collected() {
    let analysis = check_ok(
        r#"
        extern fn malloc(size: u64) -> ptr<u8>;
        fn main() { }
    "#,
    );
    assert_eq!(analysis.externs.len(), 1);
    assert!(analysis.functions.contains_key("malloc"));
}

#[test]
fn test_auto_lifecycle_flags() {
    let analysis = check_ok(
        r#"
        unsafe struct Inner {
            data: ptr<u8>;
            fn __destroy(self: Inner) { unsafe { free(self.data); } }
            fn __oncopy(self: Inner) -> Inner { return self; }
        }
        struct Outer { inner: Inner; count: i32; }
        struct Plain { count: i32; }
        fn main() { }
    "#,
    );
    let outer = &analysis.structs["Outer"];
    assert!(outer.auto_destroy, "Outer recursively destroys Inner");
    assert!(outer.auto_oncopy);
    let plain = &analysis.structs["Plain"];
    assert!(!plain.auto_destroy);
    assert!(!plain.auto_oncopy);
    use kei_checker::types::Type;
    assert!(analysis.needs_destroy(&Type::Struct {
        name: "Outer".to_string()
    }));
    assert!(!analysis.needs_destroy(&Type::Struct {
        name: "Plain".to_string()
    }));
}
