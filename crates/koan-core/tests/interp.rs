//! End-to-end interpreter tests: source text in, values out.

use koan_core::{ErrorKind, Interp, Kind, NodeId, Options, Tag};

fn interp() -> Interp {
    Interp::new(Options::default())
}

fn eval(src: &str) -> (Interp, NodeId) {
    let mut i = interp();
    let r = i.eval_source(src);
    (i, r)
}

fn eval_int(src: &str) -> u64 {
    let (i, r) = eval(src);
    match i.kind(r) {
        Kind::Integer(v) | Kind::Boolean(v) => v,
        other => panic!("expected an integer from {:?}, got {:?}", src, other),
    }
}

fn eval_float(src: &str) -> f64 {
    let (i, r) = eval(src);
    match i.kind(r) {
        Kind::Float(v) => v,
        other => panic!("expected a float from {:?}, got {:?}", src, other),
    }
}

fn eval_str(src: &str) -> String {
    let (i, r) = eval(src);
    i.render(r, false)
}

fn eval_error(src: &str) -> ErrorKind {
    let (i, r) = eval(src);
    match i.kind(r) {
        Kind::Error(kind) => kind,
        other => panic!("expected an error from {:?}, got {:?}", src, other),
    }
}

// ---- arithmetic and precedence ------------------------------------

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(eval_int("1 + 2 * 3;"), 7);
    assert_eq!(eval_int("(1+2)*3;"), 9);
}

#[test]
fn test_left_associativity() {
    assert_eq!(eval_int("10 - 3 - 2;"), 5);
    assert_eq!(eval_int("100 / 10 / 5;"), 2);
}

#[test]
fn test_mixed_promotes_to_float() {
    assert_eq!(eval_float("1 + 0.5;"), 1.5);
    assert_eq!(eval_float("2.0 * 3;"), 6.0);
}

#[test]
fn test_division_by_zero_is_zero() {
    assert_eq!(eval_int("1 / 0;"), 0);
    assert_eq!(eval_int("7 // 0;"), 0);
    assert_eq!(eval_float("1.0 / 0.0;"), 0.0);
}

#[test]
fn test_unary_minus_via_zen_broadcast() {
    // `-x` parses as an open subtraction filled with x.
    assert_eq!(eval_int("0 - (0 - 5);"), 5);
    assert_eq!(eval_int("5 + -3;"), 2);
}

#[test]
fn test_shift_counts_mod_64() {
    assert_eq!(eval_int("1 << 70;"), 1 << 6);
    assert_eq!(eval_int("256 >> 4;"), 16);
}

#[test]
fn test_comparison_and_logic() {
    assert_eq!(eval_int("1 < 2;"), 1);
    assert_eq!(eval_int("2 <> 2;"), 0);
    assert_eq!(eval_int("1 < 2 && 3 < 4;"), 1);
    assert_eq!(eval_int("1 > 2 || 3 > 4;"), 0);
}

#[test]
fn test_short_circuit_skips_right() {
    // The right side would be an unknown identifier; && must not
    // evaluate it.
    assert_eq!(eval_int("0 && no_such_name;"), 0);
    assert_eq!(eval_int("1 || no_such_name;"), 1);
}

// ---- declarations and assignment ----------------------------------

#[test]
fn test_tag_and_lookup() {
    assert_eq!(eval_int("x := 42; x;"), 42);
    assert_eq!(eval_int("x : 42; x;"), 42);
}

#[test]
fn test_assignment_updates() {
    assert_eq!(eval_int("x := 1; x = 5; x;"), 5);
    assert_eq!(eval_int("x := 1; x += 2; x;"), 3);
    assert_eq!(eval_int("x := 8; x <<= 1; x;"), 16);
}

#[test]
fn test_duplicate_tag_rejected() {
    assert_eq!(eval_error("x := 1; x := 2;"), ErrorKind::InvalidOperand);
}

#[test]
fn test_const_rejects_assignment() {
    assert_eq!(eval_error("k :: 1; k = 2;"), ErrorKind::InvalidReferent);
}

#[test]
fn test_tag_ref_aliases() {
    assert_eq!(eval_int("x := 1; y :^ x; y = 9; x;"), 9);
}

#[test]
fn test_exchange() {
    assert_eq!(eval_int("a := 1; b := 2; a >< b; a;"), 2);
    assert_eq!(eval_int("a := 1; b := 2; a >< b; b;"), 1);
}

#[test]
fn test_undefined_name_errors() {
    assert_eq!(eval_error("undefined_name;"), ErrorKind::InvalidIdentifier);
}

#[test]
fn test_unknown_operator_errors() {
    assert_eq!(eval_error("1 %% 2;"), ErrorKind::InvalidOperator);
}

// ---- environments as arrays and maps ------------------------------

#[test]
fn test_environment_as_map() {
    assert_eq!(eval_int("e := ['a':1; 'b':2]; e['a'] + e['b'];"), 3);
    assert_eq!(eval_int("e := ['a':1; 'b':2]; e.a + e.b;"), 3);
}

#[test]
fn test_array_subscript_and_slice() {
    assert_eq!(eval_int("a := [10,20,30,40]; a[1];"), 20);
    assert_eq!(eval_str("a := [10,20,30,40]; a[1..2];"), "[(20),(30)]");
}

#[test]
fn test_negative_subscript_is_an_error() {
    // Integer underflow must not wrap into a valid index.
    assert_eq!(
        eval_error("a := [1,2,3]; a[0 - 1];"),
        ErrorKind::InvalidOperand
    );
}

#[test]
fn test_array_element_assignment() {
    assert_eq!(eval_int("a := [1,2,3]; a[1] = 9; a[1];"), 9);
    // Assigning one past the end appends.
    assert_eq!(eval_int("a := [1,2]; a[2] = 7; a[2];"), 7);
    assert_eq!(
        eval_error("a := [1,2]; a[5] = 7;"),
        ErrorKind::InvalidOperand
    );
}

#[test]
fn test_array_copies_values() {
    // Elements are copied in by value; the source variable is
    // unaffected by element assignment.
    assert_eq!(eval_int("x := 5; a := [x]; a[0] = 9; x;"), 5);
}

#[test]
fn test_string_subscript_is_codepoint_indexed() {
    assert_eq!(eval_str("\"abc\"[1];"), "b");
    assert_eq!(eval_str("s := \"a\u{3c0}b\"; s[1];"), "\u{3c0}");
    assert_eq!(eval_str("\"hello\"[1..3];"), "ell");
}

#[test]
fn test_environment_comparison_is_elementwise() {
    assert_eq!(eval_int("[1,2] == [1,2];"), 1);
    // Element-wise: every pair must satisfy the relation.
    assert_eq!(eval_int("[1,2] < [2,3];"), 1);
    assert_eq!(eval_int("[1,2] < [1,3];"), 0);
}

#[test]
fn test_environment_shift() {
    assert_eq!(eval_str("[1,2,3] << 1;"), "[(2),(3)]");
    assert_eq!(eval_str("[1,2,3] <<> 1;"), "[(2),(3),(1)]");
}

// ---- strings and characters ---------------------------------------

#[test]
fn test_string_operations() {
    assert_eq!(eval_str("\"ab\" \"cd\";"), "abcd");
    assert_eq!(eval_str("3 \"ab\";"), "ababab");
    assert_eq!(eval_str("\"abcdef\" << 2;"), "cdef");
    assert_eq!(eval_int("length \"hello\";"), 5);
}

#[test]
fn test_character_literals() {
    assert_eq!(eval_str("`a` `b`;"), "ab");
    assert_eq!(eval_str("'esc\\ndone';"), "esc\ndone");
}

// ---- control flow -------------------------------------------------

#[test]
fn test_if_and_ifnot() {
    assert_eq!(eval_int("1 ? 10;"), 10);
    assert_eq!(eval_int("0 ? 10; 5;"), 5);
    assert_eq!(eval_int("0 ! 10;"), 10);
    // Assemblage right side: then; else.
    assert_eq!(eval_int("1 ? (10; 20);"), 10);
    assert_eq!(eval_int("0 ? (10; 20);"), 20);
}

#[test]
fn test_case_matching() {
    assert_eq!(
        eval_str("x := 5; x ?: (1..3 : \"low\"; 4..6 : \"mid\"; \"high\");"),
        "mid"
    );
    assert_eq!(
        eval_str("x := 2; x ?: (2 : \"two\"; \"other\");"),
        "two"
    );
    // A relational pattern with an open left side takes the scrutinee.
    assert_eq!(
        eval_str("x := 9; x ?: (< 5 : \"small\"; \"big\");"),
        "big"
    );
}

#[test]
fn test_generic_while() {
    assert_eq!(eval_int("n := 0; (n < 5) ?* { n = n + 1 }; n;"), 5);
}

#[test]
fn test_until_inverts() {
    assert_eq!(eval_int("n := 0; (n == 4) !* { n = n + 1 }; n;"), 4);
}

#[test]
fn test_loop_over_array_literal() {
    assert_eq!(
        eval_int("sum := 0; i : [1,2,3,4] ?* { sum = sum + i }; sum;"),
        10
    );
}

#[test]
fn test_loop_over_range() {
    assert_eq!(
        eval_int("sum := 0; i : 1..4 ?* { sum = sum + i }; sum;"),
        10
    );
    // Descending direction is inferred.
    assert_eq!(
        eval_str("out := \"\"; i : 3..1 ?* { out = out (to_String i) }; out;"),
        "321"
    );
}

#[test]
fn test_loop_over_sequence_via_binding() {
    assert_eq!(
        eval_int("sum := 0; s := (1, 2, 3); i : s ?* { sum = sum + i }; sum;"),
        6
    );
}

#[test]
fn test_loop_with_guard() {
    assert_eq!(
        eval_int("sum := 0; i : 1..10 && i < 4 ?* { sum = sum + i }; sum;"),
        6
    );
}

// ---- functions and operators --------------------------------------

#[test]
fn test_function_definition_and_call() {
    assert_eq!(eval_int("f(n) :: n + 1; f 4;"), 5);
    assert_eq!(eval_int("add2(a, b) :: a + b; add2(3, 4);"), 7);
}

#[test]
fn test_tagged_parameter_default() {
    assert_eq!(eval_int("g(a, b: 10) :: a + b; g 5;"), 15);
    assert_eq!(eval_int("g(a, b: 10) :: a + b; g(5, 1);"), 6);
}

#[test]
fn test_by_reference_parameter_writes_back() {
    assert_eq!(eval_int("bump(r) :: r = r + 1; x := 5; bump x; x;"), 6);
}

#[test]
fn test_recursion() {
    assert_eq!(
        eval_int("fact(n) :: (n < 2) ? (1; n * fact(n - 1)); fact 5;"),
        120
    );
}

#[test]
fn test_user_defined_operator() {
    assert_eq!(eval_int("\"**\"(a,b) :: a*b; 2 ** 3;"), 6);
}

#[test]
fn test_user_operator_with_explicit_precedence() {
    // Installed at the multiplicative level, so it binds tighter than
    // addition.
    assert_eq!(
        eval_int("(\"`mul`\")(\"%%%\")(a,b) :: a + a*b; 1 + 2 %%% 3;"),
        9
    );
}

#[test]
fn test_operator_alias_declaration() {
    assert_eq!(eval_int("\"\u{b1}\" :: \"`add`\"; 2 \u{b1} 3;"), 5);
}

#[test]
fn test_number_applied_to_function_calls_it() {
    assert_eq!(eval_int("double(n) :: n * 2; 21 double;"), 42);
}

#[test]
fn test_juxtaposition_multiplies_numbers() {
    assert_eq!(eval_int("6 7;"), 42);
}

// ---- quoting and reflection ---------------------------------------

#[test]
fn test_parse_returns_quoted_tree() {
    let (i, r) = eval("parse \"1 + 2\";");
    assert_eq!(i.kind(r).tag(), Tag::Quoted);
}

#[test]
fn test_eval_of_parse_evaluates() {
    assert_eq!(eval_int("eval(parse \"1 + 2\");"), 3);
    assert_eq!(eval_int("eval(parse \"x := 21; x * 2\");"), 42);
}

#[test]
fn test_sigil_reaches_system_environment() {
    assert_eq!(eval_int("@eval (parse \"40 + 2\");"), 42);
}

#[test]
fn test_type_inspection() {
    assert_eq!(eval_int("type 42;"), Tag::Integer as u64);
    assert_eq!(eval_str("type_name 4.5;"), "Float");
    assert_eq!(eval_int("is_String \"s\";"), 1);
    assert_eq!(eval_int("is_String 1;"), 0);
}

#[test]
fn test_conversions() {
    assert_eq!(eval_int("to_Integer \"123\";"), 123);
    assert_eq!(eval_float("to_Float 7;"), 7.0);
    assert_eq!(eval_str("to_String 42;"), "42");
    assert_eq!(eval_str("to_Literal 'a\\nb';"), "\"a\\nb\"");
}

// ---- the print round trip (display form re-parses) ----------------

#[test]
fn test_literal_round_trip() {
    // Numbers survive print-then-parse with the same display form.
    for literal in ["42;", "3.5;", "0.001;", "1000000.0;"] {
        let first = eval_str(literal);
        let again = eval_str(&format!("{};", first));
        assert_eq!(first, again, "literal {:?}", literal);
    }
    // Strings round-trip through their archival form.
    assert_eq!(eval_str("eval(parse(to_Literal 'hi there'));"), "hi there");
}

// ---- import -------------------------------------------------------

#[test]
fn test_import_runs_file_and_defines_globally() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.koan");
    std::fs::write(&path, "imported_x := 42;\nimported_x;\n").unwrap();

    let mut i = interp();
    let src = format!("import \"{}\"; imported_x;", path.display());
    let r = i.eval_source(&src);
    assert_eq!(i.kind(r), Kind::Integer(42));
}

#[test]
fn test_import_search_path_and_extension() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("mod.koan"), "from_mod := 7;\n").unwrap();

    let mut i = interp();
    i.add_search_path(dir.path().to_str().unwrap());
    let r = i.eval_source("import \"mod\"; from_mod;");
    assert_eq!(i.kind(r), Kind::Integer(7));
}

#[test]
fn test_import_missing_file_is_invalid_operand() {
    assert_eq!(
        eval_error("import \"no/such/file.koan\";"),
        ErrorKind::InvalidOperand
    );
}

#[test]
fn test_load_maps_file_to_string() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("text.koan");
    std::fs::write(&path, "payload").unwrap();

    let (i, r) = {
        let mut i = interp();
        let r = i.eval_source(&format!("load \"{}\";", path.display()));
        (i, r)
    };
    match i.kind(r) {
        Kind::String(s) => assert_eq!(i.str(s), "payload"),
        other => panic!("expected a string, got {:?}", other),
    }
}

// ---- files over the opaque types ----------------------------------

#[test]
fn test_file_write_then_read_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let src = format!(
        "f := open(\"{p}\", \"w\"); print_line_to(f, \"alpha\"); close f; \
         g := open(\"{p}\", \"r\"); read_line g;",
        p = path.display()
    );
    assert_eq!(eval_str(&src), "alpha");
}

#[test]
fn test_fpos_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pos.txt");
    std::fs::write(&path, "one\ntwo\n").unwrap();
    let src = format!(
        "f := open(\"{p}\", \"r\"); p := get_fpos f; read_line f; \
         set_fpos(f, p); read_line f;",
        p = path.display()
    );
    assert_eq!(eval_str(&src), "one");
}

// ---- errors as values ---------------------------------------------

#[test]
fn test_errors_propagate_through_operators() {
    assert_eq!(eval_error("1 + no_such;"), ErrorKind::InvalidIdentifier);
}

#[test]
fn test_error_rendering_carries_location() {
    let (i, r) = eval("no_such;");
    let text = i.render(r, false);
    assert!(text.contains("InvalidIdentifier"), "{}", text);
    assert!(text.starts_with("<>:1:"), "{}", text);
}

#[test]
fn test_error_constants_are_named() {
    let (i, r) = eval("@\"ERROR InvalidOperand\";");
    assert_eq!(i.kind(r), Kind::Error(ErrorKind::InvalidOperand));
}

// ---- scopes -------------------------------------------------------

#[test]
fn test_global_scope_operator() {
    // The right side evaluates in the globals, so the binding is
    // visible from everywhere afterwards.
    assert_eq!(eval_int("([:] (g := 3)); g;"), 3);
    assert_eq!(eval_int("f(x) :: ([:] (h := 7)); f 0; h;"), 7);
}

#[test]
fn test_environment_member_lookup() {
    assert_eq!(eval_int("e := ['v':9]; e v;"), 9);
}

#[test]
fn test_locals_do_not_leak() {
    assert_eq!(
        eval_error("f(x) :: (loc := x); f 1; loc;"),
        ErrorKind::InvalidIdentifier
    );
}

// ---- garbage collection under load --------------------------------

#[test]
fn test_long_loop_does_not_grow_heap() {
    let mut i = interp();
    i.eval_source("n := 0; (n < 10000) ?* { n = n + 1; \"tmp\" \"tmp\" }; n;");
    let live_after = {
        i.run_gc();
        i.heap.live()
    };
    // Residency stays bounded by the named scopes, not the iteration
    // count.
    assert!(live_after < 2000, "live = {}", live_after);

    let r = i.eval_source("n;");
    assert_eq!(i.kind(r), Kind::Integer(10000));
}

#[test]
fn test_collection_preserves_environment_graph() {
    let mut i = interp();
    i.eval_source("a := [1, [2, 3]];");
    for _ in 0..3 {
        i.run_gc();
    }
    let r = i.eval_source("a[1][0];");
    assert_eq!(i.kind(r), Kind::Integer(2));
}
