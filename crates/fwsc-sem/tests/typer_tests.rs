//! End-to-end tests for the typer: parse real source, check it, inspect
//! the typed arena.

use fwsc_sem::hir::{DefKind, ExprKind};
use fwsc_sem::{type_check, Entry, Hir, Module, TypeError};
use fwsc_util::FileId;

fn check(src: &str) -> (Hir, Module) {
    let tokens = fwsc_lex::tokenize(src, FileId::DUMMY).expect("lexing failed");
    let program = fwsc_par::parse(tokens).expect("parsing failed");
    type_check(&program).expect("type checking failed")
}

fn check_err(src: &str) -> TypeError {
    let tokens = fwsc_lex::tokenize(src, FileId::DUMMY).expect("lexing failed");
    let program = fwsc_par::parse(tokens).expect("parsing failed");
    type_check(&program).expect_err("type checking unexpectedly succeeded")
}

/// Type of a top-level binding, rendered.
fn binding_type(hir: &Hir, module: &Module, name: &str) -> String {
    for &def_id in &module.top_defs {
        if let DefKind::Bind { sym, .. } = &hir.def(def_id).kind {
            if hir.symbols.info(*sym).name.as_str() == name {
                return hir.display_type(&hir.symbol_type(*sym));
            }
        }
    }
    panic!("no top-level binding `{}`", name);
}

// =========================================================================
// Recursive groups and inference
// =========================================================================

#[test]
fn recursive_group_inference() {
    // The un-annotated `g` must come out as Int => Int.
    let (hir, module) = check(
        "val f = (n: Int) => if n == 0 then 1 else g(n - 1);\n\
         val g = (n: Int) => f(n - 1);\n\
         val main = () => printlnInt(f(3))",
    );
    assert_eq!(binding_type(&hir, &module, "g"), "Int => Int");
    assert_eq!(binding_type(&hir, &module, "f"), "Int => Int");
}

#[test]
fn mutual_recursion_in_block() {
    let (hir, _module) = check(
        "val main = () => {\n\
           val isEven = (n: Int) => if n == 0 then 1 else isOdd(n - 1);\n\
           val isOdd = (n: Int) => if n == 0 then 0 else isEven(n - 1);\n\
           printlnInt(isEven(readInt()))\n\
         }",
    );
    // Property: no residual inference variables anywhere in the tree.
    for expr in hir.exprs.iter() {
        assert!(
            !expr.ty.contains_vars(),
            "residual variable in {:?}",
            expr.ty
        );
    }
}

#[test]
fn no_residual_variables_after_checking() {
    let (hir, _) = check(
        "val id = (n: Int) => n;\n\
         val a = [4];\n\
         val use = () => { a(0) = id(1); printlnInt(a(0)) };\n\
         val main = () => use()",
    );
    for expr in hir.exprs.iter() {
        assert!(!expr.ty.contains_vars());
    }
}

#[test]
fn unconstrained_forward_call_is_an_error() {
    // `helper(1)`'s result is never used, so its type variable survives
    // force-instantiation and must be reported.
    let err = check_err(
        "val main = () => { val r = helper(1); printf(\"\") };\n\
         val helper = (n: Int) => n",
    );
    assert!(err.message.contains("can not infer"), "{}", err.message);
}

// =========================================================================
// Assignment and mutability
// =========================================================================

#[test]
fn immutable_reassignment_rejected() {
    let src = "val main = () => { val x = 1; x = 2; printlnInt(x) }";
    let err = check_err(src);
    assert_eq!(err.message, "can not assign to immutable value `x`");
    // The caret points at the assignment token.
    assert_eq!(&src[err.span.start..err.span.end], "=");
    assert!(src[..err.span.start].ends_with("x "));
}

#[test]
fn parameter_reassignment_rejected() {
    let err = check_err("val main = () => { val f = (n: Int) => { n = 2; n }; printlnInt(f(1)) }");
    assert_eq!(err.message, "can not assign to immutable value `n`");
}

#[test]
fn var_reassignment_and_while() {
    check(
        "val main = () => {\n\
           var guess = 1.0;\n\
           while guess < 2.0 do { guess = guess + 0.5 };\n\
           printlnFloat(guess)\n\
         }",
    );
}

#[test]
fn array_element_assignment() {
    // Array elements are l-values; the element type is inferred from
    // the stored value.
    let (hir, _) = check("val main = () => { val a = [3]; a(0) = 7; printlnInt(a(0)) }");
    for expr in hir.exprs.iter() {
        assert!(!expr.ty.contains_vars());
    }
}

#[test]
fn assignment_to_non_reference_rejected() {
    let err = check_err("val main = () => { 1 = 2; printf(\"\") }");
    assert!(err.message.contains("not an assignable reference"));
}

// =========================================================================
// Operator signature table
// =========================================================================

#[test]
fn operator_resolution_totality() {
    // (operator, Int operands ok, Float operands ok, Bool operands ok)
    let table: &[(&str, bool, bool, bool)] = &[
        ("+", true, true, false),
        ("-", true, true, false),
        ("*", true, true, false),
        ("/", true, true, false),
        ("^", true, true, false),
        ("%", true, false, false),
        ("<", true, true, false),
        ("<=", true, true, false),
        (">", true, true, false),
        (">=", true, true, false),
        ("&&", false, false, true),
        ("||", false, false, true),
        ("==", true, true, true),
        ("!=", true, true, true),
    ];
    for &(op, int_ok, float_ok, bool_ok) in table {
        let cases = [
            (format!("1 {} 2", op), int_ok),
            (format!("1.5 {} 2.5", op), float_ok),
            (format!("true {} false", op), bool_ok),
        ];
        for (expr, expected_ok) in cases {
            let src = format!(
                "val probe = {};\nval main = () => printlnInt(0)",
                expr
            );
            let tokens = fwsc_lex::tokenize(&src, FileId::DUMMY).unwrap();
            let program = fwsc_par::parse(tokens).unwrap();
            let result = type_check(&program);
            assert_eq!(
                result.is_ok(),
                expected_ok,
                "`{}` expected ok={}",
                expr,
                expected_ok
            );
        }
    }
}

#[test]
fn operator_error_points_at_operator() {
    let src = "val probe = 1 && 2;\nval main = () => printlnInt(0)";
    let err = check_err(src);
    assert_eq!(&src[err.span.start..err.span.end], "&&");
    assert!(err.message.contains("&&"));
}

#[test]
fn unary_operators() {
    check("val a = !true; val b = -1; val c = -1.5; val main = () => printlnInt(0)");
    assert!(check_err("val a = !1; val main = () => printlnInt(0)")
        .message
        .contains('!'));
    assert!(check_err("val a = -true; val main = () => printlnInt(0)")
        .message
        .contains('-'));
}

// =========================================================================
// Branches
// =========================================================================

#[test]
fn branch_mismatch_fails_immediately() {
    let err = check_err("val r = if true then 1 else 2.5; val main = () => printlnInt(0)");
    assert!(err.message.contains("branch mismatch"), "{}", err.message);
    assert_eq!(err.sub_spans.len(), 2);
}

#[test]
fn condition_must_be_boolean() {
    let err = check_err("val r = if 1 then 2 else 3; val main = () => printlnInt(0)");
    assert!(err.message.contains("must be Boolean"));
}

// =========================================================================
// Free names
// =========================================================================

#[test]
fn lambda_capture_free_names() {
    let (hir, _) = check(
        "val main = () => {\n\
           val adder = (x: Int) => (y: Int) => x + y;\n\
           printlnInt(adder(3)(4))\n\
         }",
    );
    let mut saw_inner = false;
    let mut saw_outer = false;
    for expr in hir.exprs.iter() {
        if let ExprKind::Lambda { params, free, .. } = &expr.kind {
            let param_names: Vec<&str> = params
                .iter()
                .map(|&p| hir.symbols.info(p).name.as_str())
                .collect();
            if param_names == ["y"] {
                // The inner lambda captures exactly `x`.
                let free_names: Vec<&str> = free
                    .iter()
                    .map(|&s| hir.symbols.info(s).name.as_str())
                    .collect();
                assert_eq!(free_names, ["x"]);
                saw_inner = true;
            }
            if param_names == ["x"] {
                assert!(free.is_empty(), "outer lambda captures nothing");
                saw_outer = true;
            }
        }
    }
    assert!(saw_inner && saw_outer);
}

#[test]
fn class_method_free_names_include_members() {
    let (hir, _) = check(
        "class Main {\n\
           val fact: Int => Int = (n: Int) => if n <= 1 then 1 else n * fact(n - 1);\n\
           val main = () => printlnInt(fact(readInt()))\n\
         }",
    );
    let mut checked = false;
    for expr in hir.exprs.iter() {
        if let ExprKind::Lambda { params, free, .. } = &expr.kind {
            let param_names: Vec<&str> = params
                .iter()
                .map(|&p| hir.symbols.info(p).name.as_str())
                .collect();
            if param_names == ["n"] {
                let free_names: Vec<&str> = free
                    .iter()
                    .map(|&s| hir.symbols.info(s).name.as_str())
                    .collect();
                assert_eq!(free_names, ["fact"]);
                checked = true;
            }
        }
    }
    assert!(checked);
}

// =========================================================================
// Classes
// =========================================================================

#[test]
fn class_main_entry() {
    let (hir, module) = check(
        "class Main {\n\
           val fact: Int => Int = (n: Int) => if n <= 1 then 1 else n * fact(n - 1);\n\
           val main = () => printlnInt(fact(readInt()))\n\
         }",
    );
    match module.entry {
        Entry::MainClass(cid) => {
            let class = hir.class(cid);
            assert_eq!(class.name.as_str(), "Main");
            let (_, fact) = class.member(fwsc_util::Symbol::intern("fact")).unwrap();
            assert_eq!(hir.display_type(&fact.ty), "Int => Int");
            let (_, main) = class.member(fwsc_util::Symbol::intern("main")).unwrap();
            assert_eq!(hir.display_type(&main.ty), "() => Unit");
        }
        other => panic!("expected class entry, got {:?}", other),
    }
}

#[test]
fn class_constructor_and_members() {
    let (hir, module) = check(
        "class Counter(start: Int) {\n\
           var count = start;\n\
           val incr = () => { count = count + 1 }\n\
         }\n\
         val main = () => {\n\
           val c = new Counter(5);\n\
           c.incr();\n\
           printlnInt(c.count)\n\
         }",
    );
    assert!(matches!(module.entry, Entry::TopLevel(_)));
    let class = hir.class(fwsc_sem::ClassId(0));
    assert!(class.sealed);
    assert_eq!(
        hir.display_type(&class.member(fwsc_util::Symbol::intern("count")).unwrap().1.ty),
        "Int"
    );
}

#[test]
fn open_class_predicates_discharged() {
    // `new Node().value` selects on the class while it is still being
    // checked; the accumulated predicate must hold once it seals.
    let (hir, _) = check(
        "class Node {\n\
           val succ = () => new Node().value + 1;\n\
           val value = 1\n\
         }\n\
         val main = () => printlnInt(new Node().succ())",
    );
    let class = hir.class(fwsc_sem::ClassId(0));
    assert_eq!(
        hir.display_type(&class.member(fwsc_util::Symbol::intern("succ")).unwrap().1.ty),
        "() => Int"
    );
}

#[test]
fn unsatisfied_predicate_rejected() {
    let err = check_err(
        "class Node {\n\
           val bad = () => new Node().missing + 1\n\
         }",
    );
    assert!(
        err.message.contains("has no member `missing`"),
        "{}",
        err.message
    );
}

#[test]
fn select_on_non_class_rejected() {
    let err = check_err("val main = () => printlnInt((1).size)");
    assert!(err.message.contains("non-class type"));
}

#[test]
fn new_arity_checked() {
    let err = check_err(
        "class Pair(a: Int, b: Int) { val sum = a + b }\n\
         val main = () => printlnInt(new Pair(1).sum)",
    );
    assert!(err.message.contains("arity mismatch"));
}

// =========================================================================
// Entry point and miscellaneous errors
// =========================================================================

#[test]
fn missing_main_rejected() {
    let err = check_err("val x = 1");
    assert!(err.message.contains("no `main` entry point"));
}

#[test]
fn main_type_checked() {
    let err = check_err("val main = (n: Int) => printlnInt(n)");
    assert!(err.message.contains("() => Unit"));
}

#[test]
fn unknown_symbol() {
    let err = check_err("val main = () => printlnInt(zzz)");
    assert_eq!(err.message, "unknown symbol `zzz`");
}

#[test]
fn apply_arity_checked() {
    let err = check_err("val f = (n: Int) => n; val main = () => printlnInt(f(1, 2))");
    assert!(err.message.contains("arity mismatch"));
}

#[test]
fn lambda_return_ascription_is_hard_equality() {
    let err = check_err("val f = (n: Int): Float => n; val main = () => printlnInt(0)");
    assert!(err.message.contains("lambda return type mismatch"));
}

#[test]
fn printf_variadic() {
    check("val main = () => printf(\"%d %f\\n\", 1, 2.5)");
    let err = check_err("val main = () => printf(1)");
    assert!(err.message.contains("type mismatch"));
}

#[test]
fn duplicate_binding_rejected() {
    let err = check_err("val x = 1; val x = 2; val main = () => printlnInt(x)");
    assert!(err.message.contains("duplicate definition"));
}
