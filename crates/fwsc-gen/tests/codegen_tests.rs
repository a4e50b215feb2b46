//! End-to-end tests for the code generator: source → typed tree → C.

use fwsc_gen::CodeGenError;
use fwsc_util::{FileId, NameGen};

fn compile(src: &str) -> String {
    let tokens = fwsc_lex::tokenize(src, FileId::DUMMY).expect("lexing failed");
    let program = fwsc_par::parse(tokens).expect("parsing failed");
    let (hir, module) = fwsc_sem::type_check(&program).expect("type checking failed");
    fwsc_gen::emit(&hir, &module, NameGen::new()).expect("code generation failed")
}

fn compile_err(src: &str) -> CodeGenError {
    let tokens = fwsc_lex::tokenize(src, FileId::DUMMY).expect("lexing failed");
    let program = fwsc_par::parse(tokens).expect("parsing failed");
    let (hir, module) = fwsc_sem::type_check(&program).expect("type checking failed");
    fwsc_gen::emit(&hir, &module, NameGen::new()).expect_err("code generation succeeded")
}

const FACT_CLASS: &str = "class Main {\n\
    val fact: Int => Int = (n: Int) => if n <= 1 then 1 else n * fact(n - 1);\n\
    val main = () => printlnInt(fact(readInt()))\n\
}";

#[test]
fn deterministic_output() {
    // Same tree, fresh name generator: byte-identical C.
    let first = compile(FACT_CLASS);
    let second = compile(FACT_CLASS);
    assert_eq!(first, second);
}

#[test]
fn class_lowering_shapes() {
    let c = compile(FACT_CLASS);
    assert!(c.contains("typedef struct Main_struct Main_struct;"), "{}", c);
    assert!(c.contains("struct Main_struct {"), "{}", c);
    // Methods are closure-struct fields.
    assert!(c.contains("closure* fact;"), "{}", c);
    assert!(c.contains("closure* main;"), "{}", c);
    // Constructor allocates and returns the instance.
    assert!(c.contains("Main_struct* Main_new(void)"), "{}", c);
    assert!(c.contains("return obj;"), "{}", c);
    // Method environments carry self; sibling calls go through it.
    assert!(c.contains("Main_struct* self;"), "{}", c);
    assert!(c.contains("env->self->fact"), "{}", c);
}

#[test]
fn runtime_stub_emitted_on_demand() {
    let c = compile(FACT_CLASS);
    assert!(c.contains("#include <stdio.h>"), "{}", c);
    assert!(c.contains("#include <stdlib.h>"), "{}", c);
    assert!(c.contains("int readInt(void)"), "{}", c);
    assert!(c.contains("scanf(\"%d\", (&x))"), "{}", c);
    assert!(c.contains("void printlnInt(int x)"), "{}", c);
    // The closure runtime pair.
    assert!(c.contains("struct closure {\n    void* func;\n    void* env;\n};"), "{}", c);
    // C main drives the user's main closure once.
    assert!(c.contains("int main(void) {"), "{}", c);
    assert!(c.contains("Main_new()"), "{}", c);
    assert!(c.contains("return 0;"), "{}", c);
}

#[test]
fn lambda_capture_environment() {
    let c = compile(
        "val main = () => {\n\
           val adder = (x: Int) => (y: Int) => x + y;\n\
           val add3 = adder(3);\n\
           printlnInt(add3(4))\n\
         }",
    );
    // The inner lambda's environment holds exactly the captured x.
    assert!(c.contains("int x;"), "{}", c);
    assert!(c.contains("env->x"), "{}", c);
    // Environment and closure are heap-allocated at the use site.
    assert!(c.contains("malloc(sizeof(closure))"), "{}", c);
    // The call through add3 casts through a function-pointer typedef.
    assert!(c.contains("->func))("), "{}", c);
    assert!(c.contains("typedef int (*fnp__"), "{}", c);
    // adder itself captures nothing: no `adder...` environment struct.
    assert!(!c.contains("struct adder"), "{}", c);
}

#[test]
fn mutual_recursion_lowered_to_plain_functions() {
    let c = compile(
        "val main = () => {\n\
           val isEven = (n: Int) => if n == 0 then 1 else isOdd(n - 1);\n\
           val isOdd = (n: Int) => if n == 0 then 0 else isEven(n - 1);\n\
           printlnInt(isEven(readInt()))\n\
         }",
    );
    assert!(c.contains("int isEven__"), "{}", c);
    assert!(c.contains("int isOdd__"), "{}", c);
    // Peer calls are direct, by mangled name, not through closures.
    assert!(c.contains("isOdd__"), "{}", c);
    assert!(!c.contains("struct isEven"), "{}", c);
    assert!(!c.contains("struct isOdd"), "{}", c);
}

#[test]
fn while_and_float_lowering() {
    let c = compile(
        "val main = () => {\n\
           var x = readFloat();\n\
           printlnFloat(x);\n\
           var guess = 1.0;\n\
           val abs = (v: Float) => if v < 0.0 then 0.0 - v else v;\n\
           while abs(guess * guess - x) > 0.00001 do {\n\
             guess = (guess + x / guess) / 2.0\n\
           };\n\
           printlnFloat(guess)\n\
         }",
    );
    assert!(c.contains("#include <stdio.h>"), "{}", c);
    assert!(c.contains("double readFloat(void)"), "{}", c);
    assert!(c.contains("scanf(\"%lf\", (&x))"), "{}", c);
    assert!(c.contains("void printlnFloat(double x)"), "{}", c);
    // `abs` captures nothing, so the condition is a direct call and the
    // loop keeps C's plain while form.
    assert!(c.contains("while (("), "{}", c);
    assert!(!c.contains("while (1) {"), "{}", c);
}

#[test]
fn while_condition_with_prefix_reevaluates() {
    // `below` captures `lim`, so calling it needs a temporary; the loop
    // must re-run that prefix every iteration.
    let c = compile(
        "val main = () => {\n\
           val lim = readInt();\n\
           val below = (n: Int) => n < lim;\n\
           var i = 0;\n\
           while below(i) do { i = i + 1 };\n\
           printlnInt(i)\n\
         }",
    );
    assert!(c.contains("while (1) {"), "{}", c);
    assert!(c.contains("break;"), "{}", c);
    assert!(c.contains("int lim;"), "{}", c);
}

#[test]
fn pow_goes_through_math_h() {
    let c = compile("val p = 2 ^ 10; val q = 1.5 ^ 2.0; val main = () => printlnInt(p)");
    assert!(c.contains("#include <math.h>"), "{}", c);
    assert!(c.contains("pow("), "{}", c);
    // The Int signature casts the result back.
    assert!(c.contains("((int)(pow("), "{}", c);
}

#[test]
fn array_lowering() {
    let c = compile(
        "val main = () => { val a = [3]; a(0) = 7; printlnInt(a(0)) }",
    );
    assert!(c.contains("malloc((sizeof(int) * 3))"), "{}", c);
    assert!(c.contains("[0] = 7;"), "{}", c);
}

#[test]
fn string_literals_escaped() {
    let c = compile("val main = () => printf(\"%d-%d\\n\", 1, 2)");
    assert!(c.contains("printf(\"%d-%d\\n\", 1, 2)"), "{}", c);
}

#[test]
fn forward_value_reference_is_an_error() {
    // Typing accepts the recursive group; lowering cannot, since `b`'s
    // storage does not exist when `a` is initialized.
    let err = compile_err("val a = b + 1; val b = 2; val main = () => printlnInt(a)");
    assert!(matches!(err, CodeGenError::ForwardReference(ref name) if name == "b"));
}

#[test]
fn non_capturing_lambda_as_value_gets_adapter() {
    // Passing a plain function where a closure value is expected.
    let c = compile(
        "val inc = (n: Int) => n + 1;\n\
         val apply = (f: Int => Int, n: Int) => f(n);\n\
         val main = () => printlnInt(apply(inc, 41))",
    );
    // The adapter takes the conventional env parameter and forwards.
    assert!(c.contains("_value__"), "{}", c);
    assert!(c.contains("void* env"), "{}", c);
}
