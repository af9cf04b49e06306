use lei::errors::{Diagnostic, Diagnostics, Stage};
use lei::parser::ast::{ExprKind, Stmt};
use lei::semantic::types::{BaseType, Type};

fn semantic_errors(source: &str) -> Vec<Diagnostic> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut diagnostics = Diagnostics::new();
    let checked = lei::check(source, 256, &mut diagnostics);
    assert!(
        !diagnostics.has_errors(Stage::Lexical) && !diagnostics.has_errors(Stage::Syntax),
        "front end failed on {:?}",
        source
    );
    assert_eq!(checked.is_some(), diagnostics.is_empty());
    diagnostics.into_vec()
}

fn assert_clean(source: &str) {
    let errors = semantic_errors(source);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
}

fn single_error(source: &str) -> Diagnostic {
    let mut errors = semantic_errors(source);
    assert_eq!(errors.len(), 1, "expected one error, got {:?}", errors);
    errors.remove(0)
}

#[test]
fn accepts_well_typed_program() {
    assert_clean(
        r#"
fn float average(values: float[], n: int) {
    var total: float = 0;
    var i: int = 0;
    while (i < n) {
        total += values[i];
        i += 1;
    }
    return total / n;
}

fn int main() {
    var data: float[4] = {1, 2.5, 3};
    var name: str = input("who? ");
    if (name == "lei" || strlen(name) == 0) {
        print(average(data, 4));
    }
    var heap: int[] = new int[10];
    heap[0] = sizeof(float[2]);
    heap = realloc(heap, 20 * sizeof(int));
    free(heap);
    print(itoa(atoi("12")) == "12");
    return 0;
}
"#,
    );
}

#[test]
fn numeric_widening_is_one_way() {
    assert_clean("fn void f() { var f: float = 1; f = 2; }");

    let err = single_error("fn void f() { var i: int = 1.5; }");
    assert_eq!(err.stage, Stage::Semantic);
    assert_eq!(
        err.message,
        "Type mismatch in variable declaration: expected int, found float"
    );
    assert_eq!((err.line, err.column), (1, 28));
}

#[test]
fn inner_scope_shadows_outer() {
    assert_clean("fn int main() { var x: int = 1; { var x: int = 2; } return x; }");
    assert_clean("fn void f() { var x: int = 1; if (x > 0) { var x: str = \"s\"; print(x); } x += 1; }");
}

#[test]
fn inner_declaration_does_not_leak() {
    let err = single_error("fn int f() { { var y: int = 2; } return y; }");
    assert_eq!(err.message, "Undefined variable 'y'");
}

#[test]
fn duplicate_in_same_scope() {
    let err = single_error("fn void f(a: int) { var a: float = 1.0; }");
    assert_eq!(err.message, "Variable already declared in this scope: 'a'");

    let err = single_error("fn void f() { var b: int; var b: int; }");
    assert_eq!(err.message, "Variable already declared in this scope: 'b'");
}

#[test]
fn main_signature_validation() {
    assert_clean("fn int main() { return 0; }");
    assert_clean("fn int main(argc: int, argv: str[]) { return 0; }");

    let err = single_error("fn int main(x: int) { return 0; }");
    assert!(err.message.contains("Invalid main signature"));
    assert!(err.message.contains("found main(int)"));

    let err = single_error("fn void main() { return; }");
    assert_eq!(err.message, "Main function must return int, found void");
}

#[test]
fn errors_accumulate_across_functions() {
    let errors = semantic_errors(
        r#"
fn int f() { return "no"; }
fn void g() { var b: bool = 1; undefined(); }
fn int h(x: int) { if (x) { return 1; } return 2; }
"#,
    );
    let messages: Vec<&str> = errors.iter().map(|err| err.message.as_str()).collect();
    assert_eq!(messages.len(), 4, "{:?}", messages);
    assert_eq!(messages[0], "Return type mismatch: expected int, found str");
    assert_eq!(
        messages[1],
        "Type mismatch in variable declaration: expected bool, found int"
    );
    assert_eq!(messages[2], "Undefined function 'undefined'");
    assert_eq!(
        messages[3],
        "If condition must evaluate to a boolean value, found int"
    );
    assert!(errors.iter().all(|err| err.stage == Stage::Semantic));
}

#[test]
fn functions_may_be_called_before_definition() {
    assert_clean("fn int main() { return twice(2); } fn int twice(n: int) { return n * 2; }");
}

#[test]
fn call_arity_and_argument_types() {
    let err = single_error("fn int f(a: int) { return a; } fn void g() { f(1, 2); }");
    assert_eq!(err.message, "Wrong number of arguments: 'f' expects 1, found 2");

    let err = single_error("fn int f(a: int) { return a; } fn void g() { f(\"x\"); }");
    assert_eq!(err.message, "Argument type mismatch: expected int, found str");
}

#[test]
fn builtin_names_are_reserved() {
    let err = single_error("fn void print(x: int) { }");
    assert_eq!(err.message, "Function 'print' is already declared");

    let err = single_error("fn int strcmp(a: str, b: str) { return 0; }");
    assert_eq!(err.message, "Function 'strcmp' is already declared");
}

#[test]
fn fixed_array_rules() {
    assert_clean("fn void f() { var a: int[3] = {1, 2}; var b: int[3]; b = a; }");

    let err = single_error("fn void f() { var a: int[2] = {1, 2, 3}; }");
    assert_eq!(err.message, "Array literal has 3 elements but int[2] holds 2");

    let err = single_error("fn void f() { var a: int[2]; var b: int[3] = a; }");
    assert_eq!(
        err.message,
        "Type mismatch in variable declaration: expected int[3], found int[2]"
    );
}

#[test]
fn array_element_and_index_types() {
    let err = single_error("fn void f() { var a: int[] = {1, \"two\"}; }");
    assert_eq!(
        err.message,
        "Type mismatch in variable declaration: expected int, found str"
    );

    let err = single_error("fn void f(a: int[]) { a[1.0] = 2; }");
    assert_eq!(err.message, "Array index must be an integer, found float");
}

#[test]
fn operator_checks() {
    let err = single_error("fn void f() { var s: str = \"a\" + \"b\"; }");
    assert_eq!(err.message, "Invalid operand types for '+': str and str");

    let err = single_error("fn void f() { var b: bool = 1 && true; }");
    assert_eq!(err.message, "'&&' requires boolean operands, found int and bool");

    let err = single_error("fn void f() { var s: str = \"a\"; s += \"b\"; }");
    assert!(err.message.starts_with("Compound assignment requires numeric operands"));
}

#[test]
fn builtin_argument_rules() {
    let err = single_error("fn void f(a: int[]) { print(a); }");
    assert!(err.message.starts_with("print expects an int, float, bool or str value"));

    let err = single_error("fn void f() { var n: int = sizeof(3); }");
    assert!(err.message.starts_with("sizeof expects a type"));

    let err = single_error("fn void f() { var x: int = malloc(4)[0]; }");
    assert!(err.message.starts_with("Cannot index an untyped allocation"));
}

#[test]
fn records_widened_literal_type() {
    let mut diagnostics = Diagnostics::new();
    let checked = lei::check(
        "fn void f() { var a: float[3] = {1.0}; }",
        256,
        &mut diagnostics,
    )
    .expect("program checks");

    let Stmt::VarDecl {
        initializer: Some(init),
        ..
    } = &checked.program.functions[0].body.statements[0]
    else {
        panic!("expected declaration");
    };
    assert!(matches!(init.kind, ExprKind::ArrayLiteral(_)));
    assert_eq!(
        checked.analysis.type_of(init.id),
        Some(Type::fixed(BaseType::Float, 1))
    );
}
