//! Integration tests for the Kiln pipeline

use kiln::ir::verify::verify_module;
use kiln::ir::{ArithOp, CastOp, CmpPred, Function, Instruction, Module, Terminator, Type, Value};
use kiln::{CompileError, Compiler};
use lei::errors::Stage;

fn compile(source: &str) -> Module {
    let _ = env_logger::builder().is_test(true).try_init();
    match Compiler::new().compile_source(source) {
        Ok(module) => module,
        Err(err) => panic!("compile failed: {} {:?}", err, err.diagnostics()),
    }
}

fn compile_err(source: &str) -> CompileError {
    Compiler::new()
        .compile_source(source)
        .expect_err("compilation should fail")
}

fn function<'m>(module: &'m Module, name: &str) -> &'m Function {
    module
        .function(name)
        .unwrap_or_else(|| panic!("no function '{}'", name))
}

fn instructions(func: &Function) -> impl Iterator<Item = &Instruction> {
    func.blocks.iter().flat_map(|block| block.instructions.iter())
}

fn calls<'f>(func: &'f Function) -> Vec<&'f str> {
    instructions(func)
        .filter_map(|inst| match inst {
            Instruction::Call { func, .. } => Some(func.as_str()),
            _ => None,
        })
        .collect()
}

fn stored_values(func: &Function) -> Vec<Value> {
    instructions(func)
        .filter_map(|inst| match inst {
            Instruction::Store { value, .. } => Some(*value),
            _ => None,
        })
        .collect()
}

fn labels(func: &Function) -> Vec<&str> {
    func.blocks.iter().map(|block| block.label.as_str()).collect()
}

#[test]
fn fixed_array_literal_is_zero_filled() {
    let module = compile("fn int main() { var a: float[3] = {1.0}; return 0; }");
    let main = function(&module, "main");

    assert!(matches!(
        main.blocks[0].instructions[0],
        Instruction::StackAlloc {
            ty: Type::F64,
            count: 3,
            ..
        }
    ));
    assert_eq!(
        stored_values(main),
        vec![Value::Float(1.0), Value::Float(0.0), Value::Float(0.0)]
    );
}

#[test]
fn declarations_without_initializer_are_zeroed() {
    let module = compile(
        "fn void f() { var i: int; var x: float; var b: bool; var s: str; var d: int[]; var a: int[2]; }",
    );
    assert_eq!(
        stored_values(function(&module, "f")),
        vec![
            Value::Int(0, Type::I32),
            Value::Float(0.0),
            Value::Bool(false),
            Value::Null,
            Value::Null,
            Value::Int(0, Type::I32),
            Value::Int(0, Type::I32),
        ]
    );
}

#[test]
fn long_arrays_are_filled_in_a_loop() {
    let module = compile("fn void f() { var big: int[64]; }");
    let f = function(&module, "f");
    let labels = labels(f);
    assert!(labels.iter().any(|label| label.starts_with("fill_cond")));
    assert!(labels.iter().any(|label| label.starts_with("fill_body")));
    assert!(labels.iter().any(|label| label.starts_with("fill_end")));
    assert!(stored_values(f).len() < 64);
}

#[test]
fn every_slot_lives_in_the_entry_block() {
    let module = compile(
        "fn int f(n: int) { var i: int = 0; while (i < n) { var t: float = 2; if (t > 1.0) { var s: str = \"x\"; } i += 1; } return i; }",
    );
    let f = function(&module, "f");
    for block in &f.blocks[1..] {
        assert!(!block
            .instructions
            .iter()
            .any(|inst| matches!(inst, Instruction::StackAlloc { .. })));
    }
    let slots = f.blocks[0]
        .instructions
        .iter()
        .filter(|inst| matches!(inst, Instruction::StackAlloc { .. }))
        .count();
    assert_eq!(slots, 4);
}

#[test]
fn parameters_are_spilled_to_slots() {
    let module = compile("fn int id(x: int) { return x; }");
    let id = function(&module, "id");
    let entry = &id.blocks[0].instructions;
    assert!(matches!(
        entry[0],
        Instruction::StackAlloc {
            ty: Type::I32,
            count: 1,
            ..
        }
    ));
    assert!(matches!(
        entry[1],
        Instruction::Store {
            value: Value::Temp(_, Type::I32),
            ..
        }
    ));
    assert!(matches!(entry[2], Instruction::Load { ty: Type::I32, .. }));
}

#[test]
fn int_is_widened_where_float_is_expected() {
    let module = compile(
        "fn float half(x: float) { return x / 2; } fn void f() { var y: float = 1; print(half(3)); }",
    );
    let casts = |name: &str| {
        instructions(function(&module, name))
            .filter(|inst| {
                matches!(
                    inst,
                    Instruction::Cast {
                        op: CastOp::SIToFP,
                        to: Type::F64,
                        ..
                    }
                )
            })
            .count()
    };
    assert_eq!(casts("half"), 1);
    assert_eq!(casts("f"), 2);
    assert!(instructions(function(&module, "half")).any(|inst| matches!(
        inst,
        Instruction::Arith {
            op: ArithOp::FDiv,
            ..
        }
    )));
}

#[test]
fn mixed_comparison_uses_float_predicate() {
    let module = compile("fn bool f(a: int, b: float) { return a < b; }");
    assert!(instructions(function(&module, "f")).any(|inst| matches!(
        inst,
        Instruction::Cmp {
            pred: CmpPred::FLt,
            ..
        }
    )));
}

#[test]
fn string_equality_calls_strcmp() {
    let module = compile("fn bool same(a: str, b: str) { return a == b; }");
    let same = function(&module, "same");
    assert_eq!(calls(same), vec!["strcmp"]);
    assert!(instructions(same).any(|inst| matches!(
        inst,
        Instruction::Cmp {
            pred: CmpPred::Eq,
            rhs: Value::Int(0, Type::I32),
            ..
        }
    )));
}

#[test]
fn logical_operators_are_eager() {
    let module = compile("fn bool f(a: bool, b: bool) { return a && !b || a; }");
    let f = function(&module, "f");
    assert_eq!(f.blocks.len(), 1);
    let ops: Vec<ArithOp> = instructions(f)
        .filter_map(|inst| match inst {
            Instruction::Arith { op, .. } => Some(*op),
            _ => None,
        })
        .collect();
    assert_eq!(ops, vec![ArithOp::Xor, ArithOp::And, ArithOp::Or]);
}

#[test]
fn print_selects_format_by_type() {
    let module = compile(
        "fn void f() { print(1); print(2.5); print(\"s\"); }",
    );
    assert_eq!(calls(function(&module, "f")), vec!["printf"; 3]);
    for format in ["%d", "%f", "%s", "s"] {
        assert!(module.strings.iter().any(|text| text == format));
    }
}

#[test]
fn print_bool_goes_through_a_diamond() {
    let module = compile("fn void f(b: bool) { print(b); }");
    let f = function(&module, "f");
    let labels = labels(f);
    assert_eq!(labels, vec!["entry", "print_true1", "print_false2", "print_done3"]);
    assert!(module.strings.iter().any(|text| text == "true"));
    assert!(module.strings.iter().any(|text| text == "false"));
    assert!(matches!(
        f.blocks[0].terminator,
        Some(Terminator::CondBranch { .. })
    ));
}

#[test]
fn input_reads_and_strips_newline() {
    let module = compile("fn str ask() { return input(\"> \"); }");
    let ask = function(&module, "ask");
    assert_eq!(calls(ask), vec!["printf", "fflush", "malloc", "read"]);
    assert!(instructions(ask).any(|inst| matches!(
        inst,
        Instruction::Cmp {
            rhs: Value::Int(10, Type::I8),
            ..
        }
    )));
    let read = instructions(ask)
        .find_map(|inst| match inst {
            Instruction::Call { func, args, .. } if func == "read" => Some(args.clone()),
            _ => None,
        })
        .expect("read call");
    assert_eq!(read[0], Value::Int(0, Type::I32));
    assert_eq!(read[2], Value::Int(1023, Type::I64));
}

#[test]
fn heap_builtins_lower_to_runtime_calls() {
    let module = compile(
        r#"
fn void f(n: int) {
    var a: int[] = new int[n];
    var b: float[] = malloc(n * sizeof(float));
    b = realloc(b, 2 * n * sizeof(float));
    var len: int = strlen("abc");
    var i: int = atoi("4");
    var x: float = atof("4.5");
    var s: str = itoa(i);
    var t: str = ftoa(x);
    free(a);
    free(b);
}
"#,
    );
    let f = function(&module, "f");
    assert_eq!(
        calls(f),
        vec![
            "malloc", "malloc", "realloc", "strlen", "atoi", "atof", "malloc", "itoa", "malloc",
            "ftoa", "free", "free"
        ]
    );
    assert!(instructions(f).any(|inst| matches!(
        inst,
        Instruction::Arith {
            op: ArithOp::IMul,
            rhs: Value::Int(4, Type::I64),
            ..
        }
    )));
    assert!(instructions(f).any(|inst| matches!(
        inst,
        Instruction::Cast {
            op: CastOp::Trunc,
            to: Type::I32,
            ..
        }
    )));
}

#[test]
fn sizeof_is_a_constant() {
    let module = compile("fn int f() { return sizeof(float[4]) + sizeof(bool); }");
    let f = function(&module, "f");
    assert!(instructions(f).any(|inst| matches!(
        inst,
        Instruction::Arith {
            op: ArithOp::IAdd,
            lhs: Value::Int(32, Type::I32),
            rhs: Value::Int(1, Type::I32),
            ..
        }
    )));
}

#[test]
fn control_flow_blocks() {
    let module = compile(
        "fn int f(n: int) { var i: int = 0; while (i < n) { if (i == 3) { return i; } else { i += 1; } } return -1; }",
    );
    let f = function(&module, "f");
    assert_eq!(
        labels(f),
        vec![
            "entry",
            "while_cond1",
            "while_body2",
            "while_end3",
            "then4",
            "else5",
            "endif6"
        ]
    );
    assert_eq!(verify_module(&module), Ok(()));
}

#[test]
fn statements_after_return_are_dropped() {
    let module = compile("fn int f() { return 1; print(2); return 3; }");
    let f = function(&module, "f");
    assert!(calls(f).is_empty());
    assert_eq!(
        f.blocks[0].terminator,
        Some(Terminator::Return(Some(Value::Int(1, Type::I32))))
    );
}

#[test]
fn falling_off_the_end_returns_zero() {
    let module = compile("fn int f(x: int) { if (x > 0) { return 1; } } fn void g() { }");
    let f = function(&module, "f");
    let last = f.blocks.last().expect("blocks");
    assert_eq!(
        last.terminator,
        Some(Terminator::Return(Some(Value::Int(0, Type::I32))))
    );
    let g = function(&module, "g");
    assert_eq!(g.blocks[0].terminator, Some(Terminator::Return(None)));
}

#[test]
fn fixed_array_assignment_copies_elements() {
    let module = compile("fn void f() { var a: int[2] = {1, 2}; var b: int[2]; b = a; }");
    let f = function(&module, "f");
    let loads = instructions(f)
        .filter(|inst| matches!(inst, Instruction::Load { ty: Type::I32, .. }))
        .count();
    assert_eq!(loads, 2);
    assert_eq!(stored_values(f).len(), 2 + 2 + 2);
}

#[test]
fn runtime_is_declared_up_front() {
    let module = compile("fn int main() { return 0; }");
    let names: Vec<&str> = module.externs.iter().map(|decl| decl.name.as_str()).collect();
    for name in [
        "printf", "malloc", "free", "realloc", "strlen", "strcmp", "atoi", "atof", "itoa", "ftoa",
        "read", "fflush",
    ] {
        assert!(names.contains(&name), "missing {}", name);
    }
    assert!(module.external("printf").map(|decl| decl.variadic).unwrap_or(false));
}

#[test]
fn printed_module_is_readable() {
    let module = Compiler::new()
        .with_module_name("demo")
        .compile_source("fn int main(argc: int, argv: str[]) { print(\"hi\\n\"); return argc; }")
        .expect("compiles");
    let text = module.to_string();
    assert!(text.starts_with("; module demo"));
    assert!(text.contains("declare i32 @printf(ptr, ...)"));
    assert!(text.contains("define i32 @main(i32 %0, ptr %1) {"));
    assert!(text.contains("@str0 = c\"hi\\n\""));
}

#[test]
fn well_typed_programs_produce_verified_modules() {
    let programs = [
        "fn int main() { return 0; }",
        "fn void f(a: float[3]) { a[0] = 1; a[1] += a[0] * 2; }",
        "fn int fib(n: int) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } fn int main() { print(fib(10)); return 0; }",
        "fn str greet(name: str) { if (name == \"\") { return \"anon\"; } return name; }",
        "fn void g() { var xs: int[] = {3, 1, 2}; var i: int = 0; while (i < 3) { print(xs[i] > 1); i += 1; } }",
        "fn int main() { var a: float[20] = {1, 2}; var b: float[20]; b = a; return 0; }",
        "fn bool h(x: float) { return !(x == 0.0) && -x < 0; }",
    ];
    for source in programs {
        let module = compile(source);
        assert_eq!(verify_module(&module), Ok(()), "{}", source);
    }
}

#[test]
fn errors_stop_at_the_first_failing_stage() {
    let err = compile_err("fn int main() { var x: int = \"s\"; undefined(); return 0; }");
    assert_eq!(err.stage(), Stage::Semantic);
    assert_eq!(err.diagnostics().len(), 2);
    assert!(matches!(err, CompileError::Semantic(_)));

    let err = compile_err("fn int main() { var x: int = ; }");
    assert_eq!(err.stage(), Stage::Syntax);
    assert_eq!(err.to_string(), "1 syntax error(s)");
}

#[test]
fn diagnostics_can_be_collected() {
    let mut diagnostics = lei::errors::Diagnostics::new();
    let module = Compiler::new().compile_with_diagnostics(
        "fn void main() { }\nfn int f() { return true; }",
        &mut diagnostics,
    );
    assert!(module.is_none());
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(diagnostics.iter().next().map(|d| d.line), Some(1));
}

#[test]
fn long_operator_chains_are_bounded() {
    let chain = |terms: usize| {
        format!(
            "fn int main() {{ var x: int = {}; return x; }}",
            vec!["1"; terms].join(" + ")
        )
    };

    let module = compile(&chain(100));
    let adds = instructions(function(&module, "main"))
        .filter(|inst| matches!(inst, Instruction::Arith { op: ArithOp::IAdd, .. }))
        .count();
    assert_eq!(adds, 99);

    let err = compile_err(&chain(10_000));
    assert_eq!(err.stage(), Stage::Syntax);
    assert_eq!(err.diagnostics().len(), 1);
    assert!(err.diagnostics()[0].message.contains("maximum depth of 256"));
}

#[test]
fn integer_literals_must_fit_in_i32() {
    let module = compile("fn int main() { var x: int = 2147483647; return x; }");
    assert!(stored_values(function(&module, "main")).contains(&Value::Int(2147483647, Type::I32)));

    let err = compile_err("fn int main() { var x: int = 3000000000; return x; }");
    assert_eq!(err.stage(), Stage::Syntax);
    assert_eq!(err.diagnostics()[0].message, "integer literal out of range");
}
