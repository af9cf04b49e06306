//! Lowering of built-in calls
//!
//! Each built-in expands to a fixed instruction pattern over the runtime
//! functions declared by [`declare_runtime`]. Integer sizes are widened to
//! `i64` before they reach the allocator.

use lei::parser::ast::{Expr, Location};
use lei::semantic::types::{BaseType, Type as LeiType};

use super::lowering::FunctionLowering;
use super::{size_of, LowerError};
use crate::ir::builder::ModuleBuilder;
use crate::ir::{ArithOp, CastOp, CmpPred, Type, Value};

/// Size of the heap buffer `input` reads into.
const INPUT_BUFFER: i64 = 1024;
/// Size of the heap buffer `itoa` and `ftoa` format into.
const FORMAT_BUFFER: i64 = 32;
/// Digits after the point for `ftoa`.
const FLOAT_PRECISION: i64 = 6;

struct RuntimeFunction {
    name: &'static str,
    params: &'static [Type],
    ret: Type,
    variadic: bool,
}

const RUNTIME: &[RuntimeFunction] = &[
    RuntimeFunction { name: "printf", params: &[Type::Ptr], ret: Type::I32, variadic: true },
    RuntimeFunction { name: "malloc", params: &[Type::I64], ret: Type::Ptr, variadic: false },
    RuntimeFunction { name: "free", params: &[Type::Ptr], ret: Type::Void, variadic: false },
    RuntimeFunction { name: "realloc", params: &[Type::Ptr, Type::I64], ret: Type::Ptr, variadic: false },
    RuntimeFunction { name: "strlen", params: &[Type::Ptr], ret: Type::I64, variadic: false },
    RuntimeFunction { name: "strcmp", params: &[Type::Ptr, Type::Ptr], ret: Type::I32, variadic: false },
    RuntimeFunction { name: "atoi", params: &[Type::Ptr], ret: Type::I32, variadic: false },
    RuntimeFunction { name: "atof", params: &[Type::Ptr], ret: Type::F64, variadic: false },
    RuntimeFunction { name: "itoa", params: &[Type::I32, Type::Ptr, Type::I32], ret: Type::Ptr, variadic: false },
    RuntimeFunction { name: "ftoa", params: &[Type::F64, Type::Ptr, Type::I32], ret: Type::Ptr, variadic: false },
    RuntimeFunction { name: "read", params: &[Type::I32, Type::Ptr, Type::I64], ret: Type::I64, variadic: false },
    RuntimeFunction { name: "fflush", params: &[Type::Ptr], ret: Type::I32, variadic: false },
];

/// Declare every runtime entry point generated code may call.
pub fn declare_runtime(module: &mut ModuleBuilder) {
    for function in RUNTIME {
        module.declare_external(
            function.name,
            function.params.to_vec(),
            function.ret,
            function.variadic,
        );
    }
}

impl FunctionLowering<'_> {
    pub(super) fn lower_builtin(
        &mut self,
        expr: &Expr,
        name: &str,
        args: &[Expr],
    ) -> Result<Value, LowerError> {
        let arg = args.first().ok_or_else(|| {
            LowerError::new(format!("'{}' called without arguments", name), expr.loc)
        })?;

        match name {
            "print" => self.lower_print(arg),
            "input" => self.lower_input(arg),
            "sizeof" => {
                let ty = self.type_of(arg)?;
                let size = size_of(&ty, arg.loc)?;
                Ok(Value::Int(size as i64, Type::I32))
            }
            "malloc" => {
                let count = self.lower_expr(arg)?;
                let bytes = self.byte_count(count, 1);
                self.runtime_call("malloc", vec![bytes], expr.loc)
            }
            "free" => {
                let pointer = self.lower_expr(arg)?;
                self.runtime_call("free", vec![pointer], expr.loc)
            }
            "realloc" => {
                let pointer = self.lower_expr(arg)?;
                let size = args.get(1).ok_or_else(|| {
                    LowerError::new("'realloc' expects a size argument", expr.loc)
                })?;
                let count = self.lower_expr(size)?;
                let bytes = self.byte_count(count, 1);
                self.runtime_call("realloc", vec![pointer, bytes], expr.loc)
            }
            "strlen" => {
                let text = self.lower_expr(arg)?;
                let len = self.runtime_call("strlen", vec![text], expr.loc)?;
                Ok(self.builder.emit_cast(CastOp::Trunc, len, Type::I32))
            }
            "atoi" | "atof" => {
                let text = self.lower_expr(arg)?;
                self.runtime_call(name, vec![text], expr.loc)
            }
            "itoa" => {
                let value = self.lower_converted(arg, &LeiType::INT)?;
                self.format_into_buffer("itoa", value, 10, expr.loc)
            }
            "ftoa" => {
                let value = self.lower_converted(arg, &LeiType::FLOAT)?;
                self.format_into_buffer("ftoa", value, FLOAT_PRECISION, expr.loc)
            }
            _ => Err(LowerError::new(
                format!("'{}' is not a built-in", name),
                expr.loc,
            )),
        }
    }

    fn format_into_buffer(
        &mut self,
        name: &str,
        value: Value,
        option: i64,
        loc: Location,
    ) -> Result<Value, LowerError> {
        let buffer =
            self.runtime_call("malloc", vec![Value::Int(FORMAT_BUFFER, Type::I64)], loc)?;
        self.runtime_call(name, vec![value, buffer, Value::Int(option, Type::I32)], loc)
    }

    fn lower_print(&mut self, arg: &Expr) -> Result<Value, LowerError> {
        let ty = self.type_of(arg)?;
        let value = self.lower_expr(arg)?;
        if ty.is_array() {
            return Err(LowerError::new(
                format!("cannot print a value of type {}", ty),
                arg.loc,
            ));
        }

        let (format, value) = match ty.base {
            BaseType::Int => ("%d", value),
            BaseType::Float => ("%f", value),
            BaseType::Str => ("%s", value),
            BaseType::Bool => ("%s", self.bool_text(value)),
            _ => {
                return Err(LowerError::new(
                    format!("cannot print a value of type {}", ty),
                    arg.loc,
                ))
            }
        };

        let format = self.module.intern_string(format);
        self.runtime_call("printf", vec![format, value], arg.loc)?;
        Ok(Value::Null)
    }

    /// Select `"true"` or `"false"` for an `i1` through a small diamond.
    fn bool_text(&mut self, value: Value) -> Value {
        let slot = self.builder.emit_stack_alloc(Type::Ptr, 1);
        let when_true = self.builder.create_block("print_true");
        let when_false = self.builder.create_block("print_false");
        let done = self.builder.create_block("print_done");
        self.builder.emit_cond_branch(value, when_true, when_false);

        for (block, text) in [(when_true, "true"), (when_false, "false")] {
            self.builder.switch_to_block(block);
            let text = self.module.intern_string(text);
            self.builder.emit_store(slot, text);
            self.builder.emit_branch(done);
        }

        self.builder.switch_to_block(done);
        self.builder.emit_load(Type::Ptr, slot)
    }

    /// Print the prompt, then read one line from stdin into a fresh heap
    /// buffer with the trailing newline removed.
    fn lower_input(&mut self, prompt: &Expr) -> Result<Value, LowerError> {
        let loc = prompt.loc;
        let prompt = self.lower_expr(prompt)?;
        let format = self.module.intern_string("%s");
        self.runtime_call("printf", vec![format, prompt], loc)?;
        self.runtime_call("fflush", vec![Value::Null], loc)?;

        let buffer =
            self.runtime_call("malloc", vec![Value::Int(INPUT_BUFFER, Type::I64)], loc)?;
        let read = self.runtime_call(
            "read",
            vec![
                Value::Int(0, Type::I32),
                buffer,
                Value::Int(INPUT_BUFFER - 1, Type::I64),
            ],
            loc,
        )?;

        let empty = self.builder.create_block("input_empty");
        let check = self.builder.create_block("input_check");
        let strip = self.builder.create_block("input_strip");
        let terminate = self.builder.create_block("input_terminate");
        let done = self.builder.create_block("input_done");
        let nothing = self
            .builder
            .emit_cmp(CmpPred::Sle, read, Value::Int(0, Type::I64));
        self.builder.emit_cond_branch(nothing, empty, check);

        self.builder.switch_to_block(empty);
        self.builder.emit_store(buffer, Value::Int(0, Type::I8));
        self.builder.emit_branch(done);

        self.builder.switch_to_block(check);
        let last_index = self
            .builder
            .emit_arith(ArithOp::ISub, read, Value::Int(1, Type::I64));
        let last = self
            .builder
            .emit_arith(ArithOp::PtrAdd, buffer, last_index);
        let byte = self.builder.emit_load(Type::I8, last);
        let newline = self
            .builder
            .emit_cmp(CmpPred::Eq, byte, Value::Int(10, Type::I8));
        self.builder.emit_cond_branch(newline, strip, terminate);

        self.builder.switch_to_block(strip);
        self.builder.emit_store(last, Value::Int(0, Type::I8));
        self.builder.emit_branch(done);

        self.builder.switch_to_block(terminate);
        let end = self.builder.emit_arith(ArithOp::PtrAdd, buffer, read);
        self.builder.emit_store(end, Value::Int(0, Type::I8));
        self.builder.emit_branch(done);

        self.builder.switch_to_block(done);
        Ok(buffer)
    }
}
