//! AST to IR lowering
//!
//! Converts one checked Lei function into Kiln IR. Every local, parameters
//! included, gets a stack slot in the entry block and is accessed through
//! explicit loads and stores. Fixed arrays live inline in their slot; dynamic
//! arrays and strings are pointers.

use std::collections::HashMap;

use lei::parser::ast::{
    AssignOp, BinaryOp, Expr, ExprKind, FunctionDecl, Location, Number, Stmt, UnaryOp,
};
use lei::semantic::scope::SymbolTable;
use lei::semantic::types::{BaseType, Type as LeiType};
use lei::semantic::Analysis;

use super::{element_type, value_type, LowerError, Signature};
use crate::ir::builder::{FunctionBuilder, ModuleBuilder};
use crate::ir::{ArithOp, CastOp, CmpPred, Function, Parameter, Type, Value};

/// Element-wise fills and copies longer than this become a loop.
const UNROLL_LIMIT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Storage {
    /// The slot holds the value itself
    Scalar,
    /// The slot is the array; its address is the array's base
    InlineArray,
    /// The slot holds a pointer to the array's first element
    ArrayPointer,
}

#[derive(Debug, Clone, Copy)]
struct Local {
    slot: Value,
    ty: LeiType,
    storage: Storage,
}

/// Lowering state for a single function body.
pub(crate) struct FunctionLowering<'a> {
    pub(super) analysis: &'a Analysis,
    pub(super) module: &'a mut ModuleBuilder,
    signatures: &'a HashMap<String, Signature>,
    pub(super) builder: FunctionBuilder,
    locals: SymbolTable<Local>,
    return_type: LeiType,
}

impl<'a> FunctionLowering<'a> {
    pub(crate) fn new(
        analysis: &'a Analysis,
        module: &'a mut ModuleBuilder,
        signatures: &'a HashMap<String, Signature>,
        function: &FunctionDecl,
    ) -> Result<Self, LowerError> {
        let mut params = Vec::with_capacity(function.params.len());
        for param in &function.params {
            params.push(Parameter {
                name: param.name.clone(),
                ty: value_type(&param.ty, param.loc)?,
            });
        }
        let ret = value_type(&function.return_type, function.loc)?;

        Ok(Self {
            analysis,
            module,
            signatures,
            builder: FunctionBuilder::new(function.name.clone(), params, ret),
            locals: SymbolTable::new(),
            return_type: function.return_type,
        })
    }

    /// Lower the whole body, synthesizing a zero return when control can
    /// fall off the end.
    pub(crate) fn lower(mut self, function: &FunctionDecl) -> Result<Function, LowerError> {
        self.locals.push_scope();

        for (index, param) in function.params.iter().enumerate() {
            let value = self.builder.param(index).ok_or_else(|| {
                LowerError::new(format!("missing parameter '{}'", param.name), param.loc)
            })?;
            let slot = self.builder.emit_stack_alloc(value.ty(), 1);
            self.builder.emit_store(slot, value);
            let storage = if param.ty.is_array() {
                Storage::ArrayPointer
            } else {
                Storage::Scalar
            };
            self.locals.declare(
                param.name.clone(),
                Local {
                    slot,
                    ty: param.ty,
                    storage,
                },
            );
        }

        for stmt in &function.body.statements {
            if self.builder.is_terminated() {
                break;
            }
            self.lower_stmt(stmt)?;
        }

        if !self.builder.is_terminated() {
            let value = zero_value(&self.return_type, function.loc)?;
            self.builder.emit_return(value);
        }

        self.locals.pop_scope();
        Ok(self.builder.build())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), LowerError> {
        match stmt {
            Stmt::VarDecl {
                name,
                ty,
                initializer,
                loc,
            } => self.lower_var_decl(name, ty, initializer.as_ref(), *loc),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let cond = self.lower_expr(condition)?;
                let then_block = self.builder.create_block("then");
                let else_block = else_branch
                    .as_ref()
                    .map(|_| self.builder.create_block("else"));
                let merge = self.builder.create_block("endif");
                self.builder
                    .emit_cond_branch(cond, then_block, else_block.unwrap_or(merge));

                self.builder.switch_to_block(then_block);
                self.lower_scoped(then_branch)?;
                if !self.builder.is_terminated() {
                    self.builder.emit_branch(merge);
                }

                if let (Some(else_stmt), Some(else_block)) = (else_branch, else_block) {
                    self.builder.switch_to_block(else_block);
                    self.lower_scoped(else_stmt)?;
                    if !self.builder.is_terminated() {
                        self.builder.emit_branch(merge);
                    }
                }

                self.builder.switch_to_block(merge);
                Ok(())
            }
            Stmt::While {
                condition, body, ..
            } => {
                let cond_block = self.builder.create_block("while_cond");
                let body_block = self.builder.create_block("while_body");
                let exit = self.builder.create_block("while_end");
                self.builder.emit_branch(cond_block);

                self.builder.switch_to_block(cond_block);
                let cond = self.lower_expr(condition)?;
                self.builder.emit_cond_branch(cond, body_block, exit);

                self.builder.switch_to_block(body_block);
                self.lower_scoped(body)?;
                if !self.builder.is_terminated() {
                    self.builder.emit_branch(cond_block);
                }

                self.builder.switch_to_block(exit);
                Ok(())
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => {
                        let target = self.return_type;
                        Some(self.lower_converted(expr, &target)?)
                    }
                    None => None,
                };
                self.builder.emit_return(value);
                Ok(())
            }
            Stmt::Expr(expr) => {
                self.lower_expr(expr)?;
                Ok(())
            }
            Stmt::Block(block) => {
                self.locals.push_scope();
                for stmt in &block.statements {
                    if self.builder.is_terminated() {
                        break;
                    }
                    self.lower_stmt(stmt)?;
                }
                self.locals.pop_scope();
                Ok(())
            }
        }
    }

    fn lower_scoped(&mut self, stmt: &Stmt) -> Result<(), LowerError> {
        self.locals.push_scope();
        let result = self.lower_stmt(stmt);
        self.locals.pop_scope();
        result
    }

    fn lower_var_decl(
        &mut self,
        name: &str,
        ty: &LeiType,
        initializer: Option<&Expr>,
        loc: Location,
    ) -> Result<(), LowerError> {
        let local = if let Some(len) = ty.fixed_len() {
            let elem = element_type(ty, loc)?;
            let slot = self.builder.emit_stack_alloc(elem, len);
            match initializer {
                Some(init) => self.store_into_inline(slot, ty, init)?,
                None => self.zero_fill(slot, elem, 0, len),
            }
            Local {
                slot,
                ty: *ty,
                storage: Storage::InlineArray,
            }
        } else if ty.is_array() {
            let slot = self.builder.emit_stack_alloc(Type::Ptr, 1);
            let value = match initializer {
                Some(init) => self.lower_array_value(init, ty)?,
                None => Value::Null,
            };
            self.builder.emit_store(slot, value);
            Local {
                slot,
                ty: *ty,
                storage: Storage::ArrayPointer,
            }
        } else {
            let slot = self.builder.emit_stack_alloc(value_type(ty, loc)?, 1);
            let value = match initializer {
                Some(init) => self.lower_converted(init, ty)?,
                None => zero_value(ty, loc)?.unwrap_or(Value::Null),
            };
            self.builder.emit_store(slot, value);
            Local {
                slot,
                ty: *ty,
                storage: Storage::Scalar,
            }
        };

        self.locals.declare(name, local);
        Ok(())
    }

    /// Write `expr` into the inline array at `base`. A literal fills the
    /// leading elements and zeroes the rest; any other array is copied.
    fn store_into_inline(
        &mut self,
        base: Value,
        ty: &LeiType,
        expr: &Expr,
    ) -> Result<(), LowerError> {
        let len = ty.fixed_len().unwrap_or(0);
        let elem = element_type(ty, expr.loc)?;
        let elem_ty = ty.element();

        if let ExprKind::ArrayLiteral(elements) = &expr.kind {
            let filled = elements.len().min(len);
            for (index, element) in elements.iter().take(filled).enumerate() {
                let value = self.lower_converted(element, &elem_ty)?;
                let addr = self.constant_element_addr(base, elem, index);
                self.builder.emit_store(addr, value);
            }
            self.zero_fill(base, elem, filled, len);
        } else {
            let source = self.lower_expr(expr)?;
            self.copy_elements(base, source, elem, len);
        }
        Ok(())
    }

    /// Lower an expression used where an array of type `ty` is expected.
    /// Array literals get a fresh stack buffer.
    pub(super) fn lower_array_value(
        &mut self,
        expr: &Expr,
        ty: &LeiType,
    ) -> Result<Value, LowerError> {
        let ExprKind::ArrayLiteral(elements) = &expr.kind else {
            return self.lower_expr(expr);
        };
        if elements.is_empty() {
            return Ok(Value::Null);
        }

        let elem = element_type(ty, expr.loc)?;
        let elem_ty = ty.element();
        let buffer = self.builder.emit_stack_alloc(elem, elements.len());
        for (index, element) in elements.iter().enumerate() {
            let value = self.lower_converted(element, &elem_ty)?;
            let addr = self.constant_element_addr(buffer, elem, index);
            self.builder.emit_store(addr, value);
        }
        Ok(buffer)
    }

    /// Lower `expr` and widen it to `target` where the language allows.
    pub(super) fn lower_converted(
        &mut self,
        expr: &Expr,
        target: &LeiType,
    ) -> Result<Value, LowerError> {
        if target.is_array() {
            return self.lower_array_value(expr, target);
        }
        let value = self.lower_expr(expr)?;
        let source = self.type_of(expr)?;
        Ok(self.convert(value, &source, target))
    }

    fn convert(&mut self, value: Value, from: &LeiType, to: &LeiType) -> Value {
        if *from == LeiType::INT && *to == LeiType::FLOAT {
            self.builder.emit_cast(CastOp::SIToFP, value, Type::F64)
        } else {
            value
        }
    }

    pub(super) fn lower_expr(&mut self, expr: &Expr) -> Result<Value, LowerError> {
        match &expr.kind {
            ExprKind::Number(Number::Int(value)) => Ok(Value::Int(i64::from(*value), Type::I32)),
            ExprKind::Number(Number::Float(value)) => Ok(Value::Float(*value)),
            ExprKind::String(text) => Ok(self.module.intern_string(text)),
            ExprKind::Bool(value) => Ok(Value::Bool(*value)),
            ExprKind::Variable(name) => {
                let local = self.local(name, expr.loc)?;
                match local.storage {
                    Storage::Scalar => {
                        let ty = value_type(&local.ty, expr.loc)?;
                        Ok(self.builder.emit_load(ty, local.slot))
                    }
                    Storage::InlineArray => Ok(local.slot),
                    Storage::ArrayPointer => Ok(self.builder.emit_load(Type::Ptr, local.slot)),
                }
            }
            ExprKind::ArrayAccess { array, index } => {
                let ty = value_type(&self.type_of(expr)?, expr.loc)?;
                let addr = self.element_address(array, index)?;
                Ok(self.builder.emit_load(ty, addr))
            }
            ExprKind::Binary { lhs, op, rhs } => self.lower_binary(expr, lhs, *op, rhs),
            ExprKind::Unary { op, operand } => {
                let value = self.lower_expr(operand)?;
                Ok(match op {
                    UnaryOp::Negate if value.ty() == Type::F64 => {
                        self.builder
                            .emit_arith(ArithOp::FSub, Value::Float(0.0), value)
                    }
                    UnaryOp::Negate => {
                        self.builder
                            .emit_arith(ArithOp::ISub, Value::Int(0, value.ty()), value)
                    }
                    UnaryOp::Not => self.builder.emit_arith(ArithOp::Xor, value, Value::Bool(true)),
                })
            }
            ExprKind::Assign { target, op, value } => self.lower_assign(target, *op, value),
            ExprKind::Call { callee, args } => self.lower_call(expr, callee, args),
            ExprKind::ArrayLiteral(_) => {
                let ty = self.type_of(expr)?;
                self.lower_array_value(expr, &ty)
            }
            ExprKind::ArrayAlloc { elem, size } => {
                let count = self.lower_expr(size)?;
                let elem_size = element_type(elem, expr.loc)?.size();
                let bytes = self.byte_count(count, elem_size);
                self.runtime_call("malloc", vec![bytes], expr.loc)
            }
            ExprKind::TypeRef(ty) => Err(LowerError::new(
                format!("type {} cannot be used as a value", ty),
                expr.loc,
            )),
        }
    }

    fn lower_binary(
        &mut self,
        expr: &Expr,
        lhs: &Expr,
        op: BinaryOp,
        rhs: &Expr,
    ) -> Result<Value, LowerError> {
        let lhs_ty = self.type_of(lhs)?;
        let rhs_ty = self.type_of(rhs)?;
        // Both sides are always evaluated, `&&` and `||` included.
        let left = self.lower_expr(lhs)?;
        let right = self.lower_expr(rhs)?;

        if op.is_logical() {
            let arith = if op == BinaryOp::And {
                ArithOp::And
            } else {
                ArithOp::Or
            };
            return Ok(self.builder.emit_arith(arith, left, right));
        }

        if op.is_arithmetic() {
            let result = self.type_of(expr)?;
            let left = self.convert(left, &lhs_ty, &result);
            let right = self.convert(right, &rhs_ty, &result);
            return self.arith(op, &result, left, right, expr.loc);
        }

        if lhs_ty.is_str() && rhs_ty.is_str() {
            let order = self.runtime_call("strcmp", vec![left, right], expr.loc)?;
            let pred = if op == BinaryOp::Equal {
                CmpPred::Eq
            } else {
                CmpPred::Ne
            };
            return Ok(self
                .builder
                .emit_cmp(pred, order, Value::Int(0, Type::I32)));
        }

        if lhs_ty.is_numeric() && rhs_ty.is_numeric() {
            let float = lhs_ty.base == BaseType::Float || rhs_ty.base == BaseType::Float;
            let common = if float { LeiType::FLOAT } else { LeiType::INT };
            let left = self.convert(left, &lhs_ty, &common);
            let right = self.convert(right, &rhs_ty, &common);
            return Ok(self.builder.emit_cmp(predicate(op, float), left, right));
        }

        // Booleans and pointers compare by identity.
        Ok(self.builder.emit_cmp(predicate(op, false), left, right))
    }

    fn arith(
        &mut self,
        op: BinaryOp,
        ty: &LeiType,
        lhs: Value,
        rhs: Value,
        loc: Location,
    ) -> Result<Value, LowerError> {
        let float = ty.base == BaseType::Float;
        let arith = match (op, float) {
            (BinaryOp::Add, false) => ArithOp::IAdd,
            (BinaryOp::Subtract, false) => ArithOp::ISub,
            (BinaryOp::Multiply, false) => ArithOp::IMul,
            (BinaryOp::Divide, false) => ArithOp::SDiv,
            (BinaryOp::Add, true) => ArithOp::FAdd,
            (BinaryOp::Subtract, true) => ArithOp::FSub,
            (BinaryOp::Multiply, true) => ArithOp::FMul,
            (BinaryOp::Divide, true) => ArithOp::FDiv,
            _ => {
                return Err(LowerError::new(
                    format!("'{}' is not an arithmetic operator", op.symbol()),
                    loc,
                ))
            }
        };
        Ok(self.builder.emit_arith(arith, lhs, rhs))
    }

    fn lower_assign(
        &mut self,
        target: &Expr,
        op: AssignOp,
        value: &Expr,
    ) -> Result<Value, LowerError> {
        match &target.kind {
            ExprKind::Variable(name) => {
                let local = self.local(name, target.loc)?;
                match local.storage {
                    Storage::InlineArray => {
                        self.store_into_inline(local.slot, &local.ty, value)?;
                        Ok(local.slot)
                    }
                    Storage::ArrayPointer => {
                        let pointer = self.lower_array_value(value, &local.ty)?;
                        self.builder.emit_store(local.slot, pointer);
                        Ok(pointer)
                    }
                    Storage::Scalar => self.store_scalar(local.slot, &local.ty, op, value),
                }
            }
            ExprKind::ArrayAccess { array, index } => {
                let ty = self.type_of(target)?;
                let addr = self.element_address(array, index)?;
                self.store_scalar(addr, &ty, op, value)
            }
            _ => Err(LowerError::new("invalid assignment target", target.loc)),
        }
    }

    fn store_scalar(
        &mut self,
        addr: Value,
        ty: &LeiType,
        op: AssignOp,
        value: &Expr,
    ) -> Result<Value, LowerError> {
        let result = match op.binary_op() {
            None => self.lower_converted(value, ty)?,
            Some(bin) => {
                let current = self.builder.emit_load(value_type(ty, value.loc)?, addr);
                let rhs = self.lower_converted(value, ty)?;
                self.arith(bin, ty, current, rhs, value.loc)?
            }
        };
        self.builder.emit_store(addr, result);
        Ok(result)
    }

    fn lower_call(
        &mut self,
        expr: &Expr,
        callee: &str,
        args: &[Expr],
    ) -> Result<Value, LowerError> {
        if lei::semantic::builtins::lookup(callee).is_some() {
            return self.lower_builtin(expr, callee, args);
        }

        let signature = self.signatures.get(callee).cloned().ok_or_else(|| {
            LowerError::new(format!("call to unknown function '{}'", callee), expr.loc)
        })?;
        if signature.params.len() != args.len() {
            return Err(LowerError::new(
                format!("call to '{}' has the wrong number of arguments", callee),
                expr.loc,
            ));
        }

        let mut values = Vec::with_capacity(args.len());
        for (arg, param) in args.iter().zip(signature.params.iter()) {
            values.push(self.lower_converted(arg, param)?);
        }
        let ret = value_type(&signature.ret, expr.loc)?;
        Ok(self
            .builder
            .emit_call(callee, values, ret)
            .unwrap_or(Value::Null))
    }

    /// Call a declared runtime function, returning its result or null for
    /// void functions.
    pub(super) fn runtime_call(
        &mut self,
        name: &str,
        args: Vec<Value>,
        loc: Location,
    ) -> Result<Value, LowerError> {
        let (_, ret, _) = self.module.signature(name).ok_or_else(|| {
            LowerError::new(format!("runtime function '{}' is not declared", name), loc)
        })?;
        Ok(self
            .builder
            .emit_call(name, args, ret)
            .unwrap_or(Value::Null))
    }

    /// `count * elem_size` as an `i64`, for allocation sizes.
    pub(super) fn byte_count(&mut self, count: Value, elem_size: usize) -> Value {
        let wide = self.builder.emit_cast(CastOp::SExt, count, Type::I64);
        if elem_size == 1 {
            return wide;
        }
        self.builder
            .emit_arith(ArithOp::IMul, wide, Value::Int(elem_size as i64, Type::I64))
    }

    fn element_address(&mut self, array: &Expr, index: &Expr) -> Result<Value, LowerError> {
        let array_ty = self.type_of(array)?;
        let elem = element_type(&array_ty, array.loc)?;
        let base = self.lower_expr(array)?;
        let index = self.lower_expr(index)?;
        let offset = self.byte_count(index, elem.size());
        Ok(self.builder.emit_arith(ArithOp::PtrAdd, base, offset))
    }

    fn constant_element_addr(&mut self, base: Value, elem: Type, index: usize) -> Value {
        if index == 0 {
            return base;
        }
        let offset = Value::Int((index * elem.size()) as i64, Type::I64);
        self.builder.emit_arith(ArithOp::PtrAdd, base, offset)
    }

    fn zero_fill(&mut self, base: Value, elem: Type, from: usize, to: usize) {
        if from >= to {
            return;
        }
        let zero = zero_of(elem);
        if to - from <= UNROLL_LIMIT {
            for index in from..to {
                let addr = self.constant_element_addr(base, elem, index);
                self.builder.emit_store(addr, zero);
            }
            return;
        }

        self.index_loop(from, to, |builder, index| {
            let offset =
                builder.emit_arith(ArithOp::IMul, index, Value::Int(elem.size() as i64, Type::I64));
            let addr = builder.emit_arith(ArithOp::PtrAdd, base, offset);
            builder.emit_store(addr, zero);
        });
    }

    fn copy_elements(&mut self, dest: Value, source: Value, elem: Type, len: usize) {
        if len <= UNROLL_LIMIT {
            for index in 0..len {
                let from = self.constant_element_addr(source, elem, index);
                let value = self.builder.emit_load(elem, from);
                let to = self.constant_element_addr(dest, elem, index);
                self.builder.emit_store(to, value);
            }
            return;
        }

        self.index_loop(0, len, |builder, index| {
            let offset =
                builder.emit_arith(ArithOp::IMul, index, Value::Int(elem.size() as i64, Type::I64));
            let from = builder.emit_arith(ArithOp::PtrAdd, source, offset);
            let value = builder.emit_load(elem, from);
            let to = builder.emit_arith(ArithOp::PtrAdd, dest, offset);
            builder.emit_store(to, value);
        });
    }

    /// Emit `for i in from..to { body(i) }` with an `i64` counter slot.
    fn index_loop(
        &mut self,
        from: usize,
        to: usize,
        body: impl FnOnce(&mut FunctionBuilder, Value),
    ) {
        let counter = self.builder.emit_stack_alloc(Type::I64, 1);
        self.builder
            .emit_store(counter, Value::Int(from as i64, Type::I64));

        let cond_block = self.builder.create_block("fill_cond");
        let body_block = self.builder.create_block("fill_body");
        let done = self.builder.create_block("fill_end");
        self.builder.emit_branch(cond_block);

        self.builder.switch_to_block(cond_block);
        let index = self.builder.emit_load(Type::I64, counter);
        let more = self
            .builder
            .emit_cmp(CmpPred::Slt, index, Value::Int(to as i64, Type::I64));
        self.builder.emit_cond_branch(more, body_block, done);

        self.builder.switch_to_block(body_block);
        body(&mut self.builder, index);
        let next = self
            .builder
            .emit_arith(ArithOp::IAdd, index, Value::Int(1, Type::I64));
        self.builder.emit_store(counter, next);
        self.builder.emit_branch(cond_block);

        self.builder.switch_to_block(done);
    }

    fn local(&self, name: &str, loc: Location) -> Result<Local, LowerError> {
        self.locals
            .resolve(name)
            .copied()
            .ok_or_else(|| LowerError::new(format!("unknown local '{}'", name), loc))
    }

    pub(super) fn type_of(&self, expr: &Expr) -> Result<LeiType, LowerError> {
        self.analysis
            .type_of(expr.id)
            .ok_or_else(|| LowerError::new("expression has no resolved type", expr.loc))
    }
}

fn predicate(op: BinaryOp, float: bool) -> CmpPred {
    match (op, float) {
        (BinaryOp::Equal, false) => CmpPred::Eq,
        (BinaryOp::NotEqual, false) => CmpPred::Ne,
        (BinaryOp::Less, false) => CmpPred::Slt,
        (BinaryOp::LessEqual, false) => CmpPred::Sle,
        (BinaryOp::Greater, false) => CmpPred::Sgt,
        (BinaryOp::GreaterEqual, false) => CmpPred::Sge,
        (BinaryOp::Equal, true) => CmpPred::FEq,
        (BinaryOp::NotEqual, true) => CmpPred::FNe,
        (BinaryOp::Less, true) => CmpPred::FLt,
        (BinaryOp::LessEqual, true) => CmpPred::FLe,
        (BinaryOp::Greater, true) => CmpPred::FGt,
        (BinaryOp::GreaterEqual, true) => CmpPred::FGe,
        (_, float) => {
            if float {
                CmpPred::FEq
            } else {
                CmpPred::Eq
            }
        }
    }
}

/// Zero value for a source type, `None` for void.
fn zero_value(ty: &LeiType, loc: Location) -> Result<Option<Value>, LowerError> {
    let ir = value_type(ty, loc)?;
    if ir == Type::Void {
        return Ok(None);
    }
    Ok(Some(zero_of(ir)))
}

fn zero_of(ty: Type) -> Value {
    match ty {
        Type::F64 => Value::Float(0.0),
        Type::I1 => Value::Bool(false),
        Type::Ptr | Type::Void => Value::Null,
        other => Value::Int(0, other),
    }
}
