//! IR builder utilities
//!
//! Helpers for constructing IR programmatically. `ModuleBuilder` owns the
//! module-level tables (externals, function signatures, string pool) while
//! `FunctionBuilder` tracks an insertion point inside one function body.

use super::*;

/// IR builder for constructing modules
#[derive(Debug)]
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    /// Create a new module builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: Module::new(name.into()),
        }
    }

    /// Declare a runtime function provided outside the module
    pub fn declare_external(
        &mut self,
        name: impl Into<String>,
        params: Vec<Type>,
        return_type: Type,
        variadic: bool,
    ) {
        let name = name.into();
        if self.module.external(&name).is_some() {
            return;
        }
        self.module.externs.push(ExternDecl {
            name,
            params,
            return_type,
            variadic,
        });
    }

    /// Declare a function signature; its body is attached later with
    /// [`ModuleBuilder::define_function`]
    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<Parameter>,
        return_type: Type,
    ) {
        self.module
            .functions
            .push(Function::new(name.into(), params, return_type));
    }

    /// Replace the declared function of the same name with a finished body.
    /// Returns false if no such function was declared.
    pub fn define_function(&mut self, func: Function) -> bool {
        match self
            .module
            .functions
            .iter_mut()
            .find(|declared| declared.name == func.name)
        {
            Some(slot) => {
                *slot = func;
                true
            }
            None => false,
        }
    }

    /// Whether `name` is a declared function or external
    pub fn is_declared(&self, name: &str) -> bool {
        self.module.signature(name).is_some()
    }

    /// Signature of a declared function or external
    pub fn signature(&self, name: &str) -> Option<(Vec<Type>, Type, bool)> {
        self.module.signature(name)
    }

    /// Intern a string literal, reusing an existing entry when possible
    pub fn intern_string(&mut self, text: &str) -> Value {
        if let Some(index) = self.module.strings.iter().position(|s| s == text) {
            return Value::Str(StringId(index));
        }
        self.module.strings.push(text.to_string());
        Value::Str(StringId(self.module.strings.len() - 1))
    }

    /// Finish building and return the module
    pub fn build(self) -> Module {
        self.module
    }
}

/// IR builder for constructing functions
#[derive(Debug)]
pub struct FunctionBuilder {
    function: Function,
    current_block: Option<BlockId>,
    next_temp: usize,
    entry_allocs: usize,
    block_counter: usize,
}

impl FunctionBuilder {
    /// Create a new function builder with an empty entry block selected
    pub fn new(name: impl Into<String>, params: Vec<Parameter>, return_type: Type) -> Self {
        let next_temp = params.len();
        let mut function = Function::new(name.into(), params, return_type);
        function.blocks.push(BasicBlock::new("entry".to_string()));
        Self {
            function,
            current_block: Some(BlockId(0)),
            next_temp,
            entry_allocs: 0,
            block_counter: 0,
        }
    }

    /// Value bound to the `index`-th parameter
    pub fn param(&self, index: usize) -> Option<Value> {
        self.function
            .params
            .get(index)
            .map(|param| Value::Temp(Temp(index), param.ty))
    }

    /// Create a new basic block; labels are made unique with a counter
    pub fn create_block(&mut self, label: &str) -> BlockId {
        self.block_counter += 1;
        let block = BasicBlock::new(format!("{}{}", label, self.block_counter));
        self.function.blocks.push(block);
        BlockId(self.function.blocks.len() - 1)
    }

    /// Switch to a block
    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = Some(block);
    }

    /// Whether the current block already ends in a terminator
    pub fn is_terminated(&self) -> bool {
        self.current_block
            .and_then(|id| self.function.blocks.get(id.0))
            .map(|block| block.terminator.is_some())
            .unwrap_or(true)
    }

    /// Reserve stack space. Slots always go to the top of the entry block so
    /// they dominate every use.
    pub fn emit_stack_alloc(&mut self, ty: Type, count: usize) -> Value {
        let dest = self.fresh_temp();
        let position = self.entry_allocs;
        self.function.blocks[0].instructions.insert(
            position,
            Instruction::StackAlloc { dest, ty, count },
        );
        self.entry_allocs += 1;
        Value::Temp(dest, Type::Ptr)
    }

    /// Load a value of type `ty` from `addr`
    pub fn emit_load(&mut self, ty: Type, addr: Value) -> Value {
        let dest = self.fresh_temp();
        self.push(Instruction::Load { dest, ty, addr });
        Value::Temp(dest, ty)
    }

    /// Store `value` to `addr`
    pub fn emit_store(&mut self, addr: Value, value: Value) {
        self.push(Instruction::Store { addr, value });
    }

    /// Emit an arithmetic operation; the result has the type of `lhs`
    pub fn emit_arith(&mut self, op: ArithOp, lhs: Value, rhs: Value) -> Value {
        let dest = self.fresh_temp();
        let ty = lhs.ty();
        self.push(Instruction::Arith { dest, op, lhs, rhs });
        Value::Temp(dest, ty)
    }

    /// Emit a comparison producing an `i1`
    pub fn emit_cmp(&mut self, pred: CmpPred, lhs: Value, rhs: Value) -> Value {
        let dest = self.fresh_temp();
        self.push(Instruction::Cmp {
            dest,
            pred,
            lhs,
            rhs,
        });
        Value::Temp(dest, Type::I1)
    }

    /// Emit a conversion of `value` to `to`
    pub fn emit_cast(&mut self, op: CastOp, value: Value, to: Type) -> Value {
        let dest = self.fresh_temp();
        self.push(Instruction::Cast {
            dest,
            op,
            value,
            to,
        });
        Value::Temp(dest, to)
    }

    /// Emit a call; returns the result unless `return_type` is void
    pub fn emit_call(&mut self, func: &str, args: Vec<Value>, return_type: Type) -> Option<Value> {
        let dest = if return_type == Type::Void {
            None
        } else {
            Some(self.fresh_temp())
        };
        self.push(Instruction::Call {
            dest,
            func: func.to_string(),
            args,
            return_type,
        });
        dest.map(|temp| Value::Temp(temp, return_type))
    }

    /// Terminate the current block with an unconditional branch
    pub fn emit_branch(&mut self, target: BlockId) {
        self.terminate(Terminator::Branch(target));
    }

    /// Terminate the current block with a conditional branch
    pub fn emit_cond_branch(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBranch {
            cond,
            then_block,
            else_block,
        });
    }

    /// Terminate the current block with a return
    pub fn emit_return(&mut self, value: Option<Value>) {
        self.terminate(Terminator::Return(value));
    }

    /// Finish building and return the function
    pub fn build(self) -> Function {
        self.function
    }

    fn fresh_temp(&mut self) -> Temp {
        let temp = Temp(self.next_temp);
        self.next_temp += 1;
        temp
    }

    fn push(&mut self, inst: Instruction) {
        if let Some(block) = self.current_block {
            self.function.blocks[block.0].instructions.push(inst);
        }
    }

    // The first terminator wins; later ones belong to dead code.
    fn terminate(&mut self, term: Terminator) {
        if let Some(block) = self.current_block {
            let block = &mut self.function.blocks[block.0];
            if block.terminator.is_none() {
                block.terminator = Some(term);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_slots_are_hoisted_into_entry() {
        let mut builder = FunctionBuilder::new("f", vec![], Type::Void);
        let body = builder.create_block("body");
        builder.emit_branch(body);
        builder.switch_to_block(body);
        let slot = builder.emit_stack_alloc(Type::I32, 1);
        builder.emit_store(slot, Value::Int(1, Type::I32));
        builder.emit_return(None);

        let func = builder.build();
        assert!(matches!(
            func.blocks[0].instructions[0],
            Instruction::StackAlloc { ty: Type::I32, count: 1, .. }
        ));
        assert_eq!(func.blocks[1].instructions.len(), 1);
    }

    #[test]
    fn params_occupy_first_temps() {
        let params = vec![
            Parameter {
                name: "a".to_string(),
                ty: Type::I32,
            },
            Parameter {
                name: "b".to_string(),
                ty: Type::F64,
            },
        ];
        let mut builder = FunctionBuilder::new("g", params, Type::I32);
        assert_eq!(builder.param(1), Some(Value::Temp(Temp(1), Type::F64)));
        let slot = builder.emit_stack_alloc(Type::I32, 1);
        assert_eq!(slot, Value::Temp(Temp(2), Type::Ptr));
    }

    #[test]
    fn first_terminator_wins() {
        let mut builder = FunctionBuilder::new("h", vec![], Type::I32);
        assert!(!builder.is_terminated());
        builder.emit_return(Some(Value::Int(0, Type::I32)));
        builder.emit_return(Some(Value::Int(1, Type::I32)));
        assert!(builder.is_terminated());

        let func = builder.build();
        assert_eq!(
            func.blocks[0].terminator,
            Some(Terminator::Return(Some(Value::Int(0, Type::I32))))
        );
    }

    #[test]
    fn strings_are_interned_once() {
        let mut module = ModuleBuilder::new("m");
        let a = module.intern_string("%d");
        let b = module.intern_string("%d");
        let c = module.intern_string("%s");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(module.build().strings.len(), 2);
    }
}
