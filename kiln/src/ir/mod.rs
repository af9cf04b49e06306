//! Intermediate Representation for Kiln
//!
//! A typed, block-structured IR in the shape a native backend expects:
//! every local lives in a stack slot, memory is reached through explicit
//! loads and stores, and control flow is expressed with basic blocks that
//! each end in exactly one terminator. Pointers are opaque.

pub mod builder;
pub mod printer;
pub mod verify;

/// A lowered module
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Runtime entry points the module calls but does not define
    pub externs: Vec<ExternDecl>,
    /// Functions defined in this module
    pub functions: Vec<Function>,
    /// Interned string literals, referenced by `Value::Str`
    pub strings: Vec<String>,
}

/// Declaration of an external function
#[derive(Debug, Clone, PartialEq)]
pub struct ExternDecl {
    /// Symbol name
    pub name: String,
    /// Fixed parameter types
    pub params: Vec<Type>,
    /// Return type
    pub return_type: Type,
    /// Whether extra arguments may follow the fixed ones
    pub variadic: bool,
}

/// A function definition
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Parameters, bound to temporaries `0..params.len()`
    pub params: Vec<Parameter>,
    /// Return type
    pub return_type: Type,
    /// Basic blocks; the first one is the entry block
    pub blocks: Vec<BasicBlock>,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub ty: Type,
}

/// A basic block (straight-line code with no branches except at the end)
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// Block label
    pub label: String,
    /// Instructions in this block
    pub instructions: Vec<Instruction>,
    /// Block terminator, `None` while the block is still open
    pub terminator: Option<Terminator>,
}

/// Index of a block within its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// SSA temporary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Temp(pub usize);

/// Index into `Module::strings`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(pub usize);

/// IR instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Reserve `count` consecutive elements of `ty` on the stack
    StackAlloc {
        /// Pointer to the first element
        dest: Temp,
        /// Element type
        ty: Type,
        /// Number of elements
        count: usize,
    },
    /// Load from memory
    Load {
        /// Loaded value
        dest: Temp,
        /// Type read from memory
        ty: Type,
        /// Source pointer
        addr: Value,
    },
    /// Store to memory
    Store {
        /// Destination pointer
        addr: Value,
        /// Value written; its type decides the width
        value: Value,
    },
    /// Binary arithmetic or bitwise operation
    Arith {
        /// Result
        dest: Temp,
        /// Operation
        op: ArithOp,
        /// Left operand
        lhs: Value,
        /// Right operand
        rhs: Value,
    },
    /// Comparison producing an `i1`
    Cmp {
        /// Result
        dest: Temp,
        /// Predicate
        pred: CmpPred,
        /// Left operand
        lhs: Value,
        /// Right operand
        rhs: Value,
    },
    /// Numeric conversion
    Cast {
        /// Converted value
        dest: Temp,
        /// Conversion kind
        op: CastOp,
        /// Source value
        value: Value,
        /// Target type
        to: Type,
    },
    /// Function call
    Call {
        /// Result, `None` for void calls
        dest: Option<Temp>,
        /// Callee symbol
        func: String,
        /// Arguments in order
        args: Vec<Value>,
        /// Callee return type
        return_type: Type,
    },
}

/// Block terminator (control flow)
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// Return from function
    Return(Option<Value>),
    /// Unconditional branch
    Branch(BlockId),
    /// Conditional branch
    CondBranch {
        /// `i1` condition
        cond: Value,
        /// Target when the condition holds
        then_block: BlockId,
        /// Target otherwise
        else_block: BlockId,
    },
}

/// Arithmetic operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// Integer addition
    IAdd,
    /// Integer subtraction
    ISub,
    /// Integer multiplication
    IMul,
    /// Signed integer division
    SDiv,
    /// Float addition
    FAdd,
    /// Float subtraction
    FSub,
    /// Float multiplication
    FMul,
    /// Float division
    FDiv,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise exclusive or
    Xor,
    /// Pointer plus a byte offset
    PtrAdd,
}

/// Comparison predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpPred {
    /// Integer or pointer equality
    Eq,
    /// Integer or pointer inequality
    Ne,
    /// Signed less than
    Slt,
    /// Signed less or equal
    Sle,
    /// Signed greater than
    Sgt,
    /// Signed greater or equal
    Sge,
    /// Ordered float equality
    FEq,
    /// Ordered float inequality
    FNe,
    /// Ordered float less than
    FLt,
    /// Ordered float less or equal
    FLe,
    /// Ordered float greater than
    FGt,
    /// Ordered float greater or equal
    FGe,
}

/// Conversion kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    /// Signed integer to floating point
    SIToFP,
    /// Sign extension
    SExt,
    /// Integer truncation
    Trunc,
}

/// IR value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Temporary with its type
    Temp(Temp, Type),
    /// Integer constant of the given integer type
    Int(i64, Type),
    /// `f64` constant
    Float(f64),
    /// `i1` constant
    Bool(bool),
    /// Null pointer
    Null,
    /// Pointer to an interned string
    Str(StringId),
}

/// IR type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// Void (no value)
    Void,
    /// Boolean
    I1,
    /// Byte
    I8,
    /// 32-bit integer
    I32,
    /// 64-bit integer
    I64,
    /// Double precision float
    F64,
    /// Opaque pointer
    Ptr,
}

impl Type {
    /// Storage size in bytes
    pub fn size(self) -> usize {
        match self {
            Type::Void => 0,
            Type::I1 | Type::I8 => 1,
            Type::I32 => 4,
            Type::I64 | Type::F64 | Type::Ptr => 8,
        }
    }
}

impl Value {
    /// Type of the value
    pub fn ty(&self) -> Type {
        match self {
            Value::Temp(_, ty) | Value::Int(_, ty) => *ty,
            Value::Float(_) => Type::F64,
            Value::Bool(_) => Type::I1,
            Value::Null | Value::Str(_) => Type::Ptr,
        }
    }
}

impl Instruction {
    /// Temporary defined by this instruction, if any
    pub fn dest(&self) -> Option<Temp> {
        match self {
            Instruction::StackAlloc { dest, .. }
            | Instruction::Load { dest, .. }
            | Instruction::Arith { dest, .. }
            | Instruction::Cmp { dest, .. }
            | Instruction::Cast { dest, .. } => Some(*dest),
            Instruction::Call { dest, .. } => *dest,
            Instruction::Store { .. } => None,
        }
    }
}

impl Module {
    /// Create a new empty module
    pub fn new(name: String) -> Self {
        Self {
            name,
            externs: Vec::new(),
            functions: Vec::new(),
            strings: Vec::new(),
        }
    }

    /// Look up a defined function by name
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|func| func.name == name)
    }

    /// Look up an external declaration by name
    pub fn external(&self, name: &str) -> Option<&ExternDecl> {
        self.externs.iter().find(|decl| decl.name == name)
    }

    /// Parameter types, return type and variadic flag of any callable symbol
    pub fn signature(&self, name: &str) -> Option<(Vec<Type>, Type, bool)> {
        if let Some(func) = self.function(name) {
            let params = func.params.iter().map(|param| param.ty).collect();
            return Some((params, func.return_type, false));
        }
        self.external(name)
            .map(|decl| (decl.params.clone(), decl.return_type, decl.variadic))
    }
}

impl Function {
    /// Create a new function
    pub fn new(name: String, params: Vec<Parameter>, return_type: Type) -> Self {
        Self {
            name,
            params,
            return_type,
            blocks: Vec::new(),
        }
    }
}

impl BasicBlock {
    /// Create a new basic block
    pub fn new(label: String) -> Self {
        Self {
            label,
            instructions: Vec::new(),
            terminator: None,
        }
    }
}
