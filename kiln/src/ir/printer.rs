//! IR pretty-printing for debugging

use super::*;
use std::fmt;

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Void => "void",
            Type::I1 => "i1",
            Type::I8 => "i8",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F64 => "f64",
            Type::Ptr => "ptr",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Temp(temp, _) => write!(f, "%{}", temp.0),
            Value::Int(value, _) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{:?}", value),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Null => f.write_str("null"),
            Value::Str(id) => write!(f, "@str{}", id.0),
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArithOp::IAdd => "add",
            ArithOp::ISub => "sub",
            ArithOp::IMul => "mul",
            ArithOp::SDiv => "sdiv",
            ArithOp::FAdd => "fadd",
            ArithOp::FSub => "fsub",
            ArithOp::FMul => "fmul",
            ArithOp::FDiv => "fdiv",
            ArithOp::And => "and",
            ArithOp::Or => "or",
            ArithOp::Xor => "xor",
            ArithOp::PtrAdd => "ptradd",
        };
        f.write_str(name)
    }
}

impl fmt::Display for CmpPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CmpPred::Eq => "icmp eq",
            CmpPred::Ne => "icmp ne",
            CmpPred::Slt => "icmp slt",
            CmpPred::Sle => "icmp sle",
            CmpPred::Sgt => "icmp sgt",
            CmpPred::Sge => "icmp sge",
            CmpPred::FEq => "fcmp oeq",
            CmpPred::FNe => "fcmp one",
            CmpPred::FLt => "fcmp olt",
            CmpPred::FLe => "fcmp ole",
            CmpPred::FGt => "fcmp ogt",
            CmpPred::FGe => "fcmp oge",
        };
        f.write_str(name)
    }
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CastOp::SIToFP => "sitofp",
            CastOp::SExt => "sext",
            CastOp::Trunc => "trunc",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::StackAlloc { dest, ty, count } => {
                if *count == 1 {
                    write!(f, "%{} = alloca {}", dest.0, ty)
                } else {
                    write!(f, "%{} = alloca [{} x {}]", dest.0, count, ty)
                }
            }
            Instruction::Load { dest, ty, addr } => {
                write!(f, "%{} = load {}, ptr {}", dest.0, ty, addr)
            }
            Instruction::Store { addr, value } => {
                write!(f, "store {} {}, ptr {}", value.ty(), value, addr)
            }
            Instruction::Arith { dest, op, lhs, rhs } => {
                write!(f, "%{} = {} {} {}, {}", dest.0, op, lhs.ty(), lhs, rhs)
            }
            Instruction::Cmp {
                dest,
                pred,
                lhs,
                rhs,
            } => write!(f, "%{} = {} {} {}, {}", dest.0, pred, lhs.ty(), lhs, rhs),
            Instruction::Cast {
                dest,
                op,
                value,
                to,
            } => write!(
                f,
                "%{} = {} {} {} to {}",
                dest.0,
                op,
                value.ty(),
                value,
                to
            ),
            Instruction::Call {
                dest,
                func,
                args,
                return_type,
            } => {
                if let Some(dest) = dest {
                    write!(f, "%{} = ", dest.0)?;
                }
                write!(f, "call {} @{}(", return_type, func)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", arg.ty(), arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

struct TerminatorDisplay<'a> {
    term: &'a Terminator,
    func: &'a Function,
}

impl fmt::Display for TerminatorDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = |id: &BlockId| {
            self.func
                .blocks
                .get(id.0)
                .map(|block| block.label.clone())
                .unwrap_or_else(|| format!("<missing {}>", id.0))
        };
        match self.term {
            Terminator::Return(None) => write!(f, "ret void"),
            Terminator::Return(Some(value)) => write!(f, "ret {} {}", value.ty(), value),
            Terminator::Branch(target) => write!(f, "br label %{}", label(target)),
            Terminator::CondBranch {
                cond,
                then_block,
                else_block,
            } => write!(
                f,
                "br i1 {}, label %{}, label %{}",
                cond,
                label(then_block),
                label(else_block)
            ),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "define {} @{}(", self.return_type, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} %{}", param.ty, i)?;
        }
        writeln!(f, ") {{")?;

        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for inst in &block.instructions {
                writeln!(f, "  {}", inst)?;
            }
            match &block.terminator {
                Some(term) => writeln!(f, "  {}", TerminatorDisplay { term, func: self })?,
                None => writeln!(f, "  ; missing terminator")?,
            }
        }

        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;

        for decl in &self.externs {
            write!(f, "declare {} @{}(", decl.return_type, decl.name)?;
            for (i, param) in decl.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", param)?;
            }
            if decl.variadic {
                if decl.params.is_empty() {
                    write!(f, "...")?;
                } else {
                    write!(f, ", ...")?;
                }
            }
            writeln!(f, ")")?;
        }

        if !self.strings.is_empty() {
            writeln!(f)?;
        }
        for (i, text) in self.strings.iter().enumerate() {
            writeln!(f, "@str{} = c\"{}\"", i, text.escape_default())?;
        }

        for func in &self.functions {
            writeln!(f)?;
            write!(f, "{}", func)?;
        }

        Ok(())
    }
}

/// Print IR to stdout for debugging
pub fn print_ir(module: &Module) {
    println!("{}", module);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;

    #[test]
    fn prints_blocks_and_instructions() {
        let mut builder = FunctionBuilder::new(
            "inc",
            vec![Parameter {
                name: "x".to_string(),
                ty: Type::I32,
            }],
            Type::I32,
        );
        let x = builder.param(0).unwrap();
        let sum = builder.emit_arith(ArithOp::IAdd, x, Value::Int(1, Type::I32));
        builder.emit_return(Some(sum));
        let text = builder.build().to_string();

        assert!(text.starts_with("define i32 @inc(i32 %0) {"));
        assert!(text.contains("entry:\n  %1 = add i32 %0, 1\n  ret i32 %1"));
    }

    #[test]
    fn prints_variadic_externs_and_strings() {
        let mut module = Module::new("demo".to_string());
        module.externs.push(ExternDecl {
            name: "printf".to_string(),
            params: vec![Type::Ptr],
            return_type: Type::I32,
            variadic: true,
        });
        module.strings.push("%d\n".to_string());
        let text = module.to_string();

        assert!(text.contains("declare i32 @printf(ptr, ...)"));
        assert!(text.contains("@str0 = c\"%d\\n\""));
    }

    #[test]
    fn floats_keep_their_decimal_point() {
        assert_eq!(Value::Float(0.0).to_string(), "0.0");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
    }
}
