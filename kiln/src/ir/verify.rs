//! Structural IR verification
//!
//! Runs over a finished module before it is handed to a backend. The checks
//! are purely structural: every block is terminated, branch targets exist,
//! calls match the callee's signature and returns match the function's.

use super::*;
use thiserror::Error;

/// A structural problem found in a module
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("in function '{function}', block '{block}': {message}")]
pub struct VerifyError {
    /// Function containing the problem
    pub function: String,
    /// Label of the offending block
    pub block: String,
    /// Description of the problem
    pub message: String,
}

/// Verify every function in `module`, collecting all problems found
pub fn verify_module(module: &Module) -> Result<(), Vec<VerifyError>> {
    let mut errors = Vec::new();
    for func in &module.functions {
        verify_function(module, func, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn verify_function(module: &Module, func: &Function, errors: &mut Vec<VerifyError>) {
    if func.blocks.is_empty() {
        errors.push(VerifyError {
            function: func.name.clone(),
            block: String::new(),
            message: "function has no body".to_string(),
        });
        return;
    }

    for block in &func.blocks {
        let mut fail = |message: String| {
            errors.push(VerifyError {
                function: func.name.clone(),
                block: block.label.clone(),
                message,
            })
        };

        for inst in &block.instructions {
            match inst {
                Instruction::Load { addr, .. } | Instruction::Store { addr, .. } => {
                    if addr.ty() != Type::Ptr {
                        fail(format!("memory access through non-pointer {}", addr.ty()));
                    }
                }
                Instruction::Call {
                    dest,
                    func: callee,
                    args,
                    return_type,
                } => match module.signature(callee) {
                    None => fail(format!("call to undeclared function '{}'", callee)),
                    Some((params, ret, variadic)) => {
                        let arity_ok = if variadic {
                            args.len() >= params.len()
                        } else {
                            args.len() == params.len()
                        };
                        if !arity_ok {
                            fail(format!(
                                "call to '{}' passes {} arguments, expected {}",
                                callee,
                                args.len(),
                                params.len()
                            ));
                        }
                        for (i, (arg, param)) in args.iter().zip(params.iter()).enumerate() {
                            if arg.ty() != *param {
                                fail(format!(
                                    "argument {} of call to '{}' is {}, expected {}",
                                    i,
                                    callee,
                                    arg.ty(),
                                    param
                                ));
                            }
                        }
                        if *return_type != ret {
                            fail(format!(
                                "call to '{}' expects {}, function returns {}",
                                callee, return_type, ret
                            ));
                        }
                        if dest.is_some() && ret == Type::Void {
                            fail(format!("result of void call to '{}' is used", callee));
                        }
                    }
                },
                _ => {}
            }
        }

        match &block.terminator {
            None => fail("block has no terminator".to_string()),
            Some(Terminator::Branch(target)) => {
                if target.0 >= func.blocks.len() {
                    fail(format!("branch to missing block {}", target.0));
                }
            }
            Some(Terminator::CondBranch {
                cond,
                then_block,
                else_block,
            }) => {
                if cond.ty() != Type::I1 {
                    fail(format!("branch condition is {}, expected i1", cond.ty()));
                }
                for target in [then_block, else_block] {
                    if target.0 >= func.blocks.len() {
                        fail(format!("branch to missing block {}", target.0));
                    }
                }
            }
            Some(Terminator::Return(value)) => {
                let found = value.as_ref().map(|v| v.ty()).unwrap_or(Type::Void);
                if found != func.return_type {
                    fail(format!(
                        "returns {}, function is declared to return {}",
                        found, func.return_type
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::{FunctionBuilder, ModuleBuilder};

    fn module_with(func: Function) -> Module {
        let mut module = ModuleBuilder::new("test");
        module.declare_external("free", vec![Type::Ptr], Type::Void, false);
        module.declare_function(func.name.clone(), func.params.clone(), func.return_type);
        module.define_function(func);
        module.build()
    }

    #[test]
    fn accepts_well_formed_function() {
        let mut builder = FunctionBuilder::new("main", vec![], Type::I32);
        builder.emit_call("free", vec![Value::Null], Type::Void);
        builder.emit_return(Some(Value::Int(0, Type::I32)));
        assert_eq!(verify_module(&module_with(builder.build())), Ok(()));
    }

    #[test]
    fn reports_unterminated_block() {
        let mut builder = FunctionBuilder::new("main", vec![], Type::I32);
        let dangling = builder.create_block("dangling");
        builder.emit_branch(dangling);

        let errors = verify_module(&module_with(builder.build())).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].block, "dangling1");
        assert!(errors[0].message.contains("no terminator"));
    }

    #[test]
    fn reports_return_and_arity_mismatches() {
        let mut builder = FunctionBuilder::new("f", vec![], Type::Void);
        builder.emit_call("free", vec![], Type::Void);
        builder.emit_return(Some(Value::Bool(true)));

        let errors = verify_module(&module_with(builder.build())).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("passes 0 arguments"));
        assert!(errors[1].message.contains("declared to return void"));
    }

    #[test]
    fn reports_calls_to_unknown_functions() {
        let mut builder = FunctionBuilder::new("f", vec![], Type::Void);
        builder.emit_call("puts", vec![Value::Null], Type::I32);
        builder.emit_return(None);

        let errors = verify_module(&module_with(builder.build())).unwrap_err();
        assert!(errors[0].message.contains("undeclared function 'puts'"));
    }
}
