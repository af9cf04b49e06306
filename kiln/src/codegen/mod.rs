//! Code generation orchestration
//!
//! Lowers a checked program to IR in two passes: every signature is declared
//! first so calls may refer to functions defined later, then bodies are
//! filled in. The finished module is verified before it is returned.

pub mod builtins;
pub mod lowering;

use std::collections::HashMap;

use lei::errors::{Diagnostics, Stage};
use lei::parser::ast::{Location, Program};
use lei::semantic::types::{BaseType, Type as LeiType};
use lei::semantic::Analysis;
use log::{debug, trace};
use thiserror::Error;

use crate::ir::builder::ModuleBuilder;
use crate::ir::verify::verify_module;
use crate::ir::{Module, Parameter, Type};
use lowering::FunctionLowering;

/// Internal inconsistency found while lowering a checked program
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LowerError {
    /// What went wrong
    pub message: String,
    /// Source position of the construct being lowered
    pub loc: Location,
}

impl LowerError {
    pub(crate) fn new(message: impl Into<String>, loc: Location) -> Self {
        Self {
            message: message.into(),
            loc,
        }
    }
}

/// Source-level signature of a user function
#[derive(Debug, Clone)]
pub(crate) struct Signature {
    pub params: Vec<LeiType>,
    pub ret: LeiType,
}

/// Main codegen entry point.
pub struct CodeGenerator<'a> {
    analysis: &'a Analysis,
}

impl<'a> CodeGenerator<'a> {
    /// Create a code generator over the types resolved by analysis.
    pub fn new(analysis: &'a Analysis) -> Self {
        Self { analysis }
    }

    /// Lower `program` into a module named `module_name`.
    ///
    /// Returns `None` after reporting a `Stage::Codegen` diagnostic if the
    /// program could not be lowered or the result fails verification.
    pub fn generate(
        &self,
        program: &Program,
        module_name: &str,
        diagnostics: &mut Diagnostics,
    ) -> Option<Module> {
        match self.lower_program(program, module_name) {
            Ok(module) => match verify_module(&module) {
                Ok(()) => {
                    debug!(
                        "lowered {} functions into module '{}'",
                        module.functions.len(),
                        module.name
                    );
                    Some(module)
                }
                Err(errors) => {
                    for err in errors {
                        let loc = program
                            .functions
                            .iter()
                            .find(|function| function.name == err.function)
                            .map(|function| function.loc)
                            .unwrap_or_default();
                        diagnostics.report(Stage::Codegen, loc.line, loc.column, err.to_string());
                    }
                    None
                }
            },
            Err(err) => {
                diagnostics.report(Stage::Codegen, err.loc.line, err.loc.column, err.message);
                None
            }
        }
    }

    fn lower_program(&self, program: &Program, module_name: &str) -> Result<Module, LowerError> {
        let mut module = ModuleBuilder::new(module_name);
        builtins::declare_runtime(&mut module);

        let mut signatures = HashMap::new();
        for function in &program.functions {
            let params = function
                .params
                .iter()
                .map(|param| {
                    Ok(Parameter {
                        name: param.name.clone(),
                        ty: value_type(&param.ty, param.loc)?,
                    })
                })
                .collect::<Result<Vec<_>, LowerError>>()?;
            let ret = value_type(&function.return_type, function.loc)?;

            if module.is_declared(&function.name) {
                return Err(LowerError::new(
                    format!("function '{}' is declared twice", function.name),
                    function.loc,
                ));
            }
            module.declare_function(function.name.clone(), params, ret);
            signatures.insert(
                function.name.clone(),
                Signature {
                    params: function.params.iter().map(|param| param.ty).collect(),
                    ret: function.return_type,
                },
            );
        }

        for function in &program.functions {
            trace!("lowering function '{}'", function.name);
            let lowered =
                FunctionLowering::new(self.analysis, &mut module, &signatures, function)?
                    .lower(function)?;
            if !module.define_function(lowered) {
                return Err(LowerError::new(
                    format!("function '{}' was never declared", function.name),
                    function.loc,
                ));
            }
        }

        Ok(module.build())
    }
}

/// IR type of a value of source type `ty`. Arrays are passed around as a
/// pointer to their first element.
pub(crate) fn value_type(ty: &LeiType, loc: Location) -> Result<Type, LowerError> {
    if ty.is_array() {
        return Ok(Type::Ptr);
    }
    match ty.base {
        BaseType::Int => Ok(Type::I32),
        BaseType::Float => Ok(Type::F64),
        BaseType::Bool => Ok(Type::I1),
        BaseType::Str => Ok(Type::Ptr),
        BaseType::Void => Ok(Type::Void),
        BaseType::Error | BaseType::Any => Err(LowerError::new(
            format!("cannot lower value of unresolved type {}", ty),
            loc,
        )),
    }
}

/// IR type of one element of an array of `ty`.
pub(crate) fn element_type(ty: &LeiType, loc: Location) -> Result<Type, LowerError> {
    let element = ty.element();
    match element.base {
        BaseType::Void => Err(LowerError::new("array of void has no layout", loc)),
        _ => value_type(&element, loc),
    }
}

/// Size in bytes that `sizeof(ty)` reports.
pub(crate) fn size_of(ty: &LeiType, loc: Location) -> Result<usize, LowerError> {
    match ty.fixed_len() {
        Some(len) => Ok(len * element_type(ty, loc)?.size()),
        None => Ok(value_type(ty, loc)?.size()),
    }
}
