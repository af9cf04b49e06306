//! Kiln - IR lowering for Lei
//!
//! Kiln drives the Lei front end (scanner, parser, semantic analysis) and
//! lowers checked programs to a small typed, LLVM-like IR. The IR is the
//! hand-off point for a native backend; Kiln itself stops at a verified
//! module.
//!
//! ```no_run
//! let module = kiln::Compiler::new()
//!     .compile_source("fn int main() { print(\"hi\"); return 0; }")
//!     .expect("program compiles");
//! println!("{}", module);
//! ```

#![warn(missing_docs)]

pub mod codegen;
pub mod ir;

use lei::errors::{Diagnostic, Diagnostics, Stage};
use lei::parser::DEFAULT_MAX_DEPTH;
use log::debug;
use thiserror::Error;

/// Kiln compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Main compiler interface
#[derive(Debug, Clone)]
pub struct Compiler {
    /// Name given to the emitted module
    pub module_name: String,
    /// Deepest statement/expression nesting the parser accepts
    pub max_nesting_depth: usize,
}

impl Compiler {
    /// Create a new compiler with default settings
    pub fn new() -> Self {
        Self {
            module_name: "main".to_string(),
            max_nesting_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the name of the emitted module
    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    /// Set the parser's nesting limit
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Compile Lei source text into a verified IR module.
    ///
    /// Stops at the first stage that reports problems; the error carries
    /// every diagnostic from that stage.
    pub fn compile_source(&self, source: &str) -> Result<ir::Module, CompileError> {
        let mut diagnostics = Diagnostics::new();
        match self.compile_with_diagnostics(source, &mut diagnostics) {
            Some(module) => Ok(module),
            None => Err(CompileError::from_diagnostics(diagnostics)),
        }
    }

    /// Compile `source`, appending every problem found to `diagnostics`.
    /// Returns `None` if any stage reported an error.
    pub fn compile_with_diagnostics(
        &self,
        source: &str,
        diagnostics: &mut Diagnostics,
    ) -> Option<ir::Module> {
        let checked = lei::check(source, self.max_nesting_depth, diagnostics)?;
        let generator = codegen::CodeGenerator::new(&checked.analysis);
        let module = generator.generate(&checked.program, &self.module_name, diagnostics)?;
        debug!(
            "compiled module '{}' ({} functions, {} strings)",
            module.name,
            module.functions.len(),
            module.strings.len()
        );
        Some(module)
    }

    /// Run only the front end, returning its diagnostics.
    pub fn check_source(&self, source: &str) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        let _ = lei::check(source, self.max_nesting_depth, &mut diagnostics);
        diagnostics
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Compilation errors, one variant per failing stage
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    /// The source contained characters or strings the scanner rejected
    #[error("{} lexical error(s)", .0.len())]
    Lexical(Vec<Diagnostic>),
    /// The token stream did not match the grammar
    #[error("{} syntax error(s)", .0.len())]
    Syntax(Vec<Diagnostic>),
    /// Name resolution or type checking failed
    #[error("{} semantic error(s)", .0.len())]
    Semantic(Vec<Diagnostic>),
    /// Lowering or IR verification failed
    #[error("{} codegen error(s)", .0.len())]
    Codegen(Vec<Diagnostic>),
}

impl CompileError {
    fn from_diagnostics(diagnostics: Diagnostics) -> Self {
        let all = diagnostics.into_vec();
        let stage = all
            .iter()
            .map(|diagnostic| diagnostic.stage)
            .min_by_key(|stage| *stage as u8)
            .unwrap_or(Stage::Codegen);
        let errors = all
            .into_iter()
            .filter(|diagnostic| diagnostic.stage == stage)
            .collect();
        match stage {
            Stage::Lexical => CompileError::Lexical(errors),
            Stage::Syntax => CompileError::Syntax(errors),
            Stage::Semantic => CompileError::Semantic(errors),
            Stage::Codegen => CompileError::Codegen(errors),
        }
    }

    /// Stage that failed
    pub fn stage(&self) -> Stage {
        match self {
            CompileError::Lexical(_) => Stage::Lexical,
            CompileError::Syntax(_) => Stage::Syntax,
            CompileError::Semantic(_) => Stage::Semantic,
            CompileError::Codegen(_) => Stage::Codegen,
        }
    }

    /// Diagnostics reported by the failing stage, in source order of
    /// discovery
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileError::Lexical(errors)
            | CompileError::Syntax(errors)
            | CompileError::Semantic(errors)
            | CompileError::Codegen(errors) => errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let compiler = Compiler::default();
        assert_eq!(compiler.module_name, "main");
        assert_eq!(compiler.max_nesting_depth, 256);
    }

    #[test]
    fn lexical_errors_win_over_syntax_errors() {
        let err = Compiler::new()
            .compile_source("fn int main() { return 0 # }")
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Lexical);
        assert_eq!(err.diagnostics().len(), 1);
    }
}
