pub mod pretty;

use std::fmt;

use thiserror::Error;

/// Pipeline stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Lexical,
    Syntax,
    Semantic,
    Codegen,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Lexical => "lexical",
            Stage::Syntax => "syntax",
            Stage::Semantic => "semantic",
            Stage::Codegen => "codegen",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} error at line {line}, column {column}: {message}")]
pub struct Diagnostic {
    pub stage: Stage,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            stage,
            line,
            column,
            message: message.into(),
        }
    }
}

/// Accumulating sink shared by every stage of one compilation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn report(&mut self, stage: Stage, line: usize, column: usize, message: impl Into<String>) {
        self.push(Diagnostic::new(stage, line, column, message));
    }

    pub fn has_errors(&self, stage: Stage) -> bool {
        self.entries.iter().any(|d| d.stage == stage)
    }

    pub fn errors(&self, stage: Stage) -> Vec<&Diagnostic> {
        self.entries.iter().filter(|d| d.stage == stage).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_stage() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.report(Stage::Syntax, 1, 2, "expected ';'");
        diagnostics.report(Stage::Semantic, 3, 4, "Undefined variable 'x'");

        assert!(diagnostics.has_errors(Stage::Syntax));
        assert!(!diagnostics.has_errors(Stage::Lexical));
        assert_eq!(diagnostics.errors(Stage::Semantic).len(), 1);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn displays_position_and_stage() {
        let diagnostic = Diagnostic::new(Stage::Semantic, 7, 3, "Return type mismatch");
        assert_eq!(
            diagnostic.to_string(),
            "semantic error at line 7, column 3: Return type mismatch"
        );
    }
}
