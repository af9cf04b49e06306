pub mod errors;
pub mod lexer;
pub mod parser;
pub mod semantic;

use errors::{Diagnostics, Stage};
use parser::ast::Program;
use semantic::Analysis;

/// Result of running the front end over one source text.
#[derive(Debug, Clone)]
pub struct Checked {
    pub program: Program,
    pub analysis: Analysis,
}

/// Scans, parses and analyzes `source`. Analysis only runs when scanning
/// and parsing were clean; `None` means `diagnostics` holds the reasons.
pub fn check(source: &str, max_depth: usize, diagnostics: &mut Diagnostics) -> Option<Checked> {
    let tokens = lexer::lex(source);
    let program = parser::Parser::new(tokens)
        .with_max_depth(max_depth)
        .parse_program(diagnostics);
    if diagnostics.has_errors(Stage::Lexical) || diagnostics.has_errors(Stage::Syntax) {
        return None;
    }

    let analysis = semantic::analyze(&program, diagnostics);
    if diagnostics.has_errors(Stage::Semantic) {
        return None;
    }

    Some(Checked { program, analysis })
}
