use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use kiln::Compiler;
use lei::errors::pretty::render;
use lei::errors::Diagnostics;
use log::info;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(version, about = "Compile Lei source to Kiln IR")]
struct Args {
    /// Path to the Lei source file
    file: PathBuf,

    /// Print the lowered IR module
    #[arg(long)]
    emit_ir: bool,

    /// Only scan, parse and type-check; do not lower
    #[arg(long, conflicts_with = "emit_ir")]
    check: bool,

    /// Name of the emitted module (defaults to the file stem)
    #[arg(long)]
    module_name: Option<String>,

    /// Deepest nesting the parser accepts before giving up
    #[arg(long, default_value_t = lei::parser::DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(2)
        }
    }
}

/// Returns `Ok(false)` when the program has diagnostics.
fn run(args: &Args) -> Result<bool> {
    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read '{}'", args.file.display()))?;

    let module_name = args.module_name.clone().unwrap_or_else(|| {
        args.file
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("main")
            .to_string()
    });
    let compiler = Compiler::new()
        .with_module_name(module_name)
        .with_max_nesting_depth(args.max_depth);

    if args.check {
        let diagnostics = compiler.check_source(&source);
        report(&source, &diagnostics);
        return Ok(diagnostics.is_empty());
    }

    let mut diagnostics = Diagnostics::new();
    let Some(module) = compiler.compile_with_diagnostics(&source, &mut diagnostics) else {
        report(&source, &diagnostics);
        return Ok(false);
    };

    info!(
        "compiled '{}' into {} functions",
        args.file.display(),
        module.functions.len()
    );
    if args.emit_ir {
        kiln::ir::printer::print_ir(&module);
    }
    Ok(true)
}

fn report(source: &str, diagnostics: &Diagnostics) {
    for diagnostic in diagnostics {
        eprintln!("{}\n", render(source, diagnostic));
    }
    if !diagnostics.is_empty() {
        eprintln!("{} error(s) found", diagnostics.len());
    }
}
