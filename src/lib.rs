//! Front-end and mid-end compiler for the Mica language: a single
//! source file goes through lexing, parsing, semantic analysis, IR
//! construction, verification, and a fixed optimization pipeline,
//! producing a verified architecture-independent IR module.
//!
//! Each stage accumulates diagnostics instead of aborting; a stage
//! with at least one diagnostic stops the pipeline and its list is
//! returned. The CLI in `main.rs` is a thin shell over [`compile`].

use diagnostics::{Diagnostic, Phase};
use frontend::parser::Parser;
use frontend::SourceFile;
use middle::analyze;
use middle::ir::{builder, verify, Module};
use middle::optimize::Optimizer;

pub mod diagnostics;
pub mod frontend;
pub mod index;
pub mod middle;

/// The artifacts of a compilation that ran to completion. The
/// analysis keeps the symbol table alive for consumers that want to
/// inspect it (the driver's unused-name report, tests).
pub struct Compilation {
    pub module: Module,
    pub analysis: analyze::Analysis,
}

/// Runs the full pipeline over one source file:
/// lex → parse → analyze → build IR → verify → optimize → verify.
pub fn compile(source: &SourceFile) -> Result<Compilation, Vec<Diagnostic>> {
    let (file, errors) = Parser::parse_file(source);
    if !errors.is_empty() {
        return Err(errors);
    }

    let (analysis, errors) = analyze::analyze(&file);
    if !errors.is_empty() {
        return Err(errors);
    }

    let (mut module, errors) = builder::build(&file, &analysis);
    if !errors.is_empty() {
        return Err(errors);
    }

    let errors = verify::verify(&module, false);
    if !errors.is_empty() {
        return Err(errors);
    }

    let optimizer = Optimizer::new();
    if let Err(error) = optimizer.optimize(&mut module) {
        return Err(vec![Diagnostic::new(
            Phase::Optimize,
            frontend::position::Position::none(),
            error.to_string(),
        )]);
    }

    let errors = verify::verify(&module, true);
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(Compilation { module, analysis })
}

/// Like [`compile`], but stops before optimization. Used by the driver
/// for `--emit ir` and by tests comparing pre/post-optimization IR.
pub fn compile_unoptimized(source: &SourceFile) -> Result<Compilation, Vec<Diagnostic>> {
    let (file, errors) = Parser::parse_file(source);
    if !errors.is_empty() {
        return Err(errors);
    }

    let (analysis, errors) = analyze::analyze(&file);
    if !errors.is_empty() {
        return Err(errors);
    }

    let (module, errors) = builder::build(&file, &analysis);
    if !errors.is_empty() {
        return Err(errors);
    }

    let errors = verify::verify(&module, false);
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(Compilation { module, analysis })
}
