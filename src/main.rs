use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;
use colored::Colorize;

use mica::diagnostics::Diagnostic;
use mica::frontend::parser::Parser;
use mica::frontend::{SourceFile, SourceFileOrigin};

#[derive(Debug, ClapParser)]
#[command(name = "micac", version, about = "Mica compiler front-end and mid-end")]
struct Args {
    /// Source file to compile
    source_file: PathBuf,

    /// Stop after the given stage and print its result
    #[arg(short = 'e', long = "emit", value_enum)]
    emit: Option<EmitFormat>,

    /// Print per-stage progress
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitFormat {
    #[value(name = "ast")]
    Ast,
    #[value(name = "ir")]
    Ir,
    #[value(name = "opt-ir")]
    OptIr,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let contents = match std::fs::read_to_string(&args.source_file) {
        Ok(contents) => contents,
        Err(error) => {
            eprintln!(
                "{} failed to read {}: {error}",
                "error:".red(),
                args.source_file.display()
            );
            return ExitCode::FAILURE;
        }
    };

    let source = SourceFile::new(contents, SourceFileOrigin::File(args.source_file));

    if args.emit == Some(EmitFormat::Ast) {
        let (ast, errors) = Parser::parse_file(&source);
        if !errors.is_empty() {
            return report(&errors);
        }
        println!("{ast:#?}");
        return ExitCode::SUCCESS;
    }

    if args.verbose {
        eprintln!("compiling {}", source.origin);
    }

    let result = if args.emit == Some(EmitFormat::Ir) {
        mica::compile_unoptimized(&source)
    } else {
        mica::compile(&source)
    };

    match result {
        Ok(compilation) => {
            if args.verbose {
                let analysis = &compilation.analysis;
                let unused: Vec<_> = analysis
                    .table
                    .unused_local_symbols(analysis.global_scope)
                    .into_iter()
                    .map(|id| analysis.table.symbol(id).name.clone())
                    .collect();
                if !unused.is_empty() {
                    eprintln!("unused top-level names: {}", unused.join(", "));
                }
            }

            print!("{}", compilation.module);
            ExitCode::SUCCESS
        }
        Err(errors) => report(&errors),
    }
}

fn report(errors: &[Diagnostic]) -> ExitCode {
    for error in errors {
        eprintln!("{}", error.to_string().red());
    }
    ExitCode::FAILURE
}
