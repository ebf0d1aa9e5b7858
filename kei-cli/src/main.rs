use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kei_diagnostics::{DiagnosticEngine, SourceFile};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "kei")]
#[command(version = "0.3.0")]
#[command(about = "Kei Programming Language Compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and type-check a Kei source file
    Check {
        /// Input .kei file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the front-end up to KIR lowering and print the KIR
    Emit {
        /// Input .kei file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Disable debug runtime checks (bounds, overflow, null)
        #[arg(long)]
        release: bool,

        /// Dump the token stream instead of KIR
        #[arg(long)]
        tokens: bool,

        /// Dump the AST as JSON instead of KIR
        #[arg(long)]
        ast: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("error: {:#}", error);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Check { input, json } => {
            let file = load(&input)?;
            let mut diags = DiagnosticEngine::new();
            let program = kei_parser::parse(&file, &mut diags);
            let _ = kei_checker::check_program(&program, &file, &mut diags);

            if json {
                println!("{}", diags.to_json());
            } else {
                diags.print_all(&file);
                diags.print_summary();
            }
            Ok(!diags.has_errors())
        }
        Commands::Emit {
            input,
            release,
            tokens,
            ast,
        } => {
            let file = load(&input)?;
            let mut diags = DiagnosticEngine::new();

            if tokens {
                for token in kei_lexer::tokenize(&file, &mut diags) {
                    println!(
                        "{:>4}:{:<3} {:?} {:?}",
                        token.line, token.column, token.kind, token.lexeme
                    );
                }
                diags.print_all(&file);
                return Ok(!diags.has_errors());
            }

            let program = kei_parser::parse(&file, &mut diags);
            if ast {
                println!("{}", serde_json::to_string_pretty(&program)?);
                diags.print_all(&file);
                return Ok(!diags.has_errors());
            }

            let analysis = kei_checker::check_program(&program, &file, &mut diags);
            diags.print_all(&file);
            diags.print_summary();
            // the KIR of a failed compile is discarded
            if diags.has_errors() {
                return Ok(false);
            }

            let module_name = input
                .file_stem()
                .and_then(|n| n.to_str())
                .unwrap_or("program");
            log::info!("lowering module {}", module_name);
            let options = kei_kir::LowerOptions {
                debug_checks: !release,
            };
            let module = kei_kir::lower_module(module_name, &analysis, &options);
            println!("{}", module);
            Ok(true)
        }
    }
}

fn load(path: &PathBuf) -> Result<SourceFile> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(SourceFile::new(path.display().to_string(), source))
}
