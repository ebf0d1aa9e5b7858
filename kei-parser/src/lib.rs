//! Recursive-descent + Pratt parser for the Kei language.
//!
//! Produces a [`kei_ast::Program`] with source spans on every node.
//! Errors never abort the parse: each one is recorded on the shared
//! diagnostic channel and the parser resynchronizes at the next statement
//! or declaration boundary.

use thiserror::Error;

mod parser;
pub use parser::Parser;

/// Internal recovery signal. By the time a `ParseError` reaches a
/// synchronization point the diagnostic has already been emitted.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Syntax error at {location}: {message}")]
    Syntax { location: String, message: String },
}

/// Convenience entry point: lex and parse one file.
pub fn parse(
    file: &kei_diagnostics::SourceFile,
    diags: &mut kei_diagnostics::DiagnosticEngine,
) -> kei_ast::Program {
    Parser::new(file, diags).parse_program()
}
