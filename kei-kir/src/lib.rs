//! KIR — the Kei intermediate representation — and the lowering pass
//! that translates the typed AST into it.
//!
//! KIR is a basic-block SSA form with explicit lifecycle operations
//! (`destroy`, `oncopy`, `move`), runtime check operations, and a
//! throws-protocol calling convention. The external C emitter consumes
//! [`ir::KirModule`] values produced by [`lower::lower_module`].

pub mod ir;
pub mod lower;

pub use ir::{validate_function, KirBlock, KirFunction, KirModule, Terminator};
pub use lower::{lower_module, LowerOptions};
