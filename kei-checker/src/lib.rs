//! Semantic analyzer for the Kei language.
//!
//! Resolves names and types, enforces the two-tier struct rules and
//! lifecycle-hook requirements, monomorphizes generic structs and
//! functions, and enforces the throws/catch contract and use-after-move
//! analysis. The output [`Analysis`] carries the typed side-tables and
//! monomorphization caches the KIR lowerer consumes.

pub mod scope;
pub mod types;

mod check;

pub use check::{
    check_program, Analysis, Builtin, Checker, EnumInfo, LoweredFn, MonoFn, MonoStruct,
    StructInfo, VariantInfo,
};
