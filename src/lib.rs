//! Crate root: wires together the compilation pipeline.
//!
//! Each stage runs to completion before the next one starts:
//! - `tokenizer` performs lexical analysis and produces a flat token vector.
//! - `parser` owns all syntactic knowledge and builds the `ast`.
//! - `binder` resolves operators by arity and attaches names to declarations.
//! - `verifier` type-checks the tree and records every expression's type.
//! - `codegen` lowers the verified tree into NASM x86-64 assembly.
//! - `error` centralises reporting utilities shared by the other modules.

pub mod ast;
pub mod binder;
pub mod codegen;
pub mod error;
pub mod operator;
pub mod parser;
pub mod tokenizer;
pub mod ty;
pub mod verifier;

pub use error::{CompileError, CompileResult, ErrorKind, Warning};

/// Output of a successful compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compilation {
  pub assembly: String,
  pub warnings: Vec<Warning>,
}

/// Compile a source program into assembly, keeping any warnings raised.
pub fn compile(source: &str) -> CompileResult<Compilation> {
  let tokens = tokenizer::tokenize(source)?;
  let mut program = parser::parse(tokens, source)?;
  binder::bind(source, &mut program)?;
  let warnings = verifier::verify(source, &mut program)?;
  let assembly = codegen::generate(&program)?;
  log::debug!(
    "generated {} bytes of assembly with {} warning(s)",
    assembly.len(),
    warnings.len()
  );
  Ok(Compilation { assembly, warnings })
}

/// Compile a source program into assembly.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  compile(source).map(|compilation| compilation.assembly)
}
