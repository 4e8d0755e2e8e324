//! # Skua VM Compiler
//!
//! Compiles ECMAScript source code to Skua bytecode using the oxc parser.
//!
//! ## Pipeline
//!
//! 1. Parse source with oxc
//! 2. Analyze scopes: decide which bindings live in registers and which in heap environments
//! 3. Walk the AST and generate one [`skua_vm_bytecode::ByteCodeBlock`] per function
//! 4. Relocate registers into the final register file layout

#![warn(clippy::all)]
#![warn(missing_docs)]

mod analysis;
pub mod codegen;
pub mod compiler;
pub mod error;
mod generator;

pub use compiler::{CompileOptions, Compiler};
pub use error::{CompileError, CompileResult};
