//! # Skua VM Bytecode
//!
//! This crate defines the bytecode format for the Skua ECMAScript engine.
//!
//! ## Design Principles
//!
//! - **Register-based**: instructions read and write slots of a contiguous register file
//! - **Immutable**: a [`ByteCodeBlock`] never changes after generation; inline cache
//!   state lives out of line, addressed by [`IcIndex`]
//! - **Serializable**: a [`Script`] can be cached to disk for fast startup

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod block;
pub mod constant;
pub mod error;
pub mod instruction;
pub mod operand;
pub mod script;

pub use block::{
    BindingKind, BindingStorage, ByteCodeBlock, EnvironmentLayout, EnvironmentSlot,
    FunctionFlags, GlobalDeclarations, IdentifierInfo, JumpFlowRecord, SourceMap,
    SourceMapEntry, TemplateSite,
};
pub use constant::{Constant, ConstantPool, NumeralPool};
pub use error::BytecodeError;
pub use instruction::{ErrorKind, Instruction, MethodKind, Opcode};
pub use operand::{ConstantIndex, FunctionIndex, IcIndex, JumpOffset, Register};
pub use script::Script;

/// Bytecode format version
pub const BYTECODE_VERSION: u32 = 1;

/// Magic bytes for bytecode files
pub const BYTECODE_MAGIC: [u8; 8] = *b"SKBC\0\0\0\0";

/// Upper bound for operand (temporary) registers of one block.
///
/// The generator rejects functions that need more with a compile error.
pub const REGULAR_REGISTER_LIMIT: u16 = 0x4000;

/// Upper bound for stack allocated variables (including the `this` slot).
pub const VARIABLE_LIMIT: u16 = 0x4000;

/// Upper bound for pooled numeral literals of one block.
pub const NUMERAL_LITERAL_LIMIT: u16 = 0x4000;
