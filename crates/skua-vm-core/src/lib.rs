//! # Skua VM Core
//!
//! Execution engine for the Skua ECMAScript VM.
//!
//! ## Design Principles
//!
//! - **Tagged values**: 64-bit [`Value`] with int32, double and heap-reference forms
//! - **Structures**: hash-consed property layouts shared between objects, with
//!   inline caches keyed on structure ids
//! - **Register-based**: frames own a contiguous register file matching the
//!   bytecode operand format
//! - **Single-threaded runtimes**: a [`Runtime`] is `!Send`; compiled scripts are
//!   shared through `Arc`

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod call;
pub mod class;
pub mod config;
pub mod conversion;
pub mod environment;
pub mod error;
pub mod frame;
pub mod function;
pub mod heap;
pub mod host;
pub mod inline_cache;
pub mod interpreter;
pub mod intrinsics;
pub mod iteration;
pub mod number;
pub mod object;
pub mod pauser;
pub mod promise;
pub mod property;
pub mod runtime;
pub mod sandbox;
pub mod string;
pub mod structure;
pub mod template;
pub mod value;

pub use config::{InlineCacheConfig, VmConfig};
pub use error::{StackFrame, ThrownValue, VmError, VmResult};
pub use frame::ResumeMode;
pub use function::NativeFn;
pub use host::{HookResult, HostObjectHooks};
pub use interpreter::Interpreter;
pub use intrinsics::Intrinsics;
pub use object::{JsObject, ObjectKind};
pub use pauser::{AsyncGeneratorState, ExecutionPauser, GeneratorState};
pub use promise::PromiseState;
pub use property::{NativeAccessor, PropertyAttributes, PropertyDescriptor, PropertyKey};
pub use runtime::Runtime;
pub use sandbox::{SandBox, SandBoxResult};
pub use string::{JsString, JsSymbol};
pub use structure::{Structure, StructureId};
pub use value::Value;

pub use skua_vm_compiler::CompileOptions;
pub use skua_vm_gc::{GcConfig, GcRef};
