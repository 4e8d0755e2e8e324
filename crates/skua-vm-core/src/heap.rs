//! Heap cell sum type
//!
//! One [`skua_vm_gc::Heap`] holds every GC-managed cell of a runtime; the
//! [`HeapCell`] enum tags what a handle points at.

use skua_vm_gc::{GcRef, Trace};

use crate::environment::Environment;
use crate::function::CodeBlock;
use crate::object::JsObject;
use crate::string::{JsString, JsSymbol};

/// A GC-managed cell
#[derive(Debug)]
pub enum HeapCell {
    /// Any object
    Object(JsObject),
    /// String contents
    String(JsString),
    /// Symbol identity
    Symbol(JsSymbol),
    /// Heap environment record
    Environment(Environment),
    /// Per-function runtime state (inline caches)
    Code(CodeBlock),
}

impl HeapCell {
    /// Short name for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Environment(_) => "environment",
            Self::Code(_) => "code",
        }
    }
}

impl Trace for HeapCell {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        match self {
            Self::Object(object) => object.trace(tracer),
            Self::String(_) | Self::Symbol(_) => {}
            Self::Code(code) => code.templates.trace(tracer),
            Self::Environment(env) => env.trace(tracer),
        }
    }
}
