//! Function objects and per-function runtime state

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use skua_vm_bytecode::{ByteCodeBlock, EnvironmentLayout, Script};
use skua_vm_gc::{GcRef, Trace};

use crate::error::VmResult;
use crate::inline_cache::InlineCache;
use crate::runtime::Runtime;
use crate::value::Value;

/// Native function handler: `(rt, this, args, new_target)`
///
/// `new_target` is set when the function is invoked with `new`. Handlers may
/// reenter the interpreter through [`Runtime::call`].
pub type NativeFn = fn(&mut Runtime, Value, &[Value], Option<GcRef>) -> VmResult<Value>;

/// Function payload of a function object
#[derive(Debug)]
pub struct FunctionData {
    /// Name used in stack traces
    pub name: Rc<str>,
    /// Callable with `new`
    pub is_constructor: bool,
    /// Callable flavor
    pub kind: FunctionKind,
}

/// Callable flavors
#[derive(Debug)]
pub enum FunctionKind {
    /// Closure over bytecode
    Script {
        /// [`CodeBlock`] cell
        code: GcRef,
        /// Captured environment
        env: Option<GcRef>,
        /// Lexical `this` of an arrow function
        this_value: Option<Value>,
        /// Lexical `new.target` of an arrow function
        new_target: Option<GcRef>,
        /// Object whose prototype `super` lookups start from
        home_object: Option<GcRef>,
        /// Instance field initializer of a class constructor
        fields: Option<ClassFields>,
    },
    /// Host function
    Native {
        /// Handler
        func: NativeFn,
    },
    /// `Function.prototype.bind` result
    Bound {
        /// Target function
        target: GcRef,
        /// Bound `this`
        this: Value,
        /// Bound leading arguments
        args: Vec<Value>,
    },
    /// Resolve/reject function handed to a promise executor
    PromiseResolver {
        /// Promise to settle
        promise: GcRef,
        /// Rejects instead of resolving
        reject: bool,
        /// Shared between the resolve/reject pair
        already_resolved: Rc<Cell<bool>>,
    },
}

/// Field definitions run against every new instance of a class
#[derive(Debug, Clone)]
pub struct ClassFields {
    /// Synthetic method that defines the fields on its receiver
    pub initializer: GcRef,
    /// Computed field keys, passed to the initializer as arguments
    pub keys: Vec<Value>,
}

impl Trace for FunctionData {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        match &self.kind {
            FunctionKind::Script {
                code,
                env,
                this_value,
                new_target,
                home_object,
                fields,
            } => {
                tracer(*code);
                env.trace(tracer);
                this_value.trace(tracer);
                new_target.trace(tracer);
                home_object.trace(tracer);
                if let Some(fields) = fields {
                    tracer(fields.initializer);
                    fields.keys.trace(tracer);
                }
            }
            FunctionKind::Native { .. } => {}
            FunctionKind::Bound { target, this, args } => {
                tracer(*target);
                this.trace(tracer);
                args.trace(tracer);
            }
            FunctionKind::PromiseResolver { promise, .. } => tracer(*promise),
        }
    }
}

/// Runtime state of one compiled function
///
/// The [`ByteCodeBlock`] itself is immutable and shared through the script;
/// inline cache records and materialized environment layouts live here.
pub struct CodeBlock {
    /// Owning script
    pub script: Arc<Script>,
    /// Registry index of the script
    pub script_id: usize,
    /// Function index within the script
    pub index: u32,
    /// Inline cache records, one per site
    pub caches: Vec<InlineCache>,
    /// Shared copies of the block's environment layouts
    pub layouts: Vec<Rc<EnvironmentLayout>>,
    /// Template objects, one per tagged template site once evaluated
    pub templates: Vec<Option<GcRef>>,
}

impl CodeBlock {
    /// Build runtime state for `script.functions[index]`
    pub fn new(script: Arc<Script>, script_id: usize, index: u32) -> Self {
        let block = &script.functions[index as usize];
        let caches = (0..block.inline_cache_count).map(|_| InlineCache::new()).collect();
        let layouts = block.environment_layouts.iter().cloned().map(Rc::new).collect();
        let templates = vec![None; block.templates.len()];
        Self {
            script,
            script_id,
            index,
            caches,
            layouts,
            templates,
        }
    }

    /// The bytecode
    #[inline]
    pub fn block(&self) -> &ByteCodeBlock {
        &self.script.functions[self.index as usize]
    }
}

impl std::fmt::Debug for CodeBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeBlock")
            .field("name", &self.block().display_name())
            .field("script_id", &self.script_id)
            .field("caches", &self.caches.len())
            .finish()
    }
}
