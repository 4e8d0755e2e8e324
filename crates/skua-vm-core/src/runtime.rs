//! VM runtime - the main entry point
//!
//! A [`Runtime`] owns one heap, one global object with its intrinsics, the
//! registry of loaded scripts and the microtask queue. It is single threaded;
//! compiled [`Script`]s are shared between runtimes through `Arc`.

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use skua_vm_bytecode::Script;
use skua_vm_compiler::{CompileOptions, Compiler};
use skua_vm_gc::{GcError, GcRef, Heap, Trace};

use crate::config::VmConfig;
use crate::environment::GlobalLexical;
use crate::error::{StackFrame, VmError, VmResult};
use crate::frame::{ExecutionState, stack_frame};
use crate::function::{CodeBlock, FunctionData, FunctionKind, NativeFn};
use crate::heap::HeapCell;
use crate::host::HostObjectHooks;
use crate::interpreter::{Completion, Interpreter};
use crate::intrinsics::{self, Intrinsics};
use crate::object::ObjectKind;
use crate::promise::Job;
use crate::property::{PropertyAttributes, PropertyKey, PropertySlot};
use crate::string::{JsString, JsSymbol};
use crate::structure::Structure;
use crate::value::Value;

/// A script registered with the runtime
///
/// Code cells stay alive as long as the runtime; function objects refer to
/// them by handle.
#[derive(Debug)]
pub struct LoadedScript {
    /// Compiled script
    pub script: Arc<Script>,
    /// One [`CodeBlock`] cell per function of the script
    pub code: Vec<GcRef>,
}

/// The VM runtime
pub struct Runtime {
    pub(crate) heap: Heap<HeapCell>,
    pub(crate) config: VmConfig,
    compile_options: CompileOptions,
    pub(crate) root_structure: Rc<Structure>,
    pub(crate) intrinsics: Intrinsics,
    pub(crate) global: GcRef,
    pub(crate) global_lexicals: FxHashMap<Rc<str>, GlobalLexical>,
    /// Bumped whenever a global lexical is declared; invalidates global caches
    pub(crate) lexical_epoch: u64,
    scripts: Vec<LoadedScript>,
    pub(crate) state: ExecutionState,
    pub(crate) reentry_depth: usize,
    pub(crate) jobs: VecDeque<Job>,
    atoms: FxHashMap<Rc<str>, GcRef>,
    output: Box<dyn FnMut(&str)>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Create a runtime with default configuration
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// Create a runtime with custom configuration
    pub fn with_config(config: VmConfig) -> Self {
        Self::with_options(config, CompileOptions::default())
    }

    /// Create a runtime with custom configuration and compiler options
    pub fn with_options(config: VmConfig, compile_options: CompileOptions) -> Self {
        let mut heap = Heap::with_config(config.gc.clone());
        let root_structure = Structure::root();
        let intrinsics = Intrinsics::allocate(&mut heap, &root_structure);
        let global = intrinsics.global;
        let mut rt = Self {
            heap,
            config,
            compile_options,
            root_structure,
            intrinsics,
            global,
            global_lexicals: FxHashMap::default(),
            lexical_epoch: 0,
            scripts: Vec::new(),
            state: ExecutionState::new(),
            reentry_depth: 0,
            jobs: VecDeque::new(),
            atoms: FxHashMap::default(),
            output: Box::new(|text| println!("{text}")),
        };
        intrinsics::initialize(&mut rt);
        tracing::debug!(target: "skua::runtime", cells = rt.heap.len(), "runtime initialized");
        rt
    }

    /// Runtime configuration
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Compiler options used by [`Runtime::compile`] and `eval`
    pub fn compile_options(&self) -> &CompileOptions {
        &self.compile_options
    }

    /// Replace the compiler options
    pub fn set_compile_options(&mut self, options: CompileOptions) {
        self.compile_options = options;
    }

    /// The GC heap
    pub fn heap(&self) -> &Heap<HeapCell> {
        &self.heap
    }

    /// Intrinsic objects
    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    /// The global object
    #[inline]
    pub fn global_object(&self) -> GcRef {
        self.global
    }

    /// Redirect `print` output
    pub fn set_output(&mut self, output: impl FnMut(&str) + 'static) {
        self.output = Box::new(output);
    }

    pub(crate) fn print(&mut self, text: &str) {
        (self.output)(text);
    }

    // ==================== Strings & symbols ====================

    /// Borrow a string cell
    pub fn js_string(&self, handle: GcRef) -> &JsString {
        match self.heap.get(handle) {
            HeapCell::String(s) => s,
            other => panic!("expected string, found {}", other.kind_name()),
        }
    }

    /// Borrow a symbol cell
    pub fn js_symbol(&self, handle: GcRef) -> &JsSymbol {
        match self.heap.get(handle) {
            HeapCell::Symbol(s) => s,
            other => panic!("expected symbol, found {}", other.kind_name()),
        }
    }

    /// Allocate a fresh string value
    pub fn alloc_string(&mut self, text: &str) -> Value {
        Value::string(self.heap.alloc(HeapCell::String(JsString::new(text))))
    }

    /// Shared string value for `text`, allocated once per runtime
    pub fn intern(&mut self, text: &str) -> Value {
        if let Some(handle) = self.atoms.get(text) {
            return Value::string(*handle);
        }
        let text: Rc<str> = text.into();
        let handle = self.heap.alloc(HeapCell::String(JsString::new(Rc::clone(&text))));
        self.atoms.insert(text, handle);
        Value::string(handle)
    }

    /// Allocate a new symbol
    pub fn new_symbol(&mut self, description: Option<&str>) -> Value {
        let symbol = JsSymbol {
            description: description.map(Rc::from),
        };
        Value::symbol(self.heap.alloc(HeapCell::Symbol(symbol)))
    }

    /// Text of a string value
    pub fn string_text(&self, value: Value) -> Option<Rc<str>> {
        value.as_string().map(|s| self.js_string(s).text())
    }

    // ==================== Functions ====================

    /// Is a function object
    pub fn is_callable(&self, value: Value) -> bool {
        value.as_object().is_some_and(|o| self.object(o).is_callable())
    }

    /// Function object accepting `new`
    pub fn is_constructor(&self, value: Value) -> bool {
        value.as_object().is_some_and(|o| match self.object(o).kind() {
            ObjectKind::Function(data) => data.is_constructor,
            _ => false,
        })
    }

    pub(crate) fn function_data(&self, handle: GcRef) -> Option<&FunctionData> {
        match self.object(handle).kind() {
            ObjectKind::Function(data) => Some(data),
            _ => None,
        }
    }

    /// Target of a bound function
    pub fn bound_target(&self, handle: GcRef) -> Option<GcRef> {
        match self.function_data(handle)?.kind {
            FunctionKind::Bound { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Create a host function object
    pub fn new_native_function(&mut self, name: &str, length: u32, func: NativeFn) -> GcRef {
        self.new_native_function_with(name, length, func, false)
    }

    /// Create a host function object that also accepts `new`
    pub fn new_native_constructor(&mut self, name: &str, length: u32, func: NativeFn) -> GcRef {
        self.new_native_function_with(name, length, func, true)
    }

    fn new_native_function_with(&mut self, name: &str, length: u32, func: NativeFn, is_constructor: bool) -> GcRef {
        let data = FunctionData {
            name: name.into(),
            is_constructor,
            kind: FunctionKind::Native { func },
        };
        let proto = self.intrinsics.function_prototype;
        let function = self.new_object_with(Some(proto), ObjectKind::Function(Box::new(data)));
        self.define_function_name_and_length(function, name, length);
        function
    }

    pub(crate) fn define_function_name_and_length(&mut self, function: GcRef, name: &str, length: u32) {
        let configurable_only = PropertyAttributes::data(false, false, true);
        self.define_data(function, "length", Value::number(length as f64), configurable_only);
        let name = self.intern(name);
        self.define_data(function, "name", name, configurable_only);
    }

    /// Install a host method on `object` (writable, configurable, non-enumerable)
    pub fn define_native_function(&mut self, object: GcRef, name: &str, length: u32, func: NativeFn) -> GcRef {
        let function = self.new_native_function(name, length, func);
        self.define_data(object, name, Value::object(function), PropertyAttributes::HIDDEN);
        function
    }

    /// Create an object whose property access runs `hooks` first
    pub fn new_host_object(&mut self, hooks: Rc<dyn HostObjectHooks>) -> GcRef {
        let proto = self.intrinsics.object_prototype;
        self.new_object_with(Some(proto), ObjectKind::Host(hooks))
    }

    /// Define (or overwrite) a global object property
    pub fn define_global(&mut self, name: &str, value: Value) {
        let global = self.global;
        let key = PropertyKey::from_name(name);
        let obj = self.object_mut(global);
        match obj.structure.find(&key) {
            Some((index, _)) => obj.slots[index as usize] = PropertySlot::Data(value),
            None => self.define_data(global, key, value, PropertyAttributes::HIDDEN),
        }
    }

    // ==================== Scripts ====================

    /// Compile a script with the runtime's compiler options
    pub fn compile(&self, source: &str, source_name: &str) -> VmResult<Arc<Script>> {
        let options = CompileOptions {
            source_name: source_name.to_string(),
            ..self.compile_options.clone()
        };
        Ok(Arc::new(Compiler::new(options).compile_script(source)?))
    }

    /// Compile the argument of a direct (`direct`) or indirect `eval`
    pub(crate) fn compile_eval(&self, source: &str, direct: bool, strict: bool) -> VmResult<Arc<Script>> {
        let options = CompileOptions {
            source_name: "eval".to_string(),
            ..self.compile_options.clone()
        };
        let script = Compiler::new(options).compile_eval(source, direct, strict)?;
        tracing::trace!(target: "skua::runtime", direct, strict, "eval compiled");
        Ok(Arc::new(script))
    }

    /// Register a script and allocate its code cells; returns the registry id
    pub fn load_script(&mut self, script: Arc<Script>) -> usize {
        let id = self.scripts.len();
        let code = (0..script.functions.len() as u32)
            .map(|index| self.heap.alloc(HeapCell::Code(CodeBlock::new(Arc::clone(&script), id, index))))
            .collect();
        tracing::debug!(
            target: "skua::runtime",
            source = %script.source_name,
            id,
            functions = script.functions.len(),
            "script loaded"
        );
        self.scripts.push(LoadedScript { script, code });
        id
    }

    /// Code cell of a function of a loaded script
    pub(crate) fn code_for(&self, script_id: usize, index: u32) -> GcRef {
        self.scripts[script_id].code[index as usize]
    }

    /// Loaded scripts in registry order
    pub fn scripts(&self) -> &[LoadedScript] {
        &self.scripts
    }

    /// Borrow a code cell
    pub fn code_block(&self, handle: GcRef) -> &CodeBlock {
        match self.heap.get(handle) {
            HeapCell::Code(code) => code,
            other => panic!("expected code block, found {}", other.kind_name()),
        }
    }

    /// Mutably borrow a code cell
    pub fn code_block_mut(&mut self, handle: GcRef) -> &mut CodeBlock {
        match self.heap.get_mut(handle) {
            HeapCell::Code(code) => code,
            other => panic!("expected code block, found {}", other.kind_name()),
        }
    }

    /// Run a compiled script in the global scope and return its completion value
    pub fn execute(&mut self, script: Arc<Script>) -> VmResult<Value> {
        let entry = script.entry;
        let id = self.load_script(script);
        let code = self.code_for(id, entry);
        let this = Value::object(self.global);
        let frame = self.new_frame(code, None, None, this, Vec::new(), None);
        self.run_frame(Box::new(frame))
    }

    /// Compile and run `source`
    pub fn evaluate(&mut self, source: &str, source_name: &str) -> VmResult<Value> {
        let script = self.compile(source, source_name)?;
        self.execute(script)
    }

    /// Run a frame to completion
    pub(crate) fn run_frame(&mut self, frame: Box<crate::frame::Frame>) -> VmResult<Value> {
        match Interpreter::interpret(self, frame)? {
            Completion::Return(value) => Ok(value),
            Completion::Suspend { .. } => Err(VmError::internal("unexpected suspension of a plain frame")),
        }
    }

    // ==================== Errors ====================

    /// Stack trace of the active calls, innermost first
    pub fn capture_stack(&self) -> Vec<StackFrame> {
        self.capture_stack_from(0)
    }

    /// Stack trace skipping the innermost native entries (error constructors)
    pub(crate) fn capture_stack_below_natives(&self) -> Vec<StackFrame> {
        let skip = self.state.iter().take_while(|e| e.is_native).count();
        self.capture_stack_from(skip)
    }

    fn capture_stack_from(&self, skip: usize) -> Vec<StackFrame> {
        self.state
            .iter()
            .skip(skip)
            .take(self.config.stack_trace_limit)
            .map(|entry| match entry.code {
                Some(code) => {
                    let block = self.code_block(code);
                    stack_frame(entry, Some((&block.script, block.index)))
                }
                None => stack_frame(entry, None),
            })
            .collect()
    }

    /// Create an Error object of the class named by `name`
    pub fn new_error(&mut self, name: &str, message: &str) -> GcRef {
        let proto = self.intrinsics.error_prototype_for(name);
        let error = self.new_object_with(Some(proto), ObjectKind::Error);
        if !message.is_empty() {
            let message = self.alloc_string(message);
            self.define_data(error, "message", message, PropertyAttributes::HIDDEN);
        }
        let stack = self.capture_stack_below_natives();
        self.install_stack(error, name, message, &stack);
        error
    }

    pub(crate) fn install_stack(&mut self, error: GcRef, name: &str, message: &str, stack: &[StackFrame]) {
        let mut text = if message.is_empty() {
            name.to_string()
        } else {
            format!("{name}: {message}")
        };
        for frame in stack {
            text.push_str("\n    ");
            text.push_str(&frame.to_string());
        }
        let text = self.alloc_string(&text);
        self.define_data(error, "stack", text, PropertyAttributes::HIDDEN);
    }

    /// Turn a catchable engine error into the script value a `catch` observes
    pub fn materialize_error(&mut self, error: &VmError) -> Value {
        match error {
            VmError::Exception(thrown) => thrown.value,
            other => match other.error_name() {
                Some(name) => Value::object(self.new_error(name, &other.message())),
                None => self.alloc_string(&other.message()),
            },
        }
    }

    /// Wrap a thrown value into [`VmError::Exception`] with the current stack
    pub fn throw_value(&mut self, value: Value) -> VmError {
        let message = self.describe_thrown(value);
        let stack = self.capture_stack();
        VmError::exception(value, message, stack)
    }

    /// Render a thrown value for diagnostics without running script code
    pub fn describe_thrown(&mut self, value: Value) -> String {
        let Some(object) = value.as_object() else {
            return self.display_value(value);
        };
        if !matches!(self.object(object).kind(), ObjectKind::Error) {
            return self.display_value(value);
        }
        let name = self
            .peek_data(object, &PropertyKey::from_name("name"))
            .and_then(|v| self.string_text(v))
            .unwrap_or_else(|| "Error".into());
        let message = self
            .peek_data(object, &PropertyKey::from_name("message"))
            .and_then(|v| self.string_text(v))
            .unwrap_or_else(|| "".into());
        if message.is_empty() {
            name.to_string()
        } else {
            format!("{name}: {message}")
        }
    }

    /// Data property along the prototype chain; accessors and hooks are skipped
    pub(crate) fn peek_data(&mut self, object: GcRef, key: &PropertyKey) -> Option<Value> {
        let mut current = Some(object);
        while let Some(handle) = current {
            if let Some(own) = self.lookup_own(handle, key) {
                return match own.slot {
                    PropertySlot::Data(value) => Some(value),
                    _ => None,
                };
            }
            current = self.object(handle).prototype;
        }
        None
    }

    // ==================== GC ====================

    /// Keep `handle` alive across collections until [`Runtime::unroot`]
    pub fn root(&mut self, handle: GcRef) {
        self.heap.root(handle);
    }

    /// Release a persistent root
    pub fn unroot(&mut self, handle: GcRef) -> Result<(), GcError> {
        self.heap.unroot(handle)
    }

    /// Report `token` from [`Runtime::drain_finalized`] once `target` is collected
    pub fn register_finalizer(&mut self, target: GcRef, token: u64) -> Result<(), GcError> {
        self.heap.register_finalizer(target, token)
    }

    /// Tokens of finalized targets
    pub fn drain_finalized(&mut self) -> Vec<u64> {
        self.heap.drain_finalized()
    }

    /// Run a full collection; returns reclaimed cells
    ///
    /// Only runs at a safe point: when a frame is active this is a no-op
    /// returning 0.
    pub fn collect_garbage(&mut self) -> usize {
        self.collect_with(std::iter::empty())
    }

    /// Collect if the allocation threshold was crossed, keeping `extra` alive
    pub fn maybe_collect(&mut self, extra: &[Value]) -> usize {
        if !self.heap.should_collect() {
            return 0;
        }
        let extra: Vec<GcRef> = extra.iter().filter_map(|v| v.heap_ref()).collect();
        self.collect_with(extra)
    }

    fn collect_with(&mut self, extra: impl IntoIterator<Item = GcRef>) -> usize {
        if !self.state.is_empty() || self.reentry_depth > 0 {
            return 0;
        }
        let mut roots: Vec<GcRef> = extra.into_iter().collect();
        roots.push(self.global);
        self.intrinsics.trace(&mut |r| roots.push(r));
        roots.extend(self.atoms.values().copied());
        for lexical in self.global_lexicals.values() {
            lexical.value.trace(&mut |r| roots.push(r));
        }
        for loaded in &self.scripts {
            roots.extend(loaded.code.iter().copied());
        }
        for job in &self.jobs {
            job.trace(&mut |r| roots.push(r));
        }
        let reclaimed = self.heap.collect(roots);
        tracing::info!(
            target: "skua::gc",
            reclaimed,
            live = self.heap.len(),
            "collection finished"
        );
        reclaimed
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("cells", &self.heap.len())
            .field("scripts", &self.scripts.len())
            .field("jobs", &self.jobs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_completion() {
        let mut rt = Runtime::new();
        let value = rt.evaluate("1 + 1", "test.js").unwrap();
        assert_eq!(value.as_number(), 2.0);
    }

    #[test]
    fn test_intern_is_shared() {
        let mut rt = Runtime::new();
        let a = rt.intern("length");
        let b = rt.intern("length");
        assert_eq!(a, b);
        let c = rt.alloc_string("length");
        assert_ne!(a, c);
    }

    #[test]
    fn test_compile_error_is_syntax_error() {
        let mut rt = Runtime::new();
        let err = rt.evaluate(".", "bad.js").unwrap_err();
        assert!(matches!(err, VmError::SyntaxError(_)));
    }

    #[test]
    fn test_collect_keeps_globals() {
        let mut rt = Runtime::new();
        rt.evaluate("var kept = { a: [1, 2, 3] };", "gc.js").unwrap();
        let before = rt.heap().len();
        rt.evaluate("(function () { var tmp = []; for (var i = 0; i < 50; i++) tmp.push({}); })()", "gc.js")
            .unwrap();
        assert!(rt.heap().len() > before);
        let reclaimed = rt.collect_garbage();
        assert!(reclaimed >= 50);
        let kept = rt.evaluate("kept.a.length", "gc.js").unwrap();
        assert_eq!(kept.as_number(), 3.0);
    }

    #[test]
    fn test_error_object_has_stack() {
        let mut rt = Runtime::new();
        let error = rt.new_error("TypeError", "boom");
        assert_eq!(rt.describe_thrown(Value::object(error)), "TypeError: boom");
        let stack = rt.peek_data(error, &PropertyKey::from_name("stack")).unwrap();
        assert_eq!(rt.string_text(stack).as_deref(), Some("TypeError: boom"));
    }
}
