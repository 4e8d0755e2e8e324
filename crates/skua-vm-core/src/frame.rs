//! Interpreter frames and the execution-state chain
//!
//! A [`Frame`] owns everything a running function needs: its register file,
//! arguments, environment pointer, try handlers and pending completion records.
//! Because nothing lives on the host stack, a suspended generator can move the
//! whole frame into its heap object and restore it later.

use std::rc::Rc;
use std::sync::Arc;

use skua_vm_bytecode::{ByteCodeBlock, Register, Script};
use skua_vm_gc::{GcRef, Trace};

use crate::error::StackFrame;
use crate::value::Value;

/// How a suspended frame is resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// `next(value)`: the suspension point evaluates to `value`
    Next,
    /// `throw(value)`: the suspension point throws `value`
    Throw,
    /// `return(value)`: the frame returns through its `finally` blocks
    Return,
}

/// What an installed try handler does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// `catch`, storing the exception into a register
    Catch(Register),
    /// `finally`
    Finally,
}

/// An active try handler
#[derive(Debug, Clone, Copy)]
pub struct Handler {
    /// Catch or finally
    pub kind: HandlerKind,
    /// Instruction index of the handler code
    pub target: usize,
    /// Environment when the try block was entered
    pub env: Option<GcRef>,
    /// Environment depth when the try block was entered
    pub env_depth: u16,
    /// Pending completions when the try block was entered
    pub completion_depth: usize,
}

/// The completion a `finally` body resumes with at `EndFinally`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlFlowRecord {
    /// Fall through
    Normal,
    /// Continue returning
    Return(Value),
    /// Rethrow
    Throw(Value),
    /// Continue a `break`/`continue` through the jump flow record
    Jump {
        /// Jump flow record index
        record: u32,
    },
}

/// A function activation
#[derive(Debug)]
pub struct Frame {
    /// [`crate::function::CodeBlock`] cell
    pub code: GcRef,
    /// Owning script
    pub script: Arc<Script>,
    /// Function index within the script
    pub function_index: u32,
    /// Running function object (`None` for script and eval code)
    pub callee: Option<GcRef>,
    /// Register file, `required_total_register_number` slots
    pub registers: Vec<Value>,
    /// Actual arguments
    pub arguments: Vec<Value>,
    /// Current instruction index
    pub pc: usize,
    /// Innermost environment
    pub env: Option<GcRef>,
    /// Environments pushed since entry
    pub env_depth: u16,
    /// Try handlers, innermost last
    pub handlers: Vec<Handler>,
    /// Completion records of the `finally` bodies being executed
    pub completions: Vec<ControlFlowRecord>,
    /// Caller register receiving the result of an inline call
    pub return_register: Option<Register>,
    /// Entered through `new`; non-object results are replaced by `this`
    pub is_constructor: bool,
    /// Runs eval code
    pub is_eval: bool,
    /// `new.target`
    pub new_target: Option<GcRef>,
    /// Pending resumption injected by the pauser
    pub resume: Option<(ResumeMode, Value)>,
}

impl Frame {
    /// The bytecode this frame runs
    #[inline]
    pub fn block(&self) -> &ByteCodeBlock {
        &self.script.functions[self.function_index as usize]
    }

    /// Read a register
    #[inline]
    pub fn get(&self, reg: Register) -> Value {
        debug_assert!((reg.index() as usize) < self.registers.len(), "register {reg} out of range");
        self.registers[reg.index() as usize]
    }

    /// Write a register
    #[inline]
    pub fn set(&mut self, reg: Register, value: Value) {
        debug_assert!((reg.index() as usize) < self.registers.len(), "register {reg} out of range");
        self.registers[reg.index() as usize] = value;
    }

    /// `count` consecutive registers starting at `start`
    pub fn window(&self, start: Register, count: u16) -> Vec<Value> {
        let start = start.index() as usize;
        self.registers[start..start + count as usize].to_vec()
    }

    /// The `this` value
    #[inline]
    pub fn this_value(&self) -> Value {
        self.registers[self.block().this_register() as usize]
    }

    /// Bind `this`; derived constructors start without one
    #[inline]
    pub fn set_this(&mut self, value: Value) {
        let register = self.block().this_register() as usize;
        self.registers[register] = value;
    }
}

impl Trace for Frame {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        tracer(self.code);
        self.callee.trace(tracer);
        self.registers.trace(tracer);
        self.arguments.trace(tracer);
        self.env.trace(tracer);
        for handler in &self.handlers {
            handler.env.trace(tracer);
        }
        for record in &self.completions {
            match record {
                ControlFlowRecord::Return(v) | ControlFlowRecord::Throw(v) => v.trace(tracer),
                ControlFlowRecord::Normal | ControlFlowRecord::Jump { .. } => {}
            }
        }
        self.new_target.trace(tracer);
        if let Some((_, value)) = &self.resume {
            value.trace(tracer);
        }
    }
}

/// One link of the execution-state chain
#[derive(Debug, Clone)]
pub struct ExecutionEntry {
    /// Code cell of a script frame
    pub code: Option<GcRef>,
    /// Function name
    pub name: Rc<str>,
    /// Last instruction index reached
    pub pc: usize,
    /// Entered through `new`
    pub is_constructor: bool,
    /// Eval code
    pub is_eval: bool,
    /// Native function
    pub is_native: bool,
}

/// The chain of active calls, innermost last
///
/// Used for call depth limits and for stack traces captured without running
/// script code.
#[derive(Debug, Default)]
pub struct ExecutionState {
    entries: Vec<ExecutionEntry>,
}

impl ExecutionState {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Active calls
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No call is active
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enter a call
    pub fn push(&mut self, entry: ExecutionEntry) {
        self.entries.push(entry);
    }

    /// Leave the innermost call
    pub fn pop(&mut self) -> Option<ExecutionEntry> {
        self.entries.pop()
    }

    /// Drop every entry above `len`
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    /// Record the pc of the innermost call
    #[inline]
    pub fn set_pc(&mut self, pc: usize) {
        if let Some(top) = self.entries.last_mut() {
            top.pc = pc;
        }
    }

    /// Entries, innermost first
    pub fn iter(&self) -> impl Iterator<Item = &ExecutionEntry> {
        self.entries.iter().rev()
    }
}

/// Resolve an execution entry to a stack trace frame
pub(crate) fn stack_frame(entry: &ExecutionEntry, script: Option<(&Script, u32)>) -> StackFrame {
    let (source_name, line, column) = match script {
        Some((script, function)) => {
            let position = script
                .function(function)
                .and_then(|block| block.source_map.find(entry.pc as u32))
                .map(|e| (e.line, e.column))
                .unwrap_or((0, 0));
            (script.source_name.clone(), position.0, position.1)
        }
        None => (String::new(), 0, 0),
    };
    StackFrame {
        function_name: entry.name.to_string(),
        source_name,
        line,
        column,
        is_constructor: entry.is_constructor,
        is_eval: entry.is_eval,
        is_native: entry.is_native,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, pc: usize) -> ExecutionEntry {
        ExecutionEntry {
            code: None,
            name: name.into(),
            pc,
            is_constructor: false,
            is_eval: false,
            is_native: false,
        }
    }

    #[test]
    fn test_state_chain_order() {
        let mut state = ExecutionState::new();
        state.push(entry("outer", 0));
        state.push(entry("inner", 0));
        state.set_pc(7);
        let names: Vec<_> = state.iter().map(|e| e.name.to_string()).collect();
        assert_eq!(names, ["inner", "outer"]);
        assert_eq!(state.iter().next().map(|e| e.pc), Some(7));
        state.truncate(1);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_native_entry_has_no_position() {
        let mut native = entry("push", 0);
        native.is_native = true;
        let frame = stack_frame(&native, None);
        assert_eq!(frame.to_string(), "at push (native)");
    }
}
