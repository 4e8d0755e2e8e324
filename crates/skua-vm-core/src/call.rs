//! Function invocation
//!
//! [`Runtime::invoke`] prepares a call: script functions produce a fresh
//! [`Frame`] the interpreter pushes onto its own frame stack, everything else
//! (natives, bound functions, promise resolvers, generator and async starts)
//! completes immediately with a value.

use std::rc::Rc;
use std::sync::Arc;

use skua_vm_gc::GcRef;

use crate::environment::Environment;
use crate::error::{VmError, VmResult};
use crate::frame::{ExecutionEntry, Frame};
use crate::function::{FunctionData, FunctionKind};
use crate::object::ObjectKind;
use crate::pauser::ExecutionPauser;
use crate::property::PropertyKey;
use crate::runtime::Runtime;
use crate::value::Value;

/// Result of preparing a call
#[derive(Debug)]
pub(crate) enum Invocation {
    /// Bytecode frame still to run
    Frame(Box<Frame>),
    /// Call already completed
    Value(Value),
}

impl Runtime {
    /// Build a frame for `code` with its register file and function environment
    pub(crate) fn new_frame(
        &mut self,
        code: GcRef,
        callee: Option<GcRef>,
        env: Option<GcRef>,
        this: Value,
        arguments: Vec<Value>,
        new_target: Option<GcRef>,
    ) -> Frame {
        let (script, index, layout) = {
            let cb = self.code_block(code);
            let layout = cb
                .block()
                .function_environment
                .map(|layout| Rc::clone(&cb.layouts[layout as usize]));
            (Arc::clone(&cb.script), cb.index, layout)
        };
        let block = &script.functions[index as usize];
        let mut registers = vec![Value::undefined(); block.required_total_register_number as usize];
        let base = block.numeral_literal_base() as usize;
        for (i, n) in block.numeral_literals.values().iter().enumerate() {
            registers[base + i] = Value::number(*n);
        }
        registers[block.this_register() as usize] = this;

        let env = match layout {
            Some(layout) => Some(self.alloc_env(Environment::declarative(layout, env))),
            None => env,
        };
        Frame {
            code,
            script,
            function_index: index,
            callee,
            registers,
            arguments,
            pc: 0,
            env,
            env_depth: 0,
            handlers: Vec::new(),
            completions: Vec::new(),
            return_register: None,
            is_constructor: new_target.is_some(),
            is_eval: false,
            new_target,
            resume: None,
        }
    }

    /// Execution-state entry for a frame about to run
    pub(crate) fn entry_for(&self, frame: &Frame) -> ExecutionEntry {
        let name: Rc<str> = match frame.callee.and_then(|c| self.function_data(c)) {
            Some(data) => Rc::clone(&data.name),
            None if frame.is_eval => "eval".into(),
            None => frame.block().display_name().into(),
        };
        ExecutionEntry {
            code: Some(frame.code),
            name,
            pc: frame.pc,
            is_constructor: frame.is_constructor,
            is_eval: frame.is_eval,
            is_native: false,
        }
    }

    /// Prepare a call to `callee`
    ///
    /// `new_target` is set for `[[Construct]]`.
    pub(crate) fn invoke(
        &mut self,
        callee: Value,
        this: Value,
        args: Vec<Value>,
        new_target: Option<GcRef>,
    ) -> VmResult<Invocation> {
        let Some(function) = callee.as_object().filter(|f| self.object(*f).is_callable()) else {
            return Err(VmError::type_error(format!(
                "{} is not a function",
                self.display_value(callee)
            )));
        };
        if new_target.is_some() && !self.is_constructor(callee) {
            return Err(VmError::type_error(format!(
                "{} is not a constructor",
                self.display_value(callee)
            )));
        }

        let ObjectKind::Function(data) = self.object(function).kind() else {
            return Err(VmError::internal("callable without function data"));
        };
        match &data.kind {
            FunctionKind::Script { .. } => self.invoke_script(function, this, args, new_target),
            FunctionKind::Native { func } => {
                let func = *func;
                let name = Rc::clone(&data.name);
                self.enter_native(name, new_target.is_some())?;
                let result = func(self, this, &args, new_target);
                self.state.pop();
                result.map(Invocation::Value)
            }
            FunctionKind::Bound {
                target,
                this: bound_this,
                args: bound_args,
            } => {
                let target = *target;
                let bound_this = *bound_this;
                let mut full = bound_args.clone();
                full.extend(args);
                let new_target = new_target.map(|nt| if nt == function { target } else { nt });
                let this = if new_target.is_some() { this } else { bound_this };
                self.invoke(Value::object(target), this, full, new_target)
            }
            FunctionKind::PromiseResolver {
                promise,
                reject,
                already_resolved,
            } => {
                let (promise, reject) = (*promise, *reject);
                if already_resolved.replace(true) {
                    return Ok(Invocation::Value(Value::undefined()));
                }
                let value = args.first().copied().unwrap_or_default();
                if reject {
                    self.reject_promise(promise, value);
                } else {
                    self.resolve_promise(promise, value)?;
                }
                Ok(Invocation::Value(Value::undefined()))
            }
        }
    }

    fn invoke_script(
        &mut self,
        function: GcRef,
        this: Value,
        args: Vec<Value>,
        new_target: Option<GcRef>,
    ) -> VmResult<Invocation> {
        let Some(FunctionData {
            name,
            kind:
                FunctionKind::Script {
                    code,
                    env,
                    this_value,
                    new_target: lexical_new_target,
                    fields,
                    ..
                },
            ..
        }) = self.function_data(function)
        else {
            return Err(VmError::internal("script call without bytecode"));
        };
        let (code, env, captured_this, lexical_new_target) = (*code, *env, *this_value, *lexical_new_target);
        let (name, fields) = (Rc::clone(name), fields.clone());
        let flags = self.code_block(code).block().flags;
        if flags.is_class_constructor && new_target.is_none() {
            return Err(VmError::type_error(format!(
                "Class constructor {name} cannot be invoked without 'new'"
            )));
        }

        let this = if let Some(captured) = captured_this {
            captured
        } else if flags.is_derived_constructor && new_target.is_some() {
            Value::empty()
        } else if let Some(target) = new_target {
            let this = Value::object(self.create_this(target)?);
            if let Some(fields) = &fields {
                self.initialize_fields(this, fields)?;
            }
            this
        } else if flags.is_strict {
            this
        } else if this.is_undefined_or_null() {
            Value::object(self.global)
        } else if !this.is_object() {
            Value::object(self.to_object(this)?)
        } else {
            this
        };
        let mut frame = Box::new(self.new_frame(code, Some(function), env, this, args, new_target));
        if flags.is_arrow {
            frame.new_target = lexical_new_target;
        }
        match (flags.is_generator, flags.is_async) {
            (true, true) => ExecutionPauser::start_async_generator(self, function, frame).map(Invocation::Value),
            (true, false) => ExecutionPauser::start_generator(self, function, frame).map(Invocation::Value),
            (false, true) => ExecutionPauser::start_async(self, frame).map(Invocation::Value),
            (false, false) => Ok(Invocation::Frame(frame)),
        }
    }

    /// `OrdinaryCreateFromConstructor` with `%Object.prototype%` as fallback
    fn create_this(&mut self, new_target: GcRef) -> VmResult<GcRef> {
        let proto = self.get(new_target, &PropertyKey::from_name("prototype"), Value::object(new_target))?;
        let proto = proto.as_object().unwrap_or(self.intrinsics.object_prototype);
        Ok(self.new_object_with(Some(proto), ObjectKind::Ordinary))
    }

    fn enter_native(&mut self, name: Rc<str>, is_constructor: bool) -> VmResult<()> {
        if self.state.len() >= self.config.max_call_depth {
            return Err(VmError::StackOverflow);
        }
        self.state.push(ExecutionEntry {
            code: None,
            name,
            pc: 0,
            is_constructor,
            is_eval: false,
            is_native: true,
        });
        Ok(())
    }

    /// `Call(callee, this, args)`, reentering the interpreter for script functions
    pub fn call(&mut self, callee: Value, this: Value, args: &[Value]) -> VmResult<Value> {
        match self.invoke(callee, this, args.to_vec(), None)? {
            Invocation::Value(value) => Ok(value),
            Invocation::Frame(frame) => self.run_frame(frame),
        }
    }

    /// `Construct(callee, args, new_target)`; `new_target` defaults to `callee`
    pub fn construct(&mut self, callee: Value, args: &[Value], new_target: Option<GcRef>) -> VmResult<Value> {
        let Some(target) = new_target.or(callee.as_object()) else {
            return Err(VmError::type_error(format!(
                "{} is not a constructor",
                self.display_value(callee)
            )));
        };
        match self.invoke(callee, Value::undefined(), args.to_vec(), Some(target))? {
            Invocation::Value(value) => Ok(value),
            Invocation::Frame(frame) => self.run_frame(frame),
        }
    }

    /// Call `object[name](args)`
    pub fn invoke_method(&mut self, object: Value, name: &str, args: &[Value]) -> VmResult<Value> {
        let method = self.get_value(object, &PropertyKey::from_name(name))?;
        self.call(method, object, args)
    }
}
