//! Bytecode interpreter
//!
//! Executes bytecode instructions. Script-to-script calls do not recurse on the
//! host stack: [`Interpreter::interpret`] keeps its own list of caller frames
//! and only reenters itself when a native function calls back into script
//! code. Generator and async frames run as the bottom frame of an
//! `interpret` call so a suspension can hand the whole frame back to the
//! pauser.

use std::rc::Rc;
use std::sync::Arc;

use skua_vm_bytecode::{
    BindingKind, ByteCodeBlock, Constant, ConstantIndex, ErrorKind, FunctionIndex, Instruction, Register,
};
use skua_vm_gc::GcRef;

use crate::environment::{Binding, Environment, EnvironmentKind, GlobalLexical, const_assignment_error, tdz_error};
use crate::error::{StackFrame, VmError, VmResult};
use crate::frame::{ControlFlowRecord, Frame, Handler, HandlerKind, ResumeMode};
use crate::class::uninitialized_this_error;
use crate::function::{ClassFields, FunctionData, FunctionKind};
use crate::number::f64_to_int32;
use crate::object::{ArgumentsData, Elements, ObjectKind};
use crate::property::{PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::runtime::Runtime;
use crate::value::Value;

/// Nested `interpret` calls (native reentry) allowed before a `RangeError`
pub(crate) const MAX_REENTRY_DEPTH: usize = 128;

/// Why a frame stopped without finishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendKind {
    /// `GeneratorsInitialize` of a generator
    Initial,
    /// `yield`; the value is the yielded operand
    Yield,
    /// `yield*`; the value is the inner iterator result object
    Delegate,
    /// `await`; the value is the awaited operand
    Await,
}

/// How an [`Interpreter::interpret`] call ended
#[derive(Debug)]
pub enum Completion {
    /// The bottom frame returned
    Return(Value),
    /// The bottom frame paused; `frame.pc` still points at the suspension point
    Suspend {
        /// Suspension point
        kind: SuspendKind,
        /// Value handed to the pauser
        value: Value,
        /// The paused frame
        frame: Box<Frame>,
    },
}

/// Result of executing an instruction
enum InstructionResult {
    /// Continue to the next instruction
    Continue,
    /// Continue at an absolute instruction index
    Jump(usize),
    /// Return from the current frame
    Return(Value),
    /// Push a script frame
    Call(Box<Frame>),
    /// Pause the current frame
    Suspend(SuspendKind, Value),
}

/// The bytecode interpreter
#[derive(Debug)]
pub struct Interpreter;

impl Interpreter {
    /// Run `frame` until it returns, suspends or throws
    pub fn interpret(rt: &mut Runtime, frame: Box<Frame>) -> VmResult<Completion> {
        if rt.reentry_depth >= MAX_REENTRY_DEPTH {
            return Err(VmError::StackOverflow);
        }
        rt.reentry_depth += 1;
        let base = rt.state.len();
        let result = Self::run_loop(rt, frame, base);
        rt.reentry_depth -= 1;
        if result.is_err() {
            rt.state.truncate(base);
        }
        result
    }

    fn enter(rt: &mut Runtime, frame: &Frame) -> VmResult<()> {
        if rt.state.len() >= rt.config.max_call_depth {
            return Err(VmError::StackOverflow);
        }
        let entry = rt.entry_for(frame);
        rt.state.push(entry);
        Ok(())
    }

    /// Main execution loop
    fn run_loop(rt: &mut Runtime, mut frame: Box<Frame>, base: usize) -> VmResult<Completion> {
        Self::enter(rt, &frame)?;
        let mut callers: Vec<Box<Frame>> = Vec::new();
        let mut script = Arc::clone(&frame.script);

        loop {
            let pc = frame.pc;
            rt.state.set_pc(pc);
            let block = &script.functions[frame.function_index as usize];
            let Some(instruction) = block.instructions.get(pc) else {
                return Err(VmError::internal(format!(
                    "pc {pc} out of range in {}",
                    block.display_name()
                )));
            };

            let error = match Self::execute_instruction(rt, &mut frame, block, *instruction, pc) {
                Ok(InstructionResult::Continue) => {
                    frame.pc = pc + 1;
                    continue;
                }
                Ok(InstructionResult::Jump(target)) => {
                    frame.pc = target;
                    continue;
                }
                Ok(InstructionResult::Call(callee)) => match Self::enter(rt, &callee) {
                    Ok(()) => {
                        callers.push(std::mem::replace(&mut frame, callee));
                        script = Arc::clone(&frame.script);
                        continue;
                    }
                    Err(err) => err,
                },
                Ok(InstructionResult::Return(value)) => match Self::construct_result(&frame, value) {
                    Ok(value) => {
                        rt.state.pop();
                        let Some(mut caller) = callers.pop() else {
                            return Ok(Completion::Return(value));
                        };
                        if let Some(register) = frame.return_register {
                            caller.set(register, value);
                        }
                        caller.pc += 1;
                        frame = caller;
                        script = Arc::clone(&frame.script);
                        continue;
                    }
                    Err(err) => err,
                },
                Ok(InstructionResult::Suspend(kind, value)) => {
                    if !callers.is_empty() {
                        return Err(VmError::internal("suspension below an inline call"));
                    }
                    rt.state.pop();
                    return Ok(Completion::Suspend { kind, value, frame });
                }
                Err(err) => err,
            };

            // Unwind to the innermost handler
            if !error.is_catchable() {
                return Err(error);
            }
            let (value, stack) = Self::exception_parts(rt, error);
            loop {
                if let Some(handler) = frame.handlers.pop() {
                    rt.state.truncate(base + callers.len() + 1);
                    Self::enter_handler(&mut frame, handler, value);
                    break;
                }
                rt.state.pop();
                match callers.pop() {
                    Some(caller) => frame = caller,
                    None => {
                        let message = rt.describe_thrown(value);
                        return Err(VmError::exception(value, message, stack));
                    }
                }
            }
            script = Arc::clone(&frame.script);
        }
    }

    /// The thrown value and its stack trace
    fn exception_parts(rt: &mut Runtime, error: VmError) -> (Value, Vec<StackFrame>) {
        match error {
            VmError::Exception(thrown) => (thrown.value, thrown.stack),
            other => {
                let stack = rt.capture_stack();
                (rt.materialize_error(&other), stack)
            }
        }
    }

    fn enter_handler(frame: &mut Frame, handler: Handler, value: Value) {
        frame.env = handler.env;
        frame.env_depth = handler.env_depth;
        frame.completions.truncate(handler.completion_depth);
        match handler.kind {
            HandlerKind::Catch(register) => frame.set(register, value),
            HandlerKind::Finally => frame.completions.push(ControlFlowRecord::Throw(value)),
        }
        frame.pc = handler.target;
    }

    /// Return, running the innermost pending `finally` first
    fn return_through_finally(frame: &mut Frame, value: Value) -> InstructionResult {
        while let Some(handler) = frame.handlers.pop() {
            if handler.kind == HandlerKind::Finally {
                frame.env = handler.env;
                frame.env_depth = handler.env_depth;
                frame.completions.truncate(handler.completion_depth);
                frame.completions.push(ControlFlowRecord::Return(value));
                return InstructionResult::Jump(handler.target);
            }
        }
        InstructionResult::Return(value)
    }

    /// Continue a `break`/`continue` that crosses `finally` blocks
    fn jump_complex(rt: &Runtime, frame: &mut Frame, block: &ByteCodeBlock, record: u32) -> VmResult<InstructionResult> {
        let Some(flow) = block.jump_flow_records.get(record as usize).copied() else {
            return Err(VmError::internal(format!("jump flow record {record} out of range")));
        };
        while frame.handlers.len() > flow.try_depth as usize {
            let Some(handler) = frame.handlers.pop() else { break };
            if handler.kind == HandlerKind::Finally {
                frame.env = handler.env;
                frame.env_depth = handler.env_depth;
                frame.completions.truncate(handler.completion_depth);
                frame.completions.push(ControlFlowRecord::Jump { record });
                return Ok(InstructionResult::Jump(handler.target));
            }
        }
        while frame.env_depth > flow.env_depth {
            frame.env = frame.env.and_then(|env| rt.env(env).parent);
            frame.env_depth -= 1;
        }
        frame.completions.truncate(flow.completion_depth as usize);
        Ok(InstructionResult::Jump(flow.target as usize))
    }

    /// Apply a resumption injected by the pauser at a suspension point
    fn resume(rt: &mut Runtime, frame: &mut Frame, dst: Option<Register>, mode: ResumeMode, value: Value) -> VmResult<InstructionResult> {
        match mode {
            ResumeMode::Next => {
                if let Some(dst) = dst {
                    frame.set(dst, value);
                }
                Ok(InstructionResult::Continue)
            }
            ResumeMode::Throw => Err(rt.throw_value(value)),
            ResumeMode::Return => Ok(Self::return_through_finally(frame, value)),
        }
    }

    fn name(block: &ByteCodeBlock, index: ConstantIndex) -> VmResult<&str> {
        block
            .constants
            .get_str(index.index())
            .ok_or_else(|| VmError::internal(format!("constant {} is not a string", index.index())))
    }

    /// Execute a single instruction
    fn execute_instruction(
        rt: &mut Runtime,
        frame: &mut Frame,
        block: &ByteCodeBlock,
        instruction: Instruction,
        pc: usize,
    ) -> VmResult<InstructionResult> {
        match instruction {
            // ==================== Constants ====================
            Instruction::LoadUndefined { dst } => frame.set(dst, Value::undefined()),
            Instruction::LoadNull { dst } => frame.set(dst, Value::null()),
            Instruction::LoadTrue { dst } => frame.set(dst, Value::from_bool(true)),
            Instruction::LoadFalse { dst } => frame.set(dst, Value::from_bool(false)),
            Instruction::LoadEmpty { dst } => frame.set(dst, Value::empty()),
            Instruction::LoadInt32 { dst, value } => frame.set(dst, Value::from_i32(value)),
            Instruction::LoadConst { dst, idx } => {
                let value = match block.constants.get(idx.index()) {
                    Some(Constant::String(s)) => rt.intern(s),
                    Some(Constant::Number(n)) => Value::number(*n),
                    None => return Err(VmError::internal(format!("constant {} out of range", idx.index()))),
                };
                frame.set(dst, value);
            }
            Instruction::Move { dst, src } => frame.set(dst, frame.get(src)),

            // ==================== Variables ====================
            Instruction::GetHeap { dst, depth, slot } => {
                let env = rt.env_at(frame.env, depth);
                frame.set(dst, rt.env_slot(env, slot));
            }
            Instruction::SetHeap { src, depth, slot } => {
                let env = rt.env_at(frame.env, depth);
                rt.set_env_slot(env, slot, frame.get(src));
            }
            Instruction::CheckInitialized { src, name } => {
                if frame.get(src).is_empty() {
                    return Err(tdz_error(Self::name(block, name)?));
                }
            }
            Instruction::ThrowConstAssignment { .. } => return Err(const_assignment_error()),
            Instruction::PushEnvironment { layout } => {
                let layout = rt
                    .code_block(frame.code)
                    .layouts
                    .get(layout as usize)
                    .map(Rc::clone)
                    .ok_or_else(|| VmError::internal(format!("environment layout {layout} out of range")))?;
                frame.env = Some(rt.alloc_env(Environment::declarative(layout, frame.env)));
                frame.env_depth += 1;
            }
            Instruction::PopEnvironment => {
                frame.env = frame.env.and_then(|env| rt.env(env).parent);
                frame.env_depth = frame.env_depth.saturating_sub(1);
            }
            Instruction::RecreateEnvironment => {
                if let Some(env) = frame.env {
                    frame.env = Some(rt.copy_env(env));
                }
            }
            Instruction::PushWithEnvironment { obj } => {
                let object = rt.to_object(frame.get(obj))?;
                frame.env = Some(rt.alloc_env(Environment {
                    parent: frame.env,
                    kind: EnvironmentKind::Object { object },
                }));
                frame.env_depth += 1;
            }
            Instruction::GetGlobal { dst, name, ic_index } => {
                let value = rt.get_global_cached(frame.code, ic_index, Self::name(block, name)?)?;
                frame.set(dst, value);
            }
            Instruction::SetGlobal {
                src,
                name,
                ic_index,
                strict,
            } => {
                let value = frame.get(src);
                if !rt.set_global_cached(frame.code, ic_index, value) {
                    let name = Self::name(block, name)?;
                    let binding = rt.resolve_binding(None, name)?;
                    rt.write_binding(binding, name, value, strict)?;
                    rt.record_global_store(frame.code, ic_index, name);
                }
            }
            Instruction::TypeOfGlobal { dst, name } => {
                let name = Self::name(block, name)?;
                let value = match rt.resolve_binding(None, name)? {
                    Some(binding) => rt.read_binding(binding, name)?,
                    None => Value::undefined(),
                };
                let type_name = rt.type_of(value);
                frame.set(dst, rt.intern(type_name));
            }
            Instruction::DeclareGlobals => rt.declare_globals(block, frame.script.is_eval)?,
            Instruction::InitGlobalLexical { src, name } => {
                let name = Self::name(block, name)?;
                let value = frame.get(src);
                match rt.global_lexicals.get_mut(name) {
                    Some(lexical) => lexical.value = value,
                    None => {
                        rt.global_lexicals.insert(
                            name.into(),
                            GlobalLexical {
                                value,
                                is_const: false,
                            },
                        );
                        rt.lexical_epoch += 1;
                    }
                }
            }
            Instruction::GetByName { dst, name } => {
                let name = Self::name(block, name)?;
                let value = match rt.resolve_binding(frame.env, name)? {
                    Some(binding) => rt.read_binding(binding, name)?,
                    None => return Err(VmError::reference_error(format!("{name} is not defined"))),
                };
                frame.set(dst, value);
            }
            Instruction::SetByName { src, name, strict } => {
                let name = Self::name(block, name)?;
                let binding = rt.resolve_binding(frame.env, name)?;
                rt.write_binding(binding, name, frame.get(src), strict)?;
            }
            Instruction::TypeOfByName { dst, name } => {
                let name = Self::name(block, name)?;
                let value = match rt.resolve_binding(frame.env, name)? {
                    Some(binding) => rt.read_binding(binding, name)?,
                    None => Value::undefined(),
                };
                let type_name = rt.type_of(value);
                frame.set(dst, rt.intern(type_name));
            }
            Instruction::DeleteByName { dst, name } => {
                let name = Self::name(block, name)?;
                let key = PropertyKey::from_name(name);
                let deleted = match rt.resolve_binding(frame.env, name)? {
                    Some(Binding::Slot { .. } | Binding::GlobalLexical) => false,
                    Some(Binding::Object(object)) => rt.delete(object, &key)?,
                    Some(Binding::GlobalObject) => {
                        let global = rt.global_object();
                        rt.delete(global, &key)?
                    }
                    None => true,
                };
                frame.set(dst, Value::from_bool(deleted));
            }

            // ==================== Functions ====================
            Instruction::GetArgument { dst, index } => {
                let value = frame.arguments.get(index as usize).copied().unwrap_or_default();
                frame.set(dst, value);
            }
            Instruction::CreateArguments { dst } => {
                let arguments = rt.create_arguments_object(frame, block);
                frame.set(dst, Value::object(arguments));
            }
            Instruction::CreateRestParameter { dst, start } => {
                let rest = frame.arguments.get(start as usize..).map(<[Value]>::to_vec).unwrap_or_default();
                frame.set(dst, Value::object(rt.new_array(rest)));
            }
            Instruction::CreateFunction { dst, func } => {
                let function = rt.instantiate_function(frame, func);
                frame.set(dst, Value::object(function));
            }
            Instruction::LoadCallee { dst } => {
                frame.set(dst, frame.callee.map(Value::object).unwrap_or_default());
            }
            Instruction::LoadNewTarget { dst } => {
                frame.set(dst, frame.new_target.map(Value::object).unwrap_or_default());
            }
            Instruction::CreateMethod { dst, func, home } => {
                let home = Self::expect_object(rt, frame.get(home))?;
                let function = rt.instantiate_function(frame, func);
                rt.set_home_object(function, home);
                frame.set(dst, Value::object(function));
            }
            Instruction::GetTemplateObject { dst, site } => {
                let strings = rt.template_object(frame.code, site)?;
                frame.set(dst, Value::object(strings));
            }

            // ==================== Objects ====================
            Instruction::GetNamed {
                dst,
                obj,
                name,
                ic_index,
            } => {
                let target = frame.get(obj);
                let key = PropertyKey::from_name(Self::name(block, name)?);
                let value = match target.as_object() {
                    Some(object) => rt.get_named_cached(frame.code, ic_index, object, &key)?,
                    None => rt.get_value(target, &key)?,
                };
                frame.set(dst, value);
            }
            Instruction::SetNamed {
                obj,
                name,
                src,
                ic_index,
                strict,
            } => {
                let target = frame.get(obj);
                let key = PropertyKey::from_name(Self::name(block, name)?);
                let value = frame.get(src);
                match target.as_object() {
                    Some(object) => {
                        if !rt.set_named_cached(frame.code, ic_index, object, &key, value)? && strict {
                            return Err(VmError::type_error(format!(
                                "Cannot assign to read only property '{key}' of object"
                            )));
                        }
                    }
                    None => rt.set_value(target, &key, value, strict)?,
                }
            }
            Instruction::GetKeyed { dst, obj, key } => {
                let target = frame.get(obj);
                if target.is_undefined_or_null() {
                    let key = rt.to_property_key(frame.get(key))?;
                    return Err(VmError::type_error(format!(
                        "Cannot read properties of {} (reading '{key}')",
                        rt.display_value(target)
                    )));
                }
                let key = rt.to_property_key(frame.get(key))?;
                let value = rt.get_value(target, &key)?;
                frame.set(dst, value);
            }
            Instruction::SetKeyed { obj, key, src, strict } => {
                let target = frame.get(obj);
                let key = rt.to_property_key(frame.get(key))?;
                rt.set_value(target, &key, frame.get(src), strict)?;
            }
            Instruction::DefineOwnNamed {
                obj,
                name,
                src,
                ic_index,
            } => {
                let object = Self::expect_object(rt, frame.get(obj))?;
                let key = PropertyKey::from_name(Self::name(block, name)?);
                rt.define_named_cached(frame.code, ic_index, object, &key, frame.get(src))?;
            }
            Instruction::DefineOwnKeyed { obj, key, src } => {
                let object = Self::expect_object(rt, frame.get(obj))?;
                let key = rt.to_property_key(frame.get(key))?;
                rt.define_own_property(
                    object,
                    key,
                    PropertyDescriptor::data(frame.get(src), PropertyAttributes::DEFAULT),
                )?;
            }
            Instruction::DefineGetter { obj, key, func } => {
                let object = Self::expect_object(rt, frame.get(obj))?;
                let key = rt.to_property_key(frame.get(key))?;
                let desc = PropertyDescriptor {
                    get: Some(frame.get(func)),
                    enumerable: Some(true),
                    configurable: Some(true),
                    ..PropertyDescriptor::default()
                };
                rt.define_own_property(object, key, desc)?;
            }
            Instruction::DefineSetter { obj, key, func } => {
                let object = Self::expect_object(rt, frame.get(obj))?;
                let key = rt.to_property_key(frame.get(key))?;
                let desc = PropertyDescriptor {
                    set: Some(frame.get(func)),
                    enumerable: Some(true),
                    configurable: Some(true),
                    ..PropertyDescriptor::default()
                };
                rt.define_own_property(object, key, desc)?;
            }
            Instruction::CopyDataProperties { dst, src } => {
                let target = Self::expect_object(rt, frame.get(dst))?;
                rt.copy_data_properties(target, frame.get(src), &[])?;
            }
            Instruction::CopyRestProperties {
                dst,
                src,
                excluded,
                excluded_count,
            } => {
                let mut keys = Vec::with_capacity(excluded_count as usize);
                for value in frame.window(excluded, excluded_count) {
                    keys.push(rt.to_property_key(value)?);
                }
                let source = frame.get(src);
                if source.is_undefined_or_null() {
                    return Err(VmError::type_error(format!(
                        "Cannot destructure '{}' as it is {}.",
                        rt.display_value(source),
                        rt.display_value(source)
                    )));
                }
                let rest = rt.new_object();
                rt.copy_data_properties(rest, source, &keys)?;
                frame.set(dst, Value::object(rest));
            }
            Instruction::DeleteKeyed { dst, obj, key, strict } => {
                let object = rt.to_object(frame.get(obj))?;
                let key = rt.to_property_key(frame.get(key))?;
                let deleted = rt.delete(object, &key)?;
                if !deleted && strict {
                    return Err(VmError::type_error(format!(
                        "Cannot delete property '{key}' of {}",
                        rt.display_value(frame.get(obj))
                    )));
                }
                frame.set(dst, Value::from_bool(deleted));
            }
            Instruction::In { dst, key, obj } => {
                let target = frame.get(obj);
                let Some(object) = target.as_object() else {
                    let key = rt.display_value(frame.get(key));
                    return Err(VmError::type_error(format!(
                        "Cannot use 'in' operator to search for '{key}' in {}",
                        rt.display_value(target)
                    )));
                };
                let key = rt.to_property_key(frame.get(key))?;
                let found = rt.has_property(object, &key)?;
                frame.set(dst, Value::from_bool(found));
            }
            Instruction::InstanceOf { dst, lhs, rhs } => {
                let result = rt.instance_of(frame.get(lhs), frame.get(rhs))?;
                frame.set(dst, Value::from_bool(result));
            }
            Instruction::NewObject { dst } => frame.set(dst, Value::object(rt.new_object())),
            Instruction::NewArray { dst, capacity } => {
                let array = rt.new_array(Vec::with_capacity(capacity as usize));
                frame.set(dst, Value::object(array));
            }
            Instruction::ArrayPush { arr, src } => {
                let array = Self::expect_object(rt, frame.get(arr))?;
                rt.array_append(array, frame.get(src));
            }
            Instruction::ArrayPushHole { arr } => {
                let array = Self::expect_object(rt, frame.get(arr))?;
                rt.array_append_hole(array);
            }
            Instruction::ArraySpread { arr, src } => {
                let array = Self::expect_object(rt, frame.get(arr))?;
                for value in rt.iterable_to_list(frame.get(src))? {
                    rt.array_append(array, value);
                }
            }

            // ==================== Arithmetic ====================
            Instruction::Add { dst, lhs, rhs } => {
                let value = rt.add_values(frame.get(lhs), frame.get(rhs))?;
                frame.set(dst, value);
            }
            Instruction::Sub { dst, lhs, rhs } => {
                let (a, b) = (frame.get(lhs), frame.get(rhs));
                if a.is_int32()
                    && b.is_int32()
                    && let Some(diff) = a.as_int32().checked_sub(b.as_int32())
                {
                    frame.set(dst, Value::from_i32(diff));
                } else {
                    Self::arithmetic(rt, frame, dst, a, b, |x, y| x - y)?;
                }
            }
            Instruction::Mul { dst, lhs, rhs } => {
                let (a, b) = (frame.get(lhs), frame.get(rhs));
                Self::arithmetic(rt, frame, dst, a, b, |x, y| x * y)?
            }
            Instruction::Div { dst, lhs, rhs } => {
                let (a, b) = (frame.get(lhs), frame.get(rhs));
                Self::arithmetic(rt, frame, dst, a, b, |x, y| x / y)?
            }
            Instruction::Mod { dst, lhs, rhs } => {
                let (a, b) = (frame.get(lhs), frame.get(rhs));
                Self::arithmetic(rt, frame, dst, a, b, |x, y| x % y)?
            }
            Instruction::Exp { dst, lhs, rhs } => {
                let (a, b) = (frame.get(lhs), frame.get(rhs));
                Self::arithmetic(rt, frame, dst, a, b, exponentiate)?
            }
            Instruction::BitAnd { dst, lhs, rhs } => Self::bitwise(rt, frame, dst, lhs, rhs, |x, y| x & y)?,
            Instruction::BitOr { dst, lhs, rhs } => Self::bitwise(rt, frame, dst, lhs, rhs, |x, y| x | y)?,
            Instruction::BitXor { dst, lhs, rhs } => Self::bitwise(rt, frame, dst, lhs, rhs, |x, y| x ^ y)?,
            Instruction::Shl { dst, lhs, rhs } => {
                Self::bitwise(rt, frame, dst, lhs, rhs, |x, y| x.wrapping_shl(y as u32 & 31))?
            }
            Instruction::Shr { dst, lhs, rhs } => {
                Self::bitwise(rt, frame, dst, lhs, rhs, |x, y| x.wrapping_shr(y as u32 & 31))?
            }
            Instruction::Ushr { dst, lhs, rhs } => {
                let a = rt.to_uint32(frame.get(lhs))?;
                let b = rt.to_uint32(frame.get(rhs))?;
                frame.set(dst, Value::number((a >> (b & 31)) as f64));
            }
            Instruction::Neg { dst, src } => {
                let value = frame.get(src);
                if value.is_int32() && value.as_int32() != 0 && value.as_int32() != i32::MIN {
                    frame.set(dst, Value::from_i32(-value.as_int32()));
                } else {
                    let n = rt.to_number(value)?;
                    frame.set(dst, Value::number(-n));
                }
            }
            Instruction::ToNumber { dst, src } | Instruction::ToNumeric { dst, src } => {
                let value = frame.get(src);
                if !value.is_number() {
                    let n = rt.to_numeric(value)?;
                    frame.set(dst, n);
                } else {
                    frame.set(dst, value);
                }
            }
            Instruction::BitNot { dst, src } => {
                let n = rt.to_int32(frame.get(src))?;
                frame.set(dst, Value::from_i32(!n));
            }
            Instruction::Inc { dst, src } => Self::step(rt, frame, dst, src, 1)?,
            Instruction::Dec { dst, src } => Self::step(rt, frame, dst, src, -1)?,
            Instruction::ToString { dst, src } => {
                let value = rt.to_string_value(frame.get(src))?;
                frame.set(dst, value);
            }
            Instruction::ToPropertyKey { dst, src } => {
                let key = rt.to_property_key(frame.get(src))?;
                let value = rt.key_to_value(&key);
                frame.set(dst, value);
            }

            // ==================== Comparison ====================
            Instruction::Eq { dst, lhs, rhs } => {
                let result = rt.abstract_equals(frame.get(lhs), frame.get(rhs))?;
                frame.set(dst, Value::from_bool(result));
            }
            Instruction::Ne { dst, lhs, rhs } => {
                let result = rt.abstract_equals(frame.get(lhs), frame.get(rhs))?;
                frame.set(dst, Value::from_bool(!result));
            }
            Instruction::StrictEq { dst, lhs, rhs } => {
                let result = crate::conversion::strict_equals(rt, frame.get(lhs), frame.get(rhs));
                frame.set(dst, Value::from_bool(result));
            }
            Instruction::StrictNe { dst, lhs, rhs } => {
                let result = crate::conversion::strict_equals(rt, frame.get(lhs), frame.get(rhs));
                frame.set(dst, Value::from_bool(!result));
            }
            Instruction::Lt { dst, lhs, rhs } => {
                let result = rt.less_than(frame.get(lhs), frame.get(rhs), true)?;
                frame.set(dst, Value::from_bool(result == Some(true)));
            }
            Instruction::Gt { dst, lhs, rhs } => {
                let result = rt.less_than(frame.get(rhs), frame.get(lhs), false)?;
                frame.set(dst, Value::from_bool(result == Some(true)));
            }
            Instruction::Le { dst, lhs, rhs } => {
                let result = rt.less_than(frame.get(rhs), frame.get(lhs), false)?;
                frame.set(dst, Value::from_bool(result == Some(false)));
            }
            Instruction::Ge { dst, lhs, rhs } => {
                let result = rt.less_than(frame.get(lhs), frame.get(rhs), true)?;
                frame.set(dst, Value::from_bool(result == Some(false)));
            }
            Instruction::Not { dst, src } => {
                let truthy = rt.to_boolean(frame.get(src));
                frame.set(dst, Value::from_bool(!truthy));
            }
            Instruction::TypeOf { dst, src } => {
                let type_name = rt.type_of(frame.get(src));
                frame.set(dst, rt.intern(type_name));
            }

            // ==================== Control Flow ====================
            Instruction::Jump { offset } => return Ok(InstructionResult::Jump(offset.target(pc))),
            Instruction::JumpIfTrue { cond, offset } => {
                if rt.to_boolean(frame.get(cond)) {
                    return Ok(InstructionResult::Jump(offset.target(pc)));
                }
            }
            Instruction::JumpIfFalse { cond, offset } => {
                if !rt.to_boolean(frame.get(cond)) {
                    return Ok(InstructionResult::Jump(offset.target(pc)));
                }
            }
            Instruction::JumpIfNullish { src, offset } => {
                if frame.get(src).is_undefined_or_null() {
                    return Ok(InstructionResult::Jump(offset.target(pc)));
                }
            }
            Instruction::JumpIfNotUndefined { src, offset } => {
                if !frame.get(src).is_undefined() {
                    return Ok(InstructionResult::Jump(offset.target(pc)));
                }
            }
            Instruction::JumpComplex { record } => return Self::jump_complex(rt, frame, block, record),
            Instruction::EnterTryCatch { handler, exception } => {
                frame.handlers.push(Handler {
                    kind: HandlerKind::Catch(exception),
                    target: handler.target(pc),
                    env: frame.env,
                    env_depth: frame.env_depth,
                    completion_depth: frame.completions.len(),
                });
            }
            Instruction::EnterTryFinally { handler } => {
                frame.handlers.push(Handler {
                    kind: HandlerKind::Finally,
                    target: handler.target(pc),
                    env: frame.env,
                    env_depth: frame.env_depth,
                    completion_depth: frame.completions.len(),
                });
            }
            Instruction::LeaveTry => {
                if let Some(handler) = frame.handlers.pop()
                    && handler.kind == HandlerKind::Finally
                {
                    frame.completions.push(ControlFlowRecord::Normal);
                }
            }
            Instruction::EndFinally => match frame.completions.pop() {
                Some(ControlFlowRecord::Normal) | None => {}
                Some(ControlFlowRecord::Return(value)) => return Ok(Self::return_through_finally(frame, value)),
                Some(ControlFlowRecord::Throw(value)) => return Err(rt.throw_value(value)),
                Some(ControlFlowRecord::Jump { record }) => return Self::jump_complex(rt, frame, block, record),
            },
            Instruction::Return { src } => {
                let value = frame.get(src);
                return Ok(Self::return_through_finally(frame, value));
            }
            Instruction::ReturnUndefined => return Ok(Self::return_through_finally(frame, Value::undefined())),
            Instruction::Throw { src } => return Err(rt.throw_value(frame.get(src))),
            Instruction::ThrowError { kind, message } => {
                let message = Self::name(block, message)?.to_string();
                return Err(match kind {
                    ErrorKind::TypeError => VmError::TypeError(message),
                    ErrorKind::ReferenceError => VmError::ReferenceError(message),
                    ErrorKind::RangeError => VmError::RangeError(message),
                    ErrorKind::SyntaxError => VmError::SyntaxError(message),
                });
            }

            // ==================== Calls ====================
            Instruction::Call { dst, callee, args, argc } => {
                let (callee, args) = (frame.get(callee), frame.window(args, argc));
                return Self::call(rt, frame, dst, callee, Value::undefined(), args, None);
            }
            Instruction::CallWithReceiver {
                dst,
                callee,
                receiver,
                args,
                argc,
            } => {
                let (callee, this, args) = (frame.get(callee), frame.get(receiver), frame.window(args, argc));
                return Self::call(rt, frame, dst, callee, this, args, None);
            }
            Instruction::CallSpread {
                dst,
                callee,
                receiver,
                array,
            } => {
                let args = rt.array_to_list(frame.get(array))?;
                let (callee, this) = (frame.get(callee), frame.get(receiver));
                return Self::call(rt, frame, dst, callee, this, args, None);
            }
            Instruction::CallEval {
                dst,
                callee,
                args,
                argc,
                strict,
            } => {
                let (callee, args) = (frame.get(callee), frame.window(args, argc));
                return Self::call_eval(rt, frame, dst, callee, args, strict);
            }
            Instruction::New { dst, callee, args, argc } => {
                let (callee, args) = (frame.get(callee), frame.window(args, argc));
                return Self::construct(rt, frame, dst, callee, args);
            }
            Instruction::NewSpread { dst, callee, array } => {
                let args = rt.array_to_list(frame.get(array))?;
                let callee = frame.get(callee);
                return Self::construct(rt, frame, dst, callee, args);
            }

            // ==================== Iteration ====================
            Instruction::GetIterator { dst, src } => {
                let record = rt.get_iterator(frame.get(src))?;
                frame.set(dst, Value::object(record));
            }
            Instruction::IteratorStep { dst, iter, done } => {
                let record = Self::expect_object(rt, frame.get(iter))?;
                match rt.iterator_step(record)? {
                    Some(value) => frame.set(dst, value),
                    None => return Ok(InstructionResult::Jump(done.target(pc))),
                }
            }
            Instruction::IteratorClose { iter } => {
                let record = Self::expect_object(rt, frame.get(iter))?;
                let suppress = matches!(frame.completions.last(), Some(ControlFlowRecord::Throw(_)));
                rt.iterator_close(record, suppress)?;
            }
            Instruction::ForInEnumerate { dst, src } => {
                let iterator = rt.for_in_enumerate(frame.get(src))?;
                frame.set(dst, Value::object(iterator));
            }
            Instruction::ForInNext { dst, iter, done } => {
                let iterator = Self::expect_object(rt, frame.get(iter))?;
                match rt.for_in_next(iterator)? {
                    Some(key) => frame.set(dst, key),
                    None => return Ok(InstructionResult::Jump(done.target(pc))),
                }
            }

            Instruction::GetAsyncIterator { dst, src } => {
                let record = rt.get_async_iterator(frame.get(src))?;
                frame.set(dst, Value::object(record));
            }
            Instruction::AsyncIteratorNext { dst, iter } => {
                let record = Self::expect_object(rt, frame.get(iter))?;
                let result = rt.async_iterator_next(record)?;
                frame.set(dst, result);
            }
            Instruction::AsyncIteratorComplete { dst, iter, done } => {
                let record = Self::expect_object(rt, frame.get(iter))?;
                match rt.async_iterator_complete(record, frame.get(dst))? {
                    Some(value) => frame.set(dst, value),
                    None => return Ok(InstructionResult::Jump(done.target(pc))),
                }
            }
            Instruction::AsyncIteratorReturn { dst, iter, skip } => {
                let record = Self::expect_object(rt, frame.get(iter))?;
                let suppress = matches!(frame.completions.last(), Some(ControlFlowRecord::Throw(_)));
                match rt.async_iterator_return(record, suppress)? {
                    Some(result) => frame.set(dst, result),
                    None => return Ok(InstructionResult::Jump(skip.target(pc))),
                }
            }

            // ==================== Generators ====================
            Instruction::GeneratorsInitialize => {
                if let Some((mode, value)) = frame.resume.take() {
                    return Self::resume(rt, frame, None, mode, value);
                }
                if block.is_generator() {
                    return Ok(InstructionResult::Suspend(SuspendKind::Initial, Value::undefined()));
                }
            }
            Instruction::Yield { dst, src } => {
                if let Some((mode, value)) = frame.resume.take() {
                    return Self::resume(rt, frame, Some(dst), mode, value);
                }
                return Ok(InstructionResult::Suspend(SuspendKind::Yield, frame.get(src)));
            }
            Instruction::YieldDelegate { dst, iter } => {
                let (mode, value) = frame.resume.take().unwrap_or((ResumeMode::Next, Value::undefined()));
                return Self::yield_delegate(rt, frame, dst, iter, mode, value);
            }
            Instruction::Await { dst, src } => {
                if let Some((mode, value)) = frame.resume.take() {
                    return Self::resume(rt, frame, Some(dst), mode, value);
                }
                return Ok(InstructionResult::Suspend(SuspendKind::Await, frame.get(src)));
            }

            // ==================== Classes ====================
            Instruction::CreateClass {
                dst,
                ctor,
                heritage,
                derived,
            } => {
                let constructor = Self::expect_object(rt, frame.get(ctor))?;
                let heritage = derived.then(|| frame.get(heritage));
                let prototype = rt.create_class(constructor, heritage)?;
                frame.set(dst, Value::object(prototype));
            }
            Instruction::DefineMethod { obj, key, func, kind } => {
                let object = Self::expect_object(rt, frame.get(obj))?;
                let key = rt.to_property_key(frame.get(key))?;
                let function = Self::expect_object(rt, frame.get(func))?;
                rt.define_method(object, key, function, kind)?;
            }
            Instruction::SetClassFields {
                class,
                func,
                keys,
                count,
            } => {
                let constructor = Self::expect_object(rt, frame.get(class))?;
                let initializer = Self::expect_object(rt, frame.get(func))?;
                let keys = frame.window(keys, count);
                rt.set_class_fields(constructor, ClassFields { initializer, keys });
            }
            Instruction::CheckThis { src } => {
                if frame.get(src).is_empty() {
                    return Err(uninitialized_this_error());
                }
            }
            Instruction::SuperCall { dst, args, argc } => {
                let args = frame.window(args, argc);
                Self::super_call(rt, frame, dst, args)?;
            }
            Instruction::SuperCallSpread { dst, array } => {
                let args = rt.array_to_list(frame.get(array))?;
                Self::super_call(rt, frame, dst, args)?;
            }
            Instruction::GetSuper { dst, key } => {
                let this = Self::bound_this(frame)?;
                let key = rt.to_property_key(frame.get(key))?;
                let value = match rt.super_base(frame.callee)? {
                    Some(base) => rt.get(base, &key, this)?,
                    None => {
                        return Err(VmError::type_error(format!(
                            "Cannot read properties of null (reading '{key}')"
                        )));
                    }
                };
                frame.set(dst, value);
            }
            Instruction::SetSuper { key, src, strict } => {
                let this = Self::bound_this(frame)?;
                let key = rt.to_property_key(frame.get(key))?;
                let Some(base) = rt.super_base(frame.callee)? else {
                    return Err(VmError::type_error(format!(
                        "Cannot set properties of null (setting '{key}')"
                    )));
                };
                if !rt.set(base, &key, frame.get(src), this)? && strict {
                    return Err(VmError::type_error(format!(
                        "Cannot assign to read only property '{key}' of object"
                    )));
                }
            }

            // ==================== Misc ====================
            Instruction::Debugger | Instruction::Nop => {}
        }
        Ok(InstructionResult::Continue)
    }

    // ==================== Helpers ====================

    fn expect_object(rt: &Runtime, value: Value) -> VmResult<GcRef> {
        value
            .as_object()
            .ok_or_else(|| VmError::type_error(format!("{} is not an object", rt.display_value(value))))
    }

    fn arithmetic(
        rt: &mut Runtime,
        frame: &mut Frame,
        dst: Register,
        a: Value,
        b: Value,
        op: fn(f64, f64) -> f64,
    ) -> VmResult<()> {
        let x = rt.to_number(a)?;
        let y = rt.to_number(b)?;
        frame.set(dst, Value::number(op(x, y)));
        Ok(())
    }

    fn bitwise(
        rt: &mut Runtime,
        frame: &mut Frame,
        dst: Register,
        lhs: Register,
        rhs: Register,
        op: fn(i32, i32) -> i32,
    ) -> VmResult<()> {
        let (a, b) = (frame.get(lhs), frame.get(rhs));
        let x = if a.is_int32() { a.as_int32() } else { f64_to_int32(rt.to_number(a)?) };
        let y = if b.is_int32() { b.as_int32() } else { f64_to_int32(rt.to_number(b)?) };
        frame.set(dst, Value::from_i32(op(x, y)));
        Ok(())
    }

    fn step(rt: &mut Runtime, frame: &mut Frame, dst: Register, src: Register, delta: i32) -> VmResult<()> {
        let value = frame.get(src);
        if value.is_int32()
            && let Some(n) = value.as_int32().checked_add(delta)
        {
            frame.set(dst, Value::from_i32(n));
            return Ok(());
        }
        let n = rt.to_number(value)?;
        frame.set(dst, Value::number(n + delta as f64));
        Ok(())
    }

    /// Call with the result going to `dst`, inline for script functions
    #[allow(clippy::too_many_arguments)]
    fn call(
        rt: &mut Runtime,
        frame: &mut Frame,
        dst: Register,
        callee: Value,
        this: Value,
        args: Vec<Value>,
        new_target: Option<GcRef>,
    ) -> VmResult<InstructionResult> {
        match rt.invoke(callee, this, args, new_target)? {
            crate::call::Invocation::Frame(mut callee) => {
                callee.return_register = Some(dst);
                Ok(InstructionResult::Call(callee))
            }
            crate::call::Invocation::Value(value) => {
                frame.set(dst, value);
                Ok(InstructionResult::Continue)
            }
        }
    }

    fn construct(
        rt: &mut Runtime,
        frame: &mut Frame,
        dst: Register,
        callee: Value,
        args: Vec<Value>,
    ) -> VmResult<InstructionResult> {
        let Some(target) = callee.as_object().filter(|_| rt.is_constructor(callee)) else {
            return Err(VmError::type_error(format!(
                "{} is not a constructor",
                rt.display_value(callee)
            )));
        };
        Self::call(rt, frame, dst, callee, Value::undefined(), args, Some(target))
    }

    /// `super(...args)`: construct the parent with this frame's `new.target`
    fn super_call(rt: &mut Runtime, frame: &mut Frame, dst: Register, args: Vec<Value>) -> VmResult<()> {
        let parent = rt.super_constructor(frame.callee)?;
        let Some(new_target) = frame.new_target else {
            return Err(VmError::syntax_error("'super' keyword unexpected here"));
        };
        let this = rt.construct(parent, &args, Some(new_target))?;
        if !frame.this_value().is_empty() {
            return Err(VmError::reference_error("Super constructor may only be called once"));
        }
        frame.set_this(this);
        if let Some(fields) = frame.callee.and_then(|callee| rt.class_fields(callee)) {
            rt.initialize_fields(this, &fields)?;
        }
        frame.set(dst, this);
        Ok(())
    }

    /// `this`, failing before `super()` in a derived constructor
    fn bound_this(frame: &Frame) -> VmResult<Value> {
        let this = frame.this_value();
        if this.is_empty() {
            return Err(uninitialized_this_error());
        }
        Ok(this)
    }

    /// Result of a `[[Construct]]` frame returning `value`
    fn construct_result(frame: &Frame, value: Value) -> VmResult<Value> {
        if !frame.is_constructor || value.is_object() {
            return Ok(value);
        }
        if !frame.block().flags.is_derived_constructor {
            return Ok(frame.this_value());
        }
        if !value.is_undefined() {
            return Err(VmError::type_error(
                "Derived constructors may only return object or undefined",
            ));
        }
        Self::bound_this(frame)
    }

    /// `eval(...)` in call position: direct eval when the callee is `%eval%`
    fn call_eval(
        rt: &mut Runtime,
        frame: &mut Frame,
        dst: Register,
        callee: Value,
        args: Vec<Value>,
        strict: bool,
    ) -> VmResult<InstructionResult> {
        if callee != Value::object(rt.intrinsics.eval) {
            return Self::call(rt, frame, dst, callee, Value::undefined(), args, None);
        }
        let argument = args.first().copied().unwrap_or_default();
        let Some(source) = rt.string_text(argument) else {
            frame.set(dst, argument);
            return Ok(InstructionResult::Continue);
        };
        let script = rt.compile_eval(&source, true, strict)?;
        let entry = script.entry;
        let id = rt.load_script(script);
        let code = rt.code_for(id, entry);
        let this = frame.this_value();
        let mut eval_frame = rt.new_frame(code, None, frame.env, this, Vec::new(), frame.new_target);
        eval_frame.is_constructor = false;
        eval_frame.is_eval = true;
        eval_frame.return_register = Some(dst);
        Ok(InstructionResult::Call(Box::new(eval_frame)))
    }

    /// One step of `yield*`: forward the resumption to the inner iterator
    fn yield_delegate(
        rt: &mut Runtime,
        frame: &mut Frame,
        dst: Register,
        iter: Register,
        mode: ResumeMode,
        value: Value,
    ) -> VmResult<InstructionResult> {
        let record = Self::expect_object(rt, frame.get(iter))?;
        let ObjectKind::IteratorRecord(inner) = *rt.object(record).kind() else {
            return Err(VmError::internal("yield* operand is not an iterator record"));
        };
        let result = match mode {
            ResumeMode::Next => rt.call(inner.next, inner.iterator, &[value])?,
            ResumeMode::Throw => {
                let method = rt.get_value(inner.iterator, &PropertyKey::from_name("throw"))?;
                if method.is_undefined_or_null() {
                    rt.iterator_close(record, false)?;
                    return Err(VmError::type_error("The iterator does not provide a 'throw' method"));
                }
                rt.call(method, inner.iterator, &[value])?
            }
            ResumeMode::Return => {
                let method = rt.get_value(inner.iterator, &PropertyKey::from_name("return"))?;
                if method.is_undefined_or_null() {
                    return Ok(Self::return_through_finally(frame, value));
                }
                rt.call(method, inner.iterator, &[value])?
            }
        };
        if !result.is_object() {
            return Err(VmError::type_error(format!(
                "Iterator result {} is not an object",
                rt.display_value(result)
            )));
        }
        let done = rt.get_value(result, &PropertyKey::from_name("done"))?;
        if !rt.to_boolean(done) {
            return Ok(InstructionResult::Suspend(SuspendKind::Delegate, result));
        }
        let value = rt.get_value(result, &PropertyKey::from_name("value"))?;
        if mode == ResumeMode::Return {
            return Ok(Self::return_through_finally(frame, value));
        }
        frame.set(dst, value);
        Ok(InstructionResult::Continue)
    }
}

/// `Number::exponentiate`
fn exponentiate(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

impl Runtime {
    /// `GlobalDeclarationInstantiation` for a script or sloppy indirect eval
    fn declare_globals(&mut self, block: &ByteCodeBlock, is_eval: bool) -> VmResult<()> {
        let declarations = &block.global_declarations;
        let global = self.global;
        for (name, _) in &declarations.lexicals {
            if self.global_lexicals.contains_key(&**name) {
                return Err(redeclaration_error(name));
            }
            if let Some((_, attributes)) = self.get_own_property(global, &PropertyKey::from_name(name))?
                && !attributes.configurable()
            {
                return Err(redeclaration_error(name));
            }
        }
        for name in declarations.vars.iter().chain(&declarations.functions) {
            if self.global_lexicals.contains_key(&**name) {
                return Err(redeclaration_error(name));
            }
        }

        let attributes = PropertyAttributes::data(true, true, is_eval);
        for name in &declarations.functions {
            let key = PropertyKey::from_name(name);
            match self.get_own_property(global, &key)? {
                Some((_, existing)) if !existing.configurable() => {}
                _ => {
                    self.define_own_property(global, key, PropertyDescriptor::data(Value::undefined(), attributes))?;
                }
            }
        }
        for name in &declarations.vars {
            let key = PropertyKey::from_name(name);
            if !self.has_own_property(global, &key)? {
                self.define_own_property(global, key, PropertyDescriptor::data(Value::undefined(), attributes))?;
            }
        }
        for (name, is_const) in &declarations.lexicals {
            self.global_lexicals.insert(
                Rc::from(&**name),
                GlobalLexical {
                    value: Value::empty(),
                    is_const: *is_const,
                },
            );
        }
        if !declarations.lexicals.is_empty() {
            self.lexical_epoch += 1;
        }
        Ok(())
    }

    /// Closure for child function `func` of the running code
    fn instantiate_function(&mut self, frame: &Frame, func: FunctionIndex) -> GcRef {
        let script_id = self.code_block(frame.code).script_id;
        let code = self.code_for(script_id, func.index());
        let (name, length, flags) = {
            let block = self.code_block(code).block();
            (block.name.clone().unwrap_or_default(), block.length, block.flags)
        };
        let (this_value, new_target, home_object) = if flags.is_arrow {
            let home = frame.callee.and_then(|callee| self.home_object(callee));
            (Some(frame.this_value()), frame.new_target, home)
        } else {
            (None, None, None)
        };
        let proto = self.intrinsics.function_prototype;
        let function = self.new_object_with(
            Some(proto),
            ObjectKind::Function(Box::new(FunctionData {
                name: Rc::from(name.as_str()),
                is_constructor: flags.is_constructor(),
                kind: FunctionKind::Script {
                    code,
                    env: frame.env,
                    this_value,
                    new_target,
                    home_object,
                    fields: None,
                },
            })),
        );
        self.define_function_name_and_length(function, &name, length as u32);

        if flags.is_generator {
            let generator_proto = if flags.is_async {
                self.intrinsics.async_generator_prototype
            } else {
                self.intrinsics.generator_prototype
            };
            let prototype = self.new_object_with(Some(generator_proto), ObjectKind::Ordinary);
            self.define_data(function, "prototype", Value::object(prototype), PropertyAttributes::data(true, false, false));
        } else if flags.is_constructor() && !flags.is_class_constructor {
            let prototype = self.new_object();
            self.define_data(prototype, "constructor", Value::object(function), PropertyAttributes::HIDDEN);
            self.define_data(function, "prototype", Value::object(prototype), PropertyAttributes::data(true, false, false));
        }
        function
    }

    /// `arguments` for the running frame, mapped for sloppy simple parameter lists
    fn create_arguments_object(&mut self, frame: &Frame, block: &ByteCodeBlock) -> GcRef {
        let mapped = !block.is_strict() && block.flags.simple_parameters;
        let mut data = ArgumentsData::default();
        if mapped
            && let (Some(env), Some(layout)) = (frame.env, block.function_environment)
            && let Some(layout) = block.environment_layouts.get(layout as usize)
        {
            data.env = Some(env);
            data.mapped = (0..frame.arguments.len())
                .map(|i| {
                    layout
                        .slots
                        .iter()
                        .rposition(|slot| slot.kind == BindingKind::Parameter(i as u16))
                        .map(|slot| slot as u16)
                })
                .collect();
        }

        let proto = self.intrinsics.object_prototype;
        let arguments = self.new_object_with(Some(proto), ObjectKind::Arguments(data));
        self.object_mut(arguments).elements = Elements::Dense(frame.arguments.clone());
        let length = Value::number(frame.arguments.len() as f64);
        self.define_data(arguments, "length", length, PropertyAttributes::HIDDEN);
        let values = Value::object(self.intrinsics.array_values);
        let iterator = self.intrinsics.symbol_iterator;
        self.define_data(arguments, PropertyKey::Symbol(iterator), values, PropertyAttributes::HIDDEN);
        if !block.is_strict()
            && let Some(callee) = frame.callee
        {
            self.define_data(arguments, "callee", Value::object(callee), PropertyAttributes::HIDDEN);
        }
        arguments
    }

    /// `CopyDataProperties(target, source, excluded)`
    pub fn copy_data_properties(&mut self, target: GcRef, source: Value, excluded: &[PropertyKey]) -> VmResult<()> {
        if source.is_undefined_or_null() {
            return Ok(());
        }
        let from = self.to_object(source)?;
        for key in self.own_property_keys(from)? {
            if excluded.contains(&key) {
                continue;
            }
            let Some((_, attributes)) = self.get_own_property(from, &key)? else {
                continue;
            };
            if !attributes.enumerable() {
                continue;
            }
            let value = self.get(from, &key, Value::object(from))?;
            self.define_own_property(target, key, PropertyDescriptor::data(value, PropertyAttributes::DEFAULT))?;
        }
        Ok(())
    }
}

fn redeclaration_error(name: &str) -> VmError {
    VmError::syntax_error(format!("Identifier '{name}' has already been declared"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> Value {
        let mut rt = Runtime::new();
        rt.evaluate(source, "test.js").unwrap()
    }

    fn eval_number(source: &str) -> f64 {
        eval(source).as_number()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval_number("1 + 2 * 3"), 7.0);
        assert_eq!(eval_number("7 % 4"), 3.0);
        assert_eq!(eval_number("2 ** 10"), 1024.0);
        assert!(eval_number("1 ** Infinity").is_nan());
        assert_eq!(eval_number("-1 >>> 28"), 15.0);
        assert_eq!(eval_number("1 << 33"), 2.0);
    }

    #[test]
    fn test_int32_overflow_becomes_double() {
        assert_eq!(eval_number("2147483647 + 1"), 2147483648.0);
        assert_eq!(eval_number("var x = -2147483648; x - 1"), -2147483649.0);
    }

    #[test]
    fn test_comparison_with_nan() {
        assert_eq!(eval("NaN < 1"), Value::from_bool(false));
        assert_eq!(eval("NaN >= 1"), Value::from_bool(false));
        assert_eq!(eval("undefined <= 0"), Value::from_bool(false));
        assert_eq!(eval("null >= 0"), Value::from_bool(true));
    }

    #[test]
    fn test_nested_calls() {
        let source = "function add(a, b) { return a + b; }\nfunction twice(x) { return add(x, x); }\ntwice(21)";
        assert_eq!(eval_number(source), 42.0);
    }

    #[test]
    fn test_constructor_keeps_returned_object() {
        let source = "function F() { this.a = 1; return { a: 2 }; }\nfunction G() { this.a = 3; return 4; }\nnew F().a * 10 + new G().a";
        assert_eq!(eval_number(source), 23.0);
    }

    #[test]
    fn test_exception_unwinds_through_frames() {
        let source = "function f() { throw 7; }\nfunction g() { f(); }\nvar r; try { g(); } catch (e) { r = e; } r";
        assert_eq!(eval_number(source), 7.0);
    }

    #[test]
    fn test_engine_error_is_catchable() {
        let source = "var r; try { null.x; } catch (e) { r = e instanceof TypeError; } r";
        assert_eq!(eval(source), Value::from_bool(true));
    }

    #[test]
    fn test_break_through_finally() {
        let source = "var n = 0; for (var i = 0; i < 3; i++) { try { if (i == 1) break; } finally { n++; } } n";
        assert_eq!(eval_number(source), 2.0);
    }

    #[test]
    fn test_for_in_skips_deleted_keys() {
        let source = "var o = {a: 1, b: 2, c: 3}; var s = ''; for (var k in o) { delete o.b; s += k; } s";
        let mut rt = Runtime::new();
        let value = rt.evaluate(source, "test.js").unwrap();
        assert_eq!(rt.string_text(value).as_deref(), Some("ac"));
    }

    #[test]
    fn test_deep_recursion_is_range_error() {
        let mut rt = Runtime::new();
        let source = "function f() { return f(); }\nvar r; try { f(); } catch (e) { r = e instanceof RangeError; } r";
        assert_eq!(rt.evaluate(source, "test.js").unwrap(), Value::from_bool(true));
        assert!(rt.state.is_empty());
    }

    #[test]
    fn test_exponentiate() {
        assert!(exponentiate(-1.0, f64::INFINITY).is_nan());
        assert_eq!(exponentiate(2.0, -1.0), 0.5);
    }

    #[test]
    fn test_redeclared_global_lexical() {
        let mut rt = Runtime::new();
        rt.evaluate("let x = 1;", "a.js").unwrap();
        let err = rt.evaluate("let x = 2;", "b.js").unwrap_err();
        assert!(matches!(err, VmError::Exception(_)) || matches!(err, VmError::SyntaxError(_)));
    }
}
