//! `%GeneratorPrototype%`, `%AsyncGeneratorPrototype%` and `%AsyncIteratorPrototype%`

use skua_vm_gc::GcRef;

use super::{arg, define_symbol_method};
use crate::error::{VmError, VmResult};
use crate::frame::ResumeMode;
use crate::pauser::ExecutionPauser;
use crate::runtime::Runtime;
use crate::value::Value;

pub(super) fn init(rt: &mut Runtime) {
    let proto = rt.intrinsics.generator_prototype;
    rt.define_native_function(proto, "next", 1, next);
    rt.define_native_function(proto, "return", 1, return_);
    rt.define_native_function(proto, "throw", 1, throw);

    let async_iterator = rt.intrinsics.async_iterator_prototype;
    let symbol = rt.intrinsics.symbol_async_iterator;
    define_symbol_method(rt, async_iterator, symbol, "[Symbol.asyncIterator]", async_iterator_method);

    let async_proto = rt.intrinsics.async_generator_prototype;
    rt.define_native_function(async_proto, "next", 1, async_next);
    rt.define_native_function(async_proto, "return", 1, async_return);
    rt.define_native_function(async_proto, "throw", 1, async_throw);
}

fn resume(rt: &mut Runtime, this: Value, mode: ResumeMode, value: Value) -> VmResult<Value> {
    let Some(generator) = this.as_object() else {
        return Err(VmError::type_error(format!(
            "Generator method called on incompatible receiver {}",
            rt.display_value(this)
        )));
    };
    ExecutionPauser::resume_generator(rt, generator, mode, value)
}

fn next(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    resume(rt, this, ResumeMode::Next, arg(args, 0))
}

fn return_(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    resume(rt, this, ResumeMode::Return, arg(args, 0))
}

fn throw(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    resume(rt, this, ResumeMode::Throw, arg(args, 0))
}

fn async_iterator_method(_rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    Ok(this)
}

fn async_next(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    ExecutionPauser::async_generator_enqueue(rt, this, ResumeMode::Next, arg(args, 0))
}

fn async_return(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    ExecutionPauser::async_generator_enqueue(rt, this, ResumeMode::Return, arg(args, 0))
}

fn async_throw(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    ExecutionPauser::async_generator_enqueue(rt, this, ResumeMode::Throw, arg(args, 0))
}
