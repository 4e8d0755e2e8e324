//! ExecutionPauser
//!
//! Generators and async functions pause by handing their whole [`Frame`]
//! back from the interpreter. The frame is parked in the generator (or async
//! continuation) heap object and restored on resume, with the resumption
//! injected through [`Frame::resume`] so the suspension point can act on it.
//!
//! Async generators combine both: calls to `next`/`throw`/`return` queue a
//! request with its own promise, and the frame is driven through `yield` and
//! `await` suspensions until the queue is empty.

use std::collections::VecDeque;

use skua_vm_gc::{GcRef, Trace};

use crate::error::{VmError, VmResult};
use crate::frame::{Frame, ResumeMode};
use crate::interpreter::{Completion, Interpreter, SuspendKind};
use crate::object::ObjectKind;
use crate::promise::ReactionHandler;
use crate::property::PropertyKey;
use crate::runtime::Runtime;
use crate::value::Value;

/// Generator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Created; the body has not started
    SuspendedStart,
    /// Paused at a `yield`
    SuspendedYield,
    /// Running
    Executing,
    /// Returned or threw
    Completed,
}

/// Generator instance state
#[derive(Debug)]
pub struct GeneratorData {
    /// Lifecycle state
    pub state: GeneratorState,
    /// Parked frame while suspended
    pub(crate) frame: Option<Box<Frame>>,
}

impl Trace for GeneratorData {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        if let Some(frame) = &self.frame {
            frame.trace(tracer);
        }
    }
}

/// Continuation of an async function awaiting a value
#[derive(Debug)]
pub struct AsyncFunctionData {
    /// Parked frame while awaiting
    pub(crate) frame: Option<Box<Frame>>,
    /// Promise returned to the caller
    pub promise: GcRef,
}

impl Trace for AsyncFunctionData {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        if let Some(frame) = &self.frame {
            frame.trace(tracer);
        }
        tracer(self.promise);
    }
}

/// Async generator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncGeneratorState {
    /// Created; the body has not started
    SuspendedStart,
    /// Paused at a `yield`
    SuspendedYield,
    /// Running or paused at an `await`
    Executing,
    /// Completed, awaiting the operand of a queued `return`
    AwaitingReturn,
    /// Returned or threw
    Completed,
}

/// A queued `next`/`throw`/`return` call
#[derive(Debug, Clone, Copy)]
pub struct AsyncGeneratorRequest {
    /// How the body is resumed
    pub mode: ResumeMode,
    /// Argument of the call
    pub value: Value,
    /// Promise returned by the call
    pub promise: GcRef,
}

/// Async generator instance state
#[derive(Debug)]
pub struct AsyncGeneratorData {
    /// Lifecycle state
    pub state: AsyncGeneratorState,
    /// Parked frame while suspended
    pub(crate) frame: Option<Box<Frame>>,
    /// Pending requests, oldest first
    pub(crate) queue: VecDeque<AsyncGeneratorRequest>,
}

impl Trace for AsyncGeneratorData {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        if let Some(frame) = &self.frame {
            frame.trace(tracer);
        }
        for request in &self.queue {
            request.value.trace(tracer);
            tracer(request.promise);
        }
    }
}

/// Suspension and resumption of generator and async frames
#[derive(Debug)]
pub struct ExecutionPauser;

impl ExecutionPauser {
    /// Run a generator call up to `GeneratorsInitialize` and wrap the frame
    pub(crate) fn start_generator(rt: &mut Runtime, function: GcRef, frame: Box<Frame>) -> VmResult<Value> {
        let frame = Self::run_to_initial(rt, frame)?;
        let fallback = rt.intrinsics.generator_prototype;
        let proto = Self::instance_prototype(rt, function, fallback)?;
        let generator = rt.new_object_with(
            Some(proto),
            ObjectKind::Generator(Box::new(GeneratorData {
                state: GeneratorState::SuspendedStart,
                frame: Some(frame),
            })),
        );
        tracing::trace!(target: "skua::pauser", ?generator, "generator created");
        Ok(Value::object(generator))
    }

    fn run_to_initial(rt: &mut Runtime, frame: Box<Frame>) -> VmResult<Box<Frame>> {
        match Interpreter::interpret(rt, frame)? {
            Completion::Suspend {
                kind: SuspendKind::Initial,
                frame,
                ..
            } => Ok(frame),
            _ => Err(VmError::internal("generator did not stop at its initial suspension")),
        }
    }

    /// `OrdinaryCreateFromConstructor(function, fallback)` for generator instances
    fn instance_prototype(rt: &mut Runtime, function: GcRef, fallback: GcRef) -> VmResult<GcRef> {
        let proto = rt.get(function, &PropertyKey::from_name("prototype"), Value::object(function))?;
        Ok(proto.as_object().unwrap_or(fallback))
    }

    /// `GeneratorResume` / `GeneratorResumeAbrupt`; returns the iterator result
    pub fn resume_generator(rt: &mut Runtime, generator: GcRef, mode: ResumeMode, value: Value) -> VmResult<Value> {
        let (state, frame) = match rt.object_mut(generator).kind_mut() {
            ObjectKind::Generator(data) => (data.state, data.frame.take()),
            _ => {
                return Err(VmError::type_error(
                    "Generator method called on incompatible receiver",
                ));
            }
        };
        match state {
            GeneratorState::Executing => return Err(VmError::type_error("Generator is already running")),
            GeneratorState::Completed => return Self::completed_result(rt, mode, value),
            GeneratorState::SuspendedStart if mode != ResumeMode::Next => {
                Self::set_generator(rt, generator, GeneratorState::Completed, None);
                return Self::completed_result(rt, mode, value);
            }
            GeneratorState::SuspendedStart | GeneratorState::SuspendedYield => {}
        }
        let Some(mut frame) = frame else {
            return Err(VmError::internal("suspended generator without a frame"));
        };

        frame.resume = Some((mode, value));
        Self::set_generator(rt, generator, GeneratorState::Executing, None);
        tracing::trace!(target: "skua::pauser", ?generator, ?mode, "generator resumed");
        match Interpreter::interpret(rt, frame) {
            Ok(Completion::Return(result)) => {
                Self::set_generator(rt, generator, GeneratorState::Completed, None);
                Ok(rt.iter_result(result, true))
            }
            Ok(Completion::Suspend {
                kind: SuspendKind::Yield,
                value,
                frame,
            }) => {
                Self::set_generator(rt, generator, GeneratorState::SuspendedYield, Some(frame));
                Ok(rt.iter_result(value, false))
            }
            Ok(Completion::Suspend {
                kind: SuspendKind::Delegate,
                value,
                frame,
            }) => {
                Self::set_generator(rt, generator, GeneratorState::SuspendedYield, Some(frame));
                Ok(value)
            }
            Ok(Completion::Suspend { kind, .. }) => {
                Self::set_generator(rt, generator, GeneratorState::Completed, None);
                Err(VmError::internal(format!("unexpected {kind:?} suspension in a generator")))
            }
            Err(err) => {
                Self::set_generator(rt, generator, GeneratorState::Completed, None);
                Err(err)
            }
        }
    }

    fn completed_result(rt: &mut Runtime, mode: ResumeMode, value: Value) -> VmResult<Value> {
        match mode {
            ResumeMode::Next => Ok(rt.iter_result(Value::undefined(), true)),
            ResumeMode::Return => Ok(rt.iter_result(value, true)),
            ResumeMode::Throw => Err(rt.throw_value(value)),
        }
    }

    fn set_generator(rt: &mut Runtime, generator: GcRef, state: GeneratorState, frame: Option<Box<Frame>>) {
        if let ObjectKind::Generator(data) = rt.object_mut(generator).kind_mut() {
            data.state = state;
            data.frame = frame;
        }
    }

    /// Start an async function call; returns its promise
    pub(crate) fn start_async(rt: &mut Runtime, frame: Box<Frame>) -> VmResult<Value> {
        let promise = rt.new_promise();
        let continuation = rt.new_object_with(
            None,
            ObjectKind::AsyncFunction(Box::new(AsyncFunctionData {
                frame: Some(frame),
                promise,
            })),
        );
        Self::resume_async(rt, continuation, ResumeMode::Next, Value::undefined())?;
        Ok(Value::object(promise))
    }

    /// Run an async function until its next `await` or its end
    ///
    /// Async generators awaiting a value are resumed through here as well.
    pub(crate) fn resume_async(rt: &mut Runtime, continuation: GcRef, mode: ResumeMode, value: Value) -> VmResult<()> {
        if matches!(rt.object(continuation).kind(), ObjectKind::AsyncGenerator(_)) {
            return Self::resume_async_generator(rt, continuation, mode, value);
        }
        let (frame, promise) = match rt.object_mut(continuation).kind_mut() {
            ObjectKind::AsyncFunction(data) => (data.frame.take(), data.promise),
            _ => return Err(VmError::internal("expected an async function continuation")),
        };
        let Some(mut frame) = frame else {
            return Err(VmError::internal("async function resumed while running"));
        };
        frame.resume = Some((mode, value));

        match Interpreter::interpret(rt, frame) {
            Ok(Completion::Return(result)) => rt.resolve_promise(promise, result),
            Ok(Completion::Suspend {
                kind: SuspendKind::Await,
                value,
                frame,
            }) => {
                if let ObjectKind::AsyncFunction(data) = rt.object_mut(continuation).kind_mut() {
                    data.frame = Some(frame);
                }
                Self::await_value(rt, continuation, value)
            }
            Ok(Completion::Suspend { kind, .. }) => Err(VmError::internal(format!(
                "unexpected {kind:?} suspension in an async function"
            ))),
            Err(err) if err.is_catchable() => {
                let reason = rt.materialize_error(&err);
                rt.reject_promise(promise, reason);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Subscribe the continuation to the settlement of `value`
    fn await_value(rt: &mut Runtime, continuation: GcRef, value: Value) -> VmResult<()> {
        let promise = match rt.promise_resolve(value) {
            Ok(promise) => promise,
            Err(err) if err.is_catchable() => {
                let promise = rt.new_promise();
                let reason = rt.materialize_error(&err);
                rt.reject_promise(promise, reason);
                promise
            }
            Err(err) => return Err(err),
        };
        let handler = ReactionHandler::AsyncResume(continuation);
        rt.perform_then(promise, handler, handler, None);
        Ok(())
    }

    // ==================== Async generators ====================

    /// Run an async generator call up to `GeneratorsInitialize` and wrap the frame
    pub(crate) fn start_async_generator(rt: &mut Runtime, function: GcRef, frame: Box<Frame>) -> VmResult<Value> {
        let frame = Self::run_to_initial(rt, frame)?;
        let fallback = rt.intrinsics.async_generator_prototype;
        let proto = Self::instance_prototype(rt, function, fallback)?;
        let generator = rt.new_object_with(
            Some(proto),
            ObjectKind::AsyncGenerator(Box::new(AsyncGeneratorData {
                state: AsyncGeneratorState::SuspendedStart,
                frame: Some(frame),
                queue: VecDeque::new(),
            })),
        );
        tracing::trace!(target: "skua::pauser", ?generator, "async generator created");
        Ok(Value::object(generator))
    }

    /// `AsyncGeneratorEnqueue`; returns the promise for the request
    ///
    /// An incompatible receiver rejects the promise instead of throwing.
    pub fn async_generator_enqueue(rt: &mut Runtime, this: Value, mode: ResumeMode, value: Value) -> VmResult<Value> {
        let promise = rt.new_promise();
        let request = AsyncGeneratorRequest { mode, value, promise };
        let generator = this
            .as_object()
            .filter(|g| matches!(rt.object(*g).kind(), ObjectKind::AsyncGenerator(_)));
        let Some(generator) = generator else {
            let error = VmError::type_error(format!(
                "AsyncGenerator method called on incompatible receiver {}",
                rt.display_value(this)
            ));
            let reason = rt.materialize_error(&error);
            rt.reject_promise(promise, reason);
            return Ok(Value::object(promise));
        };
        let idle = match rt.object_mut(generator).kind_mut() {
            ObjectKind::AsyncGenerator(data) => {
                data.queue.push_back(request);
                !matches!(
                    data.state,
                    AsyncGeneratorState::Executing | AsyncGeneratorState::AwaitingReturn
                )
            }
            _ => false,
        };
        if idle {
            Self::drain_async_generator(rt, generator)?;
        }
        Ok(Value::object(promise))
    }

    /// Serve queued requests until the queue is empty or the body awaits
    fn drain_async_generator(rt: &mut Runtime, generator: GcRef) -> VmResult<()> {
        loop {
            let (state, request) = match rt.object(generator).kind() {
                ObjectKind::AsyncGenerator(data) => (data.state, data.queue.front().copied()),
                _ => return Err(VmError::internal("expected an async generator")),
            };
            let Some(request) = request else {
                return Ok(());
            };
            match state {
                AsyncGeneratorState::Executing | AsyncGeneratorState::AwaitingReturn => return Ok(()),
                AsyncGeneratorState::SuspendedStart if request.mode != ResumeMode::Next => {
                    Self::set_async_generator(rt, generator, AsyncGeneratorState::Completed, None);
                }
                AsyncGeneratorState::Completed => match request.mode {
                    ResumeMode::Next => Self::settle_request(rt, generator, Ok((Value::undefined(), true)))?,
                    ResumeMode::Throw => Self::settle_request(rt, generator, Err(request.value))?,
                    ResumeMode::Return => {
                        Self::set_async_generator(rt, generator, AsyncGeneratorState::AwaitingReturn, None);
                        return Self::await_value(rt, generator, request.value);
                    }
                },
                AsyncGeneratorState::SuspendedStart | AsyncGeneratorState::SuspendedYield => {
                    let frame = match rt.object_mut(generator).kind_mut() {
                        ObjectKind::AsyncGenerator(data) => data.frame.take(),
                        _ => None,
                    };
                    let Some(mut frame) = frame else {
                        return Err(VmError::internal("suspended async generator without a frame"));
                    };
                    frame.resume = Some((request.mode, request.value));
                    Self::set_async_generator(rt, generator, AsyncGeneratorState::Executing, None);
                    tracing::trace!(target: "skua::pauser", ?generator, mode = ?request.mode, "async generator resumed");
                    Self::run_async_generator(rt, generator, frame)?;
                }
            }
        }
    }

    /// Settlement of an `await` inside the body, or of a queued `return` operand
    fn resume_async_generator(rt: &mut Runtime, generator: GcRef, mode: ResumeMode, value: Value) -> VmResult<()> {
        let (state, frame) = match rt.object_mut(generator).kind_mut() {
            ObjectKind::AsyncGenerator(data) => (data.state, data.frame.take()),
            _ => return Err(VmError::internal("expected an async generator")),
        };
        if state == AsyncGeneratorState::AwaitingReturn {
            Self::set_async_generator(rt, generator, AsyncGeneratorState::Completed, None);
            let outcome = match mode {
                ResumeMode::Throw => Err(value),
                ResumeMode::Next | ResumeMode::Return => Ok((value, true)),
            };
            Self::settle_request(rt, generator, outcome)?;
        } else {
            let Some(mut frame) = frame else {
                return Err(VmError::internal("async generator resumed while running"));
            };
            frame.resume = Some((mode, value));
            Self::run_async_generator(rt, generator, frame)?;
        }
        Self::drain_async_generator(rt, generator)
    }

    /// Run the body until it yields, awaits, returns or throws
    fn run_async_generator(rt: &mut Runtime, generator: GcRef, frame: Box<Frame>) -> VmResult<()> {
        match Interpreter::interpret(rt, frame) {
            Ok(Completion::Return(result)) => {
                Self::set_async_generator(rt, generator, AsyncGeneratorState::Completed, None);
                Self::settle_request(rt, generator, Ok((result, true)))
            }
            Ok(Completion::Suspend {
                kind: SuspendKind::Yield,
                value,
                frame,
            }) => {
                Self::set_async_generator(rt, generator, AsyncGeneratorState::SuspendedYield, Some(frame));
                Self::settle_request(rt, generator, Ok((value, false)))
            }
            Ok(Completion::Suspend {
                kind: SuspendKind::Await,
                value,
                frame,
            }) => {
                Self::set_async_generator(rt, generator, AsyncGeneratorState::Executing, Some(frame));
                Self::await_value(rt, generator, value)
            }
            Ok(Completion::Suspend { kind, .. }) => {
                Self::set_async_generator(rt, generator, AsyncGeneratorState::Completed, None);
                Err(VmError::internal(format!("unexpected {kind:?} suspension in an async generator")))
            }
            Err(err) if err.is_catchable() => {
                Self::set_async_generator(rt, generator, AsyncGeneratorState::Completed, None);
                let reason = rt.materialize_error(&err);
                Self::settle_request(rt, generator, Err(reason))
            }
            Err(err) => Err(err),
        }
    }

    /// Pop the oldest request and settle its promise
    fn settle_request(rt: &mut Runtime, generator: GcRef, outcome: Result<(Value, bool), Value>) -> VmResult<()> {
        let request = match rt.object_mut(generator).kind_mut() {
            ObjectKind::AsyncGenerator(data) => data.queue.pop_front(),
            _ => None,
        };
        let Some(request) = request else {
            return Err(VmError::internal("async generator settled without a pending request"));
        };
        match outcome {
            Ok((value, done)) => {
                let result = rt.iter_result(value, done);
                rt.resolve_promise(request.promise, result)
            }
            Err(reason) => {
                rt.reject_promise(request.promise, reason);
                Ok(())
            }
        }
    }

    fn set_async_generator(rt: &mut Runtime, generator: GcRef, state: AsyncGeneratorState, frame: Option<Box<Frame>>) {
        if let ObjectKind::AsyncGenerator(data) = rt.object_mut(generator).kind_mut() {
            data.state = state;
            data.frame = frame;
        }
    }
}
