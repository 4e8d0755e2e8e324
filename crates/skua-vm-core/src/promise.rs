//! Promises and the job queue
//!
//! Settling a promise queues one [`Job`] per registered reaction;
//! [`Runtime::run_jobs`] drains the queue in FIFO order. Async function
//! continuations subscribe with [`ReactionHandler::AsyncResume`] instead of
//! allocating resolver functions.

use std::cell::Cell;
use std::rc::Rc;

use skua_vm_gc::{GcRef, Trace};

use crate::error::{VmError, VmResult};
use crate::frame::ResumeMode;
use crate::function::{FunctionData, FunctionKind};
use crate::object::ObjectKind;
use crate::pauser::ExecutionPauser;
use crate::property::PropertyKey;
use crate::runtime::Runtime;
use crate::value::Value;

/// Promise state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PromiseState {
    /// Not yet settled
    Pending,
    /// Resolved with value
    Fulfilled(Value),
    /// Rejected with reason
    Rejected(Value),
}

impl PromiseState {
    /// Check if settled (fulfilled or rejected)
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// What runs when a promise settles
#[derive(Debug, Clone, Copy)]
pub enum ReactionHandler {
    /// Script callback; non-callables pass the settlement through
    Callback(Value),
    /// Resume a suspended async function or async generator
    AsyncResume(GcRef),
    /// Wrap the fulfillment value into an iterator result
    IterResult {
        /// `done` of the result
        done: bool,
    },
}

/// A registered `then` reaction
#[derive(Debug, Clone, Copy)]
pub struct Reaction {
    /// Promise settled with the handler's outcome
    pub derived: Option<GcRef>,
    /// Handler
    pub handler: ReactionHandler,
}

/// Promise instance state
#[derive(Debug)]
pub struct PromiseData {
    /// Settlement
    pub state: PromiseState,
    fulfill_reactions: Vec<Reaction>,
    reject_reactions: Vec<Reaction>,
    handled: bool,
}

impl PromiseData {
    fn new() -> Self {
        Self {
            state: PromiseState::Pending,
            fulfill_reactions: Vec::new(),
            reject_reactions: Vec::new(),
            handled: false,
        }
    }
}

impl Trace for Reaction {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        self.derived.trace(tracer);
        match self.handler {
            ReactionHandler::Callback(value) => value.trace(tracer),
            ReactionHandler::AsyncResume(continuation) => tracer(continuation),
            ReactionHandler::IterResult { .. } => {}
        }
    }
}

impl Trace for PromiseData {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        match self.state {
            PromiseState::Fulfilled(v) | PromiseState::Rejected(v) => v.trace(tracer),
            PromiseState::Pending => {}
        }
        self.fulfill_reactions.iter().for_each(|r| r.trace(tracer));
        self.reject_reactions.iter().for_each(|r| r.trace(tracer));
    }
}

/// A queued microtask
#[derive(Debug, Clone, Copy)]
pub enum Job {
    /// `NewPromiseReactionJob`
    Reaction {
        /// Reaction to run
        reaction: Reaction,
        /// Settlement value
        argument: Value,
        /// The promise was rejected
        rejected: bool,
    },
    /// `NewPromiseResolveThenableJob`
    ResolveThenable {
        /// Promise being resolved
        promise: GcRef,
        /// Thenable it was resolved with
        thenable: Value,
        /// Its `then` method
        then: Value,
    },
}

impl Trace for Job {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        match self {
            Self::Reaction { reaction, argument, .. } => {
                reaction.trace(tracer);
                argument.trace(tracer);
            }
            Self::ResolveThenable {
                promise,
                thenable,
                then,
            } => {
                tracer(*promise);
                thenable.trace(tracer);
                then.trace(tracer);
            }
        }
    }
}

impl Runtime {
    /// New pending promise with `%Promise.prototype%`
    pub fn new_promise(&mut self) -> GcRef {
        let proto = self.intrinsics.promise_prototype;
        self.new_promise_with(proto)
    }

    pub(crate) fn new_promise_with(&mut self, proto: GcRef) -> GcRef {
        self.new_object_with(Some(proto), ObjectKind::Promise(Box::new(PromiseData::new())))
    }

    /// Settlement of a promise object, `None` for non-promises
    pub fn promise_state(&self, promise: GcRef) -> Option<PromiseState> {
        match self.object(promise).kind() {
            ObjectKind::Promise(data) => Some(data.state),
            _ => None,
        }
    }

    fn promise_data_mut(&mut self, promise: GcRef) -> Option<&mut PromiseData> {
        match self.object_mut(promise).kind_mut() {
            ObjectKind::Promise(data) => Some(data),
            _ => None,
        }
    }

    /// `CreateResolvingFunctions`: `(resolve, reject)` sharing one already-resolved flag
    pub fn create_resolving_functions(&mut self, promise: GcRef) -> (Value, Value) {
        let already_resolved = Rc::new(Cell::new(false));
        let resolve = self.resolver_function(promise, false, Rc::clone(&already_resolved));
        let reject = self.resolver_function(promise, true, already_resolved);
        (Value::object(resolve), Value::object(reject))
    }

    fn resolver_function(&mut self, promise: GcRef, reject: bool, already_resolved: Rc<Cell<bool>>) -> GcRef {
        let proto = self.intrinsics.function_prototype;
        let function = self.new_object_with(
            Some(proto),
            ObjectKind::Function(Box::new(FunctionData {
                name: "".into(),
                is_constructor: false,
                kind: FunctionKind::PromiseResolver {
                    promise,
                    reject,
                    already_resolved,
                },
            })),
        );
        self.define_function_name_and_length(function, "", 1);
        function
    }

    /// Promise resolve function: adopt thenables, fulfill with anything else
    pub fn resolve_promise(&mut self, promise: GcRef, resolution: Value) -> VmResult<()> {
        if resolution == Value::object(promise) {
            let reason = self.new_error("TypeError", "Chaining cycle detected for promise");
            self.reject_promise(promise, Value::object(reason));
            return Ok(());
        }
        if !resolution.is_object() {
            self.settle_promise(promise, PromiseState::Fulfilled(resolution));
            return Ok(());
        }
        let then = match self.get_value(resolution, &PropertyKey::from_name("then")) {
            Ok(then) => then,
            Err(err) if err.is_catchable() => {
                let reason = self.materialize_error(&err);
                self.reject_promise(promise, reason);
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if !self.is_callable(then) {
            self.settle_promise(promise, PromiseState::Fulfilled(resolution));
            return Ok(());
        }
        self.jobs.push_back(Job::ResolveThenable {
            promise,
            thenable: resolution,
            then,
        });
        Ok(())
    }

    /// Promise reject function
    pub fn reject_promise(&mut self, promise: GcRef, reason: Value) {
        let unhandled = self
            .promise_data_mut(promise)
            .is_some_and(|data| !data.handled && !data.state.is_settled());
        self.settle_promise(promise, PromiseState::Rejected(reason));
        if unhandled {
            tracing::debug!(
                target: "skua::promise",
                reason = %self.describe_thrown(reason),
                "promise rejected without a handler"
            );
        }
    }

    fn settle_promise(&mut self, promise: GcRef, state: PromiseState) {
        let Some(data) = self.promise_data_mut(promise) else {
            return;
        };
        if data.state.is_settled() {
            return;
        }
        data.state = state;
        let fulfill = std::mem::take(&mut data.fulfill_reactions);
        let reject = std::mem::take(&mut data.reject_reactions);
        let (reactions, argument, rejected) = match state {
            PromiseState::Fulfilled(value) => (fulfill, value, false),
            PromiseState::Rejected(reason) => (reject, reason, true),
            PromiseState::Pending => return,
        };
        for reaction in reactions {
            self.jobs.push_back(Job::Reaction {
                reaction,
                argument,
                rejected,
            });
        }
    }

    /// `PerformPromiseThen`
    pub(crate) fn perform_then(
        &mut self,
        promise: GcRef,
        on_fulfilled: ReactionHandler,
        on_rejected: ReactionHandler,
        derived: Option<GcRef>,
    ) {
        let fulfill = Reaction {
            derived,
            handler: on_fulfilled,
        };
        let reject = Reaction {
            derived,
            handler: on_rejected,
        };
        let Some(data) = self.promise_data_mut(promise) else {
            return;
        };
        data.handled = true;
        match data.state {
            PromiseState::Pending => {
                data.fulfill_reactions.push(fulfill);
                data.reject_reactions.push(reject);
            }
            PromiseState::Fulfilled(argument) => self.jobs.push_back(Job::Reaction {
                reaction: fulfill,
                argument,
                rejected: false,
            }),
            PromiseState::Rejected(argument) => self.jobs.push_back(Job::Reaction {
                reaction: reject,
                argument,
                rejected: true,
            }),
        }
    }

    /// `PromiseResolve(%Promise%, value)`
    pub fn promise_resolve(&mut self, value: Value) -> VmResult<GcRef> {
        if let Some(object) = value.as_object()
            && matches!(self.object(object).kind(), ObjectKind::Promise(_))
        {
            let constructor = self.get(object, &PropertyKey::from_name("constructor"), value)?;
            if constructor == Value::object(self.intrinsics.promise) {
                return Ok(object);
            }
        }
        let promise = self.new_promise();
        self.resolve_promise(promise, value)?;
        Ok(promise)
    }

    /// Pending jobs
    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Drain the job queue, including jobs queued while draining
    pub fn run_jobs(&mut self) -> VmResult<()> {
        let mut ran = 0usize;
        while let Some(job) = self.jobs.pop_front() {
            self.run_job(job)?;
            ran += 1;
        }
        if ran > 0 {
            tracing::trace!(target: "skua::promise", ran, "job queue drained");
        }
        Ok(())
    }

    fn run_job(&mut self, job: Job) -> VmResult<()> {
        match job {
            Job::Reaction {
                reaction,
                argument,
                rejected,
            } => {
                let outcome = match reaction.handler {
                    ReactionHandler::AsyncResume(continuation) => {
                        let mode = if rejected { ResumeMode::Throw } else { ResumeMode::Next };
                        return ExecutionPauser::resume_async(self, continuation, mode, argument);
                    }
                    ReactionHandler::Callback(handler) if self.is_callable(handler) => {
                        self.call(handler, Value::undefined(), &[argument])
                    }
                    ReactionHandler::Callback(_) | ReactionHandler::IterResult { .. } if rejected => {
                        Err(VmError::exception(argument, "", Vec::new()))
                    }
                    ReactionHandler::Callback(_) => Ok(argument),
                    ReactionHandler::IterResult { done } => Ok(self.iter_result(argument, done)),
                };
                let Some(derived) = reaction.derived else {
                    return match outcome {
                        Err(err) if !err.is_catchable() => Err(err),
                        _ => Ok(()),
                    };
                };
                match outcome {
                    Ok(value) => self.resolve_promise(derived, value),
                    Err(err) if err.is_catchable() => {
                        let reason = self.materialize_error(&err);
                        self.reject_promise(derived, reason);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            Job::ResolveThenable {
                promise,
                thenable,
                then,
            } => {
                let (resolve, reject) = self.create_resolving_functions(promise);
                match self.call(then, thenable, &[resolve, reject]) {
                    Ok(_) => Ok(()),
                    Err(err) if err.is_catchable() => {
                        let reason = self.materialize_error(&err);
                        self.call(reject, Value::undefined(), &[reason]).map(|_| ())
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reactions_run_in_order() {
        let mut rt = Runtime::new();
        let value = rt
            .evaluate(
                "var log = []; var p = Promise.resolve(1);\n\
                 p.then(function (v) { log.push('a' + v); });\n\
                 p.then(function (v) { log.push('b' + v); });\n\
                 log",
                "test.js",
            )
            .unwrap();
        rt.run_jobs().unwrap();
        let log = value.as_object().unwrap();
        let first = rt.get(log, &PropertyKey::Index(0), value).unwrap();
        let second = rt.get(log, &PropertyKey::Index(1), value).unwrap();
        assert_eq!(rt.string_text(first).as_deref(), Some("a1"));
        assert_eq!(rt.string_text(second).as_deref(), Some("b1"));
    }

    #[test]
    fn test_self_resolution_rejects() {
        let mut rt = Runtime::new();
        let promise = rt.new_promise();
        rt.resolve_promise(promise, Value::object(promise)).unwrap();
        assert!(matches!(rt.promise_state(promise), Some(PromiseState::Rejected(_))));
    }

    #[test]
    fn test_settles_once() {
        let mut rt = Runtime::new();
        let promise = rt.new_promise();
        rt.resolve_promise(promise, Value::from_i32(1)).unwrap();
        rt.reject_promise(promise, Value::from_i32(2));
        assert_eq!(rt.promise_state(promise), Some(PromiseState::Fulfilled(Value::from_i32(1))));
    }

    #[test]
    fn test_thenable_adoption_is_deferred() {
        let mut rt = Runtime::new();
        let thenable = rt
            .evaluate("({ then: function (resolve) { resolve(5); } })", "test.js")
            .unwrap();
        let promise = rt.new_promise();
        rt.resolve_promise(promise, thenable).unwrap();
        assert_eq!(rt.promise_state(promise), Some(PromiseState::Pending));
        rt.run_jobs().unwrap();
        assert_eq!(rt.promise_state(promise), Some(PromiseState::Fulfilled(Value::from_i32(5))));
    }
}
