//! `Promise`

use skua_vm_gc::GcRef;

use super::{arg, install_constructor, prototype_from};
use crate::error::{VmError, VmResult};
use crate::object::ObjectKind;
use crate::promise::ReactionHandler;
use crate::runtime::Runtime;
use crate::value::Value;

pub(super) fn init(rt: &mut Runtime) {
    let ctor = rt.intrinsics.promise;
    let proto = rt.intrinsics.promise_prototype;
    install_constructor(rt, ctor, "Promise", 1, proto);
    rt.define_native_function(ctor, "resolve", 1, resolve);
    rt.define_native_function(ctor, "reject", 1, reject);
    rt.define_native_function(proto, "then", 2, then);
    rt.define_native_function(proto, "catch", 1, catch);
}

/// `new Promise(executor)`
pub(super) fn promise_constructor(
    rt: &mut Runtime,
    _this: Value,
    args: &[Value],
    new_target: Option<GcRef>,
) -> VmResult<Value> {
    if new_target.is_none() {
        return Err(VmError::type_error("Promise constructor cannot be invoked without 'new'"));
    }
    let executor = arg(args, 0);
    if !rt.is_callable(executor) {
        return Err(VmError::type_error(format!(
            "Promise resolver {} is not a function",
            rt.display_value(executor)
        )));
    }
    let fallback = rt.intrinsics.promise_prototype;
    let proto = prototype_from(rt, new_target, fallback)?;
    let promise = rt.new_promise_with(proto);
    let (resolve, reject) = rt.create_resolving_functions(promise);
    match rt.call(executor, Value::undefined(), &[resolve, reject]) {
        Ok(_) => {}
        Err(err) if err.is_catchable() => {
            let reason = rt.materialize_error(&err);
            rt.call(reject, Value::undefined(), &[reason])?;
        }
        Err(err) => return Err(err),
    }
    Ok(Value::object(promise))
}

fn resolve(rt: &mut Runtime, _this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    rt.promise_resolve(arg(args, 0)).map(Value::object)
}

fn reject(rt: &mut Runtime, _this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let promise = rt.new_promise();
    rt.reject_promise(promise, arg(args, 0));
    Ok(Value::object(promise))
}

fn this_promise(rt: &Runtime, this: Value, method: &str) -> VmResult<GcRef> {
    match this.as_object() {
        Some(object) if matches!(rt.object(object).kind(), ObjectKind::Promise(_)) => Ok(object),
        _ => Err(VmError::type_error(format!(
            "Method Promise.prototype.{method} called on incompatible receiver {}",
            rt.display_value(this)
        ))),
    }
}

/// `Promise.prototype.then`
fn then(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let promise = this_promise(rt, this, "then")?;
    let derived = rt.new_promise();
    rt.perform_then(
        promise,
        ReactionHandler::Callback(arg(args, 0)),
        ReactionHandler::Callback(arg(args, 1)),
        Some(derived),
    );
    Ok(Value::object(derived))
}

/// `Promise.prototype.catch`
fn catch(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    rt.invoke_method(this, "then", &[Value::undefined(), arg(args, 0)])
}

#[cfg(test)]
mod tests {
    use crate::promise::PromiseState;
    use crate::runtime::Runtime;

    #[test]
    fn test_then_chain_runs_after_jobs() {
        let mut rt = Runtime::new();
        let promise = rt
            .evaluate(
                "new Promise(function (resolve) { resolve(1); })\n\
                 .then(function (v) { return v + 1; })\n\
                 .then(function (v) { return v * 10; })",
                "p.js",
            )
            .unwrap();
        let promise = promise.as_object().unwrap();
        assert_eq!(rt.promise_state(promise), Some(PromiseState::Pending));
        rt.run_jobs().unwrap();
        match rt.promise_state(promise) {
            Some(PromiseState::Fulfilled(value)) => assert_eq!(value.as_number(), 20.0),
            other => panic!("expected fulfillment, got {other:?}"),
        }
    }

    #[test]
    fn test_executor_throw_rejects() {
        let mut rt = Runtime::new();
        let promise = rt
            .evaluate("new Promise(function () { throw 'no'; })", "p.js")
            .unwrap()
            .as_object()
            .unwrap();
        match rt.promise_state(promise) {
            Some(PromiseState::Rejected(reason)) => assert_eq!(rt.string_text(reason).as_deref(), Some("no")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_catch_recovers() {
        let mut rt = Runtime::new();
        rt.evaluate(
            "var seen; Promise.reject(new Error('boom')).catch(function (e) { seen = e.message; });",
            "p.js",
        )
        .unwrap();
        rt.run_jobs().unwrap();
        let seen = rt.evaluate("seen", "p.js").unwrap();
        assert_eq!(rt.string_text(seen).as_deref(), Some("boom"));
    }

    #[test]
    fn test_resolve_returns_same_promise() {
        let mut rt = Runtime::new();
        let value = rt.evaluate("var p = Promise.resolve(1); Promise.resolve(p) === p", "p.js").unwrap();
        assert!(value.as_boolean());
    }

    #[test]
    fn test_requires_new() {
        let mut rt = Runtime::new();
        assert!(rt.evaluate("Promise(function () {})", "p.js").is_err());
    }
}
