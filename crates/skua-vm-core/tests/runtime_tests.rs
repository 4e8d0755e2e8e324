//! Runtime services: jobs and async functions, stack traces, GC, host functions, configuration

use std::cell::RefCell;
use std::rc::Rc;

use skua_vm_core::property::PropertyKey;
use skua_vm_core::{GcRef, PromiseState, Runtime, SandBox, Value, VmConfig, VmError, VmResult};

fn eval(rt: &mut Runtime, source: &str) -> Value {
    match rt.evaluate(source, "rt.js") {
        Ok(value) => value,
        Err(err) => panic!("{source}\n=> {err}"),
    }
}

fn global_text(rt: &mut Runtime, name: &str) -> String {
    let value = eval(rt, name);
    rt.string_text(value).map(|s| s.to_string()).unwrap_or_default()
}

// ==================== Async functions ====================

#[test]
fn test_async_function_resolves_after_jobs() {
    let mut rt = Runtime::new();
    let promise = eval(
        &mut rt,
        "var log = '';\n\
         async function f(x) { log += 'start,'; var v = await x; log += 'got' + v + ','; return v * 2; }\n\
         var p = f(Promise.resolve(21));\n\
         log += 'sync,';\n\
         p",
    )
    .as_object()
    .unwrap();

    assert_eq!(rt.promise_state(promise), Some(PromiseState::Pending));
    assert!(rt.pending_jobs() > 0);
    rt.run_jobs().unwrap();
    assert_eq!(rt.pending_jobs(), 0);

    match rt.promise_state(promise) {
        Some(PromiseState::Fulfilled(value)) => assert_eq!(value.as_number(), 42.0),
        other => panic!("expected fulfillment, got {other:?}"),
    }
    assert_eq!(global_text(&mut rt, "log"), "start,sync,got21,");
}

#[test]
fn test_await_non_promise_still_defers() {
    let mut rt = Runtime::new();
    eval(&mut rt, "var order = ''; (async function () { await 1; order += 'b'; })(); order += 'a';");
    assert_eq!(global_text(&mut rt, "order"), "a");
    rt.run_jobs().unwrap();
    assert_eq!(global_text(&mut rt, "order"), "ab");
}

#[test]
fn test_async_throw_rejects() {
    let mut rt = Runtime::new();
    let promise = eval(&mut rt, "(async function () { throw new TypeError('async bad'); })()")
        .as_object()
        .unwrap();
    match rt.promise_state(promise) {
        Some(PromiseState::Rejected(reason)) => {
            let text = rt.describe_thrown(reason);
            assert_eq!(text, "TypeError: async bad");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn test_await_rejection_is_catchable() {
    let mut rt = Runtime::new();
    eval(
        &mut rt,
        "var seen = '';\n\
         (async function () {\n\
           try { await Promise.reject('nope'); } catch (e) { seen = 'caught ' + e; }\n\
         })();",
    );
    rt.run_jobs().unwrap();
    assert_eq!(global_text(&mut rt, "seen"), "caught nope");
}

#[test]
fn test_async_functions_interleave() {
    let mut rt = Runtime::new();
    eval(
        &mut rt,
        "var trace = '';\n\
         async function worker(tag, n) { for (var i = 0; i < n; i++) { trace += tag + i; await null; } }\n\
         worker('a', 3); worker('b', 2);",
    );
    rt.run_jobs().unwrap();
    assert_eq!(global_text(&mut rt, "trace"), "a0b0a1b1a2");
}

#[test]
fn test_async_awaits_thenable() {
    let mut rt = Runtime::new();
    let promise = eval(
        &mut rt,
        "var thenable = { then: function (resolve) { resolve('from thenable'); } };\n\
         (async function () { return await thenable; })()",
    )
    .as_object()
    .unwrap();
    rt.run_jobs().unwrap();
    match rt.promise_state(promise) {
        Some(PromiseState::Fulfilled(value)) => {
            assert_eq!(rt.string_text(value).as_deref(), Some("from thenable"));
        }
        other => panic!("expected fulfillment, got {other:?}"),
    }
}

#[test]
fn test_async_arrow_and_then_chain() {
    let mut rt = Runtime::new();
    eval(
        &mut rt,
        "var out = 0; var add = async (a, b) => a + b;\n\
         add(1, 2).then(function (v) { return add(v, 10); }).then(function (v) { out = v; });",
    );
    rt.run_jobs().unwrap();
    assert_eq!(eval(&mut rt, "out").as_number(), 13.0);
}

// ==================== Async iteration ====================

#[test]
fn test_for_await_over_async_generator_and_sync_iterable() {
    let mut rt = Runtime::new();
    eval(
        &mut rt,
        "var log = '';\n\
         async function* gen() { yield 1; yield Promise.resolve(2); return 3; }\n\
         (async function () {\n\
           for await (const v of gen()) log += v;\n\
           log += '|';\n\
           for await (const v of [Promise.resolve('a'), 'b']) log += v;\n\
         })();",
    );
    rt.run_jobs().unwrap();
    assert_eq!(global_text(&mut rt, "log"), "12|ab");
}

#[test]
fn test_async_generator_requests_settle_in_order() {
    let mut rt = Runtime::new();
    eval(
        &mut rt,
        "var first, sent, last;\n\
         async function* g() { sent = yield 'first'; return 'end'; }\n\
         var it = g();\n\
         it.next().then(function (r) { first = r.value + ':' + r.done; });\n\
         it.next('payload').then(function (r) { last = r.value + ':' + r.done; });",
    );
    assert_eq!(global_text(&mut rt, "typeof first"), "undefined");
    rt.run_jobs().unwrap();
    assert_eq!(global_text(&mut rt, "first"), "first:false");
    assert_eq!(global_text(&mut rt, "sent"), "payload");
    assert_eq!(global_text(&mut rt, "last"), "end:true");
}

#[test]
fn test_for_await_break_returns_generator() {
    let mut rt = Runtime::new();
    eval(
        &mut rt,
        "var log = '';\n\
         async function* g() { try { yield 1; yield 2; } finally { log += 'cleanup'; } }\n\
         (async function () { for await (const v of g()) { log += v; break; } log += '|done'; })();",
    );
    rt.run_jobs().unwrap();
    assert_eq!(global_text(&mut rt, "log"), "1cleanup|done");
}

#[test]
fn test_async_generator_throw_rejects_next() {
    let mut rt = Runtime::new();
    eval(
        &mut rt,
        "var msg = '';\n\
         async function* g() { throw new Error('inside'); }\n\
         g().next().then(null, function (e) { msg = e.message; });\n\
         var bad = '';\n\
         Object.getPrototypeOf(g.prototype).next.call({}).then(null, function (e) { bad = e.name; });",
    );
    rt.run_jobs().unwrap();
    assert_eq!(global_text(&mut rt, "msg"), "inside");
    assert_eq!(global_text(&mut rt, "bad"), "TypeError");
}

#[test]
fn test_for_await_requires_async_function() {
    let mut rt = Runtime::new();
    assert!(rt.evaluate("function f() { for await (var x of []) {} }", "rt.js").is_err());
}

// ==================== Stack traces ====================

#[test]
fn test_uncaught_error_carries_stack() {
    let mut rt = Runtime::new();
    let err = rt
        .evaluate(
            "function deepest() {\n  null.x;\n}\nfunction middle() {\n  deepest();\n}\nmiddle();\n",
            "stack.js",
        )
        .unwrap_err();
    let VmError::Exception(thrown) = err else {
        panic!("expected a thrown exception");
    };
    assert!(thrown.message.starts_with("TypeError"), "{}", thrown.message);
    let frames: Vec<(&str, u32)> = thrown
        .stack
        .iter()
        .map(|f| (f.function_name.as_str(), f.line))
        .collect();
    assert_eq!(frames[0], ("deepest", 2));
    assert_eq!(frames[1], ("middle", 5));
    assert_eq!(frames[2].1, 7);
    assert!(thrown.stack.iter().all(|f| f.source_name == "stack.js"));
}

#[test]
fn test_error_stack_property() {
    let mut rt = Runtime::new();
    eval(
        &mut rt,
        "function make() {\n  return new RangeError('r');\n}\nvar stack = make().stack;",
    );
    let stack = global_text(&mut rt, "stack");
    let mut lines = stack.lines();
    assert_eq!(lines.next(), Some("RangeError: r"));
    assert!(lines.next().is_some_and(|l| l.trim_start().starts_with("at make (rt.js:2:")));
}

#[test]
fn test_stack_trace_limit() {
    let config = VmConfig {
        stack_trace_limit: 2,
        ..VmConfig::default()
    };
    let mut rt = Runtime::with_config(config);
    let err = rt
        .evaluate("function a() { throw 1; } function b() { a(); } function c() { b(); } c();", "limit.js")
        .unwrap_err();
    match err {
        VmError::Exception(thrown) => assert_eq!(thrown.stack.len(), 2),
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn test_native_frames_in_stack() {
    fn capture(rt: &mut Runtime, _this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
        let names: Vec<String> = rt
            .capture_stack()
            .iter()
            .map(|f| format!("{}{}", f.function_name, if f.is_native { "*" } else { "" }))
            .collect();
        Ok(rt.alloc_string(&names.join(",")))
    }
    let mut rt = Runtime::new();
    let global = rt.global_object();
    rt.define_native_function(global, "capture", 0, capture);
    let value = eval(&mut rt, "function outer() { return capture(); } outer()");
    let text = rt.string_text(value).unwrap_or_default();
    assert!(text.starts_with("capture*,outer"), "{text}");
}

// ==================== Host functions ====================

fn call_twice(rt: &mut Runtime, _this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let callback = args.first().copied().unwrap_or_default();
    let first = rt.call(callback, Value::undefined(), &[Value::from_i32(1)])?;
    let second = rt.call(callback, Value::undefined(), &[first])?;
    Ok(second)
}

#[test]
fn test_native_function_reenters_script() {
    let mut rt = Runtime::new();
    let global = rt.global_object();
    rt.define_native_function(global, "callTwice", 1, call_twice);
    assert_eq!(eval(&mut rt, "callTwice(function (x) { return x * 10; })").as_number(), 100.0);
    let value = eval(&mut rt, "callTwice.name + callTwice.length");
    assert_eq!(rt.string_text(value).as_deref(), Some("callTwice1"));
}

#[test]
fn test_script_exception_crosses_native_frame() {
    let mut rt = Runtime::new();
    let global = rt.global_object();
    rt.define_native_function(global, "callTwice", 1, call_twice);
    let value = eval(
        &mut rt,
        "var r; try { callTwice(function () { throw 'inner'; }); } catch (e) { r = e; } r",
    );
    assert_eq!(rt.string_text(value).as_deref(), Some("inner"));
}

#[test]
fn test_host_calls_script_function() {
    let mut rt = Runtime::new();
    let f = eval(&mut rt, "(function (a, b) { return this.base + a * b; })");
    let this = eval(&mut rt, "({ base: 100 })");
    let result = rt.call(f, this, &[Value::from_i32(6), Value::from_i32(7)]).unwrap();
    assert_eq!(result.as_number(), 142.0);

    let ctor = eval(&mut rt, "(function Point(x) { this.x = x; })");
    let point = rt.construct(ctor, &[Value::from_i32(3)], None).unwrap().as_object().unwrap();
    let x = rt.get(point, &PropertyKey::from("x"), Value::object(point)).unwrap();
    assert_eq!(x.as_number(), 3.0);
}

#[test]
fn test_output_sink() {
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&lines);
    let mut rt = Runtime::new();
    rt.set_output(move |line| sink.borrow_mut().push(line.to_string()));
    eval(&mut rt, "for (var i = 0; i < 3; i++) print('line', i);");
    assert_eq!(*lines.borrow(), vec!["line 0", "line 1", "line 2"]);
}

#[test]
fn test_symbols_from_host() {
    let mut rt = Runtime::new();
    let symbol = rt.new_symbol(Some("tag"));
    rt.define_global("hostSymbol", symbol);
    let value = eval(
        &mut rt,
        "var o = {}; o[hostSymbol] = 5; typeof hostSymbol + Object.keys(o).length + o[hostSymbol] + hostSymbol.toString()",
    );
    assert_eq!(rt.string_text(value).as_deref(), Some("symbol05Symbol(tag)"));
}

// ==================== Garbage collection ====================

fn make_cycle(rt: &mut Runtime) -> (GcRef, GcRef) {
    let a = eval(rt, "(function () { var a = {}; var b = { a: a }; a.b = b; return a; })()")
        .as_object()
        .unwrap();
    let b = rt
        .get(a, &PropertyKey::from("b"), Value::object(a))
        .unwrap()
        .as_object()
        .unwrap();
    (a, b)
}

#[test]
fn test_gc_reclaims_cycles() {
    let mut rt = Runtime::new();
    let (a, b) = make_cycle(&mut rt);
    rt.register_finalizer(a, 1).unwrap();
    rt.register_finalizer(b, 2).unwrap();

    rt.root(a);
    rt.collect_garbage();
    assert!(rt.drain_finalized().is_empty());
    assert!(rt.heap().contains(a) && rt.heap().contains(b));

    rt.unroot(a).unwrap();
    let reclaimed = rt.collect_garbage();
    assert!(reclaimed >= 2);
    let mut tokens = rt.drain_finalized();
    tokens.sort_unstable();
    assert_eq!(tokens, vec![1, 2]);
    assert!(!rt.heap().contains(a));
    assert!(!rt.heap().contains(b));
}

#[test]
fn test_gc_keeps_global_reachable_objects() {
    let mut rt = Runtime::new();
    let kept = eval(&mut rt, "var keep = { nested: { v: 9 } }; keep.nested")
        .as_object()
        .unwrap();
    rt.register_finalizer(kept, 7).unwrap();
    rt.collect_garbage();
    assert!(rt.drain_finalized().is_empty());
    assert_eq!(eval(&mut rt, "keep.nested.v").as_number(), 9.0);

    eval(&mut rt, "keep = null;");
    rt.collect_garbage();
    assert_eq!(rt.drain_finalized(), vec![7]);
}

#[test]
fn test_gc_keeps_closure_environments() {
    let mut rt = Runtime::new();
    eval(
        &mut rt,
        "var getter = (function () { var secret = { v: 'hidden' }; return function () { return secret.v; }; })();",
    );
    rt.collect_garbage();
    let value = eval(&mut rt, "getter()");
    assert_eq!(rt.string_text(value).as_deref(), Some("hidden"));
}

#[test]
fn test_gc_keeps_suspended_generators_and_jobs() {
    let mut rt = Runtime::new();
    eval(
        &mut rt,
        "function* g() { var local = { n: 5 }; yield 1; yield local.n; }\n\
         var it = g(); it.next();\n\
         var result; Promise.resolve({ payload: 3 }).then(function (v) { result = v.payload; });",
    );
    rt.collect_garbage();
    assert_eq!(eval(&mut rt, "it.next().value").as_number(), 5.0);
    rt.collect_garbage();
    rt.run_jobs().unwrap();
    assert_eq!(eval(&mut rt, "result").as_number(), 3.0);
}

#[test]
fn test_stale_handle_is_not_reused_silently() {
    let mut rt = Runtime::new();
    let (a, _) = make_cycle(&mut rt);
    rt.collect_garbage();
    assert!(!rt.heap().contains(a));
    let fresh = rt.new_object();
    assert!(rt.heap().contains(fresh));
    assert!(!rt.heap().contains(a));
}

#[test]
fn test_sandbox_collects_when_threshold_crossed() {
    let config = VmConfig {
        gc: skua_vm_core::GcConfig {
            initial_threshold: 64,
            growth_factor: 2.0,
        },
        ..VmConfig::default()
    };
    let mut rt = Runtime::with_config(config);
    let before = rt.heap().stats().collections;
    let result = SandBox::new(&mut rt)
        .run_source("var last; for (var i = 0; i < 500; i++) last = { i: i }; last.i", "churn.js");
    assert!(result.is_successful());
    assert_eq!(result.result.as_number(), 499.0);
    assert!(rt.heap().stats().collections > before);
    assert_eq!(eval(&mut rt, "last.i").as_number(), 499.0);
}

// ==================== Configuration ====================

#[test]
fn test_config_deserializes_with_defaults() {
    let config: VmConfig = serde_json::from_str(
        r#"{ "max_call_depth": 10, "inline_cache": { "max_entries": 2 }, "gc": { "initial_threshold": 1000 } }"#,
    )
    .unwrap();
    assert_eq!(config.max_call_depth, 10);
    assert_eq!(config.inline_cache.max_entries, 2);
    assert_eq!(config.inline_cache.miss_limit, 32);
    assert_eq!(config.gc.initial_threshold, 1000);
    assert_eq!(config.gc.growth_factor, 2.0);
    assert_eq!(config.stack_trace_limit, VmConfig::default().stack_trace_limit);

    let mut rt = Runtime::with_config(config);
    let err = rt.evaluate("function r(n) { return r(n + 1); } r(0)", "cfg.js").unwrap_err();
    assert!(err.to_string().contains("Maximum call stack size exceeded"));
}
