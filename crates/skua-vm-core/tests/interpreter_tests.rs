//! End-to-end interpreter tests: compile with the real front end, run on a fresh runtime

use std::sync::Arc;

use skua_vm_bytecode::Script;
use skua_vm_core::{CompileOptions, Runtime, SandBox, Value, VmConfig, VmError};

fn eval(source: &str) -> (Runtime, Value) {
    let mut rt = Runtime::new();
    let value = match rt.evaluate(source, "test.js") {
        Ok(value) => value,
        Err(err) => panic!("{source}\n=> {err}"),
    };
    (rt, value)
}

fn eval_number(source: &str) -> f64 {
    eval(source).1.as_number()
}

fn eval_string(source: &str) -> String {
    let (rt, value) = eval(source);
    match rt.string_text(value) {
        Some(text) => text.to_string(),
        None => panic!("{source} did not produce a string"),
    }
}

fn eval_error(source: &str) -> String {
    let mut rt = Runtime::new();
    match rt.evaluate(source, "test.js") {
        Ok(_) => panic!("{source} should have thrown"),
        Err(err) => err.to_string(),
    }
}

// ==================== Expressions ====================

#[test]
fn test_arithmetic() {
    assert_eq!(eval_number("1 + 1"), 2.0);
    assert_eq!(eval_number("'1' - 1"), 0.0);
    assert_eq!(eval_number("7 % -3"), 1.0);
    assert_eq!(eval_number("2 ** 10"), 1024.0);
    assert_eq!(eval_number("-(2 ** 31) | 0"), -2147483648.0);
    assert!(eval_number("0 / 0").is_nan());
    assert_eq!(eval_number("1 / -0"), f64::NEG_INFINITY);
}

#[test]
fn test_int32_overflow_promotes_to_double() {
    let (_, value) = eval("2147483647 + 1");
    assert!(value.is_double());
    assert_eq!(value.as_number(), 2147483648.0);
    let (_, value) = eval("var x = 5; x++; x");
    assert!(value.is_int32());
}

#[test]
fn test_string_concatenation() {
    assert_eq!(eval_string("'a' + 1 + 2"), "a12");
    assert_eq!(eval_string("1 + 2 + 'a'"), "3a");
    assert_eq!(eval_string("var n = 3; `${n} + ${n} = ${n + n}`"), "3 + 3 = 6");
    assert_eq!(eval_string("'' + null + undefined + true"), "nullundefinedtrue");
}

#[test]
fn test_comparisons() {
    let (_, value) = eval("('10' < '9') && !(10 < 9) && !(NaN <= NaN) && (null >= 0) && !(undefined >= 0)");
    assert!(value.as_boolean());
}

#[test]
fn test_logical_operators_short_circuit() {
    assert_eq!(eval_number("var n = 0; false && n++; true || n++; null ?? n++; n"), 1.0);
    assert_eq!(eval_string("'' || 'fallback'"), "fallback");
    assert_eq!(eval_number("0 ?? 5"), 0.0);
}

#[test]
fn test_compound_and_logical_assignment() {
    assert_eq!(eval_number("var a = 2; a *= 3; a -= 1; a <<= 1; a"), 10.0);
    assert_eq!(eval_number("var o = { v: 0 }; o.v ||= 4; o.v &&= o.v + 1; o.w ??= 9; o.v + o.w"), 14.0);
}

#[test]
fn test_conditional_and_sequence() {
    assert_eq!(eval_number("var x = (1, 2, 3); x > 2 ? x * 2 : x"), 6.0);
}

#[test]
fn test_in_and_instanceof() {
    let (_, value) = eval(
        "function F() {} var f = new F();\n\
         (f instanceof F) && (f instanceof Object) && !({} instanceof F) && ('x' in { x: undefined })",
    );
    assert!(value.as_boolean());
    assert!(eval_error("1 in 2").contains("TypeError"));
    assert!(eval_error("({}) instanceof 1").contains("TypeError"));
}

// ==================== Functions and closures ====================

#[test]
fn test_recursion() {
    assert_eq!(
        eval_number("function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); } fib(20)"),
        6765.0
    );
}

#[test]
fn test_closure_counter() {
    assert_eq!(
        eval_number(
            "function counter() { var n = 0; return function () { return ++n; }; }\n\
             var a = counter(), b = counter();\n\
             a(); a(); b();\n\
             a() * 10 + b()",
        ),
        32.0
    );
}

#[test]
fn test_closures_share_binding() {
    assert_eq!(
        eval_number(
            "function pair() { var v = 1; return [function () { return v; }, function (x) { v = x; }]; }\n\
             var p = pair(); p[1](7); p[0]()",
        ),
        7.0
    );
}

#[test]
fn test_loop_let_gets_per_iteration_binding() {
    assert_eq!(
        eval_string(
            "var fs = [];\n\
             for (let i = 0; i < 3; i++) fs.push(function () { return i; });\n\
             '' + fs[0]() + fs[1]() + fs[2]()",
        ),
        "012"
    );
    assert_eq!(
        eval_string(
            "var gs = [];\n\
             for (var j = 0; j < 3; j++) gs.push(function () { return j; });\n\
             '' + gs[0]() + gs[1]() + gs[2]()",
        ),
        "333"
    );
}

#[test]
fn test_loop_let_update_sees_closure_writes() {
    assert_eq!(
        eval_string(
            "var fs = [];\n\
             for (let i = 0; i < 6; i++) { fs.push(function () { return i; }); i++; }\n\
             '' + fs[0]() + fs[1]() + fs[2]()",
        ),
        "135"
    );
}

#[test]
fn test_tdz() {
    assert!(eval_error("x; let x = 1;").contains("ReferenceError"));
    assert!(eval_error("function f() { return y; } f(); const y = 1;").contains("ReferenceError"));
    assert!(eval_error("const c = 1; c = 2;").contains("TypeError"));
}

#[test]
fn test_hoisting() {
    assert_eq!(eval_number("var r = hoisted(); function hoisted() { return 5; } r"), 5.0);
    let (_, value) = eval("var before = typeof v; var v = 1; before === 'undefined'");
    assert!(value.as_boolean());
}

#[test]
fn test_arrow_functions_capture_this() {
    assert_eq!(
        eval_number("var o = { v: 3, f: function () { return (() => this.v)(); } }; o.f()"),
        3.0
    );
}

#[test]
fn test_default_and_rest_parameters() {
    assert_eq!(
        eval_number("function f(a, b = a * 2, ...rest) { return a + b + rest.length; } f(1) + f(1, 1, 9, 9)"),
        7.0
    );
}

#[test]
fn test_default_parameter_is_applied_and_excluded_from_length() {
    assert_eq!(
        eval_string("function f(a, b = 2, ...r) { return a + '|' + b + '|' + r.length; } f(1)"),
        "1|2|0"
    );
    assert_eq!(eval_number("function g(a, b = 1, c) {} g.length"), 1.0);
    assert_eq!(eval_string("function h(a = 'x') { return a; } h(undefined) + h(null)"), "xnull");
}

#[test]
fn test_leading_function_declaration_keeps_its_own_scope() {
    assert_eq!(
        eval_string("function h() { return typeof f; } function f() { return 1; } h()"),
        "function"
    );
    assert_eq!(
        eval_number("function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); } fib(15)"),
        610.0
    );
    assert_eq!(
        eval_number("function count() { return arguments.length; } var total = count(1, 2, 3); total"),
        3.0
    );
}

#[test]
fn test_arguments_object() {
    assert_eq!(
        eval_number("function f(a) { arguments[0] = 10; return a + arguments.length; } f(1, 2, 3)"),
        13.0
    );
    assert_eq!(
        eval_number("function g(a) { 'use strict'; arguments[0] = 10; return a; } g(1)"),
        1.0
    );
}

#[test]
fn test_this_binding() {
    let (_, value) = eval(
        "function sloppy() { return this; } function strict() { 'use strict'; return this; }\n\
         sloppy() === globalThis && strict() === undefined",
    );
    assert!(value.as_boolean());
}

#[test]
fn test_constructor_return_override() {
    assert_eq!(
        eval_number("function A() { this.v = 1; return { v: 2 }; } function B() { this.v = 3; return 4; } new A().v + new B().v"),
        5.0
    );
}

#[test]
fn test_call_non_function() {
    let message = eval_error("var o = {}; o.missing()");
    assert!(message.contains("TypeError"), "{message}");
    assert!(message.contains("is not a function"), "{message}");
}

#[test]
fn test_stack_overflow_is_range_error() {
    let config = VmConfig {
        max_call_depth: 64,
        ..VmConfig::default()
    };
    let mut rt = Runtime::with_config(config);
    let err = rt.evaluate("function r() { return r(); } r()", "deep.js").unwrap_err();
    assert!(err.to_string().contains("Maximum call stack size exceeded"));
    let value = rt
        .evaluate("function r2() { return r2(); } try { r2(); } catch (e) { e instanceof RangeError }", "deep.js")
        .unwrap();
    assert!(value.as_boolean());
}

// ==================== Control flow ====================

#[test]
fn test_loops_and_labels() {
    assert_eq!(
        eval_number(
            "var n = 0;\n\
             outer: for (var i = 0; i < 5; i++) {\n\
               for (var j = 0; j < 5; j++) {\n\
                 if (j === 3) continue outer;\n\
                 if (i === 3) break outer;\n\
                 n++;\n\
               }\n\
             }\n\
             n",
        ),
        9.0
    );
    assert_eq!(eval_number("var k = 0; do { k++; } while (k < 5); k"), 5.0);
    assert_eq!(eval_number("var w = 10; while (w > 3) w -= 2; w"), 2.0);
}

#[test]
fn test_switch() {
    let source = "function s(x) { var r = ''; switch (x) { case 1: r += 'a'; case 2: r += 'b'; break; default: r += 'd'; case 3: r += 'c'; } return r; }\n";
    assert_eq!(eval_string(&format!("{source}s(1)")), "ab");
    assert_eq!(eval_string(&format!("{source}s(3)")), "c");
    assert_eq!(eval_string(&format!("{source}s(9)")), "dc");
    assert_eq!(eval_string(&format!("{source}s('1')")), "dc");
}

#[test]
fn test_for_in_skips_deleted_and_shadowed() {
    assert_eq!(
        eval_string(
            "var proto = { p: 1, shadow: 1 }; function C() { this.a = 1; this.shadow = 2; this.b = 1; } C.prototype = proto;\n\
             var c = new C(); var s = '';\n\
             for (var k in c) { if (k === 'a') delete c.b; s += k; }\n\
             s",
        ),
        "ashadowp"
    );
}

#[test]
fn test_for_of_and_spread() {
    assert_eq!(eval_number("var t = 0; for (var v of [1, 2, 3]) t += v; t"), 6.0);
    assert_eq!(eval_number("function sum(a, b, c) { return a + b + c; } sum(...[1, 2], 3)"), 6.0);
    assert_eq!(eval_number("[0, ...'abc', 4].length"), 5.0);
    assert!(eval_error("for (var x of 5) {}").contains("TypeError"));
}

#[test]
fn test_for_of_break_closes_iterator() {
    assert_eq!(
        eval_string(
            "var log = '';\n\
             var it = { i: 0, next: function () { this.i++; return { value: this.i, done: false }; }, return: function () { log += 'closed'; return {}; } };\n\
             var iterable = {}; iterable[Symbol.iterator] = function () { return it; };\n\
             for (var v of iterable) { log += v; if (v === 2) break; }\n\
             log",
        ),
        "12closed"
    );
}

#[test]
fn test_destructuring_declarations() {
    assert_eq!(
        eval_number("var { a, b: { c = 5 } = {}, ...rest } = { a: 1, x: 2, y: 3 }; var [p, , q = 4] = [10, 20]; a + c + rest.x + rest.y + p + q"),
        25.0
    );
    assert!(eval_error("var { z } = null;").contains("TypeError"));
}

#[test]
fn test_destructuring_assignment() {
    assert_eq!(
        eval_number(
            "var a, b, rest, o = {};\n\
             [a, b = 5, ...rest] = [1, undefined, 3, 4];\n\
             ({ x: o.x, y: [o.y] = [9], ...o.r } = { x: 2, z: 3 });\n\
             a + b + rest.length + o.x + o.y + o.r.z",
        ),
        22.0
    );
    assert_eq!(eval_number("var p = 1, q = 2; [p, q] = [q, p]; p * 10 + q"), 21.0);
    assert!(eval_error("var u; ({ u } = undefined);").contains("TypeError"));
}

#[test]
fn test_destructuring_loop_heads() {
    assert_eq!(eval_number("var s = 0, k, v; for ([k, v] of [[1, 2], [3, 4]]) s += k * v; s"), 14.0);
    assert_eq!(eval_string("var t = {}; for (t.key in { z: 1 }); t.key"), "z");
    assert_eq!(eval_number("var n = 0; for (const { a, b = 1 } of [{ a: 2 }, { a: 3, b: 4 }]) n += a * b; n"), 14.0);
}

#[test]
fn test_optional_chaining() {
    assert_eq!(
        eval_number(
            "var o = { a: { b: function () { return this.c; }, c: 7 } }; var n = null;\n\
             o?.a?.b() + (n?.x === undefined ? 1 : 0) + (n?.x.y.z === undefined ? 1 : 0)\n\
             + (o.a.missing?.() === undefined ? 1 : 0) + (n?.['k'] === undefined ? 1 : 0)",
        ),
        11.0
    );
    assert_eq!(eval_number("var calls = 0; var n; n?.f(calls++); calls"), 0.0);
    assert!(eval_error("var o = {}; o.a?.b.c; o.x.y").contains("TypeError"));
}

// ==================== Classes ====================

#[test]
fn test_class_methods_and_accessors() {
    assert_eq!(
        eval_number(
            "class Point {\n\
               constructor(x, y) { this.x = x; this.y = y; }\n\
               sum() { return this.x + this.y; }\n\
               get double() { return this.sum() * 2; }\n\
               set double(v) { this.x = v; }\n\
               static origin() { return new Point(0, 0); }\n\
             }\n\
             var p = new Point(1, 2); p.double = 10;\n\
             p.double + Point.origin().sum()",
        ),
        24.0
    );
    assert_eq!(eval_string("var C = class {}; C.name"), "C");
}

#[test]
fn test_class_constructor_requires_new() {
    assert!(eval_error("class A {} A()").contains("cannot be invoked without 'new'"));
    assert!(eval_error("class A { m() {} } new A.prototype.m()").contains("TypeError"));
}

#[test]
fn test_class_declarations_are_lexical() {
    assert!(eval_error("new A(); class A {}").contains("ReferenceError"));
    assert_eq!(eval_string("class A {} { class A { static n() { return 'inner'; } } var r = A.n(); } r"), "inner");
}

#[test]
fn test_inheritance_and_super_calls() {
    assert_eq!(
        eval_string(
            "class Animal {\n\
               constructor(name) { this.name = name; }\n\
               speak() { return this.name + ' makes a sound'; }\n\
               static kind() { return 'animal'; }\n\
             }\n\
             class Dog extends Animal {\n\
               speak() { return super.speak() + ' (woof)'; }\n\
               static kind() { return 'dog < ' + super.kind(); }\n\
             }\n\
             var d = new Dog('Rex');\n\
             d.speak() + '|' + (d instanceof Animal) + '|' + (Object.getPrototypeOf(Dog) === Animal) + '|' + Dog.kind()",
        ),
        "Rex makes a sound (woof)|true|true|dog < animal"
    );
}

#[test]
fn test_derived_constructor_binds_this_through_super() {
    assert_eq!(
        eval_number(
            "class A { constructor(v) { this.v = v; } }\n\
             class B extends A { constructor() { super(20); var f = () => this.v; this.w = f() + 1; } }\n\
             var b = new B(); b.v + b.w",
        ),
        41.0
    );
    assert!(
        eval_error("class A {} class B extends A { constructor() { this.b = 2; super(); } } new B()")
            .contains("Must call super constructor")
    );
    assert!(eval_error("class A {} class B extends A { constructor() {} } new B()").contains("ReferenceError"));
    assert!(
        eval_error("class A {} class B extends A { constructor() { super(); super(); } } new B()")
            .contains("ReferenceError")
    );
    assert_eq!(
        eval_number("class A {} class B extends A { constructor() { return { n: 5 }; } } new B().n"),
        5.0
    );
}

#[test]
fn test_super_property_assignment_and_object_methods() {
    assert_eq!(
        eval_string(
            "var base = { greet() { return 'hi ' + this.who; } };\n\
             var obj = { who: 'obj', greet() { return super.greet() + '!'; } };\n\
             Object.setPrototypeOf(obj, base);\n\
             obj.greet()",
        ),
        "hi obj!"
    );
    assert_eq!(
        eval_number(
            "class A {} class B extends A { m() { super.x = 3; return this.x + (super.x === undefined ? 10 : 0); } }\n\
             var b = new B(); b.m() + (A.prototype.x === undefined ? 100 : 0)",
        ),
        113.0
    );
    assert!(eval_error("class A { m() { delete super.x; } } new A().m()").contains("ReferenceError"));
}

#[test]
fn test_class_fields_and_static_blocks() {
    assert_eq!(
        eval_string(
            "var k = 'dyn';\n\
             class C { a = 1; [k] = this.a + 1; static s = 'S'; static t = C.s + '!'; static { C.u = this.t + '?'; } }\n\
             var c = new C(); c.a + c.dyn + C.t + C.u",
        ),
        "3S!S!?"
    );
    assert_eq!(
        eval_string("class A { constructor() { this.log = 'A'; } } class B extends A { f = this.log + 'B'; } new B().f"),
        "AB"
    );
    assert_eq!(eval_number("class A { n = 0; inc = () => ++this.n; } var a = new A(); a.inc(); a.inc(); a.n"), 2.0);
}

#[test]
fn test_new_target() {
    assert!(eval("var seen; function f() { seen = new.target === f; } new f(); seen").1.as_boolean());
    assert!(eval("function g() { return new.target; } g() === undefined").1.as_boolean());
    assert!(eval("var t; function h() { t = (() => new.target)(); } new h(); t === h").1.as_boolean());
    assert!(eval("class A { constructor() { this.t = new.target; } } class B extends A {} new B().t === B").1.as_boolean());
}

// ==================== Templates ====================

#[test]
fn test_tagged_templates() {
    assert_eq!(
        eval_string(
            "function tag(strings, a, b) {\n\
               return strings.length + ':' + strings[0] + a + strings[1] + b + strings[2] + ':' + strings.raw[1];\n\
             }\n\
             tag`x${1}\\n${2}z`",
        ),
        "3:x1\n2z:\\n"
    );
    assert!(eval("function id(s) { return s; } function f() { return id`a`; } f() === f() && id`a` !== id`a`").1.as_boolean());
    assert_eq!(eval_string("var o = { p: '!', t(s, v) { return v + this.p; } }; o.t`${1}`"), "1!");
    assert!(eval("function id(s) { return s; } var s = id`q`; s[0] = 'changed'; s[0] === 'q'").1.as_boolean());
}

// ==================== Exceptions ====================

#[test]
fn test_try_catch_finally() {
    assert_eq!(eval_number("var r; try { throw 5; } catch (e) { r = e * 2; } r"), 10.0);
    assert_eq!(eval_string("var s = ''; try { s += 't'; } finally { s += 'f'; } s"), "tf");
    assert_eq!(eval_number("function f() { try { return 1; } finally { return 2; } } f()"), 2.0);
    assert_eq!(eval_number("var x; try { undefinedName; } catch { x = 3; } x"), 3.0);
}

#[test]
fn test_finally_runs_exactly_once() {
    let cases = [
        ("var n = 0; function f() { try { return 1; } finally { n++; } } f(); n", 1.0),
        ("var n = 0; try { try { throw 1; } finally { n++; } } catch (e) {} n", 1.0),
        ("var n = 0; for (var i = 0; i < 3; i++) { try { if (i === 1) break; } finally { n++; } } n", 2.0),
        ("var n = 0; for (var i = 0; i < 3; i++) { try { continue; } finally { n++; } } n", 3.0),
        ("var n = 0; lbl: { try { break lbl; } finally { n++; } } n", 1.0),
    ];
    for (source, expected) in cases {
        assert_eq!(eval_number(source), expected, "{source}");
    }
}

#[test]
fn test_finally_overrides_completion() {
    assert_eq!(
        eval_number("function f() { for (;;) { try { throw 1; } finally { break; } } return 7; } f()"),
        7.0
    );
}

#[test]
fn test_rethrow_from_catch() {
    assert_eq!(
        eval_string("var s = ''; try { try { throw 'a'; } catch (e) { s += e; throw e + 'b'; } } catch (e2) { s += e2; } s"),
        "aab"
    );
}

#[test]
fn test_engine_errors_are_catchable_objects() {
    assert_eq!(
        eval_string("try { null.x; } catch (e) { e.name + ':' + (e instanceof TypeError) }"),
        "TypeError:true"
    );
    assert_eq!(
        eval_string("try { nope; } catch (e) { e.message }"),
        "nope is not defined"
    );
}

#[test]
fn test_uncaught_exception_surface() {
    let mut rt = Runtime::new();
    match rt.evaluate("throw new TypeError('bad')", "t.js") {
        Err(VmError::Exception(thrown)) => {
            assert_eq!(thrown.message, "TypeError: bad");
            assert!(thrown.value.is_object());
        }
        other => panic!("expected exception, got {other:?}"),
    }
}

#[test]
fn test_throw_1_is_unsuccessful() {
    let mut rt = Runtime::new();
    let result = SandBox::new(&mut rt).run_source("throw 1", "t.js");
    assert!(!result.is_successful());
}

#[test]
fn test_syntax_errors() {
    let mut rt = Runtime::new();
    let err = rt.evaluate(".", "t.js").unwrap_err();
    assert!(err.to_string().starts_with("SyntaxError"), "{err}");
    assert!(rt.evaluate("class A {}", "t.js").is_err());
}

// ==================== with / eval ====================

#[test]
fn test_with_resolves_dynamically() {
    assert_eq!(
        eval_number("var o = { x: 1 }; var x = 100; var r = 0; with (o) { r += x; o.x = 2; r += x; delete o.x; r += x; } r"),
        103.0
    );
    assert_eq!(
        eval_number("var o = {}; with (o) { var declared = 4; } declared + (o.declared === undefined ? 0 : 1)"),
        4.0
    );
}

#[test]
fn test_with_assignment_targets_object() {
    assert_eq!(
        eval_number("var o = { y: 1 }; var y = 10; with (o) { y = 5; } o.y * 100 + y"),
        510.0
    );
}

#[test]
fn test_direct_eval_sees_locals() {
    assert_eq!(eval_number("function f() { var local = 6; return eval('local * 7'); } f()"), 42.0);
    assert_eq!(
        eval_string("function g() { eval('var injected = 3; seen = injected'); return seen + typeof injected; } var seen; g()"),
        "3undefined"
    );
    assert_eq!(eval_number("function h(a) { eval('a = 9'); return a; } h(1)"), 9.0);
}

#[test]
fn test_strict_eval_has_own_scope() {
    assert_eq!(
        eval_string("function f() { 'use strict'; eval('var inner = 1'); return typeof inner; } f()"),
        "undefined"
    );
}

#[test]
fn test_eval_syntax_error_is_catchable() {
    assert_eq!(
        eval_string("try { eval('+'); } catch (e) { e.name }"),
        "SyntaxError"
    );
}

#[test]
fn test_eval_completion_value() {
    assert_eq!(eval_number("eval('1; if (true) { 2; }')"), 2.0);
}

// ==================== Compilation limits and serialized scripts ====================

#[test]
fn test_register_limit_exceeded() {
    let options = CompileOptions {
        register_limit: 8,
        ..CompileOptions::default()
    };
    let rt = Runtime::with_options(VmConfig::default(), options);
    let args = (0..32).map(|i| i.to_string()).collect::<Vec<_>>().join(", ");
    let err = rt.compile(&format!("f({args})"), "big.js").unwrap_err();
    assert!(err.to_string().contains("register limit 8 exceeded"), "{err}");

    let small = rt.compile("var a = 1 + 2;", "small.js");
    assert!(small.is_ok());
}

#[test]
fn test_script_bytes_round_trip() {
    let mut rt = Runtime::new();
    let script = rt
        .compile("function sq(x) { return x * x; } var s = ''; for (let i = 1; i < 4; i++) s += sq(i); s", "bytes.js")
        .unwrap();
    let bytes = script.to_bytes().unwrap();
    let restored = Script::from_bytes(&bytes).unwrap();
    assert_eq!(restored.source_name, "bytes.js");
    assert_eq!(restored.functions.len(), script.functions.len());

    let value = rt.execute(Arc::new(restored)).unwrap();
    assert_eq!(rt.string_text(value).as_deref(), Some("149"));
}

#[test]
fn test_corrupt_bytes_rejected() {
    let rt = Runtime::new();
    let script = rt.compile("1", "bytes.js").unwrap();
    let mut bytes = script.to_bytes().unwrap();
    bytes[0] ^= 0xff;
    assert!(Script::from_bytes(&bytes).is_err());
    assert!(Script::from_bytes(&bytes[..4]).is_err());
}

#[test]
fn test_compiled_script_runs_in_many_runtimes() {
    let script = Runtime::new().compile("var g = (typeof g === 'number' ? g : 0) + 1; g", "shared.js").unwrap();
    for _ in 0..3 {
        let mut rt = Runtime::new();
        assert_eq!(rt.execute(Arc::clone(&script)).unwrap().as_number(), 1.0);
    }
}
