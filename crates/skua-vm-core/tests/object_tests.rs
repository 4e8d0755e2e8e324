//! Object model tests: structures, inline caches, native accessors and host objects

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use skua_vm_core::inline_cache::CacheState;
use skua_vm_core::property::{NativeAccessor, PropertyAttributes, PropertyDescriptor, PropertyKey};
use skua_vm_core::{GcRef, HookResult, HostObjectHooks, Runtime, Value, VmResult};

fn number(rt: &mut Runtime, source: &str) -> f64 {
    rt.evaluate(source, "objects.js").unwrap().as_number()
}

fn text(rt: &mut Runtime, source: &str) -> String {
    let value = rt.evaluate(source, "objects.js").unwrap();
    rt.string_text(value).map(|s| s.to_string()).unwrap_or_default()
}

/// Cache states of every site in the function named `name`
fn cache_states(rt: &Runtime, name: &str) -> Vec<CacheState> {
    for loaded in rt.scripts() {
        for &code in &loaded.code {
            let block = rt.code_block(code);
            if block.block().display_name() == name {
                return block.caches.iter().map(|c| c.state()).collect();
            }
        }
    }
    panic!("no function named {name}");
}

// ==================== Structures ====================

#[test]
fn test_same_literal_shape_shares_structure() {
    let mut rt = Runtime::new();
    let a = rt.evaluate("({ x: 1, y: 2 })", "s.js").unwrap().as_object().unwrap();
    let b = rt.evaluate("({ x: 3, y: 4 })", "s.js").unwrap().as_object().unwrap();
    let c = rt.evaluate("({ y: 3, x: 4 })", "s.js").unwrap().as_object().unwrap();
    assert_eq!(rt.object(a).structure().id(), rt.object(b).structure().id());
    assert_ne!(rt.object(a).structure().id(), rt.object(c).structure().id());
}

#[test]
fn test_same_define_sequence_shares_structure() {
    let mut rt = Runtime::new();
    let a = rt.new_object();
    let b = rt.new_object();
    for object in [a, b] {
        for key in ["x", "y"] {
            let desc = PropertyDescriptor::data(Value::from_i32(1), PropertyAttributes::DEFAULT);
            assert!(rt.define_own_property(object, PropertyKey::from(key), desc).unwrap());
        }
    }
    let before = rt.object(a).structure().id();
    assert_eq!(before, rt.object(b).structure().id());

    for object in [a, b] {
        let desc = PropertyDescriptor::data(Value::from_i32(2), PropertyAttributes::HIDDEN);
        assert!(rt.define_own_property(object, PropertyKey::from("z"), desc).unwrap());
    }
    assert_eq!(rt.object(a).structure().id(), rt.object(b).structure().id());
    assert_ne!(rt.object(a).structure().id(), before);
}

#[test]
fn test_transition_survives_without_live_objects() {
    let mut rt = Runtime::new();
    let first = rt.evaluate("var a = {}; a.x = 1; a.y = 2; a", "shape.js").unwrap();
    let second = rt.evaluate("var b = {}; b.x = 3; b.y = 4; b", "shape.js").unwrap();
    let (Some(a), Some(b)) = (first.as_object(), second.as_object()) else {
        panic!("expected objects");
    };
    assert_eq!(rt.object(a).structure().id(), rt.object(b).structure().id());
}

#[test]
fn test_delete_keeps_remaining_properties() {
    let mut rt = Runtime::new();
    let value = text(
        &mut rt,
        "var o = { a: 1, b: 2, c: 3 }; delete o.b; o.d = 4; var s = ''; for (var k in o) s += k + o[k]; s",
    );
    assert_eq!(value, "a1c3d4");
}

#[test]
fn test_integer_keys_enumerate_first() {
    let mut rt = Runtime::new();
    let value = text(
        &mut rt,
        "var o = { b: 1 }; o[2] = 1; o.a = 1; o[0] = 1; var s = ''; for (var k in o) s += k; s",
    );
    assert_eq!(value, "02ba");
}

#[test]
fn test_array_length_tracks_elements() {
    let mut rt = Runtime::new();
    assert_eq!(number(&mut rt, "var a = [1, 2]; a[5] = 1; a.length"), 6.0);
    assert_eq!(number(&mut rt, "a.length = 1; a[5] === undefined ? a.length : -1"), 1.0);
    assert_eq!(number(&mut rt, "var h = [1, , 3]; (1 in h) ? 1 : 0"), 0.0);
}

// ==================== Inline caches ====================

#[test]
fn test_monomorphic_site() {
    let mut rt = Runtime::new();
    let sum = number(
        &mut rt,
        "function readX(o) { return o.x; }\n\
         var total = 0;\n\
         for (var i = 0; i < 10; i++) total += readX({ x: i });\n\
         total",
    );
    assert_eq!(sum, 45.0);
    assert!(cache_states(&rt, "readX").contains(&CacheState::Monomorphic));
}

#[test]
fn test_polymorphic_site() {
    let mut rt = Runtime::new();
    let sum = number(
        &mut rt,
        "function readX(o) { return o.x; }\n\
         var shapes = [{ x: 1 }, { a: 0, x: 2 }, { b: 0, x: 3 }];\n\
         var total = 0;\n\
         for (var i = 0; i < 9; i++) total += readX(shapes[i % 3]);\n\
         total",
    );
    assert_eq!(sum, 18.0);
    assert!(cache_states(&rt, "readX").contains(&CacheState::Polymorphic));
}

#[test]
fn test_megamorphic_site_stays_correct() {
    let mut rt = Runtime::new();
    let sum = number(
        &mut rt,
        "function readX(o) { return o.x; }\n\
         var shapes = [{ x: 1 }, { a: 0, x: 1 }, { b: 0, x: 1 }, { c: 0, x: 1 }, { d: 0, x: 1 }, { e: 0, x: 1 }];\n\
         var total = 0;\n\
         for (var i = 0; i < 60; i++) total += readX(shapes[i % 6]);\n\
         total",
    );
    assert_eq!(sum, 60.0);
    assert!(cache_states(&rt, "readX").contains(&CacheState::Megamorphic));
}

#[test]
fn test_cached_read_sees_added_property() {
    let mut rt = Runtime::new();
    let value = text(
        &mut rt,
        "function readY(o) { return o.y; }\n\
         var o = { x: 1 };\n\
         var s = '' + readY(o) + readY(o);\n\
         o.y = 2;\n\
         s + readY(o)",
    );
    assert_eq!(value, "undefinedundefined2");
}

#[test]
fn test_prototype_hit_invalidated_by_shadowing() {
    let mut rt = Runtime::new();
    let value = text(
        &mut rt,
        "var proto = { who: 'proto' };\n\
         function Make() {}\n\
         Make.prototype = proto;\n\
         function who(o) { return o.who; }\n\
         var o = new Make();\n\
         var s = who(o) + who(o);\n\
         proto.who = 'changed';\n\
         s += who(o);\n\
         o.who = 'own';\n\
         s + who(o)",
    );
    assert_eq!(value, "protoprotochangedown");
}

#[test]
fn test_store_transition_respects_setter_on_prototype() {
    let mut rt = Runtime::new();
    let value = text(
        &mut rt,
        "var log = '';\n\
         function put(o) { o.v = 1; }\n\
         put({}); put({});\n\
         var proto = {};\n\
         Object.defineProperty(proto, 'v', { set: function (x) { log += 'set' + x; } });\n\
         function C() {}\n\
         C.prototype = proto;\n\
         var child = new C();\n\
         put(child);\n\
         log + (child.hasOwnProperty('v') ? 'own' : 'none')",
    );
    assert_eq!(value, "set1none");
}

// ==================== Native accessors ====================

fn asdf_get(_rt: &mut Runtime, _holder: GcRef, _receiver: Value, storage: &Value) -> VmResult<Value> {
    Ok(*storage)
}

fn asdf_set(rt: &mut Runtime, _holder: GcRef, _receiver: Value, storage: &mut Value, value: Value) -> VmResult<bool> {
    let n = rt.to_number(value)?;
    *storage = Value::number(n * 2.0);
    Ok(true)
}

fn with_asdf(rt: &mut Runtime) -> GcRef {
    let object = rt.new_object();
    rt.define_native_accessor(
        object,
        "asdf",
        NativeAccessor {
            getter: Some(asdf_get),
            setter: Some(asdf_set),
        },
        Value::from_i32(10),
    );
    rt.define_global("o", Value::object(object));
    object
}

#[test]
fn test_native_accessor_reads_storage() {
    let mut rt = Runtime::new();
    with_asdf(&mut rt);
    assert_eq!(number(&mut rt, "o.asdf"), 10.0);
}

#[test]
fn test_native_accessor_setter_doubles() {
    let mut rt = Runtime::new();
    let object = with_asdf(&mut rt);
    assert_eq!(number(&mut rt, "o.asdf = 20; o.asdf"), 40.0);

    let key = PropertyKey::from("asdf");
    let read = rt.get(object, &key, Value::object(object)).unwrap();
    assert_eq!(read.as_number(), 40.0);
}

#[test]
fn test_native_accessor_visible_through_prototype() {
    let mut rt = Runtime::new();
    with_asdf(&mut rt);
    let value = number(
        &mut rt,
        "function C() {} C.prototype = o; var c = new C(); c.asdf = 3; c.asdf + o.asdf",
    );
    assert_eq!(value, 12.0);
}

#[test]
fn test_read_only_native_accessor() {
    let mut rt = Runtime::new();
    let object = rt.new_object();
    rt.define_native_accessor(
        object,
        "fixed",
        NativeAccessor {
            getter: Some(asdf_get),
            setter: None,
        },
        Value::from_i32(7),
    );
    rt.define_global("ro", Value::object(object));
    assert_eq!(number(&mut rt, "ro.fixed = 1; ro.fixed"), 7.0);
    let err = rt.evaluate("'use strict'; ro.fixed = 1", "strict.js").unwrap_err();
    assert!(err.to_string().contains("TypeError"));
}

// ==================== Host objects ====================

struct Counter {
    reads: Cell<u32>,
    writes: RefCell<Vec<String>>,
}

impl HostObjectHooks for Counter {
    fn class_name(&self) -> &str {
        "Counter"
    }

    fn get(&self, _rt: &mut Runtime, _this: GcRef, _receiver: Value, key: &PropertyKey) -> VmResult<HookResult> {
        match key {
            PropertyKey::String(name) if &**name == "reads" => {
                self.reads.set(self.reads.get() + 1);
                Ok(HookResult::Handled(Value::number(self.reads.get() as f64)))
            }
            _ => Ok(HookResult::Unhandled),
        }
    }

    fn set(
        &self,
        rt: &mut Runtime,
        _this: GcRef,
        _receiver: Value,
        key: &PropertyKey,
        value: Value,
    ) -> VmResult<HookResult> {
        match key {
            PropertyKey::String(name) if name.starts_with("log") => {
                let text = rt.to_string(value)?;
                self.writes.borrow_mut().push(format!("{name}={text}"));
                Ok(HookResult::Handled(Value::from_bool(true)))
            }
            _ => Ok(HookResult::Unhandled),
        }
    }

    fn has(&self, _rt: &mut Runtime, _this: GcRef, key: &PropertyKey) -> VmResult<HookResult> {
        Ok(match key {
            PropertyKey::String(name) if &**name == "reads" => HookResult::Handled(Value::from_bool(true)),
            _ => HookResult::Unhandled,
        })
    }

    fn delete(&self, _rt: &mut Runtime, _this: GcRef, key: &PropertyKey) -> VmResult<HookResult> {
        Ok(match key {
            PropertyKey::String(name) if &**name == "reads" => HookResult::Handled(Value::from_bool(false)),
            _ => HookResult::Unhandled,
        })
    }
}

fn with_counter(rt: &mut Runtime) -> Rc<Counter> {
    let hooks = Rc::new(Counter {
        reads: Cell::new(0),
        writes: RefCell::new(Vec::new()),
    });
    let object = rt.new_host_object(hooks.clone());
    rt.define_global("counter", Value::object(object));
    hooks
}

#[test]
fn test_host_get_hook() {
    let mut rt = Runtime::new();
    let hooks = with_counter(&mut rt);
    assert_eq!(number(&mut rt, "counter.reads + counter.reads"), 3.0);
    assert_eq!(hooks.reads.get(), 2);
}

#[test]
fn test_host_set_hook_and_fallback() {
    let mut rt = Runtime::new();
    let hooks = with_counter(&mut rt);
    let value = number(&mut rt, "counter.logA = 1; counter.plain = 5; counter.logA === undefined ? counter.plain : -1");
    assert_eq!(value, 5.0);
    assert_eq!(*hooks.writes.borrow(), vec!["logA=1".to_string()]);
}

#[test]
fn test_host_has_and_delete_hooks() {
    let mut rt = Runtime::new();
    with_counter(&mut rt);
    let value = rt
        .evaluate("('reads' in counter) && !('other' in counter) && !(delete counter.reads)", "host.js")
        .unwrap();
    assert!(value.as_boolean());
    let err = rt.evaluate("'use strict'; delete counter.reads", "host.js").unwrap_err();
    assert!(err.to_string().contains("TypeError"));
}

#[test]
fn test_host_object_tag() {
    let mut rt = Runtime::new();
    with_counter(&mut rt);
    assert_eq!(text(&mut rt, "Object.prototype.toString.call(counter)"), "[object Object]");
}

// ==================== [[DefineOwnProperty]] ====================

#[test]
fn test_define_own_property_rules() {
    let mut rt = Runtime::new();
    let object = rt.new_object();
    let key = PropertyKey::from("k");
    let frozen = PropertyDescriptor::data(Value::from_i32(1), PropertyAttributes::data(false, true, false));
    assert!(rt.define_own_property(object, key.clone(), frozen).unwrap());

    // identical redefinition is allowed
    assert!(rt.define_own_property(object, key.clone(), frozen).unwrap());

    let change = PropertyDescriptor {
        value: Some(Value::from_i32(2)),
        ..PropertyDescriptor::default()
    };
    assert!(!rt.define_own_property(object, key.clone(), change).unwrap());

    let loosen = PropertyDescriptor {
        configurable: Some(true),
        ..PropertyDescriptor::default()
    };
    assert!(!rt.define_own_property(object, key.clone(), loosen).unwrap());
    assert!(!rt.delete(object, &key).unwrap());

    let desc = rt.get_own_property_descriptor(object, &key).unwrap().unwrap();
    assert_eq!(desc.value.map(|v| v.as_number()), Some(1.0));
    assert_eq!(desc.writable, Some(false));
    assert_eq!(desc.enumerable, Some(true));
}

#[test]
fn test_non_extensible_rejects_new_keys() {
    let mut rt = Runtime::new();
    let object = rt.new_object();
    rt.prevent_extensions(object);
    let desc = PropertyDescriptor::data(Value::from_i32(1), PropertyAttributes::DEFAULT);
    assert!(!rt.define_own_property(object, PropertyKey::from("x"), desc).unwrap());
    assert!(!rt.set(object, &PropertyKey::from("x"), Value::from_i32(1), Value::object(object)).unwrap());
    assert!(rt.own_property_keys(object).unwrap().is_empty());
}

#[test]
fn test_accessor_descriptor_from_script() {
    let mut rt = Runtime::new();
    let value = text(
        &mut rt,
        "var o = {}; var backing = 'a';\n\
         Object.defineProperty(o, 'p', { get: function () { return backing; }, set: function (v) { backing = v + v; }, configurable: true });\n\
         o.p = 'b';\n\
         var before = o.p;\n\
         Object.defineProperty(o, 'p', { value: 'data' });\n\
         before + o.p",
    );
    assert_eq!(value, "bbdata");
}

#[test]
fn test_getter_setter_literals() {
    let mut rt = Runtime::new();
    let value = number(
        &mut rt,
        "var o = { _v: 1, get v() { return this._v * 10; }, set v(x) { this._v = x; } }; o.v = 4; o.v",
    );
    assert_eq!(value, 40.0);
}
