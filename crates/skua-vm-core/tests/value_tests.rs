//! Value tagging and conversion tests
//!
//! Properties of the NaN-boxed representation plus the coercions that run
//! through a live runtime.

use proptest::prelude::*;
use skua_vm_core::conversion::{same_value, strict_equals};
use skua_vm_core::{GcRef, Runtime, Value};

proptest! {
    #[test]
    fn prop_int32_round_trips(n in any::<i32>()) {
        let v = Value::from_i32(n);
        prop_assert!(v.is_int32());
        prop_assert!(v.is_number());
        prop_assert_eq!(v.as_int32(), n);
        prop_assert_eq!(v.as_number(), n as f64);
    }

    #[test]
    fn prop_doubles_round_trip(bits in any::<u64>()) {
        let n = f64::from_bits(bits);
        let v = Value::from_f64(n);
        prop_assert!(v.is_double());
        prop_assert!(!v.is_object() && !v.is_string() && !v.is_symbol());
        if bits < 0xFFFC_0000_0000_0000 {
            prop_assert_eq!(v.as_f64().to_bits(), bits);
        } else {
            prop_assert_eq!(v, Value::nan());
        }
    }

    #[test]
    fn prop_number_prefers_int32_when_exact(n in any::<f64>()) {
        let v = Value::number(n);
        let exact = n.fract() == 0.0
            && n >= i32::MIN as f64
            && n <= i32::MAX as f64
            && !(n == 0.0 && n.is_sign_negative());
        prop_assert_eq!(v.is_int32(), exact);
        if n.to_bits() < 0xFFFC_0000_0000_0000 {
            prop_assert_eq!(v.as_number().to_bits(), n.to_bits());
        }
    }

    #[test]
    fn prop_heap_handles_round_trip(index in any::<u32>(), generation in any::<u16>()) {
        let handle = GcRef::new(index, generation);
        prop_assert_eq!(Value::object(handle).as_object(), Some(handle));
        prop_assert_eq!(Value::string(handle).as_string(), Some(handle));
        prop_assert_eq!(Value::symbol(handle).as_symbol(), Some(handle));
        prop_assert_eq!(Value::object(handle).as_string(), None);
        prop_assert!(!Value::object(handle).is_number());
    }
}

#[test]
fn test_nan_payload_is_bitwise() {
    let bits = 0x7ff8_0000_dead_beef;
    assert_eq!(Value::from_f64(f64::from_bits(bits)).as_f64().to_bits(), bits);
    assert_eq!(Value::number(f64::from_bits(bits)).as_number().to_bits(), bits);
}

#[test]
fn test_bit_patterns_are_distinct() {
    let singletons = [
        Value::undefined(),
        Value::null(),
        Value::empty(),
        Value::from_bool(true),
        Value::from_bool(false),
        Value::from_i32(0),
        Value::nan(),
    ];
    for (i, a) in singletons.iter().enumerate() {
        for b in &singletons[i + 1..] {
            assert_ne!(a.to_bits(), b.to_bits());
        }
    }
}

#[test]
fn test_string_to_number() {
    let mut rt = Runtime::new();
    for (source, expected) in [("'  12  '", 12.0), ("'0x10'", 16.0), ("''", 0.0), ("'1e3'", 1000.0)] {
        let value = rt.evaluate(&format!("+{source}"), "conv.js").unwrap();
        assert_eq!(value.as_number(), expected, "{source}");
    }
    let nan = rt.evaluate("+'12px'", "conv.js").unwrap();
    assert!(nan.as_number().is_nan());
}

#[test]
fn test_number_to_string() {
    let mut rt = Runtime::new();
    for (source, expected) in [
        ("'' + 1.5", "1.5"),
        ("'' + -0", "0"),
        ("'' + 1e21", "1e+21"),
        ("'' + 0.000001", "0.000001"),
        ("'' + 1e-7", "1e-7"),
        ("'' + (0 / 0)", "NaN"),
        ("'' + (-1 / 0)", "-Infinity"),
    ] {
        let value = rt.evaluate(source, "conv.js").unwrap();
        assert_eq!(rt.string_text(value).as_deref(), Some(expected), "{source}");
    }
}

#[test]
fn test_to_primitive_calls_user_code() {
    let mut rt = Runtime::new();
    let value = rt
        .evaluate(
            "var o = { valueOf: function () { return 41; } }; o + 1",
            "conv.js",
        )
        .unwrap();
    assert_eq!(value.as_number(), 42.0);

    let value = rt
        .evaluate(
            "var t = {}; t[Symbol.toPrimitive] = function (hint) { return hint; }; '' + t + `${t}`",
            "conv.js",
        )
        .unwrap();
    assert_eq!(rt.string_text(value).as_deref(), Some("defaultstring"));
}

#[test]
fn test_to_primitive_errors_propagate() {
    let mut rt = Runtime::new();
    let err = rt
        .evaluate("var o = { valueOf: function () { throw new RangeError('nope'); } }; o * 2", "conv.js")
        .unwrap_err();
    assert!(err.to_string().contains("RangeError: nope"));
}

#[test]
fn test_equality_algorithms() {
    let rt = Runtime::new();
    assert!(strict_equals(&rt, Value::from_i32(1), Value::from_f64(1.0)));
    assert!(!strict_equals(&rt, Value::nan(), Value::nan()));
    assert!(same_value(&rt, Value::nan(), Value::nan()));
    assert!(!same_value(&rt, Value::from_f64(-0.0), Value::from_i32(0)));

    let mut rt = Runtime::new();
    let loose = rt
        .evaluate("(null == undefined) && ('1' == 1) && (0 == '') && !(null == 0) && (true == 1)", "eq.js")
        .unwrap();
    assert!(loose.as_boolean());
}

#[test]
fn test_int32_conversions() {
    let mut rt = Runtime::new();
    let value = rt
        .evaluate("[(4294967296 + 5) | 0, -1 >>> 0, 1 << 31, 2147483647 + 1]", "int.js")
        .unwrap();
    let array = value.as_object().unwrap();
    let get = |rt: &mut Runtime, i: u32| {
        rt.get(array, &skua_vm_core::PropertyKey::Index(i), value).unwrap().as_number()
    };
    assert_eq!(get(&mut rt, 0), 5.0);
    assert_eq!(get(&mut rt, 1), 4294967295.0);
    assert_eq!(get(&mut rt, 2), -2147483648.0);
    assert_eq!(get(&mut rt, 3), 2147483648.0);
}

#[test]
fn test_typeof() {
    let mut rt = Runtime::new();
    let value = rt
        .evaluate(
            "typeof 1 + typeof 'a' + typeof undefined + typeof null + typeof {} + typeof function () {} + typeof Symbol() + typeof undeclared",
            "typeof.js",
        )
        .unwrap();
    assert_eq!(
        rt.string_text(value).as_deref(),
        Some("numberstringundefinedobjectobjectfunctionsymbolundefined")
    );
}
