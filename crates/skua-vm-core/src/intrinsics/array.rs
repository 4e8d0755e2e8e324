//! `Array`, `%ArrayIteratorPrototype%` and `%IteratorPrototype%`

use skua_vm_gc::GcRef;

use super::{arg, define_symbol_method, install_constructor, prototype_from};
use crate::error::{VmError, VmResult};
use crate::object::ObjectKind;
use crate::property::{PropertyAttributes, PropertyKey};
use crate::runtime::Runtime;
use crate::value::Value;

/// Largest valid array length
const MAX_ARRAY_LENGTH: f64 = u32::MAX as f64;

pub(super) fn init(rt: &mut Runtime) {
    let ctor = rt.intrinsics.array;
    let proto = rt.intrinsics.array_prototype;
    install_constructor(rt, ctor, "Array", 1, proto);
    rt.define_native_function(ctor, "isArray", 1, is_array);

    rt.define_native_function(proto, "push", 1, push);
    rt.define_native_function(proto, "join", 1, join);
    rt.define_native_function(proto, "toString", 0, to_string);
    let values = rt.intrinsics.array_values;
    rt.define_function_name_and_length(values, "values", 0);
    rt.define_data(proto, "values", Value::object(values), PropertyAttributes::HIDDEN);
    let iterator = rt.intrinsics.symbol_iterator;
    rt.define_data(proto, PropertyKey::Symbol(iterator), Value::object(values), PropertyAttributes::HIDDEN);

    let iterator_proto = rt.intrinsics.iterator_prototype;
    define_symbol_method(rt, iterator_proto, iterator, "[Symbol.iterator]", return_this);

    let array_iterator_proto = rt.intrinsics.array_iterator_prototype;
    let next = rt.intrinsics.array_iterator_next;
    rt.define_function_name_and_length(next, "next", 0);
    rt.define_data(array_iterator_proto, "next", Value::object(next), PropertyAttributes::HIDDEN);
}

pub(super) fn array_constructor(
    rt: &mut Runtime,
    _this: Value,
    args: &[Value],
    new_target: Option<GcRef>,
) -> VmResult<Value> {
    let fallback = rt.intrinsics.array_prototype;
    let proto = prototype_from(rt, new_target, fallback)?;
    let array = match args {
        [length] if length.is_number() => {
            let n = length.as_number();
            if n < 0.0 || n > MAX_ARRAY_LENGTH || n.fract() != 0.0 {
                return Err(VmError::range_error("Invalid array length"));
            }
            rt.new_object_with(Some(proto), ObjectKind::Array { length: n as u32 })
        }
        _ => {
            let array = rt.new_array(args.to_vec());
            rt.set_prototype_of(array, Some(proto));
            array
        }
    };
    Ok(Value::object(array))
}

fn is_array(rt: &mut Runtime, _this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let is_array = arg(args, 0)
        .as_object()
        .is_some_and(|o| matches!(rt.object(o).kind(), ObjectKind::Array { .. }));
    Ok(Value::from_bool(is_array))
}

fn push(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let object = rt.to_object(this)?;
    let target = Value::object(object);
    let length = rt.length_of(target)?;
    if length + args.len() as u64 > 9_007_199_254_740_991 {
        return Err(VmError::type_error("Pushing items would exceed the maximum array length"));
    }
    for (offset, value) in args.iter().enumerate() {
        let index = length + offset as u64;
        let key = match u32::try_from(index) {
            Ok(index) if index < u32::MAX => PropertyKey::Index(index),
            _ => PropertyKey::from_name(&index.to_string()),
        };
        rt.set_value(target, &key, *value, true)?;
    }
    let new_length = Value::number((length + args.len() as u64) as f64);
    rt.set_value(target, &PropertyKey::from_name("length"), new_length, true)?;
    Ok(new_length)
}

/// `Array.prototype.join`; holes, `undefined` and `null` become empty strings
fn join(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let object = rt.to_object(this)?;
    let target = Value::object(object);
    let length = rt.length_of(target)?;
    let separator = match arg(args, 0) {
        sep if sep.is_undefined() => ",".into(),
        sep => rt.to_string(sep)?,
    };
    let mut out = String::new();
    for index in 0..length {
        if index > 0 {
            out.push_str(&separator);
        }
        let key = match u32::try_from(index) {
            Ok(index) if index < u32::MAX => PropertyKey::Index(index),
            _ => PropertyKey::from_name(&index.to_string()),
        };
        let element = rt.get(object, &key, target)?;
        if !element.is_undefined_or_null() {
            out.push_str(&rt.to_string(element)?);
        }
    }
    Ok(rt.alloc_string(&out))
}

/// `Array.prototype.toString` delegates to `join`, falling back to
/// `Object.prototype.toString` when `join` is not callable
fn to_string(rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let object = rt.to_object(this)?;
    let target = Value::object(object);
    let join = rt.get(object, &PropertyKey::from_name("join"), target)?;
    if rt.is_callable(join) {
        return rt.call(join, target, &[]);
    }
    let object_proto = rt.intrinsics.object_prototype;
    let fallback = rt.get(object_proto, &PropertyKey::from_name("toString"), target)?;
    rt.call(fallback, target, &[])
}

/// `Array.prototype.values`
pub(super) fn array_values(rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let object = rt.to_object(this)?;
    Ok(Value::object(rt.new_array_iterator(Value::object(object))))
}

/// `%ArrayIteratorPrototype%.next`
pub(super) fn array_iterator_next(
    rt: &mut Runtime,
    this: Value,
    _args: &[Value],
    _nt: Option<GcRef>,
) -> VmResult<Value> {
    let Some(iterator) = this
        .as_object()
        .filter(|o| matches!(rt.object(*o).kind(), ObjectKind::ArrayIterator(_)))
    else {
        return Err(VmError::type_error(format!(
            "next method called on incompatible receiver {}",
            rt.display_value(this)
        )));
    };
    Ok(match rt.array_iterator_step(iterator)? {
        Some(value) => rt.iter_result(value, false),
        None => rt.iter_result(Value::undefined(), true),
    })
}

fn return_this(_rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    Ok(this)
}

#[cfg(test)]
mod tests {
    use crate::error::VmError;
    use crate::runtime::Runtime;

    fn number(source: &str) -> f64 {
        let mut rt = Runtime::new();
        rt.evaluate(source, "array.js").unwrap().as_number()
    }

    #[test]
    fn test_constructor_forms() {
        assert_eq!(number("new Array(5).length"), 5.0);
        assert_eq!(number("Array(1, 2, 3).length"), 3.0);
        assert_eq!(number("Array('x').length"), 1.0);
    }

    #[test]
    fn test_invalid_length() {
        let mut rt = Runtime::new();
        let err = rt.evaluate("new Array(-1)", "array.js").unwrap_err();
        assert!(err.to_string().contains("Invalid array length"));
        assert!(!matches!(err, VmError::InternalError(_)));
    }

    #[test]
    fn test_push_returns_length() {
        assert_eq!(number("var a = [1]; a.push(2, 3) * 10 + a[2]"), 33.0);
    }

    #[test]
    fn test_push_on_array_like() {
        assert_eq!(number("var o = { length: 1 }; Array.prototype.push.call(o, 'x'); o.length"), 2.0);
    }

    #[test]
    fn test_length_truncates() {
        assert_eq!(number("var a = [1, 2, 3, 4]; a.length = 1; a.length + (a[2] === undefined ? 10 : 0)"), 11.0);
    }

    #[test]
    fn test_iterator_protocol() {
        assert_eq!(
            number(
                "var it = [4, 5][Symbol.iterator](); var a = it.next(); var b = it.next(); var c = it.next();\n\
                 a.value + b.value + (c.done ? 100 : 0) + (it[Symbol.iterator]() === it ? 1000 : 0)"
            ),
            1109.0
        );
    }

    #[test]
    fn test_join_and_to_string() {
        let mut rt = Runtime::new();
        let value = rt.evaluate("[1, null, , 'x'].join('-')", "array.js").unwrap();
        assert_eq!(rt.string_text(value).as_deref(), Some("1---x"));
        let value = rt.evaluate("[1, 2] + ''", "array.js").unwrap();
        assert_eq!(rt.string_text(value).as_deref(), Some("1,2"));
        let value = rt.evaluate("[] + {}", "array.js").unwrap();
        assert_eq!(rt.string_text(value).as_deref(), Some("[object Object]"));
        let value = rt.evaluate("'' + [[1, 2], [3]]", "array.js").unwrap();
        assert_eq!(rt.string_text(value).as_deref(), Some("1,2,3"));
    }

    #[test]
    fn test_is_array() {
        let mut rt = Runtime::new();
        let value = rt.evaluate("Array.isArray([]) && !Array.isArray({ length: 0 })", "array.js").unwrap();
        assert!(value.as_boolean());
    }
}
