//! `Boolean.prototype`, `Number.prototype` and `String.prototype`

use skua_vm_gc::GcRef;

use super::define_symbol_method;
use crate::error::{VmError, VmResult};
use crate::number::number_to_string;
use crate::object::ObjectKind;
use crate::runtime::Runtime;
use crate::value::Value;

pub(super) fn init(rt: &mut Runtime) {
    let boolean = rt.intrinsics.boolean_prototype;
    rt.define_native_function(boolean, "toString", 0, boolean_to_string);
    rt.define_native_function(boolean, "valueOf", 0, boolean_value_of);

    let number = rt.intrinsics.number_prototype;
    rt.define_native_function(number, "toString", 0, number_to_string_method);
    rt.define_native_function(number, "valueOf", 0, number_value_of);

    let string = rt.intrinsics.string_prototype;
    rt.define_native_function(string, "toString", 0, string_value_of);
    rt.define_native_function(string, "valueOf", 0, string_value_of);
    let iterator = rt.intrinsics.symbol_iterator;
    define_symbol_method(rt, string, iterator, "[Symbol.iterator]", string_iterator);
}

fn incompatible(rt: &Runtime, method: &str, this: Value) -> VmError {
    VmError::type_error(format!(
        "{method} requires that 'this' be a primitive of the matching type, got {}",
        rt.display_value(this)
    ))
}

/// `thisBooleanValue`
fn this_boolean(rt: &Runtime, this: Value) -> VmResult<bool> {
    if this.is_boolean() {
        return Ok(this.as_boolean());
    }
    match this.as_object().map(|o| rt.object(o).kind()) {
        Some(ObjectKind::Boolean(b)) => Ok(*b),
        _ => Err(incompatible(rt, "Boolean.prototype.valueOf", this)),
    }
}

/// `thisNumberValue`
fn this_number(rt: &Runtime, this: Value) -> VmResult<f64> {
    if this.is_number() {
        return Ok(this.as_number());
    }
    match this.as_object().map(|o| rt.object(o).kind()) {
        Some(ObjectKind::Number(n)) => Ok(*n),
        _ => Err(incompatible(rt, "Number.prototype.valueOf", this)),
    }
}

/// `thisStringValue`
fn this_string(rt: &Runtime, this: Value) -> VmResult<Value> {
    if this.is_string() {
        return Ok(this);
    }
    match this.as_object().map(|o| rt.object(o).kind()) {
        Some(ObjectKind::String(s)) => Ok(Value::string(*s)),
        _ => Err(incompatible(rt, "String.prototype.valueOf", this)),
    }
}

fn boolean_to_string(rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let b = this_boolean(rt, this)?;
    Ok(rt.intern(if b { "true" } else { "false" }))
}

fn boolean_value_of(rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    this_boolean(rt, this).map(Value::from_bool)
}

fn number_to_string_method(rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let n = this_number(rt, this)?;
    Ok(rt.alloc_string(&number_to_string(n)))
}

fn number_value_of(rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    this_number(rt, this).map(Value::number)
}

fn string_value_of(rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    this_string(rt, this)
}

/// `String.prototype[Symbol.iterator]`, iterating code points
fn string_iterator(rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    if this.is_undefined_or_null() {
        return Err(VmError::type_error(
            "String.prototype[Symbol.iterator] called on null or undefined",
        ));
    }
    let text = rt.to_string_value(this)?;
    Ok(Value::object(rt.new_array_iterator(text)))
}

#[cfg(test)]
mod tests {
    use crate::runtime::Runtime;

    #[test]
    fn test_wrapper_value_of() {
        let mut rt = Runtime::new();
        let value = rt.evaluate("Object(5) + Object(true) + (1).toString()", "p.js").unwrap();
        assert_eq!(rt.string_text(value).as_deref(), Some("61"));
    }

    #[test]
    fn test_string_iteration_by_code_point() {
        let mut rt = Runtime::new();
        let value = rt
            .evaluate("var n = 0; for (var c of 'a😀b') n++; n", "p.js")
            .unwrap();
        assert_eq!(value.as_number(), 3.0);
    }

    #[test]
    fn test_value_of_rejects_other_receivers() {
        let mut rt = Runtime::new();
        let err = rt.evaluate("(1).valueOf.call('1')", "p.js");
        assert!(err.is_err());
    }
}
