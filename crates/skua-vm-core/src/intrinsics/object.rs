//! `Object` constructor and `Object.prototype`

use skua_vm_gc::GcRef;

use super::{arg, install_constructor, prototype_from};
use crate::error::{VmError, VmResult};
use crate::object::ObjectKind;
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::runtime::Runtime;
use crate::value::Value;

pub(super) fn init(rt: &mut Runtime) {
    let ctor = rt.intrinsics.object;
    let proto = rt.intrinsics.object_prototype;
    install_constructor(rt, ctor, "Object", 1, proto);

    rt.define_native_function(ctor, "getPrototypeOf", 1, get_prototype_of);
    rt.define_native_function(ctor, "setPrototypeOf", 2, set_prototype_of);
    rt.define_native_function(ctor, "defineProperty", 3, define_property);
    rt.define_native_function(ctor, "keys", 1, keys);

    rt.define_native_function(proto, "toString", 0, to_string);
    rt.define_native_function(proto, "valueOf", 0, value_of);
    rt.define_native_function(proto, "hasOwnProperty", 1, has_own_property);
}

pub(super) fn object_constructor(
    rt: &mut Runtime,
    _this: Value,
    args: &[Value],
    new_target: Option<GcRef>,
) -> VmResult<Value> {
    if let Some(target) = new_target
        && target != rt.intrinsics.object
    {
        let fallback = rt.intrinsics.object_prototype;
        let proto = prototype_from(rt, Some(target), fallback)?;
        return Ok(Value::object(rt.new_object_with(Some(proto), ObjectKind::Ordinary)));
    }
    let value = arg(args, 0);
    if value.is_undefined_or_null() {
        return Ok(Value::object(rt.new_object()));
    }
    rt.to_object(value).map(Value::object)
}

fn get_prototype_of(rt: &mut Runtime, _this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let object = rt.to_object(arg(args, 0))?;
    Ok(rt.get_prototype_of(object).map_or(Value::null(), Value::object))
}

fn set_prototype_of(rt: &mut Runtime, _this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let (target, proto) = (arg(args, 0), arg(args, 1));
    if target.is_undefined_or_null() {
        return Err(VmError::type_error("Object.setPrototypeOf called on null or undefined"));
    }
    if !proto.is_object() && !proto.is_null() {
        return Err(VmError::type_error(format!(
            "Object prototype may only be an Object or null: {}",
            rt.display_value(proto)
        )));
    }
    let Some(object) = target.as_object() else {
        return Ok(target);
    };
    if !rt.set_prototype_of(object, proto.as_object()) {
        return Err(VmError::type_error("Cyclic __proto__ value or non-extensible object"));
    }
    Ok(target)
}

fn define_property(rt: &mut Runtime, _this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let target = arg(args, 0);
    let Some(object) = target.as_object() else {
        return Err(VmError::type_error("Object.defineProperty called on non-object"));
    };
    let key = rt.to_property_key(arg(args, 1))?;
    let desc = to_property_descriptor(rt, arg(args, 2))?;
    if !rt.define_own_property(object, key.clone(), desc)? {
        return Err(VmError::type_error(format!("Cannot redefine property: {key}")));
    }
    Ok(target)
}

/// `ToPropertyDescriptor`
fn to_property_descriptor(rt: &mut Runtime, value: Value) -> VmResult<PropertyDescriptor> {
    let Some(object) = value.as_object() else {
        return Err(VmError::type_error(format!(
            "Property description must be an object: {}",
            rt.display_value(value)
        )));
    };
    let mut desc = PropertyDescriptor::default();
    let field = |rt: &mut Runtime, name: &str| -> VmResult<Option<Value>> {
        let key = PropertyKey::from_name(name);
        if rt.has_property(object, &key)? {
            rt.get(object, &key, value).map(Some)
        } else {
            Ok(None)
        }
    };
    desc.enumerable = field(rt, "enumerable")?.map(|v| rt.to_boolean(v));
    desc.configurable = field(rt, "configurable")?.map(|v| rt.to_boolean(v));
    desc.value = field(rt, "value")?;
    desc.writable = field(rt, "writable")?.map(|v| rt.to_boolean(v));
    desc.get = field(rt, "get")?;
    desc.set = field(rt, "set")?;

    for accessor in [desc.get, desc.set].into_iter().flatten() {
        if !accessor.is_undefined() && !rt.is_callable(accessor) {
            return Err(VmError::type_error(format!(
                "Getter or setter must be a function: {}",
                rt.display_value(accessor)
            )));
        }
    }
    if (desc.get.is_some() || desc.set.is_some()) && (desc.value.is_some() || desc.writable.is_some()) {
        return Err(VmError::type_error(
            "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute",
        ));
    }
    Ok(desc)
}

fn keys(rt: &mut Runtime, _this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let object = rt.to_object(arg(args, 0))?;
    let keys = rt.own_enumerable_string_keys(object)?;
    let values = keys.iter().map(|key| rt.key_to_value(key)).collect();
    Ok(Value::object(rt.new_array(values)))
}

fn to_string(rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let tag = if this.is_undefined() {
        "Undefined"
    } else if this.is_null() {
        "Null"
    } else {
        let object = rt.to_object(this)?;
        rt.object(object).kind().class_name()
    };
    Ok(rt.alloc_string(&format!("[object {tag}]")))
}

fn value_of(rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    rt.to_object(this).map(Value::object)
}

fn has_own_property(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let key = rt.to_property_key(arg(args, 0))?;
    let object = rt.to_object(this)?;
    rt.has_own_property(object, &key).map(Value::from_bool)
}

#[cfg(test)]
mod tests {
    use crate::runtime::Runtime;
    use crate::value::Value;

    fn eval(source: &str) -> (Runtime, Value) {
        let mut rt = Runtime::new();
        let value = rt.evaluate(source, "object.js").unwrap();
        (rt, value)
    }

    #[test]
    fn test_define_property_accessor() {
        let (_, value) = eval(
            "var o = {}; var hits = 0;\n\
             Object.defineProperty(o, 'x', { get: function () { hits++; return 7; } });\n\
             o.x + o.x + hits",
        );
        assert_eq!(value.as_number(), 16.0);
    }

    #[test]
    fn test_non_writable_ignored_in_sloppy_mode() {
        let (_, value) = eval("var o = {}; Object.defineProperty(o, 'x', { value: 1 }); o.x = 2; o.x");
        assert_eq!(value.as_number(), 1.0);
    }

    #[test]
    fn test_redefine_non_configurable_throws() {
        let mut rt = Runtime::new();
        let err = rt
            .evaluate(
                "var o = {}; Object.defineProperty(o, 'x', { value: 1 });\n\
                 Object.defineProperty(o, 'x', { value: 2 });",
                "object.js",
            )
            .unwrap_err();
        assert!(err.to_string().contains("Cannot redefine property"));
    }

    #[test]
    fn test_keys_order() {
        let (rt, value) = eval("var k = Object.keys({ b: 1, 2: 0, a: 2, 1: 0 }); k[0] + k[1] + k[2] + k[3]");
        assert_eq!(rt.string_text(value).as_deref(), Some("12ba"));
    }

    #[test]
    fn test_set_prototype_of_rejects_cycles() {
        let mut rt = Runtime::new();
        let err = rt
            .evaluate("var a = {}; var b = Object.setPrototypeOf({}, a); Object.setPrototypeOf(a, b)", "o.js")
            .unwrap_err();
        assert!(err.to_string().contains("Cyclic __proto__ value"));
    }

    #[test]
    fn test_to_string_tags() {
        let (rt, value) = eval("Object.prototype.toString.call([]) + Object.prototype.toString.call(null)");
        assert_eq!(rt.string_text(value).as_deref(), Some("[object Array][object Null]"));
    }
}
