//! `Error` and its native subclasses

use skua_vm_gc::GcRef;

use super::{arg, install_constructor, prototype_from};
use crate::error::{VmError, VmResult};
use crate::object::ObjectKind;
use crate::property::{PropertyAttributes, PropertyKey};
use crate::runtime::Runtime;
use crate::value::Value;

pub(super) fn init(rt: &mut Runtime) {
    let i = rt.intrinsics.clone();
    let classes = [
        (i.error, "Error", i.error_prototype),
        (i.type_error, "TypeError", i.type_error_prototype),
        (i.reference_error, "ReferenceError", i.reference_error_prototype),
        (i.range_error, "RangeError", i.range_error_prototype),
        (i.syntax_error, "SyntaxError", i.syntax_error_prototype),
        (i.uri_error, "URIError", i.uri_error_prototype),
        (i.eval_error, "EvalError", i.eval_error_prototype),
    ];
    for (ctor, name, proto) in classes {
        install_constructor(rt, ctor, name, 1, proto);
        let name = rt.intern(name);
        rt.define_data(proto, "name", name, PropertyAttributes::HIDDEN);
        let empty = rt.intern("");
        rt.define_data(proto, "message", empty, PropertyAttributes::HIDDEN);
    }
    rt.define_native_function(i.error_prototype, "toString", 0, to_string);
}

/// Shared body of the error constructors; callable without `new`
fn construct_error(rt: &mut Runtime, name: &str, args: &[Value], new_target: Option<GcRef>) -> VmResult<Value> {
    let fallback = rt.intrinsics.error_prototype_for(name);
    let proto = prototype_from(rt, new_target, fallback)?;
    let error = rt.new_object_with(Some(proto), ObjectKind::Error);

    let message = arg(args, 0);
    let text = if message.is_undefined() {
        "".into()
    } else {
        let text = rt.to_string(message)?;
        let value = if message.is_string() { message } else { rt.alloc_string(&text) };
        rt.define_data(error, "message", value, PropertyAttributes::HIDDEN);
        text
    };
    let stack = rt.capture_stack_below_natives();
    rt.install_stack(error, name, &text, &stack);
    Ok(Value::object(error))
}

pub(super) fn error_constructor(rt: &mut Runtime, _this: Value, args: &[Value], nt: Option<GcRef>) -> VmResult<Value> {
    construct_error(rt, "Error", args, nt)
}

pub(super) fn type_error_constructor(
    rt: &mut Runtime,
    _this: Value,
    args: &[Value],
    nt: Option<GcRef>,
) -> VmResult<Value> {
    construct_error(rt, "TypeError", args, nt)
}

pub(super) fn reference_error_constructor(
    rt: &mut Runtime,
    _this: Value,
    args: &[Value],
    nt: Option<GcRef>,
) -> VmResult<Value> {
    construct_error(rt, "ReferenceError", args, nt)
}

pub(super) fn range_error_constructor(
    rt: &mut Runtime,
    _this: Value,
    args: &[Value],
    nt: Option<GcRef>,
) -> VmResult<Value> {
    construct_error(rt, "RangeError", args, nt)
}

pub(super) fn syntax_error_constructor(
    rt: &mut Runtime,
    _this: Value,
    args: &[Value],
    nt: Option<GcRef>,
) -> VmResult<Value> {
    construct_error(rt, "SyntaxError", args, nt)
}

pub(super) fn uri_error_constructor(
    rt: &mut Runtime,
    _this: Value,
    args: &[Value],
    nt: Option<GcRef>,
) -> VmResult<Value> {
    construct_error(rt, "URIError", args, nt)
}

pub(super) fn eval_error_constructor(
    rt: &mut Runtime,
    _this: Value,
    args: &[Value],
    nt: Option<GcRef>,
) -> VmResult<Value> {
    construct_error(rt, "EvalError", args, nt)
}

/// `Error.prototype.toString`
fn to_string(rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let Some(object) = this.as_object() else {
        return Err(VmError::type_error(format!(
            "Error.prototype.toString called on {}",
            rt.display_value(this)
        )));
    };
    let name = rt.get(object, &PropertyKey::from_name("name"), this)?;
    let name = if name.is_undefined() {
        "Error".into()
    } else {
        rt.to_string(name)?
    };
    let message = rt.get(object, &PropertyKey::from_name("message"), this)?;
    let message = if message.is_undefined() {
        "".into()
    } else {
        rt.to_string(message)?
    };
    let text = match (name.is_empty(), message.is_empty()) {
        (_, true) => name.to_string(),
        (true, false) => message.to_string(),
        (false, false) => format!("{name}: {message}"),
    };
    Ok(rt.alloc_string(&text))
}

#[cfg(test)]
mod tests {
    use crate::runtime::Runtime;

    fn text(source: &str) -> String {
        let mut rt = Runtime::new();
        let value = rt.evaluate(source, "error.js").unwrap();
        rt.string_text(value).map(|s| s.to_string()).unwrap_or_default()
    }

    #[test]
    fn test_to_string() {
        assert_eq!(text("'' + new TypeError('bad')"), "TypeError: bad");
        assert_eq!(text("new Error().toString()"), "Error");
        assert_eq!(text("var e = new Error('m'); e.name = ''; e.toString()"), "m");
    }

    #[test]
    fn test_callable_without_new() {
        assert_eq!(text("var e = RangeError('r'); (e instanceof RangeError && e instanceof Error) + ''"), "true");
    }

    #[test]
    fn test_stack_names_function() {
        let stack = text("function thrower() { return new Error('x').stack; } thrower()");
        assert!(stack.starts_with("Error: x\n"));
        assert!(stack.contains("at thrower (error.js:1:"));
    }

    #[test]
    fn test_engine_errors_use_intrinsic_prototypes() {
        assert_eq!(
            text("var r; try { null.x } catch (e) { r = (e instanceof TypeError) + ':' + e.name } r"),
            "true:TypeError"
        );
    }
}
