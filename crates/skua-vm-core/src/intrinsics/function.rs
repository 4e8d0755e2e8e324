//! `Function.prototype`

use skua_vm_gc::GcRef;

use super::{arg, define_symbol_method};
use crate::error::{VmError, VmResult};
use crate::function::{FunctionData, FunctionKind};
use crate::object::ObjectKind;
use crate::property::PropertyKey;
use crate::runtime::Runtime;
use crate::value::Value;

pub(super) fn init(rt: &mut Runtime) {
    let proto = rt.intrinsics.function_prototype;
    rt.define_function_name_and_length(proto, "", 0);
    rt.define_native_function(proto, "call", 1, call);
    rt.define_native_function(proto, "apply", 2, apply);
    rt.define_native_function(proto, "bind", 1, bind);
    rt.define_native_function(proto, "toString", 0, to_string);
    let has_instance = rt.intrinsics.symbol_has_instance;
    define_symbol_method(rt, proto, has_instance, "[Symbol.hasInstance]", has_instance_method);
}

/// `%Function.prototype%` itself accepts any arguments and returns `undefined`
pub(super) fn function_prototype_call(
    _rt: &mut Runtime,
    _this: Value,
    _args: &[Value],
    _nt: Option<GcRef>,
) -> VmResult<Value> {
    Ok(Value::undefined())
}

fn this_function(rt: &Runtime, this: Value, method: &str) -> VmResult<GcRef> {
    match this.as_object() {
        Some(function) if rt.is_callable(this) => Ok(function),
        _ => Err(VmError::type_error(format!(
            "Function.prototype.{method} called on {}, which is not a function",
            rt.display_value(this)
        ))),
    }
}

fn call(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    this_function(rt, this, "call")?;
    let rest = args.get(1..).unwrap_or_default();
    rt.call(this, arg(args, 0), rest)
}

fn apply(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    this_function(rt, this, "apply")?;
    let list = arg(args, 1);
    let list = if list.is_undefined_or_null() {
        Vec::new()
    } else if list.is_object() {
        rt.array_to_list(list)?
    } else {
        return Err(VmError::type_error("CreateListFromArrayLike called on non-object"));
    };
    rt.call(this, arg(args, 0), &list)
}

fn bind(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let target = this_function(rt, this, "bind")?;
    let bound_args = args.get(1..).unwrap_or_default().to_vec();

    let length = match rt.get(target, &PropertyKey::from_name("length"), this)? {
        len if len.is_number() => {
            let len = rt.to_integer_or_infinity(len)?;
            (len - bound_args.len() as f64).max(0.0)
        }
        _ => 0.0,
    };
    let name = rt.get(target, &PropertyKey::from_name("name"), this)?;
    let name = rt.string_text(name).unwrap_or_else(|| "".into());
    let name = format!("bound {name}");

    let proto = rt.get_prototype_of(target);
    let data = FunctionData {
        name: name.as_str().into(),
        is_constructor: rt.is_constructor(this),
        kind: FunctionKind::Bound {
            target,
            this: arg(args, 0),
            args: bound_args,
        },
    };
    let bound = rt.new_object_with(proto, ObjectKind::Function(Box::new(data)));
    rt.define_function_name_and_length(bound, &name, length.min(u32::MAX as f64) as u32);
    Ok(Value::object(bound))
}

fn to_string(rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let function = this_function(rt, this, "toString")?;
    let name = rt.function_data(function).map(|data| data.name.to_string()).unwrap_or_default();
    Ok(rt.alloc_string(&format!("function {name}() {{ [native code] }}")))
}

fn has_instance_method(rt: &mut Runtime, this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    match this.as_object() {
        Some(function) if rt.is_callable(this) => rt.ordinary_has_instance(function, arg(args, 0)).map(Value::from_bool),
        _ => Ok(Value::from_bool(false)),
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::Runtime;

    #[test]
    fn test_call_and_apply() {
        let mut rt = Runtime::new();
        let value = rt
            .evaluate(
                "function f(a, b) { return this.base + a + b; }\n\
                 var o = { base: 100 };\n\
                 f.call(o, 1, 2) + f.apply(o, [3, 4])",
                "fn.js",
            )
            .unwrap();
        assert_eq!(value.as_number(), 210.0);
    }

    #[test]
    fn test_bind_prepends_arguments() {
        let mut rt = Runtime::new();
        let value = rt
            .evaluate(
                "function f(a, b, c) { return a * 100 + b * 10 + c; }\n\
                 var g = f.bind(null, 1, 2);\n\
                 g(3) + g.length * 1000",
                "fn.js",
            )
            .unwrap();
        assert_eq!(value.as_number(), 1123.0);
    }

    #[test]
    fn test_bound_constructor_ignores_bound_this() {
        let mut rt = Runtime::new();
        let value = rt
            .evaluate(
                "function P(x) { this.x = x; }\n\
                 var B = P.bind({ x: 'wrong' }, 5);\n\
                 var p = new B();\n\
                 p.x === 5 && p instanceof P",
                "fn.js",
            )
            .unwrap();
        assert!(value.as_boolean());
    }

    #[test]
    fn test_bound_name() {
        let mut rt = Runtime::new();
        let value = rt.evaluate("function foo() {} foo.bind(null).name", "fn.js").unwrap();
        assert_eq!(rt.string_text(value).as_deref(), Some("bound foo"));
    }

    #[test]
    fn test_call_on_non_function_throws() {
        let mut rt = Runtime::new();
        let err = rt.evaluate("(function () {}).call.call(1)", "fn.js").unwrap_err();
        assert!(err.to_string().contains("is not a function"));
    }
}
