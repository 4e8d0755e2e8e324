//! `Symbol`

use skua_vm_gc::GcRef;

use super::{arg, install_constructor};
use crate::error::{VmError, VmResult};
use crate::object::ObjectKind;
use crate::property::PropertyAttributes;
use crate::runtime::Runtime;
use crate::value::Value;

pub(super) fn init(rt: &mut Runtime) {
    let ctor = rt.intrinsics.symbol;
    let proto = rt.intrinsics.symbol_prototype;
    install_constructor(rt, ctor, "Symbol", 0, proto);

    let frozen = PropertyAttributes::data(false, false, false);
    let well_known = [
        ("iterator", rt.intrinsics.symbol_iterator),
        ("asyncIterator", rt.intrinsics.symbol_async_iterator),
        ("hasInstance", rt.intrinsics.symbol_has_instance),
        ("toPrimitive", rt.intrinsics.symbol_to_primitive),
    ];
    for (name, symbol) in well_known {
        rt.define_data(ctor, name, Value::symbol(symbol), frozen);
    }

    rt.define_native_function(proto, "toString", 0, to_string);
    rt.define_native_function(proto, "valueOf", 0, value_of);
}

/// `Symbol([description])`; `new Symbol()` throws
pub(super) fn symbol_function(rt: &mut Runtime, _this: Value, args: &[Value], nt: Option<GcRef>) -> VmResult<Value> {
    if nt.is_some() {
        return Err(VmError::type_error("Symbol is not a constructor"));
    }
    let description = arg(args, 0);
    let description = if description.is_undefined() {
        None
    } else {
        Some(rt.to_string(description)?)
    };
    Ok(rt.new_symbol(description.as_deref()))
}

/// `thisSymbolValue`
fn this_symbol(rt: &Runtime, this: Value) -> VmResult<GcRef> {
    if let Some(symbol) = this.as_symbol() {
        return Ok(symbol);
    }
    match this.as_object().map(|o| rt.object(o).kind()) {
        Some(ObjectKind::Symbol(symbol)) => Ok(*symbol),
        _ => Err(VmError::type_error(format!(
            "Symbol.prototype method called on incompatible receiver {}",
            rt.display_value(this)
        ))),
    }
}

fn to_string(rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let symbol = this_symbol(rt, this)?;
    let text = rt.js_symbol(symbol).descriptive_string();
    Ok(rt.alloc_string(&text))
}

fn value_of(rt: &mut Runtime, this: Value, _args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    this_symbol(rt, this).map(Value::symbol)
}

#[cfg(test)]
mod tests {
    use crate::runtime::Runtime;

    #[test]
    fn test_symbols_are_unique() {
        let mut rt = Runtime::new();
        let value = rt.evaluate("Symbol('a') !== Symbol('a') && typeof Symbol() === 'symbol'", "s.js").unwrap();
        assert!(value.as_boolean());
    }

    #[test]
    fn test_to_string() {
        let mut rt = Runtime::new();
        let value = rt.evaluate("Symbol('tag').toString()", "s.js").unwrap();
        assert_eq!(rt.string_text(value).as_deref(), Some("Symbol(tag)"));
    }

    #[test]
    fn test_well_known_iterator_drives_for_of() {
        let mut rt = Runtime::new();
        let value = rt
            .evaluate(
                "var it = {}; var n = 0;\n\
                 it[Symbol.iterator] = function () { var i = 0; return { next: function () { return { done: i >= 3, value: i++ }; } }; };\n\
                 for (var v of it) n += v;\n\
                 n",
                "s.js",
            )
            .unwrap();
        assert_eq!(value.as_number(), 3.0);
    }

    #[test]
    fn test_new_symbol_throws() {
        let mut rt = Runtime::new();
        assert!(rt.evaluate("new Symbol()", "s.js").is_err());
    }
}
