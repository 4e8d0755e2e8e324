//! Abstract operations: type conversion, equality and `typeof`

use std::rc::Rc;

use skua_vm_gc::GcRef;

use crate::error::{VmError, VmResult};
use crate::number::{f64_to_int32, f64_to_uint32, number_to_string, string_to_number};
use crate::object::ObjectKind;
use crate::property::PropertyKey;
use crate::runtime::Runtime;
use crate::value::Value;

/// Hint for `ToPrimitive`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredType {
    /// No preference (treated as number)
    Default,
    /// Prefer `valueOf`
    Number,
    /// Prefer `toString`
    String,
}

/// `SameValue`: like `===` but NaN equals itself and `+0` differs from `-0`
pub fn same_value(rt: &Runtime, a: Value, b: Value) -> bool {
    if a.is_number() && b.is_number() {
        let (x, y) = (a.as_number(), b.as_number());
        if x.is_nan() && y.is_nan() {
            return true;
        }
        return x == y && x.is_sign_negative() == y.is_sign_negative();
    }
    strict_equals(rt, a, b)
}

/// `SameValueZero`: like `SameValue` but `+0` equals `-0`
pub fn same_value_zero(rt: &Runtime, a: Value, b: Value) -> bool {
    if a.is_number() && b.is_number() {
        let (x, y) = (a.as_number(), b.as_number());
        return x == y || (x.is_nan() && y.is_nan());
    }
    strict_equals(rt, a, b)
}

/// `IsStrictlyEqual` (`===`)
pub fn strict_equals(rt: &Runtime, a: Value, b: Value) -> bool {
    if a.is_number() && b.is_number() {
        return a.as_number() == b.as_number();
    }
    if let (Some(x), Some(y)) = (a.as_string(), b.as_string()) {
        return x == y || rt.js_string(x).as_str() == rt.js_string(y).as_str();
    }
    a == b
}

impl Runtime {
    /// `ToBoolean`
    pub fn to_boolean(&self, value: Value) -> bool {
        if value.is_boolean() {
            return value.as_boolean();
        }
        if value.is_int32() {
            return value.as_int32() != 0;
        }
        if value.is_double() {
            let n = value.as_f64();
            return !(n == 0.0 || n.is_nan());
        }
        if let Some(s) = value.as_string() {
            return !self.js_string(s).as_str().is_empty();
        }
        !(value.is_undefined_or_null() || value.is_empty())
    }

    /// `ToNumber`
    pub fn to_number(&mut self, value: Value) -> VmResult<f64> {
        if value.is_number() {
            return Ok(value.as_number());
        }
        if value.is_undefined() {
            return Ok(f64::NAN);
        }
        if value.is_null() {
            return Ok(0.0);
        }
        if value.is_boolean() {
            return Ok(if value.as_boolean() { 1.0 } else { 0.0 });
        }
        if let Some(s) = value.as_string() {
            return Ok(string_to_number(self.js_string(s).as_str()));
        }
        if value.is_symbol() {
            return Err(VmError::type_error("Cannot convert a Symbol value to a number"));
        }
        let primitive = self.to_primitive(value, PreferredType::Number)?;
        self.to_number(primitive)
    }

    /// `ToNumeric` (numbers only; BigInt is not supported)
    pub fn to_numeric(&mut self, value: Value) -> VmResult<Value> {
        if value.is_number() {
            return Ok(value);
        }
        Ok(Value::number(self.to_number(value)?))
    }

    /// `ToInt32`
    pub fn to_int32(&mut self, value: Value) -> VmResult<i32> {
        if value.is_int32() {
            return Ok(value.as_int32());
        }
        Ok(f64_to_int32(self.to_number(value)?))
    }

    /// `ToUint32`
    pub fn to_uint32(&mut self, value: Value) -> VmResult<u32> {
        Ok(f64_to_uint32(self.to_number(value)?))
    }

    /// `ToIntegerOrInfinity`
    pub fn to_integer_or_infinity(&mut self, value: Value) -> VmResult<f64> {
        let n = self.to_number(value)?;
        if n.is_nan() {
            return Ok(0.0);
        }
        Ok(n.trunc() + 0.0)
    }

    /// `ToIndex`: integer in `[0, 2^53 - 1]`, `RangeError` otherwise
    pub fn to_index(&mut self, value: Value) -> VmResult<u64> {
        if value.is_undefined() {
            return Ok(0);
        }
        let integer = self.to_integer_or_infinity(value)?;
        if !(0.0..=9_007_199_254_740_991.0).contains(&integer) {
            return Err(VmError::range_error("Invalid index"));
        }
        Ok(integer as u64)
    }

    /// `ToString` as shared text
    pub fn to_string(&mut self, value: Value) -> VmResult<Rc<str>> {
        if let Some(s) = value.as_string() {
            return Ok(self.js_string(s).text());
        }
        if value.is_object() {
            let primitive = self.to_primitive(value, PreferredType::String)?;
            return self.to_string(primitive);
        }
        if value.is_symbol() {
            return Err(VmError::type_error("Cannot convert a Symbol value to a string"));
        }
        Ok(self.primitive_to_string(value).into())
    }

    /// `ToString` as a string value (no allocation when already a string)
    pub fn to_string_value(&mut self, value: Value) -> VmResult<Value> {
        if value.is_string() {
            return Ok(value);
        }
        let text = self.to_string(value)?;
        Ok(self.alloc_string(&text))
    }

    fn primitive_to_string(&self, value: Value) -> String {
        if value.is_int32() {
            return itoa::Buffer::new().format(value.as_int32()).to_string();
        }
        if value.is_double() {
            return number_to_string(value.as_f64());
        }
        if value.is_undefined() {
            return "undefined".to_string();
        }
        if value.is_null() {
            return "null".to_string();
        }
        if value.is_boolean() {
            return if value.as_boolean() { "true" } else { "false" }.to_string();
        }
        if let Some(s) = value.as_string() {
            return self.js_string(s).as_str().to_string();
        }
        String::new()
    }

    /// Render a value for an error message without running script code
    pub fn display_value(&self, value: Value) -> String {
        if let Some(symbol) = value.as_symbol() {
            return self.js_symbol(symbol).descriptive_string();
        }
        if let Some(object) = value.as_object() {
            return match self.object(object).kind() {
                ObjectKind::Function(data) => format!("function {}", data.name),
                ObjectKind::Array { .. } => "[object Array]".to_string(),
                _ => "[object Object]".to_string(),
            };
        }
        self.primitive_to_string(value)
    }

    /// `ToPrimitive`
    pub fn to_primitive(&mut self, value: Value, hint: PreferredType) -> VmResult<Value> {
        let Some(object) = value.as_object() else {
            return Ok(value);
        };
        let exotic = self.get(object, &PropertyKey::Symbol(self.intrinsics.symbol_to_primitive), value)?;
        if !exotic.is_undefined_or_null() {
            let hint_name = match hint {
                PreferredType::Default => "default",
                PreferredType::Number => "number",
                PreferredType::String => "string",
            };
            let hint_value = self.intern(hint_name);
            let result = self.call(exotic, value, &[hint_value])?;
            if result.is_object() {
                return Err(VmError::type_error("Cannot convert object to primitive value"));
            }
            return Ok(result);
        }

        let order = if hint == PreferredType::String {
            ["toString", "valueOf"]
        } else {
            ["valueOf", "toString"]
        };
        for name in order {
            let method = self.get(object, &PropertyKey::from_name(name), value)?;
            if self.is_callable(method) {
                let result = self.call(method, value, &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        Err(VmError::type_error("Cannot convert object to primitive value"))
    }

    /// `ToPropertyKey`
    pub fn to_property_key(&mut self, value: Value) -> VmResult<PropertyKey> {
        if value.is_int32() && value.as_int32() >= 0 {
            return Ok(PropertyKey::Index(value.as_int32() as u32));
        }
        if let Some(symbol) = value.as_symbol() {
            return Ok(PropertyKey::Symbol(symbol));
        }
        let primitive = self.to_primitive(value, PreferredType::String)?;
        if let Some(symbol) = primitive.as_symbol() {
            return Ok(PropertyKey::Symbol(symbol));
        }
        let text = self.to_string(primitive)?;
        Ok(PropertyKey::from_rc(text))
    }

    /// Property key back to a script value
    pub fn key_to_value(&mut self, key: &PropertyKey) -> Value {
        match key {
            PropertyKey::Symbol(symbol) => Value::symbol(*symbol),
            PropertyKey::String(s) => self.alloc_string(s),
            PropertyKey::Index(i) => {
                let mut buf = itoa::Buffer::new();
                let text = buf.format(*i).to_string();
                self.alloc_string(&text)
            }
        }
    }

    /// `ToObject`
    pub fn to_object(&mut self, value: Value) -> VmResult<GcRef> {
        if let Some(object) = value.as_object() {
            return Ok(object);
        }
        let (proto, kind) = if value.is_undefined_or_null() {
            return Err(VmError::type_error(format!(
                "Cannot convert {} to object",
                self.display_value(value)
            )));
        } else if value.is_boolean() {
            (self.intrinsics.boolean_prototype, ObjectKind::Boolean(value.as_boolean()))
        } else if value.is_number() {
            (self.intrinsics.number_prototype, ObjectKind::Number(value.as_number()))
        } else if let Some(s) = value.as_string() {
            (self.intrinsics.string_prototype, ObjectKind::String(s))
        } else {
            (self.intrinsics.symbol_prototype, ObjectKind::Symbol(value.as_gc()))
        };
        Ok(self.new_object_with(Some(proto), kind))
    }

    /// Prototype used for property lookups on a primitive
    pub(crate) fn primitive_prototype(&self, value: Value) -> Option<GcRef> {
        if value.is_boolean() {
            Some(self.intrinsics.boolean_prototype)
        } else if value.is_number() {
            Some(self.intrinsics.number_prototype)
        } else if value.is_string() {
            Some(self.intrinsics.string_prototype)
        } else if value.is_symbol() {
            Some(self.intrinsics.symbol_prototype)
        } else {
            None
        }
    }

    /// `typeof`
    pub fn type_of(&self, value: Value) -> &'static str {
        if value.is_undefined() || value.is_empty() {
            "undefined"
        } else if value.is_null() {
            "object"
        } else if value.is_boolean() {
            "boolean"
        } else if value.is_number() {
            "number"
        } else if value.is_string() {
            "string"
        } else if value.is_symbol() {
            "symbol"
        } else if self.is_callable(value) {
            "function"
        } else {
            "object"
        }
    }

    /// `IsLooselyEqual` (`==`)
    pub fn abstract_equals(&mut self, a: Value, b: Value) -> VmResult<bool> {
        if a.is_number() && b.is_number() {
            return Ok(a.as_number() == b.as_number());
        }
        if (a.is_string() && b.is_string())
            || (a.is_boolean() && b.is_boolean())
            || (a.is_symbol() && b.is_symbol())
            || (a.is_object() && b.is_object())
        {
            return Ok(strict_equals(self, a, b));
        }
        if a.is_undefined_or_null() && b.is_undefined_or_null() {
            return Ok(true);
        }
        if a.is_undefined_or_null() || b.is_undefined_or_null() {
            return Ok(false);
        }
        if a.is_number() && b.is_string() {
            let n = self.to_number(b)?;
            return Ok(a.as_number() == n);
        }
        if a.is_string() && b.is_number() {
            let n = self.to_number(a)?;
            return Ok(n == b.as_number());
        }
        if a.is_boolean() {
            let n = Value::number(self.to_number(a)?);
            return self.abstract_equals(n, b);
        }
        if b.is_boolean() {
            let n = Value::number(self.to_number(b)?);
            return self.abstract_equals(a, n);
        }
        if a.is_object() {
            let primitive = self.to_primitive(a, PreferredType::Default)?;
            return self.abstract_equals(primitive, b);
        }
        if b.is_object() {
            let primitive = self.to_primitive(b, PreferredType::Default)?;
            return self.abstract_equals(a, primitive);
        }
        Ok(false)
    }

    /// `IsLessThan`; `None` when either side is NaN
    pub fn less_than(&mut self, a: Value, b: Value, left_first: bool) -> VmResult<Option<bool>> {
        let (pa, pb) = if left_first {
            let pa = self.to_primitive(a, PreferredType::Number)?;
            let pb = self.to_primitive(b, PreferredType::Number)?;
            (pa, pb)
        } else {
            let pb = self.to_primitive(b, PreferredType::Number)?;
            let pa = self.to_primitive(a, PreferredType::Number)?;
            (pa, pb)
        };
        if let (Some(x), Some(y)) = (pa.as_string(), pb.as_string()) {
            let x = self.js_string(x).as_str().encode_utf16();
            let y = self.js_string(y).as_str().encode_utf16();
            return Ok(Some(x.lt(y)));
        }
        let x = self.to_number(pa)?;
        let y = self.to_number(pb)?;
        if x.is_nan() || y.is_nan() {
            return Ok(None);
        }
        Ok(Some(x < y))
    }

    /// The `+` operator
    pub fn add_values(&mut self, a: Value, b: Value) -> VmResult<Value> {
        if a.is_int32() && b.is_int32() {
            return Ok(match a.as_int32().checked_add(b.as_int32()) {
                Some(sum) => Value::from_i32(sum),
                None => Value::number(a.as_int32() as f64 + b.as_int32() as f64),
            });
        }
        if a.is_number() && b.is_number() {
            return Ok(Value::number(a.as_number() + b.as_number()));
        }
        let pa = self.to_primitive(a, PreferredType::Default)?;
        let pb = self.to_primitive(b, PreferredType::Default)?;
        if pa.is_string() || pb.is_string() {
            let left = self.to_string(pa)?;
            let right = self.to_string(pb)?;
            let mut text = String::with_capacity(left.len() + right.len());
            text.push_str(&left);
            text.push_str(&right);
            return Ok(self.alloc_string(&text));
        }
        let x = self.to_number(pa)?;
        let y = self.to_number(pb)?;
        Ok(Value::number(x + y))
    }

    /// `InstanceofOperator`
    pub fn instance_of(&mut self, value: Value, target: Value) -> VmResult<bool> {
        let Some(target_obj) = target.as_object() else {
            return Err(VmError::type_error("Right-hand side of 'instanceof' is not an object"));
        };
        let has_instance = self.get(
            target_obj,
            &PropertyKey::Symbol(self.intrinsics.symbol_has_instance),
            target,
        )?;
        if !has_instance.is_undefined_or_null() {
            let result = self.call(has_instance, target, &[value])?;
            return Ok(self.to_boolean(result));
        }
        if !self.is_callable(target) {
            return Err(VmError::type_error("Right-hand side of 'instanceof' is not callable"));
        }
        self.ordinary_has_instance(target_obj, value)
    }

    /// `OrdinaryHasInstance`
    pub fn ordinary_has_instance(&mut self, constructor: GcRef, value: Value) -> VmResult<bool> {
        if let Some(target) = self.bound_target(constructor) {
            return self.instance_of(value, Value::object(target));
        }
        let Some(mut object) = value.as_object() else {
            return Ok(false);
        };
        let proto = self.get(constructor, &PropertyKey::from_name("prototype"), Value::object(constructor))?;
        let Some(proto) = proto.as_object() else {
            return Err(VmError::type_error(
                "Function has non-object prototype in instanceof check",
            ));
        };
        while let Some(next) = self.get_prototype_of(object) {
            if next == proto {
                return Ok(true);
            }
            object = next;
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_value_zero_sign() {
        let rt = Runtime::new();
        let pos = Value::number(0.0);
        let neg = Value::number(-0.0);
        assert!(!same_value(&rt, pos, neg));
        assert!(same_value_zero(&rt, pos, neg));
        assert!(strict_equals(&rt, pos, neg));
        assert!(same_value(&rt, Value::nan(), Value::nan()));
        assert!(!strict_equals(&rt, Value::nan(), Value::nan()));
    }

    #[test]
    fn test_string_equality_by_content() {
        let mut rt = Runtime::new();
        let a = rt.alloc_string("abc");
        let b = rt.alloc_string("abc");
        assert!(strict_equals(&rt, a, b));
        assert!(rt.abstract_equals(a, Value::undefined()).is_ok_and(|eq| !eq));
    }

    #[test]
    fn test_to_index_range() {
        let mut rt = Runtime::new();
        assert_eq!(rt.to_index(Value::from_i32(3)).unwrap(), 3);
        assert!(matches!(rt.to_index(Value::from_i32(-1)), Err(VmError::RangeError(_))));
        assert!(matches!(
            rt.to_index(Value::number(2f64.powi(53))),
            Err(VmError::RangeError(_))
        ));
    }

    #[test]
    fn test_loose_equality() {
        let mut rt = Runtime::new();
        let one = rt.alloc_string("1");
        assert!(rt.abstract_equals(one, Value::from_i32(1)).unwrap());
        assert!(rt.abstract_equals(Value::null(), Value::undefined()).unwrap());
        assert!(!rt.abstract_equals(Value::null(), Value::from_i32(0)).unwrap());
        assert!(rt.abstract_equals(Value::from_bool(true), Value::from_i32(1)).unwrap());
    }

    #[test]
    fn test_typeof() {
        let mut rt = Runtime::new();
        let s = rt.alloc_string("x");
        assert_eq!(rt.type_of(s), "string");
        assert_eq!(rt.type_of(Value::null()), "object");
        let obj = rt.new_object();
        assert_eq!(rt.type_of(Value::object(obj)), "object");
    }
}
