//! Class definitions and `super`
//!
//! A class constructor is an ordinary script closure flagged as a class
//! constructor. `CreateClass` links it to a fresh prototype object, methods
//! carry a home object for `super` lookups, and instance fields run as a
//! synthetic initializer method right after `this` is bound.

use skua_vm_bytecode::MethodKind;
use skua_vm_gc::GcRef;

use crate::error::{VmError, VmResult};
use crate::function::{ClassFields, FunctionKind};
use crate::object::ObjectKind;
use crate::property::{PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::runtime::Runtime;
use crate::value::Value;

impl Runtime {
    /// Link `constructor` to a new prototype object and return that prototype
    ///
    /// `heritage` is the evaluated `extends` clause, `None` for base classes.
    pub(crate) fn create_class(&mut self, constructor: GcRef, heritage: Option<Value>) -> VmResult<GcRef> {
        let function_prototype = self.intrinsics.function_prototype;
        let (proto_parent, constructor_parent) = match heritage {
            None => (Some(self.intrinsics.object_prototype), function_prototype),
            Some(parent) if parent.is_null() => (None, function_prototype),
            Some(parent) => {
                let Some(parent_ctor) = parent.as_object().filter(|_| self.is_constructor(parent)) else {
                    return Err(VmError::type_error(format!(
                        "Class extends value {} is not a constructor or null",
                        self.display_value(parent)
                    )));
                };
                let proto = self.get(parent_ctor, &PropertyKey::from_name("prototype"), parent)?;
                if !proto.is_object() && !proto.is_null() {
                    return Err(VmError::type_error(format!(
                        "Class extends value does not have valid prototype property {}",
                        self.display_value(proto)
                    )));
                }
                (proto.as_object(), parent_ctor)
            }
        };

        let prototype = self.new_object_with(proto_parent, ObjectKind::Ordinary);
        self.set_prototype_of(constructor, Some(constructor_parent));
        let frozen = PropertyAttributes::data(false, false, false);
        self.define_data(constructor, "prototype", Value::object(prototype), frozen);
        self.define_data(prototype, "constructor", Value::object(constructor), PropertyAttributes::HIDDEN);
        self.set_home_object(constructor, prototype);
        Ok(prototype)
    }

    /// Install a class method or accessor; class elements are not enumerable
    pub(crate) fn define_method(&mut self, object: GcRef, key: PropertyKey, function: GcRef, kind: MethodKind) -> VmResult<()> {
        let function = Value::object(function);
        let desc = match kind {
            MethodKind::Method => PropertyDescriptor::data(function, PropertyAttributes::HIDDEN),
            MethodKind::Getter => PropertyDescriptor {
                get: Some(function),
                enumerable: Some(false),
                configurable: Some(true),
                ..PropertyDescriptor::default()
            },
            MethodKind::Setter => PropertyDescriptor {
                set: Some(function),
                enumerable: Some(false),
                configurable: Some(true),
                ..PropertyDescriptor::default()
            },
        };
        if !self.define_own_property(object, key.clone(), desc)? {
            return Err(VmError::type_error(format!("Cannot redefine property: {key}")));
        }
        Ok(())
    }

    /// `[[HomeObject]]` of a script function
    pub(crate) fn home_object(&self, function: GcRef) -> Option<GcRef> {
        match self.function_data(function).map(|data| &data.kind) {
            Some(FunctionKind::Script { home_object, .. }) => *home_object,
            _ => None,
        }
    }

    pub(crate) fn set_home_object(&mut self, function: GcRef, home: GcRef) {
        if let ObjectKind::Function(data) = self.object_mut(function).kind_mut()
            && let FunctionKind::Script { home_object, .. } = &mut data.kind
        {
            *home_object = Some(home);
        }
    }

    /// Attach the instance field initializer to a class constructor
    pub(crate) fn set_class_fields(&mut self, constructor: GcRef, class_fields: ClassFields) {
        if let ObjectKind::Function(data) = self.object_mut(constructor).kind_mut()
            && let FunctionKind::Script { fields, .. } = &mut data.kind
        {
            *fields = Some(class_fields);
        }
    }

    pub(crate) fn class_fields(&self, constructor: GcRef) -> Option<ClassFields> {
        match self.function_data(constructor).map(|data| &data.kind) {
            Some(FunctionKind::Script { fields, .. }) => fields.clone(),
            _ => None,
        }
    }

    /// `InitializeInstanceElements`
    pub(crate) fn initialize_fields(&mut self, this: Value, fields: &ClassFields) -> VmResult<()> {
        self.call(Value::object(fields.initializer), this, &fields.keys)?;
        Ok(())
    }

    /// The object `super` property lookups start from, for code running in `function`
    pub(crate) fn super_base(&self, function: Option<GcRef>) -> VmResult<Option<GcRef>> {
        let Some(home) = function.and_then(|f| self.home_object(f)) else {
            return Err(VmError::syntax_error("'super' keyword unexpected here"));
        };
        Ok(self.get_prototype_of(home))
    }

    /// The parent constructor `super(...)` calls from `constructor`
    pub(crate) fn super_constructor(&self, constructor: Option<GcRef>) -> VmResult<Value> {
        let Some(constructor) = constructor else {
            return Err(VmError::syntax_error("'super' keyword unexpected here"));
        };
        let parent = self.get_prototype_of(constructor).map(Value::object).unwrap_or(Value::null());
        if !self.is_constructor(parent) {
            return Err(VmError::type_error(format!(
                "Super constructor {} of anonymous class is not a constructor",
                self.display_value(parent)
            )));
        }
        Ok(parent)
    }
}

/// `this` read before `super()` returned in a derived constructor
pub(crate) fn uninitialized_this_error() -> VmError {
    VmError::reference_error(
        "Must call super constructor in derived class before accessing 'this' or returning from derived constructor",
    )
}

#[cfg(test)]
mod tests {
    use crate::runtime::Runtime;
    use crate::value::Value;

    fn eval(source: &str) -> Value {
        Runtime::new().evaluate(source, "class.js").unwrap()
    }

    #[test]
    fn test_class_prototype_is_frozen_link() {
        let value = eval(
            "class A {}\n\
             var p = A.prototype; A.prototype = 1;\n\
             A.prototype === p && !delete A.prototype && p.constructor === A",
        );
        assert_eq!(value, Value::from_bool(true));
    }

    #[test]
    fn test_methods_are_not_enumerable() {
        let value = eval(
            "class A { m() {} get g() { return 1 } }\n\
             Object.keys(A.prototype).length !== 0",
        );
        assert_eq!(value, Value::from_bool(false));
    }

    #[test]
    fn test_extends_non_constructor_throws() {
        let value = eval(
            "var r; try { class A extends 1 {} } catch (e) { r = e instanceof TypeError } r",
        );
        assert_eq!(value, Value::from_bool(true));
    }

    #[test]
    fn test_extends_null_has_no_prototype_parent() {
        let value = eval("class A extends null {} Object.getPrototypeOf(A.prototype) === null");
        assert_eq!(value, Value::from_bool(true));
    }
}
