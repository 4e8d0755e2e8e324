//! Intrinsics registry
//!
//! Initialization runs in two stages:
//! 1. [`Intrinsics::allocate`] creates the prototype and constructor cells up
//!    front so cross references between them need no patching.
//! 2. [`initialize`] installs names, methods and globals once the runtime
//!    exists.

use std::rc::Rc;

use skua_vm_gc::{GcRef, Heap, Trace};

use crate::error::VmResult;
use crate::function::{FunctionData, FunctionKind, NativeFn};
use crate::heap::HeapCell;
use crate::object::{JsObject, ObjectKind};
use crate::property::{PropertyAttributes, PropertyKey};
use crate::runtime::Runtime;
use crate::string::JsSymbol;
use crate::structure::Structure;
use crate::value::Value;

mod array;
mod error;
mod function;
mod generator;
mod global;
mod object;
mod primitive;
mod promise;
mod symbol;

/// Well-known objects of one runtime
#[derive(Debug, Clone)]
pub struct Intrinsics {
    // ========================================================================
    // Core prototypes
    // ========================================================================
    /// `Object.prototype`, `[[Prototype]]` is `null`
    pub object_prototype: GcRef,
    /// `Function.prototype`
    pub function_prototype: GcRef,
    /// `Array.prototype`
    pub array_prototype: GcRef,

    // ========================================================================
    // Primitive wrapper prototypes
    // ========================================================================
    /// `Boolean.prototype`
    pub boolean_prototype: GcRef,
    /// `Number.prototype`
    pub number_prototype: GcRef,
    /// `String.prototype`
    pub string_prototype: GcRef,
    /// `Symbol.prototype`
    pub symbol_prototype: GcRef,

    // ========================================================================
    // Error prototypes
    // ========================================================================
    /// `Error.prototype`
    pub error_prototype: GcRef,
    /// `TypeError.prototype`
    pub type_error_prototype: GcRef,
    /// `ReferenceError.prototype`
    pub reference_error_prototype: GcRef,
    /// `RangeError.prototype`
    pub range_error_prototype: GcRef,
    /// `SyntaxError.prototype`
    pub syntax_error_prototype: GcRef,
    /// `URIError.prototype`
    pub uri_error_prototype: GcRef,
    /// `EvalError.prototype`
    pub eval_error_prototype: GcRef,

    // ========================================================================
    // Iteration & async
    // ========================================================================
    /// `%IteratorPrototype%`
    pub iterator_prototype: GcRef,
    /// `%ArrayIteratorPrototype%`
    pub array_iterator_prototype: GcRef,
    /// `%GeneratorPrototype%`
    pub generator_prototype: GcRef,
    /// `%AsyncIteratorPrototype%`
    pub async_iterator_prototype: GcRef,
    /// `%AsyncGeneratorPrototype%`
    pub async_generator_prototype: GcRef,
    /// `Promise.prototype`
    pub promise_prototype: GcRef,

    // ========================================================================
    // Constructors & functions
    // ========================================================================
    /// `Object`
    pub object: GcRef,
    /// `Array`
    pub array: GcRef,
    /// `Error`
    pub error: GcRef,
    /// `TypeError`
    pub type_error: GcRef,
    /// `ReferenceError`
    pub reference_error: GcRef,
    /// `RangeError`
    pub range_error: GcRef,
    /// `SyntaxError`
    pub syntax_error: GcRef,
    /// `URIError`
    pub uri_error: GcRef,
    /// `EvalError`
    pub eval_error: GcRef,
    /// `Symbol`
    pub symbol: GcRef,
    /// `Promise`
    pub promise: GcRef,
    /// `%eval%`; direct eval is recognized by identity
    pub eval: GcRef,
    /// `%ArrayIteratorPrototype%.next`; enables the array iteration fast path
    pub array_iterator_next: GcRef,
    /// `Array.prototype.values`, also `Array.prototype[Symbol.iterator]`
    pub array_values: GcRef,

    // ========================================================================
    // Well-known symbols
    // ========================================================================
    /// `Symbol.iterator`
    pub symbol_iterator: GcRef,
    /// `Symbol.asyncIterator`
    pub symbol_async_iterator: GcRef,
    /// `Symbol.hasInstance`
    pub symbol_has_instance: GcRef,
    /// `Symbol.toPrimitive`
    pub symbol_to_primitive: GcRef,

    /// The global object
    pub global: GcRef,
}

struct Allocator<'a> {
    heap: &'a mut Heap<HeapCell>,
    root: &'a Rc<Structure>,
}

impl Allocator<'_> {
    fn object(&mut self, prototype: Option<GcRef>) -> GcRef {
        self.object_of(prototype, ObjectKind::Ordinary)
    }

    fn object_of(&mut self, prototype: Option<GcRef>, kind: ObjectKind) -> GcRef {
        let object = JsObject::new(Rc::clone(self.root), prototype, kind);
        self.heap.alloc(HeapCell::Object(object))
    }

    fn function(&mut self, prototype: GcRef, name: &str, func: NativeFn, is_constructor: bool) -> GcRef {
        let data = FunctionData {
            name: name.into(),
            is_constructor,
            kind: FunctionKind::Native { func },
        };
        self.object_of(Some(prototype), ObjectKind::Function(Box::new(data)))
    }

    fn symbol(&mut self, description: &str) -> GcRef {
        self.heap.alloc(HeapCell::Symbol(JsSymbol {
            description: Some(description.into()),
        }))
    }
}

impl Intrinsics {
    /// Allocate every intrinsic cell; properties are installed by [`initialize`]
    pub fn allocate(heap: &mut Heap<HeapCell>, root: &Rc<Structure>) -> Self {
        let mut a = Allocator { heap, root };

        let object_prototype = a.object(None);
        let function_prototype = a.function(object_prototype, "", function::function_prototype_call, false);
        let proto = |a: &mut Allocator<'_>| a.object(Some(object_prototype));

        let array_prototype = proto(&mut a);
        let boolean_prototype = proto(&mut a);
        let number_prototype = proto(&mut a);
        let string_prototype = proto(&mut a);
        let symbol_prototype = proto(&mut a);

        let error_prototype = proto(&mut a);
        let type_error_prototype = a.object(Some(error_prototype));
        let reference_error_prototype = a.object(Some(error_prototype));
        let range_error_prototype = a.object(Some(error_prototype));
        let syntax_error_prototype = a.object(Some(error_prototype));
        let uri_error_prototype = a.object(Some(error_prototype));
        let eval_error_prototype = a.object(Some(error_prototype));

        let iterator_prototype = proto(&mut a);
        let array_iterator_prototype = a.object(Some(iterator_prototype));
        let generator_prototype = a.object(Some(iterator_prototype));
        let async_iterator_prototype = proto(&mut a);
        let async_generator_prototype = a.object(Some(async_iterator_prototype));
        let promise_prototype = proto(&mut a);

        let fp = function_prototype;
        let error = a.function(fp, "Error", error::error_constructor, true);

        Self {
            object: a.function(fp, "Object", object::object_constructor, true),
            array: a.function(fp, "Array", array::array_constructor, true),
            error,
            type_error: a.function(error, "TypeError", error::type_error_constructor, true),
            reference_error: a.function(error, "ReferenceError", error::reference_error_constructor, true),
            range_error: a.function(error, "RangeError", error::range_error_constructor, true),
            syntax_error: a.function(error, "SyntaxError", error::syntax_error_constructor, true),
            uri_error: a.function(error, "URIError", error::uri_error_constructor, true),
            eval_error: a.function(error, "EvalError", error::eval_error_constructor, true),
            symbol: a.function(fp, "Symbol", symbol::symbol_function, false),
            promise: a.function(fp, "Promise", promise::promise_constructor, true),
            eval: a.function(fp, "eval", global::eval, false),
            array_iterator_next: a.function(fp, "next", array::array_iterator_next, false),
            array_values: a.function(fp, "values", array::array_values, false),
            symbol_iterator: a.symbol("Symbol.iterator"),
            symbol_async_iterator: a.symbol("Symbol.asyncIterator"),
            symbol_has_instance: a.symbol("Symbol.hasInstance"),
            symbol_to_primitive: a.symbol("Symbol.toPrimitive"),
            global: a.object(Some(object_prototype)),
            object_prototype,
            function_prototype,
            array_prototype,
            boolean_prototype,
            number_prototype,
            string_prototype,
            symbol_prototype,
            error_prototype,
            type_error_prototype,
            reference_error_prototype,
            range_error_prototype,
            syntax_error_prototype,
            uri_error_prototype,
            eval_error_prototype,
            iterator_prototype,
            array_iterator_prototype,
            generator_prototype,
            async_iterator_prototype,
            async_generator_prototype,
            promise_prototype,
        }
    }

    /// Prototype for errors of class `name`; unknown names map to `Error.prototype`
    pub fn error_prototype_for(&self, name: &str) -> GcRef {
        match name {
            "TypeError" => self.type_error_prototype,
            "ReferenceError" => self.reference_error_prototype,
            "RangeError" => self.range_error_prototype,
            "SyntaxError" => self.syntax_error_prototype,
            "URIError" => self.uri_error_prototype,
            "EvalError" => self.eval_error_prototype,
            _ => self.error_prototype,
        }
    }

    fn handles(&self) -> [GcRef; 39] {
        [
            self.object_prototype,
            self.function_prototype,
            self.array_prototype,
            self.boolean_prototype,
            self.number_prototype,
            self.string_prototype,
            self.symbol_prototype,
            self.error_prototype,
            self.type_error_prototype,
            self.reference_error_prototype,
            self.range_error_prototype,
            self.syntax_error_prototype,
            self.uri_error_prototype,
            self.eval_error_prototype,
            self.iterator_prototype,
            self.array_iterator_prototype,
            self.generator_prototype,
            self.async_iterator_prototype,
            self.async_generator_prototype,
            self.promise_prototype,
            self.object,
            self.array,
            self.error,
            self.type_error,
            self.reference_error,
            self.range_error,
            self.syntax_error,
            self.uri_error,
            self.eval_error,
            self.symbol,
            self.promise,
            self.eval,
            self.array_iterator_next,
            self.array_values,
            self.symbol_iterator,
            self.symbol_async_iterator,
            self.symbol_has_instance,
            self.symbol_to_primitive,
            self.global,
        ]
    }
}

impl Trace for Intrinsics {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        self.handles().into_iter().for_each(tracer);
    }
}

/// Stage 2: install properties and globals
pub(crate) fn initialize(rt: &mut Runtime) {
    object::init(rt);
    function::init(rt);
    array::init(rt);
    primitive::init(rt);
    error::init(rt);
    symbol::init(rt);
    promise::init(rt);
    generator::init(rt);
    global::init(rt);
}

// ============================================================================
// Helpers shared by the builtin modules
// ============================================================================

/// Argument `index`, `undefined` when absent
#[inline]
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).copied().unwrap_or_default()
}

/// Name, length, `prototype`/`constructor` links and the global binding of a constructor
fn install_constructor(rt: &mut Runtime, constructor: GcRef, name: &str, length: u32, prototype: GcRef) {
    rt.define_function_name_and_length(constructor, name, length);
    let frozen = PropertyAttributes::data(false, false, false);
    rt.define_data(constructor, "prototype", Value::object(prototype), frozen);
    rt.define_data(prototype, "constructor", Value::object(constructor), PropertyAttributes::HIDDEN);
    rt.define_global(name, Value::object(constructor));
}

/// Install a method keyed by a symbol
fn define_symbol_method(rt: &mut Runtime, object: GcRef, symbol: GcRef, name: &str, func: NativeFn) {
    let function = rt.new_native_function(name, 0, func);
    rt.define_data(object, PropertyKey::Symbol(symbol), Value::object(function), PropertyAttributes::HIDDEN);
}

/// `GetPrototypeFromConstructor(newTarget, fallback)`
fn prototype_from(rt: &mut Runtime, new_target: Option<GcRef>, fallback: GcRef) -> VmResult<GcRef> {
    let Some(new_target) = new_target else {
        return Ok(fallback);
    };
    let proto = rt.get(new_target, &PropertyKey::from_name("prototype"), Value::object(new_target))?;
    Ok(proto.as_object().unwrap_or(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prototype_chains() {
        let rt = Runtime::new();
        let i = rt.intrinsics();
        assert_eq!(rt.get_prototype_of(i.object_prototype), None);
        assert_eq!(rt.get_prototype_of(i.function_prototype), Some(i.object_prototype));
        assert_eq!(rt.get_prototype_of(i.type_error_prototype), Some(i.error_prototype));
        assert_eq!(rt.get_prototype_of(i.type_error), Some(i.error));
        assert_eq!(rt.get_prototype_of(i.generator_prototype), Some(i.iterator_prototype));
        assert_eq!(
            rt.get_prototype_of(i.async_generator_prototype),
            Some(i.async_iterator_prototype)
        );
    }

    #[test]
    fn test_constructor_links() {
        let mut rt = Runtime::new();
        let value = rt
            .evaluate("Array.prototype.constructor === Array && Object.getPrototypeOf([]) === Array.prototype", "t.js")
            .unwrap();
        assert_eq!(value, Value::from_bool(true));
    }

    #[test]
    fn test_error_prototype_for_unknown_name() {
        let rt = Runtime::new();
        let i = rt.intrinsics();
        assert_eq!(i.error_prototype_for("Whatever"), i.error_prototype);
        assert_eq!(i.error_prototype_for("RangeError"), i.range_error_prototype);
    }
}
