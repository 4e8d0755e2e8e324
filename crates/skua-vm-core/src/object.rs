//! Objects and the ordinary internal methods
//!
//! An object is a [`Structure`] plus a parallel slot vector for named
//! properties, an indexed element store for array-index keys, a prototype
//! link and a closed [`ObjectKind`] tag. Exotic behavior (array `length`,
//! mapped arguments, string wrapper indices, host hooks) is dispatched on the
//! tag before the ordinary algorithm runs.

use std::collections::BTreeMap;
use std::rc::Rc;

use skua_vm_gc::{GcRef, Trace};

use crate::conversion::same_value;
use crate::error::{VmError, VmResult};
use crate::function::FunctionData;
use crate::heap::HeapCell;
use crate::host::{HookResult, HostObjectHooks};
use crate::number::f64_to_uint32;
use crate::pauser::{AsyncFunctionData, AsyncGeneratorData, GeneratorData};
use crate::promise::PromiseData;
use crate::property::{PropertyAttributes, PropertyDescriptor, PropertyKey, PropertySlot};
use crate::runtime::Runtime;
use crate::structure::Structure;
use crate::value::Value;

/// Dense element vectors grow at most this far past their end before degrading
const SPARSE_GAP: u32 = 1024;

/// Array-index property storage
#[derive(Debug, Clone)]
pub enum Elements {
    /// Contiguous values; `empty` marks a hole
    Dense(Vec<Value>),
    /// Scattered indices
    Sparse(BTreeMap<u32, Value>),
}

impl Default for Elements {
    fn default() -> Self {
        Self::Dense(Vec::new())
    }
}

impl Elements {
    /// Element at `index`, `None` for holes
    pub fn get(&self, index: u32) -> Option<Value> {
        match self {
            Self::Dense(values) => values.get(index as usize).copied().filter(|v| !v.is_empty()),
            Self::Sparse(map) => map.get(&index).copied(),
        }
    }

    /// Store `value` at `index`
    pub fn set(&mut self, index: u32, value: Value) {
        if let Self::Dense(values) = self {
            let len = values.len() as u32;
            if index < len {
                values[index as usize] = value;
                return;
            }
            if index - len <= SPARSE_GAP.max(len) {
                values.resize(index as usize, Value::empty());
                values.push(value);
                return;
            }
            let map = values
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_empty())
                .map(|(i, v)| (i as u32, *v))
                .collect();
            *self = Self::Sparse(map);
        }
        if let Self::Sparse(map) = self {
            map.insert(index, value);
        }
    }

    /// Remove `index`, returning whether it existed
    pub fn remove(&mut self, index: u32) -> bool {
        match self {
            Self::Dense(values) => match values.get_mut(index as usize) {
                Some(slot) if !slot.is_empty() => {
                    *slot = Value::empty();
                    true
                }
                _ => false,
            },
            Self::Sparse(map) => map.remove(&index).is_some(),
        }
    }

    /// Present indices in ascending order
    pub fn indices(&self) -> Vec<u32> {
        match self {
            Self::Dense(values) => values
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_empty())
                .map(|(i, _)| i as u32)
                .collect(),
            Self::Sparse(map) => map.keys().copied().collect(),
        }
    }

    /// Drop every index `>= len`
    pub fn truncate(&mut self, len: u32) {
        match self {
            Self::Dense(values) => values.truncate(len as usize),
            Self::Sparse(map) => {
                map.split_off(&len);
            }
        }
    }

    /// Is the dense representation
    pub fn is_dense(&self) -> bool {
        matches!(self, Self::Dense(_))
    }
}

impl Trace for Elements {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        match self {
            Self::Dense(values) => values.iter().for_each(|v| v.trace(tracer)),
            Self::Sparse(map) => map.values().for_each(|v| v.trace(tracer)),
        }
    }
}

/// Parameter mapping of a sloppy-mode arguments object
#[derive(Debug, Clone, Default)]
pub struct ArgumentsData {
    /// Function environment holding the parameters
    pub env: Option<GcRef>,
    /// Environment slot aliased by each index, while still mapped
    pub mapped: Vec<Option<u16>>,
}

/// Iteration state of an array (or string) iterator
#[derive(Debug, Clone, Copy)]
pub struct ArrayIteratorData {
    /// Iterated value
    pub target: Value,
    /// Next index
    pub index: u32,
    /// Exhausted
    pub done: bool,
}

/// State of a `for-in` enumeration
#[derive(Debug, Clone, Default)]
pub struct ForInIteratorData {
    /// Object whose keys are enumerated; rechecked before each key is produced
    pub object: Option<GcRef>,
    /// Snapshot of enumerable string keys
    pub keys: Vec<Value>,
    /// Next key position
    pub index: usize,
}

/// Iterator record produced by `GetIterator`
#[derive(Debug, Clone, Copy)]
pub struct IteratorRecord {
    /// Iterator object
    pub iterator: Value,
    /// Cached `next` method
    pub next: Value,
    /// Exhausted, threw, or closed
    pub done: bool,
    /// Sync iterator driven by `for await`; results are awaited before use
    pub sync_backed: bool,
}

/// Closed set of object flavors
pub enum ObjectKind {
    /// Plain object
    Ordinary,
    /// Array exotic object
    Array {
        /// Current `length`
        length: u32,
    },
    /// Callable
    Function(Box<FunctionData>),
    /// `arguments`
    Arguments(ArgumentsData),
    /// Error instance (has `[[ErrorData]]`)
    Error,
    /// Boolean wrapper
    Boolean(bool),
    /// Number wrapper
    Number(f64),
    /// String wrapper (string exotic object)
    String(GcRef),
    /// Symbol wrapper
    Symbol(GcRef),
    /// Generator instance
    Generator(Box<GeneratorData>),
    /// Suspended async function continuation
    AsyncFunction(Box<AsyncFunctionData>),
    /// Async generator instance
    AsyncGenerator(Box<AsyncGeneratorData>),
    /// Promise instance
    Promise(Box<PromiseData>),
    /// Array/string iterator
    ArrayIterator(ArrayIteratorData),
    /// `for-in` enumerator
    ForInIterator(ForInIteratorData),
    /// Iterator record (internal)
    IteratorRecord(IteratorRecord),
    /// Host object with exotic hooks
    Host(Rc<dyn HostObjectHooks>),
}

impl ObjectKind {
    /// Named property access may bypass the structure
    pub fn has_exotic_properties(&self) -> bool {
        matches!(
            self,
            Self::Array { .. } | Self::Arguments(_) | Self::String(_) | Self::Host(_)
        )
    }

    /// Class name used by `Object.prototype.toString`
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Array { .. } => "Array",
            Self::Function(_) => "Function",
            Self::Arguments(_) => "Arguments",
            Self::Error => "Error",
            Self::Boolean(_) => "Boolean",
            Self::Number(_) => "Number",
            Self::String(_) => "String",
            _ => "Object",
        }
    }
}

impl std::fmt::Debug for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ordinary => "Ordinary",
            Self::Array { .. } => "Array",
            Self::Function(_) => "Function",
            Self::Arguments(_) => "Arguments",
            Self::Error => "Error",
            Self::Boolean(_) => "Boolean",
            Self::Number(_) => "Number",
            Self::String(_) => "String",
            Self::Symbol(_) => "Symbol",
            Self::Generator(_) => "Generator",
            Self::AsyncFunction(_) => "AsyncFunction",
            Self::AsyncGenerator(_) => "AsyncGenerator",
            Self::Promise(_) => "Promise",
            Self::ArrayIterator(_) => "ArrayIterator",
            Self::ForInIterator(_) => "ForInIterator",
            Self::IteratorRecord(_) => "IteratorRecord",
            Self::Host(_) => "Host",
        };
        f.write_str(name)
    }
}

impl Trace for ObjectKind {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        match self {
            Self::Ordinary
            | Self::Array { .. }
            | Self::Error
            | Self::Boolean(_)
            | Self::Number(_) => {}
            Self::Function(data) => data.trace(tracer),
            Self::Arguments(data) => data.env.trace(tracer),
            Self::String(s) | Self::Symbol(s) => tracer(*s),
            Self::Generator(data) => data.trace(tracer),
            Self::AsyncFunction(data) => data.trace(tracer),
            Self::AsyncGenerator(data) => data.trace(tracer),
            Self::Promise(data) => data.trace(tracer),
            Self::ArrayIterator(data) => data.target.trace(tracer),
            Self::ForInIterator(data) => {
                data.object.trace(tracer);
                data.keys.iter().for_each(|k| k.trace(tracer));
            }
            Self::IteratorRecord(record) => {
                record.iterator.trace(tracer);
                record.next.trace(tracer);
            }
            Self::Host(hooks) => hooks.trace(tracer),
        }
    }
}

/// A heap object
#[derive(Debug)]
pub struct JsObject {
    pub(crate) structure: Rc<Structure>,
    pub(crate) slots: Vec<PropertySlot>,
    pub(crate) elements: Elements,
    pub(crate) prototype: Option<GcRef>,
    pub(crate) extensible: bool,
    pub(crate) kind: ObjectKind,
}

impl JsObject {
    /// Create an object with no own properties
    pub fn new(structure: Rc<Structure>, prototype: Option<GcRef>, kind: ObjectKind) -> Self {
        debug_assert!(structure.is_empty());
        Self {
            structure,
            slots: Vec::new(),
            elements: Elements::default(),
            prototype,
            extensible: true,
            kind,
        }
    }

    /// Current structure
    #[inline]
    pub fn structure(&self) -> &Rc<Structure> {
        &self.structure
    }

    /// Prototype link
    #[inline]
    pub fn prototype(&self) -> Option<GcRef> {
        self.prototype
    }

    /// Kind tag
    #[inline]
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// Mutable kind tag
    #[inline]
    pub fn kind_mut(&mut self) -> &mut ObjectKind {
        &mut self.kind
    }

    /// Indexed elements
    #[inline]
    pub fn elements(&self) -> &Elements {
        &self.elements
    }

    /// Accepts new properties
    #[inline]
    pub fn is_extensible(&self) -> bool {
        self.extensible
    }

    /// Slot at a structure index
    #[inline]
    pub fn slot(&self, index: u32) -> PropertySlot {
        self.slots[index as usize]
    }

    /// Append a named property (caller ensures it is absent)
    pub(crate) fn push_property(&mut self, key: PropertyKey, attributes: PropertyAttributes, slot: PropertySlot) {
        self.structure = self.structure.add_property(key, attributes);
        self.slots.push(slot);
        debug_assert_eq!(self.slots.len(), self.structure.len());
    }

    /// Is callable
    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }
}

impl Trace for JsObject {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        self.structure.trace(tracer);
        for slot in &self.slots {
            slot.trace(tracer);
        }
        self.elements.trace(tracer);
        self.prototype.trace(tracer);
        self.kind.trace(tracer);
    }
}

/// Where an own property lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Location {
    Named(u32),
    Element(u32),
    ArrayLength,
    StringUnit,
    StringLength,
    Mapped { env: GcRef, slot: u16, index: u32 },
}

/// Own property found by [`Runtime::lookup_own`]
#[derive(Debug, Clone, Copy)]
pub(crate) struct OwnProperty {
    pub(crate) location: Location,
    pub(crate) slot: PropertySlot,
    pub(crate) attributes: PropertyAttributes,
}

impl Runtime {
    /// Borrow an object cell
    pub fn object(&self, handle: GcRef) -> &JsObject {
        match self.heap.get(handle) {
            HeapCell::Object(object) => object,
            other => panic!("expected object, found {}", other.kind_name()),
        }
    }

    /// Mutably borrow an object cell
    pub fn object_mut(&mut self, handle: GcRef) -> &mut JsObject {
        match self.heap.get_mut(handle) {
            HeapCell::Object(object) => object,
            other => panic!("expected object, found {}", other.kind_name()),
        }
    }

    /// Allocate an object cell
    pub fn alloc_object(&mut self, object: JsObject) -> GcRef {
        self.heap.alloc(HeapCell::Object(object))
    }

    /// Allocate an empty object of `kind`
    pub fn new_object_with(&mut self, prototype: Option<GcRef>, kind: ObjectKind) -> GcRef {
        let structure = Rc::clone(&self.root_structure);
        self.alloc_object(JsObject::new(structure, prototype, kind))
    }

    /// `{}` with `%Object.prototype%`
    pub fn new_object(&mut self) -> GcRef {
        let proto = self.intrinsics.object_prototype;
        self.new_object_with(Some(proto), ObjectKind::Ordinary)
    }

    /// Array holding `values`
    pub fn new_array(&mut self, values: Vec<Value>) -> GcRef {
        let proto = self.intrinsics.array_prototype;
        let length = values.len() as u32;
        let array = self.new_object_with(Some(proto), ObjectKind::Array { length });
        self.object_mut(array).elements = Elements::Dense(values);
        array
    }

    /// Define a data property on an object known to lack `key`
    ///
    /// Used while building intrinsics and fresh objects; skips validation.
    pub fn define_data(&mut self, object: GcRef, key: impl Into<PropertyKey>, value: Value, attributes: PropertyAttributes) {
        let key = key.into();
        let obj = self.object_mut(object);
        match key {
            PropertyKey::Index(index) if attributes == PropertyAttributes::DEFAULT => {
                obj.elements.set(index, value);
                if let ObjectKind::Array { length } = &mut obj.kind
                    && index >= *length
                {
                    *length = index + 1;
                }
            }
            key => obj.push_property(key, attributes, PropertySlot::Data(value)),
        }
    }

    // ==================== Prototype ====================

    /// `[[GetPrototypeOf]]`
    pub fn get_prototype_of(&self, object: GcRef) -> Option<GcRef> {
        self.object(object).prototype
    }

    /// `[[SetPrototypeOf]]`; fails for non-extensible objects and cycles
    pub fn set_prototype_of(&mut self, object: GcRef, prototype: Option<GcRef>) -> bool {
        let obj = self.object(object);
        if obj.prototype == prototype {
            return true;
        }
        if !obj.extensible {
            return false;
        }
        let mut current = prototype;
        while let Some(p) = current {
            if p == object {
                return false;
            }
            current = self.object(p).prototype;
        }
        self.object_mut(object).prototype = prototype;
        true
    }

    // ==================== Own properties ====================

    /// Locate an own property without running hooks or user code
    pub(crate) fn lookup_own(&mut self, object: GcRef, key: &PropertyKey) -> Option<OwnProperty> {
        if let PropertyKey::Index(index) = key
            && let ObjectKind::String(s) = self.object(object).kind
            && let Some(unit) = self.js_string(s).unit_at(*index as usize)
        {
            return Some(OwnProperty {
                location: Location::StringUnit,
                slot: PropertySlot::Data(self.alloc_string(&unit)),
                attributes: PropertyAttributes::data(false, true, false),
            });
        }

        let obj = self.object(object);
        match (&obj.kind, key) {
            (ObjectKind::Array { length }, PropertyKey::String(name)) if &**name == "length" => {
                return Some(OwnProperty {
                    location: Location::ArrayLength,
                    slot: PropertySlot::Data(Value::number(*length as f64)),
                    attributes: PropertyAttributes::data(true, false, false),
                });
            }
            (ObjectKind::String(s), PropertyKey::String(name)) if &**name == "length" => {
                let len = self.js_string(*s).utf16_len();
                return Some(OwnProperty {
                    location: Location::StringLength,
                    slot: PropertySlot::Data(Value::number(len as f64)),
                    attributes: PropertyAttributes::data(false, false, false),
                });
            }
            (ObjectKind::Arguments(args), PropertyKey::Index(index)) => {
                if let (Some(env), Some(Some(slot))) = (args.env, args.mapped.get(*index as usize))
                    && obj.elements.get(*index).is_some()
                {
                    return Some(OwnProperty {
                        location: Location::Mapped {
                            env,
                            slot: *slot,
                            index: *index,
                        },
                        slot: PropertySlot::Data(self.env_slot(env, *slot)),
                        attributes: PropertyAttributes::DEFAULT,
                    });
                }
            }
            _ => {}
        }

        if let PropertyKey::Index(index) = key
            && let Some(value) = obj.elements.get(*index)
        {
            return Some(OwnProperty {
                location: Location::Element(*index),
                slot: PropertySlot::Data(value),
                attributes: PropertyAttributes::DEFAULT,
            });
        }

        let (index, attributes) = obj.structure.find(key)?;
        Some(OwnProperty {
            location: Location::Named(index),
            slot: obj.slots[index as usize],
            attributes,
        })
    }

    /// `[[GetOwnProperty]]` as slot and attributes
    pub fn get_own_property(
        &mut self,
        object: GcRef,
        key: &PropertyKey,
    ) -> VmResult<Option<(PropertySlot, PropertyAttributes)>> {
        if let Some(hooks) = self.host_hooks(object) {
            if let HookResult::Handled(has) = hooks.has(self, object, key)? {
                if !self.to_boolean(has) {
                    return Ok(None);
                }
                if let HookResult::Handled(value) = hooks.get(self, object, Value::object(object), key)? {
                    return Ok(Some((PropertySlot::Data(value), PropertyAttributes::DEFAULT)));
                }
            }
        }
        Ok(self.lookup_own(object, key).map(|own| (own.slot, own.attributes)))
    }

    /// Own property as a complete descriptor
    pub fn get_own_property_descriptor(
        &mut self,
        object: GcRef,
        key: &PropertyKey,
    ) -> VmResult<Option<PropertyDescriptor>> {
        let Some((slot, attributes)) = self.get_own_property(object, key)? else {
            return Ok(None);
        };
        Ok(Some(match slot {
            PropertySlot::Data(value) => PropertyDescriptor::data(value, attributes),
            PropertySlot::Accessor { getter, setter } => PropertyDescriptor::accessor(
                getter,
                setter,
                attributes.enumerable(),
                attributes.configurable(),
            ),
            PropertySlot::Native { accessor, storage } => {
                let value = match accessor.getter {
                    Some(getter) => getter(self, object, Value::object(object), &storage)?,
                    None => Value::undefined(),
                };
                PropertyDescriptor::data(
                    value,
                    PropertyAttributes::data(
                        accessor.setter.is_some(),
                        attributes.enumerable(),
                        attributes.configurable(),
                    ),
                )
            }
        }))
    }

    fn host_hooks(&self, object: GcRef) -> Option<Rc<dyn HostObjectHooks>> {
        match &self.object(object).kind {
            ObjectKind::Host(hooks) => Some(Rc::clone(hooks)),
            _ => None,
        }
    }

    // ==================== [[Get]] / [[Set]] ====================

    /// `[[Get]]` with an explicit receiver
    pub fn get(&mut self, object: GcRef, key: &PropertyKey, receiver: Value) -> VmResult<Value> {
        let mut current = object;
        loop {
            if let Some(hooks) = self.host_hooks(current)
                && let HookResult::Handled(value) = hooks.get(self, current, receiver, key)?
            {
                return Ok(value);
            }
            if let Some(own) = self.lookup_own(current, key) {
                return self.read_slot(current, own.slot, receiver);
            }
            match self.object(current).prototype {
                Some(proto) => current = proto,
                None => return Ok(Value::undefined()),
            }
        }
    }

    pub(crate) fn read_slot(&mut self, holder: GcRef, slot: PropertySlot, receiver: Value) -> VmResult<Value> {
        match slot {
            PropertySlot::Data(value) => Ok(value),
            PropertySlot::Accessor { getter, .. } => {
                if getter.is_undefined() {
                    Ok(Value::undefined())
                } else {
                    self.call(getter, receiver, &[])
                }
            }
            PropertySlot::Native { accessor, storage } => match accessor.getter {
                Some(getter) => getter(self, holder, receiver, &storage),
                None => Ok(Value::undefined()),
            },
        }
    }

    /// `[[Set]]` with an explicit receiver; returns success
    pub fn set(&mut self, object: GcRef, key: &PropertyKey, value: Value, receiver: Value) -> VmResult<bool> {
        let mut current = object;
        loop {
            if let Some(hooks) = self.host_hooks(current)
                && let HookResult::Handled(result) = hooks.set(self, current, receiver, key, value)?
            {
                return Ok(self.to_boolean(result));
            }
            if let Some(own) = self.lookup_own(current, key) {
                return match own.slot {
                    PropertySlot::Data(_) => {
                        if !own.attributes.writable() {
                            Ok(false)
                        } else if receiver == Value::object(current) {
                            self.write_own(current, own.location, value)
                        } else {
                            self.set_on_receiver(receiver, key, value)
                        }
                    }
                    PropertySlot::Accessor { setter, .. } => {
                        if setter.is_undefined() {
                            return Ok(false);
                        }
                        self.call(setter, receiver, &[value])?;
                        Ok(true)
                    }
                    PropertySlot::Native { accessor, mut storage } => {
                        let Some(setter) = accessor.setter else {
                            return Ok(false);
                        };
                        let ok = setter(self, current, receiver, &mut storage, value)?;
                        self.store_native(current, key, storage);
                        Ok(ok)
                    }
                };
            }
            match self.object(current).prototype {
                Some(proto) => current = proto,
                None => break,
            }
        }
        self.set_on_receiver(receiver, key, value)
    }

    fn set_on_receiver(&mut self, receiver: Value, key: &PropertyKey, value: Value) -> VmResult<bool> {
        let Some(target) = receiver.as_object() else {
            return Ok(false);
        };
        match self.lookup_own(target, key) {
            Some(own) => match own.slot {
                PropertySlot::Data(_) if own.attributes.writable() => self.write_own(target, own.location, value),
                _ => Ok(false),
            },
            None => self.define_own_property(
                target,
                key.clone(),
                PropertyDescriptor::data(value, PropertyAttributes::DEFAULT),
            ),
        }
    }

    /// Write back native accessor storage after a hook ran
    fn store_native(&mut self, holder: GcRef, key: &PropertyKey, storage: Value) {
        let obj = self.object_mut(holder);
        if let Some((index, _)) = obj.structure.find(key)
            && let PropertySlot::Native { storage: slot, .. } = &mut obj.slots[index as usize]
        {
            *slot = storage;
        }
    }

    /// Overwrite the value of an existing writable own data property
    fn write_own(&mut self, object: GcRef, location: Location, value: Value) -> VmResult<bool> {
        match location {
            Location::Named(index) => {
                self.object_mut(object).slots[index as usize] = PropertySlot::Data(value);
                Ok(true)
            }
            Location::Element(index) => {
                self.object_mut(object).elements.set(index, value);
                Ok(true)
            }
            Location::Mapped { env, slot, index } => {
                self.set_env_slot(env, slot, value);
                self.object_mut(object).elements.set(index, value);
                Ok(true)
            }
            Location::ArrayLength => {
                let length = self.to_array_length(value)?;
                self.set_array_length(object, length);
                Ok(true)
            }
            Location::StringUnit | Location::StringLength => Ok(false),
        }
    }

    fn to_array_length(&mut self, value: Value) -> VmResult<u32> {
        let number = self.to_number(value)?;
        let length = f64_to_uint32(number);
        if length as f64 != number {
            return Err(VmError::range_error("Invalid array length"));
        }
        Ok(length)
    }

    fn set_array_length(&mut self, array: GcRef, new_length: u32) {
        let obj = self.object_mut(array);
        let ObjectKind::Array { length } = &mut obj.kind else {
            return;
        };
        if new_length < *length {
            obj.elements.truncate(new_length);
            let stale: Vec<u32> = obj
                .structure
                .entries()
                .iter()
                .filter_map(|e| e.key.as_index())
                .filter(|i| *i >= new_length)
                .collect();
            for index in stale {
                if let Some((slot, _)) = obj.structure.find(&PropertyKey::Index(index)) {
                    obj.structure = obj.structure.remove_property(slot);
                    obj.slots.remove(slot as usize);
                }
            }
        }
        if let ObjectKind::Array { length } = &mut obj.kind {
            *length = new_length;
        }
    }

    // ==================== [[DefineOwnProperty]] ====================

    /// `[[DefineOwnProperty]]` (ValidateAndApplyPropertyDescriptor)
    pub fn define_own_property(
        &mut self,
        object: GcRef,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> VmResult<bool> {
        let Some(current) = self.lookup_own(object, &key) else {
            return Ok(self.define_new_property(object, key, desc));
        };
        let attrs = current.attributes;
        let current_is_data = matches!(current.slot, PropertySlot::Data(_));

        if !attrs.configurable() {
            if desc.configurable == Some(true) {
                return Ok(false);
            }
            if desc.enumerable.is_some_and(|e| e != attrs.enumerable()) {
                return Ok(false);
            }
            if (desc.is_accessor() && current_is_data) || (desc.is_data() && !current_is_data) {
                return Ok(false);
            }
            match current.slot {
                PropertySlot::Data(old) if !attrs.writable() => {
                    if desc.writable == Some(true) {
                        return Ok(false);
                    }
                    if let Some(value) = desc.value
                        && !same_value(self, value, old)
                    {
                        return Ok(false);
                    }
                }
                PropertySlot::Accessor { getter, setter } => {
                    if desc.get.is_some_and(|g| g != getter) || desc.set.is_some_and(|s| s != setter) {
                        return Ok(false);
                    }
                }
                _ => {}
            }
        }

        let enumerable = desc.enumerable.unwrap_or(attrs.enumerable());
        let configurable = desc.configurable.unwrap_or(attrs.configurable());
        let (slot, attributes) = if desc.is_accessor() {
            let (old_get, old_set) = match current.slot {
                PropertySlot::Accessor { getter, setter } => (getter, setter),
                _ => (Value::undefined(), Value::undefined()),
            };
            (
                PropertySlot::Accessor {
                    getter: desc.get.unwrap_or(old_get),
                    setter: desc.set.unwrap_or(old_set),
                },
                PropertyAttributes::accessor(enumerable, configurable),
            )
        } else {
            match current.slot {
                PropertySlot::Native { .. } if !desc.is_data() => {
                    (current.slot, PropertyAttributes::native(enumerable, configurable))
                }
                PropertySlot::Data(old) => (
                    PropertySlot::Data(desc.value.unwrap_or(old)),
                    PropertyAttributes::data(desc.writable.unwrap_or(attrs.writable()), enumerable, configurable),
                ),
                PropertySlot::Accessor { .. } if !desc.is_data() => {
                    (current.slot, PropertyAttributes::accessor(enumerable, configurable))
                }
                _ => (
                    PropertySlot::Data(desc.value.unwrap_or_default()),
                    PropertyAttributes::data(desc.writable.unwrap_or(false), enumerable, configurable),
                ),
            }
        };

        match current.location {
            Location::Named(index) => {
                let obj = self.object_mut(object);
                if attributes != attrs {
                    obj.structure = obj.structure.reconfigure(index, attributes);
                }
                obj.slots[index as usize] = slot;
            }
            Location::Element(index) | Location::Mapped { index, .. } => {
                if let Location::Mapped { env, slot: env_slot, .. } = current.location {
                    if let PropertySlot::Data(value) = slot {
                        self.set_env_slot(env, env_slot, value);
                    }
                    if !matches!(slot, PropertySlot::Data(_)) || !attributes.writable() {
                        self.unmap_argument(object, index);
                    }
                }
                let obj = self.object_mut(object);
                match slot {
                    PropertySlot::Data(value) if attributes == PropertyAttributes::DEFAULT => {
                        obj.elements.set(index, value);
                    }
                    _ => {
                        obj.elements.remove(index);
                        obj.push_property(PropertyKey::Index(index), attributes, slot);
                    }
                }
            }
            Location::ArrayLength => {
                if let PropertySlot::Data(value) = slot {
                    let length = self.to_array_length(value)?;
                    self.set_array_length(object, length);
                }
            }
            Location::StringUnit | Location::StringLength => {}
        }
        Ok(true)
    }

    fn define_new_property(&mut self, object: GcRef, key: PropertyKey, desc: PropertyDescriptor) -> bool {
        let obj = self.object_mut(object);
        if !obj.extensible {
            return false;
        }
        let enumerable = desc.enumerable.unwrap_or(false);
        let configurable = desc.configurable.unwrap_or(false);
        let (slot, attributes) = if desc.is_accessor() {
            (
                PropertySlot::Accessor {
                    getter: desc.get.unwrap_or_default(),
                    setter: desc.set.unwrap_or_default(),
                },
                PropertyAttributes::accessor(enumerable, configurable),
            )
        } else {
            (
                PropertySlot::Data(desc.value.unwrap_or_default()),
                PropertyAttributes::data(desc.writable.unwrap_or(false), enumerable, configurable),
            )
        };

        if let PropertyKey::Index(index) = key {
            if let ObjectKind::Array { length } = &mut obj.kind
                && index >= *length
            {
                *length = index + 1;
            }
            if let (PropertySlot::Data(value), PropertyAttributes::DEFAULT) = (slot, attributes) {
                obj.elements.set(index, value);
                return true;
            }
        }
        obj.push_property(key, attributes, slot);
        true
    }

    fn unmap_argument(&mut self, object: GcRef, index: u32) {
        if let ObjectKind::Arguments(args) = &mut self.object_mut(object).kind
            && let Some(entry) = args.mapped.get_mut(index as usize)
        {
            *entry = None;
        }
    }

    /// Install a host accessor
    pub fn define_native_accessor(
        &mut self,
        object: GcRef,
        key: impl Into<PropertyKey>,
        accessor: crate::property::NativeAccessor,
        storage: Value,
    ) {
        let key = key.into();
        let attributes = PropertyAttributes::native(true, true);
        let slot = PropertySlot::Native { accessor, storage };
        let obj = self.object_mut(object);
        match obj.structure.find(&key) {
            Some((index, old)) => {
                if old != attributes {
                    obj.structure = obj.structure.reconfigure(index, attributes);
                }
                obj.slots[index as usize] = slot;
            }
            None => obj.push_property(key, attributes, slot),
        }
    }

    // ==================== [[Delete]] / [[HasProperty]] ====================

    /// `[[Delete]]`; returns success
    pub fn delete(&mut self, object: GcRef, key: &PropertyKey) -> VmResult<bool> {
        if let Some(hooks) = self.host_hooks(object)
            && let HookResult::Handled(result) = hooks.delete(self, object, key)?
        {
            return Ok(self.to_boolean(result));
        }
        let Some(own) = self.lookup_own(object, key) else {
            return Ok(true);
        };
        if !own.attributes.configurable() {
            return Ok(false);
        }
        match own.location {
            Location::Named(index) => {
                let obj = self.object_mut(object);
                obj.structure = obj.structure.remove_property(index);
                obj.slots.remove(index as usize);
            }
            Location::Element(index) => {
                self.object_mut(object).elements.remove(index);
            }
            Location::Mapped { index, .. } => {
                self.unmap_argument(object, index);
                self.object_mut(object).elements.remove(index);
            }
            Location::ArrayLength | Location::StringUnit | Location::StringLength => return Ok(false),
        }
        Ok(true)
    }

    /// `[[HasProperty]]`
    pub fn has_property(&mut self, object: GcRef, key: &PropertyKey) -> VmResult<bool> {
        let mut current = object;
        loop {
            if let Some(hooks) = self.host_hooks(current)
                && let HookResult::Handled(result) = hooks.has(self, current, key)?
            {
                return Ok(self.to_boolean(result));
            }
            if self.lookup_own(current, key).is_some() {
                return Ok(true);
            }
            match self.object(current).prototype {
                Some(proto) => current = proto,
                None => return Ok(false),
            }
        }
    }

    /// Has an own property named `key`
    pub fn has_own_property(&mut self, object: GcRef, key: &PropertyKey) -> VmResult<bool> {
        Ok(self.get_own_property(object, key)?.is_some())
    }

    /// `[[OwnPropertyKeys]]`: indices ascending, then strings and symbols in insertion order
    pub fn own_property_keys(&mut self, object: GcRef) -> VmResult<Vec<PropertyKey>> {
        if let Some(hooks) = self.host_hooks(object)
            && let HookResult::Handled(keys) = hooks.own_keys(self, object)?
        {
            return Ok(keys);
        }
        let obj = self.object(object);
        let mut indices = obj.elements.indices();
        let mut strings = Vec::new();
        let mut symbols = Vec::new();
        match &obj.kind {
            ObjectKind::Array { .. } => strings.push(PropertyKey::String("length".into())),
            ObjectKind::String(s) => {
                let len = self.js_string(*s).utf16_len() as u32;
                indices.extend(0..len);
                strings.push(PropertyKey::String("length".into()));
            }
            _ => {}
        }
        for entry in obj.structure.entries() {
            match &entry.key {
                PropertyKey::Index(i) => indices.push(*i),
                PropertyKey::String(_) => strings.push(entry.key.clone()),
                PropertyKey::Symbol(_) => symbols.push(entry.key.clone()),
            }
        }
        indices.sort_unstable();
        indices.dedup();

        let mut keys: Vec<PropertyKey> = indices.into_iter().map(PropertyKey::Index).collect();
        keys.extend(strings);
        keys.extend(symbols);
        Ok(keys)
    }

    /// Own enumerable string-keyed property names (`Object.keys` order)
    pub fn own_enumerable_string_keys(&mut self, object: GcRef) -> VmResult<Vec<PropertyKey>> {
        let mut result = Vec::new();
        for key in self.own_property_keys(object)? {
            if key.is_symbol() {
                continue;
            }
            if let Some((_, attributes)) = self.get_own_property(object, &key)?
                && attributes.enumerable()
            {
                result.push(key);
            }
        }
        Ok(result)
    }

    /// Make an object non-extensible
    pub fn prevent_extensions(&mut self, object: GcRef) {
        let obj = self.object_mut(object);
        obj.extensible = false;
        obj.structure = obj.structure.unshare();
    }

    // ==================== Any-value access ====================

    /// `GetV`: property read on any value, primitives through their prototype
    pub fn get_value(&mut self, value: Value, key: &PropertyKey) -> VmResult<Value> {
        if let Some(object) = value.as_object() {
            return self.get(object, key, value);
        }
        if value.is_undefined_or_null() {
            return Err(VmError::type_error(format!(
                "Cannot read properties of {} (reading '{key}')",
                self.display_value(value)
            )));
        }
        if let Some(s) = value.as_string() {
            match key {
                PropertyKey::Index(index) => {
                    if let Some(unit) = self.js_string(s).unit_at(*index as usize) {
                        return Ok(self.alloc_string(&unit));
                    }
                }
                PropertyKey::String(name) if &**name == "length" => {
                    return Ok(Value::number(self.js_string(s).utf16_len() as f64));
                }
                _ => {}
            }
        }
        match self.primitive_prototype(value) {
            Some(proto) => self.get(proto, key, value),
            None => Ok(Value::undefined()),
        }
    }

    /// `PutValue` on a property reference with any base; throws on failure in strict code
    pub fn set_value(&mut self, target: Value, key: &PropertyKey, value: Value, strict: bool) -> VmResult<()> {
        let ok = match target.as_object() {
            Some(object) => self.set(object, key, value, target)?,
            None if target.is_undefined_or_null() => {
                return Err(VmError::type_error(format!(
                    "Cannot set properties of {} (setting '{key}')",
                    self.display_value(target)
                )));
            }
            None => match self.primitive_prototype(target) {
                Some(proto) => self.set(proto, key, value, target)?,
                None => false,
            },
        };
        if !ok && strict {
            return Err(VmError::type_error(format!(
                "Cannot assign to read only property '{key}' of {}",
                self.display_value(target)
            )));
        }
        Ok(())
    }
}
