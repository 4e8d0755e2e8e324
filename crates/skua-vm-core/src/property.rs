//! Property keys, attributes and slots

use std::rc::Rc;

use skua_vm_gc::{GcRef, Trace};

use crate::error::VmResult;
use crate::number::parse_array_index;
use crate::runtime::Runtime;
use crate::value::Value;

/// A property key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// Non-index string key
    String(Rc<str>),
    /// Symbol key
    Symbol(GcRef),
    /// Canonical array index
    Index(u32),
}

impl PropertyKey {
    /// Key from a string, canonicalizing array indices
    pub fn from_name(s: &str) -> Self {
        match parse_array_index(s) {
            Some(index) => Self::Index(index),
            None => Self::String(s.into()),
        }
    }

    /// Key from shared text, canonicalizing array indices
    pub fn from_rc(s: Rc<str>) -> Self {
        match parse_array_index(&s) {
            Some(index) => Self::Index(index),
            None => Self::String(s),
        }
    }

    /// Is a symbol key
    pub fn is_symbol(&self) -> bool {
        matches!(self, Self::Symbol(_))
    }

    /// Array index, if this is one
    pub fn as_index(&self) -> Option<u32> {
        match self {
            Self::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// Textual form for string and index keys
    pub fn as_text(&self) -> Option<Rc<str>> {
        match self {
            Self::String(s) => Some(Rc::clone(s)),
            Self::Index(i) => Some(itoa::Buffer::new().format(*i).into()),
            Self::Symbol(_) => None,
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::from_name(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Index(i) => write!(f, "{i}"),
            Self::Symbol(_) => write!(f, "Symbol()"),
        }
    }
}

impl Trace for PropertyKey {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        if let Self::Symbol(symbol) = self {
            tracer(*symbol);
        }
    }
}

/// Property attribute bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyAttributes(u8);

impl PropertyAttributes {
    const WRITABLE: u8 = 1;
    const ENUMERABLE: u8 = 2;
    const CONFIGURABLE: u8 = 4;
    const ACCESSOR: u8 = 8;
    const NATIVE: u8 = 16;

    /// Writable, enumerable, configurable data property
    pub const DEFAULT: Self = Self(Self::WRITABLE | Self::ENUMERABLE | Self::CONFIGURABLE);

    /// Writable, configurable, non-enumerable data property (built-in methods)
    pub const HIDDEN: Self = Self(Self::WRITABLE | Self::CONFIGURABLE);

    /// Data property attributes
    pub const fn data(writable: bool, enumerable: bool, configurable: bool) -> Self {
        let mut bits = 0;
        if writable {
            bits |= Self::WRITABLE;
        }
        if enumerable {
            bits |= Self::ENUMERABLE;
        }
        if configurable {
            bits |= Self::CONFIGURABLE;
        }
        Self(bits)
    }

    /// Accessor property attributes
    pub const fn accessor(enumerable: bool, configurable: bool) -> Self {
        Self(Self::data(false, enumerable, configurable).0 | Self::ACCESSOR)
    }

    /// Native accessor attributes
    pub const fn native(enumerable: bool, configurable: bool) -> Self {
        Self(Self::data(false, enumerable, configurable).0 | Self::NATIVE)
    }

    /// Writable
    #[inline]
    pub const fn writable(self) -> bool {
        self.0 & Self::WRITABLE != 0
    }

    /// Enumerable
    #[inline]
    pub const fn enumerable(self) -> bool {
        self.0 & Self::ENUMERABLE != 0
    }

    /// Configurable
    #[inline]
    pub const fn configurable(self) -> bool {
        self.0 & Self::CONFIGURABLE != 0
    }

    /// Script accessor (getter/setter pair)
    #[inline]
    pub const fn is_accessor(self) -> bool {
        self.0 & Self::ACCESSOR != 0
    }

    /// Host accessor with native storage
    #[inline]
    pub const fn is_native(self) -> bool {
        self.0 & Self::NATIVE != 0
    }

    /// Plain data property
    #[inline]
    pub const fn is_data(self) -> bool {
        self.0 & (Self::ACCESSOR | Self::NATIVE) == 0
    }
}

/// Native getter: `(rt, holder, receiver, storage)`
pub type NativeGetter = fn(&mut Runtime, GcRef, Value, &Value) -> VmResult<Value>;

/// Native setter: `(rt, holder, receiver, storage, value)`; returns success
pub type NativeSetter = fn(&mut Runtime, GcRef, Value, &mut Value, Value) -> VmResult<bool>;

/// A host-implemented accessor
#[derive(Debug, Clone, Copy)]
pub struct NativeAccessor {
    /// Read hook
    pub getter: Option<NativeGetter>,
    /// Write hook
    pub setter: Option<NativeSetter>,
}

/// Storage of one named property, parallel to the structure entry
#[derive(Debug, Clone, Copy)]
pub enum PropertySlot {
    /// Data value
    Data(Value),
    /// Script accessor; `undefined` for a missing half
    Accessor {
        /// Getter function or undefined
        getter: Value,
        /// Setter function or undefined
        setter: Value,
    },
    /// Host accessor with its private storage value
    Native {
        /// Hooks
        accessor: NativeAccessor,
        /// Storage handed to the hooks
        storage: Value,
    },
}

impl Trace for PropertySlot {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        match self {
            Self::Data(v) => v.trace(tracer),
            Self::Accessor { getter, setter } => {
                getter.trace(tracer);
                setter.trace(tracer);
            }
            Self::Native { storage, .. } => storage.trace(tracer),
        }
    }
}

/// A (possibly partial) property descriptor
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyDescriptor {
    /// `[[Value]]`
    pub value: Option<Value>,
    /// `[[Writable]]`
    pub writable: Option<bool>,
    /// `[[Get]]`
    pub get: Option<Value>,
    /// `[[Set]]`
    pub set: Option<Value>,
    /// `[[Enumerable]]`
    pub enumerable: Option<bool>,
    /// `[[Configurable]]`
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    /// Complete data descriptor
    pub fn data(value: Value, attributes: PropertyAttributes) -> Self {
        Self {
            value: Some(value),
            writable: Some(attributes.writable()),
            get: None,
            set: None,
            enumerable: Some(attributes.enumerable()),
            configurable: Some(attributes.configurable()),
        }
    }

    /// Complete accessor descriptor
    pub fn accessor(get: Value, set: Value, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: None,
            writable: None,
            get: Some(get),
            set: Some(set),
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    /// Has `get` or `set`
    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    /// Has `value` or `writable`
    pub fn is_data(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_canonicalization() {
        assert_eq!(PropertyKey::from_name("12"), PropertyKey::Index(12));
        assert_eq!(PropertyKey::from_name("012"), PropertyKey::String("012".into()));
        assert_eq!(PropertyKey::Index(3).as_text().as_deref(), Some("3"));
    }

    #[test]
    fn test_attributes() {
        let attrs = PropertyAttributes::data(false, true, false);
        assert!(!attrs.writable() && attrs.enumerable() && !attrs.configurable());
        assert!(attrs.is_data());
        assert!(PropertyAttributes::accessor(true, true).is_accessor());
        assert!(!PropertyAttributes::native(false, true).is_data());
    }
}
