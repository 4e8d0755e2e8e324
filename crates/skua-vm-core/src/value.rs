//! NaN-boxed JavaScript values
//!
//! Every value is one `u64`. Doubles are stored with a fixed offset added to
//! their bit pattern, which moves them out of the low range where every other
//! kind of value lives:
//!
//! ```text
//! 0x0000_0000_0000_0000  undefined
//! 0x0000_0000_0000_0001  null
//! 0x0000_0000_0000_0002  true
//! 0x0000_0000_0000_0003  false
//! 0x0000_0000_0000_0004  empty (uninitialized binding / array hole)
//! 0x0000_0001_XXXX_XXXX  int32
//! 0x0001_XXXX_XXXX_XXXX  object handle
//! 0x0002_XXXX_XXXX_XXXX  string handle
//! 0x0003_XXXX_XXXX_XXXX  symbol handle
//! 0x0004_0000_0000_0000  doubles, `bits + 2^50`
//! ```
//!
//! A double keeps its exact bit pattern (NaN payload and sign included)
//! unless its top fourteen bits are all set. Those patterns are negative
//! NaNs that would wrap into the tagged range; they become the canonical NaN.

use skua_vm_gc::GcRef;

const TAG_MASK: u64 = 0xFFFF_0000_0000_0000;
const PAYLOAD_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;
const INT32_MASK: u64 = 0xFFFF_FFFF_0000_0000;

const TAG_UNDEFINED: u64 = 0x0000_0000_0000_0000;
const TAG_NULL: u64 = 0x0000_0000_0000_0001;
const TAG_TRUE: u64 = 0x0000_0000_0000_0002;
const TAG_FALSE: u64 = 0x0000_0000_0000_0003;
const TAG_EMPTY: u64 = 0x0000_0000_0000_0004;
const TAG_INT32: u64 = 0x0000_0001_0000_0000;
const TAG_OBJECT: u64 = 0x0001_0000_0000_0000;
const TAG_STRING: u64 = 0x0002_0000_0000_0000;
const TAG_SYMBOL: u64 = 0x0003_0000_0000_0000;

/// Added to a double's bits; everything at or above it is a double
const DOUBLE_OFFSET: u64 = 1 << 50;
/// First double bit pattern that cannot be offset without wrapping
const DOUBLE_LIMIT: u64 = 0u64.wrapping_sub(DOUBLE_OFFSET);
const CANONICAL_NAN: u64 = 0x7FF8_0000_0000_0000 + DOUBLE_OFFSET;

/// A JavaScript value using NaN-boxing
///
/// `Value` is `Copy`; heap references are plain [`GcRef`] handles kept alive by
/// tracing, never by the value itself. `==` on `Value` compares bit patterns,
/// which is identity for heap values and *not* JavaScript equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(u64);

impl Value {
    /// Create undefined value
    #[inline]
    pub const fn undefined() -> Self {
        Self(TAG_UNDEFINED)
    }

    /// Create null value
    #[inline]
    pub const fn null() -> Self {
        Self(TAG_NULL)
    }

    /// The internal `empty` marker
    #[inline]
    pub const fn empty() -> Self {
        Self(TAG_EMPTY)
    }

    /// Create boolean value
    #[inline]
    pub const fn from_bool(b: bool) -> Self {
        Self(if b { TAG_TRUE } else { TAG_FALSE })
    }

    /// Create 32-bit integer value
    #[inline]
    pub const fn from_i32(n: i32) -> Self {
        Self(TAG_INT32 | (n as u32 as u64))
    }

    /// Create a number, preferring the int32 form when it is exact
    #[inline]
    pub fn number(n: f64) -> Self {
        if n.fract() == 0.0
            && n >= i32::MIN as f64
            && n <= i32::MAX as f64
            && (n != 0.0 || n.is_sign_positive())
        {
            return Self::from_i32(n as i32);
        }
        Self::from_f64(n)
    }

    /// Create a double value without int32 narrowing
    #[inline]
    pub fn from_f64(n: f64) -> Self {
        let bits = n.to_bits();
        if bits >= DOUBLE_LIMIT {
            return Self(CANONICAL_NAN);
        }
        Self(bits + DOUBLE_OFFSET)
    }

    /// Create NaN value explicitly
    #[inline]
    pub const fn nan() -> Self {
        Self(CANONICAL_NAN)
    }

    /// Object reference
    #[inline]
    pub const fn object(handle: GcRef) -> Self {
        Self(TAG_OBJECT | (handle.to_bits() & PAYLOAD_MASK))
    }

    /// String reference
    #[inline]
    pub const fn string(handle: GcRef) -> Self {
        Self(TAG_STRING | (handle.to_bits() & PAYLOAD_MASK))
    }

    /// Symbol reference
    #[inline]
    pub const fn symbol(handle: GcRef) -> Self {
        Self(TAG_SYMBOL | (handle.to_bits() & PAYLOAD_MASK))
    }

    /// Raw bit pattern
    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    // ==================== Type tests ====================

    /// Is undefined
    #[inline]
    pub const fn is_undefined(self) -> bool {
        self.0 == TAG_UNDEFINED
    }

    /// Is null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == TAG_NULL
    }

    /// Is null or undefined
    #[inline]
    pub const fn is_undefined_or_null(self) -> bool {
        self.0 == TAG_UNDEFINED || self.0 == TAG_NULL
    }

    /// Is the internal `empty` marker
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == TAG_EMPTY
    }

    /// Is a boolean
    #[inline]
    pub const fn is_boolean(self) -> bool {
        self.0 == TAG_TRUE || self.0 == TAG_FALSE
    }

    /// Is a tagged int32
    #[inline]
    pub const fn is_int32(self) -> bool {
        self.0 & INT32_MASK == TAG_INT32
    }

    /// Is a double (including NaN and the infinities)
    #[inline]
    pub const fn is_double(self) -> bool {
        self.0 >= DOUBLE_OFFSET
    }

    /// Is any number
    #[inline]
    pub const fn is_number(self) -> bool {
        self.is_int32() || self.is_double()
    }

    /// Is an object reference
    #[inline]
    pub const fn is_object(self) -> bool {
        self.0 & TAG_MASK == TAG_OBJECT
    }

    /// Is a string reference
    #[inline]
    pub const fn is_string(self) -> bool {
        self.0 & TAG_MASK == TAG_STRING
    }

    /// Is a symbol reference
    #[inline]
    pub const fn is_symbol(self) -> bool {
        self.0 & TAG_MASK == TAG_SYMBOL
    }

    /// Holds any heap reference
    #[inline]
    pub const fn is_heap(self) -> bool {
        self.is_object() || self.is_string() || self.is_symbol()
    }

    // ==================== Narrowing ====================

    /// Payload of an int32 value
    #[inline]
    pub fn as_int32(self) -> i32 {
        debug_assert!(self.is_int32(), "as_int32 on {self:?}");
        self.0 as u32 as i32
    }

    /// Payload of a double value
    #[inline]
    pub fn as_f64(self) -> f64 {
        debug_assert!(self.is_double(), "as_f64 on {self:?}");
        f64::from_bits(self.0 - DOUBLE_OFFSET)
    }

    /// Numeric value of an int32 or double
    #[inline]
    pub fn as_number(self) -> f64 {
        if self.is_int32() {
            self.as_int32() as f64
        } else {
            self.as_f64()
        }
    }

    /// Payload of a boolean
    #[inline]
    pub fn as_boolean(self) -> bool {
        debug_assert!(self.is_boolean(), "as_boolean on {self:?}");
        self.0 == TAG_TRUE
    }

    /// Handle of a heap value
    #[inline]
    pub fn as_gc(self) -> GcRef {
        debug_assert!(self.is_heap(), "as_gc on {self:?}");
        GcRef::from_bits(self.0 & PAYLOAD_MASK)
    }

    /// Number if this is one
    #[inline]
    pub fn to_number_opt(self) -> Option<f64> {
        self.is_number().then(|| self.as_number())
    }

    /// Object handle if this is an object
    #[inline]
    pub fn as_object(self) -> Option<GcRef> {
        self.is_object().then(|| self.as_gc())
    }

    /// String handle if this is a string
    #[inline]
    pub fn as_string(self) -> Option<GcRef> {
        self.is_string().then(|| self.as_gc())
    }

    /// Symbol handle if this is a symbol
    #[inline]
    pub fn as_symbol(self) -> Option<GcRef> {
        self.is_symbol().then(|| self.as_gc())
    }

    /// Handle of any heap value
    #[inline]
    pub fn heap_ref(self) -> Option<GcRef> {
        self.is_heap().then(|| self.as_gc())
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::undefined()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::from_bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::from_i32(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::number(n)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            TAG_UNDEFINED => write!(f, "undefined"),
            TAG_NULL => write!(f, "null"),
            TAG_TRUE => write!(f, "true"),
            TAG_FALSE => write!(f, "false"),
            TAG_EMPTY => write!(f, "<empty>"),
            _ if self.is_int32() => write!(f, "{}", self.as_int32()),
            _ if self.is_double() => write!(f, "{:?}", self.as_f64()),
            _ => {
                let kind = match self.0 & TAG_MASK {
                    TAG_OBJECT => "object",
                    TAG_STRING => "string",
                    TAG_SYMBOL => "symbol",
                    _ => "invalid",
                };
                let handle = GcRef::from_bits(self.0 & PAYLOAD_MASK);
                write!(f, "{kind}#{}.{}", handle.index(), handle.generation())
            }
        }
    }
}

impl skua_vm_gc::Trace for Value {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        if let Some(handle) = self.heap_ref() {
            tracer(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singletons() {
        assert!(Value::undefined().is_undefined());
        assert!(Value::null().is_undefined_or_null());
        assert!(Value::empty().is_empty());
        assert!(!Value::empty().is_undefined());
        assert!(Value::from_bool(true).as_boolean());
        assert!(!Value::undefined().is_double());
    }

    #[test]
    fn test_nan_payloads_survive() {
        let nan = Value::from_f64(f64::NAN);
        assert!(nan.is_double());
        assert_eq!(nan, Value::nan());
        assert_ne!(nan, Value::undefined());
        for bits in [0x7FF8_0000_DEAD_BEEF, 0x7FF0_0000_0000_0001, 0xFFF8_0000_0000_0001, 0xFFFB_FFFF_FFFF_FFFF] {
            let v = Value::from_f64(f64::from_bits(bits));
            assert!(v.is_double());
            assert_eq!(v.as_f64().to_bits(), bits);
        }
    }

    #[test]
    fn test_wrapping_nans_are_canonicalized() {
        for bits in [0xFFFC_0000_0000_0000, 0xFFFF_FFFF_FFFF_FFFF] {
            let v = Value::from_f64(f64::from_bits(bits));
            assert_eq!(v, Value::nan());
            assert!(v.as_f64().is_nan());
        }
    }

    #[test]
    fn test_negative_zero_stays_double() {
        let v = Value::number(-0.0);
        assert!(v.is_double());
        assert!(v.as_f64().is_sign_negative());
        assert!(Value::number(0.0).is_int32());
    }

    #[test]
    fn test_handles() {
        let handle = GcRef::new(42, 7);
        let v = Value::object(handle);
        assert!(v.is_object() && !v.is_string() && !v.is_double());
        assert_eq!(v.as_gc(), handle);
        assert_eq!(Value::string(handle).as_string(), Some(handle));
        assert_eq!(Value::symbol(handle).as_symbol(), Some(handle));
        assert_eq!(v.as_string(), None);
    }
}
