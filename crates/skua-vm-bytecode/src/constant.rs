//! Constant and numeral literal pools for bytecode blocks

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A constant value in the constant pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// String value (also used for identifier and property names)
    String(Box<str>),
    /// Number that did not fit in the numeral literal registers
    Number(f64),
}

impl Constant {
    /// Get as string if this is a string constant
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    /// Get as number if this is a number constant
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    String(Box<str>),
    Number(u64),
}

/// Constant pool with deduplication
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstantPool {
    constants: Vec<Constant>,
    #[serde(skip)]
    lookup: FxHashMap<ConstantKey, u32>,
}

impl ConstantPool {
    /// Create a new empty constant pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant to the pool, returns its index
    ///
    /// Identical constants share one entry. Numbers are compared bitwise so that
    /// `0` and `-0` stay distinct.
    pub fn add(&mut self, constant: Constant) -> u32 {
        let key = match &constant {
            Constant::String(s) => ConstantKey::String(s.clone()),
            Constant::Number(n) => ConstantKey::Number(n.to_bits()),
        };
        if let Some(&idx) = self.lookup.get(&key) {
            return idx;
        }
        let idx = self.constants.len() as u32;
        self.constants.push(constant);
        self.lookup.insert(key, idx);
        idx
    }

    /// Add a string constant
    #[inline]
    pub fn add_string(&mut self, s: &str) -> u32 {
        self.add(Constant::String(s.into()))
    }

    /// Add a number constant
    #[inline]
    pub fn add_number(&mut self, n: f64) -> u32 {
        self.add(Constant::Number(n))
    }

    /// Get a constant by index
    #[inline]
    pub fn get(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    /// Get a string constant by index
    #[inline]
    pub fn get_str(&self, index: u32) -> Option<&str> {
        self.get(index).and_then(Constant::as_str)
    }

    /// Number of constants in the pool
    #[inline]
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// Check if the pool is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Iterate over constants
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.constants.iter()
    }
}

/// Number literals that live in dedicated registers at the end of the register file
///
/// The interpreter copies these into the frame once on entry, so reading a numeric
/// literal is a plain register read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NumeralPool {
    values: Vec<f64>,
    #[serde(skip)]
    lookup: FxHashMap<u64, u16>,
}

impl NumeralPool {
    /// Create a new empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a literal, returning its index, or `None` once `limit` is reached
    pub fn add(&mut self, value: f64, limit: usize) -> Option<u16> {
        let bits = value.to_bits();
        if let Some(&idx) = self.lookup.get(&bits) {
            return Some(idx);
        }
        if self.values.len() >= limit {
            return None;
        }
        let idx = self.values.len() as u16;
        self.values.push(value);
        self.lookup.insert(bits, idx);
        Some(idx)
    }

    /// Literal values in register order
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of literals
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the pool is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_pool_dedup() {
        let mut pool = ConstantPool::new();

        let idx1 = pool.add_string("hello");
        let idx2 = pool.add_string("world");
        let idx3 = pool.add_string("hello");

        assert_eq!(idx1, 0);
        assert_eq!(idx2, 1);
        assert_eq!(idx3, 0);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get_str(1), Some("world"));
    }

    #[test]
    fn test_constant_pool_number_bits() {
        let mut pool = ConstantPool::new();
        let zero = pool.add_number(0.0);
        let neg_zero = pool.add_number(-0.0);
        assert_ne!(zero, neg_zero);
        assert_eq!(pool.add_number(0.0), zero);
        assert_eq!(pool.get(neg_zero).and_then(Constant::as_number).map(f64::is_sign_negative), Some(true));
    }

    #[test]
    fn test_numeral_pool_limit() {
        let mut pool = NumeralPool::new();
        assert_eq!(pool.add(1.5, 2), Some(0));
        assert_eq!(pool.add(2.5, 2), Some(1));
        assert_eq!(pool.add(1.5, 2), Some(0));
        assert_eq!(pool.add(3.5, 2), None);
        assert_eq!(pool.values(), &[1.5, 2.5]);
    }
}
