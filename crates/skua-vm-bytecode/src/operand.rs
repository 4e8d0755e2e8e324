//! Bytecode operands

use serde::{Deserialize, Serialize};

/// Index of a slot in the register file.
///
/// The register file is laid out as operand registers, then the `this` slot and
/// stack allocated variables, then the numeral literal pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Register(pub u16);

impl Register {
    /// Create a new register
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Get register index
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }

    /// Register `n` slots after this one
    #[inline]
    pub const fn offset(self, n: u16) -> Self {
        Self(self.0 + n)
    }
}

impl From<u16> for Register {
    fn from(index: u16) -> Self {
        Self(index)
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Index into the constant pool of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ConstantIndex(pub u32);

impl ConstantIndex {
    /// Create a new constant index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Index into the function table of a script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FunctionIndex(pub u32);

impl FunctionIndex {
    /// Create a new function index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Jump offset relative to the jumping instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct JumpOffset(pub i32);

impl JumpOffset {
    /// Create a new jump offset
    #[inline]
    pub const fn new(offset: i32) -> Self {
        Self(offset)
    }

    /// Get offset value
    #[inline]
    pub const fn offset(self) -> i32 {
        self.0
    }

    /// Absolute target for a jump located at `pc`
    #[inline]
    pub const fn target(self, pc: usize) -> usize {
        (pc as i64 + self.0 as i64) as usize
    }
}

/// Inline cache site of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct IcIndex(pub u32);

impl IcIndex {
    /// Create a new cache site index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register() {
        let r = Register::new(5);
        assert_eq!(r.index(), 5);
        assert_eq!(r.offset(3), Register(8));
        assert_eq!(r.to_string(), "r5");
    }

    #[test]
    fn test_jump_target() {
        assert_eq!(JumpOffset::new(4).target(10), 14);
        assert_eq!(JumpOffset::new(-10).target(10), 0);
    }
}
