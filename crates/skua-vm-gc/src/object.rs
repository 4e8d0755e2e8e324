//! GC handles and the tracing contract

/// Handle to a heap cell
///
/// Fits in 48 bits so it can be boxed inside a NaN-tagged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GcRef {
    index: u32,
    generation: u16,
}

impl GcRef {
    /// Create a handle from its parts
    #[inline]
    pub const fn new(index: u32, generation: u16) -> Self {
        Self { index, generation }
    }

    /// Slot index
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation at allocation time
    #[inline]
    pub const fn generation(self) -> u16 {
        self.generation
    }

    /// Pack into the low 48 bits of a `u64`
    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Unpack from [`GcRef::to_bits`]; bits above 48 are ignored
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u16,
        }
    }
}

/// Mark color for tri-color marking
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkColor {
    /// Not yet visited
    White = 0,
    /// In worklist
    Gray = 1,
    /// Fully scanned
    Black = 2,
}

/// Trait for GC-managed cells
pub trait Trace {
    /// Report every handle this cell keeps alive
    fn trace(&self, tracer: &mut dyn FnMut(GcRef));
}

impl<T: Trace> Trace for Option<T> {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        if let Some(value) = self {
            value.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for Vec<T> {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        for value in self {
            value.trace(tracer);
        }
    }
}

impl Trace for GcRef {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        tracer(*self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_bits() {
        let r = GcRef::new(0xDEAD_BEEF, 0x1234);
        let bits = r.to_bits();
        assert!(bits < (1 << 48));
        assert_eq!(GcRef::from_bits(bits), r);
        assert_eq!(GcRef::from_bits(bits | 0xFFFF_0000_0000_0000), r);
    }

    #[test]
    fn test_trace_option_vec() {
        let cells = vec![Some(GcRef::new(1, 0)), None, Some(GcRef::new(3, 2))];
        let mut seen = Vec::new();
        cells.trace(&mut |r| seen.push(r.index()));
        assert_eq!(seen, vec![1, 3]);
    }
}
