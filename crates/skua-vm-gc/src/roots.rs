//! Persistent roots held by the embedder

use rustc_hash::FxHashMap;

use crate::error::GcError;
use crate::object::GcRef;

/// Counted set of handles that survive every collection
#[derive(Debug, Default)]
pub struct PersistentRoots {
    counts: FxHashMap<GcRef, u32>,
}

impl PersistentRoots {
    /// Create an empty root table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one root reference
    pub fn add(&mut self, handle: GcRef) {
        *self.counts.entry(handle).or_insert(0) += 1;
    }

    /// Drop one root reference
    pub fn remove(&mut self, handle: GcRef) -> Result<(), GcError> {
        let count = self
            .counts
            .get_mut(&handle)
            .ok_or(GcError::NotRooted(handle))?;
        *count -= 1;
        if *count == 0 {
            self.counts.remove(&handle);
        }
        Ok(())
    }

    /// Check if a handle is rooted
    pub fn contains(&self, handle: GcRef) -> bool {
        self.counts.contains_key(&handle)
    }

    /// Number of distinct rooted handles
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Check if no handle is rooted
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate over rooted handles
    pub fn iter(&self) -> impl Iterator<Item = GcRef> + '_ {
        self.counts.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counted_roots() {
        let mut roots = PersistentRoots::new();
        let h = GcRef::new(7, 0);
        roots.add(h);
        roots.add(h);
        assert_eq!(roots.len(), 1);
        roots.remove(h).unwrap();
        assert!(roots.contains(h));
        roots.remove(h).unwrap();
        assert!(!roots.contains(h));
        assert_eq!(roots.remove(h), Err(GcError::NotRooted(h)));
    }
}
