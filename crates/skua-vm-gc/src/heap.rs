//! GC heap management

use serde::Deserialize;

use crate::collector::GcStats;
use crate::error::GcError;
use crate::finalization::FinalizationRegistry;
use crate::object::{GcRef, MarkColor, Trace};
use crate::roots::PersistentRoots;

/// GC configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Live cell count that triggers the first collection (default: 100_000)
    pub initial_threshold: usize,
    /// Next threshold as a multiple of the cells surviving a collection (default: 2.0)
    pub growth_factor: f64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            initial_threshold: 100_000,
            growth_factor: 2.0,
        }
    }
}

pub(crate) struct Slot<T> {
    pub(crate) generation: u16,
    pub(crate) color: MarkColor,
    pub(crate) value: Option<T>,
}

/// Arena of GC-managed cells addressed by [`GcRef`]
pub struct Heap<T: Trace> {
    pub(crate) slots: Vec<Slot<T>>,
    pub(crate) free: Vec<u32>,
    pub(crate) live: usize,
    pub(crate) threshold: usize,
    pub(crate) config: GcConfig,
    pub(crate) stats: GcStats,
    pub(crate) roots: PersistentRoots,
    pub(crate) finalizers: FinalizationRegistry,
    pub(crate) worklist: Vec<GcRef>,
}

impl<T: Trace> Heap<T> {
    /// Create new heap with default config
    pub fn new() -> Self {
        Self::with_config(GcConfig::default())
    }

    /// Create new heap with custom config
    pub fn with_config(config: GcConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            threshold: config.initial_threshold.max(1),
            config,
            stats: GcStats::default(),
            roots: PersistentRoots::new(),
            finalizers: FinalizationRegistry::new(),
            worklist: Vec::new(),
        }
    }

    /// Allocate a cell
    pub fn alloc(&mut self, value: T) -> GcRef {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            slot.color = MarkColor::White;
            return GcRef::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            color: MarkColor::White,
            value: Some(value),
        });
        GcRef::new(index, 0)
    }

    #[inline]
    fn slot(&self, handle: GcRef) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index() as usize)
            .filter(|s| s.generation == handle.generation() && s.value.is_some())
    }

    /// Check if a handle still refers to a live cell
    #[inline]
    pub fn contains(&self, handle: GcRef) -> bool {
        self.slot(handle).is_some()
    }

    /// Borrow a cell, reporting dangling handles
    #[inline]
    pub fn try_get(&self, handle: GcRef) -> Result<&T, GcError> {
        self.slot(handle)
            .and_then(|s| s.value.as_ref())
            .ok_or(GcError::DanglingHandle(handle))
    }

    /// Borrow a cell
    ///
    /// # Panics
    /// Panics on a dangling handle; the embedder's root set must keep every
    /// reachable handle alive.
    #[inline]
    pub fn get(&self, handle: GcRef) -> &T {
        match self.try_get(handle) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Mutably borrow a cell
    ///
    /// # Panics
    /// Panics on a dangling handle.
    #[inline]
    pub fn get_mut(&mut self, handle: GcRef) -> &mut T {
        let slot = self
            .slots
            .get_mut(handle.index() as usize)
            .filter(|s| s.generation == handle.generation());
        match slot.and_then(|s| s.value.as_mut()) {
            Some(value) => value,
            None => panic!("{}", GcError::DanglingHandle(handle)),
        }
    }

    /// Number of live cells
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if the heap holds no cells
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Check if the allocation threshold has been crossed
    #[inline]
    pub fn should_collect(&self) -> bool {
        self.live >= self.threshold
    }

    /// Current collection threshold
    #[inline]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Get config
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Get statistics
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Keep `handle` alive until a matching [`Heap::unroot`]
    pub fn root(&mut self, handle: GcRef) {
        self.roots.add(handle);
    }

    /// Release one persistent root
    pub fn unroot(&mut self, handle: GcRef) -> Result<(), GcError> {
        self.roots.remove(handle)
    }

    /// Persistent root table
    pub fn persistent_roots(&self) -> &PersistentRoots {
        &self.roots
    }

    /// Report `token` from [`Heap::drain_finalized`] once `target` is collected
    pub fn register_finalizer(&mut self, target: GcRef, token: u64) -> Result<(), GcError> {
        if !self.contains(target) {
            return Err(GcError::DanglingHandle(target));
        }
        self.finalizers.register(target, token);
        Ok(())
    }

    /// Cancel registrations carrying `token`
    pub fn unregister_finalizer(&mut self, token: u64) -> bool {
        self.finalizers.unregister(token)
    }

    /// Tokens of targets collected since the last drain
    pub fn drain_finalized(&mut self) -> Vec<u64> {
        self.finalizers.drain_pending()
    }
}

impl<T: Trace> Default for Heap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Trace> std::fmt::Debug for Heap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("live", &self.live)
            .field("capacity", &self.slots.len())
            .field("threshold", &self.threshold)
            .field("roots", &self.roots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Leaf(u32);

    impl Trace for Leaf {
        fn trace(&self, _tracer: &mut dyn FnMut(GcRef)) {}
    }

    #[test]
    fn test_heap_creation() {
        let heap: Heap<Leaf> = Heap::new();
        assert!(heap.is_empty());
        assert!(!heap.should_collect());
    }

    #[test]
    fn test_alloc_and_get() {
        let mut heap = Heap::new();
        let a = heap.alloc(Leaf(1));
        let b = heap.alloc(Leaf(2));
        assert_ne!(a, b);
        assert_eq!(heap.get(a).0, 1);
        heap.get_mut(b).0 = 5;
        assert_eq!(heap.get(b).0, 5);
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn test_threshold_trigger() {
        let mut heap = Heap::with_config(GcConfig {
            initial_threshold: 2,
            growth_factor: 2.0,
        });
        heap.alloc(Leaf(0));
        assert!(!heap.should_collect());
        heap.alloc(Leaf(1));
        assert!(heap.should_collect());
    }

    #[test]
    fn test_finalizer_requires_live_target() {
        let mut heap: Heap<Leaf> = Heap::new();
        let ghost = GcRef::new(3, 0);
        assert_eq!(
            heap.register_finalizer(ghost, 1),
            Err(GcError::DanglingHandle(ghost))
        );
    }
}
