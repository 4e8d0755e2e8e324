//! Mark-sweep garbage collector

use std::time::Instant;

use crate::heap::Heap;
use crate::object::{GcRef, MarkColor, Trace};

/// GC statistics
#[derive(Debug, Default, Clone)]
pub struct GcStats {
    /// Number of collections
    pub collections: u64,
    /// Total time spent in GC (nanoseconds)
    pub total_time_ns: u64,
    /// Cells reclaimed in last collection
    pub last_reclaimed: usize,
    /// Cells marked in last collection
    pub last_marked: usize,
}

impl<T: Trace> Heap<T> {
    /// Run a full GC cycle, returning the number of reclaimed cells
    ///
    /// `roots` plus the persistent root table form the complete root set. The
    /// caller must be at a safe point: any handle held outside the root set may
    /// dangle afterwards.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = GcRef>) -> usize {
        let start = Instant::now();

        #[cfg(feature = "gc_logging")]
        let initial_count = self.live;

        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "skua::gc",
            objects = initial_count,
            persistent_roots = self.roots.len(),
            "GC cycle starting"
        );

        // Phase 1: Mark from roots
        let persistent: Vec<GcRef> = self.roots.iter().collect();
        for root in roots.into_iter().chain(persistent) {
            self.gray(root);
        }
        self.stats.last_marked = self.drain_worklist();

        // Phase 2: Queue finalization tokens of dead targets
        let slots = &self.slots;
        self.finalizers.sweep_dead_targets(|target| {
            slots
                .get(target.index() as usize)
                .is_some_and(|s| s.generation == target.generation() && s.color == MarkColor::Black)
        });

        // Phase 3: Sweep unmarked cells
        let reclaimed = self.sweep();

        self.threshold = ((self.live as f64 * self.config.growth_factor) as usize)
            .max(self.config.initial_threshold)
            .max(1);

        let elapsed = start.elapsed();
        self.stats.collections += 1;
        self.stats.total_time_ns += elapsed.as_nanos() as u64;
        self.stats.last_reclaimed = reclaimed;

        #[cfg(feature = "gc_logging")]
        tracing::info!(
            target: "skua::gc",
            collection = self.stats.collections,
            reclaimed,
            pause_us = elapsed.as_micros() as u64,
            live_objects = self.live,
            next_threshold = self.threshold,
            "GC cycle complete"
        );

        reclaimed
    }

    fn gray(&mut self, handle: GcRef) {
        if let Some(slot) = self.slots.get_mut(handle.index() as usize)
            && slot.generation == handle.generation()
            && slot.value.is_some()
            && slot.color == MarkColor::White
        {
            slot.color = MarkColor::Gray;
            self.worklist.push(handle);
        }
    }

    fn drain_worklist(&mut self) -> usize {
        let mut marked = 0;
        let mut children = Vec::new();
        while let Some(handle) = self.worklist.pop() {
            let slot = &mut self.slots[handle.index() as usize];
            if let Some(value) = &slot.value {
                value.trace(&mut |child| children.push(child));
            }
            slot.color = MarkColor::Black;
            marked += 1;
            for child in children.drain(..) {
                self.gray(child);
            }
        }
        marked
    }

    fn sweep(&mut self) -> usize {
        let mut reclaimed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.is_none() {
                continue;
            }
            if slot.color == MarkColor::White {
                slot.value = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                reclaimed += 1;
            } else {
                slot.color = MarkColor::White;
            }
        }
        self.live -= reclaimed;
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use crate::heap::Heap;
    use crate::object::{GcRef, Trace};

    struct Node(Vec<GcRef>);

    impl Trace for Node {
        fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
            self.0.trace(tracer);
        }
    }

    #[test]
    fn test_collect_empty() {
        let mut heap: Heap<Node> = Heap::new();
        assert_eq!(heap.collect([]), 0);
        assert_eq!(heap.stats().collections, 1);
    }

    #[test]
    fn test_mark_single_root() {
        let mut heap = Heap::new();
        let root = heap.alloc(Node(vec![]));
        let garbage = heap.alloc(Node(vec![]));

        assert_eq!(heap.collect([root]), 1);
        assert_eq!(heap.stats().last_marked, 1);
        assert!(heap.contains(root));
        assert!(!heap.contains(garbage));
    }

    #[test]
    fn test_reused_slot_gets_new_generation() {
        let mut heap = Heap::new();
        let old = heap.alloc(Node(vec![]));
        heap.collect([]);
        let new = heap.alloc(Node(vec![]));
        assert_eq!(old.index(), new.index());
        assert_ne!(old.generation(), new.generation());
        assert!(heap.try_get(old).is_err());
    }
}
