//! Finalization support: weak targets whose death is reported as tokens.
//!
//! Targets are NOT traced. After marking, every registration whose target stayed
//! white is moved to the pending queue, and the embedder drains the tokens to run
//! its cleanup.

use crate::object::GcRef;

#[derive(Debug, Clone, Copy)]
struct TargetEntry {
    target: GcRef,
    token: u64,
}

/// Weak target → token registrations
#[derive(Debug, Default)]
pub struct FinalizationRegistry {
    entries: Vec<TargetEntry>,
    pending: Vec<u64>,
}

impl FinalizationRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target with the token reported when it dies
    pub fn register(&mut self, target: GcRef, token: u64) {
        self.entries.push(TargetEntry { target, token });
    }

    /// Remove every registration carrying `token`; returns true if any was removed
    pub fn unregister(&mut self, token: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.token != token);
        self.entries.len() != before
    }

    /// Queue tokens of dead targets. `is_live` answers from the current mark bits.
    pub(crate) fn sweep_dead_targets(&mut self, mut is_live: impl FnMut(GcRef) -> bool) {
        let pending = &mut self.pending;
        self.entries.retain(|entry| {
            if is_live(entry.target) {
                true
            } else {
                pending.push(entry.token);
                false
            }
        });
    }

    /// Drain tokens of collected targets
    pub fn drain_pending(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.pending)
    }

    /// Check if there are pending cleanups
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_moves_dead_tokens() {
        let mut registry = FinalizationRegistry::new();
        let alive = GcRef::new(1, 0);
        let dead = GcRef::new(2, 0);
        registry.register(alive, 10);
        registry.register(dead, 20);

        registry.sweep_dead_targets(|r| r == alive);
        assert!(registry.has_pending());
        assert_eq!(registry.drain_pending(), vec![20]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let mut registry = FinalizationRegistry::new();
        registry.register(GcRef::new(1, 0), 5);
        assert!(registry.unregister(5));
        assert!(!registry.unregister(5));
        assert!(registry.is_empty());
    }
}
