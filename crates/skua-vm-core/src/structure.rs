//! Object structures (hidden classes)
//!
//! A [`Structure`] lists an object's named properties in insertion order with
//! their attributes. Objects that receive the same key/attribute sequence from
//! the same root share one structure through the transition tree, so a
//! `(StructureId, index)` pair identifies a property layout.
//!
//! Deleting a property or changing attributes leaves the tree: the object gets
//! a private structure with a fresh id, so cached pairs can never match it.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;
use skua_vm_gc::{GcRef, Trace};

use crate::property::{PropertyAttributes, PropertyKey};

static NEXT_STRUCTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique structure identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructureId(u64);

impl StructureId {
    fn next() -> Self {
        Self(NEXT_STRUCTURE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// One named property of a structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureEntry {
    /// Property key
    pub key: PropertyKey,
    /// Attributes
    pub attributes: PropertyAttributes,
}

/// Property layout shared between objects
pub struct Structure {
    id: StructureId,
    entries: Vec<StructureEntry>,
    lookup: FxHashMap<PropertyKey, u32>,
    /// Children own no link back, so strong edges cannot form a cycle
    transitions: RefCell<FxHashMap<(PropertyKey, PropertyAttributes), Rc<Structure>>>,
    shared: bool,
}

impl Structure {
    /// Create a new root (empty) structure
    pub fn root() -> Rc<Self> {
        Rc::new(Self::with_entries(Vec::new(), true))
    }

    fn with_entries(entries: Vec<StructureEntry>, shared: bool) -> Self {
        let lookup = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key.clone(), i as u32))
            .collect();
        Self {
            id: StructureId::next(),
            entries,
            lookup,
            transitions: RefCell::new(FxHashMap::default()),
            shared,
        }
    }

    /// Identity used by inline caches
    #[inline]
    pub fn id(&self) -> StructureId {
        self.id
    }

    /// Number of named properties
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Has no named properties
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Part of a transition tree (false after a delete or reconfiguration)
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Entries in insertion order
    #[inline]
    pub fn entries(&self) -> &[StructureEntry] {
        &self.entries
    }

    /// Slot index and attributes of `key`
    #[inline]
    pub fn find(&self, key: &PropertyKey) -> Option<(u32, PropertyAttributes)> {
        let index = *self.lookup.get(key)?;
        Some((index, self.entries[index as usize].attributes))
    }

    /// Structure after appending `key`; the new property gets the last slot
    pub fn add_property(self: &Rc<Self>, key: PropertyKey, attributes: PropertyAttributes) -> Rc<Self> {
        debug_assert!(self.find(&key).is_none(), "duplicate property {key}");
        let transition = (key, attributes);
        if self.shared
            && let Some(existing) = self.transitions.borrow().get(&transition).cloned()
        {
            return existing;
        }

        let mut entries = self.entries.clone();
        entries.push(StructureEntry {
            key: transition.0.clone(),
            attributes,
        });
        let child = Rc::new(Self::with_entries(entries, self.shared));
        if self.shared {
            tracing::trace!(
                target: "skua::structure",
                parent = self.id.0,
                child = child.id.0,
                key = %transition.0,
                "transition"
            );
            self.transitions.borrow_mut().insert(transition, Rc::clone(&child));
        }
        child
    }

    /// Private structure without `index`; later slots shift down by one
    pub fn remove_property(&self, index: u32) -> Rc<Self> {
        let mut entries = self.entries.clone();
        entries.remove(index as usize);
        Rc::new(Self::with_entries(entries, false))
    }

    /// Private structure with new attributes for `index`
    pub fn reconfigure(&self, index: u32, attributes: PropertyAttributes) -> Rc<Self> {
        let mut entries = self.entries.clone();
        entries[index as usize].attributes = attributes;
        Rc::new(Self::with_entries(entries, false))
    }

    /// Private copy that no longer shares future transitions
    pub fn unshare(&self) -> Rc<Self> {
        Rc::new(Self::with_entries(self.entries.clone(), false))
    }
}

impl Trace for Structure {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        for entry in &self.entries {
            entry.key.trace(tracer);
        }
    }
}

impl std::fmt::Debug for Structure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Structure")
            .field("id", &self.id)
            .field("keys", &self.entries.iter().map(|e| e.key.to_string()).collect::<Vec<_>>())
            .field("shared", &self.shared)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> PropertyKey {
        PropertyKey::from_name(name)
    }

    #[test]
    fn test_transitions_are_shared() {
        let root = Structure::root();
        let a = root.add_property(key("x"), PropertyAttributes::DEFAULT);
        let b = root.add_property(key("x"), PropertyAttributes::DEFAULT);
        assert_eq!(a.id(), b.id());
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.find(&key("x")).map(|(i, _)| i), Some(0));
    }

    #[test]
    fn test_attributes_split_transitions() {
        let root = Structure::root();
        let a = root.add_property(key("x"), PropertyAttributes::DEFAULT);
        let b = root.add_property(key("x"), PropertyAttributes::HIDDEN);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_remove_leaves_tree() {
        let root = Structure::root();
        let xy = root
            .add_property(key("x"), PropertyAttributes::DEFAULT)
            .add_property(key("y"), PropertyAttributes::DEFAULT);
        let y = xy.remove_property(0);
        assert!(!y.is_shared());
        assert_eq!(y.find(&key("y")).map(|(i, _)| i), Some(0));
        assert_ne!(y.id(), xy.id());
        let y2 = y.add_property(key("z"), PropertyAttributes::DEFAULT);
        let y3 = y.add_property(key("z"), PropertyAttributes::DEFAULT);
        assert_ne!(y2.id(), y3.id());
    }

    #[test]
    fn test_transition_outlives_its_users() {
        let root = Structure::root();
        let first = root
            .add_property(key("x"), PropertyAttributes::DEFAULT)
            .add_property(key("y"), PropertyAttributes::DEFAULT)
            .id();
        let second = root
            .add_property(key("x"), PropertyAttributes::DEFAULT)
            .add_property(key("y"), PropertyAttributes::DEFAULT)
            .id();
        assert_eq!(first, second);
    }
}
