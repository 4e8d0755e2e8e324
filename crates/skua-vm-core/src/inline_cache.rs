//! Inline caches for named property and global variable access
//!
//! Each `GetNamed`/`SetNamed`/`DefineOwnNamed`/`GetGlobal`/`SetGlobal` site owns
//! one [`InlineCache`] in its function's [`crate::function::CodeBlock`]. An entry
//! is keyed on the receiver's [`StructureId`]; structure ids are never reused,
//! so an entry can go stale but never alias a different layout.
//!
//! Prototypes are not part of a structure, so prototype-chain entries also
//! record every prototype handle and its structure id and revalidate them.

use std::rc::Rc;

use smallvec::SmallVec;
use skua_vm_bytecode::IcIndex;
use skua_vm_gc::GcRef;

use crate::config::InlineCacheConfig;
use crate::error::VmResult;
use crate::object::ObjectKind;
use crate::property::{PropertyAttributes, PropertyKey, PropertySlot};
use crate::runtime::Runtime;
use crate::structure::{Structure, StructureId};
use crate::value::Value;

/// Prototype links recorded by a chain entry
pub type ProtoChain = SmallVec<[(GcRef, StructureId); 4]>;

/// Cache state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Never hit
    Uninitialized,
    /// One entry
    Monomorphic,
    /// Several entries
    Polymorphic,
    /// Gave up; always takes the slow path
    Megamorphic,
}

/// One cached layout
#[derive(Debug, Clone)]
pub enum CacheEntry {
    /// Property at `index` of the receiver itself
    Own {
        /// Receiver structure
        structure: StructureId,
        /// Slot index
        index: u32,
    },
    /// Property at `index` of the last object of `chain`
    Proto {
        /// Receiver structure
        structure: StructureId,
        /// Prototype links from the receiver to the holder
        chain: ProtoChain,
        /// Slot index in the holder
        index: u32,
    },
    /// Adding the property moves the receiver from `from` to `to`
    Transition {
        /// Receiver structure before the store
        from: StructureId,
        /// Receiver structure after the store
        to: Rc<Structure>,
        /// Full prototype chain that must still lack the key (stores only)
        chain: Option<ProtoChain>,
    },
    /// Global object property, valid while no global lexical was declared
    Global {
        /// Global object structure
        structure: StructureId,
        /// Slot index
        index: u32,
        /// Global lexical epoch when recorded
        epoch: u64,
    },
}

impl CacheEntry {
    fn receiver(&self) -> StructureId {
        match self {
            Self::Own { structure, .. }
            | Self::Proto { structure, .. }
            | Self::Global { structure, .. } => *structure,
            Self::Transition { from, .. } => *from,
        }
    }
}

/// Per-site cache record
#[derive(Debug, Clone)]
pub struct InlineCache {
    entries: SmallVec<[CacheEntry; 4]>,
    misses: u32,
    state: CacheState,
}

impl Default for InlineCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InlineCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: SmallVec::new(),
            misses: 0,
            state: CacheState::Uninitialized,
        }
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Cached entries
    #[inline]
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Slow-path lookups recorded so far
    #[inline]
    pub fn misses(&self) -> u32 {
        self.misses
    }

    /// Record a slow-path result
    pub fn record(&mut self, entry: CacheEntry, config: &InlineCacheConfig) {
        if self.state == CacheState::Megamorphic {
            return;
        }
        self.misses += 1;
        let receiver = entry.receiver();
        self.entries.retain(|e| e.receiver() != receiver);
        if self.misses > config.miss_limit || self.entries.len() >= config.max_entries {
            tracing::trace!(
                target: "skua::ic",
                misses = self.misses,
                entries = self.entries.len(),
                "site went megamorphic"
            );
            self.entries.clear();
            self.state = CacheState::Megamorphic;
            return;
        }
        self.entries.push(entry);
        let next = if self.entries.len() == 1 {
            CacheState::Monomorphic
        } else {
            CacheState::Polymorphic
        };
        if next != self.state {
            tracing::trace!(target: "skua::ic", from = ?self.state, to = ?next, "cache transition");
        }
        self.state = next;
    }

    /// Record a slow-path result that could not be cached
    pub fn record_miss(&mut self, config: &InlineCacheConfig) {
        if self.state == CacheState::Megamorphic {
            return;
        }
        self.misses += 1;
        if self.misses > config.miss_limit {
            tracing::trace!(target: "skua::ic", misses = self.misses, "site went megamorphic");
            self.entries.clear();
            self.state = CacheState::Megamorphic;
        }
    }
}

/// Named lookups through `kind` may be served from the structure
fn cacheable(kind: &ObjectKind, key: &PropertyKey) -> bool {
    let PropertyKey::String(name) = key else {
        return false;
    };
    match kind {
        ObjectKind::Host(_) => false,
        ObjectKind::Array { .. } | ObjectKind::String(_) => &**name != "length",
        _ => true,
    }
}

impl Runtime {
    fn site(&self, code: GcRef, ic: IcIndex) -> &InlineCache {
        &self.code_block(code).caches[ic.index() as usize]
    }

    fn record_entry(&mut self, code: GcRef, ic: IcIndex, entry: Option<CacheEntry>) {
        let config = self.config.inline_cache;
        let site = &mut self.code_block_mut(code).caches[ic.index() as usize];
        match entry {
            Some(entry) => site.record(entry, &config),
            None => site.record_miss(&config),
        }
    }

    /// Follow `chain` from `receiver`; returns the last link when every hop matches
    fn validate_chain(&self, receiver: GcRef, chain: &[(GcRef, StructureId)]) -> Option<GcRef> {
        let mut current = receiver;
        for &(proto, structure) in chain {
            if self.object(current).prototype != Some(proto) {
                return None;
            }
            if self.object(proto).structure.id() != structure {
                return None;
            }
            current = proto;
        }
        Some(current)
    }

    /// Holder and slot index of a cached load
    fn probe_load(&self, code: GcRef, ic: IcIndex, receiver: GcRef, key: &PropertyKey) -> Option<(GcRef, u32)> {
        let site = self.site(code, ic);
        if site.state == CacheState::Megamorphic || !cacheable(&self.object(receiver).kind, key) {
            return None;
        }
        let structure = self.object(receiver).structure.id();
        site.entries.iter().find_map(|entry| match entry {
            CacheEntry::Own { structure: s, index } if *s == structure => Some((receiver, *index)),
            CacheEntry::Proto {
                structure: s,
                chain,
                index,
            } if *s == structure => self.validate_chain(receiver, chain).map(|holder| (holder, *index)),
            _ => None,
        })
    }

    /// `obj.name` on an object receiver, served from the site cache when possible
    pub(crate) fn get_named_cached(
        &mut self,
        code: GcRef,
        ic: IcIndex,
        object: GcRef,
        key: &PropertyKey,
    ) -> VmResult<Value> {
        let receiver = Value::object(object);
        if let Some((holder, index)) = self.probe_load(code, ic, object, key) {
            let slot = self.object(holder).slot(index);
            return self.read_slot(holder, slot, receiver);
        }
        let value = self.get(object, key, receiver)?;
        let entry = self.load_entry(object, key);
        self.record_entry(code, ic, entry);
        Ok(value)
    }

    fn load_entry(&self, object: GcRef, key: &PropertyKey) -> Option<CacheEntry> {
        let receiver = self.object(object);
        let structure = receiver.structure.id();
        let mut chain = ProtoChain::new();
        let mut current = receiver;
        loop {
            if !cacheable(&current.kind, key) {
                return None;
            }
            if let Some((index, _)) = current.structure.find(key) {
                return Some(if chain.is_empty() {
                    CacheEntry::Own { structure, index }
                } else {
                    CacheEntry::Proto {
                        structure,
                        chain,
                        index,
                    }
                });
            }
            let proto = current.prototype?;
            if chain.len() >= self.config.inline_cache.max_chain_depth {
                return None;
            }
            current = self.object(proto);
            chain.push((proto, current.structure.id()));
        }
    }

    /// `obj.name = value` on an object receiver; returns success
    pub(crate) fn set_named_cached(
        &mut self,
        code: GcRef,
        ic: IcIndex,
        object: GcRef,
        key: &PropertyKey,
        value: Value,
    ) -> VmResult<bool> {
        if self.apply_store_cache(code, ic, object, key, value) {
            return Ok(true);
        }
        let before = self.object(object).structure.clone();
        let ok = self.set(object, key, value, Value::object(object))?;
        let entry = if ok { self.store_entry(object, key, &before, true) } else { None };
        self.record_entry(code, ic, entry);
        Ok(ok)
    }

    /// Define an own data property with default attributes (object literals)
    pub(crate) fn define_named_cached(
        &mut self,
        code: GcRef,
        ic: IcIndex,
        object: GcRef,
        key: &PropertyKey,
        value: Value,
    ) -> VmResult<bool> {
        if self.apply_store_cache(code, ic, object, key, value) {
            return Ok(true);
        }
        let before = self.object(object).structure.clone();
        let ok = self.define_own_property(
            object,
            key.clone(),
            crate::property::PropertyDescriptor::data(value, PropertyAttributes::DEFAULT),
        )?;
        let entry = if ok { self.store_entry(object, key, &before, false) } else { None };
        self.record_entry(code, ic, entry);
        Ok(ok)
    }

    fn apply_store_cache(&mut self, code: GcRef, ic: IcIndex, object: GcRef, key: &PropertyKey, value: Value) -> bool {
        let site = self.site(code, ic);
        if site.state == CacheState::Megamorphic || !cacheable(&self.object(object).kind, key) {
            return false;
        }
        let structure = self.object(object).structure.id();
        let hit = site.entries.iter().find_map(|entry| match entry {
            CacheEntry::Own { structure: s, index } if *s == structure => Some((*index, None)),
            CacheEntry::Transition { from, to, chain } if *from == structure => {
                let valid = match chain {
                    Some(chain) => {
                        self.validate_chain(object, chain)
                            .is_some_and(|last| self.object(last).prototype.is_none())
                    }
                    None => true,
                };
                valid.then(|| (to.len() as u32 - 1, Some(Rc::clone(to))))
            }
            _ => None,
        });
        let Some((index, transition)) = hit else {
            return false;
        };
        let obj = self.object_mut(object);
        match transition {
            Some(to) => {
                obj.structure = to;
                obj.slots.push(PropertySlot::Data(value));
            }
            None => obj.slots[index as usize] = PropertySlot::Data(value),
        }
        true
    }

    /// Entry describing a store that just succeeded on `object`
    fn store_entry(
        &self,
        object: GcRef,
        key: &PropertyKey,
        before: &Rc<Structure>,
        check_chain: bool,
    ) -> Option<CacheEntry> {
        let obj = self.object(object);
        if !cacheable(&obj.kind, key) {
            return None;
        }
        let (index, attributes) = obj.structure.find(key)?;
        if !attributes.is_data() || attributes != PropertyAttributes::DEFAULT {
            return None;
        }
        if before.id() == obj.structure.id() {
            return Some(CacheEntry::Own {
                structure: before.id(),
                index,
            });
        }
        let appended = before.is_shared()
            && obj.structure.is_shared()
            && obj.structure.len() == before.len() + 1
            && index as usize == before.len();
        if !appended {
            return None;
        }
        let chain = if check_chain {
            let mut chain = ProtoChain::new();
            let mut current = obj;
            while let Some(proto) = current.prototype {
                if chain.len() >= self.config.inline_cache.max_chain_depth {
                    return None;
                }
                current = self.object(proto);
                if !cacheable(&current.kind, key) {
                    return None;
                }
                chain.push((proto, current.structure.id()));
            }
            Some(chain)
        } else {
            None
        };
        Some(CacheEntry::Transition {
            from: before.id(),
            to: Rc::clone(&obj.structure),
            chain,
        })
    }

    /// Global object data property, served from the site cache when possible
    pub(crate) fn get_global_cached(&mut self, code: GcRef, ic: IcIndex, name: &str) -> VmResult<Value> {
        if let Some(index) = self.probe_global(code, ic) {
            let global = self.global;
            if let PropertySlot::Data(value) = self.object(global).slot(index) {
                return Ok(value);
            }
        }
        if self.global_lexicals.contains_key(name) {
            return self.read_global_lexical(name);
        }
        let global = self.global;
        let key = PropertyKey::from_name(name);
        if !self.has_property(global, &key)? {
            return Err(crate::error::VmError::reference_error(format!("{name} is not defined")));
        }
        let value = self.get(global, &key, Value::object(global))?;
        let entry = self.global_entry(&key, false);
        self.record_entry(code, ic, entry);
        Ok(value)
    }

    /// Store to an existing writable global data property through the cache
    pub(crate) fn set_global_cached(&mut self, code: GcRef, ic: IcIndex, value: Value) -> bool {
        let Some(index) = self.probe_global(code, ic) else {
            return false;
        };
        let global = self.global;
        self.object_mut(global).slots[index as usize] = PropertySlot::Data(value);
        true
    }

    /// Record the layout of a global store that took the slow path
    pub(crate) fn record_global_store(&mut self, code: GcRef, ic: IcIndex, name: &str) {
        let entry = self.global_entry(&PropertyKey::from_name(name), true);
        self.record_entry(code, ic, entry);
    }

    fn probe_global(&self, code: GcRef, ic: IcIndex) -> Option<u32> {
        let site = self.site(code, ic);
        if site.state == CacheState::Megamorphic {
            return None;
        }
        let structure = self.object(self.global).structure.id();
        site.entries.iter().find_map(|entry| match entry {
            CacheEntry::Global {
                structure: s,
                index,
                epoch,
            } if *s == structure && *epoch == self.lexical_epoch => Some(*index),
            _ => None,
        })
    }

    fn global_entry(&self, key: &PropertyKey, for_store: bool) -> Option<CacheEntry> {
        let global = self.object(self.global);
        if !cacheable(&global.kind, key) {
            return None;
        }
        let (index, attributes) = global.structure.find(key)?;
        if !attributes.is_data() || (for_store && !attributes.writable()) {
            return None;
        }
        Some(CacheEntry::Global {
            structure: global.structure.id(),
            index,
            epoch: self.lexical_epoch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn own(id: StructureId, index: u32) -> CacheEntry {
        CacheEntry::Own { structure: id, index }
    }

    #[test]
    fn test_state_progression() {
        let config = InlineCacheConfig::default();
        let mut cache = InlineCache::new();
        assert_eq!(cache.state(), CacheState::Uninitialized);

        let a = Structure::root();
        let b = Structure::root();
        cache.record(own(a.id(), 0), &config);
        assert_eq!(cache.state(), CacheState::Monomorphic);
        cache.record(own(b.id(), 1), &config);
        assert_eq!(cache.state(), CacheState::Polymorphic);
        assert_eq!(cache.entries().len(), 2);
    }

    #[test]
    fn test_same_structure_replaces_entry() {
        let config = InlineCacheConfig::default();
        let mut cache = InlineCache::new();
        let a = Structure::root();
        cache.record(own(a.id(), 0), &config);
        cache.record(own(a.id(), 3), &config);
        assert_eq!(cache.entries().len(), 1);
        assert!(matches!(cache.entries()[0], CacheEntry::Own { index: 3, .. }));
    }

    #[test]
    fn test_goes_megamorphic_past_capacity() {
        let config = InlineCacheConfig {
            max_entries: 2,
            ..InlineCacheConfig::default()
        };
        let mut cache = InlineCache::new();
        for _ in 0..3 {
            cache.record(own(Structure::root().id(), 0), &config);
        }
        assert_eq!(cache.state(), CacheState::Megamorphic);
        assert!(cache.entries().is_empty());
        cache.record(own(Structure::root().id(), 0), &config);
        assert!(cache.entries().is_empty());
    }

    #[test]
    fn test_miss_limit() {
        let config = InlineCacheConfig {
            miss_limit: 2,
            ..InlineCacheConfig::default()
        };
        let mut cache = InlineCache::new();
        cache.record_miss(&config);
        cache.record_miss(&config);
        assert_ne!(cache.state(), CacheState::Megamorphic);
        cache.record_miss(&config);
        assert_eq!(cache.state(), CacheState::Megamorphic);
    }
}
