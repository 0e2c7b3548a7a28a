//! Generic external storage.
//!
//! Objects without a storage field of their own keep their attributes in a
//! process-wide table keyed by object identity. The table lives inside the
//! runtime's locked state, so every function here runs with the VM lock
//! held; values are cloned out before the lock is released.

use super::embedded::grown_len;
use super::shape::{ShapeTree, TransitionTable};
use ivar_core::{Name, ObjectId, ShapeId, Value};
use ivar_gc::{Compact, Mover, Trace, Tracer};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::mem;

// =============================================================================
// Entry
// =============================================================================

/// Attributes of one object in the generic table.
#[derive(Debug, Clone)]
pub struct GenericEntry {
    slots: Vec<Option<Value>>,
    shape_id: ShapeId,
    index_map: Option<Box<FxHashMap<Name, u32>>>,
}

impl GenericEntry {
    /// Create an empty entry laid out by `shape_id`.
    pub fn new(shape_id: ShapeId) -> Self {
        Self {
            slots: Vec::new(),
            shape_id,
            index_map: None,
        }
    }

    /// Get the shape the entry is laid out by.
    #[inline]
    pub fn shape_id(&self) -> ShapeId {
        self.shape_id
    }

    /// Get the slots.
    #[inline]
    pub fn slots(&self) -> &[Option<Value>] {
        &self.slots
    }

    fn index_of(&self, tree: &ShapeTree, name: Name) -> Option<u32> {
        match &self.index_map {
            Some(map) => map.get(&name).copied(),
            None => tree.index_of(self.shape_id, name),
        }
    }

    /// Get the value of `name`, if set.
    pub fn get(&self, tree: &ShapeTree, name: Name) -> Option<&Value> {
        let index = self.index_of(tree, name)?;
        self.slots.get(index as usize)?.as_ref()
    }

    /// Write `value` under `name`, moving along the shape tree as needed.
    pub fn set(
        &mut self,
        tree: &ShapeTree,
        transitions: &mut TransitionTable,
        name: Name,
        value: Value,
    ) {
        let index = match self.index_of(tree, name) {
            Some(index) => index,
            None if self.index_map.is_some() => self.private_index(name),
            None => {
                let next = tree.transition(transitions, self.shape_id, name);
                if next.is_no_cache() {
                    self.promote(tree);
                    self.private_index(name)
                } else {
                    self.shape_id = next;
                    tree.shape(next).attr_count() - 1
                }
            }
        };
        self.ensure_index(index);
        self.slots[index as usize] = Some(value);
    }

    /// Unset `name`, returning its previous value.
    pub fn remove(&mut self, tree: &ShapeTree, name: Name) -> Option<Value> {
        let index = self.index_of(tree, name)?;
        self.slots.get_mut(index as usize)?.take()
    }

    /// Move to the frozen variant of the current shape.
    pub fn freeze(&mut self, tree: &ShapeTree, transitions: &mut TransitionTable) {
        let next = tree.transition_frozen(transitions, self.shape_id);
        if next.is_no_cache() && self.index_map.is_none() {
            self.promote(tree);
        }
        self.shape_id = next;
    }

    /// Move off any frozen shape, keeping every storage index.
    pub fn unfreeze(&mut self, tree: &ShapeTree, transitions: &mut TransitionTable) {
        let next = tree.unfrozen(transitions, self.shape_id);
        if next.is_no_cache() && self.index_map.is_none() {
            self.promote(tree);
        }
        self.shape_id = next;
    }

    /// Collect set attributes in insertion order.
    pub fn attributes(&self, tree: &ShapeTree) -> SmallVec<[(Name, Value); 8]> {
        let names: SmallVec<[Name; 8]> = match &self.index_map {
            Some(map) => {
                let mut by_index: SmallVec<[(u32, Name); 8]> =
                    map.iter().map(|(&name, &index)| (index, name)).collect();
                by_index.sort_unstable_by_key(|&(index, _)| index);
                by_index.into_iter().map(|(_, name)| name).collect()
            }
            None => tree.attr_names(self.shape_id),
        };
        names
            .into_iter()
            .filter_map(|name| Some((name, self.get(tree, name)?.clone())))
            .collect()
    }

    fn promote(&mut self, tree: &ShapeTree) {
        self.index_map = Some(Box::new(tree.private_index_map(self.shape_id)));
        self.shape_id = ShapeId::NO_CACHE;
        tracing::trace!("generic entry moved to a private index map");
    }

    fn private_index(&mut self, name: Name) -> u32 {
        let map = self.index_map.get_or_insert_with(Default::default);
        let next = map.len() as u32;
        *map.entry(name).or_insert(next)
    }

    fn ensure_index(&mut self, index: u32) {
        if index as usize >= self.slots.len() {
            self.slots.resize(grown_len(index as usize), None);
        }
    }

    /// Approximate heap footprint in bytes.
    pub fn memsize(&self) -> usize {
        mem::size_of::<Self>()
            + self.slots.capacity() * mem::size_of::<Option<Value>>()
            + self
                .index_map
                .as_ref()
                .map_or(0, |map| map.capacity() * mem::size_of::<(Name, u32)>())
    }
}

impl Trace for GenericEntry {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.slots.trace(tracer);
        tracer.trace_shape(self.shape_id);
    }

    fn size_of(&self) -> usize {
        self.memsize()
    }
}

impl Compact for GenericEntry {
    fn update_references(&mut self, mover: &dyn Mover) {
        self.slots.update_references(mover);
    }
}

// =============================================================================
// Table
// =============================================================================

/// Identity-keyed table of generic entries.
#[derive(Debug, Default)]
pub struct GenericTable {
    entries: FxHashMap<ObjectId, GenericEntry>,
}

impl GenericTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects with an entry.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no object has an entry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the entry of `id`.
    #[inline]
    pub fn get(&self, id: ObjectId) -> Option<&GenericEntry> {
        self.entries.get(&id)
    }

    /// Get the entry of `id` mutably.
    #[inline]
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut GenericEntry> {
        self.entries.get_mut(&id)
    }

    /// Get the entry of `id`, creating one laid out by `shape_id`.
    pub fn get_or_create(&mut self, id: ObjectId, shape_id: ShapeId) -> &mut GenericEntry {
        self.entries
            .entry(id)
            .or_insert_with(|| GenericEntry::new(shape_id))
    }

    /// Install `entry` for `id`, replacing any previous one.
    pub fn insert(&mut self, id: ObjectId, entry: GenericEntry) {
        self.entries.insert(id, entry);
    }

    /// Remove the entry of `id`.
    pub fn remove(&mut self, id: ObjectId) -> Option<GenericEntry> {
        self.entries.remove(&id)
    }

    /// Re-key the entry of `from` under `to`.
    pub fn relocate(&mut self, from: ObjectId, to: ObjectId) -> bool {
        match self.entries.remove(&from) {
            Some(entry) => {
                self.entries.insert(to, entry);
                true
            }
            None => false,
        }
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &GenericEntry)> {
        self.entries.iter().map(|(&id, entry)| (id, entry))
    }
}
