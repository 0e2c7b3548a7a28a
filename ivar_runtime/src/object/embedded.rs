//! Embedded/array storage for general instances.
//!
//! The first [`EMBED_SLOTS`] attributes live inline in the object. Past that
//! the storage spills to a heap vector that grows by a quarter each time an
//! index lands out of bounds. Slot `i` holds the attribute whose shape depth
//! is `i + 1`; `None` marks an unset (or deleted) slot.
//!
//! Objects laid out by the overflow shape carry a private name→index map
//! and always use heap storage.

use ivar_core::{Name, Value};
use ivar_gc::{Compact, Mover, Trace, Tracer};
use rustc_hash::FxHashMap;
use std::mem;

/// Number of slots embedded in the object.
pub const EMBED_SLOTS: usize = 3;

/// Length a slot vector grows to so that `index` fits: `ceil((index + 1) * 1.25)`.
#[inline]
pub(crate) fn grown_len(index: usize) -> usize {
    let needed = index + 1;
    needed + needed.div_ceil(4)
}

/// Value slots of a general instance.
#[derive(Debug, Clone)]
pub enum InstanceStorage {
    /// Inline slots.
    Embedded([Option<Value>; EMBED_SLOTS]),
    /// Heap slots, plus the private index map once overflowed.
    Heap {
        /// Slot values.
        slots: Vec<Option<Value>>,
        /// Private name→index map (overflow shape only).
        index_map: Option<Box<FxHashMap<Name, u32>>>,
    },
}

impl Default for InstanceStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceStorage {
    /// Create empty embedded storage.
    pub fn new() -> Self {
        InstanceStorage::Embedded([const { None }; EMBED_SLOTS])
    }

    /// Check if the slots are still inline.
    #[inline]
    pub fn is_embedded(&self) -> bool {
        matches!(self, InstanceStorage::Embedded(_))
    }

    /// Number of physical slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    /// Check if there are no physical slots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get all physical slots.
    #[inline]
    pub fn slots(&self) -> &[Option<Value>] {
        match self {
            InstanceStorage::Embedded(slots) => slots,
            InstanceStorage::Heap { slots, .. } => slots,
        }
    }

    #[inline]
    fn slots_mut(&mut self) -> &mut [Option<Value>] {
        match self {
            InstanceStorage::Embedded(slots) => slots,
            InstanceStorage::Heap { slots, .. } => slots,
        }
    }

    /// Get the value at `index`, if set.
    #[inline]
    pub fn get(&self, index: u32) -> Option<&Value> {
        self.slots().get(index as usize)?.as_ref()
    }

    /// Get the private index map, if the object overflowed.
    #[inline]
    pub fn index_map(&self) -> Option<&FxHashMap<Name, u32>> {
        match self {
            InstanceStorage::Heap {
                index_map: Some(map),
                ..
            } => Some(map),
            _ => None,
        }
    }

    /// Make sure `index` is addressable. Never shrinks.
    pub fn ensure_index(&mut self, index: u32) {
        let index = index as usize;
        if index >= self.len() {
            self.resize(grown_len(index));
        }
    }

    /// Pre-size heap storage to twice the shape depth.
    ///
    /// Storage that is embedded and still large enough stays embedded.
    pub fn reserve_for_depth(&mut self, depth: u32) {
        let wanted = 2 * depth as usize;
        if wanted <= self.len() || (self.is_embedded() && depth as usize <= EMBED_SLOTS) {
            return;
        }
        self.resize(wanted);
    }

    fn resize(&mut self, new_len: usize) {
        match self {
            InstanceStorage::Embedded(inline) => {
                let mut slots = Vec::with_capacity(new_len);
                slots.extend(inline.iter_mut().map(Option::take));
                slots.resize(new_len, None);
                tracing::trace!(len = new_len, "spilled embedded slots to the heap");
                *self = InstanceStorage::Heap {
                    slots,
                    index_map: None,
                };
            }
            InstanceStorage::Heap { slots, .. } => slots.resize(new_len, None),
        }
    }

    /// Write `value` at `index`, which must be addressable.
    #[inline]
    pub fn write(&mut self, index: u32, value: Value) {
        match self.slots_mut().get_mut(index as usize) {
            Some(slot) => *slot = Some(value),
            None => invariant_violation!("slot {index} written before storage was grown"),
        }
    }

    /// Unset the slot at `index`, returning its previous value.
    #[inline]
    pub fn take(&mut self, index: u32) -> Option<Value> {
        self.slots_mut().get_mut(index as usize)?.take()
    }

    /// Switch to the private index map path.
    ///
    /// Forces heap storage of at least `EMBED_SLOTS + 1` slots.
    pub fn promote(&mut self, index_map: FxHashMap<Name, u32>) {
        self.ensure_index(EMBED_SLOTS as u32);
        if let InstanceStorage::Heap { index_map: map, .. } = self {
            *map = Some(Box::new(index_map));
        }
        tracing::trace!("instance storage moved to a private index map");
    }

    /// Find or assign the private index of `name`.
    ///
    /// Only valid once promoted.
    pub fn private_index(&mut self, name: Name) -> u32 {
        match self {
            InstanceStorage::Heap {
                index_map: Some(map),
                ..
            } => {
                let next = map.len() as u32;
                *map.entry(name).or_insert(next)
            }
            _ => invariant_violation!("private index requested for a shape-indexed instance"),
        }
    }

    /// Approximate heap footprint in bytes.
    pub fn memsize(&self) -> usize {
        match self {
            InstanceStorage::Embedded(_) => 0,
            InstanceStorage::Heap { slots, index_map } => {
                slots.capacity() * mem::size_of::<Option<Value>>()
                    + index_map.as_ref().map_or(0, |map| {
                        mem::size_of::<FxHashMap<Name, u32>>()
                            + map.capacity() * mem::size_of::<(Name, u32)>()
                    })
            }
        }
    }
}

impl Trace for InstanceStorage {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.slots().trace(tracer);
    }

    fn size_of(&self) -> usize {
        mem::size_of::<Self>() + self.memsize()
    }
}

impl Compact for InstanceStorage {
    fn update_references(&mut self, mover: &dyn Mover) {
        self.slots_mut().update_references(mover);
    }
}
