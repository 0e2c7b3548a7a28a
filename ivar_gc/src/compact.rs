//! Move/compaction contract.
//!
//! A compacting collector relocates objects and assigns them new identities.
//! Afterwards every retained reference must be rewritten: values in slots
//! through [`Compact::update_references`], identity-keyed tables by the
//! owner of the table.

use ivar_core::{ObjectId, ObjectRef, Value};
use rustc_hash::FxHashMap;

/// Maps an object's old identity to its identity after compaction.
pub trait Mover {
    /// Get the new identity of `id` (or `id` itself if it did not move).
    fn forward(&self, id: ObjectId) -> ObjectId;
}

/// A mover that moves nothing.
pub struct IdentityMover;

impl Mover for IdentityMover {
    #[inline]
    fn forward(&self, id: ObjectId) -> ObjectId {
        id
    }
}

/// Forwarding table filled by the collector during compaction.
#[derive(Debug, Default)]
pub struct ForwardingTable {
    forwarded: FxHashMap<ObjectId, ObjectId>,
}

impl ForwardingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `from` now lives at `to`.
    pub fn insert(&mut self, from: ObjectId, to: ObjectId) {
        self.forwarded.insert(from, to);
    }

    /// Number of moved objects.
    pub fn len(&self) -> usize {
        self.forwarded.len()
    }

    /// Check if nothing moved.
    pub fn is_empty(&self) -> bool {
        self.forwarded.is_empty()
    }
}

impl Mover for ForwardingTable {
    #[inline]
    fn forward(&self, id: ObjectId) -> ObjectId {
        self.forwarded.get(&id).copied().unwrap_or(id)
    }
}

/// Types holding object references that must follow a compaction.
pub trait Compact {
    /// Rewrite every held reference through `mover`.
    fn update_references(&mut self, mover: &dyn Mover);
}

impl Compact for Value {
    #[inline]
    fn update_references(&mut self, mover: &dyn Mover) {
        if let Value::Object(ObjectRef { id, .. }) = self {
            *id = mover.forward(*id);
        }
    }
}

impl<T: Compact> Compact for Option<T> {
    #[inline]
    fn update_references(&mut self, mover: &dyn Mover) {
        if let Some(inner) = self {
            inner.update_references(mover);
        }
    }
}

impl<T: Compact> Compact for [T] {
    fn update_references(&mut self, mover: &dyn Mover) {
        for item in self {
            item.update_references(mover);
        }
    }
}

impl<T: Compact> Compact for Vec<T> {
    fn update_references(&mut self, mover: &dyn Mover) {
        self.as_mut_slice().update_references(mover);
    }
}
