//! Collector hooks.
//!
//! The collector drives four callbacks:
//!
//! - [`Runtime::trace_object`] (mark): report slot values and the shape
//! - [`Runtime::relocate`] / [`Runtime::update_references`] (move)
//! - [`Runtime::finalize`]: drop the generic entry of a dead object
//! - [`Runtime::collect_shapes`]: free shapes no live object is laid out by

use crate::object::{Object, ObjectFlags, Storage};
use crate::runtime::Runtime;
use bitvec::prelude::*;
use ivar_core::{ObjectId, ShapeId, Value};
use ivar_gc::{Compact, Mover, Trace, Tracer};
use std::time::Instant;
use tracing::debug;

/// Result of a shape collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    /// Shapes returned to the free list.
    pub freed: usize,
    /// Shapes still allocated, reserved ones included.
    pub live: usize,
}

/// Tracer that only records shapes.
struct ShapeMarker {
    marked: BitVec,
}

impl Tracer for ShapeMarker {
    #[inline]
    fn trace_value(&mut self, _value: &Value) {}

    #[inline]
    fn trace_shape(&mut self, shape: ShapeId) {
        if shape.index() < self.marked.len() {
            self.marked.set(shape.index(), true);
        }
    }
}

impl Runtime {
    /// Report every set value and the current shape of `obj`.
    pub fn trace_object(&self, obj: &Object, tracer: &mut dyn Tracer) {
        match &obj.storage {
            Storage::Instance(storage) => {
                storage.trace(tracer);
                tracer.trace_shape(obj.header.shape_id());
            }
            Storage::Class(table) | Storage::Module(table) => {
                table.trace(tracer);
                tracer.trace_shape(obj.header.shape_id());
            }
            Storage::Generic => {
                let entry = if obj.header.has(ObjectFlags::EXTERNAL_IVARS) {
                    self.lock().generic.get(obj.id()).cloned()
                } else {
                    None
                };
                match entry {
                    Some(entry) => entry.trace(tracer),
                    None => tracer.trace_shape(self.current_shape_id(obj)),
                }
            }
        }
    }

    /// Free every dynamic shape that none of `roots` (nor any generic entry)
    /// is laid out by, ancestors excepted.
    ///
    /// `roots` must include every live object; a shape left referenced by
    /// an object outside it would dangle.
    pub fn collect_shapes<'a>(&self, roots: impl IntoIterator<Item = &'a Object>) -> CollectStats {
        let start = Instant::now();
        let total = (ShapeId::RESERVED_COUNT + self.shapes.capacity()) as usize;
        let mut marker = ShapeMarker {
            marked: BitVec::repeat(false, total),
        };
        for obj in roots {
            match obj.storage {
                Storage::Generic => marker.trace_shape(self.current_shape_id(obj)),
                _ => marker.trace_shape(obj.header.shape_id()),
            }
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        for (_, entry) in state.generic.iter() {
            marker.trace_shape(entry.shape_id());
        }
        let freed = self
            .shapes
            .sweep(&mut state.transitions, &marker.marked);
        let live = state.transitions.live_shapes();
        debug!(
            freed,
            live,
            elapsed_us = start.elapsed().as_micros() as u64,
            "collected shapes"
        );
        CollectStats { freed, live }
    }

    /// Give `obj` a new identity after it moved.
    pub fn relocate(&self, obj: &mut Object, new_id: ObjectId) {
        let old_id = obj.id();
        if old_id == new_id {
            return;
        }
        if obj.header.has(ObjectFlags::EXTERNAL_IVARS) {
            self.lock().generic.relocate(old_id, new_id);
        }
        obj.header.set_id(new_id);
    }

    /// Rewrite object references held in `obj`'s attributes.
    pub fn update_references(&self, obj: &mut Object, mover: &dyn Mover) {
        match &mut obj.storage {
            Storage::Instance(storage) => storage.update_references(mover),
            Storage::Class(table) | Storage::Module(table) => table.update_references(mover),
            Storage::Generic => {
                if !obj.header.has(ObjectFlags::EXTERNAL_IVARS) {
                    return;
                }
                if let Some(entry) = self.lock().generic.get_mut(obj.header.id()) {
                    entry.update_references(mover);
                }
            }
        }
    }

    /// Release the external storage of a dead object.
    pub fn finalize(&self, obj: &Object) {
        if obj.header.has(ObjectFlags::EXTERNAL_IVARS) {
            self.lock().generic.remove(obj.id());
            obj.header.clear(ObjectFlags::EXTERNAL_IVARS);
        }
    }
}
