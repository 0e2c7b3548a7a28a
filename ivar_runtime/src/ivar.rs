//! Attribute access façade.
//!
//! Dispatches get/set/delete/defined/enumerate/count to the storage backend
//! of the object's category. Every write follows the same order:
//!
//! 1. Fail if the object is frozen.
//! 2. Fail if the calling context may not touch the object.
//! 3. Resolve the target shape (VM lock held only for a new transition).
//! 4. Grow storage and write the value.
//! 5. Publish the new shape id.
//!
//! A reader that observes the new shape id therefore finds storage sized for
//! it.

use crate::object::{
    ClassStorage, EMBED_SLOTS, InstanceStorage, Object, ObjectFlags, ObjectHeader, ObjectKind,
    Storage,
};
use crate::runtime::Runtime;
use ivar_core::context;
use ivar_core::{IsolationViolation, IvarError, IvarResult, Name, ShapeId, Value};
use smallvec::SmallVec;

// =============================================================================
// Isolation Checks
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

/// Ownership check for instances and generic objects.
///
/// `name` is `None` for whole-object operations; internal names are exempt.
pub(crate) fn check_access(obj: &Object, name: Option<Name>, access: Access) -> IvarResult<()> {
    if name.is_some_and(Name::is_internal) {
        return Ok(());
    }
    let current = context::current();
    if obj.kind() == ObjectKind::Generic
        && !current.is_main()
        && obj.is_shareable()
        && !obj.is_frozen()
    {
        return Err(IsolationViolation::SharedObject.into());
    }
    if current == obj.header.owner() || (access == Access::Read && obj.is_shareable()) {
        return Ok(());
    }
    Err(IsolationViolation::ForeignObject.into())
}

/// Class and module writes are reserved to the main context.
fn check_class_write(name: Option<Name>) -> IvarResult<()> {
    if name.is_some_and(Name::is_internal) || context::is_main() {
        Ok(())
    } else {
        Err(IsolationViolation::ClassWrite.into())
    }
}

/// Other contexts may only read shareable class and module values.
fn check_class_read(name: Name, value: &Value) -> IvarResult<()> {
    if name.is_internal() || context::is_main() || value.is_shareable() {
        Ok(())
    } else {
        Err(IsolationViolation::ClassUnshareableRead.into())
    }
}

// =============================================================================
// Façade
// =============================================================================

impl Runtime {
    /// Look up an attribute.
    pub fn ivar_lookup(&self, obj: &Object, name: Name) -> IvarResult<Option<Value>> {
        match &obj.storage {
            Storage::Instance(storage) => {
                check_access(obj, Some(name), Access::Read)?;
                Ok(self
                    .instance_index(&obj.header, storage, name)
                    .and_then(|index| storage.get(index))
                    .cloned())
            }
            Storage::Class(table) | Storage::Module(table) => match table.get(name) {
                Some(value) => {
                    check_class_read(name, value)?;
                    Ok(Some(value.clone()))
                }
                None => Ok(None),
            },
            Storage::Generic => {
                check_access(obj, Some(name), Access::Read)?;
                if !obj.header.has(ObjectFlags::EXTERNAL_IVARS) {
                    return Ok(None);
                }
                let state = self.lock();
                let value = state
                    .generic
                    .get(obj.id())
                    .and_then(|entry| entry.get(&self.shapes, name))
                    .cloned();
                Ok(value)
            }
        }
    }

    /// Get an attribute, or `default` if it is not set.
    #[inline]
    pub fn ivar_get(&self, obj: &Object, name: Name, default: Value) -> IvarResult<Value> {
        Ok(self.ivar_lookup(obj, name)?.unwrap_or(default))
    }

    /// Set an attribute.
    pub fn ivar_set(&self, obj: &mut Object, name: Name, value: Value) -> IvarResult<()> {
        if obj.is_frozen() {
            return Err(IvarError::Frozen { name });
        }
        self.write(obj, name, value)
    }

    /// Set an attribute in the reserved internal namespace.
    ///
    /// Used by subsystems that keep metadata on objects. Skips the frozen
    /// check; internal names are exempt from isolation checks.
    pub fn ivar_set_internal(&self, obj: &mut Object, name: Name, value: Value) -> IvarResult<()> {
        debug_assert!(name.is_internal(), "`{name}` is not an internal name");
        self.write(obj, name, value)
    }

    fn write(&self, obj: &mut Object, name: Name, value: Value) -> IvarResult<()> {
        match obj.kind() {
            ObjectKind::Instance | ObjectKind::Generic => {
                check_access(obj, Some(name), Access::Write)?
            }
            ObjectKind::Class | ObjectKind::Module => check_class_write(Some(name))?,
        }
        match &mut obj.storage {
            Storage::Instance(storage) => self.instance_set(&obj.header, storage, name, value),
            Storage::Class(table) | Storage::Module(table) => {
                self.class_set(&obj.header, table, name, value)
            }
            Storage::Generic => self.generic_set(&obj.header, name, value),
        }
        Ok(())
    }

    /// Remove an attribute, returning its value or `default` if it was not
    /// set.
    ///
    /// The shape is left alone; the slot is marked unset in place.
    pub fn ivar_delete(&self, obj: &mut Object, name: Name, default: Value) -> IvarResult<Value> {
        if obj.is_frozen() {
            return Err(IvarError::Frozen { name });
        }
        match obj.kind() {
            ObjectKind::Instance | ObjectKind::Generic => {
                check_access(obj, Some(name), Access::Write)?
            }
            ObjectKind::Class | ObjectKind::Module => check_class_write(Some(name))?,
        }
        let removed = match &mut obj.storage {
            Storage::Instance(storage) => self
                .instance_index(&obj.header, storage, name)
                .and_then(|index| storage.take(index)),
            Storage::Class(table) | Storage::Module(table) => table.remove(name),
            Storage::Generic => self.generic_remove(&obj.header, name),
        };
        Ok(removed.unwrap_or(default))
    }

    /// Check if an attribute is set.
    pub fn ivar_defined(&self, obj: &Object, name: Name) -> IvarResult<bool> {
        match &obj.storage {
            Storage::Class(table) | Storage::Module(table) => Ok(table.get(name).is_some()),
            _ => Ok(self.ivar_lookup(obj, name)?.is_some()),
        }
    }

    /// Visit every set attribute in insertion order.
    ///
    /// Internal names are included.
    pub fn ivar_each(&self, obj: &Object, mut f: impl FnMut(Name, &Value)) -> IvarResult<()> {
        match &obj.storage {
            Storage::Instance(storage) => {
                check_access(obj, None, Access::Read)?;
                let shape = obj.header.shape_id();
                match storage.index_map() {
                    Some(map) if shape.is_no_cache() => {
                        let mut by_index: SmallVec<[(u32, Name); 8]> =
                            map.iter().map(|(&name, &index)| (index, name)).collect();
                        by_index.sort_unstable_by_key(|&(index, _)| index);
                        for (index, name) in by_index {
                            if let Some(value) = storage.get(index) {
                                f(name, value);
                            }
                        }
                    }
                    _ => {
                        for (index, name) in self.shapes.attr_names(shape).into_iter().enumerate() {
                            if let Some(value) = storage.get(index as u32) {
                                f(name, value);
                            }
                        }
                    }
                }
            }
            Storage::Class(table) | Storage::Module(table) => {
                table.for_each(&self.shapes, obj.header.shape_id(), f);
            }
            Storage::Generic => {
                check_access(obj, None, Access::Read)?;
                if !obj.header.has(ObjectFlags::EXTERNAL_IVARS) {
                    return Ok(());
                }
                let attributes = {
                    let state = self.lock();
                    match state.generic.get(obj.id()) {
                        Some(entry) => entry.attributes(&self.shapes),
                        None => SmallVec::new(),
                    }
                };
                for (name, value) in &attributes {
                    f(*name, value);
                }
            }
        }
        Ok(())
    }

    /// Number of set attributes, internal names included.
    pub fn ivar_count(&self, obj: &Object) -> IvarResult<usize> {
        let mut count = 0;
        self.ivar_each(obj, |_, _| count += 1)?;
        Ok(count)
    }

    /// Names of the set user attributes, in insertion order.
    pub fn instance_variables(&self, obj: &Object) -> IvarResult<Vec<Name>> {
        let mut names = Vec::new();
        self.ivar_each(obj, |name, _| {
            if !name.is_internal() {
                names.push(name);
            }
        })?;
        Ok(names)
    }

    /// Freeze an object.
    ///
    /// Moves it to the frozen variant of its shape; attribute indices do not
    /// change. Freezing twice is a no-op.
    pub fn freeze(&self, obj: &mut Object) {
        if obj.is_frozen() {
            return;
        }
        match &mut obj.storage {
            Storage::Instance(storage) => {
                let shape = obj.header.shape_id();
                let next = self.shapes.transition_frozen(&mut self.lock().transitions, shape);
                if next.is_no_cache() && !shape.is_no_cache() {
                    storage.promote(self.shapes.private_index_map(shape));
                }
                obj.header.publish_shape(next);
            }
            Storage::Class(_) | Storage::Module(_) => {
                let shape = obj.header.shape_id();
                let next = self.shapes.transition_frozen(&mut self.lock().transitions, shape);
                obj.header.publish_shape(next);
            }
            Storage::Generic => {
                let mut guard = self.lock();
                let state = &mut *guard;
                if let Some(entry) = state.generic.get_mut(obj.header.id()) {
                    entry.freeze(&self.shapes, &mut state.transitions);
                }
            }
        }
        obj.header.set(ObjectFlags::FROZEN);
    }

    /// Copy every attribute of `src` onto `dest`, a fresh object of the same
    /// category.
    ///
    /// The copy shares the source's shape, minus a trailing frozen edge.
    pub fn copy_ivars(&self, dest: &mut Object, src: &Object) -> IvarResult<()> {
        let (dest_kind, src_kind) = (dest.kind(), src.kind());
        if dest_kind != src_kind {
            invariant_violation!("cannot copy attributes from a {src_kind:?} to a {dest_kind:?}");
        }
        if dest.is_frozen() {
            let mut first = None;
            self.ivar_each(src, |name, _| {
                first.get_or_insert(name);
            })?;
            return match first {
                Some(name) => Err(IvarError::Frozen { name }),
                None => Ok(()),
            };
        }
        match src_kind {
            ObjectKind::Instance | ObjectKind::Generic => {
                check_access(src, None, Access::Read)?;
                check_access(dest, None, Access::Write)?;
            }
            ObjectKind::Class | ObjectKind::Module => check_class_write(None)?,
        }

        if src_kind == ObjectKind::Generic {
            self.copy_generic_ivars(dest, src);
            return Ok(());
        }
        let src_shape = src.header.shape_id();
        let shape = self.unfrozen_shape(src_shape);
        match (&mut dest.storage, &src.storage) {
            (Storage::Instance(dst), Storage::Instance(storage)) => {
                *dst = storage.clone();
                if shape.is_no_cache() && !src_shape.is_no_cache() {
                    dst.promote(self.shapes.private_index_map(src_shape));
                }
                dest.header.publish_shape(shape);
            }
            (Storage::Class(dst), Storage::Class(table))
            | (Storage::Module(dst), Storage::Module(table)) => {
                *dst = table.clone();
                dest.header.publish_shape(shape);
            }
            _ => unreachable!("object kinds checked above"),
        }
        Ok(())
    }

    /// Unfrozen variant of `shape`; the VM lock is taken only for frozen
    /// shapes, which may need new transitions.
    fn unfrozen_shape(&self, shape: ShapeId) -> ShapeId {
        if shape.is_no_cache() || !self.shapes.shape(shape).is_frozen() {
            return shape;
        }
        self.shapes.unfrozen(&mut self.lock().transitions, shape)
    }

    /// Duplicate the generic entry of `obj` for its clone.
    ///
    /// Clears the clone's entry when `obj` has none.
    pub fn copy_generic_ivars(&self, clone: &Object, obj: &Object) {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.generic.get(obj.id()).cloned() {
            Some(mut entry) => {
                entry.unfreeze(&self.shapes, &mut state.transitions);
                state.generic.insert(clone.id(), entry);
                clone.header.set(ObjectFlags::EXTERNAL_IVARS);
            }
            None => {
                state.generic.remove(clone.id());
                clone.header.clear(ObjectFlags::EXTERNAL_IVARS);
            }
        }
    }

    /// Hand the generic entry of `obj` over to `clone`.
    pub fn replace_generic_ivars(&self, clone: &Object, obj: &Object) {
        let mut state = self.lock();
        if let Some(entry) = state.generic.remove(obj.id()) {
            state.generic.insert(clone.id(), entry);
            obj.header.clear(ObjectFlags::EXTERNAL_IVARS);
            clone.header.set(ObjectFlags::EXTERNAL_IVARS);
        }
    }

    /// Approximate heap footprint of the attribute storage in bytes.
    pub fn ivar_memsize(&self, obj: &Object) -> usize {
        match &obj.storage {
            Storage::Instance(storage) => storage.memsize(),
            Storage::Class(table) | Storage::Module(table) => table.memsize(),
            Storage::Generic => {
                if !obj.header.has(ObjectFlags::EXTERNAL_IVARS) {
                    return 0;
                }
                self.lock()
                    .generic
                    .get(obj.id())
                    .map_or(0, |entry| entry.memsize())
            }
        }
    }

    // =========================================================================
    // Inline Cache Contract
    // =========================================================================

    /// Get the shape id an object's attributes are laid out by.
    pub fn current_shape_id(&self, obj: &Object) -> ShapeId {
        match obj.storage {
            Storage::Generic => {
                let fallback = if obj.is_frozen() {
                    ShapeId::FROZEN_ROOT
                } else {
                    ShapeId::ROOT
                };
                if !obj.header.has(ObjectFlags::EXTERNAL_IVARS) {
                    return fallback;
                }
                self.lock()
                    .generic
                    .get(obj.id())
                    .map_or(fallback, |entry| entry.shape_id())
            }
            _ => obj.header.shape_id(),
        }
    }

    /// Get the storage index of `name` under `shape`.
    ///
    /// The overflow shape never answers: its objects use private maps.
    #[inline]
    pub fn index_for(&self, shape: ShapeId, name: Name) -> Option<u32> {
        if shape.is_no_cache() {
            return None;
        }
        self.shapes.index_of(shape, name)
    }

    // =========================================================================
    // Backends
    // =========================================================================

    fn instance_index(
        &self,
        header: &ObjectHeader,
        storage: &InstanceStorage,
        name: Name,
    ) -> Option<u32> {
        let shape = header.shape_id();
        if shape.is_no_cache() {
            return storage.index_map()?.get(&name).copied();
        }
        self.shapes.index_of(shape, name)
    }

    fn instance_set(
        &self,
        header: &ObjectHeader,
        storage: &mut InstanceStorage,
        name: Name,
        value: Value,
    ) {
        let shape = header.shape_id();
        if shape.is_no_cache() {
            let index = storage.private_index(name);
            storage.ensure_index(index);
            storage.write(index, value);
            return;
        }
        if let Some(index) = self.shapes.index_of(shape, name) {
            storage.ensure_index(index);
            storage.write(index, value);
            return;
        }

        let next = self.shapes.transition(&mut self.lock().transitions, shape, name);
        if next.is_no_cache() {
            storage.promote(self.shapes.private_index_map(shape));
            let index = storage.private_index(name);
            storage.ensure_index(index);
            storage.write(index, value);
        } else {
            let target = self.shapes.shape(next);
            let index = target.attr_count() - 1;
            if storage.is_embedded() && index as usize >= EMBED_SLOTS {
                storage.reserve_for_depth(target.depth());
            }
            storage.ensure_index(index);
            storage.write(index, value);
        }
        header.publish_shape(next);
    }

    fn class_set(&self, header: &ObjectHeader, table: &mut ClassStorage, name: Name, value: Value) {
        let shape = header.shape_id();
        let next = if shape.is_no_cache() || self.shapes.contains(shape, name) {
            shape
        } else {
            self.shapes.transition(&mut self.lock().transitions, shape, name)
        };
        table.insert(name, value);
        if self.config().verify_class_ivars {
            table.verify(&self.shapes, next);
        }
        header.publish_shape(next);
    }

    fn generic_set(&self, header: &ObjectHeader, name: Name, value: Value) {
        let initial = if header.has(ObjectFlags::FROZEN) {
            ShapeId::FROZEN_ROOT
        } else {
            ShapeId::ROOT
        };
        let mut guard = self.lock();
        let state = &mut *guard;
        state.generic.get_or_create(header.id(), initial).set(
            &self.shapes,
            &mut state.transitions,
            name,
            value,
        );
        header.set(ObjectFlags::EXTERNAL_IVARS);
    }

    fn generic_remove(&self, header: &ObjectHeader, name: Name) -> Option<Value> {
        if !header.has(ObjectFlags::EXTERNAL_IVARS) {
            return None;
        }
        self.lock()
            .generic
            .get_mut(header.id())?
            .remove(&self.shapes, name)
    }
}
