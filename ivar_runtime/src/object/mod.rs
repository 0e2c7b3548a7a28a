//! Object header and attribute storage variants.
//!
//! Every object carries a header with its identity, owning context, flags
//! and the id of the shape its attributes are laid out by. Where the values
//! live depends on the object's category:
//!
//! | category | storage |
//! |---|---|
//! | instance | [`InstanceStorage`]: embedded slots, spilling to the heap |
//! | class, module | [`ClassStorage`]: name→value table |
//! | anything else | generic external table owned by the runtime |

pub mod embedded;
pub mod generic;
pub mod keyed;
pub mod shape;

pub use embedded::{EMBED_SLOTS, InstanceStorage};
pub use generic::{GenericEntry, GenericTable};
pub use keyed::ClassStorage;

use ivar_core::context::{self, ContextId};
use ivar_core::{ObjectId, ObjectRef, ShapeId, Value};
use std::sync::atomic::{AtomicU32, Ordering};

// =============================================================================
// Object Flags
// =============================================================================

bitflags::bitflags! {
    /// Object state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ObjectFlags: u32 {
        /// Attribute writes fail.
        const FROZEN = 1 << 0;
        /// The object may be used from any isolation context.
        const SHAREABLE = 1 << 1;
        /// The object has an entry in the generic external table.
        const EXTERNAL_IVARS = 1 << 2;
    }
}

// =============================================================================
// Object Header
// =============================================================================

/// Header shared by all objects.
pub struct ObjectHeader {
    id: ObjectId,
    owner: ContextId,
    flags: AtomicU32,
    /// Published shape id. Unused by generic objects, whose shape id lives
    /// in their external entry.
    shape_id: AtomicU32,
}

impl ObjectHeader {
    fn new(owner: ContextId) -> Self {
        Self {
            id: ObjectId::next(),
            owner,
            flags: AtomicU32::new(0),
            shape_id: AtomicU32::new(ShapeId::ROOT.raw()),
        }
    }

    /// Get the object identity.
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Get the context that created the object.
    #[inline]
    pub fn owner(&self) -> ContextId {
        self.owner
    }

    /// Get the flags.
    #[inline]
    pub fn flags(&self) -> ObjectFlags {
        ObjectFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    /// Check a flag.
    #[inline]
    pub fn has(&self, flag: ObjectFlags) -> bool {
        self.flags().contains(flag)
    }

    #[inline]
    pub(crate) fn set(&self, flag: ObjectFlags) {
        self.flags.fetch_or(flag.bits(), Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn clear(&self, flag: ObjectFlags) {
        self.flags.fetch_and(!flag.bits(), Ordering::AcqRel);
    }

    /// Get the published shape id.
    #[inline]
    pub fn shape_id(&self) -> ShapeId {
        ShapeId(self.shape_id.load(Ordering::Acquire))
    }

    /// Publish a new shape id.
    ///
    /// Storage must already be sized for the shape.
    #[inline]
    pub(crate) fn publish_shape(&self, shape: ShapeId) {
        self.shape_id.store(shape.raw(), Ordering::Release);
    }

    pub(crate) fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }
}

impl std::fmt::Debug for ObjectHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectHeader")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("flags", &self.flags())
            .field("shape_id", &self.shape_id())
            .finish()
    }
}

// =============================================================================
// Object
// =============================================================================

/// Object category, which selects the storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// General instance.
    Instance,
    /// Class.
    Class,
    /// Module.
    Module,
    /// Object without a storage field of its own.
    Generic,
}

/// Attribute storage, one variant per backend.
#[derive(Debug)]
pub enum Storage {
    /// Embedded/array storage.
    Instance(InstanceStorage),
    /// Keyed table of a class.
    Class(ClassStorage),
    /// Keyed table of a module.
    Module(ClassStorage),
    /// Values live in the runtime's generic external table.
    Generic,
}

/// An object that can hold attributes.
#[derive(Debug)]
pub struct Object {
    pub(crate) header: ObjectHeader,
    pub(crate) storage: Storage,
}

impl Object {
    fn with_storage(storage: Storage) -> Self {
        Self {
            header: ObjectHeader::new(context::current()),
            storage,
        }
    }

    /// Create a general instance owned by the current context.
    pub fn new_instance() -> Self {
        Self::with_storage(Storage::Instance(InstanceStorage::new()))
    }

    /// Create a class.
    pub fn new_class() -> Self {
        Self::with_storage(Storage::Class(ClassStorage::new()))
    }

    /// Create a module.
    pub fn new_module() -> Self {
        Self::with_storage(Storage::Module(ClassStorage::new()))
    }

    /// Create an object whose attributes live in the generic external table.
    pub fn new_generic() -> Self {
        Self::with_storage(Storage::Generic)
    }

    /// Get the header.
    #[inline]
    pub fn header(&self) -> &ObjectHeader {
        &self.header
    }

    /// Get the object identity.
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.header.id
    }

    /// Get the object category.
    pub fn kind(&self) -> ObjectKind {
        match self.storage {
            Storage::Instance(_) => ObjectKind::Instance,
            Storage::Class(_) => ObjectKind::Class,
            Storage::Module(_) => ObjectKind::Module,
            Storage::Generic => ObjectKind::Generic,
        }
    }

    /// Check if attribute writes fail.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.header.has(ObjectFlags::FROZEN)
    }

    /// Check if the object may be used from any context.
    #[inline]
    pub fn is_shareable(&self) -> bool {
        self.header.has(ObjectFlags::SHAREABLE)
    }

    /// Allow the object to be used from any context.
    pub fn make_shareable(&self) {
        self.header.set(ObjectFlags::SHAREABLE);
    }

    /// Get a value referring to this object.
    pub fn as_value(&self) -> Value {
        Value::Object(ObjectRef {
            id: self.id(),
            shareable: self.is_shareable(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_objects() {
        let obj = Object::new_instance();
        assert_eq!(obj.kind(), ObjectKind::Instance);
        assert_eq!(obj.header().shape_id(), ShapeId::ROOT);
        assert_eq!(obj.header().owner(), ContextId::MAIN);
        assert!(!obj.is_frozen());

        assert_eq!(Object::new_class().kind(), ObjectKind::Class);
        assert_eq!(Object::new_module().kind(), ObjectKind::Module);
        assert_eq!(Object::new_generic().kind(), ObjectKind::Generic);
    }

    #[test]
    fn test_unique_ids() {
        let a = Object::new_instance();
        let b = Object::new_instance();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_flags() {
        let obj = Object::new_generic();
        obj.header().set(ObjectFlags::EXTERNAL_IVARS);
        obj.make_shareable();
        assert!(obj.header().has(ObjectFlags::EXTERNAL_IVARS));
        assert!(obj.is_shareable());

        obj.header().clear(ObjectFlags::EXTERNAL_IVARS);
        assert_eq!(obj.header().flags(), ObjectFlags::SHAREABLE);
    }

    #[test]
    fn test_as_value_carries_shareable_bit() {
        let obj = Object::new_instance();
        assert!(!obj.as_value().is_shareable());
        obj.make_shareable();
        assert_eq!(obj.as_value().as_object().map(|r| r.id), Some(obj.id()));
        assert!(obj.as_value().is_shareable());
    }

    #[test]
    fn test_owner_follows_context() {
        let ctx = context::new_context();
        let _guard = context::enter(ctx);
        assert_eq!(Object::new_instance().header().owner(), ctx);
    }
}
