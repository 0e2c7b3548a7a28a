//! Object and shape identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Shape ID
// =============================================================================

/// Unique identifier for a Shape.
///
/// Dense and bounded by the shape tree capacity. Used for fast comparison and
/// as the inline-cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ShapeId(pub u32);

impl ShapeId {
    /// The root shape (no attributes).
    pub const ROOT: Self = Self(0);
    /// The shape every pristine object reaches when frozen.
    pub const FROZEN_ROOT: Self = Self(1);
    /// The overflow singleton handed out once the id space is exhausted.
    pub const NO_CACHE: Self = Self(2);
    /// Number of reserved ids; dynamic shapes start right after them.
    pub const RESERVED_COUNT: u32 = 3;
    /// First id available for dynamically created shapes.
    pub const FIRST_DYNAMIC: Self = Self(Self::RESERVED_COUNT);

    /// Check if this is the root shape.
    #[inline]
    pub const fn is_root(self) -> bool {
        self.0 == Self::ROOT.0
    }

    /// Check if this is the overflow singleton.
    ///
    /// Inline caches must treat it as uncacheable.
    #[inline]
    pub const fn is_no_cache(self) -> bool {
        self.0 == Self::NO_CACHE.0
    }

    /// Check if this id is one of the reserved shapes.
    #[inline]
    pub const fn is_reserved(self) -> bool {
        self.0 < Self::RESERVED_COUNT
    }

    /// Get raw value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Get the arena index for this id.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape#{}", self.0)
    }
}

// =============================================================================
// Object ID
// =============================================================================

/// Identity of an object.
///
/// Keys the generic external storage table. Allocated from a process-wide
/// counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjectId(u64);

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    /// Allocate a fresh identity.
    #[inline]
    pub fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get raw value.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}
