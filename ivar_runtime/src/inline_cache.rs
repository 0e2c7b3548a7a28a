//! Inline caching for attribute access.
//!
//! Caches store the last shape seen at an access site together with the
//! storage index it resolved to. On hit the index is used directly; on miss
//! the caller resolves through [`Runtime::index_for`] and updates the cache.
//! The overflow shape is never cached: its objects use private index maps.

use crate::ivar::{Access, check_access};
use crate::object::{Object, Storage};
use crate::runtime::Runtime;
use ivar_core::{IvarResult, Name, ShapeId, Value};

/// Monomorphic inline cache for a single shape.
#[derive(Debug, Clone, Copy)]
pub struct ShapeIC {
    /// Cached shape (None = empty).
    pub cached_shape: Option<ShapeId>,
    /// Cached storage index.
    pub cached_index: u32,
    /// Hit counter for profiling.
    pub hits: u32,
    /// Miss counter for upgrade decisions.
    pub misses: u32,
}

impl ShapeIC {
    /// Create an empty cache.
    #[inline]
    pub const fn empty() -> Self {
        Self {
            cached_shape: None,
            cached_index: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Check if the cache is valid for the given shape.
    #[inline(always)]
    pub fn check(&self, shape: ShapeId) -> Option<u32> {
        match self.cached_shape {
            Some(cached) if cached == shape => Some(self.cached_index),
            _ => None,
        }
    }

    /// Update the cache. Returns false for the uncacheable overflow shape.
    #[inline]
    pub fn update(&mut self, shape: ShapeId, index: u32) -> bool {
        if shape.is_no_cache() {
            return false;
        }
        self.cached_shape = Some(shape);
        self.cached_index = index;
        true
    }

    /// Record a hit.
    #[inline(always)]
    pub fn record_hit(&mut self) {
        self.hits = self.hits.saturating_add(1);
    }

    /// Record a miss.
    #[inline(always)]
    pub fn record_miss(&mut self) {
        self.misses = self.misses.saturating_add(1);
    }

    /// Check if the site sees enough shapes to go polymorphic.
    #[inline]
    pub fn should_upgrade(&self) -> bool {
        self.misses > 10 && self.misses > self.hits / 4
    }

    /// Get hit rate as a percentage.
    #[inline]
    pub fn hit_rate(&self) -> f32 {
        let total = u64::from(self.hits) + u64::from(self.misses);
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64 * 100.0) as f32
        }
    }
}

impl Default for ShapeIC {
    fn default() -> Self {
        Self::empty()
    }
}

/// Maximum entries in a polymorphic inline cache.
pub const POLY_IC_SIZE: usize = 4;

/// Polymorphic inline cache for up to [`POLY_IC_SIZE`] shapes.
#[derive(Debug, Clone, Copy)]
pub struct PolyShapeIC {
    /// Shape→index entries.
    pub entries: [(ShapeId, u32); POLY_IC_SIZE],
    /// Number of valid entries.
    pub count: u8,
    /// Total lookups for profiling.
    pub lookups: u32,
    /// Cache hits.
    pub hits: u32,
}

impl PolyShapeIC {
    /// Create an empty polymorphic cache.
    #[inline]
    pub const fn empty() -> Self {
        Self {
            entries: [(ShapeId::NO_CACHE, 0); POLY_IC_SIZE],
            count: 0,
            lookups: 0,
            hits: 0,
        }
    }

    /// Look up a shape in the cache.
    #[inline(always)]
    pub fn lookup(&self, shape: ShapeId) -> Option<u32> {
        self.entries[..self.count as usize]
            .iter()
            .find(|(cached, _)| *cached == shape)
            .map(|&(_, index)| index)
    }

    /// Add a new entry, returning false if the cache is full or the shape
    /// is uncacheable.
    #[inline]
    pub fn add(&mut self, shape: ShapeId, index: u32) -> bool {
        if shape.is_no_cache() || self.is_full() {
            return false;
        }
        self.entries[self.count as usize] = (shape, index);
        self.count += 1;
        true
    }

    /// Check if the cache is full (megamorphic).
    #[inline]
    pub fn is_full(&self) -> bool {
        self.count as usize >= POLY_IC_SIZE
    }

    /// Record a lookup result.
    #[inline]
    pub fn record(&mut self, hit: bool) {
        self.lookups = self.lookups.saturating_add(1);
        if hit {
            self.hits = self.hits.saturating_add(1);
        }
    }

    /// Get hit rate.
    #[inline]
    pub fn hit_rate(&self) -> f32 {
        if self.lookups == 0 {
            0.0
        } else {
            (self.hits as f32) / (self.lookups as f32) * 100.0
        }
    }
}

impl Default for PolyShapeIC {
    fn default() -> Self {
        Self::empty()
    }
}

/// Inline cache state (transitions mono → poly → mega).
#[derive(Debug, Clone, Copy, Default)]
pub enum ICState {
    /// Uninitialized
    #[default]
    Empty,
    /// Single shape cached
    Monomorphic(ShapeIC),
    /// Multiple shapes cached
    Polymorphic(PolyShapeIC),
    /// Too many shapes, no caching
    Megamorphic,
}

/// Attribute read site bound to one name.
///
/// Resolves the storage index through the cache and falls back to the
/// façade for everything the cache cannot answer.
#[derive(Debug, Clone, Copy)]
pub struct AttrCache {
    name: Name,
    state: ICState,
}

impl AttrCache {
    /// Create a cache for reads of `name`.
    pub fn new(name: Name) -> Self {
        Self {
            name,
            state: ICState::Empty,
        }
    }

    /// Get the cached name.
    #[inline]
    pub fn name(&self) -> Name {
        self.name
    }

    /// Get the cache state.
    #[inline]
    pub fn state(&self) -> &ICState {
        &self.state
    }

    /// Resolve the storage index for `shape`, consulting the shape tree on
    /// miss.
    pub fn index(&mut self, rt: &Runtime, shape: ShapeId) -> Option<u32> {
        let cached = match &mut self.state {
            ICState::Monomorphic(ic) => {
                let hit = ic.check(shape);
                match hit {
                    Some(_) => ic.record_hit(),
                    None => ic.record_miss(),
                }
                hit
            }
            ICState::Polymorphic(ic) => {
                let hit = ic.lookup(shape);
                ic.record(hit.is_some());
                hit
            }
            ICState::Empty | ICState::Megamorphic => None,
        };
        if cached.is_some() {
            return cached;
        }

        let index = rt.index_for(shape, self.name)?;
        self.install(shape, index);
        Some(index)
    }

    fn install(&mut self, shape: ShapeId, index: u32) {
        if shape.is_no_cache() {
            return;
        }
        self.state = match self.state {
            ICState::Empty => {
                let mut ic = ShapeIC::empty();
                ic.update(shape, index);
                ICState::Monomorphic(ic)
            }
            ICState::Monomorphic(mono) if mono.should_upgrade() => {
                let mut poly = PolyShapeIC::empty();
                if let Some(old) = mono.cached_shape {
                    poly.add(old, mono.cached_index);
                }
                poly.add(shape, index);
                ICState::Polymorphic(poly)
            }
            ICState::Monomorphic(mut mono) => {
                mono.update(shape, index);
                ICState::Monomorphic(mono)
            }
            ICState::Polymorphic(mut poly) => {
                if poly.add(shape, index) {
                    ICState::Polymorphic(poly)
                } else {
                    ICState::Megamorphic
                }
            }
            ICState::Megamorphic => ICState::Megamorphic,
        };
    }

    /// Read the attribute from `obj`.
    ///
    /// Instances on a shared shape are read straight from the cached slot;
    /// everything else goes through [`Runtime::ivar_lookup`].
    pub fn get(&mut self, rt: &Runtime, obj: &Object) -> IvarResult<Option<Value>> {
        let Storage::Instance(storage) = &obj.storage else {
            return rt.ivar_lookup(obj, self.name);
        };
        let shape = obj.header.shape_id();
        if shape.is_no_cache() {
            return rt.ivar_lookup(obj, self.name);
        }
        check_access(obj, Some(self.name), Access::Read)?;
        Ok(self
            .index(rt, shape)
            .and_then(|index| storage.get(index))
            .cloned())
    }
}
