//! Shape tree for hidden class optimization.
//!
//! Objects with the same sequence of attribute insertions share a Shape, so
//! the name→slot mapping lives once in a shared tree instead of in every
//! object.
//!
//! # Architecture
//!
//! Shapes form a transition tree rooted at [`ShapeId::ROOT`]. The path from
//! the root to a shape spells out the insertion sequence that produced it:
//!
//! ```text
//!        ROOT (0) ──<frozen>── FROZEN_ROOT (1)
//!         |
//!     +---+---+
//!     |       |
//!    "a"     "b"
//!     |       |
//!  Shape3  Shape4
//!     |       |
//!    "b"     "a"
//!     |       |
//!  Shape5  Shape6      (same names, different order: different shapes)
//!     |
//!  <frozen>
//!     |
//!  Shape7              (frozen; indices unchanged)
//! ```
//!
//! ## Arena
//!
//! Shapes live in a fixed-capacity arena indexed by id. Relations are ids,
//! never pointers. Node fields are atomics written once when the node is
//! published (release) and read without locking (acquire), so lookups and
//! walks never block.
//!
//! ## Transitions
//!
//! Edge tables and the id allocation bitmap make up the [`TransitionTable`].
//! It is only touched while holding the VM lock (see `runtime.rs`), which
//! also resolves creation races: the first writer publishes the child, the
//! second finds it in the edge table.
//!
//! ## Exhaustion
//!
//! Ids are allocated lowest-first. When none is free, every new transition
//! returns the [`ShapeId::NO_CACHE`] singleton. It is sticky: objects that
//! reach it keep a private name→index map from then on.
//!
//! ## Collection
//!
//! A shape nobody references any more is freed by [`ShapeTree::sweep`] and
//! its id returns to the bitmap. Parent edge tables are not rewritten on
//! sweep; a stale edge is detected by a liveness check the next time it is
//! followed, and replaced with a freshly allocated child.

use bitvec::prelude::*;
use ivar_core::{Name, ShapeId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use tracing::{debug, trace, warn};

// =============================================================================
// Edge Labels
// =============================================================================

/// Label on the edge from a shape to one of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// An attribute was added.
    Attr(Name),
    /// The object was frozen.
    ///
    /// Reserved sentinel; no attribute name maps to it.
    Frozen,
}

/// Encoded edge of the root and of the overflow singleton.
const EDGE_NONE: u32 = u32::MAX;
/// Encoded frozen sentinel.
const EDGE_FROZEN: u32 = u32::MAX - 1;
/// Encoded parent of parentless shapes.
const NO_PARENT: u32 = u32::MAX;

impl Edge {
    #[inline]
    fn encode(self) -> u32 {
        match self {
            Edge::Attr(name) => name.raw(),
            Edge::Frozen => EDGE_FROZEN,
        }
    }

    #[inline]
    fn decode(raw: u32) -> Option<Self> {
        match raw {
            EDGE_NONE => None,
            EDGE_FROZEN => Some(Edge::Frozen),
            raw => Some(Edge::Attr(Name::from_raw(raw))),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Attr(name) => write!(f, "{name}"),
            Edge::Frozen => f.write_str("<frozen>"),
        }
    }
}

// =============================================================================
// Shape
// =============================================================================

/// Owned snapshot of one shape node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    id: ShapeId,
    parent: Option<ShapeId>,
    edge: Option<Edge>,
    frozen: bool,
    depth: u32,
    attr_count: u32,
}

impl Shape {
    /// Get the shape ID.
    #[inline]
    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// Get the parent shape (None for the root and the overflow singleton).
    #[inline]
    pub fn parent(&self) -> Option<ShapeId> {
        self.parent
    }

    /// Get the label of the edge leading to this shape.
    #[inline]
    pub fn edge(&self) -> Option<Edge> {
        self.edge
    }

    /// Check if objects with this shape are frozen.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of edges between the root and this shape.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of attribute edges between the root and this shape.
    ///
    /// This is the number of storage slots the shape implies; frozen edges
    /// do not count.
    #[inline]
    pub fn attr_count(&self) -> u32 {
        self.attr_count
    }

    /// Check if this is the overflow singleton.
    #[inline]
    pub fn is_no_cache(&self) -> bool {
        self.id.is_no_cache()
    }
}

// =============================================================================
// Arena Slots
// =============================================================================

const SLOT_FREE: u8 = 0;
const SLOT_LIVE: u8 = 1;

/// One arena entry. Written under the VM lock, read lock-free.
struct ShapeSlot {
    state: AtomicU8,
    parent: AtomicU32,
    edge: AtomicU32,
    depth: AtomicU32,
    attr_count: AtomicU32,
    frozen: AtomicBool,
}

impl ShapeSlot {
    fn free() -> Self {
        Self {
            state: AtomicU8::new(SLOT_FREE),
            parent: AtomicU32::new(NO_PARENT),
            edge: AtomicU32::new(EDGE_NONE),
            depth: AtomicU32::new(0),
            attr_count: AtomicU32::new(0),
            frozen: AtomicBool::new(false),
        }
    }

    #[inline]
    fn is_live(&self) -> bool {
        self.state.load(Ordering::Acquire) == SLOT_LIVE
    }
}

// =============================================================================
// Transition Table
// =============================================================================

/// Mutable half of the shape tree: edge tables and id allocation.
///
/// Only reachable through the VM lock.
pub struct TransitionTable {
    /// Lazily created edge table per shape, indexed by shape id.
    edges: Vec<Option<Box<FxHashMap<Edge, ShapeId>>>>,
    /// Allocation bitmap; set bits are ids in use.
    in_use: BitVec,
    /// Highest id ever handed out.
    max_allocated: u32,
    /// Transitions answered with the overflow singleton.
    overflow_transitions: u64,
    /// Exhaustion is reported once per table.
    exhaustion_reported: bool,
}

impl TransitionTable {
    fn new(total_slots: usize) -> Self {
        let mut in_use = BitVec::repeat(false, total_slots);
        for reserved in 0..ShapeId::RESERVED_COUNT as usize {
            in_use.set(reserved, true);
        }
        Self {
            edges: (0..total_slots).map(|_| None).collect(),
            in_use,
            max_allocated: ShapeId::RESERVED_COUNT - 1,
            overflow_transitions: 0,
            exhaustion_reported: false,
        }
    }

    /// Allocate the lowest free id.
    fn allocate(&mut self) -> Option<ShapeId> {
        let index = self.in_use.first_zero()?;
        self.in_use.set(index, true);
        let id = ShapeId(index as u32);
        self.max_allocated = self.max_allocated.max(id.raw());
        Some(id)
    }

    /// Return an id to the bitmap and drop its edge table.
    fn release(&mut self, id: ShapeId) {
        self.in_use.set(id.index(), false);
        self.edges[id.index()] = None;
    }

    #[inline]
    fn edge(&self, from: ShapeId, edge: Edge) -> Option<ShapeId> {
        self.edges[from.index()]
            .as_ref()
            .and_then(|edges| edges.get(&edge).copied())
    }

    fn insert_edge(&mut self, from: ShapeId, edge: Edge, to: ShapeId) {
        self.edges[from.index()]
            .get_or_insert_with(Default::default)
            .insert(edge, to);
    }

    fn remove_edge(&mut self, from: ShapeId, edge: Edge) {
        if let Some(edges) = self.edges[from.index()].as_mut() {
            edges.remove(&edge);
        }
    }

    /// Number of ids in use, reserved ones included.
    pub fn live_shapes(&self) -> usize {
        self.in_use.count_ones()
    }
}

// =============================================================================
// Shape Tree
// =============================================================================

/// Read-mostly half of the shape tree: the node arena.
pub struct ShapeTree {
    slots: Box<[ShapeSlot]>,
    capacity: u32,
}

impl ShapeTree {
    /// Create a tree with room for `capacity` dynamic shapes.
    ///
    /// The three reserved shapes are published immediately.
    pub fn new(capacity: u32) -> Self {
        let total = (ShapeId::RESERVED_COUNT + capacity) as usize;
        let slots: Box<[ShapeSlot]> = (0..total).map(|_| ShapeSlot::free()).collect();
        let tree = Self { slots, capacity };

        let root = Shape {
            id: ShapeId::ROOT,
            parent: None,
            edge: None,
            frozen: false,
            depth: 0,
            attr_count: 0,
        };
        tree.write_slot(root);
        tree.write_slot(Shape {
            id: ShapeId::FROZEN_ROOT,
            parent: Some(ShapeId::ROOT),
            edge: Some(Edge::Frozen),
            frozen: true,
            depth: 1,
            attr_count: 0,
        });
        tree.write_slot(Shape {
            id: ShapeId::NO_CACHE,
            ..root
        });
        tree
    }

    /// Create the transition table matching this arena.
    pub fn new_table(&self) -> TransitionTable {
        TransitionTable::new(self.slots.len())
    }

    /// Number of dynamic shape ids.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    fn slot(&self, id: ShapeId) -> &ShapeSlot {
        match self.slots.get(id.index()) {
            Some(slot) => slot,
            None => invariant_violation!("{id} is outside the shape arena"),
        }
    }

    fn write_slot(&self, shape: Shape) {
        let slot = self.slot(shape.id);
        slot.parent
            .store(shape.parent.map_or(NO_PARENT, ShapeId::raw), Ordering::Relaxed);
        slot.edge
            .store(shape.edge.map_or(EDGE_NONE, Edge::encode), Ordering::Relaxed);
        slot.depth.store(shape.depth, Ordering::Relaxed);
        slot.attr_count.store(shape.attr_count, Ordering::Relaxed);
        slot.frozen.store(shape.frozen, Ordering::Relaxed);
        slot.state.store(SLOT_LIVE, Ordering::Release);
    }

    /// Check if `id` names a live shape.
    #[inline]
    pub fn is_live(&self, id: ShapeId) -> bool {
        self.slots.get(id.index()).is_some_and(ShapeSlot::is_live)
    }

    /// Get a snapshot of a live shape.
    pub fn get(&self, id: ShapeId) -> Option<Shape> {
        let slot = self.slots.get(id.index())?;
        if !slot.is_live() {
            return None;
        }
        let parent = slot.parent.load(Ordering::Relaxed);
        Some(Shape {
            id,
            parent: (parent != NO_PARENT).then_some(ShapeId(parent)),
            edge: Edge::decode(slot.edge.load(Ordering::Relaxed)),
            frozen: slot.frozen.load(Ordering::Relaxed),
            depth: slot.depth.load(Ordering::Relaxed),
            attr_count: slot.attr_count.load(Ordering::Relaxed),
        })
    }

    /// Get a snapshot of a shape an object is laid out by.
    ///
    /// Such a shape is live by construction; anything else is fatal.
    pub fn shape(&self, id: ShapeId) -> Shape {
        match self.get(id) {
            Some(shape) => shape,
            None => invariant_violation!("{id} is referenced but not live"),
        }
    }

    /// Look up the storage index of `name` in `id`.
    ///
    /// Walks toward the root. Frozen edges never match, so the walk resumes
    /// at the frozen node's parent and freezing never shifts an index. The
    /// overflow singleton answers nothing: its objects use private maps.
    pub fn index_of(&self, id: ShapeId, name: Name) -> Option<u32> {
        if id.is_no_cache() {
            return None;
        }
        let target = Edge::Attr(name).encode();
        let mut current = id;
        loop {
            let slot = self.slot(current);
            let parent = slot.parent.load(Ordering::Relaxed);
            if parent == NO_PARENT {
                return None;
            }
            if slot.edge.load(Ordering::Relaxed) == target {
                return Some(slot.attr_count.load(Ordering::Relaxed) - 1);
            }
            current = ShapeId(parent);
        }
    }

    /// Check if `name` labels an edge between `id` and the root.
    #[inline]
    pub fn contains(&self, id: ShapeId, name: Name) -> bool {
        self.index_of(id, name).is_some()
    }

    /// Collect the edges from the root to `id`, root first.
    pub fn path(&self, id: ShapeId) -> SmallVec<[Edge; 8]> {
        let mut edges = SmallVec::new();
        let mut current = self.shape(id);
        while let (Some(parent), Some(edge)) = (current.parent, current.edge) {
            edges.push(edge);
            current = self.shape(parent);
        }
        edges.reverse();
        edges
    }

    /// Collect attribute names in insertion (= storage index) order.
    pub fn attr_names(&self, id: ShapeId) -> SmallVec<[Name; 8]> {
        self.path(id)
            .into_iter()
            .filter_map(|edge| match edge {
                Edge::Attr(name) => Some(name),
                Edge::Frozen => None,
            })
            .collect()
    }

    /// Build the private name→index map an object needs once it leaves the
    /// shared tree for the overflow singleton.
    pub fn private_index_map(&self, id: ShapeId) -> FxHashMap<Name, u32> {
        self.attr_names(id)
            .into_iter()
            .enumerate()
            .map(|(index, name)| (name, index as u32))
            .collect()
    }

    /// Shape a copy of an object laid out by `id` starts from.
    ///
    /// Copies are not frozen. A trailing frozen edge is dropped; a path with
    /// attributes added after its frozen edge is replayed from the root,
    /// which keeps every storage index and may yield the overflow singleton.
    pub fn unfrozen(&self, table: &mut TransitionTable, id: ShapeId) -> ShapeId {
        if id == ShapeId::FROZEN_ROOT {
            return ShapeId::ROOT;
        }
        if id.is_no_cache() {
            return id;
        }
        let shape = self.shape(id);
        if !shape.is_frozen() {
            return id;
        }
        if let (Some(Edge::Frozen), Some(parent)) = (shape.edge, shape.parent) {
            if !self.shape(parent).is_frozen() {
                return parent;
            }
        }
        self.attr_names(id)
            .into_iter()
            .fold(ShapeId::ROOT, |from, name| self.transition(table, from, name))
    }

    /// Describe a shape for diagnostics: `shape#7 [a, b, <frozen>]`.
    pub fn describe(&self, id: ShapeId) -> String {
        if !self.is_live(id) {
            return format!("{id} (dead)");
        }
        if id.is_no_cache() {
            return format!("{id} (no-cache)");
        }
        let edges: Vec<String> = self.path(id).iter().map(Edge::to_string).collect();
        format!("{id} [{}]", edges.join(", "))
    }

    // =========================================================================
    // Transitions (VM lock held)
    // =========================================================================

    /// Find or create the shape reached by adding `name` to `from`.
    ///
    /// Returns `from` itself if `name` is already on its path, and the
    /// overflow singleton once `from` is the singleton or ids run out.
    pub fn transition(&self, table: &mut TransitionTable, from: ShapeId, name: Name) -> ShapeId {
        if from.is_no_cache() || self.contains(from, name) {
            return from;
        }
        self.child(table, from, Edge::Attr(name))
    }

    /// Find or create the frozen variant of `from`.
    pub fn transition_frozen(&self, table: &mut TransitionTable, from: ShapeId) -> ShapeId {
        if from.is_root() {
            return ShapeId::FROZEN_ROOT;
        }
        if from.is_no_cache() || self.shape(from).is_frozen() {
            return from;
        }
        self.child(table, from, Edge::Frozen)
    }

    fn child(&self, table: &mut TransitionTable, from: ShapeId, edge: Edge) -> ShapeId {
        if let Some(child) = table.edge(from, edge) {
            if self.is_live_child(child, from, edge) {
                return child;
            }
            trace!(parent = from.raw(), stale = child.raw(), %edge, "dropping collected transition");
            table.remove_edge(from, edge);
        }

        let Some(id) = table.allocate() else {
            table.overflow_transitions += 1;
            if !table.exhaustion_reported {
                table.exhaustion_reported = true;
                warn!(
                    capacity = self.capacity,
                    "shape ids exhausted; new transitions fall back to private index maps"
                );
            }
            return ShapeId::NO_CACHE;
        };

        let parent = self.shape(from);
        self.write_slot(Shape {
            id,
            parent: Some(from),
            edge: Some(edge),
            frozen: parent.frozen || edge == Edge::Frozen,
            depth: parent.depth + 1,
            attr_count: parent.attr_count + u32::from(matches!(edge, Edge::Attr(_))),
        });
        table.insert_edge(from, edge, id);
        debug!(shape = id.raw(), parent = from.raw(), %edge, "allocated shape");
        id
    }

    /// Liveness check for an edge-table entry.
    ///
    /// The id may have been collected and handed to an unrelated shape since
    /// the edge was recorded.
    fn is_live_child(&self, child: ShapeId, parent: ShapeId, edge: Edge) -> bool {
        let slot = self.slot(child);
        slot.is_live()
            && slot.parent.load(Ordering::Relaxed) == parent.raw()
            && slot.edge.load(Ordering::Relaxed) == edge.encode()
    }

    // =========================================================================
    // Collection (VM lock held)
    // =========================================================================

    /// Free every dynamic shape that is neither marked nor an ancestor of a
    /// marked shape. Returns the number of freed shapes.
    pub fn sweep(&self, table: &mut TransitionTable, marked: &BitSlice) -> usize {
        let mut reachable: BitVec = BitVec::repeat(false, self.slots.len());
        for reserved in 0..ShapeId::RESERVED_COUNT as usize {
            reachable.set(reserved, true);
        }
        for index in marked.iter_ones().filter(|&i| i < self.slots.len()) {
            let mut current = ShapeId(index as u32);
            while self.is_live(current) && !reachable[current.index()] {
                reachable.set(current.index(), true);
                match self.shape(current).parent {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
        }

        let mut freed = 0;
        for index in ShapeId::RESERVED_COUNT as usize..self.slots.len() {
            if table.in_use[index] && !reachable[index] {
                self.slots[index].state.store(SLOT_FREE, Ordering::Release);
                table.release(ShapeId(index as u32));
                freed += 1;
            }
        }
        freed
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Get registry statistics.
    pub fn stats(&self, table: &TransitionTable) -> ShapeStats {
        ShapeStats {
            live_shapes: table.live_shapes() as u32,
            max_shape_id: table.max_allocated,
            capacity: self.capacity,
            overflow_transitions: table.overflow_transitions,
        }
    }

    /// Render every live shape as a Graphviz digraph.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph shapes {\n");
        for index in 0..self.slots.len() {
            let Some(shape) = self.get(ShapeId(index as u32)) else {
                continue;
            };
            let label = match shape.id {
                ShapeId::ROOT => "root".to_string(),
                ShapeId::FROZEN_ROOT => "frozen root".to_string(),
                ShapeId::NO_CACHE => "no-cache".to_string(),
                id => id.raw().to_string(),
            };
            let _ = writeln!(out, "  {} [label=\"{label}\"];", shape.id.raw());
            if let (Some(parent), Some(edge)) = (shape.parent, shape.edge) {
                let _ = writeln!(
                    out,
                    "  {} -> {} [label=\"{edge}\"];",
                    parent.raw(),
                    shape.id.raw()
                );
            }
        }
        out.push_str("}\n");
        out
    }
}

/// Statistics about shape registry usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeStats {
    /// Shapes currently allocated, reserved ones included.
    pub live_shapes: u32,
    /// Highest shape id ever handed out.
    pub max_shape_id: u32,
    /// Number of dynamic shape ids.
    pub capacity: u32,
    /// Transitions answered with the overflow singleton.
    pub overflow_transitions: u64,
}

// =============================================================================
// Tests
// =============================================================================
