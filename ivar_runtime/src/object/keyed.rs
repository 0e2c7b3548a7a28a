//! Keyed table storage for classes and modules.
//!
//! Values live in a name→value table; the shape id still advances on every
//! new name so that inline caches and enumeration see the same insertion
//! history as for instances. The table also keeps first-insertion order,
//! used for enumeration once the shape has overflowed.

use super::shape::ShapeTree;
use ivar_core::{Name, ShapeId, Value};
use ivar_gc::{Compact, Mover, Trace, Tracer};
use rustc_hash::FxHashMap;
use std::mem;

/// Attribute table of a class or module.
#[derive(Debug, Clone, Default)]
pub struct ClassStorage {
    table: FxHashMap<Name, Value>,
    order: Vec<Name>,
}

impl ClassStorage {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored attributes.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if no attribute is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Get a value.
    #[inline]
    pub fn get(&self, name: Name) -> Option<&Value> {
        self.table.get(&name)
    }

    /// Insert or overwrite a value.
    pub fn insert(&mut self, name: Name, value: Value) {
        if self.table.insert(name, value).is_none() {
            self.order.push(name);
        }
    }

    /// Remove a value.
    pub fn remove(&mut self, name: Name) -> Option<Value> {
        let value = self.table.remove(&name)?;
        self.order.retain(|&n| n != name);
        Some(value)
    }

    /// Names in first-insertion order.
    #[inline]
    pub fn names(&self) -> &[Name] {
        &self.order
    }

    /// Visit attributes in the order the shape `shape` records them.
    ///
    /// Falls back to insertion order for the overflow shape.
    pub fn for_each(&self, tree: &ShapeTree, shape: ShapeId, mut f: impl FnMut(Name, &Value)) {
        if shape.is_no_cache() {
            for &name in &self.order {
                if let Some(value) = self.table.get(&name) {
                    f(name, value);
                }
            }
            return;
        }
        for name in tree.attr_names(shape) {
            if let Some(value) = self.table.get(&name) {
                f(name, value);
            }
        }
    }

    /// Check that every key is on the path of `shape`.
    ///
    /// A key the shape does not know about means a write bypassed the shape
    /// transition; that is fatal.
    pub fn verify(&self, tree: &ShapeTree, shape: ShapeId) {
        if shape.is_no_cache() {
            return;
        }
        for &name in self.table.keys() {
            if !tree.contains(shape, name) {
                invariant_violation!(
                    "class attribute `{name}` is missing from {}",
                    tree.describe(shape)
                );
            }
        }
    }

    /// Approximate heap footprint in bytes.
    pub fn memsize(&self) -> usize {
        self.table.capacity() * mem::size_of::<(Name, Value)>()
            + self.order.capacity() * mem::size_of::<Name>()
    }
}

impl Trace for ClassStorage {
    fn trace(&self, tracer: &mut dyn Tracer) {
        for value in self.table.values() {
            tracer.trace_value(value);
        }
    }

    fn size_of(&self) -> usize {
        mem::size_of::<Self>() + self.memsize()
    }
}

impl Compact for ClassStorage {
    fn update_references(&mut self, mover: &dyn Mover) {
        for value in self.table.values_mut() {
            value.update_references(mover);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shaped(tree: &ShapeTree, names: &[&str]) -> (ClassStorage, ShapeId) {
        let mut table = tree.new_table();
        let mut storage = ClassStorage::new();
        let mut shape = ShapeId::ROOT;
        for (i, n) in names.iter().enumerate() {
            shape = tree.transition(&mut table, shape, Name::new(n));
            storage.insert(Name::new(n), Value::Int(i as i64));
        }
        (storage, shape)
    }

    #[test]
    fn test_insert_overwrite_remove() {
        let mut storage = ClassStorage::new();
        storage.insert(Name::new("a"), Value::Int(1));
        storage.insert(Name::new("b"), Value::Int(2));
        storage.insert(Name::new("a"), Value::Int(3));

        assert_eq!(storage.len(), 2);
        assert_eq!(storage.get(Name::new("a")), Some(&Value::Int(3)));
        assert_eq!(storage.names(), &[Name::new("a"), Name::new("b")]);

        assert_eq!(storage.remove(Name::new("a")), Some(Value::Int(3)));
        assert_eq!(storage.remove(Name::new("a")), None);
        assert_eq!(storage.names(), &[Name::new("b")]);
    }

    #[test]
    fn test_for_each_follows_shape_order() {
        let tree = ShapeTree::new(16);
        let (storage, shape) = shaped(&tree, &["z", "y", "x"]);

        let mut seen = Vec::new();
        storage.for_each(&tree, shape, |name, _| seen.push(name));
        assert_eq!(seen, vec![Name::new("z"), Name::new("y"), Name::new("x")]);
    }

    #[test]
    fn test_for_each_overflow_uses_insertion_order() {
        let mut storage = ClassStorage::new();
        storage.insert(Name::new("q"), Value::Int(1));
        storage.insert(Name::new("p"), Value::Int(2));

        let tree = ShapeTree::new(1);
        let mut seen = Vec::new();
        storage.for_each(&tree, ShapeId::NO_CACHE, |name, value| seen.push((name, value.clone())));
        assert_eq!(
            seen,
            vec![(Name::new("q"), Value::Int(1)), (Name::new("p"), Value::Int(2))]
        );
    }

    #[test]
    fn test_verify_accepts_matching_shape() {
        let tree = ShapeTree::new(16);
        let (storage, shape) = shaped(&tree, &["a", "b"]);
        storage.verify(&tree, shape);
    }

    #[test]
    #[should_panic(expected = "invariant violated")]
    fn test_verify_rejects_unknown_key() {
        let tree = ShapeTree::new(16);
        let (mut storage, shape) = shaped(&tree, &["a"]);
        storage.insert(Name::new("sneaky"), Value::Nil);
        storage.verify(&tree, shape);
    }

    #[test]
    fn test_copy_is_independent() {
        let tree = ShapeTree::new(16);
        let (storage, _) = shaped(&tree, &["a"]);
        let mut copy = storage.clone();
        copy.insert(Name::new("a"), Value::Int(42));
        assert_eq!(storage.get(Name::new("a")), Some(&Value::Int(0)));
    }
}
