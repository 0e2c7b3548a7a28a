//! Behavioral tests for attribute storage.
//!
//! Coverage:
//! - Shape sharing and insertion-order sensitivity
//! - Set/get round trips across all storage backends
//! - Deletion, freezing and frozen errors
//! - Shape id exhaustion and the private index map fallback

use ivar_core::{IvarError, Name, ShapeId, Value};
use ivar_runtime::{Object, Runtime, RuntimeConfig};
use proptest::prelude::*;
use std::collections::HashMap;

fn runtime(capacity: u32) -> Runtime {
    Runtime::new(RuntimeConfig::with_shape_capacity(capacity)).unwrap()
}

fn name(s: &str) -> Name {
    Name::new(s)
}

fn objects() -> Vec<Object> {
    vec![
        Object::new_instance(),
        Object::new_class(),
        Object::new_module(),
        Object::new_generic(),
    ]
}

// =============================================================================
// Shape Sharing
// =============================================================================

#[test]
fn test_same_order_same_shape() {
    let rt = runtime(64);
    let mut a = Object::new_instance();
    let mut b = Object::new_instance();
    for n in ["x", "y", "z"] {
        rt.ivar_set(&mut a, name(n), Value::Int(1)).unwrap();
        rt.ivar_set(&mut b, name(n), Value::Int(2)).unwrap();
    }
    assert_eq!(rt.current_shape_id(&a), rt.current_shape_id(&b));
}

#[test]
fn test_different_order_different_shape() {
    let rt = runtime(64);
    let mut o1 = Object::new_instance();
    rt.ivar_set(&mut o1, name("a"), Value::Int(1)).unwrap();
    rt.ivar_set(&mut o1, name("b"), Value::Int(2)).unwrap();
    let mut o2 = Object::new_instance();
    rt.ivar_set(&mut o2, name("b"), Value::Int(2)).unwrap();
    rt.ivar_set(&mut o2, name("a"), Value::Int(1)).unwrap();

    assert_ne!(rt.current_shape_id(&o1), rt.current_shape_id(&o2));
    for obj in [&o1, &o2] {
        assert_eq!(rt.ivar_get(obj, name("a"), Value::Nil).unwrap(), Value::Int(1));
        assert_eq!(rt.ivar_get(obj, name("b"), Value::Nil).unwrap(), Value::Int(2));
    }
}

#[test]
fn test_shapes_shared_across_backends() {
    let rt = runtime(64);
    let mut shapes = Vec::new();
    for mut obj in objects() {
        rt.ivar_set(&mut obj, name("k"), Value::Int(1)).unwrap();
        rt.ivar_set(&mut obj, name("v"), Value::Int(2)).unwrap();
        shapes.push(rt.current_shape_id(&obj));
    }
    assert!(shapes.windows(2).all(|w| w[0] == w[1]));
}

// =============================================================================
// Round Trips
// =============================================================================

#[test]
fn test_reset_changes_only_value() {
    let rt = runtime(64);
    for mut obj in objects() {
        rt.ivar_set(&mut obj, name("a"), Value::Int(1)).unwrap();
        rt.ivar_set(&mut obj, name("b"), Value::Int(2)).unwrap();
        let shape = rt.current_shape_id(&obj);

        rt.ivar_set(&mut obj, name("a"), Value::str("again")).unwrap();
        assert_eq!(rt.current_shape_id(&obj), shape);
        assert_eq!(rt.ivar_get(&obj, name("a"), Value::Nil).unwrap(), Value::str("again"));
        assert_eq!(rt.ivar_get(&obj, name("b"), Value::Nil).unwrap(), Value::Int(2));
        assert_eq!(rt.ivar_count(&obj).unwrap(), 2);
    }
}

#[test]
fn test_writes_do_not_leak_between_objects() {
    let rt = runtime(64);
    let mut a = Object::new_instance();
    let mut b = Object::new_instance();
    rt.ivar_set(&mut a, name("shared"), Value::Int(1)).unwrap();
    rt.ivar_set(&mut b, name("shared"), Value::Int(2)).unwrap();
    rt.ivar_set(&mut b, name("extra"), Value::Int(3)).unwrap();

    assert_eq!(rt.ivar_get(&a, name("shared"), Value::Nil).unwrap(), Value::Int(1));
    assert!(!rt.ivar_defined(&a, name("extra")).unwrap());
}

#[test]
fn test_delete_leaves_others_unchanged() {
    let rt = runtime(64);
    for mut obj in objects() {
        for (i, n) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            rt.ivar_set(&mut obj, name(n), Value::Int(i as i64)).unwrap();
        }
        assert_eq!(rt.ivar_delete(&mut obj, name("c"), Value::Nil).unwrap(), Value::Int(2));

        let mut seen = Vec::new();
        rt.ivar_each(&obj, |n, v| seen.push((n, v.clone()))).unwrap();
        assert_eq!(
            seen,
            vec![
                (name("a"), Value::Int(0)),
                (name("b"), Value::Int(1)),
                (name("d"), Value::Int(3)),
                (name("e"), Value::Int(4)),
            ]
        );
    }
}

// =============================================================================
// Freezing
// =============================================================================

#[test]
fn test_frozen_object_rejects_every_set() {
    let rt = runtime(64);
    for mut obj in objects() {
        rt.ivar_set(&mut obj, name("x"), Value::Int(1)).unwrap();
        rt.freeze(&mut obj);
        let frozen = rt.current_shape_id(&obj);

        for n in ["x", "y"] {
            assert_eq!(
                rt.ivar_set(&mut obj, name(n), Value::Int(2)),
                Err(IvarError::Frozen { name: name(n) })
            );
        }
        assert_eq!(rt.ivar_get(&obj, name("x"), Value::Nil).unwrap(), Value::Int(1));

        rt.freeze(&mut obj);
        assert_eq!(rt.current_shape_id(&obj), frozen);
    }
}

#[test]
fn test_freeze_keeps_indices() {
    let rt = runtime(64);
    let mut obj = Object::new_instance();
    rt.ivar_set(&mut obj, name("a"), Value::Int(1)).unwrap();
    rt.ivar_set(&mut obj, name("b"), Value::Int(2)).unwrap();
    let before = rt.current_shape_id(&obj);
    rt.freeze(&mut obj);
    let after = rt.current_shape_id(&obj);

    assert_ne!(before, after);
    for n in ["a", "b"] {
        assert_eq!(rt.index_for(before, name(n)), rt.index_for(after, name(n)));
    }
}

// =============================================================================
// Exhaustion
// =============================================================================

#[test]
fn test_exhaustion_falls_back_to_private_maps() {
    let capacity = 4;
    let rt = runtime(capacity);

    // Each object takes one fresh transition off the root.
    let mut objs: Vec<Object> = (0..capacity + 3).map(|_| Object::new_instance()).collect();
    for (i, obj) in objs.iter_mut().enumerate() {
        rt.ivar_set(obj, name(&format!("only{i}")), Value::Int(i as i64)).unwrap();
    }
    for (i, obj) in objs.iter().enumerate() {
        let shape = rt.current_shape_id(obj);
        if i < capacity as usize {
            assert!(!shape.is_reserved(), "object {i} got {shape}");
        } else {
            assert_eq!(shape, ShapeId::NO_CACHE);
        }
    }
    assert_eq!(rt.shape_stats().overflow_transitions, 3);

    // Overflowed objects stay independently correct.
    let (head, tail) = objs.split_at_mut(capacity as usize + 1);
    let a = &mut head[capacity as usize];
    let b = &mut tail[0];
    for k in 0..10 {
        rt.ivar_set(a, name(&format!("k{k}")), Value::Int(k)).unwrap();
        rt.ivar_set(b, name(&format!("k{k}")), Value::Int(-k)).unwrap();
    }
    rt.ivar_delete(a, name("k3"), Value::Nil).unwrap();
    for k in 0..10 {
        let expected_a = if k == 3 { Value::Nil } else { Value::Int(k) };
        assert_eq!(rt.ivar_get(a, name(&format!("k{k}")), Value::Nil).unwrap(), expected_a);
        assert_eq!(rt.ivar_get(b, name(&format!("k{k}")), Value::Nil).unwrap(), Value::Int(-k));
    }
    assert_eq!(rt.ivar_count(a).unwrap(), 10);
    assert_eq!(rt.instance_variables(b).unwrap()[0], name(&format!("only{}", capacity + 1)));
}

#[test]
fn test_exhaustion_mid_object() {
    let rt = runtime(2);
    let mut obj = Object::new_instance();
    for (i, n) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        rt.ivar_set(&mut obj, name(n), Value::Int(i as i64)).unwrap();
    }
    assert_eq!(rt.current_shape_id(&obj), ShapeId::NO_CACHE);
    assert_eq!(
        rt.instance_variables(&obj).unwrap(),
        vec![name("a"), name("b"), name("c"), name("d"), name("e")]
    );
    for (i, n) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        assert_eq!(rt.ivar_get(&obj, name(n), Value::Nil).unwrap(), Value::Int(i as i64));
    }

    // Freezing an overflowed object keeps it on the overflow shape.
    rt.freeze(&mut obj);
    assert_eq!(rt.current_shape_id(&obj), ShapeId::NO_CACHE);
    assert!(rt.ivar_set(&mut obj, name("f"), Value::Nil).unwrap_err().is_frozen());
}

#[test]
fn test_freeze_when_exhausted() {
    let rt = runtime(1);
    let mut obj = Object::new_instance();
    rt.ivar_set(&mut obj, name("a"), Value::Int(1)).unwrap();
    rt.freeze(&mut obj);
    assert_eq!(rt.current_shape_id(&obj), ShapeId::NO_CACHE);
    assert_eq!(rt.ivar_get(&obj, name("a"), Value::Nil).unwrap(), Value::Int(1));
}

#[test]
fn test_class_overflow_enumerates_in_insertion_order() {
    let rt = runtime(1);
    let mut class = Object::new_class();
    for n in ["m", "k", "z"] {
        rt.ivar_set(&mut class, name(n), Value::Int(0)).unwrap();
    }
    assert_eq!(rt.current_shape_id(&class), ShapeId::NO_CACHE);
    assert_eq!(
        rt.instance_variables(&class).unwrap(),
        vec![name("m"), name("k"), name("z")]
    );
}

// =============================================================================
// Properties
// =============================================================================

fn attr_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set("[a-e]{1,2}", 1..8).prop_map(|set| set.into_iter().collect())
}

proptest! {
    #[test]
    fn prop_same_sequence_same_shape(names in attr_names()) {
        let rt = runtime(4096);
        let mut a = Object::new_instance();
        let mut b = Object::new_generic();
        for (i, n) in names.iter().enumerate() {
            rt.ivar_set(&mut a, name(n), Value::Int(i as i64)).unwrap();
            rt.ivar_set(&mut b, name(n), Value::Int(i as i64)).unwrap();
        }
        prop_assert_eq!(rt.current_shape_id(&a), rt.current_shape_id(&b));

        let mut reversed = Object::new_instance();
        for n in names.iter().rev() {
            rt.ivar_set(&mut reversed, name(n), Value::Nil).unwrap();
        }
        if names.len() > 1 {
            prop_assert_ne!(rt.current_shape_id(&a), rt.current_shape_id(&reversed));
        }
    }

    #[test]
    fn prop_set_get_round_trip(
        ops in prop::collection::vec(("[a-f]", any::<i64>(), any::<bool>()), 1..40),
        capacity in 1u32..16,
    ) {
        let rt = runtime(capacity);
        let mut obj = Object::new_instance();
        let mut model: HashMap<String, i64> = HashMap::new();
        for (n, v, delete) in &ops {
            if *delete {
                let expected = model.remove(n).map(Value::Int).unwrap_or(Value::Nil);
                prop_assert_eq!(rt.ivar_delete(&mut obj, name(n), Value::Nil).unwrap(), expected);
            } else {
                rt.ivar_set(&mut obj, name(n), Value::Int(*v)).unwrap();
                model.insert(n.clone(), *v);
            }
        }
        for n in ["a", "b", "c", "d", "e", "f"] {
            let expected = model.get(n).copied().map(Value::Int);
            prop_assert_eq!(rt.ivar_lookup(&obj, name(n)).unwrap(), expected);
        }
        prop_assert_eq!(rt.ivar_count(&obj).unwrap(), model.len());
    }
}
