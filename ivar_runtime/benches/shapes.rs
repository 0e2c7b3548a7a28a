//! Shape Tree Benchmarks
//!
//! Measures the attribute façade across its storage backends.
//!
//! # Benchmark Categories
//!
//! 1. **Attribute Access**: embedded, heap, keyed and generic reads
//! 2. **Attribute Write**: in-place updates and growth
//! 3. **Shape Transitions**: reused edges vs. fresh ids
//! 4. **Shape Sharing**: many objects on one shape
//! 5. **Inline Cache**: cached index resolution vs. tree walks
//! 6. **Overflow**: objects on private index maps after exhaustion

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ivar_core::{Name, Value};
use ivar_runtime::{AttrCache, Object, Runtime, RuntimeConfig};

// =============================================================================
// Benchmark Helpers
// =============================================================================

fn runtime() -> Runtime {
    Runtime::new(RuntimeConfig::default()).unwrap()
}

fn names(count: usize) -> Vec<Name> {
    (0..count).map(|i| Name::new(&format!("prop{}", i))).collect()
}

/// Fill `obj` with `prop0..propN`.
fn populate(rt: &Runtime, obj: &mut Object, names: &[Name]) {
    for (i, &name) in names.iter().enumerate() {
        rt.ivar_set(obj, name, Value::Int(i as i64)).unwrap();
    }
}

fn instance_with(rt: &Runtime, count: usize) -> Object {
    let mut obj = Object::new_instance();
    populate(rt, &mut obj, &names(count));
    obj
}

// =============================================================================
// Attribute Access Benchmarks
// =============================================================================

fn bench_attribute_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("attribute_access");
    let rt = runtime();

    // Within the embedded slots
    group.bench_function("embedded", |b| {
        let obj = instance_with(&rt, 3);
        let name = Name::new("prop2");
        b.iter(|| black_box(rt.ivar_lookup(&obj, name).unwrap()))
    });

    // Deep in a heap buffer
    group.bench_function("heap_deep", |b| {
        let obj = instance_with(&rt, 32);
        let name = Name::new("prop31");
        b.iter(|| black_box(rt.ivar_lookup(&obj, name).unwrap()))
    });

    group.bench_function("missing", |b| {
        let obj = instance_with(&rt, 8);
        let name = Name::new("absent");
        b.iter(|| black_box(rt.ivar_lookup(&obj, name).unwrap()))
    });

    group.bench_function("class_keyed", |b| {
        let mut class = Object::new_class();
        populate(&rt, &mut class, &names(8));
        let name = Name::new("prop5");
        b.iter(|| black_box(rt.ivar_lookup(&class, name).unwrap()))
    });

    // Takes the global lock
    group.bench_function("generic_external", |b| {
        let mut obj = Object::new_generic();
        populate(&rt, &mut obj, &names(4));
        let name = Name::new("prop3");
        b.iter(|| black_box(rt.ivar_lookup(&obj, name).unwrap()))
    });

    group.finish();
}

// =============================================================================
// Attribute Write Benchmarks
// =============================================================================

fn bench_attribute_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("attribute_write");
    let rt = runtime();

    group.bench_function("update_existing", |b| {
        let mut obj = instance_with(&rt, 4);
        let name = Name::new("prop1");
        let mut i = 0i64;
        b.iter(|| {
            rt.ivar_set(&mut obj, name, Value::Int(i)).unwrap();
            i += 1;
        })
    });

    // Crosses the embedded limit and grows twice
    group.bench_function("grow_to_heap", |b| {
        let names = names(8);
        populate(&rt, &mut Object::new_instance(), &names);
        b.iter(|| {
            let mut obj = Object::new_instance();
            populate(&rt, &mut obj, &names);
            black_box(obj)
        })
    });

    group.finish();
}

// =============================================================================
// Shape Transition Benchmarks
// =============================================================================

fn bench_shape_transitions(c: &mut Criterion) {
    let mut group = c.benchmark_group("shape_transitions");

    for count in [1usize, 4, 8, 16].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("reused_edges", count), count, |b, &count| {
            let rt = runtime();
            let names = names(count);
            // Prime the edges
            populate(&rt, &mut Object::new_instance(), &names);

            b.iter(|| {
                let mut obj = Object::new_instance();
                populate(&rt, &mut obj, &names);
                black_box(obj)
            })
        });
    }

    // Each iteration allocates a fresh id, freed again by collection
    group.bench_function("fresh_edge", |b| {
        let rt = runtime();
        let mut counter = 0usize;
        b.iter(|| {
            let mut obj = Object::new_instance();
            let name = Name::new(&format!("unique_{}", counter));
            rt.ivar_set(&mut obj, name, Value::Nil).unwrap();
            counter += 1;
            if counter % 1024 == 0 {
                rt.collect_shapes(std::iter::empty());
            }
            black_box(obj)
        })
    });

    group.bench_function("freeze", |b| {
        let rt = runtime();
        let names = names(4);
        b.iter(|| {
            let mut obj = Object::new_instance();
            populate(&rt, &mut obj, &names);
            rt.freeze(&mut obj);
            black_box(obj)
        })
    });

    group.finish();
}

// =============================================================================
// Shape Sharing Benchmarks
// =============================================================================

fn bench_shape_sharing(c: &mut Criterion) {
    let mut group = c.benchmark_group("shape_sharing");

    for count in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("objects", count), count, |b, &count| {
            let rt = runtime();
            let names = names(4);
            b.iter(|| {
                let objs: Vec<Object> = (0..count)
                    .map(|_| {
                        let mut obj = Object::new_instance();
                        populate(&rt, &mut obj, &names);
                        obj
                    })
                    .collect();
                black_box(objs)
            })
        });
    }

    group.finish();
}

// =============================================================================
// Inline Cache Benchmarks
// =============================================================================

fn bench_inline_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("inline_cache");
    let rt = runtime();
    let obj = instance_with(&rt, 16);
    let shape = rt.current_shape_id(&obj);
    let name = Name::new("prop12");

    group.bench_function("uncached_index", |b| {
        b.iter(|| black_box(rt.index_for(shape, name)))
    });

    group.bench_function("monomorphic_hit", |b| {
        let mut cache = AttrCache::new(name);
        cache.index(&rt, shape);
        b.iter(|| black_box(cache.index(&rt, shape)))
    });

    group.bench_function("polymorphic_sites", |b| {
        let objs: Vec<Object> = (0..4)
            .map(|i| {
                let mut obj = Object::new_instance();
                rt.ivar_set(&mut obj, Name::new(&format!("lead{}", i)), Value::Nil)
                    .unwrap();
                rt.ivar_set(&mut obj, name, Value::Int(i)).unwrap();
                obj
            })
            .collect();
        let mut cache = AttrCache::new(name);
        b.iter(|| {
            for obj in &objs {
                black_box(cache.get(&rt, obj).unwrap());
            }
        })
    });

    group.finish();
}

// =============================================================================
// Overflow Benchmarks
// =============================================================================

fn bench_overflow(c: &mut Criterion) {
    let mut group = c.benchmark_group("overflow");
    let rt = Runtime::new(RuntimeConfig::with_shape_capacity(2)).unwrap();
    let obj = instance_with(&rt, 16);
    let name = Name::new("prop12");

    group.bench_function("private_map_read", |b| {
        b.iter(|| black_box(rt.ivar_lookup(&obj, name).unwrap()))
    });

    group.bench_function("private_map_populate", |b| {
        let names = names(16);
        b.iter(|| {
            let mut obj = Object::new_instance();
            populate(&rt, &mut obj, &names);
            black_box(obj)
        })
    });

    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(
    shape_benches,
    bench_attribute_access,
    bench_attribute_write,
    bench_shape_transitions,
    bench_shape_sharing,
    bench_inline_cache,
    bench_overflow,
);

criterion_main!(shape_benches);
