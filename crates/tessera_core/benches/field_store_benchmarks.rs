use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use tessera_core::dispatch::{InvokeFlags, call_method, get_member, invoke_value};
use tessera_core::objects::field::FieldStore;
use tessera_core::objects::key::Key;
use tessera_core::objects::{AssociativeArray, Value};

// ---------------------------------------------------------------------------
// Field store set / get
// ---------------------------------------------------------------------------

fn bench_field_store(c: &mut Criterion) {
    c.bench_function("field_store_set_string_keys", |b| {
        b.iter(|| {
            let mut store = FieldStore::new();
            for i in 0..64 {
                store.set(Key::Str(format!("k{i}")), Value::Integer(i)).unwrap();
            }
            store
        });
    });

    c.bench_function("field_store_lookup_mixed", |b| {
        let mut store = FieldStore::new();
        for i in 0..64 {
            store.set(Key::Int(i), Value::Integer(i)).unwrap();
            store.set(Key::Str(format!("k{i}")), Value::from("text")).unwrap();
        }
        let int_key = Key::Int(40);
        let str_key = Key::Str("K40".into());
        b.iter(|| {
            black_box(store.lookup(&int_key));
            black_box(store.lookup(&str_key));
        });
    });
}

// ---------------------------------------------------------------------------
// List append / insert
// ---------------------------------------------------------------------------

fn bench_list_ops(c: &mut Criterion) {
    c.bench_function("array_append_1k", |b| {
        b.iter(|| {
            let array = AssociativeArray::new();
            for i in 0..1_000 {
                array.append(Value::Integer(i)).unwrap();
            }
            array
        });
    });

    c.bench_function("array_insert_front_100", |b| {
        b.iter(|| {
            let array = AssociativeArray::new();
            for i in 0..100 {
                array.insert_at(1, vec![Value::Integer(i)]).unwrap();
            }
            array
        });
    });
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

fn bench_dispatch(c: &mut Criterion) {
    let array = Value::Object(AssociativeArray::create());
    for i in 0..32 {
        invoke_value(
            &array,
            InvokeFlags::SET,
            &[Value::from(format!("field{i}")), Value::Integer(i)],
        )
        .unwrap();
    }

    c.bench_function("dispatch_get_own_field", |b| {
        let name = Value::from("field17");
        b.iter(|| get_member(&array, name.clone()).unwrap());
    });

    c.bench_function("dispatch_builtin_count", |b| {
        b.iter(|| call_method(&array, "Count", &[]).unwrap());
    });
}

// ---------------------------------------------------------------------------
// Group & main
// ---------------------------------------------------------------------------

criterion_group!(benches, bench_field_store, bench_list_ops, bench_dispatch);
criterion_main!(benches);
