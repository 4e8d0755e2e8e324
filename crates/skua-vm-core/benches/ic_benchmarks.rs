//! Inline Cache (IC) Performance Benchmarks
//!
//! Measures property access performance across different IC states. Each
//! benchmark compiles its script once and runs it in a fresh runtime per
//! iteration, so caches warm up inside the measured loop.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use skua_vm_bytecode::Script;
use skua_vm_core::Runtime;

fn compile(source: &str) -> Arc<Script> {
    Runtime::new().compile(source, "bench.js").unwrap()
}

fn bench_script(c: &mut Criterion, name: &str, source: &str) {
    let script = compile(source);
    c.bench_function(name, |b| {
        b.iter(|| {
            let mut rt = Runtime::new();
            let result = rt.execute(black_box(Arc::clone(&script))).unwrap();
            black_box(result)
        });
    });
}

/// Same property on objects of one structure
fn bench_monomorphic_property_access(c: &mut Criterion) {
    bench_script(
        c,
        "ic_monomorphic_1000_reads",
        "var o = { x: 42 }; var sum = 0;
         for (var i = 0; i < 1000; i++) sum += o.x;
         sum",
    );
}

/// One access site sees three structures
fn bench_polymorphic_property_access(c: &mut Criterion) {
    bench_script(
        c,
        "ic_polymorphic_3_shapes",
        "var objs = [{ x: 1 }, { a: 0, x: 2 }, { b: 0, x: 3 }]; var sum = 0;
         for (var i = 0; i < 1000; i++) sum += objs[i % 3].x;
         sum",
    );
}

/// More structures than the cache holds
fn bench_megamorphic_property_access(c: &mut Criterion) {
    bench_script(
        c,
        "ic_megamorphic_8_shapes",
        "var objs = [{ x: 1 }, { a: 0, x: 1 }, { b: 0, x: 1 }, { c: 0, x: 1 },
                     { d: 0, x: 1 }, { e: 0, x: 1 }, { f: 0, x: 1 }, { g: 0, x: 1 }];
         var sum = 0;
         for (var i = 0; i < 1000; i++) sum += objs[i % 8].x;
         sum",
    );
}

/// Reads that hit a prototype
fn bench_proto_chain_access(c: &mut Criterion) {
    bench_script(
        c,
        "ic_proto_chain_reads",
        "function P() {} P.prototype.x = 7; var o = new P(); var sum = 0;
         for (var i = 0; i < 1000; i++) sum += o.x;
         sum",
    );
}

/// Stores that transition the structure, then cached stores
fn bench_property_stores(c: &mut Criterion) {
    bench_script(
        c,
        "ic_store_transitions",
        "var last;
         for (var i = 0; i < 500; i++) { var o = {}; o.a = i; o.b = i; o.c = i; last = o; }
         last.c",
    );
}

/// Global variable reads and writes
fn bench_global_access(c: &mut Criterion) {
    bench_script(
        c,
        "ic_global_reads",
        "var g = 1; var sum = 0;
         for (var i = 0; i < 1000; i++) sum = sum + g;
         sum",
    );
}

criterion_group!(
    benches,
    bench_monomorphic_property_access,
    bench_polymorphic_property_access,
    bench_megamorphic_property_access,
    bench_proto_chain_access,
    bench_property_stores,
    bench_global_access
);
criterion_main!(benches);
