// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object Mutation Benchmark
//!
//! Measures the object lifecycle around interned types:
//! - construction and teardown by mixin count
//! - grow/shrink re-typing between overlapping types
//! - the same-type reset fast path
//! - deep copies
//!
//! Types are resolved once up front, so the type section stays warm and the
//! timings track the transaction itself.

use std::hint::black_box as bb;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use morph::common::typed;
use morph::{Domain, MixinInfo, Object};

#[derive(Default, Clone)]
struct Pos {
    x: f64,
    y: f64,
}

#[derive(Default, Clone)]
struct Vel {
    dx: f64,
    dy: f64,
}

#[derive(Default, Clone)]
struct Label {
    text: String,
}

#[derive(Default, Clone)]
struct Blob {
    data: [u64; 16],
}

fn world() -> (Domain, Vec<Arc<MixinInfo>>) {
    let domain = Domain::new("bench");
    let mixins = vec![
        typed::<Pos>("pos").with_default().cloneable().build(),
        typed::<Vel>("vel").with_default().cloneable().build(),
        typed::<Label>("label").with_default().cloneable().build(),
        typed::<Blob>("blob")
            .with_default()
            .cloneable()
            .force_external()
            .build(),
    ];
    for m in &mixins {
        domain.register_mixin(m).expect("mixin registration");
    }
    (domain, mixins)
}

/// Default-construct and drop an object, by mixin count
fn bench_with_type(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_with_type");
    let (domain, mixins) = world();

    for n in [1usize, 2, 4] {
        let ty = domain.get_type_of(&mixins[..n]).expect("type resolution");
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _n| {
            b.iter(|| bb(Object::with_type(bb(&ty)).expect("object construction")));
        });
    }

    group.finish();
}

/// One grow plus one shrink per iteration, external mixin included
fn bench_grow_shrink(c: &mut Criterion) {
    let (domain, mixins) = world();
    let small = domain.get_type_of(&mixins[..1]).expect("type resolution");
    let large = domain.get_type_of(&mixins).expect("type resolution");
    let mut obj = Object::with_type(&small).expect("object construction");

    c.bench_function("object_grow_shrink", |b| {
        b.iter(|| {
            obj.reset_type(bb(&large)).expect("retype");
            obj.reset_type(bb(&small)).expect("retype");
        });
    });
}

/// Re-typing to the type the object already has
fn bench_same_type_reset(c: &mut Criterion) {
    let (domain, mixins) = world();
    let ty = domain.get_type_of(&mixins).expect("type resolution");
    let mut obj = Object::with_type(&ty).expect("object construction");

    c.bench_function("object_same_type_reset", |b| {
        b.iter(|| obj.reset_type(bb(&ty)).expect("retype"));
    });
}

/// Deep copy of a four-mixin object
fn bench_copy(c: &mut Criterion) {
    let (domain, mixins) = world();
    let ty = domain.get_type_of(&mixins).expect("type resolution");
    let mut src = Object::with_type(&ty).expect("object construction");
    if let Some(l) = src.get_mut::<Label>() {
        l.text = "benchmark".to_string();
    }

    c.bench_function("object_copy", |b| {
        b.iter(|| bb(src.copy().expect("object copy")));
    });
}

criterion_group!(
    object_benches,
    bench_with_type,
    bench_grow_shrink,
    bench_same_type_reset,
    bench_copy
);
criterion_main!(object_benches);
