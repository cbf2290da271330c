// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Feature Dispatch Benchmark
//!
//! Measures call routing once a type is interned:
//! - unicast by implementer count
//! - multicast across the top-bid run
//! - default-payload fallback
//! - next-implementer traversal
//!
//! Payload bodies are a single multiply, so timings track dispatch overhead.

use std::hint::black_box as bb;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use morph::common::typed;
use morph::dispatch::{call1, call_next1, func1, multicast1};
use morph::{Domain, FeatureInfo, MixinInfo, Object};

fn probe(_: &Object, x: u64) -> u64 {
    x.wrapping_mul(0x9E37_79B9)
}

fn speakers(feature: &Arc<FeatureInfo>, n: usize) -> Vec<Arc<MixinInfo>> {
    (0..n)
        .map(|i| {
            typed::<()>(&format!("speaker-{i}"))
                .with_default()
                .implements(feature, func1(probe))
                .build()
        })
        .collect()
}

fn arena(n: usize) -> (Domain, Arc<FeatureInfo>, Vec<Arc<MixinInfo>>, Object) {
    let domain = Domain::new("bench");
    let feature = FeatureInfo::builder("probe").allow_clashes(true).build();
    let mixins = speakers(&feature, n);
    for m in &mixins {
        domain.register_mixin(m).expect("mixin registration");
    }
    let ty = domain.get_type_of(&mixins).expect("type resolution");
    let obj = Object::with_type(&ty).expect("object construction");
    (domain, feature, mixins, obj)
}

/// Winner-only dispatch; flat in the implementer count
fn bench_unicast(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_unicast");

    for n in [1usize, 4, 16] {
        let (_domain, feature, _mixins, obj) = arena(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _n| {
            b.iter(|| bb(call1::<u64, u64>(bb(&obj), &feature, 7).expect("dispatch")));
        });
    }

    group.finish();
}

/// Every top-bid implementer once per call
fn bench_multicast(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_multicast");

    for n in [1usize, 4, 16] {
        let (_domain, feature, _mixins, obj) = arena(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _n| {
            b.iter(|| bb(multicast1::<u64, u64>(bb(&obj), &feature, 7).expect("dispatch")));
        });
    }

    group.finish();
}

/// Feature resolved through its default payload, no table entry
fn bench_default_fallback(c: &mut Criterion) {
    let domain = Domain::new("bench");
    let fallback = FeatureInfo::builder("fallback")
        .default_payload(func1(probe))
        .build();
    let mute = typed::<()>("mute").with_default().build();
    domain.register_mixin(&mute).expect("mixin registration");
    let ty = domain.get_type_of(&[mute]).expect("type resolution");
    let obj = Object::with_type(&ty).expect("object construction");

    c.bench_function("dispatch_default_payload", |b| {
        b.iter(|| bb(call1::<u64, u64>(bb(&obj), &fallback, 7).expect("dispatch")));
    });
}

/// Locate the winner's entry and call the one below it
fn bench_call_next(c: &mut Criterion) {
    let (_domain, feature, mixins, obj) = arena(16);
    let winner = mixins.last().expect("nonempty pool");

    c.bench_function("dispatch_call_next", |b| {
        b.iter(|| bb(call_next1::<u64, u64>(bb(&obj), &feature, winner, 7).expect("dispatch")));
    });
}

criterion_group!(
    dispatch_benches,
    bench_unicast,
    bench_multicast,
    bench_default_fallback,
    bench_call_next
);
criterion_main!(dispatch_benches);
