// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::alloc::Layout;
use std::any::TypeId;
use std::cmp::Ordering;
use std::sync::Arc;

use super::common::{marker, payload, typed};
use super::{
    canonical_order, CmpCap, CopyCap, DropCap, EqCap, FeatureInfo, InitCap, MixinInfo, MoveCap,
    Owner,
};

#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Health {
    current: i32,
    max: i32,
}

#[test]
fn raw_builder_defaults() {
    let info = MixinInfo::builder("empty").build();
    assert_eq!(&**info.name(), "empty");
    assert_eq!(info.size(), 0);
    assert_eq!(info.alignment(), 1);
    assert!(!info.init().available());
    assert!(!info.copy_init().available());
    assert!(!info.copy_asgn().available());
    assert!(matches!(info.relocate(), MoveCap::Memcpy));
    assert!(matches!(info.destroy(), DropCap::Trivial));
    assert!(!info.equals().available());
    assert!(!info.compare().available());
    assert!(!info.dependency());
    assert_eq!(info.order_priority(), 0);
    assert!(!info.external());
    assert!(info.id().is_none());
    assert!(!info.registered());
    assert!(info.stored_type().is_none());
}

#[test]
fn external_flag_sources() {
    let internal = MixinInfo::builder("a").build();
    assert!(!internal.external());

    let forced = MixinInfo::builder("b").force_external().build();
    assert!(forced.external());

    let pinned = MixinInfo::builder("c").relocate(MoveCap::None).build();
    assert!(pinned.external());

    let with_alloc = MixinInfo::builder("d")
        .allocator(Arc::new(crate::alloc::GlobalBuf))
        .build();
    assert!(with_alloc.external());
}

#[test]
fn typed_builder_derives_layout_and_caps() {
    let info = typed::<Health>("health")
        .with_default()
        .cloneable()
        .with_eq()
        .with_ord()
        .build();

    let layout = Layout::new::<Health>();
    assert_eq!(info.size(), layout.size());
    assert_eq!(info.alignment(), layout.align());
    assert!(info.init().available());
    assert!(info.copy_init().available());
    assert!(info.copy_asgn().available());
    assert!(info.equals().available());
    assert!(info.compare().available());
    assert_eq!(info.stored_type(), Some(TypeId::of::<Health>()));
    assert!(!info.external());
}

#[test]
fn typed_shims_round_trip() {
    let info = typed::<Health>("health")
        .with_default()
        .cloneable()
        .with_eq()
        .with_ord()
        .build();

    let mut a = Health::default();
    let mut b = Health {
        current: 3,
        max: 10,
    };
    let pa = std::ptr::NonNull::from(&mut a).cast::<u8>();
    let pb = std::ptr::NonNull::from(&mut b).cast::<u8>();

    unsafe {
        if let InitCap::Fn(f) = info.init() {
            f(&info, pa).unwrap();
        }
        assert_eq!(a, Health::default());

        if let CopyCap::Fn(f) = info.copy_asgn() {
            f(&info, pa, pb).unwrap();
        }
        assert_eq!(a, b);

        if let EqCap::Fn(f) = info.equals() {
            assert!(f(&info, pa, pb));
        }

        b.current = 99;
        if let CmpCap::Fn(f) = info.compare() {
            assert_eq!(f(&info, pa, pb), Ordering::Less);
        }
    }
}

#[test]
fn marker_is_zero_sized_and_fully_capable() {
    let info = marker("invulnerable");
    assert_eq!(info.size(), 0);
    assert_eq!(info.alignment(), 1);
    assert!(info.init().available());
    assert!(info.copy_init().available());
    assert!(info.equals().available());
    assert!(info.compare().available());
    assert!(!info.external());
}

#[test]
fn drop_shim_runs_destructors() {
    let info = typed::<Vec<u32>>("buffer").build();
    assert!(matches!(info.destroy(), DropCap::Fn(_)));

    let mut v = vec![1_u32, 2, 3];
    let slot = std::ptr::NonNull::from(&mut v).cast::<u8>();
    unsafe {
        if let DropCap::Fn(f) = info.destroy() {
            f(&info, slot);
        }
    }
    std::mem::forget(v);

    let trivial = typed::<u64>("plain").build();
    assert!(matches!(trivial.destroy(), DropCap::Trivial));
}

#[test]
fn feature_builder_flags() {
    let plain = FeatureInfo::named("update");
    assert!(!plain.allow_clashes());
    assert!(plain.default_payload().is_none());
    assert!(plain.id().is_none());

    let multi = FeatureInfo::builder("render")
        .allow_clashes(true)
        .default_payload(payload(42_u32))
        .build();
    assert!(multi.allow_clashes());
    let dp = multi.default_payload().unwrap();
    assert_eq!(dp.downcast_ref::<u32>(), Some(&42));
}

#[test]
fn feature_impl_attaches_to_mixin() {
    let shoot = FeatureInfo::named("shoot");
    let info = typed::<Health>("gunner")
        .implements_with(&shoot, payload(7_i64), 2, -1)
        .build();

    assert_eq!(info.features().len(), 1);
    let fi = &info.features()[0];
    assert!(Arc::ptr_eq(&fi.feature, &shoot));
    assert_eq!(fi.bid, 2);
    assert_eq!(fi.priority, -1);
    assert_eq!(fi.payload.downcast_ref::<i64>(), Some(&7));
}

#[test]
fn claim_and_release_cycle() {
    let info = MixinInfo::builder("roamer").build();
    assert!(!info.registered());

    info.claim(
        4,
        Owner {
            serial: 11,
            name: Arc::from("dom"),
            dom: std::sync::Weak::new(),
        },
    );
    assert!(info.registered());
    assert_eq!(info.id().map(|id| id.0), Some(4));
    assert_eq!(info.owner_serial(), Some(11));
    assert_eq!(info.owner_name().as_deref(), Some("dom"));
    assert!(info.domain().is_none());

    info.release();
    assert!(!info.registered());
    assert!(info.owner_serial().is_none());
}

#[test]
fn canonical_order_tie_breaks() {
    let early = MixinInfo::builder("zz").order_priority(-5).build();
    let late = MixinInfo::builder("aa").order_priority(5).build();
    assert_eq!(canonical_order(&early, &late), Ordering::Less);

    let alpha = MixinInfo::builder("alpha").build();
    let beta = MixinInfo::builder("beta").build();
    assert_eq!(canonical_order(&alpha, &beta), Ordering::Less);

    let twin_a = MixinInfo::builder("twin").build();
    let twin_b = MixinInfo::builder("twin").build();
    twin_a.claim(
        0,
        Owner {
            serial: 1,
            name: Arc::from("d"),
            dom: std::sync::Weak::new(),
        },
    );
    twin_b.claim(
        1,
        Owner {
            serial: 1,
            name: Arc::from("d"),
            dom: std::sync::Weak::new(),
        },
    );
    assert_eq!(canonical_order(&twin_a, &twin_b), Ordering::Less);
    assert_eq!(canonical_order(&twin_b, &twin_a), Ordering::Greater);

    // unregistered twins fall back to handle identity, still a total order
    twin_a.release();
    twin_b.release();
    let ord = canonical_order(&twin_a, &twin_b);
    assert_eq!(canonical_order(&twin_b, &twin_a), ord.reverse());
    assert_ne!(ord, Ordering::Equal);
}
