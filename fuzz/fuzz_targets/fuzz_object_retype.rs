// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use morph::common::typed;
use morph::{Domain, MixinInfo, Object};

// Each input byte picks a mixin subset to re-type one object to, with a
// mixin lacking default construction in the pool so some transitions fail.
// Successful transitions must land exactly on the target type; failed ones
// must leave the object untouched.
fuzz_target!(|data: &[u8]| {
    let domain = Domain::new("fuzz");
    let mut mixins: Vec<Arc<MixinInfo>> = (0..5)
        .map(|i| {
            typed::<u64>(&format!("m{i}"))
                .with_default()
                .cloneable()
                .with_eq()
                .build()
        })
        .collect();
    mixins.push(typed::<u64>("no-init").cloneable().with_eq().build());
    for m in &mixins {
        domain.register_mixin(m).expect("registration");
    }

    let mut obj = Object::empty(&domain);
    for &op in data {
        let mask = (op & 0x3F) as usize;
        let list: Vec<Arc<MixinInfo>> = mixins
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, m)| Arc::clone(m))
            .collect();
        let target = domain.get_type_of(&list).expect("distinct pool resolves");
        let before = Arc::clone(obj.ty());

        match obj.reset_type(&target) {
            Ok(()) => {
                assert!(Arc::ptr_eq(obj.ty(), &target));
                assert_eq!(obj.num_mixins(), list.len());
                for m in &list {
                    assert!(obj.has(m));
                }
                for i in 0..obj.num_mixins() {
                    if let Some(v) = obj.get_at_mut::<u64>(i as u32) {
                        *v = v.wrapping_add(u64::from(op));
                    }
                }
            }
            Err(_) => assert!(Arc::ptr_eq(obj.ty(), &before)),
        }

        if op & 0x40 != 0 {
            let copy = obj.copy().expect("pool is copyable");
            assert!(copy.equals(&obj));
        }
        if op & 0x80 != 0 {
            domain.garbage_collect_types();
        }
    }

    drop(obj);
    domain.garbage_collect_types();
    assert_eq!(domain.num_types(), 0);
});
