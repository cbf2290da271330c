// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use morph::common::typed;
use morph::{Domain, DomainSettings, MixinInfo, TypeMutation};

fn pool(domain: &Domain) -> Vec<Arc<MixinInfo>> {
    let mixins: Vec<Arc<MixinInfo>> = (0..6)
        .map(|i| typed::<u64>(&format!("m{i}")).with_default().build())
        .collect();
    for m in &mixins {
        domain.register_mixin(m).expect("registration");
    }
    mixins
}

// Each input byte is one mutation op against an evolving mixin list:
// add (may duplicate), remove, reorder, dedup, resolve, garbage-collect.
fuzz_target!(|data: &[u8]| {
    let domain = Domain::with_settings("fuzz", DomainSettings::canonical());
    let mixins = pool(&domain);
    let mut mutation = domain.new_mutation();

    for &op in data {
        let m = &mixins[(op & 0x07) as usize % mixins.len()];
        match op >> 4 {
            0..=3 => mutation.add(m),
            4..=6 => {
                mutation.remove(m);
            }
            7 => mutation.to_back(m),
            8 => mutation.dedup(),
            9..=12 => {
                let list = mutation.mixins().to_vec();
                if let Ok(ty) = domain.get_type_of(&list) {
                    // duplicates never survive resolution
                    for (i, a) in ty.mixins().iter().enumerate() {
                        for b in &ty.mixins()[i + 1..] {
                            assert!(!Arc::ptr_eq(a, b));
                        }
                    }
                    // equal queries intern to the same type
                    let again = domain.get_type_of(&list).expect("second resolve");
                    assert!(Arc::ptr_eq(&ty, &again));
                    mutation = TypeMutation::from_type(&ty);
                }
            }
            _ => {
                domain.garbage_collect_types();
            }
        }
    }

    // nothing keeps a type alive here, so a final sweep drains the registry
    drop(mutation);
    domain.garbage_collect_types();
    assert_eq!(domain.num_types(), 0);
});
