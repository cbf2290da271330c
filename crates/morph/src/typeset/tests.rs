// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::desc::common;
use crate::desc::MixinInfo;
use crate::error::TypeError;
use crate::registry::ElementRegistry;

use super::intern::{resolve, TypeRegistry};
use super::rules;
use super::{MutationRule, Type, TypeClass, TypeMutation};

const SERIAL: u64 = 7;

fn type_section() -> (RwLock<TypeRegistry>, Arc<Type>, ElementRegistry) {
    let name: Arc<str> = Arc::from("test");
    let types = TypeRegistry::new(Arc::clone(&name), SERIAL, Weak::new(), 64);
    let empty = Arc::new(Type::empty(Weak::new(), Arc::clone(&name), SERIAL));
    let elements = ElementRegistry::new(name, SERIAL, Weak::new(), false, false);
    (RwLock::new(types), empty, elements)
}

fn get(
    lock: &RwLock<TypeRegistry>,
    empty: &Arc<Type>,
    list: &[&Arc<MixinInfo>],
) -> Result<Arc<Type>, TypeError> {
    let mut mutation = TypeMutation::from_type(empty);
    for info in list {
        mutation.add(info);
    }
    resolve(lock, empty, mutation)
}

fn names(ty: &Type) -> Vec<&str> {
    ty.mixins().iter().map(|m| &**m.name()).collect()
}

#[test]
fn same_query_returns_the_same_handle() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    let b = common::marker("b");
    elems.register_mixin(&a).unwrap();
    elems.register_mixin(&b).unwrap();

    let t1 = get(&lock, &empty, &[&a, &b]).unwrap();
    let t2 = get(&lock, &empty, &[&a, &b]).unwrap();
    assert!(Arc::ptr_eq(&t1, &t2));
    assert_eq!(names(&t1), ["a", "b"]);

    let reg = lock.read();
    assert_eq!(reg.num_types(), 1);
    assert_eq!(reg.num_queries(), 1);
    let stats = reg.stats();
    assert_eq!(stats.creates, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.discarded, 0);
}

#[test]
fn permutations_are_distinct_types_by_default() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    let b = common::marker("b");
    elems.register_mixin(&a).unwrap();
    elems.register_mixin(&b).unwrap();

    let ab = get(&lock, &empty, &[&a, &b]).unwrap();
    let ba = get(&lock, &empty, &[&b, &a]).unwrap();
    assert!(!Arc::ptr_eq(&ab, &ba));
    assert_eq!(names(&ab), ["a", "b"]);
    assert_eq!(names(&ba), ["b", "a"]);
    assert_eq!(lock.read().num_types(), 2);
}

#[test]
fn canonicalization_makes_permutations_converge() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    let b = common::marker("b");
    let first = MixinInfo::builder("zz-first").order_priority(-1).build();
    elems.register_mixin(&a).unwrap();
    elems.register_mixin(&b).unwrap();
    elems.register_mixin(&first).unwrap();
    lock.write().add_rule(&rules::canonicalize_rule());

    let t1 = get(&lock, &empty, &[&b, &first, &a]).unwrap();
    let t2 = get(&lock, &empty, &[&a, &b, &first]).unwrap();
    assert!(Arc::ptr_eq(&t1, &t2));
    // order priority dominates the name
    assert_eq!(names(&t1), ["zz-first", "a", "b"]);
    assert_eq!(lock.read().num_types(), 1);
    assert_eq!(lock.read().num_queries(), 2);
}

#[test]
fn empty_query_is_the_empty_type() {
    let (lock, empty, _elems) = type_section();
    let t = get(&lock, &empty, &[]).unwrap();
    assert!(Arc::ptr_eq(&t, &empty));
    assert_eq!(lock.read().num_types(), 0);
    assert_eq!(lock.read().num_queries(), 1);
}

#[test]
fn rules_can_empty_a_type() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    elems.register_mixin(&a).unwrap();
    let wipe = MutationRule::new("wipe", 0, |m| {
        m.mixins_mut().clear();
        Ok(())
    });
    lock.write().add_rule(&wipe);

    let t = get(&lock, &empty, &[&a]).unwrap();
    assert!(Arc::ptr_eq(&t, &empty));
}

#[test]
fn dependency_query_without_rules_is_an_error() {
    let (lock, empty, mut elems) = type_section();
    let dep = MixinInfo::builder("dep").dependency(true).build();
    elems.register_mixin(&dep).unwrap();

    let err = get(&lock, &empty, &[&dep]).unwrap_err();
    assert!(matches!(err, TypeError::CyclicRules { .. }));
}

#[test]
fn attached_dependencies_come_back_through_rules() {
    let (lock, empty, mut elems) = type_section();
    let host = common::marker("host");
    let dep = MixinInfo::builder("dep").dependency(true).build();
    elems.register_mixin(&host).unwrap();
    elems.register_mixin(&dep).unwrap();
    lock.write().add_rule(&rules::attaches_to(&host, &dep));

    let t = get(&lock, &empty, &[&host]).unwrap();
    assert_eq!(names(&t), ["host", "dep"]);

    // an explicit mention of the dependency converges to the same type
    let t2 = get(&lock, &empty, &[&host, &dep]).unwrap();
    assert!(Arc::ptr_eq(&t, &t2));

    // the dependency alone is stripped down to nothing
    let t3 = get(&lock, &empty, &[&dep]).unwrap();
    assert!(Arc::ptr_eq(&t3, &empty));
}

#[test]
fn also_adds_keeps_the_companion_queryable_alone() {
    let (lock, empty, mut elems) = type_section();
    let host = common::marker("host");
    let side = common::marker("side");
    elems.register_mixin(&host).unwrap();
    elems.register_mixin(&side).unwrap();
    lock.write().add_rule(&rules::also_adds(&host, &side));

    let t = get(&lock, &empty, &[&host]).unwrap();
    assert_eq!(names(&t), ["host", "side"]);

    let alone = get(&lock, &empty, &[&side]).unwrap();
    assert_eq!(names(&alone), ["side"]);
}

#[test]
fn oscillating_rules_are_reported_cyclic() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    let b = common::marker("b");
    elems.register_mixin(&a).unwrap();
    elems.register_mixin(&b).unwrap();

    let flip_b = Arc::clone(&b);
    let flip = MutationRule::new("flip", 0, move |m| {
        if !m.remove(&flip_b) {
            m.add(&flip_b);
        }
        Ok(())
    });
    lock.write().add_rule(&flip);

    let err = get(&lock, &empty, &[&a]).unwrap_err();
    match err {
        TypeError::CyclicRules { domain, .. } => assert_eq!(&*domain, "test"),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn rule_failures_carry_the_rule_name() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    elems.register_mixin(&a).unwrap();
    let boom = MutationRule::new("boom", 0, |_| Err("refused".into()));
    lock.write().add_rule(&boom);

    let err = get(&lock, &empty, &[&a]).unwrap_err();
    match err {
        TypeError::RuleFailed { rule, source, .. } => {
            assert_eq!(&*rule, "boom");
            assert_eq!(source.to_string(), "refused");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn rules_are_refcounted_by_handle() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    let extra = common::marker("extra");
    elems.register_mixin(&a).unwrap();
    elems.register_mixin(&extra).unwrap();

    let extra_for_rule = Arc::clone(&extra);
    let rule = MutationRule::new("add extra", 0, move |m| {
        m.add_if_lacking(&extra_for_rule);
        Ok(())
    });

    {
        let mut reg = lock.write();
        reg.add_rule(&rule);
        reg.add_rule(&rule);
        assert_eq!(reg.num_rules(), 1);
    }
    let t = get(&lock, &empty, &[&a]).unwrap();
    assert_eq!(names(&t), ["a", "extra"]);

    lock.write().remove_rule(&rule);
    assert_eq!(lock.read().num_rules(), 1);
    // still cached, still in effect
    let t2 = get(&lock, &empty, &[&a]).unwrap();
    assert!(Arc::ptr_eq(&t, &t2));

    lock.write().remove_rule(&rule);
    assert_eq!(lock.read().num_rules(), 0);
    let t3 = get(&lock, &empty, &[&a]).unwrap();
    assert_eq!(names(&t3), ["a"]);

    // removing a rule that was never added is a quiet noop
    let stranger = MutationRule::new("stranger", 0, |_| Ok(()));
    lock.write().remove_rule(&stranger);
    assert_eq!(lock.read().num_rules(), 0);
}

#[test]
fn rules_run_in_order_priority_order() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    let early = common::marker("early");
    let late = common::marker("late");
    elems.register_mixin(&a).unwrap();
    elems.register_mixin(&early).unwrap();
    elems.register_mixin(&late).unwrap();

    let late_handle = Arc::clone(&late);
    let add_late = MutationRule::new("add late", 10, move |m| {
        m.add_if_lacking(&late_handle);
        Ok(())
    });
    let early_handle = Arc::clone(&early);
    let add_early = MutationRule::new("add early", -10, move |m| {
        m.add_if_lacking(&early_handle);
        Ok(())
    });

    // registration order must not matter, only the priorities
    let mut reg = lock.write();
    reg.add_rule(&add_late);
    reg.add_rule(&add_early);
    drop(reg);

    let t = get(&lock, &empty, &[&a]).unwrap();
    assert_eq!(names(&t), ["a", "early", "late"]);
}

#[test]
fn changing_the_rule_set_drops_cached_queries() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    let extra = common::marker("extra");
    elems.register_mixin(&a).unwrap();
    elems.register_mixin(&extra).unwrap();

    let plain = get(&lock, &empty, &[&a]).unwrap();
    assert_eq!(lock.read().num_queries(), 1);

    let extra_handle = Arc::clone(&extra);
    let rule = MutationRule::new("add extra", 0, move |m| {
        m.add_if_lacking(&extra_handle);
        Ok(())
    });
    lock.write().add_rule(&rule);
    assert_eq!(lock.read().num_queries(), 0);

    let enriched = get(&lock, &empty, &[&a]).unwrap();
    assert!(!Arc::ptr_eq(&plain, &enriched));
    assert_eq!(names(&enriched), ["a", "extra"]);
}

#[test]
fn tied_implementers_clash_unless_the_feature_allows_them() {
    let (lock, empty, mut elems) = type_section();
    let shout = crate::desc::FeatureInfo::named("shout");
    let m1 = MixinInfo::builder("m1")
        .implements(&shout, common::payload(1_u32))
        .build();
    let m2 = MixinInfo::builder("m2")
        .implements(&shout, common::payload(2_u32))
        .build();
    elems.register_mixin(&m1).unwrap();
    elems.register_mixin(&m2).unwrap();

    let err = get(&lock, &empty, &[&m1, &m2]).unwrap_err();
    match err {
        TypeError::FeatureClash { feature, a, b, .. } => {
            assert_eq!(&*feature, "shout");
            // table order: the later mixin sorts first on a full tie
            assert_eq!(&*a, "m2");
            assert_eq!(&*b, "m1");
        }
        other => panic!("unexpected error {other}"),
    }

    // a higher bid resolves the tie
    let m3 = MixinInfo::builder("m3")
        .implements_with(&shout, common::payload(3_u32), 1, 0)
        .build();
    elems.register_mixin(&m3).unwrap();
    let t = get(&lock, &empty, &[&m1, &m3]).unwrap();
    let range = t.ftable_at(shout.id().unwrap()).unwrap();
    assert_eq!(t.implementers()[range.begin as usize].mixin_index, 1);
    assert_eq!(range.end - range.begin, 2);
}

#[test]
fn dispatch_table_orders_by_bid_priority_and_index() {
    let (lock, empty, mut elems) = type_section();
    let f = crate::desc::FeatureInfo::builder("f").allow_clashes(true).build();
    let m0 = MixinInfo::builder("m0")
        .implements_with(&f, common::payload(0_u32), 1, 0)
        .build();
    let m1 = MixinInfo::builder("m1")
        .implements_with(&f, common::payload(1_u32), 2, 0)
        .build();
    let m2 = MixinInfo::builder("m2")
        .implements_with(&f, common::payload(2_u32), 2, 0)
        .build();
    let m3 = MixinInfo::builder("m3")
        .implements_with(&f, common::payload(3_u32), 0, 0)
        .build();
    for m in [&m0, &m1, &m2, &m3] {
        elems.register_mixin(m).unwrap();
    }

    let t = get(&lock, &empty, &[&m0, &m1, &m2, &m3]).unwrap();
    let range = t.ftable_at(f.id().unwrap()).unwrap();
    assert_eq!((range.begin, range.top_bid_back, range.end), (0, 1, 4));

    let order: Vec<u32> = t.implementers()[range.begin as usize..range.end as usize]
        .iter()
        .map(|imp| imp.mixin_index)
        .collect();
    // top bid first; equal bid and priority fall back to descending index
    assert_eq!(order, [2, 1, 0, 3]);
}

#[test]
fn next_implementer_and_next_bidder_set_walk_the_table() {
    let (lock, empty, mut elems) = type_section();
    let f = crate::desc::FeatureInfo::builder("f").allow_clashes(true).build();
    let m0 = MixinInfo::builder("m0")
        .implements_with(&f, common::payload(0_u32), 1, 0)
        .build();
    let m1 = MixinInfo::builder("m1")
        .implements_with(&f, common::payload(1_u32), 2, 0)
        .build();
    let m2 = MixinInfo::builder("m2")
        .implements_with(&f, common::payload(2_u32), 2, 0)
        .build();
    let m3 = MixinInfo::builder("m3")
        .implements_with(&f, common::payload(3_u32), 0, 0)
        .build();
    for m in [&m0, &m1, &m2, &m3] {
        elems.register_mixin(m).unwrap();
    }
    let t = get(&lock, &empty, &[&m0, &m1, &m2, &m3]).unwrap();

    // rows are [m2, m1, m0, m3]
    let after_m2 = t.find_next_implementer(&f, &m2).unwrap();
    assert_eq!(after_m2.mixin_index, 1);
    assert!(t.find_next_implementer(&f, &m3).is_none());

    let after_top = t.find_next_bidder_set(&f, &m2).unwrap();
    assert_eq!((after_top.begin, after_top.top_bid_back, after_top.end), (2, 2, 3));
    let after_mid = t.find_next_bidder_set(&f, &m0).unwrap();
    assert_eq!((after_mid.begin, after_mid.top_bid_back, after_mid.end), (3, 3, 4));
    assert!(t.find_next_bidder_set(&f, &m3).is_none());
}

#[test]
fn default_payloads_make_weak_implementations() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    elems.register_mixin(&a).unwrap();
    let fallback = crate::desc::FeatureInfo::builder("fallback")
        .default_payload(common::payload(9_u8))
        .build();

    let t = get(&lock, &empty, &[&a]).unwrap();
    assert!(!t.implements_strong(&fallback));
    assert!(t.implements(&fallback));
}

#[test]
fn capability_predicates_are_conjunctions() {
    let (lock, empty, mut elems) = type_section();
    let full = common::marker("full");
    let plain = common::typed::<u32>("plain").build();
    elems.register_mixin(&full).unwrap();
    elems.register_mixin(&plain).unwrap();

    let t_full = get(&lock, &empty, &[&full]).unwrap();
    assert!(t_full.default_constructible());
    assert!(t_full.copyable());
    assert!(t_full.equality_comparable());
    assert!(t_full.comparable());

    let t_mixed = get(&lock, &empty, &[&full, &plain]).unwrap();
    assert!(!t_mixed.default_constructible());
    assert!(!t_mixed.copy_constructible());
    assert!(!t_mixed.copy_assignable());
    assert!(!t_mixed.equality_comparable());
    assert!(!t_mixed.comparable());
}

#[test]
fn arena_layout_packs_internal_mixins_in_order() {
    let (lock, empty, mut elems) = type_section();
    let small = common::typed::<u8>("small").build();
    let wide = common::typed::<u64>("wide").build();
    let nothing = common::marker("nothing");
    let ext = MixinInfo::builder("ext").size_align(16, 8).force_external().build();
    for m in [&small, &wide, &nothing, &ext] {
        elems.register_mixin(m).unwrap();
    }

    let t = get(&lock, &empty, &[&small, &wide, &nothing, &ext]).unwrap();
    assert_eq!(t.mixin_offset(0), Some(0));
    assert_eq!(t.mixin_offset(1), Some(8));
    assert_eq!(t.mixin_offset(2), Some(16));
    assert_eq!(t.mixin_offset(3), None);
    assert_eq!(t.object_buffer_size(), 16);
    assert_eq!(t.object_buffer_alignment(), 8);
}

#[test]
fn sparse_and_named_lookups_agree() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    let b = common::marker("b");
    let c = common::marker("c");
    elems.register_mixin(&a).unwrap();
    elems.register_mixin(&b).unwrap();
    elems.register_mixin(&c).unwrap();

    let t = get(&lock, &empty, &[&c, &a]).unwrap();
    assert_eq!(t.index_of_info(&c), Some(0));
    assert_eq!(t.index_of_info(&a), Some(1));
    assert_eq!(t.index_of_named("a"), Some(1));
    assert_eq!(t.index_of(b.id().unwrap()), None);
    assert!(t.has(&a));
    assert!(!t.has(&b));
    assert!(t.has_named("c"));
    assert!(Arc::ptr_eq(t.mixin_at(0).unwrap(), &c));
}

#[test]
fn type_compare_is_a_total_order() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    let b = common::marker("b");
    elems.register_mixin(&a).unwrap();
    elems.register_mixin(&b).unwrap();

    let t_a = get(&lock, &empty, &[&a]).unwrap();
    let t_b = get(&lock, &empty, &[&b]).unwrap();
    let t_ab = get(&lock, &empty, &[&a, &b]).unwrap();

    use std::cmp::Ordering;
    assert_eq!(t_a.compare(&t_a), Ordering::Equal);
    assert_eq!(t_a.compare(&t_b), Ordering::Less);
    assert_eq!(t_b.compare(&t_a), Ordering::Greater);
    // shared prefix: the shorter list sorts first
    assert_eq!(t_a.compare(&t_ab), Ordering::Less);
    assert_eq!(empty.compare(&t_a), Ordering::Less);
}

#[test]
fn type_classes_match_by_predicate() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    let b = common::marker("b");
    elems.register_mixin(&a).unwrap();
    elems.register_mixin(&b).unwrap();

    let has_a = TypeClass::new("has-a", |t| t.has_named("a"));
    let t_ab = get(&lock, &empty, &[&a, &b]).unwrap();
    let t_b = get(&lock, &empty, &[&b]).unwrap();
    assert!(t_ab.is_of(&has_a));
    assert!(!t_b.is_of(&has_a));

    // named resolution needs a live domain behind the type
    assert!(matches!(
        t_ab.is_of_named("has-a"),
        Err(TypeError::DomainGone)
    ));
}

#[test]
fn garbage_collection_drops_only_object_free_types() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    let b = common::marker("b");
    elems.register_mixin(&a).unwrap();
    elems.register_mixin(&b).unwrap();

    let t_a = get(&lock, &empty, &[&a]).unwrap();
    let t_b = get(&lock, &empty, &[&b]).unwrap();
    assert_eq!(lock.read().num_queries(), 2);

    t_a.inc_objects();
    assert_eq!(lock.write().garbage_collect(), (1, 1));
    assert_eq!(lock.read().num_types(), 1);
    assert_eq!(lock.read().num_queries(), 1);

    // the collected composition is simply built again on demand
    let t_b2 = get(&lock, &empty, &[&b]).unwrap();
    assert!(!Arc::ptr_eq(&t_b, &t_b2));

    t_a.dec_objects();
    assert_eq!(lock.write().garbage_collect(), (2, 2));
    assert_eq!(lock.read().num_types(), 0);
}

#[test]
fn empty_type_queries_survive_garbage_collection() {
    let (lock, empty, _elems) = type_section();
    let t = get(&lock, &empty, &[]).unwrap();
    assert!(Arc::ptr_eq(&t, &empty));

    lock.write().garbage_collect();
    let hits_before = lock.read().stats().hits;
    let t2 = get(&lock, &empty, &[]).unwrap();
    assert!(Arc::ptr_eq(&t2, &empty));
    assert_eq!(lock.read().stats().hits, hits_before + 1);
}

#[test]
fn purging_a_mixin_removes_its_types_and_queries() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    let b = common::marker("b");
    let c = common::marker("c");
    elems.register_mixin(&a).unwrap();
    elems.register_mixin(&b).unwrap();
    elems.register_mixin(&c).unwrap();

    get(&lock, &empty, &[&a, &b]).unwrap();
    let t_c = get(&lock, &empty, &[&c]).unwrap();

    assert_eq!(lock.write().purge_mixin(&a), 1);
    assert_eq!(lock.read().num_types(), 1);
    assert_eq!(lock.read().num_queries(), 1);

    let t_c2 = get(&lock, &empty, &[&c]).unwrap();
    assert!(Arc::ptr_eq(&t_c, &t_c2));
}

#[test]
fn creating_with_bad_mixins_is_rejected() {
    let (lock, empty, mut elems) = type_section();
    let a = common::marker("a");
    elems.register_mixin(&a).unwrap();

    let loose = common::marker("loose");
    match get(&lock, &empty, &[&loose]).unwrap_err() {
        TypeError::Unregistered { mixin, .. } => assert_eq!(&*mixin, "loose"),
        other => panic!("unexpected error {other}"),
    }

    let mut other_elems =
        ElementRegistry::new(Arc::from("other"), 99, Weak::new(), false, false);
    let alien = common::marker("alien");
    other_elems.register_mixin(&alien).unwrap();
    match get(&lock, &empty, &[&alien]).unwrap_err() {
        TypeError::ForeignMixin { mixin, owner, .. } => {
            assert_eq!(&*mixin, "alien");
            assert_eq!(owner.as_deref(), Some("other"));
        }
        other => panic!("unexpected error {other}"),
    }

    match get(&lock, &empty, &[&a, &a]).unwrap_err() {
        TypeError::DuplicateMixin { mixin, .. } => assert_eq!(&*mixin, "a"),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn mutation_edits_behave() {
    let (_lock, empty, _elems) = type_section();
    let a = common::marker("a");
    let b = common::marker("b");

    let mut m = TypeMutation::from_type(&empty);
    m.add(&a);
    m.add(&b);
    m.add(&a);
    m.dedup();
    // the last occurrence keeps its position
    assert_eq!(m.mixins().len(), 2);
    assert!(Arc::ptr_eq(&m.mixins()[0], &b));
    assert!(Arc::ptr_eq(&m.mixins()[1], &a));

    m.to_back(&b);
    assert!(Arc::ptr_eq(&m.mixins()[1], &b));

    assert!(m.remove_named("b"));
    assert!(!m.remove_named("b"));
    assert!(m.has(&a));
    assert!(m.lacks(&b));
    assert!(m.adding(&a));
    assert!(!m.removing(&a));
    assert!(!m.noop());

    assert!(m.remove(&a));
    assert!(m.noop());
}

#[test]
fn mutation_display_lists_the_mixins() {
    let (_lock, empty, _elems) = type_section();
    let a = common::marker("a");
    let b = common::marker("b");
    let mut m = TypeMutation::from_type(&empty);
    m.add(&a);
    m.add(&b);
    assert_eq!(m.to_string(), "{'a', 'b'}");
    assert_eq!(empty.to_string(), "{}");
}
