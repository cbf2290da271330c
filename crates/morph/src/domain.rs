// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The domain: one self-contained composition universe.
//!
//! A domain owns two independently locked sections: the element registry
//! (mixin and feature descriptors with their ids) and the type section
//! (interned types, the query cache and mutation rules). Element lookups
//! never block type resolution and vice versa; rules read descriptors
//! without holding either write lock.
//!
//! [`Domain`] is a cheap-clone handle. Types and objects keep the domain
//! alive only weakly: dropping the last handle ends the domain while
//! existing objects stay usable through their `Arc`'d types.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::alloc::{BufAllocator, GlobalBuf};
use crate::config::DomainSettings;
use crate::desc::{FeatureId, FeatureInfo, MixinId, MixinInfo};
use crate::error::{DomainError, ElementKind, TypeError};
use crate::registry::ElementRegistry;
use crate::typeset::intern::{self, InternStats, TypeRegistry};
use crate::typeset::{rules, MutationRule, Type, TypeClass, TypeMutation};

/// Domain serials disambiguate descriptors and types across domains even
/// when names repeat.
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

pub(crate) struct DomainInner {
    name: Arc<str>,
    serial: u64,
    settings: DomainSettings,
    alloc: Arc<dyn BufAllocator>,
    elements: RwLock<ElementRegistry>,
    types: RwLock<TypeRegistry>,
    classes: DashMap<Arc<str>, Arc<TypeClass>>,
    empty: Arc<Type>,
}

impl DomainInner {
    pub(crate) fn empty_type(&self) -> &Arc<Type> {
        &self.empty
    }

    pub(crate) fn allocator(&self) -> &Arc<dyn BufAllocator> {
        &self.alloc
    }

    pub(crate) fn find_type_class(&self, name: &str) -> Option<Arc<TypeClass>> {
        self.classes.get(name).map(|entry| Arc::clone(entry.value()))
    }
}

impl Drop for DomainInner {
    fn drop(&mut self) {
        log::debug!("[domain] '{}' dropped", self.name);
    }
}

/// Handle to a domain; clones share the same underlying state.
#[derive(Clone)]
pub struct Domain {
    inner: Arc<DomainInner>,
}

impl Domain {
    /// A domain with default settings and the global byte allocator.
    #[must_use]
    pub fn new(name: &str) -> Domain {
        Domain::with_settings(name, DomainSettings::default())
    }

    #[must_use]
    pub fn with_settings(name: &str, settings: DomainSettings) -> Domain {
        Domain::with_settings_in(name, settings, Arc::new(GlobalBuf))
    }

    /// A domain whose arenas and external mixin buffers default to `alloc`.
    #[must_use]
    pub fn with_settings_in(
        name: &str,
        settings: DomainSettings,
        alloc: Arc<dyn BufAllocator>,
    ) -> Domain {
        let name: Arc<str> = Arc::from(name);
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        let canonicalize = settings.canonicalize_types;
        let dup_mixins = settings.allow_duplicate_mixin_names;
        let dup_features = settings.allow_duplicate_feature_names;
        let cache_capacity = settings.query_cache_capacity;

        let inner = Arc::new_cyclic(|weak: &Weak<DomainInner>| DomainInner {
            name: Arc::clone(&name),
            serial,
            settings,
            alloc,
            elements: RwLock::new(ElementRegistry::new(
                Arc::clone(&name),
                serial,
                weak.clone(),
                dup_mixins,
                dup_features,
            )),
            types: RwLock::new(TypeRegistry::new(
                Arc::clone(&name),
                serial,
                weak.clone(),
                cache_capacity,
            )),
            classes: DashMap::new(),
            empty: Arc::new(Type::empty(weak.clone(), Arc::clone(&name), serial)),
        });

        if canonicalize {
            inner.types.write().add_rule(&rules::canonicalize_rule());
        }
        log::debug!("[domain] created '{name}' (serial {serial})");
        Domain { inner }
    }

    pub(crate) fn from_inner(inner: Arc<DomainInner>) -> Domain {
        Domain { inner }
    }

    pub(crate) fn serial(&self) -> u64 {
        self.inner.serial
    }

    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.inner.name
    }

    #[must_use]
    pub fn settings(&self) -> &DomainSettings {
        &self.inner.settings
    }

    #[must_use]
    pub fn allocator(&self) -> &Arc<dyn BufAllocator> {
        &self.inner.alloc
    }

    // ===================================================================
    // Element registration
    // ===================================================================

    /// Register a feature descriptor, assigning it the lowest free id.
    pub fn register_feature(&self, info: &Arc<FeatureInfo>) -> Result<FeatureId, DomainError> {
        self.inner.elements.write().register_feature(info)
    }

    /// Free a feature's slot and invalidate its id.
    ///
    /// Published types keep their dispatch entries; a type referencing the
    /// feature keeps working through its own handle.
    pub fn unregister_feature(&self, info: &Arc<FeatureInfo>) -> Result<(), DomainError> {
        self.inner.elements.write().unregister_feature(info)
    }

    /// Register a mixin descriptor, assigning it the lowest free id.
    ///
    /// Features the mixin implements are auto-registered first; their
    /// registrations stand even if the mixin itself is then rejected.
    pub fn register_mixin(&self, info: &Arc<MixinInfo>) -> Result<MixinId, DomainError> {
        self.inner.elements.write().register_mixin(info)
    }

    /// Unregister a mixin and purge every type (and cached query) that
    /// contains it.
    ///
    /// Live objects of a purged type keep their type handle and stay
    /// usable; the domain just stops handing the type out.
    pub fn unregister_mixin(&self, info: &Arc<MixinInfo>) -> Result<(), DomainError> {
        let mut elements = self.inner.elements.write();
        if !elements.holds_mixin(info) {
            return Err(DomainError::ForeignElement {
                domain: Arc::clone(&self.inner.name),
                kind: ElementKind::Mixin,
                name: Arc::clone(info.name()),
            });
        }
        self.inner.types.write().purge_mixin(info);
        elements.unregister_mixin(info)
    }

    #[must_use]
    pub fn mixin_info(&self, id: MixinId) -> Option<Arc<MixinInfo>> {
        self.inner.elements.read().mixin(id)
    }

    /// Name lookup; with duplicate names allowed, the lowest slot wins.
    #[must_use]
    pub fn mixin_info_named(&self, name: &str) -> Option<Arc<MixinInfo>> {
        self.inner.elements.read().mixin_named(name)
    }

    #[must_use]
    pub fn feature_info(&self, id: FeatureId) -> Option<Arc<FeatureInfo>> {
        self.inner.elements.read().feature(id)
    }

    #[must_use]
    pub fn feature_info_named(&self, name: &str) -> Option<Arc<FeatureInfo>> {
        self.inner.elements.read().feature_named(name)
    }

    #[must_use]
    pub fn num_mixins(&self) -> usize {
        self.inner.elements.read().num_mixins()
    }

    #[must_use]
    pub fn num_features(&self) -> usize {
        self.inner.elements.read().num_features()
    }

    // ===================================================================
    // Types
    // ===================================================================

    /// The singleton mixin-less type. Never enters the interning maps and
    /// survives garbage collection.
    #[must_use]
    pub fn empty_type(&self) -> &Arc<Type> {
        &self.inner.empty
    }

    /// A fresh proposal based on the empty type.
    #[must_use]
    pub fn new_mutation(&self) -> TypeMutation {
        TypeMutation::from_type(&self.inner.empty)
    }

    /// Resolve a proposal to its interned type: cache hit, rule fixed
    /// point, then materialization of a genuinely new composition.
    pub fn get_type(&self, mutation: TypeMutation) -> Result<Arc<Type>, TypeError> {
        if mutation.domain_serial() != self.inner.serial {
            return Err(TypeError::ForeignMutation {
                domain: Arc::clone(&self.inner.name),
                mutation: mutation.to_string(),
                other: Arc::clone(mutation.domain_name()),
            });
        }
        intern::resolve(&self.inner.types, &self.inner.empty, mutation)
    }

    /// [`get_type`](Domain::get_type) for a plain mixin list.
    pub fn get_type_of(&self, mixins: &[Arc<MixinInfo>]) -> Result<Arc<Type>, TypeError> {
        let mut mutation = self.new_mutation();
        for info in mixins {
            mutation.add(info);
        }
        self.get_type(mutation)
    }

    /// Drop every type without live objects, along with the cached queries
    /// resolving to one. Returns (types, queries) removed.
    pub fn garbage_collect_types(&self) -> (usize, usize) {
        self.inner.types.write().garbage_collect()
    }

    #[must_use]
    pub fn num_types(&self) -> usize {
        self.inner.types.read().num_types()
    }

    #[must_use]
    pub fn num_type_queries(&self) -> usize {
        self.inner.types.read().num_queries()
    }

    /// Query-cache hit/miss counters, for tests and tuning.
    #[must_use]
    pub fn intern_stats(&self) -> InternStats {
        self.inner.types.read().stats()
    }

    // ===================================================================
    // Mutation rules
    // ===================================================================

    /// Attach a rule; attaching the same handle again only bumps its
    /// refcount. Any rule-set change invalidates cached queries.
    pub fn add_mutation_rule(&self, rule: &Arc<MutationRule>) {
        self.inner.types.write().add_rule(rule);
    }

    /// Release one reference to a rule; the last release detaches it.
    /// Unknown handles are ignored.
    pub fn remove_mutation_rule(&self, rule: &Arc<MutationRule>) {
        self.inner.types.write().remove_rule(rule);
    }

    #[must_use]
    pub fn num_mutation_rules(&self) -> usize {
        self.inner.types.read().num_rules()
    }

    // ===================================================================
    // Type classes
    // ===================================================================

    /// Register a named type predicate for [`Type::is_of_named`].
    pub fn register_type_class(&self, class: &Arc<TypeClass>) -> Result<(), DomainError> {
        if class.name().is_empty() {
            return Err(DomainError::EmptyName {
                domain: Arc::clone(&self.inner.name),
                kind: ElementKind::TypeClass,
            });
        }
        match self.inner.classes.entry(Arc::clone(class.name())) {
            dashmap::Entry::Occupied(_) => Err(DomainError::DuplicateName {
                domain: Arc::clone(&self.inner.name),
                kind: ElementKind::TypeClass,
                name: Arc::clone(class.name()),
            }),
            dashmap::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(class));
                Ok(())
            }
        }
    }

    pub fn unregister_type_class(&self, name: &str) -> Result<(), DomainError> {
        match self.inner.classes.remove(name) {
            Some(_) => Ok(()),
            None => Err(DomainError::ForeignElement {
                domain: Arc::clone(&self.inner.name),
                kind: ElementKind::TypeClass,
                name: Arc::from(name),
            }),
        }
    }

    #[must_use]
    pub fn type_class(&self, name: &str) -> Option<Arc<TypeClass>> {
        self.inner.find_type_class(name)
    }

    // ===================================================================
    // Traversal
    // ===================================================================
    //
    // Callbacks run on a snapshot taken under the respective read lock, so
    // they may freely call back into the domain.

    pub fn for_each_mixin<F: FnMut(&Arc<MixinInfo>)>(&self, mut f: F) {
        let snapshot = self.inner.elements.read().mixins_snapshot();
        for info in &snapshot {
            f(info);
        }
    }

    pub fn for_each_feature<F: FnMut(&Arc<FeatureInfo>)>(&self, mut f: F) {
        let snapshot = self.inner.elements.read().features_snapshot();
        for info in &snapshot {
            f(info);
        }
    }

    /// Visit every materialized type; the empty type is a domain constant
    /// and not included.
    pub fn for_each_type<F: FnMut(&Arc<Type>)>(&self, mut f: F) {
        let snapshot = self.inner.types.read().types_snapshot();
        for ty in &snapshot {
            f(ty);
        }
    }

    pub fn for_each_mutation_rule<F: FnMut(&Arc<MutationRule>)>(&self, mut f: F) {
        let snapshot = self.inner.types.read().rules_for_each();
        for rule in &snapshot {
            f(rule);
        }
    }

    pub fn for_each_type_class<F: FnMut(&Arc<TypeClass>)>(&self, mut f: F) {
        let snapshot: Vec<Arc<TypeClass>> = self
            .inner
            .classes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for class in &snapshot {
            f(class);
        }
    }
}

/// Two handles are equal when they address the same domain.
impl PartialEq for Domain {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Domain {}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("name", &self.inner.name)
            .field("serial", &self.inner.serial)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Domain;
    use crate::config::DomainSettings;
    use crate::desc::{common, FeatureInfo};
    use crate::error::{DomainError, TypeError};
    use crate::typeset::{rules, InternStats, MutationRule, TypeClass};

    #[test]
    fn empty_type_is_a_domain_constant() {
        let d = Domain::new("test");
        assert_eq!(d.empty_type().num_mixins(), 0);
        assert_eq!(d.num_types(), 0);

        let ty = d.get_type(d.new_mutation()).unwrap();
        assert!(Arc::ptr_eq(&ty, d.empty_type()));
        assert_eq!(d.num_types(), 0, "the empty type is never interned");
    }

    #[test]
    fn element_registration_round_trip() {
        let d = Domain::new("elems");
        let serialize = FeatureInfo::named("serialize");
        let counter = common::typed::<u32>("counter")
            .with_default()
            .implements(&serialize, common::payload(()))
            .build();

        let id = d.register_mixin(&counter).unwrap();
        assert_eq!(d.num_mixins(), 1);
        assert_eq!(d.num_features(), 1, "implemented features register along");
        assert!(Arc::ptr_eq(&d.mixin_info(id).unwrap(), &counter));
        assert!(Arc::ptr_eq(&d.mixin_info_named("counter").unwrap(), &counter));

        let fid = serialize.id().unwrap();
        assert!(Arc::ptr_eq(&d.feature_info(fid).unwrap(), &serialize));
        assert!(d.feature_info_named("serialize").is_some());

        d.unregister_mixin(&counter).unwrap();
        assert_eq!(d.num_mixins(), 0);
        assert!(counter.id().is_none());
        assert!(d.mixin_info_named("counter").is_none());
        assert_eq!(d.num_features(), 1, "features outlive their implementers");
    }

    #[test]
    fn unregistering_a_mixin_purges_its_types() {
        let d = Domain::new("purge");
        let a = common::marker("a");
        let b = common::marker("b");
        d.register_mixin(&a).unwrap();
        d.register_mixin(&b).unwrap();

        let ab = d.get_type_of(&[Arc::clone(&a), Arc::clone(&b)]).unwrap();
        let only_b = d.get_type_of(&[Arc::clone(&b)]).unwrap();
        assert_eq!(d.num_types(), 2);
        assert_eq!(d.num_type_queries(), 2);

        d.unregister_mixin(&a).unwrap();
        assert_eq!(d.num_types(), 1);
        assert_eq!(d.num_type_queries(), 1);
        assert!(only_b.has_named("b"));
        assert!(ab.has_named("a"), "existing handles stay intact");

        let again = d.unregister_mixin(&a);
        assert!(matches!(again, Err(DomainError::ForeignElement { .. })));
    }

    #[test]
    fn unregistering_a_feature_keeps_published_types() {
        let d = Domain::new("slots");
        let render = FeatureInfo::named("render");
        let body = common::typed::<i64>("body")
            .with_default()
            .implements(&render, common::payload(7u32))
            .build();
        d.register_mixin(&body).unwrap();

        let ty = d.get_type_of(&[Arc::clone(&body)]).unwrap();
        assert!(ty.implements_strong(&render));

        d.unregister_feature(&render).unwrap();
        assert!(render.id().is_none());
        assert!(d.feature_info_named("render").is_none());
        assert!(ty.implements_strong_named("render"));
        assert_eq!(d.num_types(), 1);
    }

    #[test]
    fn foreign_mutations_are_rejected() {
        let d1 = Domain::new("one");
        let d2 = Domain::new("two");
        let err = d2.get_type(d1.new_mutation()).unwrap_err();
        assert!(matches!(err, TypeError::ForeignMutation { .. }));
    }

    #[test]
    fn rules_apply_through_the_facade() {
        let d = Domain::new("rules");
        let a = common::marker("a");
        let b = common::marker("b");
        d.register_mixin(&a).unwrap();
        d.register_mixin(&b).unwrap();
        assert_eq!(d.num_mutation_rules(), 0);

        let rule = rules::also_adds(&a, &b);
        d.add_mutation_rule(&rule);
        assert_eq!(d.num_mutation_rules(), 1);
        let ty = d.get_type_of(&[Arc::clone(&a)]).unwrap();
        assert!(ty.has_named("b"));

        d.remove_mutation_rule(&rule);
        assert_eq!(d.num_mutation_rules(), 0);
        let ty = d.get_type_of(&[Arc::clone(&a)]).unwrap();
        assert!(!ty.has_named("b"));
    }

    #[test]
    fn canonical_domains_inject_a_visible_rule() {
        let d = Domain::with_settings("canon", DomainSettings::canonical());
        assert_eq!(d.num_mutation_rules(), 1);

        let a = common::marker("a");
        let b = common::marker("b");
        d.register_mixin(&b).unwrap();
        d.register_mixin(&a).unwrap();
        let ab = d.get_type_of(&[Arc::clone(&a), Arc::clone(&b)]).unwrap();
        let ba = d.get_type_of(&[Arc::clone(&b), Arc::clone(&a)]).unwrap();
        assert!(Arc::ptr_eq(&ab, &ba));
        assert_eq!(d.num_types(), 1);
    }

    #[test]
    fn type_classes_register_and_match() {
        let d = Domain::new("classes");
        let tag = common::marker("tag");
        d.register_mixin(&tag).unwrap();

        let tagged = TypeClass::new("tagged", |ty| ty.has_named("tag"));
        d.register_type_class(&tagged).unwrap();
        assert!(matches!(
            d.register_type_class(&TypeClass::new("tagged", |_| true)),
            Err(DomainError::DuplicateName { .. })
        ));
        assert!(matches!(
            d.register_type_class(&TypeClass::new("", |_| true)),
            Err(DomainError::EmptyName { .. })
        ));

        let ty = d.get_type_of(&[Arc::clone(&tag)]).unwrap();
        assert!(ty.is_of_named("tagged").unwrap());
        assert!(!d.empty_type().is_of_named("tagged").unwrap());
        assert!(Arc::ptr_eq(&d.type_class("tagged").unwrap(), &tagged));

        d.unregister_type_class("tagged").unwrap();
        assert!(matches!(
            d.unregister_type_class("tagged"),
            Err(DomainError::ForeignElement { .. })
        ));
        assert!(matches!(
            ty.is_of_named("tagged"),
            Err(TypeError::UnknownTypeClass { .. })
        ));
    }

    #[test]
    fn traversals_run_on_snapshots() {
        let d = Domain::new("walk");
        let a = common::marker("a");
        let b = common::marker("b");
        d.register_mixin(&a).unwrap();
        d.register_mixin(&b).unwrap();
        d.get_type_of(&[Arc::clone(&a)]).unwrap();
        d.get_type_of(&[Arc::clone(&b)]).unwrap();
        d.add_mutation_rule(&MutationRule::new("noop", 0, |_| Ok(())));
        d.register_type_class(&TypeClass::new("any", |_| true))
            .unwrap();

        let extra = common::marker("c");
        let mut seen = Vec::new();
        d.for_each_mixin(|m| {
            seen.push(m.name().to_string());
            if seen.len() == 1 {
                // callbacks may re-enter the domain
                d.register_mixin(&extra).unwrap();
            }
        });
        assert_eq!(seen, ["a", "b"], "mutation during traversal is invisible");
        assert_eq!(d.num_mixins(), 3);

        let mut types = 0;
        d.for_each_type(|_| types += 1);
        assert_eq!(types, 2);

        let mut features = 0;
        d.for_each_feature(|_| features += 1);
        assert_eq!(features, 0);

        let mut rule_names = Vec::new();
        d.for_each_mutation_rule(|r| rule_names.push(r.name().to_string()));
        assert_eq!(rule_names, ["noop"]);

        let mut classes = 0;
        d.for_each_type_class(|_| classes += 1);
        assert_eq!(classes, 1);
    }

    #[test]
    fn handles_compare_by_identity() {
        let d = Domain::new("same-name");
        let alias = d.clone();
        let other = Domain::new("same-name");
        assert_eq!(d, alias);
        assert_ne!(d, other);
        assert_eq!(d.name(), other.name());
    }

    #[test]
    fn intern_stats_count_misses_then_hits() {
        let d = Domain::new("stats");
        let a = common::marker("a");
        d.register_mixin(&a).unwrap();

        d.get_type_of(&[Arc::clone(&a)]).unwrap();
        d.get_type_of(&[Arc::clone(&a)]).unwrap();
        assert_eq!(
            d.intern_stats(),
            InternStats {
                hits: 1,
                misses: 1,
                creates: 1,
                discarded: 0,
            }
        );
    }
}
