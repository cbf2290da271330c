// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The type-interning engine: rule application, the query cache and the
//! interned-type store.
//!
//! Resolution is phased around the type-section lock. The hot path is one
//! read-lock peek of the LRU query cache keyed by the pre-rule mixin list.
//! On a miss the rule set is snapshotted and applied outside any lock, so
//! user rules never run under the domain. Publication takes the write lock
//! with a double check: racing creators of the same type keep the first
//! published handle and discard their own, and a rules-generation counter
//! keeps a query computed against a stale rule set out of the cache.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use lru::LruCache;
use parking_lot::RwLock;

use crate::alloc::align_up;
use crate::config::MAX_RULE_PASSES;
use crate::desc::{MixinIndex, MixinInfo};
use crate::error::TypeError;

use super::ftable;
use super::mutation::TypeMutation;
use super::rules::MutationRule;
use super::Type;

/// Cache keys are the mixin handle addresses; the cached value pins the
/// handles so an address can never be recycled while its key is live.
type QueryKey = Box<[usize]>;

fn key_vec(mixins: &[Arc<MixinInfo>]) -> Vec<usize> {
    mixins.iter().map(|m| Arc::as_ptr(m) as usize).collect()
}

struct CachedQuery {
    pinned: Box<[Arc<MixinInfo>]>,
    ty: Arc<Type>,
}

struct RuleEntry {
    rule: Arc<MutationRule>,
    refs: u32,
    serial: u64,
}

/// Snapshot of the interning counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InternStats {
    /// Query-cache hits.
    pub hits: u64,
    /// Query-cache misses (rules had to run).
    pub misses: u64,
    /// Types actually materialized.
    pub creates: u64,
    /// Types discarded after losing a creation race.
    pub discarded: u64,
}

#[derive(Default)]
struct StatCells {
    hits: AtomicU64,
    misses: AtomicU64,
    creates: AtomicU64,
    discarded: AtomicU64,
}

impl StatCells {
    fn snapshot(&self) -> InternStats {
        InternStats {
            hits: self.hits.load(AtomicOrdering::Relaxed),
            misses: self.misses.load(AtomicOrdering::Relaxed),
            creates: self.creates.load(AtomicOrdering::Relaxed),
            discarded: self.discarded.load(AtomicOrdering::Relaxed),
        }
    }
}

/// Type-section state of one domain; lives behind the section `RwLock`.
pub(crate) struct TypeRegistry {
    domain_name: Arc<str>,
    serial: u64,
    dom: Weak<crate::domain::DomainInner>,
    types: HashMap<QueryKey, Arc<Type>>,
    queries: LruCache<QueryKey, CachedQuery>,
    rules: Vec<RuleEntry>,
    next_rule_serial: u64,
    /// Bumped whenever the logical rule set changes; queries computed
    /// against an older generation are not cached.
    generation: u64,
    stats: StatCells,
}

impl TypeRegistry {
    pub(crate) fn new(
        domain_name: Arc<str>,
        serial: u64,
        dom: Weak<crate::domain::DomainInner>,
        cache_capacity: usize,
    ) -> Self {
        let cap = NonZeroUsize::new(cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        TypeRegistry {
            domain_name,
            serial,
            dom,
            types: HashMap::new(),
            queries: LruCache::new(cap),
            rules: Vec::new(),
            next_rule_serial: 0,
            generation: 0,
            stats: StatCells::default(),
        }
    }

    fn peek_query(&self, key: &[usize]) -> Option<Arc<Type>> {
        match self.queries.peek(key) {
            Some(cq) => {
                self.stats.hits.fetch_add(1, AtomicOrdering::Relaxed);
                #[cfg(feature = "trace")]
                log::trace!("[typereg] '{}' query hit -> {}", self.domain_name, cq.ty);
                Some(Arc::clone(&cq.ty))
            }
            None => {
                self.stats.misses.fetch_add(1, AtomicOrdering::Relaxed);
                #[cfg(feature = "trace")]
                log::trace!("[typereg] '{}' query miss", self.domain_name);
                None
            }
        }
    }

    fn publish_query(&mut self, original: &[Arc<MixinInfo>], ty: &Arc<Type>, generation: u64) {
        if self.generation != generation {
            log::trace!(
                "[typereg] '{}' rule set moved, not caching query",
                self.domain_name
            );
            return;
        }
        self.queries.put(
            key_vec(original).into_boxed_slice(),
            CachedQuery {
                pinned: original.into(),
                ty: Arc::clone(ty),
            },
        );
    }

    fn find_exact(&self, post_key: &[usize]) -> Option<Arc<Type>> {
        self.types.get(post_key).cloned()
    }

    fn rules_snapshot(&self) -> (Vec<Arc<MutationRule>>, u64) {
        (
            self.rules.iter().map(|e| Arc::clone(&e.rule)).collect(),
            self.generation,
        )
    }

    // ===================================================================
    // Rules
    // ===================================================================

    /// Refcounted add; the first registration orders the rule in and drops
    /// every cached query (there is no telling which ones it affects).
    pub(crate) fn add_rule(&mut self, rule: &Arc<MutationRule>) {
        if let Some(entry) = self.rules.iter_mut().find(|e| Arc::ptr_eq(&e.rule, rule)) {
            entry.refs += 1;
            return;
        }
        let serial = self.next_rule_serial;
        self.next_rule_serial += 1;
        let key = (rule.order_priority(), rule.name().as_ref(), serial);
        let pos = self
            .rules
            .iter()
            .position(|e| (e.rule.order_priority(), e.rule.name().as_ref(), e.serial) > key)
            .unwrap_or(self.rules.len());
        self.rules.insert(
            pos,
            RuleEntry {
                rule: Arc::clone(rule),
                refs: 1,
                serial,
            },
        );
        self.queries.clear();
        self.generation += 1;
        log::debug!(
            "[typereg] '{}' added mutation rule '{}'",
            self.domain_name,
            rule.name()
        );
    }

    /// Refcounted remove; unknown rules are ignored. Dropping the last
    /// reference detaches the rule and drops every cached query.
    pub(crate) fn remove_rule(&mut self, rule: &Arc<MutationRule>) {
        let Some(pos) = self.rules.iter().position(|e| Arc::ptr_eq(&e.rule, rule)) else {
            return;
        };
        let entry = &mut self.rules[pos];
        debug_assert!(entry.refs > 0);
        entry.refs -= 1;
        if entry.refs > 0 {
            return;
        }
        self.rules.remove(pos);
        self.queries.clear();
        self.generation += 1;
        log::debug!(
            "[typereg] '{}' removed mutation rule '{}'",
            self.domain_name,
            rule.name()
        );
    }

    pub(crate) fn num_rules(&self) -> usize {
        self.rules.len()
    }

    pub(crate) fn num_types(&self) -> usize {
        self.types.len()
    }

    pub(crate) fn num_queries(&self) -> usize {
        self.queries.len()
    }

    pub(crate) fn stats(&self) -> InternStats {
        self.stats.snapshot()
    }

    pub(crate) fn types_snapshot(&self) -> Vec<Arc<Type>> {
        self.types.values().cloned().collect()
    }

    pub(crate) fn rules_for_each(&self) -> Vec<Arc<MutationRule>> {
        self.rules.iter().map(|e| Arc::clone(&e.rule)).collect()
    }

    // ===================================================================
    // Removal
    // ===================================================================

    /// Drop every type whose composition contains `info` and every cached
    /// query that involves it, either in its key or through its result.
    /// Runs while the mixin is being unregistered.
    pub(crate) fn purge_mixin(&mut self, info: &Arc<MixinInfo>) -> usize {
        let dead: Vec<Arc<Type>> = self
            .types
            .values()
            .filter(|t| t.mixins().iter().any(|m| Arc::ptr_eq(m, info)))
            .cloned()
            .collect();
        self.types
            .retain(|_, t| !dead.iter().any(|d| Arc::ptr_eq(d, t)));

        let doomed: Vec<QueryKey> = self
            .queries
            .iter()
            .filter(|(_, cq)| {
                cq.pinned.iter().any(|m| Arc::ptr_eq(m, info))
                    || dead.iter().any(|d| Arc::ptr_eq(d, &cq.ty))
            })
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.queries.pop(key);
        }

        if !dead.is_empty() || !doomed.is_empty() {
            log::debug!(
                "[typereg] '{}' purged {} types and {} queries for mixin '{}'",
                self.domain_name,
                dead.len(),
                doomed.len(),
                info.name()
            );
        }
        dead.len()
    }

    /// Drop every type with no live objects plus its cached queries.
    pub(crate) fn garbage_collect(&mut self) -> (usize, usize) {
        let dead: Vec<Arc<Type>> = self
            .types
            .values()
            .filter(|t| t.num_objects() == 0)
            .cloned()
            .collect();
        if dead.is_empty() {
            return (0, 0);
        }
        self.types
            .retain(|_, t| !dead.iter().any(|d| Arc::ptr_eq(d, t)));

        let doomed: Vec<QueryKey> = self
            .queries
            .iter()
            .filter(|(_, cq)| dead.iter().any(|d| Arc::ptr_eq(d, &cq.ty)))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.queries.pop(key);
        }

        log::debug!(
            "[typereg] '{}' gc dropped {} types and {} queries",
            self.domain_name,
            dead.len(),
            doomed.len()
        );
        (dead.len(), doomed.len())
    }
}

// =======================================================================
// Resolution
// =======================================================================

/// Resolve a mutation to its interned type, creating one if needed.
pub(crate) fn resolve(
    lock: &RwLock<TypeRegistry>,
    empty: &Arc<Type>,
    mut mutation: TypeMutation,
) -> Result<Arc<Type>, TypeError> {
    let key = key_vec(mutation.mixins());
    let (rules, generation, dom, domain_name, serial) = {
        let reg = lock.read();
        if let Some(ty) = reg.peek_query(&key) {
            return Ok(ty);
        }
        let (rules, generation) = reg.rules_snapshot();
        (
            rules,
            generation,
            reg.dom.clone(),
            Arc::clone(&reg.domain_name),
            reg.serial,
        )
    };

    let original: Vec<Arc<MixinInfo>> = mutation.mixins().to_vec();
    apply_rules(&mut mutation, &rules)?;

    if mutation.mixins().is_empty() {
        let mut reg = lock.write();
        reg.publish_query(&original, empty, generation);
        return Ok(Arc::clone(empty));
    }

    let post_key = key_vec(mutation.mixins());
    if lock.read().find_exact(&post_key).is_some() {
        let mut reg = lock.write();
        // revalidate: a gc pass may have dropped the type between the locks
        if let Some(ty) = reg.find_exact(&post_key) {
            reg.publish_query(&original, &ty, generation);
            return Ok(ty);
        }
    }

    // genuinely new: build outside the lock, publish with a double check
    let ty = Arc::new(create_type(&dom, &domain_name, serial, &mutation)?);
    let mut reg = lock.write();
    if let Some(existing) = reg.find_exact(&post_key) {
        // another thread built the same type first; ours is discarded
        reg.stats.discarded.fetch_add(1, AtomicOrdering::Relaxed);
        reg.publish_query(&original, &existing, generation);
        return Ok(existing);
    }
    reg.types
        .insert(post_key.into_boxed_slice(), Arc::clone(&ty));
    reg.stats.creates.fetch_add(1, AtomicOrdering::Relaxed);
    reg.publish_query(&original, &ty, generation);
    log::debug!("[typereg] '{domain_name}' created type {ty}");
    Ok(ty)
}

/// Strip dependency mixins, then run all rules repeatedly until a pass
/// changes nothing. The pre-strip list is the baseline, so stripping alone
/// counts as a change and forces at least one more pass. A pass index
/// reaching the pass budget or the rule count while still changing is
/// treated as a cycle.
fn apply_rules(
    mutation: &mut TypeMutation,
    rules: &[Arc<MutationRule>],
) -> Result<(), TypeError> {
    let mut last_result: Vec<Arc<MixinInfo>> = mutation.mixins().to_vec();
    mutation.mixins_mut().retain(|m| !m.dependency());

    let mut pass = 0_usize;
    loop {
        for rule in rules {
            rule.apply(mutation).map_err(|source| TypeError::RuleFailed {
                domain: Arc::clone(mutation.domain_name()),
                rule: Arc::clone(rule.name()),
                mutation: mutation.to_string(),
                source,
            })?;
        }
        if lists_equal(&last_result, mutation.mixins()) {
            return Ok(());
        }
        if pass == MAX_RULE_PASSES as usize || pass == rules.len() {
            return Err(TypeError::CyclicRules {
                domain: Arc::clone(mutation.domain_name()),
                mutation: mutation.to_string(),
            });
        }
        last_result = mutation.mixins().to_vec();
        pass += 1;
    }
}

fn lists_equal(a: &[Arc<MixinInfo>], b: &[Arc<MixinInfo>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
}

/// Validate the post-rule list and materialize a type: dispatch table,
/// arena layout and the sparse id map.
fn create_type(
    dom: &Weak<crate::domain::DomainInner>,
    domain_name: &Arc<str>,
    serial: u64,
    mutation: &TypeMutation,
) -> Result<Type, TypeError> {
    let mixins = mutation.mixins();

    for (i, m) in mixins.iter().enumerate() {
        if !m.registered() {
            return Err(TypeError::Unregistered {
                domain: Arc::clone(domain_name),
                mutation: mutation.to_string(),
                mixin: Arc::clone(m.name()),
            });
        }
        if m.owner_serial() != Some(serial) {
            return Err(TypeError::ForeignMixin {
                domain: Arc::clone(domain_name),
                mutation: mutation.to_string(),
                mixin: Arc::clone(m.name()),
                owner: m.owner_name(),
            });
        }
        for other in &mixins[i + 1..] {
            if Arc::ptr_eq(m, other) {
                return Err(TypeError::DuplicateMixin {
                    domain: Arc::clone(domain_name),
                    mutation: mutation.to_string(),
                    mixin: Arc::clone(m.name()),
                });
            }
        }
    }

    let (implementers, ftable) = ftable::build(domain_name, mixins)?;

    // arena layout: internal mixins in order at their natural alignment,
    // externals carry no offset
    let mut offsets = Vec::with_capacity(mixins.len());
    let mut size = 0_usize;
    let mut align = 1_usize;
    for m in mixins {
        if m.external() {
            offsets.push(None);
            continue;
        }
        let a = m.alignment();
        align = align.max(a);
        let offset = align_up(size, a);
        offsets.push(Some(offset as u32));
        size = offset + m.size();
    }

    let max_id = mixins
        .iter()
        .map(|m| m.raw_id() as usize)
        .max()
        .unwrap_or(0);
    let mut sparse: Vec<Option<MixinIndex>> = vec![None; max_id + 1];
    for (i, m) in mixins.iter().enumerate() {
        sparse[m.raw_id() as usize] = Some(i as MixinIndex);
    }

    Ok(Type {
        dom: dom.clone(),
        domain_name: Arc::clone(domain_name),
        domain_serial: serial,
        mixins: mixins.to_vec(),
        sparse_indices: sparse,
        implementers,
        ftable,
        mixin_offsets: offsets,
        buf_size: size,
        buf_align: align,
        num_objects: std::sync::atomic::AtomicU32::new(0),
    })
}
