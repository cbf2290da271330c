// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Interned types and everything that produces them.
//!
//! A [`Type`] is an immutable, interned composition: the ordered mixin list,
//! the per-feature dispatch table, the arena layout for object payloads and
//! a live-object counter. Identity is `Arc` identity; two equal lists always
//! resolve to the same handle while the type stays published.
//!
//! Submodules: [`mutation`] is the mutable proposal consumed by the interning
//! engine, [`rules`] the domain-wide edits applied to proposals, [`ftable`]
//! the dispatch-table builder, [`class`] named type predicates, and `intern`
//! the engine itself.

pub mod class;
pub mod ftable;
pub mod mutation;
pub mod rules;

pub(crate) mod intern;

#[cfg(test)]
mod tests;

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use crate::desc::{
    canonical_order, FeatureId, FeatureInfo, MixinId, MixinIndex, MixinInfo, Payload,
};
use crate::error::TypeError;

pub use class::TypeClass;
pub use intern::InternStats;
pub use mutation::TypeMutation;
pub use rules::MutationRule;

/// One feature implementation reachable in a type: the row a dispatch table
/// range points at.
#[derive(Clone)]
pub struct Implementer {
    pub feature: Arc<FeatureInfo>,
    pub payload: Payload,
    pub bid: i32,
    pub priority: i32,
    /// Dense index of the providing mixin inside the type.
    pub mixin_index: MixinIndex,
}

impl fmt::Debug for Implementer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementer")
            .field("feature", self.feature.name())
            .field("bid", &self.bid)
            .field("priority", &self.priority)
            .field("mixin_index", &self.mixin_index)
            .finish()
    }
}

/// Contiguous span of one feature's implementers inside a type.
///
/// Entries are sorted by descending bid, ascending priority, then descending
/// mixin index. `begin` is the dispatch winner; `top_bid_back` is the last
/// entry sharing the winner's bid and delimits the multicast set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImplementerRange {
    pub begin: u32,
    pub top_bid_back: u32,
    pub end: u32,
}

/// `{'a', 'b'}` rendering of a mixin list, used by errors and `Display`.
pub(crate) fn mixin_list_display(mixins: &[Arc<MixinInfo>]) -> String {
    use std::fmt::Write;
    let mut out = String::from("{");
    for (i, m) in mixins.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "'{}'", m.name());
    }
    out.push('}');
    out
}

/// An interned object type: ordered mixins, dispatch table, arena layout.
pub struct Type {
    pub(crate) dom: Weak<crate::domain::DomainInner>,
    pub(crate) domain_name: Arc<str>,
    pub(crate) domain_serial: u64,
    pub(crate) mixins: Vec<Arc<MixinInfo>>,
    /// Mixin id to dense index, length = max id + 1.
    pub(crate) sparse_indices: Vec<Option<MixinIndex>>,
    /// Dense backing store for the dispatch table.
    pub(crate) implementers: Vec<Implementer>,
    /// Indexed by feature id; `None` entries are not strongly implemented.
    pub(crate) ftable: Vec<Option<ImplementerRange>>,
    /// Arena offset per mixin; `None` for external mixins.
    pub(crate) mixin_offsets: Vec<Option<u32>>,
    pub(crate) buf_size: usize,
    pub(crate) buf_align: usize,
    pub(crate) num_objects: AtomicU32,
}

impl Type {
    /// The mixin-less type every domain preallocates.
    pub(crate) fn empty(
        dom: Weak<crate::domain::DomainInner>,
        domain_name: Arc<str>,
        domain_serial: u64,
    ) -> Type {
        Type {
            dom,
            domain_name,
            domain_serial,
            mixins: Vec::new(),
            sparse_indices: Vec::new(),
            implementers: Vec::new(),
            ftable: Vec::new(),
            mixin_offsets: Vec::new(),
            buf_size: 0,
            buf_align: 1,
            num_objects: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn num_mixins(&self) -> usize {
        self.mixins.len()
    }

    #[must_use]
    pub fn mixins(&self) -> &[Arc<MixinInfo>] {
        &self.mixins
    }

    /// Live objects currently of this type.
    #[must_use]
    pub fn num_objects(&self) -> u32 {
        self.num_objects.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn inc_objects(&self) {
        self.num_objects.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn dec_objects(&self) {
        let prev = self.num_objects.fetch_sub(1, AtomicOrdering::Relaxed);
        debug_assert!(prev > 0);
    }

    #[must_use]
    pub fn domain_name(&self) -> &Arc<str> {
        &self.domain_name
    }

    pub(crate) fn domain_serial(&self) -> u64 {
        self.domain_serial
    }

    pub(crate) fn domain_inner(&self) -> Option<Arc<crate::domain::DomainInner>> {
        self.dom.upgrade()
    }

    /// Handle to the owning domain, while it exists.
    #[must_use]
    pub fn domain(&self) -> Option<crate::Domain> {
        self.domain_inner().map(crate::Domain::from_inner)
    }

    // ===================================================================
    // Mixin queries
    // ===================================================================

    #[must_use]
    pub fn index_of(&self, id: MixinId) -> Option<MixinIndex> {
        *self.sparse_indices.get(id.0 as usize)?
    }

    #[must_use]
    pub fn index_of_named(&self, name: &str) -> Option<MixinIndex> {
        self.mixins
            .iter()
            .position(|m| &**m.name() == name)
            .map(|i| i as MixinIndex)
    }

    /// Index of this mixin, looked up through its current id.
    #[must_use]
    pub fn index_of_info(&self, info: &Arc<MixinInfo>) -> Option<MixinIndex> {
        self.index_of(info.id()?)
    }

    /// Index of this exact descriptor, immune to id reuse.
    pub(crate) fn position_of(&self, info: &Arc<MixinInfo>) -> Option<MixinIndex> {
        self.mixins
            .iter()
            .position(|m| Arc::ptr_eq(m, info))
            .map(|i| i as MixinIndex)
    }

    #[must_use]
    pub fn has(&self, info: &Arc<MixinInfo>) -> bool {
        self.index_of_info(info).is_some()
    }

    #[must_use]
    pub fn has_id(&self, id: MixinId) -> bool {
        self.index_of(id).is_some()
    }

    #[must_use]
    pub fn has_named(&self, name: &str) -> bool {
        self.index_of_named(name).is_some()
    }

    #[must_use]
    pub fn mixin_at(&self, index: MixinIndex) -> Option<&Arc<MixinInfo>> {
        self.mixins.get(index as usize)
    }

    // ===================================================================
    // Dispatch table queries
    // ===================================================================

    #[must_use]
    pub fn ftable_at(&self, id: FeatureId) -> Option<ImplementerRange> {
        *self.ftable.get(id.0 as usize)?
    }

    #[must_use]
    pub fn implementers(&self) -> &[Implementer] {
        &self.implementers
    }

    /// Whether a mixin of this type implements the feature.
    #[must_use]
    pub fn implements_strong(&self, feature: &Arc<FeatureInfo>) -> bool {
        feature.id().is_some_and(|id| self.ftable_at(id).is_some())
    }

    #[must_use]
    pub fn implements_strong_id(&self, id: FeatureId) -> bool {
        self.ftable_at(id).is_some()
    }

    #[must_use]
    pub fn implements_strong_named(&self, name: &str) -> bool {
        self.ftable.iter().flatten().any(|range| {
            &**self.implementers[range.begin as usize].feature.name() == name
        })
    }

    /// Strongly implemented, or covered by the feature's default payload.
    #[must_use]
    pub fn implements(&self, feature: &Arc<FeatureInfo>) -> bool {
        self.implements_strong(feature) || feature.default_payload().is_some()
    }

    /// The entry after the current mixin's own entry in the feature's range.
    #[must_use]
    pub fn find_next_implementer(
        &self,
        feature: &Arc<FeatureInfo>,
        current: &Arc<MixinInfo>,
    ) -> Option<&Implementer> {
        let range = self.ftable_at(feature.id()?)?;
        let index = self.index_of_info(current)?;
        let pos = (range.begin..range.end)
            .find(|&i| self.implementers[i as usize].mixin_index == index)?;
        if pos + 1 < range.end {
            Some(&self.implementers[(pos + 1) as usize])
        } else {
            None
        }
    }

    /// The bid run after the run containing the current mixin's entry,
    /// shaped like a range of its own for multicast-style execution.
    #[must_use]
    pub fn find_next_bidder_set(
        &self,
        feature: &Arc<FeatureInfo>,
        current: &Arc<MixinInfo>,
    ) -> Option<ImplementerRange> {
        let range = self.ftable_at(feature.id()?)?;
        let index = self.index_of_info(current)?;
        let pos = (range.begin..range.end)
            .find(|&i| self.implementers[i as usize].mixin_index == index)?;
        let bid = self.implementers[pos as usize].bid;

        let mut start = pos + 1;
        while start < range.end && self.implementers[start as usize].bid == bid {
            start += 1;
        }
        if start == range.end {
            return None;
        }

        let next_bid = self.implementers[start as usize].bid;
        let mut end = start + 1;
        while end < range.end && self.implementers[end as usize].bid == next_bid {
            end += 1;
        }
        Some(ImplementerRange {
            begin: start,
            top_bid_back: end - 1,
            end,
        })
    }

    // ===================================================================
    // Capability predicates (conjunctions over all mixins)
    // ===================================================================

    #[must_use]
    pub fn default_constructible(&self) -> bool {
        self.mixins.iter().all(|m| m.init().available())
    }

    #[must_use]
    pub fn copy_constructible(&self) -> bool {
        self.mixins.iter().all(|m| m.copy_init().available())
    }

    #[must_use]
    pub fn copy_assignable(&self) -> bool {
        self.mixins.iter().all(|m| m.copy_asgn().available())
    }

    #[must_use]
    pub fn copyable(&self) -> bool {
        self.copy_constructible() && self.copy_assignable()
    }

    /// Equality via the eq capability, or the compare capability as a
    /// substitute.
    #[must_use]
    pub fn equality_comparable(&self) -> bool {
        self.mixins
            .iter()
            .all(|m| m.equals().available() || m.compare().available())
    }

    #[must_use]
    pub fn comparable(&self) -> bool {
        self.mixins.iter().all(|m| m.compare().available())
    }

    // ===================================================================
    // Layout
    // ===================================================================

    #[must_use]
    pub fn object_buffer_size(&self) -> usize {
        self.buf_size
    }

    #[must_use]
    pub fn object_buffer_alignment(&self) -> usize {
        self.buf_align
    }

    /// Arena offset of the mixin at `index`; `None` for external mixins.
    #[must_use]
    pub fn mixin_offset(&self, index: MixinIndex) -> Option<u32> {
        *self.mixin_offsets.get(index as usize)?
    }

    // ===================================================================
    // Ordering and classes
    // ===================================================================

    /// Total order over types: equal only to itself; different domains
    /// order by domain serial; within a domain lexicographically by
    /// canonical mixin order, shorter first on a shared prefix.
    #[must_use]
    pub fn compare(&self, other: &Type) -> Ordering {
        if std::ptr::eq(self, other) {
            return Ordering::Equal;
        }
        if self.domain_serial != other.domain_serial {
            return self.domain_serial.cmp(&other.domain_serial);
        }
        for (a, b) in self.mixins.iter().zip(other.mixins.iter()) {
            if !Arc::ptr_eq(a, b) {
                return canonical_order(a, b);
            }
        }
        self.mixins.len().cmp(&other.mixins.len())
    }

    #[must_use]
    pub fn is_of(&self, class: &TypeClass) -> bool {
        class.matches(self)
    }

    /// Resolve a registered type class by name through the owning domain.
    pub fn is_of_named(&self, name: &str) -> Result<bool, TypeError> {
        let dom = self.dom.upgrade().ok_or(TypeError::DomainGone)?;
        let class = dom.find_type_class(name).ok_or_else(|| {
            TypeError::UnknownTypeClass {
                domain: Arc::clone(&self.domain_name),
                ty: self.to_string(),
                name: name.to_string(),
            }
        })?;
        Ok(class.matches(self))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&mixin_list_display(&self.mixins))
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type")
            .field("domain", &self.domain_name)
            .field("mixins", &mixin_list_display(&self.mixins))
            .field("buf_size", &self.buf_size)
            .field("num_objects", &self.num_objects())
            .finish()
    }
}
