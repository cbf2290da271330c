// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Element descriptors: mixins, features and their capabilities.
//!
//! A [`MixinInfo`] describes one building block of an object: payload size
//! and alignment, lifecycle capabilities, and the feature implementations it
//! contributes. A [`FeatureInfo`] names a dispatchable feature. Both are
//! shared by handle (`Arc`) between the domain, its interned types and user
//! code; the registry assigns ids in place at registration time.
//!
//! Lifecycle hooks are tagged capabilities rather than nullable function
//! pointers: `InitCap::Zero` or `DropCap::Trivial` express the common
//! plain-data cases without user shims, and `MoveCap::Memcpy` is the normal
//! Rust relocation. The typed builders in [`common`] fill capabilities from
//! ordinary Rust impls (`Default`, `Clone`, `PartialEq`, `Ord`).

pub mod common;

#[cfg(test)]
mod tests;

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::alloc::MixinAllocator;
use crate::error::BoxedError;

// =======================================================================
// Identifiers
// =======================================================================

/// Raw value marking an unassigned id.
pub(crate) const INVALID_ID: u32 = u32::MAX;

/// Sparse registry slot of a registered mixin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MixinId(pub u32);

/// Sparse registry slot of a registered feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureId(pub u32);

/// Dense position of a mixin inside one type's ordered mixin list.
pub type MixinIndex = u32;

/// Id slot written by the registry and readable without a lock.
pub(crate) struct IdCell(AtomicU32);

impl IdCell {
    pub(crate) fn new() -> Self {
        IdCell(AtomicU32::new(INVALID_ID))
    }

    pub(crate) fn get(&self) -> u32 {
        self.0.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn set(&self, id: u32) {
        self.0.store(id, AtomicOrdering::Release);
    }

    pub(crate) fn reset(&self) {
        self.set(INVALID_ID);
    }
}

impl fmt::Debug for IdCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.get();
        if id == INVALID_ID {
            f.write_str("invalid")
        } else {
            write!(f, "{id}")
        }
    }
}

/// Which domain currently holds an element, stamped at registration.
pub(crate) struct Owner {
    pub serial: u64,
    pub name: Arc<str>,
    pub dom: Weak<crate::domain::DomainInner>,
}

// =======================================================================
// Payloads and lifecycle capabilities
// =======================================================================

/// Erased feature implementation payload.
///
/// The engine stores and routes payloads without interpreting them; typed
/// call helpers in [`dispatch`](crate::dispatch) downcast them back.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Fallible in-place construction of a payload at `dst` (uninitialized).
pub type InitFn = unsafe fn(&MixinInfo, NonNull<u8>) -> Result<(), BoxedError>;

/// Copy construction/assignment from `src` into `dst`.
///
/// For copy-init `dst` is uninitialized; for copy-assign it holds a live
/// payload. `src` is only read.
pub type CopyFn = unsafe fn(&MixinInfo, NonNull<u8>, NonNull<u8>) -> Result<(), BoxedError>;

/// Relocation of a payload from `src` into uninitialized `dst`.
///
/// After the call `src` is logically uninitialized; the engine will not drop
/// it. This matches Rust move semantics, not the copy-then-destroy dance of
/// C++-style moves.
pub type MoveFn = unsafe fn(&MixinInfo, NonNull<u8>, NonNull<u8>);

/// In-place destruction of a live payload.
pub type DropFn = unsafe fn(&MixinInfo, NonNull<u8>);

/// Equality of two live payloads.
pub type EqFn = unsafe fn(&MixinInfo, NonNull<u8>, NonNull<u8>) -> bool;

/// Total order of two live payloads.
pub type CmpFn = unsafe fn(&MixinInfo, NonNull<u8>, NonNull<u8>) -> Ordering;

/// How a payload comes to life when the mutation provides no value.
#[derive(Debug, Clone, Copy)]
pub enum InitCap {
    /// Not default-constructible; mutations needing it fail.
    None,
    /// Zero-fill the payload bytes.
    Zero,
    /// Run a construction function.
    Fn(InitFn),
}

impl InitCap {
    #[inline]
    #[must_use]
    pub fn available(&self) -> bool {
        !matches!(self, InitCap::None)
    }
}

/// How a payload is copied (either into raw storage or over a live value).
#[derive(Debug, Clone, Copy)]
pub enum CopyCap {
    None,
    Fn(CopyFn),
}

impl CopyCap {
    #[inline]
    #[must_use]
    pub fn available(&self) -> bool {
        !matches!(self, CopyCap::None)
    }
}

/// How a payload relocates when its object changes type.
#[derive(Debug, Clone, Copy)]
pub enum MoveCap {
    /// Bitwise relocation; every ordinary Rust value supports this.
    Memcpy,
    /// Custom relocation function.
    Fn(MoveFn),
    /// Not relocatable; forces the mixin to external storage.
    None,
}

/// How a payload is destroyed.
#[derive(Debug, Clone, Copy)]
pub enum DropCap {
    /// Nothing to run, storage release is enough.
    Trivial,
    /// Run a destruction function.
    Fn(DropFn),
}

/// Optional equality capability.
#[derive(Debug, Clone, Copy)]
pub enum EqCap {
    None,
    Fn(EqFn),
}

impl EqCap {
    #[inline]
    #[must_use]
    pub fn available(&self) -> bool {
        !matches!(self, EqCap::None)
    }
}

/// Optional ordering capability.
#[derive(Debug, Clone, Copy)]
pub enum CmpCap {
    None,
    Fn(CmpFn),
}

impl CmpCap {
    #[inline]
    #[must_use]
    pub fn available(&self) -> bool {
        !matches!(self, CmpCap::None)
    }
}

// =======================================================================
// Features
// =======================================================================

/// A dispatchable feature: a name plus dispatch policy.
pub struct FeatureInfo {
    name: Arc<str>,
    allow_clashes: bool,
    default_payload: Option<Payload>,
    id: IdCell,
    owner: Mutex<Option<Owner>>,
}

impl FeatureInfo {
    /// Start building a feature descriptor.
    pub fn builder(name: &str) -> FeatureBuilder {
        FeatureBuilder {
            name: Arc::from(name),
            allow_clashes: false,
            default_payload: None,
        }
    }

    /// Shorthand for a plain unicast-style feature with no default.
    #[must_use]
    pub fn named(name: &str) -> Arc<FeatureInfo> {
        Self::builder(name).build()
    }

    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Whether several implementers may tie on bid and priority.
    #[must_use]
    pub fn allow_clashes(&self) -> bool {
        self.allow_clashes
    }

    /// Fallback payload used when a type has no implementer.
    #[must_use]
    pub fn default_payload(&self) -> Option<&Payload> {
        self.default_payload.as_ref()
    }

    /// Registry slot, if currently registered.
    #[must_use]
    pub fn id(&self) -> Option<FeatureId> {
        let raw = self.id.get();
        (raw != INVALID_ID).then_some(FeatureId(raw))
    }

    #[must_use]
    pub fn registered(&self) -> bool {
        self.id.get() != INVALID_ID
    }

    pub(crate) fn raw_id(&self) -> u32 {
        self.id.get()
    }

    pub(crate) fn claim(&self, id: u32, owner: Owner) {
        *self.owner.lock() = Some(owner);
        self.id.set(id);
    }

    pub(crate) fn release(&self) {
        self.id.reset();
        *self.owner.lock() = None;
    }

    pub(crate) fn owner_serial(&self) -> Option<u64> {
        self.owner.lock().as_ref().map(|o| o.serial)
    }

    pub(crate) fn owner_name(&self) -> Option<Arc<str>> {
        self.owner.lock().as_ref().map(|o| Arc::clone(&o.name))
    }
}

impl fmt::Debug for FeatureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureInfo")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("allow_clashes", &self.allow_clashes)
            .field("has_default", &self.default_payload.is_some())
            .finish()
    }
}

/// Builder for [`FeatureInfo`].
pub struct FeatureBuilder {
    name: Arc<str>,
    allow_clashes: bool,
    default_payload: Option<Payload>,
}

impl FeatureBuilder {
    /// Permit same-bid same-priority implementers (multicast features).
    #[must_use]
    pub fn allow_clashes(mut self, allow: bool) -> Self {
        self.allow_clashes = allow;
        self
    }

    /// Payload used when a type implements the feature only weakly.
    #[must_use]
    pub fn default_payload(mut self, payload: Payload) -> Self {
        self.default_payload = Some(payload);
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<FeatureInfo> {
        Arc::new(FeatureInfo {
            name: self.name,
            allow_clashes: self.allow_clashes,
            default_payload: self.default_payload,
            id: IdCell::new(),
            owner: Mutex::new(None),
        })
    }
}

/// One feature implementation contributed by a mixin.
#[derive(Clone)]
pub struct FeatureImpl {
    pub feature: Arc<FeatureInfo>,
    pub payload: Payload,
    /// Competing implementations: the highest bid set wins dispatch.
    pub bid: i32,
    /// Execution order inside a bid set: higher runs earlier in multicasts.
    pub priority: i32,
}

impl fmt::Debug for FeatureImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureImpl")
            .field("feature", self.feature.name())
            .field("bid", &self.bid)
            .field("priority", &self.priority)
            .finish()
    }
}

// =======================================================================
// Mixins
// =======================================================================

/// Descriptor of one mixin: payload layout, lifecycle, features.
///
/// Built once via [`MixinInfo::builder`] (or the typed helpers in
/// [`common`]), then registered with a [`Domain`](crate::Domain) which
/// assigns the id in place. The same handle can be unregistered and
/// registered again.
pub struct MixinInfo {
    name: Arc<str>,
    size: usize,
    alignment: usize,
    init: InitCap,
    copy_init: CopyCap,
    copy_asgn: CopyCap,
    relocate: MoveCap,
    destroy: DropCap,
    equals: EqCap,
    compare: CmpCap,
    features: Vec<FeatureImpl>,
    force_external: bool,
    allocator: Option<Arc<dyn MixinAllocator>>,
    dependency: bool,
    order_priority: i32,
    user_data: u64,
    type_id: Option<TypeId>,
    id: IdCell,
    owner: Mutex<Option<Owner>>,
}

impl MixinInfo {
    /// Start building a raw (untyped) mixin descriptor.
    ///
    /// Defaults: zero size, alignment 1, no lifecycle capabilities apart
    /// from `MoveCap::Memcpy` and `DropCap::Trivial`, no features.
    pub fn builder(name: &str) -> MixinBuilder {
        MixinBuilder {
            name: Arc::from(name),
            size: 0,
            alignment: 1,
            init: InitCap::None,
            copy_init: CopyCap::None,
            copy_asgn: CopyCap::None,
            relocate: MoveCap::Memcpy,
            destroy: DropCap::Trivial,
            equals: EqCap::None,
            compare: CmpCap::None,
            features: Vec::new(),
            force_external: false,
            allocator: None,
            dependency: false,
            order_priority: 0,
            user_data: 0,
            type_id: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    #[must_use]
    pub fn init(&self) -> InitCap {
        self.init
    }

    #[must_use]
    pub fn copy_init(&self) -> CopyCap {
        self.copy_init
    }

    #[must_use]
    pub fn copy_asgn(&self) -> CopyCap {
        self.copy_asgn
    }

    #[must_use]
    pub fn relocate(&self) -> MoveCap {
        self.relocate
    }

    #[must_use]
    pub fn destroy(&self) -> DropCap {
        self.destroy
    }

    #[must_use]
    pub fn equals(&self) -> EqCap {
        self.equals
    }

    #[must_use]
    pub fn compare(&self) -> CmpCap {
        self.compare
    }

    #[must_use]
    pub fn features(&self) -> &[FeatureImpl] {
        &self.features
    }

    /// Rule-managed mixin: stripped from queries before rules run.
    #[must_use]
    pub fn dependency(&self) -> bool {
        self.dependency
    }

    #[must_use]
    pub fn order_priority(&self) -> i32 {
        self.order_priority
    }

    #[must_use]
    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    #[must_use]
    pub fn allocator(&self) -> Option<&Arc<dyn MixinAllocator>> {
        self.allocator.as_ref()
    }

    /// Rust type stored in the payload, when built through a typed helper.
    #[must_use]
    pub fn stored_type(&self) -> Option<TypeId> {
        self.type_id
    }

    /// External mixins live outside the object arena: not relocatable, or
    /// carrying their own allocator, or forced.
    #[must_use]
    pub fn external(&self) -> bool {
        matches!(self.relocate, MoveCap::None) || self.allocator.is_some() || self.force_external
    }

    /// Registry slot, if currently registered.
    #[must_use]
    pub fn id(&self) -> Option<MixinId> {
        let raw = self.id.get();
        (raw != INVALID_ID).then_some(MixinId(raw))
    }

    #[must_use]
    pub fn registered(&self) -> bool {
        self.id.get() != INVALID_ID
    }

    /// Handle to the owning domain, while it exists.
    #[must_use]
    pub fn domain(&self) -> Option<crate::Domain> {
        let inner = self.owner.lock().as_ref()?.dom.upgrade()?;
        Some(crate::Domain::from_inner(inner))
    }

    pub(crate) fn raw_id(&self) -> u32 {
        self.id.get()
    }

    pub(crate) fn claim(&self, id: u32, owner: Owner) {
        *self.owner.lock() = Some(owner);
        self.id.set(id);
    }

    pub(crate) fn release(&self) {
        self.id.reset();
        *self.owner.lock() = None;
    }

    pub(crate) fn owner_serial(&self) -> Option<u64> {
        self.owner.lock().as_ref().map(|o| o.serial)
    }

    pub(crate) fn owner_name(&self) -> Option<Arc<str>> {
        self.owner.lock().as_ref().map(|o| Arc::clone(&o.name))
    }
}

impl fmt::Debug for MixinInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MixinInfo")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("size", &self.size)
            .field("alignment", &self.alignment)
            .field("external", &self.external())
            .field("dependency", &self.dependency)
            .field("order_priority", &self.order_priority)
            .field("features", &self.features.len())
            .finish()
    }
}

/// Canonical order of mixins: order priority, then name, then current id,
/// then handle address as the last resort. Used for canonicalized types and
/// cross-type comparison; the exact tie-break sequence is load-bearing.
#[must_use]
pub fn canonical_order(a: &Arc<MixinInfo>, b: &Arc<MixinInfo>) -> Ordering {
    a.order_priority
        .cmp(&b.order_priority)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.raw_id().cmp(&b.raw_id()))
        .then_with(|| (Arc::as_ptr(a) as usize).cmp(&(Arc::as_ptr(b) as usize)))
}

/// Builder for [`MixinInfo`].
pub struct MixinBuilder {
    name: Arc<str>,
    size: usize,
    alignment: usize,
    init: InitCap,
    copy_init: CopyCap,
    copy_asgn: CopyCap,
    relocate: MoveCap,
    destroy: DropCap,
    equals: EqCap,
    compare: CmpCap,
    features: Vec<FeatureImpl>,
    force_external: bool,
    allocator: Option<Arc<dyn MixinAllocator>>,
    dependency: bool,
    order_priority: i32,
    user_data: u64,
    pub(crate) type_id: Option<TypeId>,
}

impl MixinBuilder {
    /// Payload layout. `alignment` must be a non-zero power of two.
    #[must_use]
    pub fn size_align(mut self, size: usize, alignment: usize) -> Self {
        debug_assert!(alignment.is_power_of_two());
        self.size = size;
        self.alignment = alignment;
        self
    }

    #[must_use]
    pub fn init(mut self, cap: InitCap) -> Self {
        self.init = cap;
        self
    }

    #[must_use]
    pub fn copy_init(mut self, cap: CopyCap) -> Self {
        self.copy_init = cap;
        self
    }

    #[must_use]
    pub fn copy_asgn(mut self, cap: CopyCap) -> Self {
        self.copy_asgn = cap;
        self
    }

    #[must_use]
    pub fn relocate(mut self, cap: MoveCap) -> Self {
        self.relocate = cap;
        self
    }

    #[must_use]
    pub fn destroy(mut self, cap: DropCap) -> Self {
        self.destroy = cap;
        self
    }

    #[must_use]
    pub fn equals(mut self, cap: EqCap) -> Self {
        self.equals = cap;
        self
    }

    #[must_use]
    pub fn compare(mut self, cap: CmpCap) -> Self {
        self.compare = cap;
        self
    }

    /// Implement `feature` with `payload` at bid 0, priority 0.
    #[must_use]
    pub fn implements(self, feature: &Arc<FeatureInfo>, payload: Payload) -> Self {
        self.implements_with(feature, payload, 0, 0)
    }

    /// Implement `feature` with explicit bid and priority.
    #[must_use]
    pub fn implements_with(
        mut self,
        feature: &Arc<FeatureInfo>,
        payload: Payload,
        bid: i32,
        priority: i32,
    ) -> Self {
        self.features.push(FeatureImpl {
            feature: Arc::clone(feature),
            payload,
            bid,
            priority,
        });
        self
    }

    /// Mark the mixin as managed by mutation rules: queries are stripped of
    /// it before rules run, so only rules can keep it in a type.
    #[must_use]
    pub fn dependency(mut self, dep: bool) -> Self {
        self.dependency = dep;
        self
    }

    #[must_use]
    pub fn order_priority(mut self, prio: i32) -> Self {
        self.order_priority = prio;
        self
    }

    /// Keep the payload out of the object arena even if relocatable.
    #[must_use]
    pub fn force_external(mut self) -> Self {
        self.force_external = true;
        self
    }

    /// External storage comes from this allocator (implies external).
    #[must_use]
    pub fn allocator(mut self, alloc: Arc<dyn MixinAllocator>) -> Self {
        self.allocator = Some(alloc);
        self
    }

    /// Opaque per-mixin value; the engine never reads it.
    #[must_use]
    pub fn user_data(mut self, data: u64) -> Self {
        self.user_data = data;
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<MixinInfo> {
        Arc::new(MixinInfo {
            name: self.name,
            size: self.size,
            alignment: self.alignment,
            init: self.init,
            copy_init: self.copy_init,
            copy_asgn: self.copy_asgn,
            relocate: self.relocate,
            destroy: self.destroy,
            equals: self.equals,
            compare: self.compare,
            features: self.features,
            force_external: self.force_external,
            allocator: self.allocator,
            dependency: self.dependency,
            order_priority: self.order_priority,
            user_data: self.user_data,
            type_id: self.type_id,
            id: IdCell::new(),
            owner: Mutex::new(None),
        })
    }
}
