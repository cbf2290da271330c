// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Live objects: a type handle plus owned per-mixin storage.
//!
//! An object always has a type, the domain's empty type at minimum.
//! Internal mixin payloads pack into one arena block at type-computed
//! offsets, external ones own their buffers. Re-typing goes through
//! [`ObjectMutation`], a transaction that rolls back on drop; value-level
//! operations (matching copy and move, equality, ordering) work on the
//! payloads directly and never change the composition.
//!
//! Objects may move between threads but are not shareable: typed payload
//! access hands out plain references under the usual borrow rules.

pub(crate) mod storage;
mod transaction;


use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::mem;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::alloc::BufAllocator;
use crate::desc::{CmpCap, CopyCap, CopyFn, EqCap, MixinId, MixinIndex, MixinInfo, MoveCap};
use crate::domain::Domain;
use crate::error::{CompareError, ObjectError};
use crate::typeset::Type;

use storage::MixinSlot;

pub use transaction::{MutationStep, ObjectMutation};

/// A live instance of an interned type.
pub struct Object {
    ty: Arc<Type>,
    arena: Option<NonNull<u8>>,
    slots: Box<[MixinSlot]>,
    sealed: bool,
    alloc: Arc<dyn BufAllocator>,
}

// SAFETY: payloads are Send (enforced at descriptor construction) and only
// reachable through the owning object, so the object may change threads.
// It is not Sync: payload types are not required to tolerate shared access.
unsafe impl Send for Object {}

impl Object {
    fn from_parts(
        ty: Arc<Type>,
        arena: Option<NonNull<u8>>,
        slots: Box<[MixinSlot]>,
        alloc: Arc<dyn BufAllocator>,
    ) -> Object {
        ty.inc_objects();
        Object {
            ty,
            arena,
            slots,
            sealed: false,
            alloc,
        }
    }

    fn bare(ty: Arc<Type>, alloc: Arc<dyn BufAllocator>) -> Object {
        debug_assert_eq!(ty.num_mixins(), 0);
        Object::from_parts(ty, None, Box::default(), alloc)
    }

    /// An object of the domain's empty type.
    #[must_use]
    pub fn empty(dom: &Domain) -> Object {
        Object::bare(Arc::clone(dom.empty_type()), Arc::clone(dom.allocator()))
    }

    /// An empty object with its own byte allocator.
    #[must_use]
    pub fn empty_in(dom: &Domain, alloc: Arc<dyn BufAllocator>) -> Object {
        Object::bare(Arc::clone(dom.empty_type()), alloc)
    }

    /// An object of `ty` with every mixin default-constructed.
    pub fn with_type(ty: &Arc<Type>) -> Result<Object, ObjectError> {
        let dom = ty
            .domain_inner()
            .ok_or(ObjectError::DomainGone { op: "create" })?;
        Object::with_type_in(ty, Arc::clone(dom.allocator()))
    }

    /// Like [`with_type`](Object::with_type) with a caller-chosen byte
    /// allocator for the arena and external buffers.
    pub fn with_type_in(ty: &Arc<Type>, alloc: Arc<dyn BufAllocator>) -> Result<Object, ObjectError> {
        let dom = ty
            .domain_inner()
            .ok_or(ObjectError::DomainGone { op: "create" })?;
        let mut obj = Object::bare(Arc::clone(dom.empty_type()), alloc);
        let mut tr = ObjectMutation::begin(&mut obj, Arc::clone(ty), "create")?;
        tr.fill_defaults()?;
        tr.finalize()?;
        Ok(obj)
    }

    // ===================================================================
    // Re-typing
    // ===================================================================

    /// Start a mutation transaction toward `target`.
    pub fn mutate_to(&mut self, target: &Arc<Type>) -> Result<ObjectMutation<'_>, ObjectError> {
        ObjectMutation::begin(self, Arc::clone(target), "mutate")
    }

    /// Re-type to `target`: new mixins default-construct, shared ones keep
    /// their values, removed ones are destroyed.
    pub fn reset_type(&mut self, target: &Arc<Type>) -> Result<(), ObjectError> {
        let mut tr = ObjectMutation::begin(self, Arc::clone(target), "reset")?;
        tr.fill_defaults()?;
        tr.finalize()
    }

    /// Destroy every mixin and fall back to the domain's empty type.
    pub fn clear(&mut self) -> Result<(), ObjectError> {
        if self.ty.num_mixins() == 0 {
            if self.sealed {
                return Err(ObjectError::Sealed {
                    domain: Arc::clone(self.ty.domain_name()),
                    op: "clear",
                    ty: self.ty.to_string(),
                });
            }
            return Ok(());
        }
        let dom = self
            .ty
            .domain_inner()
            .ok_or(ObjectError::DomainGone { op: "clear" })?;
        let empty = Arc::clone(dom.empty_type());
        let tr = ObjectMutation::begin(self, empty, "clear")?;
        tr.finalize()
    }

    /// Move the whole composition out, leaving this object empty.
    pub fn take(&mut self) -> Result<Object, ObjectError> {
        if self.sealed {
            return Err(ObjectError::Sealed {
                domain: Arc::clone(self.ty.domain_name()),
                op: "take",
                ty: self.ty.to_string(),
            });
        }
        let dom = self
            .ty
            .domain_inner()
            .ok_or(ObjectError::DomainGone { op: "take" })?;
        let replacement = Object::bare(Arc::clone(dom.empty_type()), Arc::clone(&self.alloc));
        Ok(mem::replace(self, replacement))
    }

    // ===================================================================
    // Copying
    // ===================================================================

    /// Copy-construct a new object of the same type. The copy is unsealed
    /// even when this object is sealed.
    pub fn copy(&self) -> Result<Object, ObjectError> {
        self.copy_in(Arc::clone(&self.alloc))
    }

    /// [`copy`](Object::copy) with a caller-chosen byte allocator.
    pub fn copy_in(&self, alloc: Arc<dyn BufAllocator>) -> Result<Object, ObjectError> {
        // every mixin must be copy-constructible before anything runs
        let mut copies: Vec<CopyFn> = Vec::with_capacity(self.ty.num_mixins());
        for info in self.ty.mixins() {
            match info.copy_init() {
                CopyCap::Fn(f) => copies.push(f),
                CopyCap::None => {
                    return Err(ObjectError::MissingCopyInit {
                        domain: Arc::clone(self.ty.domain_name()),
                        ty: self.ty.to_string(),
                        mixin: Arc::clone(info.name()),
                    });
                }
            }
        }
        let (arena, slots) = storage::build_slots(&self.ty, &*alloc)?;
        for (i, info) in self.ty.mixins().iter().enumerate() {
            // SAFETY: dst is raw storage of this mixin's layout, src is the
            // live source payload
            let res = unsafe { copies[i](info, slots[i].payload, self.slots[i].payload) };
            if let Err(source) = res {
                for j in (0..i).rev() {
                    // SAFETY: payloads below i were constructed in this loop
                    unsafe { storage::destroy_payload(&self.ty.mixins()[j], slots[j].payload) };
                }
                // SAFETY: build_slots produced these for this allocator
                unsafe { storage::release_slots(&self.ty, arena, &slots, &*alloc) };
                return Err(ObjectError::LifecycleFailed {
                    domain: Arc::clone(self.ty.domain_name()),
                    op: "copy into",
                    ty: self.ty.to_string(),
                    mixin: Arc::clone(info.name()),
                    source,
                });
            }
        }
        Ok(Object::from_parts(Arc::clone(&self.ty), arena, slots, alloc))
    }

    /// Make this object a copy of `src`, re-typing as needed: shared mixins
    /// copy-assign, new ones copy-construct, removed ones are destroyed.
    ///
    /// Capabilities are checked up front. If a copy function itself fails
    /// the transaction rolls back the re-typing, but shared mixins assigned
    /// before the failure keep the copied values.
    pub fn copy_from(&mut self, src: &Object) -> Result<(), ObjectError> {
        if src.ty.domain_serial() != self.ty.domain_serial() {
            return Err(ObjectError::ForeignType {
                domain: Arc::clone(self.ty.domain_name()),
                other: Arc::clone(src.ty.domain_name()),
            });
        }
        let mut copies: Vec<CopyFn> = Vec::with_capacity(src.ty.num_mixins());
        for info in src.ty.mixins() {
            let common = self.ty.position_of(info).is_some();
            let cap = if common {
                info.copy_asgn()
            } else {
                info.copy_init()
            };
            match cap {
                CopyCap::Fn(f) => copies.push(f),
                CopyCap::None if common => {
                    return Err(ObjectError::MissingCopyAssign {
                        domain: Arc::clone(self.ty.domain_name()),
                        ty: src.ty.to_string(),
                        mixin: Arc::clone(info.name()),
                    });
                }
                CopyCap::None => {
                    return Err(ObjectError::MissingCopyInit {
                        domain: Arc::clone(self.ty.domain_name()),
                        ty: src.ty.to_string(),
                        mixin: Arc::clone(info.name()),
                    });
                }
            }
        }
        let mut tr = ObjectMutation::begin(self, Arc::clone(&src.ty), "copy over")?;
        for i in 0..src.ty.num_mixins() {
            tr.update_at(i as MixinIndex, |step| {
                // SAFETY: the function picked above is a copy-init when the
                // step is new (payload is raw storage) and a copy-assign when
                // carried (payload is live); src's payload is only read
                unsafe { copies[i](step.info, step.payload, src.slots[i].payload) }
            })?;
        }
        tr.finalize()
    }

    /// Copy-assign every mixin both objects share; the composition does not
    /// change.
    ///
    /// This is a value-level operation with a weaker guarantee: there is no
    /// rollback, so a failing assign leaves earlier assigns in place.
    pub fn copy_matching_from(&mut self, src: &Object) -> Result<(), ObjectError> {
        for info in src.ty.mixins() {
            if self.ty.position_of(info).is_some() && !info.copy_asgn().available() {
                return Err(ObjectError::MissingCopyAssign {
                    domain: Arc::clone(self.ty.domain_name()),
                    ty: self.ty.to_string(),
                    mixin: Arc::clone(info.name()),
                });
            }
        }
        for (si, info) in src.ty.mixins().iter().enumerate() {
            let Some(di) = self.ty.position_of(info) else {
                continue;
            };
            if let CopyCap::Fn(f) = info.copy_asgn() {
                // SAFETY: both payloads are live and of this mixin's layout
                unsafe { f(info, self.slots[di as usize].payload, src.slots[si].payload) }
                    .map_err(|source| ObjectError::LifecycleFailed {
                        domain: Arc::clone(self.ty.domain_name()),
                        op: "copy matching",
                        ty: self.ty.to_string(),
                        mixin: Arc::clone(info.name()),
                        source,
                    })?;
            }
        }
        Ok(())
    }

    /// Swap the payloads of every mixin both objects share; neither
    /// composition changes.
    ///
    /// Relocation-based moves leave no moved-from state behind, so the
    /// source receives this object's old values. External buffers hand over
    /// whole when the mixin has its own allocator or both objects share one;
    /// otherwise payloads relocate through a scratch block.
    pub fn move_matching_from(&mut self, src: &mut Object) -> Result<(), ObjectError> {
        for info in src.ty.mixins() {
            if self.ty.position_of(info).is_none() {
                continue;
            }
            let swappable = info.external()
                && (info.allocator().is_some() || Arc::ptr_eq(&self.alloc, &src.alloc));
            if !swappable && matches!(info.relocate(), MoveCap::None) {
                return Err(ObjectError::MissingMove {
                    domain: Arc::clone(self.ty.domain_name()),
                    ty: self.ty.to_string(),
                    mixin: Arc::clone(info.name()),
                });
            }
        }
        for (si, info) in src.ty.mixins().iter().enumerate() {
            let Some(di) = self.ty.position_of(info) else {
                continue;
            };
            let di = di as usize;
            if info.external()
                && (info.allocator().is_some() || Arc::ptr_eq(&self.alloc, &src.alloc))
            {
                // buffer handoff, ownership flags travel with the slots
                mem::swap(&mut self.slots[di], &mut src.slots[si]);
                continue;
            }
            if info.size() == 0 {
                continue;
            }
            let layout = storage::mixin_layout(info);
            let tmp = self
                .alloc
                .alloc(layout)
                .ok_or_else(|| ObjectError::AllocFailed {
                    mixin: Some(Arc::clone(info.name())),
                })?;
            // SAFETY: tmp is raw storage of the mixin's layout and both slot
            // payloads are live; after three relocations both are live again
            unsafe {
                storage::relocate_payload(info, tmp, self.slots[di].payload);
                storage::relocate_payload(info, self.slots[di].payload, src.slots[si].payload);
                storage::relocate_payload(info, src.slots[si].payload, tmp);
                self.alloc.dealloc(tmp, layout);
            }
        }
        Ok(())
    }

    // ===================================================================
    // Value comparisons
    // ===================================================================

    /// Deep equality: same type and every payload equal.
    ///
    /// A mixin with neither an equality nor an ordering capability makes
    /// any two objects of its type unequal.
    #[must_use]
    pub fn equals(&self, other: &Object) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if !Arc::ptr_eq(&self.ty, &other.ty) {
            return false;
        }
        for (i, info) in self.ty.mixins().iter().enumerate() {
            let a = self.slots[i].payload;
            let b = other.slots[i].payload;
            // SAFETY: both payloads are live and of this mixin's layout
            let same = match (info.equals(), info.compare()) {
                (EqCap::Fn(eq), _) => unsafe { eq(info, a, b) },
                (EqCap::None, CmpCap::Fn(cmp)) => (unsafe { cmp(info, a, b) }) == Ordering::Equal,
                (EqCap::None, CmpCap::None) => false,
            };
            if !same {
                return false;
            }
        }
        true
    }

    /// Total order: first by type, then payload by payload.
    ///
    /// Fails on the first mixin without an ordering capability.
    pub fn compare(&self, other: &Object) -> Result<Ordering, CompareError> {
        if std::ptr::eq(self, other) {
            return Ok(Ordering::Equal);
        }
        let by_type = self.ty.compare(&other.ty);
        if by_type != Ordering::Equal {
            return Ok(by_type);
        }
        for (i, info) in self.ty.mixins().iter().enumerate() {
            let CmpCap::Fn(cmp) = info.compare() else {
                return Err(CompareError {
                    domain: Arc::clone(self.ty.domain_name()),
                    ty: self.ty.to_string(),
                    mixin: Arc::clone(info.name()),
                });
            };
            // SAFETY: both payloads are live and of this mixin's layout
            let ord = unsafe { cmp(info, self.slots[i].payload, other.slots[i].payload) };
            if ord != Ordering::Equal {
                return Ok(ord);
            }
        }
        Ok(Ordering::Equal)
    }

    // ===================================================================
    // Payload access
    // ===================================================================

    /// Reference to the first mixin payload stored as `T`.
    #[must_use]
    pub fn get<T: 'static>(&self) -> Option<&T> {
        let want = TypeId::of::<T>();
        let i = self
            .ty
            .mixins()
            .iter()
            .position(|m| m.stored_type() == Some(want))?;
        // SAFETY: the descriptor pins this payload's type to T
        Some(unsafe { self.slots[i].payload.cast::<T>().as_ref() })
    }

    /// Mutable reference to the first mixin payload stored as `T`.
    #[must_use]
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        let want = TypeId::of::<T>();
        let i = self
            .ty
            .mixins()
            .iter()
            .position(|m| m.stored_type() == Some(want))?;
        // SAFETY: the descriptor pins this payload's type to T, and &mut
        // self rules out aliases
        Some(unsafe { self.slots[i].payload.cast::<T>().as_mut() })
    }

    /// Payload at a type index, checked against `T`.
    #[must_use]
    pub fn get_at<T: 'static>(&self, index: MixinIndex) -> Option<&T> {
        let info = self.ty.mixin_at(index)?;
        if info.stored_type() != Some(TypeId::of::<T>()) {
            return None;
        }
        // SAFETY: the descriptor pins this payload's type to T
        Some(unsafe { self.slots[index as usize].payload.cast::<T>().as_ref() })
    }

    /// Mutable payload at a type index, checked against `T`.
    #[must_use]
    pub fn get_at_mut<T: 'static>(&mut self, index: MixinIndex) -> Option<&mut T> {
        let info = self.ty.mixin_at(index)?;
        if info.stored_type() != Some(TypeId::of::<T>()) {
            return None;
        }
        // SAFETY: as in get_at, plus &mut self rules out aliases
        Some(unsafe { self.slots[index as usize].payload.cast::<T>().as_mut() })
    }

    /// Payload of the mixin with this name, checked against `T`.
    #[must_use]
    pub fn get_named<T: 'static>(&self, name: &str) -> Option<&T> {
        self.get_at(self.ty.index_of_named(name)?)
    }

    /// Mutable payload of the mixin with this name, checked against `T`.
    #[must_use]
    pub fn get_named_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.get_at_mut(self.ty.index_of_named(name)?)
    }

    // ===================================================================
    // Introspection
    // ===================================================================

    #[must_use]
    pub fn ty(&self) -> &Arc<Type> {
        &self.ty
    }

    #[must_use]
    pub fn num_mixins(&self) -> usize {
        self.ty.num_mixins()
    }

    /// True for objects of the empty type.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ty.num_mixins() == 0
    }

    #[must_use]
    pub fn has(&self, info: &Arc<MixinInfo>) -> bool {
        self.ty.has(info)
    }

    #[must_use]
    pub fn has_id(&self, id: MixinId) -> bool {
        self.ty.has_id(id)
    }

    #[must_use]
    pub fn has_named(&self, name: &str) -> bool {
        self.ty.has_named(name)
    }

    /// Handle to the owning domain, while it exists.
    #[must_use]
    pub fn domain(&self) -> Option<Domain> {
        self.ty.domain()
    }

    #[must_use]
    pub fn allocator(&self) -> &Arc<dyn BufAllocator> {
        &self.alloc
    }

    /// Block every further re-typing of this object; destruction stays
    /// possible, and copies of a sealed object are unsealed.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        for (i, info) in self.ty.mixins().iter().enumerate().rev() {
            // SAFETY: payloads stay live until the object goes away
            unsafe { storage::destroy_payload(info, self.slots[i].payload) };
        }
        // SAFETY: arena and owned buffers came from this object's allocator
        unsafe { storage::release_slots(&self.ty, self.arena, &self.slots, &*self.alloc) };
        self.ty.dec_objects();
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Object({}{})",
            self.ty,
            if self.sealed { ", sealed" } else { "" }
        )
    }
}
