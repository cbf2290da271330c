// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The object mutation transaction.
//!
//! A mutation re-types a live object in three phases: stage (allocate the
//! target arena and external buffers, carry over shared ones), update
//! (visit every target mixin in ascending index order, constructing new
//! payloads and optionally editing carried ones), and finalize (retire the
//! old composition and swap the object over). Dropping the transaction
//! before [`ObjectMutation::finalize`] rolls back every staged effect and
//! leaves the object untouched.
//!
//! When the target type equals the current one the transaction degrades to
//! an in-place visit: nothing is allocated, updates edit live payloads
//! directly, and finalize is a no-op.

use std::mem;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::alloc::BufAllocator;
use crate::desc::{InitCap, MixinIndex, MixinInfo};
use crate::error::{BoxedError, ObjectError};
use crate::typeset::Type;

use super::storage::{self, MixinSlot};
use super::Object;

/// Per-target-mixin transaction state.
enum Staged {
    /// New mixin, payload not constructed yet.
    Pending,
    /// Shared with the old type at this old index; its payload stays live
    /// in the old storage until commit.
    Carried { from: MixinIndex },
    /// New mixin, payload constructed by this transaction.
    Built,
}

/// One mixin handed to an update callback.
pub struct MutationStep<'t> {
    pub info: &'t Arc<MixinInfo>,
    /// For new mixins: raw storage the callback must fill. For carried
    /// mixins: the live payload.
    pub payload: NonNull<u8>,
    pub is_new: bool,
}

/// In-flight re-typing of one object.
///
/// Obtained from [`Object::mutate_to`]. Call [`update_at`] (or
/// [`fill_defaults`]) until every target index is covered, then
/// [`finalize`]. Dropping the value instead rolls back.
///
/// [`update_at`]: ObjectMutation::update_at
/// [`fill_defaults`]: ObjectMutation::fill_defaults
/// [`finalize`]: ObjectMutation::finalize
pub struct ObjectMutation<'a> {
    obj: &'a mut Object,
    target: Arc<Type>,
    op: &'static str,
    same_type: bool,
    staged_arena: Option<NonNull<u8>>,
    staged_slots: Box<[MixinSlot]>,
    staged: Box<[Staged]>,
    /// First target index not yet updated.
    next: MixinIndex,
    committed: bool,
}

impl<'a> ObjectMutation<'a> {
    pub(crate) fn begin(
        obj: &'a mut Object,
        target: Arc<Type>,
        op: &'static str,
    ) -> Result<Self, ObjectError> {
        if obj.sealed {
            return Err(ObjectError::Sealed {
                domain: Arc::clone(obj.ty.domain_name()),
                op,
                ty: obj.ty.to_string(),
            });
        }
        if target.domain_serial() != obj.ty.domain_serial() {
            return Err(ObjectError::ForeignType {
                domain: Arc::clone(obj.ty.domain_name()),
                other: Arc::clone(target.domain_name()),
            });
        }

        if Arc::ptr_eq(&obj.ty, &target) {
            let staged = (0..target.num_mixins())
                .map(|i| Staged::Carried {
                    from: i as MixinIndex,
                })
                .collect();
            return Ok(ObjectMutation {
                obj,
                target,
                op,
                same_type: true,
                staged_arena: None,
                staged_slots: Box::default(),
                staged,
                next: 0,
                committed: false,
            });
        }

        let staged_arena = storage::alloc_arena(&target, &*obj.alloc)?;
        let mut staged_slots: Vec<MixinSlot> = Vec::with_capacity(target.num_mixins());
        let mut staged: Vec<Staged> = Vec::with_capacity(target.num_mixins());
        for (i, info) in target.mixins().iter().enumerate() {
            let carried = obj.ty.position_of(info);
            let slot = match target.mixin_offset(i as MixinIndex) {
                Some(offset) => MixinSlot {
                    payload: match staged_arena {
                        // SAFETY: offsets stay inside the arena by type construction
                        Some(base) => unsafe { base.add(offset as usize) },
                        None => storage::dangling_aligned(info.alignment()),
                    },
                    owned_external: false,
                },
                None => match carried {
                    // external shared with the old type: keep its buffer
                    Some(from) => obj.slots[from as usize],
                    None if info.size() == 0 => MixinSlot {
                        payload: storage::dangling_aligned(info.alignment()),
                        owned_external: false,
                    },
                    None => match storage::alloc_external(info, &*obj.alloc) {
                        Ok(payload) => MixinSlot {
                            payload,
                            owned_external: true,
                        },
                        Err(err) => {
                            // SAFETY: nothing is constructed yet
                            unsafe {
                                release_staged(
                                    &target,
                                    staged_arena,
                                    &staged_slots,
                                    &staged,
                                    &*obj.alloc,
                                );
                            }
                            return Err(err);
                        }
                    },
                },
            };
            staged_slots.push(slot);
            staged.push(match carried {
                Some(from) => Staged::Carried { from },
                None => Staged::Pending,
            });
        }

        // count the staged object so a GC sweep cannot retire the target
        target.inc_objects();
        Ok(ObjectMutation {
            obj,
            target,
            op,
            same_type: false,
            staged_arena,
            staged_slots: staged_slots.into_boxed_slice(),
            staged: staged.into_boxed_slice(),
            next: 0,
            committed: false,
        })
    }

    /// The type this transaction is mutating toward.
    #[must_use]
    pub fn target(&self) -> &Arc<Type> {
        &self.target
    }

    /// True once every target index has been updated.
    #[must_use]
    pub fn complete(&self) -> bool {
        self.next as usize == self.target.num_mixins()
    }

    /// Update the mixin at `index`, default-constructing any new mixins
    /// between the last updated index and this one.
    ///
    /// Updates must arrive in strictly ascending index order. The callback
    /// gets raw storage to fill for a new mixin and the live payload for a
    /// carried one; its error aborts the step and is reported with the
    /// mixin's name.
    pub fn update_at<F>(&mut self, index: MixinIndex, f: F) -> Result<(), ObjectError>
    where
        F: FnOnce(MutationStep<'_>) -> Result<(), BoxedError>,
    {
        if index < self.next || index as usize >= self.target.num_mixins() {
            return Err(ObjectError::OutOfOrderUpdate {
                domain: Arc::clone(self.target.domain_name()),
                ty: self.target.to_string(),
                index,
            });
        }
        while self.next < index {
            self.default_step(self.next)?;
            self.next += 1;
        }
        self.custom_step(index, f)?;
        self.next = index + 1;
        Ok(())
    }

    /// Default-construct every remaining new mixin; carried mixins count as
    /// updated untouched.
    pub fn fill_defaults(&mut self) -> Result<(), ObjectError> {
        while !self.complete() {
            self.default_step(self.next)?;
            self.next += 1;
        }
        Ok(())
    }

    fn default_step(&mut self, index: MixinIndex) -> Result<(), ObjectError> {
        let i = index as usize;
        if matches!(self.staged[i], Staged::Carried { .. }) {
            return Ok(());
        }
        let info = &self.target.mixins()[i];
        let dst = self.staged_slots[i].payload;
        match info.init() {
            InitCap::None => Err(ObjectError::MissingDefaultInit {
                domain: Arc::clone(self.target.domain_name()),
                ty: self.target.to_string(),
                mixin: Arc::clone(info.name()),
            }),
            InitCap::Zero => {
                // SAFETY: dst is this mixin's raw storage
                unsafe { std::ptr::write_bytes(dst.as_ptr(), 0, info.size()) };
                self.staged[i] = Staged::Built;
                Ok(())
            }
            InitCap::Fn(init) => {
                // SAFETY: dst is uninitialized storage of this mixin's layout
                match unsafe { init(info, dst) } {
                    Ok(()) => {
                        self.staged[i] = Staged::Built;
                        Ok(())
                    }
                    Err(source) => Err(ObjectError::LifecycleFailed {
                        domain: Arc::clone(self.target.domain_name()),
                        op: self.op,
                        ty: self.target.to_string(),
                        mixin: Arc::clone(info.name()),
                        source,
                    }),
                }
            }
        }
    }

    fn custom_step<F>(&mut self, index: MixinIndex, f: F) -> Result<(), ObjectError>
    where
        F: FnOnce(MutationStep<'_>) -> Result<(), BoxedError>,
    {
        let i = index as usize;
        let info = &self.target.mixins()[i];
        let (payload, is_new) = match self.staged[i] {
            Staged::Pending => (self.staged_slots[i].payload, true),
            Staged::Carried { from } => (self.obj.slots[from as usize].payload, false),
            Staged::Built => unreachable!("updates advance strictly past built mixins"),
        };
        f(MutationStep {
            info,
            payload,
            is_new,
        })
        .map_err(|source| ObjectError::LifecycleFailed {
            domain: Arc::clone(self.target.domain_name()),
            op: self.op,
            ty: self.target.to_string(),
            mixin: Arc::clone(info.name()),
            source,
        })?;
        if is_new {
            self.staged[i] = Staged::Built;
        }
        Ok(())
    }

    /// Commit: retire the old composition and swap the object to the
    /// target type and storage.
    ///
    /// Walks the old mixins in index order; shared internal payloads
    /// relocate into the new arena, shared external buffers were already
    /// carried at staging, removed mixins are destroyed and their external
    /// buffers freed. Fails without committing if some target index was
    /// never updated, in which case the drop rolls everything back.
    pub fn finalize(mut self) -> Result<(), ObjectError> {
        if !self.complete() {
            return Err(ObjectError::IncompleteMutation {
                domain: Arc::clone(self.target.domain_name()),
                ty: self.target.to_string(),
            });
        }
        self.committed = true;
        if self.same_type {
            return Ok(());
        }

        let old_ty = Arc::clone(&self.obj.ty);
        for (oi, info) in old_ty.mixins().iter().enumerate() {
            let old_slot = self.obj.slots[oi];
            match self.target.position_of(info) {
                Some(ni) if self.target.mixin_offset(ni).is_some() => {
                    // SAFETY: the old payload is live, the staged slot is raw
                    // storage of the same layout
                    unsafe {
                        storage::relocate_payload(
                            info,
                            self.staged_slots[ni as usize].payload,
                            old_slot.payload,
                        );
                    }
                }
                Some(_) => {} // carried external, buffer moved at staging
                None => {
                    // SAFETY: the payload is live and never touched again
                    unsafe { storage::destroy_payload(info, old_slot.payload) };
                    if old_slot.owned_external {
                        // SAFETY: the slot owns this buffer
                        unsafe { storage::free_external(info, old_slot.payload, &*self.obj.alloc) };
                    }
                }
            }
        }
        // SAFETY: every old payload is destroyed or relocated by now, and
        // carried external buffers now live in the staged slots
        unsafe { storage::free_arena(&old_ty, self.obj.arena, &*self.obj.alloc) };

        self.obj.arena = self.staged_arena.take();
        self.obj.slots = mem::take(&mut self.staged_slots);
        self.obj.ty = Arc::clone(&self.target);
        // the staged count from begin() now stands for the live object
        old_ty.dec_objects();
        Ok(())
    }
}

impl Drop for ObjectMutation<'_> {
    fn drop(&mut self) {
        if self.committed || self.same_type {
            // same-type updates edit payloads in place; there is nothing
            // staged to undo
            return;
        }
        for i in (0..self.staged.len()).rev() {
            if matches!(self.staged[i], Staged::Built) {
                let info = &self.target.mixins()[i];
                // SAFETY: Built entries hold payloads this transaction made
                unsafe { storage::destroy_payload(info, self.staged_slots[i].payload) };
            }
        }
        // SAFETY: every built payload is destroyed right above
        unsafe {
            release_staged(
                &self.target,
                self.staged_arena,
                &self.staged_slots,
                &self.staged,
                &*self.obj.alloc,
            );
        }
        self.target.dec_objects();
    }
}

/// Free staging allocations; carried buffers belong to the live object and
/// stay put.
///
/// # Safety
/// Every payload this transaction constructed must already be destroyed.
unsafe fn release_staged(
    target: &Type,
    arena: Option<NonNull<u8>>,
    slots: &[MixinSlot],
    staged: &[Staged],
    alloc: &dyn BufAllocator,
) {
    for i in (0..slots.len()).rev() {
        if matches!(staged[i], Staged::Carried { .. }) {
            continue;
        }
        if slots[i].owned_external {
            unsafe { storage::free_external(&target.mixins()[i], slots[i].payload, alloc) };
        }
    }
    unsafe { storage::free_arena(target, arena, alloc) };
}
