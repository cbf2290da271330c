// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object storage: the arena plus the per-mixin slot table.
//!
//! One object owns at most one arena block (internal payloads packed at
//! their type-computed offsets) and one external buffer per external mixin.
//! Zero-sized payloads get a well-aligned dangling pointer and no
//! allocation. Nothing in here constructs or destroys payloads; callers
//! sequence lifecycle around allocation.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::alloc::BufAllocator;
use crate::desc::{DropCap, MixinInfo, MoveCap};
use crate::error::ObjectError;
use crate::typeset::Type;

/// Where one mixin's payload lives.
#[derive(Clone, Copy)]
pub(crate) struct MixinSlot {
    pub(crate) payload: NonNull<u8>,
    /// Whether this slot owns an external buffer that must be freed.
    pub(crate) owned_external: bool,
}

/// A non-null, well-aligned pointer for zero-sized payloads.
pub(crate) fn dangling_aligned(align: usize) -> NonNull<u8> {
    debug_assert!(align.is_power_of_two());
    // SAFETY: align is a nonzero power of two, so the address is non-null.
    unsafe { NonNull::new_unchecked(align as *mut u8) }
}

fn arena_layout(ty: &Type) -> Layout {
    // the interning engine only produces valid size/align pairs
    Layout::from_size_align(ty.object_buffer_size(), ty.object_buffer_alignment())
        .unwrap_or(Layout::new::<u8>())
}

pub(crate) fn mixin_layout(info: &MixinInfo) -> Layout {
    Layout::from_size_align(info.size(), info.alignment()).unwrap_or(Layout::new::<u8>())
}

/// Allocate the arena block for one object of `ty`, if the type needs one.
pub(crate) fn alloc_arena(
    ty: &Type,
    alloc: &dyn BufAllocator,
) -> Result<Option<NonNull<u8>>, ObjectError> {
    if ty.object_buffer_size() == 0 {
        return Ok(None);
    }
    match alloc.alloc(arena_layout(ty)) {
        Some(ptr) => Ok(Some(ptr)),
        None => Err(ObjectError::AllocFailed { mixin: None }),
    }
}

pub(crate) fn alloc_external(
    info: &Arc<MixinInfo>,
    alloc: &dyn BufAllocator,
) -> Result<NonNull<u8>, ObjectError> {
    debug_assert!(info.size() > 0);
    let ptr = match info.allocator() {
        Some(own) => own.alloc_mixin(info),
        None => alloc.alloc(mixin_layout(info)),
    };
    ptr.ok_or_else(|| ObjectError::AllocFailed {
        mixin: Some(Arc::clone(info.name())),
    })
}

/// # Safety
/// `ptr` must come from [`alloc_external`] for the same mixin and allocator.
pub(crate) unsafe fn free_external(
    info: &Arc<MixinInfo>,
    ptr: NonNull<u8>,
    alloc: &dyn BufAllocator,
) {
    match info.allocator() {
        Some(own) => unsafe { own.dealloc_mixin(ptr, info) },
        None => unsafe { alloc.dealloc(ptr, mixin_layout(info)) },
    }
}

/// Allocate the arena and every slot for one object of `ty`.
///
/// No payload is constructed. On failure everything allocated so far is
/// released again.
pub(crate) fn build_slots(
    ty: &Type,
    alloc: &dyn BufAllocator,
) -> Result<(Option<NonNull<u8>>, Box<[MixinSlot]>), ObjectError> {
    let arena = alloc_arena(ty, alloc)?;

    let mut slots: Vec<MixinSlot> = Vec::with_capacity(ty.num_mixins());
    for (i, info) in ty.mixins().iter().enumerate() {
        let slot = match ty.mixin_offset(i as u32) {
            Some(offset) => MixinSlot {
                payload: match arena {
                    // SAFETY: offset < buf_size by construction of the type
                    Some(base) => unsafe { base.add(offset as usize) },
                    None => dangling_aligned(info.alignment()),
                },
                owned_external: false,
            },
            None if info.size() == 0 => MixinSlot {
                payload: dangling_aligned(info.alignment()),
                owned_external: false,
            },
            None => match alloc_external(info, alloc) {
                Ok(ptr) => MixinSlot {
                    payload: ptr,
                    owned_external: true,
                },
                Err(err) => {
                    // SAFETY: every slot so far came from this allocator
                    unsafe { release_slots(ty, arena, &slots, alloc) };
                    return Err(err);
                }
            },
        };
        slots.push(slot);
    }

    Ok((arena, slots.into_boxed_slice()))
}

/// Release the arena and every owned external buffer.
///
/// # Safety
/// `arena` and `slots` must have been produced by [`build_slots`] (or the
/// mutation staging) for this exact `ty` and `alloc`, and every payload must
/// already be destroyed or moved out.
pub(crate) unsafe fn release_slots(
    ty: &Type,
    arena: Option<NonNull<u8>>,
    slots: &[MixinSlot],
    alloc: &dyn BufAllocator,
) {
    for (i, slot) in slots.iter().enumerate().rev() {
        if slot.owned_external {
            let info = &ty.mixins()[i];
            unsafe { free_external(info, slot.payload, alloc) };
        }
    }
    unsafe { free_arena(ty, arena, alloc) };
}

/// Free just the arena block of a retired slot table.
///
/// # Safety
/// `arena` must have been allocated for `ty` via `alloc`. External buffers
/// the old slots owned must have been freed or handed off already.
pub(crate) unsafe fn free_arena(ty: &Type, arena: Option<NonNull<u8>>, alloc: &dyn BufAllocator) {
    if let Some(base) = arena {
        unsafe { alloc.dealloc(base, arena_layout(ty)) };
    }
}

/// Run the mixin's drop capability on a live payload.
///
/// # Safety
/// `ptr` must point at a live payload of `info`; it is logically
/// uninitialized afterwards.
pub(crate) unsafe fn destroy_payload(info: &MixinInfo, ptr: NonNull<u8>) {
    if let DropCap::Fn(f) = info.destroy() {
        unsafe { f(info, ptr) };
    }
}

/// Relocate a live payload from `src` into uninitialized `dst`; `src` is
/// logically uninitialized afterwards.
///
/// # Safety
/// Both pointers must satisfy the mixin's layout; `src` must hold a live
/// payload, `dst` must be raw storage.
pub(crate) unsafe fn relocate_payload(info: &MixinInfo, dst: NonNull<u8>, src: NonNull<u8>) {
    match info.relocate() {
        MoveCap::Memcpy => unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), info.size());
        },
        MoveCap::Fn(f) => unsafe { f(info, dst, src) },
        // MoveCap::None forces external storage, which never relocates
        MoveCap::None => debug_assert!(false, "relocating a pinned mixin"),
    }
}
