// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte allocation seams.
//!
//! The engine consumes allocators, it does not implement an allocator
//! library: object arenas and external mixin buffers are obtained through
//! [`BufAllocator`], and a mixin may override its own external storage with a
//! [`MixinAllocator`]. The default routes to `std::alloc`.

use std::alloc::Layout;
use std::ptr::NonNull;

use crate::desc::MixinInfo;

/// Raw byte allocator used for object arenas and external mixin buffers.
///
/// Implementations never see zero-sized layouts.
pub trait BufAllocator: Send + Sync {
    /// Allocate `layout.size()` bytes aligned to `layout.align()`, or `None`
    /// if the allocation cannot be served.
    fn alloc(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Release a block previously returned by [`alloc`](Self::alloc).
    ///
    /// # Safety
    /// `ptr` must originate from `self.alloc(layout)` with this exact layout
    /// and must not be used afterwards.
    unsafe fn dealloc(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The default allocator: plain `std::alloc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalBuf;

impl BufAllocator for GlobalBuf {
    fn alloc(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0);
        // SAFETY: layout is non-zero-sized per the trait contract.
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn dealloc(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout);
    }
}

/// Per-mixin override for external mixin storage.
///
/// A mixin carrying one of these is always stored outside the object arena;
/// the buffer handed out must satisfy the mixin's size and alignment.
pub trait MixinAllocator: Send + Sync {
    /// Allocate storage for one payload of `info`.
    fn alloc_mixin(&self, info: &MixinInfo) -> Option<NonNull<u8>>;

    /// Release storage previously returned by
    /// [`alloc_mixin`](Self::alloc_mixin) for the same `info`.
    ///
    /// # Safety
    /// `ptr` must originate from `self.alloc_mixin(info)` and must not be
    /// used afterwards.
    unsafe fn dealloc_mixin(&self, ptr: NonNull<u8>, info: &MixinInfo);
}

impl MixinAllocator for GlobalBuf {
    fn alloc_mixin(&self, info: &MixinInfo) -> Option<NonNull<u8>> {
        let layout = Layout::from_size_align(info.size(), info.alignment()).ok()?;
        self.alloc(layout)
    }

    unsafe fn dealloc_mixin(&self, ptr: NonNull<u8>, info: &MixinInfo) {
        let Ok(layout) = Layout::from_size_align(info.size(), info.alignment()) else {
            return;
        };
        self.dealloc(ptr, layout);
    }
}

/// Round `offset` up to the next multiple of `align` (a power of two).
#[inline]
#[must_use]
pub(crate) fn align_up(offset: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}
