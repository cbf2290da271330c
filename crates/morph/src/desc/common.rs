// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed mixin builders.
//!
//! [`typed`] derives layout and lifecycle capabilities from a concrete Rust
//! type; the opt-in methods wire `Default`, `Clone`, `PartialEq` and `Ord`
//! impls into the corresponding capability slots through monomorphized
//! shims. [`marker`] covers the common zero-sized tag mixin.

use std::alloc::Layout;
use std::any::TypeId;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::alloc::MixinAllocator;
use crate::error::BoxedError;

use super::{
    CmpCap, CopyCap, DropCap, EqCap, FeatureInfo, InitCap, InitFn, MixinBuilder, MixinInfo,
    Payload,
};

/// Wrap a value into an erased feature payload.
pub fn payload<T: Send + Sync + 'static>(value: T) -> Payload {
    Arc::new(value)
}

/// Start a mixin descriptor for payloads of type `T`.
///
/// Layout, relocation and destruction come from the type itself; everything
/// else is opt-in so the descriptor never claims a capability `T` does not
/// implement.
pub fn typed<T: Send + 'static>(name: &str) -> TypedBuilder<T> {
    let layout = Layout::new::<T>();
    let mut inner = MixinInfo::builder(name).size_align(layout.size(), layout.align());
    if mem::needs_drop::<T>() {
        inner = inner.destroy(DropCap::Fn(drop_shim::<T>));
    }
    inner.type_id = Some(TypeId::of::<T>());
    TypedBuilder {
        inner,
        _marker: PhantomData,
    }
}

/// Zero-sized tag mixin with every lifecycle capability.
#[must_use]
pub fn marker(name: &str) -> Arc<MixinInfo> {
    typed::<()>(name)
        .with_default()
        .cloneable()
        .with_eq()
        .with_ord()
        .build()
}

/// Mixin builder bound to a payload type.
pub struct TypedBuilder<T> {
    inner: MixinBuilder,
    _marker: PhantomData<T>,
}

impl<T: Send + 'static> TypedBuilder<T> {
    /// Default-construct missing payloads from `T::default`.
    #[must_use]
    pub fn with_default(mut self) -> Self
    where
        T: Default,
    {
        self.inner = self.inner.init(InitCap::Fn(default_shim::<T>));
        self
    }

    /// Custom fallible construction instead of `T::default`.
    #[must_use]
    pub fn init_with(mut self, f: InitFn) -> Self {
        self.inner = self.inner.init(InitCap::Fn(f));
        self
    }

    /// Copy payloads with `T::clone` (both copy-init and copy-assign).
    #[must_use]
    pub fn cloneable(mut self) -> Self
    where
        T: Clone,
    {
        self.inner = self
            .inner
            .copy_init(CopyCap::Fn(clone_init_shim::<T>))
            .copy_asgn(CopyCap::Fn(clone_asgn_shim::<T>));
        self
    }

    /// Compare payloads with `T::eq`.
    #[must_use]
    pub fn with_eq(mut self) -> Self
    where
        T: PartialEq,
    {
        self.inner = self.inner.equals(EqCap::Fn(eq_shim::<T>));
        self
    }

    /// Order payloads with `T::cmp`.
    #[must_use]
    pub fn with_ord(mut self) -> Self
    where
        T: Ord,
    {
        self.inner = self.inner.compare(CmpCap::Fn(cmp_shim::<T>));
        self
    }

    /// See [`MixinBuilder::implements`].
    #[must_use]
    pub fn implements(mut self, feature: &Arc<FeatureInfo>, payload: Payload) -> Self {
        self.inner = self.inner.implements(feature, payload);
        self
    }

    /// See [`MixinBuilder::implements_with`].
    #[must_use]
    pub fn implements_with(
        mut self,
        feature: &Arc<FeatureInfo>,
        payload: Payload,
        bid: i32,
        priority: i32,
    ) -> Self {
        self.inner = self.inner.implements_with(feature, payload, bid, priority);
        self
    }

    /// See [`MixinBuilder::dependency`].
    #[must_use]
    pub fn dependency(mut self, dep: bool) -> Self {
        self.inner = self.inner.dependency(dep);
        self
    }

    /// See [`MixinBuilder::order_priority`].
    #[must_use]
    pub fn order_priority(mut self, prio: i32) -> Self {
        self.inner = self.inner.order_priority(prio);
        self
    }

    /// See [`MixinBuilder::force_external`].
    #[must_use]
    pub fn force_external(mut self) -> Self {
        self.inner = self.inner.force_external();
        self
    }

    /// See [`MixinBuilder::allocator`].
    #[must_use]
    pub fn allocator(mut self, alloc: Arc<dyn MixinAllocator>) -> Self {
        self.inner = self.inner.allocator(alloc);
        self
    }

    /// See [`MixinBuilder::user_data`].
    #[must_use]
    pub fn user_data(mut self, data: u64) -> Self {
        self.inner = self.inner.user_data(data);
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<MixinInfo> {
        self.inner.build()
    }
}

// =======================================================================
// Monomorphized capability shims
// =======================================================================

unsafe fn default_shim<T: Default>(
    _info: &MixinInfo,
    dst: NonNull<u8>,
) -> Result<(), BoxedError> {
    unsafe { dst.cast::<T>().as_ptr().write(T::default()) };
    Ok(())
}

unsafe fn clone_init_shim<T: Clone>(
    _info: &MixinInfo,
    dst: NonNull<u8>,
    src: NonNull<u8>,
) -> Result<(), BoxedError> {
    let value = unsafe { src.cast::<T>().as_ref() }.clone();
    unsafe { dst.cast::<T>().as_ptr().write(value) };
    Ok(())
}

unsafe fn clone_asgn_shim<T: Clone>(
    _info: &MixinInfo,
    dst: NonNull<u8>,
    src: NonNull<u8>,
) -> Result<(), BoxedError> {
    let src = unsafe { src.cast::<T>().as_ref() };
    unsafe { dst.cast::<T>().as_mut() }.clone_from(src);
    Ok(())
}

unsafe fn drop_shim<T>(_info: &MixinInfo, ptr: NonNull<u8>) {
    unsafe { std::ptr::drop_in_place(ptr.cast::<T>().as_ptr()) };
}

unsafe fn eq_shim<T: PartialEq>(_info: &MixinInfo, a: NonNull<u8>, b: NonNull<u8>) -> bool {
    unsafe { a.cast::<T>().as_ref() == b.cast::<T>().as_ref() }
}

unsafe fn cmp_shim<T: Ord>(_info: &MixinInfo, a: NonNull<u8>, b: NonNull<u8>) -> Ordering {
    unsafe { a.cast::<T>().as_ref().cmp(b.cast::<T>().as_ref()) }
}
