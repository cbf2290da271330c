// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Feature dispatch.
//!
//! Selection is precomputed on [`Type`]: each feature maps to a sorted run
//! of implementers whose first entry wins unicast dispatch and whose top-bid
//! slice forms the multicast set. This module turns a selected entry into a
//! call. Payloads are plain function pointers stored type-erased in
//! [`Payload`] and recovered with a checked downcast, so a mismatched call
//! shape is an error, not undefined behavior.
//!
//! Payload functions are object-first: `fn(&Object, args…) -> R` or
//! `fn(&mut Object, args…) -> R`. An implementer reaches its own state
//! through the object's typed accessors. A feature's default payload has
//! the same shape and covers types with no entry at all. Helpers with more
//! than two arguments are not stamped out; pass a tuple through the unary
//! flavor instead.
//!
//! Every helper clones the object's type handle up front, so a payload that
//! re-types the object mid-call still finishes the current dispatch against
//! the table it started with.

use std::sync::Arc;

use crate::desc::{FeatureInfo, MixinInfo, Payload};
use crate::error::FeatureError;
use crate::object::Object;
use crate::typeset::{ImplementerRange, Type};

// =======================================================================
// Payload constructors
// =======================================================================

/// Erase a nullary payload function.
pub fn func0<R: 'static>(f: fn(&Object) -> R) -> Payload {
    Arc::new(f)
}

/// Erase a unary payload function.
pub fn func1<A: 'static, R: 'static>(f: fn(&Object, A) -> R) -> Payload {
    Arc::new(f)
}

/// Erase a binary payload function.
pub fn func2<A: 'static, B: 'static, R: 'static>(f: fn(&Object, A, B) -> R) -> Payload {
    Arc::new(f)
}

/// Erase a nullary payload function that mutates the object.
pub fn func0_mut<R: 'static>(f: fn(&mut Object) -> R) -> Payload {
    Arc::new(f)
}

/// Erase a unary payload function that mutates the object.
pub fn func1_mut<A: 'static, R: 'static>(f: fn(&mut Object, A) -> R) -> Payload {
    Arc::new(f)
}

// =======================================================================
// Selection
// =======================================================================

/// The payload a unicast call of `feature` would invoke on `ty`.
///
/// The winning implementer when the type has an entry, otherwise the
/// feature's default payload.
pub fn unicast_payload(ty: &Type, feature: &Arc<FeatureInfo>) -> Result<Payload, FeatureError> {
    if let Some(range) = feature.id().and_then(|id| ty.ftable_at(id)) {
        return Ok(Arc::clone(&ty.implementers()[range.begin as usize].payload));
    }
    match feature.default_payload() {
        Some(p) => Ok(Arc::clone(p)),
        None => Err(no_implementer(ty, feature)),
    }
}

/// The payload ranked immediately after `current`'s own entry.
pub fn next_payload(
    ty: &Type,
    feature: &Arc<FeatureInfo>,
    current: &Arc<MixinInfo>,
) -> Result<Payload, FeatureError> {
    match ty.find_next_implementer(feature, current) {
        Some(imp) => Ok(Arc::clone(&imp.payload)),
        None => Err(FeatureError::NoNextImplementer {
            ty: ty.to_string(),
            feature: Arc::clone(feature.name()),
            mixin: Arc::clone(current.name()),
        }),
    }
}

/// Recover the concrete function type from an erased payload.
pub fn fetch<F: Copy + 'static>(
    feature: &Arc<FeatureInfo>,
    payload: &Payload,
) -> Result<F, FeatureError> {
    payload.downcast_ref::<F>().copied().ok_or_else(|| FeatureError::PayloadType {
        feature: Arc::clone(feature.name()),
    })
}

fn no_implementer(ty: &Type, feature: &Arc<FeatureInfo>) -> FeatureError {
    FeatureError::NoImplementer {
        ty: ty.to_string(),
        feature: Arc::clone(feature.name()),
    }
}

// =======================================================================
// Unicast
// =======================================================================

/// Call the feature's winning implementer with no arguments.
pub fn call0<R: 'static>(obj: &Object, feature: &Arc<FeatureInfo>) -> Result<R, FeatureError> {
    let ty = Arc::clone(obj.ty());
    let f = fetch::<fn(&Object) -> R>(feature, &unicast_payload(&ty, feature)?)?;
    Ok(f(obj))
}

/// Call the feature's winning implementer with one argument.
pub fn call1<A: 'static, R: 'static>(
    obj: &Object,
    feature: &Arc<FeatureInfo>,
    arg: A,
) -> Result<R, FeatureError> {
    let ty = Arc::clone(obj.ty());
    let f = fetch::<fn(&Object, A) -> R>(feature, &unicast_payload(&ty, feature)?)?;
    Ok(f(obj, arg))
}

/// Call the feature's winning implementer with two arguments.
pub fn call2<A: 'static, B: 'static, R: 'static>(
    obj: &Object,
    feature: &Arc<FeatureInfo>,
    a: A,
    b: B,
) -> Result<R, FeatureError> {
    let ty = Arc::clone(obj.ty());
    let f = fetch::<fn(&Object, A, B) -> R>(feature, &unicast_payload(&ty, feature)?)?;
    Ok(f(obj, a, b))
}

/// [`call0`] through a payload that mutates the object.
pub fn call0_mut<R: 'static>(
    obj: &mut Object,
    feature: &Arc<FeatureInfo>,
) -> Result<R, FeatureError> {
    let ty = Arc::clone(obj.ty());
    let f = fetch::<fn(&mut Object) -> R>(feature, &unicast_payload(&ty, feature)?)?;
    Ok(f(obj))
}

/// [`call1`] through a payload that mutates the object.
pub fn call1_mut<A: 'static, R: 'static>(
    obj: &mut Object,
    feature: &Arc<FeatureInfo>,
    arg: A,
) -> Result<R, FeatureError> {
    let ty = Arc::clone(obj.ty());
    let f = fetch::<fn(&mut Object, A) -> R>(feature, &unicast_payload(&ty, feature)?)?;
    Ok(f(obj, arg))
}

// =======================================================================
// Multicast
// =======================================================================

/// Call every implementer in the feature's top-bid run exactly once.
///
/// Entries above the winner run back-to-front, results discarded: higher
/// priority values first, priority ties in mixin order. The winner runs
/// last and provides the result. Falls back to the default payload like
/// unicast.
pub fn multicast0<R: 'static>(obj: &Object, feature: &Arc<FeatureInfo>) -> Result<R, FeatureError> {
    let ty = Arc::clone(obj.ty());
    match feature.id().and_then(|id| ty.ftable_at(id)) {
        Some(range) => group_call0(obj, &ty, feature, range),
        None => {
            let f = fetch::<fn(&Object) -> R>(feature, &default_of(&ty, feature)?)?;
            Ok(f(obj))
        }
    }
}

/// [`multicast0`] with one argument, cloned for every non-final call.
pub fn multicast1<A: Clone + 'static, R: 'static>(
    obj: &Object,
    feature: &Arc<FeatureInfo>,
    arg: A,
) -> Result<R, FeatureError> {
    let ty = Arc::clone(obj.ty());
    match feature.id().and_then(|id| ty.ftable_at(id)) {
        Some(range) => group_call1(obj, &ty, feature, range, arg),
        None => {
            let f = fetch::<fn(&Object, A) -> R>(feature, &default_of(&ty, feature)?)?;
            Ok(f(obj, arg))
        }
    }
}

/// [`multicast0`] through payloads that mutate the object.
pub fn multicast0_mut<R: 'static>(
    obj: &mut Object,
    feature: &Arc<FeatureInfo>,
) -> Result<R, FeatureError> {
    let ty = Arc::clone(obj.ty());
    match feature.id().and_then(|id| ty.ftable_at(id)) {
        Some(range) => {
            let imps = ty.implementers();
            for pos in ((range.begin + 1)..=range.top_bid_back).rev() {
                let f = fetch::<fn(&mut Object) -> R>(feature, &imps[pos as usize].payload)?;
                f(obj);
            }
            let f = fetch::<fn(&mut Object) -> R>(feature, &imps[range.begin as usize].payload)?;
            Ok(f(obj))
        }
        None => {
            let f = fetch::<fn(&mut Object) -> R>(feature, &default_of(&ty, feature)?)?;
            Ok(f(obj))
        }
    }
}

/// [`multicast1`] through payloads that mutate the object.
pub fn multicast1_mut<A: Clone + 'static, R: 'static>(
    obj: &mut Object,
    feature: &Arc<FeatureInfo>,
    arg: A,
) -> Result<R, FeatureError> {
    let ty = Arc::clone(obj.ty());
    match feature.id().and_then(|id| ty.ftable_at(id)) {
        Some(range) => {
            let imps = ty.implementers();
            for pos in ((range.begin + 1)..=range.top_bid_back).rev() {
                let f = fetch::<fn(&mut Object, A) -> R>(feature, &imps[pos as usize].payload)?;
                f(obj, arg.clone());
            }
            let f = fetch::<fn(&mut Object, A) -> R>(feature, &imps[range.begin as usize].payload)?;
            Ok(f(obj, arg))
        }
        None => {
            let f = fetch::<fn(&mut Object, A) -> R>(feature, &default_of(&ty, feature)?)?;
            Ok(f(obj, arg))
        }
    }
}

fn default_of(ty: &Type, feature: &Arc<FeatureInfo>) -> Result<Payload, FeatureError> {
    match feature.default_payload() {
        Some(p) => Ok(Arc::clone(p)),
        None => Err(no_implementer(ty, feature)),
    }
}

fn group_call0<R: 'static>(
    obj: &Object,
    ty: &Type,
    feature: &Arc<FeatureInfo>,
    range: ImplementerRange,
) -> Result<R, FeatureError> {
    let imps = ty.implementers();
    for pos in ((range.begin + 1)..=range.top_bid_back).rev() {
        let f = fetch::<fn(&Object) -> R>(feature, &imps[pos as usize].payload)?;
        f(obj);
    }
    let f = fetch::<fn(&Object) -> R>(feature, &imps[range.begin as usize].payload)?;
    Ok(f(obj))
}

fn group_call1<A: Clone + 'static, R: 'static>(
    obj: &Object,
    ty: &Type,
    feature: &Arc<FeatureInfo>,
    range: ImplementerRange,
    arg: A,
) -> Result<R, FeatureError> {
    let imps = ty.implementers();
    for pos in ((range.begin + 1)..=range.top_bid_back).rev() {
        let f = fetch::<fn(&Object, A) -> R>(feature, &imps[pos as usize].payload)?;
        f(obj, arg.clone());
    }
    let f = fetch::<fn(&Object, A) -> R>(feature, &imps[range.begin as usize].payload)?;
    Ok(f(obj, arg))
}

// =======================================================================
// Override traversal
// =======================================================================

/// Call the implementer ranked immediately after `current`'s own entry.
///
/// This is how an overriding implementer reaches the behavior it shadowed.
pub fn call_next0<R: 'static>(
    obj: &Object,
    feature: &Arc<FeatureInfo>,
    current: &Arc<MixinInfo>,
) -> Result<R, FeatureError> {
    let ty = Arc::clone(obj.ty());
    let f = fetch::<fn(&Object) -> R>(feature, &next_payload(&ty, feature, current)?)?;
    Ok(f(obj))
}

/// [`call_next0`] with one argument.
pub fn call_next1<A: 'static, R: 'static>(
    obj: &Object,
    feature: &Arc<FeatureInfo>,
    current: &Arc<MixinInfo>,
    arg: A,
) -> Result<R, FeatureError> {
    let ty = Arc::clone(obj.ty());
    let f = fetch::<fn(&Object, A) -> R>(feature, &next_payload(&ty, feature, current)?)?;
    Ok(f(obj, arg))
}

/// Execute the bid run below `current`'s own as a multicast.
pub fn next_bidder_set1<A: Clone + 'static, R: 'static>(
    obj: &Object,
    feature: &Arc<FeatureInfo>,
    current: &Arc<MixinInfo>,
    arg: A,
) -> Result<R, FeatureError> {
    let ty = Arc::clone(obj.ty());
    let range = match ty.find_next_bidder_set(feature, current) {
        Some(range) => range,
        None => {
            return Err(FeatureError::NoNextBidderSet {
                ty: ty.to_string(),
                feature: Arc::clone(feature.name()),
                mixin: Arc::clone(current.name()),
            })
        }
    };
    group_call1(obj, &ty, feature, range, arg)
}

// =======================================================================
// Tests
// =======================================================================
