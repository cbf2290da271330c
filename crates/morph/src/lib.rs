// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # morph - Runtime Object Composition
//!
//! A pure Rust engine for assembling objects out of independently registered
//! *mixins* at runtime. Mixins declare data, lifecycle capabilities and the
//! *features* they implement; a [`Domain`] interns every distinct mixin
//! combination as an immutable [`Type`] with a precomputed memory layout and
//! feature dispatch table, and [`Object`]s can switch types in place through
//! a transactional mutation protocol with rollback.
//!
//! ## Quick Start
//!
//! ```rust
//! use morph::common::typed;
//! use morph::{dispatch, Domain, FeatureInfo, Object};
//!
//! #[derive(Default)]
//! struct Health { hp: u32 }
//!
//! #[derive(Default)]
//! struct Armor { rating: u32 }
//!
//! fn describe_health(obj: &Object) -> String {
//!     format!("{} hp", obj.get::<Health>().map_or(0, |h| h.hp))
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let domain = Domain::new("game");
//!     let describe = FeatureInfo::named("describe");
//!
//!     let health = typed::<Health>("health")
//!         .with_default()
//!         .implements(&describe, dispatch::func0(describe_health))
//!         .build();
//!     let armor = typed::<Armor>("armor").with_default().build();
//!     domain.register_mixin(&health)?;
//!     domain.register_mixin(&armor)?;
//!
//!     // compose an object at runtime and call a feature on it
//!     let mut obj = Object::with_type(&domain.get_type_of(&[health.clone()])?)?;
//!     if let Some(h) = obj.get_mut::<Health>() {
//!         h.hp = 12;
//!     }
//!     assert_eq!(dispatch::call0::<String>(&obj, &describe)?, "12 hp");
//!
//!     // grow the object in place; the health payload keeps its value
//!     obj.reset_type(&domain.get_type_of(&[health, armor])?)?;
//!     assert_eq!(obj.get::<Armor>().map(|a| a.rating), Some(0));
//!     assert_eq!(dispatch::call0::<String>(&obj, &describe)?, "12 hp");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                           Application                              |
//! |      descriptors (desc) -> Domain -> Object + dispatch calls       |
//! +--------------------------------------------------------------------+
//! |                          Domain facade                             |
//! |   element registry | type section | type classes | settings       |
//! +--------------------------------------------------------------------+
//! |                          Type section                              |
//! |   mutation rules -> interned Type (layout + dispatch table)        |
//! |   LRU query cache | type garbage collection | intern stats         |
//! +--------------------------------------------------------------------+
//! |                          Object layer                              |
//! |   arena storage | mutation transaction | copy / move / compare     |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Domain`] | Owning registry for mixins, features, rules and types |
//! | [`MixinInfo`] | One registrable fragment: layout, capabilities, features |
//! | [`FeatureInfo`] | One dispatchable capability, with optional default payload |
//! | [`Type`] | Immutable interned mixin combination with dispatch table |
//! | [`Object`] | A value of some [`Type`], re-typeable at runtime |
//! | [`ObjectMutation`] | Scoped re-typing transaction, rollback on drop |
//! | [`MutationRule`] | Declarative rewrite applied to every type query |
//!
//! ## Features
//!
//! - **Runtime composition**: add and remove mixins on live objects
//! - **Interned types**: equal mixin lists share one `Arc<Type>`
//! - **Bid/priority dispatch**: overrides, multicast and default payloads
//! - **Transactional mutation**: partial failures roll objects back
//! - **Pluggable allocation**: per-domain and per-mixin allocators
//! - **Type classes**: named predicates over types, queryable per object
//!
//! ## Modules Overview
//!
//! - [`desc`] - mixin/feature descriptors and the typed builder (start here)
//! - [`domain`] - the domain facade
//! - [`typeset`] - interned types, mutation rules, type classes
//! - [`object`] - objects and the mutation transaction
//! - [`dispatch`] - unicast/multicast calling helpers
//! - [`alloc`] - byte and mixin allocator seams
//! - [`error`] - the error taxonomy

/// Byte and per-mixin allocator seams ([`BufAllocator`], [`MixinAllocator`]).
pub mod alloc;
/// Engine constants and per-domain settings.
pub mod config;
/// Mixin and feature descriptors plus the typed descriptor builders.
pub mod desc;
/// Feature dispatch: unicast, multicast and override traversal helpers.
pub mod dispatch;
/// The domain facade over the element and type sections.
pub mod domain;
/// Error taxonomy: domain, type, object and feature errors.
pub mod error;
/// Objects: arena-backed storage and the mutation transaction.
pub mod object;
/// Sparse id registries for registered elements.
pub(crate) mod registry;
/// Interned types, the query cache, mutation rules and type classes.
pub mod typeset;

pub use alloc::{BufAllocator, GlobalBuf, MixinAllocator};
pub use config::DomainSettings;
pub use desc::{common, FeatureId, FeatureInfo, MixinId, MixinIndex, MixinInfo, Payload};
pub use domain::Domain;
pub use error::{
    BoxedError, CompareError, DomainError, ElementKind, FeatureError, ObjectError, TypeError,
};
pub use object::{MutationStep, Object, ObjectMutation};
pub use typeset::{InternStats, MutationRule, Type, TypeClass, TypeMutation};

/// Crate version string.
pub const VERSION: &str = "0.3.2";
