// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Domain configuration.
//!
//! All tunables of a domain live here and are fixed at domain construction;
//! nothing in the engine reads ambient global state.

// =======================================================================
// Engine constants
// =======================================================================

/// Upper bound on mutation-rule fixed-point passes.
///
/// Rules may depend on one another's output, so the engine re-applies the
/// whole rule list until a pass changes nothing. Deeper chains than this are
/// treated as cyclic; sort such rules explicitly via `order_priority`.
pub const MAX_RULE_PASSES: u32 = 5;

/// Default capacity of the per-domain type-query cache.
///
/// A query eviction is invisible apart from re-running mutation rules on the
/// next lookup of that exact mixin list.
pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 1024;

// =======================================================================
// Domain settings
// =======================================================================

/// Behavior switches for a [`Domain`](crate::Domain), fixed at construction.
#[derive(Debug, Clone)]
pub struct DomainSettings {
    /// Sort every created type's mixin list into canonical order, making
    /// `get_type` insensitive to query permutation. Implemented as an
    /// injected maximal-priority mutation rule, so user rules still run
    /// first and see the unsorted list.
    pub canonicalize_types: bool,

    /// Allow two registered features to share a name. Lookups by name return
    /// the one in the lowest slot.
    pub allow_duplicate_feature_names: bool,

    /// Allow two registered mixins to share a name.
    pub allow_duplicate_mixin_names: bool,

    /// Capacity of the type-query cache (entries). Must be non-zero.
    pub query_cache_capacity: usize,
}

impl Default for DomainSettings {
    fn default() -> Self {
        DomainSettings {
            canonicalize_types: false,
            allow_duplicate_feature_names: false,
            allow_duplicate_mixin_names: false,
            query_cache_capacity: DEFAULT_QUERY_CACHE_CAPACITY,
        }
    }
}

impl DomainSettings {
    /// Settings with canonical ordering switched on.
    #[must_use]
    pub fn canonical() -> Self {
        DomainSettings {
            canonicalize_types: true,
            ..Self::default()
        }
    }
}
