// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mutable type proposals.
//!
//! A [`TypeMutation`] is the working mixin list handed to mutation rules and
//! finally consumed by the interning engine. It stays cheap and unchecked:
//! duplicates are allowed while editing and only rejected when a type is
//! actually created.

use std::fmt;
use std::sync::Arc;

use crate::desc::{FeatureInfo, MixinInfo};

use super::{mixin_list_display, Type};

/// A staged composition: base type plus the edited mixin list.
#[derive(Clone)]
pub struct TypeMutation {
    base: Arc<Type>,
    mixins: Vec<Arc<MixinInfo>>,
}

impl TypeMutation {
    /// Start a mutation from an existing type (often the empty type).
    #[must_use]
    pub fn from_type(base: &Arc<Type>) -> TypeMutation {
        TypeMutation {
            base: Arc::clone(base),
            mixins: base.mixins().to_vec(),
        }
    }

    /// The type this mutation started from.
    #[must_use]
    pub fn base(&self) -> &Arc<Type> {
        &self.base
    }

    #[must_use]
    pub fn mixins(&self) -> &[Arc<MixinInfo>] {
        &self.mixins
    }

    /// Direct access for rules that reorder or rewrite the list wholesale.
    pub fn mixins_mut(&mut self) -> &mut Vec<Arc<MixinInfo>> {
        &mut self.mixins
    }

    pub(crate) fn domain_serial(&self) -> u64 {
        self.base.domain_serial()
    }

    pub(crate) fn domain_name(&self) -> &Arc<str> {
        self.base.domain_name()
    }

    // ===================================================================
    // Edits
    // ===================================================================

    /// Append unconditionally; duplicates surface at type creation.
    pub fn add(&mut self, info: &Arc<MixinInfo>) {
        self.mixins.push(Arc::clone(info));
    }

    /// Append only if absent. Returns whether the list changed.
    pub fn add_if_lacking(&mut self, info: &Arc<MixinInfo>) -> bool {
        if self.has(info) {
            return false;
        }
        self.mixins.push(Arc::clone(info));
        true
    }

    /// Move the mixin to the back, appending it if absent.
    pub fn to_back(&mut self, info: &Arc<MixinInfo>) {
        self.remove(info);
        self.mixins.push(Arc::clone(info));
    }

    /// Remove by handle identity. Returns whether anything was removed.
    pub fn remove(&mut self, info: &Arc<MixinInfo>) -> bool {
        let before = self.mixins.len();
        self.mixins.retain(|m| !Arc::ptr_eq(m, info));
        self.mixins.len() != before
    }

    /// Remove by name. Returns whether anything was removed.
    pub fn remove_named(&mut self, name: &str) -> bool {
        let before = self.mixins.len();
        self.mixins.retain(|m| &**m.name() != name);
        self.mixins.len() != before
    }

    /// Drop duplicate entries, keeping the position of the last occurrence.
    pub fn dedup(&mut self) {
        let mut kept: Vec<Arc<MixinInfo>> = Vec::with_capacity(self.mixins.len());
        for m in self.mixins.iter().rev() {
            if !kept.iter().any(|k| Arc::ptr_eq(k, m)) {
                kept.push(Arc::clone(m));
            }
        }
        kept.reverse();
        self.mixins = kept;
    }

    // ===================================================================
    // Queries
    // ===================================================================

    #[must_use]
    pub fn has(&self, info: &Arc<MixinInfo>) -> bool {
        self.mixins.iter().any(|m| Arc::ptr_eq(m, info))
    }

    #[must_use]
    pub fn has_named(&self, name: &str) -> bool {
        self.mixins.iter().any(|m| &**m.name() == name)
    }

    #[must_use]
    pub fn lacks(&self, info: &Arc<MixinInfo>) -> bool {
        !self.has(info)
    }

    /// Whether any listed mixin implements the feature.
    #[must_use]
    pub fn implements_strong(&self, feature: &Arc<FeatureInfo>) -> bool {
        self.mixins.iter().any(|m| {
            m.features()
                .iter()
                .any(|fi| Arc::ptr_eq(&fi.feature, feature))
        })
    }

    /// True when the mutation adds this mixin over its base type.
    #[must_use]
    pub fn adding(&self, info: &Arc<MixinInfo>) -> bool {
        self.has(info) && !self.base.has(info)
    }

    /// True when the mutation removes this mixin from its base type.
    #[must_use]
    pub fn removing(&self, info: &Arc<MixinInfo>) -> bool {
        self.base.has(info) && !self.has(info)
    }

    /// True when the list is element-wise identical to the base type's.
    #[must_use]
    pub fn noop(&self) -> bool {
        self.mixins.len() == self.base.num_mixins()
            && self
                .mixins
                .iter()
                .zip(self.base.mixins())
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

impl fmt::Display for TypeMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&mixin_list_display(&self.mixins))
    }
}

impl fmt::Debug for TypeMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeMutation({})", mixin_list_display(&self.mixins))
    }
}
