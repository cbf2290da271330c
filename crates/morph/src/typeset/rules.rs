// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mutation rules: domain-wide edits applied to every type proposal.
//!
//! Rules are opaque functions, so the engine cannot order them by their
//! dependencies; instead it applies the whole set repeatedly until a pass
//! changes nothing (a poor man's topological sort with a bounded pass
//! count). Within one pass, rules run by ascending order priority, ties by
//! name and then by registration order.

use std::fmt;
use std::sync::Arc;

use crate::error::BoxedError;

use super::mutation::TypeMutation;
use crate::desc::{canonical_order, MixinInfo};

type ApplyFn = dyn Fn(&mut TypeMutation) -> Result<(), BoxedError> + Send + Sync;

/// A named, prioritized edit of type proposals.
///
/// Managed by handle: adding the same `Arc` twice is one logical
/// registration with a reference count, and removal detaches only when the
/// count reaches zero.
pub struct MutationRule {
    name: Arc<str>,
    order_priority: i32,
    apply: Box<ApplyFn>,
}

impl MutationRule {
    pub fn new<F>(name: &str, order_priority: i32, apply: F) -> Arc<MutationRule>
    where
        F: Fn(&mut TypeMutation) -> Result<(), BoxedError> + Send + Sync + 'static,
    {
        Arc::new(MutationRule {
            name: Arc::from(name),
            order_priority,
            apply: Box::new(apply),
        })
    }

    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Lower priorities run earlier within a pass.
    #[must_use]
    pub fn order_priority(&self) -> i32 {
        self.order_priority
    }

    pub(crate) fn apply(&self, mutation: &mut TypeMutation) -> Result<(), BoxedError> {
        (self.apply)(mutation)
    }
}

impl fmt::Debug for MutationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationRule")
            .field("name", &self.name)
            .field("order_priority", &self.order_priority)
            .finish()
    }
}

/// Dependency rule for a rule-managed mixin: whenever `primary` is part of a
/// proposal, `dependent` is added. Build the dependent with
/// `dependency(true)` so the pre-rule strip removes it everywhere else;
/// without the flag this behaves like [`also_adds`].
#[must_use]
pub fn attaches_to(primary: &Arc<MixinInfo>, dependent: &Arc<MixinInfo>) -> Arc<MutationRule> {
    debug_assert!(
        dependent.dependency(),
        "attaches_to expects a dependency-flagged mixin"
    );
    dependency_rule(primary, dependent)
}

/// Companion rule for a regular mixin: whenever `primary` is part of a
/// proposal, `dependent` is added if missing. Unlike [`attaches_to`] the
/// dependent survives on its own when queried directly.
#[must_use]
pub fn also_adds(primary: &Arc<MixinInfo>, dependent: &Arc<MixinInfo>) -> Arc<MutationRule> {
    dependency_rule(primary, dependent)
}

fn dependency_rule(primary: &Arc<MixinInfo>, dependent: &Arc<MixinInfo>) -> Arc<MutationRule> {
    let name = format!("add '{}' with '{}'", dependent.name(), primary.name());
    let primary = Arc::clone(primary);
    let dependent = Arc::clone(dependent);
    MutationRule::new(&name, 0, move |mutation| {
        if mutation.has(&primary) {
            mutation.add_if_lacking(&dependent);
        }
        Ok(())
    })
}

/// The rule injected by `DomainSettings::canonicalize_types`: runs after
/// every user rule and sorts the final list into canonical mixin order.
pub(crate) fn canonicalize_rule() -> Arc<MutationRule> {
    MutationRule::new("canonicalize types", i32::MAX, |mutation| {
        mutation.mixins_mut().sort_by(canonical_order);
        Ok(())
    })
}
