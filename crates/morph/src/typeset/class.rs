// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Named type predicates.

use std::fmt;
use std::sync::Arc;

use super::Type;

type MatchFn = dyn Fn(&Type) -> bool + Send + Sync;

/// A named predicate over types, registered with a domain so it can be
/// resolved by name from `Type::is_of_named`.
pub struct TypeClass {
    name: Arc<str>,
    matches: Box<MatchFn>,
}

impl TypeClass {
    pub fn new<F>(name: &str, matches: F) -> Arc<TypeClass>
    where
        F: Fn(&Type) -> bool + Send + Sync + 'static,
    {
        Arc::new(TypeClass {
            name: Arc::from(name),
            matches: Box::new(matches),
        })
    }

    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    #[must_use]
    pub fn matches(&self, ty: &Type) -> bool {
        (self.matches)(ty)
    }
}

impl fmt::Debug for TypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeClass('{}')", self.name)
    }
}
