// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for registration, type creation, object mutation and dispatch.
//!
//! Four families mirror the four places an operation can fail: the element
//! registry (`DomainError`), the type-interning engine (`TypeError`), object
//! lifecycle and mutation (`ObjectError`) and feature dispatch
//! (`FeatureError`). Ordering failures get their own tiny `CompareError`.
//!
//! Every failure is reported synchronously through `Result`; the engine never
//! panics on user input.

use std::fmt;
use std::sync::Arc;

/// Boxed error produced by user callbacks (lifecycle functions, mutation
/// rules). Wrapped into the library error that reports the failing step.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which kind of element an operation addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Mixin,
    Feature,
    TypeClass,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Mixin => f.write_str("mixin"),
            ElementKind::Feature => f.write_str("feature"),
            ElementKind::TypeClass => f.write_str("type class"),
        }
    }
}

/// Registration and ownership failures on a domain.
#[derive(Debug)]
pub enum DomainError {
    /// The element already carries a valid id (it is registered somewhere).
    AlreadyRegistered {
        domain: Arc<str>,
        kind: ElementKind,
        name: Arc<str>,
        id: u32,
    },
    /// Elements must have non-empty names.
    EmptyName { domain: Arc<str>, kind: ElementKind },
    /// Another element of this kind already uses the name.
    DuplicateName {
        domain: Arc<str>,
        kind: ElementKind,
        name: Arc<str>,
    },
    /// The domain does not hold this element (wrong domain or never
    /// registered).
    ForeignElement {
        domain: Arc<str>,
        kind: ElementKind,
        name: Arc<str>,
    },
    /// Registering a mixin that is already owned by another domain.
    OwnedElsewhere {
        domain: Arc<str>,
        name: Arc<str>,
        /// Name of the owning domain, if it still exists.
        owner: Option<Arc<str>>,
    },
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::AlreadyRegistered {
                domain,
                kind,
                name,
                id,
            } => {
                write!(
                    f,
                    "{domain}: register {kind} '{name}' with a valid id {id}"
                )
            }
            DomainError::EmptyName { domain, kind } => {
                write!(f, "{domain}: register {kind} with empty name")
            }
            DomainError::DuplicateName { domain, kind, name } => {
                write!(f, "{domain}: register {kind} with duplicate name '{name}'")
            }
            DomainError::ForeignElement { domain, kind, name } => {
                write!(f, "{domain}: foreign {kind} '{name}'")
            }
            DomainError::OwnedElsewhere {
                domain,
                name,
                owner,
            } => {
                write!(f, "{domain}: register mixin '{name}' which has a domain = ")?;
                match owner {
                    Some(o) => write!(f, "'{o}'"),
                    None => f.write_str("<gone>"),
                }
            }
        }
    }
}

impl std::error::Error for DomainError {}

/// Failures while producing or querying an interned type.
#[derive(Debug)]
pub enum TypeError {
    /// The mutation was built against a different domain.
    ForeignMutation {
        domain: Arc<str>,
        mutation: String,
        other: Arc<str>,
    },
    /// A mixin in the mutation is not registered.
    Unregistered {
        domain: Arc<str>,
        mutation: String,
        mixin: Arc<str>,
    },
    /// A mixin in the mutation belongs to another domain.
    ForeignMixin {
        domain: Arc<str>,
        mutation: String,
        mixin: Arc<str>,
        owner: Option<Arc<str>>,
    },
    /// The mutation lists the same mixin more than once.
    DuplicateMixin {
        domain: Arc<str>,
        mutation: String,
        mixin: Arc<str>,
    },
    /// Two implementers of a non-clashing feature tie on bid and priority.
    FeatureClash {
        domain: Arc<str>,
        mutation: String,
        feature: Arc<str>,
        a: Arc<str>,
        b: Arc<str>,
    },
    /// A mutation rule reported failure.
    RuleFailed {
        domain: Arc<str>,
        rule: Arc<str>,
        mutation: String,
        source: BoxedError,
    },
    /// Rule application did not reach a fixed point within the pass budget.
    CyclicRules { domain: Arc<str>, mutation: String },
    /// `is_of` was asked about a type class the domain does not know.
    UnknownTypeClass {
        domain: Arc<str>,
        ty: String,
        name: String,
    },
    /// The owning domain was dropped while the operation needed it.
    DomainGone,
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::ForeignMutation {
                domain,
                mutation,
                other,
            } => {
                write!(
                    f,
                    "{domain}: requested type with foreign mutation {mutation} of domain '{other}'"
                )
            }
            TypeError::Unregistered {
                domain,
                mutation,
                mixin,
            } => {
                write!(f, "{domain}: creating type {mutation}: '{mixin}' unregistered")
            }
            TypeError::ForeignMixin {
                domain,
                mutation,
                mixin,
                owner,
            } => {
                write!(f, "{domain}: foreign mixin '{mixin}' from ")?;
                match owner {
                    Some(o) => write!(f, "'{o}'")?,
                    None => f.write_str("<gone>")?,
                }
                write!(f, " while trying to create type {mutation}")
            }
            TypeError::DuplicateMixin {
                domain,
                mutation,
                mixin,
            } => {
                write!(f, "{domain}: creating type {mutation}: '{mixin}' duplicate")
            }
            TypeError::FeatureClash {
                domain,
                mutation,
                feature,
                a,
                b,
            } => {
                write!(
                    f,
                    "{domain}: feature clash in {mutation} on '{feature}' between '{a}' and '{b}'"
                )
            }
            TypeError::RuleFailed {
                domain,
                rule,
                mutation,
                source,
            } => {
                write!(
                    f,
                    "{domain}: applying mutation rule '{rule}' to {mutation} failed: {source}"
                )
            }
            TypeError::CyclicRules { domain, mutation } => {
                write!(
                    f,
                    "{domain}: rule interdependency too deep or cyclic at {mutation}"
                )
            }
            TypeError::UnknownTypeClass { domain, ty, name } => {
                write!(f, "{domain}: type {ty}: unknown type class '{name}'")
            }
            TypeError::DomainGone => f.write_str("domain no longer exists"),
        }
    }
}

impl std::error::Error for TypeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TypeError::RuleFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Failures of object construction, copying and mutation.
#[derive(Debug)]
pub enum ObjectError {
    /// A re-typing operation hit a sealed object.
    Sealed {
        domain: Arc<str>,
        op: &'static str,
        ty: String,
    },
    /// A mixin without an init capability had to be default-constructed.
    MissingDefaultInit {
        domain: Arc<str>,
        ty: String,
        mixin: Arc<str>,
    },
    /// A mixin without a copy-init capability had to be copy-constructed.
    MissingCopyInit {
        domain: Arc<str>,
        ty: String,
        mixin: Arc<str>,
    },
    /// A mixin without a copy-assign capability had to be assigned over.
    MissingCopyAssign {
        domain: Arc<str>,
        ty: String,
        mixin: Arc<str>,
    },
    /// A mixin payload had to move between objects but supports neither
    /// relocation nor an external buffer handoff.
    MissingMove {
        domain: Arc<str>,
        ty: String,
        mixin: Arc<str>,
    },
    /// A user lifecycle function failed; the mutation was rolled back
    /// (except for the documented weaker matching-copy path).
    LifecycleFailed {
        domain: Arc<str>,
        op: &'static str,
        ty: String,
        mixin: Arc<str>,
        source: BoxedError,
    },
    /// Transaction updates must arrive in ascending mixin-index order.
    OutOfOrderUpdate {
        domain: Arc<str>,
        ty: String,
        index: u32,
    },
    /// Object and target type belong to different domains.
    ForeignType {
        domain: Arc<str>,
        other: Arc<str>,
    },
    /// The transaction was finalized before every target mixin was updated.
    IncompleteMutation { domain: Arc<str>, ty: String },
    /// The byte allocator refused an allocation.
    AllocFailed { mixin: Option<Arc<str>> },
    /// The owning domain was dropped while the operation needed it.
    DomainGone { op: &'static str },
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectError::Sealed { domain, op, ty } => {
                write!(f, "{domain}: {op} sealed object of type {ty}")
            }
            ObjectError::MissingDefaultInit { domain, ty, mixin } => {
                write!(
                    f,
                    "{domain}: mutate object to type {ty}: '{mixin}' missing default init"
                )
            }
            ObjectError::MissingCopyInit { domain, ty, mixin } => {
                write!(
                    f,
                    "{domain}: copy object of type {ty}: '{mixin}' missing copy init"
                )
            }
            ObjectError::MissingCopyAssign { domain, ty, mixin } => {
                write!(
                    f,
                    "{domain}: copy object of type {ty}: '{mixin}' missing copy assign"
                )
            }
            ObjectError::MissingMove { domain, ty, mixin } => {
                write!(
                    f,
                    "{domain}: move between objects of type {ty}: '{mixin}' cannot move"
                )
            }
            ObjectError::LifecycleFailed {
                domain,
                op,
                ty,
                mixin,
                source,
            } => {
                write!(
                    f,
                    "{domain}: {op} object of type {ty}: '{mixin}' failed: {source}"
                )
            }
            ObjectError::OutOfOrderUpdate { domain, ty, index } => {
                write!(
                    f,
                    "{domain}: piecewise mutation out of order at index {index} while mutating to {ty}"
                )
            }
            ObjectError::ForeignType { domain, other } => {
                write!(f, "{domain}: mutate object with type of foreign domain '{other}'")
            }
            ObjectError::IncompleteMutation { domain, ty } => {
                write!(f, "{domain}: finalize incomplete mutation to {ty}")
            }
            ObjectError::AllocFailed { mixin } => match mixin {
                Some(m) => write!(f, "allocation failed for external mixin '{m}'"),
                None => f.write_str("object buffer allocation failed"),
            },
            ObjectError::DomainGone { op } => {
                write!(f, "{op} object: domain no longer exists")
            }
        }
    }
}

impl std::error::Error for ObjectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ObjectError::LifecycleFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// An object comparison reached a mixin with no compare capability.
#[derive(Debug)]
pub struct CompareError {
    pub domain: Arc<str>,
    pub ty: String,
    pub mixin: Arc<str>,
}

impl fmt::Display for CompareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: compare objects of type {}: '{}' missing compare",
            self.domain, self.ty, self.mixin
        )
    }
}

impl std::error::Error for CompareError {}

/// Dispatch failures: a feature call could not be routed.
#[derive(Debug)]
pub enum FeatureError {
    /// No implementer and no default payload.
    NoImplementer { ty: String, feature: Arc<str> },
    /// `next_implementer` walked off the end of the table entry.
    NoNextImplementer {
        ty: String,
        feature: Arc<str>,
        mixin: Arc<str>,
    },
    /// `next_bidder_set` found no lower-bid run.
    NoNextBidderSet {
        ty: String,
        feature: Arc<str>,
        mixin: Arc<str>,
    },
    /// A typed call helper could not downcast the stored payload.
    PayloadType { feature: Arc<str> },
}

impl fmt::Display for FeatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureError::NoImplementer { ty, feature } => {
                write!(f, "type {ty}: no implementer for feature '{feature}'")
            }
            FeatureError::NoNextImplementer { ty, feature, mixin } => {
                write!(
                    f,
                    "type {ty}: no next implementer for feature '{feature}' after '{mixin}'"
                )
            }
            FeatureError::NoNextBidderSet { ty, feature, mixin } => {
                write!(
                    f,
                    "type {ty}: no next bidder set for feature '{feature}' after '{mixin}'"
                )
            }
            FeatureError::PayloadType { feature } => {
                write!(f, "feature '{feature}': payload has unexpected type")
            }
        }
    }
}

impl std::error::Error for FeatureError {}
