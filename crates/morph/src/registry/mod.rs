// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Element registry: the sparse id tables for mixins and features.
//!
//! One registry value lives behind the domain's element-section lock. Ids
//! are sparse slot indices assigned at registration with a lowest-free-slot
//! policy, so unregistering frees the id for the next registration. Name
//! uniqueness is enforced per element kind unless the domain settings allow
//! duplicates; with duplicates allowed, by-name lookup returns the lowest
//! matching id.
//!
//! Registering a mixin auto-registers any unregistered features it
//! references. Those registrations are not rolled back if the mixin itself
//! fails to register afterwards; features are separate elements.


use std::sync::{Arc, Weak};

use crate::desc::{
    FeatureId, FeatureInfo, MixinId, MixinInfo, Owner, INVALID_ID,
};
use crate::error::{DomainError, ElementKind};

/// Registration plumbing shared by both element kinds.
pub(crate) trait Element {
    const KIND: ElementKind;
    fn element_name(&self) -> &Arc<str>;
    fn element_id(&self) -> u32;
    fn element_claim(&self, id: u32, owner: Owner);
    fn element_release(&self);
}

impl Element for MixinInfo {
    const KIND: ElementKind = ElementKind::Mixin;
    fn element_name(&self) -> &Arc<str> {
        self.name()
    }
    fn element_id(&self) -> u32 {
        self.raw_id()
    }
    fn element_claim(&self, id: u32, owner: Owner) {
        self.claim(id, owner);
    }
    fn element_release(&self) {
        self.release();
    }
}

impl Element for FeatureInfo {
    const KIND: ElementKind = ElementKind::Feature;
    fn element_name(&self) -> &Arc<str> {
        self.name()
    }
    fn element_id(&self) -> u32 {
        self.raw_id()
    }
    fn element_claim(&self, id: u32, owner: Owner) {
        self.claim(id, owner);
    }
    fn element_release(&self) {
        self.release();
    }
}

/// Sparse element tables of one domain. Callers hold the element-section
/// lock; nothing in here locks.
pub(crate) struct ElementRegistry {
    domain: Arc<str>,
    serial: u64,
    dom: Weak<crate::domain::DomainInner>,
    allow_dup_mixin_names: bool,
    allow_dup_feature_names: bool,
    mixins: Vec<Option<Arc<MixinInfo>>>,
    features: Vec<Option<Arc<FeatureInfo>>>,
}

impl ElementRegistry {
    pub(crate) fn new(
        domain: Arc<str>,
        serial: u64,
        dom: Weak<crate::domain::DomainInner>,
        allow_dup_mixin_names: bool,
        allow_dup_feature_names: bool,
    ) -> Self {
        ElementRegistry {
            domain,
            serial,
            dom,
            allow_dup_mixin_names,
            allow_dup_feature_names,
            mixins: Vec::new(),
            features: Vec::new(),
        }
    }

    fn owner(&self) -> Owner {
        Owner {
            serial: self.serial,
            name: Arc::clone(&self.domain),
            dom: self.dom.clone(),
        }
    }

    /// Find the lowest free slot (or append one) and claim it for `info`.
    ///
    /// With unique names enforced, the slot scan doubles as the name-clash
    /// check and the empty-name check applies; with duplicates allowed both
    /// are skipped, matching lookup-by-name returning the lowest id.
    fn basic_register<T: Element>(
        domain: &Arc<str>,
        owner: Owner,
        slots: &mut Vec<Option<Arc<T>>>,
        info: &Arc<T>,
        enforce_unique_names: bool,
    ) -> Result<u32, DomainError> {
        if info.element_id() != INVALID_ID {
            return Err(DomainError::AlreadyRegistered {
                domain: Arc::clone(domain),
                kind: T::KIND,
                name: Arc::clone(info.element_name()),
                id: info.element_id(),
            });
        }
        if enforce_unique_names && info.element_name().is_empty() {
            return Err(DomainError::EmptyName {
                domain: Arc::clone(domain),
                kind: T::KIND,
            });
        }

        let mut free = None;
        if enforce_unique_names {
            // reverse scan: checks every name while ending on the lowest
            // free slot
            for i in (0..slots.len()).rev() {
                match &slots[i] {
                    Some(reg) => {
                        debug_assert_eq!(reg.element_id() as usize, i);
                        if reg.element_name() == info.element_name() {
                            return Err(DomainError::DuplicateName {
                                domain: Arc::clone(domain),
                                kind: T::KIND,
                                name: Arc::clone(info.element_name()),
                            });
                        }
                    }
                    None => free = Some(i),
                }
            }
        } else {
            free = slots.iter().position(Option::is_none);
        }

        let id = match free {
            Some(i) => i,
            None => {
                slots.push(None);
                slots.len() - 1
            }
        };
        info.element_claim(id as u32, owner);
        slots[id] = Some(Arc::clone(info));
        Ok(id as u32)
    }

    fn basic_unregister<T: Element>(
        domain: &Arc<str>,
        slots: &mut [Option<Arc<T>>],
        info: &Arc<T>,
    ) -> Result<(), DomainError> {
        let id = info.element_id() as usize;
        match slots.get(id) {
            Some(Some(reg)) if Arc::ptr_eq(reg, info) => {
                slots[id] = None;
                info.element_release();
                Ok(())
            }
            _ => Err(DomainError::ForeignElement {
                domain: Arc::clone(domain),
                kind: T::KIND,
                name: Arc::clone(info.element_name()),
            }),
        }
    }

    pub(crate) fn register_feature(
        &mut self,
        info: &Arc<FeatureInfo>,
    ) -> Result<FeatureId, DomainError> {
        let id = Self::basic_register(
            &self.domain,
            self.owner(),
            &mut self.features,
            info,
            !self.allow_dup_feature_names,
        )?;
        log::debug!(
            "[registry] '{}' registered feature '{}' as {id}",
            self.domain,
            info.name()
        );
        Ok(FeatureId(id))
    }

    pub(crate) fn unregister_feature(
        &mut self,
        info: &Arc<FeatureInfo>,
    ) -> Result<(), DomainError> {
        Self::basic_unregister(&self.domain, &mut self.features, info)?;
        log::debug!(
            "[registry] '{}' unregistered feature '{}'",
            self.domain,
            info.name()
        );
        Ok(())
    }

    pub(crate) fn register_mixin(&mut self, info: &Arc<MixinInfo>) -> Result<MixinId, DomainError> {
        if let Some(owner) = info.owner_serial() {
            if owner != self.serial {
                return Err(DomainError::OwnedElsewhere {
                    domain: Arc::clone(&self.domain),
                    name: Arc::clone(info.name()),
                    owner: info.owner_name(),
                });
            }
        }

        // the mixin's features first; these stay registered even if the
        // mixin itself fails below
        for fi in info.features() {
            let feature = &fi.feature;
            if feature.raw_id() != INVALID_ID {
                if !self.holds_feature(feature) {
                    return Err(DomainError::ForeignElement {
                        domain: Arc::clone(&self.domain),
                        kind: ElementKind::Feature,
                        name: Arc::clone(feature.name()),
                    });
                }
                continue;
            }
            self.register_feature(feature)?;
        }

        let id = Self::basic_register(
            &self.domain,
            self.owner(),
            &mut self.mixins,
            info,
            !self.allow_dup_mixin_names,
        )?;
        log::debug!(
            "[registry] '{}' registered mixin '{}' as {id}",
            self.domain,
            info.name()
        );
        Ok(MixinId(id))
    }

    /// Slot-level removal only; purging types that contain the mixin is the
    /// domain's job and happens while the element lock is still held.
    pub(crate) fn unregister_mixin(&mut self, info: &Arc<MixinInfo>) -> Result<(), DomainError> {
        Self::basic_unregister(&self.domain, &mut self.mixins, info)?;
        log::debug!(
            "[registry] '{}' unregistered mixin '{}'",
            self.domain,
            info.name()
        );
        Ok(())
    }

    pub(crate) fn holds_mixin(&self, info: &Arc<MixinInfo>) -> bool {
        let id = info.raw_id() as usize;
        matches!(self.mixins.get(id), Some(Some(reg)) if Arc::ptr_eq(reg, info))
    }

    pub(crate) fn holds_feature(&self, info: &Arc<FeatureInfo>) -> bool {
        let id = info.raw_id() as usize;
        matches!(self.features.get(id), Some(Some(reg)) if Arc::ptr_eq(reg, info))
    }

    pub(crate) fn mixin(&self, id: MixinId) -> Option<Arc<MixinInfo>> {
        self.mixins.get(id.0 as usize)?.clone()
    }

    pub(crate) fn mixin_named(&self, name: &str) -> Option<Arc<MixinInfo>> {
        self.mixins
            .iter()
            .flatten()
            .find(|m| &**m.name() == name)
            .cloned()
    }

    pub(crate) fn feature(&self, id: FeatureId) -> Option<Arc<FeatureInfo>> {
        self.features.get(id.0 as usize)?.clone()
    }

    pub(crate) fn feature_named(&self, name: &str) -> Option<Arc<FeatureInfo>> {
        self.features
            .iter()
            .flatten()
            .find(|f| &**f.name() == name)
            .cloned()
    }

    pub(crate) fn num_mixins(&self) -> usize {
        self.mixins.iter().flatten().count()
    }

    pub(crate) fn num_features(&self) -> usize {
        self.features.iter().flatten().count()
    }

    /// Registered mixins in id order, cloned out so callbacks can run
    /// without the element lock.
    pub(crate) fn mixins_snapshot(&self) -> Vec<Arc<MixinInfo>> {
        self.mixins.iter().flatten().cloned().collect()
    }

    pub(crate) fn features_snapshot(&self) -> Vec<Arc<FeatureInfo>> {
        self.features.iter().flatten().cloned().collect()
    }
}
