// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatch table construction.
//!
//! Collects every feature implementation of an ordered mixin list into one
//! dense row store plus per-feature ranges. The sort key decides dispatch:
//! descending bid, then ascending priority, then descending mixin index, so
//! on a full tie the later-declared mixin wins. Two implementers tying on
//! both bid and priority are a clash unless the feature allows them.

use std::sync::Arc;

use crate::desc::{MixinIndex, MixinInfo};
use crate::error::TypeError;

use super::{mixin_list_display, Implementer, ImplementerRange};

/// Build the dispatch rows and the feature-id-indexed range table.
pub(crate) fn build(
    domain: &Arc<str>,
    mixins: &[Arc<MixinInfo>],
) -> Result<(Vec<Implementer>, Vec<Option<ImplementerRange>>), TypeError> {
    let mut rows = Vec::new();
    let mut ftable_len = 0_usize;

    for (index, mixin) in mixins.iter().enumerate() {
        for fi in mixin.features() {
            // registering the mixin registered its features too
            debug_assert!(fi.feature.registered());
            let id = fi.feature.raw_id() as usize;
            ftable_len = ftable_len.max(id + 1);
            rows.push(Implementer {
                feature: Arc::clone(&fi.feature),
                payload: Arc::clone(&fi.payload),
                bid: fi.bid,
                priority: fi.priority,
                mixin_index: index as MixinIndex,
            });
        }
    }

    rows.sort_by(|a, b| {
        a.feature
            .raw_id()
            .cmp(&b.feature.raw_id())
            .then_with(|| b.bid.cmp(&a.bid))
            .then_with(|| a.priority.cmp(&b.priority))
            .then_with(|| b.mixin_index.cmp(&a.mixin_index))
    });

    let mut ranges: Vec<Option<ImplementerRange>> = vec![None; ftable_len];
    let mut start = 0_usize;
    while start < rows.len() {
        let feature = Arc::clone(&rows[start].feature);
        let fid = feature.raw_id() as usize;
        let mut end = start + 1;
        while end < rows.len() && rows[end].feature.raw_id() as usize == fid {
            end += 1;
        }

        if !feature.allow_clashes() {
            for i in start..end - 1 {
                let (cur, next) = (&rows[i], &rows[i + 1]);
                if cur.bid == next.bid && cur.priority == next.priority {
                    return Err(TypeError::FeatureClash {
                        domain: Arc::clone(domain),
                        mutation: mixin_list_display(mixins),
                        feature: Arc::clone(feature.name()),
                        a: Arc::clone(mixins[cur.mixin_index as usize].name()),
                        b: Arc::clone(mixins[next.mixin_index as usize].name()),
                    });
                }
            }
        }

        let mut top_bid_back = start;
        while top_bid_back + 1 < end && rows[top_bid_back + 1].bid == rows[start].bid {
            top_bid_back += 1;
        }

        ranges[fid] = Some(ImplementerRange {
            begin: start as u32,
            top_bid_back: top_bid_back as u32,
            end: end as u32,
        });
        start = end;
    }

    Ok((rows, ranges))
}
