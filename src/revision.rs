//! Per-stage revision counters.
//!
//! A counter only ever goes up, and only the quality gate bumps it, for the
//! stage it just rejected. The counts drive the escape valve and feedback
//! numbering.

use crate::payload::StageId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionCounts {
    counts: BTreeMap<StageId, u32>,
}

impl RevisionCounts {
    /// All stages start at zero.
    pub fn new() -> Self {
        Self {
            counts: StageId::ALL.iter().map(|s| (*s, 0)).collect(),
        }
    }

    pub fn get(&self, stage: StageId) -> u32 {
        self.counts.get(&stage).copied().unwrap_or(0)
    }

    /// Record one rejection and return the new count.
    pub fn increment(&mut self, stage: StageId) -> u32 {
        let count = self.counts.entry(stage).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Number the next feedback message for `stage` would carry.
    pub fn next_feedback_number(&self, stage: StageId) -> u32 {
        self.get(stage) + 1
    }

    /// Whether `stage` has used up its revision allowance.
    pub fn is_exhausted(&self, stage: StageId, max_revisions: u32) -> bool {
        self.get(stage) >= max_revisions
    }
}
