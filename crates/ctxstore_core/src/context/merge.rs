//! Merge of committed changes into another context.
//!
//! # Responsibility
//! - Reconcile a context's pending edits with a change set another context
//!   has just committed.
//!
//! # Invariants
//! - Committed values win field-by-field; fields the commit did not carry keep
//!   the target's local value.
//! - A committed delete drops the target's pending edit or delete of the key.
//! - Merging never fails; it only touches already-durable data.

use crate::context::Context;
use crate::model::change_set::ChangeSet;
use log::debug;

/// Outcome counters of one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Local pending records that received committed field values.
    pub merged: usize,
    /// Local pending changes dropped in favour of the commit.
    pub discarded: usize,
}

impl MergeReport {
    pub fn is_noop(&self) -> bool {
        self.merged == 0 && self.discarded == 0
    }
}

/// Applies committed change sets to a target context with a fixed
/// commit-trumps-by-property policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeCoordinator;

impl MergeCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// Merges `committed` into `target`'s pending state in one step.
    pub fn merge(&self, target: &mut Context, committed: &ChangeSet) -> MergeReport {
        let mut report = MergeReport::default();
        if committed.is_empty() || !target.has_changes() {
            return report;
        }

        let pending = target.pending_mut();
        for record in committed.upserts() {
            let key = record.key();
            if let Some(local) = pending.upserted_mut(&key) {
                for (field, value) in &record.fields {
                    local.fields.insert(field.clone(), value.clone());
                }
                report.merged += 1;
            } else if pending.is_deleted(&key) {
                pending.discard(&key);
                report.discarded += 1;
            }
        }
        for key in committed.deletes() {
            if pending.discard(key) {
                report.discarded += 1;
            }
        }

        target.refresh_state();
        if !report.is_noop() {
            debug!(
                "event=context_merge module=context status=ok context={} merged={} discarded={}",
                target.kind(),
                report.merged,
                report.discarded
            );
        }
        report
    }
}
