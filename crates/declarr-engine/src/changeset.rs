// SPDX-License-Identifier: GPL-3.0-or-later

use declarr_domain::ResourceKind;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// One pending operation against a service. The payload is the desired
/// resource serialized to JSON; the engine never looks inside it.
#[derive(Debug, Clone, Serialize)]
pub struct Change {
    pub kind: ResourceKind,
    pub display_name: String,
    /// Present on updates and deletes, always absent on creates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,
    pub payload: Value,
}

/// Output of diffing one or more resource kinds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeSet {
    pub creates: Vec<Change>,
    pub updates: Vec<Change>,
    pub deletes: Vec<Change>,
    /// Display names of desired entries whose key matched a current
    /// resource the tool does not own. No change is emitted for these;
    /// they surface in the pass report instead.
    pub collisions: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletes.len()
    }

    /// Fold another kind's fragment into this set, preserving per-phase
    /// order. Cross-kind ordering is whatever order the caller merges in.
    pub fn merge(&mut self, other: ChangeSet) {
        self.creates.extend(other.creates);
        self.updates.extend(other.updates);
        self.deletes.extend(other.deletes);
        self.collisions.extend(other.collisions);
    }
}

/// A change that failed, with the error the callback returned.
#[derive(Debug)]
pub struct ApplyError {
    pub change: Change,
    pub error: anyhow::Error,
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}: {:#}",
            self.change.kind, self.change.display_name, self.error
        )
    }
}

/// Outcome of executing a ChangeSet. Always returned, even when every
/// change failed; the caller decides what a non-zero failed count means.
#[derive(Debug, Default)]
pub struct ApplyResult {
    pub applied: usize,
    pub failed: usize,
    /// Changes never attempted because the pass was cancelled.
    pub skipped: usize,
    pub errors: Vec<ApplyError>,
}

impl ApplyResult {
    pub fn record_success(&mut self) {
        self.applied += 1;
    }

    pub fn record_failure(&mut self, change: Change, error: anyhow::Error) {
        self.failed += 1;
        self.errors.push(ApplyError { change, error });
    }

    pub fn merge(&mut self, other: ApplyResult) {
        self.applied += other.applied;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }
}
