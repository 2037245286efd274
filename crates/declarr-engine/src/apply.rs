// SPDX-License-Identifier: GPL-3.0-or-later

//! Phase-ordered apply executor.
//!
//! Creates run first so later updates can reference freshly created
//! resources; deletes run last so nothing still referenced in the same
//! batch disappears early. Failures are isolated per change, and a
//! cancellation stops further calls without discarding what already ran.

use crate::changeset::{ApplyResult, Change, ChangeOp, ChangeSet};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-kind service callbacks. Errors are opaque to the executor; it
/// records success or failure and nothing else. Retry policy belongs to
/// the transport beneath these callbacks, not here.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn create(&self, change: &Change) -> anyhow::Result<()>;
    async fn update(&self, change: &Change) -> anyhow::Result<()>;
    async fn delete(&self, change: &Change) -> anyhow::Result<()>;
}

/// Execute every change in `changes`, creates then updates then deletes.
///
/// Each change is attempted exactly once; one failure never prevents the
/// remaining changes from running. Cancellation is checked before each
/// call: once the token fires, the remaining changes are counted as
/// skipped and the partial result is returned.
pub async fn apply(
    handler: &dyn ChangeHandler,
    changes: &ChangeSet,
    cancel: &CancellationToken,
) -> ApplyResult {
    let mut result = ApplyResult::default();

    let phases = [
        (ChangeOp::Create, &changes.creates),
        (ChangeOp::Update, &changes.updates),
        (ChangeOp::Delete, &changes.deletes),
    ];

    let total = changes.len();
    let mut attempted = 0usize;

    'outer: for (op, batch) in phases {
        for change in batch.iter() {
            if cancel.is_cancelled() {
                result.skipped = total - attempted;
                warn!(
                    target: "apply",
                    skipped = result.skipped,
                    "cancelled; returning partial result"
                );
                break 'outer;
            }
            attempted += 1;

            let outcome = match op {
                ChangeOp::Create => handler.create(change).await,
                ChangeOp::Update => handler.update(change).await,
                ChangeOp::Delete => handler.delete(change).await,
            };

            match outcome {
                Ok(()) => {
                    debug!(
                        target: "apply",
                        op = %op,
                        kind = %change.kind,
                        name = %change.display_name,
                        "applied"
                    );
                    result.record_success();
                }
                Err(error) => {
                    warn!(
                        target: "apply",
                        op = %op,
                        kind = %change.kind,
                        name = %change.display_name,
                        error = %format!("{error:#}"),
                        "change failed"
                    );
                    result.record_failure(change.clone(), error);
                }
            }
        }
    }

    result
}
