// SPDX-License-Identifier: GPL-3.0-or-later

//! Pass orchestration: the adapter contract and the fixed sequence a
//! reconciliation pass walks through.

use crate::changeset::{ApplyResult, ChangeSet};
use crate::diff::DiffError;
use crate::tags::{ensure_tag, TagStore};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use declarr_domain::{DesiredState, ServiceInfo, ServiceState, TagId};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Everything the engine needs from one service instance. Implementations
/// translate between the service's REST surface and the resource model;
/// the engine never sees wire formats.
#[async_trait]
pub trait ServiceAdapter: TagStore {
    fn instance_name(&self) -> &str;

    async fn connect(&self) -> anyhow::Result<ServiceInfo>;

    /// Fetch the observed resources of every kind, already translated
    /// into the resource model.
    async fn current_state(&self) -> anyhow::Result<ServiceState>;

    /// Diff every create/update/delete-reconciled kind, in the adapter's
    /// fixed kind order.
    fn diff(
        &self,
        current: &ServiceState,
        desired: &DesiredState,
        owner: TagId,
    ) -> Result<ChangeSet, DiffError>;

    /// Diff the kinds that converge through the direct path rather than
    /// the batched one. Computed alongside [`ServiceAdapter::diff`] so
    /// dry runs report these changes and configuration errors surface
    /// before anything is applied.
    fn diff_direct(
        &self,
        current: &ServiceState,
        desired: &DesiredState,
        owner: TagId,
    ) -> Result<ChangeSet, DiffError>;

    async fn apply(
        &self,
        changes: &ChangeSet,
        owner: TagId,
        cancel: &CancellationToken,
    ) -> ApplyResult;

    /// Convergence path for list-type kinds the service upserts by name:
    /// every desired entry is created or updated, owned orphans are
    /// deleted. The same ownership-safety rules apply.
    async fn apply_direct(
        &self,
        changes: &ChangeSet,
        owner: TagId,
        cancel: &CancellationToken,
    ) -> ApplyResult;
}

#[derive(Debug, Clone)]
pub struct PassOptions {
    /// Label of the ownership tag, identical across all kinds for one
    /// instance.
    pub ownership_label: String,
    /// Compute and report the change set without applying it.
    pub dry_run: bool,
}

/// Summary of one reconciliation pass over one service instance.
#[derive(Debug)]
pub struct PassReport {
    pub instance: String,
    pub service: ServiceInfo,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub collisions: usize,
    pub dry_run: bool,
    pub result: ApplyResult,
}

impl PassReport {
    /// Partial success: some changes landed, some did not, or desired
    /// entries collided with unmanaged resources. Callers should treat
    /// this as re-runnable, not as a total failure.
    pub fn degraded(&self) -> bool {
        self.result.failed > 0 || self.collisions > 0
    }
}

/// Run one full pass: connect, resolve the ownership tag, fetch, diff
/// both paths, then apply. Tag resolution failure aborts the pass before
/// any state is fetched.
pub async fn run_pass(
    adapter: &dyn ServiceAdapter,
    desired: &DesiredState,
    options: &PassOptions,
    cancel: &CancellationToken,
) -> anyhow::Result<PassReport> {
    let started_at = Utc::now();
    let start = Instant::now();
    let instance = adapter.instance_name().to_string();

    let service = adapter
        .connect()
        .await
        .with_context(|| format!("connecting to {instance}"))?;
    info!(target: "reconcile", %instance, service = %service, "connected");

    let owner = ensure_tag(adapter, &options.ownership_label)
        .await
        .with_context(|| format!("resolving ownership tag for {instance}"))?;

    let current = adapter
        .current_state()
        .await
        .with_context(|| format!("fetching current state of {instance}"))?;

    // Both change sets are computed up front: a duplicate desired key in
    // either aborts the pass before any write reaches the service, and a
    // dry run reports the direct-path kinds too.
    let changes = adapter.diff(&current, desired, owner)?;
    let direct = adapter.diff_direct(&current, desired, owner)?;
    info!(
        target: "reconcile",
        %instance,
        creates = changes.creates.len() + direct.creates.len(),
        updates = changes.updates.len() + direct.updates.len(),
        deletes = changes.deletes.len() + direct.deletes.len(),
        collisions = changes.collisions.len() + direct.collisions.len(),
        "change set computed"
    );

    let mut result = ApplyResult::default();
    if !options.dry_run {
        result = adapter.apply(&changes, owner, cancel).await;
        result.merge(adapter.apply_direct(&direct, owner, cancel).await);
    }

    Ok(PassReport {
        instance,
        service,
        started_at,
        elapsed: start.elapsed(),
        creates: changes.creates.len() + direct.creates.len(),
        updates: changes.updates.len() + direct.updates.len(),
        deletes: changes.deletes.len() + direct.deletes.len(),
        collisions: changes.collisions.len() + direct.collisions.len(),
        dry_run: options.dry_run,
        result,
    })
}
