// SPDX-License-Identifier: GPL-3.0-or-later

//! Ownership tag manager.
//!
//! The ownership tag is the line between resources declarr manages and
//! resources a human owns. Resolving it fails the whole pass: without a
//! tag id, nothing can be safely classified, so not even creates proceed.
//! The lookup-then-create sequence is not serialized against concurrent
//! callers; deduplicating tag labels is the service's problem.

use async_trait::async_trait;
use declarr_domain::TagId;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: TagId,
    pub label: String,
}

/// The two tag operations the manager needs from a service.
#[async_trait]
pub trait TagStore: Send + Sync {
    async fn list_tags(&self) -> anyhow::Result<Vec<Tag>>;
    async fn create_tag(&self, label: &str) -> anyhow::Result<Tag>;
}

/// Exact-label lookup. `Ok(None)` means the tag does not exist yet.
pub async fn resolve_tag<S: TagStore + ?Sized>(
    store: &S,
    label: &str,
) -> anyhow::Result<Option<TagId>> {
    let tags = store.list_tags().await?;
    Ok(tags.into_iter().find(|tag| tag.label == label).map(|t| t.id))
}

/// Resolve the ownership tag, creating it on first use. One read call
/// and at most one write call.
pub async fn ensure_tag<S: TagStore + ?Sized>(store: &S, label: &str) -> anyhow::Result<TagId> {
    if let Some(id) = resolve_tag(store, label).await? {
        debug!(target: "tags", %label, %id, "ownership tag resolved");
        return Ok(id);
    }

    let tag = store.create_tag(label).await?;
    info!(target: "tags", %label, id = %tag.id, "ownership tag created");
    Ok(tag.id)
}
