// SPDX-License-Identifier: GPL-3.0-or-later

//! [`ServiceAdapter`] implementation over the *arr v3 REST surface.

use crate::client::ArrClient;
use crate::error::ArrError;
use async_trait::async_trait;
use declarr_engine::{
    apply, diff, diff_singleton, ApplyResult, Change, ChangeHandler, ChangeSet, DiffError,
    ServiceAdapter, Tag, TagStore,
};
use declarr_domain::{
    DesiredState, RemotePathMapping, ResourceKind, ServiceInfo, ServiceState, TagId,
};
use serde_json::Value;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

fn endpoint(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::QualityProfile => "qualityprofile",
        ResourceKind::CustomFormat => "customformat",
        ResourceKind::DelayProfile => "delayprofile",
        ResourceKind::DownloadClient => "downloadclient",
        ResourceKind::Indexer => "indexer",
        ResourceKind::ImportList => "importlist",
        ResourceKind::Notification => "notification",
        ResourceKind::RootFolder => "rootfolder",
        ResourceKind::RemotePathMapping => "remotepathmapping",
        ResourceKind::Naming => "config/naming",
        ResourceKind::MediaManagement => "config/mediamanagement",
        ResourceKind::Authentication => "config/host",
    }
}

fn is_singleton(kind: ResourceKind) -> bool {
    matches!(
        kind,
        ResourceKind::Naming | ResourceKind::MediaManagement | ResourceKind::Authentication
    )
}

/// Ensure the payload carries the ownership tag for taggable kinds, so
/// the next pass can recognize the resource as ours.
fn inject_owner_tag(payload: &mut Value, kind: ResourceKind, owner: TagId) {
    if !kind.taggable() {
        return;
    }
    let Some(object) = payload.as_object_mut() else {
        return;
    };
    let tags = object
        .entry("tags")
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Some(items) = tags.as_array_mut() {
        if !items.iter().any(|v| v.as_i64() == Some(owner.0)) {
            items.push(Value::from(owner.0));
        }
    }
}

fn inject_server_id(payload: &mut Value, server_id: i64) {
    if let Some(object) = payload.as_object_mut() {
        object.insert("id".to_string(), Value::from(server_id));
    }
}

/// One service instance reachable over HTTP.
pub struct ArrAdapter {
    name: String,
    client: ArrClient,
}

impl ArrAdapter {
    pub fn new(name: impl Into<String>, client: ArrClient) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    async fn fetch_singleton<T: serde::de::DeserializeOwned>(
        &self,
        kind: ResourceKind,
    ) -> anyhow::Result<Option<T>> {
        match self.client.get_json(endpoint(kind)).await {
            Ok(value) => Ok(Some(value)),
            // Not every service exposes every settings endpoint.
            Err(ArrError::NotFound(url)) => {
                debug!(target: "arr", instance = %self.name, %kind, %url, "settings endpoint missing");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl TagStore for ArrAdapter {
    async fn list_tags(&self) -> anyhow::Result<Vec<Tag>> {
        let tags = self.client.tags().await?;
        Ok(tags
            .into_iter()
            .map(|t| Tag {
                id: TagId(t.id),
                label: t.label,
            })
            .collect())
    }

    async fn create_tag(&self, label: &str) -> anyhow::Result<Tag> {
        let tag = self.client.create_tag(label).await?;
        Ok(Tag {
            id: TagId(tag.id),
            label: tag.label,
        })
    }
}

#[async_trait]
impl ServiceAdapter for ArrAdapter {
    fn instance_name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> anyhow::Result<ServiceInfo> {
        Ok(self.client.system_status().await?)
    }

    async fn current_state(&self) -> anyhow::Result<ServiceState> {
        Ok(ServiceState {
            quality_profiles: self
                .client
                .get_json(endpoint(ResourceKind::QualityProfile))
                .await?,
            custom_formats: self
                .client
                .get_json(endpoint(ResourceKind::CustomFormat))
                .await?,
            delay_profiles: self
                .client
                .get_json(endpoint(ResourceKind::DelayProfile))
                .await?,
            download_clients: self
                .client
                .get_json(endpoint(ResourceKind::DownloadClient))
                .await?,
            indexers: self.client.get_json(endpoint(ResourceKind::Indexer)).await?,
            import_lists: self
                .client
                .get_json(endpoint(ResourceKind::ImportList))
                .await?,
            notifications: self
                .client
                .get_json(endpoint(ResourceKind::Notification))
                .await?,
            root_folders: self
                .client
                .get_json(endpoint(ResourceKind::RootFolder))
                .await?,
            remote_path_mappings: self
                .client
                .get_json(endpoint(ResourceKind::RemotePathMapping))
                .await?,
            naming: self.fetch_singleton(ResourceKind::Naming).await?,
            media_management: self.fetch_singleton(ResourceKind::MediaManagement).await?,
            authentication: self.fetch_singleton(ResourceKind::Authentication).await?,
        })
    }

    fn diff(
        &self,
        current: &ServiceState,
        desired: &DesiredState,
        owner: TagId,
    ) -> Result<ChangeSet, DiffError> {
        // Folders and profiles first so later kinds can reference them;
        // import lists converge through the direct path instead.
        let mut changes = diff(owner, &current.root_folders, &desired.root_folders)?;
        changes.merge(diff(
            owner,
            &current.quality_profiles,
            &desired.quality_profiles,
        )?);
        changes.merge(diff(owner, &current.custom_formats, &desired.custom_formats)?);
        changes.merge(diff(owner, &current.delay_profiles, &desired.delay_profiles)?);
        changes.merge(diff(
            owner,
            &current.download_clients,
            &desired.download_clients,
        )?);
        changes.merge(diff(owner, &current.indexers, &desired.indexers)?);
        changes.merge(diff(owner, &current.notifications, &desired.notifications)?);

        // Mappings for hosts declarr has never been told about are out of
        // scope entirely, so they cannot be deleted as orphans.
        let in_scope = mappings_in_scope(&current.remote_path_mappings, &desired.remote_path_mappings);
        changes.merge(diff(owner, &in_scope, &desired.remote_path_mappings)?);

        changes.merge(diff_singleton(
            current.naming.as_ref(),
            desired.naming.as_ref(),
        )?);
        changes.merge(diff_singleton(
            current.media_management.as_ref(),
            desired.media_management.as_ref(),
        )?);
        changes.merge(diff_singleton(
            current.authentication.as_ref(),
            desired.authentication.as_ref(),
        )?);

        Ok(changes)
    }

    async fn apply(
        &self,
        changes: &ChangeSet,
        owner: TagId,
        cancel: &CancellationToken,
    ) -> ApplyResult {
        let handler = ArrChangeHandler {
            client: &self.client,
            owner,
        };
        apply(&handler, changes, cancel).await
    }

    /// Import lists converge by direct upsert: every desired entry is
    /// created or updated by name, and owned orphans are removed. The
    /// ownership rules are the same as for the diffed kinds.
    fn diff_direct(
        &self,
        current: &ServiceState,
        desired: &DesiredState,
        owner: TagId,
    ) -> Result<ChangeSet, DiffError> {
        let changes = diff(owner, &current.import_lists, &desired.import_lists)?;
        for name in &changes.collisions {
            warn!(
                target: "arr",
                instance = %self.name,
                name = %name,
                "desired import list collides with an unmanaged one"
            );
        }
        Ok(changes)
    }

    async fn apply_direct(
        &self,
        changes: &ChangeSet,
        owner: TagId,
        cancel: &CancellationToken,
    ) -> ApplyResult {
        self.apply(changes, owner, cancel).await
    }
}

fn mappings_in_scope(
    current: &[RemotePathMapping],
    desired: &[RemotePathMapping],
) -> Vec<RemotePathMapping> {
    let hosts: HashSet<&str> = desired.iter().map(|m| m.host.as_str()).collect();
    current
        .iter()
        .filter(|m| hosts.contains(m.host.as_str()))
        .cloned()
        .collect()
}

struct ArrChangeHandler<'a> {
    client: &'a ArrClient,
    owner: TagId,
}

#[async_trait]
impl ChangeHandler for ArrChangeHandler<'_> {
    async fn create(&self, change: &Change) -> anyhow::Result<()> {
        if is_singleton(change.kind) {
            return Err(ArrError::Unsupported(format!(
                "{} settings cannot be created",
                change.kind
            ))
            .into());
        }
        let mut payload = change.payload.clone();
        inject_owner_tag(&mut payload, change.kind, self.owner);
        self.client.post_json(endpoint(change.kind), &payload).await?;
        Ok(())
    }

    async fn update(&self, change: &Change) -> anyhow::Result<()> {
        let server_id = change
            .server_id
            .ok_or_else(|| anyhow::anyhow!("update without server id"))?;
        let mut payload = change.payload.clone();
        inject_server_id(&mut payload, server_id);
        inject_owner_tag(&mut payload, change.kind, self.owner);

        // Settings endpoints take the update in place; collection
        // endpoints address the resource by id.
        let path = if is_singleton(change.kind) {
            endpoint(change.kind).to_string()
        } else {
            format!("{}/{}", endpoint(change.kind), server_id)
        };
        self.client.put_json(&path, &payload).await?;
        Ok(())
    }

    async fn delete(&self, change: &Change) -> anyhow::Result<()> {
        if is_singleton(change.kind) {
            return Err(ArrError::Unsupported(format!(
                "{} settings cannot be deleted",
                change.kind
            ))
            .into());
        }
        let server_id = change
            .server_id
            .ok_or_else(|| anyhow::anyhow!("delete without server id"))?;
        self.client
            .delete(&format!("{}/{}", endpoint(change.kind), server_id))
            .await?;
        Ok(())
    }
}
