// SPDX-License-Identifier: GPL-3.0-or-later

//! Resource model for declarr.
//!
//! Every configuration entity the engine can reconcile lives here: the
//! typed resource structs, the [`Reconcilable`] trait that gives each kind
//! its identity key and equality rule, the versioned [`DesiredState`]
//! container, and the [`ServiceState`] snapshot an adapter fetches from a
//! running service.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Value Objects & IDs
// ============================================================================

/// Server-side identifier of the ownership tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagId(pub i64);

impl std::fmt::Display for TagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name prefix marking profile-like resources as managed.
///
/// Quality profiles and custom formats cannot carry tags on the service
/// side, so ownership rides on the resource name instead.
pub const MANAGED_PREFIX: &str = "[declarr] ";

/// Prepend the managed prefix unless the name already carries it.
pub fn managed_name(name: &str) -> String {
    if is_managed_name(name) {
        name.to_string()
    } else {
        format!("{MANAGED_PREFIX}{name}")
    }
}

pub fn is_managed_name(name: &str) -> bool {
    name.starts_with(MANAGED_PREFIX)
}

/// Identity and version of a connected service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub app_name: String,
    pub version: String,
}

impl std::fmt::Display for ServiceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.app_name, self.version)
    }
}

// ============================================================================
// Resource Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    QualityProfile,
    CustomFormat,
    DelayProfile,
    DownloadClient,
    Indexer,
    ImportList,
    Notification,
    RootFolder,
    RemotePathMapping,
    Naming,
    MediaManagement,
    Authentication,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QualityProfile => "quality-profile",
            Self::CustomFormat => "custom-format",
            Self::DelayProfile => "delay-profile",
            Self::DownloadClient => "download-client",
            Self::Indexer => "indexer",
            Self::ImportList => "import-list",
            Self::Notification => "notification",
            Self::RootFolder => "root-folder",
            Self::RemotePathMapping => "remote-path-mapping",
            Self::Naming => "naming",
            Self::MediaManagement => "media-management",
            Self::Authentication => "authentication",
        }
    }

    /// Kinds whose resources carry a tag list on the service side.
    pub fn taggable(&self) -> bool {
        matches!(
            self,
            Self::DelayProfile
                | Self::DownloadClient
                | Self::Indexer
                | Self::ImportList
                | Self::Notification
        )
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Reconcilable
// ============================================================================

/// A resource kind the diff engine can reconcile.
///
/// Implementations define the identity key used to match current against
/// desired entries, the settings-equality rule, and the ownership and
/// protection policies. Equality deliberately ignores the server id and
/// tag assignments; it compares only fields that round-trip through the
/// desired configuration. `same_settings` is asymmetric: the receiver is
/// the observed resource, the argument the desired one, and observed-only
/// passthrough fields never count as drift.
pub trait Reconcilable: Serialize {
    type Key: Clone + Eq + std::hash::Hash + std::fmt::Debug;

    fn kind() -> ResourceKind;

    fn key(&self) -> Self::Key;

    /// Server-assigned id; absent until first creation.
    fn server_id(&self) -> Option<i64>;

    fn display_name(&self) -> String;

    /// Field-by-field comparison ignoring the server id and tags.
    fn same_settings(&self, other: &Self) -> bool;

    /// Protected entries may be updated but never deleted.
    fn protected(&self) -> bool {
        false
    }

    /// Whether this (fetched) resource is owned by the tool. Desired-side
    /// resources have no server id and are trivially owned.
    fn owned(&self, owner: TagId) -> bool {
        let _ = owner;
        true
    }
}

fn tagged_owned(server_id: Option<i64>, tags: &[i64], owner: TagId) -> bool {
    server_id.is_none() || tags.contains(&owner.0)
}

/// Passthrough convergence check: every key the desired configuration pins
/// must match the observed value. Keys the server reports on its own
/// (capability flags, computed fields) are ignored.
fn extra_converged(observed: &BTreeMap<String, Value>, desired: &BTreeMap<String, Value>) -> bool {
    desired.iter().all(|(key, value)| observed.get(key) == Some(value))
}

// ============================================================================
// Profiles & Formats
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityItem {
    pub name: String,
    pub allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub upgrade_allowed: bool,
    pub cutoff: String,
    #[serde(default)]
    pub items: Vec<QualityItem>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Reconcilable for QualityProfile {
    type Key = String;

    fn kind() -> ResourceKind {
        ResourceKind::QualityProfile
    }

    fn key(&self) -> String {
        self.name.clone()
    }

    fn server_id(&self) -> Option<i64> {
        self.id
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn same_settings(&self, other: &Self) -> bool {
        self.name == other.name
            && self.upgrade_allowed == other.upgrade_allowed
            && self.cutoff == other.cutoff
            && self.items == other.items
            && extra_converged(&self.extra, &other.extra)
    }

    fn owned(&self, _owner: TagId) -> bool {
        self.id.is_none() || is_managed_name(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatSpecification {
    pub name: String,
    pub implementation: String,
    #[serde(default)]
    pub negate: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub include_when_renaming: bool,
    #[serde(default)]
    pub specifications: Vec<FormatSpecification>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Reconcilable for CustomFormat {
    type Key = String;

    fn kind() -> ResourceKind {
        ResourceKind::CustomFormat
    }

    fn key(&self) -> String {
        self.name.clone()
    }

    fn server_id(&self) -> Option<i64> {
        self.id
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn same_settings(&self, other: &Self) -> bool {
        self.name == other.name
            && self.include_when_renaming == other.include_when_renaming
            && self.specifications == other.specifications
            && extra_converged(&self.extra, &other.extra)
    }

    fn owned(&self, _owner: TagId) -> bool {
        self.id.is_none() || is_managed_name(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Priority order; 1 is the service's default profile.
    pub order: i64,
    pub preferred_protocol: String,
    #[serde(default)]
    pub usenet_delay: i64,
    #[serde(default)]
    pub torrent_delay: i64,
    #[serde(default)]
    pub enable_usenet: bool,
    #[serde(default)]
    pub enable_torrent: bool,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Reconcilable for DelayProfile {
    type Key = i64;

    fn kind() -> ResourceKind {
        ResourceKind::DelayProfile
    }

    fn key(&self) -> i64 {
        self.order
    }

    fn server_id(&self) -> Option<i64> {
        self.id
    }

    fn display_name(&self) -> String {
        format!("delay profile #{}", self.order)
    }

    fn same_settings(&self, other: &Self) -> bool {
        self.order == other.order
            && self.preferred_protocol == other.preferred_protocol
            && self.usenet_delay == other.usenet_delay
            && self.torrent_delay == other.torrent_delay
            && self.enable_usenet == other.enable_usenet
            && self.enable_torrent == other.enable_torrent
            && extra_converged(&self.extra, &other.extra)
    }

    // The first-order profile is the service default and must survive.
    fn protected(&self) -> bool {
        self.order == 1
    }

    fn owned(&self, owner: TagId) -> bool {
        self.protected() || tagged_owned(self.id, &self.tags, owner)
    }
}

// ============================================================================
// Clients, Indexers, Lists, Notifications
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadClient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub implementation: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Reconcilable for DownloadClient {
    type Key = String;

    fn kind() -> ResourceKind {
        ResourceKind::DownloadClient
    }

    fn key(&self) -> String {
        self.name.clone()
    }

    fn server_id(&self) -> Option<i64> {
        self.id
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn same_settings(&self, other: &Self) -> bool {
        self.name == other.name
            && self.implementation == other.implementation
            && self.enable == other.enable
            && self.priority == other.priority
            && self.host == other.host
            && self.port == other.port
            && self.category == other.category
            && extra_converged(&self.extra, &other.extra)
    }

    fn owned(&self, owner: TagId) -> bool {
        tagged_owned(self.id, &self.tags, owner)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indexer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub implementation: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Reconcilable for Indexer {
    type Key = String;

    fn kind() -> ResourceKind {
        ResourceKind::Indexer
    }

    fn key(&self) -> String {
        self.name.clone()
    }

    fn server_id(&self) -> Option<i64> {
        self.id
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn same_settings(&self, other: &Self) -> bool {
        self.name == other.name
            && self.implementation == other.implementation
            && self.enable == other.enable
            && self.priority == other.priority
            && self.base_url == other.base_url
            && extra_converged(&self.extra, &other.extra)
    }

    fn owned(&self, owner: TagId) -> bool {
        tagged_owned(self.id, &self.tags, owner)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub implementation: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Reconcilable for ImportList {
    type Key = String;

    fn kind() -> ResourceKind {
        ResourceKind::ImportList
    }

    fn key(&self) -> String {
        self.name.clone()
    }

    fn server_id(&self) -> Option<i64> {
        self.id
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn same_settings(&self, other: &Self) -> bool {
        self.name == other.name
            && self.implementation == other.implementation
            && self.enabled == other.enabled
            && extra_converged(&self.extra, &other.extra)
    }

    fn owned(&self, owner: TagId) -> bool {
        tagged_owned(self.id, &self.tags, owner)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub implementation: String,
    #[serde(default)]
    pub on_grab: bool,
    #[serde(default)]
    pub on_import: bool,
    #[serde(default)]
    pub on_upgrade: bool,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Reconcilable for Notification {
    type Key = String;

    fn kind() -> ResourceKind {
        ResourceKind::Notification
    }

    fn key(&self) -> String {
        self.name.clone()
    }

    fn server_id(&self) -> Option<i64> {
        self.id
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn same_settings(&self, other: &Self) -> bool {
        self.name == other.name
            && self.implementation == other.implementation
            && self.on_grab == other.on_grab
            && self.on_import == other.on_import
            && self.on_upgrade == other.on_upgrade
            && extra_converged(&self.extra, &other.extra)
    }

    fn owned(&self, owner: TagId) -> bool {
        tagged_owned(self.id, &self.tags, owner)
    }
}

// ============================================================================
// Folders & Path Mappings
// ============================================================================

/// Root folders are ensure-present only: the path is the whole identity,
/// so there is nothing to update, and the surface gives no way to mark a
/// folder as tool-owned, so they are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootFolder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub path: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Reconcilable for RootFolder {
    type Key = String;

    fn kind() -> ResourceKind {
        ResourceKind::RootFolder
    }

    fn key(&self) -> String {
        self.path.clone()
    }

    fn server_id(&self) -> Option<i64> {
        self.id
    }

    fn display_name(&self) -> String {
        self.path.clone()
    }

    fn same_settings(&self, _other: &Self) -> bool {
        true
    }

    fn protected(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePathMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub host: String,
    pub remote_path: String,
    pub local_path: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Reconcilable for RemotePathMapping {
    /// Structured tuple key; a delimiter-joined string would collide on
    /// inputs containing the delimiter.
    type Key = (String, String);

    fn kind() -> ResourceKind {
        ResourceKind::RemotePathMapping
    }

    fn key(&self) -> (String, String) {
        (self.host.clone(), self.remote_path.clone())
    }

    fn server_id(&self) -> Option<i64> {
        self.id
    }

    fn display_name(&self) -> String {
        format!("{}:{}", self.host, self.remote_path)
    }

    fn same_settings(&self, other: &Self) -> bool {
        self.host == other.host
            && self.remote_path == other.remote_path
            && self.local_path == other.local_path
            && extra_converged(&self.extra, &other.extra)
    }
}

// ============================================================================
// Singleton Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub rename_files: bool,
    #[serde(default)]
    pub replace_illegal_characters: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_format: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaManagementConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub create_empty_folders: bool,
    #[serde(default)]
    pub delete_empty_folders: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recycle_bin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_free_space: Option<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub required_for_local: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

macro_rules! singleton_reconcilable {
    ($ty:ty, $kind:expr, $label:literal) => {
        impl Reconcilable for $ty {
            type Key = ();

            fn kind() -> ResourceKind {
                $kind
            }

            fn key(&self) {}

            fn server_id(&self) -> Option<i64> {
                self.id
            }

            fn display_name(&self) -> String {
                $label.to_string()
            }

            fn same_settings(&self, other: &Self) -> bool {
                let mut a = self.clone();
                let mut b = other.clone();
                a.id = None;
                b.id = None;
                let a_extra = std::mem::take(&mut a.extra);
                let b_extra = std::mem::take(&mut b.extra);
                a == b && extra_converged(&a_extra, &b_extra)
            }

            fn protected(&self) -> bool {
                true
            }
        }
    };
}

singleton_reconcilable!(NamingConfig, ResourceKind::Naming, "naming");
singleton_reconcilable!(
    MediaManagementConfig,
    ResourceKind::MediaManagement,
    "media management"
);
singleton_reconcilable!(
    AuthenticationSettings,
    ResourceKind::Authentication,
    "authentication"
);

// ============================================================================
// State Containers
// ============================================================================

/// Schema version the desired-state loader accepts.
pub const IR_VERSION: u32 = 1;

/// Desired configuration for one service instance, expressed in the
/// service-independent intermediate representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredState {
    pub version: u32,
    #[serde(default)]
    pub quality_profiles: Vec<QualityProfile>,
    #[serde(default)]
    pub custom_formats: Vec<CustomFormat>,
    #[serde(default)]
    pub delay_profiles: Vec<DelayProfile>,
    #[serde(default)]
    pub download_clients: Vec<DownloadClient>,
    #[serde(default)]
    pub indexers: Vec<Indexer>,
    #[serde(default)]
    pub import_lists: Vec<ImportList>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub root_folders: Vec<RootFolder>,
    #[serde(default)]
    pub remote_path_mappings: Vec<RemotePathMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naming: Option<NamingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_management: Option<MediaManagementConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationSettings>,
}

impl DesiredState {
    /// Apply the managed-name prefix to prefix-owned kinds so their keys,
    /// ownership checks, and create payloads all agree.
    pub fn apply_managed_names(&mut self) {
        for profile in &mut self.quality_profiles {
            profile.name = managed_name(&profile.name);
        }
        for format in &mut self.custom_formats {
            format.name = managed_name(&format.name);
        }
    }
}

/// Observed configuration of a running service instance, fetched by an
/// adapter at the start of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceState {
    #[serde(default)]
    pub quality_profiles: Vec<QualityProfile>,
    #[serde(default)]
    pub custom_formats: Vec<CustomFormat>,
    #[serde(default)]
    pub delay_profiles: Vec<DelayProfile>,
    #[serde(default)]
    pub download_clients: Vec<DownloadClient>,
    #[serde(default)]
    pub indexers: Vec<Indexer>,
    #[serde(default)]
    pub import_lists: Vec<ImportList>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub root_folders: Vec<RootFolder>,
    #[serde(default)]
    pub remote_path_mappings: Vec<RemotePathMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naming: Option<NamingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_management: Option<MediaManagementConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationSettings>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn managed_name_is_idempotent() {
        let once = managed_name("HD Bluray");
        let twice = managed_name(&once);
        assert_eq!(once, "[declarr] HD Bluray");
        assert_eq!(once, twice);
        assert!(is_managed_name(&once));
        assert!(!is_managed_name("HD Bluray"));
    }

    #[test]
    fn remote_path_mapping_key_is_a_tuple() {
        // Delimiter-style concatenation would make these collide.
        let a = RemotePathMapping {
            id: None,
            host: "nas|01".to_string(),
            remote_path: "/data".to_string(),
            local_path: "/mnt/a".to_string(),
            extra: BTreeMap::new(),
        };
        let b = RemotePathMapping {
            id: None,
            host: "nas".to_string(),
            remote_path: "01|/data".to_string(),
            local_path: "/mnt/b".to_string(),
            extra: BTreeMap::new(),
        };
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn equality_ignores_server_id_and_tags() {
        let mut current = DownloadClient {
            id: Some(7),
            name: "qbittorrent".to_string(),
            implementation: "QBittorrent".to_string(),
            enable: true,
            priority: 1,
            host: Some("localhost".to_string()),
            port: Some(8080),
            category: Some("tv".to_string()),
            tags: vec![3],
            extra: BTreeMap::new(),
        };
        let desired = DownloadClient {
            id: None,
            tags: Vec::new(),
            ..current.clone()
        };
        assert!(current.same_settings(&desired));

        current.port = Some(9090);
        assert!(!current.same_settings(&desired));
    }

    #[test]
    fn observed_only_passthrough_fields_are_not_drift() {
        let mut current = Indexer {
            id: Some(11),
            name: "nzb".to_string(),
            implementation: "Newznab".to_string(),
            enable: true,
            priority: 25,
            base_url: Some("https://indexer.example".to_string()),
            tags: vec![4],
            extra: BTreeMap::from([
                ("protocol".to_string(), serde_json::json!("usenet")),
                ("supportsRss".to_string(), serde_json::json!(true)),
            ]),
        };
        let mut desired = Indexer {
            id: None,
            tags: Vec::new(),
            extra: BTreeMap::new(),
            ..current.clone()
        };
        // The server reports fields the configuration never mentions.
        assert!(current.same_settings(&desired));

        // A pinned passthrough field still has to match.
        desired
            .extra
            .insert("protocol".to_string(), serde_json::json!("torrent"));
        assert!(!current.same_settings(&desired));

        desired
            .extra
            .insert("protocol".to_string(), serde_json::json!("usenet"));
        assert!(current.same_settings(&desired));

        // And a pinned field the server does not report at all is drift.
        current.extra.remove("protocol");
        assert!(!current.same_settings(&desired));
    }

    #[test]
    fn singleton_settings_ignore_observed_only_fields() {
        let current = NamingConfig {
            id: Some(1),
            rename_files: true,
            replace_illegal_characters: true,
            standard_format: Some("{Title}".to_string()),
            folder_format: None,
            extra: BTreeMap::from([(
                "includeQuality".to_string(),
                serde_json::json!(false),
            )]),
        };
        let desired = NamingConfig {
            id: None,
            extra: BTreeMap::new(),
            ..current.clone()
        };
        assert!(current.same_settings(&desired));
    }

    #[test]
    fn tagged_ownership_requires_the_marker() {
        let owner = TagId(5);
        let mut indexer = Indexer {
            id: Some(2),
            name: "nzb".to_string(),
            implementation: "Newznab".to_string(),
            enable: true,
            priority: 25,
            base_url: None,
            tags: vec![1, 2],
            extra: BTreeMap::new(),
        };
        assert!(!indexer.owned(owner));

        indexer.tags.push(5);
        assert!(indexer.owned(owner));

        indexer.id = None;
        indexer.tags.clear();
        assert!(indexer.owned(owner));
    }

    #[test]
    fn prefix_ownership_for_quality_profiles() {
        let owner = TagId(1);
        let user_profile = QualityProfile {
            id: Some(1),
            name: "Any".to_string(),
            upgrade_allowed: false,
            cutoff: "HDTV-720p".to_string(),
            items: Vec::new(),
            extra: BTreeMap::new(),
        };
        assert!(!user_profile.owned(owner));

        let managed = QualityProfile {
            name: managed_name("HD"),
            ..user_profile.clone()
        };
        assert!(managed.owned(owner));
    }

    #[test]
    fn first_order_delay_profile_is_protected() {
        let default_profile = DelayProfile {
            id: Some(1),
            order: 1,
            preferred_protocol: "usenet".to_string(),
            usenet_delay: 0,
            torrent_delay: 0,
            enable_usenet: true,
            enable_torrent: true,
            tags: Vec::new(),
            extra: BTreeMap::new(),
        };
        assert!(default_profile.protected());

        let second = DelayProfile {
            order: 2,
            ..default_profile
        };
        assert!(!second.protected());
    }

    #[test]
    fn desired_state_applies_managed_names() {
        let mut desired = DesiredState {
            version: IR_VERSION,
            quality_profiles: vec![QualityProfile {
                id: None,
                name: "HD".to_string(),
                upgrade_allowed: true,
                cutoff: "Bluray-1080p".to_string(),
                items: Vec::new(),
                extra: BTreeMap::new(),
            }],
            ..DesiredState::default()
        };
        desired.apply_managed_names();
        assert_eq!(desired.quality_profiles[0].name, "[declarr] HD");

        // A second application must not stack prefixes.
        desired.apply_managed_names();
        assert_eq!(desired.quality_profiles[0].name, "[declarr] HD");
    }

    #[test]
    fn download_client_serializes_camel_case_without_null_id() {
        let client = DownloadClient {
            id: None,
            name: "sab".to_string(),
            implementation: "Sabnzbd".to_string(),
            enable: true,
            priority: 1,
            host: Some("localhost".to_string()),
            port: Some(8085),
            category: None,
            tags: Vec::new(),
            extra: BTreeMap::new(),
        };
        let value = serde_json::to_value(&client).expect("serializes");
        assert!(value.get("id").is_none());
        assert_eq!(value["implementation"], "Sabnzbd");
        assert_eq!(value["port"], 8085);
    }

    #[test]
    fn extra_fields_round_trip_through_the_flatten_map() {
        let json = r#"{
            "name": "nzb",
            "implementation": "Newznab",
            "enable": true,
            "priority": 25,
            "downloadClientId": 4
        }"#;
        let indexer: Indexer = serde_json::from_str(json).expect("parses");
        assert_eq!(
            indexer.extra.get("downloadClientId"),
            Some(&Value::from(4))
        );
        let back = serde_json::to_value(&indexer).expect("serializes");
        assert_eq!(back["downloadClientId"], 4);
    }
}
