// SPDX-License-Identifier: GPL-3.0-or-later

//! Generic diff between a current and a desired collection of one
//! resource kind.
//!
//! The diff is pure: it performs no I/O and never mutates its inputs.
//! Identity, equality, protection, and ownership all come from the
//! resource type's [`Reconcilable`] implementation, so a single algorithm
//! serves every kind.

use crate::changeset::{Change, ChangeSet};
use declarr_domain::{Reconcilable, ResourceKind, TagId};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Debug, Error)]
pub enum DiffError {
    /// The desired configuration names the same identity twice; refusing
    /// to guess which entry wins.
    #[error("duplicate {kind} key in desired configuration: {key}")]
    DuplicateKey { kind: ResourceKind, key: String },

    /// A fetched resource needs an update or delete but carries no
    /// server id, so no call can address it.
    #[error("{kind} {name} has no server id")]
    MissingServerId { kind: ResourceKind, name: String },

    #[error("failed to serialize change payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Diff one resource kind.
///
/// Creates and updates come out in desired order, deletes in current
/// order. An update always carries the *current* resource's server id.
/// Current resources not owned by `owner` are never updated or deleted;
/// a desired entry whose key collides with such a resource produces no
/// change at all and is reported in [`ChangeSet::collisions`].
pub fn diff<R: Reconcilable>(
    owner: TagId,
    current: &[R],
    desired: &[R],
) -> Result<ChangeSet, DiffError> {
    let mut desired_keys: HashMap<R::Key, &R> = HashMap::with_capacity(desired.len());
    for resource in desired {
        if desired_keys.insert(resource.key(), resource).is_some() {
            return Err(DiffError::DuplicateKey {
                kind: R::kind(),
                key: format!("{:?}", resource.key()),
            });
        }
    }

    let mut current_keys: HashMap<R::Key, &R> = HashMap::with_capacity(current.len());
    for resource in current {
        if current_keys.insert(resource.key(), resource).is_some() {
            // The service should not hand us duplicates; keep the later
            // entry and flag it, since we cannot fix the server from here.
            warn!(
                target: "diff",
                kind = %R::kind(),
                key = ?resource.key(),
                "duplicate key in fetched state"
            );
        }
    }

    let mut changes = ChangeSet::default();

    for resource in desired {
        match current_keys.get(&resource.key()) {
            None => {
                trace!(target: "diff", kind = %R::kind(), name = %resource.display_name(), "create");
                changes.creates.push(Change {
                    kind: R::kind(),
                    display_name: resource.display_name(),
                    server_id: None,
                    payload: serde_json::to_value(resource)?,
                });
            }
            Some(existing) if !existing.owned(owner) => {
                warn!(
                    target: "diff",
                    kind = %R::kind(),
                    name = %resource.display_name(),
                    "desired entry collides with an unmanaged resource; leaving it alone"
                );
                changes.collisions.push(resource.display_name());
            }
            Some(existing) if !existing.same_settings(resource) => {
                let server_id =
                    existing
                        .server_id()
                        .ok_or_else(|| DiffError::MissingServerId {
                            kind: R::kind(),
                            name: existing.display_name(),
                        })?;
                trace!(target: "diff", kind = %R::kind(), name = %resource.display_name(), server_id, "update");
                changes.updates.push(Change {
                    kind: R::kind(),
                    display_name: resource.display_name(),
                    server_id: Some(server_id),
                    payload: serde_json::to_value(resource)?,
                });
            }
            Some(_) => {}
        }
    }

    for resource in current {
        if desired_keys.contains_key(&resource.key()) {
            continue;
        }
        if resource.protected() {
            trace!(target: "diff", kind = %R::kind(), name = %resource.display_name(), "protected, keeping");
            continue;
        }
        if !resource.owned(owner) {
            trace!(target: "diff", kind = %R::kind(), name = %resource.display_name(), "unmanaged, keeping");
            continue;
        }
        let server_id = resource
            .server_id()
            .ok_or_else(|| DiffError::MissingServerId {
                kind: R::kind(),
                name: resource.display_name(),
            })?;
        changes.deletes.push(Change {
            kind: R::kind(),
            display_name: resource.display_name(),
            server_id: Some(server_id),
            payload: serde_json::to_value(resource)?,
        });
    }

    Ok(changes)
}

/// Diff a singleton settings resource (naming, media management,
/// authentication). Singletons are update-only: the service always owns
/// exactly one, so nothing is ever created or deleted.
pub fn diff_singleton<R: Reconcilable>(
    current: Option<&R>,
    desired: Option<&R>,
) -> Result<ChangeSet, DiffError> {
    let mut changes = ChangeSet::default();

    let (Some(desired), Some(current)) = (desired, current) else {
        if desired.is_some() {
            warn!(
                target: "diff",
                kind = %R::kind(),
                "service reported no current settings; skipping"
            );
        }
        return Ok(changes);
    };

    if !current.same_settings(desired) {
        let server_id = current
            .server_id()
            .ok_or_else(|| DiffError::MissingServerId {
                kind: R::kind(),
                name: current.display_name(),
            })?;
        changes.updates.push(Change {
            kind: R::kind(),
            display_name: desired.display_name(),
            server_id: Some(server_id),
            payload: serde_json::to_value(desired)?,
        });
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarr_domain::NamingConfig;
    use serde::Serialize;
    use std::collections::BTreeMap;

    /// Minimal kind for exercising the algorithm: keyed by name, tag
    /// ownership, protected when `order == 1`.
    #[derive(Debug, Clone, Serialize)]
    struct Entry {
        id: Option<i64>,
        name: String,
        order: i64,
        enabled: bool,
        tags: Vec<i64>,
    }

    impl Entry {
        fn desired(name: &str, enabled: bool) -> Self {
            Self {
                id: None,
                name: name.to_string(),
                order: 0,
                enabled,
                tags: Vec::new(),
            }
        }

        fn current(id: i64, name: &str, enabled: bool, tags: &[i64]) -> Self {
            Self {
                id: Some(id),
                name: name.to_string(),
                order: 0,
                enabled,
                tags: tags.to_vec(),
            }
        }
    }

    impl Reconcilable for Entry {
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
            self.name == other.name && self.order == other.order && self.enabled == other.enabled
        }

        fn protected(&self) -> bool {
            self.order == 1
        }

        fn owned(&self, owner: TagId) -> bool {
            self.id.is_none() || self.tags.contains(&owner.0)
        }
    }

    const OWNER: TagId = TagId(9);

    #[test]
    fn emits_creates_and_updates_for_changed_and_new_entries() {
        // current: a (id 1, enabled); desired: a disabled, b enabled.
        let current = vec![Entry::current(1, "a", true, &[9])];
        let desired = vec![Entry::desired("a", false), Entry::desired("b", true)];

        let changes = diff(OWNER, &current, &desired).expect("diff");
        assert_eq!(changes.updates.len(), 1);
        assert_eq!(changes.updates[0].display_name, "a");
        assert_eq!(changes.updates[0].server_id, Some(1));
        assert_eq!(changes.updates[0].payload["enabled"], false);
        assert_eq!(changes.creates.len(), 1);
        assert_eq!(changes.creates[0].display_name, "b");
        assert_eq!(changes.creates[0].server_id, None);
        assert!(changes.deletes.is_empty());
    }

    #[test]
    fn equal_entries_produce_no_change() {
        let current = vec![Entry::current(1, "a", true, &[9])];
        let desired = vec![Entry::desired("a", true)];

        let changes = diff(OWNER, &current, &desired).expect("diff");
        assert!(changes.is_empty());
        assert!(changes.collisions.is_empty());
    }

    #[test]
    fn deletes_owned_entries_missing_from_desired() {
        let current = vec![
            Entry::current(1, "keep", true, &[9]),
            Entry::current(2, "drop", true, &[9]),
        ];
        let desired = vec![Entry::desired("keep", true)];

        let changes = diff(OWNER, &current, &desired).expect("diff");
        assert!(changes.creates.is_empty());
        assert!(changes.updates.is_empty());
        assert_eq!(changes.deletes.len(), 1);
        assert_eq!(changes.deletes[0].display_name, "drop");
        assert_eq!(changes.deletes[0].server_id, Some(2));
    }

    #[test]
    fn never_touches_unowned_resources() {
        // Tag 3 is not ours; neither entry may appear in updates/deletes.
        let current = vec![
            Entry::current(1, "theirs", true, &[3]),
            Entry::current(2, "stale", false, &[3]),
        ];
        let desired = vec![Entry::desired("theirs", false)];

        let changes = diff(OWNER, &current, &desired).expect("diff");
        assert!(changes.creates.is_empty());
        assert!(changes.updates.is_empty());
        assert!(changes.deletes.is_empty());
        assert_eq!(changes.collisions, vec!["theirs".to_string()]);
    }

    #[test]
    fn protected_entries_are_updated_but_never_deleted() {
        let mut default_entry = Entry::current(1, "default", true, &[9]);
        default_entry.order = 1;
        let second = Entry::current(2, "second", true, &[9]);
        let current = vec![default_entry, second];

        // desired drops both; only the unprotected one is deleted.
        let changes = diff(OWNER, &current, &[]).expect("diff");
        assert_eq!(changes.deletes.len(), 1);
        assert_eq!(changes.deletes[0].display_name, "second");

        // but the protected entry still accepts updates.
        let mut desired_default = Entry::desired("default", false);
        desired_default.order = 1;
        let changes = diff(OWNER, &current, &[desired_default]).expect("diff");
        assert_eq!(changes.updates.len(), 1);
        assert_eq!(changes.updates[0].server_id, Some(1));
        assert_eq!(changes.deletes.len(), 1);
    }

    #[test]
    fn duplicate_desired_key_is_a_configuration_error() {
        let desired = vec![Entry::desired("a", true), Entry::desired("a", false)];
        let err = diff(OWNER, &[], &desired).expect_err("must fail");
        assert!(matches!(err, DiffError::DuplicateKey { .. }));
        assert!(err.to_string().contains("indexer"));
    }

    #[test]
    fn diff_is_idempotent_after_apply() {
        let current = vec![
            Entry::current(1, "a", true, &[9]),
            Entry::current(3, "gone", true, &[9]),
        ];
        let desired = vec![Entry::desired("a", false), Entry::desired("b", true)];

        let first = diff(OWNER, &current, &desired).expect("diff");
        assert_eq!(first.len(), 3);

        // Simulate a successful apply followed by a re-fetch: the update
        // landed, the create got id 7 and our tag, the delete is gone.
        let refetched = vec![
            Entry::current(1, "a", false, &[9]),
            Entry::current(7, "b", true, &[9]),
        ];
        let second = diff(OWNER, &refetched, &desired).expect("diff");
        assert!(second.is_empty());
    }

    #[test]
    fn server_reported_passthrough_fields_do_not_block_convergence() {
        use declarr_domain::Indexer;

        // A created indexer comes back from the service with capability
        // fields the configuration never set. The next pass must see it
        // as converged, not loop on a phantom update.
        let desired = vec![Indexer {
            id: None,
            name: "nzb".to_string(),
            implementation: "Newznab".to_string(),
            enable: true,
            priority: 25,
            base_url: Some("https://indexer.example".to_string()),
            tags: Vec::new(),
            extra: BTreeMap::new(),
        }];
        let refetched = vec![Indexer {
            id: Some(12),
            tags: vec![9],
            extra: BTreeMap::from([
                ("protocol".to_string(), serde_json::json!("usenet")),
                ("supportsRss".to_string(), serde_json::json!(true)),
            ]),
            ..desired[0].clone()
        }];

        let changes = diff(OWNER, &refetched, &desired).expect("diff");
        assert!(changes.is_empty());
    }

    #[test]
    fn creates_and_updates_follow_desired_order_deletes_follow_current() {
        let current = vec![
            Entry::current(1, "u2", true, &[9]),
            Entry::current(2, "d1", true, &[9]),
            Entry::current(3, "u1", true, &[9]),
            Entry::current(4, "d2", true, &[9]),
        ];
        let desired = vec![
            Entry::desired("c1", true),
            Entry::desired("u1", false),
            Entry::desired("c2", true),
            Entry::desired("u2", false),
        ];

        let changes = diff(OWNER, &current, &desired).expect("diff");
        let creates: Vec<_> = changes.creates.iter().map(|c| c.display_name.as_str()).collect();
        let updates: Vec<_> = changes.updates.iter().map(|c| c.display_name.as_str()).collect();
        let deletes: Vec<_> = changes.deletes.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(creates, ["c1", "c2"]);
        assert_eq!(updates, ["u1", "u2"]);
        assert_eq!(deletes, ["d1", "d2"]);
    }

    #[test]
    fn default_delay_profile_survives_even_an_empty_desired_list() {
        use declarr_domain::DelayProfile;

        let profile = |id: i64, order: i64| DelayProfile {
            id: Some(id),
            order,
            preferred_protocol: "usenet".to_string(),
            usenet_delay: 0,
            torrent_delay: 0,
            enable_usenet: true,
            enable_torrent: true,
            tags: vec![9],
            extra: BTreeMap::new(),
        };
        let current = vec![profile(1, 1), profile(2, 2)];

        let desired = vec![DelayProfile {
            id: None,
            tags: Vec::new(),
            ..profile(0, 1)
        }];
        let changes = diff(OWNER, &current, &desired).expect("diff");
        assert_eq!(changes.deletes.len(), 1);
        assert_eq!(changes.deletes[0].server_id, Some(2));

        let changes = diff(OWNER, &current, &[]).expect("diff");
        assert_eq!(changes.deletes.len(), 1);
        assert_eq!(changes.deletes[0].server_id, Some(2));
    }

    #[test]
    fn singleton_diff_updates_in_place_only() {
        let current = NamingConfig {
            id: Some(1),
            rename_files: false,
            replace_illegal_characters: true,
            standard_format: None,
            folder_format: None,
            extra: BTreeMap::new(),
        };
        let desired = NamingConfig {
            id: None,
            rename_files: true,
            ..current.clone()
        };

        let changes = diff_singleton(Some(&current), Some(&desired)).expect("diff");
        assert_eq!(changes.updates.len(), 1);
        assert_eq!(changes.updates[0].server_id, Some(1));
        assert!(changes.creates.is_empty());
        assert!(changes.deletes.is_empty());

        // Already converged.
        let changes = diff_singleton(Some(&current), Some(&current)).expect("diff");
        assert!(changes.is_empty());

        // Nothing desired, nothing to do; never a delete.
        let changes = diff_singleton(Some(&current), None).expect("diff");
        assert!(changes.is_empty());

        // Service reported nothing; skip rather than create.
        let changes = diff_singleton(None, Some(&desired)).expect("diff");
        assert!(changes.is_empty());
    }
}
