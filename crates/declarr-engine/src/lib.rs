// SPDX-License-Identifier: GPL-3.0-or-later

//! Reconciliation engine for declarr.
//!
//! The engine is service-agnostic: it turns a fetched current state and a
//! desired state into a [`ChangeSet`](changeset::ChangeSet) via the generic
//! diff, and turns a ChangeSet into service calls via the phase-ordered
//! apply executor. Everything that touches a concrete REST surface lives
//! behind the [`ServiceAdapter`](reconcile::ServiceAdapter) and
//! [`TagStore`](tags::TagStore) traits.

pub mod apply;
pub mod changeset;
pub mod diff;
pub mod reconcile;
pub mod tags;

pub use apply::{apply, ChangeHandler};
pub use changeset::{ApplyError, ApplyResult, Change, ChangeOp, ChangeSet};
pub use diff::{diff, diff_singleton, DiffError};
pub use reconcile::{run_pass, PassOptions, PassReport, ServiceAdapter};
pub use tags::{ensure_tag, resolve_tag, Tag, TagStore};
