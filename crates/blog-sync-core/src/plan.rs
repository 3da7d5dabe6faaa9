//! Reconciliation: compute the edit plan that makes storage match staging.
//!
//! A run moves through [`ReconcilePhase`] in order. The stored posts of the
//! synchronized type and the staged slugs are loaded by the caller (they
//! involve I/O); [`SyncPlan::build`] performs the two compute phases and
//! returns the plan the applier executes.
//!
//! Slugs compare by exact string equality. `Post` and `post ` are distinct.

use std::collections::{BTreeMap, HashSet};

use crate::models::PostSummary;

/// Phase of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReconcilePhase {
    Init,
    LoadExisting,
    LoadStaged,
    ComputeDeleteSet,
    ComputeUpsertSet,
    Done,
}

impl ReconcilePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcilePhase::Init => "init",
            ReconcilePhase::LoadExisting => "load-existing",
            ReconcilePhase::LoadStaged => "load-staged",
            ReconcilePhase::ComputeDeleteSet => "compute-delete-set",
            ReconcilePhase::ComputeUpsertSet => "compute-upsert-set",
            ReconcilePhase::Done => "done",
        }
    }
}

/// How a staged slug is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Create,
    Update,
}

/// Output of reconciliation: what to delete and what to upsert.
///
/// The existing-slug mapping from the load phase travels with the plan so
/// the applier can branch create/update per record without another query.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    existing: BTreeMap<String, PostSummary>,
    staged: Vec<String>,
    to_delete: Vec<PostSummary>,
}

impl SyncPlan {
    /// Compute the delete set (existing − staged) and the upsert set (all
    /// staged slugs, in listing order, duplicates dropped).
    pub fn build(existing: Vec<PostSummary>, staged: Vec<String>) -> Self {
        let existing: BTreeMap<String, PostSummary> = existing
            .into_iter()
            .map(|summary| (summary.slug.clone(), summary))
            .collect();

        let mut seen = HashSet::new();
        let staged: Vec<String> = staged
            .into_iter()
            .filter(|slug| seen.insert(slug.clone()))
            .collect();

        let to_delete = existing
            .values()
            .filter(|summary| !seen.contains(&summary.slug))
            .cloned()
            .collect();

        Self {
            existing,
            staged,
            to_delete,
        }
    }

    /// Posts to delete, ordered by slug.
    pub fn to_delete(&self) -> &[PostSummary] {
        &self.to_delete
    }

    /// Staged slugs, each a create or update candidate.
    pub fn staged(&self) -> &[String] {
        &self.staged
    }

    /// Stored summary for `slug`, if it existed when the plan was built.
    pub fn existing(&self, slug: &str) -> Option<&PostSummary> {
        self.existing.get(slug)
    }

    pub fn action_for(&self, slug: &str) -> UpsertAction {
        if self.existing.contains_key(slug) {
            UpsertAction::Update
        } else {
            UpsertAction::Create
        }
    }

    /// Staged slugs paired with their action.
    pub fn upserts(&self) -> impl Iterator<Item = (&str, UpsertAction)> + '_ {
        self.staged
            .iter()
            .map(move |slug| (slug.as_str(), self.action_for(slug)))
    }

    pub fn create_count(&self) -> usize {
        self.upserts()
            .filter(|(_, action)| *action == UpsertAction::Create)
            .count()
    }

    pub fn update_count(&self) -> usize {
        self.staged.len() - self.create_count()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.to_delete.is_empty()
    }
}
