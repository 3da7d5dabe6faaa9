//! Upsert applier: execute a [`SyncPlan`] against a [`PostStore`].
//!
//! The delete phase runs to completion before the first upsert. Every
//! record is applied on its own: a read or storage failure is recorded in
//! the [`SyncReport`] and the run moves on to the next slug.

use std::collections::HashMap;
use std::fmt;

use blog_sync_core::plan::{SyncPlan, UpsertAction};
use blog_sync_core::store::PostStore;

use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::staging::{self, StagedDocument};

/// Where a per-record failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Read,
    Delete,
    Create,
    Update,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureStage::Read => "read",
            FailureStage::Delete => "delete",
            FailureStage::Create => "create",
            FailureStage::Update => "update",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub slug: String,
    pub stage: FailureStage,
    pub message: String,
}

/// Outcome of applying one plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    /// Staged documents whose stored copy already matched.
    pub unchanged: usize,
    pub deleted: usize,
    /// Staged files that could not be read; storage is untouched for them.
    pub skipped: Vec<RecordFailure>,
    /// Storage writes that failed.
    pub failed: Vec<RecordFailure>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }

    /// Print the run summary on stdout.
    pub fn print_summary(&self, post_type: &str) {
        println!("sync {}", post_type);
        println!("  created: {}", self.created);
        println!("  updated: {}", self.updated);
        println!("  unchanged: {}", self.unchanged);
        println!("  deleted: {}", self.deleted);
        println!("  skipped: {}", self.skipped.len());
        println!("  failed: {}", self.failed.len());
        for f in self.skipped.iter().chain(self.failed.iter()) {
            println!("    {} [{}]: {}", f.slug, f.stage, f.message);
        }
        if self.is_clean() {
            println!("ok");
        }
    }
}

/// Apply `plan`. `docs` maps each staged slug to its file.
pub async fn apply_plan(
    store: &dyn PostStore,
    plan: &SyncPlan,
    docs: &HashMap<String, StagedDocument>,
    post_type: &str,
    progress: &dyn SyncProgressReporter,
) -> SyncReport {
    let mut report = SyncReport::default();

    let total = plan.to_delete().len() as u64;
    for (i, existing) in plan.to_delete().iter().enumerate() {
        match store.delete(&existing.slug, post_type).await {
            Ok(true) => {
                tracing::info!(slug = %existing.slug, title = %existing.title, "deleted");
                report.deleted += 1;
            }
            Ok(false) => {
                tracing::debug!(slug = %existing.slug, "already gone");
            }
            Err(e) => {
                tracing::error!(slug = %existing.slug, error = %e, "delete failed");
                report.failed.push(RecordFailure {
                    slug: existing.slug.clone(),
                    stage: FailureStage::Delete,
                    message: format!("{:#}", e),
                });
            }
        }
        progress.report(SyncProgressEvent::Deleting {
            post_type: post_type.to_string(),
            n: i as u64 + 1,
            total,
        });
    }

    let total = plan.staged().len() as u64;
    for (i, (slug, action)) in plan.upserts().enumerate() {
        apply_one(store, plan, docs, slug, action, post_type, &mut report).await;
        progress.report(SyncProgressEvent::Applying {
            post_type: post_type.to_string(),
            n: i as u64 + 1,
            total,
        });
    }

    report
}

async fn apply_one(
    store: &dyn PostStore,
    plan: &SyncPlan,
    docs: &HashMap<String, StagedDocument>,
    slug: &str,
    action: UpsertAction,
    post_type: &str,
    report: &mut SyncReport,
) {
    let loaded = match docs.get(slug) {
        Some(doc) => staging::load_post(doc, post_type).await,
        None => Err(anyhow::anyhow!("no staged file for slug")),
    };
    let post = match loaded {
        Ok(post) => post,
        Err(e) => {
            tracing::warn!(slug = %slug, error = %format!("{:#}", e), "skipping unreadable document");
            report.skipped.push(RecordFailure {
                slug: slug.to_string(),
                stage: FailureStage::Read,
                message: format!("{:#}", e),
            });
            return;
        }
    };

    match action {
        UpsertAction::Update => {
            let stored_hash = plan.existing(slug).map(|s| s.values_hash.as_str());
            if stored_hash == Some(post.content_hash.as_str()) {
                tracing::debug!(slug = %slug, "unchanged");
                report.unchanged += 1;
                return;
            }
            match store.update(&post).await {
                Ok(true) => {
                    tracing::info!(slug = %slug, title = %post.title, "updated");
                    report.updated += 1;
                }
                // Removed since the plan was built; fall back to a create.
                Ok(false) => create(store, &post, report).await,
                Err(e) => {
                    tracing::error!(slug = %slug, error = %e, "update failed");
                    report.failed.push(RecordFailure {
                        slug: slug.to_string(),
                        stage: FailureStage::Update,
                        message: format!("{:#}", e),
                    });
                }
            }
        }
        UpsertAction::Create => create(store, &post, report).await,
    }
}

async fn create(
    store: &dyn PostStore,
    post: &blog_sync_core::models::Post,
    report: &mut SyncReport,
) {
    match store.create(post).await {
        Ok(()) => {
            tracing::info!(slug = %post.slug, title = %post.title, "created");
            report.created += 1;
        }
        Err(e) => {
            tracing::error!(slug = %post.slug, error = %e, "create failed");
            report.failed.push(RecordFailure {
                slug: post.slug.clone(),
                stage: FailureStage::Create,
                message: format!("{:#}", e),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use blog_sync_core::models::{Post, NATIVE_POST_TYPE};
    use blog_sync_core::store::memory::InMemoryStore;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    fn stored(slug: &str, post_type: &str) -> Post {
        Post::new(
            slug,
            format!("Old {}", slug),
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            "old",
            "old body",
            post_type,
            Vec::new(),
        )
    }

    async fn run(store: &InMemoryStore, dir: &std::path::Path) -> SyncReport {
        let staged = staging::list_staged(dir, "SUMMARY.md").await.unwrap();
        let existing = store.list_by_type("feishu").await.unwrap();
        let plan = SyncPlan::build(
            existing,
            staged.iter().map(|d| d.slug.clone()).collect(),
        );
        let docs = staged
            .into_iter()
            .map(|d| (d.slug.clone(), d))
            .collect::<HashMap<_, _>>();
        apply_plan(store, &plan, &docs, "feishu", &NoProgress).await
    }

    #[tokio::test]
    async fn create_update_delete() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.md"), "# Alpha\n\nHello world.").unwrap();
        fs::write(tmp.path().join("b.md"), "# Beta\n\nNew body.").unwrap();
        let store = InMemoryStore::new();
        store.seed(&stored("b", "feishu"));
        store.seed(&stored("c", "feishu"));

        let report = run(&store, tmp.path()).await;
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.deleted, 1);
        assert!(report.is_clean());

        assert_eq!(store.get("a").unwrap().title, "Alpha");
        assert_eq!(store.get("b").unwrap().title, "Beta");
        assert!(store.get("c").is_none());
    }

    #[tokio::test]
    async fn second_run_is_unchanged() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("a.md"),
            "---\ndate: \"2024-05-01\"\n---\n# Alpha\n\nHello.",
        )
        .unwrap();
        let store = InMemoryStore::new();

        let first = run(&store, tmp.path()).await;
        assert_eq!(first.created, 1);
        let updated_at = store.get("a").unwrap().updated_at;

        let second = run(&store, tmp.path()).await;
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.created + second.updated + second.deleted, 0);
        assert_eq!(store.get("a").unwrap().updated_at, updated_at);
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("bad.md"), [0xffu8, 0xfe]).unwrap();
        fs::write(tmp.path().join("broken.md"), "# Broken").unwrap();
        fs::write(tmp.path().join("good.md"), "# Good").unwrap();
        let store = InMemoryStore::new();
        store.fail_writes_for("broken");
        store.seed(&stored("gone", "feishu"));
        store.fail_writes_for("gone");

        let report = run(&store, tmp.path()).await;
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].slug, "bad");
        assert_eq!(report.skipped[0].stage, FailureStage::Read);

        let stages: Vec<_> = report
            .failed
            .iter()
            .map(|f| (f.slug.as_str(), f.stage))
            .collect();
        assert_eq!(
            stages,
            vec![("gone", FailureStage::Delete), ("broken", FailureStage::Create)]
        );
        assert!(store.get("good").is_some());
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn native_posts_are_not_deleted() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        store.seed(&stored("about", NATIVE_POST_TYPE));
        store.seed(&stored("x", "feishu"));

        let report = run(&store, tmp.path()).await;
        assert_eq!(report.deleted, 1);
        assert!(store.get("about").is_some());
    }

    #[tokio::test]
    async fn slug_held_by_native_post_fails_create() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("about.md"), "# About").unwrap();
        let store = InMemoryStore::new();
        store.seed(&stored("about", NATIVE_POST_TYPE));

        let report = run(&store, tmp.path()).await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].stage, FailureStage::Create);
        assert_eq!(store.get("about").unwrap().post_type, NATIVE_POST_TYPE);
    }
}
