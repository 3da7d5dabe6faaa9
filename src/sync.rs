//! Sync pipeline orchestration.
//!
//! Coordinates the full run: exporter → staging → reconciliation → apply.
//!
//! ```text
//! credentials ─▶ lock ─▶ export ─▶ schema ─▶ load existing ─▶ load staged
//!                                                 │
//!                             apply ◀── plan ◀────┘
//! ```
//!
//! Every phase completes before the next starts. A fatal error (config,
//! lock, exporter, database) aborts the run before storage is written;
//! per-record problems end up in the returned [`SyncReport`].

use anyhow::{Context, Result};
use std::collections::HashMap;

use blog_sync_core::plan::{ReconcilePhase, SyncPlan, UpsertAction};
use blog_sync_core::store::PostStore;

use crate::apply::{self, SyncReport};
use crate::config::Config;
use crate::db;
use crate::exporter;
use crate::lock::SyncLock;
use crate::migrate;
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::sqlite_store::SqliteStore;
use crate::staging::{self, StagedDocument};

/// Flags for one `blogsync sync` invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Reconcile the existing staging directory without running the exporter.
    pub skip_export: bool,
    /// Print the plan and leave storage untouched.
    pub dry_run: bool,
    /// Skip the single-flight lock.
    pub no_lock: bool,
}

/// Run the pipeline against the configured SQLite database.
///
/// Returns `None` for a dry run, otherwise the applied report.
pub async fn run_sync(
    config: &Config,
    options: SyncOptions,
    progress: &dyn SyncProgressReporter,
) -> Result<Option<SyncReport>> {
    if !options.skip_export {
        // Reported before the lock or any filesystem work.
        config.exporter.credentials()?;
    }

    let _lock = if options.no_lock {
        None
    } else {
        Some(SyncLock::acquire(&config.sync.lock_path(&config.db))?)
    };

    if !options.skip_export {
        progress.report(SyncProgressEvent::Exporting);
        let outcome = exporter::run_export(config).await?;
        println!(
            "export: {} documents ({} headers added), {} assets",
            outcome.summary.documents, outcome.summary.headers_added, outcome.summary.assets
        );
    }

    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool).await?;
    let store = SqliteStore::new(pool);

    let result = reconcile(&store, config, options.dry_run, progress).await;
    store.pool().close().await;
    result
}

/// Reconcile staging against `store` and apply the plan (unless `dry_run`).
pub async fn reconcile(
    store: &dyn PostStore,
    config: &Config,
    dry_run: bool,
    progress: &dyn SyncProgressReporter,
) -> Result<Option<SyncReport>> {
    let post_type = config.sync.post_type.as_str();
    progress.report(SyncProgressEvent::Reconciling {
        post_type: post_type.to_string(),
    });

    tracing::info!(phase = ReconcilePhase::LoadExisting.as_str(), post_type, "reconciling");
    let existing = store
        .list_by_type(post_type)
        .await
        .context("Failed to load existing posts")?;

    tracing::info!(
        phase = ReconcilePhase::LoadStaged.as_str(),
        dir = %config.staging.dir.display(),
        existing = existing.len(),
        "reconciling"
    );
    let staged = staging::list_staged(&config.staging.dir, &config.staging.index_file).await?;

    let plan = SyncPlan::build(existing, staged.iter().map(|d| d.slug.clone()).collect());
    tracing::info!(
        phase = ReconcilePhase::ComputeDeleteSet.as_str(),
        to_delete = plan.to_delete().len(),
        "reconciling"
    );
    tracing::info!(
        phase = ReconcilePhase::ComputeUpsertSet.as_str(),
        to_create = plan.create_count(),
        to_update = plan.update_count(),
        "reconciling"
    );
    tracing::info!(phase = ReconcilePhase::Done.as_str(), "plan ready");

    if dry_run {
        print_plan(&plan, post_type);
        return Ok(None);
    }

    let docs: HashMap<String, StagedDocument> = staged
        .into_iter()
        .map(|doc| (doc.slug.clone(), doc))
        .collect();
    let report = apply::apply_plan(store, &plan, &docs, post_type, progress).await;
    Ok(Some(report))
}

fn print_plan(plan: &SyncPlan, post_type: &str) {
    println!("sync {} (dry-run)", post_type);
    println!("  to create: {}", plan.create_count());
    println!("  to update: {}", plan.update_count());
    println!("  to delete: {}", plan.to_delete().len());
    for (slug, action) in plan.upserts() {
        let label = match action {
            UpsertAction::Create => "create",
            UpsertAction::Update => "update",
        };
        println!("    {} {}", label, slug);
    }
    for summary in plan.to_delete() {
        println!("    delete {} ({})", summary.slug, summary.title);
    }
}

/// `blogsync export`: run only the exporter.
pub async fn run_export_only(config: &Config, no_lock: bool) -> Result<()> {
    config.exporter.credentials()?;
    let _lock = if no_lock {
        None
    } else {
        Some(SyncLock::acquire(&config.sync.lock_path(&config.db))?)
    };
    let outcome = exporter::run_export(config).await?;
    println!("export");
    println!("  staging: {}", outcome.staging_dir.display());
    println!("  documents: {}", outcome.summary.documents);
    println!("  headers added: {}", outcome.summary.headers_added);
    println!("  assets: {}", outcome.summary.assets);
    println!("ok");
    Ok(())
}
