//! # Blog Sync
//!
//! Keeps the blog's SQLite database in step with a Feishu knowledge base.
//!
//! The external `feishu-pages` exporter writes markdown into a scratch
//! directory; the pipeline normalizes it into a staging directory, diffs the
//! staged documents against the stored `feishu` posts, and applies the
//! resulting creates, updates, and deletes one record at a time.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────┐   ┌────────────┐   ┌──────────┐
//! │  Exporter    │──▶│  Staging  │──▶│ Reconcile  │──▶│  SQLite  │
//! │ (subprocess) │   │  *.md     │   │ plan+apply │   │  posts   │
//! └──────────────┘   └───────────┘   └────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! blogsync init                 # create database
//! blogsync                      # export, reconcile, apply
//! blogsync sync --skip-export   # reconcile the current staging dir only
//! blogsync sync --dry-run       # print the plan
//! blogsync stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`exporter`] | Run the export tool, normalize into staging |
//! | [`staging`] | List staged documents, derive posts |
//! | [`apply`] | Execute a plan with per-record isolation |
//! | [`sync`] | Pipeline orchestration |
//! | [`sqlite_store`] | SQLite `PostStore` |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema bootstrap |
//! | [`lock`] | Single-flight run lock |
//! | [`progress`] | Progress reporting on stderr |
//! | [`get`] | Post lookup |
//! | [`stats`] | Database statistics |
//! | [`clear`] | Wipe posts and tags |
//!
//! Models, extraction, the front-matter codec, and plan computation live in
//! the `blog-sync-core` crate.

pub mod apply;
pub mod clear;
pub mod config;
pub mod db;
pub mod exporter;
pub mod get;
pub mod lock;
pub mod migrate;
pub mod progress;
pub mod sqlite_store;
pub mod staging;
pub mod stats;
pub mod sync;

pub use blog_sync_core::{extract, frontmatter, models, plan, store};
