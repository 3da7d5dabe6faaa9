//! # Blog Sync Core
//!
//! Shared logic for the blog content sync pipeline: post models, title and
//! excerpt extraction, the front-matter codec, the reconciliation plan, and
//! the storage trait.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! runtime-specific dependencies. Everything here is a pure function over
//! values or an in-memory structure.

pub mod extract;
pub mod frontmatter;
pub mod models;
pub mod plan;
pub mod store;
