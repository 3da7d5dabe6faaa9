//! Storage abstraction for posts and tags.
//!
//! The [`PostStore`] trait is the boundary between the sync pipeline and the
//! persistence layer shared with the blog's CRUD API. Every method is a
//! single-record (or single filtered list) operation; there is no batch API.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Post, PostSummary, StoredPost};

/// Abstract post storage.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_by_type`](PostStore::list_by_type) | Slug + title of every post of one type |
/// | [`find_by_slug_and_type`](PostStore::find_by_slug_and_type) | Full post lookup |
/// | [`create`](PostStore::create) | Insert a new post and link its tags |
/// | [`update`](PostStore::update) | Overwrite a post's fields and tag links |
/// | [`delete`](PostStore::delete) | Remove a post and its tag links |
///
/// Tags are connect-or-create: linking a tag name that does not exist yet
/// creates it. Removing a post never removes tag records.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Summaries of all posts with the given type, ordered by slug.
    async fn list_by_type(&self, post_type: &str) -> Result<Vec<PostSummary>>;

    /// The post with this slug, if it exists and has the given type.
    async fn find_by_slug_and_type(&self, slug: &str, post_type: &str)
        -> Result<Option<StoredPost>>;

    /// Insert a new post. Fails if the slug is already taken by any post.
    async fn create(&self, post: &Post) -> Result<()>;

    /// Overwrite title, excerpt, content, date, type, hash, and tag links of
    /// the post with `post.slug`. Returns `false` if no such post exists.
    async fn update(&self, post: &Post) -> Result<bool>;

    /// Delete the post with this slug and type. Returns `false` if none matched.
    async fn delete(&self, slug: &str, post_type: &str) -> Result<bool>;
}
