//! Core data models shared by the sync pipeline and its storage backends.
//!
//! A [`Post`] is the normalized record derived from one staged file. Stores
//! hand back [`PostSummary`] values for the reconciliation phase and
//! [`StoredPost`] values for full lookups.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Provenance tag for posts whose lifecycle is owned by the export pipeline.
pub const SYNCED_POST_TYPE: &str = "feishu";

/// Provenance tag for manually authored posts.
pub const NATIVE_POST_TYPE: &str = "blog";

/// A post ready to be written to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub slug: String,
    pub title: String,
    pub date: DateTime<Utc>,
    pub excerpt: String,
    pub content: String,
    pub post_type: String,
    pub tags: Vec<String>,
    /// SHA-256 over the fields a sync can change. See [`content_hash`].
    pub content_hash: String,
}

impl Post {
    /// Build a post and compute its content hash.
    ///
    /// Tags are deduplicated and sorted so the hash does not depend on the
    /// order they were listed in the metadata block.
    pub fn new(
        slug: impl Into<String>,
        title: impl Into<String>,
        date: DateTime<Utc>,
        excerpt: impl Into<String>,
        content: impl Into<String>,
        post_type: impl Into<String>,
        mut tags: Vec<String>,
    ) -> Self {
        tags.sort();
        tags.dedup();
        let title = title.into();
        let excerpt = excerpt.into();
        let content = content.into();
        let content_hash = content_hash(&title, &excerpt, &content, date, &tags);
        Self {
            slug: slug.into(),
            title,
            date,
            excerpt,
            content,
            post_type: post_type.into(),
            tags,
            content_hash,
        }
    }
}

/// The slice of a stored post the reconciliation phase works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSummary {
    pub slug: String,
    pub title: String,
    /// [`content_hash`] of the row's current title, excerpt, content, date,
    /// and tags. Computed from the stored values, never read from the
    /// `content_hash` column, so edits made outside the sync still count.
    pub values_hash: String,
}

/// A full post row as held by a store.
#[derive(Debug, Clone, Serialize)]
pub struct StoredPost {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub date: DateTime<Utc>,
    pub excerpt: String,
    pub content: String,
    pub post_type: String,
    pub published: bool,
    pub tags: Vec<String>,
    /// Hash recorded by the last sync write. Stale once the row is edited
    /// elsewhere, and `None` for rows the sync never wrote.
    pub content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredPost {
    pub fn summary(&self) -> PostSummary {
        PostSummary {
            slug: self.slug.clone(),
            title: self.title.clone(),
            values_hash: self.values_hash(),
        }
    }

    /// Hash of the values currently stored, comparable with [`Post::content_hash`].
    pub fn values_hash(&self) -> String {
        let mut tags = self.tags.clone();
        tags.sort();
        tags.dedup();
        content_hash(&self.title, &self.excerpt, &self.content, self.date, &tags)
    }
}

/// Hash the sync-owned fields of a post.
pub fn content_hash(
    title: &str,
    excerpt: &str,
    content: &str,
    date: DateTime<Utc>,
    tags: &[String],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0u8]);
    hasher.update(excerpt.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hasher.update([0u8]);
    hasher.update(date.timestamp().to_le_bytes());
    for tag in tags {
        hasher.update([0u8]);
        hasher.update(tag.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
