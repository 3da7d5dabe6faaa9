//! In-memory [`PostStore`] implementation for tests and dry runs.
//!
//! Uses `BTreeMap`s behind `std::sync::RwLock`. Writes for selected slugs
//! can be made to fail, which lets callers exercise per-record error
//! isolation without a database.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Post, PostSummary, StoredPost};

use super::PostStore;

/// In-memory post and tag store.
pub struct InMemoryStore {
    posts: RwLock<BTreeMap<String, StoredPost>>,
    tags: RwLock<BTreeSet<String>>,
    failing: RwLock<HashSet<String>>,
    next_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            posts: RwLock::new(BTreeMap::new()),
            tags: RwLock::new(BTreeSet::new()),
            failing: RwLock::new(HashSet::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Insert a post directly, bypassing the slug uniqueness check of
    /// [`PostStore::create`] (used to seed native posts).
    pub fn seed(&self, post: &Post) {
        let stored = self.to_stored(post, Utc::now());
        self.link_tags(&post.tags);
        self.write_posts().insert(post.slug.clone(), stored);
    }

    /// Make every subsequent write touching `slug` fail.
    pub fn fail_writes_for(&self, slug: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(slug.to_string());
        }
    }

    /// All posts, ordered by slug.
    pub fn posts(&self) -> Vec<StoredPost> {
        self.read_posts().values().cloned().collect()
    }

    pub fn get(&self, slug: &str) -> Option<StoredPost> {
        self.read_posts().get(slug).cloned()
    }

    /// All tag names, ordered.
    pub fn tag_names(&self) -> Vec<String> {
        match self.tags.read() {
            Ok(tags) => tags.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    fn to_stored(&self, post: &Post, created_at: DateTime<Utc>) -> StoredPost {
        StoredPost {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            slug: post.slug.clone(),
            title: post.title.clone(),
            date: post.date,
            excerpt: post.excerpt.clone(),
            content: post.content.clone(),
            post_type: post.post_type.clone(),
            published: true,
            tags: post.tags.clone(),
            content_hash: Some(post.content_hash.clone()),
            created_at,
            updated_at: Utc::now(),
        }
    }

    fn link_tags(&self, names: &[String]) {
        let mut tags = match self.tags.write() {
            Ok(tags) => tags,
            Err(poisoned) => poisoned.into_inner(),
        };
        tags.extend(names.iter().cloned());
    }

    fn check_failing(&self, slug: &str) -> Result<()> {
        let failing = self
            .failing
            .read()
            .map_err(|_| anyhow!("failing-slug lock poisoned"))?;
        if failing.contains(slug) {
            bail!("injected write failure for '{}'", slug);
        }
        Ok(())
    }

    fn read_posts(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, StoredPost>> {
        match self.posts.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_posts(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, StoredPost>> {
        match self.posts.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostStore for InMemoryStore {
    async fn list_by_type(&self, post_type: &str) -> Result<Vec<PostSummary>> {
        Ok(self
            .read_posts()
            .values()
            .filter(|p| p.post_type == post_type)
            .map(StoredPost::summary)
            .collect())
    }

    async fn find_by_slug_and_type(
        &self,
        slug: &str,
        post_type: &str,
    ) -> Result<Option<StoredPost>> {
        Ok(self
            .read_posts()
            .get(slug)
            .filter(|p| p.post_type == post_type)
            .cloned())
    }

    async fn create(&self, post: &Post) -> Result<()> {
        self.check_failing(&post.slug)?;
        if self.read_posts().contains_key(&post.slug) {
            bail!("UNIQUE constraint failed: posts.slug ({})", post.slug);
        }
        let stored = self.to_stored(post, Utc::now());
        self.link_tags(&post.tags);
        self.write_posts().insert(post.slug.clone(), stored);
        Ok(())
    }

    async fn update(&self, post: &Post) -> Result<bool> {
        self.check_failing(&post.slug)?;
        let mut posts = self.write_posts();
        let Some(existing) = posts.get_mut(&post.slug) else {
            return Ok(false);
        };
        existing.title = post.title.clone();
        existing.date = post.date;
        existing.excerpt = post.excerpt.clone();
        existing.content = post.content.clone();
        existing.post_type = post.post_type.clone();
        existing.tags = post.tags.clone();
        existing.content_hash = Some(post.content_hash.clone());
        existing.updated_at = Utc::now();
        drop(posts);
        self.link_tags(&post.tags);
        Ok(true)
    }

    async fn delete(&self, slug: &str, post_type: &str) -> Result<bool> {
        self.check_failing(slug)?;
        let mut posts = self.write_posts();
        let matches = posts.get(slug).is_some_and(|p| p.post_type == post_type);
        if matches {
            posts.remove(slug);
        }
        Ok(matches)
    }
}
