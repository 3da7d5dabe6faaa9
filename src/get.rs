//! Post retrieval by slug.
//!
//! Looks up one post of the synchronized type. Used by `blogsync get` to
//! check what a sync wrote.

use anyhow::{bail, Result};
use serde::Serialize;

use blog_sync_core::models::StoredPost;
use blog_sync_core::store::PostStore;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// JSON shape printed by `blogsync get --json`.
#[derive(Debug, Clone, Serialize)]
pub struct PostResponse {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub date: String, // ISO8601
    pub excerpt: String,
    #[serde(rename = "type")]
    pub post_type: String,
    pub published: bool,
    pub tags: Vec<String>,
    pub content_hash: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub content: String,
}

impl From<StoredPost> for PostResponse {
    fn from(p: StoredPost) -> Self {
        Self {
            id: p.id,
            slug: p.slug,
            title: p.title,
            date: p.date.to_rfc3339(),
            excerpt: p.excerpt,
            post_type: p.post_type,
            published: p.published,
            tags: p.tags,
            content_hash: p.content_hash,
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.to_rfc3339(),
            content: p.content,
        }
    }
}

/// Fetch a post of `post_type` by slug.
pub async fn get_post(store: &dyn PostStore, slug: &str, post_type: &str) -> Result<PostResponse> {
    match store.find_by_slug_and_type(slug, post_type).await? {
        Some(post) => Ok(post.into()),
        None => bail!("post not found: {} (type {})", slug, post_type),
    }
}

/// CLI entry point.
pub async fn run_get(config: &Config, slug: &str, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool).await?;
    let store = SqliteStore::new(pool);
    let result = get_post(&store, slug, &config.sync.post_type).await;
    store.pool().close().await;
    let post = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&post)?);
        return Ok(());
    }

    println!("--- Post ---");
    println!("id:           {}", post.id);
    println!("slug:         {}", post.slug);
    println!("title:        {}", post.title);
    println!("type:         {}", post.post_type);
    println!("date:         {}", post.date);
    println!("published:    {}", post.published);
    if !post.tags.is_empty() {
        println!("tags:         {}", post.tags.join(", "));
    }
    println!("created_at:   {}", post.created_at);
    println!("updated_at:   {}", post.updated_at);
    println!("excerpt:      {}", post.excerpt);
    println!();
    println!("--- Content ---");
    println!("{}", post.content);
    Ok(())
}
