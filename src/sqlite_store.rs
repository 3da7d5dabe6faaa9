//! SQLite-backed [`PostStore`] implementation.
//!
//! Maps each store operation onto the `posts`, `tags`, and `post_tags`
//! tables created by [`crate::migrate`]. Multi-statement operations run in a
//! transaction so a post is never left half-written.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};

use blog_sync_core::models::{Post, PostSummary, StoredPost};
use blog_sync_core::store::PostStore;

/// SQLite implementation of the [`PostStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Delete every post, tag link, and tag. Returns `(posts, tags)` removed.
    pub async fn clear_all(&self) -> Result<(u64, u64)> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM post_tags").execute(&mut *tx).await?;
        let posts = sqlx::query("DELETE FROM posts")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let tags = sqlx::query("DELETE FROM tags")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok((posts, tags))
    }

    async fn tags_for(&self, post_id: i64) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT t.name FROM tags t
            JOIN post_tags pt ON pt.tag_id = t.id
            WHERE pt.post_id = ?
            ORDER BY t.name
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn row_to_post(row: &SqliteRow, tags: Vec<String>) -> StoredPost {
    StoredPost {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        date: from_ts(row.get("date")),
        excerpt: row.get("excerpt"),
        content: row.get("content"),
        post_type: row.get("type"),
        published: row.get::<i64, _>("published") != 0,
        tags,
        content_hash: row.get("content_hash"),
        created_at: from_ts(row.get("created_at")),
        updated_at: from_ts(row.get("updated_at")),
    }
}

/// Connect-or-create each tag and link it to the post.
async fn link_tags(conn: &mut SqliteConnection, post_id: i64, tags: &[String]) -> Result<()> {
    for name in tags {
        sqlx::query("INSERT INTO tags (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&mut *conn)
            .await?;
        let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn unlink_tags(tx: &mut Transaction<'_, Sqlite>, post_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl PostStore for SqliteStore {
    async fn list_by_type(&self, post_type: &str) -> Result<Vec<PostSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, slug, title, date, excerpt, content, type, published,
                   content_hash, created_at, updated_at
            FROM posts WHERE type = ? ORDER BY slug ASC
            "#,
        )
        .bind(post_type)
        .fetch_all(&self.pool)
        .await?;

        // Hash what is stored now, so rows edited outside the sync get rewritten.
        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let tags = self.tags_for(row.get("id")).await?;
            summaries.push(row_to_post(row, tags).summary());
        }
        Ok(summaries)
    }

    async fn find_by_slug_and_type(
        &self,
        slug: &str,
        post_type: &str,
    ) -> Result<Option<StoredPost>> {
        let row = sqlx::query(
            r#"
            SELECT id, slug, title, date, excerpt, content, type, published,
                   content_hash, created_at, updated_at
            FROM posts WHERE slug = ? AND type = ?
            "#,
        )
        .bind(slug)
        .bind(post_type)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let tags = self.tags_for(row.get("id")).await?;
                Ok(Some(row_to_post(&row, tags)))
            }
            None => Ok(None),
        }
    }

    async fn create(&self, post: &Post) -> Result<()> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let post_id = sqlx::query(
            r#"
            INSERT INTO posts (slug, title, date, excerpt, content, type, published,
                               content_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(&post.slug)
        .bind(&post.title)
        .bind(post.date.timestamp())
        .bind(&post.excerpt)
        .bind(&post.content)
        .bind(&post.post_type)
        .bind(&post.content_hash)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        link_tags(&mut tx, post_id, &post.tags).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, post: &Post) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let post_id: Option<i64> = sqlx::query_scalar("SELECT id FROM posts WHERE slug = ?")
            .bind(&post.slug)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(post_id) = post_id else {
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE posts SET
                title = ?,
                date = ?,
                excerpt = ?,
                content = ?,
                type = ?,
                content_hash = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&post.title)
        .bind(post.date.timestamp())
        .bind(&post.excerpt)
        .bind(&post.content)
        .bind(&post.post_type)
        .bind(&post.content_hash)
        .bind(Utc::now().timestamp())
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

        unlink_tags(&mut tx, post_id).await?;
        link_tags(&mut tx, post_id, &post.tags).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn delete(&self, slug: &str, post_type: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let post_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM posts WHERE slug = ? AND type = ?")
                .bind(slug)
                .bind(post_type)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(post_id) = post_id else {
            return Ok(false);
        };

        // Tag records stay; only the links go.
        unlink_tags(&mut tx, post_id).await?;
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }
}
