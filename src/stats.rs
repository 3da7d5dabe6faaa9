//! Database statistics.
//!
//! A quick overview of what the blog database holds: posts per type, tags,
//! orphaned tags, and the most recent update. Used by `blogsync stats` to
//! confirm a sync landed.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeStats {
    pub post_type: String,
    pub posts: i64,
    pub last_updated: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbStats {
    pub by_type: Vec<TypeStats>,
    pub tags: i64,
    /// Tags no post links to. Sync never deletes them.
    pub orphan_tags: i64,
}

impl DbStats {
    pub fn total_posts(&self) -> i64 {
        self.by_type.iter().map(|t| t.posts).sum()
    }
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<DbStats> {
    let rows = sqlx::query(
        r#"
        SELECT type, COUNT(*) AS posts, MAX(updated_at) AS last_updated
        FROM posts
        GROUP BY type
        ORDER BY posts DESC, type ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let by_type = rows
        .iter()
        .map(|row| TypeStats {
            post_type: row.get("type"),
            posts: row.get("posts"),
            last_updated: row.get("last_updated"),
        })
        .collect();

    let tags: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags")
        .fetch_one(pool)
        .await?;
    let orphan_tags: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tags WHERE id NOT IN (SELECT DISTINCT tag_id FROM post_tags)",
    )
    .fetch_one(pool)
    .await?;

    Ok(DbStats {
        by_type,
        tags,
        orphan_tags,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool).await?;
    let stats = collect_stats(&pool).await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Blog Sync — Database Stats");
    println!("==========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Posts:       {}", stats.total_posts());
    println!("  Tags:        {} ({} orphaned)", stats.tags, stats.orphan_tags);

    if !stats.by_type.is_empty() {
        println!();
        println!("  By type:");
        println!("  {:<16} {:>6}   {}", "TYPE", "POSTS", "LAST UPDATE");
        println!("  {}", "-".repeat(44));
        for t in &stats.by_type {
            let updated = match t.last_updated {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!("  {:<16} {:>6}   {}", t.post_type, t.posts, updated);
        }
    }
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
