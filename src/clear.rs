//! `blogsync clear`: wipe every post and tag.
//!
//! Removes native posts too. Refuses to run without `--yes`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

pub async fn run_clear(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        bail!(
            "refusing to delete all posts and tags in {} without --yes",
            config.db.path.display()
        );
    }

    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool).await?;
    let store = SqliteStore::new(pool);
    let result = store.clear_all().await;
    store.pool().close().await;
    let (posts, tags) = result?;

    tracing::info!(posts, tags, "database cleared");
    println!("clear");
    println!("  posts deleted: {}", posts);
    println!("  tags deleted: {}", tags);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn refuses_without_confirmation() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.db.path = tmp.path().join("blog.sqlite");

        let err = run_clear(&config, false).await.unwrap_err();
        assert!(err.to_string().contains("--yes"));
        assert!(!config.db.path.exists());
    }
}
