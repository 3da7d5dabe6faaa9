//! Staging directory reader.
//!
//! Lists the documents in the canonical staging directory and turns each
//! staged file into a [`Post`]. Only top-level `*.md` files are documents;
//! the index file, nested directories, and assets are ignored.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use blog_sync_core::extract::{extract_excerpt, extract_title};
use blog_sync_core::frontmatter;
use blog_sync_core::models::Post;

/// A document file found in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedDocument {
    /// File stem; the document's identity.
    pub slug: String,
    pub path: PathBuf,
}

/// List staged documents, sorted by slug.
///
/// A missing staging directory is an error: treating it as empty would
/// delete every synchronized post.
pub async fn list_staged(dir: &Path, index_file: &str) -> Result<Vec<StagedDocument>> {
    if !dir.is_dir() {
        bail!("Staging directory does not exist: {}", dir.display());
    }

    let mut docs = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list staging directory: {}", dir.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        if !file_type.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            tracing::warn!(file = ?file_name, "skipping staged file with non UTF-8 name");
            continue;
        };
        if name == index_file {
            continue;
        }
        let Some(slug) = name.strip_suffix(".md") else {
            continue;
        };
        if slug.is_empty() {
            continue;
        }
        docs.push(StagedDocument {
            slug: slug.to_string(),
            path: entry.path(),
        });
    }

    docs.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(docs)
}

/// Read one staged file and derive the post it describes.
///
/// Explicit metadata wins; otherwise the title and excerpt are extracted
/// from the body and the date falls back to the file's creation time.
pub async fn load_post(doc: &StagedDocument, post_type: &str) -> Result<Post> {
    let raw = tokio::fs::read_to_string(&doc.path)
        .await
        .with_context(|| format!("Failed to read staged file: {}", doc.path.display()))?;
    let parsed = frontmatter::parse(&raw);
    let meta = parsed.front_matter.unwrap_or_default();
    let body = parsed.body;

    let title = meta.title.clone().unwrap_or_else(|| extract_title(body));
    let excerpt = meta
        .excerpt
        .clone()
        .unwrap_or_else(|| extract_excerpt(body));
    let date = match meta.date_utc() {
        Some(date) => date,
        None => file_created_at(&doc.path).await?,
    };

    Ok(Post::new(
        doc.slug.clone(),
        title,
        date,
        excerpt,
        body,
        post_type,
        meta.tags,
    ))
}

/// Creation time, or modification time where the platform has no birth time.
async fn file_created_at(path: &Path) -> Result<DateTime<Utc>> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to stat staged file: {}", path.display()))?;
    let time = metadata.created().or_else(|_| metadata.modified())?;
    Ok(DateTime::<Utc>::from(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blog_sync_core::extract::FALLBACK_TITLE;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn lists_only_top_level_documents() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        fs::write(dir.join("b.md"), "# B").unwrap();
        fs::write(dir.join("a.md"), "# A").unwrap();
        fs::write(dir.join("SUMMARY.md"), "- [A](a.md)").unwrap();
        fs::write(dir.join("image.png"), [0u8, 1, 2]).unwrap();
        fs::write(dir.join("notes.MD"), "upper-case extension").unwrap();
        fs::create_dir(dir.join("nested.md")).unwrap();
        fs::create_dir(dir.join("sub")).unwrap();
        fs::write(dir.join("sub").join("c.md"), "# C").unwrap();

        let docs = list_staged(dir, "SUMMARY.md").await.unwrap();
        let slugs: Vec<&str> = docs.iter().map(|d| d.slug.as_str()).collect();
        assert_eq!(slugs, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = list_staged(&tmp.path().join("nope"), "SUMMARY.md")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn metadata_takes_precedence() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("post.md");
        fs::write(
            &path,
            "---\ntitle: \"From Meta\"\ndate: \"2024-01-02\"\ntags: [\"飞书\", \"rust\"]\n---\n# Heading\n\nFirst paragraph.\n",
        )
        .unwrap();
        let doc = StagedDocument {
            slug: "post".to_string(),
            path,
        };

        let post = load_post(&doc, "feishu").await.unwrap();
        assert_eq!(post.title, "From Meta");
        assert_eq!(post.excerpt, "First paragraph.");
        assert_eq!(post.content, "# Heading\n\nFirst paragraph.\n");
        assert_eq!(post.date.to_rfc3339(), "2024-01-02T00:00:00+00:00");
        assert_eq!(post.tags, vec!["rust".to_string(), "飞书".to_string()]);
        assert_eq!(post.post_type, "feishu");
    }

    #[tokio::test]
    async fn falls_back_to_extraction_and_file_time() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.md");
        fs::write(&path, "no heading here\n\nsecond").unwrap();
        let doc = StagedDocument {
            slug: "plain".to_string(),
            path,
        };

        let before = Utc::now() - chrono::Duration::minutes(5);
        let post = load_post(&doc, "feishu").await.unwrap();
        assert_eq!(post.title, FALLBACK_TITLE);
        assert_eq!(post.excerpt, "no heading here");
        assert!(post.date > before);
    }

    #[tokio::test]
    async fn unreadable_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("binary.md");
        fs::write(&path, [0xffu8, 0xfe, 0x00]).unwrap();
        let doc = StagedDocument {
            slug: "binary".to_string(),
            path,
        };
        assert!(load_post(&doc, "feishu").await.is_err());
    }
}
