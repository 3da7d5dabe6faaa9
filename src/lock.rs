//! Single-flight guard for sync runs.
//!
//! A lock file is created exclusively at the start of a run and removed
//! when the guard drops. A second run started while the file exists fails
//! with [`LockError::Held`] instead of interleaving writes.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error(
        "another sync appears to be running (lock file {} exists{}); remove it if that run is gone",
        .path.display(),
        held_by(.holder)
    )]
    Held {
        path: PathBuf,
        holder: Option<String>,
    },

    #[error("failed to create lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn held_by(holder: &Option<String>) -> String {
    match holder {
        Some(pid) => format!(", held by pid {}", pid),
        None => String::new(),
    }
}

/// Held for the duration of a sync run.
#[derive(Debug)]
pub struct SyncLock {
    path: PathBuf,
}

impl SyncLock {
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                if let Err(e) = write_holder(&mut file) {
                    // The lock still holds; only the pid hint for a blocked run is lost.
                    tracing::warn!(lock = %path.display(), error = %e, "failed to record pid in sync lock");
                }
                tracing::debug!(lock = %path.display(), "acquired sync lock");
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(LockError::Held {
                path: path.to_path_buf(),
                holder: std::fs::read_to_string(path)
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
            }),
            Err(source) => Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_holder(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{}", std::process::id())?;
    out.flush()
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to remove sync lock");
        }
    }
}
