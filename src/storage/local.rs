//! Filesystem operations against one namespace root
//!
//! `LocalStore` is what a storage node does with its own files, and what
//! the coordinator does with files of its own category. It never touches
//! another category's root.

use crate::error::{ArchiveError, Result, StoreError};
use crate::namespace::Category;
use crate::protocol::PayloadReader;
use crate::storage::archive::ArchiveBuilder;
use humansize::{format_size, BINARY};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::fs::{self, File};
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

/// Files of one category under one namespace root
#[derive(Debug, Clone)]
pub struct LocalStore {
    /// Category this store owns
    category: Category,

    /// Namespace root directory
    root: PathBuf,

    /// Builder used for `dtar`
    archiver: Arc<dyn ArchiveBuilder>,
}

impl LocalStore {
    /// Open a store, creating the namespace root if needed
    pub async fn open(
        category: Category,
        root: impl Into<PathBuf>,
        archiver: Arc<dyn ArchiveBuilder>,
    ) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::WriteFailed {
                path: root.clone(),
                reason: e.to_string(),
            })?;

        debug!(category = %category, root = %root.display(), "Opened namespace root");

        Ok(Self {
            category,
            root,
            archiver,
        })
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write an incoming payload to `path`, replacing any existing file
    ///
    /// Missing parent directories are created first (best effort). When
    /// the file cannot be created the payload is drained anyway so the
    /// connection stays in sync.
    pub async fn put<R>(&self, path: &Path, payload: &mut PayloadReader<'_, R>) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        if let Some(parent) = path.parent() {
            create_dirs(parent).await;
        }

        let mut file = match File::create(path).await {
            Ok(file) => file,
            Err(e) => {
                let dropped = payload.drain().await?;
                warn!(
                    path = %path.display(),
                    error = %e,
                    dropped_bytes = dropped,
                    "Failed to open file for writing"
                );
                return Err(StoreError::WriteFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        let written = payload.copy_to(&mut file).await?;
        file.sync_all().await.map_err(|e| StoreError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        info!(
            path = %path.display(),
            size = %format_size(written, BINARY),
            "Stored file"
        );
        Ok(written)
    }

    /// Open a file for streaming; returns the handle and its length
    pub async fn get(&self, path: &Path) -> Result<(File, u64)> {
        let not_found = || StoreError::NotFound {
            path: path.to_path_buf(),
        };

        let file = File::open(path).await.map_err(|e| {
            debug!(path = %path.display(), error = %e, "Cannot open file for reading");
            not_found()
        })?;
        let meta = file.metadata().await.map_err(|_| not_found())?;
        if !meta.is_file() {
            return Err(not_found());
        }
        Ok((file, meta.len()))
    }

    /// Remove a file
    pub async fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => {
                info!(path = %path.display(), "Deleted file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "Delete of missing file");
                Err(StoreError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "File deletion failed");
                Err(StoreError::WriteFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Files of this category directly under `dir`, as `<dir>/<name>`
    ///
    /// Not recursive. A directory that does not exist lists as empty.
    pub async fn list(&self, dir: &str) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir, error = %e, "Could not open directory");
                return Ok(Vec::new());
            }
        };

        let base = if dir.len() > 1 {
            dir.trim_end_matches('/')
        } else {
            ""
        };
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.category.matches(&name) {
                continue;
            }
            if entry.file_type().await?.is_file() {
                found.push(format!("{}/{}", base, name));
            }
        }
        found.sort();
        Ok(found)
    }

    /// Build an archive of every file of this category under the root
    ///
    /// The archive lives in a temporary file removed when the handle drops.
    pub async fn archive(&self) -> Result<NamedTempFile> {
        let scratch = tempfile::Builder::new()
            .prefix("shardstore-")
            .suffix(".tar")
            .tempfile()?;

        let archiver = Arc::clone(&self.archiver);
        let root = self.root.clone();
        let category = self.category;

        let (scratch, result) = tokio::task::spawn_blocking(move || {
            let result = archiver.build(&root, category, scratch.path());
            (scratch, result)
        })
        .await
        .map_err(|_| ArchiveError::TaskPanicked)?;

        let members = result?;
        info!(category = %category, members = members, "Built archive");
        Ok(scratch)
    }
}

/// Create every missing directory of `dir`, one component at a time
///
/// Components that already exist are fine; any other failure is logged and
/// the walk continues, leaving the final write to report the problem.
async fn create_dirs(dir: &Path) {
    let mut current = PathBuf::new();
    for component in dir.components() {
        current.push(component);
        if !matches!(component, Component::Normal(_)) {
            continue;
        }
        if fs::metadata(&current).await.is_ok() {
            continue;
        }
        match fs::create_dir(&current).await {
            Ok(()) => debug!(dir = %current.display(), "Created directory"),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => warn!(dir = %current.display(), error = %e, "Failed to create directory"),
        }
    }
}
