//! Archive builders
//!
//! Given a namespace root and a category, produce a tar archive of every
//! file of that category under the root. Member names are relative to the
//! root, so `<root>/work/notes.txt` is stored as `work/notes.txt`.
//!
//! Two builders are provided:
//! - [`ExternalTar`] runs the system `tar` with a NUL-separated file list
//!   on stdin (`--null -T -`)
//! - [`BuiltinTar`] writes the archive in-process with the `tar` crate
//!
//! Builders are blocking; callers run them on `spawn_blocking`.

use crate::error::{ArchiveError, ArchiveResult};
use crate::namespace::Category;
use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Produces a tar archive of one category's files
pub trait ArchiveBuilder: Send + Sync + Debug {
    /// Write the archive to `output`; returns the number of members
    fn build(&self, root: &Path, category: Category, output: &Path) -> ArchiveResult<usize>;
}

/// Runs an external `tar` program
#[derive(Debug, Clone)]
pub struct ExternalTar {
    program: PathBuf,
}

impl ExternalTar {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ExternalTar {
    fn default() -> Self {
        Self::new("tar")
    }
}

impl ArchiveBuilder for ExternalTar {
    fn build(&self, root: &Path, category: Category, output: &Path) -> ArchiveResult<usize> {
        let files = collect_files(root, category)?;
        let program = self.program.display().to_string();

        debug!(
            program = %program,
            root = %root.display(),
            files = files.len(),
            "Running external archiver"
        );

        let mut child = Command::new(&self.program)
            .arg("-cf")
            .arg(output)
            .arg("-C")
            .arg(root)
            .arg("--null")
            .arg("-T")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ArchiveError::Spawn {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        // NUL-terminated names: newlines and leading dashes stay part of the
        // name. Dropping stdin closes the list.
        if let Some(mut stdin) = child.stdin.take() {
            for file in &files {
                stdin
                    .write_all(file.as_os_str().as_encoded_bytes())
                    .and_then(|()| stdin.write_all(b"\0"))
                    .map_err(|source| ArchiveError::Io {
                        root: root.to_path_buf(),
                        source,
                    })?;
            }
        }

        let result = child.wait_with_output().map_err(|source| ArchiveError::Io {
            root: root.to_path_buf(),
            source,
        })?;

        if !result.status.success() {
            return Err(ArchiveError::Failed {
                program,
                code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        Ok(files.len())
    }
}

/// Builds the archive in-process
#[derive(Debug, Clone, Default)]
pub struct BuiltinTar;

impl ArchiveBuilder for BuiltinTar {
    fn build(&self, root: &Path, category: Category, output: &Path) -> ArchiveResult<usize> {
        let io_err = |source| ArchiveError::Io {
            root: root.to_path_buf(),
            source,
        };

        let files = collect_files(root, category)?;
        let out = fs::File::create(output).map_err(io_err)?;
        let mut builder = tar::Builder::new(out);
        for rel in &files {
            builder
                .append_path_with_name(root.join(rel), rel)
                .map_err(io_err)?;
        }
        builder.into_inner().map_err(io_err)?.sync_all().map_err(io_err)?;

        Ok(files.len())
    }
}

/// Every regular file of `category` under `root`, relative to `root`, sorted
///
/// Symbolic links are not followed.
pub fn collect_files(root: &Path, category: Category) -> ArchiveResult<Vec<PathBuf>> {
    let io_err = |source| ArchiveError::Io {
        root: root.to_path_buf(),
        source,
    };

    let mut found = Vec::new();
    let mut pending = vec![PathBuf::new()];

    while let Some(rel_dir) = pending.pop() {
        for entry in fs::read_dir(root.join(&rel_dir)).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let file_type = entry.file_type().map_err(io_err)?;
            let rel = rel_dir.join(entry.file_name());

            if file_type.is_dir() {
                pending.push(rel);
            } else if file_type.is_file() && category.matches(&entry.file_name().to_string_lossy())
            {
                found.push(rel);
            }
        }
    }

    found.sort();
    Ok(found)
}
