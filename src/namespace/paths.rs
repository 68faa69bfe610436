//! Home expansion and namespace rewriting
//!
//! Paths travel over the wire as plain strings. Before any filesystem or
//! network use they are expanded (`~` to the home directory) and, when they
//! cross into another category, rewritten so that the coordinator's root
//! segment is replaced by the owning node's root segment.

use super::category::Category;
use std::path::{Path, PathBuf};

/// Marker replaced by the home directory
const HOME_MARKER: char = '~';

/// Layout of the partitioned namespace
#[derive(Debug, Clone)]
pub struct Namespace {
    /// Directory `~` expands to
    home: PathBuf,

    /// Category served by the coordinator itself
    local: Category,
}

impl Namespace {
    /// Build the layout: one `<home>/<segment>` root per category
    pub fn new(home: impl Into<PathBuf>, local: Category) -> Self {
        Self {
            home: home.into(),
            local,
        }
    }

    /// Directory the home marker resolves to
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Category served by the coordinator
    pub fn local_category(&self) -> Category {
        self.local
    }

    /// Namespace root of a category
    pub fn root_of(&self, category: Category) -> PathBuf {
        self.home.join(category.root_segment())
    }

    /// Expand a leading `~` (alone or followed by `/`) to the home directory
    ///
    /// `~user` forms and paths without the marker are returned unchanged.
    pub fn expand_home(&self, path: &str) -> String {
        let Some(rest) = path.strip_prefix(HOME_MARKER) else {
            return path.to_string();
        };
        if !rest.is_empty() && !rest.starts_with('/') {
            return path.to_string();
        }
        format!("{}{}", self.home.display(), rest)
    }

    /// Rewrite a path from the coordinator's namespace into `target`'s
    ///
    /// The first `/<local segment>` component (followed by `/` or the end of
    /// the string) is replaced by `/<target segment>`; everything before and
    /// after it is kept byte for byte. Paths that do not contain the segment
    /// are returned unchanged, so a client can still address a node by its
    /// native path.
    pub fn rewrite(&self, path: &str, target: Category) -> String {
        let from = self.local.root_segment();
        let to = target.root_segment();
        match find_segment(path, from) {
            Some(start) => {
                let end = start + 1 + from.len();
                format!("{}/{}{}", &path[..start], to, &path[end..])
            }
            None => path.to_string(),
        }
    }

    /// Expand then rewrite into `target`'s namespace
    pub fn resolve(&self, path: &str, target: Category) -> String {
        let expanded = self.expand_home(path);
        if target == self.local {
            expanded
        } else {
            self.rewrite(&expanded, target)
        }
    }
}

/// Byte offset of the first `/segment` that is a whole path component
fn find_segment(path: &str, segment: &str) -> Option<usize> {
    let needle = format!("/{}", segment);
    path.match_indices(&needle).map(|(i, _)| i).find(|&i| {
        let after = i + needle.len();
        after == path.len() || path.as_bytes()[after] == b'/'
    })
}

/// Join a destination directory and a file name the way the wire expects
pub fn join_destination(dir: &str, name: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    if dir.ends_with('/') {
        format!("{}{}", dir, base)
    } else {
        format!("{}/{}", dir, base)
    }
}
