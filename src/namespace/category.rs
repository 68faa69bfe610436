//! File categories and the fixed extension table
//!
//! A category is the partition key of the store: every file belongs to
//! exactly one category, derived from its extension, and every category is
//! owned by exactly one node.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// File type partition key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// C source files, served by the coordinator itself
    Source,
    /// PDF documents
    Document,
    /// Plain text files
    Text,
}

impl Category {
    /// All categories in the fixed aggregation order
    pub const ALL: [Category; 3] = [Category::Source, Category::Document, Category::Text];

    /// Map an extension (without the leading dot) to its category
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "c" => Some(Category::Source),
            "pdf" => Some(Category::Document),
            "txt" => Some(Category::Text),
            _ => None,
        }
    }

    /// Extension owned by this category, without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            Category::Source => "c",
            Category::Document => "pdf",
            Category::Text => "txt",
        }
    }

    /// Directory name of this category's namespace root under the home directory
    pub fn root_segment(&self) -> &'static str {
        match self {
            Category::Source => "smain",
            Category::Document => "spdf",
            Category::Text => "stext",
        }
    }

    /// Default listening port of the component owning this category
    pub fn default_port(&self) -> u16 {
        match self {
            Category::Source => 6060,
            Category::Document => 6061,
            Category::Text => 6062,
        }
    }

    /// Parse the argument of `dtar`, accepting both `.pdf` and `pdf`
    pub fn from_filter(filter: &str) -> Option<Self> {
        Self::from_extension(filter.strip_prefix('.').unwrap_or(filter))
    }

    /// Check if a file name carries this category's extension
    pub fn matches(&self, name: &str) -> bool {
        classify(name) == Some(*self)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Category {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::from_filter(s).ok_or_else(|| ConfigError::UnknownCategory(s.to_string()))
    }
}

/// Derive the category of a file from its extension
///
/// Only the final path component is considered, so dots in directory names
/// never leak into the extension. Files without a dot, dot-files such as
/// `.profile`, and extensions outside the table yield `None`.
pub fn classify(filename: &str) -> Option<Category> {
    let name = filename.rsplit('/').next().unwrap_or(filename);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => Category::from_extension(ext),
        _ => None,
    }
}
