//! Error types for shardstore
//!
//! This module defines the error hierarchy shared by the coordinator,
//! the storage nodes and the client:
//! - Routing failures (node unreachable)
//! - Storage failures (missing path, write errors)
//! - Archive builder failures
//! - Wire protocol errors
//! - Configuration errors
//!
//! Every error maps onto a [`Status`] so that framed sessions can report it
//! to the peer. Legacy sessions have no status frame and degrade to short
//! or empty transfers instead.

use crate::namespace::Category;
use crate::protocol::Status;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for shardstore
#[derive(Error, Debug)]
pub enum StoreError {
    /// A storage node could not be reached
    #[error("Failed to connect to {category} node at {addr}: {reason}")]
    ConnectFailed {
        category: Category,
        addr: String,
        reason: String,
    },

    /// Path absent on read or delete
    #[error("Path not found: '{}'", path.display())]
    NotFound { path: PathBuf },

    /// Directory creation or file write failed
    #[error("Failed to write '{}': {reason}", path.display())]
    WriteFailed { path: PathBuf, reason: String },

    /// Archive builder errors
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Wire protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The peer answered a framed request with a failure status
    #[error("Remote reported {0}")]
    Remote(Status),

    /// I/O errors on the connection itself
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Status frame reported to the peer for this error
    pub fn status(&self) -> Status {
        match self {
            StoreError::ConnectFailed { .. } => Status::ConnectFailed,
            StoreError::NotFound { .. } => Status::NotFound,
            StoreError::WriteFailed { .. } => Status::WriteFailed,
            StoreError::Archive(_) => Status::ArchiveFailed,
            StoreError::Protocol(_) | StoreError::Config(_) => Status::Unrecognized,
            StoreError::Remote(status) => *status,
            StoreError::Io(_) => Status::WriteFailed,
        }
    }

    /// Check if the error left the connection unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Io(_))
    }
}

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Command line contained no tokens
    #[error("Empty command line")]
    EmptyCommand,

    /// First token is not a known operation
    #[error("Unknown command '{command}'")]
    UnknownCommand { command: String },

    /// Operation is missing a required argument
    #[error("Command '{command}' requires argument <{argument}>")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    /// File name has no extension or one outside the category table
    #[error("Unrecognized file type for '{name}'")]
    UnrecognizedExtension { name: String },

    /// Command line exceeded the maximum length before a newline
    #[error("Command line longer than {limit} bytes")]
    LineTooLong { limit: usize },

    /// Command line is not valid UTF-8
    #[error("Command line is not valid UTF-8")]
    InvalidUtf8,

    /// Status byte outside the known table
    #[error("Invalid status byte {0}")]
    InvalidStatus(u8),
}

/// Archive builder errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The external archiver could not be started
    #[error("Failed to run '{program}': {reason}")]
    Spawn { program: String, reason: String },

    /// The external archiver exited unsuccessfully
    #[error("'{program}' exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Reading the namespace root or writing the archive failed
    #[error("I/O error while archiving '{}': {source}", root.display())]
    Io {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking builder task died
    #[error("Archive task panicked")]
    TaskPanicked,
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid chunk size
    #[error("Invalid chunk size {size}: must be between {min} and {max}")]
    InvalidChunkSize { size: usize, min: usize, max: usize },

    /// Could not parse a `--node` specification
    #[error("Invalid node address '{spec}': {reason}")]
    InvalidNodeAddress { spec: String, reason: String },

    /// Category name outside the fixed table
    #[error("Unknown category '{0}' (expected one of: c, pdf, txt)")]
    UnknownCategory(String),

    /// No home directory available for `~` expansion
    #[error("No home directory: set SHARDSTORE_HOME or HOME, or pass --home")]
    NoHomeDirectory,

    /// A remote category has no node address
    #[error("No node address configured for category {0}")]
    MissingNode(Category),
}

/// Result type alias for StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Result type alias for ArchiveError
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;
