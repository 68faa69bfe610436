//! shardstore - Type-Sharded File Store
//!
//! A client talks to a single coordinator, which partitions files across
//! storage nodes by extension. Each node exclusively owns one namespace
//! root; the coordinator serves its own category and forwards everything
//! else, rewriting `~/smain/...` paths into the owning node's root.
//!
//! # Features
//!
//! - **Single Entry Point**: Clients only ever address `~/smain`; the
//!   coordinator routes `.pdf` and `.txt` requests transparently.
//!
//! - **Five Operations**: Upload, download, delete, archive by extension
//!   and a merged directory listing across all nodes.
//!
//! - **Two Framings**: The legacy short-read discipline, or length-prefixed
//!   payloads with a status byte that report every failure to the client.
//!
//! - **Task per Connection**: Sessions never block one another; archive
//!   builds run on the blocking pool.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Client                              │
//! │        ufile / dfile / rmfile / dtar / display / exit        │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ :6060
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Coordinator                           │
//! │   classify ─▶ rewrite ~/smain ─▶ local store or proxy        │
//! │   ┌────────────────┐                                         │
//! │   │ LocalStore (.c)│                                         │
//! │   │   ~/smain      │                                         │
//! │   └────────────────┘                                         │
//! └───────────────┬───────────────────────────────┬──────────────┘
//!                 │ :6061                         │ :6062
//!                 ▼                               ▼
//!   ┌──────────────────────────┐    ┌──────────────────────────┐
//!   │  StorageNode (.pdf)      │    │  StorageNode (.txt)      │
//!   │    ~/spdf                │    │    ~/stext               │
//!   └──────────────────────────┘    └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Start the nodes and the coordinator
//! shardstore node pdf &
//! shardstore node txt &
//! shardstore coordinator &
//!
//! # Store, list and fetch back
//! shardstore client upload notes.txt ~/smain/work
//! shardstore client display ~/smain/work
//! shardstore client download ~/smain/work/notes.txt
//! ```

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod namespace;
pub mod node;
pub mod protocol;
pub mod server;
pub mod storage;

pub use client::StoreClient;
pub use config::{CliArgs, NodeAddr, StoreConfig};
pub use coordinator::Coordinator;
pub use error::{Result, StoreError};
pub use namespace::{classify, Category, Namespace};
pub use node::StorageNode;
pub use protocol::{Framing, Status, Wire};
