//! Storage node: serves one category's namespace root
//!
//! Every connection carries exactly one command:
//!
//! ```text
//! AWAIT_COMMAND ──▶ DISPATCH ──┬─ ufile   ─▶ receive payload ─┐
//!                              ├─ dfile   ─▶ send file        │
//!                              ├─ dtar    ─▶ send archive     ├─▶ CLOSE
//!                              ├─ display ─▶ send listing     │
//!                              └─ rmfile  ─▶ delete           ┘
//! ```
//!
//! Requests for files of another category are refused as unrecognized.

use crate::config::StoreConfig;
use crate::error::{ProtocolError, Result, StoreError};
use crate::namespace::{classify, join_destination, Category, Namespace};
use crate::protocol::{read_command, Command, PayloadReader, Wire};
use crate::server;
use crate::storage::{report_failure, LocalStore};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Per-connection handler for one category
#[derive(Debug, Clone)]
pub struct StorageNode {
    store: LocalStore,
    namespace: Namespace,
    wire: Wire,
}

impl StorageNode {
    /// Open the node's namespace root under the configured home
    pub async fn open(config: &StoreConfig, category: Category) -> Result<Self> {
        let root = config.namespace.root_of(category);
        let store = LocalStore::open(category, root, Arc::clone(&config.archiver)).await?;
        Ok(Self {
            store,
            namespace: config.namespace.clone(),
            wire: config.wire,
        })
    }

    pub fn category(&self) -> Category {
        self.store.category()
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            category = %self.category(),
            root = %self.store.root().display(),
            framing = ?self.wire.framing,
            "Storage node ready"
        );
        let node = Arc::new(self);
        server::serve(
            listener,
            "node",
            move |stream, peer| {
                let node = Arc::clone(&node);
                async move { node.handle_connection(stream, peer).await }
            },
            shutdown,
        )
        .await
    }

    async fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = self.handle(&mut stream).await {
            warn!(peer = %peer, category = %self.category(), error = %e, "Connection failed");
        }
        let _ = stream.shutdown().await;
    }

    /// Read one command, serve it and return
    pub async fn handle<S>(&self, conn: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let wire = self.wire;
        let command = match read_command(conn).await {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(()),
            Err(e) => return report_failure(conn, wire, e).await,
        };
        debug!(category = %self.category(), command = %command, "Node request");

        match command {
            Command::Upload { name, destination } => {
                let target = match destination {
                    Some(dir) => join_destination(&dir, &name),
                    None => name,
                };
                let path = self.namespace.expand_home(&target);
                if let Err(e) = self.check_owned(&path) {
                    PayloadReader::new(conn, wire).drain().await?;
                    return report_failure(conn, wire, e).await;
                }
                self.store.serve_put(Path::new(&path), conn, wire).await
            }
            Command::Download { path } => {
                let path = self.namespace.expand_home(&path);
                match self.check_owned(&path) {
                    Ok(()) => self.store.serve_get(Path::new(&path), conn, wire).await,
                    Err(e) => report_failure(conn, wire, e).await,
                }
            }
            Command::Remove { path } => {
                let path = self.namespace.expand_home(&path);
                match self.check_owned(&path) {
                    Ok(()) => self.store.serve_delete(Path::new(&path), conn, wire).await,
                    Err(e) => report_failure(conn, wire, e).await,
                }
            }
            Command::Archive { extension } => {
                if Category::from_filter(&extension) == Some(self.category()) {
                    self.store.serve_archive(conn, wire).await
                } else {
                    let e = ProtocolError::UnrecognizedExtension { name: extension };
                    report_failure(conn, wire, e.into()).await
                }
            }
            Command::Display { path } => {
                let dir = self.namespace.expand_home(&path);
                self.store.serve_list(&dir, conn, wire).await
            }
            Command::Quit => Ok(()),
        }
    }

    fn check_owned(&self, path: &str) -> Result<()> {
        if classify(path) == Some(self.category()) {
            Ok(())
        } else {
            Err(StoreError::Protocol(ProtocolError::UnrecognizedExtension {
                name: path.to_string(),
            }))
        }
    }
}
