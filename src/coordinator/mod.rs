//! Coordinator: the single client-facing endpoint
//!
//! The coordinator owns one category (`.c` under `~/smain`) and serves it
//! from its own [`LocalStore`]. Requests for every other category are
//! rewritten into the owning node's namespace and forwarded:
//!
//! ```text
//!   client ──▶ coordinator ──┬─▶ .c   LocalStore (~/smain)
//!                            ├─▶ .pdf node :6061 (~/spdf)
//!                            └─▶ .txt node :6062 (~/stext)
//! ```
//!
//! A client session is long-lived: commands are served one after another
//! until `exit` or EOF. Failures of a single request are reported (framed)
//! or swallowed (legacy) and the session continues.

mod proxy;

use crate::config::{NodeAddr, StoreConfig};
use crate::error::{ProtocolError, Result, StoreError};
use crate::namespace::{classify, join_destination, Category, Namespace};
use crate::protocol::{read_command, write_bytes, write_status, Command, PayloadReader, Status, Wire};
use crate::server;
use crate::storage::{render_listing, report_failure, report_read_failure, LocalStore};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Client-facing router
#[derive(Debug, Clone)]
pub struct Coordinator {
    namespace: Namespace,
    store: LocalStore,
    nodes: HashMap<Category, NodeAddr>,
    wire: Wire,
}

impl Coordinator {
    /// Open the coordinator's own namespace root
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let local = config.namespace.local_category();
        let store = LocalStore::open(
            local,
            config.namespace.root_of(local),
            Arc::clone(&config.archiver),
        )
        .await?;

        Ok(Self {
            namespace: config.namespace.clone(),
            store,
            nodes: config.nodes.clone(),
            wire: config.wire,
        })
    }

    fn local_category(&self) -> Category {
        self.namespace.local_category()
    }

    /// Categories served by storage nodes, in fixed order
    fn remote_categories(&self) -> impl Iterator<Item = Category> + '_ {
        Category::ALL
            .into_iter()
            .filter(move |c| *c != self.local_category())
    }

    /// Accept client sessions until `shutdown` resolves
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        for category in self.remote_categories() {
            if let Some(addr) = self.nodes.get(&category) {
                info!(category = %category, addr = %addr, "Routing to storage node");
            }
        }
        info!(
            root = %self.store.root().display(),
            framing = ?self.wire.framing,
            "Coordinator ready"
        );

        let coordinator = Arc::new(self);
        server::serve(
            listener,
            "coordinator",
            move |stream, peer| {
                let coordinator = Arc::clone(&coordinator);
                async move { coordinator.handle_connection(stream, peer).await }
            },
            shutdown,
        )
        .await
    }

    async fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        info!(peer = %peer, "Client connected");
        match self.session(&mut stream).await {
            Ok(()) => info!(peer = %peer, "Client disconnected"),
            Err(e) => warn!(peer = %peer, error = %e, "Client session failed"),
        }
        let _ = stream.shutdown().await;
    }

    /// Serve commands until `exit` or EOF
    pub async fn session<S>(&self, conn: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let command = match read_command(conn).await {
                Ok(Some(Command::Quit)) | Ok(None) => return Ok(()),
                Ok(Some(command)) => command,
                Err(StoreError::Protocol(e @ ProtocolError::LineTooLong { .. })) => {
                    return report_failure(conn, self.wire, e.into()).await;
                }
                Err(e) => {
                    report_failure(conn, self.wire, e).await?;
                    continue;
                }
            };
            debug!(command = %command, "Client request");
            self.dispatch(command, conn).await?;
        }
    }

    /// Serve one command, locally or through the owning node
    pub async fn dispatch<S>(&self, command: Command, conn: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let wire = self.wire;
        match command {
            Command::Upload { name, destination } => {
                let target = match destination {
                    Some(dir) => join_destination(&dir, &name),
                    None => name,
                };
                let Some(category) = classify(&target) else {
                    PayloadReader::new(conn, wire).drain().await?;
                    return report_failure(conn, wire, unrecognized(target)).await;
                };
                let path = self.namespace.resolve(&target, category);
                if category == self.local_category() {
                    self.store.serve_put(Path::new(&path), conn, wire).await
                } else {
                    self.proxy_upload(category, path, conn).await
                }
            }

            Command::Download { path } => {
                let Some(category) = classify(&path) else {
                    return report_read_failure(conn, wire, unrecognized(path)).await;
                };
                let path = self.namespace.resolve(&path, category);
                if category == self.local_category() {
                    self.store.serve_get(Path::new(&path), conn, wire).await
                } else {
                    self.proxy_stream(category, Command::Download { path }, conn)
                        .await
                }
            }

            Command::Remove { path } => {
                let Some(category) = classify(&path) else {
                    return report_failure(conn, wire, unrecognized(path)).await;
                };
                let path = self.namespace.resolve(&path, category);
                if category == self.local_category() {
                    self.store.serve_delete(Path::new(&path), conn, wire).await
                } else {
                    self.proxy_remove(category, path, conn).await
                }
            }

            Command::Archive { extension } => {
                let Some(category) = Category::from_filter(&extension) else {
                    return report_failure(conn, wire, unrecognized(extension)).await;
                };
                if category == self.local_category() {
                    self.store.serve_archive(conn, wire).await
                } else {
                    let extension = format!(".{}", category.extension());
                    self.proxy_stream(category, Command::Archive { extension }, conn)
                        .await
                }
            }

            Command::Display { path } => self.display(&path, conn).await,

            Command::Quit => Ok(()),
        }
    }

    /// Merged listing: local matches first, then each node in fixed order
    async fn display<S>(&self, prefix: &str, conn: &mut S) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let wire = self.wire;
        let dir = self.namespace.expand_home(prefix);
        let local = self.store.list(&dir).await.unwrap_or_else(|e| {
            warn!(dir = %dir, error = %e, "Local listing failed");
            Vec::new()
        });

        if !wire.has_status() {
            conn.write_all(render_listing(&local).as_bytes()).await?;
            for category in self.remote_categories() {
                let remote_dir = self.namespace.rewrite(&dir, category);
                self.relay_listing(category, remote_dir, conn).await?;
            }
            conn.flush().await?;
            return Ok(());
        }

        let mut merged = render_listing(&local).into_bytes();
        for category in self.remote_categories() {
            let remote_dir = self.namespace.rewrite(&dir, category);
            if let Some(bytes) = self.fetch_listing(category, remote_dir).await {
                merged.extend_from_slice(&bytes);
            }
        }
        write_status(conn, Status::Ok).await?;
        write_bytes(conn, wire, &merged).await?;
        Ok(())
    }
}

fn unrecognized(name: String) -> StoreError {
    ProtocolError::UnrecognizedExtension { name }.into()
}
