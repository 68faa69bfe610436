//! Forwarding requests to storage nodes
//!
//! Each proxied request opens a fresh connection to the owning node, sends
//! one command and relays the reply back to the client. In legacy mode the
//! reply is copied until the node closes; framed replies are relayed frame
//! by frame. An I/O error in the middle of a relay ends the whole client
//! session, since the client can no longer tell where the reply stops.

use super::Coordinator;
use crate::error::{Result, StoreError};
use crate::namespace::Category;
use crate::protocol::{
    read_status, write_command, write_status, Command, PayloadReader, Status,
};
use crate::storage::report_failure;
use humansize::{format_size, BINARY};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

impl Coordinator {
    /// Open a connection to the node owning `category`
    pub(crate) async fn connect_node(&self, category: Category) -> Result<TcpStream> {
        let addr = self.nodes.get(&category).ok_or_else(|| StoreError::ConnectFailed {
            category,
            addr: "<unconfigured>".to_string(),
            reason: "no node configured".to_string(),
        })?;

        TcpStream::connect((addr.host.as_str(), addr.port))
            .await
            .map_err(|e| {
                warn!(category = %category, addr = %addr, error = %e, "Storage node unreachable");
                StoreError::ConnectFailed {
                    category,
                    addr: addr.to_string(),
                    reason: e.to_string(),
                }
            })
    }

    /// Send one command to a node, returning the open connection
    async fn open_request(&self, category: Category, command: &Command) -> Result<TcpStream> {
        let mut node = self.connect_node(category).await?;
        write_command(&mut node, command).await?;
        debug!(category = %category, command = %command, "Forwarded request");
        Ok(node)
    }

    /// `ufile`: relay the client's payload to the node
    ///
    /// The payload is drained when the node cannot be reached.
    pub(crate) async fn proxy_upload<S>(
        &self,
        category: Category,
        path: String,
        conn: &mut S,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let wire = self.wire;
        let command = Command::Upload {
            name: path,
            destination: None,
        };
        let mut node = match self.open_request(category, &command).await {
            Ok(node) => node,
            Err(e) => {
                let dropped = PayloadReader::new(conn, wire).drain().await?;
                debug!(dropped_bytes = dropped, "Drained payload for unreachable node");
                return report_failure(conn, wire, e).await;
            }
        };

        let sent = PayloadReader::new(conn, wire).relay(&mut node).await?;
        node.shutdown().await?;
        info!(
            category = %category,
            command = %command,
            size = %format_size(sent, BINARY),
            "Relayed upload"
        );

        if wire.has_status() {
            let status = self.node_status(category, &mut node).await;
            write_status(conn, status).await?;
        } else {
            await_close(category, &mut node).await;
        }
        Ok(())
    }

    /// `dfile` and `dtar`: relay the node's stream back
    pub(crate) async fn proxy_stream<S>(
        &self,
        category: Category,
        command: Command,
        conn: &mut S,
    ) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let wire = self.wire;
        let mut node = match self.open_request(category, &command).await {
            Ok(node) => node,
            Err(e) => return report_failure(conn, wire, e).await,
        };

        if !wire.has_status() {
            let copied = tokio::io::copy(&mut node, conn).await?;
            conn.flush().await?;
            debug!(category = %category, bytes = copied, "Relayed reply");
            return Ok(());
        }

        let status = self.node_status(category, &mut node).await;
        write_status(conn, status).await?;
        if status.is_ok() {
            let copied = PayloadReader::new(&mut node, wire).relay(conn).await?;
            debug!(category = %category, bytes = copied, "Relayed reply");
        }
        Ok(())
    }

    /// `rmfile`: no reply in legacy mode, status relayed when framed
    ///
    /// Legacy requests still wait for the node to close, so a client that
    /// reads its session to EOF observes the deletion.
    pub(crate) async fn proxy_remove<S>(
        &self,
        category: Category,
        path: String,
        conn: &mut S,
    ) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let wire = self.wire;
        let command = Command::Remove { path };
        let mut node = match self.open_request(category, &command).await {
            Ok(node) => node,
            Err(e) => return report_failure(conn, wire, e).await,
        };

        if wire.has_status() {
            let status = self.node_status(category, &mut node).await;
            write_status(conn, status).await?;
        } else {
            let _ = node.shutdown().await;
            await_close(category, &mut node).await;
        }
        Ok(())
    }

    /// `display` against one node: the listing bytes, if the node answered
    pub(crate) async fn fetch_listing(&self, category: Category, dir: String) -> Option<Vec<u8>> {
        let wire = self.wire;
        let command = Command::Display { path: dir };
        let mut node = self.open_request(category, &command).await.ok()?;

        if wire.has_status() {
            let status = self.node_status(category, &mut node).await;
            if !status.is_ok() {
                return None;
            }
            return match PayloadReader::new(&mut node, wire).read_to_vec().await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(category = %category, error = %e, "Listing truncated");
                    None
                }
            };
        }

        let mut bytes = Vec::new();
        if let Err(e) = tokio::io::copy(&mut node, &mut bytes).await {
            warn!(category = %category, error = %e, "Listing truncated");
        }
        Some(bytes)
    }

    /// `display` against one node, relayed to the client as it arrives
    pub(crate) async fn relay_listing<S>(
        &self,
        category: Category,
        dir: String,
        conn: &mut S,
    ) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let command = Command::Display { path: dir };
        let Ok(mut node) = self.open_request(category, &command).await else {
            return Ok(());
        };
        tokio::io::copy(&mut node, conn).await?;
        conn.flush().await?;
        Ok(())
    }

    /// Status byte from a node; an unreadable reply counts as unreachable
    async fn node_status(&self, category: Category, node: &mut TcpStream) -> Status {
        match read_status(node).await {
            Ok(status) => {
                if !status.is_ok() {
                    debug!(category = %category, status = %status, "Node reported failure");
                }
                status
            }
            Err(e) => {
                warn!(category = %category, error = %e, "No status from storage node");
                Status::ConnectFailed
            }
        }
    }
}

/// Wait until a legacy node has served its command and closed
async fn await_close(category: Category, node: &mut TcpStream) {
    match tokio::io::copy(node, &mut tokio::io::sink()).await {
        Ok(0) => {}
        Ok(n) => debug!(category = %category, bytes = n, "Discarded unexpected reply"),
        Err(e) => warn!(category = %category, error = %e, "Storage node connection failed"),
    }
}
