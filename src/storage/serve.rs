//! Replies for requests served from a local store
//!
//! Both the storage node and the coordinator (for its own category) answer
//! requests through these functions, so the two reply identically.
//!
//! Every function returns `Err` only when the connection itself failed.
//! Operation failures are reported to the peer (a status frame when framed;
//! a best-effort `Error:` line for direct reads when legacy) and logged.

use super::local::LocalStore;
use crate::error::{Result, StoreError};
use crate::protocol::{write_bytes, write_payload, write_status, PayloadReader, Status, Wire};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Report a failed operation to the peer
///
/// Connection-level errors are passed back to the caller instead.
pub async fn report_failure<S>(conn: &mut S, wire: Wire, err: StoreError) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    if err.is_fatal() {
        return Err(err);
    }
    debug!(status = %err.status(), error = %err, "Request failed");
    if wire.has_status() {
        write_status(conn, err.status()).await?;
    }
    Ok(())
}

/// Report a failed read; legacy peers get a best-effort `Error:` line
pub async fn report_read_failure<S>(conn: &mut S, wire: Wire, err: StoreError) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    if wire.has_status() || err.is_fatal() {
        return report_failure(conn, wire, err).await;
    }
    conn.write_all(format!("Error: {}\n", err).as_bytes()).await?;
    conn.flush().await?;
    Ok(())
}

impl LocalStore {
    /// `ufile`: receive the payload into `path`
    pub async fn serve_put<S>(&self, path: &Path, conn: &mut S, wire: Wire) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let outcome = {
            let mut payload = PayloadReader::new(conn, wire);
            self.put(path, &mut payload).await
        };
        match outcome {
            Ok(_) if wire.has_status() => Ok(write_status(conn, Status::Ok).await?),
            Ok(_) => Ok(()),
            Err(e) => report_failure(conn, wire, e).await,
        }
    }

    /// `dfile`: stream `path` back
    pub async fn serve_get<S>(&self, path: &Path, conn: &mut S, wire: Wire) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let (mut file, len) = match self.get(path).await {
            Ok(found) => found,
            Err(e) => return report_read_failure(conn, wire, e).await,
        };
        if wire.has_status() {
            write_status(conn, Status::Ok).await?;
        }
        let sent = write_payload(conn, wire, &mut file, len).await?;
        debug!(path = %path.display(), bytes = sent, "Sent file");
        Ok(())
    }

    /// `rmfile`: delete `path`
    pub async fn serve_delete<S>(&self, path: &Path, conn: &mut S, wire: Wire) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        match self.delete(path).await {
            Ok(()) if wire.has_status() => Ok(write_status(conn, Status::Ok).await?),
            Ok(()) => Ok(()),
            Err(e) => report_failure(conn, wire, e).await,
        }
    }

    /// `display`: newline-delimited matches directly under `dir`
    pub async fn serve_list<S>(&self, dir: &str, conn: &mut S, wire: Wire) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let listing = match self.list(dir).await {
            Ok(found) => found,
            Err(e) => return report_failure(conn, wire, e).await,
        };
        let text = render_listing(&listing);
        if wire.has_status() {
            write_status(conn, Status::Ok).await?;
            write_bytes(conn, wire, text.as_bytes()).await?;
        } else {
            conn.write_all(text.as_bytes()).await?;
            conn.flush().await?;
        }
        Ok(())
    }

    /// `dtar`: build and stream this store's archive
    ///
    /// A failed build sends nothing in legacy mode.
    pub async fn serve_archive<S>(&self, conn: &mut S, wire: Wire) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let scratch = match self.archive().await {
            Ok(scratch) => scratch,
            Err(e) => {
                warn!(category = %self.category(), error = %e, "Archive build failed");
                return report_failure(conn, wire, e).await;
            }
        };

        let mut file = tokio::fs::File::open(scratch.path()).await?;
        let len = file.metadata().await?.len();
        if wire.has_status() {
            write_status(conn, Status::Ok).await?;
        }
        let sent = write_payload(conn, wire, &mut file, len).await?;
        debug!(category = %self.category(), bytes = sent, "Sent archive");
        Ok(())
    }
}

/// One path per line, each newline-terminated
pub fn render_listing(paths: &[String]) -> String {
    paths.iter().map(|p| format!("{}\n", p)).collect()
}
