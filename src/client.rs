//! Client for a coordinator session
//!
//! In framed mode one [`StoreClient`] holds one long-lived connection; every
//! reply starts with a status byte and failures surface as
//! [`StoreError::Remote`].
//!
//! Legacy replies carry no length, so each legacy request gets a connection
//! of its own: the request (followed by `exit` when it has no payload) is
//! sent, the write half is closed, and the reply is read until the
//! coordinator closes the session. This terminates every payload size,
//! including empty ones and exact multiples of the chunk size. Failures show
//! up as empty transfers or as an `Error:` line in place of the data.

use crate::error::{ProtocolError, Result, StoreError};
use crate::namespace::classify;
use crate::protocol::{read_status, write_command, write_payload, Command, PayloadReader, Wire};
use humansize::{format_size, BINARY};
use std::net::SocketAddr;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};

/// A session with the coordinator
#[derive(Debug)]
pub struct StoreClient {
    addr: SocketAddr,
    /// Open connection; legacy requests consume it
    stream: Option<TcpStream>,
    wire: Wire,
}

impl StoreClient {
    /// Open a session
    pub async fn connect<A: ToSocketAddrs>(addr: A, wire: Wire) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let addr = stream.peer_addr()?;
        debug!(peer = %addr, framing = ?wire.framing, "Connected");
        Ok(Self {
            addr,
            stream: Some(stream),
            wire,
        })
    }

    /// Send `local` into the remote directory `dest_dir`
    pub async fn upload(&mut self, local: &Path, dest_dir: &str) -> Result<u64> {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if classify(&name).is_none() {
            return Err(ProtocolError::UnrecognizedExtension { name }.into());
        }

        let mut file = File::open(local).await?;
        let len = file.metadata().await?.len();

        let command = Command::Upload {
            name,
            destination: Some(dest_dir.to_string()),
        };
        let wire = self.wire;
        let stream = self.stream().await?;
        write_command(stream, &command).await?;
        let sent = write_payload(stream, wire, &mut file, len).await?;
        self.finish_request(false).await?;
        self.expect_ok().await?;
        self.await_close().await?;

        info!(command = %command, size = %format_size(sent, BINARY), "Uploaded");
        Ok(sent)
    }

    /// Fetch `remote` into the local file `local`
    pub async fn download(&mut self, remote: &str, local: &Path) -> Result<u64> {
        let command = Command::Download {
            path: remote.to_string(),
        };
        self.receive_into(&command, local).await
    }

    /// Delete `remote`
    pub async fn remove(&mut self, remote: &str) -> Result<()> {
        let command = Command::Remove {
            path: remote.to_string(),
        };
        self.request(&command).await?;
        self.expect_ok().await?;
        self.await_close().await?;
        info!(command = %command, "Removed");
        Ok(())
    }

    /// Fetch the archive of every file with `extension` into `output`
    pub async fn archive(&mut self, extension: &str, output: &Path) -> Result<u64> {
        let command = Command::Archive {
            extension: extension.to_string(),
        };
        self.receive_into(&command, output).await
    }

    /// List matching files under `prefix` on every node
    pub async fn display(&mut self, prefix: &str) -> Result<Vec<String>> {
        let command = Command::Display {
            path: prefix.to_string(),
        };
        self.request(&command).await?;
        self.expect_ok().await?;

        let mut bytes = Vec::new();
        self.receive(&mut bytes).await?;
        Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// End the session
    pub async fn quit(mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            write_command(&mut stream, &Command::Quit).await?;
            stream.shutdown().await?;
        }
        Ok(())
    }

    async fn receive_into(&mut self, command: &Command, output: &Path) -> Result<u64> {
        self.request(command).await?;
        self.expect_ok().await?;

        let mut out = BufWriter::new(File::create(output).await?);
        let received = self.receive(&mut out).await?;
        out.shutdown().await?;

        info!(
            command = %command,
            output = %output.display(),
            size = %format_size(received, BINARY),
            "Received"
        );
        Ok(received)
    }

    /// Connection for the next request, reconnecting after a legacy request
    async fn stream(&mut self) -> Result<&mut TcpStream> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => TcpStream::connect(self.addr).await?,
        };
        Ok(self.stream.insert(stream))
    }

    /// Send a command without payload
    async fn request(&mut self, command: &Command) -> Result<()> {
        write_command(self.stream().await?, command).await?;
        self.finish_request(true).await
    }

    /// Legacy: end the session after this request and close the write half
    ///
    /// `exit` is only sent when no payload precedes it; after a payload it
    /// would be read as data.
    async fn finish_request(&mut self, send_exit: bool) -> Result<()> {
        if self.wire.has_status() {
            return Ok(());
        }
        let stream = self.stream().await?;
        if send_exit {
            write_command(stream, &Command::Quit).await?;
        }
        stream.shutdown().await?;
        Ok(())
    }

    /// Read the reply body into `out`
    ///
    /// Framed: one length-prefixed payload. Legacy: everything until the
    /// coordinator closes, after which the connection is dropped.
    async fn receive<W>(&mut self, out: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let wire = self.wire;
        if wire.has_status() {
            let stream = self.stream().await?;
            return Ok(PayloadReader::new(stream, wire).copy_to(out).await?);
        }
        let Some(mut stream) = self.stream.take() else {
            return Ok(0);
        };
        let received = tokio::io::copy(&mut stream, out).await?;
        out.flush().await?;
        Ok(received)
    }

    /// Legacy: wait until the coordinator has served the request and closed
    async fn await_close(&mut self) -> Result<()> {
        if !self.wire.has_status() {
            self.receive(&mut tokio::io::sink()).await?;
        }
        Ok(())
    }

    async fn expect_ok(&mut self) -> Result<()> {
        if !self.wire.has_status() {
            return Ok(());
        }
        let status = read_status(self.stream().await?).await?;
        if status.is_ok() {
            Ok(())
        } else {
            Err(StoreError::Remote(status))
        }
    }
}
