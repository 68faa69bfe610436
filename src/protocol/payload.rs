//! Payload frames: the bytes of a file, archive or listing
//!
//! Two disciplines exist and both ends of a connection must agree on one:
//!
//! - **Legacy**: raw bytes read in fixed-size chunks. The stream is over
//!   when a chunk read returns fewer bytes than the chunk size, or when the
//!   peer closes. A payload whose size is an exact multiple of the chunk size
//!   is only terminated by the sender closing its write half, so legacy
//!   senders close after every payload.
//! - **Framed**: an 8-byte big-endian length followed by exactly that many
//!   bytes. Every size terminates unambiguously.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default chunk size for payload reads and writes
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Payload termination discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Framing {
    /// Short read or connection close ends the stream
    #[default]
    Legacy,
    /// Length-prefixed payloads with a status byte before every reply
    Framed,
}

/// Transfer parameters shared by both ends of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wire {
    pub framing: Framing,
    pub chunk_size: usize,
}

impl Wire {
    pub fn new(framing: Framing, chunk_size: usize) -> Self {
        Self {
            framing,
            chunk_size,
        }
    }

    pub fn legacy() -> Self {
        Self::new(Framing::Legacy, DEFAULT_CHUNK_SIZE)
    }

    pub fn framed() -> Self {
        Self::new(Framing::Framed, DEFAULT_CHUNK_SIZE)
    }

    /// Check if replies carry a status frame
    pub fn has_status(&self) -> bool {
        self.framing == Framing::Framed
    }

    /// Allocate a chunk buffer
    pub fn buffer(&self) -> Vec<u8> {
        vec![0u8; self.chunk_size]
    }
}

impl Default for Wire {
    fn default() -> Self {
        Self::legacy()
    }
}

/// Incremental reader of one incoming payload
pub struct PayloadReader<'a, R> {
    inner: &'a mut R,
    wire: Wire,
    /// Length from the framed header, once read
    declared: Option<u64>,
    /// Framed bytes still expected
    remaining: u64,
    done: bool,
}

impl<'a, R> PayloadReader<'a, R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(inner: &'a mut R, wire: Wire) -> Self {
        Self {
            inner,
            wire,
            declared: None,
            remaining: 0,
            done: false,
        }
    }

    /// Length announced by the sender (framed only)
    ///
    /// Reads the length header on first use.
    pub async fn declared_len(&mut self) -> io::Result<Option<u64>> {
        if self.wire.framing == Framing::Legacy {
            return Ok(None);
        }
        if self.declared.is_none() {
            let len = self.inner.read_u64().await?;
            self.declared = Some(len);
            self.remaining = len;
            if len == 0 {
                self.done = true;
            }
        }
        Ok(self.declared)
    }

    /// Read the next chunk into `buf`; `Ok(0)` once the payload is over
    pub async fn next_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done {
            return Ok(0);
        }
        let chunk = self.wire.chunk_size.min(buf.len());

        match self.wire.framing {
            Framing::Legacy => {
                let n = self.inner.read(&mut buf[..chunk]).await?;
                if n < chunk {
                    self.done = true;
                }
                Ok(n)
            }
            Framing::Framed => {
                self.declared_len().await?;
                if self.done {
                    return Ok(0);
                }
                let want = (self.remaining.min(chunk as u64)) as usize;
                let n = self.inner.read(&mut buf[..want]).await?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("payload truncated with {} bytes missing", self.remaining),
                    ));
                }
                self.remaining -= n as u64;
                if self.remaining == 0 {
                    self.done = true;
                }
                Ok(n)
            }
        }
    }

    /// Copy the payload bytes (no framing) into `writer`
    pub async fn copy_to<W>(&mut self, writer: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = self.wire.buffer();
        let mut total = 0u64;
        loop {
            let n = self.next_chunk(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
            total += n as u64;
        }
        writer.flush().await?;
        Ok(total)
    }

    /// Consume and discard the payload
    pub async fn drain(&mut self) -> io::Result<u64> {
        self.copy_to(&mut tokio::io::sink()).await
    }

    /// Collect the payload in memory
    pub async fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.copy_to(&mut out).await?;
        Ok(out)
    }

    /// Forward the payload to `writer` in the same framing it arrived in
    pub async fn relay<W>(&mut self, writer: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        if let Some(len) = self.declared_len().await? {
            writer.write_u64(len).await?;
        }
        self.copy_to(writer).await
    }
}

/// Send `len` bytes from `source` as one payload
///
/// Chunks are filled completely before being written so that, in the
/// legacy discipline, only the final chunk is short.
pub async fn write_payload<W, S>(
    writer: &mut W,
    wire: Wire,
    source: &mut S,
    len: u64,
) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
    S: AsyncRead + Unpin,
{
    if wire.framing == Framing::Framed {
        writer.write_u64(len).await?;
    }

    let mut source = source.take(len);
    let mut buf = wire.buffer();
    let mut total = 0u64;
    loop {
        let n = fill_chunk(&mut source, &mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }

    if total != len && wire.framing == Framing::Framed {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("source ended after {} of {} bytes", total, len),
        ));
    }
    writer.flush().await?;
    Ok(total)
}

/// Send an in-memory buffer as one payload
pub async fn write_bytes<W>(writer: &mut W, wire: Wire, data: &[u8]) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut source = data;
    write_payload(writer, wire, &mut source, data.len() as u64).await
}

/// Read from `source` until `buf` is full or the source is exhausted
async fn fill_chunk<S>(source: &mut S, buf: &mut [u8]) -> io::Result<usize>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
