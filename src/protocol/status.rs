//! Status frame of the framed transfer discipline
//!
//! A single byte sent before every reply in framed sessions. Legacy
//! sessions never send it.

use crate::error::ProtocolError;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Outcome of a request as seen by the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// Request completed; a payload follows for stream-bearing replies
    Ok = 0,
    /// Path absent on read or delete
    NotFound = 1,
    /// Directory creation or file write failed
    WriteFailed = 2,
    /// Archive builder failed
    ArchiveFailed = 3,
    /// Unknown command or unmapped extension
    Unrecognized = 4,
    /// Owning storage node unreachable
    ConnectFailed = 5,
}

impl Status {
    /// Convert from the wire byte
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Status::Ok),
            1 => Ok(Status::NotFound),
            2 => Ok(Status::WriteFailed),
            3 => Ok(Status::ArchiveFailed),
            4 => Ok(Status::Unrecognized),
            5 => Ok(Status::ConnectFailed),
            other => Err(ProtocolError::InvalidStatus(other)),
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == Status::Ok
    }

    /// Name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::NotFound => "NOT_FOUND",
            Status::WriteFailed => "WRITE_FAILED",
            Status::ArchiveFailed => "ARCHIVE_FAILED",
            Status::Unrecognized => "PROTOCOL_UNRECOGNIZED",
            Status::ConnectFailed => "CONNECT_FAILED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write a status frame
pub async fn write_status<W>(writer: &mut W, status: Status) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_u8(status as u8).await?;
    writer.flush().await
}

/// Read a status frame
///
/// A connection closed before the status byte reads as `UnexpectedEof`.
pub async fn read_status<R>(reader: &mut R) -> crate::error::Result<Status>
where
    R: AsyncRead + Unpin,
{
    let byte = reader.read_u8().await?;
    Ok(Status::from_u8(byte)?)
}
