//! Command frame: one whitespace-delimited line per request
//!
//! ```text
//! ufile <srcname> <destdir>\n      client → coordinator
//! ufile <fullpath>\n               coordinator → node
//! dfile <path>\n
//! rmfile <path>\n
//! dtar <ext>\n
//! display <pathprefix>\n
//! exit\n
//! ```
//!
//! Arguments are not escaped, so paths containing whitespace cannot be
//! expressed.

use crate::error::ProtocolError;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum length of a command line, newline excluded
pub const MAX_LINE_LEN: usize = 4096;

/// A parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `ufile`: a payload follows the line
    ///
    /// With a destination, `name` is the source file name and the file is
    /// stored as `<destination>/<basename(name)>`. Without one, `name` is
    /// the full target path (node-facing form).
    Upload {
        name: String,
        destination: Option<String>,
    },

    /// `dfile`: stream a file back
    Download { path: String },

    /// `rmfile`: delete a file
    Remove { path: String },

    /// `dtar`: stream an archive of every file with this extension
    Archive { extension: String },

    /// `display`: list matching files under a directory
    Display { path: String },

    /// `exit`: end the client session
    Quit,
}

impl Command {
    /// Parse a command line (without its newline)
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut tokens = line.split_whitespace();
        let op = tokens.next().ok_or(ProtocolError::EmptyCommand)?;
        let mut arg = |argument: &'static str, command: &'static str| {
            tokens
                .next()
                .map(str::to_string)
                .ok_or(ProtocolError::MissingArgument { command, argument })
        };

        let command = match op {
            "ufile" => {
                let name = arg("path", "ufile")?;
                let destination = arg("destination", "ufile").ok();
                Command::Upload { name, destination }
            }
            "dfile" => Command::Download {
                path: arg("path", "dfile")?,
            },
            "rmfile" => Command::Remove {
                path: arg("path", "rmfile")?,
            },
            "dtar" => Command::Archive {
                extension: arg("extension", "dtar")?,
            },
            "display" => Command::Display {
                path: arg("path", "display")?,
            },
            "exit" => Command::Quit,
            other => {
                return Err(ProtocolError::UnknownCommand {
                    command: other.to_string(),
                })
            }
        };
        Ok(command)
    }

    /// Wire name of the operation
    pub fn op(&self) -> &'static str {
        match self {
            Command::Upload { .. } => "ufile",
            Command::Download { .. } => "dfile",
            Command::Remove { .. } => "rmfile",
            Command::Archive { .. } => "dtar",
            Command::Display { .. } => "display",
            Command::Quit => "exit",
        }
    }

    /// Encode as a newline-terminated command frame
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Upload {
                name,
                destination: Some(dest),
            } => write!(f, "ufile {} {}", name, dest),
            Command::Upload {
                name,
                destination: None,
            } => write!(f, "ufile {}", name),
            Command::Download { path } => write!(f, "dfile {}", path),
            Command::Remove { path } => write!(f, "rmfile {}", path),
            Command::Archive { extension } => write!(f, "dtar {}", extension),
            Command::Display { path } => write!(f, "display {}", path),
            Command::Quit => f.write_str("exit"),
        }
    }
}

/// Read one command line
///
/// Bytes are pulled one at a time so that no payload byte following the
/// newline is consumed. Returns `Ok(None)` when the peer closed the
/// connection before sending anything; a line cut short by EOF is still
/// parsed. Blank lines are skipped.
pub async fn read_command<R>(reader: &mut R) -> crate::error::Result<Option<Command>>
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut line = Vec::with_capacity(64);
        let mut byte = [0u8; 1];
        let mut eof = false;

        loop {
            if reader.read(&mut byte).await? == 0 {
                eof = true;
                break;
            }
            if byte[0] == b'\n' {
                break;
            }
            if line.len() == MAX_LINE_LEN {
                return Err(ProtocolError::LineTooLong {
                    limit: MAX_LINE_LEN,
                }
                .into());
            }
            line.push(byte[0]);
        }

        let text = std::str::from_utf8(&line).map_err(|_| ProtocolError::InvalidUtf8)?;
        if text.trim().is_empty() {
            if eof {
                return Ok(None);
            }
            continue;
        }
        return Ok(Some(Command::parse(text)?));
    }
}

/// Write one command line
pub async fn write_command<W>(writer: &mut W, command: &Command) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(command.to_line().as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_parse_all_operations() {
        assert_eq!(
            Command::parse("ufile notes.txt ~/smain/work").unwrap(),
            Command::Upload {
                name: "notes.txt".into(),
                destination: Some("~/smain/work".into()),
            }
        );
        assert_eq!(
            Command::parse("ufile /h/stext/a.txt").unwrap(),
            Command::Upload {
                name: "/h/stext/a.txt".into(),
                destination: None,
            }
        );
        assert_eq!(
            Command::parse("dfile ~/smain/a.c").unwrap(),
            Command::Download {
                path: "~/smain/a.c".into()
            }
        );
        assert_eq!(
            Command::parse("  rmfile\t/x.pdf \r").unwrap(),
            Command::Remove {
                path: "/x.pdf".into()
            }
        );
        assert_eq!(
            Command::parse("dtar .pdf").unwrap(),
            Command::Archive {
                extension: ".pdf".into()
            }
        );
        assert_eq!(
            Command::parse("display ~/smain").unwrap(),
            Command::Display {
                path: "~/smain".into()
            }
        );
        assert_eq!(Command::parse("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Command::parse("   "), Err(ProtocolError::EmptyCommand));
        assert_eq!(
            Command::parse("dfile"),
            Err(ProtocolError::MissingArgument {
                command: "dfile",
                argument: "path"
            })
        );
        assert!(matches!(
            Command::parse("mkdir /x"),
            Err(ProtocolError::UnknownCommand { .. })
        ));
    }

    #[test]
    fn test_display_matches_parse() {
        for line in [
            "ufile a.c ~/smain",
            "ufile /h/spdf/r.pdf",
            "dfile /a.txt",
            "rmfile /a.txt",
            "dtar .c",
            "display /h/smain",
            "exit",
        ] {
            assert_eq!(Command::parse(line).unwrap().to_string(), line);
        }
    }

    #[tokio::test]
    async fn test_read_command_leaves_payload_untouched() {
        let (mut a, mut b) = tokio::io::duplex(256);
        a.write_all(b"\nufile /h/stext/a.txt\nhello").await.unwrap();
        drop(a);

        let cmd = read_command(&mut b).await.unwrap().unwrap();
        assert_eq!(cmd.op(), "ufile");

        let mut rest = Vec::new();
        b.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"hello");
    }

    #[tokio::test]
    async fn test_read_command_eof_and_limits() {
        let (a, mut b) = tokio::io::duplex(16);
        drop(a);
        assert!(read_command(&mut b).await.unwrap().is_none());

        let (mut a, mut b) = tokio::io::duplex(MAX_LINE_LEN + 64);
        a.write_all(&vec![b'x'; MAX_LINE_LEN + 1]).await.unwrap();
        drop(a);
        let err = read_command(&mut b).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Protocol(ProtocolError::LineTooLong { .. })
        ));

        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(b"exit").await.unwrap();
        drop(a);
        assert_eq!(read_command(&mut b).await.unwrap(), Some(Command::Quit));
    }
}
