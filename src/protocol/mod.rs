//! Wire protocol shared by the client, the coordinator and the storage nodes
//!
//! A request is a command line followed, for uploads, by a payload. A reply
//! is a payload (downloads, archives, listings) or nothing. Framed sessions
//! additionally put a status byte in front of every reply.
//!
//! ```text
//!  client                 coordinator                   node
//!    │ ufile a.txt ~/smain/w\n │                          │
//!    │ [payload] ─────────────▶│ ufile /h/stext/w/a.txt\n │
//!    │                         │ [payload] ──────────────▶│
//!    │                         │◀──────────── [status]    │ (framed only)
//!    │◀──────────── [status]   │                          │
//! ```

pub mod command;
pub mod payload;
pub mod status;

pub use command::{read_command, write_command, Command, MAX_LINE_LEN};
pub use payload::{
    write_bytes, write_payload, Framing, PayloadReader, Wire, DEFAULT_CHUNK_SIZE,
};
pub use status::{read_status, write_status, Status};
