//! Wire-level building blocks for the legacy rsync protocol (version 27).
//!
//! The crate is layered the way the bytes are:
//!
//! - [`wire`]: typed little-endian primitives (`int`, `long`, `size`,
//!   `line`) and the token-stream alphabet shared by sender and receiver.
//! - [`envelope`]: the 4-byte multiplex tag that lets out-of-band log lines
//!   share the stream with payload data.
//! - [`multiplex`]: stateful reader/writer adapters that frame and unframe
//!   payload, replay peer log lines through the session logger, and count
//!   wire bytes for the end-of-transfer statistics.
//! - [`version`]: protocol version constants and the handshake check.
//!
//! Everything here is transport-agnostic: the adapters wrap any
//! `std::io::Read`/`Write`, which is how the role drivers hand them pipes,
//! sockets, or a child's stdio.

pub mod envelope;
pub mod multiplex;
pub mod version;
pub mod wire;

pub use envelope::{HEADER_LEN, MAX_PAYLOAD_LENGTH, MPLEX_BASE, MessageCode, MessageHeader};
pub use multiplex::{DemuxReader, MuxWriter};
pub use version::{MIN_PROTOCOL_VERSION, PROTOCOL_VERSION, check_remote_version};
