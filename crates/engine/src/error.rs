use std::io;

use thiserror::Error;

/// Fatal failures that terminate a session.
///
/// Per-file problems (unreadable source, digest mismatch, failed merge) are
/// logged and counted inside the drivers and never surface here; only
/// errors that leave the wire conversation unrecoverable do.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The peer conversation broke: unexpected EOF, malformed frame or
    /// message, version refusal, out-of-sequence index.
    #[error("protocol error: {0}")]
    Protocol(#[source] io::Error),

    /// A local filesystem operation the transfer cannot proceed without.
    #[error("{0}")]
    Io(#[source] io::Error),
}
