//! The synchronization engine: session lifecycle and the two role drivers.
//!
//! A transfer is a conversation between exactly two roles over a duplex
//! byte stream. The [`sender`] owns the authoritative tree: it publishes
//! the file list and answers block sets with token streams. The
//! [`receiver`] owns the sink: it selects files, describes its basis
//! copies, merges token streams into temporaries, and renames them into
//! place. Both drivers are single-threaded and strictly sequential; the
//! protocol's alternation (flush before every turn-around read) is what
//! keeps the duplex channel deadlock-free.

mod delete;
mod error;
mod receiver;
mod sender;
mod session;

pub use error::EngineError;
pub use receiver::run_receiver;
pub use sender::run_sender;
pub use session::{Options, Session, SessionStats};
