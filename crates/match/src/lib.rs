//! The delta algorithm: turning a source file and a peer's block set into a
//! token stream, and applying such a stream against a basis file.
//!
//! The sender side ([`generate_delta`]) slides a window over the source,
//! nominating candidate blocks by weak checksum and confirming them with the
//! seeded strong digest; confirmed blocks become match tokens, everything in
//! between becomes literal runs. The receiver side ([`apply_delta`])
//! replays the stream against its own basis and verifies the reconstruction
//! with the whole-file digest embedded in the stream's tail.

mod apply;
mod generate;
mod index;

pub use apply::{ApplyError, apply_delta};
pub use generate::{DeltaStats, generate_delta};
pub use index::DeltaSignatureIndex;
