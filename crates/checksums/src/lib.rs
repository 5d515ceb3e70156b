//! Checksums used by the block-matching transfer algorithm.
//!
//! Two families are exposed:
//!
//! - [`RollingChecksum`]: the 32-bit Adler-style weak checksum that can be
//!   rolled across a sliding window in O(1) per byte. Cheap to compute,
//!   cheap to fool; it only nominates candidate blocks.
//! - [`strong`]: seeded MD4 digests that confirm a candidate block and
//!   verify a reconstructed file. The session seed keys every digest so a
//!   stale peer cannot replay checksums from an earlier run.
//!
//! Per-block and whole-file digests mix the seed in on opposite sides of the
//! payload. The asymmetry is mandated by the wire protocol and both orders
//! are preserved here exactly.

mod rolling;
pub mod strong;

pub use rolling::{RollingChecksum, RollingDigest, RollingError};
pub use strong::{CSUM_LENGTH, CSUM_LENGTH_PHASE1, FileDigest, Md4, block_digest};
