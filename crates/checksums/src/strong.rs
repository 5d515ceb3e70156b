//! Seeded MD4 strong digests.
//!
//! The session seed is mixed into every strong digest, but on opposite sides
//! of the payload depending on the digest's purpose: block digests hash
//! `le32(seed) || data` while whole-file digests hash `data || le32(seed)`.
//! Both orders are fixed by the wire protocol.

use digest::Digest;

/// Full length in bytes of a strong digest.
pub const CSUM_LENGTH: usize = 16;

/// Truncated strong-digest length reserved for a first-pass exchange.
///
/// Protocol version 27 never negotiates digests shorter than the full 16
/// bytes, so this constant is carried for wire-format completeness only.
pub const CSUM_LENGTH_PHASE1: usize = 2;

/// Streaming MD4 hasher.
#[derive(Clone, Debug)]
pub struct Md4 {
    inner: md4::Md4,
}

impl Default for Md4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Md4 {
    /// Creates a hasher with an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: md4::Md4::new(),
        }
    }

    /// Feeds additional bytes into the digest state.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalises the digest and returns the 128-bit MD4 output.
    #[must_use]
    pub fn finalize(self) -> [u8; CSUM_LENGTH] {
        self.inner.finalize().into()
    }

    /// Computes the MD4 digest of `data` in one shot.
    #[must_use]
    pub fn digest(data: &[u8]) -> [u8; CSUM_LENGTH] {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }
}

/// Computes the seeded per-block digest: `MD4(le32(seed) || data)`.
#[must_use]
pub fn block_digest(seed: u32, data: &[u8]) -> [u8; CSUM_LENGTH] {
    let mut hasher = Md4::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}

/// Streaming whole-file digest: `MD4(data || le32(seed))`.
///
/// Used to verify a reconstructed file after the token stream is applied.
/// The seed is appended at [`finalize`](Self::finalize) time, so callers
/// stream file contents through [`update`](Self::update) as they are
/// produced.
#[derive(Clone, Debug)]
pub struct FileDigest {
    inner: Md4,
    seed: u32,
}

impl FileDigest {
    /// Creates a whole-file digest keyed by the session seed.
    #[must_use]
    pub fn new(seed: u32) -> Self {
        Self {
            inner: Md4::new(),
            seed,
        }
    }

    /// Feeds reconstructed file bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Appends the seed and returns the final digest.
    #[must_use]
    pub fn finalize(mut self) -> [u8; CSUM_LENGTH] {
        self.inner.update(&self.seed.to_le_bytes());
        self.inner.finalize()
    }

    /// Computes the whole-file digest of `data` in one shot.
    #[must_use]
    pub fn digest(seed: u32, data: &[u8]) -> [u8; CSUM_LENGTH] {
        let mut hasher = Self::new(seed);
        hasher.update(data);
        hasher.finalize()
    }
}
