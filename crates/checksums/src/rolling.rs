use thiserror::Error;

/// Error conditions for rolling-checksum window operations.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum RollingError {
    /// [`RollingChecksum::roll`] was called before any bytes were observed.
    #[error("cannot roll an empty checksum window")]
    EmptyWindow,
    /// The window length no longer fits the 32-bit arithmetic of the sum.
    #[error("rolling checksum window of {len} bytes exceeds the 32-bit range")]
    WindowTooLarge {
        /// Offending window length.
        len: usize,
    },
}

/// Weak rolling checksum used for block matching.
///
/// `s1` accumulates the byte sum and `s2` accumulates the prefix sums
/// (`Σ (n−i)·b_i`), both truncated to 16 bits. The packed value
/// `(s2 << 16) | s1` is what travels on the wire. The state supports O(1)
/// rolling: removing the window's leading byte and appending a trailing one
/// without revisiting the window contents.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RollingChecksum {
    s1: u32,
    s2: u32,
    len: usize,
}

impl RollingChecksum {
    /// Creates a checksum with zeroed state.
    #[must_use]
    pub const fn new() -> Self {
        Self { s1: 0, s2: 0, len: 0 }
    }

    /// Resets the state so the window can be repositioned.
    pub const fn reset(&mut self) {
        self.s1 = 0;
        self.s2 = 0;
        self.len = 0;
    }

    /// Returns the number of bytes currently in the window.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bytes have been observed yet.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Feeds a chunk of bytes into the window.
    #[inline]
    pub fn update(&mut self, chunk: &[u8]) {
        let mut s1 = self.s1;
        let mut s2 = self.s2;
        for &byte in chunk {
            s1 = s1.wrapping_add(u32::from(byte));
            s2 = s2.wrapping_add(s1);
        }
        self.s1 = s1 & 0xffff;
        self.s2 = s2 & 0xffff;
        self.len += chunk.len();
    }

    /// Clears the state and loads `block` as the new window.
    pub fn update_from_block(&mut self, block: &[u8]) {
        self.reset();
        self.update(block);
    }

    /// Rolls the window forward by one byte.
    ///
    /// `outgoing` is the byte leaving the front of the window and `incoming`
    /// the byte entering at the back; the window length is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`RollingError::EmptyWindow`] if no bytes have been processed.
    #[inline]
    pub fn roll(&mut self, outgoing: u8, incoming: u8) -> Result<(), RollingError> {
        let window_len = self.window_len_u32()?;

        let out = u32::from(outgoing);
        let inn = u32::from(incoming);

        let new_s1 = self.s1.wrapping_sub(out).wrapping_add(inn) & 0xffff;
        let new_s2 = self
            .s2
            .wrapping_sub(window_len.wrapping_mul(out))
            .wrapping_add(new_s1)
            & 0xffff;

        self.s1 = new_s1;
        self.s2 = new_s2;
        Ok(())
    }

    /// Returns the checksum in the packed 32-bit wire representation.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> u32 {
        (self.s2 << 16) | self.s1
    }

    /// Captures the current state as a [`RollingDigest`].
    #[must_use]
    pub const fn digest(&self) -> RollingDigest {
        RollingDigest {
            s1: (self.s1 & 0xffff) as u16,
            s2: (self.s2 & 0xffff) as u16,
            len: self.len,
        }
    }

    #[inline]
    fn window_len_u32(&self) -> Result<u32, RollingError> {
        if self.len == 0 {
            return Err(RollingError::EmptyWindow);
        }
        u32::try_from(self.len).map_err(|_| RollingError::WindowTooLarge { len: self.len })
    }
}

/// Digest produced by the rolling checksum.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RollingDigest {
    s1: u16,
    s2: u16,
    len: usize,
}

impl RollingDigest {
    /// Computes the digest for the provided byte slice.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut checksum = RollingChecksum::new();
        checksum.update(bytes);
        checksum.digest()
    }

    /// Low 16-bit component (the byte sum).
    #[must_use]
    pub const fn sum1(self) -> u16 {
        self.s1
    }

    /// High 16-bit component (the prefix sums).
    #[must_use]
    pub const fn sum2(self) -> u16 {
        self.s2
    }

    /// Window length the digest covers.
    #[must_use]
    pub const fn len(self) -> usize {
        self.len
    }

    /// Returns `true` for the digest of an empty window.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Packed 32-bit wire representation: `(s2 << 16) | s1`.
    #[must_use]
    pub const fn value(self) -> u32 {
        ((self.s2 as u32) << 16) | (self.s1 as u32)
    }
}

impl From<RollingDigest> for u32 {
    fn from(digest: RollingDigest) -> Self {
        digest.value()
    }
}
