use checksums::CSUM_LENGTH;

/// Smallest block length ever chosen.
pub const BLOCK_SIZE_MIN: u32 = 700;

/// Largest block length ever chosen.
pub const BLOCK_SIZE_MAX: u32 = 1 << 29;

/// Block geometry derived from a basis file's size.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SignatureLayout {
    block_length: u32,
    remainder: u32,
    block_count: u64,
    strong_len: u32,
}

impl SignatureLayout {
    /// Chooses the geometry for a basis of `size` bytes.
    ///
    /// The block length tracks `size / 10000`, rounded up to a multiple of
    /// eight and clamped to `[BLOCK_SIZE_MIN, BLOCK_SIZE_MAX]`, so the set
    /// stays near ten thousand blocks for large files without ever
    /// degenerating into tiny blocks for small ones.
    #[must_use]
    pub fn for_size(size: u64) -> Self {
        let candidate = (size / 10_000).next_multiple_of(8);
        let block_length = candidate
            .clamp(u64::from(BLOCK_SIZE_MIN), u64::from(BLOCK_SIZE_MAX))
            as u32;
        Self::with_block_length(size, block_length)
    }

    /// Geometry for an explicit block length (wire decode path).
    #[must_use]
    pub fn with_block_length(size: u64, block_length: u32) -> Self {
        let block_length = block_length.max(1);
        Self {
            block_length,
            remainder: (size % u64::from(block_length)) as u32,
            block_count: size.div_ceil(u64::from(block_length)),
            strong_len: CSUM_LENGTH as u32,
        }
    }

    /// Length shared by every non-terminal block.
    #[must_use]
    pub const fn block_length(self) -> u32 {
        self.block_length
    }

    /// Length of the final short block, or 0 when the size divides evenly.
    #[must_use]
    pub const fn remainder(self) -> u32 {
        self.remainder
    }

    /// Number of blocks covering the basis.
    #[must_use]
    pub const fn block_count(self) -> u64 {
        self.block_count
    }

    /// Bytes of strong digest transmitted per block.
    #[must_use]
    pub const fn strong_len(self) -> u32 {
        self.strong_len
    }
}
