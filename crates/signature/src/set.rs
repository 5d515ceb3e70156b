use std::io::{self, Read, Write};

use checksums::{CSUM_LENGTH, RollingDigest, block_digest};
use protocol::wire;

use crate::layout::{BLOCK_SIZE_MAX, SignatureLayout};

/// One block of a basis file: its position and both checksums.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SignatureBlock {
    /// Zero-based sequential index.
    pub index: u32,
    /// Packed 32-bit weak rolling checksum.
    pub weak: u32,
    /// Strong digest; only the set's `strong_len` leading bytes are
    /// meaningful after a wire decode.
    pub strong: [u8; CSUM_LENGTH],
}

/// The block set describing one basis file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileSignature {
    file_size: u64,
    block_length: u32,
    remainder: u32,
    strong_len: u32,
    blocks: Vec<SignatureBlock>,
}

impl FileSignature {
    /// The empty set sent when no usable basis exists.
    ///
    /// All four header fields are zero on the wire; the sender responds by
    /// transmitting the whole file as literal data.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            file_size: 0,
            block_length: 0,
            remainder: 0,
            strong_len: 0,
            blocks: Vec::new(),
        }
    }

    /// Builds the signature of `reader`, whose size is expected to be near
    /// `size_hint` (used only to choose the block geometry).
    pub fn generate<R: Read + ?Sized>(
        reader: &mut R,
        size_hint: u64,
        seed: u32,
    ) -> io::Result<Self> {
        let layout = SignatureLayout::for_size(size_hint);
        let block_length = layout.block_length() as usize;

        let mut blocks = Vec::new();
        let mut buf = vec![0u8; block_length];
        let mut file_size = 0u64;
        let mut remainder = 0u32;

        loop {
            let filled = fill_block(reader, &mut buf)?;
            if filled == 0 {
                break;
            }
            let data = &buf[..filled];
            let index = u32::try_from(blocks.len()).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "basis file has too many blocks")
            })?;
            blocks.push(SignatureBlock {
                index,
                weak: RollingDigest::from_bytes(data).value(),
                strong: block_digest(seed, data),
            });
            file_size += filled as u64;
            if filled < block_length {
                remainder = filled as u32;
                break;
            }
        }

        if blocks.is_empty() {
            return Ok(Self::empty());
        }
        Ok(Self {
            file_size,
            block_length: layout.block_length(),
            remainder,
            strong_len: layout.strong_len(),
            blocks,
        })
    }

    /// Builds the signature of an in-memory basis.
    #[must_use]
    pub fn from_bytes(data: &[u8], seed: u32) -> Self {
        if data.is_empty() {
            return Self::empty();
        }
        let layout = SignatureLayout::for_size(data.len() as u64);
        let block_length = layout.block_length() as usize;

        let blocks = data
            .chunks(block_length)
            .enumerate()
            .map(|(index, chunk)| SignatureBlock {
                index: index as u32,
                weak: RollingDigest::from_bytes(chunk).value(),
                strong: block_digest(seed, chunk),
            })
            .collect();

        Self {
            file_size: data.len() as u64,
            block_length: layout.block_length(),
            remainder: layout.remainder(),
            strong_len: layout.strong_len(),
            blocks,
        }
    }

    /// Total size of the basis the set describes.
    #[must_use]
    pub const fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Length of every non-terminal block.
    #[must_use]
    pub const fn block_length(&self) -> u32 {
        self.block_length
    }

    /// Length of the terminal short block (0 when none).
    #[must_use]
    pub const fn remainder(&self) -> u32 {
        self.remainder
    }

    /// Transmitted strong-digest length in bytes.
    #[must_use]
    pub const fn strong_len(&self) -> u32 {
        self.strong_len
    }

    /// The block descriptors, in file order.
    #[must_use]
    pub fn blocks(&self) -> &[SignatureBlock] {
        &self.blocks
    }

    /// Returns `true` for the empty set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Byte length of the block at `index`.
    #[must_use]
    pub fn len_of(&self, index: u32) -> u32 {
        if self.remainder > 0 && u64::from(index) + 1 == self.blocks.len() as u64 {
            self.remainder
        } else {
            self.block_length
        }
    }

    /// Byte offset of the block at `index` within the basis.
    #[must_use]
    pub const fn offset_of(&self, index: u32) -> u64 {
        index as u64 * self.block_length as u64
    }

    /// Encodes the set for the wire.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        let count = i32::try_from(self.blocks.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "block count exceeds the wire format")
        })?;
        wire::write_int(writer, count)?;
        wire::write_int(writer, self.block_length as i32)?;
        wire::write_int(writer, self.strong_len as i32)?;
        wire::write_int(writer, self.remainder as i32)?;
        for block in &self.blocks {
            wire::write_int(writer, block.weak as i32)?;
            writer.write_all(&block.strong[..self.strong_len as usize])?;
        }
        Ok(())
    }

    /// Decodes a set from the wire, validating the header geometry.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let count = wire::read_size(reader)?;
        let block_length = wire::read_size(reader)? as u64;
        let strong_len = wire::read_size(reader)?;
        let remainder = wire::read_size(reader)? as u64;

        if count == 0 {
            return Ok(Self::empty());
        }
        if block_length == 0 || block_length > u64::from(BLOCK_SIZE_MAX) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("block length {block_length} outside the valid range"),
            ));
        }
        if !(2..=CSUM_LENGTH).contains(&strong_len) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("strong digest length {strong_len} outside 2..=16"),
            ));
        }
        if remainder >= block_length {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("terminal block of {remainder} bytes not shorter than {block_length}"),
            ));
        }

        let mut blocks = Vec::new();
        for index in 0..count {
            let weak = wire::read_int(reader)? as u32;
            let mut strong = [0u8; CSUM_LENGTH];
            reader.read_exact(&mut strong[..strong_len])?;
            blocks.push(SignatureBlock {
                index: index as u32,
                weak,
                strong,
            });
        }

        let full_blocks = count as u64 - u64::from(remainder > 0);
        Ok(Self {
            file_size: full_blocks * block_length + remainder,
            block_length: block_length as u32,
            remainder: remainder as u32,
            strong_len: strong_len as u32,
            blocks,
        })
    }
}

/// Reads until `buf` is full or EOF; returns the number of bytes placed.
fn fill_block<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
