use std::io::{self, Write};

use checksums::{FileDigest, RollingChecksum, block_digest};
use protocol::wire;
use signature::FileSignature;

use crate::index::DeltaSignatureIndex;

/// Byte accounting for one generated or applied delta.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DeltaStats {
    /// Bytes sent (or received) as literal runs.
    pub literal_bytes: u64,
    /// Bytes reproduced from basis blocks.
    pub matched_bytes: u64,
}

/// Scans `source` against the peer's block set and writes the token stream.
///
/// The scan is greedy: at every offset the candidate blocks for the current
/// weak checksum are tried in ascending block order and the first strong
/// confirmation wins, the window then jumping past the matched range. On a
/// miss the window slides one byte, extending the pending literal run. Near
/// EOF the window narrows to the terminal remainder so the short last block
/// can still match; once not even that fits, the tail is flushed as
/// literals. The stream ends with the zero token and the whole-file digest.
pub fn generate_delta<W: Write + ?Sized>(
    source: &[u8],
    signature: &FileSignature,
    seed: u32,
    writer: &mut W,
) -> io::Result<DeltaStats> {
    let mut stats = DeltaStats::default();

    let Some(index) = DeltaSignatureIndex::from_signature(signature) else {
        flush_literals(writer, source, &mut stats)?;
        return finish(writer, source, seed, stats);
    };

    let block_len = signature.block_length() as usize;
    let remainder = signature.remainder() as usize;
    let total = source.len();

    let mut rolling = RollingChecksum::new();
    let mut window_len = 0usize;
    let mut literal_start = 0usize;
    let mut pos = 0usize;

    while pos < total {
        let avail = total - pos;
        let want = if avail >= block_len {
            block_len
        } else if remainder > 0 && avail >= remainder {
            remainder
        } else {
            break;
        };

        if window_len != want {
            rolling.update_from_block(&source[pos..pos + want]);
            window_len = want;
        }

        let weak = rolling.value();
        let window = &source[pos..pos + want];
        let matched = index.candidates(weak).iter().copied().find(|&candidate| {
            let block = &signature.blocks()[candidate as usize];
            block.weak == weak
                && signature.len_of(candidate) as usize == want
                && confirm_strong(signature, candidate, window, seed)
        });

        if let Some(block) = matched {
            flush_literals(writer, &source[literal_start..pos], &mut stats)?;
            wire::write_match_token(writer, block)?;
            stats.matched_bytes += want as u64;
            pos += want;
            literal_start = pos;
            window_len = 0;
        } else if pos + want < total {
            rolling
                .roll(source[pos], source[pos + want])
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
            pos += 1;
        } else {
            // The window cannot slide without shrinking; re-anchor (and
            // possibly narrow) on the next iteration.
            pos += 1;
            window_len = 0;
        }
    }

    flush_literals(writer, &source[literal_start..], &mut stats)?;
    finish(writer, source, seed, stats)
}

fn confirm_strong(signature: &FileSignature, candidate: u32, window: &[u8], seed: u32) -> bool {
    let strong_len = signature.strong_len() as usize;
    let block = &signature.blocks()[candidate as usize];
    block_digest(seed, window)[..strong_len] == block.strong[..strong_len]
}

fn flush_literals<W: Write + ?Sized>(
    writer: &mut W,
    run: &[u8],
    stats: &mut DeltaStats,
) -> io::Result<()> {
    for chunk in run.chunks(wire::MAX_CHUNK) {
        wire::write_literal_token(writer, chunk.len())?;
        writer.write_all(chunk)?;
        stats.literal_bytes += chunk.len() as u64;
    }
    Ok(())
}

fn finish<W: Write + ?Sized>(
    writer: &mut W,
    source: &[u8],
    seed: u32,
    stats: DeltaStats,
) -> io::Result<DeltaStats> {
    wire::write_done_token(writer)?;
    writer.write_all(&FileDigest::digest(seed, source))?;
    Ok(stats)
}
