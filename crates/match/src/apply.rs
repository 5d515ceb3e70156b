use std::io::{self, Read, Seek, SeekFrom, Write};

use checksums::{CSUM_LENGTH, FileDigest};
use protocol::wire::{self, Token};
use signature::FileSignature;
use thiserror::Error;

use crate::generate::DeltaStats;

/// How applying a token stream can fail.
///
/// The distinction matters to the receiver's state machine: a [`Stream`]
/// error means the wire position is lost and the session must die, while a
/// [`File`] error is fully drained and only the current file is affected.
///
/// [`Stream`]: ApplyError::Stream
/// [`File`]: ApplyError::File
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The token stream itself could not be read; the session is
    /// unrecoverable.
    #[error("token stream failed: {0}")]
    Stream(#[source] io::Error),
    /// This file could not be reconstructed (bad block reference, basis or
    /// output I/O failure, digest mismatch); the stream was consumed to its
    /// end and the next file can proceed.
    #[error("{0}")]
    File(#[source] io::Error),
}

/// Applies a token stream against the local basis, writing the
/// reconstructed file to `out`.
///
/// `signature` must be the exact block set that was sent for this file;
/// match tokens index into it. The embedded whole-file digest is verified
/// before returning.
///
/// # Errors
///
/// A failure to read the token stream itself is returned immediately as
/// [`ApplyError::Stream`]. Everything else (out-of-range block index,
/// basis or output I/O failure, digest mismatch) becomes
/// [`ApplyError::File`]: the rest of the stream is consumed so the channel
/// stays in sync, and the error is returned afterwards for the caller to
/// count.
pub fn apply_delta<R, B, W>(
    tokens: &mut R,
    basis: &mut B,
    out: &mut W,
    signature: &FileSignature,
    seed: u32,
) -> Result<DeltaStats, ApplyError>
where
    R: Read + ?Sized,
    B: Read + Seek + ?Sized,
    W: Write + ?Sized,
{
    let mut stats = DeltaStats::default();
    let mut digest = FileDigest::new(seed);
    let mut failure: Option<io::Error> = None;
    let mut buf = vec![0u8; wire::MAX_CHUNK];

    loop {
        match wire::read_token(tokens).map_err(ApplyError::Stream)? {
            Token::Literal(len) => {
                copy_literal(tokens, out, len as usize, &mut buf, &mut digest, &mut stats, &mut failure)?;
            }
            Token::Match(index) => {
                if failure.is_some() {
                    continue;
                }
                if let Err(err) = copy_block(basis, out, signature, index, &mut digest, &mut stats) {
                    failure = Some(err);
                }
            }
            Token::Done => {
                let mut wire_digest = [0u8; CSUM_LENGTH];
                tokens.read_exact(&mut wire_digest).map_err(ApplyError::Stream)?;
                if failure.is_none() && digest.finalize() != wire_digest {
                    failure = Some(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "whole-file digest mismatch after reconstruction",
                    ));
                }
                break;
            }
        }
    }

    match failure {
        Some(err) => Err(ApplyError::File(err)),
        None => Ok(stats),
    }
}

/// Consumes a literal run from the token stream, forwarding it to the
/// output unless the file already failed (the bytes still must be read to
/// keep the stream in sync).
fn copy_literal<R, W>(
    tokens: &mut R,
    out: &mut W,
    len: usize,
    buf: &mut [u8],
    digest: &mut FileDigest,
    stats: &mut DeltaStats,
    failure: &mut Option<io::Error>,
) -> Result<(), ApplyError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut left = len;
    while left > 0 {
        let take = left.min(buf.len());
        tokens.read_exact(&mut buf[..take]).map_err(ApplyError::Stream)?;
        left -= take;

        if failure.is_none() {
            digest.update(&buf[..take]);
            if let Err(err) = out.write_all(&buf[..take]) {
                *failure = Some(err);
            } else {
                stats.literal_bytes += take as u64;
            }
        }
    }
    Ok(())
}

fn copy_block<B, W>(
    basis: &mut B,
    out: &mut W,
    signature: &FileSignature,
    index: u32,
    digest: &mut FileDigest,
    stats: &mut DeltaStats,
) -> io::Result<()>
where
    B: Read + Seek + ?Sized,
    W: Write + ?Sized,
{
    if u64::from(index) >= signature.blocks().len() as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "match token references block {index} of a {}-block set",
                signature.blocks().len()
            ),
        ));
    }

    let len = signature.len_of(index) as usize;
    let mut block = vec![0u8; len];
    basis.seek(SeekFrom::Start(signature.offset_of(index)))?;
    basis.read_exact(&mut block)?;

    digest.update(&block);
    out.write_all(&block)?;
    stats.matched_bytes += len as u64;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::generate_delta;
    use std::io::Cursor;

    const SEED: u32 = 0x00c0_ffee;

    fn round_trip(basis: &[u8], source: &[u8]) -> (Vec<u8>, DeltaStats) {
        let signature = FileSignature::from_bytes(basis, SEED);
        let mut stream = Vec::new();
        generate_delta(source, &signature, SEED, &mut stream).expect("delta generation");

        let mut rebuilt = Vec::new();
        let stats = apply_delta(
            &mut Cursor::new(stream),
            &mut Cursor::new(basis.to_vec()),
            &mut rebuilt,
            &signature,
            SEED,
        )
        .expect("application succeeds");
        (rebuilt, stats)
    }

    #[test]
    fn reconstruction_with_empty_basis() {
        let source = b"fresh file, no basis at all";
        let (rebuilt, stats) = round_trip(b"", source);
        assert_eq!(rebuilt, source);
        assert_eq!(stats.literal_bytes, source.len() as u64);
    }

    #[test]
    fn reconstruction_with_identical_basis() {
        let source: Vec<u8> = (0..3000u32).map(|i| (i % 199) as u8).collect();
        let (rebuilt, stats) = round_trip(&source, &source);
        assert_eq!(rebuilt, source);
        assert_eq!(stats.literal_bytes, 0);
        assert_eq!(stats.matched_bytes, source.len() as u64);
    }

    #[test]
    fn reconstruction_with_partial_overlap() {
        let basis: Vec<u8> = (0..2100u32).map(|i| (i % 173) as u8).collect();
        let mut source = basis.clone();
        source.splice(0..0, b"inserted head".iter().copied());
        source.extend_from_slice(b"appended tail");

        let (rebuilt, stats) = round_trip(&basis, &source);
        assert_eq!(rebuilt, source);
        assert!(stats.matched_bytes >= 2100 - 700, "bulk comes from the basis");
    }

    #[test]
    fn out_of_range_block_index_is_a_per_file_error() {
        let basis = vec![1u8; 700];
        let signature = FileSignature::from_bytes(&basis, SEED);

        let mut stream = Vec::new();
        wire::write_match_token(&mut stream, 99).unwrap();
        wire::write_done_token(&mut stream).unwrap();
        stream.extend_from_slice(&[0u8; CSUM_LENGTH]);
        // Trailing bytes stand in for the next file's traffic; they must
        // remain unread.
        stream.extend_from_slice(&[0xEE; 4]);

        let mut tokens = Cursor::new(stream);
        let mut rebuilt = Vec::new();
        let err = apply_delta(
            &mut tokens,
            &mut Cursor::new(basis),
            &mut rebuilt,
            &signature,
            SEED,
        )
        .unwrap_err();

        assert!(matches!(err, ApplyError::File(_)), "got {err:?}");
        let consumed = tokens.position() as usize;
        assert_eq!(
            tokens.get_ref().len() - consumed,
            4,
            "stream must stop exactly at the digest boundary"
        );
    }

    #[test]
    fn digest_mismatch_is_reported() {
        let source = b"contents protected by the digest";
        let signature = FileSignature::empty();

        let mut stream = Vec::new();
        generate_delta(source, &signature, SEED, &mut stream).unwrap();
        let tail = stream.len() - 1;
        stream[tail] ^= 0xff;

        let mut rebuilt = Vec::new();
        let err = apply_delta(
            &mut Cursor::new(stream),
            &mut Cursor::new(Vec::new()),
            &mut rebuilt,
            &signature,
            SEED,
        )
        .unwrap_err();
        assert!(matches!(err, ApplyError::File(_)), "got {err:?}");
        assert!(err.to_string().contains("digest mismatch"));
    }

    #[test]
    fn truncated_token_stream_is_fatal() {
        let err = apply_delta(
            &mut Cursor::new(vec![0x04, 0x00]),
            &mut Cursor::new(Vec::new()),
            &mut Vec::new(),
            &FileSignature::empty(),
            SEED,
        )
        .unwrap_err();
        assert!(matches!(err, ApplyError::Stream(_)), "got {err:?}");
    }
}
