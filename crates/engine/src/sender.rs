use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use checksums::CSUM_LENGTH;
use flist::{TraversalOptions, build_file_list};
use logging::{Logger, info_log};
use matching::generate_delta;
use protocol::envelope::MessageCode;
use protocol::wire;
use protocol::{DemuxReader, MuxWriter};
use signature::FileSignature;

use crate::error::EngineError;
use crate::session::{Options, Session, SessionStats};

/// Runs the sending role over the given descriptor pair.
///
/// The sender publishes the file list, then serves the receiver's phase-1
/// requests: for each file index it reads the accompanying block set and
/// answers with a token stream. A `-1` index ends the phase; the sender
/// acknowledges it and closes with the statistics exchange.
pub fn run_sender<R: Read, W: Write>(
    options: &Options,
    sources: &[PathBuf],
    reader: R,
    writer: W,
    logger: Logger,
) -> Result<SessionStats, EngineError> {
    let mut reader = DemuxReader::new(reader, logger);
    let mut writer = MuxWriter::new(writer);

    let session =
        Session::handshake_sender(options.clone(), logger, &mut reader, &mut writer)
            .map_err(EngineError::Protocol)?;

    let traversal = TraversalOptions {
        recursive: options.recursive,
        preserve_links: options.preserve_links,
    };
    let built = build_file_list(sources, &traversal, logger);
    flist::write_file_list(&mut writer, &built.entries).map_err(EngineError::Protocol)?;
    wire::write_int(&mut writer, built.io_errors as i32).map_err(EngineError::Protocol)?;
    writer.flush().map_err(EngineError::Protocol)?;
    info_log!(logger, 1, "sending file list: {} entries", built.entries.len());

    let total_size: u64 = built
        .entries
        .iter()
        .filter(|entry| entry.is_file())
        .map(|entry| entry.size)
        .sum();

    let mut files_transferred = 0u64;
    loop {
        let index = wire::read_int(&mut reader).map_err(EngineError::Protocol)?;
        if index == -1 {
            break;
        }
        files_transferred += 1;
        let entry = usize::try_from(index)
            .ok()
            .and_then(|index| built.entries.get(index))
            .filter(|entry| entry.is_file())
            .ok_or_else(|| {
                EngineError::Protocol(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("peer requested invalid file index {index}"),
                ))
            })?;

        let signature = FileSignature::read_from(&mut reader).map_err(EngineError::Protocol)?;

        match fs::read(&entry.path) {
            Ok(source) => {
                let stats = generate_delta(&source, &signature, session.seed, &mut writer)
                    .map_err(EngineError::Protocol)?;
                info_log!(
                    logger,
                    3,
                    "{}: {} literal, {} matched",
                    entry.wpath,
                    stats.literal_bytes,
                    stats.matched_bytes
                );
            }
            Err(err) => fail_file(&mut writer, &entry.wpath, &err).map_err(EngineError::Protocol)?,
        }
        writer.flush().map_err(EngineError::Protocol)?;
    }

    // Phase 2: acknowledge the end of the file loop, then report our view
    // of the transfer. The counters are snapshotted before the report so
    // both sides agree on what the numbers cover.
    wire::write_int(&mut writer, -1).map_err(EngineError::Protocol)?;
    let bytes_read = reader.bytes_read();
    let bytes_written = writer.bytes_written();
    wire::write_long(&mut writer, bytes_read as i64).map_err(EngineError::Protocol)?;
    wire::write_long(&mut writer, bytes_written as i64).map_err(EngineError::Protocol)?;
    wire::write_long(&mut writer, total_size as i64).map_err(EngineError::Protocol)?;
    writer.flush().map_err(EngineError::Protocol)?;

    Ok(SessionStats {
        bytes_read,
        bytes_written,
        total_size,
        files_transferred,
    })
}

/// Answers a request for a file we cannot read while keeping the token
/// stream in step: an empty stream closed with an unverifiable digest, so
/// the receiver discards its temporary and moves on, plus an out-of-band
/// error line naming the cause.
fn fail_file<W: Write>(
    writer: &mut MuxWriter<W>,
    wpath: &str,
    err: &io::Error,
) -> io::Result<()> {
    writer.write_message(MessageCode::ErrorXfer, &format!("{wpath}: {err}"))?;
    wire::write_done_token(writer)?;
    writer.write_all(&[0u8; CSUM_LENGTH])
}
