use std::io::{self, Read, Write};
use std::path::PathBuf;

use logging::Logger;
use protocol::wire;
use protocol::{DemuxReader, MuxWriter, PROTOCOL_VERSION, check_remote_version};

/// Flat record of the option flags the engine recognizes.
///
/// The CLI surface produces one of these; the server re-derives it from the
/// flags embedded in the spawned command line, so both peers agree on
/// behavior without a dedicated negotiation step.
#[derive(Clone, Debug, Default)]
pub struct Options {
    /// This process is the sending role.
    pub sender: bool,
    /// This process was spawned as the remote server.
    pub server: bool,
    /// Recurse into directories.
    pub recursive: bool,
    /// Verbosity level, 0 to 4.
    pub verbosity: u8,
    /// Consume the wire exactly but touch nothing under the sink.
    pub dry_run: bool,
    /// Apply source modification times to received files.
    pub preserve_times: bool,
    /// Apply source permission bits to received files.
    pub preserve_perms: bool,
    /// Recreate symlinks instead of following them.
    pub preserve_links: bool,
    /// Remove sink entries that are absent from the received list.
    pub delete: bool,
    /// Path of the peer executable used by the transport launcher.
    pub rsync_path: Option<PathBuf>,
}

/// Transfer accounting reported at the end of a session.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SessionStats {
    /// Bytes this role read from the peer, framing included.
    pub bytes_read: u64,
    /// Bytes this role wrote to the peer, framing included.
    pub bytes_written: u64,
    /// Total size of the regular files in the transfer list.
    pub total_size: u64,
    /// Regular files that actually moved through the delta protocol.
    pub files_transferred: u64,
}

/// State shared by both roles for the duration of one transfer.
#[derive(Clone, Debug)]
pub struct Session {
    /// Option flags in effect.
    pub options: Options,
    /// Sender-chosen seed keying every strong digest.
    pub seed: u32,
    /// Our protocol version.
    pub local_version: i32,
    /// The peer's announced protocol version.
    pub remote_version: i32,
    /// Verbosity-gated logger shared with the framing layer.
    pub logger: Logger,
}

impl Session {
    /// Runs the sender side of the handshake.
    ///
    /// Versions are exchanged on the bare stream, the seed is drawn and
    /// published, then multiplexing is enabled on the write side: from here
    /// on everything the sender emits travels in frames.
    pub fn handshake_sender<R: Read, W: Write>(
        options: Options,
        logger: Logger,
        reader: &mut DemuxReader<R>,
        writer: &mut MuxWriter<W>,
    ) -> io::Result<Self> {
        wire::write_int(writer, PROTOCOL_VERSION)?;
        writer.flush()?;
        let remote_version = wire::read_int(reader)?;
        check_remote_version(remote_version)?;

        let seed = random_seed()?;
        wire::write_int(writer, seed as i32)?;
        writer.flush()?;
        writer.activate();

        logger.info(
            2,
            format_args!("handshake complete: peer version {remote_version}, seed {seed:#010x}"),
        );
        Ok(Self {
            options,
            seed,
            local_version: PROTOCOL_VERSION,
            remote_version,
            logger,
        })
    }

    /// Runs the receiver side of the handshake.
    ///
    /// Mirror image of the sender: after storing the seed, multiplexing is
    /// enabled on the read side so log frames from the sender are absorbed
    /// transparently.
    pub fn handshake_receiver<R: Read, W: Write>(
        options: Options,
        logger: Logger,
        reader: &mut DemuxReader<R>,
        writer: &mut MuxWriter<W>,
    ) -> io::Result<Self> {
        wire::write_int(writer, PROTOCOL_VERSION)?;
        writer.flush()?;
        let remote_version = wire::read_int(reader)?;
        check_remote_version(remote_version)?;

        let seed = wire::read_int(reader)? as u32;
        reader.activate();

        logger.info(
            2,
            format_args!("handshake complete: peer version {remote_version}, seed {seed:#010x}"),
        );
        Ok(Self {
            options,
            seed,
            local_version: PROTOCOL_VERSION,
            remote_version,
            logger,
        })
    }
}

/// Draws the 32-bit session seed from the operating system.
fn random_seed() -> io::Result<u32> {
    let mut buf = [0u8; 4];
    getrandom::fill(&mut buf).map_err(io::Error::other)?;
    Ok(u32::from_le_bytes(buf))
}
