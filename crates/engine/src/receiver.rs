use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt, symlink};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use flist::FileEntry;
use logging::{Logger, error_log, info_log, warn_log};
use matching::{ApplyError, DeltaStats, apply_delta};
use protocol::wire;
use protocol::{DemuxReader, MuxWriter};
use signature::FileSignature;

use crate::delete::delete_extraneous;
use crate::error::EngineError;
use crate::session::{Options, Session, SessionStats};

/// Runs the receiving role over the given descriptor pair.
///
/// The receiver consumes the file list, then drives phase 1: for every
/// regular file that fails the quick check it sends the file's index and a
/// block set of its basis, and merges the returned token stream into a
/// temporary that is renamed over the destination. Directories and
/// symlinks are materialized locally without touching the wire. A `-1`
/// index ends the phase; the sender's acknowledgement and statistics
/// close the session, after which extraneous sink entries are deleted if
/// requested.
pub fn run_receiver<R: Read, W: Write>(
    options: &Options,
    dest: &Path,
    reader: R,
    writer: W,
    logger: Logger,
) -> Result<SessionStats, EngineError> {
    let mut reader = DemuxReader::new(reader, logger);
    let mut writer = MuxWriter::new(writer);

    let session = Session::handshake_receiver(options.clone(), logger, &mut reader, &mut writer)
        .map_err(EngineError::Protocol)?;

    let entries = flist::read_file_list(&mut reader).map_err(EngineError::Protocol)?;
    let remote_io_errors = wire::read_int(&mut reader).map_err(EngineError::Protocol)?;
    info_log!(logger, 1, "received file list: {} entries", entries.len());
    if remote_io_errors != 0 {
        warn_log!(logger, "peer reported {remote_io_errors} errors while building the file list");
    }

    let mut receiver = Receiver {
        session,
        reader,
        writer,
        file_errors: 0,
        files_transferred: 0,
    };
    let into_dir = entries.len() != 1
        || entries.first().is_some_and(|entry| !entry.is_file())
        || dest.is_dir();

    // A multi-entry transfer lands beneath the sink; an existing
    // non-directory there cannot hold it, so fail once up front instead of
    // once per entry.
    if into_dir
        && let Ok(meta) = fs::metadata(dest)
        && !meta.is_dir()
    {
        return Err(EngineError::Io(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("destination {} is not a directory", dest.display()),
        )));
    }

    for (index, entry) in entries.iter().enumerate() {
        let target = target_path(dest, entry, into_dir);
        receiver.process_entry(index, entry, &target)?;
    }

    // Phase 2: close the file loop and collect the sender's report.
    wire::write_int(&mut receiver.writer, -1).map_err(EngineError::Protocol)?;
    receiver.writer.flush().map_err(EngineError::Protocol)?;
    let ack = wire::read_int(&mut receiver.reader).map_err(EngineError::Protocol)?;
    if ack != -1 {
        return Err(EngineError::Protocol(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected end-of-phase acknowledgement, got {ack}"),
        )));
    }
    let peer_read = wire::read_long(&mut receiver.reader).map_err(EngineError::Protocol)?;
    let peer_written = wire::read_long(&mut receiver.reader).map_err(EngineError::Protocol)?;
    let total_size = wire::read_long(&mut receiver.reader).map_err(EngineError::Protocol)?;
    info_log!(
        logger,
        2,
        "peer read {peer_read} and wrote {peer_written} bytes for {total_size} bytes of files"
    );

    if options.delete && options.recursive && into_dir {
        if remote_io_errors != 0 {
            warn_log!(logger, "peer reported errors, skipping deletion of extraneous files");
        } else {
            let keep: HashSet<&str> = entries.iter().map(|entry| entry.wpath.as_str()).collect();
            receiver.file_errors += delete_extraneous(dest, &keep, options.dry_run, logger);
        }
    }

    if options.preserve_times && !options.dry_run {
        // Writing children and deleting strays both touch directory times;
        // fix them up last.
        for entry in entries.iter().filter(|entry| entry.is_dir()) {
            let target = target_path(dest, entry, into_dir);
            let mtime = FileTime::from_unix_time(entry.mtime, 0);
            if let Err(err) = filetime::set_file_mtime(&target, mtime) {
                info_log!(logger, 3, "{}: cannot set directory time: {err}", entry.wpath);
            }
        }
    }

    if receiver.file_errors != 0 {
        warn_log!(
            logger,
            "{} entries could not be transferred or removed",
            receiver.file_errors
        );
    }

    Ok(SessionStats {
        bytes_read: receiver.reader.bytes_read(),
        bytes_written: receiver.writer.bytes_written(),
        total_size: total_size.max(0) as u64,
        files_transferred: receiver.files_transferred,
    })
}

/// How a single file's merge ended.
enum MergeError {
    /// The wire conversation is unrecoverable.
    Fatal(io::Error),
    /// Only this file failed; the stream was drained and the next file can
    /// proceed.
    Skip(io::Error),
}

struct Receiver<R, W> {
    session: Session,
    reader: DemuxReader<R>,
    writer: MuxWriter<W>,
    file_errors: u32,
    files_transferred: u64,
}

impl<R: Read, W: Write> Receiver<R, W> {
    fn process_entry(
        &mut self,
        index: usize,
        entry: &FileEntry,
        target: &Path,
    ) -> Result<(), EngineError> {
        let logger = self.session.logger;

        if entry.is_dir() {
            if let Err(err) = self.make_directory(entry, target) {
                error_log!(logger, "{}: {err}", entry.wpath);
                self.file_errors += 1;
            }
            return Ok(());
        }
        if entry.is_symlink() {
            if !self.session.options.preserve_links {
                info_log!(logger, 2, "skipping symlink {}", entry.wpath);
            } else if let Err(err) = self.make_symlink(entry, target) {
                error_log!(logger, "{}: {err}", entry.wpath);
                self.file_errors += 1;
            }
            return Ok(());
        }
        if !entry.is_file() {
            info_log!(logger, 2, "skipping non-regular entry {}", entry.wpath);
            return Ok(());
        }

        if is_up_to_date(target, entry) {
            info_log!(logger, 2, "{} is up to date", entry.wpath);
            return Ok(());
        }
        self.transfer_file(index, entry, target)
    }

    /// Runs one iteration of the phase-1 protocol for a regular file.
    fn transfer_file(
        &mut self,
        index: usize,
        entry: &FileEntry,
        target: &Path,
    ) -> Result<(), EngineError> {
        let logger = self.session.logger;

        wire::write_int(&mut self.writer, index as i32).map_err(EngineError::Protocol)?;
        let signature = basis_signature(target, self.session.seed);
        signature
            .write_to(&mut self.writer)
            .map_err(EngineError::Protocol)?;
        self.writer.flush().map_err(EngineError::Protocol)?;

        match self.merge_file(entry, target, &signature) {
            Ok(stats) => {
                self.files_transferred += 1;
                info_log!(logger, 1, "{}", entry.wpath);
                info_log!(
                    logger,
                    2,
                    "{}: {} literal, {} matched",
                    entry.wpath,
                    stats.literal_bytes,
                    stats.matched_bytes
                );
                Ok(())
            }
            Err(MergeError::Skip(err)) => {
                error_log!(logger, "{}: {err}", entry.wpath);
                self.file_errors += 1;
                Ok(())
            }
            Err(MergeError::Fatal(err)) => Err(EngineError::Protocol(err)),
        }
    }

    /// Merges the token stream for `entry` into its destination.
    ///
    /// Dry runs consume the stream against a sink so the wire traffic is
    /// identical to a real transfer. Local failures before the stream is
    /// consumed still drain it, so one broken file cannot desynchronize
    /// the session.
    fn merge_file(
        &mut self,
        entry: &FileEntry,
        target: &Path,
        signature: &FileSignature,
    ) -> Result<DeltaStats, MergeError> {
        if self.session.options.dry_run {
            return self.apply_tokens(target, signature, &mut io::sink());
        }

        let parent = target.parent().filter(|p| !p.as_os_str().is_empty());
        let parent = parent.unwrap_or_else(|| Path::new("."));
        if let Err(err) = ensure_directories(parent) {
            self.drain_tokens(target, signature);
            return Err(MergeError::Skip(err));
        }

        let stem = target
            .file_name()
            .map_or_else(|| "file".into(), |name| name.to_string_lossy().into_owned());
        let mut temp = match tempfile::Builder::new()
            .prefix(&format!(".{stem}."))
            .tempfile_in(parent)
        {
            Ok(temp) => temp,
            Err(err) => {
                self.drain_tokens(target, signature);
                return Err(MergeError::Skip(err));
            }
        };

        // A failed merge drops (and thereby unlinks) the temporary.
        let stats = self.apply_tokens(target, signature, temp.as_file_mut())?;

        let mode = if self.session.options.preserve_perms {
            entry.permissions()
        } else {
            fs::metadata(target)
                .map(|meta| meta.mode() & 0o7777)
                .unwrap_or_else(|_| entry.permissions())
        };
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(mode))
            .map_err(MergeError::Skip)?;
        if self.session.options.preserve_times {
            filetime::set_file_mtime(temp.path(), FileTime::from_unix_time(entry.mtime, 0))
                .map_err(MergeError::Skip)?;
        }
        temp.persist(target)
            .map_err(|err| MergeError::Skip(err.error))?;
        Ok(stats)
    }

    /// Applies the token stream against the basis at `target`, writing the
    /// reconstruction to `out`.
    fn apply_tokens<O: Write>(
        &mut self,
        target: &Path,
        signature: &FileSignature,
        out: &mut O,
    ) -> Result<DeltaStats, MergeError> {
        let seed = self.session.seed;
        let result = match File::open(target) {
            Ok(mut basis) => apply_delta(&mut self.reader, &mut basis, out, signature, seed),
            // No usable basis: with a non-empty signature any match token
            // will fail per-file inside the application and the stream is
            // still drained.
            Err(_) => apply_delta(
                &mut self.reader,
                &mut io::Cursor::new(Vec::new()),
                out,
                signature,
                seed,
            ),
        };
        result.map_err(|err| match err {
            ApplyError::Stream(err) => MergeError::Fatal(err),
            ApplyError::File(err) => MergeError::Skip(err),
        })
    }

    /// Consumes a token stream whose output no longer matters.
    fn drain_tokens(&mut self, target: &Path, signature: &FileSignature) {
        let _ = self.apply_tokens(target, signature, &mut io::sink());
    }

    fn make_directory(&self, entry: &FileEntry, target: &Path) -> io::Result<()> {
        if self.session.options.dry_run {
            return Ok(());
        }
        match fs::symlink_metadata(target) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                fs::remove_file(target)?;
                fs::DirBuilder::new().recursive(true).mode(0o755).create(target)?;
            }
            Err(_) => {
                fs::DirBuilder::new().recursive(true).mode(0o755).create(target)?;
            }
        }
        if self.session.options.preserve_perms {
            fs::set_permissions(target, fs::Permissions::from_mode(entry.permissions()))?;
        }
        Ok(())
    }

    fn make_symlink(&self, entry: &FileEntry, target: &Path) -> io::Result<()> {
        let Some(link) = entry.link_target.as_deref() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "symlink entry without a target",
            ));
        };
        if self.session.options.dry_run {
            return Ok(());
        }
        if let Ok(existing) = fs::read_link(target)
            && existing == Path::new(link)
        {
            return Ok(());
        }
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directories(parent)?;
        }
        match fs::symlink_metadata(target) {
            Ok(_) => fs::remove_file(target)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        symlink(link, target)
    }
}

/// Builds the block set of the basis at `target`, or the empty set when no
/// regular file can be read there.
fn basis_signature(target: &Path, seed: u32) -> FileSignature {
    let Ok(meta) = fs::symlink_metadata(target) else {
        return FileSignature::empty();
    };
    if !meta.is_file() {
        return FileSignature::empty();
    }
    match File::open(target) {
        Ok(mut file) => {
            FileSignature::generate(&mut file, meta.len(), seed).unwrap_or_else(|_| FileSignature::empty())
        }
        Err(_) => FileSignature::empty(),
    }
}

/// The quick check: a basis whose size and mtime already agree with the
/// sender's entry is not requested at all.
fn is_up_to_date(target: &Path, entry: &FileEntry) -> bool {
    fs::symlink_metadata(target).is_ok_and(|meta| {
        meta.is_file() && meta.len() == entry.size && meta.mtime() == entry.mtime
    })
}

/// Resolves where an entry lands beneath (or at) the sink.
fn target_path(dest: &Path, entry: &FileEntry, into_dir: bool) -> PathBuf {
    if !into_dir || entry.wpath == "." {
        dest.to_path_buf()
    } else {
        dest.join(&entry.wpath)
    }
}

/// Creates every missing ancestor with mode 0755.
fn ensure_directories(dir: &Path) -> io::Result<()> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    fs::DirBuilder::new().recursive(true).mode(0o755).create(dir)
}
