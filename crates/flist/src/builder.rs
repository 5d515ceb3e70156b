use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use logging::{Logger, info_log, warn_log};

use crate::entry::FileEntry;

/// Flags controlling traversal of the source arguments.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraversalOptions {
    /// Descend into directories named by the arguments.
    pub recursive: bool,
    /// Represent symlinks as symlink entries instead of following them.
    pub preserve_links: bool,
}

/// Result of building a list: the sorted entries plus the number of
/// filesystem errors that were logged and skipped along the way.
#[derive(Debug, Default)]
pub struct BuiltList {
    /// Sorted, de-duplicated entries.
    pub entries: Vec<FileEntry>,
    /// Count of per-file errors encountered (reported to the peer).
    pub io_errors: u32,
}

/// Builds the transfer list from the source arguments.
///
/// A trailing slash on an argument maps the directory's contents directly
/// beneath the transfer root; without it the final path component is
/// carried. Non-recursive directory arguments are skipped with a notice,
/// matching the collaborator CLI's contract. Per-file failures are logged
/// and counted, never fatal.
pub fn build_file_list(
    sources: &[PathBuf],
    opts: &TraversalOptions,
    logger: Logger,
) -> BuiltList {
    let mut list = BuiltList::default();

    for source in sources {
        let trailing_slash = source.as_os_str().as_encoded_bytes().ends_with(b"/");
        let meta = match fs::symlink_metadata(source) {
            Ok(meta) => meta,
            Err(err) => {
                list.record_error(logger, source, &err);
                continue;
            }
        };

        let prefix: PathBuf = if trailing_slash {
            source.clone()
        } else {
            source.parent().map(Path::to_path_buf).unwrap_or_default()
        };

        if meta.is_dir() {
            if !opts.recursive {
                info_log!(logger, 1, "skipping directory {}", source.display());
                continue;
            }
            list.walk_directory(source, &prefix, &meta, opts, logger);
        } else if trailing_slash {
            let err = io::Error::new(io::ErrorKind::NotADirectory, "not a directory");
            list.record_error(logger, source, &err);
        } else {
            list.push_entry(source, &prefix, &meta, opts, logger);
        }
    }

    list.entries
        .sort_by(|a, b| a.wpath.as_bytes().cmp(b.wpath.as_bytes()));
    list.entries.dedup_by(|next, kept| {
        let dup = next.wpath == kept.wpath;
        if dup {
            info_log!(logger, 2, "removing duplicate list entry {}", next.wpath);
        }
        dup
    });
    list
}

impl BuiltList {
    fn record_error(&mut self, logger: Logger, path: &Path, err: &io::Error) {
        logger.error(format_args!("{}: {err}", path.display()));
        self.io_errors += 1;
    }

    fn walk_directory(
        &mut self,
        dir: &Path,
        prefix: &Path,
        meta: &fs::Metadata,
        opts: &TraversalOptions,
        logger: Logger,
    ) {
        self.push_directory(dir, prefix, meta, logger);

        let reader = match fs::read_dir(dir) {
            Ok(reader) => reader,
            Err(err) => {
                self.record_error(logger, dir, &err);
                return;
            }
        };

        let mut children: Vec<PathBuf> = Vec::new();
        for child in reader {
            match child {
                Ok(child) => children.push(child.path()),
                Err(err) => self.record_error(logger, dir, &err),
            }
        }
        children.sort();

        for child in children {
            let meta = match fs::symlink_metadata(&child) {
                Ok(meta) => meta,
                Err(err) => {
                    self.record_error(logger, &child, &err);
                    continue;
                }
            };
            if meta.is_dir() {
                self.walk_directory(&child, prefix, &meta, opts, logger);
            } else {
                self.push_entry(&child, prefix, &meta, opts, logger);
            }
        }
    }

    fn push_directory(
        &mut self,
        dir: &Path,
        prefix: &Path,
        meta: &fs::Metadata,
        logger: Logger,
    ) {
        let Some(wpath) = wire_path(dir, prefix, logger) else {
            return;
        };
        self.entries.push(FileEntry {
            path: dir.to_path_buf(),
            wpath,
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            size: 0,
            mtime: meta.mtime(),
            link_target: None,
        });
    }

    fn push_entry(
        &mut self,
        path: &Path,
        prefix: &Path,
        meta: &fs::Metadata,
        opts: &TraversalOptions,
        logger: Logger,
    ) {
        if meta.file_type().is_symlink() {
            if opts.preserve_links {
                self.push_symlink(path, prefix, meta, logger);
            } else {
                self.push_followed(path, prefix, logger);
            }
            return;
        }

        if !meta.is_file() {
            info_log!(logger, 1, "skipping non-regular file {}", path.display());
            return;
        }

        let Some(wpath) = wire_path(path, prefix, logger) else {
            return;
        };
        self.entries.push(FileEntry {
            path: path.to_path_buf(),
            wpath,
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len(),
            mtime: meta.mtime(),
            link_target: None,
        });
    }

    fn push_symlink(&mut self, path: &Path, prefix: &Path, meta: &fs::Metadata, logger: Logger) {
        let target = match fs::read_link(path) {
            Ok(target) => target,
            Err(err) => {
                self.record_error(logger, path, &err);
                return;
            }
        };
        let Some(target) = target.to_str().map(str::to_string) else {
            warn_log!(logger, "skipping symlink with non-UTF-8 target {}", path.display());
            return;
        };
        let Some(wpath) = wire_path(path, prefix, logger) else {
            return;
        };
        self.entries.push(FileEntry {
            path: path.to_path_buf(),
            wpath,
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            size: 0,
            mtime: meta.mtime(),
            link_target: Some(target),
        });
    }

    /// Without `-l`, a symlink is followed when it resolves to a regular
    /// file; anything else (broken link, directory link) is skipped so
    /// traversal cannot cycle.
    fn push_followed(&mut self, path: &Path, prefix: &Path, logger: Logger) {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) => {
                self.record_error(logger, path, &err);
                return;
            }
        };
        if !meta.is_file() {
            info_log!(logger, 1, "skipping symlink {}", path.display());
            return;
        }
        let Some(wpath) = wire_path(path, prefix, logger) else {
            return;
        };
        self.entries.push(FileEntry {
            path: path.to_path_buf(),
            wpath,
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len(),
            mtime: meta.mtime(),
            link_target: None,
        });
    }
}

/// Derives the wire path: the suffix after the source prefix, or `.` for
/// the transfer root itself.
fn wire_path(path: &Path, prefix: &Path, logger: Logger) -> Option<String> {
    let relative = path.strip_prefix(prefix).unwrap_or(path);
    if relative.as_os_str().is_empty() {
        return Some(".".to_string());
    }
    match relative.to_str() {
        Some(text) => Some(text.to_string()),
        None => {
            warn_log!(logger, "skipping non-UTF-8 path {}", path.display());
            None
        }
    }
}
