use std::io::{self, Read, Write};
use std::path::PathBuf;

use protocol::wire;

/// Mode-field type mask and the file types the transfer core recognizes.
pub(crate) const S_IFMT: u32 = 0o170000;
pub(crate) const S_IFREG: u32 = 0o100000;
pub(crate) const S_IFDIR: u32 = 0o040000;
pub(crate) const S_IFLNK: u32 = 0o120000;

/// Status-byte flags gating which fields accompany an entry.
const FLAG_MODE_SAME: u8 = 0x02;
const FLAG_NAME_SAME: u8 = 0x20;
const FLAG_NAME_LONG: u8 = 0x40;
const FLAG_TIME_SAME: u8 = 0x80;

/// Longest shared path prefix expressible in the status encoding.
const MAX_SHARED_PREFIX: usize = 255;

/// One file in the transfer list.
///
/// `path` is the sender's local path for opening the file; `wpath` is the
/// path relative to the transfer root that travels on the wire and that the
/// receiver resolves beneath its sink. After decoding, `path` mirrors
/// `wpath` and ownership information is zeroed (uid/gid are not
/// transmitted).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileEntry {
    /// Local path used for filesystem access on the generating side.
    pub path: PathBuf,
    /// Path relative to the transfer root, `/`-separated.
    pub wpath: String,
    /// Unix mode bits, including the file type.
    pub mode: u32,
    /// Owner id on the generating side; never transmitted.
    pub uid: u32,
    /// Group id on the generating side; never transmitted.
    pub gid: u32,
    /// Size in bytes (0 for directories and symlinks).
    pub size: u64,
    /// Modification time in seconds since the epoch.
    pub mtime: i64,
    /// Symlink target; `Some` exactly when `mode` marks a symlink.
    pub link_target: Option<String>,
}

impl FileEntry {
    /// Returns `true` for regular files.
    #[must_use]
    pub const fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    /// Returns `true` for directories.
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// Returns `true` for symbolic links.
    #[must_use]
    pub const fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Permission bits without the file type.
    #[must_use]
    pub const fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Encodes this entry against the previous one.
    pub fn write_to<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        prev: Option<&Self>,
    ) -> io::Result<()> {
        let name = self.wpath.as_bytes();
        let shared = prev
            .map(|prev| shared_prefix(prev.wpath.as_bytes(), name))
            .unwrap_or(0);
        let suffix = &name[shared..];

        let mut flags = 0u8;
        if shared > 0 {
            flags |= FLAG_NAME_SAME;
        }
        if suffix.len() > u8::MAX as usize {
            flags |= FLAG_NAME_LONG;
        }
        if prev.is_some_and(|prev| prev.mode == self.mode) {
            flags |= FLAG_MODE_SAME;
        }
        if prev.is_some_and(|prev| prev.mtime == self.mtime) {
            flags |= FLAG_TIME_SAME;
        }
        // A zero status byte is the end-of-list sentinel; force the long
        // name form so a flagless entry stays distinguishable.
        if flags == 0 {
            flags = FLAG_NAME_LONG;
        }

        wire::write_byte(writer, flags)?;
        if flags & FLAG_NAME_SAME != 0 {
            wire::write_byte(writer, shared as u8)?;
        }
        if flags & FLAG_NAME_LONG != 0 {
            wire::write_int(writer, suffix.len() as i32)?;
        } else {
            wire::write_byte(writer, suffix.len() as u8)?;
        }
        writer.write_all(suffix)?;

        wire::write_long(writer, self.size as i64)?;
        if flags & FLAG_TIME_SAME == 0 {
            wire::write_int(writer, self.mtime as i32)?;
        }
        if flags & FLAG_MODE_SAME == 0 {
            wire::write_int(writer, self.mode as i32)?;
        }

        if let Some(target) = &self.link_target {
            wire::write_int(writer, target.len() as i32)?;
            writer.write_all(target.as_bytes())?;
        }
        Ok(())
    }
}

fn shared_prefix(prev: &[u8], next: &[u8]) -> usize {
    prev.iter()
        .zip(next.iter())
        .take(MAX_SHARED_PREFIX)
        .take_while(|(a, b)| a == b)
        .count()
}

/// Encodes a complete list, closing it with the zero sentinel.
pub fn write_file_list<W: Write + ?Sized>(
    writer: &mut W,
    entries: &[FileEntry],
) -> io::Result<()> {
    let mut prev: Option<&FileEntry> = None;
    for entry in entries {
        entry.write_to(writer, prev)?;
        prev = Some(entry);
    }
    wire::write_byte(writer, 0)
}

/// Scratch record carrying the fields an entry may reuse from its
/// predecessor during decode.
#[derive(Default)]
struct LastSeen {
    wpath: Vec<u8>,
    mode: u32,
    mtime: i64,
}

/// Decodes a complete list, validating every received path.
///
/// The result is re-sorted with the same byte-wise comparator the sender
/// uses and de-duplicated, so both peers agree on positional indices.
pub fn read_file_list<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    let mut last = LastSeen::default();

    loop {
        let flags = wire::read_byte(reader)?;
        if flags == 0 {
            break;
        }

        let shared = if flags & FLAG_NAME_SAME != 0 {
            usize::from(wire::read_byte(reader)?)
        } else {
            0
        };
        let suffix_len = if flags & FLAG_NAME_LONG != 0 {
            wire::read_size(reader)?
        } else {
            usize::from(wire::read_byte(reader)?)
        };
        if shared > last.wpath.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "shared path prefix exceeds the previous entry",
            ));
        }

        let mut name = Vec::with_capacity(shared + suffix_len);
        name.extend_from_slice(&last.wpath[..shared]);
        name.extend_from_slice(&wire::read_vec(reader, suffix_len)?);
        let wpath = String::from_utf8(name)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "path is not valid UTF-8"))?;
        validate_wpath(&wpath)?;

        let size = wire::read_long(reader)?;
        let size = u64::try_from(size).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("negative file size {size} on the wire"),
            )
        })?;
        let mtime = if flags & FLAG_TIME_SAME != 0 {
            last.mtime
        } else {
            i64::from(wire::read_int(reader)?)
        };
        let mode = if flags & FLAG_MODE_SAME != 0 {
            last.mode
        } else {
            wire::read_int(reader)? as u32
        };

        let link_target = if mode & S_IFMT == S_IFLNK {
            let len = wire::read_size(reader)?;
            let target = String::from_utf8(wire::read_vec(reader, len)?).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "symlink target is not valid UTF-8")
            })?;
            if target.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "symlink entry with an empty target",
                ));
            }
            Some(target)
        } else {
            None
        };

        last.wpath = wpath.clone().into_bytes();
        last.mode = mode;
        last.mtime = mtime;

        entries.push(FileEntry {
            path: PathBuf::from(&wpath),
            wpath,
            mode,
            uid: 0,
            gid: 0,
            size,
            mtime,
            link_target,
        });
    }

    entries.sort_by(|a, b| a.wpath.as_bytes().cmp(b.wpath.as_bytes()));
    entries.dedup_by(|a, b| a.wpath == b.wpath);
    Ok(entries)
}

/// Rejects received paths that could escape the transfer root.
fn validate_wpath(path: &str) -> io::Result<()> {
    let traversal = |detail: &str| {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsafe path {path:?} in received file list: {detail}"),
        ))
    };

    if path.is_empty() {
        return traversal("empty path");
    }
    if path == "." {
        return Ok(());
    }
    if path.starts_with('/') {
        return traversal("absolute path");
    }
    for component in path.split('/') {
        match component {
            "" => return traversal("empty component"),
            "." => return traversal("dot component"),
            ".." => return traversal("parent reference"),
            _ => {}
        }
    }
    Ok(())
}
