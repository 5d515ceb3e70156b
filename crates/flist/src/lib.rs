//! File-list construction and exchange.
//!
//! Both peers must hold byte-identical lists so block sets and token
//! streams can reference files by position alone. The sender builds its
//! list from the source arguments, sorts it lexicographically by wire path,
//! and removes duplicates; the wire encoding then compresses each entry
//! against the previous one (shared path prefix, repeated mode/mtime), with
//! a zero status byte closing the list.
//!
//! Received lists are untrusted: paths are validated against traversal
//! (no absolute paths, no `..`, no empty components) before any filesystem
//! operation derives from them.

mod builder;
mod entry;

pub use builder::{BuiltList, TraversalOptions, build_file_list};
pub use entry::{FileEntry, read_file_list, write_file_list};
