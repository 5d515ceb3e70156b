//! Protocol version constants and the handshake compatibility check.

use std::io;

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: i32 = 27;

/// Oldest peer version accepted during the handshake.
///
/// The wire formats of older peers differ in the file-list and checksum
/// encodings, so anything below this is refused rather than downgraded.
pub const MIN_PROTOCOL_VERSION: i32 = 27;

/// Validates the version announced by the peer.
///
/// # Errors
///
/// Returns an [`io::ErrorKind::InvalidData`] error when the peer is older
/// than [`MIN_PROTOCOL_VERSION`].
pub fn check_remote_version(remote: i32) -> io::Result<()> {
    if remote < MIN_PROTOCOL_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "peer protocol version {remote} is older than the minimum supported {MIN_PROTOCOL_VERSION}"
            ),
        ));
    }
    Ok(())
}
