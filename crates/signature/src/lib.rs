//! Block sets: the receiver-built description of a basis file.
//!
//! For each regular file in the list, the receiver slices its existing copy
//! into fixed-length blocks (the last may be shorter) and sends the weak and
//! strong checksum of every block to the sender, which then only transmits
//! the byte ranges that cannot be reproduced from those blocks. A file with
//! no usable basis gets an empty block set and arrives entirely as literal
//! data.

mod layout;
mod set;

pub use layout::{BLOCK_SIZE_MAX, BLOCK_SIZE_MIN, SignatureLayout};
pub use set::{FileSignature, SignatureBlock};
