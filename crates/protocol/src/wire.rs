//! Typed little-endian wire primitives.
//!
//! All multi-byte integers on the wire are little-endian. A `long` uses a
//! compact form: values that fit in 31 bits travel as a plain `int`, larger
//! values as the marker `0xffffffff` followed by the full 64-bit value.
//! Logical message boundaries are not aligned with any framing below them,
//! so every primitive reads exactly the bytes it needs and nothing more.

use std::io::{self, Read, Write};

/// Upper bound for a single literal-run token.
///
/// Literal runs longer than this are split into consecutive tokens; the
/// receiver loops on token values, so any split is wire-compatible.
pub const MAX_CHUNK: usize = 32 * 1024;

/// Longest accepted `line` before a missing newline is a protocol error.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Reads a single byte.
pub fn read_byte<R: Read + ?Sized>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Writes a single byte.
pub fn write_byte<W: Write + ?Sized>(writer: &mut W, value: u8) -> io::Result<()> {
    writer.write_all(&[value])
}

/// Reads a signed 32-bit little-endian integer.
pub fn read_int<R: Read + ?Sized>(reader: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Writes a signed 32-bit little-endian integer.
pub fn write_int<W: Write + ?Sized>(writer: &mut W, value: i32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Reads a `long`: a 31-bit value in `int` form, or the `0xffffffff`
/// marker followed by the full 64-bit little-endian value.
pub fn read_long<R: Read + ?Sized>(reader: &mut R) -> io::Result<i64> {
    let small = read_int(reader)?;
    if small != -1 {
        return Ok(i64::from(small));
    }
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

/// Writes a `long` in its compact form.
pub fn write_long<W: Write + ?Sized>(writer: &mut W, value: i64) -> io::Result<()> {
    if (0..0x7fff_ffff).contains(&value) {
        return write_int(writer, value as i32);
    }
    write_int(writer, -1)?;
    writer.write_all(&value.to_le_bytes())
}

/// Reads a non-negative `int` used as a length or count.
///
/// # Errors
///
/// A negative decoded value is a protocol error
/// ([`io::ErrorKind::InvalidData`]).
pub fn read_size<R: Read + ?Sized>(reader: &mut R) -> io::Result<usize> {
    let value = read_int(reader)?;
    usize::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("negative size {value} on the wire"),
        )
    })
}

/// Reads exactly `len` bytes into a fresh buffer.
pub fn read_vec<R: Read + ?Sized>(reader: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads a newline-terminated line, stripping the newline.
///
/// # Errors
///
/// EOF before the newline or a line longer than [`MAX_LINE_LENGTH`] is a
/// protocol error.
pub fn read_line<R: Read + ?Sized>(reader: &mut R) -> io::Result<String> {
    let mut line = Vec::new();
    loop {
        let byte = read_byte(reader)?;
        if byte == b'\n' {
            break;
        }
        if line.len() >= MAX_LINE_LENGTH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "line exceeds maximum length without a terminator",
            ));
        }
        line.push(byte);
    }
    String::from_utf8(line)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "line is not valid UTF-8"))
}

/// Writes a line followed by the newline terminator.
pub fn write_line<W: Write + ?Sized>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")
}

/// One element of the delta token stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Token {
    /// A literal run of this many bytes follows on the stream.
    Literal(u32),
    /// Reference to the block with this zero-based index; no bytes follow.
    Match(u32),
    /// End of file; the 16-byte whole-file digest follows.
    Done,
}

/// Reads the next token of a delta stream.
pub fn read_token<R: Read + ?Sized>(reader: &mut R) -> io::Result<Token> {
    let raw = read_int(reader)?;
    if raw == 0 {
        Ok(Token::Done)
    } else if raw > 0 {
        Ok(Token::Literal(raw as u32))
    } else {
        // -1 maps to block 0; i32::MIN still fits after widening.
        Ok(Token::Match((-(i64::from(raw)) - 1) as u32))
    }
}

/// Writes a literal-run token. The caller sends the bytes afterwards.
///
/// # Errors
///
/// `len` must be non-zero and representable as a positive `int`.
pub fn write_literal_token<W: Write + ?Sized>(writer: &mut W, len: usize) -> io::Result<()> {
    let value = i32::try_from(len).ok().filter(|v| *v > 0).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("literal run of {len} bytes does not fit a token"),
        )
    })?;
    write_int(writer, value)
}

/// Writes a block-match token for the given zero-based block index.
pub fn write_match_token<W: Write + ?Sized>(writer: &mut W, index: u32) -> io::Result<()> {
    let value = -(i64::from(index) + 1);
    write_int(writer, value as i32)
}

/// Writes the end-of-file token.
pub fn write_done_token<W: Write + ?Sized>(writer: &mut W) -> io::Result<()> {
    write_int(writer, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn int_round_trips_little_endian() {
        let mut buf = Vec::new();
        write_int(&mut buf, 0x0a0b_0c0d).unwrap();
        assert_eq!(buf, [0x0d, 0x0c, 0x0b, 0x0a]);
        assert_eq!(read_int(&mut Cursor::new(&buf)).unwrap(), 0x0a0b_0c0d);
    }

    #[test]
    fn small_long_uses_int_form() {
        let mut buf = Vec::new();
        write_long(&mut buf, 1234).unwrap();
        assert_eq!(buf.len(), 4);
        assert_eq!(read_long(&mut Cursor::new(&buf)).unwrap(), 1234);
    }

    #[test]
    fn large_long_uses_escape_marker() {
        let value = i64::from(i32::MAX) + 10;
        let mut buf = Vec::new();
        write_long(&mut buf, value).unwrap();
        assert_eq!(buf.len(), 12);
        assert_eq!(&buf[..4], &[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(read_long(&mut Cursor::new(&buf)).unwrap(), value);
    }

    #[test]
    fn long_boundary_values_round_trip() {
        for value in [0, 1, 0x7fff_fffe, 0x7fff_ffff, 0x8000_0000, i64::MAX] {
            let mut buf = Vec::new();
            write_long(&mut buf, value).unwrap();
            assert_eq!(read_long(&mut Cursor::new(&buf)).unwrap(), value, "{value}");
        }
    }

    #[test]
    fn negative_size_is_a_protocol_error() {
        let mut buf = Vec::new();
        write_int(&mut buf, -5).unwrap();
        let err = read_size(&mut Cursor::new(&buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn line_round_trips_without_newline() {
        let mut buf = Vec::new();
        write_line(&mut buf, "hello peer").unwrap();
        assert_eq!(read_line(&mut Cursor::new(&buf)).unwrap(), "hello peer");
    }

    #[test]
    fn line_without_terminator_is_unexpected_eof() {
        let err = read_line(&mut Cursor::new(b"partial")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn tokens_round_trip() {
        let mut buf = Vec::new();
        write_literal_token(&mut buf, 42).unwrap();
        write_match_token(&mut buf, 0).unwrap();
        write_match_token(&mut buf, 7).unwrap();
        write_done_token(&mut buf).unwrap();

        let mut cursor = Cursor::new(&buf);
        assert_eq!(read_token(&mut cursor).unwrap(), Token::Literal(42));
        assert_eq!(read_token(&mut cursor).unwrap(), Token::Match(0));
        assert_eq!(read_token(&mut cursor).unwrap(), Token::Match(7));
        assert_eq!(read_token(&mut cursor).unwrap(), Token::Done);
    }

    #[test]
    fn match_token_is_negative_on_the_wire() {
        let mut buf = Vec::new();
        write_match_token(&mut buf, 3).unwrap();
        assert_eq!(read_int(&mut Cursor::new(&buf)).unwrap(), -4);
    }

    #[test]
    fn oversized_literal_token_is_rejected() {
        let mut buf = Vec::new();
        let err = write_literal_token(&mut buf, usize::MAX).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
