//! Stateful multiplexing adapters over plain byte streams.
//!
//! The handshake happens on the bare stream; once the seed is exchanged the
//! sender activates framing on its writer and the receiver on its reader.
//! [`MuxWriter`] buffers payload and emits it as channel-7 frames, with log
//! frames injected between them. [`DemuxReader`] makes framing invisible to
//! callers: payload frames are surfaced as ordinary reads while log frames
//! are replayed through the session logger as they are encountered, which
//! keeps the out-of-band channel drained without a second reader.
//!
//! Both adapters count the raw bytes they move, including frame headers and
//! log traffic; the session reports these counts in the end-of-transfer
//! statistics.

use std::io::{self, Read, Write};

use logging::Logger;

use crate::envelope::{HEADER_LEN, MAX_PAYLOAD_LENGTH, MessageCode, MessageHeader};

/// Buffered payload size that triggers a frame flush on its own.
const FLUSH_THRESHOLD: usize = 4096;

/// Writer side of the multiplexed stream.
///
/// Starts inactive (bytes pass straight through, as during the handshake);
/// [`activate`](Self::activate) switches to framed output. Frame boundaries
/// carry no meaning: any buffered run of payload may be split or coalesced.
#[derive(Debug)]
pub struct MuxWriter<W> {
    inner: W,
    buf: Vec<u8>,
    active: bool,
    bytes_written: u64,
}

impl<W: Write> MuxWriter<W> {
    /// Wraps a plain writer; multiplexing is off until activated.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(FLUSH_THRESHOLD),
            active: false,
            bytes_written: 0,
        }
    }

    /// Switches subsequent writes to framed output.
    pub fn activate(&mut self) {
        self.active = true;
    }

    /// Reports whether framing is active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Total bytes pushed to the underlying stream, headers included.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Returns a reference to the underlying writer.
    #[must_use]
    pub const fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consumes the adapter and returns the underlying writer.
    ///
    /// Callers flush first; buffered payload that was never flushed is
    /// dropped.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Sends a log line to the peer on the given channel.
    ///
    /// Pending payload is flushed first so the line cannot overtake data
    /// written before it.
    pub fn write_message(&mut self, code: MessageCode, text: &str) -> io::Result<()> {
        self.flush_payload()?;
        let mut line = text.as_bytes().to_vec();
        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }
        self.write_frame(code, &line)
    }

    fn write_frame(&mut self, code: MessageCode, payload: &[u8]) -> io::Result<()> {
        let len = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len <= MAX_PAYLOAD_LENGTH)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "multiplexed payload length {} exceeds maximum {MAX_PAYLOAD_LENGTH}",
                        payload.len()
                    ),
                )
            })?;
        let header = MessageHeader::new(code, len)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        self.inner.write_all(&header.encode())?;
        self.inner.write_all(payload)?;
        self.bytes_written += HEADER_LEN as u64 + u64::from(len);
        Ok(())
    }

    fn flush_payload(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.buf);
        for chunk in pending.chunks(MAX_PAYLOAD_LENGTH as usize) {
            self.write_frame(MessageCode::Data, chunk)?;
        }
        self.buf = pending;
        self.buf.clear();
        Ok(())
    }
}

impl<W: Write> Write for MuxWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if !self.active {
            let written = self.inner.write(data)?;
            self.bytes_written += written as u64;
            return Ok(written);
        }
        self.buf.extend_from_slice(data);
        if self.buf.len() >= FLUSH_THRESHOLD {
            self.flush_payload()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.active {
            self.flush_payload()?;
        }
        self.inner.flush()
    }
}

/// Reader side of the multiplexed stream.
///
/// Payload frames are surfaced as ordinary reads; log frames are consumed in
/// place and replayed through the logger, so callers never observe them.
#[derive(Debug)]
pub struct DemuxReader<R> {
    inner: R,
    remain: u32,
    active: bool,
    logger: Logger,
    bytes_read: u64,
}

impl<R: Read> DemuxReader<R> {
    /// Wraps a plain reader; demultiplexing is off until activated.
    pub fn new(inner: R, logger: Logger) -> Self {
        Self {
            inner,
            remain: 0,
            active: false,
            logger,
            bytes_read: 0,
        }
    }

    /// Switches subsequent reads to framed input.
    pub fn activate(&mut self) {
        self.active = true;
    }

    /// Reports whether framing is active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Total bytes pulled from the underlying stream, headers included.
    #[must_use]
    pub const fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Consumes the adapter and returns the underlying reader.
    #[must_use]
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads frame headers (replaying any log frames) until payload bytes
    /// are available.
    fn refill(&mut self) -> io::Result<()> {
        while self.remain == 0 {
            let mut raw = [0u8; HEADER_LEN];
            self.inner.read_exact(&mut raw)?;
            self.bytes_read += HEADER_LEN as u64;

            let header = MessageHeader::decode(&raw)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            match header.code() {
                MessageCode::Data => self.remain = header.payload_len(),
                code => self.replay_log_frame(code, header.payload_len())?,
            }
        }
        Ok(())
    }

    fn replay_log_frame(&mut self, code: MessageCode, len: u32) -> io::Result<()> {
        let mut payload = vec![0u8; len as usize];
        self.inner.read_exact(&mut payload)?;
        self.bytes_read += u64::from(len);

        let Some(severity) = code.severity() else {
            return Ok(());
        };
        let text = String::from_utf8_lossy(&payload);
        let mut start = 0;
        for end in memchr::memchr_iter(b'\n', text.as_bytes()) {
            self.logger.remote(severity, &text[start..end]);
            start = end + 1;
        }
        if start < text.len() {
            self.logger.remote(severity, &text[start..]);
        }
        Ok(())
    }
}

impl<R: Read> Read for DemuxReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.active {
            let read = self.inner.read(buf)?;
            self.bytes_read += read as u64;
            return Ok(read);
        }

        self.refill()?;
        let want = buf.len().min(self.remain as usize);
        let read = self.inner.read(&mut buf[..want])?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended inside a multiplexed payload frame",
            ));
        }
        self.remain -= read as u32;
        self.bytes_read += read as u64;
        Ok(read)
    }
}
