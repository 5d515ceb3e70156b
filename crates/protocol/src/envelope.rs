//! The multiplex envelope: a 4-byte tag overlaying the byte stream.
//!
//! Once multiplexing is active, the stream becomes a sequence of frames.
//! Each frame starts with a little-endian 32-bit tag whose top byte is
//! [`MPLEX_BASE`] plus a [`MessageCode`] and whose low 24 bits carry the
//! payload length. Channel 7 (code [`MessageCode::Data`]) is transfer
//! payload; the higher channels carry log lines of increasing severity.

use logging::Severity;
use thiserror::Error;

/// Offset added to a [`MessageCode`] to form the tag's channel byte.
pub const MPLEX_BASE: u8 = 7;

/// Size in bytes of an encoded frame header.
pub const HEADER_LEN: usize = 4;

/// Largest payload a single frame can carry (24-bit length field).
pub const MAX_PAYLOAD_LENGTH: u32 = 0x00ff_ffff;

/// Envelope decoding and construction failures.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum EnvelopeError {
    /// The tag's channel byte is below [`MPLEX_BASE`].
    #[error("multiplex tag channel {0} is below the channel base")]
    InvalidTag(u8),
    /// The channel byte does not map to a known message code.
    #[error("unknown multiplex message code {0}")]
    UnknownMessageCode(u8),
    /// The payload length exceeds the 24-bit length field.
    #[error("multiplexed payload length {0} exceeds maximum {MAX_PAYLOAD_LENGTH}")]
    PayloadTooLarge(u64),
}

/// Logical channel of a multiplexed frame.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MessageCode {
    /// Transfer payload.
    Data,
    /// Non-fatal error during a transfer; the affected file is skipped.
    ErrorXfer,
    /// Informational log line.
    Info,
    /// Fatal error log line.
    Error,
    /// Warning log line.
    Warning,
}

impl MessageCode {
    /// All known codes, in channel order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Data,
            Self::ErrorXfer,
            Self::Info,
            Self::Error,
            Self::Warning,
        ]
    }

    /// Code value before the [`MPLEX_BASE`] offset is applied.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Data => 0,
            Self::ErrorXfer => 1,
            Self::Info => 2,
            Self::Error => 3,
            Self::Warning => 4,
        }
    }

    /// Decodes a code value (without the channel offset).
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Data),
            1 => Some(Self::ErrorXfer),
            2 => Some(Self::Info),
            3 => Some(Self::Error),
            4 => Some(Self::Warning),
            _ => None,
        }
    }

    /// Severity used when replaying this channel through the local logger.
    ///
    /// [`MessageCode::Data`] has no severity; payload is never logged.
    #[must_use]
    pub const fn severity(self) -> Option<Severity> {
        match self {
            Self::Data => None,
            Self::Info => Some(Severity::Info),
            Self::Warning => Some(Severity::Warning),
            Self::ErrorXfer | Self::Error => Some(Severity::Error),
        }
    }
}

impl From<MessageCode> for u8 {
    fn from(code: MessageCode) -> Self {
        code.as_u8()
    }
}

/// Decoded frame header: message code plus payload length.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MessageHeader {
    code: MessageCode,
    payload_len: u32,
}

impl MessageHeader {
    /// Builds a header, validating the payload length.
    pub const fn new(code: MessageCode, payload_len: u32) -> Result<Self, EnvelopeError> {
        if payload_len > MAX_PAYLOAD_LENGTH {
            return Err(EnvelopeError::PayloadTooLarge(payload_len as u64));
        }
        Ok(Self { code, payload_len })
    }

    /// The frame's message code.
    #[must_use]
    pub const fn code(self) -> MessageCode {
        self.code
    }

    /// The frame's payload length in bytes.
    #[must_use]
    pub const fn payload_len(self) -> u32 {
        self.payload_len
    }

    /// Encodes the header into its 4-byte wire form.
    #[must_use]
    pub const fn encode(self) -> [u8; HEADER_LEN] {
        self.encode_raw().to_le_bytes()
    }

    /// Encodes the header as the raw 32-bit tag value.
    #[must_use]
    pub const fn encode_raw(self) -> u32 {
        ((MPLEX_BASE as u32 + self.code.as_u8() as u32) << 24) | self.payload_len
    }

    /// Decodes a header from its 4-byte wire form.
    pub const fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self, EnvelopeError> {
        Self::from_raw(u32::from_le_bytes(*bytes))
    }

    /// Decodes a header from the raw 32-bit tag value.
    pub const fn from_raw(raw: u32) -> Result<Self, EnvelopeError> {
        let channel = (raw >> 24) as u8;
        if channel < MPLEX_BASE {
            return Err(EnvelopeError::InvalidTag(channel));
        }
        let Some(code) = MessageCode::from_u8(channel - MPLEX_BASE) else {
            return Err(EnvelopeError::UnknownMessageCode(channel - MPLEX_BASE));
        };
        Ok(Self {
            code,
            payload_len: raw & MAX_PAYLOAD_LENGTH,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_for_every_code() {
        for &code in MessageCode::all() {
            let header = MessageHeader::new(code, 123).expect("constructible header");
            let decoded = MessageHeader::decode(&header.encode()).expect("decode succeeds");
            assert_eq!(decoded, header);
        }
    }

    #[test]
    fn data_channel_is_seven_on_the_wire() {
        let header = MessageHeader::new(MessageCode::Data, 5).unwrap();
        let encoded = header.encode();
        assert_eq!(encoded, [5, 0, 0, 7]);
    }

    #[test]
    fn payload_length_occupies_low_24_bits() {
        let header = MessageHeader::new(MessageCode::Info, 0x00ab_cdef).unwrap();
        assert_eq!(header.encode_raw() & 0x00ff_ffff, 0x00ab_cdef);
        assert_eq!(header.encode_raw() >> 24, u32::from(MPLEX_BASE) + 2);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let err = MessageHeader::new(MessageCode::Data, MAX_PAYLOAD_LENGTH + 1).unwrap_err();
        assert_eq!(
            err,
            EnvelopeError::PayloadTooLarge(u64::from(MAX_PAYLOAD_LENGTH) + 1)
        );
    }

    #[test]
    fn tag_below_channel_base_is_invalid() {
        let err = MessageHeader::from_raw(0x0000_0001).unwrap_err();
        assert_eq!(err, EnvelopeError::InvalidTag(0));
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let raw = ((u32::from(MPLEX_BASE) + 0x40) << 24) | 0xff;
        let err = MessageHeader::from_raw(raw).unwrap_err();
        assert_eq!(err, EnvelopeError::UnknownMessageCode(0x40));
    }

    #[test]
    fn code_values_round_trip() {
        for &code in MessageCode::all() {
            assert_eq!(MessageCode::from_u8(code.as_u8()), Some(code));
        }
        assert_eq!(MessageCode::from_u8(0xff), None);
    }

    #[test]
    fn log_channels_map_to_severities() {
        use logging::Severity;

        assert_eq!(MessageCode::Data.severity(), None);
        assert_eq!(MessageCode::Info.severity(), Some(Severity::Info));
        assert_eq!(MessageCode::Warning.severity(), Some(Severity::Warning));
        assert_eq!(MessageCode::Error.severity(), Some(Severity::Error));
        assert_eq!(MessageCode::ErrorXfer.severity(), Some(Severity::Error));
    }
}
