//! Echo datagram format.
//!
//! ```text
//! SEQ=00000042,T=123456\0AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA
//! └──── ASCII header ──┘  └──────── filler up to packet_size ───────┘
//! ```
//!
//! The sequence number is zero-padded to eight digits, the timestamp is the
//! sender's monotonic uptime in milliseconds.  The filler byte is
//! `'A' + seq % 26`, so consecutive datagrams are visually distinct in a
//! capture.  The header never takes the last byte of the datagram: when the
//! packet is too small the header is cut short and a NUL is written there.
//!
//! The server echoes the exact bytes back; only the client decodes them, to
//! match a reply to the request it sent.

use thiserror::Error;

/// Literal that starts every echo datagram.
pub const HEADER_PREFIX: &[u8] = b"SEQ=";

/// Number of decimal digits in the sequence field.
const SEQ_DIGITS: usize = 8;

/// Smallest packet size that fits the prefix, the full sequence field, the
/// timestamp separator, a realistic timestamp, and the terminator.
pub const MIN_PACKET_SIZE: usize = 32;

/// Errors raised while decoding an echo reply.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The datagram does not start with `SEQ=`.
    #[error("missing SEQ= prefix")]
    MissingPrefix,

    /// Shorter than the prefix plus the sequence field.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The sequence field is not eight decimal digits.
    #[error("malformed sequence field")]
    MalformedSequence,
}

/// The decoded header of an echo datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoHeader {
    pub seq: u32,
    /// Sender uptime in ms, absent when the header may have been truncated.
    pub timestamp_ms: Option<i64>,
}

impl EchoHeader {
    pub fn new(seq: u32, timestamp_ms: i64) -> Self {
        Self {
            seq,
            timestamp_ms: Some(timestamp_ms),
        }
    }

    /// Filler byte for this sequence number.
    pub fn filler(seq: u32) -> u8 {
        b'A' + (seq % 26) as u8
    }

    /// Builds a datagram of exactly `packet_size` bytes.
    pub fn encode(&self, packet_size: usize) -> Vec<u8> {
        let mut buf = vec![Self::filler(self.seq); packet_size];
        if packet_size == 0 {
            return buf;
        }

        let header = format!(
            "SEQ={:08},T={}",
            self.seq,
            self.timestamp_ms.unwrap_or_default()
        );
        let len = header.len().min(packet_size - 1);
        buf[..len].copy_from_slice(&header.as_bytes()[..len]);
        buf[len] = 0;
        buf
    }

    /// Parses the header at the start of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the prefix or the sequence field is
    /// missing or malformed.  A missing or partial timestamp is not an error.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let needed = HEADER_PREFIX.len() + SEQ_DIGITS;
        if data.len() < needed {
            if !HEADER_PREFIX.starts_with(&data[..data.len().min(HEADER_PREFIX.len())]) {
                return Err(ProtocolError::MissingPrefix);
            }
            return Err(ProtocolError::InsufficientData {
                needed,
                available: data.len(),
            });
        }
        if !data.starts_with(HEADER_PREFIX) {
            return Err(ProtocolError::MissingPrefix);
        }

        let seq_field = &data[HEADER_PREFIX.len()..needed];
        if !seq_field.iter().all(u8::is_ascii_digit) {
            return Err(ProtocolError::MalformedSequence);
        }
        let seq = std::str::from_utf8(seq_field)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or(ProtocolError::MalformedSequence)?;

        let timestamp_ms = data[needed..]
            .strip_prefix(b",T=")
            .and_then(|rest| {
                let end = rest.iter().position(|b| !b.is_ascii_digit()).unwrap_or(rest.len());
                // A terminator in the last byte means the header may have been cut.
                if end == 0 || end + 1 >= rest.len() {
                    return None;
                }
                std::str::from_utf8(&rest[..end]).ok()?.parse::<i64>().ok()
            });

        Ok(Self { seq, timestamp_ms })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
