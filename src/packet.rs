//! Wire-format definitions for transfer frames.
//!
//! Every datagram exchanged between peers is a [`Frame`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, type tag, payload).
//! - Serialising a [`Frame`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Frame`], rejecting anything
//!   malformed, truncated, or corrupted.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload Length                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                   Type Tag ("DATA" / "ACK " / "FIN ")         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Checksum            |         Payload ...           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 14 bytes.
//! seq(4) + payload_len(4) + type(4) + checksum(2)
//!
//! The checksum is the 16-bit additive sum of the bytes of
//! `type ‖ seq ‖ payload_len ‖ payload`.  It is an error-*detection* code for
//! line noise: every single-bit flip anywhere in the frame is caught, most
//! multi-bit patterns are too, none of it is security.

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 14;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_PAYLOAD_LEN: usize = 4;
const OFF_TYPE: usize = 8;
const OFF_CHECKSUM: usize = 12;

/// Kind of frame, carried on the wire as a 4-byte ASCII tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Carries one chunk of the transferred byte stream.
    Data,
    /// Cumulative acknowledgement of everything up to `seq`.
    Ack,
    /// End-of-transfer marker; consumes one sequence number.
    Fin,
}

impl FrameType {
    /// The 4-byte tag written to the wire.
    pub const fn tag(self) -> [u8; 4] {
        match self {
            FrameType::Data => *b"DATA",
            FrameType::Ack => *b"ACK ",
            FrameType::Fin => *b"FIN ",
        }
    }

    /// Map a wire tag back to a type.  Unknown tags yield `None`.
    pub fn from_tag(tag: [u8; 4]) -> Option<Self> {
        match &tag {
            b"DATA" => Some(FrameType::Data),
            b"ACK " => Some(FrameType::Ack),
            b"FIN " => Some(FrameType::Fin),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FrameType::Data => "DATA",
            FrameType::Ack => "ACK",
            FrameType::Fin => "FIN",
        };
        f.write_str(s)
    }
}

/// A complete transfer unit: header fields + payload bytes.
///
/// The checksum is not stored; [`Frame::encode`] computes it and
/// [`Frame::decode`] verifies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub seq: u32,
    pub kind: FrameType,
    pub payload: Vec<u8>,
}

impl Frame {
    /// A data frame carrying `payload`.
    pub fn data(seq: u32, payload: Vec<u8>) -> Self {
        Self {
            seq,
            kind: FrameType::Data,
            payload,
        }
    }

    /// A cumulative acknowledgement for `seq` (empty payload).
    pub fn ack(seq: u32) -> Self {
        Self {
            seq,
            kind: FrameType::Ack,
            payload: Vec::new(),
        }
    }

    /// An end-of-transfer marker occupying sequence number `seq`.
    pub fn fin(seq: u32) -> Self {
        Self {
            seq,
            kind: FrameType::Fin,
            payload: Vec::new(),
        }
    }

    /// Serialise this frame into a newly allocated byte vector.
    ///
    /// Infallible: payload length is bounded by the transfer configuration,
    /// which caps it well below `u32::MAX`.
    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(self.payload.len() <= u32::MAX as usize);
        let payload_len = self.payload.len() as u32;
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];

        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 4].copy_from_slice(&payload_len.to_be_bytes());
        buf[OFF_TYPE..OFF_TYPE + 4].copy_from_slice(&self.kind.tag());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        let csum = checksum(self.kind.tag(), self.seq, payload_len, &self.payload);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());

        buf
    }

    /// Parse a [`Frame`] from a raw byte slice.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`],
    /// - the `payload_len` field disagrees with `buf.len()`,
    /// - the type tag is unknown, or
    /// - the checksum does not verify.
    ///
    /// Never panics, whatever the input; a corrupted length field is just
    /// another way for a frame to be invalid.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort);
        }

        let seq = read_u32(buf, OFF_SEQ);
        let payload_len = read_u32(buf, OFF_PAYLOAD_LEN);
        let tag = [
            buf[OFF_TYPE],
            buf[OFF_TYPE + 1],
            buf[OFF_TYPE + 2],
            buf[OFF_TYPE + 3],
        ];
        let stored = u16::from_be_bytes([buf[OFF_CHECKSUM], buf[OFF_CHECKSUM + 1]]);

        if (buf.len() - HEADER_LEN) as u64 != u64::from(payload_len) {
            return Err(PacketError::LengthMismatch);
        }

        let payload = &buf[HEADER_LEN..];
        if checksum(tag, seq, payload_len, payload) != stored {
            return Err(PacketError::ChecksumFailed);
        }

        let kind = FrameType::from_tag(tag).ok_or(PacketError::UnknownType)?;

        Ok(Frame {
            seq,
            kind,
            payload: payload.to_vec(),
        })
    }
}

/// Reasons a raw datagram is not a valid [`Frame`].
///
/// All of them mean the same thing to the engines: nothing useful arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("buffer too short to contain a header")]
    BufferTooShort,
    #[error("payload_len field does not match remaining bytes")]
    LengthMismatch,
    #[error("unknown frame type tag")]
    UnknownType,
    #[error("checksum verification failed")]
    ChecksumFailed,
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// 16-bit additive checksum over `tag ‖ seq ‖ payload_len ‖ payload`.
///
/// Wrapping byte sum, identical on encode and decode.
pub fn checksum(tag: [u8; 4], seq: u32, payload_len: u32, payload: &[u8]) -> u16 {
    tag.iter()
        .chain(seq.to_be_bytes().iter())
        .chain(payload_len.to_be_bytes().iter())
        .chain(payload.iter())
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}
