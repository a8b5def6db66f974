//! Message shape and wire header.
//!
//! Every message on the wire starts with a fixed-size header whose first
//! four bytes are a big-endian `u32` holding the total message length
//! (header + payload). The framing layer only ever looks at that field.
//!
//! The benchmark's own header is 16 bytes:
//!
//! ```text
//! +--------+-------+----------+----------+
//! | length | flags | reserved | sequence |
//! |  u32   |  u16  |   u16    |   u64    |
//! +--------+-------+----------+----------+
//! ```

use thiserror::Error;

/// Size of the length field at the start of every header.
pub const LENGTH_FIELD_LEN: usize = 4;

/// Message limits, fixed once at startup and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageShape {
    header_size: usize,
    max_payload_size: usize,
    max_sequence_number: u64,
}

/// Errors building a [`MessageShape`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("header size {0} cannot hold the {LENGTH_FIELD_LEN}-byte length field")]
    HeaderTooSmall(usize),
    #[error("header size {header_size} + max payload {max_payload_size} overflows the length field")]
    TooLarge {
        header_size: usize,
        max_payload_size: usize,
    },
    #[error("max sequence number must be non-zero")]
    ZeroSequenceBound,
}

impl MessageShape {
    /// Build a shape, validating that the length field can describe every
    /// message it allows.
    pub fn new(
        header_size: usize,
        max_payload_size: usize,
        max_sequence_number: u64,
    ) -> Result<Self, ShapeError> {
        if header_size < LENGTH_FIELD_LEN {
            return Err(ShapeError::HeaderTooSmall(header_size));
        }
        match header_size.checked_add(max_payload_size) {
            Some(total) if total <= u32::MAX as usize => {}
            _ => {
                return Err(ShapeError::TooLarge {
                    header_size,
                    max_payload_size,
                })
            }
        }
        if max_sequence_number == 0 {
            return Err(ShapeError::ZeroSequenceBound);
        }
        Ok(Self {
            header_size,
            max_payload_size,
            max_sequence_number,
        })
    }

    /// Shape using the benchmark's 16-byte [`MessageHeader`].
    pub fn with_default_header(
        max_payload_size: usize,
        max_sequence_number: u64,
    ) -> Result<Self, ShapeError> {
        Self::new(MessageHeader::SIZE, max_payload_size, max_sequence_number)
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    pub fn max_sequence_number(&self) -> u64 {
        self.max_sequence_number
    }

    /// Largest message (header + payload) this shape admits.
    pub fn max_message_size(&self) -> usize {
        self.header_size + self.max_payload_size
    }

    /// Whether `seq` lies within the configured bound.
    pub fn check_sequence(&self, seq: u64) -> bool {
        seq <= self.max_sequence_number
    }
}

/// Read the total message length from the start of a header.
///
/// Returns `None` if fewer than [`LENGTH_FIELD_LEN`] bytes are available.
pub fn declared_length(header: &[u8]) -> Option<usize> {
    let field: [u8; LENGTH_FIELD_LEN] = header.get(..LENGTH_FIELD_LEN)?.try_into().ok()?;
    Some(u32::from_be_bytes(field) as usize)
}

/// Header flag bits.
pub mod flags {
    /// Message originates from the client side.
    pub const CLIENT: u16 = 0x0001;
    /// Receiver must echo this message back.
    pub const PONG_REQUEST: u16 = 0x0002;
    /// Warmup traffic, excluded from statistics.
    pub const WARMUP: u16 = 0x0004;
}

/// Errors decoding a [`MessageHeader`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("header needs {needed} bytes, got {got}")]
    Short { needed: usize, got: usize },
    #[error("sequence number {seq} exceeds bound {max}")]
    SequenceOutOfRange { seq: u64, max: u64 },
}

/// The benchmark's message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Total message length, header included.
    pub length: u32,
    pub flags: u16,
    pub sequence: u64,
}

impl MessageHeader {
    pub const SIZE: usize = 16;

    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(Self::SIZE)
    }

    /// Encode into the first [`Self::SIZE`] bytes of `out`.
    ///
    /// # Panics
    /// Panics if `out` is shorter than [`Self::SIZE`].
    pub fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.length.to_be_bytes());
        out[4..6].copy_from_slice(&self.flags.to_be_bytes());
        out[6..8].copy_from_slice(&0u16.to_be_bytes());
        out[8..16].copy_from_slice(&self.sequence.to_be_bytes());
    }

    /// Decode a header, checking the sequence number against `shape`.
    pub fn decode(input: &[u8], shape: &MessageShape) -> Result<Self, HeaderError> {
        if input.len() < Self::SIZE {
            return Err(HeaderError::Short {
                needed: Self::SIZE,
                got: input.len(),
            });
        }
        let length = u32::from_be_bytes([input[0], input[1], input[2], input[3]]);
        let flags = u16::from_be_bytes([input[4], input[5]]);
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&input[8..16]);
        let sequence = u64::from_be_bytes(seq);

        if !shape.check_sequence(sequence) {
            return Err(HeaderError::SequenceOutOfRange {
                seq: sequence,
                max: shape.max_sequence_number(),
            });
        }

        Ok(Self {
            length,
            flags,
            sequence,
        })
    }
}

/// Build a complete message: header followed by `payload_len` pattern bytes.
///
/// Payload bytes are `sequence + i` truncated to a byte, so a receiver can
/// spot corruption without storing what it sent.
pub fn build_message(flags: u16, sequence: u64, payload_len: usize) -> Vec<u8> {
    let total = MessageHeader::SIZE + payload_len;
    let mut buf = vec![0u8; total];
    MessageHeader {
        length: total as u32,
        flags,
        sequence,
    }
    .encode(&mut buf);
    for (i, byte) in buf[MessageHeader::SIZE..].iter_mut().enumerate() {
        *byte = sequence.wrapping_add(i as u64) as u8;
    }
    buf
}

/// Hands out sequence numbers in `1..=max`, wrapping back to 1.
#[derive(Debug)]
pub struct SequenceCounter {
    next: u64,
    max: u64,
}

impl SequenceCounter {
    pub fn new(shape: &MessageShape) -> Self {
        Self {
            next: 1,
            max: shape.max_sequence_number(),
        }
    }

    pub fn next_sequence(&mut self) -> u64 {
        let seq = self.next;
        self.next = if seq >= self.max { 1 } else { seq + 1 };
        seq
    }
}
