use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, EncodeError};
use crate::msg_id::MsgId;
use crate::payload::{decode_payload, Message};

/// Start-of-frame marker.
pub const START_MARKER: u8 = 0x01;

/// Marker (1) + length (4) + sequence (4) + from (1) + to (1) + msg_id (1).
pub const HEADER_SIZE: usize = 12;

/// Trailing CRC32.
pub const CRC_SIZE: usize = 4;

/// Header plus CRC; the smallest legal frame.
pub const PACKET_OVERHEAD: usize = HEADER_SIZE + CRC_SIZE;

/// Largest payload the protocol allows: 16 MiB.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Largest legal value of the length field.
pub const MAX_PACKET_SIZE: usize = MAX_PAYLOAD_SIZE + PACKET_OVERHEAD;

/// `from_id` used by the host.
pub const HOST_ID: u8 = 0xFF;

/// Destination of a frame (`to_id`).
///
/// Bit 7 addresses the primary board as a whole; the low seven bits select an
/// axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Target(u8);

impl Target {
    /// Broadcast to the primary board. Host default.
    pub const PRIMARY: Target = Target(0x80);

    /// Address a single axis.
    pub const fn axis(index: u8) -> Self {
        Target(index & 0x7F)
    }

    pub const fn from_raw(byte: u8) -> Self {
        Target(byte)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn is_broadcast(self) -> bool {
        self.0 & 0x80 != 0
    }

    pub const fn axis_index(self) -> u8 {
        self.0 & 0x7F
    }
}

impl Default for Target {
    fn default() -> Self {
        Target::PRIMARY
    }
}

/// Parsed fixed header of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FrameHeader {
    /// Total frame size, header and CRC included.
    pub length: u32,
    pub sequence: u32,
    pub from_id: u8,
    pub to_id: u8,
    pub msg_id: MsgId,
    /// The byte as it appeared on the wire; differs from `msg_id` only for `Unknown`.
    pub raw_msg_id: u8,
}

impl FrameHeader {
    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(PACKET_OVERHEAD)
    }

    pub fn target(&self) -> Target {
        Target::from_raw(self.to_id)
    }
}

/// A validated frame whose payload has not been interpreted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        PACKET_OVERHEAD + self.payload.len()
    }

    /// Run the payload decoder for this frame's message id.
    pub fn into_message(self) -> Result<Message, DecodeError> {
        let payload = decode_payload(self.header.msg_id, &self.payload)?;
        Ok(Message {
            header: self.header,
            payload,
        })
    }
}

/// A frame ready to be encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundFrame {
    pub sequence: u32,
    pub from_id: u8,
    pub target: Target,
    pub msg_id: MsgId,
    pub payload: Bytes,
}

impl OutboundFrame {
    /// A host frame to the primary target.
    pub fn new(sequence: u32, msg_id: MsgId, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            from_id: HOST_ID,
            target: Target::PRIMARY,
            msg_id,
            payload: payload.into(),
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_from(mut self, from_id: u8) -> Self {
        self.from_id = from_id;
        self
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    /// Size of the encoded frame.
    pub fn wire_size(&self) -> usize {
        PACKET_OVERHEAD + self.payload.len()
    }

    /// Append the encoded frame to `dst`, refusing frames above `max_packet_size`.
    pub fn encode_into(&self, dst: &mut BytesMut, max_packet_size: usize) -> Result<(), EncodeError> {
        let total = self.wire_size();
        let ceiling = max_packet_size.min(MAX_PACKET_SIZE);
        if total > ceiling {
            return Err(EncodeError::PayloadTooLarge {
                size: self.payload.len(),
                max: ceiling.saturating_sub(PACKET_OVERHEAD),
            });
        }

        let start = dst.len();
        dst.reserve(total);
        dst.put_u8(START_MARKER);
        dst.put_u32_le(total as u32);
        dst.put_u32_le(self.sequence);
        dst.put_u8(self.from_id);
        dst.put_u8(self.target.raw());
        dst.put_u8(self.msg_id.as_u8());
        dst.put_slice(&self.payload);
        let crc = crc32fast::hash(&dst[start..]);
        dst.put_u32_le(crc);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        self.encode_into(&mut dst, MAX_PACKET_SIZE)?;
        Ok(dst.freeze())
    }
}

/// Encode a host frame to the primary target.
///
/// Wire format:
/// ```text
/// ┌──────┬──────────┬──────────┬──────┬──────┬────────┬───────────┬──────────┐
/// │ 0x01 │ length   │ sequence │ from │ to   │ msg_id │ payload   │ crc32    │
/// │ (1B) │ (4B LE)  │ (4B LE)  │ (1B) │ (1B) │ (1B)   │ (N bytes) │ (4B LE)  │
/// └──────┴──────────┴──────────┴──────┴──────┴────────┴───────────┴──────────┘
/// ```
/// `length` counts the whole frame. The CRC covers everything before it.
pub fn encode_packet(sequence: u32, msg_id: MsgId, payload: &[u8]) -> Result<Bytes, EncodeError> {
    OutboundFrame::new(sequence, msg_id, Bytes::copy_from_slice(payload)).encode()
}

/// Parse the fixed header at the start of `buf` and bounds-check its length.
///
/// `buf` must hold at least [`HEADER_SIZE`] bytes.
pub fn parse_header(buf: &[u8], max_packet_size: usize) -> Result<FrameHeader, DecodeError> {
    if buf.len() < HEADER_SIZE {
        return Err(DecodeError::MalformedHeader(format!(
            "need {HEADER_SIZE} header bytes, have {}",
            buf.len()
        )));
    }
    if buf[0] != START_MARKER {
        return Err(DecodeError::MalformedHeader(format!(
            "bad start marker {:#04x}",
            buf[0]
        )));
    }

    let length = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
    let sequence = u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]);
    let ceiling = max_packet_size.min(MAX_PACKET_SIZE);
    if (length as usize) < PACKET_OVERHEAD || length as usize > ceiling {
        return Err(DecodeError::MalformedHeader(format!(
            "length {length} outside {PACKET_OVERHEAD}..={ceiling}"
        )));
    }

    Ok(FrameHeader {
        length,
        sequence,
        from_id: buf[9],
        to_id: buf[10],
        msg_id: MsgId::from_u8(buf[11]),
        raw_msg_id: buf[11],
    })
}

/// Validate a buffer holding exactly one frame.
pub fn decode_frame(buf: &[u8], max_packet_size: usize) -> Result<Frame, DecodeError> {
    let header = parse_header(buf, max_packet_size)?;
    if header.length as usize != buf.len() {
        return Err(DecodeError::MalformedHeader(format!(
            "length field {} does not match buffer size {}",
            header.length,
            buf.len()
        )));
    }

    let body_end = buf.len() - CRC_SIZE;
    let expected = u32::from_le_bytes([
        buf[body_end],
        buf[body_end + 1],
        buf[body_end + 2],
        buf[body_end + 3],
    ]);
    let computed = crc32fast::hash(&buf[..body_end]);
    if expected != computed {
        return Err(DecodeError::CrcMismatch { expected, computed });
    }

    Ok(Frame {
        header,
        payload: Bytes::copy_from_slice(&buf[HEADER_SIZE..body_end]),
    })
}

/// [`decode_frame`] with the protocol maximum.
pub fn decode(buf: &[u8]) -> Result<Frame, DecodeError> {
    decode_frame(buf, MAX_PACKET_SIZE)
}

/// Validate one frame and decode its payload.
pub fn decode_message(buf: &[u8]) -> Result<Message, DecodeError> {
    decode(buf)?.into_message()
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest accepted value of the length field. Default: [`MAX_PACKET_SIZE`].
    pub max_packet_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
