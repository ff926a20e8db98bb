//! Frames for the hexapod host/board protocol.
//!
//! Every frame on the link is:
//! - a `0x01` start marker
//! - a 4-byte little-endian total length
//! - a 4-byte little-endian sequence number
//! - sender, target and message-id bytes
//! - the payload
//! - a 4-byte little-endian zlib CRC32 over everything before it
//!
//! [`StreamParser`] recovers frames from an unaligned byte stream;
//! [`FrameReader`] and [`FrameWriter`] do the same over blocking I/O.

pub mod builder;
pub mod codec;
pub mod error;
pub mod feedback;
pub mod msg_id;
pub mod parser;
pub mod payload;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod tokio_codec;

pub use codec::{
    decode, decode_frame, decode_message, encode_packet, parse_header, Frame, FrameConfig,
    FrameHeader, OutboundFrame, Target, CRC_SIZE, HEADER_SIZE, HOST_ID, MAX_PACKET_SIZE,
    MAX_PAYLOAD_SIZE, PACKET_OVERHEAD, START_MARKER,
};
pub use error::{DecodeError, EncodeError, FrameError, Result};
pub use feedback::{ControlTelemetry, FeedbackRecord, MotorCommand, MotorResult, RawFeedback, FEEDBACK_SIZE};
pub use msg_id::MsgId;
pub use parser::{ParserState, ParserStats, StreamParser};
pub use payload::{decode_payload, Message, Payload, Pose, POSE_COMPONENTS, POSE_SIZE};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use tokio_codec::HexlinkCodec;
