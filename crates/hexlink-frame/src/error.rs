use crate::msg_id::MsgId;

/// Errors raised while building a frame, before anything touches the link.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    /// The frame would exceed the configured maximum packet size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A pose row does not have exactly six components.
    #[error("pose {row} has {len} components, expected 6")]
    InvalidShape { row: usize, len: usize },
}

/// Errors raised while validating a candidate frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// The trailing CRC does not match the frame contents.
    #[error("crc mismatch (frame says {expected:#010x}, computed {computed:#010x})")]
    CrcMismatch { expected: u32, computed: u32 },

    /// Bad start marker, length field or buffer size.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The payload does not fit the layout its message id requires.
    #[error("malformed {msg_id} payload: {reason}")]
    MalformedPayload { msg_id: MsgId, reason: String },
}

/// Errors that can occur while reading or writing frames on a stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link was closed before a complete frame was received.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
