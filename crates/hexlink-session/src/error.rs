use std::time::Duration;

use hexlink_frame::{EncodeError, FrameError, MsgId};
use hexlink_transport::TransportError;

/// Errors that can occur in session operations.
///
/// Most of these never escape as `Err`: the workers turn them into failed
/// response events. They are returned directly only by the [`Session`](crate::Session)
/// handle itself.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Opening or using the link failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Writing a frame failed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The command could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// The session configuration cannot work.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The command needs a connected link.
    #[error("not connected")]
    NotConnected,

    /// CONNECT was requested before PORTSELECT.
    #[error("no port selected")]
    NoPortSelected,

    /// QUIT is in progress; no further commands are accepted.
    #[error("shutdown in progress")]
    ShutdownInProgress,

    /// The requested sequence number is still awaiting acknowledgment.
    #[error("sequence {0} is already pending")]
    DuplicateSequence(u32),

    /// No ACK/NAK arrived before the deadline.
    #[error("no acknowledgment within {0:?}")]
    Timeout(Duration),

    /// The device answered with NAK.
    #[error("device rejected {0}")]
    Rejected(MsgId),

    /// The link went away while the request was pending.
    #[error("link lost: {0}")]
    LinkLost(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session workers are gone.
    #[error("session channel closed")]
    ChannelClosed,

    /// The raw log file could not be opened.
    #[error("raw log error: {0}")]
    RawLog(std::io::Error),

    /// A worker thread could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
