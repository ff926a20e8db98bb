use std::time::Duration;

use hexlink_frame::{FrameConfig, Target, MAX_PACKET_SIZE, PACKET_OVERHEAD};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Session tuning knobs.
///
/// Deserializes from partial JSON; missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Deadline for the ACK/NAK of an ordinary command.
    #[serde(rename = "ack_timeout_ms", with = "millis")]
    pub ack_timeout: Duration,
    /// Deadline for the ACK/NAK of QUIT before shutting down anyway.
    #[serde(rename = "quit_timeout_ms", with = "millis")]
    pub quit_timeout: Duration,
    /// Read timeout of the listener and wake-up period of the sender.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    /// Bound of the sender inbox.
    pub inbox_capacity: usize,
    /// Bound of the raw-byte queue.
    pub raw_capacity: usize,
    /// Largest frame accepted in either direction.
    pub max_packet_size: usize,
    /// `to_id` stamped on every outbound command.
    pub target: Target,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(2),
            quit_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(20),
            inbox_capacity: 64,
            raw_capacity: 256,
            max_packet_size: MAX_PACKET_SIZE,
            target: Target::PRIMARY,
        }
    }
}

impl SessionConfig {
    /// Reject settings under which no frame could ever be sent.
    pub fn validate(&self) -> Result<()> {
        if self.max_packet_size < PACKET_OVERHEAD {
            return Err(SessionError::InvalidConfig(format!(
                "max_packet_size {} is below the {PACKET_OVERHEAD}-byte frame overhead",
                self.max_packet_size
            )));
        }
        Ok(())
    }

    /// Frame settings for the writer half of a link.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_packet_size: self.max_packet_size,
            read_timeout: Some(self.poll_interval),
            write_timeout: Some(self.ack_timeout),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
