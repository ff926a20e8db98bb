use std::fmt;

/// Message kinds carried in the `msg_id` header byte.
///
/// Bytes outside the table decode to [`MsgId::Unknown`]; the raw byte is kept
/// on the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum MsgId {
    Heartbeat,
    Enable,
    Play,
    Pause,
    Stop,
    Disable,
    Upload,
    Ack,
    Nak,
    Reset,
    Quit,
    Connect,
    Disconnect,
    Move,
    Feedback,
    Info,
    Unknown,
}

impl MsgId {
    pub const ALL: [MsgId; 17] = [
        MsgId::Heartbeat,
        MsgId::Enable,
        MsgId::Play,
        MsgId::Pause,
        MsgId::Stop,
        MsgId::Disable,
        MsgId::Upload,
        MsgId::Ack,
        MsgId::Nak,
        MsgId::Reset,
        MsgId::Quit,
        MsgId::Connect,
        MsgId::Disconnect,
        MsgId::Move,
        MsgId::Feedback,
        MsgId::Info,
        MsgId::Unknown,
    ];

    /// Wire value.
    pub const fn as_u8(self) -> u8 {
        match self {
            MsgId::Heartbeat => 0x01,
            MsgId::Enable => 0x02,
            MsgId::Play => 0x03,
            MsgId::Pause => 0x04,
            MsgId::Stop => 0x05,
            MsgId::Disable => 0x06,
            MsgId::Upload => 0x07,
            MsgId::Ack => 0x08,
            MsgId::Nak => 0x09,
            MsgId::Reset => 0x0A,
            MsgId::Quit => 0x0B,
            MsgId::Connect => 0x0C,
            MsgId::Disconnect => 0x0D,
            MsgId::Move => 0x0E,
            MsgId::Feedback => 0x0F,
            MsgId::Info => 0xFD,
            MsgId::Unknown => 0xFE,
        }
    }

    /// Look up a wire byte. Unlisted values map to `Unknown`.
    pub const fn from_u8(byte: u8) -> Self {
        match byte {
            0x01 => MsgId::Heartbeat,
            0x02 => MsgId::Enable,
            0x03 => MsgId::Play,
            0x04 => MsgId::Pause,
            0x05 => MsgId::Stop,
            0x06 => MsgId::Disable,
            0x07 => MsgId::Upload,
            0x08 => MsgId::Ack,
            0x09 => MsgId::Nak,
            0x0A => MsgId::Reset,
            0x0B => MsgId::Quit,
            0x0C => MsgId::Connect,
            0x0D => MsgId::Disconnect,
            0x0E => MsgId::Move,
            0x0F => MsgId::Feedback,
            0xFD => MsgId::Info,
            _ => MsgId::Unknown,
        }
    }

    /// Protocol name, as used in logs and session events.
    pub const fn name(self) -> &'static str {
        match self {
            MsgId::Heartbeat => "HEARTBEAT",
            MsgId::Enable => "ENABLE",
            MsgId::Play => "PLAY",
            MsgId::Pause => "PAUSE",
            MsgId::Stop => "STOP",
            MsgId::Disable => "DISABLE",
            MsgId::Upload => "UPLOAD",
            MsgId::Ack => "ACK",
            MsgId::Nak => "NAK",
            MsgId::Reset => "RESET",
            MsgId::Quit => "QUIT",
            MsgId::Connect => "CONNECT",
            MsgId::Disconnect => "DISCONNECT",
            MsgId::Move => "MOVE",
            MsgId::Feedback => "FEEDBACK",
            MsgId::Info => "INFO",
            MsgId::Unknown => "UNKNOWN",
        }
    }

    /// Look up a protocol name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(name))
    }

    /// Payload-less commands that only signal the board.
    pub const fn is_signal(self) -> bool {
        matches!(
            self,
            MsgId::Heartbeat
                | MsgId::Enable
                | MsgId::Play
                | MsgId::Pause
                | MsgId::Stop
                | MsgId::Disable
                | MsgId::Reset
                | MsgId::Quit
                | MsgId::Connect
                | MsgId::Disconnect
        )
    }
}

impl From<u8> for MsgId {
    fn from(byte: u8) -> Self {
        MsgId::from_u8(byte)
    }
}

impl From<MsgId> for u8 {
    fn from(id: MsgId) -> Self {
        id.as_u8()
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
