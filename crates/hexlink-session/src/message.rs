//! Command-channel requests and the events a session emits.
//!
//! Both travel as JSON objects: requests are tagged by `event`
//! (`{"event":"UPLOAD","sequence":7,"trajectory":[[...]]}`), events by `type`.

use std::fmt;

use hexlink_frame::{builder, EncodeError, FeedbackRecord, MsgId, OutboundFrame, Payload};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A symbolic command plus an optional caller-chosen sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(flatten)]
    pub command: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
}

impl Request {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            sequence: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Parse one JSON request.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }
}

impl From<Command> for Request {
    fn from(command: Command) -> Self {
        Request::new(command)
    }
}

/// Commands accepted on the command channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Choose the port CONNECT will open. Never sent on the wire.
    #[serde(rename = "PORTSELECT")]
    PortSelect { port: String },
    Connect,
    Disconnect,
    Enable,
    Upload { trajectory: Vec<Vec<f32>> },
    Move { pose: Vec<f32> },
    Heartbeat,
    Play,
    Pause,
    Stop,
    Disable,
    Reset,
    Quit,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::PortSelect { .. } => CommandKind::PortSelect,
            Command::Connect => CommandKind::Connect,
            Command::Disconnect => CommandKind::Disconnect,
            Command::Enable => CommandKind::Enable,
            Command::Upload { .. } => CommandKind::Upload,
            Command::Move { .. } => CommandKind::Move,
            Command::Heartbeat => CommandKind::Heartbeat,
            Command::Play => CommandKind::Play,
            Command::Pause => CommandKind::Pause,
            Command::Stop => CommandKind::Stop,
            Command::Disable => CommandKind::Disable,
            Command::Reset => CommandKind::Reset,
            Command::Quit => CommandKind::Quit,
        }
    }

    /// The frame this command puts on the wire, if any.
    pub fn frame(&self, sequence: u32) -> Option<std::result::Result<OutboundFrame, EncodeError>> {
        match self {
            Command::PortSelect { .. } => None,
            Command::Upload { trajectory } => Some(builder::upload(sequence, trajectory)),
            Command::Move { pose } => Some(builder::move_pose(sequence, pose)),
            other => other
                .kind()
                .msg_id()
                .map(|msg_id| Ok(builder::signal(sequence, msg_id))),
        }
    }
}

/// Command discriminant, used for pending bookkeeping and event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    PortSelect,
    Connect,
    Disconnect,
    Enable,
    Upload,
    Move,
    Heartbeat,
    Play,
    Pause,
    Stop,
    Disable,
    Reset,
    Quit,
}

impl CommandKind {
    /// Wire message id; `None` for host-only commands.
    pub const fn msg_id(self) -> Option<MsgId> {
        match self {
            CommandKind::PortSelect => None,
            CommandKind::Connect => Some(MsgId::Connect),
            CommandKind::Disconnect => Some(MsgId::Disconnect),
            CommandKind::Enable => Some(MsgId::Enable),
            CommandKind::Upload => Some(MsgId::Upload),
            CommandKind::Move => Some(MsgId::Move),
            CommandKind::Heartbeat => Some(MsgId::Heartbeat),
            CommandKind::Play => Some(MsgId::Play),
            CommandKind::Pause => Some(MsgId::Pause),
            CommandKind::Stop => Some(MsgId::Stop),
            CommandKind::Disable => Some(MsgId::Disable),
            CommandKind::Reset => Some(MsgId::Reset),
            CommandKind::Quit => Some(MsgId::Quit),
        }
    }

    /// Event name used on the command and response channels.
    pub const fn name(self) -> &'static str {
        match self.msg_id() {
            Some(msg_id) => msg_id.name(),
            None => "PORTSELECT",
        }
    }

    /// Commands whose acknowledgment (or its absence) closes the link.
    pub const fn closes_link(self) -> bool {
        matches!(self, CommandKind::Disconnect | CommandKind::Reset)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Name of the answered command.
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Echo of the selected port for PORTSELECT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

impl Response {
    pub fn ok(event: impl Into<String>, sequence: Option<u32>) -> Self {
        Self {
            event: event.into(),
            sequence,
            success: true,
            error: None,
            port: None,
        }
    }

    pub fn failed(event: impl Into<String>, sequence: Option<u32>, error: impl fmt::Display) -> Self {
        Self {
            event: event.into(),
            sequence,
            success: false,
            error: Some(error.to_string()),
            port: None,
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }
}

/// Everything a session reports to its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Answer to a request; emitted at most once per request.
    Response(Response),
    /// INFO text from the device.
    Info { sequence: u32, text: String },
    /// Decoded FEEDBACK telemetry.
    Feedback { sequence: u32, record: FeedbackRecord },
    /// The link dropped without being asked to.
    Disconnect { reason: String },
    /// A frame nothing was waiting for.
    Unsolicited {
        sequence: u32,
        msg_id: MsgId,
        raw_msg_id: u8,
        payload: Payload,
    },
}

impl SessionEvent {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The response carried by this event, if it is one.
    pub fn as_response(&self) -> Option<&Response> {
        match self {
            SessionEvent::Response(response) => Some(response),
            _ => None,
        }
    }
}

impl From<Response> for SessionEvent {
    fn from(response: Response) -> Self {
        SessionEvent::Response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexlink_frame::{decode_message, RawFeedback};
    use serde_json::json;

    #[test]
    fn parses_upload_request() {
        let request = Request::from_json(
            r#"{"event":"UPLOAD","sequence":7,"trajectory":[[0,1,2,3,4,5],[6,7,8,9,10,11]]}"#,
        )
        .expect("request should parse");

        assert_eq!(request.sequence, Some(7));
        assert_eq!(request.kind(), CommandKind::Upload);
        match &request.command {
            Command::Upload { trajectory } => assert_eq!(trajectory.len(), 2),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_portselect_and_signals() {
        let request = Request::from_json(r#"{"event":"PORTSELECT","port":"/dev/ttyACM0"}"#)
            .expect("request should parse");
        assert_eq!(
            request.command,
            Command::PortSelect {
                port: "/dev/ttyACM0".into()
            }
        );
        assert_eq!(request.sequence, None);

        let quit = Request::from_json(r#"{"event":"QUIT"}"#).expect("request should parse");
        assert_eq!(quit.command, Command::Quit);
    }

    #[test]
    fn rejects_unknown_events() {
        assert!(Request::from_json(r#"{"event":"DANCE"}"#).is_err());
        assert!(Request::from_json(r#"{"event":"MOVE"}"#).is_err());
    }

    #[test]
    fn request_json_roundtrip() {
        let request = Request::new(Command::Move {
            pose: vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5],
        })
        .with_sequence(3);
        let text = request.to_json().expect("request should serialize");
        assert_eq!(Request::from_json(&text).expect("request should parse"), request);
    }

    #[test]
    fn commands_map_to_frames() {
        let frame = Command::Play.frame(9).expect("PLAY has a frame").expect("PLAY encodes");
        let message = decode_message(&frame.encode().expect("frame encodes")).expect("frame decodes");
        assert_eq!(message.msg_id(), MsgId::Play);
        assert_eq!(message.sequence(), 9);

        assert!(Command::PortSelect { port: "x".into() }.frame(1).is_none());

        let bad = Command::Upload {
            trajectory: vec![vec![0.0; 6], vec![0.0; 2]],
        };
        assert!(matches!(
            bad.frame(1),
            Some(Err(EncodeError::InvalidShape { row: 1, len: 2 }))
        ));
    }

    #[test]
    fn kind_names_match_protocol() {
        assert_eq!(CommandKind::PortSelect.name(), "PORTSELECT");
        assert_eq!(CommandKind::Upload.name(), "UPLOAD");
        assert!(CommandKind::Reset.closes_link());
        assert!(!CommandKind::Quit.closes_link());
    }

    #[test]
    fn response_event_json_shape() {
        let event: SessionEvent = Response::ok("PORTSELECT", None).with_port("COM3").into();
        let value = serde_json::to_value(&event).expect("event should serialize");
        assert_eq!(
            value,
            json!({"type": "response", "event": "PORTSELECT", "success": true, "port": "COM3"})
        );

        let failed: SessionEvent = Response::failed("ENABLE", Some(4), "not connected").into();
        let value = serde_json::to_value(&failed).expect("event should serialize");
        assert_eq!(value["error"], "not connected");
        assert_eq!(value["sequence"], 4);
        assert_eq!(failed.as_response().map(|r| r.success), Some(false));
    }

    #[test]
    fn feedback_event_flattens_telemetry() {
        let raw = RawFeedback {
            axis_id: 1,
            recv: [0x94, 0, 20, 0, 0x80, 0x80, 0x08, 0x00],
            ..RawFeedback::default()
        };
        let event = SessionEvent::Feedback {
            sequence: 2,
            record: FeedbackRecord::from_raw(raw),
        };
        let value = serde_json::to_value(&event).expect("event should serialize");
        assert_eq!(value["type"], "feedback");
        assert_eq!(value["record"]["cmd_name"], "SPEED_CONTROL");
        assert_eq!(value["record"]["temperature_C"], 20);
        assert_eq!(value["record"]["result_name"], "SUCCESS");
    }
}
