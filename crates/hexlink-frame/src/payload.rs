use crate::codec::FrameHeader;
use crate::error::DecodeError;
use crate::feedback::FeedbackRecord;
use crate::msg_id::MsgId;

/// Components in one pose vector.
pub const POSE_COMPONENTS: usize = 6;

/// Wire size of one pose: six little-endian f32.
pub const POSE_SIZE: usize = POSE_COMPONENTS * 4;

/// One opaque pose vector. The host transports it without interpretation.
pub type Pose = [f32; POSE_COMPONENTS];

/// Payload interpreted according to its message id.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "value", rename_all = "snake_case"))]
pub enum Payload {
    /// A payload-less command.
    Signal(MsgId),
    /// ACK or NAK body: the message id being answered.
    Reply { echoed: MsgId, raw: u8 },
    /// UPLOAD trajectory rows, or the single MOVE pose.
    Poses(Vec<Pose>),
    Text(String),
    Feedback(FeedbackRecord),
    Raw(Vec<u8>),
}

/// A validated frame with its payload decoded.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Message {
    pub header: FrameHeader,
    pub payload: Payload,
}

impl Message {
    pub fn msg_id(&self) -> MsgId {
        self.header.msg_id
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }
}

/// Decode `bytes` as the payload of a `msg_id` frame.
pub fn decode_payload(msg_id: MsgId, bytes: &[u8]) -> Result<Payload, DecodeError> {
    match msg_id {
        id if id.is_signal() => Ok(Payload::Signal(id)),
        MsgId::Ack | MsgId::Nak => match bytes.first() {
            Some(&raw) => Ok(Payload::Reply {
                echoed: MsgId::from_u8(raw),
                raw,
            }),
            None => Err(malformed(msg_id, "missing echoed message id")),
        },
        MsgId::Upload => {
            if bytes.len() % POSE_SIZE != 0 {
                return Err(malformed(
                    msg_id,
                    format!("{} bytes is not a whole number of poses", bytes.len()),
                ));
            }
            Ok(Payload::Poses(decode_poses(bytes)))
        }
        MsgId::Move => {
            if bytes.len() != POSE_SIZE {
                return Err(malformed(
                    msg_id,
                    format!("expected {POSE_SIZE} bytes, have {}", bytes.len()),
                ));
            }
            Ok(Payload::Poses(decode_poses(bytes)))
        }
        MsgId::Info => Ok(Payload::Text(String::from_utf8_lossy(bytes).into_owned())),
        MsgId::Feedback => FeedbackRecord::decode(bytes).map(Payload::Feedback),
        _ => Ok(Payload::Raw(bytes.to_vec())),
    }
}

fn decode_poses(bytes: &[u8]) -> Vec<Pose> {
    bytes
        .chunks_exact(POSE_SIZE)
        .map(|row| {
            let mut pose = [0f32; POSE_COMPONENTS];
            for (value, raw) in pose.iter_mut().zip(row.chunks_exact(4)) {
                *value = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            }
            pose
        })
        .collect()
}

fn malformed(msg_id: MsgId, reason: impl Into<String>) -> DecodeError {
    DecodeError::MalformedPayload {
        msg_id,
        reason: reason.into(),
    }
}
