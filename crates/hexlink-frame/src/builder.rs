//! Typed constructors for every frame the protocol defines.
//!
//! Host commands go from [`HOST_ID`] to the primary target. The device-side
//! builders (`ack`, `nak`, `info`, `feedback`) address the host instead and
//! are what simulators and tests use to play the board.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{OutboundFrame, Target, HOST_ID};
use crate::error::EncodeError;
use crate::feedback::RawFeedback;
use crate::msg_id::MsgId;
use crate::payload::{POSE_COMPONENTS, POSE_SIZE};

/// A payload-less command (HEARTBEAT, ENABLE, PLAY, PAUSE, STOP, DISABLE,
/// RESET, QUIT, CONNECT, DISCONNECT).
pub fn signal(sequence: u32, msg_id: MsgId) -> OutboundFrame {
    OutboundFrame::new(sequence, msg_id, Bytes::new())
}

/// An UPLOAD of `poses`, each exactly six components. Zero poses is valid.
pub fn upload<P: AsRef<[f32]>>(sequence: u32, poses: &[P]) -> Result<OutboundFrame, EncodeError> {
    let mut payload = BytesMut::with_capacity(poses.len() * POSE_SIZE);
    for (row, pose) in poses.iter().enumerate() {
        put_pose(&mut payload, row, pose.as_ref())?;
    }
    Ok(OutboundFrame::new(sequence, MsgId::Upload, payload.freeze()))
}

/// A MOVE to a single pose.
pub fn move_pose(sequence: u32, pose: &[f32]) -> Result<OutboundFrame, EncodeError> {
    let mut payload = BytesMut::with_capacity(POSE_SIZE);
    put_pose(&mut payload, 0, pose)?;
    Ok(OutboundFrame::new(sequence, MsgId::Move, payload.freeze()))
}

/// Device acknowledgment of `echoed`, carrying the original sequence.
pub fn ack(sequence: u32, echoed: MsgId) -> OutboundFrame {
    device_frame(sequence, MsgId::Ack, vec![echoed.as_u8()])
}

/// Device rejection of `echoed`, carrying the original sequence.
pub fn nak(sequence: u32, echoed: MsgId) -> OutboundFrame {
    device_frame(sequence, MsgId::Nak, vec![echoed.as_u8()])
}

/// Free-form device text.
pub fn info(sequence: u32, text: &str) -> OutboundFrame {
    device_frame(sequence, MsgId::Info, Bytes::copy_from_slice(text.as_bytes()))
}

/// One axis telemetry record.
pub fn feedback(sequence: u32, record: &RawFeedback) -> OutboundFrame {
    let from = Target::axis(record.axis_id).raw() | 0x80;
    device_frame(sequence, MsgId::Feedback, Bytes::copy_from_slice(&record.encode())).with_from(from)
}

fn device_frame(sequence: u32, msg_id: MsgId, payload: impl Into<Bytes>) -> OutboundFrame {
    OutboundFrame::new(sequence, msg_id, payload)
        .with_from(Target::PRIMARY.raw())
        .with_target(Target::from_raw(HOST_ID))
}

fn put_pose(dst: &mut BytesMut, row: usize, pose: &[f32]) -> Result<(), EncodeError> {
    if pose.len() != POSE_COMPONENTS {
        return Err(EncodeError::InvalidShape {
            row,
            len: pose.len(),
        });
    }
    for value in pose {
        dst.put_f32_le(*value);
    }
    Ok(())
}
