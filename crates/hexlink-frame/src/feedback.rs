//! FEEDBACK telemetry: the fixed 32-byte record a board streams per axis, and
//! the decode of the motor-driver reply echoed inside it.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::DecodeError;
use crate::msg_id::MsgId;

/// Wire size of a FEEDBACK payload.
pub const FEEDBACK_SIZE: usize = 32;

/// Motor torque constant (N·m/A).
pub const TORQUE_CONSTANT: f64 = 0.116_67;

/// Output gear ratio.
pub const GEAR_RATIO: f64 = 9.0;

/// The record exactly as it travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawFeedback {
    pub axis_id: u8,
    pub mode: u8,
    pub armed: u8,
    pub calibrated: u8,
    pub set_point: f32,
    /// Device clock (µs) when the driver command went out.
    pub t_send: u32,
    /// Device clock (µs) when the driver reply came back.
    pub t_recv: u32,
    /// Command bytes sent to the motor driver.
    pub sent: [u8; 8],
    /// Reply bytes from the motor driver.
    pub recv: [u8; 8],
}

impl RawFeedback {
    /// Parse the packed little-endian layout. Trailing bytes are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < FEEDBACK_SIZE {
            return Err(DecodeError::MalformedPayload {
                msg_id: MsgId::Feedback,
                reason: format!("need {FEEDBACK_SIZE} bytes, have {}", bytes.len()),
            });
        }
        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let mut sent = [0u8; 8];
        sent.copy_from_slice(&bytes[16..24]);
        let mut recv = [0u8; 8];
        recv.copy_from_slice(&bytes[24..32]);

        Ok(Self {
            axis_id: bytes[0],
            mode: bytes[1],
            armed: bytes[2],
            calibrated: bytes[3],
            set_point: f32::from_bits(u32_at(4)),
            t_send: u32_at(8),
            t_recv: u32_at(12),
            sent,
            recv,
        })
    }

    /// Serialize to the wire layout.
    pub fn encode(&self) -> [u8; FEEDBACK_SIZE] {
        let mut out = BytesMut::with_capacity(FEEDBACK_SIZE);
        out.put_u8(self.axis_id);
        out.put_u8(self.mode);
        out.put_u8(self.armed);
        out.put_u8(self.calibrated);
        out.put_f32_le(self.set_point);
        out.put_u32_le(self.t_send);
        out.put_u32_le(self.t_recv);
        out.put_slice(&self.sent);
        out.put_slice(&self.recv);

        let mut bytes = [0u8; FEEDBACK_SIZE];
        bytes.copy_from_slice(&out);
        bytes
    }

    /// Round trip time on the device clock, tolerant of counter wrap.
    pub fn latency_us(&self) -> u32 {
        self.t_recv.wrapping_sub(self.t_send)
    }
}

/// Motor-driver commands with a known name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum MotorCommand {
    StartMotor,
    StopMotor,
    TorqueControl,
    SpeedControl,
    PositionControl,
    StopControl,
}

impl MotorCommand {
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x91 => Some(MotorCommand::StartMotor),
            0x92 => Some(MotorCommand::StopMotor),
            0x93 => Some(MotorCommand::TorqueControl),
            0x94 => Some(MotorCommand::SpeedControl),
            0x95 => Some(MotorCommand::PositionControl),
            0x97 => Some(MotorCommand::StopControl),
            _ => None,
        }
    }

    pub const fn as_byte(self) -> u8 {
        match self {
            MotorCommand::StartMotor => 0x91,
            MotorCommand::StopMotor => 0x92,
            MotorCommand::TorqueControl => 0x93,
            MotorCommand::SpeedControl => 0x94,
            MotorCommand::PositionControl => 0x95,
            MotorCommand::StopControl => 0x97,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            MotorCommand::StartMotor => "START_MOTOR",
            MotorCommand::StopMotor => "STOP_MOTOR",
            MotorCommand::TorqueControl => "TORQUE_CONTROL",
            MotorCommand::SpeedControl => "SPEED_CONTROL",
            MotorCommand::PositionControl => "POSITION_CONTROL",
            MotorCommand::StopControl => "STOP_CONTROL",
        }
    }

    /// Control commands whose reply carries temperature, position, speed and torque.
    pub const fn carries_telemetry(self) -> bool {
        matches!(
            self,
            MotorCommand::TorqueControl | MotorCommand::SpeedControl | MotorCommand::PositionControl
        )
    }

    /// Unit of the set point for control commands.
    pub const fn set_point_unit(self) -> &'static str {
        match self {
            MotorCommand::TorqueControl => " N·m",
            MotorCommand::SpeedControl => " rad/s",
            MotorCommand::PositionControl => " rad",
            _ => "",
        }
    }
}

impl fmt::Display for MotorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result codes a motor driver reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum MotorResult {
    Success,
    Fail,
    FailUnknownCmd,
    FailUnknownId,
    FailRoReg,
    FailUnknownReg,
    FailStrFormat,
    FailDataFormat,
    FailWoReg,
    FailNotConnected,
}

impl MotorResult {
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(MotorResult::Success),
            0x01 => Some(MotorResult::Fail),
            0x02 => Some(MotorResult::FailUnknownCmd),
            0x03 => Some(MotorResult::FailUnknownId),
            0x04 => Some(MotorResult::FailRoReg),
            0x05 => Some(MotorResult::FailUnknownReg),
            0x06 => Some(MotorResult::FailStrFormat),
            0x07 => Some(MotorResult::FailDataFormat),
            0x0B => Some(MotorResult::FailWoReg),
            0x80 => Some(MotorResult::FailNotConnected),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            MotorResult::Success => "SUCCESS",
            MotorResult::Fail => "FAIL",
            MotorResult::FailUnknownCmd => "FAIL_UNKNOWN_CMD",
            MotorResult::FailUnknownId => "FAIL_UNKNOWN_ID",
            MotorResult::FailRoReg => "FAIL_RO_REG",
            MotorResult::FailUnknownReg => "FAIL_UNKNOWN_REG",
            MotorResult::FailStrFormat => "FAIL_STR_FORMAT",
            MotorResult::FailDataFormat => "FAIL_DATA_FORMAT",
            MotorResult::FailWoReg => "FAIL_WO_REG",
            MotorResult::FailNotConnected => "FAIL_NOT_CONNECTED",
        }
    }
}

impl fmt::Display for MotorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Position of the result byte inside a driver reply, keyed by command byte.
pub const fn result_index(cmd: u8) -> usize {
    match cmd {
        0x83 | 0x84 | 0xA1 => 3,
        0xA2 | 0xB4 => 2,
        _ => 1,
    }
}

/// Physical readings packed into a control reply.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ControlTelemetry {
    #[cfg_attr(feature = "serde", serde(rename = "temperature_C"))]
    pub temperature_c: i8,
    pub position_rad: f64,
    pub speed_rad_s: f64,
    #[cfg_attr(feature = "serde", serde(rename = "torque_Nm"))]
    pub torque_nm: f64,
}

impl ControlTelemetry {
    /// Unpack the fixed-point fields of a control reply.
    pub fn from_reply(recv: &[u8; 8]) -> Self {
        let pos_raw = u16::from_le_bytes([recv[3], recv[4]]);
        let speed_raw = (((recv[5] as u16) << 4) | ((recv[6] as u16) >> 4)) & 0x0FFF;
        let torque_raw = ((((recv[6] & 0x0F) as u16) << 8) | recv[7] as u16) & 0x0FFF;
        let torque_span = TORQUE_CONSTANT * GEAR_RATIO;

        Self {
            temperature_c: recv[2] as i8,
            position_rad: f64::from(pos_raw) * 25.0 / 65535.0 - 12.5,
            speed_rad_s: f64::from(speed_raw) * 130.0 / 4095.0 - 65.0,
            torque_nm: f64::from(torque_raw) * (450.0 * torque_span) / 4095.0 - 225.0 * torque_span,
        }
    }
}

/// A FEEDBACK record with the driver reply decoded.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FeedbackRecord {
    pub axis_id: u8,
    pub mode: u8,
    pub armed: bool,
    pub calibrated: bool,
    pub set_point: f32,
    pub t_send: u32,
    pub t_recv: u32,
    pub latency_us: u32,
    pub sent: [u8; 8],
    pub recv: [u8; 8],
    /// First byte of `sent`.
    pub tx_cmd: u8,
    pub tx_cmd_name: Option<MotorCommand>,
    /// First byte of `recv`.
    pub cmd: u8,
    pub cmd_name: Option<MotorCommand>,
    pub result_code: u8,
    pub result_name: Option<MotorResult>,
    pub ok: bool,
    /// Present for torque, speed and position control replies.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub telemetry: Option<ControlTelemetry>,
}

impl FeedbackRecord {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        RawFeedback::decode(bytes).map(Self::from_raw)
    }

    pub fn from_raw(raw: RawFeedback) -> Self {
        let cmd = raw.recv[0];
        let cmd_name = MotorCommand::from_byte(cmd);
        let result_code = raw.recv[result_index(cmd)];
        let telemetry = cmd_name
            .filter(|command| command.carries_telemetry())
            .map(|_| ControlTelemetry::from_reply(&raw.recv));

        Self {
            axis_id: raw.axis_id,
            mode: raw.mode,
            armed: raw.armed != 0,
            calibrated: raw.calibrated != 0,
            set_point: raw.set_point,
            t_send: raw.t_send,
            t_recv: raw.t_recv,
            latency_us: raw.latency_us(),
            sent: raw.sent,
            recv: raw.recv,
            tx_cmd: raw.sent[0],
            tx_cmd_name: MotorCommand::from_byte(raw.sent[0]),
            cmd,
            cmd_name,
            result_code,
            result_name: MotorResult::from_code(result_code),
            ok: result_code == 0,
            telemetry,
        }
    }
}

/// One-line operator summary: full telemetry for a successful control reply,
/// otherwise the reply command and its result.
impl fmt::Display for FeedbackRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AXIS {} (armed={})", self.axis_id, u8::from(self.armed))?;
        match (self.cmd_name, self.telemetry) {
            (Some(command), Some(t)) if self.ok => write!(
                f,
                " | setPoint={}{} | position={:.6} rad | velocity={:.6} rad/s | torque={:.6} N·m",
                self.set_point,
                command.set_point_unit(),
                t.position_rad,
                t.speed_rad_s,
                t.torque_nm
            ),
            _ => {
                match self.cmd_name {
                    Some(command) => write!(f, " | rx={command}")?,
                    None => write!(f, " | rx=0x{:02X}", self.cmd)?,
                }
                match self.result_name {
                    Some(result) => write!(f, " ({result})"),
                    None => write!(f, " ({})", self.result_code),
                }
            }
        }
    }
}
