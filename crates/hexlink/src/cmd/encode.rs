use hexlink_frame::{builder, MsgId, OutboundFrame, Target};
use serde::Serialize;

use crate::cmd::{parse_msg_id, EncodeArgs};
use crate::exit::{encode_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{parse_hex, print_raw, to_hex, OutputFormat};

#[derive(Serialize)]
struct EncodeOutput<'a> {
    msg_id: &'a str,
    sequence: u32,
    to_id: u8,
    length: usize,
    hex: String,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let frame = build_frame(&args)?;
    let bytes = frame
        .encode()
        .map_err(|err| encode_error("encode failed", err))?;

    match format {
        OutputFormat::Raw => print_raw(&bytes),
        OutputFormat::Json => {
            let out = EncodeOutput {
                msg_id: frame.msg_id.name(),
                sequence: frame.sequence,
                to_id: frame.target.raw(),
                length: bytes.len(),
                hex: to_hex(&bytes),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => println!("{}", to_hex(&bytes)),
    }
    Ok(SUCCESS)
}

fn build_frame(args: &EncodeArgs) -> CliResult<OutboundFrame> {
    let msg_id = parse_msg_id(&args.msg)?;
    let sequence = args.sequence;

    let frame = match msg_id {
        MsgId::Upload => builder::upload(sequence, args.poses.as_slice())
            .map_err(|err| encode_error("invalid trajectory", err))?,
        MsgId::Move => match args.poses.as_slice() {
            [pose] => builder::move_pose(sequence, &pose.0)
                .map_err(|err| encode_error("invalid pose", err))?,
            poses => {
                return Err(CliError::new(
                    USAGE,
                    format!("MOVE takes exactly one --pose, got {}", poses.len()),
                ))
            }
        },
        MsgId::Ack | MsgId::Nak => {
            let echoed = args
                .echo
                .as_deref()
                .ok_or_else(|| CliError::new(USAGE, format!("{msg_id} needs --echo <MSG>")))?;
            let echoed = parse_msg_id(echoed)?;
            if msg_id == MsgId::Ack {
                builder::ack(sequence, echoed)
            } else {
                builder::nak(sequence, echoed)
            }
        }
        MsgId::Info => builder::info(sequence, args.text.as_deref().unwrap_or_default()),
        id if id.is_signal() => {
            if !args.poses.is_empty() || args.payload.is_some() || args.text.is_some() {
                return Err(CliError::new(USAGE, format!("{id} carries no payload")));
            }
            builder::signal(sequence, id)
        }
        id => {
            let payload = match args.payload.as_deref() {
                Some(hex) => parse_hex(hex).map_err(|err| {
                    CliError::new(DATA_INVALID, format!("--payload is not valid hex: {err}"))
                })?,
                None => Vec::new(),
            };
            OutboundFrame::new(sequence, id, payload)
        }
    };

    Ok(match args.axis {
        Some(axis) => frame.with_target(Target::axis(axis)),
        None => frame,
    })
}
