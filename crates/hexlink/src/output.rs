use std::fmt::Write as _;
use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use hexlink_frame::{FrameHeader, Message, ParserStats, Payload};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    sequence: u32,
    msg_id: String,
    raw_msg_id: u8,
    from_id: u8,
    to_id: u8,
    length: u32,
    payload_size: usize,
    payload: &'a Payload,
}

impl<'a> MessageOutput<'a> {
    fn new(message: &'a Message) -> Self {
        let header: &FrameHeader = &message.header;
        Self {
            sequence: header.sequence,
            msg_id: message.msg_id().name().to_string(),
            raw_msg_id: header.raw_msg_id,
            from_id: header.from_id,
            to_id: header.to_id,
            length: header.length,
            payload_size: header.payload_len(),
            payload: &message.payload,
        }
    }
}

/// Print decoded messages: one JSON object per line, one table, or one line each.
pub fn print_messages(messages: &[Message], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for message in messages {
                println!(
                    "{}",
                    serde_json::to_string(&MessageOutput::new(message))
                        .unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "MSG", "FROM", "TO", "LEN", "PAYLOAD"]);
            for message in messages {
                let header = &message.header;
                table.add_row(vec![
                    header.sequence.to_string(),
                    msg_label(message),
                    format!("{:#04x}", header.from_id),
                    format!("{:#04x}", header.to_id),
                    header.payload_len().to_string(),
                    payload_summary(&message.payload),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for message in messages {
                let header = &message.header;
                println!(
                    "seq={} msg={} from={:#04x} to={:#04x} len={} payload={}",
                    header.sequence,
                    msg_label(message),
                    header.from_id,
                    header.to_id,
                    header.payload_len(),
                    payload_summary(&message.payload)
                );
            }
        }
    }
}

#[derive(Serialize)]
struct StatsOutput {
    frames: u64,
    crc_errors: u64,
    header_errors: u64,
    payload_errors: u64,
    discarded_bytes: u64,
    dropped_frames: u64,
}

pub fn print_stats(stats: &ParserStats, format: OutputFormat) {
    let out = StatsOutput {
        frames: stats.frames,
        crc_errors: stats.crc_errors,
        header_errors: stats.header_errors,
        payload_errors: stats.payload_errors,
        discarded_bytes: stats.discarded_bytes,
        dropped_frames: stats.dropped_frames(),
    };
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&serde_json::json!({ "stats": out }))
                    .unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["FRAMES", "CRC ERR", "HEADER ERR", "PAYLOAD ERR", "DISCARDED"])
                .add_row(vec![
                    out.frames.to_string(),
                    out.crc_errors.to_string(),
                    out.header_errors.to_string(),
                    out.payload_errors.to_string(),
                    out.discarded_bytes.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "frames={} crc_errors={} header_errors={} payload_errors={} discarded_bytes={}",
                out.frames, out.crc_errors, out.header_errors, out.payload_errors, out.discarded_bytes
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn msg_label(message: &Message) -> String {
    let name = message.msg_id().name();
    if message.msg_id() == hexlink_frame::MsgId::Unknown {
        format!("{name}({:#04x})", message.header.raw_msg_id)
    } else {
        name.to_string()
    }
}

/// One-line human description of a payload.
pub fn payload_summary(payload: &Payload) -> String {
    match payload {
        Payload::Signal(_) => "-".to_string(),
        Payload::Reply { echoed, raw } => format!("echoes {echoed} ({raw:#04x})"),
        Payload::Poses(poses) => match poses.as_slice() {
            [pose] => format!("pose {pose:?}"),
            rows => format!("{} poses", rows.len()),
        },
        Payload::Text(text) => format!("{text:?}"),
        Payload::Feedback(record) => record.to_string(),
        Payload::Raw(bytes) if bytes.is_empty() => "-".to_string(),
        Payload::Raw(bytes) => format!("<{} bytes> {}", bytes.len(), to_hex(bytes)),
    }
}

/// Lowercase hex, no separators.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Parse hex text. Whitespace, `:` separators and a leading `0x` are ignored.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, String> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<u8> = body
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();

    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits ({})", digits.len()));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let high = hex_value(pair[0])?;
            let low = hex_value(pair[1])?;
            Ok((high << 4) | low)
        })
        .collect()
}

fn hex_value(digit: u8) -> Result<u8, String> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        other => Err(format!("invalid hex digit {:?}", other as char)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexlink_frame::MsgId;

    #[test]
    fn hex_round_trips_with_separators() {
        assert_eq!(to_hex(&[0x01, 0xab, 0xff]), "01abff");
        assert_eq!(parse_hex("0x01ABff").unwrap(), vec![0x01, 0xab, 0xff]);
        assert_eq!(parse_hex("01 ab:ff\n").unwrap(), vec![0x01, 0xab, 0xff]);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn hex_rejects_bad_input() {
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn payload_summaries_are_short() {
        assert_eq!(payload_summary(&Payload::Signal(MsgId::Play)), "-");
        assert_eq!(
            payload_summary(&Payload::Reply {
                echoed: MsgId::Upload,
                raw: 0x07
            }),
            "echoes UPLOAD (0x07)"
        );
        assert_eq!(payload_summary(&Payload::Poses(vec![[0.0; 6]; 3])), "3 poses");
        assert_eq!(payload_summary(&Payload::Text("ok".into())), "\"ok\"");
        assert_eq!(payload_summary(&Payload::Raw(vec![0xde, 0xad])), "<2 bytes> dead");
    }
}
