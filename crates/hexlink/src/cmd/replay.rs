use std::fs;

use hexlink_frame::{Message, MsgId, ParserStats, StreamParser};
use tracing::{debug, warn};

use crate::cmd::{parse_msg_id, ReplayArgs};
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_messages, print_stats, OutputFormat};

pub fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    if args.chunk == 0 {
        return Err(CliError::new(USAGE, "--chunk must be greater than zero"));
    }
    let only = match &args.only {
        Some(names) => Some(
            names
                .iter()
                .map(|name| parse_msg_id(name))
                .collect::<CliResult<Vec<MsgId>>>()?,
        ),
        None => None,
    };

    let capture = fs::read(&args.file).map_err(|err| {
        io_error(&format!("failed reading {}", args.file.display()), err)
    })?;
    debug!(bytes = capture.len(), chunk = args.chunk, "replaying capture");

    let (messages, stats) = replay(&capture, args.chunk);
    let shown: Vec<Message> = match &only {
        Some(ids) => messages
            .into_iter()
            .filter(|message| ids.contains(&message.msg_id()))
            .collect(),
        None => messages,
    };

    print_messages(&shown, format);
    print_stats(&stats, format);

    if stats.dropped_frames() > 0 {
        warn!(dropped = stats.dropped_frames(), "capture contained invalid frames");
        if args.strict {
            return Err(CliError::new(
                DATA_INVALID,
                format!("{} frame(s) dropped", stats.dropped_frames()),
            ));
        }
    }
    Ok(SUCCESS)
}

/// Feed `capture` through a fresh parser `chunk` bytes at a time.
fn replay(capture: &[u8], chunk: usize) -> (Vec<Message>, ParserStats) {
    let mut parser = StreamParser::new();
    let mut messages = Vec::new();
    for piece in capture.chunks(chunk) {
        messages.extend(parser.feed(piece));
    }
    if parser.buffered() > 0 {
        warn!(bytes = parser.buffered(), "capture ends inside a frame");
    }
    (messages, parser.stats())
}
