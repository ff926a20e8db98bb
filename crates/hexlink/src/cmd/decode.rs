use hexlink_frame::{decode_message, Message};

use crate::cmd::DecodeArgs;
use crate::exit::{decode_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{parse_hex, print_messages, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let message = decode_hex(&args.hex)?;
    print_messages(std::slice::from_ref(&message), format);
    Ok(SUCCESS)
}

fn decode_hex(input: &str) -> CliResult<Message> {
    let bytes = parse_hex(input)
        .map_err(|err| CliError::new(DATA_INVALID, format!("input is not valid hex: {err}")))?;
    decode_message(&bytes).map_err(|err| decode_error("invalid frame", err))
}
