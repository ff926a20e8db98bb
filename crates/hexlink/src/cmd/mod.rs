use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod replay;
pub mod session;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build one frame and print it.
    Encode(EncodeArgs),
    /// Validate and decode one frame given as hex.
    Decode(DecodeArgs),
    /// Run a raw link capture through the stream parser.
    Replay(ReplayArgs),
    /// Drive a board: JSON requests on stdin, JSON events on stdout.
    Session(SessionArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Replay(args) => replay::run(args, format),
        Command::Session(args) => session::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Message name (e.g. HEARTBEAT, UPLOAD, ACK).
    pub msg: String,
    /// Sequence number.
    #[arg(long, short = 's', default_value = "0")]
    pub sequence: u32,
    /// Address one axis instead of the primary board.
    #[arg(long)]
    pub axis: Option<u8>,
    /// INFO text.
    #[arg(long, conflicts_with_all = ["poses", "payload"])]
    pub text: Option<String>,
    /// One pose as six comma-separated floats; repeat for UPLOAD rows.
    #[arg(long = "pose", value_name = "X,Y,Z,ROLL,PITCH,YAW", allow_hyphen_values = true)]
    pub poses: Vec<PoseArg>,
    /// Message answered by an ACK or NAK.
    #[arg(long)]
    pub echo: Option<String>,
    /// Raw payload as hex, for FEEDBACK or UNKNOWN frames.
    #[arg(long, value_name = "HEX", conflicts_with = "poses")]
    pub payload: Option<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame bytes as hex; whitespace and ':' are ignored.
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Capture file, as written by `session --raw-log`.
    pub file: PathBuf,
    /// Feed the parser in chunks of this many bytes.
    #[arg(long, default_value = "4096")]
    pub chunk: usize,
    /// Only print these messages (comma-separated names).
    #[arg(long, value_delimiter = ',')]
    pub only: Option<Vec<String>>,
    /// Exit with a data error if any frame was dropped.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Serial,
    Unix,
}

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Port to select at startup (serial device or socket path).
    pub port: Option<String>,
    /// Link type the port names.
    #[arg(long, value_enum, default_value = "serial", env = "HEXLINK_TRANSPORT")]
    pub transport: TransportKind,
    /// Serial baud rate.
    #[arg(long, default_value = "115200", env = "HEXLINK_BAUD")]
    pub baud: u32,
    /// Session settings as JSON; flags below override it.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// How long to wait for ACK/NAK (e.g. 2s, 500ms).
    #[arg(long)]
    pub ack_timeout: Option<String>,
    /// How long QUIT waits for its ACK.
    #[arg(long)]
    pub quit_timeout: Option<String>,
    /// Append every byte read from the link to this file.
    #[arg(long, value_name = "FILE")]
    pub raw_log: Option<PathBuf>,
    /// Select the port but do not CONNECT until asked.
    #[arg(long)]
    pub no_connect: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// One `--pose` value.
#[derive(Clone, Debug, PartialEq)]
pub struct PoseArg(pub Vec<f32>);

impl FromStr for PoseArg {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        input
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f32>()
                    .map_err(|_| format!("invalid pose component: {part:?}"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(PoseArg)
    }
}

impl AsRef<[f32]> for PoseArg {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub(crate) fn parse_msg_id(name: &str) -> CliResult<hexlink_frame::MsgId> {
    hexlink_frame::MsgId::from_name(name.trim())
        .ok_or_else(|| CliError::new(USAGE, format!("unknown message: {name}")))
}
