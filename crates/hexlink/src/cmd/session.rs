use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use hexlink_session::{
    Command, RawLogWriter, RawSink, Session, SessionConfig, SessionError, SessionEvent,
};
use hexlink_transport::Connector;
use tracing::{info, warn};

use crate::cmd::{parse_duration, SessionArgs, TransportKind};
use crate::exit::{io_error, session_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS, USAGE};
use crate::output::{payload_summary, OutputFormat};

/// How often the main loop checks stdin and the interrupt flag between events.
const TICK: Duration = Duration::from_millis(50);

pub fn run(args: SessionArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(&args)?;
    match args.transport {
        TransportKind::Unix => unix(&args, config, format),
        TransportKind::Serial => serial(&args, config, format),
    }
}

#[cfg(unix)]
fn unix(args: &SessionArgs, config: SessionConfig, format: OutputFormat) -> CliResult<i32> {
    drive(hexlink_transport::UnixSocketConnector, args, config, format)
}

#[cfg(not(unix))]
fn unix(_args: &SessionArgs, _config: SessionConfig, _format: OutputFormat) -> CliResult<i32> {
    Err(CliError::new(
        USAGE,
        "unix socket links are only available on unix platforms",
    ))
}

#[cfg(feature = "serial")]
fn serial(args: &SessionArgs, config: SessionConfig, format: OutputFormat) -> CliResult<i32> {
    use hexlink_transport::{SerialConfig, SerialConnector};

    let connector = SerialConnector::new(SerialConfig {
        baud_rate: args.baud,
        timeout: config.poll_interval,
    });
    drive(connector, args, config, format)
}

#[cfg(not(feature = "serial"))]
fn serial(_args: &SessionArgs, _config: SessionConfig, _format: OutputFormat) -> CliResult<i32> {
    Err(CliError::new(
        USAGE,
        "serial links are not compiled in; rebuild with --features serial or use --transport unix",
    ))
}

fn load_config(args: &SessionArgs) -> CliResult<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
            serde_json::from_str(&text).map_err(|err| {
                CliError::new(DATA_INVALID, format!("invalid session config: {err}"))
            })?
        }
        None => SessionConfig::default(),
    };
    if let Some(timeout) = &args.ack_timeout {
        config.ack_timeout = parse_duration(timeout)?;
    }
    if let Some(timeout) = &args.quit_timeout {
        config.quit_timeout = parse_duration(timeout)?;
    }
    config
        .validate()
        .map_err(|err| session_error("invalid session config", err))?;
    Ok(config)
}

fn drive<C: Connector>(
    connector: C,
    args: &SessionArgs,
    config: SessionConfig,
    format: OutputFormat,
) -> CliResult<i32> {
    let (sink, raw_log): (Option<RawSink>, Option<RawLogWriter>) = match &args.raw_log {
        Some(path) => {
            let (sink, writer) = RawLogWriter::create(path, config.raw_capacity)
                .map_err(|err| session_error("raw log", err))?;
            (Some(sink), Some(writer))
        }
        None => (None, None),
    };

    let mut session = Session::spawn_with_sink(connector, config, sink)
        .map_err(|err| session_error("session start failed", err))?;

    let interrupted = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(interrupted.clone())?;

    if let Some(port) = &args.port {
        submit(&session, Command::PortSelect { port: port.clone() })?;
        if !args.no_connect {
            submit(&session, Command::Connect)?;
        }
    }

    let lines = spawn_stdin_reader();
    let mut stdin_open = true;
    let mut quit_sent = false;

    loop {
        if stdin_open {
            stdin_open = forward_requests(&session, &lines);
        }
        if !quit_sent && (!stdin_open || interrupted.load(Ordering::SeqCst)) {
            info!("requesting QUIT");
            quit_sent = true;
            if session.submit(Command::Quit).is_err() {
                break;
            }
        }

        match session.recv_event_timeout(TICK) {
            Ok(event) => print_event(&event, format),
            Err(SessionError::Timeout(_)) => {}
            Err(_) => break,
        }
    }

    session.wait();
    drop(session);

    if let Some(writer) = raw_log {
        match writer.finish() {
            Ok(bytes) => info!(bytes, "raw log closed"),
            Err(err) => return Err(io_error("raw log", err)),
        }
    }
    Ok(SUCCESS)
}

fn submit(session: &Session, command: Command) -> CliResult<()> {
    session
        .submit(command)
        .map_err(|err| session_error("submit failed", err))
}

/// Submit every line already read. Returns `false` once stdin is exhausted.
fn forward_requests(session: &Session, lines: &Receiver<String>) -> bool {
    loop {
        match lines.try_recv() {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match session.submit_json(line) {
                    Ok(()) => {}
                    Err(SessionError::Json(err)) => warn!(error = %err, "ignoring invalid request"),
                    Err(err) => {
                        warn!(error = %err, "session no longer accepts requests");
                        return false;
                    }
                }
            }
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

/// Read stdin lines on a detached thread; the channel closes at EOF.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    let spawned = std::thread::Builder::new()
        .name("hexlink-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(err) = spawned {
        warn!(error = %err, "stdin reader unavailable; quitting");
    }
    rx
}

fn print_event(event: &SessionEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => match event.to_json() {
            Ok(json) => println!("{json}"),
            Err(err) => warn!(error = %err, "event not serializable"),
        },
        OutputFormat::Table | OutputFormat::Pretty | OutputFormat::Raw => {
            println!("{}", describe_event(event));
        }
    }
}

fn describe_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Response(response) => {
            let sequence = response
                .sequence
                .map(|s| format!(" seq={s}"))
                .unwrap_or_default();
            match (&response.error, &response.port) {
                (Some(error), _) => format!("{}{sequence} FAILED: {error}", response.event),
                (None, Some(port)) => format!("{}{sequence} ok port={port}", response.event),
                (None, None) => format!("{}{sequence} ok", response.event),
            }
        }
        SessionEvent::Info { sequence, text } => format!("INFO seq={sequence} {text}"),
        SessionEvent::Feedback { record, .. } => record.to_string(),
        SessionEvent::Disconnect { reason } => format!("DISCONNECTED: {reason}"),
        SessionEvent::Unsolicited {
            sequence,
            msg_id,
            payload,
            ..
        } => format!("UNSOLICITED {msg_id} seq={sequence} {}", payload_summary(payload)),
    }
}

fn install_ctrlc_handler(interrupted: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        interrupted.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexlink_session::Response;

    fn args() -> SessionArgs {
        SessionArgs {
            port: None,
            transport: TransportKind::Unix,
            baud: 115_200,
            config: None,
            ack_timeout: None,
            quit_timeout: None,
            raw_log: None,
            no_connect: false,
        }
    }

    #[test]
    fn flags_override_defaults() {
        let mut args = args();
        args.ack_timeout = Some("250ms".to_string());
        let config = load_config(&args).expect("config should load");
        assert_eq!(config.ack_timeout, Duration::from_millis(250));
        assert_eq!(config.quit_timeout, SessionConfig::default().quit_timeout);
    }

    #[test]
    fn config_file_is_partial_json() {
        let path = std::env::temp_dir().join(format!("hexlink-cli-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"quit_timeout_ms": 300}"#).expect("config should be writable");

        let mut args = args();
        args.config = Some(path.clone());
        args.ack_timeout = Some("1s".to_string());
        let config = load_config(&args).expect("config should load");
        assert_eq!(config.quit_timeout, Duration::from_millis(300));
        assert_eq!(config.ack_timeout, Duration::from_secs(1));

        std::fs::write(&path, r#"{"max_packet_size": 8}"#).expect("config should be writable");
        assert_eq!(load_config(&args).expect_err("tiny packet limit should fail").code, DATA_INVALID);

        std::fs::write(&path, "{not json").expect("config should be writable");
        assert_eq!(load_config(&args).expect_err("broken config should fail").code, DATA_INVALID);
        let _ = std::fs::remove_file(&path);
    }

    #[cfg(not(feature = "serial"))]
    #[test]
    fn serial_transport_needs_the_feature() {
        let mut args = args();
        args.transport = TransportKind::Serial;
        args.port = Some("/dev/ttyACM0".to_string());
        let err = run(args, OutputFormat::Json).expect_err("serial is not compiled in");
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn responses_read_as_one_line() {
        let ok = SessionEvent::Response(Response::ok("PLAY", Some(3)));
        assert_eq!(describe_event(&ok), "PLAY seq=3 ok");

        let failed = SessionEvent::Response(Response::failed("CONNECT", None, "no port selected"));
        assert_eq!(describe_event(&failed), "CONNECT FAILED: no port selected");

        let lost = SessionEvent::Disconnect {
            reason: "read failed".to_string(),
        };
        assert_eq!(describe_event(&lost), "DISCONNECTED: read failed");
    }
}
