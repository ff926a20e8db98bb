//! The sender worker: sole owner of the writer half, the sequence counter and
//! the pending table.

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hexlink_frame::{FrameError, FrameWriter, MsgId, Payload};
use hexlink_transport::{Connector, LinkStream};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::link::LinkControl;
use crate::message::{Command, CommandKind, Request, Response, SessionEvent};
use crate::pending::{PendingRequest, PendingTable};

/// Everything the sender worker reacts to.
#[derive(Debug)]
pub(crate) enum Envelope {
    /// A command from the session owner.
    Request(Request),
    /// An ACK or NAK seen by the listener.
    Reply {
        sequence: u32,
        acked: bool,
        echoed: MsgId,
        raw: u8,
    },
    /// The listener saw link `generation` die.
    LinkLost { generation: u64, reason: String },
    Shutdown,
}

pub(crate) struct SenderWorker<C> {
    connector: C,
    config: SessionConfig,
    link: Arc<LinkControl>,
    events: Sender<SessionEvent>,
    port: Option<String>,
    writer: Option<FrameWriter<LinkStream>>,
    generation: u64,
    pending: PendingTable,
    next_sequence: u32,
    quitting: bool,
    finished: bool,
}

impl<C: Connector> SenderWorker<C> {
    pub(crate) fn new(
        connector: C,
        config: SessionConfig,
        link: Arc<LinkControl>,
        events: Sender<SessionEvent>,
    ) -> Self {
        Self {
            connector,
            config,
            link,
            events,
            port: None,
            writer: None,
            generation: 0,
            pending: PendingTable::new(),
            next_sequence: 0,
            quitting: false,
            finished: false,
        }
    }

    pub(crate) fn run(mut self, inbox: Receiver<Envelope>) {
        debug!(connector = self.connector.name(), "sender worker started");
        while !self.finished {
            match inbox.recv_timeout(self.wait_time()) {
                Ok(Envelope::Request(request)) => self.handle_request(request),
                Ok(Envelope::Reply {
                    sequence,
                    acked,
                    echoed,
                    raw,
                }) => self.handle_reply(sequence, acked, echoed, raw),
                Ok(Envelope::LinkLost { generation, reason }) => {
                    self.handle_link_lost(generation, &reason)
                }
                Ok(Envelope::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
            self.sweep(Instant::now());
        }
        self.teardown(&inbox);
    }

    fn wait_time(&self) -> Duration {
        let poll = self.config.poll_interval;
        match self.pending.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()).min(poll),
            None => poll,
        }
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }

    fn respond(&self, response: Response) {
        self.emit(SessionEvent::Response(response));
    }

    fn handle_request(&mut self, request: Request) {
        let kind = request.kind();
        let sequence = request.sequence;
        if self.quitting {
            self.respond(Response::failed(
                kind.name(),
                sequence,
                SessionError::ShutdownInProgress,
            ));
            return;
        }

        match &request.command {
            Command::PortSelect { port } => {
                info!(port = %port, "port selected");
                self.port = Some(port.clone());
                self.respond(Response::ok(kind.name(), sequence).with_port(port.clone()));
            }
            Command::Connect => self.connect(sequence),
            Command::Disconnect if !self.is_connected() => {
                self.respond(Response::ok(kind.name(), sequence));
            }
            Command::Quit if !self.is_connected() => {
                info!("quit while disconnected");
                self.respond(Response::ok(kind.name(), sequence));
                self.finished = true;
            }
            _ if !self.is_connected() => {
                self.respond(Response::failed(
                    kind.name(),
                    sequence,
                    SessionError::NotConnected,
                ));
            }
            command => self.dispatch(command, sequence),
        }
    }

    fn connect(&mut self, sequence: Option<u32>) {
        if self.is_connected() {
            self.close_link("reconnect requested");
        }
        let Some(port) = self.port.clone() else {
            self.respond(Response::failed(
                CommandKind::Connect.name(),
                sequence,
                SessionError::NoPortSelected,
            ));
            return;
        };

        self.link.begin_connect();
        match self.open_link(&port) {
            Ok((writer, reader)) => {
                self.generation = self.link.install(reader);
                self.writer = Some(writer);
                info!(port = %port, generation = self.generation, "link connected");
                self.dispatch(&Command::Connect, sequence);
            }
            Err(err) => {
                self.link.abort_connect();
                warn!(port = %port, error = %err, "connect failed");
                self.respond(Response::failed(CommandKind::Connect.name(), sequence, err));
            }
        }
    }

    fn open_link(&self, port: &str) -> Result<(FrameWriter<LinkStream>, LinkStream)> {
        let stream = self.connector.open(port)?;
        let mut reader = stream.try_clone()?;
        reader.set_read_timeout(Some(self.config.poll_interval))?;
        let writer = FrameWriter::with_config_link(stream, self.config.frame_config())?;
        Ok((writer, reader))
    }

    fn dispatch(&mut self, command: &Command, requested: Option<u32>) {
        let kind = command.kind();
        let sequence = requested.unwrap_or_else(|| self.allocate_sequence());

        let frame = match command.frame(sequence) {
            Some(Ok(frame)) => frame.with_target(self.config.target),
            Some(Err(err)) => {
                self.respond(Response::failed(kind.name(), Some(sequence), SessionError::Encode(err)));
                return;
            }
            None => return,
        };

        if !self.is_connected() {
            self.respond(Response::failed(kind.name(), Some(sequence), SessionError::NotConnected));
            return;
        }

        // The entry is reserved before the write so a reused sequence never reaches the wire.
        let timeout = if kind == CommandKind::Quit {
            self.config.quit_timeout
        } else {
            self.config.ack_timeout
        };
        if let Err(err) = self.pending.insert(PendingRequest::new(sequence, kind, timeout)) {
            warn!(error = %err, "pending table refused entry");
            self.respond(Response::failed(kind.name(), Some(sequence), err));
            return;
        }

        let written = match self.writer.as_mut() {
            Some(writer) => writer.write_frame(&frame),
            None => Ok(()),
        };
        if let Err(err) = written {
            self.pending.resolve(sequence);
            let link_failed = !matches!(err, FrameError::Encode(_));
            let reason = format!("write failed: {err}");
            self.respond(Response::failed(kind.name(), Some(sequence), SessionError::Frame(err)));
            if link_failed {
                self.lose_link(&reason);
            }
            if kind == CommandKind::Quit {
                self.finished = true;
            }
            return;
        }

        if kind == CommandKind::Quit {
            self.quitting = true;
        }
        debug!(command = %kind, sequence, len = frame.wire_size(), "command sent");
    }

    fn allocate_sequence(&mut self) -> u32 {
        loop {
            let sequence = self.next_sequence;
            self.next_sequence = self.next_sequence.wrapping_add(1);
            if !self.pending.contains(sequence) {
                return sequence;
            }
        }
    }

    fn handle_reply(&mut self, sequence: u32, acked: bool, echoed: MsgId, raw: u8) {
        let Some(entry) = self.pending.resolve(sequence) else {
            let msg_id = if acked { MsgId::Ack } else { MsgId::Nak };
            warn!(sequence, %msg_id, %echoed, "reply without a pending request");
            self.emit(SessionEvent::Unsolicited {
                sequence,
                msg_id,
                raw_msg_id: msg_id.as_u8(),
                payload: Payload::Reply { echoed, raw },
            });
            return;
        };

        let answered = match echoed {
            MsgId::Unknown => entry.kind.msg_id().unwrap_or(echoed),
            known => known,
        };
        if entry.kind.msg_id() != Some(answered) {
            warn!(sequence, expected = %entry.kind, %answered, "reply echoes a different command");
        }
        let latency = entry.sent_at.elapsed();
        debug!(sequence, %answered, acked, ?latency, "request settled");

        let response = if acked {
            Response::ok(answered.name(), Some(sequence))
        } else {
            Response::failed(answered.name(), Some(sequence), SessionError::Rejected(answered))
        };
        self.settled(entry.kind);
        self.respond(response);
    }

    /// Follow-up once a request got its ACK, NAK or timeout. Runs before the
    /// response goes out so the owner observes the resulting link state.
    fn settled(&mut self, kind: CommandKind) {
        if kind.closes_link() {
            self.close_link(&format!("{kind} settled"));
        } else if kind == CommandKind::Quit {
            self.finished = true;
        }
    }

    fn sweep(&mut self, now: Instant) {
        for entry in self.pending.take_expired(now) {
            warn!(sequence = entry.sequence, command = %entry.kind, "acknowledgment timed out");
            self.settled(entry.kind);
            self.respond(Response::failed(
                entry.kind.name(),
                Some(entry.sequence),
                SessionError::Timeout(entry.timeout()),
            ));
        }
    }

    fn handle_link_lost(&mut self, generation: u64, reason: &str) {
        if generation != self.generation || !self.is_connected() {
            debug!(generation, "ignoring stale link loss");
            return;
        }
        self.lose_link(reason);
    }

    /// Unrequested loss: tell the owner and fail everything pending.
    fn lose_link(&mut self, reason: &str) {
        warn!(reason, "link lost");
        self.release_writer();
        self.emit(SessionEvent::Disconnect {
            reason: reason.to_string(),
        });
        self.fail_pending(|| SessionError::LinkLost(reason.to_string()));
        if self.quitting {
            self.finished = true;
        }
    }

    /// Requested close.
    fn close_link(&mut self, reason: &str) {
        if !self.is_connected() {
            return;
        }
        info!(reason, "closing link");
        self.release_writer();
        self.fail_pending(|| SessionError::LinkLost(reason.to_string()));
    }

    fn release_writer(&mut self) {
        self.link.close();
        if let Some(writer) = self.writer.take() {
            writer.get_ref().shutdown();
        }
    }

    fn fail_pending(&mut self, error: impl Fn() -> SessionError) {
        for entry in self.pending.drain() {
            self.respond(Response::failed(entry.kind.name(), Some(entry.sequence), error()));
            if entry.kind == CommandKind::Quit {
                self.finished = true;
            }
        }
    }

    fn teardown(&mut self, inbox: &Receiver<Envelope>) {
        self.fail_pending(|| SessionError::ShutdownInProgress);
        self.close_link("session shutdown");
        self.link.request_shutdown();
        // Keep draining so submitters blocked on a full inbox can finish.
        loop {
            let closed = self.link.try_close_intake();
            self.reject_queued(inbox);
            if closed {
                break;
            }
            std::thread::yield_now();
        }
        info!("sender worker stopped");
    }

    /// Answer every request still queued with a shutdown failure.
    fn reject_queued(&self, inbox: &Receiver<Envelope>) {
        while let Ok(envelope) = inbox.try_recv() {
            if let Envelope::Request(request) = envelope {
                debug!(command = %request.kind(), "rejecting request queued behind shutdown");
                self.respond(Response::failed(
                    request.kind().name(),
                    request.sequence,
                    SessionError::ShutdownInProgress,
                ));
            }
        }
    }
}
