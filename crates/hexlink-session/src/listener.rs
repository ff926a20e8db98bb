//! The listener worker: reads the link, feeds the raw sink and the parser,
//! and routes what it decodes.

use std::io::{ErrorKind, Read};
use std::sync::mpsc::{Sender, SyncSender};
use std::sync::Arc;

use bytes::BytesMut;
use hexlink_frame::{Message, MsgId, Payload, StreamParser};
use hexlink_transport::LinkStream;
use tracing::{debug, info, warn};

use crate::link::LinkControl;
use crate::message::SessionEvent;
use crate::sender::Envelope;
use crate::sink::RawSink;

const READ_CHUNK_SIZE: usize = 4 * 1024;

pub(crate) struct ListenerWorker {
    link: Arc<LinkControl>,
    inbox: SyncSender<Envelope>,
    events: Sender<SessionEvent>,
    raw: Option<RawSink>,
    max_packet_size: usize,
}

impl ListenerWorker {
    pub(crate) fn new(
        link: Arc<LinkControl>,
        inbox: SyncSender<Envelope>,
        events: Sender<SessionEvent>,
        raw: Option<RawSink>,
        max_packet_size: usize,
    ) -> Self {
        Self {
            link,
            inbox,
            events,
            raw,
            max_packet_size,
        }
    }

    pub(crate) fn run(mut self) {
        while let Some((generation, reader)) = self.link.wait_for_reader() {
            info!(generation, port = reader.label(), "listener attached");
            if !self.pump(generation, reader) {
                break;
            }
        }
        debug!("listener worker stopped");
    }

    /// Read one link until it closes. Returns `false` once the sender is gone.
    fn pump(&mut self, generation: u64, mut reader: LinkStream) -> bool {
        let mut parser = StreamParser::with_max_packet_size(self.max_packet_size);
        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            if !self.link.is_current(generation) {
                let stats = parser.stats();
                debug!(generation, frames = stats.frames, dropped = stats.dropped_frames(), "listener detached");
                return true;
            }

            let read = match reader.read(&mut chunk) {
                Ok(0) => return self.report_loss(generation, "end of stream"),
                Ok(n) => n,
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(err) => return self.report_loss(generation, &err.to_string()),
            };

            if let Some(raw) = self.raw.as_mut() {
                if !raw.push(&chunk[..read]) {
                    self.raw = None;
                }
            }

            buf.extend_from_slice(&chunk[..read]);
            let mut messages = Vec::new();
            parser.parse_buffer(&mut buf, |batch| messages.extend(batch));
            for message in messages {
                if !self.route(message) {
                    return false;
                }
            }
        }
    }

    fn route(&self, message: Message) -> bool {
        let header = message.header;
        match message.payload {
            Payload::Reply { echoed, raw } => self
                .inbox
                .send(Envelope::Reply {
                    sequence: header.sequence,
                    acked: header.msg_id == MsgId::Ack,
                    echoed,
                    raw,
                })
                .is_ok(),
            Payload::Text(text) => {
                debug!(sequence = header.sequence, text = %text, "device info");
                self.emit(SessionEvent::Info {
                    sequence: header.sequence,
                    text,
                });
                true
            }
            Payload::Feedback(record) => {
                self.emit(SessionEvent::Feedback {
                    sequence: header.sequence,
                    record,
                });
                true
            }
            payload => {
                warn!(
                    sequence = header.sequence,
                    msg_id = %header.msg_id,
                    raw_msg_id = header.raw_msg_id,
                    "unsolicited frame"
                );
                self.emit(SessionEvent::Unsolicited {
                    sequence: header.sequence,
                    msg_id: header.msg_id,
                    raw_msg_id: header.raw_msg_id,
                    payload,
                });
                true
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }

    fn report_loss(&self, generation: u64, reason: &str) -> bool {
        if !self.link.mark_lost(generation) {
            return true;
        }
        warn!(generation, reason, "link read failed");
        self.inbox
            .send(Envelope::LinkLost {
                generation,
                reason: reason.to_string(),
            })
            .is_ok()
    }
}
