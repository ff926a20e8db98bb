//! Incremental frame extraction from an arbitrarily chunked byte stream.
//!
//! The parser is a restartable state machine over an append-only buffer. It
//! never needs the stream to be aligned: bytes before a start marker are
//! dropped, a false start is skipped one byte at a time, and a frame with a
//! bad CRC or payload is consumed whole and counted.

use std::ops::ControlFlow;

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::codec::{decode_frame, parse_header, FrameHeader, HEADER_SIZE, MAX_PACKET_SIZE, START_MARKER};
use crate::error::DecodeError;
use crate::payload::Message;

/// Where the parser is within the current candidate frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    AwaitStart,
    AwaitHeader,
    AwaitPayload,
    FrameFound,
    FrameHandled,
    FrameError,
}

/// Running counters since the parser was created or reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ParserStats {
    pub frames: u64,
    pub crc_errors: u64,
    pub header_errors: u64,
    pub payload_errors: u64,
    /// Bytes dropped while hunting for a start marker or discarding bad frames.
    pub discarded_bytes: u64,
}

impl ParserStats {
    pub fn dropped_frames(&self) -> u64 {
        self.crc_errors + self.header_errors + self.payload_errors
    }
}

/// Resynchronizing frame parser.
#[derive(Debug)]
pub struct StreamParser {
    state: ParserState,
    header: Option<FrameHeader>,
    queued: Vec<Message>,
    last_error: Option<DecodeError>,
    buf: BytesMut,
    max_packet_size: usize,
    stats: ParserStats,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamParser {
    pub fn new() -> Self {
        Self::with_max_packet_size(MAX_PACKET_SIZE)
    }

    /// Treat length fields above `max_packet_size` as a false start.
    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Self {
            state: ParserState::AwaitStart,
            header: None,
            queued: Vec::new(),
            last_error: None,
            buf: BytesMut::new(),
            max_packet_size: max_packet_size.min(MAX_PACKET_SIZE),
            stats: ParserStats::default(),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// The most recent frame that was dropped, if any.
    pub fn last_error(&self) -> Option<&DecodeError> {
        self.last_error.as_ref()
    }

    /// Bytes held in the internal buffer used by [`feed`](Self::feed).
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Forget any partial frame and counters.
    pub fn reset(&mut self) {
        self.state = ParserState::AwaitStart;
        self.header = None;
        self.queued.clear();
        self.last_error = None;
        self.buf.clear();
        self.stats = ParserStats::default();
    }

    /// Append `bytes` to the internal buffer and return every message completed.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Message> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.extend_from_slice(bytes);

        let mut messages = Vec::new();
        self.parse_buffer(&mut buf, |batch| messages.extend(batch));

        self.buf = buf;
        messages
    }

    /// Consume as much of a caller-owned buffer as possible, calling
    /// `on_messages` each time a frame is handled.
    ///
    /// Incomplete trailing bytes are left in `buf` for the next call.
    pub fn parse_buffer<F>(&mut self, buf: &mut BytesMut, mut on_messages: F)
    where
        F: FnMut(Vec<Message>),
    {
        self.drive(buf, |batch| {
            on_messages(batch);
            ControlFlow::Continue(())
        });
    }

    /// Run until one message is available or more input is needed.
    pub fn next_message(&mut self, buf: &mut BytesMut) -> Option<Message> {
        let mut found = None;
        self.drive(buf, |batch| {
            found = batch.into_iter().next();
            ControlFlow::Break(())
        });
        found
    }

    fn drive<F>(&mut self, buf: &mut BytesMut, mut on_handled: F)
    where
        F: FnMut(Vec<Message>) -> ControlFlow<()>,
    {
        loop {
            match self.state {
                ParserState::AwaitStart => {
                    if buf.is_empty() {
                        return;
                    }
                    match buf.iter().position(|&b| b == START_MARKER) {
                        None => {
                            let len = buf.len();
                            self.discard(buf, len);
                            return;
                        }
                        Some(offset) => {
                            if offset > 0 {
                                self.discard(buf, offset);
                            }
                            self.state = ParserState::AwaitHeader;
                        }
                    }
                }
                ParserState::AwaitHeader => {
                    if buf.len() < HEADER_SIZE {
                        return;
                    }
                    match parse_header(&buf[..HEADER_SIZE], self.max_packet_size) {
                        Ok(header) => {
                            self.header = Some(header);
                            self.state = ParserState::AwaitPayload;
                        }
                        Err(err) => {
                            // Drop only the false start so the scan moves forward.
                            self.discard(buf, 1);
                            self.record(err);
                        }
                    }
                }
                ParserState::AwaitPayload => {
                    let Some(header) = self.header else {
                        self.state = ParserState::AwaitStart;
                        continue;
                    };
                    if buf.len() < header.length as usize {
                        return;
                    }
                    self.state = ParserState::FrameFound;
                }
                ParserState::FrameFound => {
                    let Some(header) = self.header.take() else {
                        self.state = ParserState::AwaitStart;
                        continue;
                    };
                    let len = header.length as usize;
                    let candidate = buf.split_to(len);
                    match decode_frame(&candidate, self.max_packet_size).and_then(|f| f.into_message()) {
                        Ok(message) => {
                            debug!(
                                msg_id = %message.msg_id(),
                                sequence = message.sequence(),
                                len,
                                "frame received"
                            );
                            self.stats.frames += 1;
                            self.queued.push(message);
                            self.state = ParserState::FrameHandled;
                        }
                        Err(err) => {
                            self.stats.discarded_bytes += len as u64;
                            self.record(err);
                        }
                    }
                }
                ParserState::FrameHandled => {
                    let batch = std::mem::take(&mut self.queued);
                    self.state = ParserState::AwaitStart;
                    if on_handled(batch).is_break() {
                        return;
                    }
                }
                ParserState::FrameError => {
                    if let Some(err) = &self.last_error {
                        warn!(error = %err, "dropping frame");
                    }
                    self.state = ParserState::AwaitStart;
                }
            }
        }
    }

    fn discard(&mut self, buf: &mut BytesMut, count: usize) {
        buf.advance(count);
        self.stats.discarded_bytes += count as u64;
    }

    fn record(&mut self, err: DecodeError) {
        match err {
            DecodeError::CrcMismatch { .. } => self.stats.crc_errors += 1,
            DecodeError::MalformedHeader(_) => self.stats.header_errors += 1,
            DecodeError::MalformedPayload { .. } => self.stats.payload_errors += 1,
        }
        self.last_error = Some(err);
        self.state = ParserState::FrameError;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;
    use crate::codec::{encode_packet, OutboundFrame, CRC_SIZE};
    use crate::msg_id::MsgId;
    use crate::payload::Payload;

    fn wire(seq: u32, id: MsgId, payload: &[u8]) -> Vec<u8> {
        encode_packet(seq, id, payload).unwrap().to_vec()
    }

    #[test]
    fn single_frame_in_one_chunk() {
        let mut parser = StreamParser::new();
        let messages = parser.feed(&wire(1234, MsgId::Heartbeat, b""));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].msg_id(), MsgId::Heartbeat);
        assert_eq!(messages[0].sequence(), 1234);
        assert_eq!(parser.state(), ParserState::AwaitStart);
        assert_eq!(parser.buffered(), 0);
        assert_eq!(parser.stats().frames, 1);
    }

    #[test]
    fn concatenated_frames_come_out_in_order() {
        let mut stream = Vec::new();
        for seq in 0..20u32 {
            stream.extend(wire(seq, MsgId::Info, format!("line {seq}").as_bytes()));
        }

        let mut parser = StreamParser::new();
        let messages = parser.feed(&stream);
        let seqs: Vec<u32> = messages.iter().map(Message::sequence).collect();
        assert_eq!(seqs, (0..20).collect::<Vec<_>>());
        assert_eq!(
            messages[7].payload,
            Payload::Text("line 7".to_string())
        );
    }

    #[test]
    fn every_split_offset_yields_the_same_frame() {
        let frame = builder::upload(9, &[[1.0f32; 6], [2.0; 6]])
            .unwrap()
            .encode()
            .unwrap();

        for split in 0..=frame.len() {
            let mut parser = StreamParser::new();
            let mut messages = parser.feed(&frame[..split]);
            if split < frame.len() {
                assert!(messages.is_empty(), "split {split} produced a frame early");
            }
            messages.extend(parser.feed(&frame[split..]));
            assert_eq!(messages.len(), 1, "split {split}");
            assert_eq!(messages[0].sequence(), 9);
        }
    }

    #[test]
    fn byte_at_a_time_delivery() {
        let frame = wire(5, MsgId::Ack, &[MsgId::Play.as_u8()]);
        let mut parser = StreamParser::new();
        let mut messages = Vec::new();
        for byte in &frame {
            messages.extend(parser.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].payload,
            Payload::Reply {
                echoed: MsgId::Play,
                raw: 0x03
            }
        );
    }

    #[test]
    fn resyncs_after_leading_garbage() {
        let mut stream = vec![0xAA, 0x55, 0x00, 0xFF, 0x10];
        stream.extend(wire(77, MsgId::Stop, b""));

        let mut parser = StreamParser::new();
        let messages = parser.feed(&stream);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sequence(), 77);
        assert_eq!(parser.stats().discarded_bytes, 5);
    }

    #[test]
    fn garbage_without_marker_is_dropped_entirely() {
        let mut parser = StreamParser::new();
        assert!(parser.feed(&[0x02; 100]).is_empty());
        assert_eq!(parser.buffered(), 0);
        assert_eq!(parser.stats().discarded_bytes, 100);
        assert_eq!(parser.state(), ParserState::AwaitStart);
    }

    #[test]
    fn false_start_with_absurd_length_is_skipped() {
        let mut stream = vec![START_MARKER, 0xFF, 0xFF, 0xFF, 0xFF, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20];
        stream.extend(wire(3, MsgId::Pause, b""));

        let mut parser = StreamParser::new();
        let messages = parser.feed(&stream);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].msg_id(), MsgId::Pause);
        assert_eq!(parser.stats().header_errors, 1);
        assert_eq!(parser.stats().discarded_bytes, 12);
    }

    #[test]
    fn crc_failure_consumes_the_claimed_frame() {
        let mut bad = wire(1, MsgId::Info, b"corrupt me");
        bad[14] ^= 0x01;
        let mut stream = bad.clone();
        stream.extend(wire(2, MsgId::Info, b"fine"));

        let mut parser = StreamParser::new();
        let messages = parser.feed(&stream);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sequence(), 2);

        let stats = parser.stats();
        assert_eq!(stats.crc_errors, 1);
        assert_eq!(stats.discarded_bytes, bad.len() as u64);
        assert!(matches!(
            parser.last_error(),
            Some(DecodeError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn bad_payload_is_counted_not_returned() {
        let empty_ack = OutboundFrame::new(4, MsgId::Ack, Vec::new()).encode().unwrap();
        let mut parser = StreamParser::new();
        assert!(parser.feed(&empty_ack).is_empty());
        assert_eq!(parser.stats().payload_errors, 1);
        assert_eq!(parser.stats().dropped_frames(), 1);
    }

    #[test]
    fn waits_in_header_and_payload_states() {
        let frame = wire(6, MsgId::Info, b"partial");
        let mut parser = StreamParser::new();

        parser.feed(&frame[..5]);
        assert_eq!(parser.state(), ParserState::AwaitHeader);
        parser.feed(&frame[5..frame.len() - CRC_SIZE]);
        assert_eq!(parser.state(), ParserState::AwaitPayload);
        assert_eq!(parser.feed(&frame[frame.len() - CRC_SIZE..]).len(), 1);
        assert_eq!(parser.state(), ParserState::AwaitStart);
    }

    #[test]
    fn parse_buffer_leaves_incomplete_tail() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&wire(1, MsgId::Enable, b""));
        buf.extend_from_slice(&wire(2, MsgId::Play, b""));
        let tail = wire(3, MsgId::Pause, b"");
        buf.extend_from_slice(&tail[..7]);

        let mut parser = StreamParser::new();
        let mut calls = 0;
        let mut seen = Vec::new();
        parser.parse_buffer(&mut buf, |batch| {
            calls += 1;
            seen.extend(batch.into_iter().map(|m| m.sequence()));
        });

        assert_eq!(calls, 2);
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(buf.len(), 7);
    }

    #[test]
    fn next_message_stops_after_one_frame() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&wire(1, MsgId::Enable, b""));
        buf.extend_from_slice(&wire(2, MsgId::Disable, b""));

        let mut parser = StreamParser::new();
        assert_eq!(parser.next_message(&mut buf).unwrap().sequence(), 1);
        assert_eq!(buf.len(), 16);
        assert_eq!(parser.next_message(&mut buf).unwrap().sequence(), 2);
        assert!(parser.next_message(&mut buf).is_none());
    }

    #[test]
    fn smaller_ceiling_rejects_big_frames() {
        let big = wire(1, MsgId::Info, &[b'x'; 200]);
        let mut parser = StreamParser::with_max_packet_size(64);
        assert!(parser.feed(&big).is_empty());
        assert!(parser.stats().header_errors >= 1);
    }

    #[test]
    fn reset_clears_partial_state() {
        let frame = wire(1, MsgId::Enable, b"");
        let mut parser = StreamParser::new();
        parser.feed(&frame[..10]);
        parser.reset();
        assert_eq!(parser.state(), ParserState::AwaitStart);
        assert_eq!(parser.buffered(), 0);
        assert_eq!(parser.stats(), ParserStats::default());
        assert_eq!(parser.feed(&frame).len(), 1);
    }
}
