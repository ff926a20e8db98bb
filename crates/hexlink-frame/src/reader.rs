use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use hexlink_transport::LinkStream;

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};
use crate::parser::{ParserStats, StreamParser};
use crate::payload::Message;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete messages from any `Read` stream.
///
/// Handles partial reads and resynchronization internally; frames that fail
/// validation are dropped and show up in [`stats`](Self::stats).
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    parser: StreamParser,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            parser: StreamParser::with_max_packet_size(config.max_packet_size),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(message) = self.parser.next_message(&mut self.buf) {
                return Ok(message);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Parser counters for this stream.
    pub fn stats(&self) -> ParserStats {
        self.parser.stats()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<LinkStream> {
    /// Create a frame reader for a `LinkStream` and apply the read timeout from config.
    pub fn with_config_link(mut inner: LinkStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: hexlink_transport::TransportError) -> FrameError {
    match err {
        hexlink_transport::TransportError::Io(io)
        | hexlink_transport::TransportError::Accept(io) => FrameError::Io(io),
        hexlink_transport::TransportError::Open { source, .. }
        | hexlink_transport::TransportError::Bind { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::builder;
    use crate::codec::encode_packet;
    use crate::msg_id::MsgId;
    use crate::payload::Payload;

    fn frame(seq: u32, id: MsgId, payload: &[u8]) -> Vec<u8> {
        encode_packet(seq, id, payload).unwrap().to_vec()
    }

    #[test]
    fn read_single_message() {
        let mut reader = FrameReader::new(Cursor::new(frame(1, MsgId::Info, b"hello")));
        let message = reader.read_message().unwrap();

        assert_eq!(message.sequence(), 1);
        assert_eq!(message.payload, Payload::Text("hello".into()));
    }

    #[test]
    fn read_multiple_messages() {
        let bytes = [
            frame(1, MsgId::Enable, b""),
            frame(2, MsgId::Play, b""),
            frame(3, MsgId::Info, b"three"),
        ]
        .concat();
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let ids: Vec<MsgId> = (0..3).map(|_| reader.read_message().unwrap().msg_id()).collect();
        assert_eq!(ids, vec![MsgId::Enable, MsgId::Play, MsgId::Info]);
    }

    #[test]
    fn read_large_upload() {
        let poses: Vec<[f32; 6]> = (0..2000).map(|i| [i as f32; 6]).collect();
        let bytes = builder::upload(9, &poses).unwrap().encode().unwrap().to_vec();

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let message = reader.read_message().unwrap();
        assert_eq!(message.payload, Payload::Poses(poses));
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: frame(4, MsgId::Info, b"slow"),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let message = reader.read_message().unwrap();
        assert_eq!(message.sequence(), 4);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut bytes = frame(2, MsgId::Info, b"only-part");
        bytes.truncate(15);

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn garbage_is_skipped_and_counted() {
        let mut bytes = vec![0x7Eu8; 9];
        bytes.extend(frame(8, MsgId::Heartbeat, b""));

        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_message().unwrap().sequence(), 8);
        assert_eq!(reader.stats().discarded_bytes, 9);
    }

    #[test]
    fn oversized_frame_in_stream_is_dropped() {
        let bytes = [frame(1, MsgId::Info, &[b'x'; 128]), frame(2, MsgId::Stop, b"")].concat();
        let cfg = FrameConfig {
            max_packet_size: 64,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(bytes), cfg);
        assert_eq!(reader.read_message().unwrap().msg_id(), MsgId::Stop);
        assert!(reader.stats().header_errors >= 1);
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn roundtrip_over_pipe() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.write_frame(&builder::ack(11, MsgId::Upload)).unwrap();
        let message = reader.read_message().unwrap();

        assert_eq!(message.sequence(), 11);
        assert_eq!(message.msg_id(), MsgId::Ack);
    }

    #[test]
    fn concurrent_reader_writer_threads() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let reader = Arc::new(Mutex::new(FrameReader::new(right)));

        let reader_thread = {
            let reader = Arc::clone(&reader);
            std::thread::spawn(move || {
                for expected in 0..64u32 {
                    let message = reader.lock().unwrap().read_message().unwrap();
                    assert_eq!(message.sequence(), expected);
                    assert_eq!(message.payload, Payload::Text(format!("msg-{expected}")));
                }
            })
        };

        for i in 0..64u32 {
            writer.write_frame(&builder::info(i, &format!("msg-{i}"))).unwrap();
        }

        reader_thread.join().unwrap();
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let _ = reader.get_ref();
        let _ = reader.get_mut();
        assert_eq!(reader.config().read_timeout, None);
        let _inner = reader.into_inner();
    }

    #[test]
    fn read_would_block_propagates_io_error() {
        let reader = WouldBlockThenData {
            state: 0,
            bytes: frame(7, MsgId::Play, b""),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let err = framed.read_message().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));

        // The stream stays usable after a timeout.
        assert_eq!(framed.read_message().unwrap().sequence(), 7);
    }

    struct WouldBlockThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for WouldBlockThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(frame(8, MsgId::Pause, b"")),
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(framed.read_message().unwrap().sequence(), 8);
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn applies_read_timeout_for_link_stream() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let link = LinkStream::from_unix(left, "pair");
        let cfg = FrameConfig {
            read_timeout: Some(std::time::Duration::from_millis(10)),
            ..FrameConfig::default()
        };

        let mut reader = FrameReader::with_config_link(link, cfg).unwrap();
        let err = reader.read_message().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Io(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
        ));
    }
}
