//! `tokio_util::codec` adapter over the stream parser and frame encoder.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{OutboundFrame, MAX_PACKET_SIZE};
use crate::error::FrameError;
use crate::parser::{ParserStats, StreamParser};
use crate::payload::Message;

/// Decodes [`Message`]s and encodes [`OutboundFrame`]s on async byte streams.
#[derive(Debug)]
pub struct HexlinkCodec {
    parser: StreamParser,
    max_packet_size: usize,
}

impl Default for HexlinkCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl HexlinkCodec {
    pub fn new() -> Self {
        Self::with_max_packet_size(MAX_PACKET_SIZE)
    }

    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Self {
            parser: StreamParser::with_max_packet_size(max_packet_size),
            max_packet_size,
        }
    }

    pub fn stats(&self) -> ParserStats {
        self.parser.stats()
    }
}

impl Decoder for HexlinkCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, FrameError> {
        Ok(self.parser.next_message(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, FrameError> {
        if let Some(message) = self.parser.next_message(src) {
            return Ok(Some(message));
        }
        if !src.is_empty() {
            debug!(remaining = src.len(), "discarding incomplete frame at end of stream");
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<OutboundFrame> for HexlinkCodec {
    type Error = FrameError;

    fn encode(&mut self, item: OutboundFrame, dst: &mut BytesMut) -> Result<(), FrameError> {
        item.encode_into(dst, self.max_packet_size)?;
        Ok(())
    }
}

impl Encoder<&OutboundFrame> for HexlinkCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &OutboundFrame, dst: &mut BytesMut) -> Result<(), FrameError> {
        item.encode_into(dst, self.max_packet_size)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::builder;
    use crate::msg_id::MsgId;
    use crate::payload::Payload;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let mut sink = FramedWrite::new(client, HexlinkCodec::new());
        let mut stream = FramedRead::new(server, HexlinkCodec::new());

        sink.send(builder::signal(1, MsgId::Enable)).await.unwrap();
        sink.send(builder::info(2, "ready")).await.unwrap();
        drop(sink);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.payload, Payload::Signal(MsgId::Enable));
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.payload, Payload::Text("ready".into()));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn garbage_and_truncated_tail_are_dropped() {
        let (mut client, server) = tokio::io::duplex(1024);
        let frame = builder::ack(5, MsgId::Play).encode().unwrap();

        client.write_all(&[0x33, 0x44]).await.unwrap();
        client.write_all(&frame).await.unwrap();
        client.write_all(&frame[..6]).await.unwrap();
        drop(client);

        let mut stream = FramedRead::new(server, HexlinkCodec::new());
        let message = stream.next().await.unwrap().unwrap();
        assert_eq!(message.sequence(), 5);
        assert!(stream.next().await.is_none());
        assert_eq!(stream.decoder().stats().discarded_bytes, 2);
    }

    #[test]
    fn encoder_honours_packet_ceiling() {
        let mut codec = HexlinkCodec::with_max_packet_size(20);
        let mut dst = BytesMut::new();
        let frame = builder::info(1, "far too long for the ceiling");
        assert!(matches!(
            codec.encode(&frame, &mut dst),
            Err(FrameError::Encode(_))
        ));
        assert!(codec.encode(builder::signal(2, MsgId::Stop), &mut dst).is_ok());
        assert_eq!(dst.len(), 16);
    }
}
