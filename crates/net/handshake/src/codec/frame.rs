use async_trait::async_trait;
use aster_net_primitives::{Message, SubProtocol};
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{AsyncStream, HandshakeError};

/// Largest payload accepted in a single frame.
pub const MAX_PAYLOAD_SIZE: usize = 1 << 20;

/// `[protocol: u32][length: u32]`, big endian.
const FRAME_HEADER_LEN: usize = 8;

/// Message level view of an established connection.
#[async_trait]
pub trait MsgReadWriter: Send {
    /// Read the next message. Cancel safe: dropping the future loses no data.
    async fn read_msg(&mut self) -> Result<Message, HandshakeError>;

    async fn write_msg(&mut self, msg: &Message) -> Result<(), HandshakeError>;

    /// Shut down the write half. Further reads may still drain buffered data.
    async fn close(&mut self) -> Result<(), HandshakeError>;
}

/// Length-prefixed message framing over a byte stream.
pub struct FramedMsgRW<S> {
    stream: S,
    read_buf: BytesMut,
}

impl<S: AsyncStream> FramedMsgRW<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn try_decode(&mut self) -> Result<Option<Message>, HandshakeError> {
        let Some(head) = self.read_buf.get(..FRAME_HEADER_LEN) else {
            return Ok(None);
        };
        let (protocol, len) = head.split_at(4);
        let protocol = SubProtocol::from_u32(BigEndian::read_u32(protocol));
        let len = BigEndian::read_u32(len) as usize;
        if len > MAX_PAYLOAD_SIZE {
            return Err(HandshakeError::MessageTooLarge {
                size: len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let frame_len = FRAME_HEADER_LEN + len;
        if self.read_buf.len() < frame_len {
            self.read_buf.reserve(frame_len - self.read_buf.len());
            return Ok(None);
        }

        let mut frame = self.read_buf.split_to(frame_len);
        let payload = frame.split_off(FRAME_HEADER_LEN).freeze();
        Ok(Some(Message::new(protocol, payload)))
    }
}

impl<S> std::fmt::Debug for FramedMsgRW<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedMsgRW")
            .field("buffered", &self.read_buf.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S: AsyncStream> MsgReadWriter for FramedMsgRW<S> {
    async fn read_msg(&mut self) -> Result<Message, HandshakeError> {
        loop {
            if let Some(msg) = self.try_decode()? {
                return Ok(msg);
            }
            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(HandshakeError::ConnectionClosed);
            }
        }
    }

    async fn write_msg(&mut self, msg: &Message) -> Result<(), HandshakeError> {
        let len = msg.payload.len();
        if len > MAX_PAYLOAD_SIZE {
            return Err(HandshakeError::MessageTooLarge {
                size: len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + len);
        frame.put_u32(msg.protocol.as_u32());
        frame.put_u32(len as u32);
        frame.extend_from_slice(&msg.payload);

        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), HandshakeError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio_test::io::Builder;

    fn frame(protocol: SubProtocol, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&protocol.as_u32().to_be_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[tokio::test]
    async fn test_read_split_frames() {
        let mut wire = frame(SubProtocol::PING_REQUEST, b"ping");
        wire.extend(frame(SubProtocol::NEW_TX_NOTICE, b"tx-1"));
        let (first, second) = wire.split_at(11);
        let stream = Builder::new().read(first).read(second).build();
        let mut rw = FramedMsgRW::new(stream);

        let msg = rw.read_msg().await.unwrap();
        assert_eq!(msg, Message::new(SubProtocol::PING_REQUEST, &b"ping"[..]));
        let msg = rw.read_msg().await.unwrap();
        assert_eq!(msg, Message::new(SubProtocol::NEW_TX_NOTICE, &b"tx-1"[..]));
        assert_matches!(rw.read_msg().await, Err(HandshakeError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_write_frame() {
        let expected = frame(SubProtocol::GO_AWAY, b"bye");
        let stream = Builder::new().write(&expected).build();
        let mut rw = FramedMsgRW::new(stream);

        rw.write_msg(&Message::new(SubProtocol::GO_AWAY, &b"bye"[..]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let mut head = Vec::new();
        head.extend_from_slice(&SubProtocol::NEW_BLOCK_NOTICE.as_u32().to_be_bytes());
        head.extend_from_slice(&((MAX_PAYLOAD_SIZE as u32) + 1).to_be_bytes());
        let stream = Builder::new().read(&head).build();
        let mut rw = FramedMsgRW::new(stream);

        assert_matches!(
            rw.read_msg().await,
            Err(HandshakeError::MessageTooLarge { size, .. }) if size == MAX_PAYLOAD_SIZE + 1
        );
    }
}
