//! Subprotocol-tagged messages exchanged over a peer's message channel.

use std::fmt;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

/// Subprotocol identifier of a message.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubProtocol(u32);

impl SubProtocol {
    pub const STATUS_REQUEST: Self = Self(0x0001);
    pub const GO_AWAY: Self = Self(0x0002);
    pub const PING_REQUEST: Self = Self(0x0003);
    pub const PING_RESPONSE: Self = Self(0x0004);
    pub const ADDRESSES_REQUEST: Self = Self(0x0005);
    pub const ADDRESSES_RESPONSE: Self = Self(0x0006);
    pub const NEW_BLOCK_NOTICE: Self = Self(0x0010);
    pub const NEW_TX_NOTICE: Self = Self(0x0011);

    pub const fn from_u32(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::STATUS_REQUEST => "status_request",
            Self::GO_AWAY => "go_away",
            Self::PING_REQUEST => "ping_request",
            Self::PING_RESPONSE => "ping_response",
            Self::ADDRESSES_REQUEST => "addresses_request",
            Self::ADDRESSES_RESPONSE => "addresses_response",
            Self::NEW_BLOCK_NOTICE => "new_block_notice",
            Self::NEW_TX_NOTICE => "new_tx_notice",
            _ => return None,
        })
    }
}

impl fmt::Display for SubProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "subprotocol({:#06x})", self.0),
        }
    }
}

impl fmt::Debug for SubProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("message body: {0}")]
pub struct MessageBodyError(#[from] postcard::Error);

/// A single framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub protocol: SubProtocol,
    pub payload: Bytes,
}

impl Message {
    pub fn new(protocol: SubProtocol, payload: impl Into<Bytes>) -> Self {
        Self {
            protocol,
            payload: payload.into(),
        }
    }

    /// Encode `body` as the payload.
    pub fn with_body<T: Serialize>(protocol: SubProtocol, body: &T) -> Result<Self, MessageBodyError> {
        let payload = postcard::to_allocvec(body)?;
        Ok(Self::new(protocol, payload))
    }

    /// Decode the payload as `T`.
    pub fn body<T: DeserializeOwned>(&self) -> Result<T, MessageBodyError> {
        Ok(postcard::from_bytes(&self.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlockRef;

    #[test]
    fn test_body_decode_rejects_garbage() {
        let msg = Message::new(SubProtocol::NEW_BLOCK_NOTICE, vec![0xff]);
        assert!(msg.body::<BlockRef>().is_err());
    }

    #[test]
    fn test_subprotocol_display() {
        assert_eq!(SubProtocol::GO_AWAY.to_string(), "go_away");
        assert_eq!(SubProtocol::from_u32(0x99).to_string(), "subprotocol(0x0099)");
    }
}
