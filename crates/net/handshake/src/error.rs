use aster_net_primitives::{ChainId, MessageBodyError, P2PVersion, PeerId, SubProtocol};

/// Coarse classification of a handshake failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Timeout,
    Protocol,
    ChainMismatch,
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("Short write: wrote {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    #[error("Timeout")]
    Timeout,
    #[error("Bad magic: expected {expected:#010x}, got {got:#010x}")]
    BadMagic { expected: u32, got: u32 },
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(P2PVersion),
    #[error("Malformed status: {0}")]
    MalformedStatus(String),
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(SubProtocol),
    #[error("Remote sent go away: {0}")]
    RemoteGoAway(String),
    #[error("Chain mismatch: local {local}, remote {remote}")]
    ChainMismatch { local: ChainId, remote: ChainId },
    #[error("Genesis block mismatch")]
    GenesisMismatch,
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Connected to self")]
    SelfConnection,
    #[error("Peer id mismatch: expected {expected}, got {got}")]
    PeerIdMismatch { expected: PeerId, got: PeerId },
}

impl HandshakeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::ShortWrite { .. } | Self::ConnectionClosed => {
                ErrorKind::Transport
            }
            Self::Timeout => ErrorKind::Timeout,
            Self::ChainMismatch { .. } | Self::GenesisMismatch => ErrorKind::ChainMismatch,
            Self::BadMagic { .. }
            | Self::UnsupportedVersion(_)
            | Self::MalformedStatus(_)
            | Self::MessageTooLarge { .. }
            | Self::UnexpectedMessage(_)
            | Self::RemoteGoAway(_)
            | Self::SelfConnection
            | Self::PeerIdMismatch { .. } => ErrorKind::Protocol,
        }
    }
}

impl From<MessageBodyError> for HandshakeError {
    fn from(err: MessageBodyError) -> Self {
        Self::MalformedStatus(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let io = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        assert_eq!(HandshakeError::from(io).kind(), ErrorKind::Transport);
        assert_eq!(HandshakeError::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(
            HandshakeError::UnsupportedVersion(P2PVersion::from_u32(7)).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(HandshakeError::GenesisMismatch.kind(), ErrorKind::ChainMismatch);
        assert_eq!(ErrorKind::ChainMismatch.to_string(), "chain_mismatch");
    }
}
