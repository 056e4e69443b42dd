use std::{sync::Arc, time::Duration};

use aster_net_primitives::{Direction, P2PVersion, PeerId, Status};
use tokio::{io::AsyncWriteExt, time::Instant};
use tracing::{debug, trace};

use crate::{
    BoxedStream, HandshakeError, HsHeader, MsgReadWriter, VersionManager, read_header,
    versioned::within,
};

/// Outcome of a successful handshake.
pub struct Handshaked {
    pub msg_rw: Box<dyn MsgReadWriter>,
    pub status: Status,
    pub version: P2PVersion,
}

impl std::fmt::Debug for Handshaked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshaked")
            .field("peer_id", &self.status.sender.id)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Runs the header exchange and delegates to the negotiated [`VersionedHandshaker`].
///
/// [`VersionedHandshaker`]: crate::VersionedHandshaker
#[derive(Debug, Clone)]
pub struct WireHandshaker {
    magic: u32,
    local_id: PeerId,
    versions: Arc<VersionManager>,
}

impl WireHandshaker {
    pub fn new(magic: u32, local_id: PeerId, versions: Arc<VersionManager>) -> Self {
        Self {
            magic,
            local_id,
            versions,
        }
    }

    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    /// Run a full handshake over `stream` within `ttl`.
    ///
    /// On error the caller owns closing the connection; dropping the stream does it.
    pub async fn handshake(
        &self,
        stream: BoxedStream,
        direction: Direction,
        expected_peer: Option<PeerId>,
        ttl: Duration,
    ) -> Result<Handshaked, HandshakeError> {
        let deadline = Instant::now() + ttl;
        let handshaked = match direction {
            Direction::Outbound => self.handshake_outbound(stream, deadline).await,
            Direction::Inbound => self.handshake_inbound(stream, deadline).await,
        }?;

        let remote = handshaked.status.sender.id;
        if remote == self.local_id {
            return Err(HandshakeError::SelfConnection);
        }
        if let Some(expected) = expected_peer.filter(|expected| *expected != remote) {
            return Err(HandshakeError::PeerIdMismatch {
                expected,
                got: remote,
            });
        }
        trace!(peer_id = %remote, %direction, version = %handshaked.version, "handshake complete");
        Ok(handshaked)
    }

    pub async fn handshake_outbound(
        &self,
        mut stream: BoxedStream,
        deadline: Instant,
    ) -> Result<Handshaked, HandshakeError> {
        let version = self
            .versions
            .preferred()
            .ok_or(HandshakeError::UnsupportedVersion(P2PVersion::UNKNOWN))?;
        let header = HsHeader::new(self.magic, version).encode();

        let written = within(deadline, async {
            let written = stream.write(&header).await?;
            stream.flush().await?;
            Ok(written)
        })
        .await?;
        if written != header.len() {
            return Err(HandshakeError::ShortWrite {
                written,
                expected: header.len(),
            });
        }
        check_deadline(deadline)?;

        let mut hs = self.versions.build(version, deadline, stream)?;
        let status = hs.do_for_outbound().await?;
        Ok(Handshaked {
            msg_rw: hs.into_msg_rw(),
            status,
            version,
        })
    }

    pub async fn handshake_inbound(
        &self,
        mut stream: BoxedStream,
        deadline: Instant,
    ) -> Result<Handshaked, HandshakeError> {
        let header = within(deadline, read_header(&mut stream)).await?;
        check_deadline(deadline)?;
        if header.magic != self.magic {
            return Err(HandshakeError::BadMagic {
                expected: self.magic,
                got: header.magic,
            });
        }

        let version = self.versions.select_version(&[header.version]);
        if version.is_unknown() {
            debug!(offered = %header.version, "no common protocol version");
            return Err(HandshakeError::UnsupportedVersion(header.version));
        }

        let mut hs = self.versions.build(version, deadline, stream)?;
        let status = hs.do_for_inbound().await?;
        Ok(Handshaked {
            msg_rw: hs.into_msg_rw(),
            status,
            version,
        })
    }
}

fn check_deadline(deadline: Instant) -> Result<(), HandshakeError> {
    if Instant::now() >= deadline {
        return Err(HandshakeError::Timeout);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aster_net_primitives::{
        B256, BlockRef, Capabilities, ChainId, Message, NetAddress, PeerAddress, PeerRole,
        SubProtocol,
    };
    use assert_matches::assert_matches;
    use tokio_test::io::Builder;

    use crate::{LocalStatus, MAGIC_MAIN, MAGIC_TEST, StatusProvider};

    const TTL: Duration = Duration::from_secs(5);

    fn status(name: &[u8], chain: &str, genesis: B256) -> Status {
        Status {
            chain_id: ChainId::from_name(chain),
            sender: PeerAddress {
                id: PeerId::from_public_key(name),
                addr: NetAddress::new("127.0.0.1", 7846),
            },
            best_block: BlockRef::default(),
            genesis,
            capabilities: Capabilities::NONE,
            role: PeerRole::Watcher,
            version: "0.1.0".into(),
        }
    }

    fn handshaker(status: Status, versions: &[P2PVersion]) -> WireHandshaker {
        let local_id = status.sender.id;
        let provider: Arc<dyn StatusProvider> = Arc::new(LocalStatus::new(status));
        let versions = Arc::new(VersionManager::new(versions.to_vec(), provider));
        WireHandshaker::new(MAGIC_MAIN, local_id, versions)
    }

    fn all_versions() -> Vec<P2PVersion> {
        vec![P2PVersion::V032, P2PVersion::V031, P2PVersion::V030]
    }

    #[tokio::test]
    async fn test_handshake_and_exchange() {
        let a = status(b"a", "aster.test", B256::ZERO);
        let b = status(b"b", "aster.test", B256::ZERO);
        let (a_id, b_id) = (a.sender.id, b.sender.id);
        let dialer = handshaker(a, &all_versions());
        let listener = handshaker(b, &[P2PVersion::V031, P2PVersion::V032]);
        let (out_stream, in_stream) = tokio::io::duplex(4096);

        let (out, inb) = tokio::join!(
            dialer.handshake(Box::new(out_stream), Direction::Outbound, Some(b_id), TTL),
            listener.handshake(Box::new(in_stream), Direction::Inbound, None, TTL),
        );
        let mut out = out.unwrap();
        let mut inb = inb.unwrap();

        assert_eq!(out.status.sender.id, b_id);
        assert_eq!(inb.status.sender.id, a_id);
        assert_eq!(out.version, P2PVersion::V032);
        assert_eq!(inb.version, P2PVersion::V032);

        let msg = Message::new(SubProtocol::PING_REQUEST, &b"hello"[..]);
        out.msg_rw.write_msg(&msg).await.unwrap();
        assert_eq!(inb.msg_rw.read_msg().await.unwrap(), msg);
    }

    #[tokio::test]
    async fn test_chain_mismatch_sends_go_away() {
        let dialer = handshaker(status(b"a", "aster.main", B256::ZERO), &all_versions());
        let listener = handshaker(status(b"b", "aster.test", B256::ZERO), &all_versions());
        let (out_stream, in_stream) = tokio::io::duplex(4096);

        let (out, inb) = tokio::join!(
            dialer.handshake(Box::new(out_stream), Direction::Outbound, None, TTL),
            listener.handshake(Box::new(in_stream), Direction::Inbound, None, TTL),
        );

        assert_matches!(inb, Err(HandshakeError::ChainMismatch { .. }));
        assert_matches!(out, Err(HandshakeError::RemoteGoAway(reason)) if reason.contains("Chain mismatch"));
    }

    #[tokio::test]
    async fn test_genesis_mismatch_on_v032() {
        let dialer = handshaker(status(b"a", "aster.test", B256::ZERO), &[P2PVersion::V032]);
        let listener = handshaker(
            status(b"b", "aster.test", B256::repeat_byte(1)),
            &[P2PVersion::V032],
        );
        let (out_stream, in_stream) = tokio::io::duplex(4096);

        let (out, inb) = tokio::join!(
            dialer.handshake(Box::new(out_stream), Direction::Outbound, None, TTL),
            listener.handshake(Box::new(in_stream), Direction::Inbound, None, TTL),
        );

        assert_matches!(inb, Err(HandshakeError::GenesisMismatch));
        assert_matches!(out, Err(HandshakeError::RemoteGoAway(_)));
    }

    #[tokio::test]
    async fn test_v030_ignores_genesis() {
        let dialer = handshaker(status(b"a", "aster.test", B256::ZERO), &[P2PVersion::V030]);
        let listener = handshaker(
            status(b"b", "aster.test", B256::repeat_byte(1)),
            &all_versions(),
        );
        let (out_stream, in_stream) = tokio::io::duplex(4096);

        let (out, inb) = tokio::join!(
            dialer.handshake(Box::new(out_stream), Direction::Outbound, None, TTL),
            listener.handshake(Box::new(in_stream), Direction::Inbound, None, TTL),
        );

        assert_eq!(out.unwrap().version, P2PVersion::V030);
        assert_eq!(inb.unwrap().version, P2PVersion::V030);
    }

    #[tokio::test]
    async fn test_bad_magic() {
        let listener = handshaker(status(b"b", "aster.test", B256::ZERO), &all_versions());
        let (mut out_stream, in_stream) = tokio::io::duplex(64);
        out_stream
            .write_all(&HsHeader::new(MAGIC_TEST, P2PVersion::V032).encode())
            .await
            .unwrap();

        assert_matches!(
            listener
                .handshake(Box::new(in_stream), Direction::Inbound, None, TTL)
                .await,
            Err(HandshakeError::BadMagic { got, .. }) if got == MAGIC_TEST
        );
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let listener = handshaker(status(b"b", "aster.test", B256::ZERO), &[P2PVersion::V032]);
        let (mut out_stream, in_stream) = tokio::io::duplex(64);
        out_stream
            .write_all(&HsHeader::new(MAGIC_MAIN, P2PVersion::V030).encode())
            .await
            .unwrap();

        assert_matches!(
            listener
                .handshake(Box::new(in_stream), Direction::Inbound, None, TTL)
                .await,
            Err(HandshakeError::UnsupportedVersion(v)) if v == P2PVersion::V030
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_remote_times_out() {
        let listener = handshaker(status(b"b", "aster.test", B256::ZERO), &all_versions());
        let (_out_stream, in_stream) = tokio::io::duplex(64);

        assert_matches!(
            listener
                .handshake(Box::new(in_stream), Direction::Inbound, None, TTL)
                .await,
            Err(HandshakeError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_outbound_short_header_write() {
        let dialer = handshaker(status(b"a", "aster.test", B256::ZERO), &all_versions());
        let header = HsHeader::new(MAGIC_MAIN, P2PVersion::V032).encode();
        let (head, _) = header.split_at(4);
        let stream = Builder::new().write(head).build();

        assert_matches!(
            dialer
                .handshake(Box::new(stream), Direction::Outbound, None, TTL)
                .await,
            Err(HandshakeError::ShortWrite { written: 4, expected: 8 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_header_write_times_out() {
        let dialer = handshaker(status(b"a", "aster.test", B256::ZERO), &all_versions());
        let stream = Builder::new().wait(TTL * 2).build();

        assert_matches!(
            dialer
                .handshake(Box::new(stream), Direction::Outbound, None, TTL)
                .await,
            Err(HandshakeError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_self_connection_rejected() {
        let me = status(b"same", "aster.test", B256::ZERO);
        let dialer = handshaker(me.clone(), &all_versions());
        let listener = handshaker(me, &all_versions());
        let (out_stream, in_stream) = tokio::io::duplex(4096);

        let (out, inb) = tokio::join!(
            dialer.handshake(Box::new(out_stream), Direction::Outbound, None, TTL),
            listener.handshake(Box::new(in_stream), Direction::Inbound, None, TTL),
        );

        assert_matches!(out, Err(HandshakeError::SelfConnection));
        assert_matches!(inb, Err(HandshakeError::SelfConnection));
    }

    #[tokio::test]
    async fn test_peer_id_mismatch() {
        let dialer = handshaker(status(b"a", "aster.test", B256::ZERO), &all_versions());
        let listener = handshaker(status(b"b", "aster.test", B256::ZERO), &all_versions());
        let wrong = PeerId::from_public_key(b"c");
        let (out_stream, in_stream) = tokio::io::duplex(4096);

        let (out, _inb) = tokio::join!(
            dialer.handshake(Box::new(out_stream), Direction::Outbound, Some(wrong), TTL),
            listener.handshake(Box::new(in_stream), Direction::Inbound, None, TTL),
        );

        assert_matches!(out, Err(HandshakeError::PeerIdMismatch { expected, .. }) if expected == wrong);
    }
}
