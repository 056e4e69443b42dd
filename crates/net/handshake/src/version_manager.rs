use std::sync::Arc;

use aster_net_primitives::P2PVersion;
use tokio::time::Instant;

use crate::{
    BoxedStream, HandshakeContext, HandshakeError, StatusProvider, V030Handshaker,
    V032Handshaker, VersionedHandshaker,
};

type BuildFn = fn(HandshakeContext, BoxedStream) -> Box<dyn VersionedHandshaker>;

fn build_v032(ctx: HandshakeContext, stream: BoxedStream) -> Box<dyn VersionedHandshaker> {
    Box::new(V032Handshaker::new(ctx, stream))
}

fn build_v031(ctx: HandshakeContext, stream: BoxedStream) -> Box<dyn VersionedHandshaker> {
    Box::new(V030Handshaker::new(P2PVersion::V031, ctx, stream))
}

fn build_v030(ctx: HandshakeContext, stream: BoxedStream) -> Box<dyn VersionedHandshaker> {
    Box::new(V030Handshaker::new(P2PVersion::V030, ctx, stream))
}

/// Every version this build can speak, with its constructor.
static HANDSHAKERS: &[(P2PVersion, BuildFn)] = &[
    (P2PVersion::V032, build_v032),
    (P2PVersion::V031, build_v031),
    (P2PVersion::V030, build_v030),
];

fn constructor(version: P2PVersion) -> Option<BuildFn> {
    HANDSHAKERS
        .iter()
        .find(|(v, _)| *v == version)
        .map(|(_, build)| *build)
}

/// Chooses the protocol version for a connection and builds its handshaker.
pub struct VersionManager {
    /// Locally accepted versions, most preferred first.
    accepted: Vec<P2PVersion>,
    status: Arc<dyn StatusProvider>,
}

impl VersionManager {
    /// Versions without a registered constructor are dropped from `accepted`.
    pub fn new(accepted: Vec<P2PVersion>, status: Arc<dyn StatusProvider>) -> Self {
        let accepted = accepted.into_iter().filter(|v| Self::is_supported(*v)).collect();
        Self { accepted, status }
    }

    /// Whether a handshaker exists for `version`.
    pub fn is_supported(version: P2PVersion) -> bool {
        constructor(version).is_some()
    }

    pub fn accepted(&self) -> &[P2PVersion] {
        &self.accepted
    }

    /// Version offered when dialling.
    pub fn preferred(&self) -> Option<P2PVersion> {
        self.accepted.first().copied()
    }

    /// First locally accepted version that the remote also offers, or
    /// [`P2PVersion::UNKNOWN`].
    pub fn select_version(&self, offered: &[P2PVersion]) -> P2PVersion {
        self.accepted
            .iter()
            .find(|v| offered.contains(v))
            .copied()
            .unwrap_or(P2PVersion::UNKNOWN)
    }

    pub fn build(
        &self,
        version: P2PVersion,
        deadline: Instant,
        stream: BoxedStream,
    ) -> Result<Box<dyn VersionedHandshaker>, HandshakeError> {
        let build = self
            .accepted
            .contains(&version)
            .then(|| constructor(version))
            .flatten()
            .ok_or(HandshakeError::UnsupportedVersion(version))?;
        let ctx = HandshakeContext {
            status: self.status.clone(),
            deadline,
        };
        Ok(build(ctx, stream))
    }
}

impl std::fmt::Debug for VersionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionManager")
            .field("accepted", &self.accepted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aster_net_primitives::{
        B256, BlockRef, Capabilities, ChainId, NetAddress, PeerAddress, PeerId, PeerRole, Status,
    };
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    use crate::LocalStatus;

    fn status() -> Arc<dyn StatusProvider> {
        Arc::new(LocalStatus::new(Status {
            chain_id: ChainId::from_name("aster.test"),
            sender: PeerAddress {
                id: PeerId::from_public_key(b"local"),
                addr: NetAddress::new("127.0.0.1", 7846),
            },
            best_block: BlockRef::default(),
            genesis: B256::ZERO,
            capabilities: Capabilities::NONE,
            role: PeerRole::Watcher,
            version: "0.1.0".into(),
        }))
    }

    fn manager(accepted: &[P2PVersion]) -> VersionManager {
        VersionManager::new(accepted.to_vec(), status())
    }

    #[test]
    fn test_select_prefers_local_order() {
        let vm = manager(&[P2PVersion::V032, P2PVersion::V031, P2PVersion::V030]);
        assert_eq!(
            vm.select_version(&[P2PVersion::V030, P2PVersion::V031]),
            P2PVersion::V031
        );
        assert_eq!(vm.select_version(&[P2PVersion::V030]), P2PVersion::V030);
    }

    #[test]
    fn test_select_no_overlap_is_unknown() {
        let vm = manager(&[P2PVersion::V032]);
        assert_eq!(
            vm.select_version(&[P2PVersion::V030, P2PVersion::from_u32(0x0400)]),
            P2PVersion::UNKNOWN
        );
        assert_eq!(vm.select_version(&[]), P2PVersion::UNKNOWN);
    }

    #[test]
    fn test_unregistered_versions_dropped() {
        let vm = manager(&[P2PVersion::from_u32(0x0999), P2PVersion::V030]);
        assert_eq!(vm.accepted(), &[P2PVersion::V030]);
        assert_eq!(vm.preferred(), Some(P2PVersion::V030));
    }

    #[tokio::test]
    async fn test_build_dispatch() {
        let vm = manager(&[P2PVersion::V032, P2PVersion::V031, P2PVersion::V030]);
        for version in [P2PVersion::V032, P2PVersion::V031, P2PVersion::V030] {
            let (stream, _peer) = tokio::io::duplex(64);
            let hs = vm
                .build(version, Instant::now(), Box::new(stream))
                .unwrap();
            assert_eq!(hs.version(), version);
        }
    }

    #[tokio::test]
    async fn test_build_unknown_version_fails() {
        let vm = manager(&[P2PVersion::V030]);
        let (stream, _peer) = tokio::io::duplex(64);
        assert_matches!(
            vm.build(P2PVersion::V032, Instant::now(), Box::new(stream)).err(),
            Some(HandshakeError::UnsupportedVersion(v)) if v == P2PVersion::V032
        );
    }

    proptest! {
        #[test]
        fn prop_selection_is_first_local_match(offered in prop::collection::vec(0x02ffu32..0x0304, 0..6)) {
            let local = [P2PVersion::V032, P2PVersion::V031, P2PVersion::V030];
            let vm = manager(&local);
            let offered: Vec<_> = offered.into_iter().map(P2PVersion::from_u32).collect();

            let selected = vm.select_version(&offered);
            match local.iter().position(|v| offered.contains(v)) {
                Some(idx) => prop_assert_eq!(Some(&selected), local.get(idx)),
                None => prop_assert!(selected.is_unknown()),
            }
        }
    }
}
