//! Handshake over real TCP sockets.

use std::{sync::Arc, time::Duration};

use aster_net_handshake::{
    HandshakeError, LocalStatus, MAGIC_TEST, StatusProvider, VersionManager, WireHandshaker,
};
use aster_net_primitives::{
    B256, BlockRef, Capabilities, ChainId, Direction, Message, NetAddress, P2PVersion, PeerAddress,
    PeerId, PeerRole, Status, SubProtocol,
};
use assert_matches::assert_matches;
use tokio::net::{TcpListener, TcpStream};

fn node(name: &[u8], versions: &[P2PVersion]) -> (WireHandshaker, Arc<LocalStatus>) {
    let id = PeerId::from_public_key(name);
    let status = Arc::new(LocalStatus::new(Status {
        chain_id: ChainId::from_name("aster.test"),
        sender: PeerAddress {
            id,
            addr: NetAddress::new("127.0.0.1", 0),
        },
        best_block: BlockRef::default(),
        genesis: B256::repeat_byte(0xaa),
        capabilities: Capabilities::FULL_SYNC,
        role: PeerRole::BlockProducer,
        version: "0.1.0".into(),
    }));
    let provider: Arc<dyn StatusProvider> = status.clone();
    let versions = Arc::new(VersionManager::new(versions.to_vec(), provider));
    (WireHandshaker::new(MAGIC_TEST, id, versions), status)
}

#[tokio::test]
async fn test_tcp_handshake_carries_latest_status() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (server, _) = node(b"server", &[P2PVersion::V032, P2PVersion::V031]);
    let (client, client_status) = node(b"client", &[P2PVersion::V031]);
    client_status.update_best_block(BlockRef {
        hash: B256::repeat_byte(3),
        number: 99,
    });

    let accept = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        server
            .handshake(
                Box::new(socket),
                Direction::Inbound,
                None,
                Duration::from_secs(5),
            )
            .await
    });

    let socket = TcpStream::connect(addr).await.unwrap();
    let mut outbound = client
        .handshake(
            Box::new(socket),
            Direction::Outbound,
            Some(PeerId::from_public_key(b"server")),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    let mut inbound = accept.await.unwrap().unwrap();

    assert_eq!(inbound.version, P2PVersion::V031);
    assert_eq!(inbound.status.best_block.number, 99);
    assert_eq!(inbound.status.role, PeerRole::BlockProducer);
    assert_eq!(outbound.status.sender.id, PeerId::from_public_key(b"server"));

    let notice = Message::with_body(
        SubProtocol::NEW_BLOCK_NOTICE,
        &BlockRef {
            hash: B256::repeat_byte(4),
            number: 100,
        },
    )
    .unwrap();
    inbound.msg_rw.write_msg(&notice).await.unwrap();
    let received = outbound.msg_rw.read_msg().await.unwrap();
    assert_eq!(received.body::<BlockRef>().unwrap().number, 100);
}

#[tokio::test]
async fn test_tcp_remote_closes_during_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (server, _) = node(b"server", &[P2PVersion::V032]);

    let accept = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        server
            .handshake(
                Box::new(socket),
                Direction::Inbound,
                None,
                Duration::from_secs(5),
            )
            .await
    });

    drop(TcpStream::connect(addr).await.unwrap());

    assert_matches!(
        accept.await.unwrap(),
        Err(HandshakeError::ConnectionClosed | HandshakeError::Transport(_))
    );
}
