//! TCP implementation of [`NetworkTransport`] and the inbound accept loop.

use std::time::Duration;

use async_trait::async_trait;
use aster_net_handshake::BoxedStream;
use aster_net_primitives::NetAddress;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::{NetworkTransport, PeerManager, PeerManagerConfig, PeerManagerError};

/// Dials peers over plain TCP.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Connect deadline taken from `dial_timeout_secs`.
    pub fn from_config(config: &PeerManagerConfig) -> Self {
        Self::new(config.dial_timeout())
    }
}

#[async_trait]
impl NetworkTransport for TcpTransport {
    async fn dial(&self, addr: &NetAddress) -> Result<BoxedStream, PeerManagerError> {
        let connect = TcpStream::connect((addr.host.as_str(), addr.port));
        let stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect to {addr} timed out"),
                )
            })??;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// Feed every accepted socket into `manager` until it stops.
pub async fn serve_inbound(listener: TcpListener, manager: PeerManager) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "accepting inbound peers");
    loop {
        tokio::select! {
            _ = manager.wait_stopped() => break,
            accepted = listener.accept() => {
                let (socket, remote) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                if let Err(e) = socket.set_nodelay(true) {
                    debug!(%remote, error = %e, "set_nodelay failed");
                }
                match manager.on_connect(Box::new(socket), Some(remote)) {
                    Ok(()) => {}
                    Err(PeerManagerError::NotRunning) => break,
                    Err(e) => debug!(%remote, error = %e, "inbound connection dropped"),
                }
            }
        }
    }
    debug!("inbound accept loop exited");
    Ok(())
}
