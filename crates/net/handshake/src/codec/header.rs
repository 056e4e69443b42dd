use aster_net_primitives::P2PVersion;
use byteorder::{BigEndian, ByteOrder};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::HandshakeError;

/// Encoded size of [`HsHeader`].
pub const HEADER_LEN: usize = 8;

/// Magic of the main network.
pub const MAGIC_MAIN: u32 = 0x4741_6841;
/// Magic of test networks.
pub const MAGIC_TEST: u32 = 0x2e41_5429;

/// Preamble written by the dialling side before anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsHeader {
    pub magic: u32,
    pub version: P2PVersion,
}

impl HsHeader {
    pub fn new(magic: u32, version: P2PVersion) -> Self {
        Self { magic, version }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        let (magic, version) = buf.split_at_mut(4);
        BigEndian::write_u32(magic, self.magic);
        BigEndian::write_u32(version, self.version.as_u32());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        let (magic, version) = buf.split_at(4);
        Self {
            magic: BigEndian::read_u32(magic),
            version: P2PVersion::from_u32(BigEndian::read_u32(version)),
        }
    }
}

/// Read exactly [`HEADER_LEN`] bytes, accumulating partial reads.
///
/// End of stream before the header is complete yields
/// [`HandshakeError::ConnectionClosed`].
pub async fn read_header<R>(rd: &mut R) -> Result<HsHeader, HandshakeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; HEADER_LEN];
    let mut filled = 0;
    while let Some(rest) = buf.get_mut(filled..).filter(|rest| !rest.is_empty()) {
        let read = rd.read(rest).await?;
        if read == 0 {
            return Err(HandshakeError::ConnectionClosed);
        }
        filled += read;
    }
    Ok(HsHeader::decode(&buf))
}
