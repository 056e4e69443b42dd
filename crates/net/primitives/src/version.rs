//! Wire protocol version identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Protocol version carried in the handshake header.
///
/// Encoded as `0x0000_MMmm` where `MM` is the minor and `mm` the patch of a `v0.MM.mm`
/// version. Unrecognised values decode fine and are rejected during negotiation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct P2PVersion(u32);

impl P2PVersion {
    pub const UNKNOWN: Self = Self(0);
    pub const V030: Self = Self(0x0000_0300);
    pub const V031: Self = Self(0x0000_0301);
    pub const V032: Self = Self(0x0000_0302);

    pub const fn from_u32(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn is_unknown(self) -> bool {
        self.0 == Self::UNKNOWN.0
    }
}

impl fmt::Display for P2PVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            return f.write_str("unknown");
        }
        write!(f, "v0.{}.{}", (self.0 >> 8) & 0xff, self.0 & 0xff)
    }
}

impl fmt::Debug for P2PVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P2PVersion({self}, {:#010x})", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid protocol version {0:?}, expected v0.<minor>.<patch>")]
pub struct P2PVersionParseError(String);

impl FromStr for P2PVersion {
    type Err = P2PVersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || P2PVersionParseError(s.to_string());
        let trimmed = s.strip_prefix('v').unwrap_or(s);
        let mut parts = trimmed.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(err());
        };
        if major != "0" {
            return Err(err());
        }
        let minor: u8 = minor.parse().map_err(|_| err())?;
        let patch: u8 = patch.parse().map_err(|_| err())?;
        Ok(Self((u32::from(minor) << 8) | u32::from(patch)))
    }
}

impl TryFrom<String> for P2PVersion {
    type Error = P2PVersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<P2PVersion> for String {
    fn from(value: P2PVersion) -> Self {
        value.to_string()
    }
}
