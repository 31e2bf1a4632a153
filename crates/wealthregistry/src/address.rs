use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const ADDRESS_LEN: usize = 20;

/// Stable external participant identity (account address).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| anyhow!("bad address {s:?}: {e}"))?;
        if bytes.len() != ADDRESS_LEN {
            bail!("address {s:?} is {} bytes, expected {ADDRESS_LEN}", bytes.len());
        }
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

// Hex string in human-readable formats (JSON scenario files), raw bytes on
// the wire.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.collect_str(self)
        } else {
            self.0.serialize(s)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        use serde::de::Error as DeError;

        if d.is_human_readable() {
            let s = String::deserialize(d)?;
            s.parse().map_err(D::Error::custom)
        } else {
            <[u8; ADDRESS_LEN]>::deserialize(d).map(Self)
        }
    }
}

/// Identity of whoever issued the current call, as established by the
/// hosting environment's authentication. The registry never accepts a
/// caller-chosen identity for writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller {
    address: Address,
}

impl Caller {
    /// Only the authenticating layer should call this.
    pub fn authenticated(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Address {
        self.address
    }
}
