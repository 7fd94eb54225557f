use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::TypeError;

/// Content identifier for any stored object.
///
/// A `Hash` is the SHA-1 digest of an object's canonical encoding. Identical
/// encodings always produce the same `Hash`, so writing the same object twice
/// lands on the same key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 20]);

impl Hash {
    /// Width of the raw digest in bytes.
    pub const RAW_SIZE: usize = 20;

    /// SHA-1 of a contiguous buffer.
    pub fn sha1(data: &[u8]) -> Self {
        Self::sha1_ranges([data])
    }

    /// SHA-1 over a sequence of byte ranges, in order.
    ///
    /// Equivalent to hashing the concatenation of the ranges, without
    /// building it.
    pub fn sha1_ranges<I>(ranges: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut hasher = Sha1::new();
        for range in ranges {
            hasher.update(range.as_ref());
        }
        Self(hasher.finalize().into())
    }

    /// Create a `Hash` from a pre-computed digest.
    pub const fn from_raw(raw: [u8; 20]) -> Self {
        Self(raw)
    }

    /// Copy a `Hash` out of a byte slice that must be exactly 20 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let raw: [u8; 20] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::RAW_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(raw))
    }

    /// The all-zero hash. Never produced by SHA-1 in practice; used as a
    /// placeholder in fixtures.
    pub const fn zero() -> Self {
        Self([0u8; 20])
    }

    /// Returns `true` if this is the all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// The raw 20-byte digest. This is also the backend key.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a 40-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 20]> for Hash {
    fn from(raw: [u8; 20]) -> Self {
        Self(raw)
    }
}

impl From<Hash> for [u8; 20] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
