use arbor_types::Hash;

use crate::error::{CodecError, Result};

/// Git object hasher for one object kind.
///
/// Each hasher carries the git type tag (`"blob"`, `"tree"`) that is written
/// into the object header and covered by the object id. A blob and a tree
/// with identical bodies therefore get different ids.
pub struct ContentHasher {
    kind: &'static str,
}

impl ContentHasher {
    /// Hasher for blob objects.
    pub const BLOB: Self = Self { kind: "blob" };
    /// Hasher for tree objects.
    pub const TREE: Self = Self { kind: "tree" };

    /// The git type tag used by this hasher.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// The object header for a body of `len` bytes: `"<kind> <len>\0"`.
    pub fn header(&self, len: u64) -> Vec<u8> {
        let mut header = format!("{} {}", self.kind, len).into_bytes();
        header.push(0);
        header
    }

    /// Git object id of a body: SHA-1 over header and body.
    pub fn hash(&self, body: &[u8]) -> Hash {
        self.hash_ranges([body])
    }

    /// Git object id of a body supplied as ordered ranges.
    pub fn hash_ranges<'a, I>(&self, ranges: I) -> Hash
    where
        I: IntoIterator<Item = &'a [u8]>,
        I::IntoIter: Clone,
    {
        let ranges = ranges.into_iter();
        let len: u64 = ranges.clone().map(|r| r.len() as u64).sum();
        let header = self.header(len);
        // Re-borrow the ranges so both halves of the chain share a lifetime.
        Hash::sha1_ranges(std::iter::once(header.as_slice()).chain(ranges.map(|r| r)))
    }

    /// Verify that a body produces the expected object id.
    pub fn verify(&self, body: &[u8], expected: &Hash) -> bool {
        self.hash(body) == *expected
    }

    /// SHA-1 of raw bytes, without any header. This is the content digest
    /// kept in blob metadata.
    pub fn raw_hash(data: &[u8]) -> Hash {
        Hash::sha1(data)
    }

    /// Strip the object header from stored bytes and return the body.
    ///
    /// Fails unless the header names this hasher's kind, the length is plain
    /// decimal, and exactly that many bytes follow the NUL.
    pub fn split_header<'a>(&self, data: &'a [u8]) -> Result<&'a [u8]> {
        let malformed = |reason: &str| CodecError::MalformedHeader {
            kind: self.kind,
            reason: reason.to_string(),
        };

        let nul = data
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| malformed("missing NUL terminator"))?;
        let header = &data[..nul];
        let body = &data[nul + 1..];

        let rest = header
            .strip_prefix(self.kind.as_bytes())
            .and_then(|r| r.strip_prefix(b" "))
            .ok_or_else(|| malformed("unexpected object type"))?;
        if rest.is_empty() || !rest.iter().all(u8::is_ascii_digit) {
            return Err(malformed("length is not a decimal number"));
        }
        // All-digit ASCII is valid UTF-8.
        let declared: u64 = std::str::from_utf8(rest)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| malformed("length out of range"))?;

        if declared != body.len() as u64 {
            return Err(CodecError::LengthMismatch {
                kind: self.kind,
                declared,
                actual: body.len() as u64,
            });
        }
        Ok(body)
    }
}
