use arbor_types::{BlobMetadata, Hash};

use crate::error::{CodecError, Result};

/// Fixed-width on-disk form of [`BlobMetadata`].
///
/// ```text
/// [8 bytes: content length (big-endian u64)]
/// [20 bytes: SHA-1 of the raw contents]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerializedBlobMetadata {
    data: [u8; Self::SIZE],
}

impl SerializedBlobMetadata {
    /// Encoded record size in bytes.
    pub const SIZE: usize = 8 + Hash::RAW_SIZE;

    pub fn new(metadata: &BlobMetadata) -> Self {
        Self::serialize(&metadata.content_hash, metadata.size)
    }

    pub fn serialize(content_hash: &Hash, size: u64) -> Self {
        let mut data = [0u8; Self::SIZE];
        data[..8].copy_from_slice(&size.to_be_bytes());
        data[8..].copy_from_slice(content_hash.as_bytes());
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Decode a stored record. Anything other than exactly [`Self::SIZE`]
    /// bytes is rejected without attempting a partial read.
    pub fn parse(bytes: &[u8]) -> Result<BlobMetadata> {
        if bytes.len() != Self::SIZE {
            return Err(CodecError::InvalidMetadataLength {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        let (size, hash) = bytes.split_at(8);
        let mut size_be = [0u8; 8];
        size_be.copy_from_slice(size);
        Ok(BlobMetadata::new(
            Hash::from_slice(hash)?,
            u64::from_be_bytes(size_be),
        ))
    }
}
