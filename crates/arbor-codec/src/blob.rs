use arbor_types::{Blob, BlobMetadata, Hash};
use bytes::Bytes;

use crate::error::Result;
use crate::hasher::ContentHasher;

/// A blob in stored form: the git `"blob <len>\0"` prefix followed by the
/// blob's own chunks, plus the metadata computed from the raw contents.
///
/// The chunks are shared with the source blob, so encoding never copies
/// content. Backends receive the value as ordered ranges through
/// [`EncodedBlob::ranges`].
#[derive(Clone, Debug)]
pub struct EncodedBlob {
    metadata: BlobMetadata,
    prefix: Vec<u8>,
    body: Vec<Bytes>,
}

impl EncodedBlob {
    /// Size and SHA-1 of the raw contents (the prefix is not included).
    pub fn metadata(&self) -> &BlobMetadata {
        &self.metadata
    }

    /// The stored value as ordered ranges, prefix first.
    pub fn ranges(&self) -> impl Iterator<Item = &[u8]> + '_ {
        std::iter::once(self.prefix.as_slice()).chain(self.body.iter().map(|c| c.as_ref()))
    }

    /// Number of ranges, including the prefix.
    pub fn range_count(&self) -> usize {
        1 + self.body.len()
    }

    /// Total stored length in bytes.
    pub fn stored_len(&self) -> usize {
        usize::try_from(self.metadata.size)
            .unwrap_or(usize::MAX)
            .saturating_add(self.prefix.len())
    }
}

/// Encode a blob for storage.
pub fn encode_blob(blob: &Blob) -> EncodedBlob {
    let size = blob.len();
    let content_hash = Hash::sha1_ranges(blob.ranges());
    EncodedBlob {
        metadata: BlobMetadata::new(content_hash, size),
        prefix: ContentHasher::BLOB.header(size),
        body: blob.chunks().to_vec(),
    }
}

/// Decode a stored blob value fetched under `id`.
///
/// The returned blob shares `data`'s allocation; only the header is skipped.
pub fn decode_blob(id: Hash, data: Bytes) -> Result<Blob> {
    let body_len = ContentHasher::BLOB.split_header(&data)?.len();
    let offset = data.len() - body_len;
    Ok(Blob::new(id, data.slice(offset..)))
}
