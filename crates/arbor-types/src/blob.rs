use bytes::{Bytes, BytesMut};

use crate::hash::Hash;

/// File contents, identified by the hash it was imported under.
///
/// The contents are a list of shared byte chunks rather than one buffer so
/// that data arriving in pieces (network reads, decoded pack entries) can be
/// stored without first being concatenated. Chunks are reference-counted;
/// cloning a `Blob` never copies content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    hash: Hash,
    chunks: Vec<Bytes>,
}

impl Blob {
    /// Create a blob from a single contiguous buffer.
    pub fn new(hash: Hash, contents: impl Into<Bytes>) -> Self {
        Self {
            hash,
            chunks: vec![contents.into()],
        }
    }

    /// Create a blob from an ordered list of chunks.
    ///
    /// Empty chunks are dropped; they contribute nothing to the contents.
    pub fn from_chunks(hash: Hash, chunks: Vec<Bytes>) -> Self {
        let chunks = chunks.into_iter().filter(|c| !c.is_empty()).collect();
        Self { hash, chunks }
    }

    /// The hash this blob is stored under.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// The content chunks, in order.
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// Iterate over the content as borrowed byte ranges.
    pub fn ranges(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.chunks.iter().map(|c| c.as_ref())
    }

    /// Total content length across all chunks.
    pub fn len(&self) -> u64 {
        self.chunks.iter().map(|c| c.len() as u64).sum()
    }

    /// Returns `true` if the blob has no content.
    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(|c| c.is_empty())
    }

    /// The contents as one buffer. Free when the blob has a single chunk.
    pub fn contents(&self) -> Bytes {
        match self.chunks.as_slice() {
            [] => Bytes::new(),
            [single] => single.clone(),
            many => {
                let mut buf = BytesMut::with_capacity(self.len() as usize);
                for chunk in many {
                    buf.extend_from_slice(chunk);
                }
                buf.freeze()
            }
        }
    }
}
