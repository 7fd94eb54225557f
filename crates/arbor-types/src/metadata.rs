use serde::{Deserialize, Serialize};

use crate::hash::Hash;

/// Cached facts about a blob, stored apart from its contents so that size
/// and digest queries never load the blob itself.
///
/// `content_hash` is the SHA-1 of the raw contents only. It differs from the
/// blob's storage key, which may be an upstream identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub content_hash: Hash,
    pub size: u64,
}

impl BlobMetadata {
    pub fn new(content_hash: Hash, size: u64) -> Self {
        Self { content_hash, size }
    }
}
