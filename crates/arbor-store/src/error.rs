use arbor_codec::CodecError;
use arbor_types::Hash;

use crate::keyspace::KeySpace;

/// Errors from store operations.
///
/// A key that is not present is never an error; lookups report it as a
/// missing [`StoreResult`](crate::StoreResult) or `None`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A stored value did not have the canonical shape for its keyspace.
    #[error("failed to decode {key_space} entry {id}: {source}")]
    Decode {
        key_space: KeySpace,
        id: Hash,
        #[source]
        source: CodecError,
    },

    /// An object could not be put into canonical form for writing.
    #[error("failed to encode object: {0}")]
    Encode(#[from] CodecError),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The on-disk log holds a frame that passed its checksum but cannot be
    /// parsed.
    #[error("corrupt log at offset {offset}: {reason}")]
    CorruptLog { offset: u64, reason: String },

    /// Storage backend is read-only or otherwise refusing writes.
    #[error("store is read-only")]
    ReadOnly,

    /// A lookup deferred to the executor panicked or was cancelled.
    #[error("deferred lookup failed: {0}")]
    TaskFailed(String),

    /// The store configuration could not be loaded or applied.
    #[error("invalid store configuration: {0}")]
    Config(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
