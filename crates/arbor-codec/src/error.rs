use arbor_types::TypeError;

/// Decode and encode failures. Every variant is a format error: the bytes do
/// not have the canonical shape for the object being read or written.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// A blob metadata record was not exactly 28 bytes.
    #[error("blob metadata has unexpected size {actual} (expected {expected})")]
    InvalidMetadataLength { expected: usize, actual: usize },

    /// The `"<kind> <len>\0"` object header is missing or malformed.
    #[error("malformed {kind} header: {reason}")]
    MalformedHeader { kind: &'static str, reason: String },

    /// The header's declared length disagrees with the body.
    #[error("{kind} declares {declared} bytes but has {actual}")]
    LengthMismatch {
        kind: &'static str,
        declared: u64,
        actual: u64,
    },

    /// A tree entry could not be parsed.
    #[error("malformed tree entry at offset {offset}: {reason}")]
    MalformedTreeEntry { offset: usize, reason: String },

    /// Two entries of one tree share a name.
    #[error("duplicate tree entry name {0:?}")]
    DuplicateEntryName(String),

    /// A tree entry carried a mode this store does not model.
    #[error("unsupported tree entry mode {mode:?} at offset {offset}")]
    InvalidMode { offset: usize, mode: String },

    /// A name or hash inside an object failed validation.
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Convenience alias used throughout the codec crate.
pub type Result<T> = std::result::Result<T, CodecError>;
