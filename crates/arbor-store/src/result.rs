use bytes::Bytes;

/// Outcome of a raw lookup: the stored bytes, or nothing.
///
/// Absence is a normal result. Backends hand out owned (reference-counted)
/// buffers, so a `StoreResult` stays valid after the backend moves on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreResult(Option<Bytes>);

impl StoreResult {
    pub fn found(value: Bytes) -> Self {
        Self(Some(value))
    }

    pub fn missing() -> Self {
        Self(None)
    }

    /// Returns `true` if the key was present.
    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    /// Borrow the stored bytes, if present.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }

    /// Take the stored buffer, if present.
    pub fn into_bytes(self) -> Option<Bytes> {
        self.0
    }
}

impl From<Option<Bytes>> for StoreResult {
    fn from(value: Option<Bytes>) -> Self {
        Self(value)
    }
}
