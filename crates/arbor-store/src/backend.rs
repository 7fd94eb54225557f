use std::ops::Range;

use bytes::Bytes;

use crate::error::Result;
use crate::keyspace::KeySpace;
use crate::result::StoreResult;

/// Raw key-value capability the store engine is built on.
///
/// Keys and values are opaque bytes, partitioned by [`KeySpace`]. The engine
/// never looks past this trait, so any backend that can honour these
/// contracts can carry the store:
///
/// - `get` of an absent key returns a missing [`StoreResult`], not an error.
/// - `commit` applies a whole [`RawBatch`] or none of it. A reader must never
///   observe part of a batch.
/// - `clear_key_space` and `compact_key_space` touch only the named keyspace
///   as far as callers can observe.
/// - All I/O errors are propagated, never silently ignored or retried.
pub trait KeyValueBackend: Send + Sync + 'static {
    /// Look up one key.
    fn get(&self, key_space: KeySpace, key: &[u8]) -> Result<StoreResult>;

    /// Look up several keys, one result per key, in order.
    ///
    /// Default implementation calls `get()` for each key. Backends may
    /// override for better performance (e.g., a multi-get).
    fn get_batch(&self, key_space: KeySpace, keys: &[&[u8]]) -> Result<Vec<StoreResult>> {
        keys.iter().map(|key| self.get(key_space, key)).collect()
    }

    /// Check whether a key exists without fetching its value.
    fn has_key(&self, key_space: KeySpace, key: &[u8]) -> Result<bool>;

    /// Apply every write in `batch` atomically.
    fn commit(&self, batch: RawBatch) -> Result<()>;

    /// Write a single value immediately.
    fn put(&self, key_space: KeySpace, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = RawBatch::with_capacity(key.len() + value.len());
        batch.put(key_space, key, value);
        self.commit(batch)
    }

    /// Delete every entry in a keyspace.
    fn clear_key_space(&self, key_space: KeySpace) -> Result<()>;

    /// Reclaim space held by overwritten or deleted entries.
    fn compact_key_space(&self, key_space: KeySpace) -> Result<()>;

    /// Whether lookups do enough blocking work to be worth running on an
    /// executor. Backends that answer from memory leave this `false`.
    fn supports_deferred_reads(&self) -> bool {
        false
    }
}

#[derive(Clone, Debug)]
struct RawOp {
    key_space: KeySpace,
    key: Range<usize>,
    value: Range<usize>,
}

/// Pending writes, packed into one contiguous buffer.
///
/// Values may be supplied as several ranges; they are concatenated here, at
/// the backend boundary, and nowhere earlier. The capacity passed to
/// [`RawBatch::with_capacity`] only sizes the buffer up front.
#[derive(Clone, Debug, Default)]
pub struct RawBatch {
    buf: Vec<u8>,
    ops: Vec<RawOp>,
}

impl RawBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a batch whose buffer can hold `size_hint` bytes of keys and
    /// values before reallocating.
    pub fn with_capacity(size_hint: usize) -> Self {
        Self {
            buf: Vec::with_capacity(size_hint),
            ops: Vec::new(),
        }
    }

    pub fn put(&mut self, key_space: KeySpace, key: &[u8], value: &[u8]) {
        self.put_ranges(key_space, key, [value]);
    }

    /// Buffer a write whose value is the concatenation of `ranges`.
    pub fn put_ranges<'a, I>(&mut self, key_space: KeySpace, key: &[u8], ranges: I)
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let key_start = self.buf.len();
        self.buf.extend_from_slice(key);
        let value_start = self.buf.len();
        for range in ranges {
            self.buf.extend_from_slice(range);
        }
        self.ops.push(RawOp {
            key_space,
            key: key_start..value_start,
            value: value_start..self.buf.len(),
        });
    }

    /// Number of buffered writes.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Total bytes of keys and values buffered.
    pub fn payload_len(&self) -> usize {
        self.buf.len()
    }

    /// Iterate over buffered writes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (KeySpace, &[u8], &[u8])> + '_ {
        self.ops.iter().map(move |op| {
            (
                op.key_space,
                &self.buf[op.key.clone()],
                &self.buf[op.value.clone()],
            )
        })
    }

    /// Consume the batch, yielding keys and values that share one allocation.
    pub fn into_entries(self) -> impl Iterator<Item = (KeySpace, Bytes, Bytes)> {
        let buf = Bytes::from(self.buf);
        self.ops
            .into_iter()
            .map(move |op| (op.key_space, buf.slice(op.key), buf.slice(op.value)))
    }
}
