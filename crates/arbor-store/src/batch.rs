use std::sync::Arc;

use arbor_codec::{encode_blob, serialize_tree, SerializedBlobMetadata};
use arbor_types::{Blob, BlobMetadata, Hash, Tree};
use tracing::debug;

use crate::backend::{KeyValueBackend, RawBatch};
use crate::error::Result;
use crate::keyspace::KeySpace;

/// Buffered writes across keyspaces, committed together by [`flush`].
///
/// Nothing is visible to readers until `flush` succeeds. A batch dropped
/// without flushing discards its writes. A batch has a single writer; it is
/// not `Sync`-shared between tasks.
///
/// [`flush`]: WriteBatch::flush
pub struct WriteBatch {
    backend: Arc<dyn KeyValueBackend>,
    pending: RawBatch,
}

impl WriteBatch {
    pub(crate) fn new(backend: Arc<dyn KeyValueBackend>, size_hint: usize) -> Self {
        Self {
            backend,
            pending: RawBatch::with_capacity(size_hint),
        }
    }

    /// Buffer a raw write under `id`.
    pub fn put(&mut self, key_space: KeySpace, id: &Hash, value: &[u8]) {
        self.pending.put(key_space, id.as_bytes(), value);
    }

    /// Buffer a blob and its metadata under `id`.
    ///
    /// Both land in the same batch, so after a successful flush either both
    /// are present or, on failure, neither is.
    pub fn put_blob(&mut self, id: &Hash, blob: &Blob) -> BlobMetadata {
        let encoded = encode_blob(blob);
        let metadata = *encoded.metadata();
        self.pending
            .put_ranges(KeySpace::Blob, id.as_bytes(), encoded.ranges());
        self.pending.put(
            KeySpace::BlobMetadata,
            id.as_bytes(),
            SerializedBlobMetadata::new(&metadata).as_bytes(),
        );
        metadata
    }

    /// Buffer a tree and return the hash it is stored under.
    pub fn put_tree(&mut self, tree: &Tree) -> Result<Hash> {
        let (id, data) = serialize_tree(tree)?;
        self.put(KeySpace::Tree, &id, &data);
        Ok(id)
    }

    /// Buffer a commit-to-root-tree mapping.
    pub fn put_tree_for_commit(&mut self, commit: &Hash, tree: &Hash) {
        self.put(KeySpace::CommitToTree, commit, tree.as_bytes());
    }

    /// Commit every buffered write.
    ///
    /// The buffer is emptied whether or not the commit succeeds; a failed
    /// flush leaves the backend as it was.
    pub fn flush(&mut self) -> Result<()> {
        let batch = std::mem::take(&mut self.pending);
        if batch.is_empty() {
            return Ok(());
        }
        let writes = batch.len();
        let bytes = batch.payload_len();
        self.backend.commit(batch)?;
        debug!(writes, bytes, "flushed write batch");
        Ok(())
    }

    /// Number of buffered writes.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Bytes of keys and values buffered so far.
    pub fn pending_bytes(&self) -> usize {
        self.pending.payload_len()
    }
}

impl Drop for WriteBatch {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                writes = self.pending.len(),
                "discarding unflushed write batch"
            );
        }
    }
}

impl std::fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBatch")
            .field("writes", &self.pending.len())
            .field("bytes", &self.pending.payload_len())
            .finish()
    }
}
