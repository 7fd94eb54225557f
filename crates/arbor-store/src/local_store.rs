use std::sync::Arc;

use arbor_codec::{decode_blob, deserialize_tree, serialize_tree, CodecError, SerializedBlobMetadata};
use arbor_types::{Blob, BlobMetadata, Hash, Tree};
use bytes::Bytes;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::backend::KeyValueBackend;
use crate::batch::WriteBatch;
use crate::error::{Result, StoreError};
use crate::future::StoreFuture;
use crate::keyspace::{KeySpace, KEY_SPACE_RECORDS};
use crate::memory::InMemoryBackend;
use crate::result::StoreResult;

/// Extra bytes reserved on top of the payload when a single-object write
/// opens its own batch.
pub const DEFAULT_BATCH_PADDING: usize = 64;

/// Keyspaces touched by a maintenance operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub cleared: Vec<KeySpace>,
    pub compacted: Vec<KeySpace>,
}

impl MaintenanceReport {
    pub fn was_cleared(&self, key_space: KeySpace) -> bool {
        self.cleared.contains(&key_space)
    }

    pub fn was_compacted(&self, key_space: KeySpace) -> bool {
        self.compacted.contains(&key_space)
    }
}

/// Content-addressed object store over a raw [`KeyValueBackend`].
///
/// Reads and single-object writes take `&self` and may be called from any
/// number of threads. Grouped writes go through a [`WriteBatch`] opened with
/// [`LocalStore::begin_write`].
///
/// Typed reads return a [`StoreFuture`]. With an executor handle and a
/// backend that does blocking I/O, the lookup runs on the blocking pool;
/// otherwise it completes before the call returns.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KeyValueBackend>,
    executor: Option<Handle>,
    batch_padding: usize,
}

impl LocalStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self {
            backend,
            executor: None,
            batch_padding: DEFAULT_BATCH_PADDING,
        }
    }

    /// A store over a fresh [`InMemoryBackend`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    /// Let lookups run on `handle`'s blocking pool when the backend
    /// supports it.
    pub fn with_executor(mut self, handle: Handle) -> Self {
        self.executor = Some(handle);
        self
    }

    pub fn with_batch_padding(mut self, padding: usize) -> Self {
        self.batch_padding = padding;
        self
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueBackend> {
        &self.backend
    }

    fn deferring_executor(&self) -> Option<&Handle> {
        self.executor
            .as_ref()
            .filter(|_| self.backend.supports_deferred_reads())
    }

    fn run<T, F>(&self, task: F) -> StoreFuture<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        match self.deferring_executor() {
            Some(handle) => StoreFuture::deferred(handle, task),
            None => StoreFuture::ready(task()),
        }
    }

    // -----------------------------------------------------------------------
    // Raw reads
    // -----------------------------------------------------------------------

    /// Look up a raw value. Absence is a missing result, not an error.
    pub fn get(&self, key_space: KeySpace, id: &Hash) -> Result<StoreResult> {
        self.backend.get(key_space, id.as_bytes())
    }

    /// Deferred form of [`get`](Self::get).
    pub fn get_future(&self, key_space: KeySpace, id: &Hash) -> StoreFuture<StoreResult> {
        let backend = Arc::clone(&self.backend);
        let id = *id;
        self.run(move || backend.get(key_space, id.as_bytes()))
    }

    /// Look up several keys. The result has one entry per id, in order.
    pub fn get_batch(&self, key_space: KeySpace, ids: &[Hash]) -> StoreFuture<Vec<StoreResult>> {
        let backend = Arc::clone(&self.backend);
        let ids = ids.to_vec();
        self.run(move || {
            let keys: Vec<&[u8]> = ids.iter().map(|id| &id.as_bytes()[..]).collect();
            backend.get_batch(key_space, &keys)
        })
    }

    pub fn has_key(&self, key_space: KeySpace, id: &Hash) -> Result<bool> {
        self.backend.has_key(key_space, id.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Typed reads
    // -----------------------------------------------------------------------

    fn lookup<T, D>(&self, key_space: KeySpace, id: &Hash, decode: D) -> StoreFuture<Option<T>>
    where
        T: Send + 'static,
        D: FnOnce(Hash, Bytes) -> std::result::Result<T, CodecError> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let id = *id;
        self.run(move || fetch(backend.as_ref(), key_space, id, decode))
    }

    /// Load a tree. A miss is `None`; stored bytes that are not a valid tree
    /// are a [`StoreError::Decode`].
    pub fn get_tree(&self, id: &Hash) -> StoreFuture<Option<Tree>> {
        self.lookup(KeySpace::Tree, id, |id, data| deserialize_tree(id, &data))
    }

    /// Load a blob. The returned blob shares the fetched buffer.
    pub fn get_blob(&self, id: &Hash) -> StoreFuture<Option<Blob>> {
        self.lookup(KeySpace::Blob, id, decode_blob)
    }

    pub fn get_blob_metadata(&self, id: &Hash) -> StoreFuture<Option<BlobMetadata>> {
        self.lookup(KeySpace::BlobMetadata, id, |_, data| {
            SerializedBlobMetadata::parse(&data)
        })
    }

    /// Resolve a commit to its root tree and load that tree. `None` if either
    /// the mapping or the tree is missing.
    pub fn get_tree_for_commit(&self, commit: &Hash) -> StoreFuture<Option<Tree>> {
        let backend = Arc::clone(&self.backend);
        let commit = *commit;
        self.run(move || {
            let tree_id = fetch(backend.as_ref(), KeySpace::CommitToTree, commit, |_, data| {
                Ok(Hash::from_slice(&data)?)
            })?;
            match tree_id {
                Some(tree_id) => fetch(backend.as_ref(), KeySpace::Tree, tree_id, |id, data| {
                    deserialize_tree(id, &data)
                }),
                None => Ok(None),
            }
        })
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Open a write batch. `size_hint` only pre-sizes its buffer.
    pub fn begin_write(&self, size_hint: usize) -> WriteBatch {
        WriteBatch::new(Arc::clone(&self.backend), size_hint)
    }

    /// Write a raw value immediately.
    pub fn put(&self, key_space: KeySpace, id: &Hash, value: &[u8]) -> Result<()> {
        self.backend.put(key_space, id.as_bytes(), value)
    }

    /// Store a tree and return the hash it is stored under.
    pub fn put_tree(&self, tree: &Tree) -> Result<Hash> {
        let (id, data) = serialize_tree(tree)?;
        let mut batch = self.begin_write(
            (Hash::RAW_SIZE + data.len()).saturating_add(self.batch_padding),
        );
        batch.put(KeySpace::Tree, &id, &data);
        batch.flush()?;
        debug!(%id, entries = tree.len(), "stored tree");
        Ok(id)
    }

    /// Store a blob and its metadata under `id` in one batch.
    pub fn put_blob(&self, id: &Hash, blob: &Blob) -> Result<BlobMetadata> {
        let mut batch = self.begin_write(batch_size_hint(blob.len(), self.batch_padding));
        let metadata = batch.put_blob(id, blob);
        batch.flush()?;
        debug!(%id, size = metadata.size, "stored blob");
        Ok(metadata)
    }

    /// Record the root tree of a commit.
    pub fn put_tree_for_commit(&self, commit: &Hash, tree: &Hash) -> Result<()> {
        self.put(KeySpace::CommitToTree, commit, tree.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    fn clear_ephemeral(&self, report: &mut MaintenanceReport) -> Result<()> {
        for record in KEY_SPACE_RECORDS.iter().filter(|r| r.key_space.is_ephemeral()) {
            self.backend.clear_key_space(record.key_space)?;
            report.cleared.push(record.key_space);
        }
        Ok(())
    }

    fn compact_all(&self, report: &mut MaintenanceReport) -> Result<()> {
        for record in &KEY_SPACE_RECORDS {
            self.backend.compact_key_space(record.key_space)?;
            report.compacted.push(record.key_space);
        }
        Ok(())
    }

    /// Delete every entry of every ephemeral keyspace. Persistent keyspaces
    /// are not touched.
    pub fn clear_caches(&self) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport::default();
        self.clear_ephemeral(&mut report)?;
        info!(cleared = ?report.cleared, "cleared caches");
        Ok(report)
    }

    /// [`clear_caches`](Self::clear_caches), then compact every keyspace.
    pub fn clear_caches_and_compact_all(&self) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport::default();
        self.clear_ephemeral(&mut report)?;
        self.compact_all(&mut report)?;
        info!(
            cleared = ?report.cleared,
            compacted = ?report.compacted,
            "cleared caches and compacted storage"
        );
        Ok(report)
    }

    /// Compact every keyspace without deleting anything.
    pub fn compact_storage(&self) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport::default();
        self.compact_all(&mut report)?;
        info!(compacted = ?report.compacted, "compacted storage");
        Ok(report)
    }
}

/// Fetch and decode one value, wrapping codec failures with the keyspace
/// and id being read.
fn fetch<T, D>(
    backend: &dyn KeyValueBackend,
    key_space: KeySpace,
    id: Hash,
    decode: D,
) -> Result<Option<T>>
where
    D: FnOnce(Hash, Bytes) -> std::result::Result<T, CodecError>,
{
    let Some(data) = backend.get(key_space, id.as_bytes())?.into_bytes() else {
        return Ok(None);
    };
    decode(id, data)
        .map(Some)
        .map_err(|source| StoreError::Decode {
            key_space,
            id,
            source,
        })
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("deferred_reads", &self.deferring_executor().is_some())
            .field("batch_padding", &self.batch_padding)
            .finish()
    }
}

/// Buffer size for a batch holding `payload` bytes. Saturates where `u64`
/// does not fit in `usize`.
fn batch_size_hint(payload: u64, padding: usize) -> usize {
    usize::try_from(payload)
        .unwrap_or(usize::MAX)
        .saturating_add(padding)
}
