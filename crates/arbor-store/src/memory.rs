use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use bytes::Bytes;
use tracing::debug;

use crate::backend::{KeyValueBackend, RawBatch};
use crate::error::{Result, StoreError};
use crate::keyspace::KeySpace;
use crate::result::StoreResult;

type Partition = HashMap<Bytes, Bytes>;

/// In-memory, HashMap-based backend.
///
/// Intended for tests and embedding. Every keyspace lives behind one
/// `RwLock`, so a committed batch becomes visible to readers all at once.
/// Values are reference-counted slices of the committed batch buffer; reads
/// never copy.
pub struct InMemoryBackend {
    partitions: RwLock<HashMap<KeySpace, Partition>>,
    compactions: [AtomicU64; KeySpace::ALL.len()],
    read_only: AtomicBool,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            compactions: Default::default(),
            read_only: AtomicBool::new(false),
        }
    }

    /// Number of entries in one keyspace.
    pub fn len(&self, key_space: KeySpace) -> usize {
        self.partitions
            .read()
            .expect("partition lock poisoned")
            .get(&key_space)
            .map_or(0, HashMap::len)
    }

    /// Returns `true` if no keyspace holds any entry.
    pub fn is_empty(&self) -> bool {
        self.partitions
            .read()
            .expect("partition lock poisoned")
            .values()
            .all(HashMap::is_empty)
    }

    /// Total value bytes across all keyspaces.
    pub fn total_bytes(&self) -> u64 {
        self.partitions
            .read()
            .expect("partition lock poisoned")
            .values()
            .flat_map(|p| p.values())
            .map(|v| v.len() as u64)
            .sum()
    }

    /// Sorted keys of one keyspace.
    pub fn keys(&self, key_space: KeySpace) -> Vec<Bytes> {
        let map = self.partitions.read().expect("partition lock poisoned");
        let mut keys: Vec<Bytes> = map
            .get(&key_space)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// How many times `compact_key_space` has run for a keyspace.
    pub fn compaction_count(&self, key_space: KeySpace) -> u64 {
        self.compactions[key_space.index() as usize].load(Ordering::Relaxed)
    }

    /// Make every subsequent write fail with [`StoreError::ReadOnly`].
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Relaxed);
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only.load(Ordering::Relaxed) {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueBackend for InMemoryBackend {
    fn get(&self, key_space: KeySpace, key: &[u8]) -> Result<StoreResult> {
        let map = self.partitions.read().expect("partition lock poisoned");
        Ok(map
            .get(&key_space)
            .and_then(|p| p.get(key))
            .cloned()
            .into())
    }

    fn get_batch(&self, key_space: KeySpace, keys: &[&[u8]]) -> Result<Vec<StoreResult>> {
        // One lock acquisition for the whole batch.
        let map = self.partitions.read().expect("partition lock poisoned");
        let partition = map.get(&key_space);
        Ok(keys
            .iter()
            .map(|key| partition.and_then(|p| p.get(*key)).cloned().into())
            .collect())
    }

    fn has_key(&self, key_space: KeySpace, key: &[u8]) -> Result<bool> {
        let map = self.partitions.read().expect("partition lock poisoned");
        Ok(map.get(&key_space).is_some_and(|p| p.contains_key(key)))
    }

    fn commit(&self, batch: RawBatch) -> Result<()> {
        self.check_writable()?;
        let writes = batch.len();
        let mut map = self.partitions.write().expect("partition lock poisoned");
        for (key_space, key, value) in batch.into_entries() {
            map.entry(key_space).or_default().insert(key, value);
        }
        debug!(writes, "committed batch to memory backend");
        Ok(())
    }

    fn clear_key_space(&self, key_space: KeySpace) -> Result<()> {
        self.check_writable()?;
        let mut map = self.partitions.write().expect("partition lock poisoned");
        let removed = map.remove(&key_space).map_or(0, |p| p.len());
        debug!(%key_space, removed, "cleared keyspace");
        Ok(())
    }

    fn compact_key_space(&self, key_space: KeySpace) -> Result<()> {
        // Nothing to reclaim in memory; shrink the map and record the call.
        let mut map = self.partitions.write().expect("partition lock poisoned");
        if let Some(partition) = map.get_mut(&key_space) {
            partition.shrink_to_fit();
        }
        self.compactions[key_space.index() as usize].fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<_> = KeySpace::ALL
            .iter()
            .map(|ks| (ks.name(), self.len(*ks)))
            .collect();
        f.debug_struct("InMemoryBackend")
            .field("entries", &counts)
            .finish()
    }
}
