//! Content-addressed local object store for Arbor.
//!
//! Trees, blobs and blob metadata are stored under their 20-byte hashes in
//! named keyspaces on top of a raw key-value backend. Stored bytes use git
//! object framing (see `arbor-codec`), so ids agree with git.
//!
//! # Keyspaces
//!
//! | Keyspace | Value | Persistence |
//! |---|---|---|
//! | `blob` | `blob <len>\0` + contents | ephemeral |
//! | `blob_metadata` | 28-byte size + SHA-1 record | ephemeral |
//! | `tree` | git tree object | persistent |
//! | `proxy_hash` | upstream identifier | persistent |
//! | `commit_to_tree` | root tree hash | ephemeral |
//!
//! Ephemeral keyspaces are caches that can be refilled from upstream and
//! are emptied by [`LocalStore::clear_caches`].
//!
//! # Backends
//!
//! All backends implement [`KeyValueBackend`]:
//!
//! - [`InMemoryBackend`] -- `HashMap`-based backend for tests and embedding
//! - [`LogBackend`] -- CRC-framed append-only log with an in-memory index
//!
//! # Design Rules
//!
//! 1. A missing key is a normal result, never an error.
//! 2. A blob and its metadata are written in the same batch.
//! 3. Batches are all-or-nothing; nothing is visible before `flush`.
//! 4. All I/O errors are propagated, never silently ignored or retried.

pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod future;
pub mod keyspace;
pub mod local_store;
pub mod log;
pub mod memory;
pub mod result;

// Re-export primary types at crate root for ergonomic imports.
pub use backend::{KeyValueBackend, RawBatch};
pub use batch::WriteBatch;
pub use config::{BackendConfig, StoreConfig};
pub use error::{Result, StoreError};
pub use future::StoreFuture;
pub use keyspace::{KeySpace, KeySpaceRecord, Persistence, KEY_SPACE_RECORDS};
pub use local_store::{LocalStore, MaintenanceReport, DEFAULT_BATCH_PADDING};
pub use log::{LogBackend, LogConfig, SyncMode};
pub use memory::InMemoryBackend;
pub use result::StoreResult;
