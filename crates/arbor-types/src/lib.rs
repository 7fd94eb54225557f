//! Foundation types for the Arbor object store.
//!
//! Every object in the store is immutable and identified by a 20-byte SHA-1
//! [`Hash`]. The types in this crate carry no storage logic; encoding lives in
//! `arbor-codec` and persistence in `arbor-store`.
//!
//! # Key Types
//!
//! - [`Hash`] -- 20-byte content identifier
//! - [`Blob`] -- file contents, held as a list of shared byte chunks
//! - [`Tree`] -- directory snapshot: ordered `(name, mode, hash)` entries
//! - [`BlobMetadata`] -- cached size and content digest of a blob

pub mod blob;
pub mod error;
pub mod hash;
pub mod metadata;
pub mod tree;

pub use blob::Blob;
pub use error::TypeError;
pub use hash::Hash;
pub use metadata::BlobMetadata;
pub use tree::{EntryMode, Tree, TreeEntry};
