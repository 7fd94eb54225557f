//! Canonical encodings for the Arbor object store.
//!
//! Blobs and trees are stored in git object format (`"<kind> <len>\0"` header
//! followed by the body) so that object ids agree with git. Blob metadata is
//! a fixed 28-byte record.
//!
//! | Object | Stored bytes | Hash |
//! |---|---|---|
//! | blob | `blob <len>\0` + contents | caller-supplied key; metadata carries SHA-1 of contents |
//! | tree | `tree <len>\0` + entries | SHA-1 of stored bytes, unless the tree carries one |
//! | metadata | 8-byte BE size + 20-byte hash | n/a |

pub mod blob;
pub mod error;
pub mod hasher;
pub mod metadata;
pub mod tree;

pub use blob::{decode_blob, encode_blob, EncodedBlob};
pub use error::{CodecError, Result};
pub use hasher::ContentHasher;
pub use metadata::SerializedBlobMetadata;
pub use tree::{deserialize_tree, serialize_tree, GitTreeSerializer};
