use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named partition of the store.
///
/// Keys inside a keyspace are raw 20-byte hashes; the keyspace itself is a
/// backend-level partition and never part of the key bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySpace {
    /// Blob contents in git blob framing.
    Blob = 0,
    /// 28-byte size + content digest records.
    BlobMetadata = 1,
    /// Serialized git trees.
    Tree = 2,
    /// Opaque mappings from store hashes to upstream identifiers.
    ProxyHash = 3,
    /// Commit hash to root tree hash.
    CommitToTree = 4,
}

/// Whether a keyspace may be dropped and refilled from upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Persistence {
    /// A cache: everything in it can be fetched again.
    Ephemeral,
    /// Cannot be rebuilt without re-importing history.
    Persistent,
}

#[derive(Clone, Copy, Debug)]
pub struct KeySpaceRecord {
    pub key_space: KeySpace,
    pub persistence: Persistence,
}

/// Every keyspace with its persistence class, indexed by
/// [`KeySpace::index`].
pub const KEY_SPACE_RECORDS: [KeySpaceRecord; 5] = [
    KeySpaceRecord {
        key_space: KeySpace::Blob,
        persistence: Persistence::Ephemeral,
    },
    KeySpaceRecord {
        key_space: KeySpace::BlobMetadata,
        persistence: Persistence::Ephemeral,
    },
    // Trees imported from a flat manifest cannot be fetched again.
    KeySpaceRecord {
        key_space: KeySpace::Tree,
        persistence: Persistence::Persistent,
    },
    // Needed to re-fetch objects upstream once an inode is unloaded.
    KeySpaceRecord {
        key_space: KeySpace::ProxyHash,
        persistence: Persistence::Persistent,
    },
    KeySpaceRecord {
        key_space: KeySpace::CommitToTree,
        persistence: Persistence::Ephemeral,
    },
];

impl KeySpace {
    pub const ALL: [KeySpace; 5] = [
        Self::Blob,
        Self::BlobMetadata,
        Self::Tree,
        Self::ProxyHash,
        Self::CommitToTree,
    ];

    /// Stable one-byte tag, used by on-disk backends.
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn persistence(self) -> Persistence {
        KEY_SPACE_RECORDS[self.index() as usize].persistence
    }

    pub fn is_ephemeral(self) -> bool {
        self.persistence() == Persistence::Ephemeral
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::BlobMetadata => "blob_metadata",
            Self::Tree => "tree",
            Self::ProxyHash => "proxy_hash",
            Self::CommitToTree => "commit_to_tree",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ks| ks.name() == name)
    }
}

impl fmt::Display for KeySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeySpace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            let known: Vec<_> = Self::ALL.iter().map(|ks| ks.name()).collect();
            format!("unknown keyspace {s:?} (expected one of {})", known.join(", "))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_indexed_by_key_space() {
        for (i, record) in KEY_SPACE_RECORDS.iter().enumerate() {
            assert_eq!(record.key_space.index() as usize, i);
            assert_eq!(KeySpace::ALL[i], record.key_space);
        }
    }

    #[test]
    fn persistence_classes() {
        assert_eq!(KeySpace::Blob.persistence(), Persistence::Ephemeral);
        assert_eq!(KeySpace::BlobMetadata.persistence(), Persistence::Ephemeral);
        assert_eq!(KeySpace::Tree.persistence(), Persistence::Persistent);
        assert_eq!(KeySpace::ProxyHash.persistence(), Persistence::Persistent);
        assert_eq!(KeySpace::CommitToTree.persistence(), Persistence::Ephemeral);
    }

    #[test]
    fn index_roundtrip() {
        for ks in KeySpace::ALL {
            assert_eq!(KeySpace::from_index(ks.index()), Some(ks));
        }
        assert_eq!(KeySpace::from_index(5), None);
    }

    #[test]
    fn parse_names() {
        assert_eq!("blob_metadata".parse::<KeySpace>(), Ok(KeySpace::BlobMetadata));
        assert_eq!(KeySpace::Tree.to_string(), "tree");
        let err = "blobs".parse::<KeySpace>().unwrap_err();
        assert!(err.contains("commit_to_tree"));
    }
}
