use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::Hash;

/// File mode for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Symbolic link (0o120000).
    Symlink,
    /// Subtree / directory (0o040000).
    Directory,
}

impl EntryMode {
    /// Octal mode value as written in git trees.
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Directory => 0o040000,
        }
    }

    /// Parse from an octal mode value.
    pub fn from_mode_bits(bits: u32) -> Option<Self> {
        match bits {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o040000 => Some(Self::Directory),
            _ => None,
        }
    }

    /// Whether the entry refers to another tree rather than a blob.
    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Directory)
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.mode_bits())
    }
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// File mode (regular, executable, symlink, directory).
    pub mode: EntryMode,
    /// Entry name (a single path component).
    pub name: String,
    /// Hash of the referenced blob or tree.
    pub hash: Hash,
}

impl TreeEntry {
    /// Create a new tree entry.
    pub fn new(mode: EntryMode, name: impl Into<String>, hash: Hash) -> Self {
        Self {
            mode,
            name: name.into(),
            hash,
        }
    }

    /// Check that `name` can be a single path component in a git tree.
    pub fn validate_name(name: &str) -> Result<(), TypeError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
            return Err(TypeError::InvalidEntryName(name.to_string()));
        }
        Ok(())
    }

    /// Compare by git tree order alone, ignoring the hash.
    pub fn git_cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(other.sort_key())
    }

    /// Name bytes as git compares them: directories sort as if their name
    /// ended in `/`.
    fn sort_key(&self) -> impl Iterator<Item = u8> + '_ {
        let suffix = self.mode.is_tree().then_some(b'/');
        self.name.bytes().chain(suffix)
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.git_cmp(other)
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

/// Directory snapshot (git tree).
///
/// A tree built locally carries no hash; the codec derives one from the
/// canonical encoding. A tree decoded from the store, or synthesized by a
/// subsystem that already knows its identity, carries that hash and it is
/// used as the storage key as-is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    hash: Option<Hash>,
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Create a tree without a known hash. Entries are put in git order.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        Self {
            hash: None,
            entries,
        }
    }

    /// Create a tree whose hash is already known.
    pub fn with_hash(hash: Hash, mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        Self {
            hash: Some(hash),
            entries,
        }
    }

    /// Create an empty tree.
    pub fn empty() -> Self {
        Self {
            hash: None,
            entries: Vec::new(),
        }
    }

    /// The precomputed hash, if any.
    pub fn hash(&self) -> Option<&Hash> {
        self.hash.as_ref()
    }

    /// Entries in git order.
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_entries_sorted() {
        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "zebra.txt", Hash::zero()),
            TreeEntry::new(EntryMode::Regular, "alpha.txt", Hash::zero()),
            TreeEntry::new(EntryMode::Directory, "middle", Hash::zero()),
        ]);
        let names: Vec<_> = tree.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["alpha.txt", "middle", "zebra.txt"]);
    }

    #[test]
    fn directories_sort_with_trailing_slash() {
        // "foo" as a directory compares as "foo/", which is after "foo.txt"
        // because '/' (0x2f) > '.' (0x2e).
        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Directory, "foo", Hash::zero()),
            TreeEntry::new(EntryMode::Regular, "foo.txt", Hash::zero()),
        ]);
        assert_eq!(tree.entries()[0].name, "foo.txt");
        assert_eq!(tree.entries()[1].name, "foo");

        // As a regular file "foo" is a prefix of "foo.txt" and sorts first.
        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "foo.txt", Hash::zero()),
            TreeEntry::new(EntryMode::Regular, "foo", Hash::zero()),
        ]);
        assert_eq!(tree.entries()[0].name, "foo");
    }

    #[test]
    fn with_hash_keeps_hash() {
        let h = Hash::sha1(b"tree");
        let tree = Tree::with_hash(h, Vec::new());
        assert_eq!(tree.hash(), Some(&h));
        assert!(Tree::new(Vec::new()).hash().is_none());
    }

    #[test]
    fn tree_get_entry() {
        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "a.txt", Hash::zero()),
            TreeEntry::new(EntryMode::Regular, "b.txt", Hash::sha1(b"b")),
        ]);
        assert!(tree.get("a.txt").is_some());
        assert!(tree.get("missing").is_none());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn empty_tree() {
        let tree = Tree::empty();
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn entry_mode_bits_roundtrip() {
        for mode in [
            EntryMode::Regular,
            EntryMode::Executable,
            EntryMode::Symlink,
            EntryMode::Directory,
        ] {
            assert_eq!(EntryMode::from_mode_bits(mode.mode_bits()), Some(mode));
        }
        assert!(EntryMode::from_mode_bits(0o777).is_none());
        assert!(EntryMode::from_mode_bits(0o160000).is_none());
    }

    #[test]
    fn entry_name_validation() {
        assert!(TreeEntry::validate_name("README.md").is_ok());
        for bad in ["", ".", "..", "a/b", "nul\0byte"] {
            assert_eq!(
                TreeEntry::validate_name(bad),
                Err(TypeError::InvalidEntryName(bad.to_string()))
            );
        }
    }
}
