//! Git tree encoding.
//!
//! Body format: a sequence of `<octal mode> <name>\0<20-byte hash>` records,
//! in git order. Directory modes are written without a leading zero
//! (`40000`), matching git.

use std::cmp::Ordering;
use std::collections::HashSet;

use arbor_types::{EntryMode, Hash, Tree, TreeEntry};
use bytes::Bytes;
use tracing::trace;

use crate::error::{CodecError, Result};
use crate::hasher::ContentHasher;

/// Incremental builder for a git tree object.
///
/// Entries are written in the order they are added; callers pass them in git
/// order (a [`Tree`] keeps its entries sorted). A name may appear only once,
/// whatever its mode.
#[derive(Debug, Default)]
pub struct GitTreeSerializer {
    body: Vec<u8>,
    names: HashSet<String>,
}

impl GitTreeSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry.
    pub fn add_entry(&mut self, entry: &TreeEntry) -> Result<()> {
        TreeEntry::validate_name(&entry.name)?;
        if !self.names.insert(entry.name.clone()) {
            return Err(CodecError::DuplicateEntryName(entry.name.clone()));
        }
        self.body
            .extend_from_slice(format!("{:o} ", entry.mode.mode_bits()).as_bytes());
        self.body.extend_from_slice(entry.name.as_bytes());
        self.body.push(0);
        self.body.extend_from_slice(entry.hash.as_bytes());
        Ok(())
    }

    /// Produce the full object: header followed by the entry records.
    pub fn finalize(self) -> Bytes {
        let mut out = ContentHasher::TREE.header(self.body.len() as u64);
        out.reserve_exact(self.body.len());
        out.extend_from_slice(&self.body);
        Bytes::from(out)
    }
}

/// Serialize a tree and determine its storage key.
///
/// A hash already carried by the tree is trusted and returned unchanged;
/// otherwise the key is the SHA-1 of the serialized object.
pub fn serialize_tree(tree: &Tree) -> Result<(Hash, Bytes)> {
    let mut serializer = GitTreeSerializer::new();
    for entry in tree.entries() {
        serializer.add_entry(entry)?;
    }
    let data = serializer.finalize();
    let id = match tree.hash() {
        Some(hash) => *hash,
        None => Hash::sha1(&data),
    };
    trace!(%id, len = data.len(), entries = tree.len(), "serialized tree");
    Ok((id, data))
}

/// Parse a stored git tree object fetched under `id`.
///
/// Entries must be in strict git order with unique names; anything else
/// would re-encode to different bytes than were stored under `id`.
pub fn deserialize_tree(id: Hash, data: &[u8]) -> Result<Tree> {
    let body = ContentHasher::TREE.split_header(data)?;
    let base = data.len() - body.len();
    let mut entries: Vec<TreeEntry> = Vec::new();
    let mut names = HashSet::new();
    let mut pos = 0;

    while pos < body.len() {
        let offset = base + pos;
        let malformed = |reason: &str| CodecError::MalformedTreeEntry {
            offset,
            reason: reason.to_string(),
        };

        // Mode: octal digits followed by a space.
        let space = body[pos..]
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| malformed("missing space after mode"))?;
        let mode_str = std::str::from_utf8(&body[pos..pos + space])
            .map_err(|_| malformed("mode is not ASCII"))?;
        let mode = u32::from_str_radix(mode_str, 8)
            .ok()
            .and_then(EntryMode::from_mode_bits)
            .ok_or_else(|| CodecError::InvalidMode {
                offset,
                mode: mode_str.to_string(),
            })?;
        pos += space + 1;

        // Name: NUL-terminated.
        let nul = body[pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| malformed("missing NUL after name"))?;
        let name = std::str::from_utf8(&body[pos..pos + nul])
            .map_err(|_| malformed("name is not UTF-8"))?;
        TreeEntry::validate_name(name)?;
        pos += nul + 1;

        // Hash: 20 raw bytes.
        if pos + Hash::RAW_SIZE > body.len() {
            return Err(malformed("truncated hash"));
        }
        let hash = Hash::from_slice(&body[pos..pos + Hash::RAW_SIZE])?;
        pos += Hash::RAW_SIZE;

        let entry = TreeEntry::new(mode, name, hash);
        if !names.insert(name) {
            return Err(malformed("duplicate entry name"));
        }
        if let Some(prev) = entries.last() {
            if entry.git_cmp(prev) != Ordering::Greater {
                return Err(malformed("entries out of git order"));
            }
        }
        entries.push(entry);
    }

    Ok(Tree::with_hash(id, entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_types::TypeError;
    use proptest::prelude::*;

    fn sample_tree() -> Tree {
        Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "hello.txt", Hash::sha1(b"hello")),
            TreeEntry::new(EntryMode::Directory, "src", Hash::sha1(b"src")),
            TreeEntry::new(EntryMode::Executable, "run.sh", Hash::sha1(b"run")),
            TreeEntry::new(EntryMode::Symlink, "link", Hash::sha1(b"link")),
        ])
    }

    #[test]
    fn empty_tree_matches_git() {
        let (id, data) = serialize_tree(&Tree::empty()).unwrap();
        assert_eq!(&data[..], b"tree 0\0");
        assert_eq!(id.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[test]
    fn single_entry_layout() {
        let child = Hash::from_raw([0xab; 20]);
        let tree = Tree::new(vec![TreeEntry::new(EntryMode::Directory, "d", child)]);
        let (_, data) = serialize_tree(&tree).unwrap();

        let mut expected = b"tree 28\0".to_vec();
        expected.extend_from_slice(b"40000 d\0");
        expected.extend_from_slice(&[0xab; 20]);
        assert_eq!(&data[..], &expected[..]);
    }

    #[test]
    fn hash_is_deterministic() {
        let (id1, data1) = serialize_tree(&sample_tree()).unwrap();
        let (id2, data2) = serialize_tree(&sample_tree()).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(data1, data2);
        assert_eq!(id1, Hash::sha1(&data1));
    }

    #[test]
    fn entry_order_does_not_change_hash() {
        let mut reversed: Vec<_> = sample_tree().entries().to_vec();
        reversed.reverse();
        let (a, _) = serialize_tree(&sample_tree()).unwrap();
        let (b, _) = serialize_tree(&Tree::new(reversed)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn precomputed_hash_is_trusted() {
        let preset = Hash::from_raw([7; 20]);
        let tree = Tree::with_hash(preset, sample_tree().entries().to_vec());
        let (id, data) = serialize_tree(&tree).unwrap();
        assert_eq!(id, preset);
        // The bytes are still canonical.
        assert_eq!(data, serialize_tree(&sample_tree()).unwrap().1);
    }

    #[test]
    fn serialize_rejects_invalid_name() {
        let tree = Tree::new(vec![TreeEntry::new(EntryMode::Regular, "a/b", Hash::zero())]);
        assert_eq!(
            serialize_tree(&tree).unwrap_err(),
            CodecError::Type(TypeError::InvalidEntryName("a/b".into()))
        );
    }

    #[test]
    fn parse_serialized_tree() {
        let original = sample_tree();
        let (id, data) = serialize_tree(&original).unwrap();
        let parsed = deserialize_tree(id, &data).unwrap();
        assert_eq!(parsed.hash(), Some(&id));
        assert_eq!(parsed.entries(), original.entries());
    }

    #[test]
    fn parse_accepts_zero_padded_directory_mode() {
        let mut body = b"040000 d\0".to_vec();
        body.extend_from_slice(&[1; 20]);
        let mut data = ContentHasher::TREE.header(body.len() as u64);
        data.extend_from_slice(&body);
        let tree = deserialize_tree(Hash::zero(), &data).unwrap();
        assert_eq!(tree.entries()[0].mode, EntryMode::Directory);
    }

    // -----------------------------------------------------------------------
    // Malformed input
    // -----------------------------------------------------------------------

    fn with_header(body: &[u8]) -> Vec<u8> {
        let mut data = ContentHasher::TREE.header(body.len() as u64);
        data.extend_from_slice(body);
        data
    }

    #[test]
    fn parse_rejects_truncated_hash() {
        let data = with_header(b"100644 a\0short");
        assert!(matches!(
            deserialize_tree(Hash::zero(), &data),
            Err(CodecError::MalformedTreeEntry { .. })
        ));
    }

    #[test]
    fn parse_rejects_missing_separators() {
        assert!(matches!(
            deserialize_tree(Hash::zero(), &with_header(b"100644")),
            Err(CodecError::MalformedTreeEntry { .. })
        ));
        assert!(matches!(
            deserialize_tree(Hash::zero(), &with_header(b"100644 name")),
            Err(CodecError::MalformedTreeEntry { .. })
        ));
    }

    #[test]
    fn parse_rejects_unknown_mode() {
        let mut body = b"160000 sub\0".to_vec();
        body.extend_from_slice(&[0; 20]);
        let err = deserialize_tree(Hash::zero(), &with_header(&body)).unwrap_err();
        assert_eq!(
            err,
            CodecError::InvalidMode {
                offset: 8,
                mode: "160000".into()
            }
        );
    }

    fn entry_bytes(mode: &str, name: &str, fill: u8) -> Vec<u8> {
        let mut out = format!("{mode} {name}\0").into_bytes();
        out.extend_from_slice(&[fill; 20]);
        out
    }

    #[test]
    fn parse_rejects_out_of_order_entries() {
        let mut body = entry_bytes("100644", "z", 1);
        body.extend(entry_bytes("100644", "a", 2));
        let err = deserialize_tree(Hash::zero(), &with_header(&body)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::MalformedTreeEntry { ref reason, .. } if reason.contains("order")
        ));
    }

    #[test]
    fn parse_checks_directory_sort_key() {
        // "foo" as a directory sorts after "foo.txt".
        let mut body = entry_bytes("100644", "foo.txt", 1);
        body.extend(entry_bytes("40000", "foo", 2));
        let tree = deserialize_tree(Hash::zero(), &with_header(&body)).unwrap();
        assert_eq!(tree.len(), 2);

        let mut body = entry_bytes("40000", "foo", 2);
        body.extend(entry_bytes("100644", "foo.txt", 1));
        assert!(matches!(
            deserialize_tree(Hash::zero(), &with_header(&body)),
            Err(CodecError::MalformedTreeEntry { .. })
        ));
    }

    #[test]
    fn parse_rejects_duplicate_names() {
        let mut body = entry_bytes("100644", "a", 1);
        body.extend(entry_bytes("100644", "a", 2));
        assert!(matches!(
            deserialize_tree(Hash::zero(), &with_header(&body)),
            Err(CodecError::MalformedTreeEntry { .. })
        ));

        // Same name as file and directory: "a" < "a.txt" < "a/".
        let mut body = entry_bytes("100644", "a", 1);
        body.extend(entry_bytes("100644", "a.txt", 2));
        body.extend(entry_bytes("40000", "a", 3));
        assert!(matches!(
            deserialize_tree(Hash::zero(), &with_header(&body)),
            Err(CodecError::MalformedTreeEntry { .. })
        ));
    }

    #[test]
    fn parsed_tree_reencodes_to_stored_id() {
        let (id, data) = serialize_tree(&sample_tree()).unwrap();
        let parsed = deserialize_tree(id, &data).unwrap();
        let unkeyed = Tree::new(parsed.entries().to_vec());
        assert_eq!(serialize_tree(&unkeyed).unwrap(), (id, data));
    }

    #[test]
    fn serialize_rejects_duplicate_names() {
        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "a", Hash::sha1(b"1")),
            TreeEntry::new(EntryMode::Regular, "a", Hash::sha1(b"2")),
        ]);
        assert_eq!(
            serialize_tree(&tree).unwrap_err(),
            CodecError::DuplicateEntryName("a".into())
        );

        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "a", Hash::zero()),
            TreeEntry::new(EntryMode::Directory, "a", Hash::zero()),
        ]);
        assert!(matches!(
            serialize_tree(&tree),
            Err(CodecError::DuplicateEntryName(_))
        ));
    }

    #[test]
    fn parse_rejects_blob_object() {
        assert!(matches!(
            deserialize_tree(Hash::zero(), b"blob 0\0"),
            Err(CodecError::MalformedHeader { kind: "tree", .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    const MODES: [EntryMode; 4] = [
        EntryMode::Regular,
        EntryMode::Executable,
        EntryMode::Symlink,
        EntryMode::Directory,
    ];

    fn arb_entries() -> impl Strategy<Value = Vec<TreeEntry>> {
        proptest::collection::hash_map(
            "[a-z0-9_-][a-z0-9._-]{0,7}",
            (0..MODES.len(), any::<[u8; 20]>()),
            0..12,
        )
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|(name, (mode, raw))| TreeEntry::new(MODES[mode], name, Hash::from_raw(raw)))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn tree_hash_is_deterministic(entries in arb_entries()) {
            let (id, data) = serialize_tree(&Tree::new(entries.clone())).unwrap();
            prop_assert_eq!(id, Hash::sha1(&data));

            let mut reversed = entries;
            reversed.reverse();
            let (again, data_again) = serialize_tree(&Tree::new(reversed)).unwrap();
            prop_assert_eq!(again, id);
            prop_assert_eq!(&data_again, &data);

            let parsed = deserialize_tree(id, &data).unwrap();
            let (_, reencoded) = serialize_tree(&Tree::new(parsed.entries().to_vec())).unwrap();
            prop_assert_eq!(reencoded, data);
        }
    }
}
