// Copyright 2015-2020 Parity Technologies (UK) Ltd.
// This file is part of OpenEthereum.

// OpenEthereum is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// OpenEthereum is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with OpenEthereum.  If not, see <http://www.gnu.org/licenses/>.

//! Merkle-Patricia trie over the overlay database.
//!
//! Maps variable-length byte keys to byte values and commits the whole
//! mapping to a single 32-byte root. Nodes whose encoding reaches 32 bytes
//! are stored in the overlay under their keccak; shorter nodes are embedded
//! in their parent. The empty trie hashes to `KECCAK_NULL_RLP`.
//!
//! Every mutation writes the fresh nodes into the overlay journal
//! immediately; obsolete nodes are simply left behind, which is harmless in
//! a content-addressed store and keeps historical roots readable.

mod nibble;
mod node;

use ethereum_types::H256;
use keccak_hash::KECCAK_NULL_RLP;
use kvdb::DBValue;
use log::trace;
use thiserror::Error;

use crate::db::OverlayDb;
use self::nibble::{bytes_to_nibbles, common_prefix_len, nibbles_to_bytes};
use self::node::{Node, NodeHandle};

/// Failure while walking or rebuilding the trie.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrieError {
    /// A referenced node is missing from the overlay.
    #[error("trie node {0:x} is absent from the database")]
    IncompleteDatabase(H256),
    /// A stored node could not be decoded.
    #[error("invalid trie node encoding: {0}")]
    InvalidEncoding(rlp::DecoderError),
    /// The overlay backend failed.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<rlp::DecoderError> for TrieError {
    fn from(err: rlp::DecoderError) -> Self {
        TrieError::InvalidEncoding(err)
    }
}

/// Result wrapper for trie operations.
pub type TrieResult<T> = Result<T, TrieError>;

/// An authenticated key-value mapping rooted at a single hash, with its
/// nodes in an [`OverlayDb`].
pub struct TrieDb {
    db: OverlayDb,
    root: H256,
}

impl TrieDb {
    /// Open a trie at `root`. `KECCAK_NULL_RLP` is the empty trie; any
    /// other root must be present in the database.
    pub fn new(db: OverlayDb, root: H256) -> TrieResult<Self> {
        if root != KECCAK_NULL_RLP && !db.contains(&root).map_err(backend)? {
            return Err(TrieError::IncompleteDatabase(root));
        }
        Ok(TrieDb { db, root })
    }

    /// Open an empty trie.
    pub fn new_empty(db: OverlayDb) -> Self {
        TrieDb {
            db,
            root: KECCAK_NULL_RLP,
        }
    }

    /// The current root hash.
    pub fn root(&self) -> H256 {
        self.root
    }

    /// Whether the trie holds no entries.
    pub fn is_empty(&self) -> bool {
        self.root == KECCAK_NULL_RLP
    }

    /// Value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> TrieResult<Option<DBValue>> {
        if self.is_empty() {
            return Ok(None);
        }
        let root = self.load(&NodeHandle::Hash(self.root))?;
        self.get_at(&root, &bytes_to_nibbles(key))
    }

    /// Whether `key` has a value.
    pub fn contains(&self, key: &[u8]) -> TrieResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Insert `value` under `key`, replacing any previous value.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> TrieResult<()> {
        trace!(target: "trie", "insert key={} len={}", hex(key), value.len());
        let root = self.load_root()?;
        let new_root = self.insert_at(root, &bytes_to_nibbles(key), value.to_vec())?;
        self.set_root(new_root);
        Ok(())
    }

    /// Remove `key`. Removing an absent key leaves the root unchanged.
    pub fn remove(&mut self, key: &[u8]) -> TrieResult<()> {
        trace!(target: "trie", "remove key={}", hex(key));
        let root = self.load_root()?;
        if let Some(new_root) = self.remove_at(root, &bytes_to_nibbles(key))? {
            self.set_root(new_root);
        }
        Ok(())
    }

    /// Every `(key, value)` pair, in lexicographic key order.
    pub fn iter(&self) -> TrieResult<Vec<(Vec<u8>, DBValue)>> {
        let mut entries = Vec::new();
        if !self.is_empty() {
            let root = self.load(&NodeHandle::Hash(self.root))?;
            self.collect(&root, Vec::new(), &mut entries)?;
        }
        Ok(entries)
    }

    /// The encoded nodes on the path from the root towards `key`, root
    /// first. Together with the root hash this is a Merkle proof of the
    /// key's presence or absence.
    pub fn prove(&self, key: &[u8]) -> TrieResult<Vec<Vec<u8>>> {
        let mut proof = Vec::new();
        if self.is_empty() {
            return Ok(proof);
        }
        let mut partial = bytes_to_nibbles(key);
        let mut node = self.load(&NodeHandle::Hash(self.root))?;
        loop {
            proof.push(node.encoded());
            let next = match &node {
                Node::Empty | Node::Leaf { .. } => None,
                Node::Extension { path, child } => {
                    if partial.len() >= path.len() && partial[..path.len()] == path[..] {
                        partial.drain(..path.len());
                        Some(child.clone())
                    } else {
                        None
                    }
                }
                Node::Branch { children, .. } => {
                    if partial.is_empty() {
                        None
                    } else {
                        let index = partial.remove(0) as usize;
                        children[index].clone()
                    }
                }
            };
            match next {
                // Stop expanding once the child is embedded; its bytes are
                // already part of the parent encoding.
                Some(NodeHandle::Inline(_)) | None => return Ok(proof),
                Some(handle @ NodeHandle::Hash(_)) => node = self.load(&handle)?,
            }
        }
    }

    fn load_root(&self) -> TrieResult<Node> {
        if self.is_empty() {
            Ok(Node::Empty)
        } else {
            self.load(&NodeHandle::Hash(self.root))
        }
    }

    fn set_root(&mut self, node: Node) {
        if let Node::Empty = node {
            self.root = KECCAK_NULL_RLP;
            return;
        }
        // The root node is always hashed into the overlay, regardless of
        // its encoded size.
        let encoded = node.encoded();
        self.root = self.db.insert(&encoded);
    }

    fn load(&self, handle: &NodeHandle) -> TrieResult<Node> {
        match handle {
            NodeHandle::Hash(hash) => {
                let encoded = self
                    .db
                    .get(hash)
                    .map_err(backend)?
                    .ok_or(TrieError::IncompleteDatabase(*hash))?;
                Ok(Node::decoded(&encoded)?)
            }
            NodeHandle::Inline(raw) => Ok(Node::decoded(raw)?),
        }
    }

    /// Store a rebuilt node and hand back a reference to it: hashed into
    /// the overlay when its encoding reaches 32 bytes, embedded otherwise.
    fn store(&mut self, node: Node) -> NodeHandle {
        let encoded = node.encoded();
        if encoded.len() >= 32 {
            NodeHandle::Hash(self.db.insert(&encoded))
        } else {
            NodeHandle::Inline(encoded)
        }
    }

    fn get_at(&self, node: &Node, partial: &[u8]) -> TrieResult<Option<DBValue>> {
        match node {
            Node::Empty => Ok(None),
            Node::Leaf { path, value } => Ok((path[..] == partial[..]).then(|| value.clone())),
            Node::Extension { path, child } => {
                if partial.len() >= path.len() && partial[..path.len()] == path[..] {
                    let child = self.load(child)?;
                    self.get_at(&child, &partial[path.len()..])
                } else {
                    Ok(None)
                }
            }
            Node::Branch { children, value } => {
                if partial.is_empty() {
                    return Ok(value.clone());
                }
                match &children[partial[0] as usize] {
                    Some(handle) => {
                        let child = self.load(handle)?;
                        self.get_at(&child, &partial[1..])
                    }
                    None => Ok(None),
                }
            }
        }
    }

    fn insert_at(&mut self, node: Node, partial: &[u8], value: DBValue) -> TrieResult<Node> {
        match node {
            Node::Empty => Ok(Node::Leaf {
                path: partial.to_vec(),
                value,
            }),
            Node::Leaf {
                path,
                value: old_value,
            } => {
                if path[..] == partial[..] {
                    return Ok(Node::Leaf { path, value });
                }
                let common = common_prefix_len(&path, partial);
                let branch = self.two_entry_branch(
                    &path[common..],
                    old_value,
                    &partial[common..],
                    value,
                )?;
                Ok(self.maybe_extend(&path[..common], branch))
            }
            Node::Extension { path, child } => {
                let common = common_prefix_len(&path, partial);
                if common == path.len() {
                    let child_node = self.load(&child)?;
                    let new_child = self.insert_at(child_node, &partial[common..], value)?;
                    let handle = self.store(new_child);
                    return Ok(Node::Extension {
                        path,
                        child: handle,
                    });
                }

                // Split the extension: the shared part survives as a prefix,
                // the diverging parts meet in a fresh branch.
                let mut children: Box<[Option<NodeHandle>; 16]> = Default::default();
                let existing = &path[common..];
                let remainder = &existing[1..];
                children[existing[0] as usize] = Some(if remainder.is_empty() {
                    child
                } else {
                    self.store(Node::Extension {
                        path: remainder.to_vec(),
                        child,
                    })
                });

                let new = &partial[common..];
                let mut branch_value = None;
                if new.is_empty() {
                    branch_value = Some(value);
                } else {
                    children[new[0] as usize] = Some(self.store(Node::Leaf {
                        path: new[1..].to_vec(),
                        value,
                    }));
                }

                let branch = Node::Branch {
                    children,
                    value: branch_value,
                };
                Ok(self.maybe_extend(&path[..common], branch))
            }
            Node::Branch {
                mut children,
                value: branch_value,
            } => {
                if partial.is_empty() {
                    return Ok(Node::Branch {
                        children,
                        value: Some(value),
                    });
                }
                let index = partial[0] as usize;
                let new_child = match children[index].take() {
                    Some(handle) => {
                        let child = self.load(&handle)?;
                        self.insert_at(child, &partial[1..], value)?
                    }
                    None => Node::Leaf {
                        path: partial[1..].to_vec(),
                        value,
                    },
                };
                children[index] = Some(self.store(new_child));
                Ok(Node::Branch {
                    children,
                    value: branch_value,
                })
            }
        }
    }

    /// Branch holding exactly the two diverging suffixes of a split node.
    fn two_entry_branch(
        &mut self,
        existing: &[u8],
        existing_value: DBValue,
        new: &[u8],
        new_value: DBValue,
    ) -> TrieResult<Node> {
        let mut children: Box<[Option<NodeHandle>; 16]> = Default::default();
        let mut value = None;

        if existing.is_empty() {
            value = Some(existing_value);
        } else {
            children[existing[0] as usize] = Some(self.store(Node::Leaf {
                path: existing[1..].to_vec(),
                value: existing_value,
            }));
        }
        if new.is_empty() {
            value = Some(new_value);
        } else {
            children[new[0] as usize] = Some(self.store(Node::Leaf {
                path: new[1..].to_vec(),
                value: new_value,
            }));
        }
        Ok(Node::Branch { children, value })
    }

    fn maybe_extend(&mut self, prefix: &[u8], node: Node) -> Node {
        if prefix.is_empty() {
            node
        } else {
            let child = self.store(node);
            Node::Extension {
                path: prefix.to_vec(),
                child,
            }
        }
    }

    /// Remove `partial` below `node`. `None` means the key was absent and
    /// nothing changed; otherwise the rebuilt (possibly `Empty`) node.
    fn remove_at(&mut self, node: Node, partial: &[u8]) -> TrieResult<Option<Node>> {
        match node {
            Node::Empty => Ok(None),
            Node::Leaf { ref path, .. } => {
                if path[..] == partial[..] {
                    Ok(Some(Node::Empty))
                } else {
                    Ok(None)
                }
            }
            Node::Extension { path, child } => {
                if partial.len() < path.len() || partial[..path.len()] != path[..] {
                    return Ok(None);
                }
                let child_node = self.load(&child)?;
                match self.remove_at(child_node, &partial[path.len()..])? {
                    None => Ok(None),
                    Some(new_child) => Ok(Some(self.join_extension(path, new_child)?)),
                }
            }
            Node::Branch {
                mut children,
                value,
            } => {
                if partial.is_empty() {
                    if value.is_none() {
                        return Ok(None);
                    }
                    return Ok(Some(self.fix_branch(children, None)?));
                }
                let index = partial[0] as usize;
                let handle = match children[index].take() {
                    Some(handle) => handle,
                    None => return Ok(None),
                };
                let child = self.load(&handle)?;
                match self.remove_at(child, &partial[1..])? {
                    None => {
                        children[index] = Some(handle);
                        Ok(None)
                    }
                    Some(Node::Empty) => Ok(Some(self.fix_branch(children, value)?)),
                    Some(new_child) => {
                        children[index] = Some(self.store(new_child));
                        Ok(Some(Node::Branch { children, value }))
                    }
                }
            }
        }
    }

    /// Re-canonicalize a branch that may have dropped below two entries.
    fn fix_branch(
        &mut self,
        children: Box<[Option<NodeHandle>; 16]>,
        value: Option<DBValue>,
    ) -> TrieResult<Node> {
        let occupied: Vec<usize> = children
            .iter()
            .enumerate()
            .filter_map(|(index, child)| child.as_ref().map(|_| index))
            .collect();

        match (occupied.len(), value) {
            (0, None) => Ok(Node::Empty),
            (0, Some(value)) => Ok(Node::Leaf {
                path: Vec::new(),
                value,
            }),
            (1, None) => {
                // Single remaining child: absorb it into the nibble that
                // selected it.
                let index = occupied[0];
                let handle = children[index].clone().expect("index came from a Some; qed");
                let child = self.load(&handle)?;
                self.join_extension(vec![index as u8], child)
            }
            _ => Ok(Node::Branch { children, value }),
        }
    }

    /// Prepend `path` to `node`, merging path segments so no extension ever
    /// points at a leaf or another extension.
    fn join_extension(&mut self, path: Vec<u8>, node: Node) -> TrieResult<Node> {
        Ok(match node {
            Node::Empty => Node::Empty,
            Node::Leaf {
                path: mut rest,
                value,
            } => {
                let mut joined = path;
                joined.append(&mut rest);
                Node::Leaf {
                    path: joined,
                    value,
                }
            }
            Node::Extension {
                path: mut rest,
                child,
            } => {
                let mut joined = path;
                joined.append(&mut rest);
                Node::Extension {
                    path: joined,
                    child,
                }
            }
            branch @ Node::Branch { .. } => {
                let child = self.store(branch);
                Node::Extension { path, child }
            }
        })
    }

    fn collect(
        &self,
        node: &Node,
        prefix: Vec<u8>,
        entries: &mut Vec<(Vec<u8>, DBValue)>,
    ) -> TrieResult<()> {
        match node {
            Node::Empty => {}
            Node::Leaf { path, value } => {
                let mut key = prefix;
                key.extend_from_slice(path);
                entries.push((nibbles_to_bytes(&key), value.clone()));
            }
            Node::Extension { path, child } => {
                let mut key = prefix;
                key.extend_from_slice(path);
                let child = self.load(child)?;
                self.collect(&child, key, entries)?;
            }
            Node::Branch { children, value } => {
                if let Some(value) = value {
                    entries.push((nibbles_to_bytes(&prefix), value.clone()));
                }
                for (index, slot) in children.iter().enumerate() {
                    if let Some(handle) = slot {
                        let mut key = prefix.clone();
                        key.push(index as u8);
                        let child = self.load(handle)?;
                        self.collect(&child, key, entries)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn backend(err: crate::error::Error) -> TrieError {
    TrieError::Backend(err.to_string())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keccak_hash::keccak;

    fn empty() -> TrieDb {
        let _ = env_logger::builder().is_test(true).try_init();
        TrieDb::new_empty(OverlayDb::new_transient())
    }

    #[test]
    fn empty_trie_has_null_rlp_root() {
        assert_eq!(empty().root(), KECCAK_NULL_RLP);
    }

    #[test]
    fn insert_get_round_trip() {
        let mut trie = empty();
        trie.insert(b"doge", b"coin").unwrap();
        assert_eq!(trie.get(b"doge").unwrap(), Some(b"coin".to_vec()));
        assert_eq!(trie.get(b"dog").unwrap(), None);
        assert_ne!(trie.root(), KECCAK_NULL_RLP);
    }

    #[test]
    fn overwrite_changes_root_and_value() {
        let mut trie = empty();
        trie.insert(b"key", b"one").unwrap();
        let first = trie.root();
        trie.insert(b"key", b"two").unwrap();
        assert_ne!(trie.root(), first);
        assert_eq!(trie.get(b"key").unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn shared_prefix_keys_resolve_independently() {
        let mut trie = empty();
        trie.insert(b"dog", b"puppy").unwrap();
        trie.insert(b"doge", b"coin").unwrap();
        trie.insert(b"do", b"verb").unwrap();
        trie.insert(b"horse", b"stallion").unwrap();

        assert_eq!(trie.get(b"do").unwrap(), Some(b"verb".to_vec()));
        assert_eq!(trie.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(trie.get(b"doge").unwrap(), Some(b"coin".to_vec()));
        assert_eq!(trie.get(b"horse").unwrap(), Some(b"stallion".to_vec()));
        assert_eq!(trie.get(b"d").unwrap(), None);
        assert_eq!(trie.get(b"dogecoin").unwrap(), None);
    }

    #[test]
    fn root_is_insertion_order_independent() {
        let entries: Vec<(&[u8], &[u8])> = vec![
            (b"dog", b"puppy"),
            (b"doge", b"coin"),
            (b"do", b"verb"),
            (b"horse", b"stallion"),
            (b"house", b"building"),
        ];

        let mut forward = empty();
        for (k, v) in &entries {
            forward.insert(k, v).unwrap();
        }
        let mut backward = empty();
        for (k, v) in entries.iter().rev() {
            backward.insert(k, v).unwrap();
        }
        assert_eq!(forward.root(), backward.root());
    }

    #[test]
    fn remove_restores_previous_root() {
        let mut trie = empty();
        trie.insert(b"dog", b"puppy").unwrap();
        trie.insert(b"do", b"verb").unwrap();
        let checkpoint = trie.root();

        trie.insert(b"doge", b"coin").unwrap();
        assert_ne!(trie.root(), checkpoint);

        trie.remove(b"doge").unwrap();
        assert_eq!(trie.root(), checkpoint);
        assert_eq!(trie.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
    }

    #[test]
    fn remove_everything_restores_null_root() {
        let keys: Vec<&[u8]> = vec![b"dog", b"doge", b"do", b"horse", b"house"];
        let mut trie = empty();
        for key in &keys {
            trie.insert(key, b"x").unwrap();
        }
        for key in &keys {
            trie.remove(key).unwrap();
        }
        assert_eq!(trie.root(), KECCAK_NULL_RLP);
    }

    #[test]
    fn remove_of_absent_key_is_a_no_op() {
        let mut trie = empty();
        trie.insert(b"dog", b"puppy").unwrap();
        let root = trie.root();
        trie.remove(b"cat").unwrap();
        trie.remove(b"dogs").unwrap();
        assert_eq!(trie.root(), root);
    }

    #[test]
    fn large_values_are_hashed_out_of_line() {
        let mut trie = empty();
        let value = vec![0xabu8; 100];
        trie.insert(b"k", &value).unwrap();
        assert_eq!(trie.get(b"k").unwrap(), Some(value));
    }

    #[test]
    fn reopen_from_root_sees_committed_entries() {
        let db = OverlayDb::new_transient();
        let root = {
            let mut trie = TrieDb::new_empty(db.clone());
            trie.insert(b"dog", b"puppy").unwrap();
            trie.insert(b"horse", b"stallion").unwrap();
            trie.root()
        };
        db.commit().unwrap();

        let trie = TrieDb::new(db, root).unwrap();
        assert_eq!(trie.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(trie.get(b"horse").unwrap(), Some(b"stallion".to_vec()));
    }

    #[test]
    fn opening_at_unknown_root_fails() {
        let db = OverlayDb::new_transient();
        let missing = keccak(b"nothing here");
        assert!(matches!(
            TrieDb::new(db, missing),
            Err(TrieError::IncompleteDatabase(_))
        ));
    }

    #[test]
    fn iteration_is_sorted_and_complete() {
        let mut trie = empty();
        trie.insert(b"dog", b"puppy").unwrap();
        trie.insert(b"horse", b"stallion").unwrap();
        trie.insert(b"do", b"verb").unwrap();

        let entries = trie.iter().unwrap();
        let keys: Vec<&[u8]> = entries.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![&b"do"[..], &b"dog"[..], &b"horse"[..]]);
    }

    #[test]
    fn proof_starts_at_root_node() {
        let mut trie = empty();
        for i in 0u8..32 {
            trie.insert(&[i, 0x55], &[i; 40]).unwrap();
        }
        let proof = trie.prove(&[7, 0x55]).unwrap();
        assert!(!proof.is_empty());
        assert_eq!(keccak(&proof[0]), trie.root());
    }

    #[test]
    fn old_roots_remain_readable_after_updates() {
        let db = OverlayDb::new_transient();
        let mut trie = TrieDb::new_empty(db.clone());
        trie.insert(b"dog", b"puppy").unwrap();
        let old_root = trie.root();
        trie.insert(b"dog", b"grown").unwrap();

        let old = TrieDb::new(db, old_root).unwrap();
        assert_eq!(old.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
    }
}
