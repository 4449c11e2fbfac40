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

//! Trie node representation and its RLP codec.

use ethereum_types::H256;
use kvdb::DBValue;
use rlp::{DecoderError, Rlp, RlpStream};

use super::nibble::{hex_prefix_decode, hex_prefix_encode};

/// Reference to a child node: either the keccak of its encoding (nodes of
/// 32 bytes or more live in the overlay) or the encoding itself, embedded
/// in the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeHandle {
    /// Keccak of the child's encoding; the child is stored separately.
    Hash(H256),
    /// Raw encoding of a child shorter than 32 bytes.
    Inline(Vec<u8>),
}

/// A decoded trie node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// The empty trie.
    Empty,
    /// A terminal node holding the value for the remaining path.
    Leaf {
        /// Remaining key nibbles.
        path: Vec<u8>,
        /// Stored value.
        value: DBValue,
    },
    /// A shared path segment above a branch.
    Extension {
        /// Shared key nibbles; never empty.
        path: Vec<u8>,
        /// The node below the segment.
        child: NodeHandle,
    },
    /// A sixteen-way fork, with an optional value terminating exactly here.
    Branch {
        /// Children indexed by the next nibble.
        children: Box<[Option<NodeHandle>; 16]>,
        /// Value of the key ending at this node.
        value: Option<DBValue>,
    },
}

impl Node {
    /// RLP encoding of this node.
    pub fn encoded(&self) -> Vec<u8> {
        match self {
            Node::Empty => rlp::NULL_RLP.to_vec(),
            Node::Leaf { path, value } => {
                let mut stream = RlpStream::new_list(2);
                stream.append(&hex_prefix_encode(path, true));
                stream.append(value);
                stream.out().to_vec()
            }
            Node::Extension { path, child } => {
                let mut stream = RlpStream::new_list(2);
                stream.append(&hex_prefix_encode(path, false));
                append_handle(&mut stream, child);
                stream.out().to_vec()
            }
            Node::Branch { children, value } => {
                let mut stream = RlpStream::new_list(17);
                for child in children.iter() {
                    match child {
                        Some(handle) => append_handle(&mut stream, handle),
                        None => {
                            stream.append_empty_data();
                        }
                    }
                }
                match value {
                    Some(value) => stream.append(value),
                    None => stream.append_empty_data(),
                };
                stream.out().to_vec()
            }
        }
    }

    /// Decode a node from its RLP encoding.
    pub fn decoded(encoded: &[u8]) -> Result<Node, DecoderError> {
        let rlp = Rlp::new(encoded);
        if rlp.is_data() && rlp.is_empty() {
            return Ok(Node::Empty);
        }
        match rlp.item_count()? {
            2 => {
                let (path, leaf) = hex_prefix_decode(rlp.at(0)?.data()?)?;
                if leaf {
                    Ok(Node::Leaf {
                        path,
                        value: rlp.val_at(1)?,
                    })
                } else {
                    Ok(Node::Extension {
                        path,
                        child: decode_handle(&rlp.at(1)?)?
                            .ok_or(DecoderError::Custom("empty extension child"))?,
                    })
                }
            }
            17 => {
                let mut children: Box<[Option<NodeHandle>; 16]> = Default::default();
                for (index, slot) in children.iter_mut().enumerate() {
                    *slot = decode_handle(&rlp.at(index)?)?;
                }
                let value_item = rlp.at(16)?;
                let value = if value_item.is_empty() {
                    None
                } else {
                    Some(value_item.data()?.to_vec())
                };
                Ok(Node::Branch { children, value })
            }
            _ => Err(DecoderError::Custom("unexpected trie node list length")),
        }
    }
}

fn append_handle(stream: &mut RlpStream, handle: &NodeHandle) {
    match handle {
        NodeHandle::Hash(hash) => {
            stream.append(hash);
        }
        NodeHandle::Inline(raw) => {
            stream.append_raw(raw, 1);
        }
    }
}

fn decode_handle(rlp: &Rlp) -> Result<Option<NodeHandle>, DecoderError> {
    if rlp.is_list() {
        // An embedded node: its whole encoding is under 32 bytes.
        Ok(Some(NodeHandle::Inline(rlp.as_raw().to_vec())))
    } else {
        let data = rlp.data()?;
        match data.len() {
            0 => Ok(None),
            32 => Ok(Some(NodeHandle::Hash(H256::from_slice(data)))),
            _ => Err(DecoderError::Custom("bad trie node reference length")),
        }
    }
}
