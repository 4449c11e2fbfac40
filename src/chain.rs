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

//! Interface to the block chain store.
//!
//! The state engine only queries the chain: it asks for headers, for
//! per-block details (number, accumulated difficulty, family links) and for
//! the current head. Persisting sealed blocks and choosing the canonical
//! head are the store's business. [`MemoryBlockChain`] is a minimal
//! in-memory store used for mining and in tests.

use std::collections::HashMap;

use ethereum_types::{H256, U256};
use log::debug;
use rlp::Rlp;

use crate::{
    error::Error,
    types::{Block, Header},
    BlockNumber, Bytes,
};

/// Familial details concerning a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDetails {
    /// Block number.
    pub number: BlockNumber,
    /// Total difficulty of the block and all its parents.
    pub total_difficulty: U256,
    /// Parent block hash.
    pub parent: H256,
    /// Hashes of the children of this block.
    pub children: Vec<H256>,
}

/// Interface for querying blocks from the chain store.
pub trait BlockProvider {
    /// Returns true if the given block is known.
    fn is_known(&self, hash: &H256) -> bool;

    /// Raw block bytes.
    fn block(&self, hash: &H256) -> Option<Bytes>;

    /// Decoded block header.
    fn info(&self, hash: &H256) -> Option<Header>;

    /// Familial details of a block.
    fn details(&self, hash: &H256) -> Option<BlockDetails>;

    /// Hash of the head of the canonical chain.
    fn current_hash(&self) -> H256;

    /// Hash of the genesis block.
    fn genesis_hash(&self) -> H256;

    /// Walk from `from` towards the genesis, at most `limit` steps,
    /// returning the visited hashes starting with `from` itself.
    fn ancestry(&self, from: &H256, limit: usize) -> Vec<H256> {
        let mut route = Vec::new();
        let mut current = *from;
        while route.len() < limit {
            match self.details(&current) {
                Some(details) => {
                    route.push(current);
                    if details.number == 0 {
                        break;
                    }
                    current = details.parent;
                }
                None => break,
            }
        }
        route
    }
}

/// An in-memory chain store tracking the heaviest branch.
pub struct MemoryBlockChain {
    blocks: HashMap<H256, Bytes>,
    headers: HashMap<H256, Header>,
    details: HashMap<H256, BlockDetails>,
    best: H256,
    genesis: H256,
}

impl MemoryBlockChain {
    /// A chain containing only the given genesis block.
    pub fn new(genesis: Bytes) -> Result<Self, Error> {
        let block = Block::decode_rlp(&Rlp::new(&genesis))?;
        let hash = block.header.hash();
        let details = BlockDetails {
            number: block.header.number,
            total_difficulty: block.header.difficulty,
            parent: block.header.parent_hash,
            children: Vec::new(),
        };
        let mut chain = MemoryBlockChain {
            blocks: HashMap::new(),
            headers: HashMap::new(),
            details: HashMap::new(),
            best: hash,
            genesis: hash,
        };
        chain.blocks.insert(hash, genesis);
        chain.headers.insert(hash, block.header);
        chain.details.insert(hash, details);
        Ok(chain)
    }

    /// Insert a block whose parent is already known. The heaviest branch
    /// becomes the canonical head.
    pub fn insert_block(&mut self, bytes: Bytes) -> Result<H256, Error> {
        let block = Block::decode_rlp(&Rlp::new(&bytes))?;
        let hash = block.header.hash();
        if self.blocks.contains_key(&hash) {
            return Ok(hash);
        }
        let parent_td = {
            let parent = self
                .details
                .get_mut(&block.header.parent_hash)
                .ok_or_else(|| Error::Database(format!(
                    "unknown parent {:x}",
                    block.header.parent_hash
                )))?;
            parent.children.push(hash);
            parent.total_difficulty
        };
        let total_difficulty = parent_td + block.header.difficulty;
        self.details.insert(
            hash,
            BlockDetails {
                number: block.header.number,
                total_difficulty,
                parent: block.header.parent_hash,
                children: Vec::new(),
            },
        );
        if total_difficulty > self.details[&self.best].total_difficulty {
            debug!(target: "chain", "new best block #{} {:x}", block.header.number, hash);
            self.best = hash;
        }
        self.blocks.insert(hash, bytes);
        self.headers.insert(hash, block.header);
        Ok(hash)
    }
}

impl BlockProvider for MemoryBlockChain {
    fn is_known(&self, hash: &H256) -> bool {
        self.blocks.contains_key(hash)
    }

    fn block(&self, hash: &H256) -> Option<Bytes> {
        self.blocks.get(hash).cloned()
    }

    fn info(&self, hash: &H256) -> Option<Header> {
        self.headers.get(hash).cloned()
    }

    fn details(&self, hash: &H256) -> Option<BlockDetails> {
        self.details.get(hash).cloned()
    }

    fn current_hash(&self) -> H256 {
        self.best
    }

    fn genesis_hash(&self) -> H256 {
        self.genesis
    }
}
