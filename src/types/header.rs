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

//! Block header.

use ethereum_types::{Address, H256, H64, U256};
use keccak_hash::{keccak, KECCAK_EMPTY_LIST_RLP, KECCAK_NULL_RLP};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

use crate::{BlockNumber, Bytes};

/// A block header.
///
/// The sealed encoding is the 11-item list
/// `[parent_hash, uncles_hash, author, state_root, transactions_root,
/// difficulty, number, gas_limit, timestamp, extra_data, nonce]`.
/// [`Header::hash`] is the keccak of that list; [`Header::bare_hash`] drops
/// the nonce and is the message the proof-of-work commits to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Hash of the parent block's header.
    pub parent_hash: H256,
    /// Keccak of the block's uncles list RLP.
    pub uncles_hash: H256,
    /// Address collecting rewards and fees for this block.
    pub author: Address,
    /// Root of the world state after this block.
    pub state_root: H256,
    /// Keccak of the block's transactions list RLP.
    pub transactions_root: H256,
    /// Proof-of-work difficulty.
    pub difficulty: U256,
    /// Height of the block; the genesis block is 0.
    pub number: BlockNumber,
    /// Gas usage ceiling for the block.
    pub gas_limit: U256,
    /// Unix timestamp, seconds.
    pub timestamp: u64,
    /// Arbitrary author-chosen payload.
    pub extra_data: Bytes,
    /// Proof-of-work seal.
    pub nonce: H64,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            parent_hash: H256::zero(),
            uncles_hash: KECCAK_EMPTY_LIST_RLP,
            author: Address::zero(),
            state_root: KECCAK_NULL_RLP,
            transactions_root: KECCAK_EMPTY_LIST_RLP,
            difficulty: U256::zero(),
            number: 0,
            gas_limit: U256::zero(),
            timestamp: 0,
            extra_data: Bytes::new(),
            nonce: H64::zero(),
        }
    }
}

impl Header {
    fn stream_rlp(&self, stream: &mut RlpStream, with_nonce: bool) {
        stream.begin_list(if with_nonce { 11 } else { 10 });
        stream.append(&self.parent_hash);
        stream.append(&self.uncles_hash);
        stream.append(&self.author);
        stream.append(&self.state_root);
        stream.append(&self.transactions_root);
        stream.append(&self.difficulty);
        stream.append(&self.number);
        stream.append(&self.gas_limit);
        stream.append(&self.timestamp);
        stream.append(&self.extra_data);
        if with_nonce {
            stream.append(&self.nonce);
        }
    }

    /// The sealed RLP of this header.
    pub fn rlp(&self) -> Bytes {
        let mut stream = RlpStream::new();
        self.stream_rlp(&mut stream, true);
        stream.out().to_vec()
    }

    /// Keccak of the sealed header; the block's identity.
    pub fn hash(&self) -> H256 {
        keccak(self.rlp())
    }

    /// Keccak of the header without its seal; the proof-of-work message.
    pub fn bare_hash(&self) -> H256 {
        let mut stream = RlpStream::new();
        self.stream_rlp(&mut stream, false);
        keccak(stream.out())
    }

    /// Decode a list of headers (the uncles list of a block).
    pub fn decode_rlp_list(rlp: &Rlp) -> Result<Vec<Header>, DecoderError> {
        if !rlp.is_list() {
            return Err(DecoderError::RlpExpectedToBeList);
        }
        let mut headers = Vec::with_capacity(rlp.item_count()?);
        for header in rlp.iter() {
            headers.push(Header::decode(&header)?);
        }
        Ok(headers)
    }
}

impl Encodable for Header {
    fn rlp_append(&self, stream: &mut RlpStream) {
        self.stream_rlp(stream, true);
    }
}

impl Decodable for Header {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 11 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Header {
            parent_hash: rlp.val_at(0)?,
            uncles_hash: rlp.val_at(1)?,
            author: rlp.val_at(2)?,
            state_root: rlp.val_at(3)?,
            transactions_root: rlp.val_at(4)?,
            difficulty: rlp.val_at(5)?,
            number: rlp.val_at(6)?,
            gas_limit: rlp.val_at(7)?,
            timestamp: rlp.val_at(8)?,
            extra_data: rlp.val_at(9)?,
            nonce: rlp.val_at(10)?,
        })
    }
}
