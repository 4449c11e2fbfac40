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

//! A block, encoded as it is on the block chain: `[header, transactions,
//! uncles]`.

use rlp::{Decodable, DecoderError, Rlp, RlpStream};

use super::{header::Header, transaction::UnverifiedTransaction};
use crate::Bytes;

/// A block, encoded as it is on the block chain.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Block {
    /// The header of this block.
    pub header: Header,
    /// The transactions in this block.
    pub transactions: Vec<UnverifiedTransaction>,
    /// The uncles of this block.
    pub uncles: Vec<Header>,
}

impl Block {
    /// Get the RLP-encoding of the block with the seal.
    pub fn rlp_bytes(&self) -> Bytes {
        let mut block_rlp = RlpStream::new_list(3);
        block_rlp.append(&self.header);
        UnverifiedTransaction::rlp_append_list(&mut block_rlp, &self.transactions);
        block_rlp.append_list(&self.uncles);
        block_rlp.out().to_vec()
    }

    /// Decode a block, rejecting trailing bytes.
    pub fn decode_rlp(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.as_raw().len() != rlp.payload_info()?.total() {
            return Err(DecoderError::RlpIsTooBig);
        }
        if rlp.item_count()? != 3 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Block {
            header: Header::decode(&rlp.at(0)?)?,
            transactions: UnverifiedTransaction::decode_rlp_list(&rlp.at(1)?)?,
            uncles: Header::decode_rlp_list(&rlp.at(2)?)?,
        })
    }
}
