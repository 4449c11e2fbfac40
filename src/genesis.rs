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

//! The genesis allotment and genesis block construction.

use std::{collections::BTreeMap, str::FromStr};

use ethereum_types::{Address, H256, U256};

use crate::{params::CommonParams, types::{Block, Header}, Bytes};

/// The fixed mapping of addresses funded at genesis. Each receives 2^200
/// wei.
pub fn genesis_state() -> BTreeMap<Address, U256> {
    let endowment = U256::one() << 200;
    [
        "8a40bfaa73256b60764c1bf40675a99083efb075",
        "e6716f9544a56c530d868e4bfbacb172315bdead",
        "1e12515ce3e0f817a4ddef9ca55788a1d66bd2df",
        "1a26338f0d905e295fccb71fa9ea849ffa12aaf4",
        "2ef47100e0787b915105fd5e3f4ff6752079d5cb",
        "cd2a3d9f938e13cd947ec05abc7fe734df8dd826",
        "6c386a4b26f73c802f34673f7248bb118f97424a",
        "e4157b34ea9615cfbde6b4fda419828124b70c78",
    ]
    .iter()
    .map(|hex| {
        (
            Address::from_str(hex).expect("genesis addresses are well formed; qed"),
            endowment,
        )
    })
    .collect()
}

/// The genesis header for a chain whose allotment committed to
/// `state_root`.
pub fn genesis_header(params: &CommonParams, state_root: H256) -> Header {
    Header {
        state_root,
        difficulty: params.minimum_difficulty,
        gas_limit: params.genesis_gas_limit,
        ..Default::default()
    }
}

/// The genesis block bytes for the given header.
pub fn genesis_block(header: Header) -> Bytes {
    Block {
        header,
        transactions: Vec::new(),
        uncles: Vec::new(),
    }
    .rlp_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allotment_is_nonempty_and_uniform() {
        let state = genesis_state();
        assert_eq!(state.len(), 8);
        for balance in state.values() {
            assert_eq!(*balance, U256::one() << 200);
        }
    }

    #[test]
    fn genesis_header_is_block_zero() {
        let params = CommonParams::default();
        let header = genesis_header(&params, H256::repeat_byte(0xaa));
        assert_eq!(header.number, 0);
        assert_eq!(header.parent_hash, H256::zero());
        assert_eq!(header.difficulty, params.minimum_difficulty);
    }
}
