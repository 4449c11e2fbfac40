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

//! Chain parameters: gas schedule, rewards and proof-of-work bounds.
//!
//! One immutable value injected at `State` construction. Nothing in the
//! engine reads a process-wide constant.

use ethereum_types::U256;

/// Immutable chain configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonParams {
    /// Gas charged per byte of transaction data.
    pub data_gas: U256,
    /// Base gas for a message call transaction.
    pub call_gas: U256,
    /// Base gas for a contract creation transaction.
    pub create_gas: U256,
    /// Reward credited to the author of a sealed block.
    pub block_reward: U256,
    /// Maximum number of uncles a block may carry.
    pub max_uncles: usize,
    /// Difficulty of the genesis block; also the minimum difficulty.
    pub minimum_difficulty: U256,
    /// Seconds within which a child block raises the difficulty.
    pub duration_limit: u64,
    /// Floor for any header's gas limit.
    pub min_gas_limit: U256,
    /// Gas limit of the genesis block.
    pub genesis_gas_limit: U256,
}

impl Default for CommonParams {
    fn default() -> Self {
        CommonParams {
            data_gas: 68.into(),
            call_gas: 21_000.into(),
            create_gas: 32_000.into(),
            block_reward: U256::from(1_500_000_000u64) * U256::from(1_000_000_000u64),
            max_uncles: 2,
            minimum_difficulty: U256::from(131_072),
            duration_limit: 42,
            min_gas_limit: 125_000.into(),
            genesis_gas_limit: 1_000_000.into(),
        }
    }
}

impl CommonParams {
    /// Intrinsic gas for a transaction carrying `data_len` bytes of payload.
    pub fn intrinsic_gas(&self, data_len: usize, is_create: bool) -> U256 {
        let base = if is_create {
            self.create_gas
        } else {
            self.call_gas
        };
        base + self.data_gas * U256::from(data_len)
    }

    /// Difficulty a child of `parent` must declare, by the retargeting rule:
    /// a fast child (within `duration_limit` of the parent) raises the
    /// difficulty by parent/1024, a slow one lowers it by the same step,
    /// never below `minimum_difficulty`.
    pub fn child_difficulty(
        &self,
        timestamp: u64,
        parent_timestamp: u64,
        parent_difficulty: U256,
    ) -> U256 {
        let step = parent_difficulty >> 10;
        if timestamp < parent_timestamp + self.duration_limit {
            parent_difficulty + step
        } else {
            std::cmp::max(self.minimum_difficulty, parent_difficulty - step)
        }
    }

    /// Whether `gas_limit` is acceptable for a child of a parent with
    /// `parent_gas_limit`.
    pub fn gas_limit_acceptable(&self, gas_limit: U256, parent_gas_limit: U256) -> bool {
        let corridor = parent_gas_limit >> 10;
        gas_limit >= self.min_gas_limit
            && gas_limit < parent_gas_limit + corridor
            && gas_limit > parent_gas_limit - corridor
    }
}
