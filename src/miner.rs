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

//! Proof-of-work search and seal verification.
//!
//! The puzzle: find a nonce such that
//! `keccak(bare_header_hash ++ nonce)` interpreted as a 256-bit big-endian
//! integer does not exceed `U256::MAX / difficulty`. The search runs in
//! short slices, re-checking the deadline and the shared stop flag at
//! least once per millisecond so a concurrent `sync` or `rollback` can
//! abort it.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use ethereum_types::{H256, H64, U256};
use keccak_hash::keccak;
use log::{debug, trace};
use rand::Rng;

use crate::types::Header;

/// Nonces tried between deadline and stop-flag polls. A poll every few
/// microseconds of hashing keeps the cancellation latency well under the
/// one-millisecond bound.
const SLICE: u64 = 64;

/// Outcome of a bounded mining slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MineInfo {
    /// Whether a valid seal was found.
    pub completed: bool,
    /// The target the proof must not exceed.
    pub required: U256,
    /// The best (lowest) proof seen during the search.
    pub best: U256,
}

/// The upper bound a proof must stay under for the given difficulty.
pub fn difficulty_target(difficulty: U256) -> U256 {
    if difficulty.is_zero() {
        U256::MAX
    } else {
        U256::MAX / difficulty
    }
}

/// The proof value of `nonce` against a bare header hash.
pub fn proof(bare_hash: &H256, nonce: &H64) -> U256 {
    let mut message = [0u8; 40];
    message[..32].copy_from_slice(bare_hash.as_bytes());
    message[32..].copy_from_slice(nonce.as_bytes());
    U256::from_big_endian(keccak(&message[..]).as_bytes())
}

/// Whether a sealed header's nonce meets its declared difficulty.
pub fn verify_seal(header: &Header) -> bool {
    proof(&header.bare_hash(), &header.nonce) <= difficulty_target(header.difficulty)
}

/// Search for a seal over `bare_hash` for at most `timeout`, polling
/// `stop` every slice. Returns the winning nonce, if any, and the search
/// summary.
pub fn search(
    bare_hash: &H256,
    difficulty: U256,
    timeout: Duration,
    stop: &AtomicBool,
) -> (Option<H64>, MineInfo) {
    let target = difficulty_target(difficulty);
    let deadline = Instant::now() + timeout;
    let mut nonce: u64 = rand::thread_rng().gen();
    let mut best = U256::MAX;

    trace!(target: "miner", "searching from nonce {:x}, target {:x}", nonce, target);
    loop {
        for _ in 0..SLICE {
            let candidate = H64::from_low_u64_be(nonce);
            let value = proof(bare_hash, &candidate);
            if value < best {
                best = value;
            }
            if value <= target {
                debug!(target: "miner", "sealed with nonce {:x}", nonce);
                return (
                    Some(candidate),
                    MineInfo {
                        completed: true,
                        required: target,
                        best,
                    },
                );
            }
            nonce = nonce.wrapping_add(1);
        }
        if stop.load(Ordering::SeqCst) || Instant::now() >= deadline {
            return (
                None,
                MineInfo {
                    completed: false,
                    required: target,
                    best,
                },
            );
        }
    }
}
