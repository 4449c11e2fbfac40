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

//! Queue of transactions waiting to enter a block.
//!
//! Holds raw signed transactions keyed by hash, with a seen-set so a
//! transaction dropped as invalid is not re-imported. Ordering for
//! application is the caller's business (`State::sync_transactions` applies
//! in per-sender nonce order).

use std::collections::{HashMap, HashSet};

use ethereum_types::{Address, H256, U256};
use keccak_hash::keccak;
use log::trace;
use rlp::Rlp;

use crate::{
    error::Error,
    types::{SignedTransaction, UnverifiedTransaction},
    Bytes,
};

/// A queued transaction with its recovered sender.
#[derive(Debug, Clone)]
pub struct QueuedTransaction {
    /// Hash of the signed encoding.
    pub hash: H256,
    /// Raw signed bytes.
    pub bytes: Bytes,
    /// Recovered sender.
    pub sender: Address,
    /// Declared nonce.
    pub nonce: U256,
}

/// The pending-transaction queue.
#[derive(Default)]
pub struct TransactionQueue {
    current: HashMap<H256, QueuedTransaction>,
    known: HashSet<H256>,
}

impl TransactionQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Default::default()
    }

    /// Import a signed transaction unless it was already seen. Signature
    /// and well-formedness are checked here; nonce and balance only at
    /// application time.
    pub fn attempt_import(&mut self, bytes: &[u8]) -> Result<bool, Error> {
        let hash = keccak(bytes);
        if !self.known.insert(hash) {
            return Ok(false);
        }
        let decoded = UnverifiedTransaction::decode(&Rlp::new(bytes))?;
        let signed = SignedTransaction::new(decoded)?;
        trace!(target: "queue", "importing {:x} from {:x}", hash, signed.sender());
        self.current.insert(
            hash,
            QueuedTransaction {
                hash,
                bytes: bytes.to_vec(),
                sender: signed.sender(),
                nonce: signed.nonce,
            },
        );
        Ok(true)
    }

    /// Remove a transaction, keeping it in the seen-set.
    pub fn remove(&mut self, hash: &H256) -> bool {
        self.current.remove(hash).is_some()
    }

    /// Forget a transaction entirely, allowing re-import.
    pub fn forget(&mut self, hash: &H256) {
        self.current.remove(hash);
        self.known.remove(hash);
    }

    /// Whether the queue currently holds `hash`.
    pub fn contains(&self, hash: &H256) -> bool {
        self.current.contains_key(hash)
    }

    /// Queued transactions sorted by sender and nonce, the order in which
    /// they stand a chance of applying.
    pub fn transactions(&self) -> Vec<QueuedTransaction> {
        let mut all: Vec<_> = self.current.values().cloned().collect();
        all.sort_by(|a, b| a.sender.cmp(&b.sender).then(a.nonce.cmp(&b.nonce)));
        all
    }

    /// Number of queued transactions.
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}
