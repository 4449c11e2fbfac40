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

//! Ledger state engine.
//!
//! Maintains the world state — the set of accounts and their contract
//! storage — behind a write-through account cache sitting on an
//! authenticated Merkle-Patricia trie, itself backed by a content-addressed
//! overlay database. On top of that sit the transaction/block execution
//! pipeline and the proof-of-work block authoring loop.
//!
//! The central type is [`state::State`]. Everything else either feeds it
//! (types, crypto, trie, overlay) or collaborates with it (the block chain
//! store behind [`chain::BlockProvider`], the pending-transaction
//! [`queue::TransactionQueue`], the VM behind [`vm::Vm`]).

pub mod chain;
pub mod crypto;
pub mod db;
pub mod error;
pub mod genesis;
pub mod miner;
pub mod params;
pub mod queue;
pub mod state;
pub mod trie;
pub mod types;
pub mod vm;

pub use crate::{
    db::{open_db, OverlayDb},
    error::Error,
    params::CommonParams,
    state::State,
};

/// Type for a variable-length byte payload.
pub type Bytes = Vec<u8>;

/// Type for block numbers.
pub type BlockNumber = u64;
