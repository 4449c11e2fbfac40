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

//! Engine error kinds.

use std::{error, fmt};

use ethereum_types::{H256, U256};

use crate::trie::TrieError;

/// Value found to be different from the one expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch<T> {
    /// Value expected.
    pub expected: T,
    /// Value found.
    pub found: T,
}

impl<T: fmt::Display> fmt::Display for Mismatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)
    }
}

/// Value found to be outside of the accepted bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutOfBounds<T> {
    /// Minimum allowed value.
    pub min: Option<T>,
    /// Maximum allowed value.
    pub max: Option<T>,
    /// Value found.
    pub found: T,
}

impl<T: fmt::Display> fmt::Display for OutOfBounds<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => {
                write!(f, "{} not in range [{}, {}]", self.found, min, max)
            }
            (Some(min), None) => write!(f, "{} below minimum {}", self.found, min),
            (None, Some(max)) => write!(f, "{} above maximum {}", self.found, max),
            (None, None) => write!(f, "{} out of bounds", self.found),
        }
    }
}

/// Errors concerning block verification and playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    /// Parent hash field does not point at the supplied parent.
    InvalidParentHash(Mismatch<H256>),
    /// Block number is not parent number + 1.
    InvalidNumber(Mismatch<u64>),
    /// Timestamp does not advance past the parent's.
    InvalidTimestamp(OutOfBounds<u64>),
    /// Gas limit left the parent-derived corridor.
    InvalidGasLimit(OutOfBounds<U256>),
    /// Difficulty does not match the retargeting rule.
    InvalidDifficulty(Mismatch<U256>),
    /// Proof-of-work seal does not meet the difficulty.
    InvalidSeal,
    /// Post-state root differs from the header's.
    InvalidStateRoot(Mismatch<H256>),
    /// Hash of the transactions list differs from the header's.
    InvalidTransactionsRoot(Mismatch<H256>),
    /// Hash of the uncles list differs from the header's.
    InvalidUnclesHash(Mismatch<H256>),
    /// More uncles than the chain permits.
    TooManyUncles(OutOfBounds<usize>),
    /// An uncle failed verification against the grandparent.
    UncleInvalid(H256),
    /// An uncle appears twice, or is the parent itself.
    DuplicateUncle(H256),
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::BlockError::*;
        match self {
            InvalidParentHash(m) => write!(f, "Invalid parent hash: {}", m),
            InvalidNumber(m) => write!(f, "Invalid block number: {}", m),
            InvalidTimestamp(oob) => write!(f, "Invalid timestamp: {}", oob),
            InvalidGasLimit(oob) => write!(f, "Invalid gas limit: {}", oob),
            InvalidDifficulty(m) => write!(f, "Invalid difficulty: {}", m),
            InvalidSeal => write!(f, "Seal does not meet the difficulty target"),
            InvalidStateRoot(m) => write!(f, "Invalid state root: {}", m),
            InvalidTransactionsRoot(m) => write!(f, "Invalid transactions root: {}", m),
            InvalidUnclesHash(m) => write!(f, "Invalid uncles hash: {}", m),
            TooManyUncles(oob) => write!(f, "Too many uncles: {}", oob),
            UncleInvalid(h) => write!(f, "Uncle {:x} failed verification", h),
            DuplicateUncle(h) => write!(f, "Uncle {:x} already included", h),
        }
    }
}

/// Engine error. Transaction-level kinds are recoverable at the transaction
/// boundary; `Block` aborts the whole playback; `Database` poisons the state
/// instance and the caller is expected to discard it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Balance too low to cover a debit or transfer.
    InsufficientBalance {
        /// Amount required.
        required: U256,
        /// Balance available.
        got: U256,
    },
    /// Transaction nonce does not match the sender account nonce.
    InvalidNonce(Mismatch<U256>),
    /// Transaction gas below the intrinsic floor.
    OutOfGasIntrinsic {
        /// Intrinsic gas for this transaction.
        required: U256,
        /// Gas supplied.
        got: U256,
    },
    /// Signature is malformed or recovery failed.
    InvalidSignature,
    /// Transaction was already applied to the pending set.
    AlreadyImported(H256),
    /// Block verification or playback failure.
    Block(BlockError),
    /// Trie inconsistency, usually a missing node.
    Trie(TrieError),
    /// Overlay backend I/O failure. Fatal for this state instance.
    Database(String),
    /// RLP payload could not be decoded.
    Decoder(rlp::DecoderError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::Error::*;
        match self {
            InsufficientBalance { required, got } => {
                write!(f, "Insufficient balance: required {}, got {}", required, got)
            }
            InvalidNonce(m) => write!(f, "Invalid nonce: {}", m),
            OutOfGasIntrinsic { required, got } => write!(
                f,
                "Gas below intrinsic floor: required {}, got {}",
                required, got
            ),
            InvalidSignature => write!(f, "Invalid signature"),
            AlreadyImported(hash) => write!(f, "[{:x}] already imported", hash),
            Block(err) => write!(f, "Invalid block: {}", err),
            Trie(err) => write!(f, "Trie error: {}", err),
            Database(err) => write!(f, "Database failure: {}", err),
            Decoder(err) => write!(f, "Decoding failure: {}", err),
        }
    }
}

impl error::Error for Error {}

impl From<BlockError> for Error {
    fn from(err: BlockError) -> Self {
        Error::Block(err)
    }
}

impl From<TrieError> for Error {
    fn from(err: TrieError) -> Self {
        Error::Trie(err)
    }
}

impl From<rlp::DecoderError> for Error {
    fn from(err: rlp::DecoderError) -> Self {
        Error::Decoder(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Database(err.to_string())
    }
}
