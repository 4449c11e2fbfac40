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

//! Single account in the cache.

use std::collections::HashMap;

use ethereum_types::{BigEndianHash, H256, U256};
use keccak_hash::{keccak, KECCAK_EMPTY, KECCAK_NULL_RLP};
use rlp::DecoderError;
use rlp_derive::{RlpDecodable, RlpEncodable};

use crate::Bytes;

/// The persistent record of an account, as the world trie stores it:
/// `[balance, nonce, storage_root, code_hash]`.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct BasicAccount {
    /// Balance in wei.
    pub balance: U256,
    /// Transactions sent (or contracts created) by this account.
    pub nonce: U256,
    /// Root of the per-account storage trie.
    pub storage_root: H256,
    /// Keccak of the account's code.
    pub code_hash: H256,
}

/// The cached, mutable mirror of one account. Persistent fields are what
/// the trie stores; the storage overlay, a freshly installed code blob and
/// the tombstone flag live only here until the next commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    balance: U256,
    nonce: U256,
    storage_root: H256,
    code_hash: H256,
    /// Storage writes not yet folded into `storage_root`.
    storage_overlay: HashMap<H256, H256>,
    /// Code blob: freshly installed this session, or loaded on demand.
    code: Option<Bytes>,
    code_fresh: bool,
    alive: bool,
}

impl Account {
    /// An account with the given balance and nonce, no storage, no code.
    pub fn new_basic(balance: U256, nonce: U256) -> Account {
        Account {
            balance,
            nonce,
            storage_root: KECCAK_NULL_RLP,
            code_hash: KECCAK_EMPTY,
            storage_overlay: HashMap::new(),
            code: None,
            code_fresh: false,
            alive: true,
        }
    }

    /// Decode the trie record.
    pub fn from_rlp(bytes: &[u8]) -> Result<Account, DecoderError> {
        let basic: BasicAccount = rlp::decode(bytes)?;
        Ok(Account {
            balance: basic.balance,
            nonce: basic.nonce,
            storage_root: basic.storage_root,
            code_hash: basic.code_hash,
            storage_overlay: HashMap::new(),
            code: None,
            code_fresh: false,
            alive: true,
        })
    }

    /// Encode the trie record from the current persistent fields.
    pub fn rlp(&self) -> Bytes {
        rlp::encode(&BasicAccount {
            balance: self.balance,
            nonce: self.nonce,
            storage_root: self.storage_root,
            code_hash: self.code_hash,
        })
        .to_vec()
    }

    /// Current balance.
    pub fn balance(&self) -> U256 {
        self.balance
    }

    /// Current nonce.
    pub fn nonce(&self) -> U256 {
        self.nonce
    }

    /// Root of the storage trie as of the last commit.
    pub fn storage_root(&self) -> H256 {
        self.storage_root
    }

    /// Keccak of the account's code.
    pub fn code_hash(&self) -> H256 {
        self.code_hash
    }

    /// Whether the account is not tombstoned.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Whether the account is indistinguishable from an absent one:
    /// zero nonce and balance, no storage, no code.
    pub fn is_null(&self) -> bool {
        self.balance.is_zero()
            && self.nonce.is_zero()
            && self.storage_root == KECCAK_NULL_RLP
            && self.storage_overlay.values().all(|v| v.is_zero())
            && self.code_hash == KECCAK_EMPTY
            && !self.code_fresh
    }

    /// Tombstone the account; commit will remove it from the trie.
    pub fn kill(&mut self) {
        self.alive = false;
    }

    /// Add to the balance. Overflow wraps; the caller guarantees amounts
    /// stay inside 2^256 across a block.
    pub fn add_balance(&mut self, amount: &U256) {
        self.balance = self.balance.overflowing_add(*amount).0;
    }

    /// Subtract from the balance. The caller has already checked funds.
    pub fn sub_balance(&mut self, amount: &U256) {
        debug_assert!(self.balance >= *amount);
        self.balance = self.balance - *amount;
    }

    /// Bump the nonce by one.
    pub fn inc_nonce(&mut self) {
        self.nonce = self.nonce + U256::one();
    }

    /// Pending storage write, if this session touched `key`.
    pub fn cached_storage_at(&self, key: &H256) -> Option<H256> {
        self.storage_overlay.get(key).copied()
    }

    /// Record a storage write; folded into the trie at commit.
    pub fn set_storage(&mut self, key: H256, value: H256) {
        self.storage_overlay.insert(key, value);
    }

    /// Pending storage writes.
    pub fn storage_overlay(&self) -> &HashMap<H256, H256> {
        &self.storage_overlay
    }

    /// Replace the storage root after the overlay has been folded in.
    pub fn set_storage_root(&mut self, root: H256) {
        self.storage_root = root;
        self.storage_overlay.clear();
    }

    /// Install fresh code; hashed and persisted at commit.
    pub fn set_code(&mut self, code: Bytes) {
        self.code_hash = keccak(&code);
        self.code = Some(code);
        self.code_fresh = true;
    }

    /// Whether this session installed code that commit still has to
    /// persist.
    pub fn has_fresh_code(&self) -> bool {
        self.code_fresh
    }

    /// Mark the fresh code as persisted.
    pub fn note_code_committed(&mut self) {
        self.code_fresh = false;
    }

    /// Attach the code blob loaded from the database.
    pub fn note_code_loaded(&mut self, code: Bytes) {
        debug_assert!(!self.code_fresh);
        self.code = Some(code);
    }

    /// The code blob, if installed or loaded.
    pub fn code(&self) -> Option<&Bytes> {
        self.code.as_ref()
    }

    /// Whether the account carries code at all.
    pub fn has_code(&self) -> bool {
        self.code_hash != KECCAK_EMPTY
    }

    /// Whether the code blob still needs a database lookup.
    pub fn needs_code_load(&self) -> bool {
        self.has_code() && self.code.is_none()
    }
}

/// Encode a storage value the way the storage trie stores it: an RLP
/// big-endian minimal integer.
pub fn storage_value_rlp(value: &H256) -> Bytes {
    let as_uint: U256 = value.into_uint();
    rlp::encode(&as_uint).to_vec()
}

/// Decode a storage value from its trie representation.
pub fn storage_value_from_rlp(bytes: &[u8]) -> Result<H256, DecoderError> {
    let as_uint: U256 = rlp::decode(bytes)?;
    Ok(BigEndianHash::from_uint(&as_uint))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rlp_round_trip() {
        let mut account = Account::new_basic(69.into(), 1.into());
        account.set_storage_root(H256::repeat_byte(0x05));
        let decoded = Account::from_rlp(&account.rlp()).unwrap();
        assert_eq!(decoded.balance(), U256::from(69));
        assert_eq!(decoded.nonce(), U256::one());
        assert_eq!(decoded.storage_root(), H256::repeat_byte(0x05));
        assert_eq!(decoded.code_hash(), KECCAK_EMPTY);
    }

    #[test]
    fn null_account_detection() {
        let mut account = Account::new_basic(0.into(), 0.into());
        assert!(account.is_null());

        account.add_balance(&1.into());
        assert!(!account.is_null());
        account.sub_balance(&1.into());
        assert!(account.is_null());

        // A zero-valued storage write keeps the account null.
        account.set_storage(H256::from_low_u64_be(1), H256::zero());
        assert!(account.is_null());
        account.set_storage(H256::from_low_u64_be(1), H256::from_low_u64_be(2));
        assert!(!account.is_null());
    }

    #[test]
    fn killed_account_is_dead() {
        let mut account = Account::new_basic(10.into(), 1.into());
        assert!(account.is_alive());
        account.kill();
        assert!(!account.is_alive());
    }

    #[test]
    fn fresh_code_changes_hash_immediately() {
        let mut account = Account::new_basic(0.into(), 0.into());
        account.set_code(b"\x60\x00".to_vec());
        assert_eq!(account.code_hash(), keccak(b"\x60\x00"));
        assert!(account.has_fresh_code());
        assert!(account.has_code());
    }

    #[test]
    fn storage_value_zero_round_trip() {
        let forty_two = H256::from_low_u64_be(42);
        let encoded = storage_value_rlp(&forty_two);
        assert_eq!(storage_value_from_rlp(&encoded).unwrap(), forty_two);

        // Minimal encoding: 42 is a single byte.
        assert_eq!(encoded, vec![42u8]);
    }
}
