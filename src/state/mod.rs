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

//! Model of the current state of the ledger.
//!
//! `State` couples three things that stay mutually consistent through every
//! failure path: the account cache (the authoritative mutable view inside a
//! block), the authenticated world trie it commits into, and the candidate
//! block assembled from executed transactions. Reads go cache first, trie
//! second, absent-is-zero last; mutations only ever touch the cache until
//! `commit` folds them down.

pub mod account;
mod ext;

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use ethereum_types::{Address, H256, U256};
use keccak_hash::{keccak, KECCAK_NULL_RLP};
use log::{debug, trace};
use parking_lot::RwLock;
use rlp::{Rlp, RlpStream};

use crate::{
    chain::BlockProvider,
    db::OverlayDb,
    error::{BlockError, Error, Mismatch, OutOfBounds},
    genesis::{genesis_header, genesis_state},
    miner::{self, MineInfo},
    params::CommonParams,
    queue::TransactionQueue,
    trie::{TrieDb, TrieError},
    types::{Action, Block, Header, SignedTransaction, UnverifiedTransaction},
    vm::{ActionParams, Vm},
    Bytes,
};

use self::{
    account::{storage_value_from_rlp, storage_value_rlp, Account},
    ext::Externalities,
};

/// Summary of one applied transaction.
#[derive(Debug, Clone)]
pub struct Executed {
    /// Gas the transaction consumed, intrinsic cost included.
    pub gas_used: U256,
    /// Return data of a top-level call.
    pub output: Bytes,
    /// Address of a contract created by this transaction.
    pub contract_address: Option<Address>,
    /// Whether the top-level frame died of gas exhaustion. The transaction
    /// still stands; its frame's effects were reverted.
    pub out_of_gas: bool,
}

/// The address a contract deployed by `sender` at `nonce` lands on.
pub fn contract_address(sender: &Address, nonce: &U256) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(sender);
    stream.append(nonce);
    let hash = keccak(stream.out());
    Address::from_slice(&hash.as_bytes()[12..])
}

/// Model of the current state of the ledger.
pub struct State {
    db: OverlayDb,
    /// Root of the world trie as of the last commit.
    root: H256,
    /// Mutable mirror of every account touched since the last commit or
    /// rollback. Read methods fill it through the lock.
    cache: RwLock<HashMap<Address, Account>>,
    /// Per-frame savepoints: address pre-images recorded at first touch.
    checkpoints: Vec<HashMap<Address, Option<Account>>>,
    /// Transactions applied since the last reset, in order.
    pending: Vec<SignedTransaction>,
    /// Hashes of `pending`, to suppress re-application.
    pending_set: HashSet<H256>,
    previous: Header,
    current: Header,
    current_txs: Bytes,
    current_uncles: Bytes,
    current_bytes: Bytes,
    author: Address,
    params: Arc<CommonParams>,
    vm: Arc<dyn Vm>,
    stop_mining: Arc<AtomicBool>,
}

impl Clone for State {
    fn clone(&self) -> State {
        State {
            db: self.db.clone(),
            root: self.root,
            cache: RwLock::new(self.cache.read().clone()),
            // Savepoints never span a copy.
            checkpoints: Vec::new(),
            pending: self.pending.clone(),
            pending_set: self.pending_set.clone(),
            previous: self.previous.clone(),
            current: self.current.clone(),
            current_txs: self.current_txs.clone(),
            current_uncles: self.current_uncles.clone(),
            current_bytes: self.current_bytes.clone(),
            author: self.author,
            params: self.params.clone(),
            vm: self.vm.clone(),
            stop_mining: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl State {
    /// A state seeded with the genesis allotment, sitting at the genesis
    /// block.
    pub fn new(
        db: OverlayDb,
        author: Address,
        params: Arc<CommonParams>,
        vm: Arc<dyn Vm>,
    ) -> Result<State, Error> {
        let mut state = State::bare(db, author, params, vm);
        for (address, balance) in genesis_state() {
            state.add_balance(&address, &balance)?;
        }
        state.commit()?;
        state.previous = genesis_header(&state.params, state.root);
        state.reset_current();
        debug!(target: "state", "genesis root {:x}", state.root);
        Ok(state)
    }

    /// Reopen a state at the post-state of `previous`. Fails if the root
    /// node is not in the database.
    pub fn from_existing(
        db: OverlayDb,
        previous: Header,
        author: Address,
        params: Arc<CommonParams>,
        vm: Arc<dyn Vm>,
    ) -> Result<State, Error> {
        let root = previous.state_root;
        if root != KECCAK_NULL_RLP && !db.contains(&root)? {
            return Err(Error::Trie(TrieError::IncompleteDatabase(root)));
        }
        let mut state = State::bare(db, author, params, vm);
        state.root = root;
        state.previous = previous;
        state.reset_current();
        Ok(state)
    }

    fn bare(
        db: OverlayDb,
        author: Address,
        params: Arc<CommonParams>,
        vm: Arc<dyn Vm>,
    ) -> State {
        State {
            db,
            root: KECCAK_NULL_RLP,
            cache: RwLock::new(HashMap::new()),
            checkpoints: Vec::new(),
            pending: Vec::new(),
            pending_set: HashSet::new(),
            previous: Header::default(),
            current: Header::default(),
            current_txs: Bytes::new(),
            current_uncles: Bytes::new(),
            current_bytes: Bytes::new(),
            author,
            params,
            vm,
            stop_mining: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The coinbase address of locally assembled blocks.
    pub fn author(&self) -> Address {
        self.author
    }

    /// The hash of the root of the state tree.
    pub fn root_hash(&self) -> H256 {
        self.root
    }

    /// The shared overlay handle.
    pub fn db(&self) -> &OverlayDb {
        &self.db
    }

    /// The chain parameters this state runs under.
    pub fn params(&self) -> &CommonParams {
        &self.params
    }

    /// Header of the block this state builds on.
    pub fn previous(&self) -> &Header {
        &self.previous
    }

    /// Header of the block being assembled or played back.
    pub fn current(&self) -> &Header {
        &self.current
    }

    /// The list of transactions applied since the last reset.
    pub fn pending(&self) -> &[SignedTransaction] {
        &self.pending
    }

    /// The sealed block produced by the last successful `mine`.
    pub fn block_data(&self) -> &[u8] {
        &self.current_bytes
    }

    /// A flag that aborts an in-flight `mine` from any thread within one
    /// search slice.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop_mining.clone()
    }

    fn abort_mining(&self) {
        self.stop_mining.store(true, Ordering::SeqCst);
    }

    // --- cache plumbing -------------------------------------------------

    /// Pull an address into the cache. With `require_code` the code blob is
    /// loaded as well; with `force_create` a miss inserts a zero account.
    /// Returns whether the address is cached afterwards.
    fn ensure_cached(
        &self,
        address: &Address,
        require_code: bool,
        force_create: bool,
    ) -> Result<bool, Error> {
        {
            let cache = self.cache.read();
            if let Some(account) = cache.get(address) {
                if !(require_code && account.needs_code_load()) {
                    return Ok(true);
                }
            }
        }
        let mut cache = self.cache.write();
        if !cache.contains_key(address) {
            let trie = TrieDb::new(self.db.clone(), self.root)?;
            match trie.get(address.as_bytes())? {
                Some(bytes) => {
                    trace!(target: "state", "cache miss, loaded {:x}", address);
                    cache.insert(*address, Account::from_rlp(&bytes)?);
                }
                None if force_create => {
                    cache.insert(*address, Account::new_basic(U256::zero(), U256::zero()));
                }
                None => return Ok(false),
            }
        }
        if require_code {
            let account = cache.get_mut(address).expect("just ensured presence; qed");
            if account.needs_code_load() {
                let hash = account.code_hash();
                let code = self
                    .db
                    .get(&hash)?
                    .ok_or(Error::Trie(TrieError::IncompleteDatabase(hash)))?;
                account.note_code_loaded(code);
            }
        }
        Ok(true)
    }

    /// Record the pre-image of `address` in the innermost savepoint, once.
    fn note_checkpoint(&mut self, address: &Address) {
        if let Some(frame) = self.checkpoints.last_mut() {
            if !frame.contains_key(address) {
                frame.insert(*address, self.cache.read().get(address).cloned());
            }
        }
    }

    fn checkpoint(&mut self) {
        self.checkpoints.push(HashMap::new());
    }

    /// Drop the innermost savepoint, folding its pre-images into the one
    /// below so an outer revert still restores the oldest values.
    fn discard_checkpoint(&mut self) {
        let frame = self.checkpoints.pop();
        if let (Some(frame), Some(parent)) = (frame, self.checkpoints.last_mut()) {
            for (address, pre) in frame {
                parent.entry(address).or_insert(pre);
            }
        }
    }

    fn revert_to_checkpoint(&mut self) {
        if let Some(frame) = self.checkpoints.pop() {
            let mut cache = self.cache.write();
            for (address, pre) in frame {
                match pre {
                    Some(account) => {
                        cache.insert(address, account);
                    }
                    None => {
                        cache.remove(&address);
                    }
                }
            }
        }
    }

    // --- account queries ------------------------------------------------

    /// Check if the address is in use.
    pub fn address_in_use(&self, address: &Address) -> Result<bool, Error> {
        self.ensure_cached(address, false, false)
    }

    /// Check if the address contains executable code.
    pub fn address_has_code(&self, address: &Address) -> Result<bool, Error> {
        if !self.ensure_cached(address, false, false)? {
            return Ok(false);
        }
        Ok(self
            .cache
            .read()
            .get(address)
            .map_or(false, |a| a.has_code()))
    }

    /// An account's balance; zero if the address has never been used.
    pub fn balance(&self, address: &Address) -> Result<U256, Error> {
        if !self.ensure_cached(address, false, false)? {
            return Ok(U256::zero());
        }
        Ok(self
            .cache
            .read()
            .get(address)
            .map_or(U256::zero(), |a| a.balance()))
    }

    /// The number of transactions an address has sent; its account nonce.
    pub fn transactions_from(&self, address: &Address) -> Result<U256, Error> {
        if !self.ensure_cached(address, false, false)? {
            return Ok(U256::zero());
        }
        Ok(self
            .cache
            .read()
            .get(address)
            .map_or(U256::zero(), |a| a.nonce()))
    }

    /// A storage word of a contract; zero if never set.
    pub fn storage(&self, address: &Address, key: &H256) -> Result<H256, Error> {
        if !self.ensure_cached(address, false, false)? {
            return Ok(H256::zero());
        }
        let root = {
            let cache = self.cache.read();
            let account = cache.get(address).expect("ensured above; qed");
            if let Some(value) = account.cached_storage_at(key) {
                return Ok(value);
            }
            account.storage_root()
        };
        if root == KECCAK_NULL_RLP {
            return Ok(H256::zero());
        }
        let trie = TrieDb::new(self.db.clone(), root)?;
        match trie.get(key.as_bytes())? {
            Some(bytes) => Ok(storage_value_from_rlp(&bytes)?),
            None => Ok(H256::zero()),
        }
    }

    /// The code of an account, if any.
    pub fn code(&self, address: &Address) -> Result<Option<Bytes>, Error> {
        if !self.ensure_cached(address, true, false)? {
            return Ok(None);
        }
        Ok(self.cache.read().get(address).and_then(|a| a.code().cloned()))
    }

    /// Every in-use address with its balance, the cache merged over the
    /// trie.
    pub fn addresses(&self) -> Result<BTreeMap<Address, U256>, Error> {
        let mut out = BTreeMap::new();
        let trie = TrieDb::new(self.db.clone(), self.root)?;
        for (key, value) in trie.iter()? {
            let address = Address::from_slice(&key);
            let account = Account::from_rlp(&value)?;
            out.insert(address, account.balance());
        }
        for (address, account) in self.cache.read().iter() {
            if account.is_alive() {
                out.insert(*address, account.balance());
            } else {
                out.remove(address);
            }
        }
        Ok(out)
    }

    // --- account mutation -----------------------------------------------

    /// Add some amount to a balance, initialising the account if needed.
    /// Wrap-around is the caller's responsibility; amounts in a block never
    /// approach 2^256.
    pub fn add_balance(&mut self, address: &Address, amount: &U256) -> Result<(), Error> {
        self.note_checkpoint(address);
        self.ensure_cached(address, false, true)?;
        let mut cache = self.cache.write();
        cache
            .get_mut(address)
            .expect("force-created above; qed")
            .add_balance(amount);
        Ok(())
    }

    /// Subtract some amount from a balance. Fails without touching the
    /// account if the funds are not there.
    pub fn sub_balance(&mut self, address: &Address, amount: &U256) -> Result<(), Error> {
        let balance = self.balance(address)?;
        if balance < *amount {
            return Err(Error::InsufficientBalance {
                required: *amount,
                got: balance,
            });
        }
        self.note_checkpoint(address);
        self.ensure_cached(address, false, true)?;
        let mut cache = self.cache.write();
        cache
            .get_mut(address)
            .expect("force-created above; qed")
            .sub_balance(amount);
        Ok(())
    }

    /// Move `amount` from one account to another.
    pub fn transfer_balance(
        &mut self,
        from: &Address,
        to: &Address,
        amount: &U256,
    ) -> Result<(), Error> {
        self.sub_balance(from, amount)?;
        self.add_balance(to, amount)
    }

    /// Note that an address is sending a transaction: bump its nonce.
    pub fn note_sending(&mut self, address: &Address) -> Result<(), Error> {
        self.note_checkpoint(address);
        self.ensure_cached(address, false, true)?;
        let mut cache = self.cache.write();
        cache
            .get_mut(address)
            .expect("force-created above; qed")
            .inc_nonce();
        Ok(())
    }

    /// Record a storage write; nothing reaches the storage trie until
    /// commit.
    pub fn set_storage(&mut self, address: &Address, key: H256, value: H256) -> Result<(), Error> {
        self.note_checkpoint(address);
        self.ensure_cached(address, false, true)?;
        let mut cache = self.cache.write();
        cache
            .get_mut(address)
            .expect("force-created above; qed")
            .set_storage(key, value);
        Ok(())
    }

    fn init_code(&mut self, address: &Address, code: Bytes) -> Result<(), Error> {
        self.note_checkpoint(address);
        self.ensure_cached(address, false, true)?;
        let mut cache = self.cache.write();
        cache
            .get_mut(address)
            .expect("force-created above; qed")
            .set_code(code);
        Ok(())
    }

    // --- commit / rollback ----------------------------------------------

    /// Fold every cache entry into the world trie and clear the cache. The
    /// new root is the state root; the overlay journal still holds the
    /// nodes until the overlay itself is committed.
    pub fn commit(&mut self) -> Result<H256, Error> {
        let accounts: Vec<(Address, Account)> = self.cache.write().drain().collect();
        let mut trie = TrieDb::new(self.db.clone(), self.root)?;
        for (address, mut account) in accounts {
            if !account.is_alive() {
                trie.remove(address.as_bytes())?;
                continue;
            }
            if !account.storage_overlay().is_empty() {
                let mut storage = TrieDb::new(self.db.clone(), account.storage_root())?;
                for (key, value) in account.storage_overlay().clone() {
                    if value.is_zero() {
                        storage.remove(key.as_bytes())?;
                    } else {
                        storage.insert(key.as_bytes(), &storage_value_rlp(&value))?;
                    }
                }
                account.set_storage_root(storage.root());
            }
            if account.has_fresh_code() {
                let code = account
                    .code()
                    .expect("fresh code implies a blob; qed")
                    .clone();
                self.db.emplace(account.code_hash(), code);
                account.note_code_committed();
            }
            // Canonicalization happens after the folds: an account that
            // ends the block with zero everything is removed, not stored.
            if account.is_null() {
                trie.remove(address.as_bytes())?;
                continue;
            }
            trie.insert(address.as_bytes(), &account.rlp())?;
        }
        self.root = trie.root();
        self.checkpoints.clear();
        trace!(target: "state", "committed, root {:x}", self.root);
        Ok(self.root)
    }

    /// Cancel pending transactions and roll the working state back to the
    /// end of the previous block.
    pub fn rollback(&mut self) {
        self.abort_mining();
        self.reset_current();
    }

    /// Wipe the candidate block and start a fresh one on top of
    /// `previous`.
    fn reset_current(&mut self) {
        self.cache.write().clear();
        self.checkpoints.clear();
        self.pending.clear();
        self.pending_set.clear();
        self.current_txs.clear();
        self.current_uncles.clear();
        self.current_bytes.clear();

        let timestamp = std::cmp::max(unix_now(), self.previous.timestamp + 1);
        self.current = Header {
            parent_hash: self.previous.hash(),
            author: self.author,
            number: self.previous.number + 1,
            gas_limit: self.previous.gas_limit,
            timestamp,
            difficulty: self.params.child_difficulty(
                timestamp,
                self.previous.timestamp,
                self.previous.difficulty,
            ),
            ..Default::default()
        };
    }

    // --- transaction execution ------------------------------------------

    /// Execute a signed transaction, appending it to the pending list. Any
    /// error reverts the transaction's savepoint and leaves the state
    /// untouched.
    pub fn execute(&mut self, bytes: &[u8]) -> Result<Executed, Error> {
        let unverified = UnverifiedTransaction::decode(&Rlp::new(bytes))?;
        let hash = unverified.hash();
        if self.pending_set.contains(&hash) {
            return Err(Error::AlreadyImported(hash));
        }
        let t = SignedTransaction::new(unverified)?;
        let sender = t.sender();

        let nonce = self.transactions_from(&sender)?;
        if t.nonce != nonce {
            return Err(Error::InvalidNonce(Mismatch {
                expected: nonce,
                found: t.nonce,
            }));
        }
        let intrinsic = t.gas_required(&self.params);
        if t.gas < intrinsic {
            return Err(Error::OutOfGasIntrinsic {
                required: intrinsic,
                got: t.gas,
            });
        }

        self.checkpoint();
        match self.apply(&t, sender, intrinsic) {
            Ok(executed) => {
                self.discard_checkpoint();
                trace!(target: "state", "executed {:x}, gas used {}", hash, executed.gas_used);
                self.pending.push(t);
                self.pending_set.insert(hash);
                Ok(executed)
            }
            Err(err) => {
                trace!(target: "state", "reverted {:x}: {}", hash, err);
                self.revert_to_checkpoint();
                Err(err)
            }
        }
    }

    fn apply(
        &mut self,
        t: &SignedTransaction,
        sender: Address,
        intrinsic: U256,
    ) -> Result<Executed, Error> {
        // Gas is bought up front; unused gas is refunded below.
        let upfront = t.gas * t.gas_price;
        self.sub_balance(&sender, &upfront)?;
        self.note_sending(&sender)?;

        let mut gas = t.gas - intrinsic;
        let (output, contract_address, ok) = match t.action {
            Action::Create => {
                let created =
                    self.create(sender, t.value, t.gas_price, &mut gas, &t.data, sender)?;
                (Bytes::new(), created, created.is_some())
            }
            Action::Call(to) => {
                let (ok, output) =
                    self.call(to, sender, t.value, t.gas_price, &t.data, &mut gas, sender)?;
                (output, None, ok)
            }
        };

        let coinbase = self.current.author;
        self.add_balance(&sender, &(gas * t.gas_price))?;
        self.add_balance(&coinbase, &((t.gas - gas) * t.gas_price))?;

        Ok(Executed {
            gas_used: t.gas - gas,
            output,
            contract_address,
            out_of_gas: !ok,
        })
    }

    /// Execute a contract-creation frame. Returns the new contract's
    /// address, or `None` when the frame failed and left no account.
    pub(crate) fn create(
        &mut self,
        sender: Address,
        endowment: U256,
        gas_price: U256,
        gas: &mut U256,
        code: &[u8],
        origin: Address,
    ) -> Result<Option<Address>, Error> {
        // The sender's nonce was bumped on entry; the address derives from
        // the pre-bump value.
        let nonce = self.transactions_from(&sender)? - U256::one();
        let new_address = contract_address(&sender, &nonce);
        trace!(target: "state", "create {:x} by {:x}", new_address, sender);

        self.checkpoint();
        if let Err(err) = self.transfer_balance(&sender, &new_address, &endowment) {
            self.revert_to_checkpoint();
            return Err(err);
        }

        let vm = self.vm.clone();
        let params = ActionParams {
            address: new_address,
            sender,
            origin,
            gas: *gas,
            gas_price,
            value: endowment,
            code: code.to_vec(),
            data: Bytes::new(),
        };
        let result = {
            let mut ext = Externalities::new(self, new_address, origin, gas_price);
            vm.exec(params, &mut ext)
        };
        match result {
            Ok(out) => {
                *gas = out.gas_left;
                self.init_code(&new_address, out.data)?;
                self.discard_checkpoint();
                Ok(Some(new_address))
            }
            Err(err) => {
                trace!(target: "state", "create frame died: {}", err);
                *gas = U256::zero();
                self.revert_to_checkpoint();
                Ok(None)
            }
        }
    }

    /// Execute a message-call frame. Returns `false` exactly when the
    /// frame exhausted its gas, along with the return data.
    pub(crate) fn call(
        &mut self,
        target: Address,
        sender: Address,
        value: U256,
        gas_price: U256,
        data: &[u8],
        gas: &mut U256,
        origin: Address,
    ) -> Result<(bool, Bytes), Error> {
        self.checkpoint();
        if let Err(err) = self.transfer_balance(&sender, &target, &value) {
            self.revert_to_checkpoint();
            return Err(err);
        }

        let code = match self.code(&target) {
            Ok(code) => code,
            Err(err) => {
                self.revert_to_checkpoint();
                return Err(err);
            }
        };
        let code = match code {
            Some(code) if !code.is_empty() => code,
            _ => {
                // Plain transfer.
                self.discard_checkpoint();
                return Ok((true, Bytes::new()));
            }
        };

        let vm = self.vm.clone();
        let params = ActionParams {
            address: target,
            sender,
            origin,
            gas: *gas,
            gas_price,
            value,
            code,
            data: data.to_vec(),
        };
        let result = {
            let mut ext = Externalities::new(self, target, origin, gas_price);
            vm.exec(params, &mut ext)
        };
        match result {
            Ok(out) => {
                *gas = out.gas_left;
                self.discard_checkpoint();
                Ok((true, out.data))
            }
            Err(err) => {
                trace!(target: "state", "call frame died: {}", err);
                *gas = U256::zero();
                self.revert_to_checkpoint();
                Ok((false, Bytes::new()))
            }
        }
    }

    // --- block playback -------------------------------------------------

    /// Execute all transactions within a given block, verify the result
    /// against the header, and apply rewards. Returns the block's
    /// difficulty. With `full_commit` the overlay is flushed and the state
    /// advances to the played block; otherwise the state returns to its
    /// prior baseline. Any failure leaves no trace of the block.
    pub fn playback(
        &mut self,
        block_bytes: &[u8],
        parent: &Header,
        grand_parent: Option<&Header>,
        full_commit: bool,
    ) -> Result<U256, Error> {
        self.abort_mining();
        let old_root = self.root;
        let old_previous = self.previous.clone();

        match self.enact(block_bytes, parent, grand_parent) {
            Ok(difficulty) => {
                if full_commit {
                    self.db.commit()?;
                    self.previous = self.current.clone();
                    self.reset_current();
                } else {
                    // Verification only: return to the old baseline. The
                    // journalled nodes are orphans a future flush may carry
                    // along; content addressing keeps them inert.
                    self.root = old_root;
                    self.previous = old_previous;
                    self.reset_current();
                }
                Ok(difficulty)
            }
            Err(err) => {
                self.root = old_root;
                self.previous = old_previous;
                self.reset_current();
                Err(err)
            }
        }
    }

    fn enact(
        &mut self,
        block_bytes: &[u8],
        parent: &Header,
        grand_parent: Option<&Header>,
    ) -> Result<U256, Error> {
        let rlp = Rlp::new(block_bytes);
        let block = Block::decode_rlp(&rlp)?;
        let header = block.header.clone();

        verify_header(&header, parent, &self.params)?;

        // The header commits to the raw transaction and uncle list RLP.
        let txs_hash = keccak(rlp.at(1)?.as_raw());
        if txs_hash != header.transactions_root {
            return Err(BlockError::InvalidTransactionsRoot(Mismatch {
                expected: header.transactions_root,
                found: txs_hash,
            })
            .into());
        }
        let uncles_hash = keccak(rlp.at(2)?.as_raw());
        if uncles_hash != header.uncles_hash {
            return Err(BlockError::InvalidUnclesHash(Mismatch {
                expected: header.uncles_hash,
                found: uncles_hash,
            })
            .into());
        }

        if block.uncles.len() > self.params.max_uncles {
            return Err(BlockError::TooManyUncles(OutOfBounds {
                min: None,
                max: Some(self.params.max_uncles),
                found: block.uncles.len(),
            })
            .into());
        }
        let mut seen_uncles = HashSet::new();
        for uncle in &block.uncles {
            let uncle_hash = uncle.hash();
            if uncle_hash == parent.hash() || !seen_uncles.insert(uncle_hash) {
                return Err(BlockError::DuplicateUncle(uncle_hash).into());
            }
            let grand_parent =
                grand_parent.ok_or(BlockError::UncleInvalid(uncle_hash))?;
            if uncle.parent_hash != grand_parent.hash()
                || verify_header(uncle, grand_parent, &self.params).is_err()
            {
                return Err(BlockError::UncleInvalid(uncle_hash).into());
            }
        }

        // Replay on the parent's post-state.
        self.cache.write().clear();
        self.checkpoints.clear();
        self.pending.clear();
        self.pending_set.clear();
        self.previous = parent.clone();
        self.root = parent.state_root;
        self.current = header.clone();

        for tx in &block.transactions {
            self.execute(&tx.encode())?;
        }
        self.apply_rewards(&block.uncles)?;
        self.commit()?;

        if self.root != header.state_root {
            return Err(BlockError::InvalidStateRoot(Mismatch {
                expected: header.state_root,
                found: self.root,
            })
            .into());
        }
        debug!(target: "state", "played back block #{} {:x}", header.number, header.hash());
        Ok(header.difficulty)
    }

    /// Finalise the block, applying the earned rewards: the base reward
    /// plus one thirty-second per uncle to the coinbase, and the
    /// depth-scaled share to each uncle author.
    fn apply_rewards(&mut self, uncles: &[Header]) -> Result<(), Error> {
        let reward = self.params.block_reward;
        let coinbase = self.current.author;
        let bonus = reward * U256::from(uncles.len()) / U256::from(32);
        self.add_balance(&coinbase, &(reward + bonus))?;
        for uncle in uncles {
            let depth = self.current.number - uncle.number;
            if depth < 8 {
                let amount = reward * U256::from(8 - depth) / U256::from(8);
                self.add_balance(&uncle.author, &amount)?;
            }
        }
        Ok(())
    }

    // --- candidate block assembly and mining ----------------------------

    /// Prepare the current state for mining: freeze the pending set and
    /// eligible uncles, apply rewards, commit, and populate the candidate
    /// header with the resulting roots. Repeated calls without an
    /// intervening reset are no-ops.
    pub fn commit_to_mine(&mut self, chain: &dyn BlockProvider) -> Result<(), Error> {
        if !self.current_txs.is_empty() {
            return Ok(());
        }
        self.abort_mining();

        let mut uncles: Vec<Header> = Vec::new();
        if self.previous.number > 0 {
            if let Some(grand_details) = chain.details(&self.previous.parent_hash) {
                let previous_hash = self.previous.hash();
                for child in grand_details.children {
                    if child == previous_hash || uncles.len() >= self.params.max_uncles {
                        continue;
                    }
                    if let Some(header) = chain.info(&child) {
                        uncles.push(header);
                    }
                }
            }
        }

        let mut txs = RlpStream::new();
        txs.begin_list(self.pending.len());
        for t in &self.pending {
            t.rlp_append(&mut txs);
        }
        self.current_txs = txs.out().to_vec();

        let mut uncles_rlp = RlpStream::new();
        uncles_rlp.begin_list(uncles.len());
        for uncle in &uncles {
            uncles_rlp.append(uncle);
        }
        self.current_uncles = uncles_rlp.out().to_vec();

        self.apply_rewards(&uncles)?;
        self.commit()?;

        self.current.state_root = self.root;
        self.current.transactions_root = keccak(&self.current_txs);
        self.current.uncles_hash = keccak(&self.current_uncles);
        debug!(
            target: "miner",
            "commit_to_mine: #{}, {} txs, {} uncles, root {:x}",
            self.current.number,
            self.pending.len(),
            uncles.len(),
            self.root
        );
        Ok(())
    }

    /// Attempt to find a valid nonce for the candidate block, for at most
    /// `ms_timeout` milliseconds. On success the sealed block is available
    /// through [`State::block_data`].
    pub fn mine(&mut self, ms_timeout: u64) -> MineInfo {
        assert!(
            !self.current_txs.is_empty(),
            "commit_to_mine precedes mine; qed"
        );
        self.stop_mining.store(false, Ordering::SeqCst);
        let (nonce, info) = miner::search(
            &self.current.bare_hash(),
            self.current.difficulty,
            Duration::from_millis(ms_timeout),
            &self.stop_mining,
        );
        if let Some(nonce) = nonce {
            self.current.nonce = nonce;
            let mut stream = RlpStream::new_list(3);
            stream.append(&self.current);
            stream.append_raw(&self.current_txs, 1);
            stream.append_raw(&self.current_uncles, 1);
            self.current_bytes = stream.out().to_vec();
        }
        info
    }

    // --- chain and queue synchronization --------------------------------

    /// Sync with the block chain's current head. No-op when already there;
    /// otherwise the working state is discarded and rebuilt on the head's
    /// post-state. Surviving queued transactions are re-applied by a
    /// following [`State::sync_transactions`].
    pub fn sync(&mut self, chain: &dyn BlockProvider) -> Result<bool, Error> {
        let head = chain.current_hash();
        if head == self.previous.hash() {
            return Ok(false);
        }
        let header = chain
            .info(&head)
            .ok_or_else(|| Error::Database(format!("chain head {:x} unknown", head)))?;
        self.abort_mining();
        if header.state_root != KECCAK_NULL_RLP && !self.db.contains(&header.state_root)? {
            return Err(Error::Trie(TrieError::IncompleteDatabase(
                header.state_root,
            )));
        }
        debug!(target: "state", "syncing to head #{} {:x}", header.number, head);
        self.previous = header;
        self.root = self.previous.state_root;
        self.reset_current();
        Ok(true)
    }

    /// Sync with the transaction queue: drop what is already pending,
    /// apply what can be applied, drop what can never apply. Returns
    /// whether the state changed.
    pub fn sync_transactions(&mut self, queue: &mut TransactionQueue) -> Result<bool, Error> {
        let mut changed = false;
        for queued in queue.transactions() {
            if self.pending_set.contains(&queued.hash) {
                queue.remove(&queued.hash);
                continue;
            }
            match self.execute(&queued.bytes) {
                Ok(_) => {
                    changed = true;
                    queue.remove(&queued.hash);
                }
                Err(Error::InvalidNonce(mismatch)) => {
                    if mismatch.found < mismatch.expected {
                        // Stale; a transaction with this nonce already went
                        // through.
                        queue.remove(&queued.hash);
                    }
                }
                Err(Error::InsufficientBalance { .. })
                | Err(Error::OutOfGasIntrinsic { .. })
                | Err(Error::InvalidSignature)
                | Err(Error::AlreadyImported(_))
                | Err(Error::Decoder(_)) => {
                    queue.remove(&queued.hash);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(changed)
    }

    /// Like [`State::sync_transactions`], but only operate on the queue,
    /// killing invalid and stale entries without changing the state.
    pub fn cull(&self, queue: &mut TransactionQueue) -> Result<bool, Error> {
        let mut changed = false;
        for queued in queue.transactions() {
            let drop = if self.pending_set.contains(&queued.hash) {
                true
            } else if queued.nonce < self.transactions_from(&queued.sender)? {
                true
            } else {
                match UnverifiedTransaction::decode(&Rlp::new(&queued.bytes)) {
                    Ok(t) => {
                        let cost = t.gas * t.gas_price + t.value;
                        self.balance(&queued.sender)? < cost
                    }
                    Err(_) => true,
                }
            };
            if drop {
                trace!(target: "state", "culling {:x}", queued.hash);
                queue.remove(&queued.hash);
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// Verify a header against its parent: linkage, number, timestamp, the
/// gas-limit corridor, the difficulty rule and the proof-of-work seal.
fn verify_header(header: &Header, parent: &Header, params: &CommonParams) -> Result<(), Error> {
    if header.parent_hash != parent.hash() {
        return Err(BlockError::InvalidParentHash(Mismatch {
            expected: parent.hash(),
            found: header.parent_hash,
        })
        .into());
    }
    if header.number != parent.number + 1 {
        return Err(BlockError::InvalidNumber(Mismatch {
            expected: parent.number + 1,
            found: header.number,
        })
        .into());
    }
    if header.timestamp <= parent.timestamp {
        return Err(BlockError::InvalidTimestamp(OutOfBounds {
            min: Some(parent.timestamp + 1),
            max: None,
            found: header.timestamp,
        })
        .into());
    }
    if !params.gas_limit_acceptable(header.gas_limit, parent.gas_limit) {
        return Err(BlockError::InvalidGasLimit(OutOfBounds {
            min: Some(params.min_gas_limit),
            max: None,
            found: header.gas_limit,
        })
        .into());
    }
    let expected_difficulty =
        params.child_difficulty(header.timestamp, parent.timestamp, parent.difficulty);
    if header.difficulty != expected_difficulty {
        return Err(BlockError::InvalidDifficulty(Mismatch {
            expected: expected_difficulty,
            found: header.difficulty,
        })
        .into());
    }
    if !miner::verify_seal(header) {
        return Err(BlockError::InvalidSeal.into());
    }
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
