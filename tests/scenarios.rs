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

//! End-to-end scenarios over the whole engine: transfers, contract
//! storage, candidate assembly, mining and playback.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use ethereum_types::{Address, H256, U256};
use ledger_state::{
    chain::MemoryBlockChain,
    crypto::{random_secret, secret_to_address},
    error::Error,
    genesis::genesis_block,
    miner::verify_seal,
    params::CommonParams,
    queue::TransactionQueue,
    state::{contract_address, State},
    types::{Action, Header, Transaction},
    vm::{Ext, NullVm, Vm, VmError, VmOutput, VmResult},
    OverlayDb,
};

const COINBASE: u64 = 0xc0ffee;

fn null_vm_state(db: &OverlayDb) -> State {
    State::new(
        db.clone(),
        Address::from_low_u64_be(COINBASE),
        Arc::new(CommonParams::default()),
        Arc::new(NullVm),
    )
    .unwrap()
}

fn transfer(secret: &H256, nonce: u64, to: Address, value: u64, gas_price: u64) -> Vec<u8> {
    Transaction {
        action: Action::Call(to),
        nonce: nonce.into(),
        gas_price: gas_price.into(),
        gas: 21_000.into(),
        value: value.into(),
        data: vec![],
    }
    .sign(secret)
    .encode()
}

/// Seed a funded account on top of the genesis allotment and freeze the
/// result as the baseline block the test chain starts from.
fn seeded_baseline(db: &OverlayDb, state: &mut State, accounts: &[(Address, u64)]) -> Header {
    for (address, balance) in accounts {
        state.add_balance(address, &U256::from(*balance)).unwrap();
    }
    state.commit().unwrap();
    db.commit().unwrap();
    let mut baseline = state.previous().clone();
    baseline.state_root = state.root_hash();
    baseline
}

fn reopen(db: &OverlayDb, baseline: &Header, vm: Arc<dyn Vm>) -> State {
    State::from_existing(
        db.clone(),
        baseline.clone(),
        Address::from_low_u64_be(COINBASE),
        Arc::new(CommonParams::default()),
        vm,
    )
    .unwrap()
}

// --- S1 / S2: simple transfer and insufficient balance ------------------

#[test]
fn s1_simple_transfer() {
    let db = OverlayDb::new_transient();
    let mut state = null_vm_state(&db);
    let secret = random_secret();
    let a = secret_to_address(&secret).unwrap();
    let b = Address::from_low_u64_be(0x0b);
    state.add_balance(&a, &1_000.into()).unwrap();

    state.execute(&transfer(&secret, 0, b, 100, 0)).unwrap();

    assert_eq!(state.balance(&a).unwrap(), U256::from(900));
    assert_eq!(state.balance(&b).unwrap(), U256::from(100));
    assert_eq!(state.transactions_from(&a).unwrap(), U256::one());
}

#[test]
fn s2_insufficient_balance_leaves_state_unchanged() {
    let db = OverlayDb::new_transient();
    let mut state = null_vm_state(&db);
    let secret = random_secret();
    let a = secret_to_address(&secret).unwrap();
    let b = Address::from_low_u64_be(0x0b);
    state.add_balance(&a, &1_000.into()).unwrap();
    state.commit().unwrap();
    let root = state.root_hash();

    let err = state
        .execute(&transfer(&secret, 0, b, 2_000, 0))
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientBalance { .. }));
    assert_eq!(state.balance(&a).unwrap(), U256::from(1_000));
    assert_eq!(state.transactions_from(&a).unwrap(), U256::zero());
    state.commit().unwrap();
    assert_eq!(state.root_hash(), root);
}

// --- S3: nonce gap through the queue -------------------------------------

#[test]
fn s3_nonce_gap_applies_after_sync() {
    let db = OverlayDb::new_transient();
    let mut state = null_vm_state(&db);
    let secret = random_secret();
    let a = secret_to_address(&secret).unwrap();
    let b = Address::from_low_u64_be(0x0b);
    state.add_balance(&a, &10_000.into()).unwrap();

    let first = transfer(&secret, 1, b, 10, 0);
    let second = transfer(&secret, 0, b, 10, 0);

    let mut queue = TransactionQueue::new();
    queue.attempt_import(&first).unwrap();

    // Direct execution of the future-nonce transaction is rejected...
    assert!(matches!(
        state.execute(&first),
        Err(Error::InvalidNonce(_))
    ));
    // ...the zero-nonce one applies...
    state.execute(&second).unwrap();
    assert_eq!(state.transactions_from(&a).unwrap(), U256::one());

    // ...and the sync pass picks the queued one up.
    assert!(state.sync_transactions(&mut queue).unwrap());
    assert_eq!(state.transactions_from(&a).unwrap(), U256::from(2));
    assert_eq!(state.balance(&b).unwrap(), U256::from(20));
    assert!(queue.is_empty());
}

#[test]
fn stale_and_broke_transactions_are_culled() {
    let db = OverlayDb::new_transient();
    let mut state = null_vm_state(&db);
    let secret = random_secret();
    let a = secret_to_address(&secret).unwrap();
    let b = Address::from_low_u64_be(0x0b);
    state.add_balance(&a, &100_000.into()).unwrap();

    let applied = transfer(&secret, 0, b, 10, 0);
    let stale = transfer(&secret, 0, b, 11, 0);
    let broke = transfer(&secret, 1, b, 10_000_000, 0);
    let good = transfer(&secret, 1, b, 10, 0);

    state.execute(&applied).unwrap();

    let mut queue = TransactionQueue::new();
    queue.attempt_import(&stale).unwrap();
    queue.attempt_import(&broke).unwrap();
    queue.attempt_import(&good).unwrap();

    assert!(state.cull(&mut queue).unwrap());
    assert_eq!(queue.len(), 1);
    assert!(queue.contains(&keccak_hash::keccak(&good)));

    // Cull is read-only.
    assert_eq!(state.transactions_from(&a).unwrap(), U256::one());
    assert_eq!(state.balance(&b).unwrap(), U256::from(10));
}

// --- S4: contract storage persists across reopen -------------------------

/// Interpreter used for the storage scenario: the constructor stores 42
/// under key 7 and deploys its own init code.
struct StoreVm;

impl Vm for StoreVm {
    fn exec(&self, params: ledger_state::vm::ActionParams, ext: &mut dyn Ext) -> VmResult {
        ext.set_storage(H256::from_low_u64_be(7), H256::from_low_u64_be(42))
            .map_err(|_| VmError::OutOfGas)?;
        Ok(VmOutput {
            gas_left: params.gas,
            data: params.code,
        })
    }
}

#[test]
fn s4_storage_survives_commit_and_reopen() {
    let db = OverlayDb::new_transient();
    let params = Arc::new(CommonParams::default());
    let secret = random_secret();
    let a = secret_to_address(&secret).unwrap();

    let mut state = State::new(
        db.clone(),
        Address::from_low_u64_be(COINBASE),
        params.clone(),
        Arc::new(StoreVm),
    )
    .unwrap();
    state.add_balance(&a, &10_000_000.into()).unwrap();

    let create = Transaction {
        action: Action::Create,
        nonce: 0.into(),
        gas_price: 0.into(),
        gas: 100_000.into(),
        value: 0.into(),
        data: b"\x60\x60\x60".to_vec(),
    }
    .sign(&secret)
    .encode();
    let executed = state.execute(&create).unwrap();
    let c = executed.contract_address.expect("creation succeeds");
    assert_eq!(c, contract_address(&a, &U256::zero()));

    state.commit().unwrap();
    db.commit().unwrap();
    let mut baseline = state.previous().clone();
    baseline.state_root = state.root_hash();

    let reopened = reopen(&db, &baseline, Arc::new(NullVm));
    assert_eq!(
        reopened.storage(&c, &H256::from_low_u64_be(7)).unwrap(),
        H256::from_low_u64_be(42)
    );
    assert_eq!(
        reopened.storage(&c, &H256::from_low_u64_be(8)).unwrap(),
        H256::zero()
    );
    assert_eq!(reopened.code(&c).unwrap(), Some(b"\x60\x60\x60".to_vec()));
    assert!(reopened.address_has_code(&c).unwrap());
}

// --- S5: rollback --------------------------------------------------------

#[test]
fn s5_rollback_restores_root() {
    let db = OverlayDb::new_transient();
    let mut state = null_vm_state(&db);
    let secret = random_secret();
    let a = secret_to_address(&secret).unwrap();
    state.add_balance(&a, &10_000.into()).unwrap();
    state.commit().unwrap();
    let root = state.root_hash();

    for nonce in 0..5 {
        state
            .execute(&transfer(&secret, nonce, Address::from_low_u64_be(0x0b), 10, 0))
            .unwrap();
    }
    assert_eq!(state.pending().len(), 5);

    state.rollback();
    assert_eq!(state.root_hash(), root);
    assert!(state.pending().is_empty());
    assert_eq!(state.balance(&a).unwrap(), U256::from(10_000));
}

// --- out-of-gas frames ---------------------------------------------------

/// Interpreter whose runtime frames always die of gas exhaustion after
/// touching storage; constructors deploy their init code untouched.
struct ExhaustingVm;

impl Vm for ExhaustingVm {
    fn exec(&self, params: ledger_state::vm::ActionParams, ext: &mut dyn Ext) -> VmResult {
        if params.data.is_empty() {
            // Constructor frame.
            return Ok(VmOutput {
                gas_left: params.gas,
                data: params.code,
            });
        }
        ext.set_storage(H256::from_low_u64_be(1), H256::from_low_u64_be(0xbad))
            .map_err(|_| VmError::OutOfGas)?;
        Err(VmError::OutOfGas)
    }
}

#[test]
fn out_of_gas_is_an_outcome_not_an_error() {
    let db = OverlayDb::new_transient();
    let secret = random_secret();
    let a = secret_to_address(&secret).unwrap();
    let mut state = State::new(
        db.clone(),
        Address::from_low_u64_be(COINBASE),
        Arc::new(CommonParams::default()),
        Arc::new(ExhaustingVm),
    )
    .unwrap();
    state.add_balance(&a, &10_000_000.into()).unwrap();

    let create = Transaction {
        action: Action::Create,
        nonce: 0.into(),
        gas_price: 0.into(),
        gas: 100_000.into(),
        value: 0.into(),
        data: vec![0x01],
    }
    .sign(&secret)
    .encode();
    let c = state.execute(&create).unwrap().contract_address.unwrap();

    let call = Transaction {
        action: Action::Call(c),
        nonce: 1.into(),
        gas_price: 1.into(),
        gas: 50_000.into(),
        value: 0.into(),
        data: vec![0xff],
    }
    .sign(&secret)
    .encode();
    let executed = state.execute(&call).unwrap();

    // The transaction stands, the frame's storage write does not, and the
    // whole gas budget burned.
    assert!(executed.out_of_gas);
    assert_eq!(executed.gas_used, U256::from(50_000));
    assert_eq!(state.pending().len(), 2);
    assert_eq!(
        state.storage(&c, &H256::from_low_u64_be(1)).unwrap(),
        H256::zero()
    );
}

// --- nested frames revert independently ----------------------------------

/// Two-contract scenario: `outer` writes its own storage, then calls
/// `inner`, which writes storage and dies. The inner write must unwind,
/// the outer one must not.
struct NestedVm {
    inner: Address,
}

impl Vm for NestedVm {
    fn exec(&self, params: ledger_state::vm::ActionParams, ext: &mut dyn Ext) -> VmResult {
        if params.data.is_empty() {
            return Ok(VmOutput {
                gas_left: params.gas,
                data: params.code,
            });
        }
        match params.code.first() {
            // Inner: taint storage, then die.
            Some(0x01) => {
                ext.set_storage(H256::from_low_u64_be(1), H256::from_low_u64_be(0xbad))
                    .map_err(|_| VmError::OutOfGas)?;
                Err(VmError::OutOfGas)
            }
            // Outer: write, call inner, report the verdict.
            Some(0x02) => {
                ext.set_storage(H256::from_low_u64_be(2), H256::from_low_u64_be(0x900d))
                    .map_err(|_| VmError::OutOfGas)?;
                let mut gas = params.gas;
                let ok = ext
                    .call(&mut gas, self.inner, U256::zero(), &[0xff], &mut [])
                    .map_err(|_| VmError::OutOfGas)?;
                Ok(VmOutput {
                    gas_left: gas,
                    data: vec![ok as u8],
                })
            }
            _ => Ok(VmOutput {
                gas_left: params.gas,
                data: vec![],
            }),
        }
    }
}

#[test]
fn nested_frame_failure_reverts_only_its_own_writes() {
    let db = OverlayDb::new_transient();
    let secret = random_secret();
    let a = secret_to_address(&secret).unwrap();
    let inner = contract_address(&a, &U256::zero());
    let outer = contract_address(&a, &U256::one());

    let mut state = State::new(
        db.clone(),
        Address::from_low_u64_be(COINBASE),
        Arc::new(CommonParams::default()),
        Arc::new(NestedVm { inner }),
    )
    .unwrap();
    state.add_balance(&a, &10_000_000.into()).unwrap();

    for (nonce, opcode) in [(0u64, 0x01u8), (1, 0x02)].iter() {
        let create = Transaction {
            action: Action::Create,
            nonce: (*nonce).into(),
            gas_price: 0.into(),
            gas: 100_000.into(),
            value: 0.into(),
            data: vec![*opcode],
        }
        .sign(&secret)
        .encode();
        state.execute(&create).unwrap();
    }

    let call = Transaction {
        action: Action::Call(outer),
        nonce: 2.into(),
        gas_price: 0.into(),
        gas: 100_000.into(),
        value: 0.into(),
        data: vec![0xff],
    }
    .sign(&secret)
    .encode();
    let executed = state.execute(&call).unwrap();

    // The nested call reported failure.
    assert_eq!(executed.output, vec![0u8]);
    assert!(!executed.out_of_gas);
    // Outer write survived; inner write unwound.
    assert_eq!(
        state.storage(&outer, &H256::from_low_u64_be(2)).unwrap(),
        H256::from_low_u64_be(0x900d)
    );
    assert_eq!(
        state.storage(&inner, &H256::from_low_u64_be(1)).unwrap(),
        H256::zero()
    );
}

// --- S6: mine and replay -------------------------------------------------

#[test]
fn s6_mine_and_replay_reproduces_state_root() {
    let db = OverlayDb::new_transient();
    let mut state = null_vm_state(&db);
    let secret = random_secret();
    let a = secret_to_address(&secret).unwrap();
    let b = Address::from_low_u64_be(0x0b);
    let baseline = seeded_baseline(&db, &mut state, &[(a, 1_000_000)]);

    let chain = MemoryBlockChain::new(genesis_block(baseline.clone())).unwrap();
    let mut state = reopen(&db, &baseline, Arc::new(NullVm));

    state.execute(&transfer(&secret, 0, b, 100, 1)).unwrap();
    state.commit_to_mine(&chain).unwrap();
    let candidate_root = state.current().state_root;

    // Property 8: commitToMine is idempotent.
    state.commit_to_mine(&chain).unwrap();
    assert_eq!(state.current().state_root, candidate_root);

    let deadline = Instant::now() + Duration::from_secs(120);
    let mut completed = false;
    while Instant::now() < deadline {
        let info = state.mine(500);
        assert_eq!(info.required, U256::MAX / state.current().difficulty);
        if info.completed {
            completed = true;
            break;
        }
    }
    assert!(completed, "pow search at minimum difficulty must succeed");

    let block = state.block_data().to_vec();
    let mined = state.current().clone();
    assert!(verify_seal(&mined));

    // Balance conservation over playback, measured on a fresh state.
    let reader = reopen(&db, &baseline, Arc::new(NullVm));
    let before: U256 = reader
        .addresses()
        .unwrap()
        .values()
        .fold(U256::zero(), |sum, b| sum + *b);

    let mut fresh = reopen(&db, &baseline, Arc::new(NullVm));
    let difficulty = fresh.playback(&block, &baseline, None, true).unwrap();
    assert_eq!(difficulty, mined.difficulty);
    assert_eq!(fresh.root_hash(), mined.state_root);
    assert_eq!(fresh.previous().hash(), mined.hash());

    let after: U256 = fresh
        .addresses()
        .unwrap()
        .values()
        .fold(U256::zero(), |sum, b| sum + *b);
    assert_eq!(after - before, fresh.params().block_reward);
}

#[test]
fn tampered_block_is_rejected_and_leaves_no_trace() {
    let db = OverlayDb::new_transient();
    let mut state = null_vm_state(&db);
    let secret = random_secret();
    let a = secret_to_address(&secret).unwrap();
    let baseline = seeded_baseline(&db, &mut state, &[(a, 1_000_000)]);
    let chain = MemoryBlockChain::new(genesis_block(baseline.clone())).unwrap();

    let mut miner_state = reopen(&db, &baseline, Arc::new(NullVm));
    miner_state
        .execute(&transfer(&secret, 0, Address::from_low_u64_be(0x0b), 100, 0))
        .unwrap();
    miner_state.commit_to_mine(&chain).unwrap();
    while !miner_state.mine(500).completed {}
    let block = miner_state.block_data().to_vec();

    // A lying state root: re-seal the forged header so it gets past the
    // proof-of-work check, then watch the replayed root expose it.
    let mut forged = ledger_state::types::Block::decode_rlp(&rlp::Rlp::new(&block)).unwrap();
    forged.header.state_root = H256::repeat_byte(0x13);
    let stop = AtomicBool::new(false);
    let (nonce, info) = ledger_state::miner::search(
        &forged.header.bare_hash(),
        forged.header.difficulty,
        Duration::from_secs(120),
        &stop,
    );
    assert!(info.completed);
    forged.header.nonce = nonce.unwrap();

    let mut fresh = reopen(&db, &baseline, Arc::new(NullVm));
    let root_before = fresh.root_hash();
    let err = fresh
        .playback(&forged.rlp_bytes(), &baseline, None, true)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Block(ledger_state::error::BlockError::InvalidStateRoot(_))
    ));
    assert_eq!(fresh.root_hash(), root_before);
    assert!(fresh.pending().is_empty());

    // A zeroed seal fails outright.
    let mut unsealed = ledger_state::types::Block::decode_rlp(&rlp::Rlp::new(&block)).unwrap();
    unsealed.header.nonce = Default::default();
    assert!(matches!(
        fresh.playback(&unsealed.rlp_bytes(), &baseline, None, true),
        Err(Error::Block(_))
    ));
}

// --- sync to chain head --------------------------------------------------

#[test]
fn sync_adopts_the_chain_head_and_requeues_pending() {
    let db = OverlayDb::new_transient();
    let mut state = null_vm_state(&db);
    let secret = random_secret();
    let a = secret_to_address(&secret).unwrap();
    let b = Address::from_low_u64_be(0x0b);
    let baseline = seeded_baseline(&db, &mut state, &[(a, 1_000_000)]);
    let mut chain = MemoryBlockChain::new(genesis_block(baseline.clone())).unwrap();

    // A peer mines the first transfer into a block.
    let mut peer = reopen(&db, &baseline, Arc::new(NullVm));
    let tx0 = transfer(&secret, 0, b, 100, 0);
    let tx1 = transfer(&secret, 1, b, 25, 0);
    peer.execute(&tx0).unwrap();
    peer.commit_to_mine(&chain).unwrap();
    while !peer.mine(500).completed {}
    chain.insert_block(peer.block_data().to_vec()).unwrap();

    // We hold both transactions queued and have applied neither.
    let mut us = reopen(&db, &baseline, Arc::new(NullVm));
    let mut queue = TransactionQueue::new();
    queue.attempt_import(&tx0).unwrap();
    queue.attempt_import(&tx1).unwrap();

    // Bring the peer's block into our overlay by replaying it.
    us.playback(
        &chain.block(&chain.current_hash()).unwrap(),
        &baseline,
        None,
        true,
    )
    .unwrap();

    // Already at head: no-op.
    assert!(!us.sync(&chain).unwrap());

    // Re-apply what survives: tx0 is stale (its nonce went through in the
    // block), tx1 applies.
    assert!(us.sync_transactions(&mut queue).unwrap());
    assert_eq!(us.balance(&b).unwrap(), U256::from(125));
    assert!(queue.is_empty());
}

// --- mining cancellation -------------------------------------------------

#[test]
fn concurrent_stop_flag_aborts_mining_within_the_slice() {
    // A difficulty so high the search cannot complete.
    let params = CommonParams {
        minimum_difficulty: U256::MAX >> 32,
        ..Default::default()
    };
    let db = OverlayDb::new_transient();
    let mut state = State::new(
        db.clone(),
        Address::from_low_u64_be(COINBASE),
        Arc::new(params),
        Arc::new(NullVm),
    )
    .unwrap();
    let baseline = state.previous().clone();
    let chain = MemoryBlockChain::new(genesis_block(baseline)).unwrap();
    state.commit_to_mine(&chain).unwrap();

    let stop: Arc<AtomicBool> = state.stop_handle();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        stop.store(true, Ordering::SeqCst);
    });

    let started = Instant::now();
    let info = state.mine(60_000);
    canceller.join().unwrap();

    assert!(!info.completed);
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "mining must stop shortly after cancellation"
    );
}
