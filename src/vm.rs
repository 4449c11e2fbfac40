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

//! The seam between the state engine and the byte-code interpreter.
//!
//! The interpreter itself lives outside this crate. The engine hands it an
//! [`ActionParams`] describing the frame and an [`Ext`] — the narrow
//! privileged capability through which the running code reads and writes
//! state and spawns nested frames. Whatever the interpreter mutates goes
//! through `Ext`, so the engine's per-frame savepoints see everything.

use std::fmt;

use ethereum_types::{Address, H256, U256};

use crate::{error::Error, Bytes};

/// Everything the interpreter needs to know about the frame it is about to
/// run.
#[derive(Debug, Clone, Default)]
pub struct ActionParams {
    /// The address whose storage the frame operates on.
    pub address: Address,
    /// The caller of this frame.
    pub sender: Address,
    /// The original transaction sender.
    pub origin: Address,
    /// Gas available to the frame.
    pub gas: U256,
    /// Gas price of the enclosing transaction.
    pub gas_price: U256,
    /// Value transferred into the frame.
    pub value: U256,
    /// Code being executed.
    pub code: Bytes,
    /// Input data.
    pub data: Bytes,
}

/// Exceptional frame termination. Out-of-gas and its cousins are outcomes
/// of execution, not engine failures: the enclosing frame is reverted and
/// the transaction itself still stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// The frame ran out of gas.
    OutOfGas,
    /// A jump to an invalid destination.
    BadJumpDestination {
        /// Offset the code tried to jump to.
        destination: usize,
    },
    /// An undefined or disallowed instruction.
    BadInstruction {
        /// The opcode.
        instruction: u8,
    },
    /// Pop on an empty stack.
    StackUnderflow {
        /// Items wanted.
        wanted: usize,
        /// Items available.
        on_stack: usize,
    },
    /// Push past the stack limit.
    OutOfStack {
        /// Items wanted.
        wanted: usize,
        /// The limit.
        limit: usize,
    },
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::VmError::*;
        match self {
            OutOfGas => write!(f, "Out of gas"),
            BadJumpDestination { destination } => {
                write!(f, "Bad jump destination {:x}", destination)
            }
            BadInstruction { instruction } => write!(f, "Bad instruction {:x}", instruction),
            StackUnderflow { wanted, on_stack } => {
                write!(f, "Stack underflow: wanted {}, had {}", wanted, on_stack)
            }
            OutOfStack { wanted, limit } => {
                write!(f, "Out of stack: wanted {}, limit {}", wanted, limit)
            }
        }
    }
}

/// What a frame left behind on ordinary termination.
#[derive(Debug, Clone, Default)]
pub struct VmOutput {
    /// Gas remaining.
    pub gas_left: U256,
    /// Return data.
    pub data: Bytes,
}

/// Result of a frame execution.
pub type VmResult = Result<VmOutput, VmError>;

/// The privileged capability handed to the interpreter. All state access
/// from running code goes through here; nested frames observe uncommitted
/// changes of their ancestors.
pub trait Ext {
    /// The address of the executing frame.
    fn address(&self) -> Address;

    /// The original transaction sender.
    fn origin(&self) -> Address;

    /// A storage word of the executing account.
    fn storage_at(&self, key: &H256) -> Result<H256, Error>;

    /// Write a storage word of the executing account.
    fn set_storage(&mut self, key: H256, value: H256) -> Result<(), Error>;

    /// Balance of any account.
    fn balance(&self, address: &Address) -> Result<U256, Error>;

    /// Spawn a nested message call. `gas` is drawn down in place; the
    /// return slice is copied into `output`, truncated to its length.
    /// Returns `false` exactly when the nested frame exhausted its gas.
    fn call(
        &mut self,
        gas: &mut U256,
        to: Address,
        value: U256,
        data: &[u8],
        output: &mut [u8],
    ) -> Result<bool, Error>;

    /// Spawn a nested contract creation. Returns the new address, or
    /// `None` when the creation frame failed and left no account.
    fn create(&mut self, gas: &mut U256, value: U256, code: &[u8])
        -> Result<Option<Address>, Error>;
}

/// A byte-code interpreter.
pub trait Vm: Send + Sync {
    /// Run `params.code` against the given externalities.
    fn exec(&self, params: ActionParams, ext: &mut dyn Ext) -> VmResult;
}

/// The do-nothing interpreter: consumes no gas, returns no data. Plain
/// value transfers and the whole block pipeline work with it; anything
/// needing real byte-code semantics plugs in its own [`Vm`].
pub struct NullVm;

impl Vm for NullVm {
    fn exec(&self, params: ActionParams, _ext: &mut dyn Ext) -> VmResult {
        Ok(VmOutput {
            gas_left: params.gas,
            data: Bytes::new(),
        })
    }
}
