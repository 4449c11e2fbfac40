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

//! The externalities handed to the interpreter: a thin privileged view of
//! one frame's account over the live state.

use ethereum_types::{Address, H256, U256};

use super::State;
use crate::{error::Error, vm::Ext};

/// `Ext` implementation over a mutable state borrow. One instance per
/// frame; nested frames get their own through `call`/`create`.
pub struct Externalities<'a> {
    state: &'a mut State,
    address: Address,
    origin: Address,
    gas_price: U256,
}

impl<'a> Externalities<'a> {
    pub(crate) fn new(
        state: &'a mut State,
        address: Address,
        origin: Address,
        gas_price: U256,
    ) -> Self {
        Externalities {
            state,
            address,
            origin,
            gas_price,
        }
    }
}

impl<'a> Ext for Externalities<'a> {
    fn address(&self) -> Address {
        self.address
    }

    fn origin(&self) -> Address {
        self.origin
    }

    fn storage_at(&self, key: &H256) -> Result<H256, Error> {
        self.state.storage(&self.address, key)
    }

    fn set_storage(&mut self, key: H256, value: H256) -> Result<(), Error> {
        self.state.set_storage(&self.address, key, value)
    }

    fn balance(&self, address: &Address) -> Result<U256, Error> {
        self.state.balance(address)
    }

    fn call(
        &mut self,
        gas: &mut U256,
        to: Address,
        value: U256,
        data: &[u8],
        output: &mut [u8],
    ) -> Result<bool, Error> {
        let (ok, returned) =
            self.state
                .call(to, self.address, value, self.gas_price, data, gas, self.origin)?;
        let n = std::cmp::min(output.len(), returned.len());
        output[..n].copy_from_slice(&returned[..n]);
        Ok(ok)
    }

    fn create(
        &mut self,
        gas: &mut U256,
        value: U256,
        code: &[u8],
    ) -> Result<Option<Address>, Error> {
        // The creating account's nonce advances first, so consecutive
        // nested creations land on distinct addresses.
        self.state.note_sending(&self.address)?;
        self.state
            .create(self.address, value, self.gas_price, gas, code, self.origin)
    }
}
