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

//! Transaction data structure.

use std::ops::Deref;

use ethereum_types::{Address, H256, U256};
use keccak_hash::keccak;
use rlp::{self, DecoderError, Rlp, RlpStream};

use crate::{
    crypto::{self, SignatureComponents},
    error::Error,
    params::CommonParams,
    Bytes,
};

/// Transaction action type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Create creates new contract.
    Create,
    /// Calls contract at given address.
    /// In the case of a transfer, this is the receiver's address.
    Call(Address),
}

impl Default for Action {
    fn default() -> Action {
        Action::Create
    }
}

impl rlp::Decodable for Action {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.is_empty() {
            if rlp.is_data() {
                Ok(Action::Create)
            } else {
                Err(DecoderError::RlpExpectedToBeData)
            }
        } else {
            Ok(Action::Call(rlp.as_val()?))
        }
    }
}

impl rlp::Encodable for Action {
    fn rlp_append(&self, s: &mut RlpStream) {
        match *self {
            Action::Create => s.append_empty_data(),
            Action::Call(ref addr) => s.append(addr),
        };
    }
}

/// A set of information describing an externally-originating message call
/// or contract creation operation.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Nonce.
    pub nonce: U256,
    /// Gas price.
    pub gas_price: U256,
    /// Gas paid up front for transaction execution.
    pub gas: U256,
    /// Action, can be either call or contract create.
    pub action: Action,
    /// Transfered value.
    pub value: U256,
    /// Transaction data.
    pub data: Bytes,
}

impl Transaction {
    fn rlp_append_open(&self, s: &mut RlpStream) {
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas);
        s.append(&self.action);
        s.append(&self.value);
        s.append(&self.data);
    }

    /// The message hash the sender signs: keccak of the six open fields.
    pub fn signature_hash(&self) -> H256 {
        let mut stream = RlpStream::new_list(6);
        self.rlp_append_open(&mut stream);
        keccak(stream.out())
    }

    /// Intrinsic gas: the flat data charge plus the call or creation base.
    pub fn gas_required(&self, params: &CommonParams) -> U256 {
        params.intrinsic_gas(self.data.len(), self.action == Action::Create)
    }

    /// Signs the transaction as coming from the holder of `secret`.
    pub fn sign(self, secret: &H256) -> SignedTransaction {
        let sig = crypto::sign_message(secret, &self.signature_hash())
            .expect("secret is valid and message is a hash; qed");
        let sender = crypto::secret_to_address(secret).expect("secret is valid; qed");
        SignedTransaction {
            transaction: UnverifiedTransaction {
                unsigned: self,
                signature: sig,
                hash: H256::zero(),
            }
            .compute_hash(),
            sender,
        }
    }

    fn decode_open(d: &Rlp) -> Result<Transaction, DecoderError> {
        Ok(Transaction {
            nonce: d.val_at(0)?,
            gas_price: d.val_at(1)?,
            gas: d.val_at(2)?,
            action: d.val_at(3)?,
            value: d.val_at(4)?,
            data: d.val_at(5)?,
        })
    }
}

/// Signed transaction information without verified signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedTransaction {
    /// Plain transaction.
    pub unsigned: Transaction,
    /// Transaction signature.
    pub signature: SignatureComponents,
    /// Hash of the signed encoding.
    pub hash: H256,
}

impl Deref for UnverifiedTransaction {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target {
        &self.unsigned
    }
}

impl UnverifiedTransaction {
    /// Decode a signed transaction: the nine-item list
    /// `[nonce, gasPrice, gas, to, value, data, v, r, s]`.
    pub fn decode(d: &Rlp) -> Result<UnverifiedTransaction, DecoderError> {
        if d.item_count()? != 9 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let hash = keccak(d.as_raw());
        let unsigned = Transaction::decode_open(d)?;
        let v: u64 = d.val_at(6)?;
        let signature = SignatureComponents {
            // 27 and 28 are the two curve halves; anything else is left
            // unrecoverable and rejected at signature verification.
            standard_v: match v {
                27 => 0,
                28 => 1,
                _ => 4,
            },
            r: d.val_at(7)?,
            s: d.val_at(8)?,
        };
        Ok(UnverifiedTransaction {
            unsigned,
            signature,
            hash,
        })
    }

    /// Decode a list of signed transactions (the body of a block).
    pub fn decode_rlp_list(rlp: &Rlp) -> Result<Vec<UnverifiedTransaction>, DecoderError> {
        if !rlp.is_list() {
            return Err(DecoderError::RlpExpectedToBeList);
        }
        let mut output = Vec::with_capacity(rlp.item_count()?);
        for tx in rlp.iter() {
            output.push(Self::decode(&tx)?);
        }
        Ok(output)
    }

    /// Append the signed encoding to an RLP stream.
    pub fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(9);
        self.unsigned.rlp_append_open(s);
        s.append(&(self.signature.standard_v as u64 + 27));
        s.append(&self.signature.r);
        s.append(&self.signature.s);
    }

    /// Append a list of signed transactions to an RLP stream.
    pub fn rlp_append_list(s: &mut RlpStream, tx_list: &[UnverifiedTransaction]) {
        s.begin_list(tx_list.len());
        for tx in tx_list {
            tx.rlp_append(s);
        }
    }

    /// The signed encoding.
    pub fn encode(&self) -> Bytes {
        let mut stream = RlpStream::new();
        self.rlp_append(&mut stream);
        stream.out().to_vec()
    }

    /// Used to compute the hash of created transactions.
    fn compute_hash(mut self) -> UnverifiedTransaction {
        self.hash = keccak(&self.encode());
        self
    }

    /// Get the hash of this transaction (keccak of the signed RLP).
    pub fn hash(&self) -> H256 {
        self.hash
    }

    /// Recover the sender address from the signature.
    pub fn recover_sender(&self) -> Result<Address, Error> {
        crypto::recover_address(&self.signature, &self.unsigned.signature_hash())
    }
}

impl rlp::Encodable for UnverifiedTransaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        UnverifiedTransaction::rlp_append(self, s)
    }
}

impl rlp::Decodable for UnverifiedTransaction {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        UnverifiedTransaction::decode(rlp)
    }
}

/// An `UnverifiedTransaction` with successfully recovered `sender`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    transaction: UnverifiedTransaction,
    sender: Address,
}

impl Deref for SignedTransaction {
    type Target = UnverifiedTransaction;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

impl From<SignedTransaction> for UnverifiedTransaction {
    fn from(tx: SignedTransaction) -> Self {
        tx.transaction
    }
}

impl SignedTransaction {
    /// Try to verify transaction and recover sender.
    pub fn new(transaction: UnverifiedTransaction) -> Result<Self, Error> {
        let sender = transaction.recover_sender()?;
        Ok(SignedTransaction {
            transaction,
            sender,
        })
    }

    /// Returns transaction sender.
    pub fn sender(&self) -> Address {
        self.sender
    }
}
