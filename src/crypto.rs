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

//! secp256k1 signing and sender recovery over 32-byte message hashes.

use ethereum_types::{Address, H256, U256};
use keccak_hash::keccak;
use libsecp256k1::{
    curve::Scalar, recover as secp_recover, sign as secp_sign, Message, PublicKey, RecoveryId,
    SecretKey, Signature,
};

use crate::error::Error;

/// An ECDSA signature in recoverable form: the curve point `(r, s)` plus the
/// recovery parity `standard_v` (0 or 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureComponents {
    /// Which half of the curve the point falls in.
    pub standard_v: u8,
    /// The R field of the signature.
    pub r: U256,
    /// The S field of the signature.
    pub s: U256,
}

impl SignatureComponents {
    /// True for the all-zero placeholder signature.
    pub fn is_zero(&self) -> bool {
        self.r.is_zero() && self.s.is_zero()
    }
}

fn to_scalar(v: &U256) -> Scalar {
    let mut bytes = [0u8; 32];
    v.to_big_endian(&mut bytes);
    let mut scalar = Scalar([0; 8]);
    let _ = scalar.set_b32(&bytes);
    scalar
}

fn parse(sig: &SignatureComponents) -> Result<(Signature, RecoveryId), Error> {
    let r = to_scalar(&sig.r);
    let s = to_scalar(&sig.s);
    // A high s is malleable and rejected outright.
    if s.is_high() || sig.is_zero() {
        return Err(Error::InvalidSignature);
    }
    let recovery_id = RecoveryId::parse(sig.standard_v).map_err(|_| Error::InvalidSignature)?;
    Ok((Signature { r, s }, recovery_id))
}

/// The address of a public key: the low 160 bits of the keccak of its
/// uncompressed serialization.
pub fn public_to_address(public: &PublicKey) -> Address {
    let serialized = public.serialize();
    let hash = keccak(&serialized[1..]);
    Address::from_slice(&hash.as_bytes()[12..])
}

/// Recover the signer's address from a signature over `message`.
pub fn recover_address(sig: &SignatureComponents, message: &H256) -> Result<Address, Error> {
    let (signature, recovery_id) = parse(sig)?;
    let msg = Message::parse(message.as_fixed_bytes());
    let public =
        secp_recover(&msg, &signature, &recovery_id).map_err(|_| Error::InvalidSignature)?;
    Ok(public_to_address(&public))
}

/// Sign `message` with the raw 32-byte `secret`.
pub fn sign_message(secret: &H256, message: &H256) -> Result<SignatureComponents, Error> {
    let key =
        SecretKey::parse(secret.as_fixed_bytes()).map_err(|_| Error::InvalidSignature)?;
    let msg = Message::parse(message.as_fixed_bytes());
    let (signature, recovery_id) = secp_sign(&msg, &key);
    Ok(SignatureComponents {
        standard_v: recovery_id.into(),
        r: U256::from_big_endian(&signature.r.b32()),
        s: U256::from_big_endian(&signature.s.b32()),
    })
}

/// The address controlled by the raw 32-byte `secret`.
pub fn secret_to_address(secret: &H256) -> Result<Address, Error> {
    let key =
        SecretKey::parse(secret.as_fixed_bytes()).map_err(|_| Error::InvalidSignature)?;
    Ok(public_to_address(&PublicKey::from_secret_key(&key)))
}

/// A fresh random secret key, as raw bytes.
pub fn random_secret() -> H256 {
    let key = SecretKey::random(&mut rand::rngs::OsRng);
    H256::from_slice(&key.serialize())
}
