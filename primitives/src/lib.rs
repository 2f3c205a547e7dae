//! # EVM Mapping Primitives
//!
//! Wire types shared between the mapping client and the runtime pallets it talks to:
//! ECDSA signatures as produced by EVM wallets, the EIP-191 signable message, the
//! arguments of a relayed signed call and the EIP-712 typed call used for meta calls.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::{string::String, vec::Vec};
use parity_scale_codec::{Compact, Decode, Encode, Output};
use scale_info::TypeInfo;
use sp_core::hashing::keccak_256;

/// Errors produced while interpreting wallet signatures
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureError {
    /// Signature is not 65 bytes long
    InvalidLength,
    /// `v` is neither 0/1 nor 27/28
    InvalidRecoveryId,
}

/// 65-byte secp256k1 signature in the `[r(32) || s(32) || v(1)]` layout EVM wallets return
#[derive(Clone, Copy, Eq, PartialEq, Encode, Decode, Debug, TypeInfo)]
pub struct EcdsaSignature(pub [u8; 65]);

impl EcdsaSignature {
    /// Parse a signature from raw wallet output
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignatureError> {
        let raw: [u8; 65] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidLength)?;
        Ok(Self(raw))
    }

    /// Build a signature from its components, `v` given as a recovery id or legacy value
    pub fn from_rsv(r: &[u8; 32], s: &[u8; 32], v: u8) -> Self {
        let mut raw = [0u8; 65];
        raw[..32].copy_from_slice(r);
        raw[32..64].copy_from_slice(s);
        raw[64] = v;
        Self(raw)
    }

    /// `r || s`
    pub fn rs(&self) -> &[u8] {
        &self.0[..64]
    }

    /// Recovery id in `0..=1`
    ///
    /// Legacy wallets report `v` as 27 or 28, newer ones as 0 or 1.
    pub fn recovery_id(&self) -> Result<u8, SignatureError> {
        let v = self.0[64];
        let recovery_id = if v >= 27 { v - 27 } else { v };

        if recovery_id > 1 {
            return Err(SignatureError::InvalidRecoveryId);
        }

        Ok(recovery_id)
    }

    /// Same signature with `v` rewritten to the `0..=1` form expected by `secp256k1_ecdsa_recover`
    pub fn normalized(&self) -> Result<Self, SignatureError> {
        let mut raw = self.0;
        raw[64] = self.recovery_id()?;
        Ok(Self(raw))
    }
}

/// Constructs the message that Ethereum RPC's `personal_sign` and `eth_sign` would sign.
pub fn ethereum_signable_message(what: &[u8]) -> Vec<u8> {
    let mut l = what.len();
    let mut rev = Vec::new();
    while l > 0 {
        rev.push(b'0' + (l % 10) as u8);
        l /= 10;
    }
    if rev.is_empty() {
        rev.push(b'0');
    }
    let mut v = b"\x19Ethereum Signed Message:\n".to_vec();
    v.extend(rev.into_iter().rev());
    v.extend_from_slice(what);
    v
}

/// EIP-191 hash of a personal message
pub fn personal_message_hash(what: &[u8]) -> [u8; 32] {
    keccak_256(&ethereum_signable_message(what))
}

/// Magic number of the Astar runtime's `EthCall` pallet (Shiden uses `0x0150`)
pub const ASTAR_CALL_MAGIC: u16 = 0x0250;

/// Arguments of the custom signatures pallet's `call`.
///
/// The runtime checks `nonce` against the signer's `System.Account` nonce, verifies the
/// EIP-191 `signature` over [`RelayedCall::signing_payload`] against `signer` and
/// dispatches the call with `signer` as origin. Submitted unsigned.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RelayedCall {
    /// Encoded runtime call (pallet index, call index, arguments)
    pub call_data: Vec<u8>,
    /// `blake2_256` of the signer's compressed public key
    pub signer: [u8; 32],
    pub signature: EcdsaSignature,
    pub nonce: u32,
}

impl RelayedCall {
    /// `(magic, nonce, call)` SCALE encoded, the bytes the wallet personal-signs
    pub fn signing_payload(magic: u16, nonce: u32, call_data: &[u8]) -> Vec<u8> {
        let mut payload = (magic, nonce).encode();
        payload.extend_from_slice(call_data);
        payload
    }

    /// Hash the runtime recovers the signer from
    pub fn message_hash(&self, magic: u16) -> [u8; 32] {
        personal_message_hash(&Self::signing_payload(
            magic,
            self.nonce,
            &self.call_data,
        ))
    }
}

impl Encode for RelayedCall {
    fn size_hint(&self) -> usize {
        self.call_data.len() + 32 + 2 + 65 + 5
    }

    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        // boxed call, encoded in place
        dest.write(&self.call_data);
        self.signer.encode_to(dest);
        self.signature.0.as_slice().encode_to(dest);
        Compact(self.nonce).encode_to(dest);
    }
}

/// EIP-712 domain used for meta call signatures
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: [u8; 20],
}

impl Eip712Domain {
    pub const TYPE: &'static [u8] =
        b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

    /// Domain of the account mapping pallet on a chain identified by `chain_id`
    pub fn substrate(chain_id: u64) -> Self {
        Self {
            name: "Substrate".into(),
            version: "1".into(),
            chain_id,
            verifying_contract: [0u8; 20],
        }
    }

    /// `hashStruct(domain)`
    pub fn separator(&self) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(32 * 5);
        encoded.extend_from_slice(&keccak_256(Self::TYPE));
        encoded.extend_from_slice(&keccak_256(self.name.as_bytes()));
        encoded.extend_from_slice(&keccak_256(self.version.as_bytes()));
        encoded.extend_from_slice(&uint_word(self.chain_id));
        // address is left padded to a full word
        encoded.extend_from_slice(&[0u8; 12]);
        encoded.extend_from_slice(&self.verifying_contract);
        keccak_256(&encoded)
    }
}

/// Typed data the wallet signs to authorize a meta call
#[derive(Clone, Eq, PartialEq, Encode, Decode, Debug, TypeInfo)]
pub struct SubstrateCall {
    /// SS58 address of the mapped account
    pub who: String,
    /// Encoded runtime call
    pub call_data: Vec<u8>,
    /// Mapping nonce of `who`
    pub nonce: u64,
}

impl SubstrateCall {
    pub const TYPE: &'static [u8] = b"SubstrateCall(string who,bytes callData,uint64 nonce)";

    /// `hashStruct(message)`
    pub fn struct_hash(&self) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(32 * 4);
        encoded.extend_from_slice(&keccak_256(Self::TYPE));
        encoded.extend_from_slice(&keccak_256(self.who.as_bytes()));
        encoded.extend_from_slice(&keccak_256(&self.call_data));
        encoded.extend_from_slice(&uint_word(self.nonce));
        keccak_256(&encoded)
    }

    /// `keccak256("\x19\x01" || domainSeparator || hashStruct(message))`
    pub fn signing_hash(&self, domain: &Eip712Domain) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(2 + 64);
        encoded.extend_from_slice(b"\x19\x01");
        encoded.extend_from_slice(&domain.separator());
        encoded.extend_from_slice(&self.struct_hash());
        keccak_256(&encoded)
    }
}

/// Big-endian 32 byte word of an unsigned integer
fn uint_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}
