//! Conversions between EVM-side identities and Substrate accounts, and storage key helpers

use crate::types::BridgeError;
use sp_core::crypto::{AccountId32 as SpAccountId32, Ss58AddressFormat, Ss58Codec};
use sp_core::{blake2_128, blake2_256, twox_128, twox_256, twox_64};
use subxt::{metadata::types::StorageHasher, utils::AccountId32};

/// Address mapping logic
pub(crate) struct AddressMapping;

impl AddressMapping {
    /// Account of an ECDSA key: `blake2_256` of the 33 byte compressed public key
    pub fn from_compressed(public: &[u8; 33]) -> AccountId32 {
        AccountId32::from(blake2_256(public))
    }

    /// SS58 text form of `account` under a network `prefix`
    pub fn encode_ss58(account: &AccountId32, prefix: u16) -> String {
        SpAccountId32::new(account.0)
            .to_ss58check_with_version(Ss58AddressFormat::custom(prefix))
    }

    /// Parse `0x`-prefixed hex or SS58 (any network prefix)
    pub fn parse_account(input: &str) -> Result<AccountId32, BridgeError> {
        let input = input.trim();
        if let Some(hex_part) = input.strip_prefix("0x") {
            let mut raw = [0u8; 32];
            hex::decode_to_slice(hex_part, &mut raw)?;
            return Ok(AccountId32(raw));
        }

        let (account, _) = SpAccountId32::from_ss58check_with_version(input)
            .map_err(|_| BridgeError::InvalidInput("account is neither hex nor SS58"))?;
        let raw: [u8; 32] = account.into();
        Ok(AccountId32(raw))
    }
}

/// Final storage key of a plain or map entry
///
/// `keys` are already SCALE encoded and are paired with `hashers` in order.
pub fn storage_key(pallet: &str, entry: &str, hashers: &[StorageHasher], keys: &[Vec<u8>]) -> Vec<u8> {
    let mut final_key = [twox_128(pallet.as_bytes()), twox_128(entry.as_bytes())].concat();

    for (hasher, key) in hashers.iter().zip(keys) {
        match hasher {
            StorageHasher::Blake2_128 => final_key.extend(blake2_128(key)),
            StorageHasher::Blake2_256 => final_key.extend(blake2_256(key)),
            StorageHasher::Blake2_128Concat => final_key.extend(blake2_128(key).iter().chain(key)),
            StorageHasher::Twox128 => final_key.extend(twox_128(key)),
            StorageHasher::Twox256 => final_key.extend(twox_256(key)),
            StorageHasher::Twox64Concat => final_key.extend(twox_64(key).iter().chain(key)),
            StorageHasher::Identity => final_key.extend_from_slice(key),
        }
    }

    final_key
}
