//! Account mapping bridge
//!
//! Resolves the connected EVM wallet into a target chain account and produces the
//! [`MappedSigner`] for the configured [`Strategy`]. All strategies start from one
//! identity signature: the wallet signs [`IDENTITY_MESSAGE`], the public key is recovered
//! from it and compressed, and the account is the `blake2_256` hash of that key.

use crate::adapter::AddressMapping;
use crate::signer::{MappedSigner, MAPPING_PALLET, META_CALL, RELAY_CALL, RELAY_PALLET};
use crate::traits::{ChainApi, WalletProvider};
use crate::types::{BridgeError, Strategy};
use alloy_primitives::{keccak256, Address};
use evm_mapping_primitives::{personal_message_hash, EcdsaSignature, ASTAR_CALL_MAGIC};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use std::sync::Arc;
use subxt::utils::AccountId32;

/// Message signed once per session to disclose the wallet's public key
pub const IDENTITY_MESSAGE: &[u8] =
    b"Sign this message to link your EVM account with its Substrate account.";

/// Per-deployment bridge parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    pub strategy: Strategy,
    /// SS58 network prefix used to render accounts
    pub ss58_prefix: u16,
    /// Chain id of the EIP-712 domain for meta calls
    pub eip712_chain_id: u64,
    /// Magic number the relay pallet binds signatures to
    pub call_magic: u16,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::Runtime,
            ss58_prefix: 42,
            eip712_chain_id: 1,
            call_magic: ASTAR_CALL_MAGIC,
        }
    }
}

/// Both identities of one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAccount {
    pub evm_address: Address,
    /// SEC1 compressed secp256k1 public key
    pub public_key: [u8; 33],
    /// `blake2_256(public_key)`
    pub account_id: AccountId32,
}

impl DerivedAccount {
    pub fn ss58(&self, prefix: u16) -> String {
        AddressMapping::encode_ss58(&self.account_id, prefix)
    }
}

/// Recover the signing key from a signature over `prehash`
pub fn recover_public(
    prehash: &[u8; 32],
    signature: &EcdsaSignature,
) -> Result<VerifyingKey, BridgeError> {
    let normalized = signature.normalized()?;
    let mut sig = Signature::from_slice(normalized.rs())
        .map_err(|_| BridgeError::InvalidSignature("malformed r or s"))?;
    let mut recovery_id = RecoveryId::from_byte(normalized.0[64])
        .ok_or(BridgeError::InvalidSignature("recovery id out of range"))?;

    // high-s signatures are valid for recovery once flipped to the low half
    if let Some(low) = sig.normalize_s() {
        sig = low;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    VerifyingKey::recover_from_prehash(prehash, &sig, recovery_id)
        .map_err(|_| BridgeError::InvalidSignature("public key recovery failed"))
}

/// 33 byte compressed form of `key`
pub fn compress(key: &VerifyingKey) -> [u8; 33] {
    let point = key.as_affine().to_encoded_point(true);
    let mut compressed = [0u8; 33];
    compressed.copy_from_slice(point.as_bytes());
    compressed
}

/// EVM address of `key`: last 20 bytes of `keccak256(x || y)`
pub fn eth_address(key: &VerifyingKey) -> Address {
    let point = key.as_affine().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Local derivation
///
/// 1. hash the personal message, 2. recover the public key, 3. compress it,
/// 4. hash it into an account id.
pub fn derive_account(
    message: &[u8],
    signature: &EcdsaSignature,
) -> Result<DerivedAccount, BridgeError> {
    let prehash = personal_message_hash(message);
    let key = recover_public(&prehash, signature)?;
    let public_key = compress(&key);

    Ok(DerivedAccount {
        evm_address: eth_address(&key),
        public_key,
        account_id: AddressMapping::from_compressed(&public_key),
    })
}

/// Local derivation down to the SS58 address (step 5)
pub fn derive_address(
    message: &[u8],
    signature: &EcdsaSignature,
    ss58_prefix: u16,
) -> Result<String, BridgeError> {
    Ok(derive_account(message, signature)?.ss58(ss58_prefix))
}

/// Check that `signature` over the personal `message` was made by `expected`
pub fn verify_personal(
    message: &[u8],
    signature: &EcdsaSignature,
    expected: Address,
) -> Result<(), BridgeError> {
    let key = recover_public(&personal_message_hash(message), signature)?;
    let recovered = eth_address(&key);
    if recovered != expected {
        log::debug!("signature recovered to {recovered}, expected {expected}");
        return Err(BridgeError::InvalidSignature("signer does not match address"));
    }
    Ok(())
}

/// Produces mapped signers for one deployment
#[derive(Debug, Clone)]
pub struct AccountMappingBridge {
    settings: BridgeSettings,
}

impl AccountMappingBridge {
    pub fn new(settings: BridgeSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Derive the signer for (`address`, `chain`)
    ///
    /// Prompts the wallet exactly once, for the identity signature.
    pub async fn derive(
        &self,
        chain: &Arc<dyn ChainApi>,
        wallet: Arc<dyn WalletProvider>,
        address: Address,
    ) -> Result<MappedSigner, BridgeError> {
        let strategy = self.settings.strategy;

        // fail before prompting the user when the runtime can't serve the strategy
        match strategy {
            Strategy::Runtime if !chain.supports_call(MAPPING_PALLET, META_CALL) => {
                return Err(BridgeError::ChainRejected {
                    message: format!("runtime has no {MAPPING_PALLET}::{META_CALL}"),
                });
            }
            Strategy::Relay if !chain.supports_call(RELAY_PALLET, RELAY_CALL) => {
                return Err(BridgeError::ChainRejected {
                    message: format!("runtime has no {RELAY_PALLET}::{RELAY_CALL}"),
                });
            }
            _ => {}
        }

        let signature = wallet.sign_message(address, IDENTITY_MESSAGE).await?;
        let identity = derive_account(IDENTITY_MESSAGE, &signature)?;

        if identity.evm_address != address {
            return Err(BridgeError::Wallet {
                message: format!(
                    "identity signature was made by {}, not {}",
                    identity.evm_address, address
                ),
            });
        }

        // every strategy acts as the key's own account
        let account_id = identity.account_id.clone();

        log::info!(
            "derived {} signer for {}: {}",
            strategy,
            address,
            AddressMapping::encode_ss58(&account_id, self.settings.ss58_prefix)
        );

        Ok(MappedSigner::new(
            self.settings.clone(),
            identity,
            account_id,
            wallet,
            chain.connection_id(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, hex};
    use k256::ecdsa::SigningKey;

    const SEED: [u8; 32] = hex!("7e9c7ad85df5cdc88659f53e06fb2eb9bab3ebc59083a3190eaf2c730332529c");
    const MESSAGE: &[u8] = b"test eth signed message";
    const SIGNATURE: [u8; 65] = hex!("dd0992d40e5cdf99db76bed162808508ac65acd7ae2fdc8573594f03ed9c939773e813181788fc02c3c68f3fdc592759b35f6354484343e18cb5317d34dab6c61b");

    #[test]
    fn derives_account_from_personal_signature() {
        let derived = derive_account(MESSAGE, &EcdsaSignature(SIGNATURE)).unwrap();

        assert_eq!(
            derived.public_key,
            hex!("023adb1c91e005bf6142615bab5b5541c7ef29fdc7467196af5678e4a6cc8642ea")
        );
        assert_eq!(
            derived.evm_address,
            address!("420ac537f1a4f78d4dfb3a71e902be0e3d480afb")
        );
        assert_eq!(
            derived.account_id.0,
            hex!("cad45e54f72c184485733ebb7f49650597953ec827710c528d18bb88a839ab48")
        );
        assert_eq!(
            derived.ss58(42),
            "5Geeci7qCoYHyg9z2AwfpiT4CDryvxYyD7SAUdfNBz9CyDSb"
        );
    }

    #[test]
    fn recovered_key_matches_signing_key() {
        let key = SigningKey::from_slice(&SEED).unwrap();
        let derived = derive_account(MESSAGE, &EcdsaSignature(SIGNATURE)).unwrap();

        assert_eq!(derived.public_key, compress(key.verifying_key()));
        assert_eq!(derived.evm_address, eth_address(key.verifying_key()));
    }

    #[test]
    fn derivation_is_deterministic() {
        let first = derive_address(MESSAGE, &EcdsaSignature(SIGNATURE), 30).unwrap();
        for _ in 0..5 {
            assert_eq!(
                derive_address(MESSAGE, &EcdsaSignature(SIGNATURE), 30).unwrap(),
                first
            );
        }
        assert_eq!(first, "45CjWoczbK3a6yJR9nPPHuFxSQ9TGkziwpnb6Rwkdj1MbAHN");
    }

    #[test]
    fn raw_and_legacy_recovery_ids_agree() {
        let mut raw = SIGNATURE;
        raw[64] -= 27;
        assert_eq!(
            derive_account(MESSAGE, &EcdsaSignature(raw)).unwrap(),
            derive_account(MESSAGE, &EcdsaSignature(SIGNATURE)).unwrap()
        );
    }

    #[test]
    fn high_s_signature_recovers_same_key() {
        // s' = n - s with the parity flipped is the same signature
        let sig = Signature::from_slice(&SIGNATURE[..64]).unwrap();
        let (r, s) = sig.split_scalars();
        let high = Signature::from_scalars(r, -s).unwrap();
        let mut raw = [0u8; 65];
        raw[..64].copy_from_slice(&high.to_bytes());
        raw[64] = 1 - (SIGNATURE[64] - 27);

        assert_eq!(
            derive_account(MESSAGE, &EcdsaSignature(raw)).unwrap().evm_address,
            address!("420ac537f1a4f78d4dfb3a71e902be0e3d480afb")
        );
    }

    #[test]
    fn other_message_yields_other_account() {
        let derived = derive_account(b"another message", &EcdsaSignature(SIGNATURE)).unwrap();
        assert_ne!(
            derived.evm_address,
            address!("420ac537f1a4f78d4dfb3a71e902be0e3d480afb")
        );
    }

    #[test]
    fn rejects_malformed_signatures() {
        let mut bad_v = SIGNATURE;
        bad_v[64] = 5;
        assert_eq!(
            derive_account(MESSAGE, &EcdsaSignature(bad_v)),
            Err(BridgeError::InvalidSignature("recovery id out of range"))
        );

        assert!(derive_account(MESSAGE, &EcdsaSignature([0u8; 65])).is_err());
    }

    #[test]
    fn verify_personal_checks_signer() {
        let signer = address!("420ac537f1a4f78d4dfb3a71e902be0e3d480afb");
        assert!(verify_personal(MESSAGE, &EcdsaSignature(SIGNATURE), signer).is_ok());
        assert_eq!(
            verify_personal(MESSAGE, &EcdsaSignature(SIGNATURE), Address::ZERO),
            Err(BridgeError::InvalidSignature("signer does not match address"))
        );
    }
}
