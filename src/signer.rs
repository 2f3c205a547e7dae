//! Mapped signer
//!
//! Authorizes runtime calls for the mapped account with EVM wallet signatures.

use crate::adapter::AddressMapping;
use crate::bridge::{BridgeSettings, DerivedAccount};
use crate::certificate::Certificate;
use crate::traits::{ChainApi, WalletProvider};
use crate::types::{BridgeError, RawCall, Strategy, TransactionResult};
use alloy_primitives::Address;
use evm_mapping_primitives::{Eip712Domain, RelayedCall, SubstrateCall};
use parity_scale_codec::Encode;
use std::sync::Arc;
use subxt::utils::AccountId32;

/// Pallet executing EIP-712 signed meta calls
pub const MAPPING_PALLET: &str = "EvmAccountMapping";
pub const META_CALL: &str = "meta_call";
/// Storage entry holding per-account meta call nonces
pub const NONCE_ENTRY: &str = "AccountNonce";

/// Custom signatures pallet dispatching EIP-191 signed calls (`EthCall` on Astar)
pub const RELAY_PALLET: &str = "EthCall";
pub const RELAY_CALL: &str = "call";

pub struct MappedSigner {
    settings: BridgeSettings,
    identity: DerivedAccount,
    account_id: AccountId32,
    wallet: Arc<dyn WalletProvider>,
    connection_id: u64,
}

impl std::fmt::Debug for MappedSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedSigner")
            .field("strategy", &self.settings.strategy)
            .field("evm_address", &self.identity.evm_address)
            .field("account_id", &self.account_id)
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

impl MappedSigner {
    pub fn new(
        settings: BridgeSettings,
        identity: DerivedAccount,
        account_id: AccountId32,
        wallet: Arc<dyn WalletProvider>,
        connection_id: u64,
    ) -> Self {
        Self {
            settings,
            identity,
            account_id,
            wallet,
            connection_id,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.settings.strategy
    }

    pub fn evm_address(&self) -> Address {
        self.identity.evm_address
    }

    /// Compressed public key disclosed by the identity signature
    pub fn public_key(&self) -> [u8; 33] {
        self.identity.public_key
    }

    /// Account calls are dispatched as
    pub fn account_id(&self) -> &AccountId32 {
        &self.account_id
    }

    pub fn ss58(&self) -> String {
        AddressMapping::encode_ss58(&self.account_id, self.settings.ss58_prefix)
    }

    /// Sign `call` with the wallet and submit it, waiting for finality
    pub async fn send(
        &self,
        chain: &Arc<dyn ChainApi>,
        call: RawCall,
    ) -> Result<TransactionResult, BridgeError> {
        if chain.connection_id() != self.connection_id {
            return Err(BridgeError::NotReady(
                "signer was derived on a previous connection",
            ));
        }

        let submission = match self.settings.strategy {
            Strategy::Local => return Err(BridgeError::ReadOnly),
            Strategy::Runtime => self.meta_call(chain, &call).await?,
            Strategy::Relay => self.relayed(chain, &call).await?,
        };

        log::info!(
            "submitting {}::{} for {} via {}::{}",
            call.pallet,
            call.call,
            self.ss58(),
            submission.pallet,
            submission.call
        );

        chain.submit_unsigned(&submission).await
    }

    /// `EvmAccountMapping::meta_call` authorized by an EIP-712 signature
    async fn meta_call(
        &self,
        chain: &Arc<dyn ChainApi>,
        call: &RawCall,
    ) -> Result<RawCall, BridgeError> {
        let call_data = chain.encode_call(call)?;
        let nonce = chain.mapping_nonce(&self.account_id).await?;

        let typed = SubstrateCall {
            who: self.ss58(),
            call_data,
            nonce,
        };
        let domain = Eip712Domain::substrate(self.settings.eip712_chain_id);
        let signature = self
            .wallet
            .sign_typed_data(self.identity.evm_address, &domain, &typed)
            .await?;

        let args = (
            &self.account_id,
            &typed.call_data,
            typed.nonce,
            signature.0,
            Option::<u128>::None,
        )
            .encode();

        Ok(RawCall::new(MAPPING_PALLET, META_CALL, args))
    }

    /// `EthCall::call` carrying a personal signature over (magic, nonce, call)
    async fn relayed(
        &self,
        chain: &Arc<dyn ChainApi>,
        call: &RawCall,
    ) -> Result<RawCall, BridgeError> {
        let call_data = chain.encode_call(call)?;
        let nonce = chain.account_info(&self.account_id).await?.nonce;
        let magic = self.settings.call_magic;

        let payload = RelayedCall::signing_payload(magic, nonce, &call_data);
        let signature = self
            .wallet
            .sign_message(self.identity.evm_address, &payload)
            .await?;

        let relayed = RelayedCall {
            call_data,
            signer: self.account_id.0,
            signature,
            nonce,
        };
        log::debug!("relaying call with nonce {nonce} under magic {magic:#06x}");

        Ok(RawCall::new(RELAY_PALLET, RELAY_CALL, relayed.encode()))
    }

    /// Prompt the wallet for a query certificate
    pub async fn sign_certificate(&self) -> Result<Certificate, BridgeError> {
        Certificate::sign(
            self.wallet.as_ref(),
            self.identity.evm_address,
            self.account_id.clone(),
            self.settings.ss58_prefix,
        )
        .await
    }
}
