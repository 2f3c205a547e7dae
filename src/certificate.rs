//! Query certificates
//!
//! A certificate authorizes read-only contract queries on behalf of the mapped account.
//! The wallet signs it once per session.

use crate::adapter::AddressMapping;
use crate::bridge::verify_personal;
use crate::traits::WalletProvider;
use crate::types::BridgeError;
use alloy_primitives::Address;
use evm_mapping_primitives::EcdsaSignature;
use subxt::utils::AccountId32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub evm_address: Address,
    /// Account queries are performed as
    pub account_id: AccountId32,
    /// Statement the wallet signed
    pub body: String,
    pub signature: EcdsaSignature,
}

impl Certificate {
    pub fn body(evm_address: Address, account: &str) -> String {
        format!("Authorize read-only contract queries as {account} for {evm_address}.")
    }

    /// Prompt the wallet for a certificate
    pub async fn sign(
        wallet: &dyn WalletProvider,
        evm_address: Address,
        account_id: AccountId32,
        ss58_prefix: u16,
    ) -> Result<Self, BridgeError> {
        let body = Self::body(
            evm_address,
            &AddressMapping::encode_ss58(&account_id, ss58_prefix),
        );
        let signature = wallet.sign_message(evm_address, body.as_bytes()).await?;

        let certificate = Self {
            evm_address,
            account_id,
            body,
            signature,
        };
        certificate.verify()?;
        Ok(certificate)
    }

    /// Check the signature was made by `evm_address`
    pub fn verify(&self) -> Result<(), BridgeError> {
        verify_personal(self.body.as_bytes(), &self.signature, self.evm_address)
    }
}
