//! Wallet providers
//!
//! [`RpcWallet`] talks to an external EVM signer over JSON-RPC, [`DevWallet`] keeps a
//! development key in process for local chains.

use crate::bridge::eth_address;
use crate::traits::{WalletProvider, WalletRpcClient};
use crate::types::BridgeError;
use alloy_primitives::{Address, Bytes};
use evm_mapping_primitives::{personal_message_hash, EcdsaSignature, Eip712Domain, SubstrateCall};
use jsonrpsee::core::{async_trait, ClientError};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use k256::ecdsa::SigningKey;
use std::sync::atomic::{AtomicBool, Ordering};

/// Well known development key (`Alith`)
pub const ALITH_SEED: &str = "5fb92d6e98884f76de468fa3f6278f8807c48bebc13595d45af5bdc4da702133";

/// EIP-1193 error code for a request the user rejected
const USER_REJECTED: i32 = 4001;

/// EIP-712 typed data document for a meta call, as `eth_signTypedData_v4` expects it
pub fn typed_data_json(domain: &Eip712Domain, call: &SubstrateCall) -> serde_json::Value {
    serde_json::json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "version", "type": "string" },
                { "name": "chainId", "type": "uint256" },
                { "name": "verifyingContract", "type": "address" },
            ],
            "SubstrateCall": [
                { "name": "who", "type": "string" },
                { "name": "callData", "type": "bytes" },
                { "name": "nonce", "type": "uint64" },
            ],
        },
        "primaryType": "SubstrateCall",
        "domain": {
            "name": domain.name,
            "version": domain.version,
            "chainId": domain.chain_id,
            "verifyingContract": Address::from(domain.verifying_contract),
        },
        "message": {
            "who": call.who,
            "callData": Bytes::from(call.call_data.clone()),
            "nonce": call.nonce,
        },
    })
}

/// Wallet reached through its JSON-RPC interface
pub struct RpcWallet {
    client: HttpClient,
    url: String,
}

impl RpcWallet {
    pub fn new(url: &str) -> Result<Self, BridgeError> {
        let client = HttpClientBuilder::default().build(url)?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Classify a wallet RPC failure
fn wallet_error(e: ClientError) -> BridgeError {
    match e {
        ClientError::Call(err) if err.code() == USER_REJECTED => BridgeError::WalletDeclined {
            message: err.message().to_string(),
        },
        ClientError::Call(err) => BridgeError::Wallet {
            message: format!("{} ({})", err.message(), err.code()),
        },
        other => other.into(),
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    async fn accounts(&self) -> Result<Vec<Address>, BridgeError> {
        WalletRpcClient::accounts(&self.client)
            .await
            .map_err(wallet_error)
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, BridgeError> {
        WalletRpcClient::request_accounts(&self.client)
            .await
            .map_err(wallet_error)
    }

    async fn sign_message(
        &self,
        address: Address,
        message: &[u8],
    ) -> Result<EcdsaSignature, BridgeError> {
        let signature = self
            .client
            .personal_sign(Bytes::copy_from_slice(message), address)
            .await
            .map_err(wallet_error)?;
        Ok(EcdsaSignature::from_slice(&signature)?)
    }

    async fn sign_typed_data(
        &self,
        address: Address,
        domain: &Eip712Domain,
        call: &SubstrateCall,
    ) -> Result<EcdsaSignature, BridgeError> {
        let typed_data = serde_json::to_string(&typed_data_json(domain, call))?;
        let signature = self
            .client
            .sign_typed_data_v4(address, typed_data)
            .await
            .map_err(wallet_error)?;
        Ok(EcdsaSignature::from_slice(&signature)?)
    }
}

/// In-process wallet holding one development key
///
/// Behaves like a browser wallet: `accounts` stays empty until `request_accounts` was
/// called once.
pub struct DevWallet {
    key: SigningKey,
    address: Address,
    disclosed: AtomicBool,
}

impl DevWallet {
    pub fn from_seed_hex(seed: &str) -> Result<Self, BridgeError> {
        let mut raw = [0u8; 32];
        hex::decode_to_slice(seed.trim().trim_start_matches("0x"), &mut raw)?;
        let key = SigningKey::from_slice(&raw)
            .map_err(|_| BridgeError::InvalidInput("seed is not a valid secp256k1 key"))?;
        let address = eth_address(key.verifying_key());

        Ok(Self {
            key,
            address,
            disclosed: AtomicBool::new(false),
        })
    }

    pub fn alith() -> Self {
        Self::from_seed_hex(ALITH_SEED).expect("static key is valid; qed")
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn sign_prehash(
        &self,
        address: Address,
        prehash: &[u8; 32],
    ) -> Result<EcdsaSignature, BridgeError> {
        if address != self.address {
            return Err(BridgeError::Wallet {
                message: format!("unknown account {address}"),
            });
        }

        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(prehash)
            .map_err(|e| BridgeError::Wallet {
                message: e.to_string(),
            })?;

        let mut raw = [0u8; 65];
        raw[..64].copy_from_slice(&signature.to_bytes());
        raw[64] = recovery_id.to_byte() + 27;
        Ok(EcdsaSignature(raw))
    }
}

#[async_trait]
impl WalletProvider for DevWallet {
    async fn accounts(&self) -> Result<Vec<Address>, BridgeError> {
        if self.disclosed.load(Ordering::SeqCst) {
            Ok(vec![self.address])
        } else {
            Ok(vec![])
        }
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, BridgeError> {
        self.disclosed.store(true, Ordering::SeqCst);
        Ok(vec![self.address])
    }

    async fn sign_message(
        &self,
        address: Address,
        message: &[u8],
    ) -> Result<EcdsaSignature, BridgeError> {
        log::debug!("dev wallet signing {} byte message", message.len());
        self.sign_prehash(address, &personal_message_hash(message))
    }

    async fn sign_typed_data(
        &self,
        address: Address,
        domain: &Eip712Domain,
        call: &SubstrateCall,
    ) -> Result<EcdsaSignature, BridgeError> {
        self.sign_prehash(address, &call.signing_hash(domain))
    }
}
