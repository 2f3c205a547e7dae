//! Substrate RPC client
//!
//! Wraps a subxt `OnlineClient` running over a jsonrpsee WebSocket connection. Keeping the
//! WebSocket handle lets us observe when the node goes away.

use crate::adapter::storage_key;
use crate::certificate::Certificate;
use crate::contract::{
    dry_run_params, ContractInfoPrefix, DryRun, CONTRACTS_PALLET, CONTRACT_INFO_ENTRY,
    DRY_RUN_METHOD,
};
use crate::endpoint::Endpoint;
use crate::signer::{MAPPING_PALLET, NONCE_ENTRY};
use crate::traits::{ChainApi, Connector};
use crate::types::*;
use jsonrpsee::core::async_trait;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use parity_scale_codec::{Decode, Encode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use subxt::backend::rpc::RpcClient;
use subxt::metadata::types::StorageEntryType;
use subxt::utils::{AccountId32, H256};
use subxt::OnlineClient;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Represents a connection to a Substrate node
#[derive(Clone)]
pub struct SubClient {
    /// Endpoint the connection was opened to
    endpoint: Endpoint,
    /// Unique per connection
    connection_id: u64,
    /// Underlying WebSocket connection
    ws: Arc<WsClient>,
    /// Represents a chains API
    api: OnlineClient<ChainConfig>,
}

impl SubClient {
    pub async fn from_url(endpoint: &Endpoint) -> Result<Self, BridgeError> {
        if !endpoint.is_secure() {
            log::warn!("{endpoint} is not using TLS");
        }
        let ws = Arc::new(
            WsClientBuilder::default()
                .build(endpoint.as_str())
                .await
                .map_err(|e| BridgeError::Connection {
                    message: format!("{endpoint}: {e}"),
                })?,
        );
        let rpc_client = RpcClient::new(ws.clone());
        let api = OnlineClient::<ChainConfig>::from_rpc_client(rpc_client).await?;

        Ok(Self {
            endpoint: endpoint.clone(),
            connection_id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::SeqCst),
            ws,
            api,
        })
    }

    /// Storage key of a map entry, hashed the way the metadata says
    fn map_key(&self, pallet: &str, entry: &str, keys: &[Vec<u8>]) -> Result<Vec<u8>, BridgeError> {
        let metadata = self.api.metadata();
        let storage = metadata
            .pallet_by_name(pallet)
            .and_then(|pallet| pallet.storage())
            .ok_or_else(|| BridgeError::ChainRejected {
                message: format!("runtime has no {pallet} storage"),
            })?;
        let entry_metadata =
            storage
                .entry_by_name(entry)
                .ok_or_else(|| BridgeError::ChainRejected {
                    message: format!("runtime has no {pallet}::{entry}"),
                })?;

        match entry_metadata.entry_type() {
            StorageEntryType::Plain(_) => Ok(storage_key(pallet, entry, &[], &[])),
            StorageEntryType::Map { hashers, .. } => {
                if hashers.len() != keys.len() {
                    return Err(BridgeError::Codec(format!(
                        "{pallet}::{entry} expects {} keys",
                        hashers.len()
                    )));
                }
                Ok(storage_key(pallet, entry, hashers, keys))
            }
        }
    }

    async fn fetch_raw(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, BridgeError> {
        let value = self
            .api
            .storage()
            .at_latest()
            .await?
            .fetch_raw(key)
            .await?;
        Ok(value)
    }
}

#[async_trait]
impl ChainApi for SubClient {
    fn connection_id(&self) -> u64 {
        self.connection_id
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn is_connected(&self) -> bool {
        self.ws.is_connected()
    }

    fn supports_call(&self, pallet: &str, call: &str) -> bool {
        self.api
            .metadata()
            .pallet_by_name(pallet)
            .and_then(|pallet| pallet.call_variant_by_name(call).map(|_| ()))
            .is_some()
    }

    fn encode_call(&self, call: &RawCall) -> Result<Vec<u8>, BridgeError> {
        Ok(self.api.tx().call_data(call)?)
    }

    async fn account_info(&self, account: &AccountId32) -> Result<AccountInfo, BridgeError> {
        let key = self.map_key("System", "Account", &[account.encode()])?;
        match self.fetch_raw(key).await? {
            Some(raw) => Ok(AccountInfo::decode(&mut &raw[..])?),
            None => Ok(AccountInfo::default()),
        }
    }

    async fn mapping_nonce(&self, account: &AccountId32) -> Result<u64, BridgeError> {
        let key = self.map_key(MAPPING_PALLET, NONCE_ENTRY, &[account.encode()])?;
        match self.fetch_raw(key).await? {
            Some(raw) => Ok(u64::decode(&mut &raw[..])?),
            None => Ok(0),
        }
    }

    async fn submit_unsigned(&self, call: &RawCall) -> Result<TransactionResult, BridgeError> {
        let tx = self.api.tx().create_unsigned(call)?;
        let progress = tx.submit_and_watch().await?;
        let extrinsic_hash = progress.extrinsic_hash();
        log::info!("submitted {extrinsic_hash:?}, waiting for finality");

        let in_block = progress.wait_for_finalized().await?;
        let block_hash = in_block.block_hash();
        let events = in_block.wait_for_success().await?;

        let mut chain_events = vec![];
        for event in events.iter() {
            let event = event?;
            chain_events.push(ChainEvent {
                pallet: event.pallet_name().to_string(),
                variant: event.variant_name().to_string(),
            });
        }

        let block = self.api.blocks().at(block_hash).await?;

        Ok(TransactionResult {
            extrinsic_hash,
            block_hash,
            block_number: block.number().into(),
            events: chain_events,
        })
    }

    async fn contract_code_hash(
        &self,
        contract: &AccountId32,
    ) -> Result<Option<H256>, BridgeError> {
        let key = self.map_key(CONTRACTS_PALLET, CONTRACT_INFO_ENTRY, &[contract.encode()])?;
        match self.fetch_raw(key).await? {
            Some(raw) => {
                let info = ContractInfoPrefix::decode(&mut &raw[..])?;
                Ok(Some(H256::from(info.code_hash)))
            }
            None => Ok(None),
        }
    }

    async fn contract_dry_run(
        &self,
        origin: &AccountId32,
        contract: &AccountId32,
        input: Vec<u8>,
    ) -> Result<DryRun, BridgeError> {
        let params = dry_run_params(origin, contract, &input);
        let dry_run = self
            .api
            .runtime_api()
            .at_latest()
            .await?
            .call_raw::<DryRun>(DRY_RUN_METHOD, Some(params.as_slice()))
            .await?;
        Ok(dry_run)
    }

    async fn contract_query(
        &self,
        certificate: &Certificate,
        contract: &AccountId32,
        input: Vec<u8>,
    ) -> Result<DryRun, BridgeError> {
        certificate.verify()?;
        self.contract_dry_run(&certificate.account_id, contract, input).await
    }
}

/// Opens [`SubClient`] connections
#[derive(Debug, Clone, Copy, Default)]
pub struct SubClientConnector;

#[async_trait]
impl Connector for SubClientConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn ChainApi>, BridgeError> {
        Ok(Arc::new(SubClient::from_url(endpoint).await?))
    }
}
