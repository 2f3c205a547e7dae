//! Session
//!
//! Explicit context shared by the CLI and the RPC service: the wallet, the chain
//! connection, the cached signer and certificate, and the in-flight action markers.

use crate::bridge::{AccountMappingBridge, BridgeSettings};
use crate::cache::{SessionCache, SessionKey};
use crate::certificate::Certificate;
use crate::contract::{
    call_args, decode_message_result, ContractRef, CONTRACTS_CALL, CONTRACTS_PALLET,
};
use crate::endpoint::Endpoint;
use crate::signer::MappedSigner;
use crate::traits::{ChainApi, Connector, WalletProvider};
use crate::types::{AccountInfo, BridgeError, ConnectionStatus, RawCall, TransactionResult};
use parity_scale_codec::{Decode, Encode};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;

/// User triggered actions that must not overlap with themselves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Connect,
    Remark,
    ContractCall,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::Connect => "connect",
            Action::Remark => "remark",
            Action::ContractCall => "contract call",
        }
    }
}

/// Tracks in-flight actions
#[derive(Debug, Default)]
pub struct ActionGuard {
    in_flight: Mutex<HashSet<Action>>,
}

impl ActionGuard {
    /// Mark `action` as running, `Busy` if it already is
    pub fn begin(&self, action: Action) -> Result<InFlight<'_>, BridgeError> {
        if !self.in_flight.lock().insert(action) {
            return Err(BridgeError::Busy(action.label()));
        }
        Ok(InFlight {
            guard: self,
            action,
        })
    }

    pub fn is_busy(&self, action: Action) -> bool {
        self.in_flight.lock().contains(&action)
    }
}

/// Releases the action when dropped
#[must_use]
pub struct InFlight<'a> {
    guard: &'a ActionGuard,
    action: Action,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.guard.in_flight.lock().remove(&self.action);
    }
}

pub struct Session {
    wallet: Arc<dyn WalletProvider>,
    connector: Arc<dyn Connector>,
    bridge: AccountMappingBridge,
    contract: Option<ContractRef>,
    chain: RwLock<Option<Arc<dyn ChainApi>>>,
    cache: SessionCache,
    actions: ActionGuard,
    /// Serializes wallet prompts for derivation and certificates
    prompts: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn new(
        wallet: Arc<dyn WalletProvider>,
        connector: Arc<dyn Connector>,
        settings: BridgeSettings,
        contract: Option<ContractRef>,
    ) -> Self {
        Self {
            wallet,
            connector,
            bridge: AccountMappingBridge::new(settings),
            contract,
            chain: RwLock::new(None),
            cache: SessionCache::new(),
            actions: ActionGuard::default(),
            prompts: tokio::sync::Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        self.bridge.settings()
    }

    #[cfg(test)]
    pub(crate) fn actions(&self) -> &ActionGuard {
        &self.actions
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Connect to `endpoint` and derive (or reuse) the signer
    pub async fn connect(&self, endpoint: &str) -> Result<ConnectionStatus, BridgeError> {
        let _in_flight = self.actions.begin(Action::Connect)?;
        let endpoint = Endpoint::parse(endpoint)?;

        let chain = self.ensure_chain(&endpoint).await?;
        let signer = self.signer_on(&chain).await?;

        Ok(self.status_of(chain.as_ref(), &signer))
    }

    /// Re-establish the connection to the current endpoint
    pub async fn reconnect(&self) -> Result<ConnectionStatus, BridgeError> {
        let endpoint = self
            .chain
            .read()
            .as_ref()
            .map(|chain| chain.endpoint().clone())
            .ok_or(BridgeError::NotReady("no endpoint to reconnect to"))?;
        self.connect(endpoint.as_str()).await
    }

    pub fn status(&self) -> Result<ConnectionStatus, BridgeError> {
        let chain = self.active_chain()?;
        let (_, signer) = self
            .cache
            .current()
            .filter(|(key, _)| key.connection_id == chain.connection_id())
            .ok_or(BridgeError::NotReady("no account mapped yet"))?;
        Ok(self.status_of(chain.as_ref(), &signer))
    }

    /// Signer for the wallet's current account on the current connection
    pub async fn signer(&self) -> Result<Arc<MappedSigner>, BridgeError> {
        let chain = self.active_chain()?;
        self.signer_on(&chain).await
    }

    /// `System.Account` of the mapped account
    pub async fn balance(&self) -> Result<AccountInfo, BridgeError> {
        let chain = self.active_chain()?;
        let signer = self.signer_on(&chain).await?;
        chain.account_info(signer.account_id()).await
    }

    /// Submit `System::remark_with_event`
    pub async fn submit_remark(&self, message: &str) -> Result<TransactionResult, BridgeError> {
        let _in_flight = self.actions.begin(Action::Remark)?;
        if message.is_empty() {
            return Err(BridgeError::InvalidInput("remark message is empty"));
        }

        let chain = self.active_chain()?;
        let signer = self.signer_on(&chain).await?;
        let call = RawCall::new("System", "remark_with_event", message.as_bytes().encode());

        let result = signer.send(&chain, call).await?;
        log::info!(
            "remark finalized in block #{} {:?}",
            result.block_number,
            result.block_hash
        );
        Ok(result)
    }

    /// Call a state changing contract message with SCALE encoded `args`
    pub async fn contract_send(
        &self,
        label: &str,
        args: &[u8],
    ) -> Result<TransactionResult, BridgeError> {
        let _in_flight = self.actions.begin(Action::ContractCall)?;
        let contract = self.contract()?;
        let message = contract.abi.message(label)?;
        if !message.mutates {
            return Err(BridgeError::Contract {
                message: format!("{label} is read-only, query it instead"),
            });
        }

        let chain = self.active_chain()?;
        let signer = self.signer_on(&chain).await?;
        self.ensure_deployed(chain.as_ref(), contract).await?;

        // estimate gas as the sender
        let input = message.input(args);
        let dry_run = chain
            .contract_dry_run(signer.account_id(), &contract.id, input.clone())
            .await?;
        dry_run.output()?;

        log::debug!(
            "{label} requires {} ref time, {} proof size",
            dry_run.gas_required.ref_time,
            dry_run.gas_required.proof_size
        );

        let call = RawCall::new(
            CONTRACTS_PALLET,
            CONTRACTS_CALL,
            call_args(&contract.id, dry_run.gas_required, input),
        );
        signer.send(&chain, call).await
    }

    /// Off-chain query of a contract message, authorized by the session certificate
    pub async fn contract_query<T: Decode>(
        &self,
        label: &str,
        args: &[u8],
    ) -> Result<T, BridgeError> {
        let contract = self.contract()?;
        let message = contract.abi.message(label)?;

        let chain = self.active_chain()?;
        let signer = self.signer_on(&chain).await?;
        let certificate = self.certificate_for(&chain, &signer).await?;
        self.ensure_deployed(chain.as_ref(), contract).await?;

        let dry_run = chain
            .contract_query(&certificate, &contract.id, message.input(args))
            .await?;
        decode_message_result(dry_run.output()?)
    }

    /// Ask the contract whether the mapped account belongs to the wallet's key
    pub async fn check_evm_account(&self) -> Result<bool, BridgeError> {
        let signer = self.signer().await?;
        let args = (signer.public_key(), signer.evm_address().0 .0).encode();
        self.contract_query("is_ecdsa_account_call", &args).await
    }

    pub async fn new_badge(&self, name: &str) -> Result<TransactionResult, BridgeError> {
        if name.is_empty() {
            return Err(BridgeError::InvalidInput("badge name is empty"));
        }
        self.contract_send("new_badge", &name.encode()).await
    }

    pub async fn total_badges(&self) -> Result<u32, BridgeError> {
        self.contract_query("get_total_badges", &[]).await
    }

    fn contract(&self) -> Result<&ContractRef, BridgeError> {
        self.contract
            .as_ref()
            .ok_or(BridgeError::NotReady("no contract configured"))
    }

    /// Current connection if it is still alive
    ///
    /// A dropped connection invalidates the cache, the caller has to reconnect. Nothing
    /// runs against the old connection while a connect is in flight.
    fn active_chain(&self) -> Result<Arc<dyn ChainApi>, BridgeError> {
        if self.actions.is_busy(Action::Connect) {
            return Err(BridgeError::NotReady("connection in progress"));
        }

        let chain = self
            .chain
            .read()
            .clone()
            .ok_or(BridgeError::NotReady("connect to a chain first"))?;

        if !chain.is_connected() {
            log::info!("connection to {} lost", chain.endpoint());
            self.cache.invalidate();
            return Err(BridgeError::NotReady("chain connection lost, reconnect first"));
        }

        Ok(chain)
    }

    /// Reuse the live connection to `endpoint` or open a new one
    ///
    /// The current connection and its signer survive a failed connect.
    async fn ensure_chain(&self, endpoint: &Endpoint) -> Result<Arc<dyn ChainApi>, BridgeError> {
        let current = self.chain.read().clone();
        if let Some(chain) = current {
            if chain.endpoint() == endpoint && chain.is_connected() {
                return Ok(chain);
            }
        }

        let chain = self.connector.connect(endpoint).await?;
        self.cache.invalidate();
        log::info!(
            "connected to {} (connection {})",
            endpoint,
            chain.connection_id()
        );
        *self.chain.write() = Some(chain.clone());
        Ok(chain)
    }

    async fn signer_on(&self, chain: &Arc<dyn ChainApi>) -> Result<Arc<MappedSigner>, BridgeError> {
        let _prompt = self.prompts.lock().await;

        let mut accounts = self.wallet.accounts().await?;
        if accounts.is_empty() {
            accounts = self.wallet.request_accounts().await?;
        }
        let evm_address = *accounts.first().ok_or_else(|| BridgeError::WalletDeclined {
            message: "wallet disclosed no accounts".into(),
        })?;

        let key = SessionKey {
            evm_address,
            connection_id: chain.connection_id(),
        };
        if let Some(signer) = self.cache.signer(&key) {
            return Ok(signer);
        }

        let signer = Arc::new(
            self.bridge
                .derive(chain, self.wallet.clone(), evm_address)
                .await?,
        );
        self.cache.insert_signer(key, signer.clone());
        Ok(signer)
    }

    async fn certificate_for(
        &self,
        chain: &Arc<dyn ChainApi>,
        signer: &MappedSigner,
    ) -> Result<Arc<Certificate>, BridgeError> {
        let _prompt = self.prompts.lock().await;

        let key = SessionKey {
            evm_address: signer.evm_address(),
            connection_id: chain.connection_id(),
        };
        if let Some(certificate) = self.cache.certificate(&key) {
            return Ok(certificate);
        }

        let certificate = Arc::new(signer.sign_certificate().await?);
        if !self.cache.insert_certificate(&key, certificate.clone()) {
            log::debug!("signer changed while signing certificate, not caching it");
        }
        Ok(certificate)
    }

    async fn ensure_deployed(
        &self,
        chain: &dyn ChainApi,
        contract: &ContractRef,
    ) -> Result<(), BridgeError> {
        let code_hash = chain
            .contract_code_hash(&contract.id)
            .await?
            .ok_or_else(|| BridgeError::Contract {
                message: format!("no contract at 0x{}", hex::encode(contract.id.0)),
            })?;
        log::debug!("{} code hash {:?}", contract.abi.name, code_hash);
        Ok(())
    }

    fn status_of(&self, chain: &dyn ChainApi, signer: &MappedSigner) -> ConnectionStatus {
        ConnectionStatus {
            endpoint: chain.endpoint().to_string(),
            connection_id: chain.connection_id(),
            strategy: signer.strategy(),
            evm_address: signer.evm_address(),
            account: signer.ss58(),
            account_id: signer.account_id().clone(),
        }
    }
}
