use crate::certificate::Certificate;
use crate::contract::DryRun;
use crate::endpoint::Endpoint;
use crate::types::{
    AccountInfo, ActionOutcome, BridgeError, ConnectionStatus, RawCall, TransactionResult,
};
use alloy_primitives::{Address, Bytes};
use evm_mapping_primitives::{EcdsaSignature, Eip712Domain, SubstrateCall};
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use std::sync::Arc;
use subxt::utils::{AccountId32, H256};

/// Externally held EVM wallet.
///
/// Implementations never hand out key material, only addresses and signatures.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Addresses already disclosed to us, without prompting
    async fn accounts(&self) -> Result<Vec<Address>, BridgeError>;

    /// Ask the user to disclose addresses
    async fn request_accounts(&self) -> Result<Vec<Address>, BridgeError>;

    /// EIP-191 `personal_sign` over `message`
    async fn sign_message(
        &self,
        address: Address,
        message: &[u8],
    ) -> Result<EcdsaSignature, BridgeError>;

    /// EIP-712 signature over a meta call
    async fn sign_typed_data(
        &self,
        address: Address,
        domain: &Eip712Domain,
        call: &SubstrateCall,
    ) -> Result<EcdsaSignature, BridgeError>;
}

/// A live connection to the target chain
#[async_trait]
pub trait ChainApi: Send + Sync {
    /// Unique per established connection, a reconnect yields a new id
    fn connection_id(&self) -> u64;

    fn endpoint(&self) -> &Endpoint;

    fn is_connected(&self) -> bool;

    /// Whether the runtime metadata exposes `pallet::call`
    fn supports_call(&self, pallet: &str, call: &str) -> bool;

    /// Encoded call data (pallet index, call index, args)
    fn encode_call(&self, call: &RawCall) -> Result<Vec<u8>, BridgeError>;

    /// `System.Account`, default value when the account doesn't exist
    async fn account_info(&self, account: &AccountId32) -> Result<AccountInfo, BridgeError>;

    /// Meta call nonce kept by the account mapping pallet
    async fn mapping_nonce(&self, account: &AccountId32) -> Result<u64, BridgeError>;

    /// Submit `call` as an unsigned extrinsic and wait until it is finalized
    async fn submit_unsigned(&self, call: &RawCall) -> Result<TransactionResult, BridgeError>;

    /// Code hash registered for `contract`, `None` if there is no such contract
    async fn contract_code_hash(&self, contract: &AccountId32)
        -> Result<Option<H256>, BridgeError>;

    /// `ContractsApi_call` dry run as `origin`
    async fn contract_dry_run(
        &self,
        origin: &AccountId32,
        contract: &AccountId32,
        input: Vec<u8>,
    ) -> Result<DryRun, BridgeError>;

    /// Off-chain query on behalf of the account named by `certificate`
    ///
    /// The certificate is checked before the chain is asked anything.
    async fn contract_query(
        &self,
        certificate: &Certificate,
        contract: &AccountId32,
        input: Vec<u8>,
    ) -> Result<DryRun, BridgeError>;
}

/// Opens chain connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn ChainApi>, BridgeError>;
}

/// JSON-RPC interface of an external EVM signer (EIP-1193 methods)
#[rpc(client)]
pub trait WalletRpc {
    /// Addresses the wallet has already disclosed
    #[method(name = "eth_accounts")]
    async fn accounts(&self) -> RpcResult<Vec<Address>>;

    /// Prompt the user to disclose addresses
    #[method(name = "eth_requestAccounts")]
    async fn request_accounts(&self) -> RpcResult<Vec<Address>>;

    /// Sign a personal message, parameters are `[message, address]`
    #[method(name = "personal_sign")]
    async fn personal_sign(&self, message: Bytes, address: Address) -> RpcResult<Bytes>;

    /// Sign EIP-712 typed data given as a JSON string
    #[method(name = "eth_signTypedData_v4")]
    async fn sign_typed_data_v4(&self, address: Address, typed_data: String) -> RpcResult<Bytes>;
}

/// Bridge operations exposed over JSON-RPC
#[rpc(server)]
pub trait BridgeApi {
    /// Connect to `endpoint` and derive the mapped signer
    #[method(name = "bridge_connect")]
    async fn connect(&self, endpoint: String) -> RpcResult<ActionOutcome<ConnectionStatus>>;

    /// Reconnect to the current endpoint
    #[method(name = "bridge_reconnect")]
    async fn reconnect(&self) -> RpcResult<ActionOutcome<ConnectionStatus>>;

    /// Current connection, if any
    #[method(name = "bridge_status")]
    async fn status(&self) -> RpcResult<ActionOutcome<ConnectionStatus>>;

    /// `System.Account` of the mapped account
    #[method(name = "bridge_balance")]
    async fn balance(&self) -> RpcResult<ActionOutcome<AccountInfo>>;

    /// Submit `System.remark_with_event`
    #[method(name = "bridge_submitRemark")]
    async fn submit_remark(&self, message: String) -> RpcResult<ActionOutcome<TransactionResult>>;

    /// Create a badge on the configured contract
    #[method(name = "bridge_newBadge")]
    async fn new_badge(&self, name: String) -> RpcResult<ActionOutcome<TransactionResult>>;

    /// Off-chain query of the badge count
    #[method(name = "bridge_totalBadges")]
    async fn total_badges(&self) -> RpcResult<ActionOutcome<u32>>;

    /// Ask the contract whether the mapped account belongs to the EVM key
    #[method(name = "bridge_checkEvmAccount")]
    async fn check_evm_account(&self) -> RpcResult<ActionOutcome<bool>>;

    /// Locally derive the target chain address for a signed message
    #[method(name = "bridge_deriveAddress")]
    fn derive_address(&self, message: Bytes, signature: Bytes) -> RpcResult<String>;
}
