//! Primitive types used in the library.

use jsonrpsee::types::ErrorObject;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use subxt::utils::{AccountId32, H256};
use subxt::{Config, SubstrateConfig};

/// Configuration of the chain
pub enum ChainConfig {}
impl Config for ChainConfig {
    type Hash = <SubstrateConfig as Config>::Hash;
    type AccountId = <SubstrateConfig as Config>::AccountId;
    type Address = <SubstrateConfig as Config>::Address;
    type Signature = <SubstrateConfig as Config>::Signature;
    type Hasher = <SubstrateConfig as Config>::Hasher;
    type Header = <SubstrateConfig as Config>::Header;
    type AssetId = <SubstrateConfig as Config>::AssetId;
    type ExtrinsicParams = subxt::config::DefaultExtrinsicParams<Self>;
}

/// Bridging strategy used to turn the wallet account into a target chain signer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// The runtime maps the EVM account and executes EIP-712 signed meta calls
    Runtime,
    /// Address is derived locally from a recovered public key; read only
    Local,
    /// EVM-signed payloads are relayed through the bridging extrinsic
    Relay,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Runtime => f.write_str("runtime"),
            Strategy::Local => f.write_str("local"),
            Strategy::Relay => f.write_str("relay"),
        }
    }
}

/// Runtime call addressed by pallet and call name, with SCALE encoded arguments
///
/// Indices are resolved against the live metadata when the call is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCall {
    pub pallet: String,
    pub call: String,
    pub args: Vec<u8>,
}

impl RawCall {
    pub fn new(pallet: &str, call: &str, args: Vec<u8>) -> Self {
        Self {
            pallet: pallet.to_string(),
            call: call.to_string(),
            args,
        }
    }
}

impl subxt::tx::Payload for RawCall {
    fn encode_call_data_to(
        &self,
        metadata: &subxt::Metadata,
        out: &mut Vec<u8>,
    ) -> Result<(), subxt::ext::subxt_core::Error> {
        let pallet = metadata.pallet_by_name(&self.pallet).ok_or_else(|| {
            subxt::error::MetadataError::PalletNameNotFound(self.pallet.clone())
        })?;
        let call = pallet
            .call_variant_by_name(&self.call)
            .ok_or_else(|| subxt::error::MetadataError::CallNameNotFound(self.call.clone()))?;

        out.push(pallet.index());
        out.push(call.index);
        out.extend_from_slice(&self.args);
        Ok(())
    }
}

/// Balance data of `System.Account`
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct AccountData {
    pub free: u128,
    pub reserved: u128,
    pub frozen: u128,
    pub flags: u128,
}

/// Value of `System.Account`
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct AccountInfo {
    pub nonce: u32,
    pub consumers: u32,
    pub providers: u32,
    pub sufficients: u32,
    pub data: AccountData,
}

/// Event emitted by an included extrinsic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub pallet: String,
    pub variant: String,
}

impl std::fmt::Display for ChainEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.pallet, self.variant)
    }
}

/// On-chain outcome of a submitted action, observed at finality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub extrinsic_hash: H256,
    pub block_hash: H256,
    pub block_number: u64,
    pub events: Vec<ChainEvent>,
}

impl TransactionResult {
    /// Polkadot-JS Apps link to the block containing the transaction
    pub fn explorer_link(&self, explorer: &str, endpoint: &str) -> String {
        format!(
            "{}/?rpc={}#/explorer/query/{:?}",
            explorer.trim_end_matches('/'),
            endpoint,
            self.block_hash
        )
    }

    /// Flat `pallet.variant` list
    pub fn event_names(&self) -> Vec<String> {
        self.events.iter().map(ToString::to_string).collect()
    }
}

/// Summary of an established session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub endpoint: String,
    pub connection_id: u64,
    pub strategy: Strategy,
    pub evm_address: alloy_primitives::Address,
    pub account: String,
    pub account_id: AccountId32,
}

/// General error type for the mapping bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Endpoint is not a `ws://` or `wss://` URL
    InvalidEndpoint(String),
    /// Caller supplied input that can't be acted on
    InvalidInput(&'static str),
    /// Chain node unreachable or connection lost
    Connection { message: String },
    /// A prerequisite (connection, signer) is missing
    NotReady(&'static str),
    /// User declined address disclosure or a signature request
    WalletDeclined { message: String },
    /// Wallet failed for another reason
    Wallet { message: String },
    /// Runtime refused a mapping, call or relayed transaction
    ChainRejected { message: String },
    /// Signature could not be parsed or recovered
    InvalidSignature(&'static str),
    /// The active strategy can identify the account but can't authorize transactions
    ReadOnly,
    /// Same action is already in flight
    Busy(&'static str),
    /// Contract registry or interface errors
    Contract { message: String },
    /// SCALE or JSON codec errors
    Codec(String),
}

/// Coarse classification used to build [`ActionOutcome`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserDeclined,
    ChainRejected,
    Connection,
    Other,
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::WalletDeclined { .. } => ErrorKind::UserDeclined,
            BridgeError::ChainRejected { .. } => ErrorKind::ChainRejected,
            BridgeError::Connection { .. } | BridgeError::InvalidEndpoint(_) => {
                ErrorKind::Connection
            }
            _ => ErrorKind::Other,
        }
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::InvalidEndpoint(endpoint) => {
                write!(f, "invalid endpoint {endpoint:?}, expected ws:// or wss://")
            }
            BridgeError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            BridgeError::Connection { message } => write!(f, "connection error: {message}"),
            BridgeError::NotReady(msg) => write!(f, "not ready: {msg}"),
            BridgeError::WalletDeclined { message } => write!(f, "wallet declined: {message}"),
            BridgeError::Wallet { message } => write!(f, "wallet error: {message}"),
            BridgeError::ChainRejected { message } => write!(f, "chain rejected: {message}"),
            BridgeError::InvalidSignature(msg) => write!(f, "invalid signature: {msg}"),
            BridgeError::ReadOnly => {
                f.write_str("locally derived accounts can't authorize transactions")
            }
            BridgeError::Busy(action) => write!(f, "{action} is already in progress"),
            BridgeError::Contract { message } => write!(f, "contract error: {message}"),
            BridgeError::Codec(msg) => write!(f, "codec error: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        log::error!("Serde json error: {:?}", e);
        BridgeError::Codec(format!("json: {e}"))
    }
}

impl From<parity_scale_codec::Error> for BridgeError {
    fn from(e: parity_scale_codec::Error) -> Self {
        log::error!("SCALE codec error: {:?}", e);
        BridgeError::Codec(format!("scale: {e}"))
    }
}

impl From<hex::FromHexError> for BridgeError {
    fn from(e: hex::FromHexError) -> Self {
        log::error!("Hex error: {:?}", e);
        BridgeError::Codec(format!("hex: {e}"))
    }
}

impl From<evm_mapping_primitives::SignatureError> for BridgeError {
    fn from(e: evm_mapping_primitives::SignatureError) -> Self {
        match e {
            evm_mapping_primitives::SignatureError::InvalidLength => {
                BridgeError::InvalidSignature("expected 65 bytes")
            }
            evm_mapping_primitives::SignatureError::InvalidRecoveryId => {
                BridgeError::InvalidSignature("recovery id out of range")
            }
        }
    }
}

impl From<subxt::Error> for BridgeError {
    fn from(e: subxt::Error) -> Self {
        log::error!("subxt error: {:?}", e);
        match e {
            subxt::Error::Runtime(err) => BridgeError::ChainRejected {
                message: err.to_string(),
            },
            subxt::Error::Transaction(err) => BridgeError::ChainRejected {
                message: err.to_string(),
            },
            subxt::Error::Rpc(err) => BridgeError::Connection {
                message: err.to_string(),
            },
            subxt::Error::Io(err) => BridgeError::Connection {
                message: err.to_string(),
            },
            other => BridgeError::ChainRejected {
                message: other.to_string(),
            },
        }
    }
}

impl From<jsonrpsee::core::ClientError> for BridgeError {
    fn from(e: jsonrpsee::core::ClientError) -> Self {
        log::error!("jsonrpsee error: {:?}", e);
        BridgeError::Connection {
            message: e.to_string(),
        }
    }
}

impl From<BridgeError> for ErrorObject<'_> {
    fn from(error: BridgeError) -> Self {
        let code = match error.kind() {
            ErrorKind::UserDeclined => 4001,
            ErrorKind::ChainRejected => 1010,
            ErrorKind::Connection => 1000,
            ErrorKind::Other => 500,
        };
        ErrorObject::owned(code, error.to_string(), None::<()>)
    }
}

/// Explicit result of a user triggered action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ActionOutcome<T> {
    Success { value: T },
    UserDeclined { reason: String },
    ChainRejected { reason: String },
    Failed { reason: String },
}

impl<T> From<Result<T, BridgeError>> for ActionOutcome<T> {
    fn from(result: Result<T, BridgeError>) -> Self {
        match result {
            Ok(value) => ActionOutcome::Success { value },
            Err(err) => {
                let reason = err.to_string();
                match err.kind() {
                    ErrorKind::UserDeclined => ActionOutcome::UserDeclined { reason },
                    ErrorKind::ChainRejected => ActionOutcome::ChainRejected { reason },
                    ErrorKind::Connection | ErrorKind::Other => ActionOutcome::Failed { reason },
                }
            }
        }
    }
}
