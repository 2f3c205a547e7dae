//! Contract interface and `pallet-contracts` codecs
//!
//! Messages are resolved against the bundled ink! metadata, inputs are
//! `selector ++ SCALE(args)`. Dry runs go through the `ContractsApi_call` runtime API.

use crate::adapter::AddressMapping;
use crate::types::BridgeError;
use parity_scale_codec::{Compact, Decode, Encode, Input};
use serde::Deserialize;
use sp_core::blake2_256;
use std::sync::Arc;
use subxt::utils::{AccountId32, MultiAddress};

/// Interface of the badges contract
pub const BADGES_ABI: &str = include_str!("../abi/badges.json");

/// Instance the badges contract is deployed at on the reference chain
pub const DEFAULT_CONTRACT: &str =
    "0x20c5d09ee550860d3e02ca06bb6b4a1db006bd16d3b6b32b7b8b22deb7c098ef";

pub const CONTRACTS_PALLET: &str = "Contracts";
pub const CONTRACTS_CALL: &str = "call";
pub const CONTRACT_INFO_ENTRY: &str = "ContractInfoOf";
pub const DRY_RUN_METHOD: &str = "ContractsApi_call";

/// `ExecReturnValue::flags` bit signalling a reverted call
const REVERT_FLAG: u32 = 1;

/// Default selector of an ink! message: first four bytes of `blake2_256(label)`
pub fn default_selector(label: &str) -> [u8; 4] {
    let hash = blake2_256(label.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

#[derive(Debug, Deserialize)]
struct MetadataDocument {
    contract: ContractInfoJson,
    spec: SpecJson,
}

#[derive(Debug, Deserialize)]
struct ContractInfoJson {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpecJson {
    messages: Vec<MessageJson>,
}

#[derive(Debug, Deserialize)]
struct MessageJson {
    label: String,
    #[serde(default)]
    selector: Option<String>,
    mutates: bool,
    #[serde(default)]
    args: Vec<ArgJson>,
}

#[derive(Debug, Deserialize)]
struct ArgJson {
    label: String,
}

/// Callable message of a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub label: String,
    pub selector: [u8; 4],
    /// Whether the message changes contract state and needs a transaction
    pub mutates: bool,
    pub args: Vec<String>,
}

impl Message {
    /// Call input: selector followed by the SCALE encoded arguments
    pub fn input(&self, args: &[u8]) -> Vec<u8> {
        let mut input = Vec::with_capacity(4 + args.len());
        input.extend_from_slice(&self.selector);
        input.extend_from_slice(args);
        input
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractAbi {
    pub name: String,
    pub messages: Vec<Message>,
}

impl ContractAbi {
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        let document: MetadataDocument = serde_json::from_str(json)?;

        let messages = document
            .spec
            .messages
            .into_iter()
            .map(|message| -> Result<Message, BridgeError> {
                let selector = match message.selector {
                    Some(selector) => {
                        let mut raw = [0u8; 4];
                        hex::decode_to_slice(selector.trim_start_matches("0x"), &mut raw)?;
                        raw
                    }
                    None => default_selector(&message.label),
                };
                Ok(Message {
                    selector,
                    mutates: message.mutates,
                    args: message.args.into_iter().map(|arg| arg.label).collect(),
                    label: message.label,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: document.contract.name,
            messages,
        })
    }

    pub fn badges() -> Result<Self, BridgeError> {
        Self::from_json(BADGES_ABI)
    }

    pub fn message(&self, label: &str) -> Result<&Message, BridgeError> {
        self.messages
            .iter()
            .find(|message| message.label == label)
            .ok_or_else(|| BridgeError::Contract {
                message: format!("{} has no message {label}", self.name),
            })
    }
}

/// Deployed contract the session talks to
#[derive(Debug, Clone)]
pub struct ContractRef {
    pub id: AccountId32,
    pub abi: Arc<ContractAbi>,
}

impl ContractRef {
    pub fn new(id: &str, abi: ContractAbi) -> Result<Self, BridgeError> {
        Ok(Self {
            id: AddressMapping::parse_account(id)?,
            abi: Arc::new(abi),
        })
    }

    /// The badges contract at `id`
    pub fn badges(id: &str) -> Result<Self, BridgeError> {
        Self::new(id, ContractAbi::badges()?)
    }
}

/// Two dimensional weight
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct Weight {
    #[codec(compact)]
    pub ref_time: u64,
    #[codec(compact)]
    pub proof_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum StorageDeposit {
    Refund(u128),
    Charge(u128),
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ExecReturnValue {
    pub flags: u32,
    pub data: Vec<u8>,
}

impl ExecReturnValue {
    pub fn did_revert(&self) -> bool {
        self.flags & REVERT_FLAG != 0
    }
}

/// Leading fields of `ContractInfo`, enough to learn the code hash
#[derive(Debug, Decode)]
pub struct ContractInfoPrefix {
    pub _trie_id: Vec<u8>,
    pub code_hash: [u8; 32],
}

/// `DispatchError` of a failed dry run, only the variant and module error are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    pub variant: u8,
    /// Pallet index and first error byte of a `Module` error
    pub module: Option<(u8, u8)>,
}

impl Decode for DispatchFailure {
    fn decode<I: Input>(input: &mut I) -> Result<Self, parity_scale_codec::Error> {
        let variant = input.read_byte()?;
        let module = match variant {
            3 => {
                let pallet = input.read_byte()?;
                let error = <[u8; 4]>::decode(input)?;
                Some((pallet, error[0]))
            }
            _ => None,
        };
        Ok(Self { variant, module })
    }
}

impl std::fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.variant, self.module) {
            (_, Some((pallet, error))) => write!(f, "module error {error} of pallet {pallet}"),
            (2, None) => write!(f, "bad origin"),
            (variant, None) => write!(f, "dispatch error variant {variant}"),
        }
    }
}

/// `ContractsApi_call` result
///
/// Fields appended by newer runtimes after `result` are left unread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRun {
    pub gas_consumed: Weight,
    pub gas_required: Weight,
    pub storage_deposit: StorageDeposit,
    pub debug_message: String,
    pub result: Result<ExecReturnValue, DispatchFailure>,
}

impl Decode for DryRun {
    fn decode<I: Input>(input: &mut I) -> Result<Self, parity_scale_codec::Error> {
        let gas_consumed = Weight::decode(input)?;
        let gas_required = Weight::decode(input)?;
        let storage_deposit = StorageDeposit::decode(input)?;
        let debug_message = Vec::<u8>::decode(input)?;
        let result = Result::<ExecReturnValue, DispatchFailure>::decode(input)?;

        Ok(Self {
            gas_consumed,
            gas_required,
            storage_deposit,
            debug_message: String::from_utf8_lossy(&debug_message).into_owned(),
            result,
        })
    }
}

impl DryRun {
    /// Output of a successful, non reverted execution
    pub fn output(&self) -> Result<&[u8], BridgeError> {
        match &self.result {
            Ok(value) if value.did_revert() => Err(BridgeError::Contract {
                message: format!("execution reverted: 0x{}", hex::encode(&value.data)),
            }),
            Ok(value) => Ok(&value.data),
            Err(failure) => Err(BridgeError::Contract {
                message: failure.to_string(),
            }),
        }
    }
}

/// Decode the `MessageResult<T>` an ink! message returns
pub fn decode_message_result<T: Decode>(output: &[u8]) -> Result<T, BridgeError> {
    let input = &mut &output[..];
    match u8::decode(input)? {
        0 => Ok(T::decode(input)?),
        1 => Err(BridgeError::Contract {
            message: format!("contract could not handle input (lang error {:?})", input.first()),
        }),
        _ => Err(BridgeError::Codec("invalid message result".into())),
    }
}

/// Parameters of `ContractsApi_call`: origin, dest, value, gas limit, deposit limit, input
pub fn dry_run_params(origin: &AccountId32, dest: &AccountId32, input: &[u8]) -> Vec<u8> {
    (
        origin,
        dest,
        0u128,
        Option::<Weight>::None,
        Option::<u128>::None,
        input,
    )
        .encode()
}

/// Arguments of `Contracts::call`
pub fn call_args(dest: &AccountId32, gas_limit: Weight, input: Vec<u8>) -> Vec<u8> {
    let mut args = MultiAddress::<AccountId32, ()>::Id(dest.clone()).encode();
    Compact(0u128).encode_to(&mut args);
    gas_limit.encode_to(&mut args);
    Option::<Compact<u128>>::None.encode_to(&mut args);
    input.encode_to(&mut args);
    args
}

/// Encoded dry run result of a successful call returning `output`
#[cfg(test)]
pub(crate) fn dry_run_success(gas_required: Weight, output: Vec<u8>) -> Vec<u8> {
    let mut bytes = gas_required.encode();
    gas_required.encode_to(&mut bytes);
    StorageDeposit::Charge(0).encode_to(&mut bytes);
    Vec::<u8>::new().encode_to(&mut bytes);
    0u8.encode_to(&mut bytes);
    ExecReturnValue {
        flags: 0,
        data: output,
    }
    .encode_to(&mut bytes);
    bytes
}
