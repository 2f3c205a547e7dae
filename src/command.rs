//! Command line interface for the EVM account mapping client.

use crate::bridge::{derive_address, BridgeSettings};
use crate::contract::{ContractRef, DEFAULT_CONTRACT};
use crate::server::{run_server, DEFAULT_EXPLORER};
use crate::session::Session;
use crate::sub_client::SubClientConnector;
use crate::traits::WalletProvider;
use crate::types::{BridgeError, Strategy, TransactionResult};
use crate::wallet::{DevWallet, RpcWallet};
use evm_mapping_primitives::EcdsaSignature;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, clap::Parser)]
#[clap(version = "0.1", author = "EVM Mapping")]
pub struct Opts {
    /// Chain node WebSocket endpoint
    #[clap(short, long, env = "EVM_MAPPING_ENDPOINT", default_value = "ws://127.0.0.1:9944")]
    pub endpoint: String,

    /// How the wallet account is bridged to the chain
    #[clap(long, value_enum, default_value_t = Strategy::Runtime)]
    pub strategy: Strategy,

    /// SS58 network prefix of the chain
    #[clap(long, default_value_t = 42)]
    pub ss58_prefix: u16,

    /// Chain id of the EIP-712 domain
    #[clap(long, default_value_t = 1)]
    pub chain_id: u64,

    /// Magic number of the relay pallet, hex or decimal
    #[clap(long, value_parser = parse_magic, default_value = "0x0250")]
    pub call_magic: u16,

    /// JSON-RPC URL of an external EVM wallet
    #[clap(long, env = "EVM_MAPPING_WALLET_URL", conflicts_with = "dev_seed")]
    pub wallet_url: Option<String>,

    /// Hex seed of an in-process development key, Alith when neither wallet option is given
    #[clap(long, env = "EVM_MAPPING_DEV_SEED")]
    pub dev_seed: Option<String>,

    /// Badges contract id, hex or SS58
    #[clap(long, default_value = DEFAULT_CONTRACT)]
    pub contract: String,

    /// Block explorer base URL
    #[clap(long, default_value = DEFAULT_EXPLORER)]
    pub explorer: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Connect and show the mapped account
    Connect,
    /// Show `System.Account` of the mapped account
    Balance,
    /// Submit a remark
    Remark { message: String },
    /// Create a badge on the contract
    NewBadge { name: String },
    /// Query the number of badges
    TotalBadges,
    /// Ask the contract whether the mapped account is the wallet's ECDSA account
    CheckEvmAccount,
    /// Derive the address for a signed personal message, offline
    Derive {
        message: String,
        /// Hex encoded 65 byte signature
        signature: String,
    },
    /// Serve the bridge over JSON-RPC
    Serve {
        #[clap(long, default_value_t = 8545)]
        port: u16,
    },
}

impl Opts {
    fn settings(&self) -> BridgeSettings {
        BridgeSettings {
            strategy: self.strategy,
            ss58_prefix: self.ss58_prefix,
            eip712_chain_id: self.chain_id,
            call_magic: self.call_magic,
        }
    }

    fn wallet(&self) -> Result<Arc<dyn WalletProvider>, BridgeError> {
        if let Some(url) = &self.wallet_url {
            let wallet = RpcWallet::new(url)?;
            log::info!("using wallet at {}", wallet.url());
            return Ok(Arc::new(wallet));
        }

        let wallet = match &self.dev_seed {
            Some(seed) => DevWallet::from_seed_hex(seed)?,
            None => DevWallet::alith(),
        };
        log::warn!("using development key {}", wallet.address());
        Ok(Arc::new(wallet))
    }
}

fn parse_magic(input: &str) -> Result<u16, std::num::ParseIntError> {
    match input.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => input.parse(),
    }
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_transaction(result: &TransactionResult, explorer: &str, endpoint: &str) {
    println!("Extrinsic: {:?}", result.extrinsic_hash);
    println!("Block: #{} {:?}", result.block_number, result.block_hash);
    for event in result.event_names() {
        println!("  {event}");
    }
    println!("{}", result.explorer_link(explorer, endpoint));
}

pub async fn run(opts: Opts) -> anyhow::Result<()> {
    if let Command::Derive { message, signature } = &opts.command {
        let raw = hex::decode(signature.trim().trim_start_matches("0x"))?;
        let signature = EcdsaSignature::from_slice(&raw).map_err(BridgeError::from)?;
        println!(
            "{}",
            derive_address(message.as_bytes(), &signature, opts.ss58_prefix)?
        );
        return Ok(());
    }

    let contract = ContractRef::badges(&opts.contract)?;
    let session = Arc::new(Session::new(
        opts.wallet()?,
        Arc::new(SubClientConnector),
        opts.settings(),
        Some(contract),
    ));

    if let Command::Serve { port } = opts.command {
        return run_server(session, opts.explorer, port).await;
    }

    let status = session.connect(&opts.endpoint).await?;
    log::info!("{} mapped to {}", status.evm_address, status.account);

    match &opts.command {
        Command::Connect => print(&status)?,
        Command::Balance => print(&session.balance().await?)?,
        Command::Remark { message } => {
            let result = session.submit_remark(message).await?;
            print_transaction(&result, &opts.explorer, &status.endpoint);
        }
        Command::NewBadge { name } => {
            let result = session.new_badge(name).await?;
            print_transaction(&result, &opts.explorer, &status.endpoint);
        }
        Command::TotalBadges => println!("Total badges: {}", session.total_badges().await?),
        Command::CheckEvmAccount => {
            println!("Is ECDSA account: {}", session.check_evm_account().await?)
        }
        Command::Derive { .. } | Command::Serve { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_defaults() {
        let opts = Opts::try_parse_from(["evm-mapping", "balance"]).unwrap();
        assert_eq!(opts.strategy, Strategy::Runtime);
        assert_eq!(opts.contract, DEFAULT_CONTRACT);
        assert!(matches!(opts.command, Command::Balance));
        assert_eq!(opts.settings(), BridgeSettings::default());
    }

    #[test]
    fn parses_strategy_and_subcommand_args() {
        let opts = Opts::try_parse_from([
            "evm-mapping",
            "--strategy",
            "relay",
            "--ss58-prefix",
            "30",
            "--call-magic",
            "0x0150",
            "remark",
            "hello",
        ])
        .unwrap();
        assert_eq!(opts.settings().strategy, Strategy::Relay);
        assert_eq!(opts.settings().ss58_prefix, 30);
        assert_eq!(opts.settings().call_magic, 0x0150);
        assert!(matches!(opts.command, Command::Remark { ref message } if message == "hello"));
    }

    #[test]
    fn wallet_sources_conflict() {
        assert!(Opts::try_parse_from([
            "evm-mapping",
            "--wallet-url",
            "http://127.0.0.1:8546",
            "--dev-seed",
            "00",
            "connect",
        ])
        .is_err());
    }
}
