//! # EVM account mapping client
//!
//! Lets an Ethereum wallet act on a Substrate chain. The wallet's secp256k1 identity is
//! mapped to a Substrate account and every action is authorized with an EVM signature.
//!
//! ## Strategies
//!
//! - `runtime`: the chain maps the account and executes EIP-712 signed meta calls
//! - `local`: the address is derived locally from a recovered public key, read only
//! - `relay`: EVM signed payloads are relayed through the adapter pallet

use clap::Parser;

mod adapter;
mod bridge;
mod cache;
mod certificate;
mod command;
mod contract;
mod endpoint;
mod server;
mod session;
mod signer;
mod sub_client;
mod traits;
mod types;
mod wallet;


#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = command::Opts::parse();
    command::run(opts).await
}
