use crate::bridge::derive_address;
use crate::session::Session;
use crate::traits::BridgeApiServer;
use crate::types::{AccountInfo, ActionOutcome, BridgeError, ConnectionStatus, TransactionResult};
use alloy_primitives::Bytes;
use evm_mapping_primitives::EcdsaSignature;
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::Server;
use std::sync::Arc;

/// Default block explorer for transaction links
pub const DEFAULT_EXPLORER: &str = "https://polkadot.js.org/apps/";

/// JSON-RPC front of a [`Session`]
pub struct BridgeServer {
    session: Arc<Session>,
    /// Explorer base URL used in logged links
    explorer: String,
}

impl BridgeServer {
    pub fn new(session: Arc<Session>, explorer: String) -> Self {
        Self { session, explorer }
    }

    fn log_transaction(&self, result: &Result<TransactionResult, BridgeError>) {
        match result {
            Ok(tx) => {
                let endpoint = self
                    .session
                    .status()
                    .map(|status| status.endpoint)
                    .unwrap_or_default();
                log::info!(
                    "finalized {:?}: {} [{}]",
                    tx.extrinsic_hash,
                    tx.explorer_link(&self.explorer, &endpoint),
                    tx.event_names().join(", ")
                );
            }
            Err(e) => log::error!("action failed: {e}"),
        }
    }
}

#[async_trait]
impl BridgeApiServer for BridgeServer {
    async fn connect(&self, endpoint: String) -> RpcResult<ActionOutcome<ConnectionStatus>> {
        Ok(self.session.connect(&endpoint).await.into())
    }

    async fn reconnect(&self) -> RpcResult<ActionOutcome<ConnectionStatus>> {
        Ok(self.session.reconnect().await.into())
    }

    async fn status(&self) -> RpcResult<ActionOutcome<ConnectionStatus>> {
        Ok(self.session.status().into())
    }

    async fn balance(&self) -> RpcResult<ActionOutcome<AccountInfo>> {
        Ok(self.session.balance().await.into())
    }

    async fn submit_remark(&self, message: String) -> RpcResult<ActionOutcome<TransactionResult>> {
        let result = self.session.submit_remark(&message).await;
        self.log_transaction(&result);
        Ok(result.into())
    }

    async fn new_badge(&self, name: String) -> RpcResult<ActionOutcome<TransactionResult>> {
        let result = self.session.new_badge(&name).await;
        self.log_transaction(&result);
        Ok(result.into())
    }

    async fn total_badges(&self) -> RpcResult<ActionOutcome<u32>> {
        Ok(self.session.total_badges().await.into())
    }

    async fn check_evm_account(&self) -> RpcResult<ActionOutcome<bool>> {
        Ok(self.session.check_evm_account().await.into())
    }

    fn derive_address(&self, message: Bytes, signature: Bytes) -> RpcResult<String> {
        let signature = EcdsaSignature::from_slice(&signature).map_err(BridgeError::from)?;
        let address = derive_address(&message, &signature, self.session.settings().ss58_prefix)?;
        Ok(address)
    }
}

/// Runs the bridge RPC server until Ctrl-C
pub async fn run_server(session: Arc<Session>, explorer: String, port: u16) -> anyhow::Result<()> {
    let bridge = BridgeServer::new(session, explorer);

    let server = Server::builder().build(format!("127.0.0.1:{port}")).await?;
    let addr = server.local_addr()?;

    let server_handle = server.start(bridge.into_rpc());
    log::info!("Server started at: {}", addr);

    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut tx = Some(tx);
    ctrlc::set_handler(move || {
        if let Some(tx) = tx.take() {
            let _ = tx.send(());
        }
    })?;

    let _ = rx.await;
    log::info!("Shutting down");
    server_handle.stop()?;
    server_handle.stopped().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeSettings;
    use crate::sub_client::SubClientConnector;
    use crate::wallet::DevWallet;
    use alloy_primitives::hex;

    fn server() -> BridgeServer {
        let settings = BridgeSettings {
            ss58_prefix: 30,
            ..Default::default()
        };
        let session = Session::new(
            Arc::new(DevWallet::alith()),
            Arc::new(SubClientConnector),
            settings,
            None,
        );
        BridgeServer::new(Arc::new(session), DEFAULT_EXPLORER.to_string())
    }

    #[test]
    fn derive_address_uses_session_prefix() {
        let address = server()
            .derive_address(
                Bytes::from_static(b"test eth signed message"),
                Bytes::from(hex!("dd0992d40e5cdf99db76bed162808508ac65acd7ae2fdc8573594f03ed9c939773e813181788fc02c3c68f3fdc592759b35f6354484343e18cb5317d34dab6c61b")),
            )
            .unwrap();
        assert_eq!(address, "45CjWoczbK3a6yJR9nPPHuFxSQ9TGkziwpnb6Rwkdj1MbAHN");
    }

    #[test]
    fn derive_address_rejects_short_signature() {
        let err = server()
            .derive_address(Bytes::from_static(b"msg"), Bytes::from(vec![0u8; 64]))
            .unwrap_err();
        assert_eq!(err.code(), 500);
    }

    #[tokio::test]
    async fn invalid_endpoint_is_a_failed_outcome() {
        let outcome = server().connect("http://example".into()).await.unwrap();
        assert!(matches!(outcome, ActionOutcome::Failed { .. }));

        let status = server().status().await.unwrap();
        assert!(matches!(status, ActionOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn reconnect_without_endpoint_is_a_failed_outcome() {
        let outcome = server().reconnect().await.unwrap();
        match outcome {
            ActionOutcome::Failed { reason } => {
                assert_eq!(reason, "not ready: no endpoint to reconnect to")
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
