use alloy::{
    network::{EthereumWallet, ReceiptResponse, TransactionBuilder},
    primitives::Bytes,
    providers::{Provider, ProviderBuilder, RootProvider, WsConnect},
    pubsub::PubSubFrontend,
    rpc::types::{Filter, Log, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;

use super::{
    error::ChainError, utils, ContractCall, GasPolicy, LogFilter, RawLog, Receipt, ReceiptStatus,
    TransactionHandle,
};

/// Lazy, unbounded sequence of raw logs from one subscription.
///
/// Dropping the stream releases the underlying connection.
pub type LogStream = BoxStream<'static, Result<RawLog, ChainError>>;

/// Thin client over a remote chain node.
///
/// Implementations surface every outcome to the caller and never retry.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn gas_price(&self) -> Result<u128, ChainError>;

    /// Read-only `eth_call`.
    async fn call(&self, call: &ContractCall) -> Result<Bytes, ChainError>;

    /// Signs and submits a transaction. Must not be retried blindly: a retry
    /// with a fresh nonce can land twice.
    async fn submit(
        &self,
        signer: &PrivateKeySigner,
        call: &ContractCall,
        gas: &GasPolicy,
    ) -> Result<TransactionHandle, ChainError>;

    /// Polls for the receipt until `timeout` elapses. A reverted transaction is
    /// a receipt with [`ReceiptStatus::Failure`], not an error.
    async fn wait_for_confirmation(
        &self,
        handle: &TransactionHandle,
        timeout: Duration,
    ) -> Result<Receipt, ChainError>;

    /// Opens a fresh log subscription. Entries missed before the call are not
    /// replayed.
    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<LogStream, ChainError>;
}

/// [`ChainClient`] backed by Alloy: HTTP for calls and submissions, a
/// dedicated WebSocket connection per log subscription.
#[derive(Debug)]
pub struct AlloyChainClient {
    provider: RootProvider<Http<Client>>,
    rpc_url: String,
    ws_url: Option<String>,
    poll_interval: Duration,
}

impl AlloyChainClient {
    /// Connects to `rpc_url` and verifies the node answers.
    pub async fn connect(
        rpc_url: &str,
        ws_url: Option<&str>,
        poll_interval: Duration,
    ) -> Result<Self, ChainError> {
        let url = rpc_url
            .parse()
            .map_err(|e| ChainError::Connection(format!("Invalid RPC URL '{}': {}", rpc_url, e)))?;
        let provider = ProviderBuilder::new().on_http(url);

        let chain_id = provider.get_chain_id().await.map_err(|e| {
            ChainError::Connection(format!(
                "Cannot connect to blockchain node at {}: {}",
                rpc_url, e
            ))
        })?;
        tracing::info!(chain_id, rpc_url, "Connected to blockchain node");

        Ok(Self {
            provider,
            rpc_url: rpc_url.to_string(),
            ws_url: ws_url.map(str::to_string),
            poll_interval,
        })
    }

    fn read_error(e: impl std::fmt::Display) -> ChainError {
        ChainError::from_rpc_message(&e.to_string(), false)
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.provider.get_chain_id().await.map_err(Self::read_error)
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        self.provider.get_gas_price().await.map_err(Self::read_error)
    }

    async fn call(&self, call: &ContractCall) -> Result<Bytes, ChainError> {
        let request = TransactionRequest::default()
            .to(call.contract)
            .input(call.calldata.clone().into());

        tracing::debug!(
            contract = %utils::format_address(&call.contract),
            method = %call.method,
            "eth_call"
        );

        self.provider.call(&request).await.map_err(Self::read_error)
    }

    async fn submit(
        &self,
        signer: &PrivateKeySigner,
        call: &ContractCall,
        gas: &GasPolicy,
    ) -> Result<TransactionHandle, ChainError> {
        let from = signer.address();
        let url = self
            .rpc_url
            .parse()
            .map_err(|e| ChainError::Connection(format!("Invalid RPC URL '{}': {}", self.rpc_url, e)))?;

        // The wallet provider fills the nonce from the node's pending count
        let wallet = EthereumWallet::from(signer.clone());
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(url);

        let request = TransactionRequest::default()
            .from(from)
            .to(call.contract)
            .input(call.calldata.clone().into())
            .with_chain_id(gas.chain_id)
            .with_gas_limit(gas.gas_limit)
            .with_gas_price(gas.gas_price);

        tracing::info!(
            from = %utils::format_address(&from),
            contract = %utils::format_address(&call.contract),
            method = %call.method,
            chain_id = gas.chain_id,
            gas_price = gas.gas_price,
            "Submitting transaction"
        );

        let pending = provider
            .send_transaction(request)
            .await
            .map_err(|e| ChainError::from_rpc_message(&e.to_string(), true))?;

        let hash = *pending.tx_hash();
        tracing::info!(tx_hash = %utils::format_hash(&hash), "Transaction submitted");

        Ok(TransactionHandle { hash })
    }

    async fn wait_for_confirmation(
        &self,
        handle: &TransactionHandle,
        timeout: Duration,
    ) -> Result<Receipt, ChainError> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.provider.get_transaction_receipt(handle.hash).await {
                Ok(Some(receipt)) => {
                    let status = if receipt.status() {
                        ReceiptStatus::Success
                    } else {
                        ReceiptStatus::Failure
                    };
                    return Ok(Receipt {
                        tx_hash: receipt.transaction_hash,
                        block_number: receipt.block_number,
                        status,
                    });
                }
                Ok(None) => {}
                Err(e) => return Err(Self::read_error(e)),
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(ChainError::Timeout(format!(
                    "no receipt for {} after {}s",
                    utils::format_hash(&handle.hash),
                    timeout.as_secs()
                )));
            }

            tracing::debug!(tx_hash = %utils::format_hash(&handle.hash), "Waiting for receipt");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<LogStream, ChainError> {
        let ws_url = self.ws_url.as_deref().ok_or_else(|| {
            ChainError::Connection("no WebSocket endpoint configured for log subscriptions".into())
        })?;

        let provider = ProviderBuilder::new()
            .on_ws(WsConnect::new(ws_url))
            .await
            .map_err(|e| {
                ChainError::Connection(format!("Failed to connect to {}: {}", ws_url, e))
            })?;

        let rpc_filter = Filter::new()
            .address(filter.address)
            .event_signature(filter.event_signature);

        let subscription = provider
            .subscribe_logs(&rpc_filter)
            .await
            .map_err(|e| ChainError::Connection(format!("Failed to subscribe to logs: {}", e)))?;

        tracing::info!(
            contract = %utils::format_address(&filter.address),
            ws_url,
            "Log subscription established"
        );

        Ok(OwnedLogStream {
            _provider: provider,
            inner: subscription.into_stream().boxed(),
        }
        .boxed())
    }
}

/// Keeps the WebSocket provider alive exactly as long as its log stream.
struct OwnedLogStream {
    _provider: RootProvider<PubSubFrontend>,
    inner: BoxStream<'static, Log>,
}

impl Stream for OwnedLogStream {
    type Item = Result<RawLog, ChainError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut()
            .inner
            .poll_next_unpin(cx)
            .map(|next| next.map(|log| Ok(raw_log(log))))
    }
}

fn raw_log(log: Log) -> RawLog {
    RawLog {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        block_number: log.block_number,
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
        removed: log.removed,
    }
}
