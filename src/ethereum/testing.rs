//! Scripted [`ChainClient`] and log streams for unit tests.

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;

use super::error::ChainError;
use super::provider::{ChainClient, LogStream};
use super::{ContractCall, GasPolicy, LogFilter, RawLog, Receipt, ReceiptStatus, TransactionHandle};

pub const TEST_CHAIN_ID: u64 = 31337;
pub const TEST_GAS_PRICE: u128 = 2_000_000_000;

/// Development key with a well-known address.
pub const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn encode_output(values: Vec<DynSolValue>) -> Bytes {
    Bytes::from(DynSolValue::Tuple(values).abi_encode_params())
}

pub fn uint(value: u64) -> DynSolValue {
    DynSolValue::Uint(U256::from(value), 256)
}

/// A well-formed `TokenPurchase` log.
pub fn purchase_log(
    signature: B256,
    buyer: Address,
    token_amount: u64,
    eth_amount: u64,
    timestamp: u64,
    block_number: u64,
) -> RawLog {
    RawLog {
        address: Address::repeat_byte(0x5a),
        topics: vec![signature, buyer.into_word()],
        data: encode_output(vec![uint(token_amount), uint(eth_amount), uint(timestamp)]),
        block_number: Some(block_number),
        transaction_hash: Some(B256::from(U256::from(block_number))),
        log_index: Some(0),
        removed: false,
    }
}

/// Counts how many times a scripted log stream has been dropped.
#[derive(Debug, Clone, Default)]
pub struct ReleaseCounter(Arc<AtomicUsize>);

impl ReleaseCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub async fn wait_for(&self, n: usize) {
        while self.count() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

struct GuardedStream {
    inner: BoxStream<'static, Result<RawLog, ChainError>>,
    released: ReleaseCounter,
}

impl Stream for GuardedStream {
    type Item = Result<RawLog, ChainError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

impl Drop for GuardedStream {
    fn drop(&mut self) {
        self.released.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptedLogs;

impl ScriptedLogs {
    /// A stream that yields `entries` and then ends.
    pub fn finite(entries: Vec<Result<RawLog, ChainError>>) -> (LogStream, ReleaseCounter) {
        let released = ReleaseCounter::default();
        let stream = GuardedStream {
            inner: stream::iter(entries).boxed(),
            released: released.clone(),
        };
        (stream.boxed(), released)
    }

    /// A stream fed by the returned sender; it stays open while the sender lives.
    pub fn live() -> (
        LogStream,
        mpsc::UnboundedSender<Result<RawLog, ChainError>>,
        ReleaseCounter,
    ) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let released = ReleaseCounter::default();
        let inner = stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed();
        let stream = GuardedStream {
            inner,
            released: released.clone(),
        };
        (stream.boxed(), tx, released)
    }
}

#[derive(Debug, Clone)]
pub struct SubmittedTransaction {
    pub from: Address,
    pub call: ContractCall,
    pub gas: GasPolicy,
}

#[derive(Default)]
struct MockState {
    outputs: HashMap<String, Result<Bytes, ChainError>>,
    calls: Vec<ContractCall>,
    submitted: Vec<SubmittedTransaction>,
    filters: Vec<LogFilter>,
    logs: Option<LogStream>,
    submit_error: Option<ChainError>,
    confirm_error: Option<ChainError>,
    receipt_status: Option<ReceiptStatus>,
    call_delay: Option<Duration>,
    confirm_delay: Option<Duration>,
}

/// In-memory chain node. Read results are scripted per method name.
#[derive(Clone, Default)]
pub struct MockChainClient {
    state: Arc<Mutex<MockState>>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(self, method: &str, values: Vec<DynSolValue>) -> Self {
        self.state
            .lock()
            .unwrap()
            .outputs
            .insert(method.to_string(), Ok(encode_output(values)));
        self
    }

    pub fn with_raw_output(self, method: &str, data: Bytes) -> Self {
        self.state
            .lock()
            .unwrap()
            .outputs
            .insert(method.to_string(), Ok(data));
        self
    }

    pub fn with_call_error(self, method: &str, error: ChainError) -> Self {
        self.state
            .lock()
            .unwrap()
            .outputs
            .insert(method.to_string(), Err(error));
        self
    }

    pub fn with_call_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().call_delay = Some(delay);
        self
    }

    /// Receipts take this long to appear, ignoring the adapter's own deadline.
    pub fn with_confirm_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().confirm_delay = Some(delay);
        self
    }

    pub fn with_submit_error(self, error: ChainError) -> Self {
        self.state.lock().unwrap().submit_error = Some(error);
        self
    }

    pub fn with_confirm_error(self, error: ChainError) -> Self {
        self.state.lock().unwrap().confirm_error = Some(error);
        self
    }

    pub fn with_receipt_status(self, status: ReceiptStatus) -> Self {
        self.state.lock().unwrap().receipt_status = Some(status);
        self
    }

    pub fn with_logs(self, logs: LogStream) -> Self {
        self.state.lock().unwrap().logs = Some(logs);
        self
    }

    pub fn calls(&self) -> Vec<ContractCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn submitted(&self) -> Vec<SubmittedTransaction> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn filters(&self) -> Vec<LogFilter> {
        self.state.lock().unwrap().filters.clone()
    }

    pub fn test_signer() -> PrivateKeySigner {
        super::utils::parse_signing_key(TEST_KEY).unwrap()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(TEST_CHAIN_ID)
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        Ok(TEST_GAS_PRICE)
    }

    async fn call(&self, call: &ContractCall) -> Result<Bytes, ChainError> {
        let (delay, output) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call.clone());
            let output = state.outputs.get(&call.method).cloned().unwrap_or_else(|| {
                Err(ChainError::RemoteExecution(format!(
                    "execution reverted: no output scripted for {}",
                    call.method
                )))
            });
            (state.call_delay, output)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        output
    }

    async fn submit(
        &self,
        signer: &PrivateKeySigner,
        call: &ContractCall,
        gas: &GasPolicy,
    ) -> Result<TransactionHandle, ChainError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.submit_error.clone() {
            return Err(error);
        }

        state.submitted.push(SubmittedTransaction {
            from: signer.address(),
            call: call.clone(),
            gas: *gas,
        });
        let hash = B256::from(U256::from(state.submitted.len() as u64));
        Ok(TransactionHandle { hash })
    }

    async fn wait_for_confirmation(
        &self,
        handle: &TransactionHandle,
        _timeout: Duration,
    ) -> Result<Receipt, ChainError> {
        let (delay, outcome) = {
            let state = self.state.lock().unwrap();
            let outcome = match state.confirm_error.clone() {
                Some(error) => Err(error),
                None => Ok(Receipt {
                    tx_hash: handle.hash,
                    block_number: Some(100),
                    status: state.receipt_status.unwrap_or(ReceiptStatus::Success),
                }),
            };
            (state.confirm_delay, outcome)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }

    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<LogStream, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.filters.push(filter.clone());
        state
            .logs
            .take()
            .ok_or_else(|| ChainError::Connection("subscription refused".to_string()))
    }
}
