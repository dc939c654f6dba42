//! Purchase event decoding and the subscription task that forwards decoded
//! events to a consumer.

use alloy::primitives::{Address, B256, U256};
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    error::GatewayError,
    provider::LogStream,
    utils::{self, Amount},
    PurchaseEvent, RawLog,
};

/// buyer is indexed; tokenAmount, ethAmount and timestamp are data words.
const PURCHASE_DATA_WORDS: usize = 3;
const WORD: usize = 32;

/// Decodes a `TokenPurchase(address indexed, uint256, uint256, uint256)` log.
///
/// Lengths are checked before any slicing.
pub fn decode_purchase_event(log: &RawLog, signature: B256) -> Result<PurchaseEvent, GatewayError> {
    if log.topics.len() < 2 {
        return Err(GatewayError::MalformedLog(format!(
            "expected 2 topics, got {}",
            log.topics.len()
        )));
    }
    if log.topics[0] != signature {
        return Err(GatewayError::MalformedLog(format!(
            "unexpected event signature {}",
            utils::format_hash(&log.topics[0])
        )));
    }

    let buyer_topic = log.topics[1];
    if buyer_topic[..12].iter().any(|b| *b != 0) {
        return Err(GatewayError::MalformedLog(format!(
            "buyer topic {} is not a left-padded address",
            utils::format_hash(&buyer_topic)
        )));
    }

    let data = log.data.as_ref();
    if data.len() < PURCHASE_DATA_WORDS * WORD {
        return Err(GatewayError::MalformedLog(format!(
            "data is {} bytes, expected at least {}",
            data.len(),
            PURCHASE_DATA_WORDS * WORD
        )));
    }

    let tx_hash = log
        .transaction_hash
        .ok_or_else(|| GatewayError::MalformedLog("missing transaction hash".to_string()))?;
    let block_number = log
        .block_number
        .ok_or_else(|| GatewayError::MalformedLog("missing block number".to_string()))?;

    let word = |i: usize| U256::from_be_slice(&data[i * WORD..(i + 1) * WORD]);
    let timestamp = utils::u256_to_u64(word(2), "timestamp")
        .map_err(|e| GatewayError::MalformedLog(e.to_string()))?;

    Ok(PurchaseEvent {
        buyer: Address::from_word(buyer_topic),
        token_amount: Amount(word(0)),
        eth_amount: Amount(word(1)),
        timestamp,
        tx_hash,
        block_number,
    })
}

/// Handle to a running purchase-event subscription.
///
/// Events arrive in the chain's log order. Cancelling (explicitly or by
/// dropping the handle) stops the forwarding task, which then drops the log
/// stream and with it the node connection.
pub struct PurchaseEventWatch {
    events: mpsc::Receiver<PurchaseEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PurchaseEventWatch {
    pub fn spawn(logs: LogStream, signature: B256, buffer: usize) -> Self {
        let (tx, events) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(forward_purchase_events(logs, signature, tx, cancel.clone()));

        Self {
            events,
            cancel,
            task: Some(task),
        }
    }

    /// Next decoded event, or `None` once the subscription has ended.
    pub async fn next_event(&mut self) -> Option<PurchaseEvent> {
        self.events.recv().await
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels and waits for the forwarding task to finish its cleanup.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Purchase event task failed: {}", e);
            }
        }
    }
}

impl Stream for PurchaseEventWatch {
    type Item = PurchaseEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

impl Drop for PurchaseEventWatch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn forward_purchase_events(
    mut logs: LogStream,
    signature: B256,
    sender: mpsc::Sender<PurchaseEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Purchase event subscription cancelled");
                break;
            }
            next = logs.next() => match next {
                Some(Ok(log)) if log.removed => {
                    debug!(tx_hash = ?log.transaction_hash, "Skipping removed log");
                }
                Some(Ok(log)) => match decode_purchase_event(&log, signature) {
                    Ok(event) => {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            sent = sender.send(event) => {
                                if sent.is_err() {
                                    debug!("Purchase event consumer went away");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(tx_hash = ?log.transaction_hash, "Skipping purchase log: {}", e);
                    }
                },
                Some(Err(e)) => {
                    error!("Purchase event subscription error: {}", e);
                    break;
                }
                None => {
                    info!("Purchase event subscription ended");
                    break;
                }
            }
        }
    }

    // Single exit: the stream (and its connection) is released here
    drop(logs);
}
