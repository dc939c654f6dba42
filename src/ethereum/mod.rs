pub mod abi;
pub mod contract;
pub mod error;
pub mod events;
pub mod provider;
pub mod utils;

#[cfg(test)]
pub mod testing;

use alloy::primitives::{Address, Bytes, B256};
use serde::Serialize;
use std::fmt;

use utils::{serialize_address, serialize_hash, Amount};

/// Which of the two contracts an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractRole {
    Sale,
    Token,
}

impl fmt::Display for ContractRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sale => f.write_str("sale"),
            Self::Token => f.write_str("token"),
        }
    }
}

/// Point-in-time read of the sale configuration and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleSnapshot {
    pub token_price: Amount,
    pub min_purchase: Amount,
    pub max_purchase: Amount,
    pub max_supply: Amount,
    pub start_time: u64,
    pub end_time: u64,
    pub whitelist_required: bool,
    pub total_sold: Amount,
    pub total_raised: Amount,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPurchaseInfo {
    #[serde(serialize_with = "serialize_address")]
    pub address: Address,
    pub amount: Amount,
    pub eth_spent: Amount,
    pub timestamp: u64,
    pub claimed: bool,
    pub total_purchased: Amount,
}

/// A decoded `TokenPurchase` log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEvent {
    #[serde(serialize_with = "serialize_address")]
    pub buyer: Address,
    pub token_amount: Amount,
    pub eth_amount: Amount,
    pub timestamp: u64,
    #[serde(serialize_with = "serialize_hash")]
    pub tx_hash: B256,
    pub block_number: u64,
}

/// A contract invocation: target, method name and encoded calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub contract: Address,
    pub method: String,
    pub calldata: Bytes,
}

/// Gas parameters resolved by the gateway before each submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    pub chain_id: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionHandle {
    pub hash: B256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Failure,
}

/// Inclusion record for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub status: ReceiptStatus,
}

/// A state-changing call and, once resolved, its receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    #[serde(serialize_with = "serialize_hash")]
    pub tx_hash: B256,
    #[serde(serialize_with = "serialize_address")]
    pub contract: Address,
    pub method: String,
    #[serde(skip)]
    pub calldata: Bytes,
    pub status: Option<ReceiptStatus>,
    pub block_number: Option<u64>,
}

impl PendingTransaction {
    pub fn submitted(handle: TransactionHandle, call: ContractCall) -> Self {
        Self {
            tx_hash: handle.hash,
            contract: call.contract,
            method: call.method,
            calldata: call.calldata,
            status: None,
            block_number: None,
        }
    }

    pub fn resolve(&mut self, receipt: &Receipt) {
        self.status = Some(receipt.status);
        self.block_number = receipt.block_number;
    }
}

/// Log subscription filter: one emitter, one event signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub event_signature: B256,
}

/// A log entry as delivered by the node, before decoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
    pub removed: bool,
}
