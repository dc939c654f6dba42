use alloy::primitives::B256;
use thiserror::Error;

use super::ContractRole;

/// Outcomes surfaced by a [`ChainClient`](super::provider::ChainClient).
///
/// The adapter never retries; these variants exist so the caller can decide.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("remote execution error: {0}")]
    RemoteExecution(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("nonce conflict: {0}")]
    NonceConflict(String),
    #[error("timed out: {0}")]
    Timeout(String),
}

impl ChainError {
    /// Classifies a raw RPC error message.
    ///
    /// `submission` selects the taxonomy for `eth_sendRawTransaction` style
    /// failures; reads only ever report connection or execution problems.
    pub fn from_rpc_message(message: &str, submission: bool) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::Timeout(message.to_string());
        }
        if lower.contains("connection refused")
            || lower.contains("network unreachable")
            || lower.contains("error sending request")
            || lower.contains("connection reset")
        {
            return Self::Connection(message.to_string());
        }
        if submission {
            if lower.contains("insufficient funds") {
                return Self::InsufficientFunds(message.to_string());
            }
            if lower.contains("nonce too low")
                || lower.contains("nonce too high")
                || lower.contains("replacement transaction underpriced")
                || lower.contains("already known")
            {
                return Self::NonceConflict(message.to_string());
            }
            if lower.contains("signer") || lower.contains("signature") {
                return Self::Signing(message.to_string());
            }
        }
        if lower.contains("execution reverted") || lower.contains("revert") {
            return Self::RemoteExecution(message.to_string());
        }
        if submission {
            Self::RemoteExecution(message.to_string())
        } else {
            Self::Connection(message.to_string())
        }
    }
}

/// Errors returned by the contract gateway and the codec beneath it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error("method or event '{name}' is not part of the {role} contract interface")]
    UnknownMethod { role: ContractRole, name: String },
    #[error("{0} contract address is not configured")]
    ContractNotConfigured(ContractRole),
    #[error("a signing key is required for state-changing operations")]
    SigningKeyRequired,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("remote execution error: {0}")]
    RemoteExecution(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("nonce conflict: {0}")]
    NonceConflict(String),
    #[error("transaction 0x{} reverted", hex::encode(.tx_hash))]
    TransactionReverted {
        tx_hash: B256,
        block_number: Option<u64>,
    },
    #[error("timed out: {0}")]
    Timeout(String),
    /// The transaction was broadcast but its outcome is unknown. The hash
    /// lets the caller re-poll instead of resubmitting.
    #[error("transaction 0x{} was submitted but not confirmed: {source}", hex::encode(.tx_hash))]
    ConfirmationFailed {
        tx_hash: B256,
        source: Box<GatewayError>,
    },
    #[error("malformed log: {0}")]
    MalformedLog(String),
    #[error("unexpected output from '{method}': {reason}")]
    UnexpectedOutput { method: String, reason: String },
}

impl From<ChainError> for GatewayError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Connection(m) => Self::Connection(m),
            ChainError::RemoteExecution(m) => Self::RemoteExecution(m),
            ChainError::Signing(m) => Self::Signing(m),
            ChainError::InsufficientFunds(m) => Self::InsufficientFunds(m),
            ChainError::NonceConflict(m) => Self::NonceConflict(m),
            ChainError::Timeout(m) => Self::Timeout(m),
        }
    }
}
