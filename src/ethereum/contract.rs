use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, U256},
    signers::local::PrivateKeySigner,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{
    abi::InterfaceDescriptor,
    error::GatewayError,
    events::PurchaseEventWatch,
    provider::ChainClient,
    utils::{self, Amount},
    ContractCall, ContractRole, GasPolicy, LogFilter, PendingTransaction, ReceiptStatus,
    SaleSnapshot, UserPurchaseInfo,
};

pub const PURCHASE_EVENT: &str = "TokenPurchase";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayOptions {
    /// Deadline for each read and for each submission.
    pub call_timeout: Duration,
    /// How long a submitted transaction may take to be included.
    pub confirmation_timeout: Duration,
    pub gas_limit: u64,
    /// Capacity of the channel between a subscription task and its consumer.
    pub event_buffer: usize,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            confirmation_timeout: Duration::from_secs(120),
            gas_limit: 300_000,
            event_buffer: 64,
        }
    }
}

/// Typed operations over the sale and token contracts.
///
/// The gateway holds no state beyond its configuration. A missing contract
/// address disables that contract's operations; a missing signing key makes
/// the gateway read-only.
///
/// Nonces are assigned by the node at submission time and there is no
/// in-process sequencer, so concurrent writes under one key (from this or
/// another process) can collide with [`GatewayError::NonceConflict`]. Run a
/// single writer per key.
pub struct ContractGateway {
    client: Arc<dyn ChainClient>,
    descriptor: InterfaceDescriptor,
    sale: Option<Address>,
    token: Option<Address>,
    signer: Option<PrivateKeySigner>,
    options: GatewayOptions,
}

impl std::fmt::Debug for ContractGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractGateway")
            .field("sale", &self.sale)
            .field("token", &self.token)
            .field("signer", &self.signer.as_ref().map(|s| s.address()))
            .field("options", &self.options)
            .finish()
    }
}

impl ContractGateway {
    /// Zero addresses are treated as not configured.
    pub fn new(
        client: Arc<dyn ChainClient>,
        descriptor: InterfaceDescriptor,
        sale: Option<Address>,
        token: Option<Address>,
        signer: Option<PrivateKeySigner>,
        options: GatewayOptions,
    ) -> Self {
        Self {
            client,
            descriptor,
            sale: sale.filter(|a| !a.is_zero()),
            token: token.filter(|a| !a.is_zero()),
            signer,
            options,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.signer.is_none()
    }

    fn contract(&self, role: ContractRole) -> Result<Address, GatewayError> {
        match role {
            ContractRole::Sale => self.sale,
            ContractRole::Token => self.token,
        }
        .ok_or(GatewayError::ContractNotConfigured(role))
    }

    async fn with_deadline<T, F>(
        &self,
        what: &str,
        deadline: Duration,
        fut: F,
    ) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        tokio::time::timeout(deadline, fut).await.map_err(|_| {
            GatewayError::Timeout(format!("{} did not complete within {:?}", what, deadline))
        })?
    }

    async fn read(
        &self,
        role: ContractRole,
        method: &str,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>, GatewayError> {
        let contract = self.contract(role)?;
        let calldata = self.descriptor.encode_call(role, method, args)?;
        let call = ContractCall {
            contract,
            method: method.to_string(),
            calldata,
        };

        let data = self
            .with_deadline(method, self.options.call_timeout, async {
                self.client.call(&call).await.map_err(GatewayError::from)
            })
            .await
            .map_err(|e| {
                tracing::debug!(%role, method, "Contract read failed: {}", e);
                e
            })?;

        self.descriptor.decode_output(role, method, &data)
    }

    /// Signs, submits and waits for a state-changing call.
    ///
    /// A receipt with failure status is reported as
    /// [`GatewayError::TransactionReverted`].
    async fn transact(
        &self,
        role: ContractRole,
        method: &str,
        args: &[DynSolValue],
    ) -> Result<PendingTransaction, GatewayError> {
        let signer = self.signer.as_ref().ok_or(GatewayError::SigningKeyRequired)?;
        let contract = self.contract(role)?;
        let calldata = self.descriptor.encode_call(role, method, args)?;
        let call = ContractCall {
            contract,
            method: method.to_string(),
            calldata,
        };

        let timeout = self.options.call_timeout;
        let chain_id = self
            .with_deadline("chain id", timeout, async {
                self.client.chain_id().await.map_err(GatewayError::from)
            })
            .await?;
        let gas_price = self
            .with_deadline("gas price", timeout, async {
                self.client.gas_price().await.map_err(GatewayError::from)
            })
            .await?;
        let gas = GasPolicy {
            chain_id,
            gas_price,
            gas_limit: self.options.gas_limit,
        };

        let handle = self
            .with_deadline(method, timeout, async {
                self.client
                    .submit(signer, &call, &gas)
                    .await
                    .map_err(GatewayError::from)
            })
            .await?;
        let mut pending = PendingTransaction::submitted(handle, call);

        // From here on the transaction is on the wire; every failure keeps its hash
        let confirmation = self.options.confirmation_timeout;
        let receipt = self
            .with_deadline("confirmation", confirmation + timeout, async {
                self.client
                    .wait_for_confirmation(&handle, confirmation)
                    .await
                    .map_err(GatewayError::from)
            })
            .await
            .map_err(|source| {
                tracing::warn!(
                    tx_hash = %utils::format_hash(&handle.hash),
                    method,
                    "Transaction submitted but not confirmed: {}",
                    source
                );
                GatewayError::ConfirmationFailed {
                    tx_hash: handle.hash,
                    source: Box::new(source),
                }
            })?;
        pending.resolve(&receipt);

        if receipt.status == ReceiptStatus::Failure {
            tracing::warn!(
                tx_hash = %utils::format_hash(&pending.tx_hash),
                method,
                "Transaction reverted"
            );
            return Err(GatewayError::TransactionReverted {
                tx_hash: pending.tx_hash,
                block_number: receipt.block_number,
            });
        }

        tracing::info!(
            tx_hash = %utils::format_hash(&pending.tx_hash),
            block_number = ?pending.block_number,
            method,
            "Transaction confirmed"
        );
        Ok(pending)
    }

    /// Reads the sale configuration and counters.
    ///
    /// The four reads run concurrently and may observe different blocks. Any
    /// failure fails the whole snapshot.
    pub async fn get_sale_info(&self) -> Result<SaleSnapshot, GatewayError> {
        let (config, sold, raised, active) = futures::try_join!(
            self.read(ContractRole::Sale, "saleConfig", &[]),
            self.read(ContractRole::Sale, "totalSold", &[]),
            self.read(ContractRole::Sale, "totalEthRaised", &[]),
            self.read(ContractRole::Sale, "isSaleActive", &[]),
        )?;

        Ok(SaleSnapshot {
            token_price: Amount(uint_at(&config, 0, "saleConfig")?),
            min_purchase: Amount(uint_at(&config, 1, "saleConfig")?),
            max_purchase: Amount(uint_at(&config, 2, "saleConfig")?),
            max_supply: Amount(uint_at(&config, 3, "saleConfig")?),
            start_time: timestamp_at(&config, 4, "saleConfig")?,
            end_time: timestamp_at(&config, 5, "saleConfig")?,
            whitelist_required: bool_at(&config, 6, "saleConfig")?,
            total_sold: Amount(uint_at(&sold, 0, "totalSold")?),
            total_raised: Amount(uint_at(&raised, 0, "totalEthRaised")?),
            is_active: bool_at(&active, 0, "isSaleActive")?,
        })
    }

    pub async fn get_user_purchase_info(
        &self,
        address: Address,
    ) -> Result<UserPurchaseInfo, GatewayError> {
        let args = [DynSolValue::Address(address)];
        let (info, total) = futures::try_join!(
            self.read(ContractRole::Sale, "getPurchaseInfo", &args),
            self.read(ContractRole::Sale, "totalPurchased", &args),
        )?;

        Ok(UserPurchaseInfo {
            address,
            amount: Amount(uint_at(&info, 0, "getPurchaseInfo")?),
            eth_spent: Amount(uint_at(&info, 1, "getPurchaseInfo")?),
            timestamp: timestamp_at(&info, 2, "getPurchaseInfo")?,
            claimed: bool_at(&info, 3, "getPurchaseInfo")?,
            total_purchased: Amount(uint_at(&total, 0, "totalPurchased")?),
        })
    }

    pub async fn is_whitelisted(&self, address: Address) -> Result<bool, GatewayError> {
        let values = self
            .read(ContractRole::Token, "whitelist", &[DynSolValue::Address(address)])
            .await?;
        bool_at(&values, 0, "whitelist")
    }

    pub async fn get_token_balance(&self, address: Address) -> Result<Amount, GatewayError> {
        let values = self
            .read(ContractRole::Token, "balanceOf", &[DynSolValue::Address(address)])
            .await?;
        uint_at(&values, 0, "balanceOf").map(Amount)
    }

    pub async fn add_to_whitelist(
        &self,
        addresses: &[Address],
    ) -> Result<PendingTransaction, GatewayError> {
        self.update_whitelist(addresses, true).await
    }

    pub async fn remove_from_whitelist(
        &self,
        addresses: &[Address],
    ) -> Result<PendingTransaction, GatewayError> {
        self.update_whitelist(addresses, false).await
    }

    /// One address goes through `updateWhitelist`, several through
    /// `updateWhitelistBatch` in the order given.
    async fn update_whitelist(
        &self,
        addresses: &[Address],
        status: bool,
    ) -> Result<PendingTransaction, GatewayError> {
        match addresses {
            [] => Err(GatewayError::InvalidFormat(
                "at least one address is required".to_string(),
            )),
            [single] => {
                self.transact(
                    ContractRole::Token,
                    "updateWhitelist",
                    &[DynSolValue::Address(*single), DynSolValue::Bool(status)],
                )
                .await
            }
            many => {
                let list = many.iter().copied().map(DynSolValue::Address).collect();
                self.transact(
                    ContractRole::Token,
                    "updateWhitelistBatch",
                    &[DynSolValue::Array(list), DynSolValue::Bool(status)],
                )
                .await
            }
        }
    }

    pub async fn pause_sale(&self) -> Result<PendingTransaction, GatewayError> {
        self.transact(ContractRole::Sale, "pause", &[]).await
    }

    pub async fn unpause_sale(&self) -> Result<PendingTransaction, GatewayError> {
        self.transact(ContractRole::Sale, "unpause", &[]).await
    }

    /// Opens a fresh subscription to the sale contract's purchase events.
    ///
    /// Dropping or cancelling the returned watch ends the subscription.
    pub async fn watch_purchase_events(&self) -> Result<PurchaseEventWatch, GatewayError> {
        let address = self.contract(ContractRole::Sale)?;
        let signature = self
            .descriptor
            .event_signature(ContractRole::Sale, PURCHASE_EVENT)?;
        let filter = LogFilter {
            address,
            event_signature: signature,
        };

        let logs = self
            .with_deadline("log subscription", self.options.call_timeout, async {
                self.client
                    .subscribe_logs(&filter)
                    .await
                    .map_err(GatewayError::from)
            })
            .await?;

        tracing::info!(
            contract = %utils::format_address(&address),
            "Watching purchase events"
        );
        Ok(PurchaseEventWatch::spawn(
            logs,
            signature,
            self.options.event_buffer,
        ))
    }
}

fn value_at<'a>(
    values: &'a [DynSolValue],
    index: usize,
    method: &str,
) -> Result<&'a DynSolValue, GatewayError> {
    values.get(index).ok_or_else(|| GatewayError::UnexpectedOutput {
        method: method.to_string(),
        reason: format!("missing output {}", index),
    })
}

fn uint_at(values: &[DynSolValue], index: usize, method: &str) -> Result<U256, GatewayError> {
    value_at(values, index, method)?
        .as_uint()
        .map(|(value, _)| value)
        .ok_or_else(|| GatewayError::UnexpectedOutput {
            method: method.to_string(),
            reason: format!("output {} is not an unsigned integer", index),
        })
}

fn bool_at(values: &[DynSolValue], index: usize, method: &str) -> Result<bool, GatewayError> {
    value_at(values, index, method)?
        .as_bool()
        .ok_or_else(|| GatewayError::UnexpectedOutput {
            method: method.to_string(),
            reason: format!("output {} is not a bool", index),
        })
}

fn timestamp_at(values: &[DynSolValue], index: usize, method: &str) -> Result<u64, GatewayError> {
    let value = uint_at(values, index, method)?;
    utils::u256_to_u64(value, method).map_err(|e| GatewayError::UnexpectedOutput {
        method: method.to_string(),
        reason: e.to_string(),
    })
}
