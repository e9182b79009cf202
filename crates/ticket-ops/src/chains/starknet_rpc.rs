// Starknet JSON-RPC implementation of the network and account seams

use async_trait::async_trait;
use serde_json::Value;
use starknet::accounts::{Account, ExecutionEncoding, SingleOwnerAccount};
use starknet::core::types::{
    BlockId, BlockTag, Call, ContractClass, ExecutionResult, Felt, FunctionCall, StarknetError,
    TransactionStatus,
};
use starknet::providers::jsonrpc::{HttpTransport, JsonRpcClient};
use starknet::providers::{Provider, ProviderError, Url};
use starknet::signers::{LocalWallet, SigningKey};
use tracing::{debug, info};

use super::{Network, ReceiptStatus, TxSubmitter};
use crate::config::{OpsConfig, RPC_VAR};
use crate::error::{OpsError, Result};
use crate::utils::fmt_felt;

fn provider_error(err: ProviderError) -> OpsError {
    OpsError::Provider(err.to_string())
}

fn connect(rpc_url: &str) -> Result<JsonRpcClient<HttpTransport>> {
    let url = Url::parse(rpc_url).map_err(|e| OpsError::invalid_config(RPC_VAR, e))?;
    Ok(JsonRpcClient::new(HttpTransport::new(url)))
}

/// Read-side client for a Starknet node
pub struct StarknetRpc {
    endpoint: String,
    client: JsonRpcClient<HttpTransport>,
}

impl StarknetRpc {
    pub fn new(rpc_url: &str) -> Result<Self> {
        Ok(Self {
            endpoint: rpc_url.to_string(),
            client: connect(rpc_url)?,
        })
    }

    pub fn from_config(config: &OpsConfig) -> Result<Self> {
        Self::new(config.rpc_url()?)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Status of a transaction that has no receipt: either not seen or not
    /// executed yet, or dropped by the sequencer
    async fn unreceipted_status(&self, tx_hash: Felt) -> Result<ReceiptStatus> {
        match self.client.get_transaction_status(tx_hash).await {
            Ok(TransactionStatus::Rejected) => Ok(ReceiptStatus::Rejected {
                reason: "rejected by the sequencer".to_string(),
            }),
            Ok(_) => Ok(ReceiptStatus::NotFound),
            Err(ProviderError::StarknetError(StarknetError::TransactionHashNotFound)) => {
                Ok(ReceiptStatus::NotFound)
            }
            Err(e) => Err(provider_error(e)),
        }
    }
}

#[async_trait]
impl Network for StarknetRpc {
    async fn chain_id(&self) -> Result<Felt> {
        self.client.chain_id().await.map_err(provider_error)
    }

    async fn contract_abi(&self, address: Felt) -> Result<Option<Value>> {
        debug!("Fetching class at {}", fmt_felt(&address));

        let class = match self
            .client
            .get_class_at(BlockId::Tag(BlockTag::Latest), address)
            .await
        {
            Ok(class) => class,
            Err(ProviderError::StarknetError(StarknetError::ContractNotFound)) => return Ok(None),
            Err(e) => return Err(provider_error(e)),
        };

        match class {
            ContractClass::Sierra(sierra) => {
                if sierra.abi.trim().is_empty() {
                    return Ok(None);
                }
                serde_json::from_str(&sierra.abi)
                    .map(Some)
                    .map_err(|e| OpsError::Provider(format!("node returned a malformed ABI: {}", e)))
            }
            ContractClass::Legacy(legacy) => match legacy.abi {
                Some(abi) => serde_json::to_value(abi)
                    .map(Some)
                    .map_err(|e| OpsError::Provider(format!("node returned a malformed ABI: {}", e))),
                None => Ok(None),
            },
        }
    }

    async fn call(&self, call: &FunctionCall) -> Result<Vec<Felt>> {
        self.client
            .call(call, BlockId::Tag(BlockTag::Latest))
            .await
            .map_err(provider_error)
    }

    async fn receipt_status(&self, tx_hash: Felt) -> Result<ReceiptStatus> {
        match self.client.get_transaction_receipt(tx_hash).await {
            Ok(receipt) => Ok(match receipt.receipt.execution_result() {
                ExecutionResult::Reverted { reason } => ReceiptStatus::Reverted {
                    reason: reason.clone(),
                },
                // reads go to the latest block, which does not see pending effects yet
                ExecutionResult::Succeeded if receipt.block.is_pending() => {
                    debug!("{} executed in the pending block", fmt_felt(&tx_hash));
                    ReceiptStatus::NotFound
                }
                ExecutionResult::Succeeded => ReceiptStatus::Succeeded,
            }),
            Err(ProviderError::StarknetError(StarknetError::TransactionHashNotFound)) => {
                self.unreceipted_status(tx_hash).await
            }
            Err(e) => Err(provider_error(e)),
        }
    }
}

/// The operator/buyer account, signing with a local private key
pub struct OperatorAccount {
    inner: SingleOwnerAccount<JsonRpcClient<HttpTransport>, LocalWallet>,
}

impl OperatorAccount {
    pub async fn connect(rpc_url: &str, address: Felt, private_key: Felt) -> Result<Self> {
        let provider = connect(rpc_url)?;
        let chain_id = provider.chain_id().await.map_err(provider_error)?;
        let signer = LocalWallet::from(SigningKey::from_secret_scalar(private_key));

        let mut account =
            SingleOwnerAccount::new(provider, signer, address, chain_id, ExecutionEncoding::New);
        // nonce and fee estimation see our own pending transactions
        account.set_block_id(BlockId::Tag(BlockTag::Pending));

        info!("Connected account {} on chain {}", fmt_felt(&address), fmt_felt(&chain_id));
        Ok(Self { inner: account })
    }

    pub async fn from_config(config: &OpsConfig) -> Result<Self> {
        let rpc_url = config.rpc_url()?;
        let address = config.account_address()?;
        let private_key = config.private_key()?;
        Self::connect(rpc_url, address, private_key).await
    }
}

#[async_trait]
impl TxSubmitter for OperatorAccount {
    fn address(&self) -> Felt {
        self.inner.address()
    }

    async fn submit(&self, calls: Vec<Call>) -> Result<Felt> {
        let result = self
            .inner
            .execute_v3(calls)
            .send()
            .await
            .map_err(|e| OpsError::SubmissionFailure(e.to_string()))?;
        Ok(result.transaction_hash)
    }
}
