// Network and account seams
// Flows only talk to these traits, so a simulated network can stand in for a node

use async_trait::async_trait;
use serde_json::Value;
use starknet::core::types::{Call, Felt, FunctionCall};

use crate::error::Result;

#[cfg(any(test, feature = "simulated"))]
pub mod simulated;
pub mod starknet_rpc;

#[cfg(any(test, feature = "simulated"))]
pub use simulated::{SimulatedAccount, SimulatedNetwork, TicketSetup};
pub use starknet_rpc::{OperatorAccount, StarknetRpc};

/// What the node currently knows about a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// Not (yet) visible to the node
    NotFound,
    Succeeded,
    Reverted { reason: String },
    /// Dropped by the node before execution
    Rejected { reason: String },
}

/// Read side of a Starknet node
#[async_trait]
pub trait Network: Send + Sync {
    async fn chain_id(&self) -> Result<Felt>;

    /// ABI of the class deployed at `address`, or `None` when the node has no
    /// description for it (nothing deployed, or deployed without an ABI)
    async fn contract_abi(&self, address: Felt) -> Result<Option<Value>>;

    /// Read-only entrypoint invocation against the latest block
    async fn call(&self, call: &FunctionCall) -> Result<Vec<Felt>>;

    async fn receipt_status(&self, tx_hash: Felt) -> Result<ReceiptStatus>;
}

/// An account able to sign and submit invoke transactions
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    fn address(&self) -> Felt;

    /// Submit `calls` as one invoke transaction and return its hash.
    /// Does not wait for inclusion.
    async fn submit(&self, calls: Vec<Call>) -> Result<Felt>;
}
