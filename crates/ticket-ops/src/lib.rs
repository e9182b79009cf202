// ticket-ops library
// Admin updates and purchase-flow checks for a Starknet ticket contract.
// The CLI in main.rs and the integration tests both drive these modules.

pub mod abi;
pub mod chains;
pub mod config;
pub mod contract;
pub mod error;
pub mod flows;
pub mod tx;
pub mod utils;

// Re-export commonly used types for convenience
pub use abi::{AbiValue, ContractAbi};
pub use chains::{Network, ReceiptStatus, TxSubmitter};
#[cfg(any(test, feature = "simulated"))]
pub use chains::{SimulatedNetwork, TicketSetup};
pub use config::{EntrypointNames, OpsConfig};
pub use contract::ContractBinding;
pub use error::{OpsError, Result};
pub use flows::{OpsContext, PurchaseReceipt, TicketParameters, TicketSuite};
pub use tx::{wait_for_finality, FinalityStatus, PendingTransaction, WaitOptions};
