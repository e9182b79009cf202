// Transaction submission and finality tracking
// Submission is at-most-once: nothing here ever resubmits. Waiting polls the
// receipt until a terminal status or the configured bound is reached.

use starknet::core::types::{Call, Felt};
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::chains::{Network, ReceiptStatus, TxSubmitter};
use crate::error::{OpsError, Result};
use crate::utils::fmt_felt;

/// Bounds for [`wait_for_finality`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions {
    /// Give up after this long
    pub timeout: Duration,
    /// Delay between receipt lookups
    pub poll_interval: Duration,
    /// Consecutive failed lookups before the node is declared broken
    pub max_poll_errors: u32,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
            max_poll_errors: 5,
        }
    }
}

/// Terminal outcome of waiting on a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalityStatus {
    Succeeded,
    Reverted { reason: String },
    TimedOut { waited: Duration },
    NodeError(String),
}

impl FinalityStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, FinalityStatus::Succeeded)
    }

    /// Turn a non-success outcome into the matching error for `tx_hash`
    pub fn into_result(self, tx_hash: Felt) -> Result<()> {
        let tx_hash = fmt_felt(&tx_hash);
        match self {
            FinalityStatus::Succeeded => Ok(()),
            FinalityStatus::Reverted { reason } => Err(OpsError::Reverted { tx_hash, reason }),
            FinalityStatus::TimedOut { waited } => Err(OpsError::ConfirmationTimeout { tx_hash, waited }),
            FinalityStatus::NodeError(message) => Err(OpsError::NodeError { tx_hash, message }),
        }
    }
}

/// A submitted transaction that has not been confirmed yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub tx_hash: Felt,
    /// Entrypoint(s) the transaction invokes, for logs and errors
    pub label: String,
}

impl PendingTransaction {
    pub async fn wait(&self, network: &dyn Network, options: &WaitOptions) -> FinalityStatus {
        wait_for_finality(network, self.tx_hash, options).await
    }

    /// Wait and fail unless the transaction succeeded; returns the hash
    pub async fn confirm(self, network: &dyn Network, options: &WaitOptions) -> Result<Felt> {
        let status = self.wait(network, options).await;
        match &status {
            FinalityStatus::Succeeded => {
                info!("{} confirmed: {}", self.label, fmt_felt(&self.tx_hash));
            }
            other => {
                warn!("{} failed to confirm ({:?}): {}", self.label, other, fmt_felt(&self.tx_hash));
            }
        }
        status.into_result(self.tx_hash)?;
        Ok(self.tx_hash)
    }
}

/// Submit `calls` as a single transaction under `account`'s authorization
pub async fn submit(account: &dyn TxSubmitter, calls: Vec<Call>, label: &str) -> Result<PendingTransaction> {
    debug!("Submitting {} from {}", label, fmt_felt(&account.address()));
    let tx_hash = account.submit(calls).await?;
    info!("Transaction hash: {} ({})", fmt_felt(&tx_hash), label);
    Ok(PendingTransaction {
        tx_hash,
        label: label.to_string(),
    })
}

/// Poll until `tx_hash` reaches a terminal status or `options.timeout` elapses.
/// The bound also covers a lookup the node never answers.
pub async fn wait_for_finality(network: &dyn Network, tx_hash: Felt, options: &WaitOptions) -> FinalityStatus {
    let started = Instant::now();
    let deadline = started + options.timeout;
    let mut consecutive_errors = 0u32;

    loop {
        let lookup = match timeout_at(deadline, network.receipt_status(tx_hash)).await {
            Ok(lookup) => lookup,
            Err(_) => {
                warn!("Receipt lookup for {} still unanswered at the wait bound", fmt_felt(&tx_hash));
                return FinalityStatus::TimedOut { waited: started.elapsed() };
            }
        };

        match lookup {
            Ok(ReceiptStatus::Succeeded) => return FinalityStatus::Succeeded,
            Ok(ReceiptStatus::Reverted { reason }) => return FinalityStatus::Reverted { reason },
            Ok(ReceiptStatus::Rejected { reason }) => {
                return FinalityStatus::NodeError(format!("rejected: {}", reason))
            }
            Ok(ReceiptStatus::NotFound) => {
                consecutive_errors = 0;
                debug!("{} not finalized yet", fmt_felt(&tx_hash));
            }
            Err(e) => {
                consecutive_errors += 1;
                warn!(
                    "Receipt lookup for {} failed ({}/{}): {}",
                    fmt_felt(&tx_hash),
                    consecutive_errors,
                    options.max_poll_errors,
                    e
                );
                if consecutive_errors >= options.max_poll_errors {
                    return FinalityStatus::NodeError(e.to_string());
                }
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return FinalityStatus::TimedOut { waited: started.elapsed() };
        }
        sleep(options.poll_interval.min(deadline - now)).await;
    }
}
