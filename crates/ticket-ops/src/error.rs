// Error taxonomy shared by every ticket-ops flow
// Library code returns OpsError; the CLI wraps it in anyhow for context

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while configuring, binding, submitting or verifying
#[derive(Error, Debug)]
pub enum OpsError {
    #[error("Required configuration value {0} is not set")]
    ConfigurationMissing(String),

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidConfiguration { key: String, reason: String },

    #[error("No ABI found for the contract at {0}")]
    InterfaceUnavailable(String),

    #[error("Contract {contract} has no entrypoint named {name}")]
    UnknownEntrypoint { contract: String, name: String },

    #[error("Entrypoint {name} on {contract} {reason}")]
    EntrypointMisuse { contract: String, name: String, reason: String },

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("RPC error: {0}")]
    Provider(String),

    #[error("Transaction submission failed: {0}")]
    SubmissionFailure(String),

    #[error("Transaction {tx_hash} reverted: {reason}")]
    Reverted { tx_hash: String, reason: String },

    #[error("Transaction {tx_hash} not finalized after {}", pretty_duration(.waited))]
    ConfirmationTimeout { tx_hash: String, waited: Duration },

    #[error("Node error while waiting for {tx_hash}: {message}")]
    NodeError { tx_hash: String, message: String },

    #[error("Assertion failed: {0}")]
    AssertionFailure(String),
}

impl OpsError {
    pub fn invalid_config(key: impl Into<String>, reason: impl ToString) -> Self {
        OpsError::InvalidConfiguration {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Hash of the transaction this error refers to, if any
    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            OpsError::Reverted { tx_hash, .. }
            | OpsError::ConfirmationTimeout { tx_hash, .. }
            | OpsError::NodeError { tx_hash, .. } => Some(tx_hash),
            _ => None,
        }
    }
}

fn pretty_duration(waited: &Duration) -> String {
    humantime::format_duration(*waited).to_string()
}

pub type Result<T> = std::result::Result<T, OpsError>;
