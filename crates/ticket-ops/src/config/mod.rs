// Configuration for ticket-ops
// Secrets and addresses come from the environment (optionally via .env),
// tunables from an optional TOML file layered underneath

use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{OpsError, Result};
use crate::tx::WaitOptions;
use crate::utils::parse_felt;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "ticket-ops";

pub const RPC_VAR: &str = "RPC";
pub const ACCOUNT_ADDRESS_VAR: &str = "BUYER_ACCOUNT_ADDRESS";
pub const PRIVATE_KEY_VAR: &str = "BUYER_ACCOUNT_PRIVATE_KEY";
pub const TICKET_ADDRESS_VAR: &str = "TICKET_ADDRESS";
pub const PAYMENT_ADDRESS_VAR: &str = "PAYMENT_ADDRESS";

#[derive(Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    /// Starknet JSON-RPC endpoint
    #[serde(default)]
    pub rpc: Option<String>,
    /// Operator / buyer account contract address
    #[serde(default)]
    pub buyer_account_address: Option<String>,
    /// Signing key for the account; never written back to disk
    #[serde(default, skip_serializing)]
    pub buyer_account_private_key: Option<String>,
    /// Ticket contract address
    #[serde(default)]
    pub ticket_address: Option<String>,
    /// Payment token (ERC-20) contract address
    #[serde(default)]
    pub payment_address: Option<String>,
    /// Finality wait bound for purchase flows, in seconds
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    /// Finality wait bound for admin/setup transactions, in seconds
    #[serde(default = "default_setup_wait_timeout_secs")]
    pub setup_wait_timeout_secs: u64,
    /// Receipt polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive RPC failures tolerated while polling a receipt
    #[serde(default = "default_max_poll_errors")]
    pub max_poll_errors: u32,
    /// Decimals of the payment token, used for human-readable prices
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,
    #[serde(default)]
    pub entrypoints: EntrypointNames,
}

/// Names of the contract entrypoints the flows call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EntrypointNames {
    pub update_ticket_price: String,
    pub update_token_address: String,
    pub tickets_per_lot: String,
    pub ticket_price: String,
    pub discount_five_lots: String,
    pub discount_ten_lots: String,
    pub calculate_cost: String,
    pub buy_tickets: String,
    pub approve: String,
    pub balance_of: String,
}

impl Default for EntrypointNames {
    fn default() -> Self {
        Self {
            update_ticket_price: "updateTicketPrice".to_string(),
            update_token_address: "updateTokenAddress".to_string(),
            tickets_per_lot: "ticketsPerLot".to_string(),
            ticket_price: "ticketPrice".to_string(),
            discount_five_lots: "discount5".to_string(),
            discount_ten_lots: "discount10".to_string(),
            calculate_cost: "calculateCost".to_string(),
            buy_tickets: "buyTickets".to_string(),
            approve: "approve".to_string(),
            balance_of: "balanceOf".to_string(),
        }
    }
}

fn default_wait_timeout_secs() -> u64 { 300 }
fn default_setup_wait_timeout_secs() -> u64 { 60 }
fn default_poll_interval_ms() -> u64 { 5_000 }
fn default_max_poll_errors() -> u32 { 5 }
fn default_token_decimals() -> u8 { 18 }

impl OpsConfig {
    /// Load `.env`, then layer the config file (if any) and process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_with_env(path, None)
    }

    /// Same as [`OpsConfig::load`] but with an explicit environment map instead of
    /// the process environment; `.env` is not read
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::default().source(env))
            .build()
            .map_err(|e| OpsError::invalid_config("config", e))?;

        settings
            .try_deserialize()
            .map_err(|e| OpsError::invalid_config("config", e))
    }

    /// Parse a TOML document, ignoring the environment entirely
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| OpsError::invalid_config("config", e))
    }

    /// Save non-secret settings to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn rpc_url(&self) -> Result<&str> {
        required(&self.rpc, RPC_VAR)
    }

    pub fn account_address(&self) -> Result<Felt> {
        required_felt(&self.buyer_account_address, ACCOUNT_ADDRESS_VAR)
    }

    pub fn private_key(&self) -> Result<Felt> {
        required_felt(&self.buyer_account_private_key, PRIVATE_KEY_VAR)
    }

    pub fn ticket_address(&self) -> Result<Felt> {
        required_felt(&self.ticket_address, TICKET_ADDRESS_VAR)
    }

    pub fn payment_address(&self) -> Result<Felt> {
        required_felt(&self.payment_address, PAYMENT_ADDRESS_VAR)
    }

    /// Wait bound used by purchase flows and the test suite
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            timeout: Duration::from_secs(self.wait_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_poll_errors: self.max_poll_errors,
        }
    }

    /// Shorter wait bound used for admin updates and suite setup
    pub fn setup_wait_options(&self) -> WaitOptions {
        WaitOptions {
            timeout: Duration::from_secs(self.setup_wait_timeout_secs),
            ..self.wait_options()
        }
    }

    /// Use `timeout` for every finality wait. Bounds are kept in whole seconds,
    /// so anything shorter than a second or with a fractional part is refused.
    pub fn override_wait_timeout(&mut self, timeout: Duration) -> Result<()> {
        if timeout < Duration::from_secs(1) || timeout.subsec_nanos() != 0 {
            return Err(OpsError::invalid_config(
                "wait-timeout",
                format!(
                    "{} is not a whole number of seconds",
                    humantime::format_duration(timeout)
                ),
            ));
        }
        self.wait_timeout_secs = timeout.as_secs();
        self.setup_wait_timeout_secs = timeout.as_secs();
        Ok(())
    }
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            rpc: None,
            buyer_account_address: None,
            buyer_account_private_key: None,
            ticket_address: None,
            payment_address: None,
            wait_timeout_secs: default_wait_timeout_secs(),
            setup_wait_timeout_secs: default_setup_wait_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_errors: default_max_poll_errors(),
            token_decimals: default_token_decimals(),
            entrypoints: EntrypointNames::default(),
        }
    }
}

impl fmt::Debug for OpsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpsConfig")
            .field("rpc", &self.rpc)
            .field("buyer_account_address", &self.buyer_account_address)
            .field(
                "buyer_account_private_key",
                &self.buyer_account_private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("ticket_address", &self.ticket_address)
            .field("payment_address", &self.payment_address)
            .field("wait_timeout_secs", &self.wait_timeout_secs)
            .field("setup_wait_timeout_secs", &self.setup_wait_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_poll_errors", &self.max_poll_errors)
            .field("token_decimals", &self.token_decimals)
            .field("entrypoints", &self.entrypoints)
            .finish()
    }
}

fn required<'a>(value: &'a Option<String>, var: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(OpsError::ConfigurationMissing(var.to_string())),
    }
}

fn required_felt(value: &Option<String>, var: &str) -> Result<Felt> {
    let raw = required(value, var)?;
    parse_felt(raw).map_err(|e| OpsError::invalid_config(var, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn test_env_values_map_to_fields() {
        let config = OpsConfig::load_with_env(
            Some(Path::new("/nonexistent/ticket-ops.toml")),
            None,
        );
        // An explicit path must exist
        assert!(config.is_err());

        let config = OpsConfig::load_with_env(
            None,
            env(&[
                ("RPC", "http://localhost:5050/rpc"),
                ("BUYER_ACCOUNT_ADDRESS", "0x123"),
                ("BUYER_ACCOUNT_PRIVATE_KEY", "0xabc"),
                ("TICKET_ADDRESS", "0x456"),
            ]),
        )
        .unwrap();

        assert_eq!(config.rpc_url().unwrap(), "http://localhost:5050/rpc");
        assert_eq!(config.account_address().unwrap(), Felt::from(0x123u64));
        assert_eq!(config.private_key().unwrap(), Felt::from(0xabcu64));
        assert_eq!(config.ticket_address().unwrap(), Felt::from(0x456u64));
        assert_eq!(config.wait_timeout_secs, 300);
        assert_eq!(config.setup_wait_timeout_secs, 60);
    }

    #[test]
    fn test_missing_value_names_the_variable() {
        let config = OpsConfig::load_with_env(None, env(&[("RPC", "http://localhost:5050")])).unwrap();
        match config.payment_address() {
            Err(OpsError::ConfigurationMissing(var)) => assert_eq!(var, PAYMENT_ADDRESS_VAR),
            other => panic!("expected ConfigurationMissing, got {:?}", other),
        }

        let config = OpsConfig::load_with_env(None, env(&[("TICKET_ADDRESS", "  ")])).unwrap();
        assert!(matches!(config.ticket_address(), Err(OpsError::ConfigurationMissing(_))));
    }

    #[test]
    fn test_malformed_address_is_invalid_not_missing() {
        let config = OpsConfig::load_with_env(None, env(&[("TICKET_ADDRESS", "0xnothex")])).unwrap();
        assert!(matches!(
            config.ticket_address(),
            Err(OpsError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_wait_timeout_override_keeps_whole_seconds() {
        let mut config = OpsConfig::default();
        config.override_wait_timeout(Duration::from_secs(90)).unwrap();
        assert_eq!(config.wait_options().timeout, Duration::from_secs(90));
        assert_eq!(config.setup_wait_options().timeout, Duration::from_secs(90));

        for bad in [Duration::from_millis(500), Duration::from_millis(1500), Duration::ZERO] {
            assert!(matches!(
                config.override_wait_timeout(bad),
                Err(OpsError::InvalidConfiguration { .. })
            ));
        }
        assert_eq!(config.wait_timeout_secs, 90);
    }

    #[test]
    fn test_uppercase_hex_prefix_is_accepted() {
        let config = OpsConfig::load_with_env(None, env(&[("TICKET_ADDRESS", "0X456")])).unwrap();
        assert_eq!(config.ticket_address().unwrap(), Felt::from(0x456u64));
    }

    #[test]
    fn test_file_settings_layered_under_env() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
rpc = "http://from-file"
wait_timeout_secs = 120
poll_interval_ms = 250

[entrypoints]
buy_tickets = "purchase"
"#
        )
        .unwrap();

        let config = OpsConfig::load_with_env(
            Some(file.path()),
            env(&[("RPC", "http://from-env"), ("MAX_POLL_ERRORS", "9")]),
        )
        .unwrap();

        assert_eq!(config.rpc_url().unwrap(), "http://from-env");
        assert_eq!(config.wait_timeout_secs, 120);
        assert_eq!(config.max_poll_errors, 9);
        assert_eq!(config.entrypoints.buy_tickets, "purchase");
        assert_eq!(config.entrypoints.approve, "approve");

        let wait = config.wait_options();
        assert_eq!(wait.timeout, Duration::from_secs(120));
        assert_eq!(wait.poll_interval, Duration::from_millis(250));
        assert_eq!(config.setup_wait_options().timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_save_omits_private_key() {
        let mut config = OpsConfig::default();
        config.buyer_account_private_key = Some("0xsecret".to_string());
        config.ticket_address = Some("0x1".to_string());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticket-ops.toml");
        config.save(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("0xsecret"));

        let reloaded = OpsConfig::from_toml_str(&written).unwrap();
        assert_eq!(reloaded.ticket_address.as_deref(), Some("0x1"));
        assert!(reloaded.buyer_account_private_key.is_none());
        assert_eq!(reloaded.entrypoints, EntrypointNames::default());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let mut config = OpsConfig::default();
        config.buyer_account_private_key = Some("0xsecret".to_string());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("0xsecret"));
        assert!(rendered.contains("<redacted>"));
    }
}
