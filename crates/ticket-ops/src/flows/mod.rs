// Operational flows: admin updates and the purchase scenario
// Every flow takes an explicit OpsContext; nothing is read from globals.

use std::sync::Arc;
use tracing::info;

use crate::chains::{Network, OperatorAccount, StarknetRpc, TxSubmitter};
use crate::config::OpsConfig;
use crate::contract::ContractBinding;
use crate::error::Result;
use crate::utils::fmt_felt;

pub mod admin;
pub mod purchase;

pub use admin::{run_admin_update, update_ticket_price, update_token_address};
pub use purchase::{expected_cost, PurchaseReceipt, TicketParameters, TicketSuite};

/// Network, signing account and configuration shared by one run
#[derive(Clone)]
pub struct OpsContext {
    pub network: Arc<dyn Network>,
    pub account: Arc<dyn TxSubmitter>,
    pub config: OpsConfig,
}

impl OpsContext {
    pub fn new(network: Arc<dyn Network>, account: Arc<dyn TxSubmitter>, config: OpsConfig) -> Self {
        Self { network, account, config }
    }

    /// Connect to the configured node and account.
    /// Every required value is checked before the first network request.
    pub async fn connect(config: OpsConfig) -> Result<Self> {
        let rpc_url = config.rpc_url()?.to_string();
        let address = config.account_address()?;
        let private_key = config.private_key()?;

        let network = StarknetRpc::new(&rpc_url)?;
        let account = OperatorAccount::connect(&rpc_url, address, private_key).await?;
        info!("Using node {} as {}", network.endpoint(), fmt_felt(&address));

        Ok(Self::new(Arc::new(network), Arc::new(account), config))
    }

    pub async fn ticket_contract(&self) -> Result<ContractBinding> {
        let address = self.config.ticket_address()?;
        ContractBinding::resolve(self.network.clone(), address).await
    }

    pub async fn payment_contract(&self) -> Result<ContractBinding> {
        let address = self.config.payment_address()?;
        ContractBinding::resolve(self.network.clone(), address).await
    }
}
