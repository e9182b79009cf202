// Contract binding
// Resolves a deployed contract's ABI from the network and turns entrypoint names plus
// typed arguments into calldata, read-only calls and invoke transactions.

use starknet::core::types::{Call, Felt, FunctionCall};
use std::sync::Arc;
use tracing::debug;

use crate::abi::{
    decode_outputs, encode_inputs, selector, AbiFunction, AbiValue, ContractAbi, StateMutability,
};
use crate::chains::{Network, TxSubmitter};
use crate::error::{OpsError, Result};
use crate::tx::{self, PendingTransaction};
use crate::utils::fmt_felt;

/// A deployed contract together with its ABI and the network it lives on
#[derive(Clone)]
pub struct ContractBinding {
    address: Felt,
    abi: ContractAbi,
    network: Arc<dyn Network>,
}

impl std::fmt::Debug for ContractBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractBinding")
            .field("address", &fmt_felt(&self.address))
            .field("functions", &self.abi.functions().count())
            .finish()
    }
}

impl ContractBinding {
    /// Fetch the ABI of the class deployed at `address` and bind to it.
    /// Fails with `InterfaceUnavailable` when the node has no ABI for the address.
    pub async fn resolve(network: Arc<dyn Network>, address: Felt) -> Result<Self> {
        let raw = network
            .contract_abi(address)
            .await?
            .ok_or_else(|| OpsError::InterfaceUnavailable(fmt_felt(&address)))?;

        let abi = ContractAbi::from_json(raw)?;
        if abi.is_empty() {
            return Err(OpsError::InterfaceUnavailable(fmt_felt(&address)));
        }

        debug!(
            "Bound {} with {} entrypoints",
            fmt_felt(&address),
            abi.functions().count()
        );
        Ok(Self::from_abi(network, address, abi))
    }

    /// Bind with an ABI obtained elsewhere
    pub fn from_abi(network: Arc<dyn Network>, address: Felt, abi: ContractAbi) -> Self {
        Self { address, abi, network }
    }

    pub fn address(&self) -> Felt {
        self.address
    }

    pub fn abi(&self) -> &ContractAbi {
        &self.abi
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    fn function(&self, name: &str) -> Result<&AbiFunction> {
        self.abi.function(name).ok_or_else(|| OpsError::UnknownEntrypoint {
            contract: fmt_felt(&self.address),
            name: name.to_string(),
        })
    }

    fn misuse(&self, name: &str, reason: &str) -> OpsError {
        OpsError::EntrypointMisuse {
            contract: fmt_felt(&self.address),
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Build the call for `name(args)` without sending it
    pub fn populate(&self, name: &str, args: &[AbiValue]) -> Result<Call> {
        let function = self.function(name)?;
        if function.mutability == StateMutability::View {
            return Err(self.misuse(name, "is read-only; use a call instead of a transaction"));
        }
        let calldata = encode_inputs(&self.abi, function, args)?;
        Ok(Call {
            to: self.address,
            selector: selector(name)?,
            calldata,
        })
    }

    /// Read-only invocation, outputs decoded per the ABI
    pub async fn call(&self, name: &str, args: &[AbiValue]) -> Result<Vec<AbiValue>> {
        let function = self.function(name)?;
        if function.mutability == StateMutability::External {
            return Err(self.misuse(name, "changes state; submit it as a transaction"));
        }
        let request = FunctionCall {
            contract_address: self.address,
            entry_point_selector: selector(name)?,
            calldata: encode_inputs(&self.abi, function, args)?,
        };
        let data = self.network.call(&request).await?;
        decode_outputs(&self.abi, function, &data)
    }

    /// Like [`ContractBinding::call`] for entrypoints returning exactly one value
    pub async fn call_one(&self, name: &str, args: &[AbiValue]) -> Result<AbiValue> {
        let mut values = self.call(name, args).await?;
        if values.len() != 1 {
            return Err(OpsError::Encoding(format!(
                "{} returned {} values, expected 1",
                name,
                values.len()
            )));
        }
        Ok(values.remove(0))
    }

    /// Submit `name(args)` as a transaction from `account`; does not wait
    pub async fn invoke(
        &self,
        account: &dyn TxSubmitter,
        name: &str,
        args: &[AbiValue],
    ) -> Result<PendingTransaction> {
        let call = self.populate(name, args)?;
        tx::submit(account, vec![call], name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{SimulatedNetwork, TicketSetup};
    use primitive_types::U256;

    const OWNER: u64 = 0x0A;
    const TICKET: u64 = 0x71;
    const TOKEN: u64 = 0x70;

    fn network() -> Arc<SimulatedNetwork> {
        let network = Arc::new(SimulatedNetwork::new());
        network.deploy_token(Felt::from(TOKEN), &[(Felt::from(OWNER), U256::exp10(18))]);
        network.deploy_ticket(
            Felt::from(TICKET),
            TicketSetup {
                owner: Felt::from(OWNER),
                token: Felt::from(TOKEN),
                tickets_per_lot: 10,
                ticket_price: U256::exp10(15),
                discount_five_lots: 5,
                discount_ten_lots: 10,
            },
        );
        network
    }

    #[tokio::test]
    async fn test_resolve_exposes_interface_functions() {
        let network = network();
        let ticket = ContractBinding::resolve(network.clone(), Felt::from(TICKET)).await.unwrap();
        assert!(ticket.abi().function("buyTickets").is_some());
        assert!(ticket.abi().function("updateTicketPrice").is_some());
        assert_eq!(ticket.address(), Felt::from(TICKET));
    }

    #[tokio::test]
    async fn test_missing_abi_is_interface_unavailable() {
        let network = network();
        network.deploy_opaque(Felt::from(0xDEADu64));

        for address in [0xDEADu64, 0xBEEF] {
            let err = ContractBinding::resolve(network.clone(), Felt::from(address))
                .await
                .unwrap_err();
            assert!(matches!(err, OpsError::InterfaceUnavailable(_)));
        }
        // only the two ABI lookups, no entrypoint calls
        assert_eq!(network.reads_served(), 2);
    }

    #[tokio::test]
    async fn test_populate_encodes_u256_as_two_felts() {
        let ticket = ContractBinding::resolve(network(), Felt::from(TICKET)).await.unwrap();
        let call = ticket
            .populate("updateTicketPrice", &[AbiValue::from(U256::exp10(15))])
            .unwrap();
        assert_eq!(call.to, Felt::from(TICKET));
        assert_eq!(call.selector, selector("updateTicketPrice").unwrap());
        assert_eq!(call.calldata, vec![Felt::from(1_000_000_000_000_000u64), Felt::ZERO]);
    }

    #[tokio::test]
    async fn test_populate_rejects_unknown_name_and_arity() {
        let ticket = ContractBinding::resolve(network(), Felt::from(TICKET)).await.unwrap();

        let err = ticket.populate("mintTickets", &[]).unwrap_err();
        assert!(matches!(err, OpsError::UnknownEntrypoint { .. }));

        let err = ticket.populate("updateTicketPrice", &[]).unwrap_err();
        assert!(matches!(err, OpsError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_call_decodes_outputs() {
        let network = network();
        let ticket = ContractBinding::resolve(network.clone(), Felt::from(TICKET)).await.unwrap();

        let price = ticket.call_one("ticketPrice", &[]).await.unwrap();
        assert_eq!(price.as_u256().unwrap(), U256::exp10(15));

        let cost = ticket.call_one("calculateCost", &[AbiValue::from(1u32)]).await.unwrap();
        assert_eq!(cost.as_u256().unwrap(), U256::exp10(16));
    }

    #[tokio::test]
    async fn test_invoke_submits_and_returns_hash() {
        let network = network();
        let account = network.account(Felt::from(OWNER));
        let token = ContractBinding::resolve(network.clone(), Felt::from(TOKEN)).await.unwrap();

        let pending = token
            .invoke(&account, "approve", &[AbiValue::from(Felt::from(TICKET)), AbiValue::from(U256::from(42u64))])
            .await
            .unwrap();
        assert_eq!(pending.label, "approve");
        assert_eq!(network.transactions_submitted(), 1);
        assert_eq!(
            network.allowance(Felt::from(TOKEN), Felt::from(OWNER), Felt::from(TICKET)),
            U256::from(42u64)
        );
    }

    #[tokio::test]
    async fn test_mutability_is_enforced() {
        let network = network();
        let account = network.account(Felt::from(OWNER));
        let ticket = ContractBinding::resolve(network.clone(), Felt::from(TICKET)).await.unwrap();

        let err = ticket.invoke(&account, "ticketPrice", &[]).await.unwrap_err();
        assert!(matches!(err, OpsError::EntrypointMisuse { .. }));
        assert_eq!(network.transactions_submitted(), 0);

        let err = ticket
            .call("updateTicketPrice", &[AbiValue::from(U256::one())])
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::EntrypointMisuse { .. }));
    }
}
