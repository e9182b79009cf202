// Ticket purchase scenario
// Reads pricing from the ticket contract, checks the cost formula against the
// contract's own quote, then runs approve -> buy and checks the balance moved by
// exactly the cost. Side effects persist on the network, so every check reads
// before and after rather than assuming absolute balances.

use primitive_types::U256;
use starknet::core::types::Felt;
use tracing::info;

use super::OpsContext;
use crate::abi::AbiValue;
use crate::contract::ContractBinding;
use crate::error::{OpsError, Result};
use crate::utils::fmt_felt;

/// Pricing parameters as reported by the ticket contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketParameters {
    /// Tickets per lot
    pub lot_size: u64,
    /// Price of one ticket in payment-token base units
    pub unit_price: U256,
    /// Percent off when buying exactly 5 lots
    pub discount_five_lots: U256,
    /// Percent off when buying exactly 10 lots
    pub discount_ten_lots: U256,
}

/// What a confirmed purchase did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub lots: u64,
    pub tickets: u64,
    pub cost: U256,
    pub approve_tx: Felt,
    pub purchase_tx: Felt,
    pub balance_before: U256,
    pub balance_after: U256,
}

fn overflow(what: &str) -> OpsError {
    OpsError::Encoding(format!("{} overflows u256", what))
}

/// Cost of `lots` lots: `unit_price * lot_size * lots`, minus the tier discount
/// (in percent, truncating) when `lots` is exactly 5 or 10.
pub fn expected_cost(params: &TicketParameters, lots: u64) -> Result<U256> {
    let base = params
        .unit_price
        .checked_mul(U256::from(params.lot_size))
        .and_then(|v| v.checked_mul(U256::from(lots)))
        .ok_or_else(|| overflow("lot cost"))?;

    let discount = match lots {
        5 => params.discount_five_lots,
        10 => params.discount_ten_lots,
        _ => return Ok(base),
    };
    let reduction = base.checked_mul(discount).ok_or_else(|| overflow("discount"))? / U256::from(100u64);
    base.checked_sub(reduction)
        .ok_or_else(|| OpsError::AssertionFailure(format!("discount of {}% exceeds the cost", discount)))
}

/// Ticket and payment-token bindings, resolved once and reused by every step
pub struct TicketSuite {
    ctx: OpsContext,
    ticket: ContractBinding,
    payment: ContractBinding,
}

impl TicketSuite {
    pub async fn setup(ctx: OpsContext) -> Result<Self> {
        let ticket = ctx.ticket_contract().await?;
        let payment = ctx.payment_contract().await?;
        info!(
            "Ticket contract {}, payment token {}",
            fmt_felt(&ticket.address()),
            fmt_felt(&payment.address())
        );
        Ok(Self { ctx, ticket, payment })
    }

    pub fn ticket(&self) -> &ContractBinding {
        &self.ticket
    }

    pub fn payment(&self) -> &ContractBinding {
        &self.payment
    }

    pub fn context(&self) -> &OpsContext {
        &self.ctx
    }

    async fn read_u256(&self, name: &str) -> Result<U256> {
        self.ticket.call_one(name, &[]).await?.as_u256()
    }

    pub async fn parameters(&self) -> Result<TicketParameters> {
        let names = &self.ctx.config.entrypoints;
        let lot_size = self.read_u256(&names.tickets_per_lot).await?;
        if lot_size.bits() > 64 {
            return Err(OpsError::Encoding(format!("lot size {} does not fit in u64", lot_size)));
        }

        let params = TicketParameters {
            lot_size: lot_size.low_u64(),
            unit_price: self.read_u256(&names.ticket_price).await?,
            discount_five_lots: self.read_u256(&names.discount_five_lots).await?,
            discount_ten_lots: self.read_u256(&names.discount_ten_lots).await?,
        };
        info!(
            "Lot size {}, unit price {}, discounts {}% / {}%",
            params.lot_size, params.unit_price, params.discount_five_lots, params.discount_ten_lots
        );
        Ok(params)
    }

    /// The contract's own price for `lots` lots
    pub async fn quote(&self, lots: u64) -> Result<U256> {
        self.ticket
            .call_one(&self.ctx.config.entrypoints.calculate_cost, &[AbiValue::from(lots)])
            .await?
            .as_u256()
    }

    /// Check the contract's quote matches [`expected_cost`]; returns the cost
    pub async fn verify_quote(&self, lots: u64) -> Result<U256> {
        let expected = expected_cost(&self.parameters().await?, lots)?;
        let quoted = self.quote(lots).await?;
        if quoted != expected {
            return Err(OpsError::AssertionFailure(format!(
                "contract quotes {} for {} lot(s), expected {}",
                quoted, lots, expected
            )));
        }
        Ok(expected)
    }

    /// Payment-token balance of the configured account
    pub async fn balance(&self) -> Result<U256> {
        let owner = AbiValue::Felt(self.ctx.account.address());
        self.payment
            .call_one(&self.ctx.config.entrypoints.balance_of, &[owner])
            .await?
            .as_u256()
    }

    /// Allow the ticket contract to spend `amount` of the account's tokens
    pub async fn approve(&self, amount: U256) -> Result<Felt> {
        let args = [AbiValue::Felt(self.ticket.address()), AbiValue::Uint(amount)];
        self.payment
            .invoke(self.ctx.account.as_ref(), &self.ctx.config.entrypoints.approve, &args)
            .await?
            .confirm(self.ctx.network.as_ref(), &self.ctx.config.wait_options())
            .await
    }

    async fn buy(&self, tickets: u64) -> Result<Felt> {
        self.ticket
            .invoke(
                self.ctx.account.as_ref(),
                &self.ctx.config.entrypoints.buy_tickets,
                &[AbiValue::from(tickets)],
            )
            .await?
            .confirm(self.ctx.network.as_ref(), &self.ctx.config.wait_options())
            .await
    }

    fn tickets_for(params: &TicketParameters, lots: u64) -> Result<u64> {
        params
            .lot_size
            .checked_mul(lots)
            .ok_or_else(|| overflow("ticket count"))
    }

    /// Approve the cost, buy `lots` lots and check the balance dropped by exactly the cost.
    /// Stops before buying if the approval does not confirm.
    pub async fn purchase_lots(&self, lots: u64) -> Result<PurchaseReceipt> {
        let params = self.parameters().await?;
        let cost = expected_cost(&params, lots)?;
        let tickets = Self::tickets_for(&params, lots)?;

        let approve_tx = self.approve(cost).await?;
        let balance_before = self.balance().await?;

        let purchase_tx = self.buy(tickets).await?;
        let balance_after = self.balance().await?;

        if balance_before.checked_sub(cost) != Some(balance_after) {
            return Err(OpsError::AssertionFailure(format!(
                "balance went from {} to {} after paying {}",
                balance_before, balance_after, cost
            )));
        }

        info!("Bought {} ticket(s) for {}", tickets, cost);
        Ok(PurchaseReceipt {
            lots,
            tickets,
            cost,
            approve_tx,
            purchase_tx,
            balance_before,
            balance_after,
        })
    }

    /// Buy `lots` lots without approving first; returns the buy transaction hash.
    /// Expected to fail with `Reverted` unless an allowance is left over.
    pub async fn purchase_without_approval(&self, lots: u64) -> Result<Felt> {
        let params = self.parameters().await?;
        let tickets = Self::tickets_for(&params, lots)?;
        self.buy(tickets).await
    }
}
