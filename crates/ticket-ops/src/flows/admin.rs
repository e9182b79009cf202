// Administrative updates on the ticket contract

use primitive_types::U256;
use starknet::core::types::Felt;
use tracing::info;

use super::OpsContext;
use crate::abi::AbiValue;
use crate::error::Result;
use crate::utils::fmt_felt;

/// Invoke a single-argument admin entrypoint on the ticket contract and wait for it.
/// Returns the confirmed transaction hash.
pub async fn run_admin_update(ctx: &OpsContext, entrypoint: &str, argument: AbiValue) -> Result<Felt> {
    let ticket = ctx.ticket_contract().await?;
    info!("{}({}) on {}", entrypoint, argument, fmt_felt(&ticket.address()));

    let pending = ticket.invoke(ctx.account.as_ref(), entrypoint, &[argument]).await?;
    pending
        .confirm(ctx.network.as_ref(), &ctx.config.setup_wait_options())
        .await
}

/// Set the per-ticket price, in payment-token base units
pub async fn update_ticket_price(ctx: &OpsContext, price: U256) -> Result<Felt> {
    let entrypoint = ctx.config.entrypoints.update_ticket_price.clone();
    run_admin_update(ctx, &entrypoint, AbiValue::Uint(price)).await
}

/// Point the ticket contract at a different payment token
pub async fn update_token_address(ctx: &OpsContext, token: Felt) -> Result<Felt> {
    let entrypoint = ctx.config.entrypoints.update_token_address.clone();
    run_admin_update(ctx, &entrypoint, AbiValue::Felt(token)).await
}
