// In-memory Starknet stand-in
// Hosts a ticket contract and an ERC-20 style payment token behind the same
// Network / TxSubmitter seams as the JSON-RPC client, so flows and the purchase
// suite run without a node. Transactions execute atomically on submission and
// become visible to receipt polling after a configurable number of polls.

use async_trait::async_trait;
use primitive_types::U256;
use serde_json::{json, Value};
use starknet::core::types::{Call, Felt, FunctionCall};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::{Network, ReceiptStatus, TxSubmitter};
use crate::abi::selector;
use crate::config::EntrypointNames;
use crate::error::{OpsError, Result};
use crate::utils::{felt_to_u256, fmt_felt, join_u256, split_u256};

/// Initial state of a simulated ticket contract
#[derive(Debug, Clone)]
pub struct TicketSetup {
    pub owner: Felt,
    pub token: Felt,
    pub tickets_per_lot: u32,
    pub ticket_price: U256,
    pub discount_five_lots: u8,
    pub discount_ten_lots: u8,
}

#[derive(Debug, Clone)]
struct TicketState {
    setup: TicketSetup,
    tickets: HashMap<Felt, u64>,
}

#[derive(Debug, Clone, Default)]
struct TokenState {
    balances: HashMap<Felt, U256>,
    allowances: HashMap<(Felt, Felt), U256>,
}

#[derive(Debug, Clone)]
enum SimContract {
    Ticket(TicketState),
    Token(TokenState),
    /// Deployed, but the node has no ABI for it
    Opaque,
}

struct PendingReceipt {
    status: ReceiptStatus,
    polls_remaining: u32,
}

#[derive(Default)]
struct SimState {
    contracts: HashMap<Felt, SimContract>,
    receipts: HashMap<Felt, PendingReceipt>,
    tx_count: u64,
    reads_served: usize,
    confirmation_polls: u32,
    stalled: bool,
    failing_polls: u32,
    reject_submissions: Option<String>,
}

pub struct SimulatedNetwork {
    chain_id: Felt,
    names: EntrypointNames,
    state: Mutex<SimState>,
}

impl SimulatedNetwork {
    pub fn new() -> Self {
        Self::with_entrypoints(EntrypointNames::default())
    }

    /// Contracts answer to the given entrypoint names instead of the defaults
    pub fn with_entrypoints(names: EntrypointNames) -> Self {
        Self {
            chain_id: Felt::from_bytes_be_slice(b"SN_SEPOLIA"),
            names,
            state: Mutex::new(SimState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn deploy_token(&self, address: Felt, holders: &[(Felt, U256)]) {
        let mut token = TokenState::default();
        for (holder, amount) in holders {
            token.balances.insert(*holder, *amount);
        }
        self.lock().contracts.insert(address, SimContract::Token(token));
    }

    pub fn deploy_ticket(&self, address: Felt, setup: TicketSetup) {
        let ticket = TicketState { setup, tickets: HashMap::new() };
        self.lock().contracts.insert(address, SimContract::Ticket(ticket));
    }

    pub fn deploy_opaque(&self, address: Felt) {
        self.lock().contracts.insert(address, SimContract::Opaque);
    }

    /// An account whose submissions execute against this network
    pub fn account(self: &Arc<Self>, address: Felt) -> SimulatedAccount {
        SimulatedAccount { address, network: Arc::clone(self) }
    }

    /// Receipts stay invisible for `polls` lookups after submission
    pub fn set_confirmation_polls(&self, polls: u32) {
        self.lock().confirmation_polls = polls;
    }

    /// When set, no receipt ever becomes visible
    pub fn stall_confirmations(&self, stalled: bool) {
        self.lock().stalled = stalled;
    }

    /// The next `polls` receipt lookups fail with an RPC error
    pub fn fail_next_polls(&self, polls: u32) {
        self.lock().failing_polls = polls;
    }

    /// Submissions are refused at the door with `reason` until cleared
    pub fn reject_submissions(&self, reason: Option<&str>) {
        self.lock().reject_submissions = reason.map(str::to_string);
    }

    pub fn balance_of(&self, token: Felt, holder: Felt) -> U256 {
        match self.lock().contracts.get(&token) {
            Some(SimContract::Token(t)) => t.balances.get(&holder).copied().unwrap_or_default(),
            _ => U256::zero(),
        }
    }

    pub fn allowance(&self, token: Felt, owner: Felt, spender: Felt) -> U256 {
        match self.lock().contracts.get(&token) {
            Some(SimContract::Token(t)) => t.allowances.get(&(owner, spender)).copied().unwrap_or_default(),
            _ => U256::zero(),
        }
    }

    pub fn tickets_of(&self, ticket: Felt, holder: Felt) -> u64 {
        match self.lock().contracts.get(&ticket) {
            Some(SimContract::Ticket(t)) => t.tickets.get(&holder).copied().unwrap_or_default(),
            _ => 0,
        }
    }

    pub fn ticket_setup(&self, ticket: Felt) -> Option<TicketSetup> {
        match self.lock().contracts.get(&ticket) {
            Some(SimContract::Ticket(t)) => Some(t.setup.clone()),
            _ => None,
        }
    }

    /// Number of ABI fetches and read-only calls served so far
    pub fn reads_served(&self) -> usize {
        self.lock().reads_served
    }

    /// Number of transactions accepted so far
    pub fn transactions_submitted(&self) -> u64 {
        self.lock().tx_count
    }

    fn execute(&self, sender: Felt, calls: Vec<Call>) -> Result<Felt> {
        let mut state = self.lock();
        if let Some(reason) = &state.reject_submissions {
            return Err(OpsError::SubmissionFailure(reason.clone()));
        }

        state.tx_count += 1;
        let tx_hash = Felt::from(0x7a11_0000u64 + state.tx_count);

        // all-or-nothing: run on a copy and only keep it when every call succeeds
        let mut contracts = state.contracts.clone();
        let mut outcome = ReceiptStatus::Succeeded;
        for call in &calls {
            if let Err(reason) = dispatch(&self.names, &mut contracts, sender, call.to, call.selector, &call.calldata) {
                outcome = ReceiptStatus::Reverted { reason };
                break;
            }
        }
        if outcome == ReceiptStatus::Succeeded {
            state.contracts = contracts;
        }
        debug!("Simulated tx {} -> {:?}", fmt_felt(&tx_hash), outcome);

        let polls_remaining = state.confirmation_polls;
        state.receipts.insert(tx_hash, PendingReceipt { status: outcome, polls_remaining });
        Ok(tx_hash)
    }
}

impl Default for SimulatedNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Network for SimulatedNetwork {
    async fn chain_id(&self) -> Result<Felt> {
        Ok(self.chain_id)
    }

    async fn contract_abi(&self, address: Felt) -> Result<Option<Value>> {
        let mut state = self.lock();
        state.reads_served += 1;
        Ok(match state.contracts.get(&address) {
            Some(SimContract::Ticket(_)) => Some(ticket_abi(&self.names)),
            Some(SimContract::Token(_)) => Some(token_abi(&self.names)),
            Some(SimContract::Opaque) | None => None,
        })
    }

    async fn call(&self, call: &FunctionCall) -> Result<Vec<Felt>> {
        let mut state = self.lock();
        state.reads_served += 1;
        // calls never persist their effects
        let mut contracts = state.contracts.clone();
        dispatch(
            &self.names,
            &mut contracts,
            Felt::ZERO,
            call.contract_address,
            call.entry_point_selector,
            &call.calldata,
        )
        .map_err(|reason| OpsError::Provider(format!("Contract error: {}", reason)))
    }

    async fn receipt_status(&self, tx_hash: Felt) -> Result<ReceiptStatus> {
        let mut state = self.lock();
        if state.failing_polls > 0 {
            state.failing_polls -= 1;
            return Err(OpsError::Provider("simulated node unavailable".to_string()));
        }
        if state.stalled {
            return Ok(ReceiptStatus::NotFound);
        }
        match state.receipts.get_mut(&tx_hash) {
            Some(pending) if pending.polls_remaining > 0 => {
                pending.polls_remaining -= 1;
                Ok(ReceiptStatus::NotFound)
            }
            Some(pending) => Ok(pending.status.clone()),
            None => Ok(ReceiptStatus::NotFound),
        }
    }
}

/// Account bound to a [`SimulatedNetwork`]
pub struct SimulatedAccount {
    address: Felt,
    network: Arc<SimulatedNetwork>,
}

#[async_trait]
impl TxSubmitter for SimulatedAccount {
    fn address(&self) -> Felt {
        self.address
    }

    async fn submit(&self, calls: Vec<Call>) -> Result<Felt> {
        self.network.execute(self.address, calls)
    }
}

type CallResult = std::result::Result<Vec<Felt>, String>;

fn arg(calldata: &[Felt], index: usize) -> std::result::Result<Felt, String> {
    calldata
        .get(index)
        .copied()
        .ok_or_else(|| "Failed to deserialize param #".to_string() + &(index + 1).to_string())
}

fn u256_arg(calldata: &[Felt], index: usize) -> std::result::Result<U256, String> {
    join_u256(&arg(calldata, index)?, &arg(calldata, index + 1)?).map_err(|e| e.to_string())
}

fn u256_out(value: U256) -> Vec<Felt> {
    let (low, high) = split_u256(value);
    vec![low, high]
}

fn is(selector_value: Felt, name: &str) -> bool {
    selector(name).map(|s| s == selector_value).unwrap_or(false)
}

/// Cost the ticket contract charges for `lots` lots
fn lot_cost(setup: &TicketSetup, lots: u64) -> std::result::Result<U256, String> {
    let base = setup
        .ticket_price
        .checked_mul(U256::from(setup.tickets_per_lot))
        .and_then(|v| v.checked_mul(U256::from(lots)))
        .ok_or("u256_mul Overflow")?;
    let discount = match lots {
        5 => setup.discount_five_lots,
        10 => setup.discount_ten_lots,
        _ => 0,
    };
    let reduction = base.checked_mul(U256::from(discount)).ok_or("u256_mul Overflow")? / U256::from(100u64);
    Ok(base - reduction)
}

fn dispatch(
    names: &EntrypointNames,
    contracts: &mut HashMap<Felt, SimContract>,
    caller: Felt,
    to: Felt,
    entry: Felt,
    calldata: &[Felt],
) -> CallResult {
    if let Some(SimContract::Token(token)) = contracts.get_mut(&to) {
        return token_dispatch(names, token, caller, entry, calldata);
    }
    match contracts.get(&to) {
        Some(SimContract::Ticket(_)) => ticket_dispatch(names, contracts, caller, to, entry, calldata),
        Some(_) => Err("ENTRYPOINT_NOT_FOUND".to_string()),
        None => Err(format!("Requested contract address {} is not deployed", fmt_felt(&to))),
    }
}

fn ticket_dispatch(
    names: &EntrypointNames,
    contracts: &mut HashMap<Felt, SimContract>,
    caller: Felt,
    to: Felt,
    entry: Felt,
    calldata: &[Felt],
) -> CallResult {
    let Some(SimContract::Ticket(ticket)) = contracts.get(&to) else {
        return Err("ENTRYPOINT_NOT_FOUND".to_string());
    };
    let setup = ticket.setup.clone();

    if is(entry, &names.tickets_per_lot) {
        return Ok(vec![Felt::from(setup.tickets_per_lot)]);
    }
    if is(entry, &names.ticket_price) {
        return Ok(u256_out(setup.ticket_price));
    }
    if is(entry, &names.discount_five_lots) {
        return Ok(vec![Felt::from(setup.discount_five_lots)]);
    }
    if is(entry, &names.discount_ten_lots) {
        return Ok(vec![Felt::from(setup.discount_ten_lots)]);
    }
    if is(entry, "tokenAddress") {
        return Ok(vec![setup.token]);
    }
    if is(entry, &names.calculate_cost) {
        let lots = felt_to_u256(&arg(calldata, 0)?).low_u64();
        return Ok(u256_out(lot_cost(&setup, lots)?));
    }

    if is(entry, &names.update_ticket_price) {
        let price = u256_arg(calldata, 0)?;
        return owner_update(contracts, to, caller, |s| s.ticket_price = price);
    }
    if is(entry, &names.update_token_address) {
        let token = arg(calldata, 0)?;
        return owner_update(contracts, to, caller, |s| s.token = token);
    }

    if is(entry, &names.buy_tickets) {
        let count = felt_to_u256(&arg(calldata, 0)?);
        if count.is_zero() || count.bits() > 32 {
            return Err("Invalid number of tickets".to_string());
        }
        let count = count.low_u64();
        let per_lot = u64::from(setup.tickets_per_lot);
        if per_lot == 0 || count % per_lot != 0 {
            return Err("Tickets must be bought in whole lots".to_string());
        }
        let cost = lot_cost(&setup, count / per_lot)?;

        let Some(SimContract::Token(token)) = contracts.get_mut(&setup.token) else {
            return Err("Payment token not deployed".to_string());
        };
        transfer_from(token, to, caller, to, cost)?;

        if let Some(SimContract::Ticket(ticket)) = contracts.get_mut(&to) {
            *ticket.tickets.entry(caller).or_default() += count;
        }
        return Ok(vec![]);
    }

    Err("ENTRYPOINT_NOT_FOUND".to_string())
}

fn owner_update(
    contracts: &mut HashMap<Felt, SimContract>,
    to: Felt,
    caller: Felt,
    apply: impl FnOnce(&mut TicketSetup),
) -> CallResult {
    let Some(SimContract::Ticket(ticket)) = contracts.get_mut(&to) else {
        return Err("ENTRYPOINT_NOT_FOUND".to_string());
    };
    if caller != ticket.setup.owner {
        return Err("Caller is not the owner".to_string());
    }
    apply(&mut ticket.setup);
    Ok(vec![])
}

fn move_balance(token: &mut TokenState, from: Felt, to: Felt, amount: U256) -> std::result::Result<(), String> {
    let balance = token.balances.get(&from).copied().unwrap_or_default();
    if balance < amount {
        return Err("ERC20: insufficient balance".to_string());
    }
    token.balances.insert(from, balance - amount);
    *token.balances.entry(to).or_default() += amount;
    Ok(())
}

fn transfer_from(
    token: &mut TokenState,
    spender: Felt,
    from: Felt,
    to: Felt,
    amount: U256,
) -> std::result::Result<(), String> {
    let allowed = token.allowances.get(&(from, spender)).copied().unwrap_or_default();
    if allowed < amount {
        return Err("ERC20: insufficient allowance".to_string());
    }
    move_balance(token, from, to, amount)?;
    token.allowances.insert((from, spender), allowed - amount);
    Ok(())
}

fn token_dispatch(
    names: &EntrypointNames,
    token: &mut TokenState,
    caller: Felt,
    entry: Felt,
    calldata: &[Felt],
) -> CallResult {
    if is(entry, &names.balance_of) {
        let holder = arg(calldata, 0)?;
        return Ok(u256_out(token.balances.get(&holder).copied().unwrap_or_default()));
    }
    if is(entry, "allowance") {
        let key = (arg(calldata, 0)?, arg(calldata, 1)?);
        return Ok(u256_out(token.allowances.get(&key).copied().unwrap_or_default()));
    }
    if is(entry, &names.approve) {
        let spender = arg(calldata, 0)?;
        let amount = u256_arg(calldata, 1)?;
        token.allowances.insert((caller, spender), amount);
        return Ok(vec![Felt::ONE]);
    }
    if is(entry, "transfer") {
        let recipient = arg(calldata, 0)?;
        let amount = u256_arg(calldata, 1)?;
        move_balance(token, caller, recipient, amount)?;
        return Ok(vec![Felt::ONE]);
    }
    Err("ENTRYPOINT_NOT_FOUND".to_string())
}

fn u256_struct() -> Value {
    json!({
        "type": "struct",
        "name": "core::integer::u256",
        "members": [
            { "name": "low", "type": "core::integer::u128" },
            { "name": "high", "type": "core::integer::u128" }
        ]
    })
}

fn bool_enum() -> Value {
    json!({
        "type": "enum",
        "name": "core::bool",
        "variants": [
            { "name": "False", "type": "()" },
            { "name": "True", "type": "()" }
        ]
    })
}

fn view(name: &str, inputs: Value, output: &str) -> Value {
    json!({
        "type": "function",
        "name": name,
        "inputs": inputs,
        "outputs": [{ "type": output }],
        "state_mutability": "view"
    })
}

fn external(name: &str, inputs: Value, outputs: Value) -> Value {
    json!({
        "type": "function",
        "name": name,
        "inputs": inputs,
        "outputs": outputs,
        "state_mutability": "external"
    })
}

const ADDRESS: &str = "core::starknet::contract_address::ContractAddress";
const U256_TY: &str = "core::integer::u256";

/// Sierra ABI served for the simulated ticket contract
pub fn ticket_abi(names: &EntrypointNames) -> Value {
    json!([
        { "type": "impl", "name": "TicketImpl", "interface_name": "openmark::ticket::ITicket" },
        u256_struct(),
        {
            "type": "interface",
            "name": "openmark::ticket::ITicket",
            "items": [
                view(&names.tickets_per_lot, json!([]), "core::integer::u32"),
                view(&names.ticket_price, json!([]), U256_TY),
                view(&names.discount_five_lots, json!([]), "core::integer::u8"),
                view(&names.discount_ten_lots, json!([]), "core::integer::u8"),
                view("tokenAddress", json!([]), ADDRESS),
                view(
                    &names.calculate_cost,
                    json!([{ "name": "lots", "type": "core::integer::u32" }]),
                    U256_TY
                ),
                external(
                    &names.buy_tickets,
                    json!([{ "name": "numberOfTickets", "type": "core::integer::u32" }]),
                    json!([])
                ),
                external(
                    &names.update_ticket_price,
                    json!([{ "name": "price", "type": U256_TY }]),
                    json!([])
                ),
                external(
                    &names.update_token_address,
                    json!([{ "name": "address", "type": ADDRESS }]),
                    json!([])
                )
            ]
        },
        {
            "type": "constructor",
            "name": "constructor",
            "inputs": [{ "name": "owner", "type": ADDRESS }]
        }
    ])
}

/// Sierra ABI served for the simulated payment token
pub fn token_abi(names: &EntrypointNames) -> Value {
    json!([
        { "type": "impl", "name": "ERC20Impl", "interface_name": "openzeppelin::token::erc20::interface::IERC20" },
        u256_struct(),
        bool_enum(),
        {
            "type": "interface",
            "name": "openzeppelin::token::erc20::interface::IERC20",
            "items": [
                view(&names.balance_of, json!([{ "name": "account", "type": ADDRESS }]), U256_TY),
                view(
                    "allowance",
                    json!([{ "name": "owner", "type": ADDRESS }, { "name": "spender", "type": ADDRESS }]),
                    U256_TY
                ),
                external(
                    &names.approve,
                    json!([{ "name": "spender", "type": ADDRESS }, { "name": "amount", "type": U256_TY }]),
                    json!([{ "type": "core::bool" }])
                ),
                external(
                    "transfer",
                    json!([{ "name": "recipient", "type": ADDRESS }, { "name": "amount", "type": U256_TY }]),
                    json!([{ "type": "core::bool" }])
                )
            ]
        }
    ])
}
