use anyhow::Context;
use clap::{Parser, Subcommand};
use primitive_types::U256;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticket_ops::flows::{update_ticket_price, update_token_address, OpsContext, TicketSuite};
use ticket_ops::utils::{fmt_felt, format_units, parse_felt, parse_units};
use ticket_ops::OpsConfig;

#[derive(Parser)]
#[command(name = "ticket-ops")]
#[command(about = "Admin scripts and purchase-flow checks for the OpenMark ticket contract")]
#[command(version)]
pub struct Cli {
    /// Configuration file path (defaults to ./ticket-ops.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Override the finality wait bound in whole seconds, e.g. "90s" or "5m"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub wait_timeout: Option<Duration>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set the ticket price
    UpdatePrice {
        /// Price per ticket as a decimal token amount
        #[arg(long, default_value = "0.001", conflicts_with = "base_units")]
        price: String,
        /// Price per ticket in base units
        #[arg(long)]
        base_units: Option<String>,
    },
    /// Set the payment token the ticket contract accepts
    UpdateTokenAddress {
        /// Token address (defaults to PAYMENT_ADDRESS)
        #[arg(long)]
        address: Option<String>,
    },
    /// Show the ticket contract's pricing parameters
    Params,
    /// Compare the contract's quote with the local cost formula
    Quote {
        /// Number of lots
        #[arg(long, default_value_t = 1)]
        lots: u64,
    },
    /// Approve and buy lots, checking the balance change
    Purchase {
        /// Number of lots
        #[arg(long, default_value_t = 1)]
        lots: u64,
    },
    /// Write a sample configuration file
    InitConfig {
        /// Output path
        #[arg(long, default_value = "ticket-ops.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ticket_ops={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Commands::InitConfig { output } = &cli.command {
        OpsConfig::default().save(output)?;
        println!("Wrote {}", output.display());
        return Ok(());
    }

    let mut config = OpsConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(timeout) = cli.wait_timeout {
        config.override_wait_timeout(timeout)?;
    }
    info!("Loaded configuration: {:?}", config);

    match cli.command {
        Commands::UpdatePrice { price, base_units } => {
            let price = match base_units {
                Some(units) => U256::from_dec_str(units.trim())
                    .map_err(|e| anyhow::anyhow!("Invalid base-unit price '{}': {:?}", units, e))?,
                None => parse_units(&price, config.token_decimals)?,
            };
            // the ticket address is needed before any network request
            config.ticket_address()?;
            let ctx = OpsContext::connect(config).await?;
            let tx_hash = update_ticket_price(&ctx, price)
                .await
                .context("Ticket price update failed")?;
            println!("Transaction hash: {}", fmt_felt(&tx_hash));
        }
        Commands::UpdateTokenAddress { address } => {
            let token = match address {
                Some(address) => parse_felt(&address)?,
                None => config.payment_address()?,
            };
            config.ticket_address()?;
            let ctx = OpsContext::connect(config).await?;
            let tx_hash = update_token_address(&ctx, token)
                .await
                .context("Token address update failed")?;
            println!("Transaction hash: {}", fmt_felt(&tx_hash));
        }
        Commands::Params => {
            let decimals = config.token_decimals;
            let suite = setup_suite(config).await?;
            let params = suite.parameters().await?;
            println!("Tickets per lot: {}", params.lot_size);
            println!("Ticket price:    {} ({} base units)", format_units(params.unit_price, decimals), params.unit_price);
            println!("Discount 5 lots:  {}%", params.discount_five_lots);
            println!("Discount 10 lots: {}%", params.discount_ten_lots);
        }
        Commands::Quote { lots } => {
            let decimals = config.token_decimals;
            let suite = setup_suite(config).await?;
            let cost = suite.verify_quote(lots).await?;
            println!("Cost of {} lot(s): {} ({} base units)", lots, format_units(cost, decimals), cost);
        }
        Commands::Purchase { lots } => {
            let decimals = config.token_decimals;
            let suite = setup_suite(config).await?;
            let receipt = suite.purchase_lots(lots).await.context("Purchase failed")?;
            println!("Approve transaction hash: {}", fmt_felt(&receipt.approve_tx));
            println!("Transaction hash: {}", fmt_felt(&receipt.purchase_tx));
            println!(
                "Bought {} ticket(s) for {}; balance {} -> {}",
                receipt.tickets,
                format_units(receipt.cost, decimals),
                format_units(receipt.balance_before, decimals),
                format_units(receipt.balance_after, decimals)
            );
        }
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

async fn setup_suite(config: OpsConfig) -> anyhow::Result<TicketSuite> {
    config.ticket_address()?;
    config.payment_address()?;
    let ctx = OpsContext::connect(config).await?;
    Ok(TicketSuite::setup(ctx).await?)
}
