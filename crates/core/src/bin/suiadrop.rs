//! suiadrop - whitelist-gated airdrop orchestrator for Sui
//!
//! Deploys the airdrop package, funds it, registers the whitelist in batches,
//! and reads the resulting state back.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use suiadrop::config::AirdropConfig;
use suiadrop::distribution::{BatchPlanner, PublishResult, StateReader};
use suiadrop::ledger::{Ledger, SuiAddress, SuiCliLedger};
use suiadrop::orchestrator::{Orchestrator, RunOptions};
use suiadrop::whitelist;

/// suiadrop - whitelist-gated airdrop orchestrator
#[derive(Parser, Debug)]
#[command(name = "suiadrop")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "SUIADROP_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full workflow: faucet, deploy, fund, register, claim, withdraw, verify
    Run {
        /// Newline-delimited whitelist file
        #[arg(long)]
        whitelist: PathBuf,

        /// Move package to publish
        #[arg(long, default_value = "move/suiadrop")]
        package: PathBuf,

        /// Reward pool amount in the coin's smallest unit
        #[arg(long)]
        reward_amount: Option<u64>,

        /// Reward coin type
        #[arg(long)]
        coin_type: Option<String>,

        /// Do not request faucet funds
        #[arg(long)]
        skip_faucet: bool,

        /// Do not claim the operator's share
        #[arg(long)]
        skip_claim: bool,

        /// Do not withdraw the residual balance
        #[arg(long)]
        skip_withdraw: bool,
    },

    /// Print the registration batch plan without touching the network
    Plan {
        /// Newline-delimited whitelist file
        #[arg(long)]
        whitelist: PathBuf,

        /// Operator address appended to the whitelist
        #[arg(long)]
        operator: SuiAddress,
    },

    /// Show the whitelist status of addresses in the configured deployment
    Status {
        #[arg(required = true)]
        addresses: Vec<SuiAddress>,
    },

    /// List every address registered in the configured deployment
    #[command(alias = "ls")]
    List,
}

#[cfg(feature = "trace")]
fn init_tracing(cli: &Cli) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

#[cfg(not(feature = "trace"))]
fn init_tracing(_cli: &Cli) {}

fn load_config(path: Option<&PathBuf>) -> Result<AirdropConfig> {
    let mut config = match path {
        Some(path) => AirdropConfig::from_file(path)?,
        None => AirdropConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

fn configured_deployment(config: &AirdropConfig) -> Result<PublishResult> {
    config
        .deployment
        .publish_result()?
        .context("deployment.package_id and deployment.global_id must be configured")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "suiadrop failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run {
            whitelist,
            package,
            reward_amount,
            coin_type,
            skip_faucet,
            skip_claim,
            skip_withdraw,
        } => {
            if let Some(amount) = reward_amount {
                config.reward.amount = Some(amount);
            }
            if let Some(coin_type) = coin_type {
                config.reward.coin_type = coin_type;
            }
            config.validate()?;

            let options = RunOptions {
                whitelist_path: whitelist,
                package_path: package,
                coin_type: config.reward.coin_type.clone(),
                reward_amount: config.reward_amount()?,
                existing: config.deployment.publish_result()?,
                request_faucet: !skip_faucet && config.network.faucet_url.is_some(),
                claim: !skip_claim,
                withdraw: !skip_withdraw,
            };
            let ledger = SuiCliLedger::connect(&config.network)
                .await
                .context("failed to connect to sui")?;
            let report = Orchestrator::new(Arc::new(ledger), config).run(&options).await?;

            if let Some(publish) = report.publish {
                println!("package:   {}", publish.package_id);
                println!("global:    {}", publish.global_id);
            }
            println!(
                "whitelist: {} entries in {} batch(es)",
                report.registration.entries, report.registration.batches
            );
            if let Some(status) = report.operator_status {
                println!("operator:  {status}");
            }
            if let Some(balance) = report.pool_balance {
                println!("pool:      {balance}");
            }
        }

        Commands::Plan {
            whitelist,
            operator,
        } => {
            config.validate()?;
            let addresses = whitelist::load(&whitelist, operator, config.limits.max_whitelist).await?;
            let planner = BatchPlanner::from_limits(&config.limits);
            let batches = planner.plan_all(&addresses)?;
            for batch in &batches {
                println!(
                    "batch {}: entries {}..{} ({} addresses, {} bytes)",
                    batch.index,
                    batch.offset,
                    batch.offset + batch.len(),
                    batch.len(),
                    batch.serialized_size
                );
            }
            println!("{} entries in {} batch(es)", addresses.len(), batches.len());
        }

        Commands::Status { addresses } => {
            let publish = configured_deployment(&config)?;
            let ledger: Arc<dyn Ledger> = Arc::new(SuiCliLedger::connect(&config.network).await?);
            let reader = StateReader::new(ledger, publish.global_id, &config.contract);
            for (address, status) in reader.statuses(&addresses).await? {
                println!("{address}: {status}");
            }
        }

        Commands::List => {
            let publish = configured_deployment(&config)?;
            let ledger: Arc<dyn Ledger> = Arc::new(SuiCliLedger::connect(&config.network).await?);
            let reader = StateReader::new(ledger, publish.global_id, &config.contract);
            let snapshot = reader.global_state().await?;
            let addresses = reader.list_whitelist().await?;
            for address in &addresses {
                println!("{address}");
            }
            println!(
                "{} registered, pool balance {}",
                addresses.len(),
                snapshot.balance
            );
        }
    }
    Ok(())
}
