#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use anyhow::Context;
use clap::Parser;
use config::{CliArgs, CliConfig, Command, OutputFormat, Target};
use tally::{AsyncAllocator, AsyncNumbering, SystemPeriodSource, TokioSleep};
use tally_pg::{PgConnectOptions, PgCounterStore, default_pool_options};
use telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    init_telemetry(config.log_format)?;

    let store = connect(&config).await?;
    match &config.command {
        Command::Migrate => {
            store.migrate().await?;
            println!("counter schema is up to date");
        }
        Command::Allocate { target, output } => {
            let numbering = numbering(store, &config, target)?;
            let allocation = numbering
                .issue::<TokioSleep>(&target.tenant, &target.context)
                .await
                .map_err(explain)?;
            match output {
                OutputFormat::Text => println!("{}", allocation.formatted),
                OutputFormat::Json => println!("{}", serde_json::to_string(&allocation)?),
            }
        }
        Command::Peek { target } => {
            let numbering = numbering(store, &config, target)?;
            let last = numbering
                .last_issued(&target.tenant, &target.context)
                .await
                .map_err(explain)?;
            let next = numbering
                .preview(&target.tenant, &target.context)
                .await
                .map_err(explain)?;
            let scope_key = numbering.derivation(&target.context)?.scope_key;
            match last {
                Some(last) => println!("{scope_key}: last issued {last}, next likely {next}"),
                None => println!("{scope_key}: nothing issued yet, first will be {next}"),
            }
        }
    }

    Ok(())
}

async fn connect(config: &CliConfig) -> anyhow::Result<PgCounterStore> {
    let options: PgConnectOptions = config
        .database_url
        .parse()
        .context("invalid DATABASE_URL")?;
    let pool = default_pool_options().max_connections(config.max_connections);
    let store = PgCounterStore::connect_with(pool, options).await?;
    tracing::debug!(
        lock_timeout = ?config.policy.lock_timeout,
        max_attempts = config.policy.max_attempts,
        "store ready"
    );
    Ok(store)
}

fn numbering(
    store: PgCounterStore,
    config: &CliConfig,
    target: &Target,
) -> anyhow::Result<AsyncNumbering<PgCounterStore, SystemPeriodSource>> {
    let allocator = AsyncAllocator::with_policy(store, config.policy)?;
    Ok(AsyncNumbering::new(
        allocator,
        SystemPeriodSource,
        target.numbering.clone(),
    ))
}

/// Tells the operator whether running the command again is worthwhile.
fn explain(err: tally::Error) -> anyhow::Error {
    if err.is_retryable() {
        anyhow::Error::new(err).context("transient failure, safe to retry")
    } else {
        anyhow::Error::new(err).context("allocation failed; do not retry blindly")
    }
}
