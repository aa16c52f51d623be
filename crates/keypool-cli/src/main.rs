mod logging;
mod surface;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::info;

use keypool_core::impls::InMemoryLeaseStore;
use keypool_core::{PoolBuilder, PoolConfig};

use crate::logging::{LogFormat, init_logging};

/// keypool - lease pool with automatic expiry reclamation
#[derive(Parser, Debug)]
#[command(name = "keypool")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info", env = "KEYPOOL_LOG_LEVEL")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty, env = "KEYPOOL_LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer JSON-line requests from stdin on stdout
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Idle seconds after the last keep-alive before a token counts as expired
    #[arg(long, default_value_t = 300, env = "KEYPOOL_CREATION_TTL_SECS")]
    creation_ttl_secs: u64,

    /// Seconds a token may stay blocked before it is reclaimed
    #[arg(long, default_value_t = 60, env = "KEYPOOL_BLOCK_TTL_SECS")]
    block_ttl_secs: u64,

    /// Milliseconds between two sweeps of the blocked set
    #[arg(long, default_value_t = 1000, env = "KEYPOOL_SWEEP_INTERVAL_MS")]
    sweep_interval_ms: u64,

    /// Lease store endpoint
    #[arg(long, default_value = "memory://", env = "KEYPOOL_STORE")]
    store: String,
}

impl ServeArgs {
    fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            creation_ttl: Duration::from_secs(self.creation_ttl_secs),
            block_ttl: Duration::from_secs(self.block_ttl_secs),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            ..PoolConfig::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreEndpoint {
    Memory,
}

impl StoreEndpoint {
    fn parse(endpoint: &str) -> Result<Self> {
        match endpoint {
            "memory" | "memory://" => Ok(Self::Memory),
            other => bail!("unsupported lease store endpoint {other:?} (supported: memory://)"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_format)?;

    match args.command {
        Command::Serve(serve) => run_serve(serve).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let store = match StoreEndpoint::parse(&args.store)? {
        StoreEndpoint::Memory => InMemoryLeaseStore::new(),
    };
    let config = args.pool_config();
    let pool = PoolBuilder::new(store)
        .config(config.clone())
        .build()
        .context("invalid pool configuration")?;

    let sweeper = pool.start_sweeper().context("failed to start sweeper")?;
    info!(
        store = %args.store,
        creation_ttl_secs = config.creation_ttl.as_secs(),
        block_ttl_secs = config.block_ttl.as_secs(),
        "serving lease requests on stdin"
    );

    let result = surface::serve(
        pool.registry(),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await;

    sweeper.abort();
    info!("input closed, shutting down");
    result
}
