//! keylease CLI
//!
//! Acquire, release, renew and hold Redis-backed distributed locks from the
//! shell.

mod commands;
mod config;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use keylease::LockManager;
use keylease_redis::RedisLockStore;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt};

/// keylease — distributed locks on Redis.
#[derive(Parser, Debug)]
#[command(name = "keylease", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(
        short,
        long,
        env = "KEYLEASE_CONFIG",
        default_value = "keylease.toml",
        global = true
    )]
    config: String,

    /// Redis address or URL; overrides `connections` from the config file.
    #[arg(long, env = "KEYLEASE_REDIS_URL", global = true)]
    redis_url: Option<String>,

    /// Output format.
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Take a lock if it is free.
    Acquire(commands::acquire::AcquireArgs),
    /// Release a lock held under a request id.
    Release(commands::release::ReleaseArgs),
    /// Reset the TTL of a lock held under a request id.
    Renew(commands::renew::RenewArgs),
    /// Check whether a lock record exists.
    Exists(commands::exists::ExistsArgs),
    /// Acquire a lock and keep it alive until interrupted.
    Hold(commands::hold::HoldArgs),
}

/// Exit status when the operation reported `true`.
const EXIT_OK: u8 = 0;
/// Exit status when the operation reported `false`.
const EXIT_FAILED: u8 = 1;
/// Exit status when the configuration cannot be loaded.
const EXIT_CONFIG: u8 = 2;

fn exit_status(ok: bool) -> u8 {
    if ok { EXIT_OK } else { EXIT_FAILED }
}

/// Load the configuration and build a manager on a Redis store.
fn open_manager(config_path: &str, redis_url: Option<&str>) -> anyhow::Result<LockManager> {
    let config = config::load(config_path, redis_url)
        .with_context(|| format!("failed to load configuration from {config_path}"))?;
    let store = RedisLockStore::new(&config.redis).context("invalid redis configuration")?;
    Ok(LockManager::new(Arc::new(store)))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let manager = match open_manager(&cli.config, cli.redis_url.as_deref()) {
        Ok(manager) => manager,
        Err(e) => {
            error!(error = %format!("{e:#}"), "configuration error");
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
    };

    let ok = match cli.command {
        Command::Acquire(args) => commands::acquire::run(&manager, &args, cli.format).await?,
        Command::Release(args) => commands::release::run(&manager, &args, cli.format).await?,
        Command::Renew(args) => commands::renew::run(&manager, &args, cli.format).await?,
        Command::Exists(args) => commands::exists::run(&manager, &args, cli.format).await?,
        Command::Hold(args) => commands::hold::run(&manager, &args, cli.format).await?,
    };

    Ok(ExitCode::from(exit_status(ok)))
}
