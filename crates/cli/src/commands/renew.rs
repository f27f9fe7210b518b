use std::time::Duration;

use clap::Args;
use keylease::LockManager;

use super::{Outcome, report};
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct RenewArgs {
    /// Lock key.
    #[arg(long)]
    pub key: String,
    /// Request id the lock was acquired with.
    #[arg(long)]
    pub request_id: String,
    /// New TTL in milliseconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub ttl_ms: u64,
}

pub async fn run(
    manager: &LockManager,
    args: &RenewArgs,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let ok = manager
        .renew(
            &args.key,
            &args.request_id,
            Duration::from_millis(args.ttl_ms),
        )
        .await;
    report(
        &Outcome {
            operation: "renew",
            lock_key: &args.key,
            request_id: Some(args.request_id.as_str()),
            ok,
        },
        format,
    )?;
    Ok(ok)
}
