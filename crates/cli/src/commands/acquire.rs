use std::time::Duration;

use clap::Args;
use keylease::{LockManager, RequestId};

use super::{Outcome, report};
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct AcquireArgs {
    /// Lock key.
    #[arg(long)]
    pub key: String,
    /// Request id to store; a random one is generated when omitted.
    #[arg(long)]
    pub request_id: Option<String>,
    /// Lock TTL in milliseconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub ttl_ms: u64,
}

pub async fn run(
    manager: &LockManager,
    args: &AcquireArgs,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let request_id = args
        .request_id
        .as_deref()
        .map_or_else(RequestId::generate, RequestId::from);

    let ok = manager
        .acquire(&args.key, &request_id, Duration::from_millis(args.ttl_ms))
        .await;

    report(
        &Outcome {
            operation: "acquire",
            lock_key: &args.key,
            request_id: Some(request_id.as_str()),
            ok,
        },
        format,
    )?;
    Ok(ok)
}
