use clap::Args;
use keylease::LockManager;

use super::{Outcome, report};
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Lock key.
    #[arg(long)]
    pub key: String,
    /// Request id the lock was acquired with.
    #[arg(long)]
    pub request_id: String,
}

pub async fn run(
    manager: &LockManager,
    args: &ReleaseArgs,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let ok = manager.release(&args.key, &args.request_id).await;
    report(
        &Outcome {
            operation: "release",
            lock_key: &args.key,
            request_id: Some(args.request_id.as_str()),
            ok,
        },
        format,
    )?;
    Ok(ok)
}
