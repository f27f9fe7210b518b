use clap::Args;
use keylease::LockManager;

use super::{Outcome, report};
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct ExistsArgs {
    /// Lock key.
    #[arg(long)]
    pub key: String,
}

/// Unlike the lock operations, a store failure here is an error: "absent"
/// and "unreachable" must not look the same to a shell script.
pub async fn run(
    manager: &LockManager,
    args: &ExistsArgs,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let ok = manager.exists(&args.key).await?;
    report(
        &Outcome {
            operation: "exists",
            lock_key: &args.key,
            request_id: None,
            ok,
        },
        format,
    )?;
    Ok(ok)
}
