use std::future::Future;
use std::time::Duration;

use clap::Args;
use keylease::error::LockError;
use keylease::manager::default_renew_interval;
use keylease::{LockManager, RenewalState, RequestId};
use tracing::{info, warn};

use super::{Outcome, report};
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct HoldArgs {
    /// Lock key.
    #[arg(long)]
    pub key: String,
    /// Request id to store; a random one is generated when omitted.
    #[arg(long)]
    pub request_id: Option<String>,
    /// Lock TTL in milliseconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub ttl_ms: u64,
    /// Renewal interval in milliseconds (default: a third of the TTL).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub renew_every_ms: Option<u64>,
    /// Wait up to this many milliseconds for a held lock to become free.
    #[arg(long)]
    pub wait_ms: Option<u64>,
}

pub async fn run(
    manager: &LockManager,
    args: &HoldArgs,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
        }
    };
    hold(manager, args, format, ctrl_c).await
}

/// Acquire, keep alive until `shutdown` resolves or the lock is lost, then
/// release. Returns `false` without releasing if the lock was lost.
async fn hold(
    manager: &LockManager,
    args: &HoldArgs,
    format: OutputFormat,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<bool> {
    let request_id = args
        .request_id
        .as_deref()
        .map_or_else(RequestId::generate, RequestId::from);
    let ttl = Duration::from_millis(args.ttl_ms);

    let acquired = match args.wait_ms {
        Some(wait_ms) => match manager
            .acquire_within(&args.key, &request_id, ttl, Duration::from_millis(wait_ms))
            .await
        {
            Ok(()) => true,
            Err(LockError::Timeout(_)) => false,
            Err(e) => {
                warn!(lock_key = %args.key, error = %e, "failed to acquire lock");
                false
            }
        },
        None => manager.acquire(&args.key, &request_id, ttl).await,
    };

    report(
        &Outcome {
            operation: "acquire",
            lock_key: &args.key,
            request_id: Some(request_id.as_str()),
            ok: acquired,
        },
        format,
    )?;
    if !acquired {
        return Ok(false);
    }

    let every = args
        .renew_every_ms
        .map_or_else(|| default_renew_interval(ttl), Duration::from_millis);
    let handle = match manager.keep_alive(&args.key, &request_id, ttl, every) {
        Ok(handle) => handle,
        Err(e) => {
            manager.release(&args.key, &request_id).await;
            return Err(e.into());
        }
    };
    info!(lock_key = %args.key, ?every, "holding lock, press Ctrl-C to release");

    tokio::select! {
        () = shutdown => {}
        _ = handle.wait() => {}
    }

    if handle.stop().await == RenewalState::Lost {
        warn!(lock_key = %args.key, "lock was lost while held");
        return Ok(false);
    }

    let released = manager.release(&args.key, &request_id).await;
    report(
        &Outcome {
            operation: "release",
            lock_key: &args.key,
            request_id: Some(request_id.as_str()),
            ok: released,
        },
        format,
    )?;
    Ok(released)
}

#[cfg(test)]
mod tests {
    use std::future::pending;
    use std::sync::Arc;

    use keylease_memory::MemoryLockStore;

    use super::*;

    fn hold_args(ttl_ms: u64) -> HoldArgs {
        HoldArgs {
            key: "job:1".into(),
            request_id: Some("r1".into()),
            ttl_ms,
            renew_every_ms: None,
            wait_ms: None,
        }
    }

    fn manager() -> LockManager {
        LockManager::new(Arc::new(MemoryLockStore::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn holds_past_ttl_and_releases_on_shutdown() {
        let m = manager();
        let observer = m.clone();
        let shutdown = async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            assert!(observer.exists("job:1").await.unwrap(), "still held past the ttl");
        };

        assert!(hold(&m, &hold_args(300), OutputFormat::Text, shutdown).await.unwrap());
        assert!(!m.exists("job:1").await.unwrap(), "released on shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn lost_lock_fails_without_release() {
        let m = manager();
        let rival = m.clone();
        // Renew after the ttl so a rival can take the lock in between.
        let args = HoldArgs {
            renew_every_ms: Some(500),
            ..hold_args(300)
        };
        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(350)).await;
            assert!(rival.acquire("job:1", "r2", Duration::from_secs(10)).await);
            pending::<()>().await;
        };

        assert!(!hold(&m, &args, OutputFormat::Json, shutdown).await.unwrap());
        assert!(m.release("job:1", "r2").await, "rival's lock is untouched");
    }

    #[tokio::test(start_paused = true)]
    async fn busy_lock_is_not_held() {
        let m = manager();
        assert!(m.acquire("job:1", "r0", Duration::from_secs(10)).await);

        assert!(!hold(&m, &hold_args(300), OutputFormat::Text, pending()).await.unwrap());
        assert!(m.release("job:1", "r0").await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_as_failure() {
        let m = manager();
        assert!(m.acquire("job:1", "r0", Duration::from_secs(10)).await);
        let args = HoldArgs {
            wait_ms: Some(200),
            ..hold_args(300)
        };

        assert!(!hold(&m, &args, OutputFormat::Text, pending()).await.unwrap());
        assert!(m.release("job:1", "r0").await, "holder keeps its lock");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_acquires_once_lock_expires() {
        let m = manager();
        assert!(m.acquire("job:1", "r0", Duration::from_millis(100)).await);
        let args = HoldArgs {
            wait_ms: Some(1000),
            ..hold_args(300)
        };
        let shutdown = tokio::time::sleep(Duration::from_millis(500));

        assert!(hold(&m, &args, OutputFormat::Text, shutdown).await.unwrap());
        assert!(!m.exists("job:1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_renewal_interval_releases_the_lock() {
        let m = manager();
        let args = HoldArgs {
            renew_every_ms: Some(u64::MAX),
            ..hold_args(300)
        };

        assert!(hold(&m, &args, OutputFormat::Text, pending()).await.is_err());
        assert!(!m.exists("job:1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_store_error_is_a_failure() {
        let m = manager();
        let args = HoldArgs {
            wait_ms: Some(1000),
            ..hold_args(0)
        };

        assert!(!hold(&m, &args, OutputFormat::Text, pending()).await.unwrap());
        assert!(!m.exists("job:1").await.unwrap());
    }
}
