use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::LockError;
use crate::renewal::{self, RenewalHandle};
use crate::store::{LockStore, ScriptInvocation};

/// Retry interval when polling for lock acquisition.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Longest renewal interval [`LockManager::keep_alive`] accepts: the longest
/// TTL a store can be sent.
const MAX_RENEW_INTERVAL: Duration = Duration::from_millis(i64::MAX.unsigned_abs());

/// Acquires, releases and renews locks through an injected [`LockStore`].
///
/// The boolean operations ([`acquire`](Self::acquire),
/// [`release`](Self::release), [`renew`](Self::renew)) never fail: any store
/// error is logged and reported as `false`, so a caller that cannot reach the
/// store never believes it holds a lock. The `try_*` variants return the same
/// verdict but keep the error distinguishable.
///
/// No lock state is cached locally; every call is one round trip to the
/// store.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
}

impl LockManager {
    /// Create a lock manager on top of the given store.
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    /// Take the lock at `lock_key` for `request_id` if nobody holds it.
    ///
    /// Returns `true` only if this call created the lock record.
    pub async fn acquire(&self, lock_key: &str, request_id: &str, ttl: Duration) -> bool {
        match self.try_acquire(lock_key, request_id, ttl).await {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(lock_key, request_id, error = %e, "failed to acquire lock");
                false
            }
        }
    }

    /// Delete the lock at `lock_key` if it is held by `request_id`.
    pub async fn release(&self, lock_key: &str, request_id: &str) -> bool {
        match self.try_release(lock_key, request_id).await {
            Ok(released) => released,
            Err(e) => {
                warn!(lock_key, request_id, error = %e, "failed to release lock");
                false
            }
        }
    }

    /// Reset the TTL of the lock at `lock_key` if it is held by `request_id`.
    pub async fn renew(&self, lock_key: &str, request_id: &str, ttl: Duration) -> bool {
        match self.try_renew(lock_key, request_id, ttl).await {
            Ok(renewed) => renewed,
            Err(e) => {
                warn!(lock_key, request_id, error = %e, "failed to renew lock");
                false
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but store failures are returned.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidTtl`] when `ttl` is shorter than one
    /// millisecond, or the store's error if the script could not run.
    pub async fn try_acquire(
        &self,
        lock_key: &str,
        request_id: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let ttl_ms = ttl_millis(ttl)?;
        let reply = self
            .store
            .eval_atomic(&ScriptInvocation::acquire(lock_key, request_id, ttl_ms))
            .await?;
        let acquired = reply_flag(reply)?;
        debug!(lock_key, request_id, ttl_ms, acquired, "lock acquire");
        Ok(acquired)
    }

    /// Like [`release`](Self::release), but store failures are returned.
    pub async fn try_release(&self, lock_key: &str, request_id: &str) -> Result<bool, LockError> {
        let reply = self
            .store
            .eval_atomic(&ScriptInvocation::release(lock_key, request_id))
            .await?;
        let released = reply_flag(reply)?;
        debug!(lock_key, request_id, released, "lock release");
        Ok(released)
    }

    /// Like [`renew`](Self::renew), but store failures are returned.
    pub async fn try_renew(
        &self,
        lock_key: &str,
        request_id: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let ttl_ms = ttl_millis(ttl)?;
        let reply = self
            .store
            .eval_atomic(&ScriptInvocation::renew(lock_key, request_id, ttl_ms))
            .await?;
        let renewed = reply_flag(reply)?;
        debug!(lock_key, request_id, ttl_ms, renewed, "lock renew");
        Ok(renewed)
    }

    /// Acquire the lock, polling until it is free or `timeout` elapses.
    ///
    /// A `timeout` too large to put a deadline on (such as [`Duration::MAX`])
    /// waits until the lock is acquired or the store fails.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if the lock is still held by someone
    /// else at the deadline. Store errors end the wait immediately.
    pub async fn acquire_within(
        &self,
        lock_key: &str,
        request_id: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<(), LockError> {
        let deadline = tokio::time::Instant::now().checked_add(timeout);

        loop {
            if self.try_acquire(lock_key, request_id, ttl).await? {
                return Ok(());
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        return Err(LockError::Timeout(timeout));
                    }
                    LOCK_POLL_INTERVAL.min(deadline - now)
                }
                None => LOCK_POLL_INTERVAL,
            };
            tokio::time::sleep(pause).await;
        }
    }

    /// Whether a lock record is currently present at `lock_key`.
    pub async fn exists(&self, lock_key: &str) -> Result<bool, LockError> {
        self.store.exists(lock_key).await
    }

    /// Keep the lock alive by renewing it every `every` on a background task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidTtl`] if `ttl` is shorter than one
    /// millisecond and [`LockError::Config`] if `every` is zero or longer
    /// than `i64::MAX` milliseconds.
    pub fn keep_alive(
        &self,
        lock_key: &str,
        request_id: &str,
        ttl: Duration,
        every: Duration,
    ) -> Result<RenewalHandle, LockError> {
        ttl_millis(ttl)?;
        if every.is_zero() {
            return Err(LockError::Config(
                "renewal interval must be greater than zero".to_owned(),
            ));
        }
        if every > MAX_RENEW_INTERVAL {
            return Err(LockError::Config(format!(
                "renewal interval must be at most {} ms",
                i64::MAX
            )));
        }
        Ok(renewal::spawn(
            self.clone(),
            lock_key.to_owned(),
            request_id.to_owned(),
            ttl,
            every,
        ))
    }

    /// [`keep_alive`](Self::keep_alive) renewing at a third of the TTL.
    pub fn keep_alive_default(
        &self,
        lock_key: &str,
        request_id: &str,
        ttl: Duration,
    ) -> Result<RenewalHandle, LockError> {
        self.keep_alive(lock_key, request_id, ttl, default_renew_interval(ttl))
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager").finish_non_exhaustive()
    }
}

/// Renewal cadence used by [`LockManager::keep_alive_default`].
#[must_use]
pub fn default_renew_interval(ttl: Duration) -> Duration {
    (ttl / 3).max(Duration::from_millis(1))
}

fn ttl_millis(ttl: Duration) -> Result<i64, LockError> {
    let ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    if ms == 0 {
        return Err(LockError::InvalidTtl(ttl));
    }
    Ok(ms)
}

fn reply_flag(reply: i64) -> Result<bool, LockError> {
    match reply {
        1 => Ok(true),
        0 => Ok(false),
        other => Err(LockError::UnexpectedReply(format!(
            "expected 0 or 1, got {other}"
        ))),
    }
}
