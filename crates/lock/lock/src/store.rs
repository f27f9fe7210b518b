use async_trait::async_trait;

use crate::error::LockError;
use crate::scripts::LockScript;

/// One execution of a lock script against a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptInvocation<'a> {
    pub script: LockScript,
    /// Lock key (`KEYS[1]`). Stores may add their own namespace prefix.
    pub key: &'a str,
    /// Holder token (`ARGV[1]`).
    pub request_id: &'a str,
    /// TTL in milliseconds (`ARGV[2]`); `None` for release.
    pub ttl_ms: Option<i64>,
}

impl<'a> ScriptInvocation<'a> {
    #[must_use]
    pub fn acquire(key: &'a str, request_id: &'a str, ttl_ms: i64) -> Self {
        Self {
            script: LockScript::Acquire,
            key,
            request_id,
            ttl_ms: Some(ttl_ms),
        }
    }

    #[must_use]
    pub fn release(key: &'a str, request_id: &'a str) -> Self {
        Self {
            script: LockScript::Release,
            key,
            request_id,
            ttl_ms: None,
        }
    }

    #[must_use]
    pub fn renew(key: &'a str, request_id: &'a str, ttl_ms: i64) -> Self {
        Self {
            script: LockScript::Renew,
            key,
            request_id,
            ttl_ms: Some(ttl_ms),
        }
    }
}

/// Store capability the lock manager is built on.
///
/// Implementations must execute each invocation as one indivisible step:
/// no other operation on the same key may interleave between the owner
/// comparison and the write. Implementations must be `Send + Sync` and safe
/// for concurrent access.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Execute a lock script atomically and return its integer reply
    /// (`1` = applied, `0` = no-op).
    async fn eval_atomic(&self, invocation: &ScriptInvocation<'_>) -> Result<i64, LockError>;

    /// Check whether a lock record currently exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool, LockError>;
}
