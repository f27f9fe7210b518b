use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Runtime, cluster};
use redis::{AsyncCommands, Script};
use tracing::info;

use keylease::error::LockError;
use keylease::scripts::LockScript;
use keylease::store::{LockStore, ScriptInvocation};

use crate::config::RedisConfig;
use crate::key_render::render_key;

/// Connection pool for the configured deployment.
enum Pool {
    Single(deadpool_redis::Pool),
    Cluster(cluster::Pool),
}

/// Pre-hashed lock scripts, sent with `EVALSHA`.
struct Scripts {
    acquire: Script,
    release: Script,
    renew: Script,
}

impl Scripts {
    fn new() -> Self {
        Self {
            acquire: Script::new(LockScript::Acquire.source()),
            release: Script::new(LockScript::Release.source()),
            renew: Script::new(LockScript::Renew.source()),
        }
    }

    fn get(&self, script: LockScript) -> &Script {
        match script {
            LockScript::Acquire => &self.acquire,
            LockScript::Release => &self.release,
            LockScript::Renew => &self.renew,
        }
    }
}

/// Redis-backed implementation of [`LockStore`].
///
/// Uses a `deadpool-redis` connection pool (single node or cluster) and Lua
/// scripts for atomicity. Every call is bounded by the configured command
/// timeout; an expired deadline is reported as [`LockError::Timeout`].
pub struct RedisLockStore {
    pool: Pool,
    prefix: Option<String>,
    command_timeout: Duration,
    scripts: Scripts,
}

impl RedisLockStore {
    /// Create a new `RedisLockStore` from the provided configuration.
    ///
    /// The configuration is normalized first. No connection is opened until
    /// the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Config`] if a node URL is invalid and
    /// [`LockError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, LockError> {
        let config = config.normalized();
        let urls = config.node_urls();
        let timeout = Some(config.connection_timeout());

        let pool = if config.is_cluster() {
            let pool = cluster::Config::from_urls(urls.clone())
                .builder()
                .map(|b| {
                    b.max_size(config.pool_size)
                        .wait_timeout(timeout)
                        .create_timeout(timeout)
                        .runtime(Runtime::Tokio1)
                        .build()
                })
                .map_err(|e| LockError::Config(e.to_string()))?
                .map_err(|e| LockError::Connection(e.to_string()))?;
            Pool::Cluster(pool)
        } else {
            let pool = deadpool_redis::Config::from_url(&urls[0])
                .builder()
                .map(|b| {
                    b.max_size(config.pool_size)
                        .wait_timeout(timeout)
                        .create_timeout(timeout)
                        .runtime(Runtime::Tokio1)
                        .build()
                })
                .map_err(|e| LockError::Config(e.to_string()))?
                .map_err(|e| LockError::Connection(e.to_string()))?;
            Pool::Single(pool)
        };

        info!(
            nodes = urls.len(),
            cluster = config.is_cluster(),
            pool_size = config.pool_size,
            "redis lock store configured"
        );

        Ok(Self {
            pool,
            command_timeout: config.command_timeout(),
            prefix: config.prefix,
            scripts: Scripts::new(),
        })
    }

    /// Whether this store talks to a Redis cluster.
    #[must_use]
    pub fn is_cluster(&self) -> bool {
        matches!(self.pool, Pool::Cluster(_))
    }

    fn redis_key(&self, key: &str) -> String {
        render_key(self.prefix.as_deref(), key)
    }

    /// Run `op` under the command deadline.
    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, LockError>> + Send,
    ) -> Result<T, LockError> {
        tokio::time::timeout(self.command_timeout, op)
            .await
            .map_err(|_| LockError::Timeout(self.command_timeout))?
    }
}

fn connection_error(e: impl std::fmt::Display) -> LockError {
    LockError::Connection(e.to_string())
}

fn script_error(e: &redis::RedisError) -> LockError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        LockError::Connection(e.to_string())
    } else {
        LockError::Script(e.to_string())
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn eval_atomic(&self, invocation: &ScriptInvocation<'_>) -> Result<i64, LockError> {
        let redis_key = self.redis_key(invocation.key);
        let mut call = self.scripts.get(invocation.script).key(&redis_key);
        call.arg(invocation.request_id);
        if let Some(ttl_ms) = invocation.ttl_ms {
            call.arg(ttl_ms);
        }

        self.bounded(async {
            let reply: i64 = match &self.pool {
                Pool::Single(pool) => {
                    let mut conn = pool.get().await.map_err(connection_error)?;
                    call.invoke_async(&mut conn).await
                }
                Pool::Cluster(pool) => {
                    let mut conn = pool.get().await.map_err(connection_error)?;
                    call.invoke_async(&mut conn).await
                }
            }
            .map_err(|e| script_error(&e))?;
            Ok(reply)
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, LockError> {
        let redis_key = self.redis_key(key);

        self.bounded(async {
            let found: bool = match &self.pool {
                Pool::Single(pool) => {
                    let mut conn = pool.get().await.map_err(connection_error)?;
                    conn.exists(&redis_key).await
                }
                Pool::Cluster(pool) => {
                    let mut conn = pool.get().await.map_err(connection_error)?;
                    conn.exists(&redis_key).await
                }
            }
            .map_err(|e| script_error(&e))?;
            Ok(found)
        })
        .await
    }
}
