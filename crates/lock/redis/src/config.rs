use std::time::Duration;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;

const DEFAULT_ADDR: &str = "127.0.0.1:6379";
const DEFAULT_POOL_SIZE: usize = 300;
const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 1000;

/// Configuration for the Redis lock store.
///
/// Every field may be omitted in TOML; missing and zero values fall back to
/// the defaults applied by [`normalize`](Self::normalize).
///
/// # Example
///
/// ```toml
/// [redis]
/// connections = ["10.0.0.1:6379", "10.0.0.2:6379", "10.0.0.3:6379"]
/// password = "secret"
/// pool_size = 64
/// command_timeout_ms = 500
/// prefix = "locks"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Node addresses as `host:port` (`:port` means localhost) or full
    /// `redis://` / `rediss://` URLs. One entry selects a single-node pool,
    /// more than one a cluster pool.
    pub connections: Vec<String>,

    /// ACL username.
    pub username: Option<String>,

    /// Password (or ACL password when `username` is set).
    pub password: Option<String>,

    /// Logical database index. Ignored in cluster mode.
    pub db: u32,

    /// Maximum number of pooled connections.
    pub pool_size: usize,

    /// Deadline for one lock script round trip, including pool checkout.
    pub command_timeout_ms: u64,

    /// Deadline for checking out or opening a pooled connection. Zero means
    /// `command_timeout_ms`.
    pub connection_timeout_ms: u64,

    /// Key prefix applied to every lock key to avoid collisions.
    pub prefix: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            connections: vec![DEFAULT_ADDR.to_owned()],
            username: None,
            password: None,
            db: 0,
            pool_size: DEFAULT_POOL_SIZE,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            connection_timeout_ms: 0,
            prefix: None,
        }
    }
}

impl RedisConfig {
    /// Configuration for a single node at `addr` with default settings.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            connections: vec![addr.into()],
            ..Self::default()
        }
    }

    /// Replace empty or zero settings with their defaults.
    pub fn normalize(&mut self) {
        self.connections.retain(|c| !c.trim().is_empty());
        if self.connections.is_empty() {
            self.connections.push(DEFAULT_ADDR.to_owned());
        }

        if self.pool_size == 0 {
            self.pool_size = DEFAULT_POOL_SIZE;
        }

        if self.command_timeout_ms == 0 {
            self.command_timeout_ms = DEFAULT_COMMAND_TIMEOUT_MS;
        }
    }

    /// A normalized copy of this configuration.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut cfg = self.clone();
        cfg.normalize();
        cfg
    }

    /// Whether more than one node is configured.
    #[must_use]
    pub fn is_cluster(&self) -> bool {
        self.connections.len() > 1
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        if self.connection_timeout_ms == 0 {
            return self.command_timeout();
        }
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Connection URL for every configured node.
    ///
    /// Entries that are already URLs are passed through untouched. Bare
    /// addresses get the configured credentials and, outside cluster mode,
    /// the database index.
    #[must_use]
    pub fn node_urls(&self) -> Vec<String> {
        let cluster = self.is_cluster();
        self.connections
            .iter()
            .map(|conn| self.node_url(conn.trim(), cluster))
            .collect()
    }

    fn node_url(&self, conn: &str, cluster: bool) -> String {
        if conn.contains("://") {
            return conn.to_owned();
        }

        let addr = if conn.starts_with(':') {
            format!("127.0.0.1{conn}")
        } else {
            conn.to_owned()
        };

        let encode = |s: &str| utf8_percent_encode(s, NON_ALPHANUMERIC).to_string();
        let auth = match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) => format!("{}:{}@", encode(user), encode(pass)),
            (None, Some(pass)) => format!(":{}@", encode(pass)),
            (Some(user), None) => format!("{}@", encode(user)),
            (None, None) => String::new(),
        };

        if cluster || self.db == 0 {
            format!("redis://{auth}{addr}")
        } else {
            format!("redis://{auth}{addr}/{}", self.db)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = RedisConfig::default();
        assert_eq!(cfg.connections, ["127.0.0.1:6379"]);
        assert_eq!(cfg.pool_size, 300);
        assert_eq!(cfg.command_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.connection_timeout(), Duration::from_secs(1));
        assert!(!cfg.is_cluster());
        assert!(cfg.prefix.is_none());
    }

    #[test]
    fn normalize_fills_zero_values() {
        let mut cfg = RedisConfig {
            connections: vec![String::new(), "  ".into()],
            username: None,
            password: None,
            db: 0,
            pool_size: 0,
            command_timeout_ms: 0,
            connection_timeout_ms: 0,
            prefix: None,
        };
        cfg.normalize();
        assert_eq!(cfg, RedisConfig::default());
    }

    #[test]
    fn connection_timeout_follows_command_timeout() {
        let cfg = RedisConfig {
            command_timeout_ms: 250,
            connection_timeout_ms: 0,
            ..RedisConfig::default()
        }
        .normalized();
        assert_eq!(cfg.connection_timeout(), Duration::from_millis(250));

        let cfg = RedisConfig {
            command_timeout_ms: 250,
            connection_timeout_ms: 40,
            ..RedisConfig::default()
        }
        .normalized();
        assert_eq!(cfg.connection_timeout(), Duration::from_millis(40));
    }

    #[test]
    fn single_node_url_with_db_and_password() {
        let cfg = RedisConfig {
            password: Some("p@ss word".into()),
            db: 3,
            ..RedisConfig::new(":6380")
        };
        assert_eq!(cfg.node_urls(), ["redis://:p%40ss%20word@127.0.0.1:6380/3"]);
    }

    #[test]
    fn acl_credentials() {
        let cfg = RedisConfig {
            username: Some("locker".into()),
            password: Some("pw".into()),
            ..RedisConfig::new("redis.internal:6379")
        };
        assert_eq!(cfg.node_urls(), ["redis://locker:pw@redis.internal:6379"]);
    }

    #[test]
    fn cluster_mode_drops_db() {
        let cfg = RedisConfig {
            connections: vec!["a:7000".into(), "b:7001".into()],
            db: 2,
            ..RedisConfig::default()
        };
        assert!(cfg.is_cluster());
        assert_eq!(cfg.node_urls(), ["redis://a:7000", "redis://b:7001"]);
    }

    #[test]
    fn full_urls_pass_through() {
        let cfg = RedisConfig {
            password: Some("ignored".into()),
            ..RedisConfig::new("rediss://user:pw@cache:6380/1")
        };
        assert_eq!(cfg.node_urls(), ["rediss://user:pw@cache:6380/1"]);
    }

    #[test]
    fn deserializes_partial_toml() {
        let cfg: RedisConfig = toml::from_str(
            r#"
            connections = ["10.0.0.1:6379", "10.0.0.2:6379"]
            pool_size = 0
            command_timeout_ms = 500
            prefix = "locks"
            "#,
        )
        .unwrap();
        let cfg = cfg.normalized();
        assert!(cfg.is_cluster());
        assert_eq!(cfg.pool_size, 300);
        assert_eq!(cfg.connection_timeout(), Duration::from_millis(500));
        assert_eq!(cfg.prefix.as_deref(), Some("locks"));
    }

    #[test]
    fn deserializes_empty_toml_to_defaults() {
        let cfg: RedisConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, RedisConfig::default());
    }
}
