use std::path::Path;

use keylease_redis::RedisConfig;
use serde::Deserialize;
use tracing::info;

/// Top-level CLI configuration, loaded from a TOML file.
///
/// ```toml
/// [redis]
/// connections = ["127.0.0.1:6379"]
/// prefix = "locks"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    /// Redis lock store configuration.
    #[serde(default)]
    pub redis: RedisConfig,
}

/// Load configuration from `path`, or defaults if the file does not exist.
///
/// `redis_url`, when given, replaces the configured node list.
pub fn load(path: &str, redis_url: Option<&str>) -> anyhow::Result<CliConfig> {
    let mut config: CliConfig = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)?;
        parse(&contents)?
    } else {
        info!(path, "config file not found, using defaults");
        CliConfig::default()
    };

    if let Some(url) = redis_url {
        config.redis.connections = vec![url.to_owned()];
    }
    config.redis.normalize();
    Ok(config)
}

fn parse(contents: &str) -> anyhow::Result<CliConfig> {
    Ok(toml::from_str(contents)?)
}
