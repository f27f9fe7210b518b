use std::fmt;

/// Lua script for acquiring a lock (SET NX PX).
///
/// KEYS\[1\] = lock key
/// ARGV\[1\] = request id
/// ARGV\[2\] = TTL in milliseconds
///
/// Returns 1 if acquired, 0 if the key already exists.
pub const ACQUIRE: &str = r#"
if redis.call("SET", KEYS[1], ARGV[1], "NX", "PX", ARGV[2]) then
    return 1
end
return 0
"#;

/// Lua script for releasing a lock held by the given request id.
///
/// KEYS\[1\] = lock key
/// ARGV\[1\] = request id
///
/// Returns the `DEL` count (1) on a match, 0 otherwise.
pub const RELEASE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Lua script for resetting the TTL of a lock held by the given request id.
///
/// KEYS\[1\] = lock key
/// ARGV\[1\] = request id
/// ARGV\[2\] = new TTL in milliseconds
///
/// Returns the `PEXPIRE` result (1) on a match, 0 otherwise.
pub const RENEW: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
end
return 0
"#;

/// The three atomic lock operations a [`LockStore`](crate::LockStore) must
/// be able to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockScript {
    Acquire,
    Release,
    Renew,
}

impl LockScript {
    pub const ALL: [Self; 3] = [Self::Acquire, Self::Release, Self::Renew];

    /// Lua source executed by script-capable stores.
    #[must_use]
    pub const fn source(self) -> &'static str {
        match self {
            Self::Acquire => ACQUIRE,
            Self::Release => RELEASE,
            Self::Renew => RENEW,
        }
    }

    /// Short operation name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Release => "release",
            Self::Renew => "renew",
        }
    }

    /// Whether the script takes a TTL as its second argument.
    #[must_use]
    pub const fn takes_ttl(self) -> bool {
        matches!(self, Self::Acquire | Self::Renew)
    }
}

impl fmt::Display for LockScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
