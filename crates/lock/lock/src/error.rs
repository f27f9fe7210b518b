use std::time::Duration;

use thiserror::Error;

/// Errors from lock store and lock manager operations.
///
/// A lock that is simply held by someone else is not an error; the manager
/// reports that as `false`. These variants describe failures to reach a
/// verdict at all.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("unexpected reply from store: {0}")]
    UnexpectedReply(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid lock ttl {0:?}: must be at least one millisecond")]
    InvalidTtl(Duration),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LockError {
    /// Whether the error came from the transport or store rather than from
    /// a local precondition.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Script(_) | Self::UnexpectedReply(_) | Self::Timeout(_)
        )
    }
}
