use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque token identifying one lock holder or acquisition attempt.
///
/// The value stored under a lock key is the holder's request id; release and
/// renewal only succeed when the caller presents the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Create a request id from an existing token.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a fresh random (UUID v4) request id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Return the inner string as a str slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl std::ops::Deref for RequestId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn serializes_transparently() {
        let id = RequestId::new("r1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"r1\"");
        let back: RequestId = serde_json::from_str("\"r1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn derefs_to_str() {
        let id = RequestId::from("owner-7");
        let s: &str = &id;
        assert_eq!(s, "owner-7");
        assert_eq!(id.to_string(), "owner-7");
    }
}
