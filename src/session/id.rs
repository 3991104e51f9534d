//! Session identifier type.

use std::fmt;

/// Opaque identifier of a user session, supplied by the caller.
///
/// Store keys are derived by plain concatenation with the handler's prefix,
/// so the prefix must not be something a raw session id could start with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a caller-supplied identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key holding the session payload: `prefix + id`.
    pub fn store_key(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.0)
    }

    /// Key holding the session lock: `prefix + id + ".lock"`.
    pub fn lock_key(&self, prefix: &str) -> String {
        format!("{}{}.lock", prefix, self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_store_key() {
        let id = SessionId::new("abc");
        assert_eq!(id.store_key("sess_"), "sess_abc");
        assert_eq!(id.store_key(""), "abc");
    }

    #[test]
    fn test_lock_key() {
        let id = SessionId::new("abc");
        assert_eq!(id.lock_key("sess_"), "sess_abc.lock");
        assert_eq!(id.lock_key(""), "abc.lock");
    }

    #[test]
    fn test_display() {
        let id: SessionId = "q1w2e3".into();
        assert_eq!(id.to_string(), "q1w2e3");
        assert_eq!(id.as_str(), "q1w2e3");
    }

    #[test]
    fn test_hash_eq() {
        let id1 = SessionId::from("abc".to_string());
        let id2 = SessionId::new("abc");
        let id3 = SessionId::new("abd");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);

        let mut set = HashSet::new();
        set.insert(id1);
        assert!(set.contains(&id2));
        assert!(!set.contains(&id3));
    }
}
