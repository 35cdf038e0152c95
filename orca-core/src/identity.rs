//! Identity types for cached entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Unique string identifier of a cached entity instance.
///
/// Keys are compared byte-wise, which also gives the tiebreak order used by
/// the access ledger when two keys are equally cold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Create a key from anything string-like.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes, used as the LMDB key.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Consume the key and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for Key {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Entity type discriminator, one per cached domain type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Profile,
    Post,
}

impl EntityType {
    /// Stable table name used to name durable databases.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Profile => "profiles",
            Self::Post => "posts",
        }
    }

    /// Name of the access ledger database paired with this entity's table.
    pub fn ledger_name(&self) -> &'static str {
        match self {
            Self::Profile => "profiles.access",
            Self::Post => "posts.access",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profile => f.write_str("Profile"),
            Self::Post => f.write_str("Post"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_conversions() {
        let key = Key::from("alice");
        assert_eq!(key.as_str(), "alice");
        assert_eq!(key.as_bytes(), b"alice");
        assert_eq!(key.to_string(), "alice");
        assert_eq!(Key::new(String::from("alice")), key);
        assert_eq!(key.into_inner(), "alice");
    }

    #[test]
    fn test_key_serializes_transparently() {
        let key = Key::from("109");
        let json = serde_json::to_string(&key).expect("serialize should succeed");
        assert_eq!(json, "\"109\"");
        let back: Key = serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(back, key);
    }

    #[test]
    fn test_key_ordering_is_lexicographic() {
        let mut keys = vec![Key::from("c"), Key::from("a"), Key::from("b")];
        keys.sort();
        assert_eq!(keys, vec![Key::from("a"), Key::from("b"), Key::from("c")]);
    }

    #[test]
    fn test_entity_type_names_are_distinct() {
        assert_eq!(EntityType::Profile.table_name(), "profiles");
        assert_eq!(EntityType::Post.table_name(), "posts");
        assert_ne!(EntityType::Profile.ledger_name(), EntityType::Post.ledger_name());
        assert_ne!(EntityType::Post.table_name(), EntityType::Post.ledger_name());
    }
}
