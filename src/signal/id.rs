use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier carried by every signal.
///
/// Wraps a UUID rather than exposing one directly so the rest of the crate
/// can depend on `SignalId` and swap the backing representation later
/// without touching call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalId(Uuid);

impl SignalId {
    /// Generate a new, random signal id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID (e.g. one read back from storage).
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SignalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The id of the producer that stamped a `Version` onto an event.
///
/// Producers are usually aggregate instances; the id is opaque to this
/// crate and compared only by its serialized form, same as `EntityId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProducerId(String);

impl ProducerId {
    pub fn new(serialized: impl Into<String>) -> Self {
        Self(serialized.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque entity key.
///
/// Any primitive int/long/string or typed-message id is representable here;
/// `EntityId` stores the deterministic serialized form plus the entity's
/// `type_url` so that ids from different entity classes never collide even
/// if their serialized bytes happen to match (§3: "comparison uses the
/// serialized form").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    type_url: String,
    serialized: Vec<u8>,
}

impl EntityId {
    pub fn new(type_url: impl Into<String>, serialized: impl Into<Vec<u8>>) -> Self {
        Self {
            type_url: type_url.into(),
            serialized: serialized.into(),
        }
    }

    /// Build an `EntityId` from anything serializable, using its JSON
    /// encoding as the deterministic serialized form. Good enough for ids
    /// that are plain integers or strings; typed-message ids should encode
    /// themselves via `new` instead.
    pub fn from_serde(type_url: impl Into<String>, value: &impl Serialize) -> Self {
        let serialized = serde_json::to_vec(value).expect("entity id is serializable");
        Self::new(type_url, serialized)
    }

    pub fn type_url(&self) -> &str {
        &self.type_url
    }

    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.type_url,
            String::from_utf8_lossy(&self.serialized)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_with_same_bytes_differ_by_type() {
        let a = EntityId::new("calc", b"1".to_vec());
        let b = EntityId::new("ledger", b"1".to_vec());
        assert_ne!(a, b);
    }

    #[test]
    fn entity_ids_from_serde_are_deterministic() {
        let a = EntityId::from_serde("calc", &42u64);
        let b = EntityId::from_serde("calc", &42u64);
        assert_eq!(a, b);
    }

    #[test]
    fn signal_ids_are_unique() {
        assert_ne!(SignalId::new(), SignalId::new());
    }
}
