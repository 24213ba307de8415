//! Strongly-typed identifiers for Strategy Brain entities
//!
//! Decisions and insight applications are minted here (UUID-based).
//! Channels and insights come from an external catalog, so their ids
//! wrap the catalog's own string keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a decision
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DecisionId(Uuid);

impl DecisionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decision:{}", self.0)
    }
}

/// Identifier for a budget-bearing channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel:{}", self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier for a learned insight
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InsightId(String);

impl InsightId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InsightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "insight:{}", self.0)
    }
}

impl From<&str> for InsightId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier for one application of an insight by a decision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(Uuid);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "application:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_id_generation() {
        let id1 = DecisionId::generate();
        let id2 = DecisionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("decision:"));
    }

    #[test]
    fn test_catalog_ids_display() {
        assert_eq!(ChannelId::new("email").to_string(), "channel:email");
        assert_eq!(InsightId::from("tuesday-open-rate").to_string(), "insight:tuesday-open-rate");
    }

    #[test]
    fn test_channel_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&ChannelId::new("paid-social")).unwrap();
        assert_eq!(json, "\"paid-social\"");
    }
}
