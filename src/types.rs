//! Newtype wrappers for domain identifiers.
//!
//! These prevent accidental mixing of identifier kinds (e.g. using a
//! gateway event id where a database row id is expected) and make call
//! sites self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The sender-assigned identifier of one webhook delivery.
///
/// This is the deduplication key: the gateway may deliver the same event
/// more than once, but every delivery of the same logical event carries
/// the same `EventId`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(s: impl Into<String>) -> Self {
        EventId(s.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty event id is invalid and must be rejected at ingestion.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        EventId(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_display_is_raw() {
        let id = EventId::new("evt-123");
        assert_eq!(id.to_string(), "evt-123");
        assert_eq!(id.as_str(), "evt-123");
    }

    #[test]
    fn event_id_empty() {
        assert!(EventId::new("").is_empty());
        assert!(!EventId::new("x").is_empty());
    }
}
