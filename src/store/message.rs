//! Row and query types for the message log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::EventId;

/// A received SMS as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessage {
    /// Store-assigned row id. Assigned once at creation, never reused.
    pub id: i64,
    /// Gateway-assigned delivery id; unique, the dedup key.
    pub event_id: EventId,
    /// The gateway's logical message id. Not unique across retries.
    pub message_id: String,
    pub device_id: String,
    pub phone_number: String,
    pub message: String,
    pub sim_number: i64,
    /// When the device claims the SMS arrived, normalized to UTC.
    pub received_at: DateTime<Utc>,
    /// When this row was written.
    pub created_at: DateTime<Utc>,
    /// Consumer-controlled acknowledgement flag.
    pub processed: bool,
}

/// A message accepted from the webhook but not yet written.
///
/// `id`, `created_at`, and `processed` are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub event_id: EventId,
    pub message_id: String,
    pub device_id: String,
    pub phone_number: String,
    pub message: String,
    pub sim_number: i64,
    pub received_at: DateTime<Utc>,
}

/// Optional predicates for [`Store::list`](super::Store::list), combined
/// as a conjunction. `Default` is "no filter": the 100 most recent rows.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Exact match on `phone_number`.
    pub phone: Option<String>,
    /// Inclusive lower bound on `received_at`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `received_at`.
    pub before: Option<DateTime<Utc>>,
    /// Exact match on the processed flag.
    pub processed: Option<bool>,
    /// Maximum rows returned; non-positive or unset falls back to 100.
    pub limit: Option<i64>,
    /// Rows skipped; non-positive or unset falls back to 0.
    pub offset: Option<i64>,
}

impl ListFilter {
    pub(super) fn effective_limit(&self) -> i64 {
        match self.limit {
            Some(n) if n > 0 => n,
            _ => 100,
        }
    }

    pub(super) fn effective_offset(&self) -> i64 {
        match self.offset {
            Some(n) if n > 0 => n,
            _ => 0,
        }
    }
}

/// Summary counts over the message log, computed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: i64,
    pub unprocessed: i64,
    pub processed: i64,
}
