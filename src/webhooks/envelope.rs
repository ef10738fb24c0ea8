//! The gateway's push envelope and its normalization.
//!
//! Every webhook POST carries the same envelope regardless of event
//! type; only `sms:received` events are persisted. All fields are
//! defaulted so a sparse payload deserializes rather than erroring -
//! required fields are enforced during normalization, not parsing.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::store::{NewMessage, timestamp};
use crate::types::EventId;

/// Event type the gateway sends for an inbound SMS.
pub const EVENT_SMS_RECEIVED: &str = "sms:received";

/// The webhook POST body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushEnvelope {
    pub device_id: String,
    /// Event type, e.g. `sms:received` or `system:ping`.
    pub event: String,
    /// Sender-assigned delivery identifier; the dedup key.
    pub id: EventId,
    pub webhook_id: String,
    pub payload: MessagePayload,
}

/// The `payload` object of an `sms:received` envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagePayload {
    pub message_id: String,
    pub message: String,
    pub phone_number: String,
    pub sim_number: i64,
    /// Timestamp string as claimed by the device; parsed leniently.
    pub received_at: String,
}

/// Reasons an envelope cannot be normalized into a storable message.
///
/// These are client errors: the push was authenticated and parsed but is
/// missing data we refuse to store without.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("missing event id")]
    MissingEventId,

    #[error("missing phone number")]
    MissingPhoneNumber,
}

impl PushEnvelope {
    /// Whether this envelope announces an inbound SMS (the only event
    /// type that gets stored).
    pub fn is_sms_received(&self) -> bool {
        self.event == EVENT_SMS_RECEIVED
    }

    /// Normalizes the envelope into a [`NewMessage`].
    ///
    /// An unparseable `receivedAt` falls back to `now` instead of
    /// rejecting the event - a format mismatch must not lose the
    /// delivery. The fallback is logged so upstream clock or format
    /// problems stay visible. A `simNumber` of zero (the gateway's
    /// "absent") becomes 1.
    pub fn into_message(self, now: DateTime<Utc>) -> Result<NewMessage, NormalizeError> {
        if self.id.is_empty() {
            return Err(NormalizeError::MissingEventId);
        }
        if self.payload.phone_number.is_empty() {
            return Err(NormalizeError::MissingPhoneNumber);
        }

        let received_at = match timestamp::parse_claimed(&self.payload.received_at) {
            Some(dt) => dt,
            None => {
                warn!(
                    event_id = %self.id,
                    value = %self.payload.received_at,
                    "unparseable receivedAt, falling back to ingestion time"
                );
                now
            }
        };

        let sim_number = if self.payload.sim_number == 0 {
            1
        } else {
            self.payload.sim_number
        };

        Ok(NewMessage {
            event_id: self.id,
            message_id: self.payload.message_id,
            device_id: self.device_id,
            phone_number: self.payload.phone_number,
            message: self.payload.message,
            sim_number,
            received_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn deserializes_full_envelope() {
        let body = r#"{
            "deviceId": "dev-1",
            "event": "sms:received",
            "id": "evt-1",
            "webhookId": "wh-1",
            "payload": {
                "messageId": "m1",
                "message": "hello",
                "phoneNumber": "+1555000111",
                "simNumber": 2,
                "receivedAt": "2024-01-01T00:00:00Z"
            }
        }"#;
        let env: PushEnvelope = serde_json::from_str(body).unwrap();
        assert!(env.is_sms_received());
        assert_eq!(env.id, EventId::new("evt-1"));
        assert_eq!(env.payload.sim_number, 2);
    }

    #[test]
    fn missing_fields_default_rather_than_error() {
        let env: PushEnvelope = serde_json::from_str(r#"{"event":"system:ping"}"#).unwrap();
        assert!(!env.is_sms_received());
        assert!(env.id.is_empty());
        assert_eq!(env.payload.sim_number, 0);
    }

    #[test]
    fn normalizes_claimed_timestamp_to_utc() {
        let env = PushEnvelope {
            event: EVENT_SMS_RECEIVED.into(),
            id: EventId::new("evt-1"),
            payload: MessagePayload {
                phone_number: "+1555000111".into(),
                received_at: "2024-01-01T02:00:00+02:00".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let msg = env.into_message(now()).unwrap();
        assert_eq!(
            msg.received_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn unparseable_received_at_falls_back_to_now() {
        let env = PushEnvelope {
            event: EVENT_SMS_RECEIVED.into(),
            id: EventId::new("evt-1"),
            payload: MessagePayload {
                phone_number: "+1555000111".into(),
                received_at: "last tuesday".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let msg = env.into_message(now()).unwrap();
        assert_eq!(msg.received_at, now());
    }

    #[test]
    fn sim_number_zero_defaults_to_one() {
        let env = PushEnvelope {
            event: EVENT_SMS_RECEIVED.into(),
            id: EventId::new("evt-1"),
            payload: MessagePayload {
                phone_number: "+1555000111".into(),
                sim_number: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(env.into_message(now()).unwrap().sim_number, 1);
    }

    #[test]
    fn rejects_empty_event_id() {
        let env = PushEnvelope {
            event: EVENT_SMS_RECEIVED.into(),
            payload: MessagePayload {
                phone_number: "+1555000111".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            env.into_message(now()),
            Err(NormalizeError::MissingEventId)
        );
    }

    #[test]
    fn rejects_empty_phone_number() {
        let env = PushEnvelope {
            event: EVENT_SMS_RECEIVED.into(),
            id: EventId::new("evt-1"),
            ..Default::default()
        };
        assert_eq!(
            env.into_message(now()),
            Err(NormalizeError::MissingPhoneNumber)
        );
    }
}
