//! Webhook endpoint handler.
//!
//! Accepts pushes from the gateway device, verifies the signature when a
//! secret is configured, and commits `sms:received` events to the store.
//! Duplicate deliveries are absorbed by the store's uniqueness
//! constraints, so retries always see a success acknowledgement.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::store::StoreError;
use crate::webhooks::envelope::{NormalizeError, PushEnvelope};
use crate::webhooks::verify_signature;

/// Header carrying the hex HMAC-SHA256 digest.
const HEADER_SIGNATURE: &str = "x-signature";
/// Header carrying the timestamp bound into the MAC.
const HEADER_TIMESTAMP: &str = "x-timestamp";

/// Errors that can occur when processing a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing or mismatched signature.
    #[error("invalid signature")]
    InvalidSignature,

    /// The body is not valid JSON.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Parsed fine but missing data we refuse to store without.
    #[error("{0}")]
    Invalid(#[from] NormalizeError),

    /// The store rejected the write. Reported opaquely; detail stays in
    /// the logs.
    #[error("storage error")]
    Store(#[from] StoreError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidJson(_) | WebhookError::Invalid(_) => StatusCode::BAD_REQUEST,
            WebhookError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST (mounted at `/` and `/webhook`)
/// - Headers (when a secret is configured):
///   - `X-Signature`: hex HMAC-SHA256 over `timestamp + "." + body`
///   - `X-Timestamp`: the timestamp bound into the MAC
/// - Body: JSON push envelope
///
/// # Response
///
/// - 200 `{"status":"stored","eventId":...}` - event committed (or
///   silently deduplicated; retries are indistinguishable from first
///   delivery by design)
/// - 200 `{"status":"ignored","event":...}` - non-`sms:received` event
/// - 400: invalid JSON or missing required fields
/// - 401: signature verification failed
/// - 500: storage failure
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, WebhookError> {
    // Verify the signature BEFORE any parsing; unauthenticated requests
    // should not reach the JSON decoder.
    if let Some(secret) = app_state.webhook_secret() {
        let signature = header_str(&headers, HEADER_SIGNATURE);
        let timestamp = header_str(&headers, HEADER_TIMESTAMP);
        if !verify_signature(&body, signature, timestamp, secret) {
            warn!("webhook signature verification failed");
            return Err(WebhookError::InvalidSignature);
        }
    }

    let envelope: PushEnvelope = serde_json::from_slice(&body)?;

    // Other event types are acknowledged without storage; they are out
    // of scope for persistence but not errors.
    if !envelope.is_sms_received() {
        debug!(event = %envelope.event, "ignoring non-sms event");
        return Ok(Json(json!({ "status": "ignored", "event": envelope.event })));
    }

    let msg = envelope.into_message(Utc::now())?;

    if let Err(e) = app_state.store().save(&msg) {
        error!(error = %e, event_id = %msg.event_id, "saving message");
        return Err(WebhookError::Store(e));
    }

    info!(
        event_id = %msg.event_id,
        from = %msg.phone_number,
        preview = %preview(&msg.message, 40),
        "message received"
    );

    Ok(Json(json!({ "status": "stored", "eventId": msg.event_id })))
}

/// Extracts a header value, treating absent or non-UTF-8 values as empty
/// (an empty signature or timestamp never verifies).
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Shortens a message body for log lines.
fn preview(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayClient;
    use crate::store::{ListFilter, Store};
    use crate::webhooks::compute_signature;

    const SECRET: &str = "test-secret";

    fn state_with_secret(secret: &str) -> AppState {
        let store = Store::open_in_memory().unwrap();
        let gateway = GatewayClient::new("http://127.0.0.1:1", "u", "p").unwrap();
        AppState::new(store, gateway, secret)
    }

    fn push_body(event_id: &str) -> String {
        json!({
            "deviceId": "dev-1",
            "event": "sms:received",
            "id": event_id,
            "webhookId": "wh-1",
            "payload": {
                "messageId": "m1",
                "message": "hello",
                "phoneNumber": "+1555000111",
                "receivedAt": "2024-01-01T00:00:00Z"
            }
        })
        .to_string()
    }

    fn signed_headers(body: &str, secret: &str) -> HeaderMap {
        let ts = "1700000000";
        let sig = compute_signature(body.as_bytes(), ts, secret);
        let mut headers = HeaderMap::new();
        headers.insert("x-signature", sig.parse().unwrap());
        headers.insert("x-timestamp", ts.parse().unwrap());
        headers
    }

    async fn deliver(
        state: &AppState,
        headers: HeaderMap,
        body: &str,
    ) -> Result<Json<serde_json::Value>, WebhookError> {
        webhook_handler(
            State(state.clone()),
            headers,
            Bytes::from(body.to_string()),
        )
        .await
    }

    #[tokio::test]
    async fn signed_push_is_stored() {
        let state = state_with_secret(SECRET);
        let body = push_body("evt-1");

        let Json(resp) = deliver(&state, signed_headers(&body, SECRET), &body)
            .await
            .unwrap();
        assert_eq!(resp["status"], "stored");
        assert_eq!(resp["eventId"], "evt-1");

        let stored = state.store().list(&ListFilter::default()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].phone_number, "+1555000111");
        assert!(!stored[0].processed);
    }

    #[tokio::test]
    async fn duplicate_delivery_still_acknowledged() {
        let state = state_with_secret(SECRET);
        let body = push_body("evt-1");

        deliver(&state, signed_headers(&body, SECRET), &body)
            .await
            .unwrap();
        let Json(resp) = deliver(&state, signed_headers(&body, SECRET), &body)
            .await
            .unwrap();

        // The retry is acknowledged exactly like the first delivery.
        assert_eq!(resp["status"], "stored");
        assert_eq!(state.store().list(&ListFilter::default()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bad_signature_is_unauthorized() {
        let state = state_with_secret(SECRET);
        let body = push_body("evt-1");

        let err = deliver(&state, signed_headers(&body, "wrong-secret"), &body)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidSignature));
        assert!(state.store().list(&ListFilter::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_signature_headers_are_unauthorized() {
        let state = state_with_secret(SECRET);
        let body = push_body("evt-1");

        let err = deliver(&state, HeaderMap::new(), &body).await.unwrap_err();
        assert!(matches!(err, WebhookError::InvalidSignature));
    }

    #[tokio::test]
    async fn no_secret_skips_verification() {
        let state = state_with_secret("");
        let body = push_body("evt-1");

        let Json(resp) = deliver(&state, HeaderMap::new(), &body).await.unwrap();
        assert_eq!(resp["status"], "stored");
    }

    #[tokio::test]
    async fn non_sms_event_is_acknowledged_without_storage() {
        let state = state_with_secret("");
        let body = json!({"event": "system:ping", "id": "evt-1"}).to_string();

        let Json(resp) = deliver(&state, HeaderMap::new(), &body).await.unwrap();
        assert_eq!(resp["status"], "ignored");
        assert_eq!(resp["event"], "system:ping");
        assert!(state.store().list(&ListFilter::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_required_fields_are_client_errors() {
        let state = state_with_secret("");
        let body = json!({
            "event": "sms:received",
            "payload": {"phoneNumber": "+1555000111"}
        })
        .to_string();

        let err = deliver(&state, HeaderMap::new(), &body).await.unwrap_err();
        assert!(matches!(
            err,
            WebhookError::Invalid(NormalizeError::MissingEventId)
        ));
    }

    #[tokio::test]
    async fn invalid_json_is_a_client_error() {
        let state = state_with_secret("");
        let err = deliver(&state, HeaderMap::new(), "{not json")
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidJson(_)));
    }

    #[test]
    fn preview_truncates_long_bodies() {
        assert_eq!(preview("short", 40), "short");
        let long = "x".repeat(50);
        let p = preview(&long, 40);
        assert_eq!(p.chars().count(), 40);
        assert!(p.ends_with("..."));
    }
}
