//! Aggregate health endpoint.
//!
//! Combines store statistics with a short-timeout probe of the gateway
//! device. Always answers 200: a broken store or unreachable gateway is
//! reported inside the body, so monitors can distinguish "relay down"
//! (no response) from "relay up, dependency degraded".

use axum::Json;
use axum::extract::State;
use serde_json::json;

use super::AppState;

/// Health check handler.
///
/// # Example
///
/// ```ignore
/// GET /api/health HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: application/json
///
/// {
///   "status": "ok",
///   "server": "running",
///   "store": {"total": 12, "unprocessed": 3, "processed": 9},
///   "gateway": {"status": "pass", "version": "1.2.3"}
/// }
/// ```
pub async fn health_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let mut result = json!({
        "status": "ok",
        "server": "running",
    });

    match app_state.store().stats() {
        Ok(stats) => {
            result["store"] = serde_json::to_value(stats).unwrap_or_default();
        }
        Err(e) => {
            result["store"] = json!({ "error": e.to_string() });
        }
    }

    // The client caps this probe at a few seconds, so a dead device
    // cannot stall the endpoint.
    match app_state.gateway().check_health().await {
        Ok(health) => {
            result["gateway"] = json!({
                "status": health.status,
                "version": health.version,
            });
        }
        Err(e) => {
            result["gateway"] = json!({
                "status": "unreachable",
                "error": e.to_string(),
            });
        }
    }

    Json(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayClient;
    use crate::store::{NewMessage, Store};
    use crate::types::EventId;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn health_reports_stats_and_unreachable_gateway() {
        let store = Store::open_in_memory().unwrap();
        store
            .save(&NewMessage {
                event_id: EventId::new("evt-1"),
                message_id: "m1".into(),
                device_id: "dev-1".into(),
                phone_number: "+15550001".into(),
                message: "hi".into(),
                sim_number: 1,
                received_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            })
            .unwrap();

        // Nothing listens on this port, so the probe fails fast.
        let gateway = GatewayClient::new("http://127.0.0.1:1", "u", "p").unwrap();
        let state = AppState::new(store, gateway, "");

        let Json(body) = health_handler(State(state)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["server"], "running");
        assert_eq!(body["store"]["total"], 1);
        assert_eq!(body["store"]["unprocessed"], 1);
        assert_eq!(body["gateway"]["status"], "unreachable");
    }
}
