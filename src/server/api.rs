//! REST handlers over the message log.
//!
//! Query parameters are parsed permissively: an unparseable `since`,
//! `before`, `processed`, `limit`, or `offset` is ignored rather than
//! rejected, matching how dashboards and shell scripts actually call
//! these endpoints. Path ids are strict - a non-numeric id is a client
//! error.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

use super::AppState;
use crate::gateway::{GatewayError, MessageState};
use crate::store::{ListFilter, ReceivedMessage, StoreError};

/// Errors surfaced by the REST handlers.
///
/// Four distinct classes per the error design: client mistakes (400),
/// not-found (404), local storage faults (500), and upstream gateway
/// faults (502). Storage detail never leaks to the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid id")]
    InvalidId,

    #[error("invalid json")]
    InvalidJson,

    #[error("phoneNumber and message are required")]
    MissingSendFields,

    #[error("not found")]
    NotFound,

    #[error("database error")]
    Store(#[source] StoreError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Store(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidId | ApiError::InvalidJson | ApiError::MissingSendFields => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Store(e) => {
                error!(error = %e, "store operation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Gateway(e) => {
                error!(error = %e, "gateway call failed");
                StatusCode::BAD_GATEWAY
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Raw query parameters for `GET /api/messages`.
///
/// Everything arrives as strings so bad values can fall back to "filter
/// not applied" instead of a 400 from the extractor.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    phone: Option<String>,
    since: Option<String>,
    before: Option<String>,
    processed: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> ListFilter {
        ListFilter {
            phone: self.phone.filter(|v| !v.is_empty()),
            since: parse_time_param(self.since),
            before: parse_time_param(self.before),
            processed: self
                .processed
                .filter(|v| !v.is_empty())
                .map(|v| v == "true" || v == "1"),
            limit: parse_int_param(self.limit).filter(|n| *n > 0),
            offset: parse_int_param(self.offset).filter(|n| *n >= 0),
        }
    }
}

fn parse_time_param(v: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    v.and_then(|v| chrono::DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

fn parse_int_param(v: Option<String>) -> Option<i64> {
    v.and_then(|v| v.parse().ok())
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse().map_err(|_| ApiError::InvalidId)
}

/// `GET /api/messages` - list messages matching the filter.
///
/// An empty result is a valid `[]`, never an error.
pub async fn list_messages_handler(
    State(app_state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ReceivedMessage>>, ApiError> {
    let messages = app_state.store().list(&query.into_filter())?;
    Ok(Json(messages))
}

/// `GET /api/messages/{id}` - fetch one message.
pub async fn get_message_handler(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReceivedMessage>, ApiError> {
    let id = parse_id(&id)?;
    match app_state.store().get(id)? {
        Some(msg) => Ok(Json(msg)),
        None => Err(ApiError::NotFound),
    }
}

/// `POST /api/messages/{id}/processed` - acknowledge one message.
pub async fn mark_processed_handler(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;
    app_state.store().mark_processed(id)?;
    Ok(Json(json!({ "status": "ok" })))
}

/// `DELETE /api/messages/{id}/processed` - retract an acknowledgement.
pub async fn mark_unprocessed_handler(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;
    app_state.store().mark_unprocessed(id)?;
    Ok(Json(json!({ "status": "ok" })))
}

/// `POST /api/messages/processed` - acknowledge everything at once.
pub async fn mark_all_processed_handler(
    State(app_state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = app_state.store().mark_all_processed()?;
    Ok(Json(json!({ "status": "ok", "updated": updated })))
}

/// Body of `POST /api/send`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendRequest {
    pub phone_number: String,
    pub message: String,
}

/// `POST /api/send` - relay a send request to the outbound gateway.
///
/// Gateway failures come back as 502, distinct from local storage
/// errors.
pub async fn send_handler(
    State(app_state): State<AppState>,
    body: Bytes,
) -> Result<Json<MessageState>, ApiError> {
    let req: SendRequest = serde_json::from_slice(&body).map_err(|_| ApiError::InvalidJson)?;
    if req.phone_number.is_empty() || req.message.is_empty() {
        return Err(ApiError::MissingSendFields);
    }

    let state = app_state
        .gateway()
        .send(&req.phone_number, &req.message)
        .await?;

    info!(id = %state.id, to = %req.phone_number, "SMS sent");
    Ok(Json(state))
}
