//! Typed client for the device's gateway API.
//!
//! The gateway (the Android device) is an opaque remote service; this
//! client covers the handful of calls the relay makes against it:
//! sending a message, probing health, and managing webhook
//! registrations. Every call carries an explicit timeout so a stalled
//! device can never wedge one of our own handlers - the health probe in
//! particular stays short because `/api/health` waits on it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sending can legitimately take a while on a flaky cell connection.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);
/// The health probe serves our own health endpoint; keep it short.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from talking to the gateway device.
///
/// These are upstream faults, surfaced to API callers as 502 - never
/// conflated with local storage errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport-level failure (unreachable, timeout, TLS, bad JSON).
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a non-success status.
    #[error("gateway returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    text_message: TextMessage,
    phone_numbers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct TextMessage {
    text: String,
}

/// State of a sent message as reported by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageState {
    pub id: String,
    pub state: String,
    pub recipients: Vec<RecipientState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecipientState {
    pub phone_number: String,
    pub state: String,
}

/// A webhook registration on the device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Webhook {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub url: String,
    pub event: String,
}

/// Gateway liveness/version as reported by its `/health` endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceHealth {
    pub status: String,
    pub version: String,
}

/// HTTP client for the gateway API, authenticated with basic auth.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl GatewayClient {
    /// Creates a client for the gateway at `base_url` (trailing slashes
    /// tolerated).
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(GatewayClient {
            http,
            base_url,
            username: username.into(),
            password: password.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a text message to a single recipient.
    pub async fn send(&self, phone_number: &str, text: &str) -> Result<MessageState> {
        let req = SendMessageRequest {
            text_message: TextMessage { text: text.into() },
            phone_numbers: vec![phone_number.into()],
        };
        let resp = self
            .http
            .post(self.url("/message"))
            .basic_auth(&self.username, Some(&self.password))
            .timeout(SEND_TIMEOUT)
            .json(&req)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Probes the gateway's health endpoint.
    pub async fn check_health(&self) -> Result<DeviceHealth> {
        let resp = self
            .http
            .get(self.url("/health"))
            .basic_auth(&self.username, Some(&self.password))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Lists the webhooks registered on the device.
    pub async fn list_webhooks(&self) -> Result<Vec<Webhook>> {
        let resp = self
            .http
            .get(self.url("/webhooks"))
            .basic_auth(&self.username, Some(&self.password))
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Registers a webhook for `event` pointing at `url`.
    pub async fn register_webhook(&self, url: &str, event: &str) -> Result<Webhook> {
        let hook = Webhook {
            id: String::new(),
            url: url.into(),
            event: event.into(),
        };
        let resp = self
            .http
            .post(self.url("/webhooks"))
            .basic_auth(&self.username, Some(&self.password))
            .timeout(WEBHOOK_TIMEOUT)
            .json(&hook)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Deletes a webhook registration by id.
    pub async fn delete_webhook(&self, id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/webhooks/{id}")))
            .basic_auth(&self.username, Some(&self.password))
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(GatewayError::Status { status, body })
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
