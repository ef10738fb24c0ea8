//! HTTP server for the SMS relay.
//!
//! This module implements the HTTP server that:
//! - Accepts signed webhook pushes from the gateway device and commits
//!   them idempotently to the message store
//! - Exposes the REST API consumers use to read back and acknowledge
//!   messages
//! - Reports aggregate health (store stats + gateway reachability)
//!
//! # Endpoints
//!
//! - `POST /` and `POST /webhook` - Inbound event push
//! - `GET /api/messages` - List with filter query params
//! - `GET /api/messages/{id}` - Fetch one
//! - `POST /api/messages/{id}/processed` - Mark processed
//! - `DELETE /api/messages/{id}/processed` - Mark unprocessed
//! - `POST /api/messages/processed` - Mark all processed
//! - `POST /api/send` - Relay a send request to the gateway
//! - `GET /api/health` - Store stats + gateway health

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum_server::tls_rustls::RustlsConfig;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::gateway::GatewayClient;
use crate::store::Store;

pub mod api;
pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::webhook_handler;

/// Maximum accepted request body size (1 MiB). Larger pushes are
/// rejected without buffering past the cap.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// How long in-flight requests get to finish after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor. The
/// store and gateway client are injected here rather than living in
/// process-wide globals.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Store,
    gateway: GatewayClient,

    /// Shared secret for webhook signatures; empty disables verification.
    webhook_secret: String,
}

impl AppState {
    /// Creates a new `AppState` from the injected dependencies.
    pub fn new(store: Store, gateway: GatewayClient, webhook_secret: impl Into<String>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                store,
                gateway,
                webhook_secret: webhook_secret.into(),
            }),
        }
    }

    /// Returns the message store.
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// Returns the outbound gateway client.
    pub fn gateway(&self) -> &GatewayClient {
        &self.inner.gateway
    }

    /// Returns the webhook secret, or `None` when verification is
    /// disabled (trust-the-network mode).
    pub fn webhook_secret(&self) -> Option<&str> {
        let secret = self.inner.webhook_secret.as_str();
        if secret.is_empty() { None } else { Some(secret) }
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", post(webhook::webhook_handler))
        .route("/webhook", post(webhook::webhook_handler))
        .route("/api/messages", get(api::list_messages_handler))
        .route(
            "/api/messages/processed",
            post(api::mark_all_processed_handler),
        )
        .route("/api/messages/{id}", get(api::get_message_handler))
        .route(
            "/api/messages/{id}/processed",
            post(api::mark_processed_handler).delete(api::mark_unprocessed_handler),
        )
        .route("/api/send", post(api::send_handler))
        .route("/api/health", get(health::health_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(app_state)
}

/// Serves `router` on `listener` until `shutdown` is cancelled, then
/// waits up to `grace` for in-flight requests before closing them.
///
/// An overrun of the grace period is reported, not retried.
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> std::io::Result<()> {
    let token = shutdown.clone();
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        res = &mut server => res,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                grace_secs = grace.as_secs(),
                "graceful shutdown exceeded grace period, closing remaining connections"
            );
            Ok(())
        }
    }
}

/// Like [`serve`], but terminates TLS with the given PEM certificate and
/// key files.
pub async fn serve_tls(
    addr: SocketAddr,
    cert: &Path,
    key: &Path,
    router: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> std::io::Result<()> {
    let tls = RustlsConfig::from_pem_file(cert, key).await?;
    let handle = axum_server::Handle::new();

    let watcher = handle.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        // Stops accepting, then closes stragglers after the grace period.
        watcher.graceful_shutdown(Some(grace));
    });

    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(router.into_make_service())
        .await
}
