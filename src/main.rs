use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sms_relay::config::Config;
use sms_relay::gateway::GatewayClient;
use sms_relay::server::{self, AppState, SHUTDOWN_GRACE};
use sms_relay::store::Store;
use sms_relay::webhooks::EVENT_SMS_RECEIVED;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sms_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Config path: first CLI argument, else the per-user default.
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(Config::default_path)
        .ok_or("cannot determine a config path")?;

    let cfg = Config::load_or_default(&config_path)?;
    cfg.validate()?;

    let db_path = cfg.db_path();
    info!(path = %db_path.display(), "opening database");
    let store = Store::open(&db_path)?;

    let gateway = GatewayClient::new(
        &cfg.gateway.url,
        &cfg.gateway.username,
        &cfg.gateway.password,
    )?;

    // One-shot, best-effort: a failure here must not keep the relay from
    // accepting pushes the gateway is already configured to send.
    if cfg.server.auto_register && !cfg.server.webhook_url.is_empty() {
        if let Err(e) = auto_register_webhook(&gateway, &cfg.server.webhook_url).await {
            warn!(error = %e, "auto-register webhook failed");
        }
    }

    let state = AppState::new(store, gateway, cfg.server.webhook_secret.clone());
    let router = server::build_router(state);

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    let addr = cfg.listen_addr();
    if let Some((cert, key)) = cfg.tls_paths() {
        let addr: SocketAddr = addr.parse()?;
        info!(%addr, "server starting (TLS)");
        server::serve_tls(addr, &cert, &key, router, shutdown, SHUTDOWN_GRACE).await?;
    } else {
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(addr = %listener.local_addr()?, "server starting");
        server::serve(listener, router, shutdown, SHUTDOWN_GRACE).await?;
    }

    info!("server stopped");
    Ok(())
}

/// Cancels `shutdown` on SIGINT or (on unix) SIGTERM.
fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!(error = %e, "installing ctrl-c handler failed");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "installing SIGTERM handler failed");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received ctrl-c"),
            _ = terminate => info!("received SIGTERM"),
        }
        shutdown.cancel();
    });
}

/// Registers our webhook with the gateway unless an identical
/// registration already exists.
async fn auto_register_webhook(
    gateway: &GatewayClient,
    webhook_url: &str,
) -> sms_relay::gateway::Result<()> {
    let hooks = gateway.list_webhooks().await?;

    if let Some(hook) = hooks
        .iter()
        .find(|h| h.url == webhook_url && h.event == EVENT_SMS_RECEIVED)
    {
        info!(id = %hook.id, url = %hook.url, "webhook already registered");
        return Ok(());
    }

    let hook = gateway
        .register_webhook(webhook_url, EVENT_SMS_RECEIVED)
        .await?;
    info!(id = %hook.id, url = %hook.url, event = %hook.event, "webhook registered");
    Ok(())
}
