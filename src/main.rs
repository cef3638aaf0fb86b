//! Live Feed Sync - Entry Point
//!
//! Headless runner for the dashboard sync layer. Opens the standard
//! feeds against a configured backend and logs every view change.
//! Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config (SYNC_CONFIG or config.toml) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Seed the session from SYNC_TOKEN
//! 4. Create ApiGateway (timeout + auth expiry + error normalization)
//! 5. Create StreamClient (WebSocket channels, fixed reconnect)
//! 6. Open signals / logs / decisions / opportunities / tickers feeds
//! 7. Spawn health server (/live + /ready + /metrics)
//! 8. Refresh ticker channels from the connected-exchange list
//! 9. Wait for SIGINT → close every feed → exit

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use live_feed_sync::adapters::api::{ApiGateway, GatewayConfig, HeadlessNavigator};
use live_feed_sync::adapters::feeds::StreamClient;
use live_feed_sync::adapters::metrics::{HealthServer, HealthState, SyncMetrics};
use live_feed_sync::config::{self, FeedsConfig};
use live_feed_sync::domain::SessionStore;
use live_feed_sync::usecases::{FeedContext, ViewReconciler, feeds};

const CONFIG_ENV: &str = "SYNC_CONFIG";
const TOKEN_ENV: &str = "SYNC_TOKEN";

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.app.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.app.name,
        version = env!("CARGO_PKG_VERSION"),
        api = %config.api.base_url,
        stream = %config.stream.base_url,
        "Starting live feed sync"
    );

    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 3. Session from env ─────────────────────────────────
    let session = match std::env::var(TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => SessionStore::with_token(token.trim()),
        _ => {
            warn!(env = TOKEN_ENV, "No session token, calls will be unauthenticated");
            SessionStore::new()
        }
    };
    let navigator = Arc::new(HeadlessNavigator::new());
    let metrics = Arc::new(SyncMetrics::new().context("Failed to register metrics")?);

    // ── 4. Request gateway ──────────────────────────────────
    let gateway_config = GatewayConfig {
        base_url: config.api.base_url.clone(),
        timeout: config.api.timeout(),
        slow_timeout: config.api.slow_timeout(),
    };
    let gateway = Arc::new(
        ApiGateway::new(gateway_config, session.clone(), navigator)
            .context("Failed to create API gateway")?
            .with_metrics(Arc::clone(&metrics)),
    );

    // ── 5. Stream client ────────────────────────────────────
    let streams = StreamClient::websocket(&config.stream.base_url, session.clone())
        .context("Failed to create stream client")?
        .with_reconnect_interval(config.stream.reconnect_interval())
        .with_metrics(Arc::clone(&metrics));

    let ctx = FeedContext::new(Arc::clone(&gateway), streams).with_metrics(Arc::clone(&metrics));

    // ── 6. Standard feeds ───────────────────────────────────
    let mut views = vec![
        ViewReconciler::open(feeds::signals(config.feeds.signals_capacity), &ctx),
        ViewReconciler::open(feeds::logs(config.feeds.logs_capacity), &ctx),
        ViewReconciler::open(feeds::decisions(), &ctx),
        ViewReconciler::open(feeds::opportunities(), &ctx),
    ];
    let mut tickers = ViewReconciler::open(feeds::tickers::<&str>(&[]), &ctx);

    let watchers: Vec<_> = views
        .iter()
        .chain(std::iter::once(&tickers))
        .map(|view| spawn_view_logger(view, shutdown_tx.subscribe()))
        .collect();

    // ── 7. Health server ────────────────────────────────────
    let health_handle = if config.metrics.enabled {
        let server = HealthServer::new(
            HealthState::new(session.clone(), Arc::clone(&metrics)),
            config.metrics.bind_address.clone(),
        );
        let health_shutdown = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(health_shutdown).await {
                error!(error = %e, "Health server failed");
            }
        }))
    } else {
        None
    };

    info!(feeds = views.len() + 1, "All feeds opened, sync is running");

    // ── 8. Ticker refresh loop until SIGINT ─────────────────
    refresh_tickers(&config.feeds, &gateway, &mut tickers, async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            return;
        }
        info!("SIGINT received, initiating graceful shutdown");
    })
    .await;

    // ── Graceful shutdown ───────────────────────────────────
    let _ = shutdown_tx.send(());
    info!("Shutdown signal broadcast to all tasks");

    for view in &mut views {
        view.close();
    }
    tickers.close();

    for watcher in watchers {
        let _ = tokio::time::timeout(Duration::from_secs(5), watcher).await;
    }
    if let Some(handle) = health_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Re-derive the ticker channel set on a fixed period until `shutdown`
/// resolves, including while a refresh call is in flight.
async fn refresh_tickers(
    feeds_config: &FeedsConfig,
    gateway: &ApiGateway,
    tickers: &mut ViewReconciler,
    shutdown: impl Future<Output = ()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(feeds_config.exchange_refresh_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => break,
            _ = interval.tick() => {}
        }

        let response = tokio::select! {
            biased;
            () = &mut shutdown => break,
            response = gateway.get(&feeds_config.exchanges_path) => response,
        };
        match response {
            Ok(response) => {
                let channels = feeds::exchange_channels(&response);
                let diff = tickers.set_channels(channels);
                if !diff.is_empty() {
                    info!(
                        added = ?diff.added.iter().map(ToString::to_string).collect::<Vec<_>>(),
                        removed = ?diff.removed.iter().map(ToString::to_string).collect::<Vec<_>>(),
                        "Ticker channels changed"
                    );
                }
            }
            Err(e) => warn!(error = %e, "Exchange list refresh failed"),
        }
    }

    info!("Ticker refresh stopped");
}

/// Log every published revision of one view until shutdown.
fn spawn_view_logger(
    view: &ViewReconciler,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    let name = view.name().to_string();
    let mut rx = view.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = rx.borrow_and_update().clone();
                    match &state.error {
                        Some(e) => warn!(feed = %name, error = %e, "Feed error"),
                        None => info!(
                            feed = %name,
                            entries = state.data.len(),
                            loading = state.loading,
                            revision = state.revision,
                            "Feed updated"
                        ),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_refresh_stops_during_stalled_call() {
        // Accepts TCP connections (kernel backlog) but never answers.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let session = SessionStore::new();
        let gateway_config = GatewayConfig {
            base_url: base,
            ..GatewayConfig::default()
        };
        let gateway = Arc::new(
            ApiGateway::new(gateway_config, session.clone(), Arc::new(HeadlessNavigator::new()))
                .unwrap(),
        );
        let streams = StreamClient::websocket("ws://127.0.0.1:9", session).unwrap();
        let ctx = FeedContext::new(Arc::clone(&gateway), streams);
        let mut tickers = ViewReconciler::open(feeds::tickers::<&str>(&[]), &ctx);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = stop_tx.send(());
        });

        let started = Instant::now();
        let shutdown = async {
            let _ = stop_rx.await;
        };
        let finished = tokio::time::timeout(
            Duration::from_secs(5),
            refresh_tickers(&FeedsConfig::default(), &gateway, &mut tickers, shutdown),
        )
        .await;

        assert!(finished.is_ok(), "refresh loop ignored shutdown");
        assert!(started.elapsed() < Duration::from_secs(5));
        tickers.close();
    }
}
