//! WealthWise sync daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   [[polls]] ──▶ PollingScheduler ──timer──▶ RequestGate ──▶ GuardedTransport ──▶ HttpTransport
//!                    │      ▲                  │  cache                │ breaker        │
//!                    │      └── settle ◀───────┘  in-flight            ▼                ▼
//!                    ▼                           throttle          ai service       backend
//!                 events ──▶ log
//!
//!   config watcher ──▶ apply_polls     admin API ──▶ scheduler / breakers
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use wealthwise_sync::admin::{self, AdminState};
use wealthwise_sync::config::watcher::ConfigWatcher;
use wealthwise_sync::config::{load_config, SyncConfig};
use wealthwise_sync::gate::RequestGate;
use wealthwise_sync::lifecycle::signals::shutdown_on_signal;
use wealthwise_sync::lifecycle::Shutdown;
use wealthwise_sync::observability::{logging, metrics};
use wealthwise_sync::resilience::CircuitBreakers;
use wealthwise_sync::scheduler::{apply_polls, PollEvent, PollingScheduler};
use wealthwise_sync::transport::http::HttpTransport;
use wealthwise_sync::transport::GuardedTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path: Option<PathBuf> = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SYNC_CONFIG").ok())
        .map(PathBuf::from);

    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => SyncConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "wealthwise-sync starting");
    tracing::info!(
        backend = %config.http.backend_url,
        ai = %config.http.ai_url,
        polls = config.polls.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let http = HttpTransport::new(&config.http)?;
    match std::env::var(&config.http.auth_token_env) {
        Ok(token) if !token.is_empty() => http.set_token(token),
        _ => tracing::warn!(
            env = %config.http.auth_token_env,
            "No auth token set, requests will be anonymous"
        ),
    }

    let breakers = CircuitBreakers::new(config.circuit_breaker.clone());
    let transport = Arc::new(GuardedTransport::new(http, breakers.clone()));
    let gate = RequestGate::new(config.gate.clone());
    let scheduler = PollingScheduler::new(
        transport,
        gate.clone(),
        &config.polling,
        Duration::from_millis(config.cache.default_ttl_ms),
    );

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let sweeper = gate.spawn_sweeper(
        Duration::from_secs(config.cache.sweep_interval_secs),
        shutdown.subscribe(),
    );

    let mut events = scheduler.events().subscribe();
    let mut stop = shutdown.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(PollEvent::Data { key, timestamp_ms, .. }) => {
                        tracing::info!(key = %key, timestamp_ms, "Data updated");
                    }
                    Ok(PollEvent::Error { key, error, paused, .. }) => {
                        tracing::warn!(key = %key, error = %error, kind = ?error.kind(), paused, "Poll error");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Event log lagging");
                    }
                    Err(_) => break,
                },
                _ = stop.recv() => break,
            }
        }
    });

    apply_polls(&scheduler, &[], &config.polls);

    let admin_server = if config.admin.enabled {
        if config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
            tracing::warn!("Admin API is using the placeholder api_key");
        }
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let router = admin::setup_admin_router(
            AdminState {
                scheduler: scheduler.clone(),
                breakers: breakers.clone(),
            },
            &config.admin.api_key,
        );
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, router, shutdown).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }))
    } else {
        None
    };

    // The watcher handle must stay alive for reloads to arrive.
    let mut reloads = None;
    let _watcher = match &config_path {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            reloads = Some(rx);
            match watcher.run() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to start config watcher");
                    None
                }
            }
        }
        None => None,
    };

    let mut current_polls = config.polls.clone();
    let mut stop = shutdown.subscribe();
    loop {
        tokio::select! {
            Some(new_config) = async {
                match reloads.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                apply_polls(&scheduler, &current_polls, &new_config.polls);
                current_polls = new_config.polls;
            }
            _ = stop.recv() => break,
        }
    }

    scheduler.shutdown();
    let _ = sweeper.await;
    let _ = event_log.await;
    if let Some(server) = admin_server {
        let _ = server.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
