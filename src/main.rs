mod config;
mod docs;
mod error;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
mod utils;
mod websocket;
mod ws;

use chrono::Utc;
use config::Config;
use state::AppState;
use std::panic;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration; problems are reported once tracing is up
    let loaded = Config::load();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "codepad_relay={lvl},tower_http={lvl},axum::rejection=trace,info",
                lvl = config.log_level
            )
            .into()
        }))
        .init();

    info!("Starting server...");
    if let Err(e) = &loaded {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
    }

    let state = AppState::new(config);

    if state.config.presence_server_expiry {
        spawn_presence_sweeper(state.clone());
    }

    let app = routes::build_router(state.clone());

    let address = state.config.server_address();
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", address, e);
            std::process::exit(1);
        }
    };

    info!("🚀 Server running on http://{}", address);
    info!("📡 Event channel at ws://{}/ws, document channel at ws://{}/yjs/<name>", address, address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!("Server error: {}", e);
    }
    info!("Server stopped");
}

/// Periodically drop presence records whose owners went quiet
fn spawn_presence_sweeper(state: Arc<AppState>) {
    let ttl = state.config.presence_ttl().max(Duration::from_secs(1));
    info!("Server-side presence expiry enabled (ttl {:?})", ttl);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ttl);
        loop {
            ticker.tick().await;
            let expired = state
                .presence
                .expire_stale(Utc::now().timestamp_millis(), ttl.as_millis() as i64)
                .await;
            if expired > 0 {
                debug!("Expired {} stale presence record(s)", expired);
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, stopping server");
}
