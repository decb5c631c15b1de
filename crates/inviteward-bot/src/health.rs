//! Liveness endpoint for uptime monitors.

use axum::{routing::get, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Build the liveness router.
pub fn router() -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
}

async fn home() -> &'static str {
    "Bot is alive!"
}

async fn health() -> &'static str {
    "OK"
}

/// Serve the liveness router on an already bound listener.
pub async fn serve_on(listener: TcpListener) -> std::io::Result<()> {
    axum::serve(listener, router()).await
}

/// Bind `addr` and serve until the process exits.
///
/// Failures are logged; the bot keeps running without the endpoint.
pub async fn serve(addr: SocketAddr) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind liveness endpoint on {}: {}", addr, e);
            return;
        }
    };
    tracing::info!("Liveness endpoint listening on {}", addr);

    if let Err(e) = serve_on(listener).await {
        tracing::error!("Liveness endpoint stopped: {}", e);
    }
}
