//! Scrawl relay and persistence server.
//!
//! Relays stroke segments between participants on the same board, tracks
//! per-board rosters, persists saved snapshots (one PNG per board), and
//! pushes a periodic full-state sync so every client converges.
//!
//! ## Configuration
//!
//! - `SCRAWL_ADDR`: listen address, default `0.0.0.0:3030`
//! - `SCRAWL_DATA_DIR`: directory for persisted boards; unset keeps
//!   boards in memory for the lifetime of the process

mod state;
mod store;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use scrawl_core::protocol::ServerMessage;

use crate::state::AppState;
use crate::store::{BoardStore, FileStore, MemoryStore};

/// Interval between server-initiated full-state syncs.
const SYNC_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scrawl_server=info,tower_http=info".into()),
        )
        .init();

    let store: Arc<dyn BoardStore> = match std::env::var("SCRAWL_DATA_DIR") {
        Ok(dir) => match FileStore::new(dir.clone().into()) {
            Ok(store) => {
                info!("Persisting boards to {}", dir);
                Arc::new(store)
            }
            Err(e) => {
                error!("Cannot use {}: {}; keeping boards in memory", dir, e);
                Arc::new(MemoryStore::new())
            }
        },
        Err(_) => {
            info!("SCRAWL_DATA_DIR not set, boards are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let state = Arc::new(AppState::new(store));

    tokio::spawn(sync_loop(state.clone(), SYNC_INTERVAL));

    let addr: SocketAddr = std::env::var("SCRAWL_ADDR")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3030)));
    info!("Scrawl relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app(state)).await.unwrap();
}

/// Build the HTTP router.
fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Push the latest snapshot of every active board to its participants.
async fn sync_loop(state: Arc<AppState>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let boards = state.snapshot_map();
        if boards.is_empty() {
            continue;
        }
        state.broadcast_all(&ServerMessage::FullSnapshot { boards });
    }
}

/// Index page
async fn index() -> &'static str {
    "Scrawl relay server - connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}
