use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::api::{self, AppState, SharedState};
use super::db::{BoardDb, DbHandle};
use super::ws;
use crate::config::SlotboardConfig;

/// Capacity of the live-message fan-out. Lagging sockets skip messages.
const BROADCAST_CAPACITY: usize = 256;

/// Configuration for the reference backend.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Bind on all interfaces and allow any origin.
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_config(&SlotboardConfig::default())
    }
}

impl ServerConfig {
    pub fn from_config(config: &SlotboardConfig) -> Self {
        Self {
            port: config.server.port,
            db_path: config.server.db_path.clone(),
            dev_mode: false,
        }
    }
}

/// Build the full application router: API plus the live-update socket.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// A bound, not yet serving, backend. Binding first lets callers learn the
/// actual port when asking for port 0.
pub struct BoardServer {
    listener: TcpListener,
    app: Router,
}

impl BoardServer {
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let db = BoardDb::new(&config.db_path).context("Failed to initialize board database")?;
        Self::bind_with_db(config, db).await
    }

    pub async fn bind_with_db(config: &ServerConfig, db: BoardDb) -> Result<Self> {
        let (ws_tx, _rx) = broadcast::channel::<String>(BROADCAST_CAPACITY);
        let state = Arc::new(AppState {
            db: DbHandle::new(db),
            ws_tx,
        });

        let mut app = build_router(state);
        if config.dev_mode {
            app = app.layer(CorsLayer::permissive());
        }

        let host = if config.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
        let addr = format!("{}:{}", host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;
        Ok(Self { listener, app })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read bound address")
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!(%addr, "Board backend listening");
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Server error")?;
        info!("Board backend shut down");
        Ok(())
    }
}

/// Resolves on Ctrl+C. Never resolves if the signal handler cannot be
/// installed.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C; serving until killed");
        std::future::pending::<()>().await;
    }
}
