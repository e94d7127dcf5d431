//! Dashboard HTTP server

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::config::UiConfig;
use crate::error::Error;
use crate::ui::handlers;
use crate::ui::view::DisplayState;
use crate::ui::websocket;
use crate::ui::CommandRequest;

/// Shared state of all handlers
pub struct AppState {
    pub commands: mpsc::Sender<CommandRequest>,
    pub display: watch::Receiver<DisplayState>,
    pub started_at: Instant,
}

/// Build the dashboard router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/status", get(handlers::get_status))
        .route("/api/devices", get(handlers::get_devices))
        .route("/api/start", post(handlers::start))
        .route("/api/stop", post(handlers::stop))
        .route("/api/playback", post(handlers::toggle_playback))
        .route("/api/volume", post(handlers::set_volume))
        .route("/api/recenter", post(handlers::recenter))
        .route("/ws", get(websocket::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Web server for the dashboard
pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(
        config: UiConfig,
        commands: mpsc::Sender<CommandRequest>,
        display: watch::Receiver<DisplayState>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(AppState {
                commands,
                display,
                started_at: Instant::now(),
            }),
        }
    }

    fn address(&self) -> Result<SocketAddr, Error> {
        format!("{}:{}", self.config.bind_address, self.config.http_port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid bind address: {}", e)))
    }

    /// Serve until the process exits
    pub async fn start(self) -> Result<(), Error> {
        let addr = self.address()?;
        let app = router(self.state);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Dashboard listening on http://{}", addr);

        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Serve on a background task
    pub fn start_background(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.start().await {
                tracing::error!("Web server error: {}", e);
            }
        })
    }
}
