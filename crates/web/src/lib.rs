//! branchnote web server and REST API.
//!
//! Provides an Axum-based HTTP server with:
//! - Note read, list, create, update and delete endpoints
//! - Pending conflict listing
//! - Status and health endpoints

pub mod api;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use branchnote_core::config::AppConfig;
use branchnote_core::NoteService;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub service: Arc<NoteService>,
    pub config: AppConfig,
    pub started_at: DateTime<Utc>,
}

/// Build the full API router over `state`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);
    let body_limit = state.config.server.max_body_bytes;

    Router::new()
        .merge(api::status::routes())
        .merge(api::notes::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// The web server.
pub struct WebServer {
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: AppConfig, service: Arc<NoteService>) -> Self {
        let state = Arc::new(AppState {
            service,
            config,
            started_at: Utc::now(),
        });
        Self { state }
    }

    /// Serve on `listen_addr` until `shutdown` resolves, then let in-flight
    /// requests finish.
    pub async fn start<F>(self, listen_addr: &str, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = listen_addr.parse()?;
        let app = build_router(self.state);

        info!(addr = %addr, "starting web server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("web server stopped");
        Ok(())
    }
}
