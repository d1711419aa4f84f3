//! HTTP gateway.
//!
//! Routes:
//! - `GET /`: service page
//! - `GET /health`: readiness and configuration
//! - `GET /voices`: available voices
//! - `POST /tts` (also `POST /synthesize`): synthesize speech

mod error;
mod handlers;
mod phase;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use crate::pipeline::TtsPipeline;

pub use error::{status_for, ApiError};
pub use handlers::TtsRequest;
pub use phase::{RequestPhase, RequestTracker};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TtsPipeline>,
}

impl AppState {
    pub fn new(pipeline: TtsPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/voices", get(handlers::voices))
        .route("/tts", post(handlers::synthesize))
        .route("/synthesize", post(handlers::synthesize))
        .with_state(state)
}

/// Serve until Ctrl-C / SIGTERM.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Listening on http://{addr}");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl-C: {e}");
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
                log::warn!("Failed to listen for SIGTERM: {e}");
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
    log::info!("Shutting down");
}
