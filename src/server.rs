use crate::caption::{CaptionProvider, OpenRouterClient};
use crate::config::Config;
use crate::handlers::{generate_caption, health_check, AppState, SharedState};
use crate::middleware::logging_middleware;
use crate::usage::UsageTracker;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Upload size cap, matching the original service's 10MB limit
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn create_app(state: SharedState) -> Router {
    Router::new()
        .route("/api/caption", post(generate_caption))
        .route("/api/health", get(health_check))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware))
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
}

pub struct Server {
    app: Router,
    port: u16,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let captioner = match &config.api_key {
            Some(key) => Some(CaptionProvider::new(Arc::new(OpenRouterClient::new(
                key.clone(),
                config.base_url.clone(),
            )))),
            None => {
                tracing::warn!(
                    "OPENROUTER_API_KEY is not set; caption requests will fail until configured"
                );
                None
            }
        };

        let state: SharedState = Arc::new(AppState {
            usage: UsageTracker::new(),
            captioner,
        });

        Self {
            app: create_app(state),
            port: config.port,
        }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", self.port)).await?;

        tracing::info!("Caption service starting on port {}", self.port);
        tracing::info!("Health check available at /api/health");

        // Run server with graceful shutdown
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
