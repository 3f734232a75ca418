//! Application startup and lifecycle management.
//!
//! Wires the configured model provider into the analysis pipeline and serves
//! the HTTP API, health probes and metrics.

use crate::config::{ProviderKind, XrayConfig};
use crate::handlers::{analyze, health, metrics as metrics_handlers};
use crate::middleware::metrics_middleware;
use crate::services::metrics::init_metrics;
use crate::services::providers::gemini::{GeminiConfig, GeminiVisionProvider};
use crate::services::providers::mock::MockVisionProvider;
use crate::services::providers::VisionProvider;
use crate::services::AnalysisPipeline;
use axum::extract::DefaultBodyLimit;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{request_id_middleware, security_headers_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: XrayConfig,
    pub pipeline: AnalysisPipeline,
}

/// Build the provider selected by configuration.
pub fn build_provider(config: &XrayConfig) -> Result<Arc<dyn VisionProvider>, AppError> {
    match config.provider {
        ProviderKind::Gemini => {
            let gemini_config = GeminiConfig {
                api_key: config.google.api_key.clone(),
                model: config.models.vision_model.clone(),
                base_url: config.google.api_base.clone(),
                temperature: config.models.temperature,
                timeout: Duration::from_secs(config.models.request_timeout_secs),
            };
            let provider = GeminiVisionProvider::new(gemini_config)
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

            tracing::info!(
                model = %config.models.vision_model,
                "Initialized Gemini vision provider"
            );
            Ok(Arc::new(provider))
        }
        ProviderKind::Mock => {
            tracing::warn!("Using mock vision provider; results are canned");
            Ok(Arc::new(MockVisionProvider::healthy_scan()))
        }
    }
}

/// Build the router for the given state.
pub fn router(state: AppState) -> Router {
    let upload_limit = state.config.upload.max_bytes;
    // Base64 inflates by 4/3; leave room for the JSON envelope
    let json_limit = upload_limit / 3 * 4 + 4096;

    let api = Router::new()
        .route(
            "/api/v1/analyze",
            post(analyze::analyze).layer(DefaultBodyLimit::max(json_limit)),
        )
        .route(
            "/api/v1/analyze/upload",
            post(analyze::analyze_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(metrics_handlers::metrics_handler))
        .route_layer(middleware::from_fn(metrics_middleware));

    api.layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the provider selected by configuration.
    pub async fn build(config: XrayConfig) -> Result<Self, AppError> {
        let provider = build_provider(&config)?;
        Self::build_with_provider(config, provider).await
    }

    /// Build the application around an existing provider.
    pub async fn build_with_provider(
        config: XrayConfig,
        provider: Arc<dyn VisionProvider>,
    ) -> Result<Self, AppError> {
        init_metrics().map_err(|e| {
            tracing::error!("Failed to initialize metrics: {}", e);
            AppError::InternalError(anyhow::anyhow!(e.to_string()))
        })?;

        let state = AppState {
            config: config.clone(),
            pipeline: AnalysisPipeline::new(provider),
        };

        // Bind HTTP listener (port 0 = random port for testing)
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, "X-ray service: HTTP listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let app = router(self.state);

        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                tracing::error!("HTTP server error: {}", e);
                e
            })
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received");
}
