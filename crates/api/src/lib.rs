//! Potato Leaf Classifier API Server
//!
//! HTTP boundary over the inference service: health, prediction upload and
//! Prometheus metrics.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_governor::GovernorLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod config;
pub mod error;
pub mod rate_limit;
mod routes;

pub use config::{AppConfig, LoggingConfig, ServerConfig};
pub use error::{ApiError, StartupError};
pub use rate_limit::RateLimitConfig;

use artifact_bundle::ArtifactBundle;
use inference_service::InferenceService;

/// Allowance for multipart framing on top of the image itself
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<InferenceService>,
    /// Present when the Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wrap the service and the optional metrics handle
    pub fn new(service: Arc<InferenceService>, metrics: Option<PrometheusHandle>) -> Self {
        Self { service, metrics }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>, quota: Option<&RateLimitConfig>) -> Router {
    let body_limit = state.service.options().max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    let mut predict = Router::new()
        .route("/predict", post(routes::predict::predict))
        .layer(DefaultBodyLimit::max(body_limit));
    if let Some(limits) = quota.filter(|c| c.enabled) {
        match rate_limit::create_governor_config(limits) {
            Some(config) => predict = predict.layer(GovernorLayer { config }),
            None => warn!("Rate limit quota is unusable; serving without rate limiting"),
        }
    }

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::render_metrics))
        .merge(predict)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Initialize logging
///
/// `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), StartupError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| StartupError::Logging(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    result.map_err(|e| StartupError::Logging(e.to_string()))
}

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle, StartupError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| StartupError::Metrics(e.to_string()))
}

/// Load the bundle, build the service and serve until Ctrl-C
///
/// Every startup failure is returned before the listener binds.
pub async fn run_server(config: AppConfig) -> Result<(), StartupError> {
    let addr: SocketAddr = config.server.bind.parse().map_err(|e: std::net::AddrParseError| {
        StartupError::Bind {
            addr: config.server.bind.clone(),
            message: e.to_string(),
        }
    })?;

    info!("Loading artifact bundle from {:?}", config.artifacts.dir);
    let bundle = Arc::new(ArtifactBundle::load(&config.artifacts.dir)?);
    let service = Arc::new(InferenceService::new(bundle, config.inference.clone())?);

    let metrics = if config.server.metrics_enabled {
        Some(init_metrics()?)
    } else {
        None
    };

    let state = Arc::new(AppState::new(Arc::clone(&service), metrics));
    let app = create_router(state, Some(&config.server.rate_limit));

    info!("Starting API server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    service.shutdown();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
