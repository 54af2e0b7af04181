//! Presenter Server Core
//!
//! Application state, router and the server run loop

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::core::error::{PresenterError, Result};
use crate::gateway::GatewayClient;
use crate::server::config::ServerConfig;
use crate::server::middleware::{performance_monitor, RequestMetrics};
use crate::server::routes;
use crate::session::{Pipeline, SessionRegistry};
use crate::speech::SpeechGateway;

/// State shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<SessionRegistry>,
    pub speech: Arc<SpeechGateway>,
    /// Probed by the health endpoint when present
    pub gateway: Option<GatewayClient>,
    pub metrics: Arc<RequestMetrics>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, registry: Arc<SessionRegistry>, speech: Arc<SpeechGateway>) -> Self {
        Self {
            config,
            registry,
            speech,
            gateway: None,
            metrics: Arc::new(RequestMetrics::new()),
            start_time: Instant::now(),
        }
    }

    /// Wire the registry and speech gateway from configuration
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        let gateway = GatewayClient::from_config(&config.gateway)?;
        let speech = Arc::new(SpeechGateway::from_config(&config.speech)?);
        let pipeline = Pipeline::from_gateway(gateway.clone(), &config.generation).with_speech(Arc::clone(&speech));
        let registry = Arc::new(SessionRegistry::new(pipeline, &config.generation));
        Ok(Self::new(config, registry, speech).with_gateway(gateway))
    }

    pub fn with_gateway(mut self, gateway: GatewayClient) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Create the router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let request_id = axum::http::HeaderName::from_static("x-request-id");

    let router = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/stats", get(routes::stats::get_stats))
        // Slide generation
        .route("/api/v1/slides/generate", post(routes::sessions::generate))
        .route("/api/v1/slides/:id/status", get(routes::sessions::status))
        .route("/api/v1/slides/:id", axum::routing::delete(routes::sessions::terminate))
        .route("/ws/slides/:id", get(routes::ws::slide_stream))
        // Speech
        .route("/api/v1/speech/synthesize", post(routes::speech::synthesize))
        .route("/api/v1/speech/voices", get(routes::speech::list_voices))
        .route("/api/v1/speech/languages", get(routes::speech::list_languages))
        .route("/cache/:file", get(routes::speech::cached_audio))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.metrics),
            performance_monitor,
        ))
        .with_state(Arc::clone(&state))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(cors);

    if state.config.logging.access_log {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Presenter server
pub struct PresenterServer {
    state: Arc<AppState>,
}

impl PresenterServer {
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: Arc::new(AppState::from_config(config)?),
        })
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Serve until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let config = &self.state.config;
        let sweeper = self.state.registry.spawn_sweeper(
            Duration::from_secs(config.generation.sweep_interval_secs.max(1)),
            shutdown.clone(),
        );

        let router = create_router(Arc::clone(&self.state));
        let addr = format!("{}:{}", config.host, config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| PresenterError::Io {
                message: format!("failed to bind {}: {}", addr, e),
                path: None,
            })?;
        info!(
            addr = %addr,
            public_url = %config.public_base_url(),
            engines = %self.state.speech.engine_set_version(),
            "presenter server listening"
        );

        let signal = shutdown.clone();
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await;

        shutdown.cancel();
        let _ = sweeper.await;
        served?;
        info!("presenter server stopped");
        Ok(())
    }
}
