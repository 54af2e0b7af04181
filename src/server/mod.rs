//! Presenter HTTP Server
//!
//! - Slide generation sessions with a WebSocket event stream
//! - Narration speech synthesis with cached artifacts
//! - Health and request statistics

pub mod config;
pub mod middleware;
pub mod routes;
pub mod server_core;
pub mod types;

pub use config::{EngineConfig, EngineKind, GatewayConfig, GenerationConfig, LoggingConfig, ServerConfig, SpeechConfig};
pub use middleware::{RequestMetrics, RouteCounter};
pub use server_core::{create_router, AppState, PresenterServer};
pub use types::*;
