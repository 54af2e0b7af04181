//! # SDKWork-Presenter - Narrated Project Presentations
//!
//! Generates slide decks from project-management data and streams each slide,
//! with its narration, to subscribers while the rest are still being produced.
//!
//! ## Features
//!
//! - **Sessions**: one background pipeline per request, bounded concurrency per session
//! - **Ordered streaming**: slides are released in theme order over WebSocket, with replay
//!   for late or reconnecting subscribers
//! - **Resilient generation**: transient upstream failures are retried with backoff,
//!   permanent ones degrade a single slide instead of the whole deck
//! - **Speech**: VOICEVOX, Kokoro and MLX-Audio with priority fallback and a
//!   content-addressed audio cache
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sdkwork_presenter::server::{PresenterServer, ServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut config = ServerConfig::default();
//! config.apply_env_overrides();
//! PresenterServer::new(config)?.run(CancellationToken::new()).await?;
//! ```
//!
//! ## Driving a session directly
//!
//! ```rust,ignore
//! use sdkwork_presenter::session::{GenerationRequest, Pipeline, SessionRegistry};
//!
//! let registry = SessionRegistry::new(Pipeline::from_gateway(client, &config.generation), &config.generation);
//! let id = registry.create(&GenerationRequest::new("42", &["project_overview"], "en"))?;
//! let mut events = registry.subscribe(&id)?;
//! while let Some(event) = events.recv().await {
//!     println!("{}", serde_json::to_string(&*event)?);
//! }
//! ```

pub mod core;
pub mod gateway;
pub mod server;
pub mod session;
pub mod speech;

pub use crate::core::{EngineAttempt, Language, PresenterError, ProjectId, Result, ResultExt, Theme};
pub use gateway::{Gateway, GatewayClient, GatewayError, ServiceKind};
pub use server::{PresenterServer, ServerConfig};
pub use session::{GenerationEvent, GenerationRequest, SessionId, SessionRegistry};
pub use speech::{SpeechGateway, SpeechResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
