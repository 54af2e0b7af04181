//! Server Types
//!
//! Request and response bodies of the HTTP API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::error::PresenterError;
use crate::core::types::{ProjectId, Theme};
use crate::session::{BusStats, SessionId, SessionSnapshot, ThemeState};
use crate::speech::{AudioFormat, EngineHealth, SpeechCacheStats, SpeechResult};

/// Response to `POST /api/v1/slides/generate`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub slide_id: SessionId,
    pub status: String,
    /// Where to subscribe for slide events
    pub websocket_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThemeEntry {
    pub theme: Theme,
    #[serde(flatten)]
    pub state: ThemeState,
}

/// Response to `GET /api/v1/slides/{id}/status`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub slide_id: SessionId,
    pub project_id: ProjectId,
    pub language: String,
    pub status: String,
    pub progress: Progress,
    pub themes: Vec<ThemeEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<SessionSnapshot> for StatusResponse {
    fn from(snapshot: SessionSnapshot) -> Self {
        let reason = snapshot.reason().map(str::to_string);
        Self {
            slide_id: snapshot.id,
            project_id: snapshot.project_id,
            language: snapshot.language.code().to_string(),
            status: snapshot.status.as_str().to_string(),
            progress: Progress {
                done: snapshot.slides_released,
                total: snapshot.themes.len(),
            },
            themes: snapshot
                .themes
                .into_iter()
                .map(|t| ThemeEntry {
                    theme: t.theme,
                    state: t.state,
                })
                .collect(),
            reason,
            created_at: snapshot.created_at,
            finished_at: snapshot.finished_at,
        }
    }
}

/// Body of `POST /api/v1/speech/synthesize`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub voice: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechResponse {
    pub audio_url: String,
    pub fingerprint: String,
    pub format: AudioFormat,
    /// Seconds
    pub duration: f64,
    pub language: String,
    pub voice: String,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    pub request_id: String,
}

impl SpeechResponse {
    pub fn new(result: SpeechResult, request_id: String) -> Self {
        Self {
            audio_url: result.audio.url_path,
            fingerprint: result.audio.fingerprint,
            format: result.audio.format,
            duration: result.audio.duration_secs,
            language: result.language,
            voice: result.voice,
            cache_hit: result.cache_hit,
            engine: result.audio.engine,
            request_id,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "healthy" when at least one engine answers, else "degraded"
    pub status: String,
    pub version: String,
    /// Uptime (seconds)
    pub uptime: u64,
    pub active_sessions: usize,
    pub engines: Vec<EngineHealth>,
    /// Reachability of the upstream services, keyed by service
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub upstream: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub endpoint: String,
    pub requests: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub avg_time_ms: f64,
    pub max_time_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCounts {
    pub total: usize,
    pub active: usize,
}

/// Server statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub avg_processing_time_ms: f64,
    pub endpoints: Vec<EndpointStats>,
    pub sessions: SessionCounts,
    pub events: BusStats,
    pub speech_cache: SpeechCacheStats,
    /// Uptime (seconds)
    pub uptime: u64,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// HTTP status for each error kind
pub fn status_for(err: &PresenterError) -> StatusCode {
    match err {
        PresenterError::Validation { .. } => StatusCode::BAD_REQUEST,
        PresenterError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
        PresenterError::SynthesisExhausted { .. } | PresenterError::UpstreamUnavailable { .. } => {
            StatusCode::BAD_GATEWAY
        }
        PresenterError::UpstreamTransient { .. } => StatusCode::SERVICE_UNAVAILABLE,
        PresenterError::ContentRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PresenterError::Cancelled { .. } => StatusCode::CONFLICT,
        PresenterError::Config { .. } | PresenterError::Io { .. } | PresenterError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for PresenterError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        }
        let field = match &self {
            PresenterError::Validation { field, .. } => field.clone(),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
            field,
        };
        (status, Json(body)).into_response()
    }
}

fn default_language() -> String {
    "ja".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::EngineAttempt;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&PresenterError::validation("bad")), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&PresenterError::session_not_found("x")), StatusCode::NOT_FOUND);
        let exhausted = PresenterError::SynthesisExhausted {
            language: "ja".into(),
            attempts: vec![EngineAttempt {
                engine: "voicevox".into(),
                error: "down".into(),
            }],
        };
        assert_eq!(status_for(&exhausted), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_speech_request_defaults() {
        let req: SpeechRequest = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(req.language, "ja");
        assert!(req.voice.is_none());
    }
}
