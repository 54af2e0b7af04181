//! Speech Routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::core::error::{PresenterError, Result};
use crate::server::server_core::AppState;
use crate::server::types::{ErrorResponse, SpeechRequest, SpeechResponse};
use crate::speech::{LanguageInfo, VoiceInfo};

/// Synthesize narration audio
pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Json<SpeechResponse>> {
    let Json(request) = payload.map_err(|e| PresenterError::validation(e.body_text()))?;
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let result = state
        .speech
        .synthesize(&request.text, &request.language, request.voice.as_deref())
        .await?;
    debug!(request_id, cache_hit = result.cache_hit, "speech request served");
    Ok(Json(SpeechResponse::new(result, request_id)))
}

#[derive(Debug, Serialize)]
pub struct VoicesResponse {
    pub voices: Vec<VoiceInfo>,
}

pub async fn list_voices(State(state): State<Arc<AppState>>) -> Json<VoicesResponse> {
    Json(VoicesResponse {
        voices: state.speech.voices(),
    })
}

#[derive(Debug, Serialize)]
pub struct LanguagesResponse {
    pub languages: Vec<LanguageInfo>,
}

pub async fn list_languages(State(state): State<Arc<AppState>>) -> Json<LanguagesResponse> {
    Json(LanguagesResponse {
        languages: state.speech.languages(),
    })
}

/// Serve a cached artifact by file name
pub async fn cached_audio(State(state): State<Arc<AppState>>, Path(file): Path<String>) -> Result<Response> {
    let (path, format) = state.speech.cache().resolve_file(&file)?;
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, format.content_type())], bytes).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let body = ErrorResponse {
                error: format!("audio not found: {}", file),
                code: "NOT_FOUND".to_string(),
                field: None,
            };
            Ok((StatusCode::NOT_FOUND, Json(body)).into_response())
        }
        Err(e) => Err(PresenterError::Io {
            message: e.to_string(),
            path: Some(path),
        }),
    }
}
