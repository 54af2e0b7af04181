//! Slide Generation Routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::core::error::{PresenterError, Result};
use crate::server::server_core::AppState;
use crate::server::types::{GenerateResponse, StatusResponse};
use crate::session::{GenerationRequest, SessionId};

/// Start a generation session; generation continues in the background
pub async fn generate(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>> {
    let Json(request) = payload.map_err(|e| PresenterError::validation(e.body_text()))?;
    let id = state.registry.create(&request)?;
    let snapshot = state.registry.get(&id)?;
    Ok(Json(GenerateResponse {
        slide_id: id,
        status: snapshot.status.as_str().to_string(),
        websocket_url: state.config.websocket_url(&id.to_string()),
    }))
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>> {
    let id: SessionId = id.parse()?;
    Ok(Json(state.registry.get(&id)?.into()))
}

pub async fn terminate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id: SessionId = id.parse()?;
    state.registry.terminate(&id, "terminated by client")?;
    Ok(StatusCode::NO_CONTENT)
}
