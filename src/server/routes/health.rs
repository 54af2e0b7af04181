//! Health Check Routes

use axum::{extract::State, Json};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::gateway::ServiceKind;

use crate::server::server_core::AppState;
use crate::server::types::HealthResponse;

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let engines = state.speech.engine_health().await;
    let status = if engines.iter().any(|e| e.healthy) {
        "healthy"
    } else {
        "degraded"
    };

    let mut upstream = BTreeMap::new();
    if let Some(gateway) = &state.gateway {
        for service in [ServiceKind::ProjectData, ServiceKind::ContentGenerator] {
            upstream.insert(service.as_str().to_string(), gateway.health_check(service).await);
        }
    }

    Json(HealthResponse {
        status: status.to_string(),
        version: crate::VERSION.to_string(),
        uptime: state.uptime().as_secs(),
        active_sessions: state.registry.active_count(),
        engines,
        upstream,
    })
}
