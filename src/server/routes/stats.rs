//! Statistics Routes

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::server::middleware::RouteCounter;
use crate::server::server_core::AppState;
use crate::server::types::{EndpointStats, ServerStats, SessionCounts};

/// Get server statistics
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<ServerStats> {
    let routes = state.metrics.routes().await;
    let total = routes.values().fold(RouteCounter::default(), |acc, c| acc.merge(c));

    let endpoints = routes
        .iter()
        .map(|(endpoint, c)| EndpointStats {
            endpoint: endpoint.clone(),
            requests: c.requests,
            client_errors: c.client_errors,
            server_errors: c.server_errors,
            avg_time_ms: c.avg_ms(),
            max_time_ms: c.max_ms,
        })
        .collect();

    Json(ServerStats {
        total_requests: total.requests,
        failed_requests: total.failures(),
        avg_processing_time_ms: total.avg_ms(),
        endpoints,
        sessions: SessionCounts {
            total: state.registry.len(),
            active: state.registry.active_count(),
        },
        events: state.registry.bus().stats(),
        speech_cache: state.speech.cache_stats(),
        uptime: state.uptime().as_secs(),
    })
}
