//! Request Monitoring Middleware
//!
//! Per-route timing and error counters, keyed by method and route template

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Requests slower than this are logged at WARN
const SLOW_REQUEST_MS: f64 = 1000.0;

/// Counters for one route
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RouteCounter {
    pub requests: u64,
    /// 4xx: validation errors, unknown sessions, bad cache names
    pub client_errors: u64,
    /// 5xx: exhausted engines and upstream failures
    pub server_errors: u64,
    pub total_ms: f64,
    pub max_ms: f64,
}

impl RouteCounter {
    fn observe(&mut self, status: StatusCode, duration_ms: f64) {
        self.requests += 1;
        if status.is_client_error() {
            self.client_errors += 1;
        } else if status.is_server_error() {
            self.server_errors += 1;
        }
        self.total_ms += duration_ms;
        self.max_ms = self.max_ms.max(duration_ms);
    }

    pub fn failures(&self) -> u64 {
        self.client_errors + self.server_errors
    }

    pub fn avg_ms(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.total_ms / self.requests as f64
        }
    }

    /// Fold another route's counters into this one
    pub fn merge(mut self, other: &RouteCounter) -> Self {
        self.requests += other.requests;
        self.client_errors += other.client_errors;
        self.server_errors += other.server_errors;
        self.total_ms += other.total_ms;
        self.max_ms = self.max_ms.max(other.max_ms);
        self
    }
}

/// Shared request counters
#[derive(Default)]
pub struct RequestMetrics {
    routes: RwLock<BTreeMap<String, RouteCounter>>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn observe(&self, route: &str, status: StatusCode, duration_ms: f64) {
        let mut routes = self.routes.write().await;
        match routes.get_mut(route) {
            Some(counter) => counter.observe(status, duration_ms),
            None => {
                let mut counter = RouteCounter::default();
                counter.observe(status, duration_ms);
                routes.insert(route.to_string(), counter);
            }
        }
    }

    /// Copy of every route's counters, sorted by route
    pub async fn routes(&self) -> BTreeMap<String, RouteCounter> {
        self.routes.read().await.clone()
    }
}

/// Time every request and record it under its route template
pub async fn performance_monitor(
    State(metrics): State<Arc<RequestMetrics>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // route templates keep session ids out of the counters
    let route = match req.extensions().get::<MatchedPath>() {
        Some(matched) => format!("{} {}", req.method(), matched.as_str()),
        None => format!("{} unmatched", req.method()),
    };
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status();
    metrics.observe(&route, status, duration_ms).await;

    if duration_ms > SLOW_REQUEST_MS {
        warn!(route, path, status = status.as_u16(), "slow request took {:.2}ms", duration_ms);
    } else {
        debug!(route, path, status = status.as_u16(), "request took {:.2}ms", duration_ms);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counters_per_route() {
        let metrics = RequestMetrics::new();
        metrics.observe("GET /health", StatusCode::OK, 10.0).await;
        metrics.observe("GET /health", StatusCode::OK, 30.0).await;
        metrics.observe("POST /api/v1/slides/generate", StatusCode::BAD_REQUEST, 5.0).await;
        metrics.observe("POST /api/v1/speech/synthesize", StatusCode::BAD_GATEWAY, 50.0).await;
        // websocket upgrades are not failures
        metrics.observe("GET /ws/slides/:id", StatusCode::SWITCHING_PROTOCOLS, 1.0).await;

        let routes = metrics.routes().await;
        let health = routes["GET /health"];
        assert_eq!(health.requests, 2);
        assert_eq!(health.avg_ms(), 20.0);
        assert_eq!(health.max_ms, 30.0);
        assert_eq!(routes["GET /ws/slides/:id"].failures(), 0);

        let total = routes.values().fold(RouteCounter::default(), |acc, c| acc.merge(c));
        assert_eq!(total.requests, 5);
        assert_eq!(total.client_errors, 1);
        assert_eq!(total.server_errors, 1);
        assert_eq!(total.max_ms, 50.0);
    }

    #[test]
    fn test_empty_counter() {
        assert_eq!(RouteCounter::default().avg_ms(), 0.0);
    }
}
