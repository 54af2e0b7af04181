//! HTTP API tests
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use sdkwork_presenter::gateway::{Gateway, GatewayClient, GatewayResult, ServiceKind};
use sdkwork_presenter::server::{create_router, AppState, ServerConfig};
use sdkwork_presenter::session::{Pipeline, SessionRegistry};
use sdkwork_presenter::speech::{
    AudioFormat, EngineDescriptor, EngineError, SpeechCache, SpeechEngine, SpeechGateway, SynthesizedAudio,
};

struct EchoGateway;

#[async_trait]
impl Gateway for EchoGateway {
    async fn call(&self, service: ServiceKind, _method: &str, _params: Value) -> GatewayResult<Value> {
        match service {
            ServiceKind::ProjectData => Ok(json!({ "id": 7, "name": "Demo" })),
            ServiceKind::ContentGenerator => Ok(json!({ "content": "# Slide\n- done" })),
        }
    }
}

struct ToneEngine {
    descriptor: EngineDescriptor,
}

#[async_trait]
impl SpeechEngine for ToneEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn synthesize(&self, _text: &str, _language: &str, _voice: &str) -> Result<SynthesizedAudio, EngineError> {
        Ok(SynthesizedAudio {
            bytes: b"ID3-audio".to_vec(),
            format: AudioFormat::Mp3,
        })
    }
}

fn app(cache_dir: &std::path::Path) -> Router {
    let config = ServerConfig::default();
    let client = GatewayClient::new(Arc::new(EchoGateway), Duration::from_secs(2));
    let registry = Arc::new(SessionRegistry::new(
        Pipeline::from_gateway(client, &config.generation),
        &config.generation,
    ));
    let engine: Arc<dyn SpeechEngine> = Arc::new(ToneEngine {
        descriptor: EngineDescriptor {
            name: "tone".into(),
            kind: "stub".into(),
            priority: 1,
            languages: vec!["ja".into(), "en".into()],
            timeout: Duration::from_secs(1),
            version: "1".into(),
            base_url: "http://tone".into(),
        },
    });
    let speech = Arc::new(SpeechGateway::new(
        vec![engine],
        SpeechCache::new(cache_dir, AudioFormat::Wav),
    ));
    create_router(Arc::new(AppState::new(config, registry, speech)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], sdkwork_presenter::VERSION);
    assert_eq!(body["engines"][0]["name"], "tone");
}

#[tokio::test]
async fn test_generate_then_poll_status() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send_json(
        &app,
        post(
            "/api/v1/slides/generate",
            json!({ "projectId": 7, "themes": ["project_overview", "summary_plan"], "language": "en" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["slideId"].as_str().unwrap().to_string();
    assert_eq!(
        body["websocketUrl"],
        format!("ws://localhost:8080/ws/slides/{}", id)
    );

    let uri = format!("/api/v1/slides/{}/status", id);
    let mut last = Value::Null;
    for _ in 0..100 {
        let (status, body) = send_json(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "completed" {
            last = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(last["status"], "completed");
    assert_eq!(last["projectId"], "7");
    assert_eq!(last["progress"]["done"], 2);
    assert_eq!(last["progress"]["total"], 2);
    assert_eq!(last["themes"][1]["theme"], "summary_plan");
    assert_eq!(last["themes"][1]["status"], "done");
    assert!(last.get("reason").is_none());
}

#[tokio::test]
async fn test_generate_rejects_bad_requests() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send_json(
        &app,
        post(
            "/api/v1/slides/generate",
            json!({ "projectId": "7", "themes": ["weather"], "language": "en" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["field"], "themes");

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/slides/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unknown_session() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    let unknown = uuid::Uuid::new_v4();

    let (status, body) = send_json(&app, get(&format!("/api/v1/slides/{}/status", unknown))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SESSION_NOT_FOUND");

    let (status, _) = send_json(&app, get("/api/v1/slides/not-a-uuid/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/slides/{}", unknown))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_session() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (_, body) = send_json(
        &app,
        post(
            "/api/v1/slides/generate",
            json!({ "projectId": "PRJ", "themes": ["project_overview"], "language": "ja" }),
        ),
    )
    .await;
    let id = body["slideId"].as_str().unwrap().to_string();

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/slides/{}", id))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send_json(&app, get(&format!("/api/v1/slides/{}/status", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["status"] == "failed" || body["status"] == "completed");
}

#[tokio::test]
async fn test_synthesize_and_fetch_audio() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send_json(
        &app,
        post("/api/v1/speech/synthesize", json!({ "text": "こんにちは", "language": "ja" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cacheHit"], false);
    assert_eq!(body["engine"], "tone");
    assert_eq!(body["format"], "mp3");
    assert!(body["requestId"].as_str().is_some_and(|id| !id.is_empty()));

    let audio_url = body["audioUrl"].as_str().unwrap().to_string();
    // served relative to whichever host the client reached
    assert_eq!(audio_url, format!("/cache/{}.mp3", body["fingerprint"].as_str().unwrap()));
    let response = app.clone().oneshot(get(&audio_url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ID3-audio");

    let (_, again) = send_json(
        &app,
        post("/api/v1/speech/synthesize", json!({ "text": "こんにちは", "language": "ja" })),
    )
    .await;
    assert_eq!(again["cacheHit"], true);
    assert_eq!(again["fingerprint"], body["fingerprint"]);
}

#[tokio::test]
async fn test_synthesize_errors() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send_json(&app, post("/api/v1/speech/synthesize", json!({ "text": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = send_json(
        &app,
        post("/api/v1/speech/synthesize", json!({ "text": "Bonjour", "language": "fr" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "SYNTHESIS_EXHAUSTED");
}

#[tokio::test]
async fn test_cache_file_names_are_checked() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, _) = send(&app, get("/cache/..%2Fsecret.wav")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get(&format!("/cache/{}.wav", "0".repeat(64)))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_listings_and_stats() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send_json(&app, get("/api/v1/speech/languages")).await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<_> = body["languages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["code"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(codes, vec!["en", "ja"]);

    let (status, body) = send_json(&app, get("/api/v1/speech/voices")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["voices"].as_array().unwrap().is_empty());

    let (status, body) = send_json(&app, get("/api/v1/stats")).await;
    assert_eq!(status, StatusCode::OK);
    // the two listing requests above were counted
    assert_eq!(body["totalRequests"], 2);
    assert_eq!(body["failedRequests"], 0);
    assert_eq!(body["endpoints"][0]["endpoint"], "GET /api/v1/speech/languages");
    assert_eq!(body["endpoints"][1]["requests"], 1);
    assert_eq!(body["sessions"]["total"], 0);
}
