//! WebSocket stream tests
//!
//! The router is served on a loopback listener and driven with a real
//! WebSocket client.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use sdkwork_presenter::gateway::{Gateway, GatewayClient, GatewayResult, ServiceKind};
use sdkwork_presenter::server::{create_router, AppState, ServerConfig};
use sdkwork_presenter::session::{GenerationRequest, Pipeline, SessionId, SessionRegistry, SessionStatus};
use sdkwork_presenter::speech::{AudioFormat, SpeechCache, SpeechGateway};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Holds `get_project` until a permit is added
struct GatedGateway {
    gate: Semaphore,
}

#[async_trait]
impl Gateway for GatedGateway {
    async fn call(&self, service: ServiceKind, method: &str, _params: Value) -> GatewayResult<Value> {
        match service {
            ServiceKind::ProjectData => {
                if method == "get_project" {
                    if let Ok(permit) = self.gate.acquire().await {
                        permit.forget();
                    }
                }
                Ok(json!({ "id": 7, "name": "Demo" }))
            }
            ServiceKind::ContentGenerator => Ok(json!({ "content": "# Slide\n- done" })),
        }
    }
}

async fn serve(gateway: Arc<GatedGateway>, cache_dir: &std::path::Path) -> (SocketAddr, Arc<AppState>) {
    let config = ServerConfig::default();
    let client = GatewayClient::new(gateway, Duration::from_secs(2));
    let registry = Arc::new(SessionRegistry::new(
        Pipeline::from_gateway(client, &config.generation),
        &config.generation,
    ));
    let speech = Arc::new(SpeechGateway::new(Vec::new(), SpeechCache::new(cache_dir, AudioFormat::Wav)));
    let state = Arc::new(AppState::new(config, registry, speech));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn create_session(state: &AppState) -> SessionId {
    state
        .registry
        .create(&GenerationRequest::new("7", &["project_overview", "summary_plan"], "en"))
        .unwrap()
}

async fn next_frame(ws: &mut Client) -> Option<Result<Message, WsError>> {
    tokio::time::timeout(Duration::from_secs(10), ws.next())
        .await
        .expect("no frame within 10s")
}

/// Text frames as JSON until the server closes the socket
async fn read_until_close(ws: &mut Client) -> (Vec<Value>, bool) {
    let mut frames = Vec::new();
    loop {
        match next_frame(ws).await {
            Some(Ok(Message::Text(text))) => frames.push(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Close(_))) => return (frames, true),
            Some(Ok(_)) => {}
            Some(Err(_)) | None => return (frames, false),
        }
    }
}

fn assert_complete_stream(frames: &[Value]) {
    let seqs: Vec<u64> = frames.iter().map(|f| f["seq"].as_u64().unwrap()).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    let types: Vec<&str> = frames.iter().map(|f| f["type"].as_str().unwrap()).collect();
    assert_eq!(
        types,
        vec!["progress_update", "slide_produced", "progress_update", "slide_produced", "session_completed"]
    );
    assert_eq!(frames[1]["theme"], "project_overview");
    assert_eq!(frames[3]["theme"], "summary_plan");
}

#[tokio::test]
async fn test_live_stream_answers_ping_and_closes() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(GatedGateway { gate: Semaphore::new(0) });
    let (addr, state) = serve(Arc::clone(&gateway), dir.path()).await;
    let id = create_session(&state);

    let (mut ws, _) = connect_async(format!("ws://{}/ws/slides/{}", addr, id)).await.unwrap();

    // nothing is produced while the project fetch is held
    ws.send(Message::Ping(vec![7, 7])).await.unwrap();
    match next_frame(&mut ws).await {
        Some(Ok(Message::Pong(payload))) => assert_eq!(payload, vec![7, 7]),
        other => panic!("expected pong, got {other:?}"),
    }

    gateway.gate.add_permits(1);
    let (frames, closed) = read_until_close(&mut ws).await;
    assert!(closed, "server should close after the terminal event");
    assert_complete_stream(&frames);
}

#[tokio::test]
async fn test_reconnect_after_completion_replays_history() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(GatedGateway { gate: Semaphore::new(1) });
    let (addr, state) = serve(gateway, dir.path()).await;
    let id = create_session(&state);

    for _ in 0..200 {
        if state.registry.get(&id).unwrap().status == SessionStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.registry.get(&id).unwrap().status, SessionStatus::Completed);

    let (mut ws, _) = connect_async(format!("ws://{}/ws/slides/{}", addr, id)).await.unwrap();
    let (frames, closed) = read_until_close(&mut ws).await;
    assert!(closed);
    assert_complete_stream(&frames);
}

#[tokio::test]
async fn test_unknown_session_is_refused_before_upgrade() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(GatedGateway { gate: Semaphore::new(0) });
    let (addr, _state) = serve(gateway, dir.path()).await;

    let url = format!("ws://{}/ws/slides/{}", addr, uuid::Uuid::new_v4());
    match connect_async(url).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 404),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("upgrade should be refused"),
    }
}
