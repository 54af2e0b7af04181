//! Data/AI gateway client
//!
//! One `call(service, method, params)` envelope in front of the project data
//! bridge and the content generator. Every call carries a timeout and a
//! cancellation token; a cancelled call drops its request future.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::{GatewayError, GatewayResult};
use crate::server::config::GatewayConfig;

/// Upstream service addressed by a gateway call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Project management data bridge
    ProjectData,
    /// AI text generator
    ContentGenerator,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectData => "project_data",
            Self::ContentGenerator => "content_generator",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method name for content generator chat completions
pub const CHAT_COMPLETION: &str = "chat.completions";

/// Transport behind the gateway client
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Perform one call. Timeouts and cancellation are applied by [`GatewayClient`].
    async fn call(&self, service: ServiceKind, method: &str, params: Value) -> GatewayResult<Value>;

    /// Check if the service is reachable
    async fn health_check(&self, _service: ServiceKind) -> bool {
        true
    }
}

/// Gateway with per-call timeout and cancellation
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<dyn Gateway>,
    timeout: Duration,
}

impl GatewayClient {
    pub fn new(inner: Arc<dyn Gateway>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Build the HTTP-backed client from configuration
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let http = HttpGateway::new(config)?;
        Ok(Self::new(Arc::new(http), config.timeout()))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn call(
        &self,
        service: ServiceKind,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> GatewayResult<Value> {
        if cancel.is_cancelled() {
            return Err(GatewayError::cancelled(service));
        }
        debug!(service = %service, method, "gateway call");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GatewayError::cancelled(service)),
            result = tokio::time::timeout(self.timeout, self.inner.call(service, method, params)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(GatewayError::timeout(service, self.timeout)),
                }
            }
        }
    }

    pub async fn health_check(&self, service: ServiceKind) -> bool {
        tokio::time::timeout(self.timeout, self.inner.health_check(service))
            .await
            .unwrap_or(false)
    }
}

/// Project data bridge request body
#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    tool: &'a str,
    args: Value,
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    access_token: Option<&'a str>,
}

/// Project data bridge response body
#[derive(Debug, Deserialize)]
struct BridgeResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// HTTP transport for both services
pub struct HttpGateway {
    client: Client,
    timeout: Duration,
    project_data_url: String,
    project_data_token: Option<String>,
    content_generator_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                GatewayError::protocol(ServiceKind::ContentGenerator, format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            timeout: config.timeout(),
            project_data_url: config.project_data_url.trim_end_matches('/').to_string(),
            project_data_token: config.project_data_token.clone(),
            content_generator_url: config.content_generator_url.trim_end_matches('/').to_string(),
            api_key: config.content_generator_api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    async fn call_bridge(&self, tool: &str, args: Value) -> GatewayResult<Value> {
        let service = ServiceKind::ProjectData;
        let url = format!("{}/mcp/call", self.project_data_url);
        let body = BridgeRequest {
            tool,
            args,
            access_token: self.project_data_token.as_deref(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(service, e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(service, status.as_u16(), text));
        }

        let bridge: BridgeResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::protocol(service, e.to_string()))?;

        if let Some(error) = bridge.error.filter(|e| !e.is_empty()) {
            return Err(GatewayError::invalid_request(service, error));
        }
        let result = bridge
            .result
            .ok_or_else(|| GatewayError::protocol(service, "bridge response has no result"))?;
        Ok(unwrap_tool_result(result))
    }

    async fn chat_completion(&self, params: Value) -> GatewayResult<Value> {
        let service = ServiceKind::ContentGenerator;
        let url = format!("{}/chat/completions", self.content_generator_url);

        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        if let (Value::Object(target), Value::Object(extra)) = (&mut body, params) {
            target.extend(extra);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(service, e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(classify_generator_error(status.as_u16(), &text, retry_after));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::protocol(service, e.to_string()))?;

        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or(GatewayError::Empty { service })?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(GatewayError::rejected(service, "completion stopped by content filter"));
        }
        let content = choice
            .message
            .and_then(|m| m.content)
            .ok_or_else(|| GatewayError::protocol(service, "choice has no message content"))?;

        Ok(json!({
            "content": content,
            "finishReason": choice.finish_reason,
        }))
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn call(&self, service: ServiceKind, method: &str, params: Value) -> GatewayResult<Value> {
        match service {
            ServiceKind::ProjectData => self.call_bridge(method, params).await,
            ServiceKind::ContentGenerator if method == CHAT_COMPLETION => self.chat_completion(params).await,
            ServiceKind::ContentGenerator => Err(GatewayError::invalid_request(
                service,
                format!("unknown method: {}", method),
            )),
        }
    }

    async fn health_check(&self, service: ServiceKind) -> bool {
        let url = match service {
            ServiceKind::ProjectData => format!("{}/health", self.project_data_url),
            ServiceKind::ContentGenerator => format!("{}/models", self.content_generator_url),
        };
        let mut request = self.client.get(&url);
        if service == ServiceKind::ContentGenerator {
            request = request.bearer_auth(&self.api_key);
        }
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Tool results arrive as `{content: [{data}]}` or `{content: [{text}]}` with JSON text
fn unwrap_tool_result(result: Value) -> Value {
    let first = match result.get("content").and_then(|c| c.get(0)) {
        Some(first) => first,
        None => return result,
    };
    if let Some(data) = first.get("data") {
        return data.clone();
    }
    if let Some(text) = first.get("text").and_then(Value::as_str) {
        return serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
    }
    result
}

fn classify_generator_error(status: u16, body: &str, retry_after: Option<u64>) -> GatewayError {
    let service = ServiceKind::ContentGenerator;
    let parsed = serde_json::from_str::<ApiErrorResponse>(body).ok();

    if let Some(ApiErrorResponse { error: api }) = &parsed {
        let is_policy = api.code.as_deref() == Some("content_policy_violation")
            || api.error_type.as_deref() == Some("content_filter");
        if is_policy {
            return GatewayError::rejected(service, api.message.clone());
        }
    }
    if status == 429 {
        return GatewayError::rate_limited(service, retry_after);
    }
    let message = parsed.map(|p| p.error.message).unwrap_or_else(|| body.to_string());
    GatewayError::from_status(service, status, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct SlowGateway {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Gateway for SlowGateway {
        async fn call(&self, _service: ServiceKind, _method: &str, _params: Value) -> GatewayResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_call_times_out() {
        let client = GatewayClient::new(
            Arc::new(SlowGateway { calls: AtomicU32::new(0) }),
            Duration::from_millis(20),
        );
        let cancel = CancellationToken::new();
        let err = client
            .call(ServiceKind::ProjectData, "get_project", json!({}), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_call_cancelled() {
        let gateway = Arc::new(SlowGateway { calls: AtomicU32::new(0) });
        let client = GatewayClient::new(gateway.clone(), Duration::from_secs(10));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = client
            .call(ServiceKind::ContentGenerator, CHAT_COMPLETION, json!({}), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled { .. }));

        // already-cancelled tokens never reach the transport
        let before = gateway.calls.load(Ordering::SeqCst);
        let _ = client
            .call(ServiceKind::ProjectData, "get_project", json!({}), &cancel)
            .await;
        assert_eq!(gateway.calls.load(Ordering::SeqCst), before);
    }

    #[test]
    fn test_unwrap_tool_result() {
        let data = json!({"content": [{"type": "json", "data": {"id": 1}}]});
        assert_eq!(unwrap_tool_result(data), json!({"id": 1}));

        let text = json!({"content": [{"type": "text", "text": "{\"name\":\"Apollo\"}"}]});
        assert_eq!(unwrap_tool_result(text), json!({"name": "Apollo"}));

        let plain = json!({"content": [{"type": "text", "text": "not json"}]});
        assert_eq!(unwrap_tool_result(plain), json!("not json"));

        let bare = json!({"id": 7});
        assert_eq!(unwrap_tool_result(bare.clone()), bare);
    }

    #[test]
    fn test_classify_generator_error() {
        let body = r#"{"error":{"message":"flagged","type":"invalid_request_error","code":"content_policy_violation"}}"#;
        assert!(matches!(
            classify_generator_error(400, body, None),
            GatewayError::Rejected { .. }
        ));
        assert!(matches!(
            classify_generator_error(429, "", Some(3)),
            GatewayError::RateLimited { retry_after: Some(3), .. }
        ));
        let err = classify_generator_error(503, r#"{"error":{"message":"overloaded"}}"#, None);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("overloaded"));
    }
}
