//! Server Configuration
//!
//! YAML-backed configuration for the presenter server. Every field has a
//! default so a partial file (or none at all) yields a working local setup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{PresenterError, Result};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL handed to clients in `websocketUrl`. Derived from host and
    /// port when unset. Audio URLs stay relative (`/cache/<file>`).
    #[serde(default)]
    pub public_url: Option<String>,

    /// Project data and content generator services
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Generation pipeline tuning
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Speech synthesis
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upstream services used by the generation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Project data bridge base URL
    #[serde(default = "default_project_data_url")]
    pub project_data_url: String,

    /// Access token forwarded to the project data bridge
    #[serde(default)]
    pub project_data_token: Option<String>,

    /// OpenAI-compatible API base URL
    #[serde(default = "default_content_generator_url")]
    pub content_generator_url: String,

    /// API key for the content generator
    #[serde(default)]
    pub content_generator_api_key: String,

    /// Chat model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Completion token limit per call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-call timeout (seconds)
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            project_data_url: default_project_data_url(),
            project_data_token: None,
            content_generator_url: default_content_generator_url(),
            content_generator_api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Generation pipeline and event bus tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Themes generated concurrently per session
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Total attempts per theme, first call included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay (milliseconds)
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Retry delay ceiling (milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Events retained per session for replay
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// Pending events per subscriber before it is disconnected
    #[serde(default = "default_subscriber_queue_size")]
    pub subscriber_queue_size: usize,

    /// Time a terminal session is kept before eviction (seconds)
    #[serde(default = "default_idle_eviction_secs")]
    pub idle_eviction_secs: u64,

    /// Time a running session survives with no subscribers (seconds)
    #[serde(default = "default_subscriber_grace_secs")]
    pub subscriber_grace_secs: u64,

    /// Sweeper period (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            event_buffer_size: default_event_buffer_size(),
            subscriber_queue_size: default_subscriber_queue_size(),
            idle_eviction_secs: default_idle_eviction_secs(),
            subscriber_grace_secs: default_subscriber_grace_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Speech engine kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Voicevox,
    Kokoro,
    MlxAudio,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voicevox => "voicevox",
            Self::Kokoro => "kokoro",
            Self::MlxAudio => "mlx_audio",
        }
    }
}

/// One speech engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine name, unique across the list
    pub name: String,

    /// Engine kind
    #[serde(rename = "type")]
    pub kind: EngineKind,

    /// Engine base URL
    pub base_url: String,

    /// Lower runs first
    #[serde(default)]
    pub priority: u32,

    /// Supported language codes
    #[serde(default)]
    pub languages: Vec<String>,

    /// Per-attempt timeout (seconds)
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,

    /// Engine version, part of the cache fingerprint
    #[serde(default = "default_engine_version")]
    pub version: String,

    /// Disabled engines are skipped at startup
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Directory holding synthesized audio, served under `/cache`
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// File extension for cached audio
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Engines, tried in ascending priority
    #[serde(default = "default_engines")]
    pub engines: Vec<EngineConfig>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            audio_format: default_audio_format(),
            engines: default_engines(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable access log
    #[serde(default = "default_true")]
    pub access_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            access_log: true,
        }
    }
}

/// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_project_data_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_content_generator_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    800
}

fn default_temperature() -> f32 {
    0.7
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_worker_count() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    8000
}

fn default_event_buffer_size() -> usize {
    256
}

fn default_subscriber_queue_size() -> usize {
    64
}

fn default_idle_eviction_secs() -> u64 {
    600
}

fn default_subscriber_grace_secs() -> u64 {
    120
}

fn default_sweep_interval_secs() -> u64 {
    15
}

fn default_engine_timeout() -> u64 {
    30
}

fn default_engine_version() -> String {
    "1".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/audio")
}

fn default_audio_format() -> String {
    "wav".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_engines() -> Vec<EngineConfig> {
    vec![
        EngineConfig {
            name: "voicevox".to_string(),
            kind: EngineKind::Voicevox,
            base_url: "http://localhost:50021".to_string(),
            priority: 1,
            languages: vec!["ja".to_string()],
            timeout_secs: 30,
            version: default_engine_version(),
            enabled: true,
        },
        EngineConfig {
            name: "kokoro".to_string(),
            kind: EngineKind::Kokoro,
            base_url: "http://localhost:8882".to_string(),
            priority: 2,
            languages: ["ja", "en", "es", "fr", "hi", "it", "pt", "zh"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout_secs: 120,
            version: default_engine_version(),
            enabled: true,
        },
        EngineConfig {
            name: "mlx_audio".to_string(),
            kind: EngineKind::MlxAudio,
            base_url: "http://localhost:8881".to_string(),
            priority: 3,
            languages: vec!["ja".to_string()],
            timeout_secs: 30,
            version: default_engine_version(),
            enabled: true,
        },
    ]
}

impl ServerConfig {
    /// Load from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PresenterError::Config {
            message: format!("cannot read config: {}", e),
            path: Some(path.to_path_buf()),
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| PresenterError::Config {
            message: e.to_string(),
            path: Some(path.to_path_buf()),
        })?;
        Ok(config)
    }

    /// Save to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path.as_ref(), content).map_err(|e| PresenterError::Io {
            message: e.to_string(),
            path: Some(path.as_ref().to_path_buf()),
        })?;
        Ok(())
    }

    /// Overlay the deployment environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(url) = lookup("MCP_BACKLOG_URL") {
            self.gateway.project_data_url = url;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.gateway.content_generator_api_key = key;
        }
        for (var, kind) in [
            ("VOICEVOX_ENGINE_URL", EngineKind::Voicevox),
            ("KOKORO_TTS_URL", EngineKind::Kokoro),
            ("MLX_AUDIO_URL", EngineKind::MlxAudio),
        ] {
            if let Some(url) = lookup(var) {
                for engine in self.speech.engines.iter_mut().filter(|e| e.kind == kind) {
                    engine.base_url = url.clone();
                }
            }
        }
        if let Some(preferred) = lookup("TTS_ENGINE") {
            self.promote_engine(&preferred);
        }
    }

    /// Move the named engine (or engine kind) to the front of the priority order
    pub fn promote_engine(&mut self, preferred: &str) {
        let preferred = preferred.to_lowercase().replace('-', "_");
        let matches = |e: &EngineConfig| e.name == preferred || e.kind.as_str() == preferred;
        if !self.speech.engines.iter().any(matches) {
            return;
        }
        for engine in self.speech.engines.iter_mut() {
            engine.priority = if matches(engine) { 0 } else { engine.priority + 1 };
        }
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        let g = &self.generation;
        if g.worker_count == 0 {
            return Err(PresenterError::config("generation.worker_count must be at least 1"));
        }
        if g.max_attempts == 0 {
            return Err(PresenterError::config("generation.max_attempts must be at least 1"));
        }
        if g.event_buffer_size == 0 || g.subscriber_queue_size == 0 {
            return Err(PresenterError::config(
                "generation.event_buffer_size and subscriber_queue_size must be positive",
            ));
        }
        if g.base_backoff_ms > g.max_backoff_ms {
            return Err(PresenterError::config(
                "generation.base_backoff_ms must not exceed max_backoff_ms",
            ));
        }
        if self.speech.engines.iter().all(|e| !e.enabled) {
            return Err(PresenterError::config("speech.engines must enable at least one engine"));
        }
        let mut names = HashSet::new();
        for engine in &self.speech.engines {
            if !names.insert(engine.name.as_str()) {
                return Err(PresenterError::config(format!(
                    "duplicate speech engine name: {}",
                    engine.name
                )));
            }
        }
        if self.speech.audio_format.is_empty()
            || !self.speech.audio_format.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(PresenterError::config("speech.audio_format must be a plain extension"));
        }
        Ok(())
    }

    /// Base URL clients use to reach this server
    pub fn public_base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let host = if self.host == "0.0.0.0" { "localhost" } else { self.host.as_str() };
                format!("http://{}:{}", host, self.port)
            }
        }
    }

    /// WebSocket URL for a session
    pub fn websocket_url(&self, session_id: &str) -> String {
        let base = self.public_base_url();
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base
        };
        format!("{}/ws/slides/{}", ws_base, session_id)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            gateway: GatewayConfig::default(),
            generation: GenerationConfig::default(),
            speech: SpeechConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "port: 9000\ngeneration:\n  worker_count: 5\n";
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.generation.worker_count, 5);
        assert_eq!(config.generation.max_attempts, 3);
        assert_eq!(config.speech.engines.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presenter.yaml");
        let mut config = ServerConfig::default();
        config.port = 8181;
        config.save(&path).unwrap();

        let loaded = ServerConfig::load(&path).unwrap();
        assert_eq!(loaded.port, 8181);
        assert_eq!(loaded.speech.engines[0].kind, EngineKind::Voicevox);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = ServerConfig::load("/nonexistent/presenter.yaml").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "9090"),
            ("MCP_BACKLOG_URL", "http://bridge:3001"),
            ("KOKORO_TTS_URL", "http://kokoro:8882"),
            ("TTS_ENGINE", "mlx-audio"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.port, 9090);
        assert_eq!(config.gateway.project_data_url, "http://bridge:3001");
        let kokoro = config.speech.engines.iter().find(|e| e.name == "kokoro").unwrap();
        assert_eq!(kokoro.base_url, "http://kokoro:8882");

        let first = config.speech.engines.iter().min_by_key(|e| e.priority).unwrap();
        assert_eq!(first.kind, EngineKind::MlxAudio);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = ServerConfig::default();
        config.generation.worker_count = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        let dup = config.speech.engines[0].clone();
        config.speech.engines.push(dup);
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.speech.audio_format = "../wav".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_websocket_url() {
        let mut config = ServerConfig::default();
        assert_eq!(config.websocket_url("abc"), "ws://localhost:8080/ws/slides/abc");
        config.public_url = Some("https://slides.example.com/".to_string());
        assert_eq!(config.websocket_url("abc"), "wss://slides.example.com/ws/slides/abc");
    }
}
