//! HTTP speech engines
//!
//! - VOICEVOX: two-step `audio_query` then `synthesis`
//! - Kokoro: `/api/tts` returns an `audio_url` to download
//! - MLX-Audio: `/api/tts` returns WAV bytes directly

pub mod kokoro;
pub mod mlx_audio;
pub mod voicevox;

pub use kokoro::KokoroEngine;
pub use mlx_audio::MlxAudioEngine;
pub use voicevox::VoicevoxEngine;

use reqwest::{Client, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::engine::{EngineDescriptor, EngineError, SpeechEngine};
use crate::core::error::{PresenterError, Result};
use crate::server::config::{EngineKind, SpeechConfig};

/// Build the enabled engines from configuration, sorted by priority
pub fn build_engines(config: &SpeechConfig) -> Result<Vec<Arc<dyn SpeechEngine>>> {
    let mut engines: Vec<Arc<dyn SpeechEngine>> = Vec::new();
    for engine in config.engines.iter().filter(|e| e.enabled) {
        let descriptor = EngineDescriptor::from_config(engine);
        let built: Arc<dyn SpeechEngine> = match engine.kind {
            EngineKind::Voicevox => Arc::new(VoicevoxEngine::new(descriptor)?),
            EngineKind::Kokoro => Arc::new(KokoroEngine::new(descriptor)?),
            EngineKind::MlxAudio => Arc::new(MlxAudioEngine::new(descriptor)?),
        };
        info!(
            engine = built.name(),
            priority = engine.priority,
            url = %engine.base_url,
            "registered speech engine"
        );
        engines.push(built);
    }
    engines.sort_by_key(|e| e.descriptor().priority);
    Ok(engines)
}

fn http_client(descriptor: &EngineDescriptor) -> Result<Client> {
    Client::builder()
        .timeout(descriptor.timeout)
        .build()
        .map_err(|e| PresenterError::config(format!("failed to create HTTP client for {}: {}", descriptor.name, e)))
}

/// Pass successful responses through, turn the rest into `EngineError::Http`
async fn ensure_success(engine: &str, response: Response) -> std::result::Result<Response, EngineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(EngineError::Http {
        engine: engine.to_string(),
        status: status.as_u16(),
        message: body.chars().take(200).collect(),
    })
}

/// Probe `url` with a short GET
async fn probe(client: &Client, url: &str) -> bool {
    match client.get(url).timeout(Duration::from_secs(5)).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

/// Female unless the requested voice asks for a male one
fn wants_male_voice(voice: &str) -> bool {
    let voice = voice.to_lowercase();
    voice.contains("male") && !voice.contains("female")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::config::ServerConfig;

    #[test]
    fn test_build_engines_sorted_and_filtered() {
        let mut config = ServerConfig::default();
        config.promote_engine("kokoro");
        config.speech.engines[2].enabled = false;

        let engines = build_engines(&config.speech).unwrap();
        let names: Vec<_> = engines.iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, vec!["kokoro", "voicevox"]);
    }

    #[test]
    fn test_voice_gender() {
        assert!(wants_male_voice("voicevox-ja-male"));
        assert!(!wants_male_voice("mlx-ja-female"));
        assert!(!wants_male_voice("default"));
    }
}
