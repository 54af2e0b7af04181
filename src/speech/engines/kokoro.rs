//! Kokoro TTS Engine
//!
//! Multilingual engine. `POST /api/tts` renders the audio server-side and
//! answers with an `audio_url`, which is then downloaded.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ensure_success, http_client, probe};
use crate::core::error::Result;
use crate::speech::engine::{
    AudioFormat, EngineDescriptor, EngineError, SpeechEngine, SynthesizedAudio, VoiceInfo,
};

const DEFAULT_VOICE: &str = "af_heart";

#[derive(Debug, Serialize)]
struct TtsBody<'a> {
    text: &'a str,
    language: &'a str,
    voice: &'a str,
    format: &'a str,
    speed: f32,
}

#[derive(Debug, Deserialize)]
struct TtsResponse {
    audio_url: Option<String>,
}

pub struct KokoroEngine {
    descriptor: EngineDescriptor,
    client: Client,
}

impl KokoroEngine {
    pub fn new(descriptor: EngineDescriptor) -> Result<Self> {
        let client = http_client(&descriptor)?;
        Ok(Self { descriptor, client })
    }

    fn download_url(&self, audio_url: &str) -> String {
        if audio_url.starts_with("http://") || audio_url.starts_with("https://") {
            audio_url.to_string()
        } else {
            format!("{}/{}", self.descriptor.base_url, audio_url.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl SpeechEngine for KokoroEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn synthesize(&self, text: &str, language: &str, _voice: &str) -> std::result::Result<SynthesizedAudio, EngineError> {
        let name = self.name();
        let timeout = self.descriptor.timeout;
        let body = TtsBody {
            text,
            language,
            voice: DEFAULT_VOICE,
            format: "wav",
            speed: 1.0,
        };

        let response = self
            .client
            .post(format!("{}/api/tts", self.descriptor.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::from_reqwest(name, e, timeout))?;
        let rendered: TtsResponse = ensure_success(name, response)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::invalid(name, e.to_string()))?;
        let audio_url = rendered
            .audio_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| EngineError::invalid(name, "response has no audio_url"))?;

        let response = self
            .client
            .get(self.download_url(&audio_url))
            .send()
            .await
            .map_err(|e| EngineError::from_reqwest(name, e, timeout))?;
        let bytes = ensure_success(name, response)
            .await?
            .bytes()
            .await
            .map_err(|e| EngineError::from_reqwest(name, e, timeout))?;

        if bytes.is_empty() {
            return Err(EngineError::invalid(name, "empty audio"));
        }
        Ok(SynthesizedAudio {
            bytes: bytes.to_vec(),
            format: AudioFormat::Wav,
        })
    }

    async fn health_check(&self) -> bool {
        probe(&self.client, &format!("{}/health", self.descriptor.base_url)).await
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        let name = self.name();
        self.descriptor
            .languages
            .iter()
            .map(|lang| {
                VoiceInfo::new(
                    name,
                    &format!("kokoro-{}-heart", lang),
                    &format!("Natural Voice {} (Kokoro)", lang),
                    lang,
                    "female",
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::config::ServerConfig;

    fn engine() -> KokoroEngine {
        let config = ServerConfig::default();
        KokoroEngine::new(EngineDescriptor::from_config(&config.speech.engines[1])).unwrap()
    }

    #[test]
    fn test_download_url() {
        let engine = engine();
        assert_eq!(engine.download_url("/audio/x.wav"), "http://localhost:8882/audio/x.wav");
        assert_eq!(engine.download_url("http://cdn/x.wav"), "http://cdn/x.wav");
    }

    #[test]
    fn test_voice_per_language() {
        let voices = engine().voices();
        assert_eq!(voices.len(), 8);
        assert!(voices.iter().any(|v| v.id == "kokoro-en-heart"));
    }
}
