//! MLX-Audio Engine
//!
//! `POST /api/tts` answers with WAV bytes.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{ensure_success, http_client, probe, wants_male_voice};
use crate::core::error::Result;
use crate::speech::engine::{
    AudioFormat, EngineDescriptor, EngineError, SpeechEngine, SynthesizedAudio, VoiceInfo,
};

#[derive(Debug, Serialize)]
struct TtsBody<'a> {
    text: &'a str,
    language: &'a str,
    voice: &'a str,
    format: &'a str,
    speed: f32,
}

pub struct MlxAudioEngine {
    descriptor: EngineDescriptor,
    client: Client,
}

impl MlxAudioEngine {
    pub fn new(descriptor: EngineDescriptor) -> Result<Self> {
        let client = http_client(&descriptor)?;
        Ok(Self { descriptor, client })
    }
}

#[async_trait]
impl SpeechEngine for MlxAudioEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn synthesize(&self, text: &str, language: &str, voice: &str) -> std::result::Result<SynthesizedAudio, EngineError> {
        let name = self.name();
        let timeout = self.descriptor.timeout;
        let body = TtsBody {
            text,
            language,
            voice: if wants_male_voice(voice) { "male" } else { "female" },
            format: "wav",
            speed: 1.0,
        };

        let response = self
            .client
            .post(format!("{}/api/tts", self.descriptor.base_url))
            .header(reqwest::header::ACCEPT, "audio/wav")
            .json(&body)
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
        vec![
            VoiceInfo::new(name, "mlx-ja-female", "Japanese Female (MLX-Audio)", "ja", "female"),
            VoiceInfo::new(name, "mlx-ja-male", "Japanese Male (MLX-Audio)", "ja", "male"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::config::ServerConfig;

    #[test]
    fn test_japanese_voices() {
        let config = ServerConfig::default();
        let engine = MlxAudioEngine::new(EngineDescriptor::from_config(&config.speech.engines[2])).unwrap();
        let voices = engine.voices();
        assert_eq!(voices.len(), 2);
        assert!(voices.iter().all(|v| v.language == "ja"));
        assert_eq!(engine.name(), "mlx_audio");
    }
}
