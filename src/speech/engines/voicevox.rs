//! VOICEVOX Engine
//!
//! Japanese-only engine. Synthesis is two requests:
//! `POST /audio_query?text=..&speaker=..` builds a query object which is then
//! posted back to `POST /synthesis?speaker=..` to get WAV audio.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{ensure_success, http_client, probe, wants_male_voice};
use crate::core::error::Result;
use crate::speech::engine::{
    AudioFormat, EngineDescriptor, EngineError, SpeechEngine, SynthesizedAudio, VoiceInfo,
};

/// Default speaker style
const SPEAKER_DEFAULT: u32 = 3;
/// Speaker used for male voice requests
const SPEAKER_MALE: u32 = 2;

pub struct VoicevoxEngine {
    descriptor: EngineDescriptor,
    client: Client,
}

impl VoicevoxEngine {
    pub fn new(descriptor: EngineDescriptor) -> Result<Self> {
        let client = http_client(&descriptor)?;
        Ok(Self { descriptor, client })
    }

    fn speaker_for(voice: &str) -> u32 {
        if wants_male_voice(voice) {
            SPEAKER_MALE
        } else {
            SPEAKER_DEFAULT
        }
    }
}

#[async_trait]
impl SpeechEngine for VoicevoxEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn synthesize(&self, text: &str, _language: &str, voice: &str) -> std::result::Result<SynthesizedAudio, EngineError> {
        let name = self.name();
        let base = &self.descriptor.base_url;
        let speaker = Self::speaker_for(voice).to_string();

        let response = self
            .client
            .post(format!("{}/audio_query", base))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .send()
            .await
            .map_err(|e| EngineError::from_reqwest(name, e, self.descriptor.timeout))?;
        let query: Value = ensure_success(name, response)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::invalid(name, format!("audio_query is not JSON: {}", e)))?;

        let response = self
            .client
            .post(format!("{}/synthesis", base))
            .query(&[("speaker", speaker.as_str())])
            .header(reqwest::header::ACCEPT, "audio/wav")
            .json(&query)
            .send()
            .await
            .map_err(|e| EngineError::from_reqwest(name, e, self.descriptor.timeout))?;
        let bytes = ensure_success(name, response)
            .await?
            .bytes()
            .await
            .map_err(|e| EngineError::from_reqwest(name, e, self.descriptor.timeout))?;

        if bytes.is_empty() {
            return Err(EngineError::invalid(name, "empty audio"));
        }
        Ok(SynthesizedAudio {
            bytes: bytes.to_vec(),
            format: AudioFormat::Wav,
        })
    }

    async fn health_check(&self) -> bool {
        probe(&self.client, &format!("{}/docs", self.descriptor.base_url)).await
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        let name = self.name();
        vec![
            VoiceInfo::new(name, "voicevox-ja-female", "Japanese Female (VOICEVOX)", "ja", "female"),
            VoiceInfo::new(name, "voicevox-ja-male", "Japanese Male (VOICEVOX)", "ja", "male"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaker_selection() {
        assert_eq!(VoicevoxEngine::speaker_for("voicevox-ja-male"), SPEAKER_MALE);
        assert_eq!(VoicevoxEngine::speaker_for("voicevox-ja-female"), SPEAKER_DEFAULT);
        assert_eq!(VoicevoxEngine::speaker_for(""), SPEAKER_DEFAULT);
    }
}
