//! Speech Engine Traits
//!
//! Defines the interface for text-to-speech backends

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::server::config::EngineConfig;

/// Encoded audio container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
    Ogg,
    Flac,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" => Some(Self::Wav),
            "mp3" => Some(Self::Mp3),
            "ogg" => Some(Self::Ogg),
            "flac" => Some(Self::Flac),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::Ogg => "audio/ogg",
            Self::Flac => "audio/flac",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Audio returned by an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
}

/// Engine failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("[{engine}] engine unavailable: {message}")]
    Unavailable { engine: String, message: String },

    #[error("[{engine}] request failed ({status}): {message}")]
    Http {
        engine: String,
        status: u16,
        message: String,
    },

    #[error("[{engine}] timed out after {}ms", .after.as_millis())]
    Timeout { engine: String, after: Duration },

    #[error("[{engine}] invalid response: {message}")]
    InvalidResponse { engine: String, message: String },
}

impl EngineError {
    pub fn unavailable(engine: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Unavailable {
            engine: engine.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            engine: engine.into(),
            message: message.into(),
        }
    }

    pub fn from_reqwest(engine: &str, err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                engine: engine.to_string(),
                after: timeout,
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                engine: engine.to_string(),
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::unavailable(engine, err)
        }
    }
}

/// Voice offered by an engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub language: String,
    pub gender: String,
    pub engine: String,
}

impl VoiceInfo {
    pub fn new(engine: &str, id: &str, name: &str, language: &str, gender: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            language: language.to_string(),
            gender: gender.to_string(),
            engine: engine.to_string(),
        }
    }
}

/// Static description of a configured engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineDescriptor {
    pub name: String,
    pub kind: String,
    pub priority: u32,
    pub languages: Vec<String>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub version: String,
    pub base_url: String,
}

impl EngineDescriptor {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            name: config.name.clone(),
            kind: config.kind.as_str().to_string(),
            priority: config.priority,
            languages: config.languages.clone(),
            timeout: config.timeout(),
            version: config.version.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn supports_language(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l.eq_ignore_ascii_case(language))
    }

    /// `name@version`, the engine's contribution to cache fingerprints
    pub fn version_tag(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_secs())
    }
}

/// Text-to-speech backend
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn descriptor(&self) -> &EngineDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn supports_language(&self, language: &str) -> bool {
        self.descriptor().supports_language(language)
    }

    /// Synthesize `text`; the gateway applies the engine timeout
    async fn synthesize(&self, text: &str, language: &str, voice: &str) -> Result<SynthesizedAudio, EngineError>;

    /// Check if engine is reachable
    async fn health_check(&self) -> bool {
        true
    }

    /// Voices this engine offers
    fn voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }
}
