//! Speech Gateway
//!
//! Front door for narration audio. Requests are keyed by fingerprint; a cache
//! hit never reaches an engine. On a miss the engines are tried in priority
//! order and the first success is cached. Identical concurrent requests share
//! a single engine invocation.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::cache::{fingerprint, normalize_text, AudioRef, SpeechCache, SpeechCacheStats};
use super::engine::{AudioFormat, SpeechEngine, VoiceInfo};
use super::engines::build_engines;
use crate::core::error::{EngineAttempt, PresenterError, Result};
use crate::server::config::SpeechConfig;

/// Voice used when the request names none
pub const DEFAULT_VOICE: &str = "default";

/// Outcome of a synthesis request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechResult {
    pub audio: AudioRef,
    pub cache_hit: bool,
    pub language: String,
    pub voice: String,
}

/// Language offered by at least one engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    pub code: String,
    pub name: String,
    pub engines: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    pub name: String,
    pub kind: String,
    pub priority: u32,
    pub base_url: String,
    pub languages: Vec<String>,
    pub healthy: bool,
}

/// Native display name for a language code
pub fn language_name(code: &str) -> &'static str {
    match code {
        "ja" => "日本語",
        "en" => "English",
        "es" => "Español",
        "fr" => "Français",
        "hi" => "हिन्दी",
        "it" => "Italiano",
        "pt" => "Português",
        "zh" => "中文",
        _ => "Unknown",
    }
}

pub struct SpeechGateway {
    engines: Vec<Arc<dyn SpeechEngine>>,
    engine_set_version: String,
    cache: SpeechCache,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl SpeechGateway {
    pub fn new(mut engines: Vec<Arc<dyn SpeechEngine>>, cache: SpeechCache) -> Self {
        engines.sort_by_key(|e| e.descriptor().priority);
        let engine_set_version = engines
            .iter()
            .map(|e| e.descriptor().version_tag())
            .collect::<Vec<_>>()
            .join(",");
        Self {
            engines,
            engine_set_version,
            cache,
            inflight: DashMap::new(),
        }
    }

    pub fn from_config(config: &SpeechConfig) -> Result<Self> {
        let engines = build_engines(config)?;
        let format = AudioFormat::from_extension(&config.audio_format).unwrap_or_else(|| {
            warn!(format = %config.audio_format, "unknown audio format, probing wav first");
            AudioFormat::Wav
        });
        let cache = SpeechCache::new(&config.cache_dir, format);
        info!(
            engines = engines.len(),
            cache_dir = %config.cache_dir.display(),
            "speech gateway ready"
        );
        Ok(Self::new(engines, cache))
    }

    /// `name@version` of every engine in priority order
    pub fn engine_set_version(&self) -> &str {
        &self.engine_set_version
    }

    pub fn engines(&self) -> &[Arc<dyn SpeechEngine>] {
        &self.engines
    }

    pub fn cache(&self) -> &SpeechCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> SpeechCacheStats {
        self.cache.stats()
    }

    /// Synthesize narration, serving from cache when possible
    pub async fn synthesize(&self, text: &str, language: &str, voice: Option<&str>) -> Result<SpeechResult> {
        if normalize_text(text).is_empty() {
            return Err(PresenterError::invalid_field("text", "text must not be empty"));
        }
        let language = language.trim().to_lowercase();
        if language.is_empty() {
            return Err(PresenterError::invalid_field("language", "language must not be empty"));
        }
        let voice = voice.map(str::trim).filter(|v| !v.is_empty()).unwrap_or(DEFAULT_VOICE);
        let fp = fingerprint(text, &language, voice, &self.engine_set_version);

        if let Some(audio) = self.cache.lookup(&fp, text).await {
            debug!(fingerprint = %fp, "speech cache hit");
            return Ok(self.result(audio, true, &language, voice));
        }

        let gate = self
            .inflight
            .entry(fp.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = gate.lock().await;
        let outcome = self.synthesize_locked(&fp, text, &language, voice).await;
        drop(guard);
        // last one out removes the gate; clones only happen under the shard lock
        self.inflight.remove_if(&fp, |_, g| Arc::strong_count(g) <= 2);
        outcome
    }

    async fn synthesize_locked(&self, fp: &str, text: &str, language: &str, voice: &str) -> Result<SpeechResult> {
        // a concurrent identical request may have finished while we waited
        if let Some(audio) = self.cache.lookup(fp, text).await {
            return Ok(self.result(audio, true, language, voice));
        }
        self.cache.record_miss();

        let mut attempts = Vec::new();
        for engine in &self.engines {
            if !engine.supports_language(language) {
                debug!(engine = engine.name(), language, "engine skipped, language unsupported");
                continue;
            }
            let timeout = engine.descriptor().timeout;
            let error = match tokio::time::timeout(timeout, engine.synthesize(text, language, voice)).await {
                Ok(Ok(audio)) => {
                    let stored = self.cache.store(fp, text, &audio, engine.name()).await?;
                    info!(
                        engine = engine.name(),
                        fingerprint = fp,
                        duration = stored.duration_secs,
                        "synthesized narration"
                    );
                    return Ok(self.result(stored, false, language, voice));
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {}ms", timeout.as_millis()),
            };
            warn!(engine = engine.name(), error = %error, "speech engine failed, trying next");
            attempts.push(EngineAttempt {
                engine: engine.name().to_string(),
                error,
            });
        }

        Err(PresenterError::SynthesisExhausted {
            language: language.to_string(),
            attempts,
        })
    }

    fn result(&self, audio: AudioRef, cache_hit: bool, language: &str, voice: &str) -> SpeechResult {
        SpeechResult {
            audio,
            cache_hit,
            language: language.to_string(),
            voice: voice.to_string(),
        }
    }

    /// Voices of every engine, in priority order
    pub fn voices(&self) -> Vec<VoiceInfo> {
        self.engines.iter().flat_map(|e| e.voices()).collect()
    }

    /// Languages supported by at least one engine
    pub fn languages(&self) -> Vec<LanguageInfo> {
        let mut by_code: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for engine in &self.engines {
            for lang in &engine.descriptor().languages {
                by_code
                    .entry(lang.to_lowercase())
                    .or_default()
                    .push(engine.name().to_string());
            }
        }
        by_code
            .into_iter()
            .map(|(code, engines)| LanguageInfo {
                name: language_name(&code).to_string(),
                code,
                engines,
            })
            .collect()
    }

    /// Probe every engine concurrently
    pub async fn engine_health(&self) -> Vec<EngineHealth> {
        let probes = self.engines.iter().map(|e| async move {
            let d = e.descriptor();
            EngineHealth {
                name: d.name.clone(),
                kind: d.kind.clone(),
                priority: d.priority,
                base_url: d.base_url.clone(),
                languages: d.languages.clone(),
                healthy: e.health_check().await,
            }
        });
        join_all(probes).await
    }
}
