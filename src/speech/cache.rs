//! Speech Audio Cache
//!
//! Content-addressed cache of synthesized narration. Artifacts live at
//! `<cache_dir>/<fingerprint>.<ext>` and are served under `/cache/`.
//! An in-memory index avoids touching the disk for known fingerprints,
//! artifacts left by a previous run are picked up on first lookup.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::engine::{AudioFormat, SynthesizedAudio};
use crate::core::error::{PresenterError, Result, ResultExt};

/// Hex length of a SHA-256 fingerprint
pub const FINGERPRINT_LEN: usize = 64;

/// Collapse runs of whitespace and trim
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cache key for a synthesis request
///
/// Covers the normalized text, language, voice and the version string of
/// the engine set, so reconfiguring engines never serves stale audio.
pub fn fingerprint(text: &str, language: &str, voice: &str, engine_set_version: &str) -> String {
    let normalized = normalize_text(text);
    let mut hasher = Sha256::new();
    for part in [normalized.as_str(), language, voice, engine_set_version] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Duration of a WAV payload from its header
pub fn wav_duration(bytes: &[u8]) -> Option<f64> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let rate = reader.spec().sample_rate;
    if rate == 0 {
        return None;
    }
    Some(reader.duration() as f64 / rate as f64)
}

/// Speaking-time estimate: chars/3 words at 150 words per minute, at least 1s
pub fn estimate_duration(text: &str) -> f64 {
    let words = (text.chars().count() / 3).max(1);
    (words as f64 / 150.0 * 60.0).max(1.0)
}

/// A cached artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioRef {
    pub fingerprint: String,
    #[serde(skip)]
    pub location: PathBuf,
    pub url_path: String,
    pub format: AudioFormat,
    pub duration_secs: f64,
    /// Engine that produced the audio, unknown for artifacts from a previous run
    pub engine: Option<String>,
}

impl AudioRef {
    fn new(dir: &Path, fingerprint: &str, format: AudioFormat, duration_secs: f64, engine: Option<String>) -> Self {
        let file_name = format!("{}.{}", fingerprint, format.extension());
        Self {
            fingerprint: fingerprint.to_string(),
            location: dir.join(&file_name),
            url_path: format!("/cache/{}", file_name),
            format,
            duration_secs,
            engine,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct SpeechCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

impl SpeechCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct SpeechCache {
    dir: PathBuf,
    /// Extension tried first when probing the disk
    preferred: AudioFormat,
    index: DashMap<String, AudioRef>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl SpeechCache {
    pub fn new(dir: impl Into<PathBuf>, preferred: AudioFormat) -> Self {
        Self {
            dir: dir.into(),
            preferred,
            index: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Find an artifact for `fingerprint`, checking the index then the disk
    ///
    /// Counts a hit when found. `text` is used for the duration estimate of
    /// non-WAV artifacts found on disk.
    pub async fn lookup(&self, fingerprint: &str, text: &str) -> Option<AudioRef> {
        let indexed = self.index.get(fingerprint).map(|r| r.value().clone());
        if let Some(audio) = indexed {
            if tokio::fs::try_exists(&audio.location).await.unwrap_or(false) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(audio);
            }
            warn!(fingerprint, "cached artifact vanished from disk");
            self.index.remove(fingerprint);
        }

        let found = self.load_from_disk(fingerprint, text).await?;
        self.index.insert(fingerprint.to_string(), found.clone());
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(found)
    }

    async fn load_from_disk(&self, fingerprint: &str, text: &str) -> Option<AudioRef> {
        let formats = std::iter::once(self.preferred)
            .chain([AudioFormat::Wav, AudioFormat::Mp3, AudioFormat::Ogg, AudioFormat::Flac]);
        let mut seen = Vec::new();
        for format in formats {
            if seen.contains(&format) {
                continue;
            }
            seen.push(format);
            let path = self.dir.join(format!("{}.{}", fingerprint, format.extension()));
            let Ok(bytes) = tokio::fs::read(&path).await else {
                continue;
            };
            if bytes.is_empty() {
                continue;
            }
            let duration = duration_of(format, &bytes, text);
            debug!(fingerprint, path = %path.display(), "found artifact on disk");
            return Some(AudioRef::new(&self.dir, fingerprint, format, duration, None));
        }
        None
    }

    /// Count a request that had to go to the engines
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Write audio under `fingerprint` and index it
    ///
    /// The bytes go to a temporary file that is renamed into place, so
    /// readers never observe a partial artifact.
    pub async fn store(&self, fingerprint: &str, text: &str, audio: &SynthesizedAudio, engine: &str) -> Result<AudioRef> {
        tokio::fs::create_dir_all(&self.dir).await.with_path(&self.dir)?;

        let duration = duration_of(audio.format, &audio.bytes, text);
        let entry = AudioRef::new(&self.dir, fingerprint, audio.format, duration, Some(engine.to_string()));
        let tmp = self.dir.join(format!(".{}.{}.tmp", fingerprint, uuid::Uuid::new_v4().simple()));

        if let Err(e) = tokio::fs::write(&tmp, &audio.bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_path(&tmp);
        }
        if let Err(e) = tokio::fs::rename(&tmp, &entry.location).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_path(&entry.location);
        }

        self.writes.fetch_add(1, Ordering::Relaxed);
        self.index.insert(fingerprint.to_string(), entry.clone());
        debug!(fingerprint, engine, bytes = audio.bytes.len(), "stored artifact");
        Ok(entry)
    }

    /// Drop an entry from the index and the disk
    pub async fn invalidate(&self, fingerprint: &str) -> Result<bool> {
        match self.index.remove(fingerprint) {
            Some((_, entry)) => {
                match tokio::fs::remove_file(&entry.location).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e).with_path(&entry.location),
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Map a public file name (`<fingerprint>.<ext>`) to its path
    pub fn resolve_file(&self, name: &str) -> Result<(PathBuf, AudioFormat)> {
        let invalid = || PresenterError::invalid_field("file", format!("invalid cache file name: {}", name));
        let (stem, ext) = name.split_once('.').ok_or_else(invalid)?;
        if stem.len() != FINGERPRINT_LEN || !stem.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(invalid());
        }
        let format = AudioFormat::from_extension(ext).ok_or_else(invalid)?;
        Ok((self.dir.join(name), format))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn stats(&self) -> SpeechCacheStats {
        SpeechCacheStats {
            entries: self.index.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

fn duration_of(format: AudioFormat, bytes: &[u8], text: &str) -> f64 {
    match format {
        AudioFormat::Wav => wav_duration(bytes).unwrap_or_else(|| estimate_duration(text)),
        _ => estimate_duration(text),
    }
}
