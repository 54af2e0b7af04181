//! Narration speech synthesis
//!
//! - `engine`: the `SpeechEngine` trait and audio types
//! - `engines`: HTTP engine implementations
//! - `cache`: fingerprint-addressed audio cache
//! - `gateway`: priority fallback over engines with caching

pub mod cache;
pub mod engine;
pub mod engines;
pub mod gateway;

pub use cache::{fingerprint, AudioRef, SpeechCache, SpeechCacheStats};
pub use engine::{AudioFormat, EngineDescriptor, EngineError, SpeechEngine, SynthesizedAudio, VoiceInfo};
pub use engines::build_engines;
pub use gateway::{EngineHealth, LanguageInfo, SpeechGateway, SpeechResult};
