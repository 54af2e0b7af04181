//! Core types shared across the crate
//!
//! - `error`: the crate error taxonomy
//! - `types`: themes, languages and project identifiers

pub mod error;
pub mod types;

pub use error::{EngineAttempt, PresenterError, Result, ResultExt};
pub use types::{Language, ProjectId, Theme, MAX_THEMES};
