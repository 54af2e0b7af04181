//! Session data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core::error::{PresenterError, Result};
use crate::core::types::{Language, ProjectId, Theme, MAX_THEMES};

/// Opaque session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = PresenterError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| PresenterError::session_not_found(s))
    }
}

/// Overall session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Created,
    Fetching,
    Generating { done: usize, total: usize },
    Streaming,
    Completed,
    Failed { reason: String },
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Fetching => "fetching",
            Self::Generating { .. } => "generating",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

/// Per-theme state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ThemeState {
    Pending,
    InProgress,
    Done,
    Degraded { reason: String },
}

/// Generation request as received from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default)]
    pub project_id: ProjectId,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub language: String,
    /// Synthesize each slide's narration through the speech gateway
    #[serde(default)]
    pub narrate: bool,
}

impl GenerationRequest {
    pub fn new(project_id: impl Into<String>, themes: &[&str], language: &str) -> Self {
        Self {
            project_id: ProjectId::new(project_id),
            themes: themes.iter().map(|t| t.to_string()).collect(),
            language: language.to_string(),
            narrate: false,
        }
    }

    pub fn with_narration(mut self) -> Self {
        self.narrate = true;
        self
    }

    /// Check every field, returning the typed request
    pub fn validate(&self) -> Result<ValidatedRequest> {
        if self.project_id.is_empty() {
            return Err(PresenterError::invalid_field("projectId", "project id is required"));
        }
        if self.themes.is_empty() {
            return Err(PresenterError::invalid_field("themes", "at least one theme is required"));
        }
        if self.themes.len() > MAX_THEMES {
            return Err(PresenterError::invalid_field(
                "themes",
                format!("at most {} themes are allowed, got {}", MAX_THEMES, self.themes.len()),
            ));
        }
        let themes = self
            .themes
            .iter()
            .map(|t| t.parse::<Theme>())
            .collect::<Result<Vec<_>>>()?;
        let language = self.language.parse::<Language>()?;

        Ok(ValidatedRequest {
            project_id: self.project_id.clone(),
            themes,
            language,
            narrate: self.narrate,
        })
    }
}

/// A request that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub project_id: ProjectId,
    pub themes: Vec<Theme>,
    pub language: Language,
    pub narrate: bool,
}

/// Per-theme entry in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeProgress {
    pub theme: Theme,
    pub state: ThemeState,
}

/// Point-in-time copy of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub project_id: ProjectId,
    pub language: Language,
    pub status: SessionStatus,
    pub themes: Vec<ThemeProgress>,
    pub slides_released: usize,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Failure reason, set only for failed sessions
    pub fn reason(&self) -> Option<&str> {
        match &self.status {
            SessionStatus::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ok() {
        let req = GenerationRequest::new("42", &["project_overview", "risk_analysis"], "en");
        let valid = req.validate().unwrap();
        assert_eq!(valid.themes, vec![Theme::ProjectOverview, Theme::RiskAnalysis]);
        assert_eq!(valid.language, Language::En);
    }

    #[test]
    fn test_validate_rejects() {
        let cases = [
            GenerationRequest::new("42", &[], "en"),
            GenerationRequest::new("", &["project_overview"], "en"),
            GenerationRequest::new("42", &["project_overview"], "fr"),
            GenerationRequest::new("42", &["project_overview", "astrology"], "ja"),
            GenerationRequest::new("42", &["summary_plan"; 11], "ja"),
        ];
        for req in cases {
            let err = req.validate().unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR", "{:?}", req);
        }
    }

    #[test]
    fn test_request_accepts_numeric_project_id() {
        let req: GenerationRequest =
            serde_json::from_str(r#"{"projectId": 12345, "themes": ["notifications"], "language": "ja"}"#).unwrap();
        assert_eq!(req.project_id.as_str(), "12345");
        assert!(!req.narrate);
        assert!(req.validate().is_ok());

        let req: GenerationRequest = serde_json::from_str(
            r#"{"projectId": "P", "themes": ["notifications"], "language": "en", "narrate": true}"#,
        )
        .unwrap();
        assert!(req.validate().unwrap().narrate);
    }

    #[test]
    fn test_session_id_parse() {
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed { reason: "x".into() }.is_terminal());
        assert!(!SessionStatus::Generating { done: 1, total: 2 }.is_terminal());
    }
}
