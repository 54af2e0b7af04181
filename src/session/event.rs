//! Generation events pushed to subscribers

use serde::{Deserialize, Serialize};

use crate::core::types::Theme;

/// One step of a session's progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    #[serde(rename_all = "camelCase")]
    ProgressUpdate { theme_index: usize, percent: u8 },

    #[serde(rename_all = "camelCase")]
    SlideProduced {
        index: usize,
        theme: Theme,
        title: String,
        markdown: String,
        narration_text: String,
        degraded: bool,
        /// Cached narration audio, present when the session asked for narration
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio_url: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    SessionCompleted { total_slides: usize, duration_ms: u64 },

    #[serde(rename_all = "camelCase")]
    SessionFailed { reason: String },
}

impl GenerationEvent {
    /// Completed and Failed end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionCompleted { .. } | Self::SessionFailed { .. })
    }

    /// Only progress updates may be discarded when the replay buffer is full
    pub fn is_droppable(&self) -> bool {
        matches!(self, Self::ProgressUpdate { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProgressUpdate { .. } => "progress_update",
            Self::SlideProduced { .. } => "slide_produced",
            Self::SessionCompleted { .. } => "session_completed",
            Self::SessionFailed { .. } => "session_failed",
        }
    }
}

/// Event with its per-session sequence number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub event: GenerationEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let event = SequencedEvent {
            seq: 3,
            event: GenerationEvent::SlideProduced {
                index: 0,
                theme: Theme::RiskAnalysis,
                title: "Risks".into(),
                markdown: "# Risks".into(),
                narration_text: "Two risks remain.".into(),
                degraded: false,
                audio_url: None,
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "seq": 3,
                "type": "slide_produced",
                "index": 0,
                "theme": "risk_analysis",
                "title": "Risks",
                "markdown": "# Risks",
                "narrationText": "Two risks remain.",
                "degraded": false
            })
        );

        let progress = SequencedEvent {
            seq: 1,
            event: GenerationEvent::ProgressUpdate { theme_index: 0, percent: 50 },
        };
        assert_eq!(
            serde_json::to_value(&progress).unwrap(),
            json!({"seq": 1, "type": "progress_update", "themeIndex": 0, "percent": 50})
        );
    }

    #[test]
    fn test_audio_url_only_when_narrated() {
        let event = GenerationEvent::SlideProduced {
            index: 1,
            theme: Theme::SummaryPlan,
            title: "Plan".into(),
            markdown: "# Plan".into(),
            narration_text: "Next steps.".into(),
            degraded: false,
            audio_url: Some("/cache/abc.wav".into()),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["audioUrl"], "/cache/abc.wav");

        let parsed: GenerationEvent = serde_json::from_value(json!({
            "type": "slide_produced",
            "index": 0,
            "theme": "summary_plan",
            "title": "Plan",
            "markdown": "",
            "narrationText": "",
            "degraded": true
        }))
        .unwrap();
        assert!(matches!(parsed, GenerationEvent::SlideProduced { audio_url: None, .. }));
    }

    #[test]
    fn test_event_classes() {
        let failed = GenerationEvent::SessionFailed { reason: "x".into() };
        assert!(failed.is_terminal());
        assert!(!failed.is_droppable());
        assert!(GenerationEvent::ProgressUpdate { theme_index: 0, percent: 10 }.is_droppable());
    }
}
