//! Shared per-session state
//!
//! All transitions and the events they emit happen under one lock, so the
//! status seen by `get` and the event stream never disagree, and nothing is
//! published after the terminal event. Lock order is session then bus channel.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::bus::EventBus;
use super::event::GenerationEvent;
use super::types::{
    SessionId, SessionSnapshot, SessionStatus, ThemeProgress, ThemeState, ValidatedRequest,
};
use crate::core::types::{Language, ProjectId, Theme};

/// Content of a slide ready for release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideContent {
    pub title: String,
    pub markdown: String,
    pub narration: String,
    /// Why the slide is a placeholder, if it is one
    pub degraded: Option<String>,
    /// Synthesized narration, served from the speech cache
    pub audio_url: Option<String>,
}

impl SlideContent {
    /// Stand-in slide for a theme that could not be generated
    pub fn placeholder(theme: Theme, language: Language, reason: impl Into<String>) -> Self {
        let title = theme.default_title(language).to_string();
        let note = language.unavailable_note();
        Self {
            markdown: format!("# {}\n\n{}\n", title, note),
            narration: note.to_string(),
            title,
            degraded: Some(reason.into()),
            audio_url: None,
        }
    }
}

struct SessionInner {
    status: SessionStatus,
    theme_states: Vec<ThemeState>,
    slides_released: usize,
    finished_at: Option<DateTime<Utc>>,
    finished_instant: Option<Instant>,
}

pub struct Session {
    id: SessionId,
    project_id: ProjectId,
    themes: Vec<Theme>,
    language: Language,
    narrate: bool,
    created_at: DateTime<Utc>,
    started: Instant,
    cancel: CancellationToken,
    bus: Arc<EventBus>,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub fn new(id: SessionId, request: ValidatedRequest, bus: Arc<EventBus>) -> Self {
        let theme_states = vec![ThemeState::Pending; request.themes.len()];
        Self {
            id,
            project_id: request.project_id,
            themes: request.themes,
            language: request.language,
            narrate: request.narrate,
            created_at: Utc::now(),
            started: Instant::now(),
            cancel: CancellationToken::new(),
            bus,
            inner: Mutex::new(SessionInner {
                status: SessionStatus::Created,
                theme_states,
                slides_released: 0,
                finished_at: None,
                finished_instant: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn themes(&self) -> &[Theme] {
        &self.themes
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Whether released slides carry synthesized narration
    pub fn narrate(&self) -> bool {
        self.narrate
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            id: self.id,
            project_id: self.project_id.clone(),
            language: self.language,
            status: inner.status.clone(),
            themes: self
                .themes
                .iter()
                .zip(inner.theme_states.iter())
                .map(|(theme, state)| ThemeProgress {
                    theme: *theme,
                    state: state.clone(),
                })
                .collect(),
            slides_released: inner.slides_released,
            created_at: self.created_at,
            finished_at: inner.finished_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.lock().status.is_terminal()
    }

    /// Time since the session reached a terminal state
    pub fn finished_for(&self) -> Option<Duration> {
        self.lock().finished_instant.map(|t| t.elapsed())
    }

    /// Move to a non-terminal status; false if the session already ended
    fn advance(&self, status: SessionStatus) -> bool {
        let mut inner = self.lock();
        if inner.status.is_terminal() {
            return false;
        }
        debug!(session = %self.id, from = inner.status.as_str(), to = status.as_str(), "session transition");
        inner.status = status;
        true
    }

    pub fn begin_fetch(&self) -> bool {
        self.advance(SessionStatus::Fetching)
    }

    pub fn begin_generating(&self) -> bool {
        self.advance(SessionStatus::Generating {
            done: 0,
            total: self.themes.len(),
        })
    }

    pub fn mark_in_progress(&self, index: usize) {
        let mut inner = self.lock();
        if inner.status.is_terminal() {
            return;
        }
        if let Some(state) = inner.theme_states.get_mut(index) {
            if *state == ThemeState::Pending {
                *state = ThemeState::InProgress;
            }
        }
    }

    /// Publish theme `index` as the next slide in declared order.
    ///
    /// Emits `ProgressUpdate` then `SlideProduced`. Returns false if the
    /// session already ended.
    pub fn release_slide(&self, index: usize, slide: SlideContent) -> bool {
        let mut inner = self.lock();
        if inner.status.is_terminal() {
            return false;
        }
        let total = self.themes.len();
        let theme = match self.themes.get(index) {
            Some(theme) => *theme,
            None => return false,
        };

        let percent = (((index + 1) * 100) / total.max(1)) as u8;
        let events = [
            GenerationEvent::ProgressUpdate {
                theme_index: index,
                percent,
            },
            GenerationEvent::SlideProduced {
                index,
                theme,
                title: slide.title,
                markdown: slide.markdown,
                narration_text: slide.narration,
                degraded: slide.degraded.is_some(),
                audio_url: slide.audio_url,
            },
        ];
        for event in events {
            if let Err(e) = self.bus.publish(self.id, event) {
                warn!(session = %self.id, "slide event not published: {}", e);
            }
        }

        inner.theme_states[index] = match slide.degraded {
            Some(reason) => ThemeState::Degraded { reason },
            None => ThemeState::Done,
        };
        inner.slides_released += 1;
        let done = inner.slides_released;
        inner.status = if done == total {
            SessionStatus::Streaming
        } else {
            SessionStatus::Generating { done, total }
        };
        true
    }

    /// Terminal success; only the first terminal transition emits an event
    pub fn complete(&self) -> bool {
        let mut inner = self.lock();
        if inner.status.is_terminal() {
            return false;
        }
        let duration_ms = self.started.elapsed().as_millis() as u64;
        inner.status = SessionStatus::Completed;
        inner.finished_at = Some(Utc::now());
        inner.finished_instant = Some(Instant::now());

        let event = GenerationEvent::SessionCompleted {
            total_slides: inner.slides_released,
            duration_ms,
        };
        if let Err(e) = self.bus.publish(self.id, event) {
            warn!(session = %self.id, "completion event not published: {}", e);
        }
        info!(session = %self.id, slides = inner.slides_released, duration_ms, "session completed");
        true
    }

    /// Terminal failure; cancels in-flight work. Returns false if already terminal.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let mut inner = self.lock();
        if inner.status.is_terminal() {
            return false;
        }
        inner.status = SessionStatus::Failed {
            reason: reason.clone(),
        };
        inner.finished_at = Some(Utc::now());
        inner.finished_instant = Some(Instant::now());
        self.cancel.cancel();

        if let Err(e) = self.bus.publish(self.id, GenerationEvent::SessionFailed { reason: reason.clone() }) {
            warn!(session = %self.id, "failure event not published: {}", e);
        }
        warn!(session = %self.id, %reason, "session failed");
        true
    }
}
