//! Generation pipeline
//!
//! Drives one session from `Created` to a terminal state:
//!
//! ```text
//! Created -> Fetching -> Generating{done, total} -> Streaming -> Completed
//!                |                 |
//!                +-------> Failed <+  (fetch error, generator down, cancellation)
//! ```
//!
//! Themes are generated concurrently, bounded by a semaphore, and released
//! strictly in declared order through a reorder buffer. A theme that fails
//! permanently, or runs out of retries on timeouts, rate limits or 5xx,
//! becomes a degraded placeholder slide. A generator that stays unreachable
//! or rejects our credentials fails the whole session.
//!
//! Sessions created with `narrate` also get each slide's narration
//! synthesized before release; missing audio never changes the outcome.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use super::state::{Session, SlideContent};
use crate::core::error::PresenterError;
use crate::core::types::Theme;
use crate::gateway::{ContentGenerator, GatewayClient, GatewayError, ProjectDataClient, ProjectFacts};
use crate::server::config::GenerationConfig;
use crate::speech::SpeechGateway;

pub struct Pipeline {
    project_data: ProjectDataClient,
    generator: ContentGenerator,
    retry: RetryPolicy,
    worker_count: usize,
    speech: Option<Arc<SpeechGateway>>,
}

impl Pipeline {
    pub fn new(
        project_data: ProjectDataClient,
        generator: ContentGenerator,
        retry: RetryPolicy,
        worker_count: usize,
    ) -> Self {
        Self {
            project_data,
            generator,
            retry,
            worker_count: worker_count.max(1),
            speech: None,
        }
    }

    /// Enable narration audio for sessions that request it
    pub fn with_speech(mut self, speech: Arc<SpeechGateway>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Pipeline over a single gateway serving both services
    pub fn from_gateway(gateway: GatewayClient, config: &GenerationConfig) -> Self {
        Self::new(
            ProjectDataClient::new(gateway.clone()),
            ContentGenerator::new(gateway),
            RetryPolicy::from_config(config),
            config.worker_count,
        )
    }

    /// Run a session to completion
    pub async fn run(self: Arc<Self>, session: Arc<Session>) {
        let cancel = session.cancel_token().clone();
        let id = session.id();

        if !session.begin_fetch() {
            return;
        }
        let facts = match self.project_data.fetch_facts(session.project_id(), &cancel).await {
            Ok(facts) => Arc::new(facts),
            Err(e) => {
                let err = PresenterError::from(e);
                session.fail(format!("project data fetch failed: {}", err));
                return;
            }
        };
        if !session.begin_generating() {
            return;
        }
        info!(session = %id, themes = session.themes().len(), "generating slides");

        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        let mut tasks = JoinSet::new();
        for (index, theme) in session.themes().iter().copied().enumerate() {
            let pipeline = Arc::clone(&self);
            let session = Arc::clone(&session);
            let facts = Arc::clone(&facts);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                session.mark_in_progress(index);
                let outcome = pipeline.generate_theme(&session, index, theme, &facts).await;
                (index, outcome)
            });
        }

        let mut ready: BTreeMap<usize, SlideContent> = BTreeMap::new();
        let mut next = 0;
        loop {
            let joined = tokio::select! {
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    session.fail("session cancelled");
                    return;
                }
                joined = tasks.join_next() => joined,
            };

            match joined {
                None => break,
                Some(Ok((_, Err(err)))) => {
                    tasks.abort_all();
                    warn!(session = %id, "generation aborted: {}", err);
                    session.fail(format!("content generation failed: {}", err));
                    return;
                }
                Some(Ok((index, Ok(slide)))) => {
                    ready.insert(index, slide);
                    while let Some(slide) = ready.remove(&next) {
                        if !session.release_slide(next, slide) {
                            tasks.abort_all();
                            return;
                        }
                        debug!(session = %id, index = next, "slide released");
                        next += 1;
                    }
                }
                Some(Err(e)) => {
                    tasks.abort_all();
                    session.fail(format!("theme worker crashed: {}", e));
                    return;
                }
            }
        }

        session.complete();
    }

    async fn generate_theme(
        &self,
        session: &Session,
        index: usize,
        theme: Theme,
        facts: &ProjectFacts,
    ) -> Result<SlideContent, PresenterError> {
        let language = session.language();
        let cancel = session.cancel_token();
        let label = format!("session {} theme {} ({})", session.id(), index, theme);

        let (result, attempts) = self
            .retry
            .run(&label, cancel, |_| self.generator.generate_slide(theme, language, facts, cancel))
            .await;

        match result {
            Ok(draft) => {
                let audio_url = self.narrate(session, index, &draft.narration).await;
                Ok(SlideContent {
                    title: draft.title,
                    markdown: draft.markdown,
                    narration: draft.narration,
                    degraded: None,
                    audio_url,
                })
            }
            Err(e @ GatewayError::Cancelled { .. }) => Ok(SlideContent::placeholder(theme, language, e.to_string())),
            Err(e) if e.is_service_down() => Err(PresenterError::UpstreamUnavailable {
                service: e.service().to_string(),
                message: e.to_string(),
            }),
            Err(e) => {
                let reason = if e.is_retryable() {
                    format!("gave up after {} attempts: {}", attempts, e)
                } else {
                    PresenterError::ContentRejected {
                        theme: theme.to_string(),
                        message: e.to_string(),
                    }
                    .to_string()
                };
                warn!(session = %session.id(), %theme, attempts, "theme degraded: {}", reason);
                Ok(SlideContent::placeholder(theme, language, reason))
            }
        }
    }

    /// Audio URL for a slide's narration, if the session wants one
    async fn narrate(&self, session: &Session, index: usize, narration: &str) -> Option<String> {
        let speech = self.speech.as_ref().filter(|_| session.narrate())?;
        if narration.trim().is_empty() {
            return None;
        }
        match speech.synthesize(narration, session.language().code(), None).await {
            Ok(result) => Some(result.audio.url_path),
            Err(e) => {
                warn!(session = %session.id(), index, "narration audio unavailable: {}", e);
                None
            }
        }
    }
}
