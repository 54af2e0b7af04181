//! Session registry
//!
//! Owns every live session. Creation validates the request, opens the
//! session's event channel and spawns its pipeline; a background sweeper
//! evicts finished sessions and cancels sessions nobody is watching.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::bus::{EventBus, EventSubscription};
use super::pipeline::Pipeline;
use super::state::Session;
use super::types::{GenerationRequest, SessionId, SessionSnapshot};
use crate::core::error::{PresenterError, Result};
use crate::server::config::GenerationConfig;

pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    bus: Arc<EventBus>,
    pipeline: Arc<Pipeline>,
    idle_eviction: Duration,
    subscriber_grace: Duration,
}

impl SessionRegistry {
    pub fn new(pipeline: Pipeline, config: &GenerationConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            bus: Arc::new(EventBus::new(config.event_buffer_size, config.subscriber_queue_size)),
            pipeline: Arc::new(pipeline),
            idle_eviction: Duration::from_secs(config.idle_eviction_secs),
            subscriber_grace: Duration::from_secs(config.subscriber_grace_secs),
        }
    }

    /// Override the eviction and grace windows
    pub fn with_timeouts(mut self, idle_eviction: Duration, subscriber_grace: Duration) -> Self {
        self.idle_eviction = idle_eviction;
        self.subscriber_grace = subscriber_grace;
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Validate, register and start a session. Returns before generation begins.
    pub fn create(&self, request: &GenerationRequest) -> Result<SessionId> {
        let request = request.validate()?;

        let session = loop {
            let id = SessionId::new();
            if let Entry::Vacant(slot) = self.sessions.entry(id) {
                self.bus.open(id);
                let session = Arc::new(Session::new(id, request, Arc::clone(&self.bus)));
                slot.insert(Arc::clone(&session));
                break session;
            }
        };

        let id = session.id();
        info!(
            session = %id,
            project = %session.project_id(),
            themes = session.themes().len(),
            language = %session.language(),
            "session created"
        );
        tokio::spawn(Arc::clone(&self.pipeline).run(session));
        Ok(id)
    }

    /// Consistent copy of a session's state
    pub fn get(&self, id: &SessionId) -> Result<SessionSnapshot> {
        self.sessions
            .get(id)
            .map(|s| s.snapshot())
            .ok_or_else(|| PresenterError::session_not_found(id))
    }

    /// Cancel a session. Terminating a finished session is a no-op.
    pub fn terminate(&self, id: &SessionId, reason: &str) -> Result<()> {
        let session = self
            .sessions
            .get(id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| PresenterError::session_not_found(id))?;
        if session.fail(reason) {
            info!(session = %id, reason, "session terminated");
        }
        Ok(())
    }

    pub fn subscribe(&self, id: &SessionId) -> Result<EventSubscription> {
        if !self.sessions.contains_key(id) {
            return Err(PresenterError::session_not_found(id));
        }
        self.bus
            .subscribe(*id)
            .ok_or_else(|| PresenterError::session_not_found(id))
    }

    /// Sessions not yet in a terminal state
    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|s| !s.is_terminal()).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions that finished longer than the eviction window ago
    pub fn evict_expired(&self) -> usize {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| s.finished_for().is_some_and(|d| d >= self.idle_eviction))
            .map(|s| *s.key())
            .collect();

        for id in &expired {
            self.sessions.remove(id);
            self.bus.remove(id);
            debug!(session = %id, "session evicted");
        }
        expired.len()
    }

    /// Cancel running sessions whose subscribers all left more than the grace period ago
    pub fn enforce_subscriber_grace(&self) -> usize {
        let abandoned: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .filter(|s| !s.is_terminal())
            .filter(|s| {
                self.bus
                    .unattended_since(&s.id())
                    .is_some_and(|since| since.elapsed() >= self.subscriber_grace)
            })
            .map(|s| Arc::clone(s.value()))
            .collect();

        abandoned
            .iter()
            .filter(|s| s.fail("all subscribers disconnected"))
            .count()
    }

    /// Periodically run eviction and the subscriber grace check
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let cancelled = registry.enforce_subscriber_grace();
                        let evicted = registry.evict_expired();
                        if cancelled > 0 || evicted > 0 {
                            info!(cancelled, evicted, remaining = registry.len(), "session sweep");
                        }
                    }
                }
            }
        })
    }
}
