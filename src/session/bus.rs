//! Event bus for generation sessions
//!
//! Each session owns a channel with:
//! - a bounded replay buffer (oldest progress updates are shed first)
//! - any number of subscribers, each with its own bounded queue
//! - a closed flag set by the terminal event
//!
//! A subscriber takes its replay snapshot and registers for live events
//! under the same lock, so it sees every event exactly once and in order.
//! Slow subscribers are disconnected instead of stalling the publisher.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::event::{GenerationEvent, SequencedEvent};
use super::types::SessionId;

/// Publish failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("No event channel for session {0}")]
    UnknownSession(SessionId),

    #[error("Event channel for session {0} is closed")]
    Closed(SessionId),
}

/// Aggregate bus counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub channels: usize,
    pub subscribers: usize,
    pub events_published: u64,
    pub subscribers_dropped: u64,
}

struct ChannelState {
    next_seq: u64,
    history: VecDeque<Arc<SequencedEvent>>,
    subscribers: Vec<mpsc::Sender<Arc<SequencedEvent>>>,
    closed: bool,
    ever_subscribed: bool,
    /// Set when the subscriber list becomes empty after having subscribers
    unattended_since: Option<Instant>,
}

struct SessionChannel {
    state: Mutex<ChannelState>,
}

impl SessionChannel {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(ChannelState {
                next_seq: 1,
                history: VecDeque::with_capacity(capacity),
                subscribers: Vec::new(),
                closed: false,
                ever_subscribed: false,
                unattended_since: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChannelState {
    /// Drop subscribers whose receiving side has gone away
    fn prune_closed(&mut self) {
        let before = self.subscribers.len();
        self.subscribers.retain(|tx| !tx.is_closed());
        if before > 0 && self.subscribers.is_empty() && self.unattended_since.is_none() {
            self.unattended_since = Some(Instant::now());
        }
    }
}

/// Live half of a subscription plus its replay snapshot
#[derive(Debug)]
pub struct EventSubscription {
    replay: VecDeque<Arc<SequencedEvent>>,
    live: Option<mpsc::Receiver<Arc<SequencedEvent>>>,
}

impl EventSubscription {
    /// Next event; buffered history first, then live events.
    /// Returns `None` once the stream has ended or this subscriber was disconnected.
    pub async fn recv(&mut self) -> Option<Arc<SequencedEvent>> {
        if let Some(event) = self.replay.pop_front() {
            return Some(event);
        }
        match self.live.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Number of replayed events not yet consumed
    pub fn pending_replay(&self) -> usize {
        self.replay.len()
    }
}

/// Per-session publish/subscribe with replay
pub struct EventBus {
    channels: DashMap<SessionId, Arc<SessionChannel>>,
    buffer_size: usize,
    queue_size: usize,
    events_published: AtomicU64,
    subscribers_dropped: AtomicU64,
}

impl EventBus {
    pub fn new(buffer_size: usize, queue_size: usize) -> Self {
        Self {
            channels: DashMap::new(),
            buffer_size: buffer_size.max(1),
            queue_size: queue_size.max(1),
            events_published: AtomicU64::new(0),
            subscribers_dropped: AtomicU64::new(0),
        }
    }

    /// Open the channel for a session; no-op if it already exists
    pub fn open(&self, id: SessionId) {
        self.channels
            .entry(id)
            .or_insert_with(|| Arc::new(SessionChannel::new(self.buffer_size)));
    }

    /// Remove a session's channel and buffer
    pub fn remove(&self, id: &SessionId) {
        if let Some((_, channel)) = self.channels.remove(id) {
            let mut state = channel.lock();
            state.closed = true;
            state.subscribers.clear();
        }
    }

    fn channel(&self, id: &SessionId) -> Option<Arc<SessionChannel>> {
        self.channels.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Append an event, assign its sequence number and fan it out.
    ///
    /// A terminal event closes the channel: live queues end after draining and
    /// later publishes are rejected.
    pub fn publish(&self, id: SessionId, event: GenerationEvent) -> Result<u64, PublishError> {
        let channel = self.channel(&id).ok_or(PublishError::UnknownSession(id))?;
        let mut state = channel.lock();
        if state.closed {
            return Err(PublishError::Closed(id));
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let terminal = event.is_terminal();
        let kind = event.kind();
        let event = Arc::new(SequencedEvent { seq, event });

        if state.history.len() >= self.buffer_size {
            if let Some(pos) = state.history.iter().position(|e| e.event.is_droppable()) {
                state.history.remove(pos);
            }
        }
        state.history.push_back(Arc::clone(&event));

        let mut dropped = 0u64;
        state.subscribers.retain(|tx| match tx.try_send(Arc::clone(&event)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                dropped += 1;
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if dropped > 0 {
            warn!(session = %id, dropped, "disconnected slow subscribers");
            self.subscribers_dropped.fetch_add(dropped, Ordering::Relaxed);
        }
        if state.ever_subscribed && state.subscribers.is_empty() && state.unattended_since.is_none() {
            state.unattended_since = Some(Instant::now());
        }

        if terminal {
            state.closed = true;
            state.subscribers.clear();
        }
        self.events_published.fetch_add(1, Ordering::Relaxed);
        debug!(session = %id, seq, kind, "event published");
        Ok(seq)
    }

    /// Subscribe to a session's events, starting with the buffered history
    pub fn subscribe(&self, id: SessionId) -> Option<EventSubscription> {
        let channel = self.channel(&id)?;
        let mut state = channel.lock();

        let replay: VecDeque<_> = state.history.iter().cloned().collect();
        let live = if state.closed {
            None
        } else {
            let (tx, rx) = mpsc::channel(self.queue_size);
            state.subscribers.push(tx);
            state.ever_subscribed = true;
            state.unattended_since = None;
            Some(rx)
        };

        debug!(session = %id, replay = replay.len(), live = live.is_some(), "subscriber attached");
        Some(EventSubscription { replay, live })
    }

    /// Live subscriber count
    pub fn subscriber_count(&self, id: &SessionId) -> usize {
        match self.channel(id) {
            Some(channel) => {
                let mut state = channel.lock();
                state.prune_closed();
                state.subscribers.len()
            }
            None => 0,
        }
    }

    /// When the last subscriber of a session left, if it had any and none remain
    pub fn unattended_since(&self, id: &SessionId) -> Option<Instant> {
        let channel = self.channel(id)?;
        let mut state = channel.lock();
        state.prune_closed();
        if state.subscribers.is_empty() {
            state.unattended_since
        } else {
            None
        }
    }

    /// Copy of the buffered history
    pub fn history(&self, id: &SessionId) -> Vec<Arc<SequencedEvent>> {
        self.channel(id)
            .map(|c| c.lock().history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_closed(&self, id: &SessionId) -> bool {
        self.channel(id).map(|c| c.lock().closed).unwrap_or(true)
    }

    pub fn stats(&self) -> BusStats {
        let subscribers = self
            .channels
            .iter()
            .map(|entry| entry.value().lock().subscribers.len())
            .sum();
        BusStats {
            channels: self.channels.len(),
            subscribers,
            events_published: self.events_published.load(Ordering::Relaxed),
            subscribers_dropped: self.subscribers_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Theme;

    fn slide(index: usize) -> GenerationEvent {
        GenerationEvent::SlideProduced {
            index,
            theme: Theme::ProjectOverview,
            title: format!("Slide {}", index),
            markdown: String::new(),
            narration_text: String::new(),
            degraded: false,
            audio_url: None,
        }
    }

    fn progress(index: usize) -> GenerationEvent {
        GenerationEvent::ProgressUpdate {
            theme_index: index,
            percent: 10,
        }
    }

    #[tokio::test]
    async fn test_replay_then_live() {
        let bus = EventBus::new(16, 16);
        let id = SessionId::new();
        bus.open(id);

        assert_eq!(bus.publish(id, progress(0)).unwrap(), 1);
        assert_eq!(bus.publish(id, slide(0)).unwrap(), 2);

        let mut sub = bus.subscribe(id).unwrap();
        assert_eq!(sub.pending_replay(), 2);
        bus.publish(id, slide(1)).unwrap();
        bus.publish(id, GenerationEvent::SessionCompleted { total_slides: 2, duration_ms: 5 })
            .unwrap();

        let mut seqs = Vec::new();
        while let Some(event) = sub.recv().await {
            seqs.push(event.seq);
        }
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_replay_and_end() {
        let bus = EventBus::new(16, 16);
        let id = SessionId::new();
        bus.open(id);
        bus.publish(id, slide(0)).unwrap();
        bus.publish(id, GenerationEvent::SessionFailed { reason: "stop".into() }).unwrap();

        let mut sub = bus.subscribe(id).unwrap();
        assert_eq!(sub.recv().await.unwrap().seq, 1);
        assert_eq!(sub.recv().await.unwrap().seq, 2);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_publish_after_terminal_rejected() {
        let bus = EventBus::new(16, 16);
        let id = SessionId::new();
        bus.open(id);
        bus.publish(id, GenerationEvent::SessionCompleted { total_slides: 0, duration_ms: 0 })
            .unwrap();
        assert_eq!(bus.publish(id, slide(0)), Err(PublishError::Closed(id)));

        let unknown = SessionId::new();
        assert_eq!(bus.publish(unknown, slide(0)), Err(PublishError::UnknownSession(unknown)));
    }

    #[test]
    fn test_buffer_sheds_progress_first() {
        let bus = EventBus::new(3, 16);
        let id = SessionId::new();
        bus.open(id);
        bus.publish(id, progress(0)).unwrap();
        bus.publish(id, slide(0)).unwrap();
        bus.publish(id, progress(1)).unwrap();
        bus.publish(id, slide(1)).unwrap();
        bus.publish(id, slide(2)).unwrap();

        let kinds: Vec<_> = bus.history(&id).iter().map(|e| (e.seq, e.event.kind())).collect();
        assert_eq!(
            kinds,
            vec![(2, "slide_produced"), (4, "slide_produced"), (5, "slide_produced")]
        );
    }

    #[tokio::test]
    async fn test_slow_subscriber_disconnected() {
        let bus = EventBus::new(64, 2);
        let id = SessionId::new();
        bus.open(id);

        let mut slow = bus.subscribe(id).unwrap();
        let mut fast = bus.subscribe(id).unwrap();

        for i in 0..2 {
            bus.publish(id, slide(i)).unwrap();
            assert!(fast.recv().await.is_some());
        }
        // slow queue is now full, the next publish disconnects it
        bus.publish(id, slide(2)).unwrap();
        assert_eq!(fast.recv().await.unwrap().seq, 3);
        assert_eq!(bus.subscriber_count(&id), 1);
        assert_eq!(bus.stats().subscribers_dropped, 1);

        // the slow subscriber drains what it had, then ends
        assert_eq!(slow.recv().await.unwrap().seq, 1);
        assert_eq!(slow.recv().await.unwrap().seq, 2);
        assert!(slow.recv().await.is_none());
    }

    #[test]
    fn test_unattended_tracking() {
        let bus = EventBus::new(8, 8);
        let id = SessionId::new();
        bus.open(id);
        assert!(bus.unattended_since(&id).is_none());

        let sub = bus.subscribe(id).unwrap();
        assert!(bus.unattended_since(&id).is_none());
        drop(sub);
        assert!(bus.unattended_since(&id).is_some());

        let _again = bus.subscribe(id).unwrap();
        assert!(bus.unattended_since(&id).is_none());
    }
}
