//! Generation sessions
//!
//! - `types`: identifiers, status, requests and snapshots
//! - `event`: events streamed to subscribers
//! - `bus`: per-session replay buffer and fan-out
//! - `state`: shared session state and its transitions
//! - `retry`: backoff policy for per-theme generation
//! - `pipeline`: the per-session generation task
//! - `registry`: session ownership and the background sweeper

pub mod bus;
pub mod event;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod state;
pub mod types;

pub use bus::{BusStats, EventBus, EventSubscription, PublishError};
pub use event::{GenerationEvent, SequencedEvent};
pub use pipeline::Pipeline;
pub use registry::SessionRegistry;
pub use retry::RetryPolicy;
pub use state::{Session, SlideContent};
pub use types::{
    GenerationRequest, SessionId, SessionSnapshot, SessionStatus, ThemeProgress, ThemeState,
    ValidatedRequest,
};
