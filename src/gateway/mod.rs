//! Data/AI gateway
//!
//! Client side of the project data bridge and the content generator.

pub mod client;
pub mod error;
pub mod generator;
pub mod project;

pub use client::{Gateway, GatewayClient, HttpGateway, ServiceKind, CHAT_COMPLETION};
pub use error::{GatewayError, GatewayResult};
pub use generator::{ContentGenerator, SlideDraft};
pub use project::{ProjectDataClient, ProjectFacts};
