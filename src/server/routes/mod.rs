//! HTTP route handlers

pub mod health;
pub mod sessions;
pub mod speech;
pub mod stats;
pub mod ws;
