//! Subscriber fan-out and the background tasks that feed it.

pub mod coordinator;
pub mod registry;
