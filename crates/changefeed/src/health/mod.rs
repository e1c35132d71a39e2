//! Protocol-aware health checking.
//!
//! - [`codes`] - Healthy gRPC status code sets and their range syntax.
//! - [`policy`] - Thresholds, interval and timeout of a target group's checks.
//! - [`state`] - Per-target state machine driven by probe results.

mod codes;
mod policy;
mod state;

pub use codes::{HealthyCodes, MAX_CODE};
pub use policy::{HealthCheckPolicy, ProbeOutcome};
pub use state::{HealthState, TargetHealth};
