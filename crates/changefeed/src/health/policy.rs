use super::codes::HealthyCodes;
use core::time::Duration;
use serde::{Deserialize, Serialize};
use tonic::Code;

/// Result of a single active probe or routed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The worker answered with a gRPC status.
    Status(Code),
    /// No answer within the policy's timeout.
    Timeout,
    /// The connection could not be established or broke mid-call.
    TransportError,
}

/// Protocol-aware health-check policy of a target group.
///
/// gRPC carries errors in the `grpc-status` trailer while the HTTP status
/// stays 200, so health is decided on gRPC codes, not HTTP codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckPolicy {
    pub enabled: bool,
    pub healthy_codes: HealthyCodes,
    #[serde(with = "secs")]
    pub interval: Duration,
    #[serde(with = "secs")]
    pub timeout: Duration,
    /// Consecutive passing probes before a target receives traffic.
    pub healthy_threshold: u32,
    /// Consecutive failing probes before a target is removed from rotation.
    pub unhealthy_threshold: u32,
}

impl HealthCheckPolicy {
    /// Same thresholds as the default, accepting every code from 0 to 99.
    pub fn permissive() -> Self {
        Self {
            healthy_codes: HealthyCodes::permissive(),
            ..Self::default()
        }
    }

    pub fn passes(&self, outcome: ProbeOutcome) -> bool {
        match outcome {
            ProbeOutcome::Status(code) => self.healthy_codes.contains_code(code),
            ProbeOutcome::Timeout | ProbeOutcome::TransportError => false,
        }
    }
}

impl Default for HealthCheckPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            healthy_codes: HealthyCodes::liveness(),
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            healthy_threshold: 5,
            unhealthy_threshold: 2,
        }
    }
}

mod secs {
    use core::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
