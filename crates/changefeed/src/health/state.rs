use super::policy::HealthCheckPolicy;
use serde::Serialize;

/// Traffic eligibility of a single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Registered but not yet proven healthy. Receives no traffic.
    Initial,
    Healthy,
    Unhealthy,
}

/// Consecutive-result counters driving [`HealthState`] transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHealth {
    state: HealthState,
    consecutive_passes: u32,
    consecutive_failures: u32,
}

impl TargetHealth {
    /// A freshly registered target. With checks disabled it is routable
    /// immediately.
    pub fn new(policy: &HealthCheckPolicy) -> Self {
        Self {
            state: if policy.enabled {
                HealthState::Initial
            } else {
                HealthState::Healthy
            },
            consecutive_passes: 0,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn is_routable(&self) -> bool {
        self.state == HealthState::Healthy
    }

    /// Records an active probe result and returns the new state.
    pub fn observe(&mut self, passed: bool, policy: &HealthCheckPolicy) -> HealthState {
        if passed {
            self.consecutive_failures = 0;
            self.consecutive_passes = self.consecutive_passes.saturating_add(1);
            if self.state != HealthState::Healthy
                && self.consecutive_passes >= policy.healthy_threshold
            {
                self.state = HealthState::Healthy;
            }
        } else {
            self.consecutive_passes = 0;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            if self.consecutive_failures >= policy.unhealthy_threshold {
                self.state = HealthState::Unhealthy;
            }
        }
        self.state
    }

    /// Removes the target from rotation after a routed call answered outside
    /// the healthy set. Only later passing probes restore it.
    pub fn eject(&mut self) -> HealthState {
        self.consecutive_passes = 0;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.state = HealthState::Unhealthy;
        self.state
    }
}
