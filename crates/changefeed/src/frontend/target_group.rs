use crate::{
    Error, Result,
    health::{HealthCheckPolicy, HealthState, ProbeOutcome, TargetHealth},
    resource::ResourceId,
    topology::TargetGroupSpec,
};
use core::fmt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Address of a registered worker replica.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

struct Member {
    target: TargetId,
    health: TargetHealth,
}

/// Routing table of a frontend: registered targets and their health.
///
/// Only [`HealthState::Healthy`] members receive calls. Selection is round
/// robin over the healthy members at the time of the call, with no
/// affinity.
pub struct TargetGroup {
    id: ResourceId,
    policy: HealthCheckPolicy,
    members: RwLock<Vec<Member>>,
    next: AtomicUsize,
}

impl TargetGroup {
    pub fn new(id: ResourceId, policy: HealthCheckPolicy) -> Self {
        Self {
            id,
            policy,
            members: RwLock::new(Vec::new()),
            next: AtomicUsize::new(0),
        }
    }

    pub fn from_spec(spec: &TargetGroupSpec) -> Self {
        Self::new(spec.id.clone(), spec.health_check.clone())
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn policy(&self) -> &HealthCheckPolicy {
        &self.policy
    }

    /// Adds a target in its initial state. Returns `false` if it was
    /// already registered, leaving its health untouched.
    pub fn register(&self, target: TargetId) -> bool {
        let mut members = self.members.write();
        if members.iter().any(|m| m.target == target) {
            return false;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(group = %self.id, %target, "target registered");

        members.push(Member {
            target,
            health: TargetHealth::new(&self.policy),
        });
        true
    }

    pub fn deregister(&self, target: &TargetId) -> Result<()> {
        let mut members = self.members.write();
        let index = members
            .iter()
            .position(|m| &m.target == target)
            .ok_or_else(|| Error::UnknownTarget {
                target: target.to_string(),
            })?;
        members.remove(index);

        #[cfg(feature = "tracing")]
        tracing::debug!(group = %self.id, %target, "target deregistered");

        Ok(())
    }

    fn with_member<T>(&self, target: &TargetId, f: impl FnOnce(&mut TargetHealth) -> T) -> Result<T> {
        let mut members = self.members.write();
        members
            .iter_mut()
            .find(|m| &m.target == target)
            .map(|m| f(&mut m.health))
            .ok_or_else(|| Error::UnknownTarget {
                target: target.to_string(),
            })
    }

    /// Feeds an active probe result into the target's counters.
    pub fn observe_probe(&self, target: &TargetId, outcome: ProbeOutcome) -> Result<HealthState> {
        let passed = self.policy.passes(outcome);
        let policy = &self.policy;
        let (_before, after) = self.with_member(target, |health| {
            let before = health.state();
            (before, health.observe(passed, policy))
        })?;

        #[cfg(feature = "tracing")]
        if _before != after {
            tracing::info!(group = %self.id, %target, ?outcome, before = ?_before, ?after, "target health changed");
        }

        Ok(after)
    }

    /// Feeds the outcome of a routed call. An outcome outside the healthy
    /// set ejects the target at once; a healthy outcome changes nothing.
    pub fn observe_call(&self, target: &TargetId, outcome: ProbeOutcome) -> Result<HealthState> {
        if !self.policy.enabled || self.policy.passes(outcome) {
            return self.with_member(target, |health| health.state());
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(group = %self.id, %target, ?outcome, "call outside healthy set, ejecting");

        self.with_member(target, TargetHealth::eject)
    }

    /// Picks the next healthy target.
    pub fn route(&self) -> Result<TargetId> {
        let members = self.members.read();
        let healthy: Vec<&TargetId> = members
            .iter()
            .filter(|m| m.health.is_routable())
            .map(|m| &m.target)
            .collect();

        if healthy.is_empty() {
            return Err(Error::NoHealthyTargets {
                target_group: self.id.to_string(),
            });
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % healthy.len();
        Ok(healthy[index].clone())
    }

    pub fn state(&self, target: &TargetId) -> Option<HealthState> {
        self.members
            .read()
            .iter()
            .find(|m| &m.target == target)
            .map(|m| m.health.state())
    }

    /// Every registered target, in registration order.
    pub fn targets(&self) -> Vec<TargetId> {
        self.members.read().iter().map(|m| m.target.clone()).collect()
    }

    pub fn healthy_targets(&self) -> Vec<TargetId> {
        self.members
            .read()
            .iter()
            .filter(|m| m.health.is_routable())
            .map(|m| m.target.clone())
            .collect()
    }
}
