use super::target_group::{TargetGroup, TargetId};
use crate::health::{HealthState, ProbeOutcome};
use core::future::Future;
use std::sync::Arc;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;

/// Sends one health request to a target and reports what came back.
///
/// Implementations report transport failures as
/// [`ProbeOutcome::TransportError`]; the checker applies the timeout.
pub trait HealthProbe: Send + Sync {
    fn probe(&self, target: &TargetId) -> impl Future<Output = ProbeOutcome> + Send;
}

/// Actively probes every member of a [`TargetGroup`] on the policy's
/// interval.
pub struct HealthChecker<P> {
    group: Arc<TargetGroup>,
    probe: P,
}

impl<P: HealthProbe> HealthChecker<P> {
    pub fn new(group: Arc<TargetGroup>, probe: P) -> Self {
        Self { group, probe }
    }

    /// Probes each registered target once, in registration order. Targets
    /// deregistered mid-round are skipped.
    pub async fn check_once(&self) -> Vec<(TargetId, HealthState)> {
        let policy_timeout = self.group.policy().timeout;
        let mut results = Vec::new();

        for target in self.group.targets() {
            let outcome = timeout(policy_timeout, self.probe.probe(&target))
                .await
                .unwrap_or(ProbeOutcome::Timeout);
            if let Ok(state) = self.group.observe_probe(&target, outcome) {
                results.push((target, state));
            }
        }
        results
    }

    /// Runs probe rounds until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        if !self.group.policy().enabled {
            return;
        }
        let mut ticker = interval(self.group.policy().interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        #[cfg(feature = "tracing")]
        tracing::debug!(group = %self.group.id(), "health checker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.check_once().await;
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(group = %self.group.id(), "health checker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{health::HealthCheckPolicy, resource::ResourceId};
    use core::time::Duration;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use tonic::Code;

    #[derive(Default, Clone)]
    struct ScriptedProbe {
        outcomes: Arc<Mutex<HashMap<TargetId, ProbeOutcome>>>,
        hang: Arc<Mutex<Vec<TargetId>>>,
    }

    impl ScriptedProbe {
        fn set(&self, target: &str, outcome: ProbeOutcome) {
            self.outcomes.lock().insert(target.into(), outcome);
        }
    }

    impl HealthProbe for ScriptedProbe {
        async fn probe(&self, target: &TargetId) -> ProbeOutcome {
            let hang = self.hang.lock().contains(target);
            if hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.outcomes
                .lock()
                .get(target)
                .copied()
                .unwrap_or(ProbeOutcome::TransportError)
        }
    }

    fn group() -> Arc<TargetGroup> {
        Arc::new(TargetGroup::new(
            ResourceId::new("tg"),
            HealthCheckPolicy {
                interval: Duration::from_secs(10),
                timeout: Duration::from_secs(2),
                healthy_threshold: 2,
                unhealthy_threshold: 2,
                ..HealthCheckPolicy::default()
            },
        ))
    }

    #[tokio::test]
    async fn probes_drive_state() {
        let group = group();
        group.register("a".into());
        group.register("b".into());
        let probe = ScriptedProbe::default();
        probe.set("a", ProbeOutcome::Status(Code::Ok));
        probe.set("b", ProbeOutcome::Status(Code::Unavailable));
        let checker = HealthChecker::new(Arc::clone(&group), probe);

        checker.check_once().await;
        assert!(group.healthy_targets().is_empty());
        let states = checker.check_once().await;
        assert_eq!(
            states,
            vec![
                (TargetId::from("a"), HealthState::Healthy),
                (TargetId::from("b"), HealthState::Unhealthy),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probe_times_out() {
        let group = group();
        group.register("a".into());
        let probe = ScriptedProbe::default();
        probe.set("a", ProbeOutcome::Status(Code::Ok));
        probe.hang.lock().push("a".into());
        let checker = HealthChecker::new(Arc::clone(&group), probe);

        checker.check_once().await;
        checker.check_once().await;
        assert_eq!(group.state(&"a".into()), Some(HealthState::Unhealthy));
    }

    #[tokio::test(start_paused = true)]
    async fn run_probes_until_cancelled() {
        let group = group();
        group.register("a".into());
        let probe = ScriptedProbe::default();
        probe.set("a", ProbeOutcome::Status(Code::Ok));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            HealthChecker::new(Arc::clone(&group), probe).run(shutdown.clone()),
        );

        // First tick fires immediately, the second after one interval.
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(group.healthy_targets(), vec![TargetId::from("a")]);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
