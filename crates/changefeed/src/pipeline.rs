//! Local runtime of an assembled topology.
//!
//! [`Pipeline::launch`] instantiates the in-process record store, change
//! stream and frontend described by an [`Assembly`], wires capture the way
//! the topology says, and enforces the assembly's grants on every access.
//! Worker replicas are registered with the frontend as fresh targets and
//! receive traffic only after passing health checks.

use crate::{
    Error, Result,
    frontend::{RpcFrontend, TargetGroup, TargetId},
    grants::GrantSet,
    ingest::IngestFunction,
    resource::ResourceId,
    store::RecordStore,
    stream::{ArrivalClock, ChangeStream, SystemClock},
    topology::Assembly,
    worker::Worker,
};
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Running stores and streams, by identifier.
#[derive(Default)]
pub struct Resources {
    stores: BTreeMap<ResourceId, Arc<RecordStore>>,
    streams: BTreeMap<ResourceId, Arc<ChangeStream>>,
}

impl Resources {
    pub fn store(&self, id: &str) -> Option<Arc<RecordStore>> {
        self.stores.get(&ResourceId::new(id)).cloned()
    }

    pub fn stream(&self, id: &str) -> Option<Arc<ChangeStream>> {
        self.streams.get(&ResourceId::new(id)).cloned()
    }
}

pub struct Pipeline {
    assembly: Assembly,
    grants: Arc<GrantSet>,
    resources: Resources,
    store: Arc<RecordStore>,
    stream: Arc<ChangeStream>,
    frontend: RpcFrontend,
    replica_generation: AtomicUsize,
}

impl Pipeline {
    pub fn launch(assembly: Assembly) -> Result<Self> {
        Self::launch_with_clock(assembly, Arc::new(SystemClock))
    }

    /// Like [`Pipeline::launch`], with change records stamped by `clock`.
    pub fn launch_with_clock(assembly: Assembly, clock: Arc<dyn ArrivalClock>) -> Result<Self> {
        let topology = &assembly.topology;
        let stream = Arc::new(ChangeStream::with_clock(topology.change_stream(), clock));
        let store = Arc::new(RecordStore::new(topology.record_store()));

        if let Some(target) = &topology.record_store().change_stream {
            if target != stream.id() {
                return Err(Error::configuration(
                    format!("record store `{}` captures into unknown stream `{target}`", store.id()),
                    "Reassemble the topology.",
                ));
            }
            store.attach(Arc::clone(&stream))?;
        }

        let service = topology.service();
        let target_group = Arc::new(TargetGroup::from_spec(&service.target_group));
        let frontend = RpcFrontend::new(service.listener.clone(), target_group);

        let mut resources = Resources::default();
        resources.stores.insert(store.id().clone(), Arc::clone(&store));
        resources.streams.insert(stream.id().clone(), Arc::clone(&stream));

        #[cfg(feature = "tracing")]
        tracing::info!(stack = topology.stack(), "pipeline launched");

        Ok(Self {
            grants: Arc::new(assembly.grants.clone()),
            assembly,
            resources,
            store,
            stream,
            frontend,
            replica_generation: AtomicUsize::new(0),
        })
    }

    pub fn assembly(&self) -> &Assembly {
        &self.assembly
    }

    pub fn grants(&self) -> &Arc<GrantSet> {
        &self.grants
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn stream(&self) -> &Arc<ChangeStream> {
        &self.stream
    }

    pub fn frontend(&self) -> &RpcFrontend {
        &self.frontend
    }

    /// An ingest function running as its own principal with its own
    /// environment.
    pub fn ingest(&self) -> Result<IngestFunction> {
        let spec = self.assembly.topology.ingest();
        IngestFunction::from_env(
            &spec.environment,
            spec.principal.clone(),
            Arc::clone(&self.grants),
            |id| self.resources.store(id),
        )
    }

    /// A worker replica's logic, bound through the container environment.
    pub fn worker(&self) -> Result<Worker> {
        let task = &self.assembly.topology.service().task_definition;
        Worker::from_env(
            &task.container.environment,
            task.principal.clone(),
            Arc::clone(&self.grants),
            &self.resources,
        )
    }

    fn next_target(&self) -> TargetId {
        let generation = self.replica_generation.fetch_add(1, Ordering::Relaxed);
        let pool = &self.assembly.topology.service().worker_pool.id;
        TargetId::new(format!("{pool}-{generation}"))
    }

    /// Starts the pool's desired replicas and registers each with the
    /// frontend.
    pub fn start_replicas(&self) -> Vec<TargetId> {
        let replicas = self.assembly.topology.service().worker_pool.replicas();
        (0..replicas)
            .map(|_| {
                let target = self.next_target();
                self.frontend.target_group().register(target.clone());
                target
            })
            .collect()
    }

    /// Replaces a crashed replica. The replacement starts unhealthy.
    pub fn replace_replica(&self, crashed: &TargetId) -> Result<TargetId> {
        self.frontend.target_group().deregister(crashed)?;
        let target = self.next_target();
        self.frontend.target_group().register(target.clone());

        #[cfg(feature = "tracing")]
        tracing::info!(%crashed, replacement = %target, "replica replaced");

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        health::{HealthCheckPolicy, HealthState, ProbeOutcome},
        ingest::WriteRequest,
        stream::{EventName, IteratorPosition, StreamConsumer},
        topology::{AssemblyParams, TopologyAssembler},
        worker::Snapshot,
    };
    use core::cell::Cell;
    use tonic::{Code, Status};

    const ARN: &str = "arn:aws:acm:eu-west-1:123456789012:certificate/0a1b2c3d";

    fn launch(replicas: Option<u32>) -> Pipeline {
        let params = AssemblyParams {
            worker_replicas: replicas,
            health_check: HealthCheckPolicy {
                healthy_threshold: 1,
                unhealthy_threshold: 2,
                ..HealthCheckPolicy::default()
            },
            ..AssemblyParams::new(Some(ARN.to_string()))
        };
        let assembly = TopologyAssembler::new().assemble(&params).unwrap();
        Pipeline::launch(assembly).unwrap()
    }

    fn probe_all(pipeline: &Pipeline, code: Code) {
        let group = pipeline.frontend().target_group();
        for target in group.targets() {
            group
                .observe_probe(&target, ProbeOutcome::Status(code))
                .unwrap();
        }
    }

    fn worker_consumer(pipeline: &Pipeline) -> StreamConsumer {
        let principal = pipeline.assembly().topology.service().principal().clone();
        let reader = pipeline
            .stream()
            .reader(principal, Arc::clone(pipeline.grants()));
        StreamConsumer::new(reader, IteratorPosition::TrimHorizon).unwrap()
    }

    #[test]
    fn write_is_stored_and_captured_exactly_once() {
        let pipeline = launch(None);
        let ingest = pipeline.ingest().unwrap();
        let mut worker = pipeline.worker().unwrap();
        let mut consumer = worker_consumer(&pipeline);

        assert!(consumer.poll().unwrap().is_empty());
        assert!(worker.poll().unwrap().is_empty());

        ingest
            .handle(WriteRequest::new("rec-1").with_payload("x"))
            .unwrap();

        let records = consumer.poll().unwrap();
        assert_eq!(records.len(), 1);
        let change = records[0].change().unwrap();
        assert_eq!(change.event_name, EventName::Insert);
        assert_eq!(change.key("id"), Some("rec-1"));
        assert_eq!(
            change.dynamodb.new_image.as_ref().and_then(|i| i.get_str("payload")),
            Some("x")
        );
        assert!(consumer.poll().unwrap().is_empty());

        assert_eq!(
            worker.poll().unwrap(),
            vec![Snapshot {
                id: "rec-1".to_string(),
                value: None,
            }]
        );

        let principal = pipeline.assembly().topology.service().principal().clone();
        let reader = pipeline.store().handle(principal, Arc::clone(pipeline.grants()));
        let stored = reader.get_item("rec-1").unwrap();
        assert_eq!(stored.get_str("id"), Some("rec-1"));
        assert_eq!(stored.get_str("payload"), Some("x"));
    }

    #[test]
    fn worker_sees_current_values() {
        let pipeline = launch(None);
        let ingest = pipeline.ingest().unwrap();
        let mut worker = pipeline.worker().unwrap();

        ingest.handle(WriteRequest::new("a").with_value(10.0)).unwrap();
        ingest.handle(WriteRequest::new("a").with_value(20.0)).unwrap();

        // Both events resolve to the value at read time.
        let snapshots = worker.poll().unwrap();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|s| s.value == Some(20.0)));
    }

    #[test]
    fn ingest_principal_cannot_touch_the_stream() {
        let pipeline = launch(None);
        let ingest = pipeline.ingest().unwrap();
        let reader = pipeline
            .stream()
            .reader(ingest.principal().clone(), Arc::clone(pipeline.grants()));
        assert!(matches!(reader.list_shards(), Err(Error::AccessDenied { .. })));
    }

    #[test]
    fn worker_principal_cannot_write() {
        let pipeline = launch(None);
        let worker = pipeline.worker().unwrap();
        let handle = pipeline
            .store()
            .handle(worker.principal().clone(), Arc::clone(pipeline.grants()));
        assert!(matches!(
            handle.delete_item("rec-1"),
            Err(Error::AccessDenied { .. })
        ));
    }

    #[tokio::test]
    async fn failed_call_excludes_member_until_a_later_probe_passes() {
        let pipeline = launch(Some(2));
        let targets = pipeline.start_replicas();
        probe_all(&pipeline, Code::Ok);
        let frontend = pipeline.frontend();
        let bad = targets[0].clone();

        // Route until the bad member answers once with UNAVAILABLE.
        loop {
            let dispatched = frontend
                .dispatch(|target| {
                    let bad = bad.clone();
                    async move {
                        if target == bad {
                            Err::<(), _>(Status::unavailable("draining"))
                        } else {
                            Ok(())
                        }
                    }
                })
                .await
                .unwrap();
            if dispatched.target == bad {
                assert!(dispatched.response.is_err());
                break;
            }
        }

        let group = frontend.target_group();
        assert_eq!(group.state(&bad), Some(HealthState::Unhealthy));
        for _ in 0..4 {
            let dispatched = frontend
                .dispatch(|_| async { Ok::<_, Status>(()) })
                .await
                .unwrap();
            assert_eq!(dispatched.target, targets[1]);
        }

        group
            .observe_probe(&bad, ProbeOutcome::Status(Code::Ok))
            .unwrap();
        let mut seen = Vec::new();
        for _ in 0..2 {
            let dispatched = frontend
                .dispatch(|_| async { Ok::<_, Status>(()) })
                .await
                .unwrap();
            seen.push(dispatched.target);
        }
        assert!(seen.contains(&bad));
    }

    #[tokio::test]
    async fn application_errors_do_not_eject() {
        let pipeline = launch(Some(1));
        let targets = pipeline.start_replicas();
        probe_all(&pipeline, Code::Ok);

        let dispatched = pipeline
            .frontend()
            .dispatch(|_| async { Err::<(), _>(Status::not_found("rec-9")) })
            .await
            .unwrap();
        assert_eq!(dispatched.target, targets[0]);
        assert_eq!(
            pipeline.frontend().target_group().state(&targets[0]),
            Some(HealthState::Healthy)
        );
    }

    #[tokio::test]
    async fn zero_replicas_fail_with_a_routing_error() {
        let pipeline = launch(Some(0));
        assert!(pipeline.start_replicas().is_empty());
        probe_all(&pipeline, Code::Ok);

        let called = Cell::new(false);
        let result = pipeline
            .frontend()
            .dispatch(|_| {
                called.set(true);
                async { Ok::<_, Status>(()) }
            })
            .await;
        assert!(matches!(result, Err(Error::NoHealthyTargets { .. })));
        assert!(!called.get());
        assert!(pipeline.frontend().target_group().healthy_targets().is_empty());
    }

    #[test]
    fn replacement_replica_starts_unhealthy() {
        let pipeline = launch(Some(1));
        let targets = pipeline.start_replicas();
        probe_all(&pipeline, Code::Ok);

        let replacement = pipeline.replace_replica(&targets[0]).unwrap();
        let group = pipeline.frontend().target_group();
        assert_ne!(replacement, targets[0]);
        assert_eq!(group.state(&replacement), Some(HealthState::Initial));
        assert!(matches!(group.route(), Err(Error::NoHealthyTargets { .. })));
        assert!(matches!(
            pipeline.replace_replica(&targets[0]),
            Err(Error::UnknownTarget { .. })
        ));
    }

    #[test]
    fn default_replica_count_is_one() {
        let pipeline = launch(None);
        let targets = pipeline.start_replicas();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].as_str(), "GrpcServer_GrpcService-0");
    }
}
