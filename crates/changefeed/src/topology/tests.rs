use super::*;
use crate::{
    Error, Result,
    grants::{AccessGrantResolver, AccessLevel, Action, Role, RuleTable, STREAM_READ},
    health::HealthCheckPolicy,
    resource::{Principal, ResourceId, ResourceKind},
};

const ARN: &str = "arn:aws:acm:us-east-1:123456789012:certificate/5f0c7a9e-abcd";

fn params() -> AssemblyParams {
    AssemblyParams::new(Some(ARN.to_string()))
}

fn assemble() -> Assembly {
    TopologyAssembler::new().assemble(&params()).unwrap()
}

/// Fails on the `n`th resource.
struct FailingProvisioner {
    remaining: usize,
    created: usize,
}

impl Provisioner for FailingProvisioner {
    fn provision(&mut self, resource: Resource<'_>) -> Result<()> {
        if self.remaining == 0 {
            return Err(Error::Provisioning {
                resource: resource.id().to_string(),
                reason: "quota exceeded".to_string(),
            });
        }
        self.remaining -= 1;
        self.created += 1;
        Ok(())
    }
}

#[test]
fn missing_certificate_performs_no_side_effects() {
    for arn in [None, Some(String::new()), Some("arn:bogus".to_string())] {
        let mut assembler = TopologyAssembler::new();
        let err = assembler.assemble(&AssemblyParams::new(arn)).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(assembler.provisioner().log().is_empty());
    }
}

#[test]
fn construction_follows_dependency_order() {
    let mut assembler = TopologyAssembler::new();
    assembler.assemble(&params()).unwrap();
    let kinds: Vec<_> = assembler.provisioner().log().iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ResourceKind::ChangeStream,
            ResourceKind::RecordStore,
            ResourceKind::IngestFunction,
            ResourceKind::Network,
            ResourceKind::Certificate,
            ResourceKind::Cluster,
            ResourceKind::ImageAsset,
            ResourceKind::TaskDefinition,
            ResourceKind::WorkerPool,
            ResourceKind::LoadBalancer,
            ResourceKind::TargetGroup,
            ResourceKind::Listener,
        ]
    );
}

#[test]
fn reused_assembler_logs_only_the_latest_assembly() {
    let mut assembler = TopologyAssembler::new();
    assembler.assemble(&params()).unwrap();
    let first = assembler.provisioner().log().to_vec();

    assembler.assemble(&params()).unwrap();
    assert_eq!(assembler.provisioner().log(), first.as_slice());

    assembler.assemble(&AssemblyParams::new(None)).unwrap_err();
    assert!(assembler.provisioner().log().is_empty());
}

#[test]
fn provisioning_failures_propagate_unchanged() {
    let mut assembler = TopologyAssembler::with_provisioner(FailingProvisioner {
        remaining: 3,
        created: 0,
    });
    let err = assembler.assemble(&params()).unwrap_err();
    assert_eq!(
        err,
        Error::Provisioning {
            resource: "GrpcVpc".to_string(),
            reason: "quota exceeded".to_string(),
        }
    );
    assert_eq!(assembler.provisioner().created, 3);
}

#[test]
fn store_captures_into_the_stream() {
    let assembly = assemble();
    let topology = &assembly.topology;
    assert_eq!(
        topology.record_store().change_stream.as_ref(),
        Some(&topology.change_stream().id)
    );
    assert_eq!(topology.record_store().key_schema.partition_key, "id");
    assert_eq!(topology.record_store().key_schema.key_type, AttributeType::String);
}

#[test]
fn environments_carry_resource_identifiers() {
    let assembly = assemble();
    let topology = &assembly.topology;
    let store = topology.record_store().id.to_string();
    let stream = topology.change_stream().id.to_string();

    assert_eq!(topology.ingest().environment.get(INGEST_STORE_ENV), Some(&store));
    assert_eq!(topology.ingest().environment.len(), 1);

    let env = &topology.service().task_definition.container.environment;
    assert_eq!(env.get(WORKER_STORE_ENV), Some(&store));
    assert_eq!(env.get(WORKER_STREAM_ENV), Some(&stream));
}

#[test]
fn ingest_principal_writes_store_and_never_sees_stream() {
    let assembly = assemble();
    let topology = &assembly.topology;
    let principal = &topology.ingest().principal;

    let actions = assembly
        .grants
        .actions(principal, &topology.record_store().id)
        .unwrap();
    assert!(actions.contains(&Action::StorePutItem));
    assert!(actions.iter().all(|a| a.level() == AccessLevel::Write));
    assert!(
        assembly
            .grants
            .actions(principal, &topology.change_stream().id)
            .is_none()
    );
}

#[test]
fn worker_principal_is_read_only() {
    let assembly = assemble();
    let topology = &assembly.topology;
    let principal = topology.service().principal();

    for resource in [&topology.record_store().id, &topology.change_stream().id] {
        let actions = assembly.grants.actions(principal, resource).unwrap();
        assert!(!actions.is_empty());
        assert!(actions.iter().all(|a| a.level() == AccessLevel::Read));
    }
    let stream_actions = assembly
        .grants
        .actions(principal, &topology.change_stream().id)
        .unwrap();
    assert_eq!(stream_actions.len(), STREAM_READ.len());
}

#[test]
fn every_grant_is_justified_by_an_edge() {
    let policies = [HealthCheckPolicy::default(), HealthCheckPolicy::permissive()];
    for replicas in [None, Some(0), Some(3)] {
        for shards in [1, 4] {
            for policy in &policies {
                let varied = AssemblyParams {
                    worker_replicas: replicas,
                    stream_shards: shards,
                    health_check: policy.clone(),
                    ..params()
                };
                let assembly = TopologyAssembler::new().assemble(&varied).unwrap();
                let edges = assembly.topology.edges();
                for grant in assembly.grants.iter() {
                    let wired = edges
                        .iter()
                        .any(|e| e.principal == grant.principal && e.resource == grant.resource);
                    assert!(wired, "{grant:?} has no wiring edge with {shards} shards");
                }
                assert_eq!(assembly.grants.len(), edges.len());
            }
        }
    }
}

#[test]
fn infrastructure_resources_receive_no_grants() {
    let assembly = assemble();
    let topology = &assembly.topology;
    for principal in [&topology.ingest().principal, topology.service().principal()] {
        for resource in assembly.grants.resources_of(principal) {
            let kind = topology.kind_of(resource).unwrap();
            assert!(matches!(
                kind,
                ResourceKind::RecordStore | ResourceKind::ChangeStream
            ));
        }
    }
}

#[test]
fn assembling_twice_yields_identical_grants() {
    let first = assemble();
    let second = assemble();
    assert_eq!(first.grants, second.grants);

    let resolver = AccessGrantResolver::default();
    assert_eq!(resolver.resolve(&first.topology).unwrap(), first.grants);
    assert_eq!(
        serde_json::to_string(&first.grants).unwrap(),
        serde_json::to_string(&second.grants).unwrap()
    );
}

#[test]
fn unanticipated_edge_is_a_grant_computation_error() {
    let assembly = assemble();
    let topology = assembly.topology.clone().with_edge(AccessEdge {
        principal: assembly.topology.ingest().principal.clone(),
        role: Role::Ingest,
        resource: assembly.topology.change_stream().id.clone(),
    });
    let err = AccessGrantResolver::default().resolve(&topology).unwrap_err();
    assert!(matches!(err, Error::GrantComputation { ref kind, .. } if kind == "change-stream"));
}

#[test]
fn edge_to_unknown_resource_is_rejected() {
    let assembly = assemble();
    let topology = assembly.topology.with_edge(AccessEdge {
        principal: Principal::new("Intruder/ServiceRole"),
        role: Role::Worker,
        resource: ResourceId::new("OtherTable"),
    });
    let err = AccessGrantResolver::default().resolve(&topology).unwrap_err();
    assert!(matches!(err, Error::GrantComputation { ref kind, .. } if kind == "unknown resource"));
}

#[test]
fn incomplete_rule_table_fails_assembly() {
    let rules = RuleTable::empty().with_rule(
        Role::Ingest,
        ResourceKind::RecordStore,
        crate::grants::STORE_WRITE,
    );
    let mut assembler =
        TopologyAssembler::new().with_resolver(AccessGrantResolver::new(rules));
    let err = assembler.assemble(&params()).unwrap_err();
    assert!(matches!(err, Error::GrantComputation { ref role, .. } if role == "worker"));
}

#[test]
fn replica_count_defaults_to_platform_default() {
    let assembly = assemble();
    let pool = &assembly.topology.service().worker_pool;
    assert_eq!(pool.desired_count, None);
    assert_eq!(pool.replicas(), 1);
}

#[test]
fn topology_serializes_for_synthesis() {
    let assembly = assemble();
    let json = serde_json::to_value(&assembly).unwrap();
    assert_eq!(json["topology"]["record_store"]["id"], "Table");
    assert_eq!(json["topology"]["certificate"]["certificate"], ARN);
    assert_eq!(
        json["topology"]["service"]["target_group"]["protocol_version"],
        "GRPC"
    );
    assert!(json["grants"].as_array().is_some_and(|g| g.len() == 3));
}
